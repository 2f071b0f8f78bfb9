//! The SPARQL template library. Every query the library sends to a store is built here by a
//! typed method on [`QueryRegistry`], so parameter names and WHERE-clause shapes live in one
//! place and can be tested without a store.

use crate::consts::EXPORT_GRAPH_SUFFIX;
use crate::sparql::{BoundQuery, QueryKind, QueryRegistry};
use crate::util::{export_graph, has_part_graph, position_graph, timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use oxigraph::model::{Literal, NamedNodeRef};

impl QueryRegistry {
    /// ASK whether a named graph holds at least one triple.
    pub fn graph_exists(&self, graph: NamedNodeRef<'_>) -> Result<BoundQuery> {
        let mut q = self.template(QueryKind::Ask, "ASK { GRAPH $graph { ?s ?p ?o } }");
        q.bind_node("graph", graph);
        self.finish(&q)
    }

    /// Adds `<model> dcterms:hasPart <resource>` to the HasPart graph and links the resource
    /// back to the model, but only when the resource graph already types the resource.
    pub fn insert_member(
        &self,
        resource: NamedNodeRef<'_>,
        model: NamedNodeRef<'_>,
        created: DateTime<Utc>,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "INSERT {
  GRAPH $hasPartGraph { $model dcterms:hasPart $resource }
  GRAPH $resource { $resource rdfs:isDefinedBy $model . $resource dcterms:created ?created }
}
WHERE {
  GRAPH $resource { $resource a ?type }
  OPTIONAL { GRAPH $resource { $resource dcterms:created ?existing } }
  BIND(COALESCE(?existing, $creation) AS ?created)
}",
        );
        q.bind_node("hasPartGraph", has_part_graph(model)?.as_ref())
            .bind_node("model", model)
            .bind_node("resource", resource)
            .bind_term("creation", timestamp(created));
        self.finish(&q)
    }

    pub fn remove_member(
        &self,
        resource: NamedNodeRef<'_>,
        model: NamedNodeRef<'_>,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "DELETE DATA { GRAPH $hasPartGraph { $model dcterms:hasPart $resource } }",
        );
        q.bind_node("hasPartGraph", has_part_graph(model)?.as_ref())
            .bind_node("model", model)
            .bind_node("resource", resource);
        self.finish(&q)
    }

    /// Lists the members recorded in the HasPart graph.
    pub fn model_parts(&self, model: NamedNodeRef<'_>) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Select,
            "SELECT ?part WHERE { GRAPH $hasPartGraph { $model dcterms:hasPart ?part } } ORDER BY ?part",
        );
        q.bind_node("hasPartGraph", has_part_graph(model)?.as_ref())
            .bind_node("model", model);
        self.finish(&q)
    }

    /// Lists every resource graph whose resource points at the model with `rdfs:isDefinedBy`.
    pub fn defined_members(&self, model: NamedNodeRef<'_>) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Select,
            "SELECT DISTINCT ?resource WHERE { GRAPH ?resource { ?resource rdfs:isDefinedBy $model } } ORDER BY ?resource",
        );
        q.bind_node("model", model);
        self.finish(&q)
    }

    /// CONSTRUCT of the model graph, optionally unioned with every HasPart member graph.
    pub fn export_construct(&self, model: NamedNodeRef<'_>, with_parts: bool) -> Result<BoundQuery> {
        let template = if with_parts {
            "CONSTRUCT { ?s ?p ?o } WHERE {
  { GRAPH $model { ?s ?p ?o } }
  UNION
  { GRAPH $hasPartGraph { $model dcterms:hasPart ?part } GRAPH ?part { ?s ?p ?o } }
}"
        } else {
            "CONSTRUCT { ?s ?p ?o } WHERE { GRAPH $model { ?s ?p ?o } }"
        };
        let mut q = self.template(QueryKind::Construct, template);
        q.bind_node("model", model);
        if with_parts {
            q.bind_node("hasPartGraph", has_part_graph(model)?.as_ref());
        }
        self.finish(&q)
    }

    /// Adds the membership triple of a single resource to the Export graph.
    pub fn export_patch_membership(
        &self,
        resource: NamedNodeRef<'_>,
        model: NamedNodeRef<'_>,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "INSERT DATA { GRAPH $exportGraph { $model dcterms:hasPart $resource } }",
        );
        q.bind_node("exportGraph", export_graph(model)?.as_ref())
            .bind_node("model", model)
            .bind_node("resource", resource);
        self.finish(&q)
    }

    /// One `DROP SILENT GRAPH` per graph, joined into a single order-independent request.
    pub fn drop_graphs(&self, graphs: &[NamedNodeRef<'_>]) -> Result<BoundQuery> {
        let mut drops = Vec::with_capacity(graphs.len());
        for graph in graphs {
            let mut q = self.template(QueryKind::Update, "DROP SILENT GRAPH $graph");
            q.bind_node("graph", *graph);
            drops.push(self.finish(&q)?);
        }
        BoundQuery::join_updates(drops)
    }

    /// True if the model or any of its members is marked VALID.
    pub fn model_status_restricts_removing(&self, model: NamedNodeRef<'_>) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Ask,
            "ASK {
  { GRAPH $model { $model owl:versionInfo \"VALID\" } }
  UNION
  { GRAPH $hasPartGraph { $model dcterms:hasPart ?resource }
    GRAPH ?resource { ?resource owl:versionInfo \"VALID\" } }
}",
        );
        q.bind_node("model", model)
            .bind_node("hasPartGraph", has_part_graph(model)?.as_ref());
        self.finish(&q)
    }

    pub fn resource_status_is_valid(&self, resource: NamedNodeRef<'_>) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Ask,
            "ASK { GRAPH $resource { $resource owl:versionInfo \"VALID\" } }",
        );
        q.bind_node("resource", resource);
        self.finish(&q)
    }

    /// Rewrites the HasPart entry of a renamed member.
    pub fn rename_has_part(
        &self,
        model: NamedNodeRef<'_>,
        old: NamedNodeRef<'_>,
        new: NamedNodeRef<'_>,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "DELETE { GRAPH $hasPartGraph { $model dcterms:hasPart $old } }
INSERT { GRAPH $hasPartGraph { $model dcterms:hasPart $new } }
WHERE { GRAPH $hasPartGraph { $model dcterms:hasPart $old } }",
        );
        q.bind_node("hasPartGraph", has_part_graph(model)?.as_ref())
            .bind_node("model", model)
            .bind_node("old", old)
            .bind_node("new", new);
        self.finish(&q)
    }

    /// Moves every position-graph statement about (or pointing at) the old IRI to the new one.
    pub fn rename_in_position_graph(
        &self,
        model: NamedNodeRef<'_>,
        old: NamedNodeRef<'_>,
        new: NamedNodeRef<'_>,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "DELETE { GRAPH $positionGraph { $old ?p ?o } }
INSERT { GRAPH $positionGraph { $new ?p ?o } }
WHERE { GRAPH $positionGraph { $old ?p ?o } } ;
DELETE { GRAPH $positionGraph { ?s ?p $old } }
INSERT { GRAPH $positionGraph { ?s ?p $new } }
WHERE { GRAPH $positionGraph { ?s ?p $old } }",
        );
        q.bind_node("positionGraph", position_graph(model)?.as_ref())
            .bind_node("old", old)
            .bind_node("new", new);
        self.finish(&q)
    }

    /// Rewrites object references to the old IRI inside the model graph and every member graph,
    /// except references through `sh:path`/`sh:predicate` which are handled separately.
    pub fn rename_resource_references(
        &self,
        model: NamedNodeRef<'_>,
        old: NamedNodeRef<'_>,
        new: NamedNodeRef<'_>,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "DELETE { GRAPH ?graph { ?s ?p $old } }
INSERT { GRAPH ?graph { ?s ?p $new } }
WHERE {
  { GRAPH $hasPartGraph { $model dcterms:hasPart ?graph } } UNION { BIND($model AS ?graph) }
  GRAPH ?graph { ?s ?p $old }
  FILTER(?p NOT IN (sh:path, sh:predicate))
}",
        );
        q.bind_node("hasPartGraph", has_part_graph(model)?.as_ref())
            .bind_node("model", model)
            .bind_node("old", old)
            .bind_node("new", new);
        self.finish(&q)
    }

    /// Rewrites `sh:path`/`sh:predicate` references to a renamed property inside member graphs.
    pub fn rename_predicate_references(
        &self,
        model: NamedNodeRef<'_>,
        old: NamedNodeRef<'_>,
        new: NamedNodeRef<'_>,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "DELETE { GRAPH ?graph { ?s ?p $old } }
INSERT { GRAPH ?graph { ?s ?p $new } }
WHERE {
  GRAPH $hasPartGraph { $model dcterms:hasPart ?graph }
  GRAPH ?graph { ?s ?p $old }
  VALUES ?p { sh:path sh:predicate }
}",
        );
        q.bind_node("hasPartGraph", has_part_graph(model)?.as_ref())
            .bind_node("model", model)
            .bind_node("old", old)
            .bind_node("new", new);
        self.finish(&q)
    }

    /// Stores the diagram coordinates of a resource, replacing previous ones.
    pub fn save_position(
        &self,
        model: NamedNodeRef<'_>,
        resource: NamedNodeRef<'_>,
        x: f64,
        y: f64,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "DELETE { GRAPH $positionGraph { $resource iow:posX ?x . $resource iow:posY ?y } }
INSERT { GRAPH $positionGraph { $resource iow:posX $newX . $resource iow:posY $newY } }
WHERE {
  OPTIONAL { GRAPH $positionGraph { $resource iow:posX ?x } }
  OPTIONAL { GRAPH $positionGraph { $resource iow:posY ?y } }
}",
        );
        q.bind_node("positionGraph", position_graph(model)?.as_ref())
            .bind_node("resource", resource)
            .bind_term("newX", Literal::from(x))
            .bind_term("newY", Literal::from(y));
        self.finish(&q)
    }

    /// Forgets every diagram statement about a removed resource or pointing at it.
    pub fn remove_position(
        &self,
        model: NamedNodeRef<'_>,
        resource: NamedNodeRef<'_>,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "DELETE WHERE { GRAPH $positionGraph { $resource ?p ?o } } ;
DELETE WHERE { GRAPH $positionGraph { ?s ?p $resource } }",
        );
        q.bind_node("positionGraph", position_graph(model)?.as_ref())
            .bind_node("resource", resource);
        self.finish(&q)
    }

    /// Supersedes the current provenance entity of a resource with a new one.
    pub fn provenance_activity(
        &self,
        resource: NamedNodeRef<'_>,
        entity: NamedNodeRef<'_>,
        actor: NamedNodeRef<'_>,
        time: DateTime<Utc>,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "DELETE { GRAPH $resource { $resource prov:used ?previous } }
INSERT { GRAPH $resource {
  $resource a prov:Activity ;
    prov:startedAtTime ?started ;
    prov:used $entity ;
    prov:generated $entity .
  $entity a prov:Entity ;
    prov:wasAttributedTo $actor ;
    prov:generatedAtTime $time ;
    dcterms:identifier $entityId ;
    prov:wasRevisionOf ?previous .
} }
WHERE {
  OPTIONAL { GRAPH $resource { $resource prov:used ?previous } }
  OPTIONAL { GRAPH $resource { $resource prov:startedAtTime ?existingStart } }
  BIND(COALESCE(?existingStart, $time) AS ?started)
}",
        );
        q.bind_node("resource", resource)
            .bind_node("entity", entity)
            .bind_node("actor", actor)
            .bind_term("time", timestamp(time))
            .bind_literal("entityId", entity.as_str());
        self.finish(&q)
    }

    /// Replaces the `dcterms:identifier` version marker of an existing resource graph.
    pub fn set_version_identifier(
        &self,
        resource: NamedNodeRef<'_>,
        identifier: &str,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "DELETE { GRAPH $resource { $resource dcterms:identifier ?old } }
INSERT { GRAPH $resource { $resource dcterms:identifier $identifier } }
WHERE {
  { SELECT DISTINCT ?found WHERE { GRAPH $resource { $resource a ?found } } LIMIT 1 }
  OPTIONAL { GRAPH $resource { $resource dcterms:identifier ?old } }
}",
        );
        q.bind_node("resource", resource)
            .bind_literal("identifier", identifier);
        self.finish(&q)
    }

    /// Carries the version marker of a resource into the Export graph of the model that
    /// defines it (or of the resource itself when it is a model). Only touches an Export graph
    /// that already describes the resource.
    pub fn mirror_version_identifier(
        &self,
        resource: NamedNodeRef<'_>,
        identifier: &str,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "DELETE { GRAPH ?export { $resource dcterms:identifier ?old } }
INSERT { GRAPH ?export { $resource dcterms:identifier $identifier } }
WHERE {
  { GRAPH $resource { $resource rdfs:isDefinedBy ?model } }
  UNION
  { GRAPH $resource { $resource a owl:Ontology } BIND($resource AS ?model) }
  BIND(IRI(CONCAT(STR(?model), $exportSuffix)) AS ?export)
  FILTER EXISTS { GRAPH ?export { $resource a ?type } }
  OPTIONAL { GRAPH ?export { $resource dcterms:identifier ?old } }
}",
        );
        q.bind_node("resource", resource)
            .bind_literal("identifier", identifier)
            .bind_literal("exportSuffix", EXPORT_GRAPH_SUFFIX);
        self.finish(&q)
    }

    /// Copies the activity history of `old` to `new`, rewriting the activity subject, then
    /// drops the old history graph.
    pub fn rename_provenance(
        &self,
        old: NamedNodeRef<'_>,
        new: NamedNodeRef<'_>,
    ) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Update,
            "INSERT { GRAPH $new { ?s2 ?p ?o2 } }
WHERE {
  GRAPH $old { ?s ?p ?o }
  BIND(IF(sameTerm(?s, $old), $new, ?s) AS ?s2)
  BIND(IF(sameTerm(?o, $old), $new, ?o) AS ?o2)
} ;
DROP SILENT GRAPH $old",
        );
        q.bind_node("old", old).bind_node("new", new);
        self.finish(&q)
    }

    pub fn current_entity(&self, resource: NamedNodeRef<'_>) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Select,
            "SELECT ?entity WHERE { GRAPH $resource { $resource prov:used ?entity } }",
        );
        q.bind_node("resource", resource);
        self.finish(&q)
    }

    /// Every generated entity of a resource, newest first.
    pub fn provenance_history(&self, resource: NamedNodeRef<'_>) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Select,
            "SELECT ?entity ?time ?actor ?previous WHERE {
  GRAPH $resource {
    $resource prov:generated ?entity .
    ?entity prov:generatedAtTime ?time .
    OPTIONAL { ?entity prov:wasAttributedTo ?actor }
    OPTIONAL { ?entity prov:wasRevisionOf ?previous }
  }
} ORDER BY DESC(?time) ?entity",
        );
        q.bind_node("resource", resource);
        self.finish(&q)
    }

    /// Codes of an external scheme, ordered lexically by notation (or IRI when absent).
    pub fn scheme_codes(&self, scheme: NamedNodeRef<'_>) -> Result<BoundQuery> {
        let mut q = self.template(
            QueryKind::Select,
            "SELECT DISTINCT ?value WHERE {
  GRAPH ?g { ?code skos:inScheme $scheme . OPTIONAL { ?code skos:notation ?notation } }
  BIND(COALESCE(STR(?notation), STR(?code)) AS ?value)
} ORDER BY ?value",
        );
        q.bind_node("scheme", scheme);
        self.finish(&q)
    }

    /// Resources whose literals contain `term` (case-insensitive), optionally restricted to a
    /// model and a language.
    pub fn search(
        &self,
        model: Option<NamedNodeRef<'_>>,
        term: &str,
        language: Option<&str>,
    ) -> Result<BoundQuery> {
        let mut template = String::from(
            "CONSTRUCT {
  ?resource a ?type .
  ?resource rdfs:label ?label .
  ?resource rdfs:isDefinedBy ?model .
} WHERE {
  GRAPH ?resource {
    ?resource a ?type .
    ?resource rdfs:isDefinedBy ?model .
    ?resource ?matchedProperty ?literal .
    OPTIONAL { ?resource rdfs:label ?label }
  }
  FILTER(isLiteral(?literal))
  FILTER(CONTAINS(LCASE(STR(?literal)), LCASE($term)))
",
        );
        if model.is_some() {
            template.push_str("  FILTER(sameTerm(?model, $model))\n");
        }
        if language.is_some() {
            template.push_str("  FILTER(LANG(?literal) = \"\" || langMatches(LANG(?literal), $lang))\n");
        }
        template.push('}');
        let mut q = self.template(QueryKind::Construct, &template);
        q.bind_literal("term", term);
        if let Some(model) = model {
            q.bind_node("model", model);
        }
        if let Some(lang) = language {
            q.bind_literal("lang", lang);
        }
        self.finish(&q)
    }
}
