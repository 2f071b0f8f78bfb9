//! Prefix registry and parameterized SPARQL templates.
//!
//! Templates are plain SPARQL text in which parameters are written as `$name`. Parameters are
//! bound to oxigraph terms, so an IRI is validated before it is rendered and a literal is always
//! escaped by its own serializer. Rendering fails when a parameter is left unbound, which keeps
//! half-built queries away from the store.

use crate::consts::*;
use crate::errors::ModelError;
use anyhow::{anyhow, Result};
use oxigraph::model::{Literal, NamedNode, NamedNodeRef, Term};
use std::collections::BTreeMap;
use std::fmt;

/// Immutable mapping of namespace prefixes to IRIs, rendered as the `PREFIX` preamble of every
/// query built from a [`QueryRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMap {
    entries: BTreeMap<String, String>,
}

impl Default for PrefixMap {
    fn default() -> Self {
        Self::standard()
    }
}

impl PrefixMap {
    /// The fixed prefix table used throughout the library.
    pub fn standard() -> Self {
        let entries = [
            ("rdf", RDF_NS),
            ("rdfs", RDFS_NS),
            ("owl", OWL_NS),
            ("xsd", XSD_NS),
            ("sh", SH_NS),
            ("skos", SKOS_NS),
            ("dcterms", DCTERMS_NS),
            ("dcam", DCAM_NS),
            ("dcap", DCAP_NS),
            ("prov", PROV_NS),
            ("void", VOID_NS),
            ("foaf", FOAF_NS),
            ("iow", IOW_NS),
        ]
        .into_iter()
        .map(|(p, ns)| (p.to_string(), ns.to_string()))
        .collect();
        PrefixMap { entries }
    }

    /// Returns a copy of this map with an additional prefix. Only used while the registry is
    /// being assembled; the map is never mutated afterwards.
    pub fn with_prefix(mut self, prefix: &str, namespace: &str) -> Result<Self> {
        NamedNode::new(namespace)
            .map_err(|e| ModelError::malformed(format!("Invalid namespace {namespace}: {e}")))?;
        self.entries
            .insert(prefix.to_string(), namespace.to_string());
        Ok(self)
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.entries.get(prefix).map(|s| s.as_str())
    }

    /// Expands a `prefix:local` CURIE to a full IRI.
    pub fn expand(&self, curie: &str) -> Option<String> {
        let (prefix, local) = curie.split_once(':')?;
        self.get(prefix).map(|ns| format!("{ns}{local}"))
    }

    /// Returns the shortest `prefix:local` form of the IRI, if a namespace matches.
    pub fn compact(&self, iri: &str) -> Option<String> {
        self.entries
            .iter()
            .filter(|(_, ns)| iri.starts_with(ns.as_str()) && iri.len() > ns.len())
            .max_by_key(|(_, ns)| ns.len())
            .map(|(p, ns)| format!("{p}:{}", &iri[ns.len()..]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, ns)| (p.as_str(), ns.as_str()))
    }

    pub fn preamble(&self) -> String {
        let mut out = String::new();
        for (prefix, ns) in &self.entries {
            out.push_str(&format!("PREFIX {prefix}: <{ns}>\n"));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Ask,
    Select,
    Construct,
    Update,
}

impl QueryKind {
    pub fn is_update(self) -> bool {
        matches!(self, QueryKind::Update)
    }
}

/// A fully bound query or update, ready to be sent to a [`crate::store::GraphStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundQuery {
    kind: QueryKind,
    text: String,
}

impl BoundQuery {
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Concatenates several updates into a single request, separated by `;`.
    pub fn join_updates(updates: Vec<BoundQuery>) -> Result<BoundQuery> {
        if updates.iter().any(|u| !u.kind.is_update()) {
            return Err(anyhow!("Only updates can be joined into a single request"));
        }
        let text = updates
            .into_iter()
            .map(|u| u.text)
            .collect::<Vec<_>>()
            .join(" ;\n");
        Ok(BoundQuery {
            kind: QueryKind::Update,
            text,
        })
    }
}

impl fmt::Display for BoundQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A SPARQL template together with its parameter bindings.
#[derive(Debug, Clone)]
pub struct ParameterizedQuery {
    kind: QueryKind,
    template: String,
    bindings: BTreeMap<String, String>,
}

fn is_param_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl ParameterizedQuery {
    pub fn new(kind: QueryKind, template: impl Into<String>) -> Self {
        ParameterizedQuery {
            kind,
            template: template.into(),
            bindings: BTreeMap::new(),
        }
    }

    /// Binds a parameter to an IRI given as a string; invalid IRIs are rejected.
    pub fn bind_iri(&mut self, name: &str, iri: &str) -> Result<&mut Self> {
        let node = NamedNode::new(iri)
            .map_err(|e| ModelError::malformed(format!("Invalid IRI {iri}: {e}")))?;
        Ok(self.bind_term(name, node))
    }

    pub fn bind_node(&mut self, name: &str, node: NamedNodeRef<'_>) -> &mut Self {
        self.bindings.insert(name.to_string(), node.to_string());
        self
    }

    /// Binds a parameter to a list of IRIs rendered space separated, for use in `VALUES`.
    pub fn bind_nodes(&mut self, name: &str, nodes: &[NamedNodeRef<'_>]) -> &mut Self {
        let rendered = nodes
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.bindings.insert(name.to_string(), rendered);
        self
    }

    pub fn bind_literal(&mut self, name: &str, value: &str) -> &mut Self {
        self.bind_term(name, Literal::new_simple_literal(value))
    }

    pub fn bind_lang_literal(&mut self, name: &str, value: &str, lang: &str) -> Result<&mut Self> {
        let literal = Literal::new_language_tagged_literal(value, lang)
            .map_err(|e| ModelError::malformed(format!("Invalid language tag {lang}: {e}")))?;
        Ok(self.bind_term(name, literal))
    }

    pub fn bind_typed_literal(
        &mut self,
        name: &str,
        value: &str,
        datatype: NamedNodeRef<'_>,
    ) -> &mut Self {
        self.bind_term(name, Literal::new_typed_literal(value, datatype))
    }

    pub fn bind_term(&mut self, name: &str, term: impl Into<Term>) -> &mut Self {
        let term: Term = term.into();
        self.bindings.insert(name.to_string(), term.to_string());
        self
    }

    /// Renders the template against the prefix preamble, substituting every `$name`.
    pub fn build(&self, prefixes: &PrefixMap) -> Result<BoundQuery> {
        let mut text = prefixes.preamble();
        let mut chars = self.template.char_indices().peekable();
        let mut unbound = Vec::new();
        while let Some((i, c)) = chars.next() {
            if c != '$' {
                text.push(c);
                continue;
            }
            let start = i + 1;
            let mut end = start;
            while let Some(&(j, n)) = chars.peek() {
                if !is_param_char(n) {
                    break;
                }
                end = j + n.len_utf8();
                chars.next();
            }
            let name = &self.template[start..end];
            if name.is_empty() {
                text.push('$');
                continue;
            }
            match self.bindings.get(name) {
                Some(rendered) => text.push_str(rendered),
                None => unbound.push(name.to_string()),
            }
        }
        if !unbound.is_empty() {
            return Err(anyhow!(
                "Unbound query parameters: {}",
                unbound.join(", ")
            ));
        }
        Ok(BoundQuery {
            kind: self.kind,
            text,
        })
    }
}

/// Process-wide query library, constructed once and shared by every component. The typed
/// builder methods live in [`crate::queries`].
#[derive(Debug, Clone, Default)]
pub struct QueryRegistry {
    prefixes: PrefixMap,
}

impl QueryRegistry {
    pub fn new(prefixes: PrefixMap) -> Self {
        QueryRegistry { prefixes }
    }

    pub fn prefixes(&self) -> &PrefixMap {
        &self.prefixes
    }

    pub(crate) fn template(&self, kind: QueryKind, template: &str) -> ParameterizedQuery {
        ParameterizedQuery::new(kind, template)
    }

    pub(crate) fn finish(&self, query: &ParameterizedQuery) -> Result<BoundQuery> {
        query.build(&self.prefixes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_expand_and_compact() {
        let prefixes = PrefixMap::standard();
        assert_eq!(
            prefixes.expand("sh:path").as_deref(),
            Some("http://www.w3.org/ns/shacl#path")
        );
        assert_eq!(
            prefixes.compact("http://purl.org/dc/terms/hasPart").as_deref(),
            Some("dcterms:hasPart")
        );
        assert!(prefixes.expand("nope:thing").is_none());
        assert!(prefixes.preamble().contains("PREFIX sh: <http://www.w3.org/ns/shacl#>"));
    }

    #[test]
    fn test_bindings_are_escaped() {
        let mut q = ParameterizedQuery::new(
            QueryKind::Ask,
            "ASK { GRAPH $g { ?s rdfs:label $label } }",
        );
        q.bind_iri("g", "urn:ex:model").unwrap();
        q.bind_literal("label", "x\" } DROP ALL ; {\"");
        let bound = q.build(&PrefixMap::standard()).unwrap();
        assert!(bound.as_str().contains("GRAPH <urn:ex:model>"));
        assert!(bound.as_str().contains("\"x\\\" } DROP ALL ; {\\\"\""));
    }

    #[test]
    fn test_invalid_iri_and_unbound_parameter() {
        let mut q = ParameterizedQuery::new(QueryKind::Ask, "ASK { $a ?p $b }");
        assert!(q.bind_iri("a", "not an iri>").is_err());
        q.bind_iri("a", "urn:ex:a").unwrap();
        let err = q.build(&PrefixMap::standard()).unwrap_err();
        assert!(err.to_string().contains("b"));
    }

    #[test]
    fn test_parameter_names_do_not_collide() {
        let mut q = ParameterizedQuery::new(QueryKind::Select, "SELECT * { $model ?p $modelPart }");
        q.bind_iri("model", "urn:ex:m").unwrap();
        q.bind_iri("modelPart", "urn:ex:part").unwrap();
        let bound = q.build(&PrefixMap::standard()).unwrap();
        assert!(bound.as_str().ends_with("SELECT * { <urn:ex:m> ?p <urn:ex:part> }"));
    }

    #[test]
    fn test_join_updates() {
        let prefixes = PrefixMap::standard();
        let a = ParameterizedQuery::new(QueryKind::Update, "DROP SILENT GRAPH <urn:a>")
            .build(&prefixes)
            .unwrap();
        let ask = ParameterizedQuery::new(QueryKind::Ask, "ASK {}")
            .build(&prefixes)
            .unwrap();
        assert!(BoundQuery::join_updates(vec![a.clone(), a.clone()]).is_ok());
        assert!(BoundQuery::join_updates(vec![a, ask]).is_err());
    }
}
