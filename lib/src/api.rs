//! Defines the `ModelApi` facade used by the endpoint layer: model and resource mutations run
//! as ordered pipelines over the core store, followed by Export maintenance and provenance.
//! Read operations expose the derived graphs, schema documents and diagnostics.

use crate::checks::{Doctor, ModelProblem};
use crate::config::Config;
use crate::consts::{
    CREATED, DEFINED_BY, IDENTIFIER, IOW_LOCAL_NAME, MODIFIED, ONTOLOGY, PREFERRED_XMLNS_PREFIX,
    PROV_WAS_DERIVED_FROM, SUBJECT, VERSION_INFO,
};
use crate::errors::ModelError;
use crate::external::{
    ConceptResolver, HttpConceptResolver, HttpOrganizationDirectory, OrganizationDirectory,
    StaticConceptResolver, StaticOrganizationDirectory,
};
use crate::mapper::graph::{remove_all, set_single};
use crate::mapper::{
    build_model_graph, build_resource_graph, parse_model_graph, parse_resource_graph,
    retarget_graph, validate_local_name, ModelDto, ResourceDto, Status,
};
use crate::namespace::{NamespaceResolver, Resolution};
use crate::options::{ExportScope, LanguageSelection};
use crate::provenance::{ProvenanceId, ProvenanceManager, ProvenanceRecorder, VersionEntry};
use crate::references::{ReconcileReport, ReferenceManager};
use crate::schema::json_schema::load_model_graph;
use crate::schema::{JsonSchemaExporter, OpenApiExporter};
use crate::sparql::{BoundQuery, PrefixMap, QueryRegistry};
use crate::store::{GraphStore, Stores};
use crate::util::{local_name, resource_iri, serialize_graph, timestamp, GraphExt};
use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{error, info};
use oxigraph::io::RdfFormat;
use oxigraph::model::{Graph, Literal, NamedNode, NamedNodeRef, TripleRef};
use serde_json::Value;
use std::sync::Arc;

/// Initializes logging for the datamodel library.
///
/// If `DATAMODEL_LOG` is set, `RUST_LOG` is set to its value, so `DATAMODEL_LOG` takes
/// precedence. The logger itself (e.g. `env_logger::init()`) must be initialized afterwards.
pub fn init_logging() {
    if let Ok(log_level) = std::env::var("DATAMODEL_LOG") {
        std::env::set_var("RUST_LOG", log_level);
    }
}

/// Result of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub iri: NamedNode,
    /// Provenance entity of the change; `None` when provenance is disabled or runs in the
    /// background.
    pub version: Option<ProvenanceId>,
}

pub struct ModelApi {
    config: Config,
    stores: Stores,
    queries: Arc<QueryRegistry>,
    references: ReferenceManager,
    provenance: ProvenanceRecorder,
    json_schema: JsonSchemaExporter,
    openapi: OpenApiExporter,
    namespaces: NamespaceResolver,
    concepts: Arc<dyn ConceptResolver>,
    organizations: Arc<dyn OrganizationDirectory>,
}

impl ModelApi {
    /// Opens the stores and external services named in the configuration. Services without a
    /// URL are replaced by empty static implementations.
    pub fn new(config: Config) -> Result<Self> {
        let stores = Stores::from_config(&config)?;
        let concepts: Arc<dyn ConceptResolver> = match &config.endpoints.concept_service {
            Some(url) => Arc::new(HttpConceptResolver::new(url, &config)?),
            None => Arc::new(StaticConceptResolver::new()),
        };
        let organizations: Arc<dyn OrganizationDirectory> =
            match &config.endpoints.organization_service {
                Some(url) => Arc::new(HttpOrganizationDirectory::new(url, &config)?),
                None => Arc::new(StaticOrganizationDirectory::new(Graph::new())),
            };
        Self::with_collaborators(config, stores, concepts, organizations)
    }

    /// Everything in memory, network disabled.
    pub fn in_memory() -> Result<Self> {
        Self::new(Config::in_memory())
    }

    pub fn with_collaborators(
        config: Config,
        stores: Stores,
        concepts: Arc<dyn ConceptResolver>,
        organizations: Arc<dyn OrganizationDirectory>,
    ) -> Result<Self> {
        let queries = Arc::new(QueryRegistry::new(PrefixMap::standard()));
        let references = ReferenceManager::new(stores.core.clone(), queries.clone());
        let manager = Arc::new(ProvenanceManager::new(
            stores.provenance.clone(),
            references.clone(),
            queries.clone(),
        ));
        let provenance = ProvenanceRecorder::new(manager, &config);
        let json_schema = JsonSchemaExporter::new(
            stores.core.clone(),
            stores.scheme.clone(),
            queries.clone(),
            config.api_base.clone(),
        );
        let openapi = OpenApiExporter::new(
            stores.core.clone(),
            stores.scheme.clone(),
            queries.clone(),
            config.api_base.clone(),
            config.default_language.clone(),
        );
        let namespaces = NamespaceResolver::new(stores.imports.clone(), &config)?;
        info!(
            "Model api ready (core: {}, provenance: {:?})",
            stores.core.store_type(),
            config.provenance
        );
        Ok(Self {
            config,
            stores,
            queries,
            references,
            provenance,
            json_schema,
            openapi,
            namespaces,
            concepts,
            organizations,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn queries(&self) -> &QueryRegistry {
        &self.queries
    }

    pub fn references(&self) -> &ReferenceManager {
        &self.references
    }

    pub fn provenance(&self) -> &ProvenanceRecorder {
        &self.provenance
    }

    fn require_graph(&self, iri: NamedNodeRef<'_>) -> Result<Graph> {
        self.stores.core.get_graph(iri)
    }

    fn ensure_exists(&self, iri: NamedNodeRef<'_>) -> Result<()> {
        if !self.stores.core.graph_exists(iri)? {
            return Err(anyhow!(ModelError::NotFound(iri.as_str().to_string())));
        }
        Ok(())
    }

    fn ensure_unused(&self, iri: NamedNodeRef<'_>) -> Result<()> {
        if self.stores.core.graph_exists(iri)? {
            return Err(anyhow!(ModelError::UsedIri(iri.as_str().to_string())));
        }
        Ok(())
    }

    fn ensure_unlocked(&self, iri: NamedNodeRef<'_>) -> Result<()> {
        if self.references.resource_is_locked(iri)? {
            return Err(anyhow!(ModelError::Locked(iri.as_str().to_string())));
        }
        Ok(())
    }

    /// The resource graph must say it is defined by `model`.
    fn ensure_member(
        &self,
        graph: &Graph,
        resource: NamedNodeRef<'_>,
        model: NamedNodeRef<'_>,
    ) -> Result<()> {
        if !graph.contains(TripleRef::new(resource, DEFINED_BY, model)) {
            return Err(anyhow!(ModelError::NotFound(format!(
                "{resource} in {model}"
            ))));
        }
        Ok(())
    }

    /// Removing or renaming a member is refused while the model or any of its members is VALID.
    fn ensure_removable(&self, model: NamedNodeRef<'_>) -> Result<()> {
        if self.references.model_status_restricts_removing(model)? {
            return Err(anyhow!(ModelError::Locked(model.as_str().to_string())));
        }
        Ok(())
    }

    fn refresh_export(&self, model: NamedNodeRef<'_>) -> Result<()> {
        self.references
            .rebuild_export_graph(model, ExportScope::WithParts)
            .map(|_| ())
    }

    /// A failed record is logged and the mutation still succeeds. Runs before the Export refresh
    /// so a synchronously written version marker reaches the Export graph; a background worker
    /// copies its marker into Export itself.
    fn record(
        &self,
        resource: NamedNodeRef<'_>,
        actor: NamedNodeRef<'_>,
        graph: &Graph,
    ) -> Option<ProvenanceId> {
        match self.provenance.record(resource, actor, graph) {
            Ok(version) => version,
            Err(e) => {
                error!("Provenance of {resource} was not recorded: {e}");
                None
            }
        }
    }

    fn language(&self, lang: Option<&str>) -> Result<LanguageSelection> {
        let selection = LanguageSelection::from_request(lang);
        if let Some(l) = selection.language() {
            if !self.config.accepts_language(l) {
                return Err(anyhow!(ModelError::malformed(format!(
                    "Unsupported language {l}"
                ))));
            }
        }
        Ok(selection)
    }

    // models

    pub fn create_model(&self, dto: &ModelDto, actor: NamedNodeRef<'_>) -> Result<MutationOutcome> {
        let graph = build_model_graph(dto, &self.config)?;
        let model = dto.namespace.as_ref();
        self.ensure_unused(model)?;
        self.stores.core.put_graph(model, &graph)?;
        let version = self.record(model, actor, &graph);
        self.refresh_export(model)?;
        info!("Created model {model}");
        Ok(MutationOutcome {
            iri: model.into_owned(),
            version,
        })
    }

    /// Replaces the model graph. The creation time survives the update.
    pub fn update_model(&self, dto: &ModelDto, actor: NamedNodeRef<'_>) -> Result<MutationOutcome> {
        let model = dto.namespace.as_ref();
        let current = parse_model_graph(&self.require_graph(model)?, model)?;
        self.ensure_unlocked(model)?;
        let mut dto = dto.clone();
        dto.created = dto.created.or(current.created);
        dto.modified = Some(Utc::now());
        let graph = build_model_graph(&dto, &self.config)?;
        self.stores.core.put_graph(model, &graph)?;
        let version = self.record(model, actor, &graph);
        self.refresh_export(model)?;
        info!("Updated model {model}");
        Ok(MutationOutcome {
            iri: model.into_owned(),
            version,
        })
    }

    /// Drops the model, its derived graphs and every member graph.
    pub fn delete_model(&self, model: NamedNodeRef<'_>) -> Result<()> {
        self.ensure_exists(model)?;
        self.ensure_removable(model)?;
        let update = self.references.build_remove_model_query(model)?;
        self.stores.core.update(&update)?;
        info!("Deleted model {model}");
        Ok(())
    }

    pub fn get_model(&self, model: NamedNodeRef<'_>) -> Result<ModelDto> {
        parse_model_graph(&self.require_graph(model)?, model)
    }

    /// The DROP statements `delete_model` would send.
    pub fn remove_model_query(&self, model: NamedNodeRef<'_>) -> Result<BoundQuery> {
        self.references.build_remove_model_query(model)
    }

    // resources

    pub fn create_resource(
        &self,
        model: NamedNodeRef<'_>,
        dto: &ResourceDto,
        actor: NamedNodeRef<'_>,
    ) -> Result<MutationOutcome> {
        let (iri, graph) = build_resource_graph(dto, model, &self.config)?;
        let resource = iri.as_ref();
        self.ensure_exists(model)?;
        self.ensure_unused(resource)?;
        self.ensure_unlocked(model)?;
        self.stores.core.put_graph(resource, &graph)?;
        self.references.insert_member(resource, model)?;
        let stored = self.require_graph(resource)?;
        let version = self.record(resource, actor, &stored);
        if self.config.export_strategy.allows_patch() {
            self.references.patch_export_graph(resource, model)?;
        } else {
            self.refresh_export(model)?;
        }
        info!("Created {resource} in {model}");
        Ok(MutationOutcome { iri, version })
    }

    /// Replaces a resource graph. `dcterms:created` and the version identifier are carried
    /// over from the stored graph unless the new description sets them.
    pub fn update_resource(
        &self,
        model: NamedNodeRef<'_>,
        dto: &ResourceDto,
        actor: NamedNodeRef<'_>,
    ) -> Result<MutationOutcome> {
        let (iri, mut graph) = build_resource_graph(dto, model, &self.config)?;
        let resource = iri.as_ref();
        let current = self.require_graph(resource)?;
        self.ensure_member(&current, resource, model)?;
        self.ensure_unlocked(model)?;
        self.ensure_unlocked(resource)?;
        for predicate in [CREATED, IDENTIFIER] {
            if graph
                .object_for_subject_predicate(resource, predicate)
                .is_none()
            {
                if let Some(value) = current.object_for_subject_predicate(resource, predicate) {
                    graph.insert(TripleRef::new(resource, predicate, value));
                }
            }
        }
        self.stores.core.put_graph(resource, &graph)?;
        let version = self.record(resource, actor, &graph);
        self.refresh_export(model)?;
        info!("Updated {resource}");
        Ok(MutationOutcome { iri, version })
    }

    /// Removes a member graph with its HasPart and Position entries. References to it from
    /// other members are left for the caller to resolve.
    pub fn delete_resource(&self, model: NamedNodeRef<'_>, resource: NamedNodeRef<'_>) -> Result<()> {
        let current = self.require_graph(resource)?;
        self.ensure_member(&current, resource, model)?;
        self.ensure_unlocked(resource)?;
        self.ensure_removable(model)?;
        self.references.remove_member(resource, model)?;
        self.references.remove_position(model, resource)?;
        self.stores.core.delete_graph(resource)?;
        self.refresh_export(model)?;
        info!("Deleted {resource} from {model}");
        Ok(())
    }

    pub fn get_resource(&self, resource: NamedNodeRef<'_>) -> Result<ResourceDto> {
        parse_resource_graph(&self.require_graph(resource)?, resource)
    }

    /// Renames a resource of `model` to `new_local_name`.
    ///
    /// The new graph is written and verified first, then every reference in the model's
    /// HasPart, member and Position graphs is rewritten, then the old graph is removed and its
    /// history moved. A failure before the old graph is removed leaves it intact.
    pub fn rename_resource(
        &self,
        model: NamedNodeRef<'_>,
        old: NamedNodeRef<'_>,
        new_local_name: &str,
        actor: NamedNodeRef<'_>,
    ) -> Result<MutationOutcome> {
        validate_local_name(new_local_name)?;
        let new_iri = resource_iri(model.as_str(), new_local_name)?;
        let new = new_iri.as_ref();
        let current = self.require_graph(old)?;
        self.ensure_member(&current, old, model)?;
        self.ensure_unlocked(old)?;
        self.ensure_removable(model)?;
        self.ensure_unused(new)?;

        let mut graph = retarget_graph(&current, old, new);
        let local = Literal::new_simple_literal(new_local_name);
        set_single(&mut graph, new, IOW_LOCAL_NAME, local.as_ref().into());
        let modified = timestamp(Utc::now());
        set_single(&mut graph, new, MODIFIED, modified.as_ref().into());
        self.stores.core.put_graph(new, &graph)?;
        if !self.stores.core.graph_exists(new)? {
            return Err(anyhow!(
                "Rename of {old} aborted: {new} could not be verified after writing"
            ));
        }

        self.references.rename_all_references(model, old, new)?;
        self.stores.core.delete_graph(old)?;
        if let Err(e) = self.provenance.rename(old, new) {
            error!("History of {old} was not moved to {new}: {e}");
        }
        let stored = self.require_graph(new)?;
        let version = self.record(new, actor, &stored);
        self.refresh_export(model)?;
        info!("Renamed {old} to {new}");
        Ok(MutationOutcome {
            iri: new_iri,
            version,
        })
    }

    /// Copies a resource into `target_model`, keeping its local name unless a new one is
    /// given. The copy starts as a DRAFT derived from the source.
    pub fn copy_resource(
        &self,
        source: NamedNodeRef<'_>,
        target_model: NamedNodeRef<'_>,
        new_local_name: Option<&str>,
        actor: NamedNodeRef<'_>,
    ) -> Result<MutationOutcome> {
        let current = self.require_graph(source)?;
        self.ensure_exists(target_model)?;
        self.ensure_unlocked(target_model)?;
        let local = match new_local_name {
            Some(name) => name.to_string(),
            None => current
                .first_literal(source.into(), IOW_LOCAL_NAME)
                .unwrap_or_else(|| local_name(source.as_str()).to_string()),
        };
        validate_local_name(&local)?;
        let copy_iri = resource_iri(target_model.as_str(), &local)?;
        let copy = copy_iri.as_ref();
        self.ensure_unused(copy)?;

        let mut graph = retarget_graph(&current, source, copy);
        set_single(&mut graph, copy, DEFINED_BY, target_model.into());
        let local_literal = Literal::new_simple_literal(&local);
        set_single(&mut graph, copy, IOW_LOCAL_NAME, local_literal.as_ref().into());
        let status = Literal::new_simple_literal(Status::Draft.as_str());
        set_single(&mut graph, copy, VERSION_INFO, status.as_ref().into());
        set_single(&mut graph, copy, PROV_WAS_DERIVED_FROM, source.into());
        let modified = timestamp(Utc::now());
        set_single(&mut graph, copy, MODIFIED, modified.as_ref().into());
        remove_all(&mut graph, copy, IDENTIFIER);
        remove_all(&mut graph, copy, CREATED);

        self.stores.core.put_graph(copy, &graph)?;
        self.references.insert_member(copy, target_model)?;
        let stored = self.require_graph(copy)?;
        let version = self.record(copy, actor, &stored);
        self.refresh_export(target_model)?;
        info!("Copied {source} to {copy}");
        Ok(MutationOutcome {
            iri: copy_iri,
            version,
        })
    }

    /// Links a resource to a concept of the terminology service. The concept description is
    /// cached in the imports dataset.
    pub fn attach_concept(
        &self,
        resource: NamedNodeRef<'_>,
        concept: NamedNodeRef<'_>,
        actor: NamedNodeRef<'_>,
    ) -> Result<MutationOutcome> {
        let mut graph = self.require_graph(resource)?;
        self.ensure_unlocked(resource)?;
        let model = graph
            .first_iri(resource.into(), DEFINED_BY)
            .ok_or_else(|| anyhow!(ModelError::NotFound(resource.as_str().to_string())))?;
        self.ensure_unlocked(model.as_ref())?;
        let concept_graph = self.concepts.resolve_concept(concept)?;
        if concept_graph.is_empty() {
            return Err(anyhow!(ModelError::NotFound(concept.as_str().to_string())));
        }
        self.stores.imports.put_graph(concept, &concept_graph)?;
        set_single(&mut graph, resource, SUBJECT, concept.into());
        let modified = timestamp(Utc::now());
        set_single(&mut graph, resource, MODIFIED, modified.as_ref().into());
        self.stores.core.put_graph(resource, &graph)?;
        let version = self.record(resource, actor, &graph);
        self.refresh_export(model.as_ref())?;
        info!("Attached {concept} to {resource}");
        Ok(MutationOutcome {
            iri: resource.into_owned(),
            version,
        })
    }

    pub fn save_position(
        &self,
        model: NamedNodeRef<'_>,
        resource: NamedNodeRef<'_>,
        x: f64,
        y: f64,
    ) -> Result<()> {
        self.ensure_exists(model)?;
        self.ensure_unlocked(model)?;
        self.references.save_position(model, resource, x, y)
    }

    // exports and reads

    /// The Export graph of a model serialized in `format`, with the model prefix declared.
    pub fn export_graph(&self, model: NamedNodeRef<'_>, format: RdfFormat) -> Result<Vec<u8>> {
        let graph = load_model_graph(self.stores.core.as_ref(), &self.queries, model)?;
        let mut prefixes = self.queries.prefixes().clone();
        if let Some(prefix) = graph.first_literal(model.into(), PREFERRED_XMLNS_PREFIX) {
            let namespace = if model.as_str().ends_with(['/', '#']) {
                model.as_str().to_string()
            } else {
                format!("{}#", model.as_str())
            };
            prefixes = prefixes.with_prefix(&prefix, &namespace)?;
        }
        serialize_graph(&graph, format, &prefixes)
    }

    /// JSON Schema of a model or of a single class. `lang` of `None` or `"*"` selects the
    /// multilingual variant.
    pub fn export_schema(&self, iri: NamedNodeRef<'_>, lang: Option<&str>) -> Result<Value> {
        let language = self.language(lang)?;
        match self.stores.core.try_get_graph(iri)? {
            Some(graph) if graph.has_type(iri.into(), ONTOLOGY) => {
                self.json_schema.model_schema(iri, &language)
            }
            Some(graph) => Ok(self
                .json_schema
                .class_schema_from_graph(&graph, iri, &language)),
            None => Ok(self
                .json_schema
                .class_schema_from_graph(&Graph::new(), iri, &language)),
        }
    }

    pub fn export_openapi(&self, model: NamedNodeRef<'_>, lang: Option<&str>) -> Result<Value> {
        let language = self.language(lang)?;
        self.openapi.model_openapi(model, &language)
    }

    /// Resources whose literals contain `term`, optionally within one model and language.
    pub fn search(
        &self,
        model: Option<NamedNodeRef<'_>>,
        term: &str,
        lang: Option<&str>,
    ) -> Result<Graph> {
        let term = term.trim();
        if term.is_empty() {
            return Err(anyhow!(ModelError::malformed("Empty search term")));
        }
        self.stores
            .core
            .construct(&self.queries.search(model, term, lang)?)
    }

    pub fn reconcile(&self, model: NamedNodeRef<'_>) -> Result<ReconcileReport> {
        self.ensure_exists(model)?;
        self.references.reconcile(model, ExportScope::WithParts)
    }

    pub fn doctor(&self, model: NamedNodeRef<'_>) -> Result<Vec<ModelProblem>> {
        self.ensure_exists(model)?;
        Doctor::with_default_checks(ExportScope::WithParts).run(&self.references, model)
    }

    pub fn history(&self, resource: NamedNodeRef<'_>) -> Result<Vec<VersionEntry>> {
        self.provenance.manager().history(resource)
    }

    pub fn resolve_namespace(&self, namespace: &str) -> Result<Resolution> {
        self.namespaces.resolve(namespace)
    }

    pub fn organizations(&self) -> Result<Graph> {
        self.organizations.organizations()
    }

    /// Waits for queued provenance records. Background recording stops afterwards.
    pub fn shutdown(&self) {
        self.provenance.shutdown();
    }
}
