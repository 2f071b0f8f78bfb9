//! Maintenance of the graphs derived from a model graph: the HasPart graph listing its members,
//! the Export graph holding the flattened model, and the Position graph with diagram layout.
//!
//! None of the operations here is transactional across graphs. The Export graph is treated as a
//! cache: [`ReferenceManager::reconcile`] recomputes HasPart from the `rdfs:isDefinedBy` links of
//! the resource graphs and rebuilds Export, so any window left by a failed pipeline can be
//! repaired.
//!
//! Writes to an Export graph are serialized by a lock shared between clones of the manager, so
//! a background version marker cannot be overwritten by a rebuild that read the store earlier.

use crate::options::ExportScope;
use crate::sparql::{BoundQuery, QueryRegistry};
use crate::store::{GraphStore, Row};
use crate::util::{export_graph, fingerprint, has_part_graph, position_graph};
use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{debug, info, warn};
use oxigraph::model::{Graph, NamedNode, NamedNodeRef, Term};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Outcome of a [`ReferenceManager::reconcile`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub model: String,
    /// Members that had a resource graph but no HasPart entry.
    pub added: Vec<String>,
    /// HasPart entries without a matching resource graph.
    pub removed: Vec<String>,
    pub export_before: Option<String>,
    pub export_after: String,
}

impl ReconcileReport {
    /// True when nothing had to be repaired.
    pub fn is_clean(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.export_before.as_deref() == Some(self.export_after.as_str())
    }
}

fn iri_column(rows: Vec<Row>, var: &str) -> Vec<NamedNode> {
    let mut out: Vec<NamedNode> = rows
        .into_iter()
        .filter_map(|mut row| match row.remove(var) {
            Some(Term::NamedNode(n)) => Some(n),
            _ => None,
        })
        .collect();
    out.sort();
    out.dedup();
    out
}

#[derive(Clone)]
pub struct ReferenceManager {
    store: Arc<dyn GraphStore>,
    queries: Arc<QueryRegistry>,
    export_lock: Arc<Mutex<()>>,
}

impl ReferenceManager {
    pub fn new(store: Arc<dyn GraphStore>, queries: Arc<QueryRegistry>) -> Self {
        Self {
            store,
            queries,
            export_lock: Arc::new(Mutex::new(())),
        }
    }

    fn lock_exports(&self) -> Result<MutexGuard<'_, ()>> {
        self.export_lock
            .lock()
            .map_err(|_| anyhow!("Export graph lock poisoned"))
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Registers the resource as a member of the model. A no-op when the resource graph does
    /// not type the resource.
    pub fn insert_member(&self, resource: NamedNodeRef<'_>, model: NamedNodeRef<'_>) -> Result<()> {
        debug!("Inserting {resource} into {model}");
        let update = self.queries.insert_member(resource, model, Utc::now())?;
        self.store.update(&update)
    }

    /// Removes the HasPart entry only; the resource graph is left in place.
    pub fn remove_member(&self, resource: NamedNodeRef<'_>, model: NamedNodeRef<'_>) -> Result<()> {
        debug!("Removing {resource} from {model}");
        self.store
            .update(&self.queries.remove_member(resource, model)?)
    }

    /// What the Export graph should contain, computed without writing it.
    pub fn expected_export_graph(
        &self,
        model: NamedNodeRef<'_>,
        scope: ExportScope,
    ) -> Result<Graph> {
        let construct = self
            .queries
            .export_construct(model, scope == ExportScope::WithParts)?;
        self.store.construct(&construct)
    }

    /// Recomputes the Export graph and overwrites it. Returns the new contents.
    pub fn rebuild_export_graph(
        &self,
        model: NamedNodeRef<'_>,
        scope: ExportScope,
    ) -> Result<Graph> {
        let _guard = self.lock_exports()?;
        let graph = self.expected_export_graph(model, scope)?;
        let target = export_graph(model)?;
        if graph.is_empty() {
            warn!("Model {model} has no triples, clearing {target}");
            self.store.delete_graph(target.as_ref())?;
        } else {
            self.store.put_graph(target.as_ref(), &graph)?;
        }
        info!("Rebuilt {target} with {} triples", graph.len());
        Ok(graph)
    }

    /// Adds a single member to the Export graph without recomputing it: the membership triple
    /// plus the member's own triples. Only sound for a newly created member.
    pub fn patch_export_graph(
        &self,
        resource: NamedNodeRef<'_>,
        model: NamedNodeRef<'_>,
    ) -> Result<()> {
        let _guard = self.lock_exports()?;
        let content = self.store.get_graph(resource)?;
        self.store
            .update(&self.queries.export_patch_membership(resource, model)?)?;
        self.store
            .add_to_graph(export_graph(model)?.as_ref(), &content)?;
        debug!("Patched export graph of {model} with {resource}");
        Ok(())
    }

    pub fn rename_reference(
        &self,
        model: NamedNodeRef<'_>,
        old: NamedNodeRef<'_>,
        new: NamedNodeRef<'_>,
    ) -> Result<()> {
        self.store
            .update(&self.queries.rename_has_part(model, old, new)?)
    }

    pub fn rename_references_in_position_graph(
        &self,
        model: NamedNodeRef<'_>,
        old: NamedNodeRef<'_>,
        new: NamedNodeRef<'_>,
    ) -> Result<()> {
        self.store
            .update(&self.queries.rename_in_position_graph(model, old, new)?)
    }

    pub fn rename_resource_references_in_model(
        &self,
        model: NamedNodeRef<'_>,
        old: NamedNodeRef<'_>,
        new: NamedNodeRef<'_>,
    ) -> Result<()> {
        self.store
            .update(&self.queries.rename_resource_references(model, old, new)?)
    }

    pub fn rename_predicate_references_in_model(
        &self,
        model: NamedNodeRef<'_>,
        old: NamedNodeRef<'_>,
        new: NamedNodeRef<'_>,
    ) -> Result<()> {
        self.store
            .update(&self.queries.rename_predicate_references(model, old, new)?)
    }

    /// Applies every rename rewrite as one request so they cannot be partially sent.
    pub fn rename_all_references(
        &self,
        model: NamedNodeRef<'_>,
        old: NamedNodeRef<'_>,
        new: NamedNodeRef<'_>,
    ) -> Result<()> {
        let update = BoundQuery::join_updates(vec![
            self.queries.rename_has_part(model, old, new)?,
            self.queries.rename_resource_references(model, old, new)?,
            self.queries.rename_predicate_references(model, old, new)?,
            self.queries.rename_in_position_graph(model, old, new)?,
        ])?;
        info!("Renaming references to {old} in {model} to {new}");
        self.store.update(&update)
    }

    /// One DROP SILENT per graph owned by the model: the model graph, its three derived graphs
    /// and every member listed in the HasPart graph.
    pub fn build_remove_model_query(&self, model: NamedNodeRef<'_>) -> Result<BoundQuery> {
        let members = self.member_iris(model)?;
        let mut graphs: Vec<NamedNode> = vec![
            model.into_owned(),
            has_part_graph(model)?,
            export_graph(model)?,
            position_graph(model)?,
        ];
        graphs.extend(members);
        let refs: Vec<NamedNodeRef<'_>> = graphs.iter().map(|g| g.as_ref()).collect();
        self.queries.drop_graphs(&refs)
    }

    /// True if the model or any member is VALID. A failed ASK is an error, never "unlocked".
    pub fn model_status_restricts_removing(&self, model: NamedNodeRef<'_>) -> Result<bool> {
        let query = self.queries.model_status_restricts_removing(model)?;
        self.store.ask(&query)
    }

    pub fn resource_is_locked(&self, resource: NamedNodeRef<'_>) -> Result<bool> {
        let query = self.queries.resource_status_is_valid(resource)?;
        self.store.ask(&query)
    }

    /// Copies a freshly written version marker into the Export graph that holds the resource.
    pub fn mirror_version_identifier(
        &self,
        resource: NamedNodeRef<'_>,
        identifier: &str,
    ) -> Result<()> {
        let _guard = self.lock_exports()?;
        self.store
            .update(&self.queries.mirror_version_identifier(resource, identifier)?)
    }

    pub fn save_position(
        &self,
        model: NamedNodeRef<'_>,
        resource: NamedNodeRef<'_>,
        x: f64,
        y: f64,
    ) -> Result<()> {
        self.store
            .update(&self.queries.save_position(model, resource, x, y)?)
    }

    pub fn remove_position(&self, model: NamedNodeRef<'_>, resource: NamedNodeRef<'_>) -> Result<()> {
        debug!("Removing {resource} from the diagram of {model}");
        self.store
            .update(&self.queries.remove_position(model, resource)?)
    }

    /// The diagram layout of the model; empty when none was saved.
    pub fn position_graph(&self, model: NamedNodeRef<'_>) -> Result<Graph> {
        Ok(self
            .store
            .try_get_graph(position_graph(model)?.as_ref())?
            .unwrap_or_default())
    }

    /// Members according to the HasPart graph.
    pub fn member_iris(&self, model: NamedNodeRef<'_>) -> Result<Vec<NamedNode>> {
        let rows = self.store.select(&self.queries.model_parts(model)?)?;
        Ok(iri_column(rows, "part"))
    }

    /// Members according to the `rdfs:isDefinedBy` links inside resource graphs.
    pub fn defined_members(&self, model: NamedNodeRef<'_>) -> Result<Vec<NamedNode>> {
        let rows = self.store.select(&self.queries.defined_members(model)?)?;
        Ok(iri_column(rows, "resource"))
    }

    pub fn export_fingerprint(&self, model: NamedNodeRef<'_>) -> Result<Option<String>> {
        Ok(self
            .store
            .try_get_graph(export_graph(model)?.as_ref())?
            .map(|g| fingerprint(&g)))
    }

    /// Brings HasPart in line with the resource graphs and rebuilds Export. Idempotent.
    pub fn reconcile(&self, model: NamedNodeRef<'_>, scope: ExportScope) -> Result<ReconcileReport> {
        let export_before = self.export_fingerprint(model)?;
        let listed: BTreeSet<NamedNode> = self.member_iris(model)?.into_iter().collect();
        let defined: BTreeSet<NamedNode> = self.defined_members(model)?.into_iter().collect();

        let added: Vec<NamedNode> = defined.difference(&listed).cloned().collect();
        let removed: Vec<NamedNode> = listed.difference(&defined).cloned().collect();
        for member in &added {
            self.insert_member(member.as_ref(), model)?;
        }
        for member in &removed {
            self.remove_member(member.as_ref(), model)?;
        }
        let rebuilt = self.rebuild_export_graph(model, scope)?;
        let report = ReconcileReport {
            model: model.as_str().to_string(),
            added: added.iter().map(|n| n.as_str().to_string()).collect(),
            removed: removed.iter().map(|n| n.as_str().to_string()).collect(),
            export_before,
            export_after: fingerprint(&rebuilt),
        };
        if report.is_clean() {
            debug!("Model {model} was already consistent");
        } else {
            info!(
                "Reconciled {model}: {} added, {} removed",
                report.added.len(),
                report.removed.len()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::consts::{DEFINED_BY, IDENTIFIER, IOW_POSITION_X, ONTOLOGY, OWL_CLASS, TYPE};
    use crate::errors::{model_error, ModelError};
    use crate::store::{HttpGraphStore, MemoryGraphStore};
    use oxigraph::model::{Literal, NamedOrBlankNodeRef, TermRef, TripleRef};

    const MODEL: &str = "http://ex.org/model/";
    const PERSON: &str = "http://ex.org/model/Person";

    fn manager() -> Result<ReferenceManager> {
        let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new("core")?);
        let references = ReferenceManager::new(store, Arc::new(QueryRegistry::default()));
        let model = NamedNodeRef::new(MODEL)?;
        let person = NamedNodeRef::new(PERSON)?;
        let mut model_graph = Graph::new();
        model_graph.insert(TripleRef::new(model, TYPE, ONTOLOGY));
        references.store().put_graph(model, &model_graph)?;
        let mut person_graph = Graph::new();
        person_graph.insert(TripleRef::new(person, TYPE, OWL_CLASS));
        person_graph.insert(TripleRef::new(person, DEFINED_BY, model));
        references.store().put_graph(person, &person_graph)?;
        references.insert_member(person, model)?;
        Ok(references)
    }

    #[test]
    fn test_lock_checks_fail_closed() -> Result<()> {
        let store: Arc<dyn GraphStore> = Arc::new(HttpGraphStore::new(
            "core",
            "http://127.0.0.1:9/core",
            &Config::default(),
        )?);
        let references = ReferenceManager::new(store, Arc::new(QueryRegistry::default()));
        let model = NamedNodeRef::new(MODEL)?;
        let err = references.model_status_restricts_removing(model).unwrap_err();
        assert!(matches!(
            model_error(&err),
            Some(ModelError::UpstreamUnavailable { .. })
        ));
        assert!(references.resource_is_locked(model).is_err());
        Ok(())
    }

    #[test]
    fn test_remove_position() -> Result<()> {
        let references = manager()?;
        let model = NamedNodeRef::new(MODEL)?;
        let person = NamedNodeRef::new(PERSON)?;
        let other = NamedNodeRef::new("http://ex.org/model/Address")?;
        references.save_position(model, person, 10.0, 20.0)?;
        references.save_position(model, other, 1.0, 2.0)?;

        references.remove_position(model, person)?;
        let layout = references.position_graph(model)?;
        assert!(layout
            .iter()
            .all(|t| t.subject != NamedOrBlankNodeRef::from(person)));
        assert!(layout
            .object_for_subject_predicate(other, IOW_POSITION_X)
            .is_some());
        Ok(())
    }

    #[test]
    fn test_mirror_version_identifier() -> Result<()> {
        let references = manager()?;
        let model = NamedNodeRef::new(MODEL)?;
        let person = NamedNodeRef::new(PERSON)?;

        // nothing to mirror into before the Export graph exists
        references.mirror_version_identifier(person, "urn:uuid:1")?;
        assert!(references.export_fingerprint(model)?.is_none());

        references.rebuild_export_graph(model, ExportScope::WithParts)?;
        for id in ["urn:uuid:1", "urn:uuid:2"] {
            references.mirror_version_identifier(person, id)?;
        }
        let export = references.store().get_graph(export_graph(model)?.as_ref())?;
        let markers: Vec<TermRef<'_>> = export
            .objects_for_subject_predicate(person, IDENTIFIER)
            .collect();
        let expected = Literal::new_simple_literal("urn:uuid:2");
        assert_eq!(markers, vec![TermRef::from(expected.as_ref())]);

        references.mirror_version_identifier(model, "urn:uuid:3")?;
        let export = references.store().get_graph(export_graph(model)?.as_ref())?;
        assert!(export
            .object_for_subject_predicate(model, IDENTIFIER)
            .is_some());
        Ok(())
    }
}
