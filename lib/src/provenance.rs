//! PROV-O version trail for resource graphs.
//!
//! Every recorded change stores the new graph contents as an immutable entity graph named
//! `urn:uuid:<v4>` in the provenance dataset, and updates the activity graph of the resource
//! (named by the resource IRI, in the same dataset) so that `prov:used` points at the newest
//! entity and each entity links to its predecessor through `prov:wasRevisionOf`.
//!
//! Background recording goes through [`ProvenanceQueue`], a set of worker threads fed by
//! channels. With [`ProvenanceOrdering::PerResource`] every job for a resource is routed to the
//! same worker, which keeps each history chain linear. With the default
//! [`ProvenanceOrdering::Unordered`] two racing changes to the same resource may fork the chain.
//!
//! The version marker written into the resource graph is copied into the model's Export graph
//! as well, so a change recorded after the Export rebuild does not leave Export stale.

use crate::config::Config;
use crate::consts::UUID_URN_PREFIX;
use crate::errors::ModelError;
use crate::options::{ProvenanceMode, ProvenanceOrdering};
use crate::references::ReferenceManager;
use crate::sparql::QueryRegistry;
use crate::store::GraphStore;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use oxigraph::model::{Graph, NamedNode, NamedNodeRef, Term};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Identifier of an immutable provenance entity (`urn:uuid:...`).
pub type ProvenanceId = NamedNode;

/// One version of a resource as recorded in its activity graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionEntry {
    pub id: String,
    pub actor: Option<String>,
    pub time: DateTime<Utc>,
    pub previous: Option<String>,
}

pub fn new_provenance_id() -> ProvenanceId {
    NamedNode::new_unchecked(format!("{UUID_URN_PREFIX}{}", uuid::Uuid::new_v4()))
}

fn iri_value(term: Option<Term>) -> Option<String> {
    match term {
        Some(Term::NamedNode(n)) => Some(n.into_string()),
        _ => None,
    }
}

pub struct ProvenanceManager {
    provenance: Arc<dyn GraphStore>,
    references: ReferenceManager,
    queries: Arc<QueryRegistry>,
}

impl ProvenanceManager {
    pub fn new(
        provenance: Arc<dyn GraphStore>,
        references: ReferenceManager,
        queries: Arc<QueryRegistry>,
    ) -> Self {
        Self {
            provenance,
            references,
            queries,
        }
    }

    /// Stores `payload` as a new entity and makes it the current version of `resource`.
    ///
    /// When the entity graph cannot be written nothing else is touched: the resource keeps its
    /// previous version marker and the attempt is logged as lost.
    pub fn record_change(
        &self,
        resource: NamedNodeRef<'_>,
        actor: NamedNodeRef<'_>,
        payload: &Graph,
    ) -> Result<ProvenanceId> {
        let id = new_provenance_id();
        if let Err(e) = self.provenance.put_graph(id.as_ref(), payload) {
            error!("Lost provenance write for {resource}: {e}");
            return Err(e);
        }
        let activity = self
            .queries
            .provenance_activity(resource, id.as_ref(), actor, Utc::now())?;
        self.provenance.update(&activity)?;
        let marker = self
            .queries
            .set_version_identifier(resource, id.as_str())?;
        self.references.store().update(&marker)?;
        if let Err(e) = self
            .references
            .mirror_version_identifier(resource, id.as_str())
        {
            warn!("Export graph holding {resource} misses version {id} until reconciled: {e}");
        }
        debug!("Recorded {id} for {resource}");
        Ok(id)
    }

    /// Copies the activity history of `old` to `new` and deletes the old history. Not atomic.
    pub fn rename_history(&self, old: NamedNodeRef<'_>, new: NamedNodeRef<'_>) -> Result<()> {
        info!("Moving provenance history of {old} to {new}");
        self.provenance
            .update(&self.queries.rename_provenance(old, new)?)
    }

    /// The entity `prov:used` by the resource, if any version was recorded.
    pub fn current(&self, resource: NamedNodeRef<'_>) -> Result<Option<ProvenanceId>> {
        let rows = self
            .provenance
            .select(&self.queries.current_entity(resource)?)?;
        Ok(rows.into_iter().find_map(|mut row| match row.remove("entity") {
            Some(Term::NamedNode(n)) => Some(n),
            _ => None,
        }))
    }

    /// Every recorded version, newest first.
    pub fn history(&self, resource: NamedNodeRef<'_>) -> Result<Vec<VersionEntry>> {
        let rows = self
            .provenance
            .select(&self.queries.provenance_history(resource)?)?;
        let mut entries = Vec::with_capacity(rows.len());
        for mut row in rows {
            let Some(id) = iri_value(row.remove("entity")) else {
                continue;
            };
            let time = match row.remove("time") {
                Some(Term::Literal(l)) => DateTime::parse_from_rfc3339(l.value())
                    .map_err(|e| anyhow!("Invalid provenance timestamp for {id}: {e}"))?
                    .with_timezone(&Utc),
                _ => continue,
            };
            entries.push(VersionEntry {
                id,
                actor: iri_value(row.remove("actor")),
                time,
                previous: iri_value(row.remove("previous")),
            });
        }
        Ok(entries)
    }

    /// The immutable graph stored for a provenance entity.
    pub fn snapshot(&self, id: NamedNodeRef<'_>) -> Result<Graph> {
        if !id.as_str().starts_with(UUID_URN_PREFIX) {
            return Err(anyhow!(ModelError::malformed(format!(
                "{id} is not a provenance identifier"
            ))));
        }
        self.provenance.get_graph(id)
    }
}

/// A change waiting to be recorded by the background queue.
#[derive(Debug, Clone)]
pub struct ProvenanceJob {
    pub resource: NamedNode,
    pub actor: NamedNode,
    pub payload: Graph,
}

/// Counters of the background queue.
#[derive(Debug, Default)]
pub struct QueueStats {
    recorded: AtomicUsize,
    lost: AtomicUsize,
}

impl QueueStats {
    pub fn recorded(&self) -> usize {
        self.recorded.load(Ordering::SeqCst)
    }

    pub fn lost(&self) -> usize {
        self.lost.load(Ordering::SeqCst)
    }
}

pub struct ProvenanceQueue {
    senders: Mutex<Vec<Sender<ProvenanceJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    ordering: ProvenanceOrdering,
    next: AtomicUsize,
    stats: Arc<QueueStats>,
}

impl ProvenanceQueue {
    pub fn new(
        manager: Arc<ProvenanceManager>,
        workers: usize,
        ordering: ProvenanceOrdering,
    ) -> Self {
        let stats = Arc::new(QueueStats::default());
        let mut senders = Vec::new();
        let mut handles = Vec::new();
        for worker in 0..workers.max(1) {
            let (tx, rx) = channel::<ProvenanceJob>();
            let manager = manager.clone();
            let stats = stats.clone();
            handles.push(std::thread::spawn(move || {
                for job in rx {
                    match manager.record_change(
                        job.resource.as_ref(),
                        job.actor.as_ref(),
                        &job.payload,
                    ) {
                        Ok(_) => {
                            stats.recorded.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            stats.lost.fetch_add(1, Ordering::SeqCst);
                            error!(
                                "Provenance worker {worker} lost change of {}: {e}",
                                job.resource
                            );
                        }
                    }
                }
            }));
            senders.push(tx);
        }
        Self {
            senders: Mutex::new(senders),
            workers: Mutex::new(handles),
            ordering,
            next: AtomicUsize::new(0),
            stats,
        }
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    fn shard(&self, resource: &NamedNode, workers: usize) -> usize {
        match self.ordering {
            ProvenanceOrdering::PerResource => {
                let mut hasher = DefaultHasher::new();
                resource.as_str().hash(&mut hasher);
                (hasher.finish() % workers as u64) as usize
            }
            ProvenanceOrdering::Unordered => self.next.fetch_add(1, Ordering::Relaxed) % workers,
        }
    }

    /// Hands a job to a worker. Never waits on the store.
    pub fn submit(&self, job: ProvenanceJob) -> Result<()> {
        let senders = self
            .senders
            .lock()
            .map_err(|_| anyhow!("Provenance queue lock poisoned"))?;
        if senders.is_empty() {
            return Err(anyhow!("Provenance queue is shut down"));
        }
        let idx = self.shard(&job.resource, senders.len());
        senders[idx]
            .send(job)
            .map_err(|e| anyhow!("Provenance worker {idx} stopped: {}", e.0.resource))
    }

    /// Stops accepting jobs, lets the workers drain what was queued and joins them.
    pub fn shutdown(&self) {
        match self.senders.lock() {
            Ok(mut senders) => senders.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in handles {
            if handle.join().is_err() {
                error!("A provenance worker panicked");
            }
        }
    }
}

impl Drop for ProvenanceQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Front door used by mutating operations: records according to the configured mode.
pub struct ProvenanceRecorder {
    mode: ProvenanceMode,
    manager: Arc<ProvenanceManager>,
    queue: Option<ProvenanceQueue>,
}

impl ProvenanceRecorder {
    pub fn new(manager: Arc<ProvenanceManager>, config: &Config) -> Self {
        let queue = match config.provenance {
            ProvenanceMode::Background => Some(ProvenanceQueue::new(
                manager.clone(),
                config.provenance_workers,
                config.provenance_ordering,
            )),
            _ => None,
        };
        Self {
            mode: config.provenance,
            manager,
            queue,
        }
    }

    pub fn mode(&self) -> ProvenanceMode {
        self.mode
    }

    pub fn manager(&self) -> &Arc<ProvenanceManager> {
        &self.manager
    }

    pub fn queue(&self) -> Option<&ProvenanceQueue> {
        self.queue.as_ref()
    }

    /// Returns the new version id when recorded synchronously, `None` otherwise.
    pub fn record(
        &self,
        resource: NamedNodeRef<'_>,
        actor: NamedNodeRef<'_>,
        payload: &Graph,
    ) -> Result<Option<ProvenanceId>> {
        match (self.mode, &self.queue) {
            (ProvenanceMode::Disabled, _) => Ok(None),
            (ProvenanceMode::Background, Some(queue)) => {
                queue.submit(ProvenanceJob {
                    resource: resource.into_owned(),
                    actor: actor.into_owned(),
                    payload: payload.clone(),
                })?;
                Ok(None)
            }
            _ => self
                .manager
                .record_change(resource, actor, payload)
                .map(Some),
        }
    }

    /// Moves history along with a renamed resource. Runs inline in every enabled mode.
    pub fn rename(&self, old: NamedNodeRef<'_>, new: NamedNodeRef<'_>) -> Result<()> {
        if !self.mode.is_enabled() {
            return Ok(());
        }
        self.manager.rename_history(old, new)
    }

    /// Drains and stops the background queue. Later background records fail.
    pub fn shutdown(&self) {
        if let Some(queue) = &self.queue {
            queue.shutdown();
        }
    }
}
