//! Graph store client: named-graph CRUD plus SPARQL query and update execution.
//!
//! Two backends implement [`GraphStore`]: an in-process oxigraph store used for tests and
//! offline work, and an HTTP client speaking the SPARQL 1.1 Graph Store Protocol to a remote
//! dataset. The rest of the library only sees the trait.

use crate::config::Config;
use crate::errors::ModelError;
use crate::sparql::{BoundQuery, QueryKind};
use crate::util::{parse_graph, to_ntriples};
use anyhow::{anyhow, Result};
use log::{debug, warn};
use oxigraph::io::RdfFormat;
use oxigraph::model::{
    BlankNode, Graph, GraphNameRef, Literal, NamedNode, NamedNodeRef, Quad, Term,
};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use url::Url;

/// One SELECT solution, keyed by variable name. Unbound variables are absent.
pub type Row = BTreeMap<String, Term>;

pub trait GraphStore: Send + Sync {
    /// Returns the type of the store ("memory", "http")
    fn store_type(&self) -> String;

    /// Short name of the dataset used in logs and errors ("core", "provenance", ...)
    fn label(&self) -> &str;

    /// Returns the graph, or `None` when it does not exist or is empty.
    fn try_get_graph(&self, graph: NamedNodeRef<'_>) -> Result<Option<Graph>>;

    /// Replaces the graph contents.
    fn put_graph(&self, graph: NamedNodeRef<'_>, content: &Graph) -> Result<()>;

    /// Adds triples to the graph, creating it if needed.
    fn add_to_graph(&self, graph: NamedNodeRef<'_>, content: &Graph) -> Result<()>;

    /// Deletes the graph. Deleting a missing graph is not an error.
    fn delete_graph(&self, graph: NamedNodeRef<'_>) -> Result<()>;

    fn ask(&self, query: &BoundQuery) -> Result<bool>;

    fn select(&self, query: &BoundQuery) -> Result<Vec<Row>>;

    fn construct(&self, query: &BoundQuery) -> Result<Graph>;

    fn update(&self, update: &BoundQuery) -> Result<()>;

    /// Returns the graph or a [`ModelError::NotFound`].
    fn get_graph(&self, graph: NamedNodeRef<'_>) -> Result<Graph> {
        self.try_get_graph(graph)?
            .ok_or_else(|| anyhow!(ModelError::NotFound(graph.as_str().to_string())))
    }

    /// A graph exists when it holds at least one triple.
    fn graph_exists(&self, graph: NamedNodeRef<'_>) -> Result<bool> {
        Ok(self.try_get_graph(graph)?.is_some())
    }

    /// Read helper: store failures read as an empty result.
    fn select_or_empty(&self, query: &BoundQuery) -> Vec<Row> {
        match self.select(query) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("SELECT against {} failed, treating as empty: {e}", self.label());
                Vec::new()
            }
        }
    }
}

fn expect_kind(query: &BoundQuery, kind: QueryKind) -> Result<()> {
    if query.kind() != kind {
        return Err(anyhow!(
            "Expected a {:?} query but got {:?}",
            kind,
            query.kind()
        ));
    }
    Ok(())
}

/// In-process store backed by an oxigraph [`Store`].
pub struct MemoryGraphStore {
    label: String,
    store: Store,
}

impl MemoryGraphStore {
    pub fn new(label: impl Into<String>) -> Result<Self> {
        Ok(Self {
            label: label.into(),
            store: Store::new()?,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Names of every non-empty named graph, sorted.
    pub fn graph_names(&self) -> Result<Vec<NamedNode>> {
        let mut names = Vec::new();
        for name in self.store.named_graphs() {
            if let oxigraph::model::NamedOrBlankNode::NamedNode(n) = name? {
                names.push(n);
            }
        }
        names.sort();
        Ok(names)
    }

    fn load(&self, graph: NamedNodeRef<'_>, content: &Graph) -> Result<()> {
        let name = graph.into_owned();
        let mut loader = self.store.bulk_loader();
        loader.load_quads(
            content
                .iter()
                .map(|t| Quad::new(t.subject, t.predicate, t.object, name.clone())),
        )?;
        loader.commit()?;
        Ok(())
    }
}

#[allow(deprecated)]
impl GraphStore for MemoryGraphStore {
    fn store_type(&self) -> String {
        "memory".to_string()
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn try_get_graph(&self, graph: NamedNodeRef<'_>) -> Result<Option<Graph>> {
        let mut out = Graph::new();
        for quad in self
            .store
            .quads_for_pattern(None, None, None, Some(GraphNameRef::NamedNode(graph)))
        {
            out.insert(quad?.as_ref());
        }
        Ok(if out.is_empty() { None } else { Some(out) })
    }

    fn put_graph(&self, graph: NamedNodeRef<'_>, content: &Graph) -> Result<()> {
        debug!("PUT {} triples into {graph} ({})", content.len(), self.label);
        self.store.remove_named_graph(graph)?;
        self.load(graph, content)
    }

    fn add_to_graph(&self, graph: NamedNodeRef<'_>, content: &Graph) -> Result<()> {
        debug!("POST {} triples into {graph} ({})", content.len(), self.label);
        self.load(graph, content)
    }

    fn delete_graph(&self, graph: NamedNodeRef<'_>) -> Result<()> {
        debug!("DELETE {graph} ({})", self.label);
        self.store.remove_named_graph(graph)?;
        Ok(())
    }

    fn ask(&self, query: &BoundQuery) -> Result<bool> {
        expect_kind(query, QueryKind::Ask)?;
        match self.store.query(query.as_str())? {
            QueryResults::Boolean(answer) => Ok(answer),
            _ => Err(anyhow!("ASK did not return a boolean")),
        }
    }

    fn select(&self, query: &BoundQuery) -> Result<Vec<Row>> {
        expect_kind(query, QueryKind::Select)?;
        let QueryResults::Solutions(solutions) = self.store.query(query.as_str())? else {
            return Err(anyhow!("SELECT did not return solutions"));
        };
        let mut rows = Vec::new();
        for solution in solutions {
            let solution = solution?;
            let row: Row = solution
                .iter()
                .map(|(var, term)| (var.as_str().to_string(), term.clone()))
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }

    fn construct(&self, query: &BoundQuery) -> Result<Graph> {
        expect_kind(query, QueryKind::Construct)?;
        let QueryResults::Graph(triples) = self.store.query(query.as_str())? else {
            return Err(anyhow!("CONSTRUCT did not return a graph"));
        };
        let mut graph = Graph::new();
        for triple in triples {
            graph.insert(&triple?);
        }
        Ok(graph)
    }

    fn update(&self, update: &BoundQuery) -> Result<()> {
        expect_kind(update, QueryKind::Update)?;
        debug!("UPDATE against {}", self.label);
        self.store.update(update.as_str())?;
        Ok(())
    }
}

/// SPARQL JSON results document.
#[derive(Debug, Deserialize)]
struct SparqlResults {
    boolean: Option<bool>,
    results: Option<SparqlBindings>,
}

#[derive(Debug, Deserialize)]
struct SparqlBindings {
    bindings: Vec<HashMap<String, SparqlValue>>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
    datatype: Option<String>,
}

impl SparqlValue {
    fn into_term(self) -> Result<Term> {
        Ok(match self.kind.as_str() {
            "uri" => NamedNode::new(&self.value)?.into(),
            "bnode" => BlankNode::new(&self.value)
                .map_err(|e| anyhow!("Invalid blank node id {}: {e}", self.value))?
                .into(),
            "literal" | "typed-literal" => match (self.lang, self.datatype) {
                (Some(lang), _) => Literal::new_language_tagged_literal(self.value, lang)?.into(),
                (None, Some(dt)) => Literal::new_typed_literal(self.value, NamedNode::new(dt)?).into(),
                (None, None) => Literal::new_simple_literal(self.value).into(),
            },
            other => return Err(anyhow!("Unknown SPARQL result term type {other}")),
        })
    }
}

/// Client for a remote dataset exposing `data`, `sparql` and `update` endpoints under one base
/// URL (the Fuseki layout).
pub struct HttpGraphStore {
    label: String,
    base: Url,
    client: Client,
}

impl HttpGraphStore {
    pub fn new(label: impl Into<String>, base: &str, config: &Config) -> Result<Self> {
        let label = label.into();
        let normalized = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| ModelError::malformed(format!("Invalid {label} endpoint {base}: {e}")))?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()?;
        Ok(Self {
            label,
            base,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn data_url(&self, graph: NamedNodeRef<'_>) -> Result<Url> {
        let mut url = self.endpoint("data")?;
        url.query_pairs_mut().append_pair("graph", graph.as_str());
        Ok(url)
    }

    fn unavailable(&self, reason: impl ToString) -> anyhow::Error {
        anyhow!(ModelError::upstream(self.label.clone(), reason))
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<Response> {
        request.send().map_err(|e| self.unavailable(e))
    }

    fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(self.unavailable(format!("HTTP {status}: {}", body.trim())))
    }

    fn query_results(&self, query: &BoundQuery) -> Result<SparqlResults> {
        let request = self
            .client
            .post(self.endpoint("sparql")?)
            .header(ACCEPT, "application/sparql-results+json")
            .form(&[("query", query.as_str())]);
        let response = self.check(self.send(request)?)?;
        response
            .json::<SparqlResults>()
            .map_err(|e| self.unavailable(format!("Unreadable SPARQL results: {e}")))
    }

    fn write(&self, method: reqwest::Method, graph: NamedNodeRef<'_>, content: &Graph) -> Result<()> {
        debug!("{method} {} triples into {graph} ({})", content.len(), self.label);
        let request = self
            .client
            .request(method, self.data_url(graph)?)
            .header(CONTENT_TYPE, "application/n-triples")
            .body(to_ntriples(content)?);
        self.check(self.send(request)?)?;
        Ok(())
    }
}

impl GraphStore for HttpGraphStore {
    fn store_type(&self) -> String {
        "http".to_string()
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn try_get_graph(&self, graph: NamedNodeRef<'_>) -> Result<Option<Graph>> {
        let request = self
            .client
            .get(self.data_url(graph)?)
            .header(ACCEPT, "text/turtle");
        let response = self.send(request)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.check(response)?;
        let bytes = response.bytes().map_err(|e| self.unavailable(e))?;
        let parsed = parse_graph(&bytes, RdfFormat::Turtle)?;
        Ok(if parsed.is_empty() { None } else { Some(parsed) })
    }

    fn put_graph(&self, graph: NamedNodeRef<'_>, content: &Graph) -> Result<()> {
        self.write(reqwest::Method::PUT, graph, content)
    }

    fn add_to_graph(&self, graph: NamedNodeRef<'_>, content: &Graph) -> Result<()> {
        self.write(reqwest::Method::POST, graph, content)
    }

    fn delete_graph(&self, graph: NamedNodeRef<'_>) -> Result<()> {
        debug!("DELETE {graph} ({})", self.label);
        let response = self.send(self.client.delete(self.data_url(graph)?))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.check(response)?;
        Ok(())
    }

    fn ask(&self, query: &BoundQuery) -> Result<bool> {
        expect_kind(query, QueryKind::Ask)?;
        self.query_results(query)?
            .boolean
            .ok_or_else(|| self.unavailable("ASK response carried no boolean"))
    }

    fn select(&self, query: &BoundQuery) -> Result<Vec<Row>> {
        expect_kind(query, QueryKind::Select)?;
        let results = self
            .query_results(query)?
            .results
            .ok_or_else(|| self.unavailable("SELECT response carried no bindings"))?;
        results
            .bindings
            .into_iter()
            .map(|binding| {
                binding
                    .into_iter()
                    .map(|(var, value)| Ok((var, value.into_term()?)))
                    .collect::<Result<Row>>()
            })
            .collect()
    }

    fn construct(&self, query: &BoundQuery) -> Result<Graph> {
        expect_kind(query, QueryKind::Construct)?;
        let request = self
            .client
            .post(self.endpoint("sparql")?)
            .header(ACCEPT, "application/n-triples")
            .form(&[("query", query.as_str())]);
        let response = self.check(self.send(request)?)?;
        let bytes = response.bytes().map_err(|e| self.unavailable(e))?;
        parse_graph(&bytes, RdfFormat::NTriples)
    }

    fn update(&self, update: &BoundQuery) -> Result<()> {
        expect_kind(update, QueryKind::Update)?;
        debug!("UPDATE against {}", self.label);
        let request = self
            .client
            .post(self.endpoint("update")?)
            .form(&[("update", update.as_str())]);
        self.check(self.send(request)?)?;
        Ok(())
    }
}

/// The four datasets the library talks to.
#[derive(Clone)]
pub struct Stores {
    pub core: Arc<dyn GraphStore>,
    pub provenance: Arc<dyn GraphStore>,
    pub imports: Arc<dyn GraphStore>,
    pub scheme: Arc<dyn GraphStore>,
}

impl Stores {
    /// Builds an HTTP store for each configured endpoint and an in-memory store for the rest.
    pub fn from_config(config: &Config) -> Result<Self> {
        let open = |label: &str, endpoint: &Option<String>| -> Result<Arc<dyn GraphStore>> {
            Ok(match endpoint {
                Some(url) => Arc::new(HttpGraphStore::new(label, url, config)?),
                None => Arc::new(MemoryGraphStore::new(label)?),
            })
        };
        Ok(Stores {
            core: open("core", &config.endpoints.core)?,
            provenance: open("provenance", &config.endpoints.provenance)?,
            imports: open("imports", &config.endpoints.imports)?,
            scheme: open("scheme", &config.endpoints.scheme)?,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Stores::from_config(&Config::in_memory())
    }
}
