//! Narrow interfaces to the services this library consults but does not own: the terminology
//! service resolving SKOS concepts and the organization directory.

use crate::config::Config;
use crate::errors::ModelError;
use crate::util::parse_graph;
use anyhow::{anyhow, Result};
use log::debug;
use oxigraph::io::RdfFormat;
use oxigraph::model::{Graph, NamedNode, NamedNodeRef};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use std::collections::HashMap;
use url::Url;

/// Resolves a concept IRI to its SKOS description.
pub trait ConceptResolver: Send + Sync {
    fn resolve_concept(&self, concept: NamedNodeRef<'_>) -> Result<Graph>;
}

/// Lists the organizations models can be attributed to, as a FOAF graph.
pub trait OrganizationDirectory: Send + Sync {
    fn organizations(&self) -> Result<Graph>;
}

/// GET with Turtle content negotiation; any transport problem is an upstream failure and a
/// 404 becomes `NotFound` for `subject`.
fn get_turtle(client: &Client, service: &str, url: Url, subject: &str) -> Result<Graph> {
    debug!("Fetching {url} from {service}");
    let response = client
        .get(url)
        .header(ACCEPT, "text/turtle")
        .send()
        .map_err(|e| anyhow!(ModelError::upstream(service, e)))?;
    if response.status() == StatusCode::NOT_FOUND {
        return Err(anyhow!(ModelError::NotFound(subject.to_string())));
    }
    if !response.status().is_success() {
        return Err(anyhow!(ModelError::upstream(
            service,
            format!("status {}", response.status())
        )));
    }
    let bytes = response
        .bytes()
        .map_err(|e| anyhow!(ModelError::upstream(service, e)))?;
    parse_graph(&bytes, RdfFormat::Turtle)
}

fn client(config: &Config, service: &str) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.read_timeout())
        .build()
        .map_err(|e| anyhow!(ModelError::upstream(service, e)))
}

/// A bad configured URL is an input error, not an outage.
fn base_url(base: &str, service: &str) -> Result<Url> {
    Url::parse(base).map_err(|e| {
        anyhow!(ModelError::malformed(format!(
            "Invalid {service} service URL {base}: {e}"
        )))
    })
}

/// Terminology service answering `GET {base}?uri=<concept>`.
pub struct HttpConceptResolver {
    client: Client,
    base: Url,
}

impl HttpConceptResolver {
    const SERVICE: &'static str = "terminology";

    pub fn new(base: &str, config: &Config) -> Result<Self> {
        Ok(Self {
            client: client(config, Self::SERVICE)?,
            base: base_url(base, Self::SERVICE)?,
        })
    }
}

impl ConceptResolver for HttpConceptResolver {
    fn resolve_concept(&self, concept: NamedNodeRef<'_>) -> Result<Graph> {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("uri", concept.as_str());
        get_turtle(&self.client, Self::SERVICE, url, concept.as_str())
    }
}

pub struct HttpOrganizationDirectory {
    client: Client,
    base: Url,
}

impl HttpOrganizationDirectory {
    const SERVICE: &'static str = "organizations";

    pub fn new(base: &str, config: &Config) -> Result<Self> {
        Ok(Self {
            client: client(config, Self::SERVICE)?,
            base: base_url(base, Self::SERVICE)?,
        })
    }
}

impl OrganizationDirectory for HttpOrganizationDirectory {
    fn organizations(&self) -> Result<Graph> {
        get_turtle(
            &self.client,
            Self::SERVICE,
            self.base.clone(),
            self.base.as_str(),
        )
    }
}

/// Fixed set of concepts, used when no terminology service is configured.
#[derive(Debug, Default, Clone)]
pub struct StaticConceptResolver {
    concepts: HashMap<NamedNode, Graph>,
}

impl StaticConceptResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concept(mut self, concept: NamedNode, graph: Graph) -> Self {
        self.concepts.insert(concept, graph);
        self
    }
}

impl ConceptResolver for StaticConceptResolver {
    fn resolve_concept(&self, concept: NamedNodeRef<'_>) -> Result<Graph> {
        self.concepts
            .get(&concept.into_owned())
            .cloned()
            .ok_or_else(|| anyhow!(ModelError::NotFound(concept.as_str().to_string())))
    }
}

#[derive(Debug, Clone)]
pub struct StaticOrganizationDirectory {
    graph: Graph,
}

impl StaticOrganizationDirectory {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }
}

impl OrganizationDirectory for StaticOrganizationDirectory {
    fn organizations(&self) -> Result<Graph> {
        Ok(self.graph.clone())
    }
}
