//! Resolution of externally referenced namespaces.
//!
//! A namespace IRI is dereferenced with conservative content negotiation: one request with a
//! weighted `Accept` header, then `Link` alternates and common file-extension rewrites when the
//! server answers with HTML or an unknown media type. The format is taken from the
//! `Content-Type`, the URL extension or, as a last resort, by sniffing the payload. Parsed
//! graphs are cached in the imports dataset under the namespace IRI. Network problems never
//! surface as errors; the namespace simply stays unresolved.

use crate::config::Config;
use crate::errors::ModelError;
use crate::store::GraphStore;
use crate::util::{parse_graph, parse_iri};
use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use oxigraph::io::RdfFormat;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LINK};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use url::Url;

const ACCEPT_ORDER: &[&str] = &[
    "text/turtle",
    "application/rdf+xml",
    "application/ld+json",
    "application/n-triples",
];

const EXTENSIONS: &[&str] = &[".ttl", ".rdf", ".owl", ".jsonld", ".nt"];

/// Upper bound on requests spent on one namespace.
const MAX_ATTEMPTS: usize = 8;

/// Outcome of resolving a namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Already present in the imports dataset.
    Cached,
    /// Downloaded, parsed and cached.
    Fetched {
        triples: usize,
        format: RdfFormat,
        source: String,
    },
    Unresolved(String),
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::Unresolved(_))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Cached => write!(f, "cached"),
            Resolution::Fetched {
                triples,
                format,
                source,
            } => write!(f, "fetched {triples} triples as {} from {source}", format.name()),
            Resolution::Unresolved(reason) => write!(f, "unresolved: {reason}"),
        }
    }
}

/// Weighted `Accept` header following the given priority order.
fn accept_header(order: &[&str]) -> String {
    let mut parts: Vec<String> = order
        .iter()
        .enumerate()
        .map(|(i, media)| {
            let q = (1.0f32 - 0.1 * i as f32).max(0.1);
            format!("{media}; q={q:.1}")
        })
        .collect();
    parts.push("*/*; q=0.05".to_string());
    parts.join(", ")
}

fn format_from_url(url: &str) -> Option<RdfFormat> {
    let path = url.split(['#', '?']).next().unwrap_or(url);
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(RdfFormat::from_extension)
}

/// Guesses the serialization from the first bytes of a payload.
fn sniff_format(bytes: &[u8]) -> Option<RdfFormat> {
    let sample = String::from_utf8_lossy(&bytes[..bytes.len().min(4096)]);
    let trimmed = sample.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return sample.contains("@context").then_some(RdfFormat::JsonLd {
            profile: Default::default(),
        });
    }
    if trimmed.starts_with('<') && (sample.contains("<rdf:RDF") || sample.contains("xmlns:rdf"))
    {
        return Some(RdfFormat::RdfXml);
    }
    if sample.contains("@prefix") || sample.contains("PREFIX ") || sample.contains("@base") {
        return Some(RdfFormat::Turtle);
    }
    if trimmed.starts_with('<') && trimmed.lines().next().is_some_and(|l| l.ends_with(" .")) {
        return Some(RdfFormat::NTriples);
    }
    None
}

fn looks_like_html(content_type: Option<&str>, bytes: &[u8]) -> bool {
    if content_type.is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.contains("text/html") || ct.contains("application/xhtml")
    }) {
        return true;
    }
    let snippet = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_ascii_lowercase();
    snippet.contains("<html") || snippet.contains("<!doctype html")
}

/// `rel="alternate"` targets of a `Link` header that advertise an RDF media type.
fn link_alternates(link: &str) -> Vec<String> {
    link.split(',')
        .filter_map(|part| {
            let lower = part.to_ascii_lowercase();
            let alternate =
                lower.contains("rel=\"alternate\"") || lower.contains("rel='alternate'");
            let rdf = ACCEPT_ORDER.iter().any(|media| lower.contains(media));
            if !(alternate && rdf) {
                return None;
            }
            let start = part.find('<')?;
            let end = part[start + 1..].find('>')?;
            Some(part[start + 1..start + 1 + end].to_string())
        })
        .collect()
}

/// URL variants with common RDF file extensions.
fn extension_candidates(url: &str) -> Vec<String> {
    let base = url.trim_end_matches(['#', '/']);
    let stem = match base.rfind('/') {
        Some(slash) => match base[slash..].rfind('.') {
            Some(dot) => &base[..slash + dot],
            None => base,
        },
        None => base,
    };
    EXTENSIONS.iter().map(|ext| format!("{stem}{ext}")).collect()
}

struct Download {
    bytes: Vec<u8>,
    format: Option<RdfFormat>,
    url: String,
    html: bool,
    link: Option<String>,
}

pub struct NamespaceResolver {
    imports: Arc<dyn GraphStore>,
    client: Client,
    offline: bool,
}

impl NamespaceResolver {
    pub fn new(imports: Arc<dyn GraphStore>, config: &Config) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| anyhow!(ModelError::upstream("namespace resolver", e)))?;
        Ok(Self {
            imports,
            client,
            offline: config.offline,
        })
    }

    fn download(&self, url: &str, accept: &str) -> Result<Download> {
        let response = self.client.get(url).header(ACCEPT, accept).send()?;
        if !response.status().is_success() {
            return Err(anyhow!("{url} answered {}", response.status()));
        }
        let final_url = response.url().to_string();
        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let link = header(LINK);
        let bytes = response.bytes()?.to_vec();
        let html = looks_like_html(content_type.as_deref(), &bytes);
        let format = content_type
            .as_deref()
            .and_then(|ct| RdfFormat::from_media_type(ct.trim()))
            .or_else(|| format_from_url(&final_url))
            .or_else(|| sniff_format(&bytes));
        Ok(Download {
            bytes,
            format,
            url: final_url,
            html,
            link,
        })
    }

    /// Tries the namespace URL and its alternates until one yields RDF.
    fn fetch(&self, url: &str) -> std::result::Result<(Vec<u8>, RdfFormat, String), String> {
        let accept = accept_header(ACCEPT_ORDER);
        let mut queue = VecDeque::from([url.to_string()]);
        let mut seen = HashSet::new();
        let mut last_error = format!("no RDF found at {url}");
        let mut attempts = 0;
        while let Some(candidate) = queue.pop_front() {
            if attempts >= MAX_ATTEMPTS {
                break;
            }
            if !seen.insert(candidate.clone()) {
                continue;
            }
            attempts += 1;
            let download = match self.download(&candidate, &accept) {
                Ok(d) => d,
                Err(e) => {
                    debug!("Fetching {candidate} failed: {e}");
                    last_error = e.to_string();
                    continue;
                }
            };
            if let (Some(format), false) = (download.format, download.html) {
                return Ok((download.bytes, format, download.url));
            }
            if let Some(link) = &download.link {
                for alternate in link_alternates(link) {
                    let resolved = Url::parse(&download.url)
                        .and_then(|base| base.join(&alternate))
                        .map(|u| u.to_string())
                        .unwrap_or(alternate);
                    queue.push_back(resolved);
                }
            }
            queue.extend(extension_candidates(&download.url));
        }
        Err(last_error)
    }

    /// Resolves a namespace, using the cached copy when there is one.
    ///
    /// Only a malformed namespace IRI is an error; everything else ends in a [`Resolution`].
    pub fn resolve(&self, namespace: &str) -> Result<Resolution> {
        let iri = parse_iri(namespace)?;
        match self.imports.graph_exists(iri.as_ref()) {
            Ok(true) => return Ok(Resolution::Cached),
            Ok(false) => {}
            Err(e) => warn!("Could not check the import cache for {iri}: {e}"),
        }
        if self.offline {
            return Ok(Resolution::Unresolved("offline mode".to_string()));
        }
        let url = iri.as_str().trim_end_matches('#');
        let (bytes, format, source) = match self.fetch(url) {
            Ok(found) => found,
            Err(reason) => {
                warn!("Namespace {iri} stays unresolved: {reason}");
                return Ok(Resolution::Unresolved(reason));
            }
        };
        let graph = match parse_graph(&bytes, format) {
            Ok(graph) => graph,
            Err(e) => {
                warn!("Namespace {iri} from {source} did not parse: {e}");
                return Ok(Resolution::Unresolved(e.to_string()));
            }
        };
        if let Err(e) = self.imports.put_graph(iri.as_ref(), &graph) {
            warn!("Could not cache namespace {iri}: {e}");
            return Ok(Resolution::Unresolved(e.to_string()));
        }
        info!("Resolved namespace {iri}: {} triples from {source}", graph.len());
        Ok(Resolution::Fetched {
            triples: graph.len(),
            format,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGraphStore;
    use oxigraph::model::{Graph, NamedNodeRef, Triple};

    #[test]
    fn test_accept_header_weights() {
        let header = accept_header(ACCEPT_ORDER);
        assert!(header.starts_with("text/turtle; q=1.0, application/rdf+xml; q=0.9"));
        assert!(header.ends_with("*/*; q=0.05"));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            format_from_url("http://ex.org/onto.ttl?x=1"),
            Some(RdfFormat::Turtle)
        );
        assert_eq!(
            sniff_format(b"@prefix ex: <http://ex.org/> ."),
            Some(RdfFormat::Turtle)
        );
        assert_eq!(
            sniff_format(b"<?xml version=\"1.0\"?><rdf:RDF xmlns:rdf=\"x\">"),
            Some(RdfFormat::RdfXml)
        );
        assert_eq!(sniff_format(b"hello"), None);
        assert!(looks_like_html(Some("text/html; charset=utf-8"), b""));
        assert!(looks_like_html(None, b"<!DOCTYPE html><html>"));
    }

    #[test]
    fn test_alternates_and_extensions() {
        let link = r#"<onto.ttl>; rel="alternate"; type="text/turtle", <about>; rel="author""#;
        assert_eq!(link_alternates(link), vec!["onto.ttl".to_string()]);
        let candidates = extension_candidates("http://ex.org/ns/onto.html");
        assert_eq!(candidates[0], "http://ex.org/ns/onto.ttl");
        let candidates = extension_candidates("http://ex.org/ns#");
        assert_eq!(candidates[0], "http://ex.org/ns.ttl");
    }

    #[test]
    fn test_cached_and_offline() -> Result<()> {
        let imports = Arc::new(MemoryGraphStore::new("imports")?);
        let config = Config {
            offline: true,
            ..Config::default()
        };
        let resolver = NamespaceResolver::new(imports.clone(), &config)?;

        let missing = resolver.resolve("http://ex.org/missing#")?;
        assert!(matches!(missing, Resolution::Unresolved(_)));

        let ns = NamedNodeRef::new("http://ex.org/cached#")?;
        let mut graph = Graph::new();
        graph.insert(&Triple::new(ns, crate::consts::TYPE, crate::consts::ONTOLOGY));
        imports.put_graph(ns, &graph)?;
        assert_eq!(resolver.resolve(ns.as_str())?, Resolution::Cached);

        assert!(resolver.resolve("not an iri").is_err());
        Ok(())
    }
}
