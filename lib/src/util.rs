use crate::consts::*;
use crate::errors::ModelError;
use crate::sparql::PrefixMap;
use anyhow::{anyhow, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::Path;

use oxigraph::io::{JsonLdProfileSet, RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::{
    BlankNodeRef, Graph, Literal, NamedNode, NamedNodeRef, NamedOrBlankNodeRef, Term, TermRef,
    Triple,
};

use log::debug;

/// Maps a user-facing format name or media type (`turtle`, `application/ld+json`, ...) to an
/// oxigraph [`RdfFormat`].
pub fn format_from_name(name: &str) -> Option<RdfFormat> {
    match name.trim().to_ascii_lowercase().as_str() {
        "turtle" | "ttl" => Some(RdfFormat::Turtle),
        "rdfxml" | "rdf/xml" | "rdf" | "xml" => Some(RdfFormat::RdfXml),
        "ntriples" | "n-triples" | "nt" => Some(RdfFormat::NTriples),
        "jsonld" | "json-ld" => Some(RdfFormat::JsonLd {
            profile: JsonLdProfileSet::default(),
        }),
        other => RdfFormat::from_media_type(other).or_else(|| RdfFormat::from_extension(other)),
    }
}

/// Guesses the serialization of a file from its extension, defaulting to Turtle.
pub fn format_from_path(path: &Path) -> RdfFormat {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| match ext {
            "n3" => Some(RdfFormat::Turtle),
            "xml" | "owl" => Some(RdfFormat::RdfXml),
            other => RdfFormat::from_extension(other),
        })
        .unwrap_or(RdfFormat::Turtle)
}

/// Parses bytes into an in-memory graph; quads in named graphs are folded into it.
pub fn parse_graph(bytes: &[u8], format: RdfFormat) -> Result<Graph> {
    let parser = RdfParser::from_format(format);
    let mut graph = Graph::new();
    for quad in parser.for_reader(std::io::Cursor::new(bytes)) {
        let quad = quad.map_err(|e| ModelError::malformed(format!("Invalid RDF payload: {e}")))?;
        let triple = Triple::new(quad.subject, quad.predicate, quad.object);
        graph.insert(&triple);
    }
    Ok(graph)
}

pub fn read_file(file: &Path) -> Result<Graph> {
    debug!("Reading file: {}", file.display());
    let format = format_from_path(file);
    let reader = BufReader::new(std::fs::File::open(file)?);
    let mut graph = Graph::new();
    for quad in RdfParser::from_format(format).for_reader(reader) {
        let quad = quad?;
        let triple = Triple::new(quad.subject, quad.predicate, quad.object);
        graph.insert(&triple);
    }
    Ok(graph)
}

/// Serializes a graph, declaring the standard prefixes for formats that support them.
pub fn serialize_graph(graph: &Graph, format: RdfFormat, prefixes: &PrefixMap) -> Result<Vec<u8>> {
    let mut serializer = RdfSerializer::from_format(format);
    if matches!(format, RdfFormat::Turtle | RdfFormat::RdfXml) {
        for (prefix, ns) in prefixes.iter() {
            serializer = serializer
                .with_prefix(prefix, ns)
                .map_err(|e| anyhow!("Invalid prefix {prefix}: {e}"))?;
        }
    }
    let mut writer = serializer.for_writer(Vec::new());
    for triple in graph.iter() {
        writer.serialize_triple(triple)?;
    }
    Ok(writer.finish()?)
}

/// N-Triples rendering used for graph-store uploads.
pub fn to_ntriples(graph: &Graph) -> Result<Vec<u8>> {
    let mut writer = RdfSerializer::from_format(RdfFormat::NTriples).for_writer(Vec::new());
    for triple in graph.iter() {
        writer.serialize_triple(triple)?;
    }
    Ok(writer.finish()?)
}

fn derived_graph(model: NamedNodeRef<'_>, suffix: &str) -> Result<NamedNode> {
    NamedNode::new(format!("{}{}", model.as_str(), suffix)).map_err(|e| {
        ModelError::malformed(format!("Cannot derive graph name from {model}: {e}")).into()
    })
}

/// `<model>#HasPartGraph`
pub fn has_part_graph(model: NamedNodeRef<'_>) -> Result<NamedNode> {
    derived_graph(model, HAS_PART_GRAPH_SUFFIX)
}

/// `<model>#ExportGraph`
pub fn export_graph(model: NamedNodeRef<'_>) -> Result<NamedNode> {
    derived_graph(model, EXPORT_GRAPH_SUFFIX)
}

/// `<model>#PositionGraph`
pub fn position_graph(model: NamedNodeRef<'_>) -> Result<NamedNode> {
    derived_graph(model, POSITION_GRAPH_SUFFIX)
}

/// Builds the IRI of a resource inside a model namespace. A namespace ending in `/` or `#` is
/// concatenated with the local name, anything else gets a `#` fragment.
pub fn resource_iri(namespace: &str, local_name: &str) -> Result<NamedNode> {
    let iri = if namespace.ends_with('/') || namespace.ends_with('#') {
        format!("{namespace}{local_name}")
    } else {
        format!("{namespace}#{local_name}")
    };
    NamedNode::new(&iri)
        .map_err(|e| ModelError::malformed(format!("Invalid resource IRI {iri}: {e}")).into())
}

/// The part of an IRI after its last `#` or `/`.
pub fn local_name(iri: &str) -> &str {
    let trimmed = iri.trim_end_matches(['/', '#']);
    match trimmed.rfind(['#', '/', ':']) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Typed accessors over an in-memory graph, tolerant of absent values.
pub trait GraphExt {
    fn first_object<'a>(
        &'a self,
        subject: NamedOrBlankNodeRef<'a>,
        predicate: NamedNodeRef<'a>,
    ) -> Option<TermRef<'a>>;

    fn objects<'a>(
        &'a self,
        subject: NamedOrBlankNodeRef<'a>,
        predicate: NamedNodeRef<'a>,
    ) -> Vec<TermRef<'a>>;

    fn has_type(&self, subject: NamedOrBlankNodeRef<'_>, class: NamedNodeRef<'_>) -> bool;

    /// Lexical value of the first literal object.
    fn first_literal(
        &self,
        subject: NamedOrBlankNodeRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> Option<String> {
        self.objects(subject, predicate)
            .into_iter()
            .find_map(|o| match o {
                TermRef::Literal(l) => Some(l.value().to_string()),
                _ => None,
            })
    }

    /// Language-tagged literals keyed by language; untagged values are ignored.
    fn lang_map(
        &self,
        subject: NamedOrBlankNodeRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> BTreeMap<String, String> {
        self.objects(subject, predicate)
            .into_iter()
            .filter_map(|o| match o {
                TermRef::Literal(l) => l
                    .language()
                    .map(|lang| (lang.to_string(), l.value().to_string())),
                _ => None,
            })
            .collect()
    }

    fn first_iri(
        &self,
        subject: NamedOrBlankNodeRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> Option<NamedNode> {
        self.objects(subject, predicate)
            .into_iter()
            .find_map(|o| match o {
                TermRef::NamedNode(n) => Some(n.into_owned()),
                _ => None,
            })
    }

    /// Every IRI object, sorted for reproducible output.
    fn iri_objects(
        &self,
        subject: NamedOrBlankNodeRef<'_>,
        predicate: NamedNodeRef<'_>,
    ) -> Vec<NamedNode> {
        let mut out: Vec<NamedNode> = self
            .objects(subject, predicate)
            .into_iter()
            .filter_map(|o| match o {
                TermRef::NamedNode(n) => Some(n.into_owned()),
                _ => None,
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    fn integer(&self, subject: NamedOrBlankNodeRef<'_>, predicate: NamedNodeRef<'_>) -> Option<i64> {
        self.first_literal(subject, predicate)
            .and_then(|v| v.trim().parse::<i64>().ok())
    }

    /// Members of an RDF collection starting at `head`, in list order.
    fn list_items(&self, head: TermRef<'_>) -> Vec<Term>;
}

impl GraphExt for Graph {
    fn first_object<'a>(
        &'a self,
        subject: NamedOrBlankNodeRef<'a>,
        predicate: NamedNodeRef<'a>,
    ) -> Option<TermRef<'a>> {
        self.object_for_subject_predicate(subject, predicate)
    }

    fn objects<'a>(
        &'a self,
        subject: NamedOrBlankNodeRef<'a>,
        predicate: NamedNodeRef<'a>,
    ) -> Vec<TermRef<'a>> {
        self.objects_for_subject_predicate(subject, predicate)
            .collect()
    }

    fn has_type(&self, subject: NamedOrBlankNodeRef<'_>, class: NamedNodeRef<'_>) -> bool {
        self.objects_for_subject_predicate(subject, TYPE)
            .any(|o| o == TermRef::NamedNode(class))
    }

    fn list_items(&self, head: TermRef<'_>) -> Vec<Term> {
        let mut items = Vec::new();
        let mut current = head.into_owned();
        // bounded by the graph size so a cyclic list cannot loop forever
        for _ in 0..=self.len() {
            let node: NamedOrBlankNodeRef<'_> = match &current {
                Term::NamedNode(n) if n.as_ref() == RDF_NIL => break,
                Term::NamedNode(n) => n.as_ref().into(),
                Term::BlankNode(b) => b.as_ref().into(),
                _ => break,
            };
            if let Some(first) = self.object_for_subject_predicate(node, RDF_FIRST) {
                items.push(first.into_owned());
            }
            match self.object_for_subject_predicate(node, RDF_REST) {
                Some(rest) => current = rest.into_owned(),
                None => break,
            }
        }
        items
    }
}

fn blank_signature(graph: &Graph, node: BlankNodeRef<'_>) -> String {
    let mut parts: Vec<String> = graph
        .triples_for_subject(node)
        .filter(|t| !t.object.is_blank_node())
        .map(|t| format!("{} {}", t.predicate, t.object))
        .collect();
    parts.sort();
    let hash = blake3::hash(parts.join("\n").as_bytes()).to_hex();
    format!("_:b{}", &hash.as_str()[..16])
}

fn render_subject(graph: &Graph, subject: NamedOrBlankNodeRef<'_>) -> String {
    match subject {
        NamedOrBlankNodeRef::BlankNode(b) => blank_signature(graph, b),
        other => other.to_string(),
    }
}

fn render_object(graph: &Graph, object: TermRef<'_>) -> String {
    match object {
        TermRef::BlankNode(b) => blank_signature(graph, b),
        other => other.to_string(),
    }
}

/// Content fingerprint of a graph: blake3 over its sorted N-Triples lines, with blank nodes
/// relabelled from their outgoing non-blank statements so store-assigned ids do not matter.
pub fn fingerprint(graph: &Graph) -> String {
    let mut lines: Vec<String> = graph
        .iter()
        .map(|t| {
            format!(
                "{} {} {} .",
                render_subject(graph, t.subject),
                t.predicate,
                render_object(graph, t.object)
            )
        })
        .collect();
    lines.sort();
    lines.dedup();
    blake3::hash(lines.join("\n").as_bytes())
        .to_hex()
        .to_string()
}

/// `xsd:dateTime` literal in UTC with millisecond precision.
pub fn timestamp(time: DateTime<Utc>) -> Literal {
    Literal::new_typed_literal(time.to_rfc3339_opts(SecondsFormat::Millis, true), XSD_DATE_TIME)
}

/// Builds a language-tagged literal, rejecting malformed tags.
pub fn lang_literal(value: &str, lang: &str) -> Result<Literal> {
    Literal::new_language_tagged_literal(value, lang)
        .map_err(|e| ModelError::malformed(format!("Invalid language tag {lang}: {e}")).into())
}

pub fn parse_iri(iri: &str) -> Result<NamedNode> {
    NamedNode::new(iri).map_err(|e| ModelError::malformed(format!("Invalid IRI {iri}: {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{BlankNode, TripleRef};

    const PERSON_TTL: &str = r#"
@prefix sh: <http://www.w3.org/ns/shacl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
<urn:ex:Person> a sh:NodeShape ;
  rdfs:label "Henkilö"@fi, "Person"@en ;
  sh:property [ sh:path <urn:ex:name> ; sh:maxCount 1 ] ;
  sh:in ( "A" "B" "C" ) .
"#;

    #[test]
    fn test_resource_iri_rule() {
        assert_eq!(
            resource_iri("http://ex.org/ns/", "Person").unwrap().as_str(),
            "http://ex.org/ns/Person"
        );
        assert_eq!(
            resource_iri("http://ex.org/model", "Person").unwrap().as_str(),
            "http://ex.org/model#Person"
        );
        assert!(resource_iri("http://ex.org/model", "has space").is_err());
        assert_eq!(local_name("http://ex.org/model#Person"), "Person");
        assert_eq!(local_name("http://ex.org/ns/name"), "name");
    }

    #[test]
    fn test_graph_accessors() {
        let graph = parse_graph(PERSON_TTL.as_bytes(), RdfFormat::Turtle).unwrap();
        let person = NamedNodeRef::new("urn:ex:Person").unwrap();
        let labels = graph.lang_map(person.into(), LABEL);
        assert_eq!(labels.get("fi").map(String::as_str), Some("Henkilö"));
        assert_eq!(labels.len(), 2);
        assert!(graph.has_type(person.into(), NODE_SHAPE));

        let head = graph.first_object(person.into(), SH_IN).unwrap();
        let values: Vec<String> = graph
            .list_items(head)
            .into_iter()
            .map(|t| match t {
                Term::Literal(l) => l.value().to_string(),
                other => other.to_string(),
            })
            .collect();
        assert_eq!(values, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_fingerprint_ignores_blank_node_labels() {
        let a = parse_graph(PERSON_TTL.as_bytes(), RdfFormat::Turtle).unwrap();
        let b = parse_graph(PERSON_TTL.as_bytes(), RdfFormat::Turtle).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));

        let mut c = b.clone();
        let s = BlankNode::default();
        c.insert(TripleRef::new(s.as_ref(), LABEL, TermRef::from(NamedNodeRef::new("urn:x").unwrap())));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn test_format_names() {
        assert_eq!(format_from_name("turtle"), Some(RdfFormat::Turtle));
        assert_eq!(format_from_name("application/rdf+xml"), Some(RdfFormat::RdfXml));
        assert!(matches!(format_from_name("jsonld"), Some(RdfFormat::JsonLd { .. })));
        assert_eq!(format_from_name("nonsense"), None);
        assert_eq!(format_from_path(Path::new("model.nt")), RdfFormat::NTriples);
        assert_eq!(format_from_path(Path::new("model")), RdfFormat::Turtle);
    }

    #[test]
    fn test_serialize_declares_prefixes() {
        let graph = parse_graph(PERSON_TTL.as_bytes(), RdfFormat::Turtle).unwrap();
        let out = serialize_graph(&graph, RdfFormat::Turtle, &PrefixMap::standard()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("@prefix sh:"));
        let reparsed = parse_graph(text.as_bytes(), RdfFormat::Turtle).unwrap();
        assert_eq!(reparsed.len(), graph.len());
        assert!(parse_graph(b"not turtle at all <", RdfFormat::Turtle).is_err());
    }
}
