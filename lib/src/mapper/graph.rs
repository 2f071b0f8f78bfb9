//! Conversion between the DTOs and their RDF graphs.

use super::dto::*;
use crate::config::Config;
use crate::consts::*;
use crate::errors::ModelError;
use crate::util::{lang_literal, resource_iri, timestamp, GraphExt};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use oxigraph::model::{
    BlankNode, Graph, Literal, NamedNode, NamedNodeRef, NamedOrBlankNode, NamedOrBlankNodeRef,
    Term, TermRef, Triple, TripleRef,
};
use regex::Regex;
use std::sync::LazyLock;

type Pattern = LazyLock<Result<Regex, regex::Error>>;

static LOCAL_NAME_PATTERN: Pattern =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_\-]{0,254}$"));
static PREFIX_PATTERN: Pattern = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_\-]{1,31}$"));

fn compiled(pattern: &'static Pattern) -> Result<&'static Regex> {
    pattern
        .as_ref()
        .map_err(|e| anyhow!("Built-in pattern does not compile: {e}"))
}

/// Rejects local names that cannot be appended to a namespace as a plain IRI segment.
pub fn validate_local_name(name: &str) -> Result<()> {
    if compiled(&LOCAL_NAME_PATTERN)?.is_match(name) {
        Ok(())
    } else {
        Err(anyhow!(ModelError::malformed(format!(
            "Invalid local name '{name}'"
        ))))
    }
}

pub fn validate_prefix(prefix: &str) -> Result<()> {
    if compiled(&PREFIX_PATTERN)?.is_match(prefix) {
        Ok(())
    } else {
        Err(anyhow!(ModelError::malformed(format!(
            "Invalid model prefix '{prefix}'"
        ))))
    }
}

/// Every key must be a well-formed language tag among the configured languages.
pub fn validate_language_map(map: &LangMap, config: &Config) -> Result<()> {
    for lang in map.keys() {
        Literal::new_language_tagged_literal("", lang)
            .map_err(|e| ModelError::malformed(format!("Invalid language tag {lang}: {e}")))?;
        if !config.accepts_language(lang) {
            return Err(anyhow!(ModelError::malformed(format!(
                "Language {lang} is not one of {}",
                config.languages.join(", ")
            ))));
        }
    }
    Ok(())
}

fn parse_timestamp(graph: &Graph, subject: NamedOrBlankNodeRef<'_>, predicate: NamedNodeRef<'_>) -> Option<DateTime<Utc>> {
    graph
        .first_literal(subject, predicate)
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|t| t.with_timezone(&Utc))
}

struct GraphWriter {
    graph: Graph,
}

impl GraphWriter {
    fn new() -> Self {
        GraphWriter {
            graph: Graph::new(),
        }
    }

    fn add<'s, 'p, 'o>(
        &mut self,
        subject: impl Into<NamedOrBlankNodeRef<'s>>,
        predicate: NamedNodeRef<'p>,
        object: impl Into<TermRef<'o>>,
    ) {
        self.graph
            .insert(TripleRef::new(subject.into(), predicate, object.into()));
    }

    fn add_langs<'a>(
        &mut self,
        subject: impl Into<NamedOrBlankNodeRef<'a>> + Copy,
        predicate: NamedNodeRef<'a>,
        map: &LangMap,
    ) -> Result<()> {
        for (lang, value) in map {
            let literal = lang_literal(value.trim(), lang)?;
            self.add(subject, predicate, literal.as_ref());
        }
        Ok(())
    }

    fn add_iri<'a>(
        &mut self,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
        predicate: NamedNodeRef<'a>,
        object: Option<&'a NamedNode>,
    ) {
        if let Some(object) = object {
            self.add(subject, predicate, object.as_ref());
        }
    }

    fn add_integer<'a>(
        &mut self,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
        predicate: NamedNodeRef<'a>,
        value: Option<u32>,
    ) {
        if let Some(value) = value {
            let literal = Literal::from(i64::from(value));
            self.add(subject, predicate, literal.as_ref());
        }
    }

    fn add_string<'a>(
        &mut self,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
        predicate: NamedNodeRef<'a>,
        value: Option<&str>,
    ) {
        if let Some(value) = value {
            let literal = Literal::new_simple_literal(value);
            self.add(subject, predicate, literal.as_ref());
        }
    }

    /// Writes an RDF collection and returns its head.
    fn add_list(&mut self, values: &[String]) -> Term {
        let mut head: Term = RDF_NIL.into_owned().into();
        for value in values.iter().rev() {
            let node = BlankNode::default();
            self.add(node.as_ref(), RDF_FIRST, Literal::new_simple_literal(value).as_ref());
            self.add(node.as_ref(), RDF_REST, head.as_ref());
            head = node.into();
        }
        head
    }

    fn finish(self) -> Graph {
        self.graph
    }
}

/// Builds the model graph. The graph name is the model namespace.
pub fn build_model_graph(dto: &ModelDto, config: &Config) -> Result<Graph> {
    validate_prefix(&dto.prefix)?;
    validate_language_map(&dto.label, config)?;
    validate_language_map(&dto.description, config)?;
    for lang in &dto.languages {
        if !config.accepts_language(lang) {
            return Err(anyhow!(ModelError::malformed(format!(
                "Unsupported model language {lang}"
            ))));
        }
    }
    let model = dto.namespace.as_ref();
    let mut w = GraphWriter::new();
    w.add(model, TYPE, ONTOLOGY);
    w.add_langs(model, LABEL, &dto.label)?;
    w.add_langs(model, COMMENT, &dto.description)?;
    w.add_string(model, VERSION_INFO, Some(dto.status.as_str()));
    w.add_string(model, PREFERRED_XMLNS_PREFIX, Some(&dto.prefix));
    w.add_string(model, PREFERRED_XMLNS_NAME, Some(model.as_str()));
    for lang in &dto.languages {
        w.add_string(model, LANGUAGE, Some(lang));
    }
    for org in &dto.organizations {
        w.add(model, CONTRIBUTOR, org.as_ref());
    }
    for group in &dto.groups {
        w.add(model, IS_PART_OF, group.as_ref());
    }
    for ns in &dto.required_namespaces {
        w.add(model, REQUIRES, ns.as_ref());
    }
    w.add_iri(model, ROOT_RESOURCE, dto.root_resource.as_ref());
    let created = dto.created.unwrap_or_else(Utc::now);
    w.add(model, CREATED, timestamp(created).as_ref());
    w.add(model, MODIFIED, timestamp(dto.modified.unwrap_or_else(Utc::now)).as_ref());
    Ok(w.finish())
}

/// Reads a model graph back. Missing optional values become empty or `None`.
pub fn parse_model_graph(graph: &Graph, model: NamedNodeRef<'_>) -> Result<ModelDto> {
    let subject: NamedOrBlankNodeRef<'_> = model.into();
    if !graph.has_type(subject, ONTOLOGY) {
        return Err(anyhow!(ModelError::NotFound(model.as_str().to_string())));
    }
    let mut dto = ModelDto::new(
        model.into_owned(),
        graph
            .first_literal(subject, PREFERRED_XMLNS_PREFIX)
            .unwrap_or_default(),
    );
    dto.label = graph.lang_map(subject, LABEL);
    dto.description = graph.lang_map(subject, COMMENT);
    dto.status = graph
        .first_literal(subject, VERSION_INFO)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    let mut languages: Vec<String> = graph
        .objects(subject, LANGUAGE)
        .into_iter()
        .filter_map(|o| match o {
            TermRef::Literal(l) => Some(l.value().to_string()),
            _ => None,
        })
        .collect();
    languages.sort();
    dto.languages = languages;
    dto.organizations = graph.iri_objects(subject, CONTRIBUTOR);
    dto.groups = graph.iri_objects(subject, IS_PART_OF);
    dto.required_namespaces = graph.iri_objects(subject, REQUIRES);
    dto.root_resource = graph.first_iri(subject, ROOT_RESOURCE);
    dto.created = parse_timestamp(graph, subject, CREATED);
    dto.modified = parse_timestamp(graph, subject, MODIFIED);
    Ok(dto)
}

fn write_constraints<'a>(
    w: &mut GraphWriter,
    node: NamedOrBlankNodeRef<'a>,
    shape: &'a PropertyShapeDto,
) -> Result<()> {
    w.add_iri(node, SH_PATH, shape.path.as_ref());
    w.add_langs(node, SH_NAME, &shape.name)?;
    w.add_langs(node, SH_DESCRIPTION, &shape.description)?;
    w.add_iri(node, SH_DATATYPE, shape.datatype.as_ref());
    w.add_iri(node, SH_CLASS, shape.class.as_ref());
    w.add_iri(node, SH_NODE, shape.node.as_ref());
    w.add_integer(node, SH_MIN_COUNT, shape.min_count);
    w.add_integer(node, SH_MAX_COUNT, shape.max_count);
    w.add_integer(node, SH_MIN_LENGTH, shape.min_length);
    w.add_integer(node, SH_MAX_LENGTH, shape.max_length);
    if let Some(pattern) = &shape.pattern {
        Regex::new(pattern)
            .map_err(|e| ModelError::malformed(format!("Invalid pattern {pattern}: {e}")))?;
        w.add_string(node, SH_PATTERN, Some(pattern));
    }
    if !shape.values.is_empty() {
        let head = w.add_list(&shape.values);
        w.add(node, SH_IN, head.as_ref());
    }
    w.add_string(node, SH_DEFAULT_VALUE, shape.default_value.as_deref());
    w.add_iri(node, MEMBER_OF, shape.code_list.as_ref());
    w.add_integer(node, SH_INDEX, shape.index);
    Ok(())
}

fn types_for(kind: ResourceKind) -> &'static [NamedNodeRef<'static>] {
    match kind {
        ResourceKind::Class => &[OWL_CLASS, RDFS_CLASS],
        ResourceKind::Shape => &[NODE_SHAPE, SH_SHAPE],
        ResourceKind::Attribute => &[DATATYPE_PROPERTY, IOW_ATTRIBUTE],
        ResourceKind::Association => &[OBJECT_PROPERTY, IOW_ASSOCIATION],
        ResourceKind::PropertyShape => &[PROPERTY_SHAPE],
    }
}

/// Builds the graph of a resource inside `model` and returns its IRI with it. Embedded property
/// shapes become blank nodes whose `sh:index` follows their position in the DTO.
pub fn build_resource_graph(
    dto: &ResourceDto,
    model: NamedNodeRef<'_>,
    config: &Config,
) -> Result<(NamedNode, Graph)> {
    validate_local_name(&dto.local_name)?;
    validate_language_map(&dto.label, config)?;
    validate_language_map(&dto.comment, config)?;
    let iri = resource_iri(model.as_str(), &dto.local_name)?;
    let subject = iri.as_ref();

    let mut w = GraphWriter::new();
    for class in types_for(dto.kind) {
        w.add(subject, TYPE, *class);
    }
    w.add(subject, DEFINED_BY, model);
    w.add_string(subject, IOW_LOCAL_NAME, Some(&dto.local_name));
    w.add_langs(subject, LABEL, &dto.label)?;
    w.add_langs(subject, COMMENT, &dto.comment)?;
    w.add_string(subject, EDITORIAL_NOTE, dto.editorial_note.as_deref());
    w.add_string(subject, VERSION_INFO, Some(dto.status.as_str()));
    w.add_iri(subject, SUBJECT, dto.subject.as_ref());
    for parent in &dto.sub_class_of {
        w.add(subject, SUB_CLASS_OF, parent.as_ref());
    }
    for parent in &dto.sub_property_of {
        w.add(subject, SUB_PROPERTY_OF, parent.as_ref());
    }
    w.add_iri(subject, DOMAIN, dto.domain.as_ref());
    w.add_iri(subject, RANGE, dto.range.as_ref());
    w.add_iri(subject, SH_TARGET_CLASS, dto.target_class.as_ref());

    if dto.kind.has_property_shapes() {
        for (position, shape) in dto.properties.iter().enumerate() {
            let node = BlankNode::default();
            w.add(subject, SH_PROPERTY, node.as_ref());
            w.add(node.as_ref(), TYPE, PROPERTY_SHAPE);
            let mut indexed = shape.clone();
            indexed.index = Some(u32::try_from(position).unwrap_or(u32::MAX));
            write_constraints(&mut w, node.as_ref().into(), &indexed)?;
        }
        for property in &dto.property_refs {
            w.add(subject, SH_PROPERTY, property.as_ref());
        }
    } else if !dto.properties.is_empty() {
        return Err(anyhow!(ModelError::malformed(format!(
            "{:?} resources cannot carry property shapes",
            dto.kind
        ))));
    }
    if let Some(constraints) = &dto.constraints {
        if dto.kind != ResourceKind::PropertyShape {
            return Err(anyhow!(ModelError::malformed(
                "Only property shapes carry constraints"
            )));
        }
        write_constraints(&mut w, subject.into(), constraints)?;
    }
    if let Some(created) = dto.created {
        w.add(subject, CREATED, timestamp(created).as_ref());
    }
    w.add(subject, MODIFIED, timestamp(dto.modified.unwrap_or_else(Utc::now)).as_ref());
    Ok((iri, w.finish()))
}

fn read_count(graph: &Graph, node: NamedOrBlankNodeRef<'_>, predicate: NamedNodeRef<'_>) -> Option<u32> {
    graph
        .integer(node, predicate)
        .and_then(|v| u32::try_from(v).ok())
}

/// Reads the SHACL constraints attached to `node`.
pub fn parse_property_shape(graph: &Graph, node: NamedOrBlankNodeRef<'_>) -> PropertyShapeDto {
    let values = graph
        .first_object(node, SH_IN)
        .map(|head| {
            graph
                .list_items(head)
                .into_iter()
                .map(|t| match t {
                    Term::Literal(l) => l.value().to_string(),
                    Term::NamedNode(n) => n.into_string(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    PropertyShapeDto {
        path: graph
            .first_iri(node, SH_PATH)
            .or_else(|| graph.first_iri(node, SH_PREDICATE)),
        name: graph.lang_map(node, SH_NAME),
        description: graph.lang_map(node, SH_DESCRIPTION),
        datatype: graph.first_iri(node, SH_DATATYPE),
        class: graph.first_iri(node, SH_CLASS),
        node: graph
            .first_iri(node, SH_NODE)
            .or_else(|| graph.first_iri(node, SH_VALUE_SHAPE)),
        min_count: read_count(graph, node, SH_MIN_COUNT),
        max_count: read_count(graph, node, SH_MAX_COUNT),
        min_length: read_count(graph, node, SH_MIN_LENGTH),
        max_length: read_count(graph, node, SH_MAX_LENGTH),
        pattern: graph.first_literal(node, SH_PATTERN),
        values,
        default_value: graph.first_literal(node, SH_DEFAULT_VALUE),
        code_list: graph.first_iri(node, MEMBER_OF),
        index: read_count(graph, node, SH_INDEX),
    }
}

fn kind_of(graph: &Graph, subject: NamedOrBlankNodeRef<'_>) -> Option<ResourceKind> {
    [
        (OWL_CLASS, ResourceKind::Class),
        (RDFS_CLASS, ResourceKind::Class),
        (NODE_SHAPE, ResourceKind::Shape),
        (SH_SHAPE, ResourceKind::Shape),
        (DATATYPE_PROPERTY, ResourceKind::Attribute),
        (OBJECT_PROPERTY, ResourceKind::Association),
        (PROPERTY_SHAPE, ResourceKind::PropertyShape),
    ]
    .into_iter()
    .find(|(class, _)| graph.has_type(subject, *class))
    .map(|(_, kind)| kind)
}

/// Sorts shapes by `sh:index`; shapes without one keep their relative order after the rest.
pub fn sort_by_index(shapes: &mut [PropertyShapeDto]) {
    shapes.sort_by_key(|s| s.index.unwrap_or(u32::MAX));
}

/// Reads a resource graph back into a DTO.
pub fn parse_resource_graph(graph: &Graph, resource: NamedNodeRef<'_>) -> Result<ResourceDto> {
    let subject: NamedOrBlankNodeRef<'_> = resource.into();
    let kind = kind_of(graph, subject)
        .ok_or_else(|| anyhow!(ModelError::NotFound(resource.as_str().to_string())))?;
    let local_name = graph
        .first_literal(subject, IOW_LOCAL_NAME)
        .unwrap_or_else(|| crate::util::local_name(resource.as_str()).to_string());
    let mut dto = ResourceDto::new(local_name, kind);
    dto.label = graph.lang_map(subject, LABEL);
    dto.comment = graph.lang_map(subject, COMMENT);
    dto.editorial_note = graph.first_literal(subject, EDITORIAL_NOTE);
    dto.status = graph
        .first_literal(subject, VERSION_INFO)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    dto.subject = graph.first_iri(subject, SUBJECT);
    dto.sub_class_of = graph.iri_objects(subject, SUB_CLASS_OF);
    dto.sub_property_of = graph.iri_objects(subject, SUB_PROPERTY_OF);
    dto.domain = graph.first_iri(subject, DOMAIN);
    dto.range = graph.first_iri(subject, RANGE);
    dto.target_class = graph.first_iri(subject, SH_TARGET_CLASS);
    dto.created = parse_timestamp(graph, subject, CREATED);
    dto.modified = parse_timestamp(graph, subject, MODIFIED);

    if kind.has_property_shapes() {
        for object in graph.objects(subject, SH_PROPERTY) {
            match object {
                TermRef::BlankNode(b) => dto.properties.push(parse_property_shape(graph, b.into())),
                TermRef::NamedNode(n) => dto.property_refs.push(n.into_owned()),
                _ => {}
            }
        }
        sort_by_index(&mut dto.properties);
        dto.property_refs.sort();
    }
    if kind == ResourceKind::PropertyShape {
        dto.constraints = Some(parse_property_shape(graph, subject));
    }
    Ok(dto)
}

fn swap_node(node: NamedNodeRef<'_>, old: NamedNodeRef<'_>, new: &NamedNode) -> NamedNode {
    if node == old {
        new.clone()
    } else {
        node.into_owned()
    }
}

/// Copy of `graph` with every occurrence of `old` as subject or object replaced by `new`.
pub fn retarget_graph(graph: &Graph, old: NamedNodeRef<'_>, new: NamedNodeRef<'_>) -> Graph {
    let new = new.into_owned();
    let mut out = Graph::new();
    for t in graph.iter() {
        let subject: NamedOrBlankNode = match t.subject {
            NamedOrBlankNodeRef::NamedNode(n) => swap_node(n, old, &new).into(),
            other => other.into_owned(),
        };
        let object: Term = match t.object {
            TermRef::NamedNode(n) => swap_node(n, old, &new).into(),
            other => other.into_owned(),
        };
        out.insert(&Triple::new(subject, t.predicate, object));
    }
    out
}

/// Replaces every value of `predicate` on `subject` with `object`.
pub fn set_single(graph: &mut Graph, subject: NamedNodeRef<'_>, predicate: NamedNodeRef<'_>, object: TermRef<'_>) {
    let existing: Vec<Term> = graph
        .objects_for_subject_predicate(subject, predicate)
        .map(|o| o.into_owned())
        .collect();
    for o in existing {
        graph.remove(TripleRef::new(subject, predicate, o.as_ref()));
    }
    graph.insert(TripleRef::new(subject, predicate, object));
}

/// Removes every value of `predicate` on `subject`.
pub fn remove_all(graph: &mut Graph, subject: NamedNodeRef<'_>, predicate: NamedNodeRef<'_>) {
    let existing: Vec<Term> = graph
        .objects_for_subject_predicate(subject, predicate)
        .map(|o| o.into_owned())
        .collect();
    for o in existing {
        graph.remove(TripleRef::new(subject, predicate, o.as_ref()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> NamedNode {
        NamedNode::new("http://uri.suomi.fi/datamodel/ns/test").unwrap()
    }

    fn person() -> ResourceDto {
        let mut dto = ResourceDto::new("Person", ResourceKind::Class);
        dto.label.insert("fi".into(), "Henkilö".into());
        dto.label.insert("en".into(), "Person".into());
        dto.properties.push(PropertyShapeDto {
            path: Some(NamedNode::new("http://ex.org/name").unwrap()),
            datatype: Some(XSD_STRING.into_owned()),
            min_count: Some(1),
            max_count: Some(1),
            ..Default::default()
        });
        dto.properties.push(PropertyShapeDto {
            path: Some(NamedNode::new("http://ex.org/color").unwrap()),
            values: vec!["red".into(), "green".into(), "blue".into()],
            ..Default::default()
        });
        dto
    }

    #[test]
    fn test_resource_roundtrip() {
        let config = Config::default();
        let (iri, graph) = build_resource_graph(&person(), model().as_ref(), &config).unwrap();
        assert_eq!(iri.as_str(), "http://uri.suomi.fi/datamodel/ns/test#Person");
        assert!(graph.contains(TripleRef::new(iri.as_ref(), DEFINED_BY, model().as_ref())));

        let parsed = parse_resource_graph(&graph, iri.as_ref()).unwrap();
        assert_eq!(parsed.kind, ResourceKind::Class);
        assert_eq!(parsed.label, person().label);
        assert_eq!(parsed.properties.len(), 2);
        assert_eq!(parsed.properties[0].index, Some(0));
        assert_eq!(parsed.properties[0].max_count, Some(1));
        assert_eq!(parsed.properties[1].values, vec!["red", "green", "blue"]);
        assert_eq!(parsed.properties[1].min_count, None);
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        let config = Config::default();
        let mut dto = person();
        dto.label.insert("de".into(), "Person".into());
        let err = build_resource_graph(&dto, model().as_ref(), &config).unwrap_err();
        assert!(matches!(
            crate::errors::model_error(&err),
            Some(ModelError::MalformedInput(_))
        ));

        let dto = ResourceDto::new("1st", ResourceKind::Attribute);
        assert!(build_resource_graph(&dto, model().as_ref(), &config).is_err());

        let mut dto = ResourceDto::new("name", ResourceKind::Attribute);
        dto.properties.push(PropertyShapeDto::default());
        assert!(build_resource_graph(&dto, model().as_ref(), &config).is_err());
    }

    #[test]
    fn test_name_patterns() {
        for _ in 0..3 {
            assert!(validate_local_name("Person").is_ok());
            assert!(validate_local_name("has-name_2").is_ok());
            assert!(validate_prefix("test").is_ok());
        }
        for bad in ["", "1st", "with space", "a/b"] {
            let err = validate_local_name(bad).unwrap_err();
            assert!(matches!(
                crate::errors::model_error(&err),
                Some(ModelError::MalformedInput(_))
            ));
        }
        assert!(validate_prefix("x").is_err());
        assert!(validate_prefix("Upper").is_err());
    }

    #[test]
    fn test_model_roundtrip() {
        let config = Config::default();
        let mut dto = ModelDto::new(model(), "test");
        dto.label.insert("fi".into(), "Testi".into());
        dto.status = Status::Draft;
        dto.languages = vec!["en".into(), "fi".into()];
        dto.organizations
            .push(NamedNode::new("urn:uuid:7d3a3c00-5a6b-489b-a3ed-63bb58c26a63").unwrap());
        let graph = build_model_graph(&dto, &config).unwrap();
        let parsed = parse_model_graph(&graph, model().as_ref()).unwrap();
        assert_eq!(parsed.prefix, "test");
        assert_eq!(parsed.status, Status::Draft);
        assert_eq!(parsed.languages, dto.languages);
        assert_eq!(parsed.organizations, dto.organizations);
        assert!(parsed.created.is_some());

        assert!(parse_model_graph(&Graph::new(), model().as_ref()).is_err());
        let bad = ModelDto::new(model(), "Not A Prefix");
        assert!(build_model_graph(&bad, &config).is_err());
    }

    #[test]
    fn test_retarget_graph() {
        let config = Config::default();
        let (iri, graph) = build_resource_graph(&person(), model().as_ref(), &config).unwrap();
        let copy = NamedNode::new("http://uri.suomi.fi/datamodel/ns/test#Human").unwrap();
        let moved = retarget_graph(&graph, iri.as_ref(), copy.as_ref());
        assert_eq!(moved.len(), graph.len());
        assert!(moved
            .iter()
            .all(|t| t.subject != NamedOrBlankNodeRef::from(iri.as_ref())));
    }
}
