//! Derivation of JSON Schema and OpenAPI documents from SHACL/OWL graphs.
//!
//! Both exporters share one walk: a class (or node shape) is read from an in-memory graph,
//! its `sh:property` shapes are ordered by `sh:index` and each property shape becomes a JSON
//! schema fragment. Shapes referenced through `sh:node`, `sh:class` or `sh:valueShape` end up
//! as `$ref` pointers into a definition table keyed by local name; every referenced class is
//! rendered once, found either in the graph being exported or fetched from the core store.

pub mod datatypes;
pub mod json_schema;
pub mod openapi;

pub use json_schema::JsonSchemaExporter;
pub use openapi::OpenApiExporter;

use crate::consts::{
    COMMENT, LABEL, NODE_SHAPE, OWL_CLASS, RDFS_CLASS, SH_DESCRIPTION, SH_NAME,
    SH_PROPERTY, SH_SHAPE, TYPE,
};
use crate::mapper::graph::{parse_property_shape, sort_by_index};
use crate::mapper::{LangMap, PropertyShapeDto};
use crate::options::LanguageSelection;
use crate::sparql::QueryRegistry;
use crate::store::GraphStore;
use crate::util::{local_name, GraphExt};
use datatypes::{lang_string_definition, JsonType};
use log::{debug, warn};
use oxigraph::model::{Graph, NamedNode, NamedNodeRef, NamedOrBlankNodeRef, Term, TermRef};
use serde_json::{json, Map, Number, Value};
use std::collections::{HashMap, HashSet, VecDeque};

/// Types that make a resource renderable as an object schema.
pub const CLASS_TYPES: [NamedNodeRef<'_>; 4] = [OWL_CLASS, RDFS_CLASS, NODE_SHAPE, SH_SHAPE];

pub(crate) const LANG_STRING_KEY: &str = "langString";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    JsonSchema,
    OpenApi,
}

impl Dialect {
    fn reference(self, key: &str) -> Value {
        let prefix = match self {
            Dialect::JsonSchema => "#/definitions/",
            Dialect::OpenApi => "#/components/schemas/",
        };
        json!({ "$ref": format!("{prefix}{key}") })
    }

    /// Member carrying the class IRI of an object schema.
    fn class_key(self) -> &'static str {
        match self {
            Dialect::JsonSchema => "@id",
            Dialect::OpenApi => "x-rdf-type",
        }
    }

    /// Member carrying the datatype IRI of a literal property.
    fn datatype_key(self) -> &'static str {
        match self {
            Dialect::JsonSchema => "@type",
            Dialect::OpenApi => "x-rdf-datatype",
        }
    }
}

/// Key of a class in the definition table.
pub fn definition_key(iri: NamedNodeRef<'_>) -> String {
    local_name(iri.as_str()).to_string()
}

pub fn is_class(graph: &Graph, subject: NamedNodeRef<'_>) -> bool {
    CLASS_TYPES
        .iter()
        .any(|class| graph.has_type(subject.into(), *class))
}

fn describes(graph: &Graph, subject: NamedNodeRef<'_>) -> bool {
    graph
        .object_for_subject_predicate(subject, TYPE)
        .is_some()
}

/// Class metadata and ordered property shapes, detached from the graph they came from.
#[derive(Debug, Clone)]
pub(crate) struct ClassShape {
    pub iri: NamedNode,
    pub label: LangMap,
    pub comment: LangMap,
    pub properties: Vec<PropertyShapeDto>,
}

/// Reads a class from `graph`. Property shapes named by IRI that the graph does not describe
/// are returned separately so the caller can fetch them.
fn read_class(graph: &Graph, iri: NamedNodeRef<'_>) -> Option<(ClassShape, Vec<NamedNode>)> {
    if !is_class(graph, iri) {
        return None;
    }
    let subject: NamedOrBlankNodeRef<'_> = iri.into();
    let mut label = graph.lang_map(subject, LABEL);
    if label.is_empty() {
        label = graph.lang_map(subject, SH_NAME);
    }
    let mut comment = graph.lang_map(subject, COMMENT);
    if comment.is_empty() {
        comment = graph.lang_map(subject, SH_DESCRIPTION);
    }
    let mut properties = Vec::new();
    let mut external = Vec::new();
    for object in graph.objects(subject, SH_PROPERTY) {
        match object {
            TermRef::BlankNode(b) => properties.push(parse_property_shape(graph, b.into())),
            TermRef::NamedNode(n) if describes(graph, n) => {
                properties.push(parse_property_shape(graph, n.into()))
            }
            TermRef::NamedNode(n) => external.push(n.into_owned()),
            _ => {}
        }
    }
    Some((
        ClassShape {
            iri: iri.into_owned(),
            label,
            comment,
            properties,
        },
        external,
    ))
}

/// Converts a lexical value to the JSON value matching the property type.
fn typed_value(json_type: JsonType, value: &str) -> Value {
    match json_type {
        JsonType::Integer => value
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| json!(value)),
        JsonType::Number => value
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| json!(value)),
        JsonType::Boolean => value
            .trim()
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| json!(value)),
        _ => json!(value),
    }
}

/// A rendered property: its key, schema and whether it is required.
pub(crate) struct RenderedProperty {
    pub name: String,
    pub schema: Value,
    pub required: bool,
}

/// Worklist based renderer shared by the JSON Schema and OpenAPI exporters.
pub(crate) struct ShapeWalker<'a> {
    core: &'a dyn GraphStore,
    scheme: &'a dyn GraphStore,
    queries: &'a QueryRegistry,
    primary: &'a Graph,
    dialect: Dialect,
    language: LanguageSelection,
    fetched: HashMap<NamedNode, Option<Graph>>,
    pending: VecDeque<NamedNode>,
    visited: HashSet<String>,
    referenced: HashSet<String>,
    definitions: Map<String, Value>,
    needs_lang_string: bool,
}

impl<'a> ShapeWalker<'a> {
    pub fn new(
        core: &'a dyn GraphStore,
        scheme: &'a dyn GraphStore,
        queries: &'a QueryRegistry,
        primary: &'a Graph,
        dialect: Dialect,
        language: LanguageSelection,
    ) -> Self {
        Self {
            core,
            scheme,
            queries,
            primary,
            dialect,
            language,
            fetched: HashMap::new(),
            pending: VecDeque::new(),
            visited: HashSet::new(),
            referenced: HashSet::new(),
            definitions: Map::new(),
            needs_lang_string: false,
        }
    }

    /// Title or description in the selected language, or a language map when multilingual.
    /// Missing translations are left out.
    pub fn text(&self, map: &LangMap) -> Option<Value> {
        match &self.language {
            LanguageSelection::Single(lang) => map.get(lang).map(|s| json!(s)),
            LanguageSelection::Multilingual if map.is_empty() => None,
            LanguageSelection::Multilingual => Some(json!(map)),
        }
    }

    /// Graph describing `iri`: the exported graph when it has the resource, else the resource
    /// graph in the core store.
    fn graph_describing(&mut self, iri: &NamedNode) -> Option<&Graph> {
        if describes(self.primary, iri.as_ref()) {
            return Some(self.primary);
        }
        if !self.fetched.contains_key(iri) {
            let graph = match self.core.try_get_graph(iri.as_ref()) {
                Ok(graph) => graph,
                Err(e) => {
                    warn!("Could not fetch referenced shape {iri}: {e}");
                    None
                }
            };
            self.fetched.insert(iri.clone(), graph);
        }
        self.fetched
            .get(iri)
            .and_then(Option::as_ref)
            .filter(|g| describes(g, iri.as_ref()))
    }

    pub fn load_class(&mut self, iri: &NamedNode) -> Option<ClassShape> {
        let graph = self.graph_describing(iri)?;
        let (mut shape, external) = read_class(graph, iri.as_ref())?;
        for property in external {
            match self.graph_describing(&property) {
                Some(graph) => shape
                    .properties
                    .push(parse_property_shape(graph, property.as_ref().into())),
                None => warn!("Property shape {property} of {iri} not found"),
            }
        }
        sort_by_index(&mut shape.properties);
        Some(shape)
    }

    /// Marks a class as rendered elsewhere so references to it do not queue it again.
    pub fn mark_visited(&mut self, iri: NamedNodeRef<'_>) {
        self.visited.insert(definition_key(iri));
    }

    /// Queues a class for the definition table unless a class of that local name was seen.
    pub fn enqueue(&mut self, iri: &NamedNode) {
        if self.visited.insert(definition_key(iri.as_ref())) {
            self.pending.push_back(iri.clone());
        }
    }

    pub fn was_referenced(&self, iri: NamedNodeRef<'_>) -> bool {
        self.referenced.contains(&definition_key(iri))
    }

    pub fn reference(&mut self, target: &NamedNode) -> Value {
        let key = definition_key(target.as_ref());
        self.referenced.insert(key.clone());
        self.enqueue(target);
        self.dialect.reference(&key)
    }

    fn codes(&self, scheme: NamedNodeRef<'_>) -> Vec<String> {
        let query = match self.queries.scheme_codes(scheme) {
            Ok(q) => q,
            Err(e) => {
                warn!("Invalid code list {scheme}: {e}");
                return Vec::new();
            }
        };
        self.scheme
            .select_or_empty(&query)
            .into_iter()
            .filter_map(|row| match row.get("value") {
                Some(Term::Literal(l)) => Some(l.value().to_string()),
                _ => None,
            })
            .collect()
    }

    pub fn render_property(&mut self, shape: &PropertyShapeDto) -> Option<RenderedProperty> {
        let path = shape.path.as_ref()?;
        let name = local_name(path.as_str()).to_string();
        let target = shape.node.as_ref().or(shape.class.as_ref());

        let mut base = match target {
            Some(target) => self.reference(target),
            None => {
                let json_type = JsonType::for_datatype(shape.datatype.as_ref().map(|d| d.as_ref()));
                let mut members = if json_type == JsonType::LangString {
                    self.needs_lang_string = true;
                    match self.dialect.reference(LANG_STRING_KEY) {
                        Value::Object(m) => m,
                        _ => Map::new(),
                    }
                } else {
                    json_type.members()
                };
                if let Some(datatype) = &shape.datatype {
                    if json_type != JsonType::LangString {
                        members.insert(
                            self.dialect.datatype_key().to_string(),
                            json!(datatype.as_str()),
                        );
                    }
                }
                let values = if !shape.values.is_empty() {
                    shape.values.clone()
                } else if let Some(scheme) = &shape.code_list {
                    self.codes(scheme.as_ref())
                } else {
                    Vec::new()
                };
                if !values.is_empty() {
                    members.insert(
                        "enum".into(),
                        Value::Array(values.iter().map(|v| typed_value(json_type, v)).collect()),
                    );
                }
                if let Some(pattern) = &shape.pattern {
                    members.insert("pattern".into(), json!(pattern));
                }
                if let Some(min) = shape.min_length {
                    members.insert("minLength".into(), json!(min));
                }
                if let Some(max) = shape.max_length {
                    members.insert("maxLength".into(), json!(max));
                }
                if let Some(default) = &shape.default_value {
                    members.insert("default".into(), typed_value(json_type, default));
                }
                Value::Object(members)
            }
        };

        let scalar = matches!(shape.max_count, Some(max) if max <= 1);
        let mut schema = if scalar {
            base
        } else {
            let mut array = Map::new();
            array.insert("type".into(), json!("array"));
            array.insert("items".into(), std::mem::take(&mut base));
            if let Some(min) = shape.min_count.filter(|m| *m > 0) {
                array.insert("minItems".into(), json!(min));
            }
            if let Some(max) = shape.max_count {
                array.insert("maxItems".into(), json!(max));
            }
            Value::Object(array)
        };
        if let Value::Object(members) = &mut schema {
            if let Some(title) = self.text(&shape.name) {
                members.insert("title".into(), title);
            }
            if let Some(description) = self.text(&shape.description) {
                members.insert("description".into(), description);
            }
        }
        Some(RenderedProperty {
            name,
            schema,
            required: shape.min_count.is_some_and(|m| m > 0),
        })
    }

    /// Object schema members of a class: title, description, class IRI, properties, required.
    pub fn render_class(&mut self, shape: &ClassShape) -> Map<String, Value> {
        let mut out = Map::new();
        if let Some(title) = self.text(&shape.label) {
            out.insert("title".into(), title);
        }
        if let Some(description) = self.text(&shape.comment) {
            out.insert("description".into(), description);
        }
        out.insert(
            self.dialect.class_key().to_string(),
            json!(shape.iri.as_str()),
        );
        out.insert("type".into(), json!("object"));
        let mut properties = Map::new();
        let mut required = Vec::new();
        for property in &shape.properties {
            let Some(rendered) = self.render_property(property) else {
                debug!("Skipping property shape without a path in {}", shape.iri);
                continue;
            };
            if rendered.required && !required.contains(&rendered.name) {
                required.push(rendered.name.clone());
            }
            properties.insert(rendered.name, rendered.schema);
        }
        out.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            out.insert("required".into(), json!(required));
        }
        out
    }

    /// Schema of something that is not a class: an object without properties.
    pub fn dummy(&self, iri: NamedNodeRef<'_>) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert(self.dialect.class_key().to_string(), json!(iri.as_str()));
        out.insert("type".into(), json!("object"));
        out.insert("properties".into(), json!({}));
        out
    }

    /// Renders every queued class, including classes queued while rendering.
    pub fn drain(&mut self) {
        while let Some(iri) = self.pending.pop_front() {
            let key = definition_key(iri.as_ref());
            let definition = match self.load_class(&iri) {
                Some(shape) => self.render_class(&shape),
                None => {
                    debug!("{iri} is not a class, emitting an empty definition");
                    self.dummy(iri.as_ref())
                }
            };
            self.definitions.insert(key, Value::Object(definition));
        }
    }

    pub fn insert_definition(&mut self, key: String, definition: Value) {
        self.definitions.insert(key, definition);
    }

    /// Drains the worklist and returns the definition table.
    pub fn finish(mut self) -> Map<String, Value> {
        self.drain();
        if self.needs_lang_string {
            self.definitions
                .insert(LANG_STRING_KEY.to_string(), lang_string_definition());
        }
        self.definitions
    }
}
