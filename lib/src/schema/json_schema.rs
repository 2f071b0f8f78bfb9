use super::{definition_key, is_class, Dialect, ShapeWalker};
use crate::consts::{COMMENT, DEFINED_BY, LABEL, ONTOLOGY, ROOT_RESOURCE};
use crate::errors::ModelError;
use crate::options::LanguageSelection;
use crate::sparql::QueryRegistry;
use crate::store::GraphStore;
use crate::util::{export_graph, GraphExt};
use anyhow::{anyhow, Result};
use log::{debug, warn};
use oxigraph::model::{Graph, NamedNode, NamedNodeRef, NamedOrBlankNodeRef};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use url::Url;

pub const JSON_SCHEMA_DRAFT: &str = "http://json-schema.org/draft-04/schema#";

/// Classes and shapes defined by `model` in `graph`, sorted by IRI.
pub(crate) fn model_classes(graph: &Graph, model: NamedNodeRef<'_>) -> Vec<NamedNode> {
    let mut classes: Vec<NamedNode> = graph
        .subjects_for_predicate_object(DEFINED_BY, model)
        .filter_map(|s| match s {
            NamedOrBlankNodeRef::NamedNode(n) if is_class(graph, n) => Some(n.into_owned()),
            _ => None,
        })
        .collect();
    classes.sort();
    classes.dedup();
    classes
}

/// Reads the Export graph of a model, building it on the fly when it was never stored.
pub(crate) fn load_model_graph(
    core: &dyn GraphStore,
    queries: &QueryRegistry,
    model: NamedNodeRef<'_>,
) -> Result<Graph> {
    let export = export_graph(model)?;
    let graph = match core.try_get_graph(export.as_ref())? {
        Some(graph) => graph,
        None => {
            debug!("No export graph for {model}, constructing from parts");
            core.construct(&queries.export_construct(model, true)?)?
        }
    };
    if !graph.has_type(model.into(), ONTOLOGY) {
        return Err(anyhow!(ModelError::NotFound(model.as_str().to_string())));
    }
    Ok(graph)
}

/// Derives JSON Schema (draft-04) documents from classes and models in the core store.
pub struct JsonSchemaExporter {
    core: Arc<dyn GraphStore>,
    scheme: Arc<dyn GraphStore>,
    queries: Arc<QueryRegistry>,
    api_base: String,
}

impl JsonSchemaExporter {
    pub fn new(
        core: Arc<dyn GraphStore>,
        scheme: Arc<dyn GraphStore>,
        queries: Arc<QueryRegistry>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            core,
            scheme,
            queries,
            api_base: api_base.into(),
        }
    }

    /// `$id` of the document describing `iri`.
    fn schema_id(&self, iri: NamedNodeRef<'_>) -> Option<String> {
        match Url::parse(&self.api_base).and_then(|base| base.join("exportResource")) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("graph", iri.as_str());
                Some(url.to_string())
            }
            Err(e) => {
                warn!("Invalid api base {}: {e}", self.api_base);
                None
            }
        }
    }

    fn walker<'a>(&'a self, graph: &'a Graph, language: &LanguageSelection) -> ShapeWalker<'a> {
        ShapeWalker::new(
            self.core.as_ref(),
            self.scheme.as_ref(),
            &self.queries,
            graph,
            Dialect::JsonSchema,
            language.clone(),
        )
    }

    fn header(&self, iri: NamedNodeRef<'_>) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("$schema".into(), json!(JSON_SCHEMA_DRAFT));
        if let Some(id) = self.schema_id(iri) {
            out.insert("$id".into(), json!(id));
        }
        out
    }

    /// Schema of a single class. A resource that is missing or not a class yields an object
    /// schema without properties.
    pub fn class_schema(
        &self,
        class: NamedNodeRef<'_>,
        language: &LanguageSelection,
    ) -> Result<Value> {
        let graph = self.core.try_get_graph(class)?.unwrap_or_else(Graph::new);
        Ok(self.class_schema_from_graph(&graph, class, language))
    }

    pub fn class_schema_from_graph(
        &self,
        graph: &Graph,
        class: NamedNodeRef<'_>,
        language: &LanguageSelection,
    ) -> Value {
        let mut walker = self.walker(graph, language);
        let mut out = self.header(class);
        let class = class.into_owned();
        walker.mark_visited(class.as_ref());
        let body = match walker.load_class(&class) {
            Some(shape) => walker.render_class(&shape),
            None => {
                debug!("{class} is not a class, returning an empty schema");
                walker.dummy(class.as_ref())
            }
        };
        walker.drain();
        if walker.was_referenced(class.as_ref()) {
            // self references point into the definition table
            walker.insert_definition(definition_key(class.as_ref()), Value::Object(body.clone()));
        }
        out.extend(body);
        let definitions = walker.finish();
        if !definitions.is_empty() {
            out.insert("definitions".into(), Value::Object(definitions));
        }
        Value::Object(out)
    }

    /// Schema of a whole model, read from its Export graph.
    pub fn model_schema(
        &self,
        model: NamedNodeRef<'_>,
        language: &LanguageSelection,
    ) -> Result<Value> {
        let graph = load_model_graph(self.core.as_ref(), &self.queries, model)?;
        Ok(self.model_schema_from_graph(&graph, model, language))
    }

    /// Every class of the model goes into `definitions`. With a `void:rootResource` the
    /// document itself is an `allOf` over the root definition.
    pub fn model_schema_from_graph(
        &self,
        graph: &Graph,
        model: NamedNodeRef<'_>,
        language: &LanguageSelection,
    ) -> Value {
        let mut walker = self.walker(graph, language);
        let mut out = self.header(model);
        out.insert("@id".into(), json!(model.as_str()));
        let subject: NamedOrBlankNodeRef<'_> = model.into();
        if let Some(title) = walker.text(&graph.lang_map(subject, LABEL)) {
            out.insert("title".into(), title);
        }
        if let Some(description) = walker.text(&graph.lang_map(subject, COMMENT)) {
            out.insert("description".into(), description);
        }
        for class in model_classes(graph, model) {
            walker.enqueue(&class);
        }
        if let Some(root) = graph.first_iri(subject, ROOT_RESOURCE) {
            let reference = walker.reference(&root);
            out.insert("allOf".into(), json!([reference]));
        }
        out.insert("definitions".into(), Value::Object(walker.finish()));
        Value::Object(out)
    }
}
