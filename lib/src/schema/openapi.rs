use super::json_schema::{load_model_graph, model_classes};
use super::{definition_key, Dialect, ShapeWalker};
use crate::consts::{COMMENT, LABEL, MODIFIED, ROOT_RESOURCE};
use crate::options::LanguageSelection;
use crate::sparql::QueryRegistry;
use crate::store::GraphStore;
use crate::util::GraphExt;
use anyhow::Result;
use oxigraph::model::{Graph, NamedNodeRef, NamedOrBlankNodeRef};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const OPENAPI_VERSION: &str = "3.0.1";

/// Derives OpenAPI 3.0 documents from models. OpenAPI titles are plain strings, so documents
/// are always rendered in a single language.
pub struct OpenApiExporter {
    core: Arc<dyn GraphStore>,
    scheme: Arc<dyn GraphStore>,
    queries: Arc<QueryRegistry>,
    api_base: String,
    default_language: String,
}

impl OpenApiExporter {
    pub fn new(
        core: Arc<dyn GraphStore>,
        scheme: Arc<dyn GraphStore>,
        queries: Arc<QueryRegistry>,
        api_base: impl Into<String>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            core,
            scheme,
            queries,
            api_base: api_base.into(),
            default_language: default_language.into(),
        }
    }

    pub fn model_openapi(
        &self,
        model: NamedNodeRef<'_>,
        language: &LanguageSelection,
    ) -> Result<Value> {
        let graph = load_model_graph(self.core.as_ref(), &self.queries, model)?;
        Ok(self.openapi_from_graph(&graph, model, language))
    }

    pub fn openapi_from_graph(
        &self,
        graph: &Graph,
        model: NamedNodeRef<'_>,
        language: &LanguageSelection,
    ) -> Value {
        let lang = language
            .language()
            .unwrap_or(self.default_language.as_str())
            .to_string();
        let subject: NamedOrBlankNodeRef<'_> = model.into();

        let mut info = Map::new();
        let title = graph
            .lang_map(subject, LABEL)
            .remove(&lang)
            .unwrap_or_else(|| model.as_str().to_string());
        info.insert("title".into(), json!(title));
        if let Some(description) = graph.lang_map(subject, COMMENT).remove(&lang) {
            info.insert("description".into(), json!(description));
        }
        let version = graph
            .first_literal(subject, MODIFIED)
            .unwrap_or_else(|| "1.0.0".to_string());
        info.insert("version".into(), json!(version));

        let mut walker = ShapeWalker::new(
            self.core.as_ref(),
            self.scheme.as_ref(),
            &self.queries,
            graph,
            Dialect::OpenApi,
            LanguageSelection::Single(lang),
        );
        let classes = model_classes(graph, model);
        let mut paths = Map::new();
        for class in &classes {
            walker.enqueue(class);
            let key = definition_key(class.as_ref());
            let (list, item) = class_paths(&key);
            paths.insert(format!("/{key}"), list);
            paths.insert(format!("/{key}/{{id}}"), item);
        }

        let mut out = Map::new();
        out.insert("openapi".into(), json!(OPENAPI_VERSION));
        out.insert("info".into(), Value::Object(info));
        out.insert("servers".into(), json!([{ "url": self.api_base }]));
        if let Some(root) = graph.first_iri(subject, ROOT_RESOURCE) {
            let reference = walker.reference(&root);
            out.insert("x-root-resource".into(), reference);
        }
        out.insert("paths".into(), Value::Object(paths));
        out.insert(
            "components".into(),
            json!({ "schemas": Value::Object(walker.finish()) }),
        );
        Value::Object(out)
    }
}

/// GET operations for the collection and single instances of a class.
fn class_paths(key: &str) -> (Value, Value) {
    let reference = format!("#/components/schemas/{key}");
    let list = json!({
        "get": {
            "operationId": format!("list{key}"),
            "summary": format!("List {key} instances"),
            "responses": {
                "200": {
                    "description": format!("{key} instances"),
                    "content": {
                        "application/json": {
                            "schema": { "type": "array", "items": { "$ref": reference } }
                        }
                    }
                }
            }
        }
    });
    let item = json!({
        "get": {
            "operationId": format!("get{key}"),
            "summary": format!("Get a {key} instance"),
            "parameters": [{
                "name": "id",
                "in": "path",
                "required": true,
                "schema": { "type": "string" }
            }],
            "responses": {
                "200": {
                    "description": format!("{key} instance"),
                    "content": {
                        "application/json": { "schema": { "$ref": reference } }
                    }
                },
                "404": { "description": "Not found" }
            }
        }
    });
    (list, item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_paths() {
        let (list, item) = class_paths("Person");
        assert_eq!(
            list["get"]["responses"]["200"]["content"]["application/json"]["schema"]["items"]
                ["$ref"],
            "#/components/schemas/Person"
        );
        assert_eq!(item["get"]["parameters"][0]["in"], "path");
        assert!(item["get"]["responses"].get("404").is_some());
    }
}
