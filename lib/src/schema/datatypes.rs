//! XSD datatype to JSON type table.

use crate::consts::{LANG_STRING, XSD_NS};
use oxigraph::model::NamedNodeRef;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Integer,
    Number,
    Boolean,
    String { format: Option<&'static str> },
    /// `rdf:langString`, rendered as a reference to the shared multilingual string object.
    LangString,
}

impl JsonType {
    pub fn for_datatype(datatype: Option<NamedNodeRef<'_>>) -> JsonType {
        let Some(datatype) = datatype else {
            return JsonType::String { format: None };
        };
        if datatype == LANG_STRING {
            return JsonType::LangString;
        }
        let Some(local) = datatype.as_str().strip_prefix(XSD_NS) else {
            return JsonType::String { format: None };
        };
        match local {
            "integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger"
            | "positiveInteger" | "negativeInteger" | "nonPositiveInteger" | "unsignedInt"
            | "unsignedLong" | "unsignedShort" | "unsignedByte" => JsonType::Integer,
            "decimal" | "double" | "float" => JsonType::Number,
            "boolean" => JsonType::Boolean,
            "dateTime" | "dateTimeStamp" => JsonType::String {
                format: Some("date-time"),
            },
            "date" => JsonType::String {
                format: Some("date"),
            },
            "time" => JsonType::String {
                format: Some("time"),
            },
            "anyURI" => JsonType::String {
                format: Some("uri"),
            },
            _ => JsonType::String { format: None },
        }
    }

    /// `type` (and `format`) members for this type; empty for [`JsonType::LangString`].
    pub fn members(self) -> Map<String, Value> {
        let mut out = Map::new();
        match self {
            JsonType::Integer => {
                out.insert("type".into(), json!("integer"));
            }
            JsonType::Number => {
                out.insert("type".into(), json!("number"));
            }
            JsonType::Boolean => {
                out.insert("type".into(), json!("boolean"));
            }
            JsonType::String { format } => {
                out.insert("type".into(), json!("string"));
                if let Some(format) = format {
                    out.insert("format".into(), json!(format));
                }
            }
            JsonType::LangString => {}
        }
        out
    }
}

/// Definition of the multilingual string object referenced by `rdf:langString` properties.
pub fn lang_string_definition() -> Value {
    json!({
        "type": "object",
        "title": "Multilingual string",
        "description": "Object type for localized strings",
        "additionalProperties": { "type": "string" }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::*;

    #[test]
    fn test_datatype_table() {
        assert_eq!(JsonType::for_datatype(Some(XSD_INTEGER)), JsonType::Integer);
        assert_eq!(JsonType::for_datatype(Some(XSD_BOOLEAN)), JsonType::Boolean);
        assert_eq!(JsonType::for_datatype(Some(XSD_DECIMAL)), JsonType::Number);
        assert_eq!(
            JsonType::for_datatype(Some(XSD_DATE_TIME)),
            JsonType::String {
                format: Some("date-time")
            }
        );
        assert_eq!(JsonType::for_datatype(Some(LANG_STRING)), JsonType::LangString);
        assert_eq!(
            JsonType::for_datatype(Some(NamedNodeRef::new("http://ex.org/custom").unwrap())),
            JsonType::String { format: None }
        );
        assert_eq!(JsonType::for_datatype(None), JsonType::String { format: None });
        assert_eq!(
            Value::Object(JsonType::for_datatype(Some(XSD_DATE_TIME)).members()),
            json!({"type": "string", "format": "date-time"})
        );
    }
}
