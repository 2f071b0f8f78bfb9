//! Structured descriptions of models and resources exchanged with the endpoint layer.

use chrono::{DateTime, Utc};
use oxigraph::model::NamedNode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, skip_serializing_none, DeserializeAs, SerializeAs};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Language tag to text.
pub type LangMap = BTreeMap<String, String>;

/// serde adapter storing a [`NamedNode`] as its IRI string; invalid IRIs fail to deserialize.
pub struct Iri;

impl SerializeAs<NamedNode> for Iri {
    fn serialize_as<S>(source: &NamedNode, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(source.as_str())
    }
}

impl<'de> DeserializeAs<'de, NamedNode> for Iri {
    fn deserialize_as<D>(deserializer: D) -> Result<NamedNode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NamedNode::new(s).map_err(serde::de::Error::custom)
    }
}

/// Lifecycle status, stored as the `owl:versionInfo` literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Incomplete,
    Draft,
    Suggested,
    Valid,
    Superseded,
    Retired,
    Invalid,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Incomplete => "INCOMPLETE",
            Status::Draft => "DRAFT",
            Status::Suggested => "SUGGESTED",
            Status::Valid => "VALID",
            Status::Superseded => "SUPERSEDED",
            Status::Retired => "RETIRED",
            Status::Invalid => "INVALID",
        }
    }

    /// VALID content may not be changed or removed.
    pub fn is_locked(self) -> bool {
        self == Status::Valid
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "INCOMPLETE" => Status::Incomplete,
            "DRAFT" => Status::Draft,
            "SUGGESTED" => Status::Suggested,
            "VALID" => Status::Valid,
            "SUPERSEDED" => Status::Superseded,
            "RETIRED" => Status::Retired,
            "INVALID" => Status::Invalid,
            other => return Err(format!("Unknown status {other}")),
        })
    }
}

#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDto {
    /// Namespace IRI of the model; also the name of the model graph.
    #[serde_as(as = "Iri")]
    pub namespace: NamedNode,
    pub prefix: String,
    #[serde(default)]
    pub label: LangMap,
    #[serde(default)]
    pub description: LangMap,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub status: Status,
    #[serde_as(as = "Vec<Iri>")]
    #[serde(default)]
    pub organizations: Vec<NamedNode>,
    #[serde_as(as = "Vec<Iri>")]
    #[serde(default)]
    pub groups: Vec<NamedNode>,
    /// Namespaces the model depends on (`dcterms:requires`).
    #[serde_as(as = "Vec<Iri>")]
    #[serde(default)]
    pub required_namespaces: Vec<NamedNode>,
    #[serde_as(as = "Option<Iri>")]
    pub root_resource: Option<NamedNode>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl ModelDto {
    pub fn new(namespace: NamedNode, prefix: impl Into<String>) -> Self {
        ModelDto {
            namespace,
            prefix: prefix.into(),
            label: LangMap::new(),
            description: LangMap::new(),
            languages: Vec::new(),
            status: Status::default(),
            organizations: Vec::new(),
            groups: Vec::new(),
            required_namespaces: Vec::new(),
            root_resource: None,
            created: None,
            modified: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    /// `owl:Class` carrying its property shapes.
    Class,
    /// `sh:NodeShape`.
    Shape,
    /// `owl:DatatypeProperty`.
    Attribute,
    /// `owl:ObjectProperty`.
    Association,
    /// Stand-alone `sh:PropertyShape` referenced from shapes by IRI.
    PropertyShape,
}

impl ResourceKind {
    pub fn has_property_shapes(self) -> bool {
        matches!(self, ResourceKind::Class | ResourceKind::Shape)
    }
}

/// SHACL constraints of one property. Absent constraints are `None`.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyShapeDto {
    #[serde_as(as = "Option<Iri>")]
    pub path: Option<NamedNode>,
    #[serde(default)]
    pub name: LangMap,
    #[serde(default)]
    pub description: LangMap,
    #[serde_as(as = "Option<Iri>")]
    pub datatype: Option<NamedNode>,
    /// `sh:class`
    #[serde_as(as = "Option<Iri>")]
    pub class: Option<NamedNode>,
    /// `sh:node`, a reference to another shape.
    #[serde_as(as = "Option<Iri>")]
    pub node: Option<NamedNode>,
    pub min_count: Option<u32>,
    pub max_count: Option<u32>,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub pattern: Option<String>,
    /// `sh:in` values, in list order.
    #[serde(default)]
    pub values: Vec<String>,
    pub default_value: Option<String>,
    /// External code list (`dcam:memberOf`).
    #[serde_as(as = "Option<Iri>")]
    pub code_list: Option<NamedNode>,
    pub index: Option<u32>,
}

#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDto {
    pub local_name: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub label: LangMap,
    #[serde(default)]
    pub comment: LangMap,
    pub editorial_note: Option<String>,
    #[serde(default)]
    pub status: Status,
    /// Linked concept (`dcterms:subject`).
    #[serde_as(as = "Option<Iri>")]
    pub subject: Option<NamedNode>,
    #[serde_as(as = "Vec<Iri>")]
    #[serde(default)]
    pub sub_class_of: Vec<NamedNode>,
    #[serde_as(as = "Vec<Iri>")]
    #[serde(default)]
    pub sub_property_of: Vec<NamedNode>,
    #[serde_as(as = "Option<Iri>")]
    pub domain: Option<NamedNode>,
    #[serde_as(as = "Option<Iri>")]
    pub range: Option<NamedNode>,
    #[serde_as(as = "Option<Iri>")]
    pub target_class: Option<NamedNode>,
    /// Property shapes embedded in a class or node shape, in `sh:index` order.
    #[serde(default)]
    pub properties: Vec<PropertyShapeDto>,
    /// Stand-alone property shapes referenced by IRI.
    #[serde_as(as = "Vec<Iri>")]
    #[serde(default)]
    pub property_refs: Vec<NamedNode>,
    /// Constraints of a stand-alone property shape resource.
    pub constraints: Option<PropertyShapeDto>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl ResourceDto {
    pub fn new(local_name: impl Into<String>, kind: ResourceKind) -> Self {
        ResourceDto {
            local_name: local_name.into(),
            kind,
            label: LangMap::new(),
            comment: LangMap::new(),
            editorial_note: None,
            status: Status::default(),
            subject: None,
            sub_class_of: Vec::new(),
            sub_property_of: Vec::new(),
            domain: None,
            range: None,
            target_class: None,
            properties: Vec::new(),
            property_refs: Vec::new(),
            constraints: None,
            created: None,
            modified: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!("valid".parse::<Status>().unwrap(), Status::Valid);
        assert!(Status::Valid.is_locked());
        assert!(!Status::Draft.is_locked());
        assert!("bogus".parse::<Status>().is_err());
        assert_eq!(serde_json::to_string(&Status::Draft).unwrap(), "\"DRAFT\"");
    }

    #[test]
    fn test_resource_json_validates_iris() {
        let ok = r#"{"localName":"Person","kind":"class","subClassOf":["http://ex.org/Agent"]}"#;
        let dto: ResourceDto = serde_json::from_str(ok).unwrap();
        assert_eq!(dto.sub_class_of[0].as_str(), "http://ex.org/Agent");
        assert_eq!(dto.status, Status::Incomplete);

        let bad = r#"{"localName":"Person","kind":"class","subClassOf":["not an iri"]}"#;
        assert!(serde_json::from_str::<ResourceDto>(bad).is_err());

        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("domain").is_none());
    }
}
