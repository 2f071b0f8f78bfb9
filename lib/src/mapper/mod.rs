//! Translation between structured model/resource descriptions and OWL/SHACL/SKOS graphs.
//!
//! IRIs are derived from the model namespace and the local name: a namespace ending in `/` or
//! `#` is concatenated, any other namespace gets a `#` fragment. Parsing tolerates absent
//! optional values.

pub mod dto;
pub mod graph;

pub use dto::{LangMap, ModelDto, PropertyShapeDto, ResourceDto, ResourceKind, Status};
pub use graph::{
    build_model_graph, build_resource_graph, parse_model_graph, parse_property_shape,
    parse_resource_graph, retarget_graph, validate_language_map, validate_local_name,
    validate_prefix,
};
