extern crate derive_builder;

pub mod api;
pub mod checks;
pub mod config;
pub mod consts;
pub mod errors;
pub mod external;
pub mod mapper;
pub mod namespace;
pub mod options;
pub mod provenance;
pub mod queries;
pub mod references;
pub mod schema;
pub mod sparql;
pub mod store;
pub mod util;

pub use api::{init_logging, ModelApi, MutationOutcome};
pub use config::Config;
pub use errors::{model_error, ModelError};

/// Anything with an IRI that can be written as `<iri>`.
pub trait ToUriString {
    fn to_uri_string(&self) -> String;
}

impl ToUriString for oxigraph::model::NamedNode {
    fn to_uri_string(&self) -> String {
        format!("<{}>", self.as_str())
    }
}

impl ToUriString for oxigraph::model::NamedNodeRef<'_> {
    fn to_uri_string(&self) -> String {
        format!("<{}>", self.as_str())
    }
}
