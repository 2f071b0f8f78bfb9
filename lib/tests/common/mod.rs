#![allow(dead_code)]

use datamodel::api::ModelApi;
use datamodel::config::Config;
use datamodel::mapper::{ModelDto, PropertyShapeDto, ResourceDto, ResourceKind};
use datamodel::options::ProvenanceMode;
use oxigraph::model::NamedNode;

pub const MODEL: &str = "http://ex.org/model/";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

pub fn iri(value: &str) -> NamedNode {
    NamedNode::new(value).unwrap()
}

pub fn model() -> NamedNode {
    iri(MODEL)
}

pub fn actor() -> NamedNode {
    iri("http://ex.org/users/tester")
}

pub fn init_logging() {
    datamodel::init_logging();
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn api() -> ModelApi {
    init_logging();
    ModelApi::in_memory().unwrap()
}

/// An in-memory api that records no provenance, so graphs stay comparable across calls.
pub fn api_without_provenance() -> ModelApi {
    init_logging();
    ModelApi::new(Config {
        provenance: ProvenanceMode::Disabled,
        ..Config::in_memory()
    })
    .unwrap()
}

pub fn model_dto(namespace: &str) -> ModelDto {
    let mut dto = ModelDto::new(iri(namespace), "test");
    dto.label.insert("en".into(), "Test model".into());
    dto.label.insert("fi".into(), "Testimalli".into());
    dto.languages = vec!["fi".into(), "en".into()];
    dto
}

pub fn string_property(model: &str, name: &str, min: Option<u32>, max: Option<u32>) -> PropertyShapeDto {
    PropertyShapeDto {
        path: Some(iri(&format!("{model}{name}"))),
        datatype: Some(iri(XSD_STRING)),
        min_count: min,
        max_count: max,
        ..PropertyShapeDto::default()
    }
}

/// `Person` with a required single-valued `name`.
pub fn person_dto(model: &str) -> ResourceDto {
    let mut dto = ResourceDto::new("Person", ResourceKind::Class);
    dto.label.insert("en".into(), "Person".into());
    dto.label.insert("fi".into(), "Henkilö".into());
    dto.properties = vec![string_property(model, "name", Some(1), Some(1))];
    dto
}

/// Creates the model and a `Person` class in it.
pub fn model_with_person(api: &ModelApi) -> NamedNode {
    let model = model();
    api.create_model(&model_dto(MODEL), actor().as_ref()).unwrap();
    api.create_resource(model.as_ref(), &person_dto(MODEL), actor().as_ref())
        .unwrap()
        .iri
}
