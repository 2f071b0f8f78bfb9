mod common;

use common::*;
use datamodel::api::ModelApi;
use datamodel::consts::{IN_SCHEME, PREF_LABEL};
use datamodel::errors::{model_error, ModelError};
use datamodel::mapper::{PropertyShapeDto, ResourceDto, ResourceKind};
use datamodel::store::GraphStore;
use oxigraph::model::{Graph, Literal, NamedNode, Triple};
use serde_json::json;

fn class_with(api: &ModelApi, local_name: &str, properties: Vec<PropertyShapeDto>) -> NamedNode {
    let mut dto = ResourceDto::new(local_name, ResourceKind::Class);
    dto.label.insert("en".into(), local_name.into());
    dto.properties = properties;
    api.create_resource(model().as_ref(), &dto, actor().as_ref())
        .unwrap()
        .iri
}

#[test]
fn person_class_schema() {
    let api = api();
    let person = model_with_person(&api);
    let schema = api.export_schema(person.as_ref(), None).unwrap();
    assert_eq!(schema["type"], "object");
    assert_eq!(
        schema["properties"],
        json!({ "name": { "type": "string", "@type": XSD_STRING } })
    );
    assert_eq!(schema["required"], json!(["name"]));
    assert_eq!(schema["@id"], person.as_str());
    assert!(schema.get("definitions").is_none());
}

#[test]
fn cardinality_decides_arrays() {
    let api = api();
    api.create_model(&model_dto(MODEL), actor().as_ref()).unwrap();
    let class = class_with(
        &api,
        "Document",
        vec![
            string_property(MODEL, "title", Some(1), Some(1)),
            string_property(MODEL, "keyword", None, Some(3)),
            string_property(MODEL, "note", Some(2), None),
        ],
    );
    let schema = api.export_schema(class.as_ref(), Some("en")).unwrap();
    let properties = &schema["properties"];
    assert_eq!(properties["title"]["type"], "string");
    assert_eq!(properties["keyword"]["type"], "array");
    assert_eq!(properties["keyword"]["maxItems"], 3);
    assert!(properties["keyword"].get("minItems").is_none());
    assert_eq!(properties["keyword"]["items"]["type"], "string");
    assert_eq!(properties["note"]["type"], "array");
    assert_eq!(properties["note"]["minItems"], 2);
    assert_eq!(schema["required"], json!(["title", "note"]));
}

#[test]
fn enum_keeps_list_order() {
    let api = api();
    api.create_model(&model_dto(MODEL), actor().as_ref()).unwrap();
    let mut grade = string_property(MODEL, "grade", None, Some(1));
    grade.values = vec!["C".into(), "A".into(), "B".into()];
    let class = class_with(&api, "Exam", vec![grade]);
    let schema = api.export_schema(class.as_ref(), Some("en")).unwrap();
    assert_eq!(schema["properties"]["grade"]["enum"], json!(["C", "A", "B"]));
}

#[test]
fn code_list_becomes_enum() {
    let api = api();
    api.create_model(&model_dto(MODEL), actor().as_ref()).unwrap();
    let scheme = iri("http://uri.suomi.fi/codelist/demo/colors");
    let mut codes = Graph::new();
    for code in ["red", "blue", "green"] {
        let node = iri(&format!("{}/code/{code}", scheme.as_str()));
        codes.insert(&Triple::new(node.clone(), IN_SCHEME, scheme.clone()));
        codes.insert(&Triple::new(
            node,
            PREF_LABEL,
            Literal::new_language_tagged_literal(code, "en").unwrap(),
        ));
    }
    api.stores()
        .scheme
        .put_graph(scheme.as_ref(), &codes)
        .unwrap();

    let mut color = string_property(MODEL, "color", None, Some(1));
    color.code_list = Some(scheme.clone());
    let class = class_with(&api, "Car", vec![color]);
    let schema = api.export_schema(class.as_ref(), Some("en")).unwrap();
    assert_eq!(
        schema["properties"]["color"]["enum"],
        json!([
            "http://uri.suomi.fi/codelist/demo/colors/code/blue",
            "http://uri.suomi.fi/codelist/demo/colors/code/green",
            "http://uri.suomi.fi/codelist/demo/colors/code/red"
        ])
    );
}

#[test]
fn references_between_classes() {
    let api = api();
    let person = model_with_person(&api);
    let friend = PropertyShapeDto {
        path: Some(iri(&format!("{MODEL}friend"))),
        class: Some(person.clone()),
        ..PropertyShapeDto::default()
    };
    let club = class_with(&api, "Club", vec![friend]);
    let schema = api.export_schema(club.as_ref(), Some("en")).unwrap();
    assert_eq!(
        schema["properties"]["friend"]["items"]["$ref"],
        "#/definitions/Person"
    );
    assert_eq!(
        schema["definitions"]["Person"]["properties"]["name"]["type"],
        "string"
    );
}

#[test]
fn multilingual_titles() {
    let api = api();
    let person = model_with_person(&api);
    let schema = api.export_schema(person.as_ref(), Some("*")).unwrap();
    assert_eq!(schema["title"], json!({ "en": "Person", "fi": "Henkilö" }));
    let schema = api.export_schema(person.as_ref(), Some("fi")).unwrap();
    assert_eq!(schema["title"], "Henkilö");

    let err = api.export_schema(person.as_ref(), Some("de")).unwrap_err();
    assert!(matches!(model_error(&err), Some(ModelError::MalformedInput(_))));
}

#[test]
fn model_schema_with_root_resource() {
    let api = api();
    let person = model_with_person(&api);
    let mut dto = model_dto(MODEL);
    dto.root_resource = Some(person.clone());
    api.update_model(&dto, actor().as_ref()).unwrap();

    let schema = api.export_schema(model().as_ref(), Some("en")).unwrap();
    assert_eq!(schema["@id"], MODEL);
    assert_eq!(schema["title"], "Test model");
    assert_eq!(schema["allOf"], json!([{ "$ref": "#/definitions/Person" }]));
    assert_eq!(
        schema["definitions"]["Person"]["required"],
        json!(["name"])
    );
}

#[test]
fn missing_model_schema_is_not_found() {
    let api = api();
    let schema = api
        .export_schema(iri("http://ex.org/nothing/Here").as_ref(), None)
        .unwrap();
    assert_eq!(schema["properties"], json!({}));

    let err = api.export_openapi(model().as_ref(), None).unwrap_err();
    assert!(matches!(model_error(&err), Some(ModelError::NotFound(_))));
}

#[test]
fn openapi_document() {
    let api = api();
    model_with_person(&api);
    let doc = api.export_openapi(model().as_ref(), Some("en")).unwrap();
    assert_eq!(doc["openapi"], "3.0.1");
    assert_eq!(doc["info"]["title"], "Test model");
    let person = &doc["components"]["schemas"]["Person"];
    assert_eq!(person["title"], "Person");
    assert_eq!(person["x-rdf-type"], "http://ex.org/model/Person");
    assert_eq!(
        person["properties"]["name"]["x-rdf-datatype"],
        XSD_STRING
    );
    assert_eq!(
        doc["paths"]["/Person/{id}"]["get"]["responses"]["200"]["content"]["application/json"]
            ["schema"]["$ref"],
        "#/components/schemas/Person"
    );

    // without a language the default one is used
    let doc = api.export_openapi(model().as_ref(), None).unwrap();
    assert_eq!(doc["info"]["title"], "Testimalli");
}
