mod common;

use common::*;
use datamodel::api::ModelApi;
use datamodel::config::Config;
use datamodel::consts::{
    CREATED, DEFINED_BY, HAS_PART, IOW_LOCAL_NAME, MODIFIED, PROV_WAS_DERIVED_FROM, SH_CLASS,
    SH_PROPERTY, SUBJECT, VERSION_INFO,
};
use datamodel::errors::{model_error, ModelError};
use datamodel::external::{StaticConceptResolver, StaticOrganizationDirectory};
use datamodel::mapper::graph::remove_all;
use datamodel::mapper::{PropertyShapeDto, ResourceDto, ResourceKind, Status};
use datamodel::options::{ExportScope, ExportStrategy, ProvenanceMode, ProvenanceOrdering};
use datamodel::store::{GraphStore, Stores};
use datamodel::util::{fingerprint, has_part_graph, GraphExt};
use oxigraph::model::{
    Graph, Literal, NamedNodeRef, NamedOrBlankNodeRef, TermRef, Triple, TripleRef,
};
use std::collections::HashSet;
use std::sync::Arc;

fn expect_error(result: anyhow::Result<impl std::fmt::Debug>) -> ModelError {
    let err = result.expect_err("operation should fail");
    model_error(&err)
        .cloned()
        .unwrap_or_else(|| panic!("not a model error: {err:?}"))
}

#[test]
fn create_model_and_resource() {
    let api = api();
    let person = model_with_person(&api);
    assert_eq!(person.as_str(), "http://ex.org/model/Person");

    let stored = api.get_model(model().as_ref()).unwrap();
    assert_eq!(stored.prefix, "test");
    assert_eq!(stored.label.get("fi").map(String::as_str), Some("Testimalli"));

    let dto = api.get_resource(person.as_ref()).unwrap();
    assert_eq!(dto.kind, ResourceKind::Class);
    assert_eq!(dto.properties.len(), 1);
    assert_eq!(dto.properties[0].max_count, Some(1));

    let export = api
        .stores()
        .core
        .get_graph(datamodel::util::export_graph(model().as_ref()).unwrap().as_ref())
        .unwrap();
    assert!(export.contains(TripleRef::new(model().as_ref(), HAS_PART, person.as_ref())));
}

#[test]
fn duplicate_iris_are_rejected() {
    let api = api();
    model_with_person(&api);
    let err = expect_error(api.create_model(&model_dto(MODEL), actor().as_ref()));
    assert!(matches!(err, ModelError::UsedIri(_)));
    let err = expect_error(api.create_resource(
        model().as_ref(),
        &person_dto(MODEL),
        actor().as_ref(),
    ));
    assert!(matches!(err, ModelError::UsedIri(_)));
}

#[test]
fn malformed_input_touches_nothing() {
    let api = api();
    let mut dto = model_dto(MODEL);
    dto.label.insert("de".into(), "Modell".into());
    let err = expect_error(api.create_model(&dto, actor().as_ref()));
    assert_eq!(err.status_code(), 400);
    assert!(!api.stores().core.graph_exists(model().as_ref()).unwrap());

    let err = expect_error(api.create_resource(
        model().as_ref(),
        &ResourceDto::new("1nvalid", ResourceKind::Class),
        actor().as_ref(),
    ));
    assert!(matches!(err, ModelError::MalformedInput(_)));
}

#[test]
fn resource_in_missing_model_is_not_found() {
    let api = api();
    let err = expect_error(api.create_resource(
        model().as_ref(),
        &person_dto(MODEL),
        actor().as_ref(),
    ));
    assert!(matches!(err, ModelError::NotFound(_)));
}

#[test]
fn insert_member_is_idempotent() {
    let api = api();
    let person = model_with_person(&api);
    let model = model();
    api.references()
        .insert_member(person.as_ref(), model.as_ref())
        .unwrap();
    api.references()
        .insert_member(person.as_ref(), model.as_ref())
        .unwrap();
    let has_part = api
        .stores()
        .core
        .get_graph(has_part_graph(model.as_ref()).unwrap().as_ref())
        .unwrap();
    let members: Vec<_> = has_part
        .objects_for_subject_predicate(model.as_ref(), HAS_PART)
        .collect();
    assert_eq!(members.len(), 1);
}

#[test]
fn rebuild_export_is_idempotent() {
    let api = api();
    model_with_person(&api);
    let model = model();
    let first = api
        .references()
        .rebuild_export_graph(model.as_ref(), ExportScope::WithParts)
        .unwrap();
    let stored = api.references().export_fingerprint(model.as_ref()).unwrap();
    let second = api
        .references()
        .rebuild_export_graph(model.as_ref(), ExportScope::WithParts)
        .unwrap();
    assert_eq!(fingerprint(&first), fingerprint(&second));
    assert_eq!(
        stored,
        api.references().export_fingerprint(model.as_ref()).unwrap()
    );
}

#[test]
fn patched_export_matches_rebuild() {
    let api = ModelApi::new(Config {
        export_strategy: ExportStrategy::Patch,
        ..Config::in_memory()
    })
    .unwrap();
    model_with_person(&api);
    let problems = api.doctor(model().as_ref()).unwrap();
    assert!(problems.is_empty(), "{problems:?}");
}

#[test]
fn valid_model_cannot_be_deleted() {
    let api = api();
    let mut dto = model_dto(MODEL);
    dto.status = Status::Valid;
    api.create_model(&dto, actor().as_ref()).unwrap();

    let err = expect_error(api.delete_model(model().as_ref()));
    assert!(matches!(err, ModelError::Locked(_)));
    assert!(api.stores().core.graph_exists(model().as_ref()).unwrap());

    let err = expect_error(api.create_resource(
        model().as_ref(),
        &person_dto(MODEL),
        actor().as_ref(),
    ));
    assert_eq!(err.status_code(), 423);
}

#[test]
fn valid_resource_is_locked() {
    let api = api();
    let person = model_with_person(&api);
    let mut dto = person_dto_with_status(Status::Valid);
    api.update_resource(model().as_ref(), &dto, actor().as_ref())
        .unwrap();

    dto.comment.insert("en".into(), "Changed".into());
    let err = expect_error(api.update_resource(model().as_ref(), &dto, actor().as_ref()));
    assert!(matches!(err, ModelError::Locked(_)));
    let err = expect_error(api.delete_resource(model().as_ref(), person.as_ref()));
    assert!(matches!(err, ModelError::Locked(_)));
    let err = expect_error(api.delete_model(model().as_ref()));
    assert!(matches!(err, ModelError::Locked(_)));
}

#[test]
fn valid_model_locks_its_members() {
    let concept = iri("http://uri.suomi.fi/terminology/demo/c1");
    let mut description = Graph::new();
    description.insert(&Triple::new(
        concept.clone(),
        datamodel::consts::PREF_LABEL,
        Literal::new_language_tagged_literal("henkilö", "fi").unwrap(),
    ));
    let api = ModelApi::with_collaborators(
        Config::in_memory(),
        Stores::in_memory().unwrap(),
        Arc::new(StaticConceptResolver::new().with_concept(concept.clone(), description)),
        Arc::new(StaticOrganizationDirectory::new(Graph::new())),
    )
    .unwrap();
    let person = model_with_person(&api);
    let model = model();
    let mut dto = model_dto(MODEL);
    dto.status = Status::Valid;
    api.update_model(&dto, actor().as_ref()).unwrap();

    let err = expect_error(api.delete_resource(model.as_ref(), person.as_ref()));
    assert!(matches!(err, ModelError::Locked(_)));
    let err = expect_error(api.rename_resource(
        model.as_ref(),
        person.as_ref(),
        "Human",
        actor().as_ref(),
    ));
    assert!(matches!(err, ModelError::Locked(_)));
    let err = expect_error(api.update_resource(
        model.as_ref(),
        &person_dto(MODEL),
        actor().as_ref(),
    ));
    assert!(matches!(err, ModelError::Locked(_)));
    let err = expect_error(api.attach_concept(person.as_ref(), concept.as_ref(), actor().as_ref()));
    assert!(matches!(err, ModelError::Locked(_)));
    let err = expect_error(api.save_position(model.as_ref(), person.as_ref(), 1.0, 2.0));
    assert!(matches!(err, ModelError::Locked(_)));

    let core = &api.stores().core;
    assert!(core.graph_exists(person.as_ref()).unwrap());
    assert!(!core
        .graph_exists(iri(&format!("{MODEL}Human")).as_ref())
        .unwrap());
    assert_eq!(
        api.references().member_iris(model.as_ref()).unwrap(),
        vec![person.clone()]
    );
}

#[test]
fn valid_sibling_blocks_removal() {
    let api = api();
    let person = model_with_person(&api);
    let model = model();
    let mut address = ResourceDto::new("Address", ResourceKind::Class);
    address.label.insert("en".into(), "Address".into());
    address.status = Status::Valid;
    api.create_resource(model.as_ref(), &address, actor().as_ref())
        .unwrap();

    let err = expect_error(api.rename_resource(
        model.as_ref(),
        person.as_ref(),
        "Human",
        actor().as_ref(),
    ));
    assert!(matches!(err, ModelError::Locked(_)));
    let err = expect_error(api.delete_resource(model.as_ref(), person.as_ref()));
    assert!(matches!(err, ModelError::Locked(_)));
    assert!(api.stores().core.graph_exists(person.as_ref()).unwrap());

    // editing a DRAFT member is still allowed
    let mut dto = person_dto(MODEL);
    dto.comment.insert("en".into(), "Still a draft".into());
    api.update_resource(model.as_ref(), &dto, actor().as_ref())
        .unwrap();
}

#[test]
fn deleted_resource_leaves_the_diagram() {
    let api = api();
    let person = model_with_person(&api);
    let model = model();
    let mut address = ResourceDto::new("Address", ResourceKind::Class);
    address.label.insert("en".into(), "Address".into());
    let address = api
        .create_resource(model.as_ref(), &address, actor().as_ref())
        .unwrap()
        .iri;
    api.save_position(model.as_ref(), person.as_ref(), 10.0, 20.0)
        .unwrap();
    api.save_position(model.as_ref(), address.as_ref(), 30.0, 40.0)
        .unwrap();

    api.delete_resource(model.as_ref(), person.as_ref()).unwrap();
    let layout = api.references().position_graph(model.as_ref()).unwrap();
    assert!(!layout.is_empty());
    assert!(layout.iter().all(|t| {
        t.subject != NamedOrBlankNodeRef::from(person.as_ref())
            && t.object != TermRef::from(person.as_ref())
    }));
    assert!(api.doctor(model.as_ref()).unwrap().is_empty());
}

#[test]
fn background_provenance_keeps_export_fresh() {
    init_logging();
    let api = ModelApi::new(Config {
        provenance: ProvenanceMode::Background,
        provenance_ordering: ProvenanceOrdering::PerResource,
        provenance_workers: 2,
        ..Config::in_memory()
    })
    .unwrap();
    let person = model_with_person(&api);
    for i in 0..3 {
        let mut dto = person_dto(MODEL);
        dto.comment.insert("en".into(), format!("revision {i}"));
        api.update_resource(model().as_ref(), &dto, actor().as_ref())
            .unwrap();
    }
    api.shutdown();

    let problems = api.doctor(model().as_ref()).unwrap();
    assert!(problems.is_empty(), "{problems:?}");
    let stored = api.stores().core.get_graph(person.as_ref()).unwrap();
    let marker = stored
        .first_literal(person.as_ref().into(), datamodel::consts::IDENTIFIER)
        .expect("worker wrote a version marker");
    let export = api
        .stores()
        .core
        .get_graph(datamodel::util::export_graph(model().as_ref()).unwrap().as_ref())
        .unwrap();
    assert_eq!(
        export.first_literal(person.as_ref().into(), datamodel::consts::IDENTIFIER),
        Some(marker)
    );
}

fn person_dto_with_status(status: Status) -> ResourceDto {
    let mut dto = person_dto(MODEL);
    dto.status = status;
    dto
}

#[test]
fn delete_model_drops_every_graph() {
    let api = api();
    let person = model_with_person(&api);
    let model = model();
    api.save_position(model.as_ref(), person.as_ref(), 10.0, 20.0)
        .unwrap();

    let query = api.remove_model_query(model.as_ref()).unwrap();
    let text = query.as_str();
    for graph in [
        "<http://ex.org/model/>",
        "<http://ex.org/model/#HasPartGraph>",
        "<http://ex.org/model/#ExportGraph>",
        "<http://ex.org/model/#PositionGraph>",
        "<http://ex.org/model/Person>",
    ] {
        assert!(
            text.contains(&format!("DROP SILENT GRAPH {graph}")),
            "{graph} missing from {text}"
        );
    }

    api.delete_model(model.as_ref()).unwrap();
    assert!(!api.stores().core.graph_exists(model.as_ref()).unwrap());
    assert!(!api.stores().core.graph_exists(person.as_ref()).unwrap());
    let err = expect_error(api.get_model(model.as_ref()));
    assert!(matches!(err, ModelError::NotFound(_)));
}

#[test]
fn update_keeps_creation_time() {
    let api = api();
    let person = model_with_person(&api);
    let before = api.get_resource(person.as_ref()).unwrap();
    assert!(before.created.is_some());

    let mut dto = person_dto(MODEL);
    dto.comment.insert("en".into(), "A human being".into());
    api.update_resource(model().as_ref(), &dto, actor().as_ref())
        .unwrap();
    let after = api.get_resource(person.as_ref()).unwrap();
    assert_eq!(after.created, before.created);
    assert_eq!(
        after.comment.get("en").map(String::as_str),
        Some("A human being")
    );

    let mut model_update = model_dto(MODEL);
    model_update.status = Status::Draft;
    let created = api.get_model(model().as_ref()).unwrap().created;
    api.update_model(&model_update, actor().as_ref()).unwrap();
    let stored = api.get_model(model().as_ref()).unwrap();
    assert_eq!(stored.created, created);
    assert_eq!(stored.status, Status::Draft);
}

#[test]
fn delete_resource_updates_membership() {
    let api = api();
    let person = model_with_person(&api);
    api.delete_resource(model().as_ref(), person.as_ref())
        .unwrap();
    assert!(!api.stores().core.graph_exists(person.as_ref()).unwrap());
    assert!(api
        .references()
        .member_iris(model().as_ref())
        .unwrap()
        .is_empty());
    assert!(api.doctor(model().as_ref()).unwrap().is_empty());
}

/// A class whose property points at `Person` through `sh:class`.
fn address() -> ResourceDto {
    let mut dto = ResourceDto::new("Address", ResourceKind::Class);
    dto.properties = vec![PropertyShapeDto {
        path: Some(iri(&format!("{MODEL}resident"))),
        class: Some(iri(&format!("{MODEL}Person"))),
        ..PropertyShapeDto::default()
    }];
    dto
}

fn without_modified(mut graph: Graph, subject: NamedNodeRef<'_>) -> Graph {
    remove_all(&mut graph, subject, MODIFIED);
    graph
}

#[test]
fn rename_round_trip_restores_graphs() {
    let api = api_without_provenance();
    let person = model_with_person(&api);
    let model = model();
    let address = api
        .create_resource(model.as_ref(), &address(), actor().as_ref())
        .unwrap()
        .iri;
    api.save_position(model.as_ref(), person.as_ref(), 1.0, 2.0)
        .unwrap();
    let core = api.stores().core.clone();
    let person_before = without_modified(core.get_graph(person.as_ref()).unwrap(), person.as_ref());
    let address_before = core.get_graph(address.as_ref()).unwrap();
    let positions_before = api.references().position_graph(model.as_ref()).unwrap();

    let human = api
        .rename_resource(model.as_ref(), person.as_ref(), "Human", actor().as_ref())
        .unwrap()
        .iri;
    assert_eq!(human.as_str(), "http://ex.org/model/Human");
    assert!(!core.graph_exists(person.as_ref()).unwrap());
    let renamed = core.get_graph(human.as_ref()).unwrap();
    assert_eq!(
        renamed.first_literal(human.as_ref().into(), IOW_LOCAL_NAME),
        Some("Human".to_string())
    );
    let address_graph = core.get_graph(address.as_ref()).unwrap();
    let shape = address_graph
        .object_for_subject_predicate(address.as_ref(), SH_PROPERTY)
        .unwrap();
    let target = match shape {
        oxigraph::model::TermRef::BlankNode(b) => address_graph
            .object_for_subject_predicate(b, SH_CLASS)
            .map(|t| t.into_owned()),
        _ => None,
    };
    assert_eq!(target, Some(human.clone().into()));
    assert_eq!(
        api.references().member_iris(model.as_ref()).unwrap(),
        vec![address.clone(), human.clone()]
    );

    api.rename_resource(model.as_ref(), human.as_ref(), "Person", actor().as_ref())
        .unwrap();
    let person_after = without_modified(core.get_graph(person.as_ref()).unwrap(), person.as_ref());
    assert_eq!(fingerprint(&person_after), fingerprint(&person_before));
    assert_eq!(
        fingerprint(&core.get_graph(address.as_ref()).unwrap()),
        fingerprint(&address_before)
    );
    assert_eq!(
        fingerprint(&api.references().position_graph(model.as_ref()).unwrap()),
        fingerprint(&positions_before)
    );
    assert!(api.doctor(model.as_ref()).unwrap().is_empty());
}

#[test]
fn rename_onto_existing_iri_fails_cleanly() {
    let api = api();
    let person = model_with_person(&api);
    let address = api
        .create_resource(model().as_ref(), &address(), actor().as_ref())
        .unwrap()
        .iri;
    let err = expect_error(api.rename_resource(
        model().as_ref(),
        person.as_ref(),
        "Address",
        actor().as_ref(),
    ));
    assert!(matches!(err, ModelError::UsedIri(_)));
    assert!(api.stores().core.graph_exists(person.as_ref()).unwrap());
    assert!(api.stores().core.graph_exists(address.as_ref()).unwrap());
}

#[test]
fn copy_resource_into_other_model() {
    let api = api();
    let person = model_with_person(&api);
    let target = iri("http://ex.org/other/");
    let mut dto = model_dto(target.as_str());
    dto.prefix = "other".into();
    api.create_model(&dto, actor().as_ref()).unwrap();

    let copy = api
        .copy_resource(person.as_ref(), target.as_ref(), None, actor().as_ref())
        .unwrap()
        .iri;
    assert_eq!(copy.as_str(), "http://ex.org/other/Person");
    let graph = api.stores().core.get_graph(copy.as_ref()).unwrap();
    assert!(graph.contains(TripleRef::new(copy.as_ref(), DEFINED_BY, target.as_ref())));
    assert!(graph.contains(TripleRef::new(
        copy.as_ref(),
        PROV_WAS_DERIVED_FROM,
        person.as_ref()
    )));
    assert_eq!(
        graph.first_literal(copy.as_ref().into(), VERSION_INFO),
        Some("DRAFT".to_string())
    );
    assert_eq!(
        api.references().member_iris(target.as_ref()).unwrap(),
        vec![copy.clone()]
    );
    // the source is untouched
    assert!(api
        .stores()
        .core
        .get_graph(person.as_ref())
        .unwrap()
        .contains(TripleRef::new(person.as_ref(), DEFINED_BY, model().as_ref())));
}

#[test]
fn attach_concept_caches_description() {
    let concept = iri("http://uri.suomi.fi/terminology/demo/c1");
    let mut description = Graph::new();
    description.insert(&Triple::new(
        concept.clone(),
        datamodel::consts::PREF_LABEL,
        Literal::new_language_tagged_literal("henkilö", "fi").unwrap(),
    ));
    let api = ModelApi::with_collaborators(
        Config::in_memory(),
        Stores::in_memory().unwrap(),
        Arc::new(StaticConceptResolver::new().with_concept(concept.clone(), description)),
        Arc::new(StaticOrganizationDirectory::new(Graph::new())),
    )
    .unwrap();
    let person = model_with_person(&api);

    api.attach_concept(person.as_ref(), concept.as_ref(), actor().as_ref())
        .unwrap();
    let graph = api.stores().core.get_graph(person.as_ref()).unwrap();
    assert!(graph.contains(TripleRef::new(person.as_ref(), SUBJECT, concept.as_ref())));
    assert!(api.stores().imports.graph_exists(concept.as_ref()).unwrap());
    // created survives the change
    assert!(graph
        .object_for_subject_predicate(person.as_ref(), CREATED)
        .is_some());

    let missing = iri("http://uri.suomi.fi/terminology/demo/c2");
    let err = expect_error(api.attach_concept(person.as_ref(), missing.as_ref(), actor().as_ref()));
    assert!(matches!(err, ModelError::NotFound(_)));
}

#[test]
fn synchronous_provenance_returns_versions() {
    let api = api();
    let person = model_with_person(&api);
    let outcome = api
        .update_resource(model().as_ref(), &person_dto(MODEL), actor().as_ref())
        .unwrap();
    let version = outcome.version.expect("synchronous mode records inline");
    let history = api.history(person.as_ref()).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|entry| entry.id == version.as_str()));
    let stored = api.stores().core.get_graph(person.as_ref()).unwrap();
    assert_eq!(
        stored.first_literal(person.as_ref().into(), datamodel::consts::IDENTIFIER),
        Some(version.as_str().to_string())
    );
}

#[test]
fn per_resource_provenance_chain_is_linear() {
    let api = ModelApi::new(Config {
        provenance: ProvenanceMode::Background,
        provenance_ordering: ProvenanceOrdering::PerResource,
        provenance_workers: 4,
        ..Config::in_memory()
    })
    .unwrap();
    let person = model_with_person(&api);
    for i in 0..5 {
        let mut dto = person_dto(MODEL);
        dto.comment.insert("en".into(), format!("revision {i}"));
        let outcome = api
            .update_resource(model().as_ref(), &dto, actor().as_ref())
            .unwrap();
        assert!(outcome.version.is_none());
    }
    api.shutdown();

    let history = api.history(person.as_ref()).unwrap();
    assert_eq!(history.len(), 6);
    let ids: HashSet<&str> = history.iter().map(|e| e.id.as_str()).collect();
    let previous: Vec<&str> = history
        .iter()
        .filter_map(|e| e.previous.as_deref())
        .collect();
    assert_eq!(previous.len(), 5, "exactly one version starts the chain");
    let distinct: HashSet<&str> = previous.iter().copied().collect();
    assert_eq!(distinct.len(), 5, "no version is revised twice");
    assert!(distinct.is_subset(&ids));
}

#[test]
fn search_finds_labels() {
    let api = api();
    let person = model_with_person(&api);
    let hits = api.search(Some(model().as_ref()), "henk", Some("fi")).unwrap();
    assert!(hits
        .subjects_for_predicate_object(DEFINED_BY, model().as_ref())
        .any(|s| s == NamedOrBlankNodeRef::from(person.as_ref())));

    let err = expect_error(api.search(None, "  ", None));
    assert!(matches!(err, ModelError::MalformedInput(_)));
}

#[test]
fn reconcile_repairs_membership() {
    let api = api();
    let person = model_with_person(&api);
    let model = model();
    api.references()
        .remove_member(person.as_ref(), model.as_ref())
        .unwrap();
    assert!(!api.doctor(model.as_ref()).unwrap().is_empty());

    let report = api.reconcile(model.as_ref()).unwrap();
    assert_eq!(report.added, vec![person.as_str().to_string()]);
    assert!(api.doctor(model.as_ref()).unwrap().is_empty());
    assert!(api.reconcile(model.as_ref()).unwrap().is_clean());
}

#[test]
fn export_graph_declares_model_prefix() {
    let api = api();
    model_with_person(&api);
    let bytes = api
        .export_graph(model().as_ref(), oxigraph::io::RdfFormat::Turtle)
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("@prefix test: <http://ex.org/model/>"), "{text}");
    assert!(text.contains("test:Person"), "{text}");
}

#[test]
fn offline_namespace_resolution() {
    let api = api();
    let resolution = api.resolve_namespace("http://ex.org/unknown#").unwrap();
    assert!(!resolution.is_resolved());
    assert!(api.organizations().unwrap().is_empty());
}
