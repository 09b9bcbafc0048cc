//! Integration tests for the wire exchange: a plan graph serialized to the
//! national document format, read back, and imported into a register.
//!
//! Each test creates a unique temporary database in the shared PostgreSQL
//! instance (see `arho-test-utils`) and drops it on completion.

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use arho_core::codes::CodeRegistry;
use arho_core::graph::load_plan_graph;
use arho_core::lifecycle;
use arho_core::wire::{
    DeserializeError, ImportError, ImportMetadata, import_plan, plan_from_wire, plan_to_wire,
};
use arho_db::models::{CodeList, GroupKind, ObjectKind, Plan};
use arho_db::queries::codes::{self, NewCode};
use arho_db::queries::documents::{self, NewDocument};
use arho_db::queries::groups::{self, NewGroup};
use arho_db::queries::objects::NewPlanObject;
use arho_db::queries::organisations;
use arho_db::queries::plans::{self, NewPlan};
use arho_db::queries::regulations::{self, NewRegulation};
use arho_db::value::AttributeValue;
use arho_test_utils::{create_test_db, drop_test_db, seed_bare_codes};

async fn seed(pool: &PgPool) -> (CodeRegistry, Uuid) {
    seed_bare_codes(
        pool,
        &[
            (CodeList::LifecycleStatus, "02"),
            (CodeList::LifecycleStatus, "03"),
            (CodeList::PlanType, "1"),
            (CodeList::TypeOfPlanRegulation, "asumisenAlue"),
            (CodeList::TypeOfPlanRegulation, "yleismaarays"),
            (CodeList::TypeOfAdditionalInformation, "paakayttotarkoitus"),
            (CodeList::Municipality, "577"),
            (CodeList::TypeOfDocument, "03"),
        ],
    )
    .await;
    // "11" hangs under the root "1"; point classification and plan matter
    // paths resolve the root through the parent chain.
    let root = codes::get_code(pool, CodeList::PlanType, "1")
        .await
        .expect("root plan type query")
        .expect("root plan type exists");
    codes::upsert_code(
        pool,
        &NewCode {
            code_list: CodeList::PlanType,
            value: "11".to_owned(),
            short_name: None,
            name: json!({"fin": "Kokonaismaakuntakaava"}),
            description: None,
            status: None,
            level: 2,
            parent_id: Some(root.id),
        },
    )
    .await
    .expect("leaf plan type should insert");

    let registry = CodeRegistry::load(pool).await.expect("registry loads");
    let municipality_id = registry.id_of(CodeList::Municipality, "577").unwrap();

    let organisation = organisations::insert_organisation(
        pool,
        &json!({"fin": "Paimion kaupunki"}),
        Some("0136169-2"),
        Some(municipality_id),
        None,
    )
    .await
    .expect("organisation should insert");

    (registry, organisation.id)
}

fn square(origin: f64, side: f64) -> serde_json::Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [origin, origin],
            [origin + side, origin],
            [origin + side, origin + side],
            [origin, origin + side],
            [origin, origin]
        ]]
    })
}

/// A proposal-stage plan with one general group carrying a text regulation
/// and one land-use area attached to a group whose regulation is marked as
/// the primary use. Returns the plan row and the two group ids (general,
/// area).
async fn build_plan(pool: &PgPool, registry: &CodeRegistry, organisation_id: Uuid) -> (Plan, Uuid, Uuid) {
    let proposal_id = registry.id_of(CodeList::LifecycleStatus, "03").unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let plan = lifecycle::create_plan(
        &mut conn,
        NewPlan {
            id: None,
            organisation_id,
            plan_type_id: registry.id_of(CodeList::PlanType, "11").unwrap(),
            lifecycle_status_id: proposal_id,
            permanent_plan_identifier: None,
            producers_plan_identifier: Some("paimio-2024-1".to_owned()),
            matter_management_identifier: None,
            record_number: None,
            name: json!({"fin": "Keskustan asemakaava"}),
            description: Some(json!({"fin": "Keskustan täydennysrakentaminen"})),
            scale: Some(2000),
            geom: square(0.0, 1000.0),
            srid: 3067,
        },
    )
    .await
    .unwrap();

    let general = groups::insert_group(
        &mut *conn,
        &NewGroup {
            id: None,
            plan_id: plan.id,
            kind: GroupKind::GeneralRegulations,
            short_name: None,
            name: json!({"fin": "Yleiset määräykset"}),
            ordering: Some(1),
        },
    )
    .await
    .unwrap();
    groups::attach_group_to_plan(&mut *conn, general.id, plan.id)
        .await
        .unwrap();
    lifecycle::create_regulation(
        &mut conn,
        NewRegulation {
            id: None,
            group_id: general.id,
            type_of_plan_regulation_id: registry
                .id_of(CodeList::TypeOfPlanRegulation, "yleismaarays")
                .unwrap(),
            lifecycle_status_id: proposal_id,
            value: Some(AttributeValue::LocalizedText {
                text: json!({"fin": "Hulevedet käsitellään tonteilla."}),
                syntax: None,
            }),
            subject_identifiers: None,
            ordering: Some(1),
        },
    )
    .await
    .unwrap();

    let area_group = groups::insert_group(
        &mut *conn,
        &NewGroup {
            id: None,
            plan_id: plan.id,
            kind: GroupKind::LandUseRegulations,
            short_name: Some("A".to_owned()),
            name: json!({"fin": "Asumisen alue"}),
            ordering: Some(2),
        },
    )
    .await
    .unwrap();
    let regulation = lifecycle::create_regulation(
        &mut conn,
        NewRegulation {
            id: None,
            group_id: area_group.id,
            type_of_plan_regulation_id: registry
                .id_of(CodeList::TypeOfPlanRegulation, "asumisenAlue")
                .unwrap(),
            lifecycle_status_id: proposal_id,
            value: Some(AttributeValue::PositiveNumeric {
                number: 2400.0,
                unit: Some("k-m2".to_owned()),
            }),
            subject_identifiers: None,
            ordering: Some(1),
        },
    )
    .await
    .unwrap();
    regulations::insert_additional_information(
        &mut *conn,
        regulation.id,
        registry
            .id_of(CodeList::TypeOfAdditionalInformation, "paakayttotarkoitus")
            .unwrap(),
        None,
    )
    .await
    .unwrap();

    let object = lifecycle::create_plan_object(
        &mut conn,
        NewPlanObject {
            id: None,
            plan_id: Some(plan.id),
            kind: ObjectKind::LandUseArea,
            lifecycle_status_id: proposal_id,
            type_of_underground_id: None,
            name: json!({"fin": "Kortteli 1"}),
            description: None,
            source_data_object: None,
            height_min: None,
            height_max: None,
            height_unit: None,
            height_reference_point: None,
            ordering: Some(1),
            geom: square(100.0, 300.0),
            srid: 3067,
        },
    )
    .await
    .unwrap();
    groups::attach_group_to_object(&mut *conn, area_group.id, object.id)
        .await
        .unwrap();
    drop(conn);

    (plan, general.id, area_group.id)
}

fn metadata(organisation_id: Uuid) -> ImportMetadata {
    ImportMetadata {
        name: json!({"fin": "Tuotu asemakaava"}),
        organisation_id,
        plan_type: "11".to_owned(),
        permanent_plan_identifier: None,
        producers_plan_identifier: Some("ext-42".to_owned()),
    }
}

#[tokio::test]
async fn exported_document_reads_back_with_kinds_re_derived() {
    let (pool, db_name) = create_test_db().await;
    let (registry, organisation_id) = seed(&pool).await;
    let (plan, general_id, area_group_id) = build_plan(&pool, &registry, organisation_id).await;

    let mut conn = pool.acquire().await.unwrap();
    let graph = load_plan_graph(&mut conn, &registry, plan.id).await.unwrap();
    drop(conn);
    assert_eq!(graph.plan.municipality.as_deref(), Some("577"));

    let wire = plan_to_wire(&graph).expect("graph should serialize");
    assert_eq!(wire.plan_key, plan.id);
    assert!(wire.life_cycle_status.ends_with("/03"));
    assert_eq!(wire.general_regulation_groups.len(), 1);
    assert_eq!(wire.general_regulation_groups[0].general_regulation_group_key, general_id);
    assert_eq!(wire.plan_regulation_groups.len(), 1);
    assert_eq!(wire.plan_objects.len(), 1);
    assert_eq!(wire.plan_regulation_group_relations.len(), 1);
    assert_eq!(
        wire.plan_regulation_group_relations[0].plan_regulation_group_key,
        area_group_id
    );

    let imported = plan_from_wire(&registry, &wire, &metadata(organisation_id))
        .expect("wire document should read back");

    // Keys survive; kinds are re-derived from geometry and the primary-use
    // marker rather than carried on the wire.
    assert_eq!(imported.plan.id, plan.id);
    assert_eq!(imported.objects.len(), 1);
    assert_eq!(imported.objects[0].id, graph.objects[0].id);
    assert_eq!(imported.objects[0].kind, ObjectKind::LandUseArea);
    let general = imported.group(general_id).expect("general group present");
    assert_eq!(general.kind, GroupKind::GeneralRegulations);
    assert!(general.attached_to_plan);
    let area_group = imported.group(area_group_id).expect("area group present");
    assert_eq!(area_group.kind, GroupKind::LandUseRegulations);
    assert!(!area_group.attached_to_plan);

    // Regulation values make the trip intact.
    match &area_group.regulations[0].value {
        Some(AttributeValue::PositiveNumeric { number, unit }) => {
            assert_eq!(*number, 2400.0);
            assert_eq!(unit.as_deref(), Some("k-m2"));
        }
        other => panic!("unexpected regulation value {other:?}"),
    }
    assert_eq!(
        area_group.regulations[0].additional_information[0].info_type,
        "paakayttotarkoitus"
    );
    match &general.regulations[0].value {
        Some(AttributeValue::LocalizedText { text, .. }) => {
            assert_eq!(text["fin"], "Hulevedet käsitellään tonteilla.");
        }
        other => panic!("unexpected general regulation value {other:?}"),
    }

    // The wire carries no lifecycle history; the import opens fresh periods
    // in the stated status.
    assert_eq!(imported.plan.lifecycle.len(), 1);
    assert_eq!(imported.plan.lifecycle[0].status, "03");
    assert!(imported.plan.lifecycle[0].ending_at.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn import_rejects_corrupt_geometry_and_foreign_srid() {
    let (pool, db_name) = create_test_db().await;
    let (registry, organisation_id) = seed(&pool).await;
    let (plan, _, _) = build_plan(&pool, &registry, organisation_id).await;

    let mut conn = pool.acquire().await.unwrap();
    let graph = load_plan_graph(&mut conn, &registry, plan.id).await.unwrap();
    drop(conn);
    let wire = plan_to_wire(&graph).unwrap();

    // Self-intersecting bowtie in place of the plan area.
    let mut corrupt = wire.clone();
    corrupt.geographical_area.geometry = json!({
        "type": "Polygon",
        "coordinates": [[[0.0, 0.0], [1000.0, 1000.0], [1000.0, 0.0], [0.0, 1000.0], [0.0, 0.0]]]
    });
    let error = import_plan(&pool, &registry, &corrupt, &metadata(organisation_id), true)
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        ImportError::Deserialize(DeserializeError::Geometry(_))
    ));

    // SRID other than the project SRID.
    let mut foreign = wire.clone();
    foreign.geographical_area.srid = "4326".to_owned();
    let error = import_plan(&pool, &registry, &foreign, &metadata(organisation_id), true)
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        ImportError::Deserialize(DeserializeError::Geometry(_))
    ));

    // Both rejections happened before any write.
    let stored = plans::get_plan(&pool, plan.id).await.unwrap().unwrap();
    assert_eq!(stored.name, json!({"fin": "Keskustan asemakaava"}));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn documents_enter_the_wire_only_after_upload() {
    let (pool, db_name) = create_test_db().await;
    let (registry, organisation_id) = seed(&pool).await;
    let (plan, _, _) = build_plan(&pool, &registry, organisation_id).await;

    let document = documents::insert_document(
        &pool,
        &NewDocument {
            id: None,
            plan_id: plan.id,
            type_of_document_id: registry.id_of(CodeList::TypeOfDocument, "03").unwrap(),
            category_of_publicity_id: None,
            personal_data_content_id: None,
            retention_time_id: None,
            language_id: None,
            permanent_document_identifier: None,
            name: json!({"fin": "Kaavakartta"}),
            url: Some("https://example.com/kaavakartta.pdf".to_owned()),
            accessibility: false,
            document_date: None,
            arrival_date: None,
            confirmation_date: None,
            decision_date: None,
        },
    )
    .await
    .unwrap();

    // Not uploaded yet: the document stays out of the wire document.
    let mut conn = pool.acquire().await.unwrap();
    let graph = load_plan_graph(&mut conn, &registry, plan.id).await.unwrap();
    drop(conn);
    let wire = plan_to_wire(&graph).unwrap();
    assert!(wire.plan_maps.is_empty());

    let file_key = Uuid::new_v4();
    documents::set_export_result(&pool, document.id, file_key, Some("etag-1"), Utc::now())
        .await
        .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let graph = load_plan_graph(&mut conn, &registry, plan.id).await.unwrap();
    drop(conn);
    let wire = plan_to_wire(&graph).unwrap();
    assert_eq!(wire.plan_maps.len(), 1);
    assert_eq!(
        wire.plan_maps[0].file_key.as_deref(),
        Some(file_key.to_string().as_str())
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn import_refuses_to_replace_an_existing_plan() {
    let (pool, db_name) = create_test_db().await;
    let (registry, organisation_id) = seed(&pool).await;
    let (plan, _, _) = build_plan(&pool, &registry, organisation_id).await;

    let mut conn = pool.acquire().await.unwrap();
    let graph = load_plan_graph(&mut conn, &registry, plan.id).await.unwrap();
    drop(conn);
    let wire = plan_to_wire(&graph).unwrap();

    let error = import_plan(&pool, &registry, &wire, &metadata(organisation_id), false)
        .await
        .unwrap_err();
    match error {
        ImportError::PlanExists(id) => assert_eq!(id, plan.id),
        other => panic!("unexpected import error {other:?}"),
    }

    // The refused import left the stored plan untouched.
    let stored = plans::get_plan(&pool, plan.id).await.unwrap().unwrap();
    assert_eq!(stored.name, json!({"fin": "Keskustan asemakaava"}));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn import_with_overwrite_replaces_the_graph() {
    let (pool, db_name) = create_test_db().await;
    let (registry, organisation_id) = seed(&pool).await;
    let (plan, _, area_group_id) = build_plan(&pool, &registry, organisation_id).await;

    let mut conn = pool.acquire().await.unwrap();
    let graph = load_plan_graph(&mut conn, &registry, plan.id).await.unwrap();
    drop(conn);
    let wire = plan_to_wire(&graph).unwrap();

    import_plan(&pool, &registry, &wire, &metadata(organisation_id), true)
        .await
        .expect("overwrite import should succeed");

    // The replacement carries the caller-supplied identity, not the old
    // row's.
    let stored = plans::get_plan(&pool, plan.id).await.unwrap().unwrap();
    assert_eq!(stored.name, json!({"fin": "Tuotu asemakaava"}));
    assert_eq!(stored.producers_plan_identifier.as_deref(), Some("ext-42"));

    // The graph under the plan was rebuilt from the document.
    let listed_groups = groups::list_groups_for_plan(&pool, plan.id).await.unwrap();
    assert_eq!(listed_groups.len(), 2);
    let listed = regulations::list_regulations_for_group(&pool, area_group_id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    let associations = groups::list_associations_for_plan(&pool, plan.id).await.unwrap();
    // One object attachment plus the general group's plan attachment.
    assert_eq!(associations.len(), 2);

    // Re-loading through the registry proves the imported rows are
    // internally consistent.
    let mut conn = pool.acquire().await.unwrap();
    let reloaded = load_plan_graph(&mut conn, &registry, plan.id).await.unwrap();
    drop(conn);
    assert_eq!(reloaded.objects.len(), 1);
    assert_eq!(reloaded.objects[0].kind, ObjectKind::LandUseArea);

    pool.close().await;
    drop_test_db(&db_name).await;
}
