//! Integration tests for the plan graph CRUD queries.
//!
//! Each test creates a unique temporary database in the shared PostgreSQL
//! instance (see `arho-test-utils`), seeds a minimal code registry and one
//! organisation, and drops the database on completion.

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use arho_db::models::{CodeList, GroupKind, ObjectKind, Organisation};
use arho_db::queries::codes::{self, NewCode};
use arho_db::queries::dates::{self, DateOwner};
use arho_db::queries::groups::{self, NewGroup};
use arho_db::queries::objects::{self, NewPlanObject};
use arho_db::queries::organisations;
use arho_db::queries::plans::{self, NewPlan};
use arho_db::queries::regulations::{self, NewRegulation};
use arho_db::value::AttributeValue;
use arho_test_utils::{create_test_db, drop_test_db};

struct Fixture {
    organisation: Organisation,
    pending_id: Uuid,
    approved_id: Uuid,
    plan_type_id: Uuid,
    regulation_type_id: Uuid,
}

/// Seed the minimal code rows and an organisation the graph queries need.
async fn seed(pool: &PgPool) -> Fixture {
    let mut ids = Vec::new();
    for (list, value) in [
        (CodeList::LifecycleStatus, "02"),
        (CodeList::LifecycleStatus, "06"),
        (CodeList::PlanType, "11"),
        (CodeList::TypeOfPlanRegulation, "asumisenAlue"),
    ] {
        let code = codes::upsert_code(pool, &NewCode::bare(list, value))
            .await
            .expect("seed code should insert");
        ids.push(code.id);
    }
    let municipality = codes::upsert_code(
        pool,
        &NewCode::bare(CodeList::Municipality, "577"),
    )
    .await
    .expect("municipality code should insert");

    let organisation = organisations::insert_organisation(
        pool,
        &json!({"fin": "Paimion kaupunki"}),
        Some("0136169-2"),
        Some(municipality.id),
        None,
    )
    .await
    .expect("organisation should insert");

    Fixture {
        organisation,
        pending_id: ids[0],
        approved_id: ids[1],
        plan_type_id: ids[2],
        regulation_type_id: ids[3],
    }
}

fn area_geom() -> serde_json::Value {
    json!({
        "type": "MultiPolygon",
        "coordinates": [[[
            [240000.0, 6700000.0],
            [241000.0, 6700000.0],
            [241000.0, 6701000.0],
            [240000.0, 6701000.0],
            [240000.0, 6700000.0]
        ]]]
    })
}

fn new_plan(fixture: &Fixture) -> NewPlan {
    NewPlan {
        id: None,
        organisation_id: fixture.organisation.id,
        plan_type_id: fixture.plan_type_id,
        lifecycle_status_id: fixture.pending_id,
        permanent_plan_identifier: None,
        producers_plan_identifier: Some("MK-2024-1".to_owned()),
        matter_management_identifier: None,
        record_number: None,
        name: json!({"fin": "Testikaava"}),
        description: None,
        scale: Some(10000),
        geom: area_geom(),
        srid: 3067,
    }
}

// -----------------------------------------------------------------------
// Plan CRUD
// -----------------------------------------------------------------------

#[tokio::test]
async fn insert_and_get_plan() {
    let (pool, db_name) = create_test_db().await;
    let fixture = seed(&pool).await;

    let plan = plans::insert_plan(&pool, &new_plan(&fixture))
        .await
        .expect("insert_plan should succeed");

    assert_eq!(plan.lifecycle_status_id, fixture.pending_id);
    assert_eq!(plan.producers_plan_identifier.as_deref(), Some("MK-2024-1"));
    assert!(!plan.to_be_exported);
    assert!(plan.validated_at.is_none());

    let fetched = plans::get_plan(&pool, plan.id)
        .await
        .expect("get_plan should succeed")
        .expect("plan should exist");
    assert_eq!(fetched.id, plan.id);
    assert_eq!(fetched.name, json!({"fin": "Testikaava"}));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn status_update_is_optimistic() {
    let (pool, db_name) = create_test_db().await;
    let fixture = seed(&pool).await;
    let plan = plans::insert_plan(&pool, &new_plan(&fixture)).await.unwrap();

    let changed =
        plans::update_plan_status(&pool, plan.id, fixture.pending_id, fixture.approved_id)
            .await
            .expect("update should succeed");
    assert_eq!(changed, 1);

    // A second update from the stale old status must not match.
    let changed =
        plans::update_plan_status(&pool, plan.id, fixture.pending_id, fixture.approved_id)
            .await
            .expect("update should succeed");
    assert_eq!(changed, 0);

    let fetched = plans::get_plan(&pool, plan.id).await.unwrap().unwrap();
    assert_eq!(fetched.lifecycle_status_id, fixture.approved_id);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn validation_and_export_bookkeeping() {
    let (pool, db_name) = create_test_db().await;
    let fixture = seed(&pool).await;
    let plan = plans::insert_plan(&pool, &new_plan(&fixture)).await.unwrap();

    let now = chrono::Utc::now();
    let errors = json!([{"errorKey": "geometry"}]);
    assert!(
        plans::set_validation_result(&pool, plan.id, Some(&errors), now)
            .await
            .unwrap()
    );
    let fetched = plans::get_plan(&pool, plan.id).await.unwrap().unwrap();
    assert_eq!(fetched.validation_errors, Some(errors));

    // A later clean validation clears the stored errors.
    assert!(
        plans::set_validation_result(&pool, plan.id, None, now)
            .await
            .unwrap()
    );
    let fetched = plans::get_plan(&pool, plan.id).await.unwrap().unwrap();
    assert!(fetched.validation_errors.is_none());
    assert!(fetched.validated_at.is_some());

    assert!(plans::set_exported(&pool, plan.id, now).await.unwrap());
    let fetched = plans::get_plan(&pool, plan.id).await.unwrap().unwrap();
    assert!(fetched.exported_at.is_some());
    assert!(!fetched.to_be_exported);

    pool.close().await;
    drop_test_db(&db_name).await;
}

// -----------------------------------------------------------------------
// Objects, groups, regulations
// -----------------------------------------------------------------------

#[tokio::test]
async fn object_group_regulation_roundtrip() {
    let (pool, db_name) = create_test_db().await;
    let fixture = seed(&pool).await;
    let plan = plans::insert_plan(&pool, &new_plan(&fixture)).await.unwrap();

    let object = objects::insert_object(
        &pool,
        &NewPlanObject {
            id: None,
            plan_id: Some(plan.id),
            kind: ObjectKind::LandUseArea,
            lifecycle_status_id: fixture.pending_id,
            type_of_underground_id: None,
            name: json!({"fin": "Asuinalue"}),
            description: None,
            source_data_object: None,
            height_min: None,
            height_max: None,
            height_unit: None,
            height_reference_point: None,
            ordering: Some(1),
            geom: area_geom(),
            srid: 3067,
        },
    )
    .await
    .expect("insert_object should succeed");
    assert_eq!(object.kind, ObjectKind::LandUseArea);

    let group = groups::insert_group(
        &pool,
        &NewGroup {
            id: None,
            plan_id: plan.id,
            kind: GroupKind::LandUseRegulations,
            short_name: Some("A".to_owned()),
            name: json!({"fin": "Asumisen määräykset"}),
            ordering: Some(1),
        },
    )
    .await
    .expect("insert_group should succeed");

    groups::attach_group_to_object(&pool, group.id, object.id)
        .await
        .expect("attach should succeed");
    // Re-attaching is a no-op, not an error.
    groups::attach_group_to_object(&pool, group.id, object.id)
        .await
        .expect("re-attach should be a no-op");

    let associations = groups::list_associations_for_plan(&pool, plan.id).await.unwrap();
    assert_eq!(associations.len(), 1);
    assert_eq!(associations[0].plan_object_id, Some(object.id));

    let regulation = regulations::insert_regulation(
        &pool,
        &NewRegulation {
            id: None,
            group_id: group.id,
            type_of_plan_regulation_id: fixture.regulation_type_id,
            lifecycle_status_id: fixture.pending_id,
            value: Some(AttributeValue::PositiveNumeric {
                number: 2400.0,
                unit: Some("k-m2".to_owned()),
            }),
            subject_identifiers: None,
            ordering: Some(1),
        },
    )
    .await
    .expect("insert_regulation should succeed");

    let listed = regulations::list_regulations_for_group(&pool, group.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, regulation.id);
    match listed[0].value.as_deref() {
        Some(AttributeValue::PositiveNumeric { number, unit }) => {
            assert_eq!(*number, 2400.0);
            assert_eq!(unit.as_deref(), Some("k-m2"));
        }
        other => panic!("unexpected stored value: {other:?}"),
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn deleting_a_plan_cascades_through_the_graph() {
    let (pool, db_name) = create_test_db().await;
    let fixture = seed(&pool).await;
    let plan = plans::insert_plan(&pool, &new_plan(&fixture)).await.unwrap();

    let group = groups::insert_group(
        &pool,
        &NewGroup {
            id: None,
            plan_id: plan.id,
            kind: GroupKind::GeneralRegulations,
            short_name: None,
            name: json!({}),
            ordering: None,
        },
    )
    .await
    .unwrap();
    let regulation = regulations::insert_regulation(
        &pool,
        &NewRegulation {
            id: None,
            group_id: group.id,
            type_of_plan_regulation_id: fixture.regulation_type_id,
            lifecycle_status_id: fixture.pending_id,
            value: None,
            subject_identifiers: None,
            ordering: None,
        },
    )
    .await
    .unwrap();
    dates::insert_lifecycle_date(
        &pool,
        fixture.pending_id,
        DateOwner::PlanRegulation(regulation.id),
        chrono::Utc::now(),
        None,
    )
    .await
    .unwrap();

    assert!(plans::delete_plan(&pool, plan.id).await.unwrap());

    assert!(groups::get_group(&pool, group.id).await.unwrap().is_none());
    let orphan_regulations = regulations::list_regulations_for_group(&pool, group.id)
        .await
        .unwrap();
    assert!(orphan_regulations.is_empty());
    let orphan_dates = dates::list_dates_for_owner(&pool, DateOwner::PlanRegulation(regulation.id))
        .await
        .unwrap();
    assert!(orphan_dates.is_empty());

    // Deleting again reports nothing deleted.
    assert!(!plans::delete_plan(&pool, plan.id).await.unwrap());

    pool.close().await;
    drop_test_db(&db_name).await;
}

// -----------------------------------------------------------------------
// Lifecycle dates
// -----------------------------------------------------------------------

#[tokio::test]
async fn closing_an_open_date_targets_only_the_open_row() {
    let (pool, db_name) = create_test_db().await;
    let fixture = seed(&pool).await;
    let plan = plans::insert_plan(&pool, &new_plan(&fixture)).await.unwrap();

    let start = chrono::Utc::now();
    dates::insert_lifecycle_date(&pool, fixture.pending_id, DateOwner::Plan(plan.id), start, None)
        .await
        .unwrap();

    let end = chrono::Utc::now();
    let closed = dates::close_open_date(&pool, DateOwner::Plan(plan.id), fixture.pending_id, end)
        .await
        .unwrap();
    assert_eq!(closed, 1);

    dates::insert_lifecycle_date(&pool, fixture.approved_id, DateOwner::Plan(plan.id), end, None)
        .await
        .unwrap();

    let periods = dates::list_dates_for_owner(&pool, DateOwner::Plan(plan.id)).await.unwrap();
    assert_eq!(periods.len(), 2);
    assert!(periods[0].ending_at.is_some());
    assert!(periods[1].ending_at.is_none());
    assert_eq!(periods[1].lifecycle_status_id, fixture.approved_id);

    // No open row of the old status remains to close.
    let closed = dates::close_open_date(&pool, DateOwner::Plan(plan.id), fixture.pending_id, end)
        .await
        .unwrap();
    assert_eq!(closed, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}
