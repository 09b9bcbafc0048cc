//! Implementation of the `arho validate` command.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use arho_core::client::{ApiClient, ApiSettings};
use arho_core::codes::CodeRegistry;
use arho_core::graph::{PlanGraph, load_plan_graph};
use arho_core::wire::plan_to_wire;
use arho_db::queries::plans;

/// The administrative area identifier a plan is validated and posted
/// under: its municipality when the organisation has one, otherwise its
/// region.
pub fn area_identifier(graph: &PlanGraph) -> Result<&str> {
    graph
        .plan
        .municipality
        .as_deref()
        .or(graph.plan.administrative_region.as_deref())
        .context("responsible organisation has neither municipality nor region")
}

/// Execute `arho validate`: run plans through the national validation
/// endpoint and store the results.
pub async fn run_validate(
    db_pool: &PgPool,
    settings: ApiSettings,
    plan_id: Option<Uuid>,
) -> Result<()> {
    let registry = CodeRegistry::load(db_pool).await?;
    let client = ApiClient::new(settings)?;

    let targets = match plan_id {
        Some(id) => {
            let plan = plans::get_plan(db_pool, id)
                .await?
                .with_context(|| format!("plan {id} not found"))?;
            vec![plan]
        }
        None => plans::list_plans_to_export(db_pool).await?,
    };

    if targets.is_empty() {
        println!("No plans flagged for export; nothing to validate.");
        return Ok(());
    }

    // One plan's failure, whether a load, serialize, or transport error,
    // only fails its own iteration.
    let mut failures = 0usize;
    for plan in &targets {
        match validate_one(db_pool, &registry, &client, plan.id).await {
            Ok(true) => {}
            Ok(false) => failures += 1,
            Err(error) => {
                println!("Plan {}: validation FAILED: {error:#}", plan.id);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} plan(s) failed validation", targets.len());
    }
    Ok(())
}

/// Validate a single plan and store the outcome. Returns whether the
/// endpoint accepted the plan.
async fn validate_one(
    db_pool: &PgPool,
    registry: &CodeRegistry,
    client: &ApiClient,
    plan_id: Uuid,
) -> Result<bool> {
    let mut conn = db_pool.acquire().await?;
    let graph = load_plan_graph(&mut conn, registry, plan_id).await?;
    drop(conn);

    let wire = plan_to_wire(&graph)?;
    let area = area_identifier(&graph)?;

    let response = client
        .validate_plan(&wire, &graph.plan.plan_type, area)
        .await?;
    let validated_at = Utc::now();

    if response.is_success() {
        plans::set_validation_result(db_pool, plan_id, None, validated_at).await?;
        println!("Plan {plan_id}: validation passed");
        if let Some(warnings) = &response.warnings {
            println!("  warnings: {warnings}");
        }
        Ok(true)
    } else {
        let errors = match &response.errors {
            Some(errors) => errors.clone(),
            None => json!({
                "status": response.status,
                "detail": response.detail,
            }),
        };
        plans::set_validation_result(db_pool, plan_id, Some(&errors), validated_at).await?;
        println!("Plan {plan_id}: validation FAILED");
        println!("  {errors}");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arho_db::models::CodeList;
    use arho_db::queries::organisations;
    use arho_db::queries::plans::NewPlan;
    use arho_test_utils::{create_test_db, drop_test_db, seed_bare_codes};
    use serde_json::json;

    fn settings() -> ApiSettings {
        // Unroutable endpoints: every transport call fails immediately.
        ApiSettings {
            public_base_url: "http://127.0.0.1:1/".to_owned(),
            public_api_key: "test-key".to_owned(),
            xroad_server_address: "127.0.0.1".to_owned(),
            xroad_port: 1,
            xroad_instance: "FI-TEST".to_owned(),
            xroad_member_class: "MUN".to_owned(),
            xroad_member_code: "0136169-2".to_owned(),
            xroad_subsystem: "arho".to_owned(),
            xroad_client_id: "test-client".to_owned(),
            xroad_client_secret: "secret".to_owned(),
        }
    }

    fn new_plan(registry: &CodeRegistry, organisation_id: Uuid, name: &str) -> NewPlan {
        NewPlan {
            id: None,
            organisation_id,
            plan_type_id: registry.id_of(CodeList::PlanType, "11").unwrap(),
            lifecycle_status_id: registry.id_of(CodeList::LifecycleStatus, "02").unwrap(),
            permanent_plan_identifier: None,
            producers_plan_identifier: None,
            matter_management_identifier: None,
            record_number: None,
            name: json!({ "fin": name }),
            description: None,
            scale: None,
            geom: json!({
                "type": "MultiPolygon",
                "coordinates": [[[[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0], [0.0, 0.0]]]]
            }),
            srid: 3067,
        }
    }

    #[tokio::test]
    async fn one_failing_plan_does_not_abort_the_batch() {
        let (pool, db_name) = create_test_db().await;
        seed_bare_codes(
            &pool,
            &[
                (CodeList::LifecycleStatus, "02"),
                (CodeList::PlanType, "11"),
                (CodeList::Municipality, "577"),
            ],
        )
        .await;
        let registry = CodeRegistry::load(&pool).await.unwrap();

        // First plan: organisation with no municipality or region, so the
        // area lookup fails before any transport. Second plan: organisation
        // with a municipality, so the failure is the transport call itself.
        let bare_org =
            organisations::insert_organisation(&pool, &json!({"fin": "Liitto"}), None, None, None)
                .await
                .unwrap();
        let municipality_id = registry.id_of(CodeList::Municipality, "577").unwrap();
        let muni_org = organisations::insert_organisation(
            &pool,
            &json!({"fin": "Paimio"}),
            None,
            Some(municipality_id),
            None,
        )
        .await
        .unwrap();
        plans::insert_plan(&pool, &new_plan(&registry, bare_org.id, "ilman aluetta"))
            .await
            .unwrap();
        plans::insert_plan(&pool, &new_plan(&registry, muni_org.id, "kunnallinen"))
            .await
            .unwrap();
        sqlx::query("UPDATE plans SET to_be_exported = true")
            .execute(&pool)
            .await
            .unwrap();

        // Both plans fail for different reasons; the batch still visits
        // both instead of aborting on the first.
        let error = run_validate(&pool, settings(), None).await.unwrap_err();
        assert!(
            error.to_string().contains("2 of 2"),
            "unexpected error: {error:#}"
        );

        pool.close().await;
        drop_test_db(&db_name).await;
    }
}
