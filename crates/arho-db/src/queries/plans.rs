//! Query functions for the `plans` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::Plan;

/// Fields for inserting a plan row.
#[derive(Debug, Clone)]
pub struct NewPlan {
    /// Explicit row id; `None` lets the database generate one. Imports
    /// reuse the wire key here so re-imports can detect the existing row.
    pub id: Option<Uuid>,
    pub organisation_id: Uuid,
    pub plan_type_id: Uuid,
    pub lifecycle_status_id: Uuid,
    pub permanent_plan_identifier: Option<String>,
    pub producers_plan_identifier: Option<String>,
    pub matter_management_identifier: Option<String>,
    pub record_number: Option<String>,
    pub name: JsonValue,
    pub description: Option<JsonValue>,
    pub scale: Option<i64>,
    /// GeoJSON MultiPolygon, already validated by the caller.
    pub geom: JsonValue,
    pub srid: i32,
}

/// Insert a new plan row. Returns the inserted plan with server-generated
/// defaults (id, created_at).
pub async fn insert_plan(executor: impl PgExecutor<'_>, plan: &NewPlan) -> Result<Plan> {
    let row = sqlx::query_as::<_, Plan>(
        "INSERT INTO plans \
             (id, organisation_id, plan_type_id, lifecycle_status_id, \
              permanent_plan_identifier, producers_plan_identifier, \
              matter_management_identifier, record_number, \
              name, description, scale, geom, srid) \
         VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         RETURNING *",
    )
    .bind(plan.id)
    .bind(plan.organisation_id)
    .bind(plan.plan_type_id)
    .bind(plan.lifecycle_status_id)
    .bind(&plan.permanent_plan_identifier)
    .bind(&plan.producers_plan_identifier)
    .bind(&plan.matter_management_identifier)
    .bind(&plan.record_number)
    .bind(&plan.name)
    .bind(&plan.description)
    .bind(plan.scale)
    .bind(&plan.geom)
    .bind(plan.srid)
    .fetch_one(executor)
    .await
    .context("failed to insert plan")?;

    Ok(row)
}

/// Fetch a plan by its ID.
pub async fn get_plan(executor: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// List all plans, ordered by creation time (newest first).
pub async fn list_plans(executor: impl PgExecutor<'_>) -> Result<Vec<Plan>> {
    let plans = sqlx::query_as::<_, Plan>("SELECT * FROM plans ORDER BY created_at DESC")
        .fetch_all(executor)
        .await
        .context("failed to list plans")?;

    Ok(plans)
}

/// List plans flagged for export to the national API.
pub async fn list_plans_to_export(executor: impl PgExecutor<'_>) -> Result<Vec<Plan>> {
    let plans = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE to_be_exported ORDER BY created_at DESC",
    )
    .fetch_all(executor)
    .await
    .context("failed to list plans to export")?;

    Ok(plans)
}

/// Update a plan's lifecycle status with optimistic locking on the old
/// status. Returns the number of rows changed (0 means not found or the
/// status moved underneath us).
pub async fn update_plan_status(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    old_status_id: Uuid,
    new_status_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plans SET lifecycle_status_id = $1, modified_at = now() \
         WHERE id = $2 AND lifecycle_status_id = $3",
    )
    .bind(new_status_id)
    .bind(id)
    .bind(old_status_id)
    .execute(executor)
    .await
    .context("failed to update plan status")?;

    Ok(result.rows_affected())
}

/// Replace a plan's geometry. The caller validates the geometry first.
pub async fn update_plan_geometry(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    geom: &JsonValue,
) -> Result<()> {
    let result = sqlx::query("UPDATE plans SET geom = $1, modified_at = now() WHERE id = $2")
        .bind(geom)
        .bind(id)
        .execute(executor)
        .await
        .context("failed to update plan geometry")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan {id} not found");
    }

    Ok(())
}

/// Record the permanent identifier issued by the national API.
pub async fn set_permanent_identifier(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    identifier: &str,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE plans SET permanent_plan_identifier = $1, modified_at = now() WHERE id = $2",
    )
    .bind(identifier)
    .bind(id)
    .execute(executor)
    .await
    .context("failed to set permanent plan identifier")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan {id} not found");
    }

    Ok(())
}

/// Store the outcome of a validation run. A plan deleted mid-run is not an
/// error; the response is simply dropped.
pub async fn set_validation_result(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    errors: Option<&JsonValue>,
    validated_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE plans SET validation_errors = $1, validated_at = $2, modified_at = now() \
         WHERE id = $3",
    )
    .bind(errors)
    .bind(validated_at)
    .bind(id)
    .execute(executor)
    .await
    .context("failed to store validation result")?;

    Ok(result.rows_affected() > 0)
}

/// Mark a plan as exported and clear the export flag.
pub async fn set_exported(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    exported_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE plans SET exported_at = $1, to_be_exported = false, modified_at = now() \
         WHERE id = $2",
    )
    .bind(exported_at)
    .bind(id)
    .execute(executor)
    .await
    .context("failed to mark plan exported")?;

    Ok(result.rows_affected() > 0)
}

/// Delete a plan and, through cascades, everything it owns. Returns whether
/// a row was deleted.
pub async fn delete_plan(executor: impl PgExecutor<'_>, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM plans WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await
        .context("failed to delete plan")?;

    Ok(result.rows_affected() > 0)
}

/// Link a plan to a master-plan legal effect code. Idempotent.
pub async fn insert_legal_effect(
    executor: impl PgExecutor<'_>,
    plan_id: Uuid,
    legal_effect_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO plan_legal_effects (plan_id, legal_effect_id) \
         VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(plan_id)
    .bind(legal_effect_id)
    .execute(executor)
    .await
    .context("failed to link legal effect")?;

    Ok(())
}

/// List legal effect code ids for a plan.
pub async fn list_legal_effects(executor: impl PgExecutor<'_>, plan_id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT legal_effect_id FROM plan_legal_effects WHERE plan_id = $1")
            .bind(plan_id)
            .fetch_all(executor)
            .await
            .context("failed to list legal effects")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
