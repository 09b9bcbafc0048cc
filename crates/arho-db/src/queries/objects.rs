//! Query functions for the `plan_objects` table.

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{ObjectKind, PlanObject};

/// Fields for inserting a plan object row.
#[derive(Debug, Clone)]
pub struct NewPlanObject {
    /// Explicit row id; `None` lets the database generate one.
    pub id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub kind: ObjectKind,
    pub lifecycle_status_id: Uuid,
    pub type_of_underground_id: Option<Uuid>,
    pub name: JsonValue,
    pub description: Option<JsonValue>,
    pub source_data_object: Option<String>,
    pub height_min: Option<f64>,
    pub height_max: Option<f64>,
    pub height_unit: Option<String>,
    pub height_reference_point: Option<String>,
    pub ordering: Option<i32>,
    /// GeoJSON multi-geometry, already validated by the caller.
    pub geom: JsonValue,
    pub srid: i32,
}

/// Insert a new plan object row.
pub async fn insert_object(
    executor: impl PgExecutor<'_>,
    object: &NewPlanObject,
) -> Result<PlanObject> {
    let row = sqlx::query_as::<_, PlanObject>(
        "INSERT INTO plan_objects \
             (id, plan_id, kind, lifecycle_status_id, type_of_underground_id, \
              name, description, source_data_object, \
              height_min, height_max, height_unit, height_reference_point, \
              ordering, geom, srid) \
         VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         RETURNING *",
    )
    .bind(object.id)
    .bind(object.plan_id)
    .bind(object.kind)
    .bind(object.lifecycle_status_id)
    .bind(object.type_of_underground_id)
    .bind(&object.name)
    .bind(&object.description)
    .bind(&object.source_data_object)
    .bind(object.height_min)
    .bind(object.height_max)
    .bind(&object.height_unit)
    .bind(&object.height_reference_point)
    .bind(object.ordering)
    .bind(&object.geom)
    .bind(object.srid)
    .fetch_one(executor)
    .await
    .context("failed to insert plan object")?;

    Ok(row)
}

/// Fetch a plan object by id.
pub async fn get_object(executor: impl PgExecutor<'_>, id: Uuid) -> Result<Option<PlanObject>> {
    let object = sqlx::query_as::<_, PlanObject>("SELECT * FROM plan_objects WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch plan object")?;

    Ok(object)
}

/// List the objects of a plan, ordered for stable output.
pub async fn list_objects_for_plan(
    executor: impl PgExecutor<'_>,
    plan_id: Uuid,
) -> Result<Vec<PlanObject>> {
    let objects = sqlx::query_as::<_, PlanObject>(
        "SELECT * FROM plan_objects WHERE plan_id = $1 \
         ORDER BY kind, ordering NULLS LAST, created_at",
    )
    .bind(plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list plan objects")?;

    Ok(objects)
}

/// Move objects of a plan from one lifecycle status to another. Returns the
/// ids of the rows that changed, so the caller can roll their date history
/// forward in the same transaction.
pub async fn propagate_object_status(
    executor: impl PgExecutor<'_>,
    plan_id: Uuid,
    old_status_id: Uuid,
    new_status_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "UPDATE plan_objects SET lifecycle_status_id = $1, modified_at = now() \
         WHERE plan_id = $2 AND lifecycle_status_id = $3 \
         RETURNING id",
    )
    .bind(new_status_id)
    .bind(plan_id)
    .bind(old_status_id)
    .fetch_all(executor)
    .await
    .context("failed to propagate status to plan objects")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Attach an unassociated object to a plan, adopting the plan's status.
pub async fn attach_object_to_plan(
    executor: impl PgExecutor<'_>,
    object_id: Uuid,
    plan_id: Uuid,
    status_id: Uuid,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE plan_objects \
         SET plan_id = $1, lifecycle_status_id = $2, modified_at = now() \
         WHERE id = $3",
    )
    .bind(plan_id)
    .bind(status_id)
    .bind(object_id)
    .execute(executor)
    .await
    .context("failed to attach plan object")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan object {object_id} not found");
    }

    Ok(())
}

/// Replace an object's geometry. The caller validates the geometry first.
pub async fn update_object_geometry(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    geom: &JsonValue,
) -> Result<()> {
    let result =
        sqlx::query("UPDATE plan_objects SET geom = $1, modified_at = now() WHERE id = $2")
            .bind(geom)
            .bind(id)
            .execute(executor)
            .await
            .context("failed to update plan object geometry")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan object {id} not found");
    }

    Ok(())
}
