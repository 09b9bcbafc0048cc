//! Query functions for regulation groups and their attachments.

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{GroupKind, PlanRegulationGroup, RegulationGroupAssociation};

/// Fields for inserting a regulation group row.
#[derive(Debug, Clone)]
pub struct NewGroup {
    /// Explicit row id; `None` lets the database generate one.
    pub id: Option<Uuid>,
    pub plan_id: Uuid,
    pub kind: GroupKind,
    pub short_name: Option<String>,
    pub name: JsonValue,
    pub ordering: Option<i32>,
}

/// Insert a new regulation group.
pub async fn insert_group(
    executor: impl PgExecutor<'_>,
    group: &NewGroup,
) -> Result<PlanRegulationGroup> {
    let row = sqlx::query_as::<_, PlanRegulationGroup>(
        "INSERT INTO plan_regulation_groups (id, plan_id, kind, short_name, name, ordering) \
         VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(group.id)
    .bind(group.plan_id)
    .bind(group.kind)
    .bind(&group.short_name)
    .bind(&group.name)
    .bind(group.ordering)
    .fetch_one(executor)
    .await
    .context("failed to insert regulation group")?;

    Ok(row)
}

/// Fetch a group by id.
pub async fn get_group(
    executor: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<PlanRegulationGroup>> {
    let group =
        sqlx::query_as::<_, PlanRegulationGroup>("SELECT * FROM plan_regulation_groups WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
            .context("failed to fetch regulation group")?;

    Ok(group)
}

/// List the groups of a plan, ordered for stable output.
pub async fn list_groups_for_plan(
    executor: impl PgExecutor<'_>,
    plan_id: Uuid,
) -> Result<Vec<PlanRegulationGroup>> {
    let groups = sqlx::query_as::<_, PlanRegulationGroup>(
        "SELECT * FROM plan_regulation_groups WHERE plan_id = $1 \
         ORDER BY ordering NULLS LAST, created_at",
    )
    .bind(plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list regulation groups")?;

    Ok(groups)
}

/// Rewrite a group's kind after reclassification.
pub async fn update_group_kind(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    kind: GroupKind,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE plan_regulation_groups SET kind = $1, modified_at = now() WHERE id = $2",
    )
    .bind(kind)
    .bind(id)
    .execute(executor)
    .await
    .context("failed to update regulation group kind")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("regulation group {id} not found");
    }

    Ok(())
}

/// Attach a group to its plan (general regulations). Idempotent.
pub async fn attach_group_to_plan(
    executor: impl PgExecutor<'_>,
    group_id: Uuid,
    plan_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO regulation_group_associations (group_id, plan_id) \
         VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(group_id)
    .bind(plan_id)
    .execute(executor)
    .await
    .context("failed to attach group to plan")?;

    Ok(())
}

/// Attach a group to a plan object. Idempotent.
pub async fn attach_group_to_object(
    executor: impl PgExecutor<'_>,
    group_id: Uuid,
    plan_object_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO regulation_group_associations (group_id, plan_object_id) \
         VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(group_id)
    .bind(plan_object_id)
    .execute(executor)
    .await
    .context("failed to attach group to plan object")?;

    Ok(())
}

/// List every attachment of every group owned by a plan.
pub async fn list_associations_for_plan(
    executor: impl PgExecutor<'_>,
    plan_id: Uuid,
) -> Result<Vec<RegulationGroupAssociation>> {
    let rows = sqlx::query_as::<_, RegulationGroupAssociation>(
        "SELECT a.* FROM regulation_group_associations a \
         JOIN plan_regulation_groups g ON g.id = a.group_id \
         WHERE g.plan_id = $1 \
         ORDER BY a.created_at",
    )
    .bind(plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list group associations")?;

    Ok(rows)
}
