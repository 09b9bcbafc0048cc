//! Query functions for plan regulations, additional information, and
//! propositions.

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use sqlx::PgExecutor;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{AdditionalInformation, PlanProposition, PlanRegulation};
use crate::value::AttributeValue;

/// Fields for inserting a plan regulation row.
#[derive(Debug, Clone)]
pub struct NewRegulation {
    /// Explicit row id; `None` lets the database generate one.
    pub id: Option<Uuid>,
    pub group_id: Uuid,
    pub type_of_plan_regulation_id: Uuid,
    pub lifecycle_status_id: Uuid,
    pub value: Option<AttributeValue>,
    pub subject_identifiers: Option<Vec<String>>,
    pub ordering: Option<i32>,
}

/// Insert a new plan regulation.
pub async fn insert_regulation(
    executor: impl PgExecutor<'_>,
    regulation: &NewRegulation,
) -> Result<PlanRegulation> {
    let row = sqlx::query_as::<_, PlanRegulation>(
        "INSERT INTO plan_regulations \
             (id, group_id, type_of_plan_regulation_id, lifecycle_status_id, \
              value, subject_identifiers, ordering) \
         VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(regulation.id)
    .bind(regulation.group_id)
    .bind(regulation.type_of_plan_regulation_id)
    .bind(regulation.lifecycle_status_id)
    .bind(regulation.value.as_ref().map(Json))
    .bind(&regulation.subject_identifiers)
    .bind(regulation.ordering)
    .fetch_one(executor)
    .await
    .context("failed to insert plan regulation")?;

    Ok(row)
}

/// List the regulations of a group, in output order.
pub async fn list_regulations_for_group(
    executor: impl PgExecutor<'_>,
    group_id: Uuid,
) -> Result<Vec<PlanRegulation>> {
    let rows = sqlx::query_as::<_, PlanRegulation>(
        "SELECT * FROM plan_regulations WHERE group_id = $1 \
         ORDER BY ordering NULLS LAST, created_at",
    )
    .bind(group_id)
    .fetch_all(executor)
    .await
    .context("failed to list plan regulations")?;

    Ok(rows)
}

/// Move all regulations owned through a plan's groups from one lifecycle
/// status to another. Returns the ids of the rows that changed.
pub async fn propagate_regulation_status(
    executor: impl PgExecutor<'_>,
    plan_id: Uuid,
    old_status_id: Uuid,
    new_status_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "UPDATE plan_regulations r SET lifecycle_status_id = $1, modified_at = now() \
         FROM plan_regulation_groups g \
         WHERE r.group_id = g.id AND g.plan_id = $2 AND r.lifecycle_status_id = $3 \
         RETURNING r.id",
    )
    .bind(new_status_id)
    .bind(plan_id)
    .bind(old_status_id)
    .fetch_all(executor)
    .await
    .context("failed to propagate status to plan regulations")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Attach additional information to a regulation.
pub async fn insert_additional_information(
    executor: impl PgExecutor<'_>,
    plan_regulation_id: Uuid,
    type_of_additional_information_id: Uuid,
    value: Option<&AttributeValue>,
) -> Result<AdditionalInformation> {
    let row = sqlx::query_as::<_, AdditionalInformation>(
        "INSERT INTO additional_information \
             (plan_regulation_id, type_of_additional_information_id, value) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(plan_regulation_id)
    .bind(type_of_additional_information_id)
    .bind(value.map(Json))
    .fetch_one(executor)
    .await
    .context("failed to insert additional information")?;

    Ok(row)
}

/// List the additional information of a regulation.
pub async fn list_additional_information(
    executor: impl PgExecutor<'_>,
    plan_regulation_id: Uuid,
) -> Result<Vec<AdditionalInformation>> {
    let rows = sqlx::query_as::<_, AdditionalInformation>(
        "SELECT * FROM additional_information WHERE plan_regulation_id = $1 \
         ORDER BY created_at",
    )
    .bind(plan_regulation_id)
    .fetch_all(executor)
    .await
    .context("failed to list additional information")?;

    Ok(rows)
}

/// Link a regulation to a plan theme code. Idempotent.
pub async fn insert_regulation_theme(
    executor: impl PgExecutor<'_>,
    plan_regulation_id: Uuid,
    theme_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO plan_regulation_themes (plan_regulation_id, theme_id) \
         VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(plan_regulation_id)
    .bind(theme_id)
    .execute(executor)
    .await
    .context("failed to link regulation theme")?;

    Ok(())
}

/// List theme code ids of a regulation.
pub async fn list_regulation_themes(
    executor: impl PgExecutor<'_>,
    plan_regulation_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT theme_id FROM plan_regulation_themes WHERE plan_regulation_id = $1",
    )
    .bind(plan_regulation_id)
    .fetch_all(executor)
    .await
    .context("failed to list regulation themes")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Link a regulation to a verbal regulation type code. Idempotent.
pub async fn insert_regulation_verbal_type(
    executor: impl PgExecutor<'_>,
    plan_regulation_id: Uuid,
    verbal_type_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO plan_regulation_verbal_types (plan_regulation_id, verbal_type_id) \
         VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(plan_regulation_id)
    .bind(verbal_type_id)
    .execute(executor)
    .await
    .context("failed to link verbal regulation type")?;

    Ok(())
}

/// List verbal regulation type code ids of a regulation.
pub async fn list_regulation_verbal_types(
    executor: impl PgExecutor<'_>,
    plan_regulation_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT verbal_type_id FROM plan_regulation_verbal_types WHERE plan_regulation_id = $1",
    )
    .bind(plan_regulation_id)
    .fetch_all(executor)
    .await
    .context("failed to list verbal regulation types")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// ---------------------------------------------------------------------------
// Propositions
// ---------------------------------------------------------------------------

/// Fields for inserting a plan proposition row.
#[derive(Debug, Clone)]
pub struct NewProposition {
    /// Explicit row id; `None` lets the database generate one.
    pub id: Option<Uuid>,
    pub group_id: Uuid,
    pub lifecycle_status_id: Uuid,
    pub text_value: JsonValue,
    pub ordering: Option<i32>,
}

/// Insert a new plan proposition.
pub async fn insert_proposition(
    executor: impl PgExecutor<'_>,
    proposition: &NewProposition,
) -> Result<PlanProposition> {
    let row = sqlx::query_as::<_, PlanProposition>(
        "INSERT INTO plan_propositions (id, group_id, lifecycle_status_id, text_value, ordering) \
         VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(proposition.id)
    .bind(proposition.group_id)
    .bind(proposition.lifecycle_status_id)
    .bind(&proposition.text_value)
    .bind(proposition.ordering)
    .fetch_one(executor)
    .await
    .context("failed to insert plan proposition")?;

    Ok(row)
}

/// List the propositions of a group, in output order.
pub async fn list_propositions_for_group(
    executor: impl PgExecutor<'_>,
    group_id: Uuid,
) -> Result<Vec<PlanProposition>> {
    let rows = sqlx::query_as::<_, PlanProposition>(
        "SELECT * FROM plan_propositions WHERE group_id = $1 \
         ORDER BY ordering NULLS LAST, created_at",
    )
    .bind(group_id)
    .fetch_all(executor)
    .await
    .context("failed to list plan propositions")?;

    Ok(rows)
}

/// Move all propositions owned through a plan's groups from one lifecycle
/// status to another. Returns the ids of the rows that changed.
pub async fn propagate_proposition_status(
    executor: impl PgExecutor<'_>,
    plan_id: Uuid,
    old_status_id: Uuid,
    new_status_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "UPDATE plan_propositions p SET lifecycle_status_id = $1, modified_at = now() \
         FROM plan_regulation_groups g \
         WHERE p.group_id = g.id AND g.plan_id = $2 AND p.lifecycle_status_id = $3 \
         RETURNING p.id",
    )
    .bind(new_status_id)
    .bind(plan_id)
    .bind(old_status_id)
    .fetch_all(executor)
    .await
    .context("failed to propagate status to plan propositions")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Link a proposition to a plan theme code. Idempotent.
pub async fn insert_proposition_theme(
    executor: impl PgExecutor<'_>,
    plan_proposition_id: Uuid,
    theme_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO plan_proposition_themes (plan_proposition_id, theme_id) \
         VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(plan_proposition_id)
    .bind(theme_id)
    .execute(executor)
    .await
    .context("failed to link proposition theme")?;

    Ok(())
}

/// List theme code ids of a proposition.
pub async fn list_proposition_themes(
    executor: impl PgExecutor<'_>,
    plan_proposition_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT theme_id FROM plan_proposition_themes WHERE plan_proposition_id = $1",
    )
    .bind(plan_proposition_id)
    .fetch_all(executor)
    .await
    .context("failed to list proposition themes")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
