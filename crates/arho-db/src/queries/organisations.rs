//! Query functions for the `organisations` table.

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::Organisation;

/// Insert an organisation.
pub async fn insert_organisation(
    executor: impl PgExecutor<'_>,
    name: &JsonValue,
    business_id: Option<&str>,
    municipality_id: Option<Uuid>,
    administrative_region_id: Option<Uuid>,
) -> Result<Organisation> {
    let org = sqlx::query_as::<_, Organisation>(
        "INSERT INTO organisations (name, business_id, municipality_id, administrative_region_id) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(name)
    .bind(business_id)
    .bind(municipality_id)
    .bind(administrative_region_id)
    .fetch_one(executor)
    .await
    .context("failed to insert organisation")?;

    Ok(org)
}

/// Fetch an organisation by id.
pub async fn get_organisation(
    executor: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<Organisation>> {
    let org = sqlx::query_as::<_, Organisation>("SELECT * FROM organisations WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch organisation")?;

    Ok(org)
}
