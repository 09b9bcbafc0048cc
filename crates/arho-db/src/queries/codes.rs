//! Query functions for the `codes` table.

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{Code, CodeList};

/// Fields for inserting or updating a code row.
#[derive(Debug, Clone)]
pub struct NewCode {
    pub code_list: CodeList,
    pub value: String,
    pub short_name: Option<String>,
    pub name: JsonValue,
    pub description: Option<JsonValue>,
    pub status: Option<String>,
    pub level: i32,
    pub parent_id: Option<Uuid>,
}

impl NewCode {
    /// A minimal code with only list and value set.
    pub fn bare(code_list: CodeList, value: impl Into<String>) -> Self {
        Self {
            code_list,
            value: value.into(),
            short_name: None,
            name: JsonValue::Object(Default::default()),
            description: None,
            status: None,
            level: 1,
            parent_id: None,
        }
    }
}

/// Insert a code, updating the descriptive fields if (code_list, value)
/// already exists. Returns the stored row.
pub async fn upsert_code(executor: impl PgExecutor<'_>, code: &NewCode) -> Result<Code> {
    let row = sqlx::query_as::<_, Code>(
        "INSERT INTO codes \
             (code_list, value, short_name, name, description, status, level, parent_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (code_list, value) DO UPDATE SET \
             short_name = EXCLUDED.short_name, \
             name = EXCLUDED.name, \
             description = EXCLUDED.description, \
             status = EXCLUDED.status, \
             level = EXCLUDED.level, \
             parent_id = EXCLUDED.parent_id, \
             modified_at = now() \
         RETURNING *",
    )
    .bind(code.code_list)
    .bind(&code.value)
    .bind(&code.short_name)
    .bind(&code.name)
    .bind(&code.description)
    .bind(&code.status)
    .bind(code.level)
    .bind(code.parent_id)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to upsert code {}/{}", code.code_list, code.value))?;

    Ok(row)
}

/// Fetch a code by list and value.
pub async fn get_code(
    executor: impl PgExecutor<'_>,
    code_list: CodeList,
    value: &str,
) -> Result<Option<Code>> {
    let code =
        sqlx::query_as::<_, Code>("SELECT * FROM codes WHERE code_list = $1 AND value = $2")
            .bind(code_list)
            .bind(value)
            .fetch_optional(executor)
            .await
            .context("failed to fetch code")?;

    Ok(code)
}

/// Fetch a code by id.
pub async fn get_code_by_id(executor: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Code>> {
    let code = sqlx::query_as::<_, Code>("SELECT * FROM codes WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch code by id")?;

    Ok(code)
}

/// List all codes of one list, ordered by value.
pub async fn list_codes(executor: impl PgExecutor<'_>, code_list: CodeList) -> Result<Vec<Code>> {
    let codes =
        sqlx::query_as::<_, Code>("SELECT * FROM codes WHERE code_list = $1 ORDER BY value")
            .bind(code_list)
            .fetch_all(executor)
            .await
            .context("failed to list codes")?;

    Ok(codes)
}

/// Load the whole registry. Used to build in-memory id/value maps before
/// serializing or importing a plan.
pub async fn load_all_codes(executor: impl PgExecutor<'_>) -> Result<Vec<Code>> {
    let codes = sqlx::query_as::<_, Code>("SELECT * FROM codes ORDER BY code_list, value")
        .fetch_all(executor)
        .await
        .context("failed to load code registry")?;

    Ok(codes)
}
