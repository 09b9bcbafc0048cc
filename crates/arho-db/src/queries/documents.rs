//! Query functions for the `documents` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::Document;

/// Fields for inserting a document row.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Explicit row id; `None` lets the database generate one.
    pub id: Option<Uuid>,
    pub plan_id: Uuid,
    pub type_of_document_id: Uuid,
    pub category_of_publicity_id: Option<Uuid>,
    pub personal_data_content_id: Option<Uuid>,
    pub retention_time_id: Option<Uuid>,
    pub language_id: Option<Uuid>,
    pub permanent_document_identifier: Option<String>,
    pub name: JsonValue,
    pub url: Option<String>,
    pub accessibility: bool,
    pub document_date: Option<DateTime<Utc>>,
    pub arrival_date: Option<DateTime<Utc>>,
    pub confirmation_date: Option<DateTime<Utc>>,
    pub decision_date: Option<DateTime<Utc>>,
}

/// Insert a new document row.
pub async fn insert_document(
    executor: impl PgExecutor<'_>,
    document: &NewDocument,
) -> Result<Document> {
    let row = sqlx::query_as::<_, Document>(
        "INSERT INTO documents \
             (id, plan_id, type_of_document_id, category_of_publicity_id, \
              personal_data_content_id, retention_time_id, language_id, \
              permanent_document_identifier, name, url, accessibility, \
              document_date, arrival_date, confirmation_date, decision_date) \
         VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         RETURNING *",
    )
    .bind(document.id)
    .bind(document.plan_id)
    .bind(document.type_of_document_id)
    .bind(document.category_of_publicity_id)
    .bind(document.personal_data_content_id)
    .bind(document.retention_time_id)
    .bind(document.language_id)
    .bind(&document.permanent_document_identifier)
    .bind(&document.name)
    .bind(&document.url)
    .bind(document.accessibility)
    .bind(document.document_date)
    .bind(document.arrival_date)
    .bind(document.confirmation_date)
    .bind(document.decision_date)
    .fetch_one(executor)
    .await
    .context("failed to insert document")?;

    Ok(row)
}

/// List the documents of a plan, oldest first.
pub async fn list_documents_for_plan(
    executor: impl PgExecutor<'_>,
    plan_id: Uuid,
) -> Result<Vec<Document>> {
    let rows = sqlx::query_as::<_, Document>(
        "SELECT * FROM documents WHERE plan_id = $1 ORDER BY created_at",
    )
    .bind(plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list documents")?;

    Ok(rows)
}

/// Record the outcome of a file upload to the national file store.
pub async fn set_export_result(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    file_key: Uuid,
    etag: Option<&str>,
    exported_at: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE documents \
         SET exported_file_key = $1, exported_file_etag = $2, exported_at = $3, \
             modified_at = now() \
         WHERE id = $4",
    )
    .bind(file_key)
    .bind(etag)
    .bind(exported_at)
    .bind(id)
    .execute(executor)
    .await
    .context("failed to store document export result")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("document {id} not found");
    }

    Ok(())
}
