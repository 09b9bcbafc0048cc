//! Implementation of the `arho import` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use arho_core::codes::CodeRegistry;
use arho_core::wire::{ImportMetadata, WirePlan, import_plan};
use arho_db::queries::organisations;

pub struct ImportOptions {
    pub file: PathBuf,
    pub name: String,
    pub organisation: Uuid,
    pub plan_type: String,
    pub permanent_identifier: Option<String>,
    pub producers_identifier: Option<String>,
    pub overwrite: bool,
}

/// Execute `arho import`: parse a wire document and store its plan graph.
pub async fn run_import(db_pool: &PgPool, options: ImportOptions) -> Result<()> {
    let contents = std::fs::read_to_string(&options.file)
        .with_context(|| format!("failed to read plan file {}", options.file.display()))?;
    let wire: WirePlan =
        serde_json::from_str(&contents).context("failed to parse plan document")?;

    organisations::get_organisation(db_pool, options.organisation)
        .await?
        .with_context(|| format!("organisation {} not found", options.organisation))?;

    let registry = CodeRegistry::load(db_pool).await?;
    let metadata = ImportMetadata {
        name: json!({ "fin": options.name }),
        organisation_id: options.organisation,
        plan_type: options.plan_type.clone(),
        permanent_plan_identifier: options.permanent_identifier.clone(),
        producers_plan_identifier: options.producers_identifier.clone(),
    };

    let graph = import_plan(db_pool, &registry, &wire, &metadata, options.overwrite).await?;

    println!(
        "Imported plan {} ({} objects, {} regulation groups, {} documents)",
        graph.plan.id,
        graph.objects.len(),
        graph.groups.len(),
        graph.documents.len()
    );
    Ok(())
}
