//! Implementation of the `arho post` command.
//!
//! Posting is a pipeline per plan: make sure a permanent identifier
//! exists, push document files, rebuild the wire documents with the
//! issued file keys, validate the matter, then create or update it.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use arho_core::client::{ApiClient, ApiSettings, UploadOutcome};
use arho_core::codes::CodeRegistry;
use arho_core::graph::{PlanGraph, load_plan_graph};
use arho_core::wire::{plan_matter_to_wire, plan_to_wire};
use arho_db::models::Plan;
use arho_db::queries::{documents, plans};

use crate::validate_cmd::area_identifier;

/// Execute `arho post`: push plan matters to the national registry.
pub async fn run_post(db_pool: &PgPool, settings: ApiSettings, plan_id: Option<Uuid>) -> Result<()> {
    let registry = CodeRegistry::load(db_pool).await?;
    let mut client = ApiClient::new(settings)?;
    client.authenticate().await?;

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
        println!("No plans flagged for export; nothing to post.");
        return Ok(());
    }

    let mut failures = 0usize;
    for plan in &targets {
        if let Err(error) = post_one(db_pool, &registry, &client, plan).await {
            println!("Plan {}: post FAILED: {error:#}", plan.id);
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} plan(s) failed to post", targets.len());
    }
    Ok(())
}

async fn post_one(
    db_pool: &PgPool,
    registry: &CodeRegistry,
    client: &ApiClient,
    plan: &Plan,
) -> Result<()> {
    let mut conn = db_pool.acquire().await?;
    let graph = load_plan_graph(&mut conn, registry, plan.id).await?;
    drop(conn);

    ensure_permanent_identifier(db_pool, client, &graph).await?;
    upload_documents(db_pool, client, &graph).await?;

    // Reload so the wire documents carry the file keys just issued and a
    // permanent identifier obtained above.
    let mut conn = db_pool.acquire().await?;
    let graph = load_plan_graph(&mut conn, registry, plan.id).await?;
    drop(conn);

    let permanent_identifier = graph
        .plan
        .permanent_plan_identifier
        .as_deref()
        .context("plan has no permanent identifier after requesting one")?;

    let wire = plan_to_wire(&graph)?;
    let matter = plan_matter_to_wire(&graph, &wire)?;

    let validation = client
        .validate_plan_matter(&matter, permanent_identifier, &graph.plan.plan_type)
        .await?;
    if !validation.is_success() {
        anyhow::bail!(
            "plan matter validation failed: {}",
            validation
                .errors
                .as_ref()
                .map(ToString::to_string)
                .or(validation.detail.clone())
                .unwrap_or_else(|| "no detail".to_owned())
        );
    }

    let response = client
        .post_plan_matter(&matter, permanent_identifier, &graph.plan.plan_type)
        .await?;
    if !response.is_success() {
        anyhow::bail!(
            "plan matter post failed: {}",
            response
                .errors
                .as_ref()
                .map(ToString::to_string)
                .or(response.detail.clone())
                .unwrap_or_else(|| "no detail".to_owned())
        );
    }

    plans::set_exported(db_pool, plan.id, Utc::now()).await?;
    println!(
        "Plan {}: {}",
        plan.id,
        response.detail.as_deref().unwrap_or("posted")
    );
    Ok(())
}

/// Request a permanent plan identifier when the plan has none yet.
async fn ensure_permanent_identifier(
    db_pool: &PgPool,
    client: &ApiClient,
    graph: &PlanGraph,
) -> Result<()> {
    if graph.plan.permanent_plan_identifier.is_some() {
        return Ok(());
    }

    let area = area_identifier(graph)?;
    let project_name = graph
        .plan
        .name
        .get("fin")
        .and_then(|value| value.as_str())
        .map(ToOwned::to_owned);
    let response = client
        .get_permanent_plan_identifier(&graph.plan.plan_type, area, project_name.as_deref())
        .await?;

    if !response.is_success() {
        anyhow::bail!(
            "permanent identifier request failed: {}",
            response.detail.as_deref().unwrap_or("no detail")
        );
    }
    let identifier = response
        .detail
        .as_deref()
        .context("registry returned no identifier")?;
    plans::set_permanent_identifier(db_pool, graph.plan.id, identifier).await?;
    println!("Plan {}: issued identifier {identifier}", graph.plan.id);
    Ok(())
}

/// Push each document's source file and record the issued file keys.
async fn upload_documents(db_pool: &PgPool, client: &ApiClient, graph: &PlanGraph) -> Result<()> {
    let area_query = if let Some(municipality) = &graph.plan.municipality {
        ("municipalityId", municipality.as_str())
    } else if let Some(region) = &graph.plan.administrative_region {
        ("regionId", region.as_str())
    } else {
        anyhow::bail!("responsible organisation has neither municipality nor region");
    };

    for document in &graph.documents {
        let outcome = client
            .upload_document(
                document.url.as_deref(),
                document.exported_file_etag.as_deref(),
                document.exported_at,
                area_query,
            )
            .await?;
        match outcome {
            UploadOutcome::Unchanged { .. } => {}
            UploadOutcome::Uploaded { file_key, etag } => {
                documents::set_export_result(
                    db_pool,
                    document.id,
                    file_key,
                    etag.as_deref(),
                    Utc::now(),
                )
                .await?;
            }
            UploadOutcome::Failed(response) => {
                anyhow::bail!(
                    "upload of document {} failed: {}",
                    document.id,
                    response.detail.as_deref().unwrap_or("no detail")
                );
            }
        }
    }
    Ok(())
}
