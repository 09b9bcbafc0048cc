//! Implementation of the `arho plan` subcommands.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use arho_core::codes::CodeRegistry;
use arho_core::lifecycle;
use arho_db::queries::dates::{self, DateOwner};
use arho_db::queries::plans;

use crate::PlanCommands;

pub async fn run_plan_command(command: PlanCommands, db_pool: &PgPool) -> Result<()> {
    match command {
        PlanCommands::List => run_plan_list(db_pool).await,
        PlanCommands::Status { plan_id } => run_plan_status(db_pool, plan_id).await,
        PlanCommands::SetStatus { plan_id, status } => {
            run_plan_set_status(db_pool, plan_id, &status).await
        }
    }
}

/// Pull the first value out of a localized name object for display.
fn display_name(name: &serde_json::Value) -> String {
    let text = name
        .get("fin")
        .or_else(|| name.as_object().and_then(|obj| obj.values().next()))
        .and_then(|value| value.as_str());
    match text {
        Some(text) => text.to_owned(),
        None => "(unnamed)".to_owned(),
    }
}

async fn run_plan_list(db_pool: &PgPool) -> Result<()> {
    let registry = CodeRegistry::load(db_pool).await?;
    let plans = plans::list_plans(db_pool).await?;

    if plans.is_empty() {
        println!("No plans found.");
        return Ok(());
    }

    println!("Found {} plan(s):", plans.len());
    for plan in &plans {
        let status = registry
            .value_of(plan.lifecycle_status_id)
            .unwrap_or("unknown");
        let identifier = plan
            .permanent_plan_identifier
            .as_deref()
            .or(plan.producers_plan_identifier.as_deref())
            .unwrap_or("-");
        println!(
            "  {}  [{status}]  {}  ({identifier})",
            plan.id,
            display_name(&plan.name)
        );
    }

    Ok(())
}

async fn run_plan_status(db_pool: &PgPool, plan_id: Uuid) -> Result<()> {
    let registry = CodeRegistry::load(db_pool).await?;
    let plan = plans::get_plan(db_pool, plan_id)
        .await?
        .with_context(|| format!("plan {plan_id} not found"))?;

    let status = registry
        .value_of(plan.lifecycle_status_id)
        .unwrap_or("unknown");
    let plan_type = registry.value_of(plan.plan_type_id).unwrap_or("unknown");

    println!("Plan {}", plan.id);
    println!("  name:       {}", display_name(&plan.name));
    println!("  type:       {plan_type}");
    println!("  status:     {status}");
    if let Some(identifier) = &plan.permanent_plan_identifier {
        println!("  permanent:  {identifier}");
    }
    if let Some(identifier) = &plan.producers_plan_identifier {
        println!("  producers:  {identifier}");
    }
    println!("  exportable: {}", plan.to_be_exported);
    if let Some(validated_at) = plan.validated_at {
        let verdict = if plan.validation_errors.is_none() {
            "passed"
        } else {
            "failed"
        };
        println!("  validated:  {validated_at} ({verdict})");
    }
    if let Some(exported_at) = plan.exported_at {
        println!("  exported:   {exported_at}");
    }

    let periods = dates::list_dates_for_owner(db_pool, DateOwner::Plan(plan_id)).await?;
    if !periods.is_empty() {
        println!("  lifecycle:");
        for period in &periods {
            let period_status = registry
                .value_of(period.lifecycle_status_id)
                .unwrap_or("unknown");
            let ending = match period.ending_at {
                Some(ending_at) => ending_at.to_string(),
                None => "open".to_owned(),
            };
            println!(
                "    {period_status}: {} -> {ending}",
                period.starting_at
            );
        }
    }

    Ok(())
}

async fn run_plan_set_status(db_pool: &PgPool, plan_id: Uuid, status: &str) -> Result<()> {
    let registry = CodeRegistry::load(db_pool).await?;

    let mut tx = db_pool.begin().await?;
    lifecycle::transition_plan_status(&mut tx, &registry, plan_id, status).await?;
    tx.commit().await?;

    println!("Plan {plan_id} moved to status {status}");
    Ok(())
}
