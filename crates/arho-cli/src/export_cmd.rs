//! Implementation of the `arho export` command.

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use arho_core::codes::CodeRegistry;
use arho_core::graph::load_plan_graph;
use arho_core::wire::{plan_matter_to_wire, plan_to_wire};

/// Execute `arho export`: serialize a plan to the wire format and write it
/// to a file or stdout.
pub async fn run_export(
    db_pool: &PgPool,
    plan_id: Uuid,
    output: Option<&Path>,
    matter: bool,
) -> Result<()> {
    let registry = CodeRegistry::load(db_pool).await?;

    let mut conn = db_pool.acquire().await?;
    let graph = load_plan_graph(&mut conn, &registry, plan_id).await?;
    drop(conn);

    let wire = plan_to_wire(&graph)?;
    let document = if matter {
        let wire_matter = plan_matter_to_wire(&graph, &wire)?;
        serde_json::to_string_pretty(&wire_matter)?
    } else {
        serde_json::to_string_pretty(&wire)?
    };

    match output {
        Some(path) => {
            std::fs::write(path, &document)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote plan {plan_id} to {}", path.display());
        }
        None => println!("{document}"),
    }

    Ok(())
}
