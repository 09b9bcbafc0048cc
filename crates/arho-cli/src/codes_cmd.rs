//! Implementation of the `arho codes` subcommands.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use arho_db::models::{CodeList, GroupKind};
use arho_db::queries::codes::{self, NewCode};

/// One entry in a code seed file. The file is a JSON array; `parentValue`
/// references another entry in the same list by value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedCode {
    code_list: CodeList,
    value: String,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    name: Option<JsonValue>,
    #[serde(default)]
    description: Option<JsonValue>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    level: Option<i32>,
    #[serde(default)]
    parent_value: Option<String>,
}

/// Execute `arho codes load`: upsert codes from a seed file, then the
/// local regulation group kind codes.
pub async fn run_codes_load(db_pool: &PgPool, file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read seed file {}", file.display()))?;
    let mut seeds: Vec<SeedCode> =
        serde_json::from_str(&contents).context("failed to parse seed file")?;

    // Parents carry lower levels; loading in level order means every
    // parentValue resolves against codes already inserted.
    seeds.sort_by_key(|seed| seed.level.unwrap_or(1));

    let mut ids: HashMap<(CodeList, String), Uuid> = HashMap::new();
    let mut loaded = 0usize;

    for seed in &seeds {
        let parent_id = match &seed.parent_value {
            Some(parent) => Some(
                *ids.get(&(seed.code_list, parent.clone()))
                    .with_context(|| {
                        format!(
                            "code {}/{} references unknown parent {parent}",
                            seed.code_list, seed.value
                        )
                    })?,
            ),
            None => None,
        };

        let code = codes::upsert_code(
            db_pool,
            &NewCode {
                code_list: seed.code_list,
                value: seed.value.clone(),
                short_name: seed.short_name.clone(),
                name: seed
                    .name
                    .clone()
                    .unwrap_or_else(|| JsonValue::Object(Default::default())),
                description: seed.description.clone(),
                status: seed.status.clone(),
                level: seed.level.unwrap_or(1),
                parent_id,
            },
        )
        .await?;

        ids.insert((code.code_list, code.value.clone()), code.id);
        loaded += 1;
    }

    // Regulation group kinds are a local code list, not part of the
    // national vocabularies; seed them unconditionally.
    let group_kinds = [
        GroupKind::GeneralRegulations,
        GroupKind::LandUseRegulations,
        GroupKind::OtherAreaRegulations,
        GroupKind::LineRegulations,
        GroupKind::OtherPointRegulations,
    ];
    for kind in group_kinds {
        codes::upsert_code(
            db_pool,
            &NewCode::bare(CodeList::TypeOfPlanRegulationGroup, kind.code_value()),
        )
        .await?;
    }

    println!(
        "Loaded {loaded} codes from {} (+ {} regulation group kinds)",
        file.display(),
        group_kinds.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_file_parses_with_sparse_entries() {
        let seeds: Vec<SeedCode> = serde_json::from_str(
            r#"[
                {"codeList": "lifecycle_status", "value": "13",
                 "name": {"fin": "Voimassa"}, "level": 1},
                {"codeList": "plan_type", "value": "11",
                 "parentValue": "1", "level": 2},
                {"codeList": "municipality", "value": "577"}
            ]"#,
        )
        .unwrap();

        assert_eq!(seeds.len(), 3);
        assert_eq!(seeds[0].code_list, CodeList::LifecycleStatus);
        assert_eq!(seeds[1].parent_value.as_deref(), Some("1"));
        assert_eq!(seeds[2].level, None);
        assert!(seeds[2].name.is_none());
    }
}
