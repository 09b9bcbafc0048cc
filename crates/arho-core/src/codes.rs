//! Reference-code registry: national code-list URIs, the fixed
//! status-to-event association tables, and code resolution.
//!
//! Code rows live in the `codes` table; this module adds the pieces that
//! are fixed at build time. URIs follow the national pattern
//! `<list base>/code/<value>`. The regulation-group kind list is local and
//! has no base URI.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Result;
use sqlx::PgExecutor;
use thiserror::Error;
use uuid::Uuid;

use arho_db::models::{Code, CodeList, EventClass};
use arho_db::queries::codes as code_queries;

/// Lifecycle status value of a pending plan.
pub const PENDING_STATUS: &str = "02";
/// Lifecycle status value of an approved plan.
pub const APPROVED_STATUS: &str = "06";
/// Lifecycle status value of a valid (in-force) plan.
pub const VALID_STATUS: &str = "13";

/// Origin marker for machine-produced plan matters. Always "01"
/// (digitally born).
pub const DIGITAL_ORIGIN_URI: &str =
    "http://uri.suomi.fi/codelist/rytj/RY_DigitaalinenAlkupera/code/01";

/// Coordinate reference system URI for exported map files.
pub const COORDINATE_SYSTEM_URI: &str =
    "http://uri.suomi.fi/codelist/rakrek/ETRS89/code/EPSG3067";

/// National base URI of a code list, without the `/code/<value>` suffix.
pub fn base_uri(list: CodeList) -> Option<&'static str> {
    match list {
        CodeList::LifecycleStatus => Some("http://uri.suomi.fi/codelist/rytj/kaavaelinkaari"),
        CodeList::PlanType => Some("http://uri.suomi.fi/codelist/rytj/RY_Kaavalaji"),
        CodeList::TypeOfPlanRegulation => {
            Some("http://uri.suomi.fi/codelist/rytj/RY_Kaavamaarayslaji")
        }
        CodeList::TypeOfAdditionalInformation => {
            Some("http://uri.suomi.fi/codelist/rytj/RY_Kaavamaarayksen_Lisatiedonlaji")
        }
        CodeList::TypeOfVerbalPlanRegulation => {
            Some("http://uri.suomi.fi/codelist/rytj/RY_Sanallisen_Kaavamaarayksen_Laji")
        }
        // Local list, never serialized as a URI.
        CodeList::TypeOfPlanRegulationGroup => None,
        CodeList::TypeOfUnderground => {
            Some("http://uri.suomi.fi/codelist/rytj/RY_MaanalaisuudenLaji")
        }
        CodeList::TypeOfDocument => {
            Some("http://uri.suomi.fi/codelist/rytj/RY_AsiakirjanLaji_YKAK")
        }
        CodeList::NameOfPlanCaseDecision => {
            Some("http://uri.suomi.fi/codelist/rytj/kaavpaatnimi")
        }
        CodeList::TypeOfProcessingEvent => Some("http://uri.suomi.fi/codelist/rytj/kaavakastap"),
        CodeList::TypeOfInteractionEvent => {
            Some("http://uri.suomi.fi/codelist/rytj/RY_KaavanVuorovaikutustapahtumanLaji")
        }
        CodeList::PlanTheme => Some("http://uri.suomi.fi/codelist/rytj/kaavoitusteema"),
        CodeList::CategoryOfPublicity => Some("http://uri.suomi.fi/codelist/rytj/julkisuus"),
        CodeList::PersonalDataContent => {
            Some("http://uri.suomi.fi/codelist/rytj/henkilotietosisalto")
        }
        CodeList::RetentionTime => Some("http://uri.suomi.fi/codelist/rytj/sailytysaika"),
        CodeList::Language => Some("http://uri.suomi.fi/codelist/rytj/ryhtikielet"),
        CodeList::Municipality => Some("http://uri.suomi.fi/codelist/jhs/kunta_1_20240101"),
        CodeList::AdministrativeRegion => {
            Some("http://uri.suomi.fi/codelist/jhs/maakunta_1_20240101")
        }
        CodeList::TypeOfDecisionMaker => {
            Some("http://uri.suomi.fi/codelist/rytj/PaatoksenTekija")
        }
        CodeList::LegalEffectsOfMasterPlan => {
            Some("http://uri.suomi.fi/codelist/rytj/oikeusvaik_YK")
        }
    }
}

/// Build the canonical URI of a code value. `None` for the local lists.
pub fn uri(list: CodeList, value: &str) -> Option<String> {
    base_uri(list).map(|base| format!("{base}/code/{value}"))
}

/// Prefix index for [`parse_uri`], longest prefix first so that no list
/// base that happens to be a prefix of another can shadow it.
fn prefix_index() -> &'static Vec<(String, CodeList)> {
    static INDEX: OnceLock<Vec<(String, CodeList)>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut index: Vec<(String, CodeList)> = CodeList::ALL
            .iter()
            .filter_map(|list| base_uri(*list).map(|base| (format!("{base}/code/"), *list)))
            .collect();
        index.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        index
    })
}

/// Resolve a code URI back to its list and value.
pub fn parse_uri(code_uri: &str) -> Result<(CodeList, String), CodeError> {
    for (prefix, list) in prefix_index() {
        if let Some(value) = code_uri.strip_prefix(prefix.as_str()) {
            if !value.is_empty() && !value.contains('/') {
                return Ok((*list, value.to_owned()));
            }
        }
    }
    Err(CodeError::UnknownUri(code_uri.to_owned()))
}

// ---------------------------------------------------------------------------
// Status/event association tables
// ---------------------------------------------------------------------------

/// Event code values legal for a lifecycle status, per event class. These
/// pairs mirror the national validation rules and are fixed at build time.
pub fn allowed_events(class: EventClass, status_value: &str) -> &'static [&'static str] {
    match class {
        EventClass::Decision => match status_value {
            "02" => &["01", "02", "03"],
            "03" => &["04", "05", "06"],
            "04" => &["08"],
            "05" => &["07", "09"],
            "06" => &["11A"],
            "08" => &["12", "13", "15"],
            _ => &[],
        },
        EventClass::ProcessingEvent => match status_value {
            "02" => &["04"],
            "03" => &["05", "06"],
            "04" => &["07", "08"],
            "05" => &["08", "09"],
            "06" => &["11"],
            "11" => &["13"],
            "13" => &["16"],
            _ => &[],
        },
        EventClass::InteractionEvent => match status_value {
            "03" => &["01"],
            "04" => &["01"],
            "05" => &["01", "02"],
            _ => &[],
        },
    }
}

/// Decision-maker code for synthetic decisions. The same body decides in
/// every phase of a regional plan.
pub const DECISION_MAKER: &str = "01";

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Errors from code resolution.
#[derive(Debug, Error)]
pub enum CodeError {
    #[error("unknown code {value:?} in list {list}")]
    UnknownCode { list: CodeList, value: String },
    #[error("unknown code id {0}")]
    UnknownId(Uuid),
    #[error("unrecognized code URI {0:?}")]
    UnknownUri(String),
    #[error("parent chain of code {0} forms a cycle")]
    ParentCycle(Uuid),
}

/// In-memory view of the `codes` table.
///
/// Loaded once per unit of work (one import, one export run) and read-only
/// afterwards, so every `(list, value)` and id lookup after the initial
/// load is a plain map hit.
pub struct CodeRegistry {
    by_id: HashMap<Uuid, Code>,
    by_value: HashMap<(CodeList, String), Uuid>,
}

impl CodeRegistry {
    /// Load every code row.
    pub async fn load(executor: impl PgExecutor<'_>) -> Result<Self> {
        let codes = code_queries::load_all_codes(executor).await?;
        Ok(Self::from_codes(codes))
    }

    /// Build a registry from rows already in hand.
    pub fn from_codes(codes: Vec<Code>) -> Self {
        let mut by_id = HashMap::with_capacity(codes.len());
        let mut by_value = HashMap::with_capacity(codes.len());
        for code in codes {
            by_value.insert((code.code_list, code.value.clone()), code.id);
            by_id.insert(code.id, code);
        }
        Self { by_id, by_value }
    }

    /// Look up a code by list and value.
    pub fn get(&self, list: CodeList, value: &str) -> Result<&Code, CodeError> {
        self.by_value
            .get(&(list, value.to_owned()))
            .and_then(|id| self.by_id.get(id))
            .ok_or_else(|| CodeError::UnknownCode {
                list,
                value: value.to_owned(),
            })
    }

    /// Look up a code row by id.
    pub fn by_id(&self, id: Uuid) -> Result<&Code, CodeError> {
        self.by_id.get(&id).ok_or(CodeError::UnknownId(id))
    }

    /// The id of a `(list, value)` pair.
    pub fn id_of(&self, list: CodeList, value: &str) -> Result<Uuid, CodeError> {
        self.get(list, value).map(|code| code.id)
    }

    /// The value of a code id.
    pub fn value_of(&self, id: Uuid) -> Result<&str, CodeError> {
        self.by_id(id).map(|code| code.value.as_str())
    }

    /// The canonical URI of a code id. `None` for codes of the local lists.
    pub fn uri_of(&self, id: Uuid) -> Result<Option<String>, CodeError> {
        let code = self.by_id(id)?;
        Ok(uri(code.code_list, &code.value))
    }

    /// Resolve a code URI to its row.
    pub fn resolve_uri(&self, code_uri: &str) -> Result<&Code, CodeError> {
        let (list, value) = parse_uri(code_uri)?;
        self.get(list, &value)
    }

    /// Walk the parent chain of a code to its top-level ancestor and return
    /// that ancestor's value. A code without a parent is its own root. The
    /// walk is bounded by the registry size so a corrupted parent chain
    /// errors instead of looping.
    pub fn root_value(&self, id: Uuid) -> Result<&str, CodeError> {
        let mut current = self.by_id(id)?;
        let mut steps = 0usize;
        while let Some(parent_id) = current.parent_id {
            steps += 1;
            if steps > self.by_id.len() {
                return Err(CodeError::ParentCycle(id));
            }
            current = self.by_id(parent_id)?;
        }
        Ok(current.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code(list: CodeList, value: &str, parent_id: Option<Uuid>) -> Code {
        Code {
            id: Uuid::new_v4(),
            code_list: list,
            value: value.to_owned(),
            short_name: None,
            name: json!({}),
            description: None,
            status: None,
            level: 1,
            parent_id,
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn uri_build_and_parse_roundtrip() {
        for list in CodeList::ALL {
            let Some(built) = uri(list, "01") else {
                continue;
            };
            let (parsed_list, parsed_value) = parse_uri(&built).expect("should parse");
            assert_eq!(parsed_list, list);
            assert_eq!(parsed_value, "01");
        }
    }

    #[test]
    fn parse_uri_rejects_unknown_base() {
        assert!(parse_uri("http://example.com/codelist/foo/code/01").is_err());
        assert!(parse_uri("http://uri.suomi.fi/codelist/rytj/kaavaelinkaari/code/").is_err());
        assert!(parse_uri("http://uri.suomi.fi/codelist/rytj/kaavaelinkaari/code/01/extra").is_err());
    }

    #[test]
    fn group_kind_list_has_no_uri() {
        assert!(uri(CodeList::TypeOfPlanRegulationGroup, "generalRegulations").is_none());
    }

    #[test]
    fn allowed_decisions_per_status() {
        assert_eq!(
            allowed_events(EventClass::Decision, "02"),
            &["01", "02", "03"]
        );
        assert_eq!(allowed_events(EventClass::Decision, "06"), &["11A"]);
        assert!(allowed_events(EventClass::Decision, "13").is_empty());
    }

    #[test]
    fn allowed_processing_and_interaction_events() {
        assert_eq!(allowed_events(EventClass::ProcessingEvent, "13"), &["16"]);
        assert_eq!(
            allowed_events(EventClass::InteractionEvent, "05"),
            &["01", "02"]
        );
        assert!(allowed_events(EventClass::InteractionEvent, "02").is_empty());
    }

    #[test]
    fn registry_resolves_values_and_uris() {
        let pending = code(CodeList::LifecycleStatus, "02", None);
        let pending_id = pending.id;
        let registry = CodeRegistry::from_codes(vec![pending]);

        assert_eq!(
            registry.id_of(CodeList::LifecycleStatus, "02").unwrap(),
            pending_id
        );
        assert_eq!(registry.value_of(pending_id).unwrap(), "02");
        assert_eq!(
            registry.uri_of(pending_id).unwrap().as_deref(),
            Some("http://uri.suomi.fi/codelist/rytj/kaavaelinkaari/code/02")
        );
        assert!(registry.get(CodeList::LifecycleStatus, "99").is_err());
    }

    #[test]
    fn root_value_walks_parent_chain() {
        let root = code(CodeList::PlanType, "1", None);
        let root_id = root.id;
        let mid = code(CodeList::PlanType, "11", Some(root_id));
        let leaf = code(CodeList::PlanType, "111", Some(mid.id));
        let leaf_id = leaf.id;
        let registry = CodeRegistry::from_codes(vec![root, mid, leaf]);

        assert_eq!(registry.root_value(leaf_id).unwrap(), "1");
        assert_eq!(registry.root_value(root_id).unwrap(), "1");
    }

    #[test]
    fn cyclic_parent_chain_errors_instead_of_looping() {
        let mut first = code(CodeList::PlanType, "1", None);
        let mut second = code(CodeList::PlanType, "11", None);
        first.parent_id = Some(second.id);
        second.parent_id = Some(first.id);
        let first_id = first.id;
        let registry = CodeRegistry::from_codes(vec![first, second]);

        assert!(matches!(
            registry.root_value(first_id),
            Err(CodeError::ParentCycle(_))
        ));
    }
}
