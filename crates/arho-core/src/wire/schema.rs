//! Serde types for the national wire format.
//!
//! Field names follow the wire schema exactly. Keys the wire emits even
//! when empty stay plain `Option`s; keys that are omitted when absent
//! carry `skip_serializing_if`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Geometry with its coordinate reference system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireGeometry {
    /// SRID carried as a string, e.g. `"3067"`.
    pub srid: String,
    /// Bare GeoJSON geometry object.
    pub geometry: JsonValue,
}

/// A date-only period (validity intervals, approval periods).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDatePeriod {
    pub begin: NaiveDate,
    pub end: Option<NaiveDate>,
}

/// A timestamped period (interaction events).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTimePeriod {
    pub begin: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlan {
    pub plan_key: Uuid,
    /// Lifecycle status code URI.
    pub life_cycle_status: String,
    pub legal_effect_of_local_master_plans: Option<Vec<String>>,
    pub scale: Option<i64>,
    pub geographical_area: WireGeometry,
    /// Single-language description; the wire schema allows no language map
    /// here.
    pub plan_description: Option<String>,
    #[serde(default)]
    pub general_regulation_groups: Vec<WireGeneralGroup>,
    #[serde(default)]
    pub plan_objects: Vec<WirePlanObject>,
    #[serde(default)]
    pub plan_regulation_groups: Vec<WireGroup>,
    #[serde(default)]
    pub plan_regulation_group_relations: Vec<WireGroupRelation>,
    pub period_of_validity: Option<WireDatePeriod>,
    pub approval_date: Option<NaiveDate>,
    #[serde(default)]
    pub plan_maps: Vec<WirePlanMap>,
    #[serde(default)]
    pub plan_annexes: Vec<WireAttachmentDocument>,
    #[serde(default)]
    pub other_plan_materials: Vec<WireOtherPlanMaterial>,
    pub plan_report: Option<WirePlanReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlanObject {
    pub plan_object_key: Uuid,
    pub life_cycle_status: String,
    pub underground_status: Option<String>,
    pub geometry: WireGeometry,
    pub name: JsonValue,
    pub description: Option<JsonValue>,
    pub object_number: Option<i32>,
    pub period_of_validity: Option<WireDatePeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_limit: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_plan_object_keys: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGroupRelation {
    pub plan_object_key: Uuid,
    pub plan_regulation_group_key: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGroup {
    pub plan_regulation_group_key: Uuid,
    pub title_of_plan_regulation: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_number: Option<i32>,
    pub letter_identifier: Option<String>,
    pub color_number: Option<String>,
    #[serde(default)]
    pub plan_recommendations: Vec<WireRecommendation>,
    #[serde(default)]
    pub plan_regulations: Vec<WireRegulation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGeneralGroup {
    pub general_regulation_group_key: Uuid,
    pub title_of_plan_regulation: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_number: Option<i32>,
    #[serde(default)]
    pub plan_recommendations: Vec<WireRecommendation>,
    #[serde(default)]
    pub plan_regulations: Vec<WireRegulation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRegulation {
    pub plan_regulation_key: Uuid,
    pub life_cycle_status: String,
    /// Regulation type code URI.
    #[serde(rename = "type")]
    pub type_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_themes: Option<Vec<String>>,
    pub subject_identifiers: Option<Vec<String>>,
    pub regulation_number: Option<String>,
    pub period_of_validity: Option<WireDatePeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbal_regulations: Option<Vec<String>>,
    #[serde(default)]
    pub additional_informations: Vec<WireAdditionalInformation>,
    /// Tagged attribute value in wire form (integer kinds coerced).
    /// Omitted entirely when the regulation carries no value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAdditionalInformation {
    /// Additional-information type code URI.
    #[serde(rename = "type")]
    pub type_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecommendation {
    pub plan_recommendation_key: Uuid,
    pub life_cycle_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_themes: Option<Vec<String>>,
    pub recommendation_number: Option<i32>,
    pub period_of_validity: Option<WireDatePeriod>,
    /// Language-keyed recommendation text.
    pub value: JsonValue,
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlanMap {
    pub plan_map_key: Uuid,
    pub name: JsonValue,
    pub file_key: Option<String>,
    pub coordinate_system: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttachmentDocument {
    pub attachment_document_key: Uuid,
    pub document_identifier: Option<String>,
    pub name: JsonValue,
    pub personal_data_content: String,
    pub category_of_publicity: String,
    pub accessibility: bool,
    pub retention_time: String,
    pub languages: Vec<String>,
    pub file_key: Option<String>,
    pub document_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrived_date: Option<NaiveDate>,
    pub type_of_attachment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOtherPlanMaterial {
    pub other_plan_material_key: Uuid,
    pub name: JsonValue,
    pub file_key: Option<String>,
    pub personal_data_content: String,
    pub category_of_publicity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlanReport {
    pub plan_report_key: Uuid,
    pub attachment_documents: Vec<WireAttachmentDocument>,
}

// ---------------------------------------------------------------------------
// Plan matter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlanDecision {
    pub plan_decision_key: Uuid,
    /// Decision name code URI.
    pub name: String,
    pub decision_date: NaiveDate,
    pub date_of_decision: NaiveDate,
    pub type_of_decision_maker: String,
    /// The plan document embedded in the decision.
    pub plans: Vec<WirePlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHandlingEvent {
    pub handling_event_key: Uuid,
    pub handling_event_type: String,
    pub event_time: NaiveDate,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireInteractionEvent {
    pub interaction_event_key: Uuid,
    pub interaction_event_type: String,
    pub event_time: WireTimePeriod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlanMatterPhase {
    pub plan_matter_phase_key: Uuid,
    pub life_cycle_status: String,
    pub geographical_area: WireGeometry,
    pub plan_decision: Option<WirePlanDecision>,
    pub handling_event: Option<WireHandlingEvent>,
    pub interaction_events: Option<Vec<WireInteractionEvent>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlanMatter {
    pub permanent_plan_identifier: Option<String>,
    /// Plan type code URI.
    pub plan_type: String,
    pub name: JsonValue,
    pub time_of_initiation: Option<NaiveDate>,
    pub description: Option<JsonValue>,
    pub producer_plan_identifier: Option<String>,
    pub case_identifiers: Vec<String>,
    pub record_numbers: Vec<String>,
    pub administrative_area_identifiers: Vec<String>,
    pub digital_origin: String,
    pub plan_matter_phases: Vec<WirePlanMatterPhase>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn regulation_without_value_omits_key() {
        let regulation = WireRegulation {
            plan_regulation_key: Uuid::new_v4(),
            life_cycle_status: "uri".to_owned(),
            type_uri: "uri".to_owned(),
            plan_themes: None,
            subject_identifiers: None,
            regulation_number: None,
            period_of_validity: None,
            verbal_regulations: None,
            additional_informations: Vec::new(),
            value: None,
        };
        let encoded = serde_json::to_value(&regulation).unwrap();
        assert!(encoded.get("value").is_none());
        assert!(encoded.get("planThemes").is_none());
        assert!(encoded.get("type").is_some());
        // Always-present keys stay, even as null.
        assert!(encoded.get("regulationNumber").is_some());
    }

    #[test]
    fn wire_keys_are_camel_case() {
        let relation = WireGroupRelation {
            plan_object_key: Uuid::new_v4(),
            plan_regulation_group_key: Uuid::new_v4(),
        };
        let encoded = serde_json::to_value(&relation).unwrap();
        assert!(encoded.get("planObjectKey").is_some());
        assert!(encoded.get("planRegulationGroupKey").is_some());
    }

    #[test]
    fn plan_roundtrips_through_json() {
        let plan = WirePlan {
            plan_key: Uuid::new_v4(),
            life_cycle_status: "http://uri.suomi.fi/codelist/rytj/kaavaelinkaari/code/03"
                .to_owned(),
            legal_effect_of_local_master_plans: None,
            scale: Some(50_000),
            geographical_area: WireGeometry {
                srid: "3067".to_owned(),
                geometry: json!({"type": "Polygon", "coordinates": []}),
            },
            plan_description: Some("kaava".to_owned()),
            general_regulation_groups: Vec::new(),
            plan_objects: Vec::new(),
            plan_regulation_groups: Vec::new(),
            plan_regulation_group_relations: Vec::new(),
            period_of_validity: None,
            approval_date: None,
            plan_maps: Vec::new(),
            plan_annexes: Vec::new(),
            other_plan_materials: Vec::new(),
            plan_report: None,
        };
        let encoded = serde_json::to_value(&plan).unwrap();
        let decoded: WirePlan = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, plan);
    }
}
