use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

use crate::value::AttributeValue;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Key of a reference-code list in the `codes` table.
///
/// Closed set: every code row belongs to one of these lists. URI handling
/// for the national lists lives in `arho-core`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CodeList {
    LifecycleStatus,
    PlanType,
    TypeOfPlanRegulation,
    TypeOfAdditionalInformation,
    TypeOfVerbalPlanRegulation,
    TypeOfPlanRegulationGroup,
    TypeOfUnderground,
    TypeOfDocument,
    NameOfPlanCaseDecision,
    TypeOfProcessingEvent,
    TypeOfInteractionEvent,
    PlanTheme,
    CategoryOfPublicity,
    PersonalDataContent,
    RetentionTime,
    Language,
    Municipality,
    AdministrativeRegion,
    TypeOfDecisionMaker,
    LegalEffectsOfMasterPlan,
}

impl CodeList {
    /// All lists, for seeding and exhaustive registry walks.
    pub const ALL: [CodeList; 20] = [
        Self::LifecycleStatus,
        Self::PlanType,
        Self::TypeOfPlanRegulation,
        Self::TypeOfAdditionalInformation,
        Self::TypeOfVerbalPlanRegulation,
        Self::TypeOfPlanRegulationGroup,
        Self::TypeOfUnderground,
        Self::TypeOfDocument,
        Self::NameOfPlanCaseDecision,
        Self::TypeOfProcessingEvent,
        Self::TypeOfInteractionEvent,
        Self::PlanTheme,
        Self::CategoryOfPublicity,
        Self::PersonalDataContent,
        Self::RetentionTime,
        Self::Language,
        Self::Municipality,
        Self::AdministrativeRegion,
        Self::TypeOfDecisionMaker,
        Self::LegalEffectsOfMasterPlan,
    ];
}

impl fmt::Display for CodeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LifecycleStatus => "lifecycle_status",
            Self::PlanType => "plan_type",
            Self::TypeOfPlanRegulation => "type_of_plan_regulation",
            Self::TypeOfAdditionalInformation => "type_of_additional_information",
            Self::TypeOfVerbalPlanRegulation => "type_of_verbal_plan_regulation",
            Self::TypeOfPlanRegulationGroup => "type_of_plan_regulation_group",
            Self::TypeOfUnderground => "type_of_underground",
            Self::TypeOfDocument => "type_of_document",
            Self::NameOfPlanCaseDecision => "name_of_plan_case_decision",
            Self::TypeOfProcessingEvent => "type_of_processing_event",
            Self::TypeOfInteractionEvent => "type_of_interaction_event",
            Self::PlanTheme => "plan_theme",
            Self::CategoryOfPublicity => "category_of_publicity",
            Self::PersonalDataContent => "personal_data_content",
            Self::RetentionTime => "retention_time",
            Self::Language => "language",
            Self::Municipality => "municipality",
            Self::AdministrativeRegion => "administrative_region",
            Self::TypeOfDecisionMaker => "type_of_decision_maker",
            Self::LegalEffectsOfMasterPlan => "legal_effects_of_master_plan",
        };
        f.write_str(s)
    }
}

impl FromStr for CodeList {
    type Err = CodeListParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lifecycle_status" => Ok(Self::LifecycleStatus),
            "plan_type" => Ok(Self::PlanType),
            "type_of_plan_regulation" => Ok(Self::TypeOfPlanRegulation),
            "type_of_additional_information" => Ok(Self::TypeOfAdditionalInformation),
            "type_of_verbal_plan_regulation" => Ok(Self::TypeOfVerbalPlanRegulation),
            "type_of_plan_regulation_group" => Ok(Self::TypeOfPlanRegulationGroup),
            "type_of_underground" => Ok(Self::TypeOfUnderground),
            "type_of_document" => Ok(Self::TypeOfDocument),
            "name_of_plan_case_decision" => Ok(Self::NameOfPlanCaseDecision),
            "type_of_processing_event" => Ok(Self::TypeOfProcessingEvent),
            "type_of_interaction_event" => Ok(Self::TypeOfInteractionEvent),
            "plan_theme" => Ok(Self::PlanTheme),
            "category_of_publicity" => Ok(Self::CategoryOfPublicity),
            "personal_data_content" => Ok(Self::PersonalDataContent),
            "retention_time" => Ok(Self::RetentionTime),
            "language" => Ok(Self::Language),
            "municipality" => Ok(Self::Municipality),
            "administrative_region" => Ok(Self::AdministrativeRegion),
            "type_of_decision_maker" => Ok(Self::TypeOfDecisionMaker),
            "legal_effects_of_master_plan" => Ok(Self::LegalEffectsOfMasterPlan),
            other => Err(CodeListParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`CodeList`] string.
#[derive(Debug, Clone)]
pub struct CodeListParseError(pub String);

impl fmt::Display for CodeListParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid code list: {:?}", self.0)
    }
}

impl std::error::Error for CodeListParseError {}

// ---------------------------------------------------------------------------

/// Kind of a plan object.
///
/// The kind is never supplied by callers or carried on the wire; it is
/// derived by the classifier from the object's geometry class and attached
/// regulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    LandUseArea,
    OtherArea,
    Line,
    LandUsePoint,
    OtherPoint,
}

impl ObjectKind {
    /// Whether this kind carries area geometry.
    pub fn is_area(self) -> bool {
        matches!(self, Self::LandUseArea | Self::OtherArea)
    }

    /// Whether this kind carries point geometry.
    pub fn is_point(self) -> bool {
        matches!(self, Self::LandUsePoint | Self::OtherPoint)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LandUseArea => "land_use_area",
            Self::OtherArea => "other_area",
            Self::Line => "line",
            Self::LandUsePoint => "land_use_point",
            Self::OtherPoint => "other_point",
        };
        f.write_str(s)
    }
}

impl FromStr for ObjectKind {
    type Err = ObjectKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "land_use_area" => Ok(Self::LandUseArea),
            "other_area" => Ok(Self::OtherArea),
            "line" => Ok(Self::Line),
            "land_use_point" => Ok(Self::LandUsePoint),
            "other_point" => Ok(Self::OtherPoint),
            other => Err(ObjectKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ObjectKind`] string.
#[derive(Debug, Clone)]
pub struct ObjectKindParseError(pub String);

impl fmt::Display for ObjectKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid object kind: {:?}", self.0)
    }
}

impl std::error::Error for ObjectKindParseError {}

// ---------------------------------------------------------------------------

/// Kind of a plan regulation group, from the local
/// `type_of_plan_regulation_group` code list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    GeneralRegulations,
    LandUseRegulations,
    OtherAreaRegulations,
    LineRegulations,
    OtherPointRegulations,
}

impl GroupKind {
    /// The local code-list value for this kind (the list uses camelCase
    /// values, unlike the column encoding).
    pub fn code_value(self) -> &'static str {
        match self {
            Self::GeneralRegulations => "generalRegulations",
            Self::LandUseRegulations => "landUseRegulations",
            Self::OtherAreaRegulations => "otherAreaRegulations",
            Self::LineRegulations => "lineRegulations",
            Self::OtherPointRegulations => "otherPointRegulations",
        }
    }

    /// Parse from the local code-list value.
    pub fn from_code_value(value: &str) -> Result<Self, GroupKindParseError> {
        match value {
            "generalRegulations" => Ok(Self::GeneralRegulations),
            "landUseRegulations" => Ok(Self::LandUseRegulations),
            "otherAreaRegulations" => Ok(Self::OtherAreaRegulations),
            "lineRegulations" => Ok(Self::LineRegulations),
            "otherPointRegulations" => Ok(Self::OtherPointRegulations),
            other => Err(GroupKindParseError(other.to_owned())),
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GeneralRegulations => "general_regulations",
            Self::LandUseRegulations => "land_use_regulations",
            Self::OtherAreaRegulations => "other_area_regulations",
            Self::LineRegulations => "line_regulations",
            Self::OtherPointRegulations => "other_point_regulations",
        };
        f.write_str(s)
    }
}

impl FromStr for GroupKind {
    type Err = GroupKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general_regulations" => Ok(Self::GeneralRegulations),
            "land_use_regulations" => Ok(Self::LandUseRegulations),
            "other_area_regulations" => Ok(Self::OtherAreaRegulations),
            "line_regulations" => Ok(Self::LineRegulations),
            "other_point_regulations" => Ok(Self::OtherPointRegulations),
            other => Err(GroupKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`GroupKind`] string.
#[derive(Debug, Clone)]
pub struct GroupKindParseError(pub String);

impl fmt::Display for GroupKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid regulation group kind: {:?}", self.0)
    }
}

impl std::error::Error for GroupKindParseError {}

// ---------------------------------------------------------------------------

/// Class of a lifecycle event. Selects which code column of `event_dates`
/// carries the event code and which allowed-event table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    Decision,
    ProcessingEvent,
    InteractionEvent,
}

impl EventClass {
    /// The code list the event code belongs to.
    pub fn code_list(self) -> CodeList {
        match self {
            Self::Decision => CodeList::NameOfPlanCaseDecision,
            Self::ProcessingEvent => CodeList::TypeOfProcessingEvent,
            Self::InteractionEvent => CodeList::TypeOfInteractionEvent,
        }
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Decision => "decision",
            Self::ProcessingEvent => "processing_event",
            Self::InteractionEvent => "interaction_event",
        };
        f.write_str(s)
    }
}

impl FromStr for EventClass {
    type Err = EventClassParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decision" => Ok(Self::Decision),
            "processing_event" => Ok(Self::ProcessingEvent),
            "interaction_event" => Ok(Self::InteractionEvent),
            other => Err(EventClassParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`EventClass`] string.
#[derive(Debug, Clone)]
pub struct EventClassParseError(pub String);

impl fmt::Display for EventClassParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid event class: {:?}", self.0)
    }
}

impl std::error::Error for EventClassParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A reference-code row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Code {
    pub id: Uuid,
    pub code_list: CodeList,
    pub value: String,
    pub short_name: Option<String>,
    pub name: JsonValue,
    pub description: Option<JsonValue>,
    pub status: Option<String>,
    pub level: i32,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// The organisation responsible for a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organisation {
    pub id: Uuid,
    pub name: JsonValue,
    pub business_id: Option<String>,
    pub municipality_id: Option<Uuid>,
    pub administrative_region_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A plan -- the root of the plan graph.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub plan_type_id: Uuid,
    pub lifecycle_status_id: Uuid,
    pub permanent_plan_identifier: Option<String>,
    pub producers_plan_identifier: Option<String>,
    pub matter_management_identifier: Option<String>,
    pub record_number: Option<String>,
    pub name: JsonValue,
    pub description: Option<JsonValue>,
    pub scale: Option<i64>,
    /// GeoJSON MultiPolygon.
    pub geom: JsonValue,
    pub srid: i32,
    pub to_be_exported: bool,
    pub validated_at: Option<DateTime<Utc>>,
    pub validation_errors: Option<JsonValue>,
    pub exported_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A spatial plan object. `plan_id` is nullable: objects created before any
/// containing plan exists stay unattached until one is found.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanObject {
    pub id: Uuid,
    pub plan_id: Option<Uuid>,
    pub kind: ObjectKind,
    pub lifecycle_status_id: Uuid,
    pub type_of_underground_id: Option<Uuid>,
    pub name: JsonValue,
    pub description: Option<JsonValue>,
    pub source_data_object: Option<String>,
    pub height_min: Option<f64>,
    pub height_max: Option<f64>,
    pub height_unit: Option<String>,
    pub height_reference_point: Option<String>,
    pub ordering: Option<i32>,
    /// GeoJSON multi-geometry matching the kind's geometry class.
    pub geom: JsonValue,
    pub srid: i32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A regulation group. Belongs to exactly one plan; attaches to the plan
/// itself or to plan objects through `regulation_group_associations`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanRegulationGroup {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub kind: GroupKind,
    pub short_name: Option<String>,
    pub name: JsonValue,
    pub ordering: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Attachment of a group to its plan or to a plan object.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RegulationGroupAssociation {
    pub id: Uuid,
    pub group_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub plan_object_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A plan regulation within a group.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanRegulation {
    pub id: Uuid,
    pub group_id: Uuid,
    pub type_of_plan_regulation_id: Uuid,
    pub lifecycle_status_id: Uuid,
    pub value: Option<Json<AttributeValue>>,
    pub subject_identifiers: Option<Vec<String>>,
    pub ordering: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Additional information qualifying a regulation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdditionalInformation {
    pub id: Uuid,
    pub plan_regulation_id: Uuid,
    pub type_of_additional_information_id: Uuid,
    pub value: Option<Json<AttributeValue>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A non-binding recommendation within a group.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanProposition {
    pub id: Uuid,
    pub group_id: Uuid,
    pub lifecycle_status_id: Uuid,
    pub text_value: JsonValue,
    pub ordering: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A document attached to a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
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
    /// File handle in the national file store; set once the file upload
    /// succeeded. Documents without it are never embedded on the wire.
    pub exported_file_key: Option<Uuid>,
    pub exported_file_etag: Option<String>,
    pub exported_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// One status period of an owner's lifecycle history. `ending_at` is NULL
/// while the period is open.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LifecycleDate {
    pub id: Uuid,
    pub lifecycle_status_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub plan_object_id: Option<Uuid>,
    pub plan_regulation_id: Option<Uuid>,
    pub plan_proposition_id: Option<Uuid>,
    pub starting_at: DateTime<Utc>,
    pub ending_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl LifecycleDate {
    /// The id of whichever owner column is set.
    pub fn owner_id(&self) -> Option<Uuid> {
        self.plan_id
            .or(self.plan_object_id)
            .or(self.plan_regulation_id)
            .or(self.plan_proposition_id)
    }
}

/// An event recorded inside a lifecycle status period.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventDate {
    pub id: Uuid,
    pub lifecycle_date_id: Uuid,
    pub decision_id: Option<Uuid>,
    pub processing_event_id: Option<Uuid>,
    pub interaction_event_id: Option<Uuid>,
    pub starting_at: DateTime<Utc>,
    pub ending_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl EventDate {
    /// The class of this event, from whichever code column is set.
    pub fn event_class(&self) -> Option<EventClass> {
        if self.decision_id.is_some() {
            Some(EventClass::Decision)
        } else if self.processing_event_id.is_some() {
            Some(EventClass::ProcessingEvent)
        } else if self.interaction_event_id.is_some() {
            Some(EventClass::InteractionEvent)
        } else {
            None
        }
    }

    /// The event code id, from whichever code column is set.
    pub fn event_code_id(&self) -> Option<Uuid> {
        self.decision_id
            .or(self.processing_event_id)
            .or(self.interaction_event_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
