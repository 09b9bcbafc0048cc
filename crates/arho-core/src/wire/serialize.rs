//! Plan graph to wire document.
//!
//! Serialization is pure: the graph already carries every code value and
//! lifecycle period, so building the wire document needs no database
//! access. Code values turn into national URIs, lifecycle history turns
//! into validity periods and phase events, and documents are dispatched
//! to the wire slot their type demands.

use chrono::{Duration, NaiveDate};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use uuid::Uuid;

use arho_db::models::{CodeList, EventClass, GroupKind, ObjectKind};

use crate::classify;
use crate::codes::{self, APPROVED_STATUS, DECISION_MAKER, VALID_STATUS};
use crate::geometry::{self, GeometryError};
use crate::graph::{GroupNode, ObjectNode, PlanGraph, PropositionNode, RegulationNode, last_period};

use super::schema::*;

/// Document type value routed to the plan map slot.
const DOCUMENT_TYPE_MAP: &str = "03";
/// Document type value folded into the plan report.
const DOCUMENT_TYPE_REPORT: &str = "06";
/// Document type value routed to other plan materials.
const DOCUMENT_TYPE_OTHER: &str = "99";

/// Fill color placeholder for regulation groups; the wire schema requires
/// one even though the graph carries no symbology.
const GROUP_COLOR: &str = "#FFFFFF";

/// Errors from wire serialization.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("code list {list} has no wire URI (value {value:?})")]
    MissingUri { list: CodeList, value: String },
    #[error("document {id} is missing {field}")]
    MissingDocumentField { id: Uuid, field: &'static str },
    #[error("plan organisation has neither a municipality nor an administrative region")]
    MissingAdministrativeArea,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

fn require_uri(list: CodeList, value: &str) -> Result<String, SerializeError> {
    codes::uri(list, value).ok_or_else(|| SerializeError::MissingUri {
        list,
        value: value.to_owned(),
    })
}

/// The period of validity of an owner: its last in-force period, dates
/// only.
fn period_of_validity(
    periods: &[crate::graph::StatusPeriod],
) -> Option<WireDatePeriod> {
    last_period(periods, VALID_STATUS).map(|p| WireDatePeriod {
        begin: p.starting_at.date_naive(),
        end: p.ending_at.map(|e| e.date_naive()),
    })
}

// ---------------------------------------------------------------------------
// Plan document
// ---------------------------------------------------------------------------

/// Build the wire plan document from a loaded graph.
pub fn plan_to_wire(graph: &PlanGraph) -> Result<WirePlan, SerializeError> {
    let plan = &graph.plan;

    let legal_effects = if plan.legal_effects.is_empty() {
        None
    } else {
        let mut uris = Vec::with_capacity(plan.legal_effects.len());
        for value in &plan.legal_effects {
            uris.push(require_uri(CodeList::LegalEffectsOfMasterPlan, value)?);
        }
        Some(uris)
    };

    let mut plan_objects = Vec::with_capacity(graph.objects.len());
    let mut relations = Vec::new();
    for object in &graph.objects {
        plan_objects.push(object_to_wire(graph, object)?);
        for group_id in &object.group_ids {
            relations.push(WireGroupRelation {
                plan_object_key: object.id,
                plan_regulation_group_key: *group_id,
            });
        }
    }

    let mut general_groups = Vec::new();
    let mut regulation_groups = Vec::new();
    let mut ordered_groups: Vec<&GroupNode> = graph.groups.iter().collect();
    ordered_groups.sort_by_key(|g| (g.ordering.is_none(), g.ordering));
    for group in ordered_groups {
        if group.kind == GroupKind::GeneralRegulations {
            general_groups.push(general_group_to_wire(group)?);
        } else {
            regulation_groups.push(group_to_wire(group)?);
        }
    }

    let mut plan_maps = Vec::new();
    let mut plan_annexes = Vec::new();
    let mut other_materials = Vec::new();
    let mut report_documents = Vec::new();
    for document in &graph.documents {
        // A document without an issued file key has not been uploaded yet
        // and stays out of the wire document.
        if document.exported_file_key.is_none() {
            continue;
        }
        match document.document_type.as_str() {
            DOCUMENT_TYPE_MAP => plan_maps.push(WirePlanMap {
                plan_map_key: document.id,
                name: document.name.clone(),
                file_key: document.exported_file_key.map(|k| k.to_string()),
                coordinate_system: codes::COORDINATE_SYSTEM_URI.to_owned(),
            }),
            DOCUMENT_TYPE_REPORT => report_documents.push(attachment_to_wire(document)?),
            DOCUMENT_TYPE_OTHER => other_materials.push(other_material_to_wire(document)?),
            _ => plan_annexes.push(attachment_to_wire(document)?),
        }
    }
    let plan_report = if report_documents.is_empty() {
        None
    } else {
        Some(WirePlanReport {
            plan_report_key: Uuid::new_v4(),
            attachment_documents: report_documents,
        })
    };

    Ok(WirePlan {
        plan_key: plan.id,
        life_cycle_status: require_uri(CodeList::LifecycleStatus, &plan.lifecycle_status)?,
        legal_effect_of_local_master_plans: legal_effects,
        scale: plan.scale,
        geographical_area: WireGeometry {
            srid: plan.srid.to_string(),
            geometry: plan.geom.clone(),
        },
        plan_description: language_text(plan.description.as_ref(), "fin"),
        general_regulation_groups: general_groups,
        plan_objects,
        plan_regulation_groups: regulation_groups,
        plan_regulation_group_relations: relations,
        period_of_validity: period_of_validity(&plan.lifecycle),
        approval_date: last_period(&plan.lifecycle, APPROVED_STATUS)
            .map(|p| p.starting_at.date_naive()),
        plan_maps,
        plan_annexes,
        other_plan_materials: other_materials,
        plan_report,
    })
}

/// Pick one language from a language-keyed text object.
fn language_text(value: Option<&JsonValue>, language: &str) -> Option<String> {
    value
        .and_then(|v| v.get(language))
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
}

fn object_to_wire(graph: &PlanGraph, object: &ObjectNode) -> Result<WirePlanObject, SerializeError> {
    let underground = match &object.underground {
        Some(value) => Some(require_uri(CodeList::TypeOfUnderground, value)?),
        None => None,
    };

    let geometry = geometry::unwrap_single(geometry::parse(&object.geom)?);

    let vertical_limit = if object.height_min.is_some() || object.height_max.is_some() {
        Some(json!({
            "dataType": "decimalRange",
            "minimumValue": object.height_min,
            "maximumValue": object.height_max,
            "unitOfMeasure": object.height_unit,
        }))
    } else {
        None
    };

    let related = related_object_keys(graph, object)?;

    Ok(WirePlanObject {
        plan_object_key: object.id,
        life_cycle_status: require_uri(CodeList::LifecycleStatus, &object.lifecycle_status)?,
        underground_status: underground,
        geometry: WireGeometry {
            srid: object.srid.to_string(),
            geometry: geometry::to_json(&geometry)?,
        },
        name: object.name.clone(),
        description: object.description.clone(),
        object_number: object.ordering,
        period_of_validity: period_of_validity(&object.lifecycle),
        vertical_limit,
        related_plan_object_keys: if related.is_empty() {
            None
        } else {
            Some(related)
        },
    })
}

/// Keys of the land-use areas containing an object that carries a
/// regulation whose national quality rules require the reference. Only
/// other-area objects carry such regulations.
fn related_object_keys(
    graph: &PlanGraph,
    object: &ObjectNode,
) -> Result<Vec<Uuid>, SerializeError> {
    if object.kind != ObjectKind::OtherArea {
        return Ok(Vec::new());
    }
    let needs_reference = object
        .group_ids
        .iter()
        .filter_map(|id| graph.group(*id))
        .flat_map(|g| &g.regulations)
        .any(|r| classify::needs_containing_area(&r.regulation_type));
    if !needs_reference {
        return Ok(Vec::new());
    }

    let inner = geometry::parse(&object.geom)?;
    let mut keys = Vec::new();
    for candidate in &graph.objects {
        if candidate.kind != ObjectKind::LandUseArea {
            continue;
        }
        let outer = geometry::parse(&candidate.geom)?;
        if geometry::contains(&outer, &inner) {
            keys.push(candidate.id);
        }
    }
    Ok(keys)
}

fn regulation_to_wire(regulation: &RegulationNode) -> Result<WireRegulation, SerializeError> {
    let themes = if regulation.themes.is_empty() {
        None
    } else {
        let mut uris = Vec::with_capacity(regulation.themes.len());
        for theme in &regulation.themes {
            uris.push(require_uri(CodeList::PlanTheme, theme)?);
        }
        Some(uris)
    };
    let verbal = if regulation.verbal_types.is_empty() {
        None
    } else {
        let mut uris = Vec::with_capacity(regulation.verbal_types.len());
        for value in &regulation.verbal_types {
            uris.push(require_uri(CodeList::TypeOfVerbalPlanRegulation, value)?);
        }
        Some(uris)
    };
    let mut additional = Vec::with_capacity(regulation.additional_information.len());
    for info in &regulation.additional_information {
        additional.push(WireAdditionalInformation {
            type_uri: require_uri(CodeList::TypeOfAdditionalInformation, &info.info_type)?,
            value: info.value.as_ref().map(|v| v.to_wire()),
        });
    }

    Ok(WireRegulation {
        plan_regulation_key: regulation.id,
        life_cycle_status: require_uri(CodeList::LifecycleStatus, &regulation.lifecycle_status)?,
        type_uri: require_uri(CodeList::TypeOfPlanRegulation, &regulation.regulation_type)?,
        plan_themes: themes,
        subject_identifiers: if regulation.subject_identifiers.is_empty() {
            None
        } else {
            Some(regulation.subject_identifiers.clone())
        },
        regulation_number: regulation.ordering.map(|n| n.to_string()),
        period_of_validity: period_of_validity(&regulation.lifecycle),
        verbal_regulations: verbal,
        additional_informations: additional,
        value: regulation.value.as_ref().map(|v| v.to_wire()),
    })
}

fn recommendation_to_wire(
    proposition: &PropositionNode,
) -> Result<WireRecommendation, SerializeError> {
    let themes = if proposition.themes.is_empty() {
        None
    } else {
        let mut uris = Vec::with_capacity(proposition.themes.len());
        for theme in &proposition.themes {
            uris.push(require_uri(CodeList::PlanTheme, theme)?);
        }
        Some(uris)
    };
    Ok(WireRecommendation {
        plan_recommendation_key: proposition.id,
        life_cycle_status: require_uri(CodeList::LifecycleStatus, &proposition.lifecycle_status)?,
        plan_themes: themes,
        recommendation_number: proposition.ordering,
        period_of_validity: period_of_validity(&proposition.lifecycle),
        value: proposition.text_value.clone(),
    })
}

fn group_to_wire(group: &GroupNode) -> Result<WireGroup, SerializeError> {
    let mut regulations = Vec::with_capacity(group.regulations.len());
    for regulation in &group.regulations {
        regulations.push(regulation_to_wire(regulation)?);
    }
    let mut recommendations = Vec::with_capacity(group.propositions.len());
    for proposition in &group.propositions {
        recommendations.push(recommendation_to_wire(proposition)?);
    }
    Ok(WireGroup {
        plan_regulation_group_key: group.id,
        title_of_plan_regulation: group.name.clone(),
        group_number: group.ordering,
        letter_identifier: group.short_name.clone(),
        color_number: Some(GROUP_COLOR.to_owned()),
        plan_recommendations: recommendations,
        plan_regulations: regulations,
    })
}

fn general_group_to_wire(group: &GroupNode) -> Result<WireGeneralGroup, SerializeError> {
    let mut regulations = Vec::with_capacity(group.regulations.len());
    for regulation in &group.regulations {
        regulations.push(regulation_to_wire(regulation)?);
    }
    let mut recommendations = Vec::with_capacity(group.propositions.len());
    for proposition in &group.propositions {
        recommendations.push(recommendation_to_wire(proposition)?);
    }
    Ok(WireGeneralGroup {
        general_regulation_group_key: group.id,
        title_of_plan_regulation: group.name.clone(),
        group_number: group.ordering,
        plan_recommendations: recommendations,
        plan_regulations: regulations,
    })
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

fn attachment_to_wire(
    document: &crate::graph::DocumentNode,
) -> Result<WireAttachmentDocument, SerializeError> {
    let field = |value: Option<&String>, name: &'static str| {
        value.cloned().ok_or(SerializeError::MissingDocumentField {
            id: document.id,
            field: name,
        })
    };
    let personal_data = field(document.personal_data_content.as_ref(), "personal data content")?;
    let publicity = field(document.category_of_publicity.as_ref(), "category of publicity")?;
    let retention = field(document.retention_time.as_ref(), "retention time")?;
    let languages = match &document.language {
        Some(language) => vec![require_uri(CodeList::Language, language)?],
        None => Vec::new(),
    };

    Ok(WireAttachmentDocument {
        attachment_document_key: document.id,
        document_identifier: document.permanent_document_identifier.clone(),
        name: document.name.clone(),
        personal_data_content: require_uri(CodeList::PersonalDataContent, &personal_data)?,
        category_of_publicity: require_uri(CodeList::CategoryOfPublicity, &publicity)?,
        accessibility: document.accessibility,
        retention_time: require_uri(CodeList::RetentionTime, &retention)?,
        languages,
        file_key: document.exported_file_key.map(|k| k.to_string()),
        document_date: document.document_date.map(|d| d.date_naive()),
        arrived_date: document.arrival_date.map(|d| d.date_naive()),
        type_of_attachment: require_uri(CodeList::TypeOfDocument, &document.document_type)?,
    })
}

fn other_material_to_wire(
    document: &crate::graph::DocumentNode,
) -> Result<WireOtherPlanMaterial, SerializeError> {
    let field = |value: Option<&String>, name: &'static str| {
        value.cloned().ok_or(SerializeError::MissingDocumentField {
            id: document.id,
            field: name,
        })
    };
    let personal_data = field(document.personal_data_content.as_ref(), "personal data content")?;
    let publicity = field(document.category_of_publicity.as_ref(), "category of publicity")?;
    Ok(WireOtherPlanMaterial {
        other_plan_material_key: document.id,
        name: document.name.clone(),
        file_key: document.exported_file_key.map(|k| k.to_string()),
        personal_data_content: require_uri(CodeList::PersonalDataContent, &personal_data)?,
        category_of_publicity: require_uri(CodeList::CategoryOfPublicity, &publicity)?,
    })
}

// ---------------------------------------------------------------------------
// Plan matter
// ---------------------------------------------------------------------------

/// Build the wire plan matter wrapping an already-serialized plan
/// document. The matter carries exactly one phase, derived from the
/// plan's current status.
pub fn plan_matter_to_wire(
    graph: &PlanGraph,
    wire_plan: &WirePlan,
) -> Result<WirePlanMatter, SerializeError> {
    let plan = &graph.plan;

    let area_identifier = plan
        .municipality
        .clone()
        .or_else(|| plan.administrative_region.clone())
        .ok_or(SerializeError::MissingAdministrativeArea)?;

    let current_period = last_period(&plan.lifecycle, &plan.lifecycle_status);
    if current_period.is_none() {
        tracing::warn!(
            plan = %plan.id,
            status = %plan.lifecycle_status,
            "current status has no lifecycle date, phase events omitted"
        );
    }

    let phase = WirePlanMatterPhase {
        plan_matter_phase_key: Uuid::new_v4(),
        life_cycle_status: wire_plan.life_cycle_status.clone(),
        geographical_area: wire_plan.geographical_area.clone(),
        plan_decision: match current_period {
            Some(period) => build_decision(plan, period, wire_plan)?,
            None => None,
        },
        handling_event: match current_period {
            Some(period) => build_handling_event(plan, period)?,
            None => None,
        },
        interaction_events: match current_period {
            Some(period) => {
                let events = build_interaction_events(plan, period)?;
                if events.is_empty() { None } else { Some(events) }
            }
            None => None,
        },
    };

    Ok(WirePlanMatter {
        permanent_plan_identifier: plan.permanent_plan_identifier.clone(),
        plan_type: require_uri(CodeList::PlanType, &plan.plan_type)?,
        name: plan.name.clone(),
        time_of_initiation: last_period(&plan.lifecycle, codes::PENDING_STATUS)
            .map(|p| p.starting_at.date_naive()),
        description: plan.description.clone(),
        producer_plan_identifier: plan.producers_plan_identifier.clone(),
        case_identifiers: plan
            .matter_management_identifier
            .clone()
            .into_iter()
            .collect(),
        record_numbers: plan.record_number.clone().into_iter().collect(),
        administrative_area_identifiers: vec![area_identifier],
        digital_origin: codes::DIGITAL_ORIGIN_URI.to_owned(),
        plan_matter_phases: vec![phase],
    })
}

/// The date a phase event falls on: the last recorded event of that class
/// and code in the current period, else the period's own start.
fn event_date(
    period: &crate::graph::StatusPeriod,
    class: EventClass,
    code: &str,
) -> NaiveDate {
    period
        .last_event(class, code)
        .map(|e| e.starting_at)
        .unwrap_or(period.starting_at)
        .date_naive()
}

fn build_decision(
    plan: &crate::graph::PlanNode,
    period: &crate::graph::StatusPeriod,
    wire_plan: &WirePlan,
) -> Result<Option<WirePlanDecision>, SerializeError> {
    let Some(code) = codes::allowed_events(EventClass::Decision, &plan.lifecycle_status).first()
    else {
        return Ok(None);
    };
    let date = event_date(period, EventClass::Decision, code);
    Ok(Some(WirePlanDecision {
        plan_decision_key: Uuid::new_v4(),
        name: require_uri(CodeList::NameOfPlanCaseDecision, code)?,
        decision_date: date,
        date_of_decision: date,
        type_of_decision_maker: require_uri(CodeList::TypeOfDecisionMaker, DECISION_MAKER)?,
        plans: vec![wire_plan.clone()],
    }))
}

fn build_handling_event(
    plan: &crate::graph::PlanNode,
    period: &crate::graph::StatusPeriod,
) -> Result<Option<WireHandlingEvent>, SerializeError> {
    let Some(code) =
        codes::allowed_events(EventClass::ProcessingEvent, &plan.lifecycle_status).first()
    else {
        return Ok(None);
    };
    Ok(Some(WireHandlingEvent {
        handling_event_key: Uuid::new_v4(),
        handling_event_type: require_uri(CodeList::TypeOfProcessingEvent, code)?,
        event_time: event_date(period, EventClass::ProcessingEvent, code),
        cancelled: false,
    }))
}

fn build_interaction_events(
    plan: &crate::graph::PlanNode,
    period: &crate::graph::StatusPeriod,
) -> Result<Vec<WireInteractionEvent>, SerializeError> {
    let mut events = Vec::new();
    for code in codes::allowed_events(EventClass::InteractionEvent, &plan.lifecycle_status) {
        let event_time = match period.last_event(EventClass::InteractionEvent, code) {
            Some(event) => WireTimePeriod {
                begin: event.starting_at,
                end: event.ending_at,
            },
            // No recorded interaction period: assume one month from the
            // status change.
            None => WireTimePeriod {
                begin: period.starting_at,
                end: Some(period.starting_at + Duration::days(30)),
            },
        };
        events.push(WireInteractionEvent {
            interaction_event_key: Uuid::new_v4(),
            interaction_event_type: require_uri(CodeList::TypeOfInteractionEvent, code)?,
            event_time,
        });
    }
    Ok(events)
}
