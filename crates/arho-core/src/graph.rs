//! In-memory plan graph.
//!
//! The graph carries code references as their code-list *values* (plain
//! strings), not database ids. That keeps the wire serializer and
//! deserializer pure: they translate between the graph and the wire
//! document without touching the database, and only the loader and the
//! importer talk to code ids through a [`CodeRegistry`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgConnection;
use uuid::Uuid;

use arho_db::models::{EventClass, GroupKind, ObjectKind};
use arho_db::queries::dates::{self, DateOwner};
use arho_db::queries::{documents, groups, objects, organisations, plans, regulations};
use arho_db::value::AttributeValue;

use crate::codes::CodeRegistry;

/// One status period of an owner's lifecycle history, with the events
/// recorded inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPeriod {
    /// Lifecycle status code value.
    pub status: String,
    pub starting_at: DateTime<Utc>,
    pub ending_at: Option<DateTime<Utc>>,
    pub events: Vec<EventRecord>,
}

impl StatusPeriod {
    /// The last event of the given class and code value, in recorded order.
    pub fn last_event(&self, class: EventClass, code: &str) -> Option<&EventRecord> {
        self.events
            .iter()
            .filter(|e| e.class == class && e.code == code)
            .next_back()
    }
}

/// The last period held in the given status, or `None`.
pub fn last_period<'a>(periods: &'a [StatusPeriod], status: &str) -> Option<&'a StatusPeriod> {
    periods.iter().filter(|p| p.status == status).next_back()
}

/// A decision, processing event, or interaction event inside a period.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub class: EventClass,
    /// Event code value within the class's code list.
    pub code: String,
    pub starting_at: DateTime<Utc>,
    pub ending_at: Option<DateTime<Utc>>,
}

/// The plan node of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub id: Uuid,
    pub organisation_id: Uuid,
    /// Plan type code value.
    pub plan_type: String,
    /// Current lifecycle status code value.
    pub lifecycle_status: String,
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
    /// Master-plan legal effect code values.
    pub legal_effects: Vec<String>,
    /// Municipality code value of the responsible organisation.
    pub municipality: Option<String>,
    /// Administrative region code value of the responsible organisation.
    pub administrative_region: Option<String>,
    pub lifecycle: Vec<StatusPeriod>,
}

/// A spatial plan object node.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    pub id: Uuid,
    pub kind: ObjectKind,
    pub lifecycle_status: String,
    /// Underground type code value.
    pub underground: Option<String>,
    pub name: JsonValue,
    pub description: Option<JsonValue>,
    pub source_data_object: Option<String>,
    pub height_min: Option<f64>,
    pub height_max: Option<f64>,
    pub height_unit: Option<String>,
    pub height_reference_point: Option<String>,
    pub ordering: Option<i32>,
    /// GeoJSON multi geometry.
    pub geom: JsonValue,
    pub srid: i32,
    /// Groups attached to this object.
    pub group_ids: Vec<Uuid>,
    pub lifecycle: Vec<StatusPeriod>,
}

/// A regulation group node with its regulations and propositions.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub id: Uuid,
    pub kind: GroupKind,
    pub short_name: Option<String>,
    pub name: JsonValue,
    pub ordering: Option<i32>,
    /// Whether the group is attached to the plan itself (general group).
    pub attached_to_plan: bool,
    pub regulations: Vec<RegulationNode>,
    pub propositions: Vec<PropositionNode>,
}

/// A plan regulation node.
#[derive(Debug, Clone, PartialEq)]
pub struct RegulationNode {
    pub id: Uuid,
    /// Regulation type code value.
    pub regulation_type: String,
    pub lifecycle_status: String,
    pub value: Option<AttributeValue>,
    pub subject_identifiers: Vec<String>,
    pub ordering: Option<i32>,
    /// Plan theme code values.
    pub themes: Vec<String>,
    /// Verbal regulation type code values.
    pub verbal_types: Vec<String>,
    pub additional_information: Vec<AdditionalInfoNode>,
    pub lifecycle: Vec<StatusPeriod>,
}

/// Additional information qualifying a regulation.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditionalInfoNode {
    /// Additional-information type code value.
    pub info_type: String,
    pub value: Option<AttributeValue>,
}

/// A plan proposition (recommendation) node.
#[derive(Debug, Clone, PartialEq)]
pub struct PropositionNode {
    pub id: Uuid,
    pub lifecycle_status: String,
    pub text_value: JsonValue,
    pub ordering: Option<i32>,
    pub themes: Vec<String>,
    pub lifecycle: Vec<StatusPeriod>,
}

/// A document node.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNode {
    pub id: Uuid,
    /// Document type code value.
    pub document_type: String,
    pub category_of_publicity: Option<String>,
    pub personal_data_content: Option<String>,
    pub retention_time: Option<String>,
    pub language: Option<String>,
    pub permanent_document_identifier: Option<String>,
    pub name: JsonValue,
    pub url: Option<String>,
    pub accessibility: bool,
    pub document_date: Option<DateTime<Utc>>,
    pub arrival_date: Option<DateTime<Utc>>,
    pub exported_file_key: Option<Uuid>,
    pub exported_file_etag: Option<String>,
    pub exported_at: Option<DateTime<Utc>>,
}

/// A complete plan graph, ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanGraph {
    pub plan: PlanNode,
    pub objects: Vec<ObjectNode>,
    pub groups: Vec<GroupNode>,
    pub documents: Vec<DocumentNode>,
}

impl PlanGraph {
    /// The group with the given id, if present.
    pub fn group(&self, id: Uuid) -> Option<&GroupNode> {
        self.groups.iter().find(|g| g.id == id)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load the full graph of one plan.
pub async fn load_plan_graph(
    conn: &mut PgConnection,
    registry: &CodeRegistry,
    plan_id: Uuid,
) -> Result<PlanGraph> {
    let plan = plans::get_plan(&mut *conn, plan_id)
        .await?
        .with_context(|| format!("plan {plan_id} not found"))?;

    let organisation = organisations::get_organisation(&mut *conn, plan.organisation_id)
        .await?
        .with_context(|| format!("organisation {} not found", plan.organisation_id))?;
    let municipality = match organisation.municipality_id {
        Some(id) => Some(registry.value_of(id)?.to_owned()),
        None => None,
    };
    let administrative_region = match organisation.administrative_region_id {
        Some(id) => Some(registry.value_of(id)?.to_owned()),
        None => None,
    };

    let mut legal_effects = Vec::new();
    for effect_id in plans::list_legal_effects(&mut *conn, plan_id).await? {
        legal_effects.push(registry.value_of(effect_id)?.to_owned());
    }

    let plan_node = PlanNode {
        id: plan.id,
        organisation_id: plan.organisation_id,
        plan_type: registry.value_of(plan.plan_type_id)?.to_owned(),
        lifecycle_status: registry.value_of(plan.lifecycle_status_id)?.to_owned(),
        permanent_plan_identifier: plan.permanent_plan_identifier,
        producers_plan_identifier: plan.producers_plan_identifier,
        matter_management_identifier: plan.matter_management_identifier,
        record_number: plan.record_number,
        name: plan.name,
        description: plan.description,
        scale: plan.scale,
        geom: plan.geom,
        srid: plan.srid,
        legal_effects,
        municipality,
        administrative_region,
        lifecycle: load_lifecycle(conn, registry, DateOwner::Plan(plan_id)).await?,
    };

    // Objects and the group attachments they carry.
    let associations = groups::list_associations_for_plan(&mut *conn, plan_id).await?;
    let mut objects_out = Vec::new();
    for object in objects::list_objects_for_plan(&mut *conn, plan_id).await? {
        let underground = match object.type_of_underground_id {
            Some(id) => Some(registry.value_of(id)?.to_owned()),
            None => None,
        };
        let group_ids = associations
            .iter()
            .filter(|a| a.plan_object_id == Some(object.id))
            .map(|a| a.group_id)
            .collect();
        objects_out.push(ObjectNode {
            id: object.id,
            kind: object.kind,
            lifecycle_status: registry.value_of(object.lifecycle_status_id)?.to_owned(),
            underground,
            name: object.name,
            description: object.description,
            source_data_object: object.source_data_object,
            height_min: object.height_min,
            height_max: object.height_max,
            height_unit: object.height_unit,
            height_reference_point: object.height_reference_point,
            ordering: object.ordering,
            geom: object.geom,
            srid: object.srid,
            group_ids,
            lifecycle: load_lifecycle(conn, registry, DateOwner::PlanObject(object.id)).await?,
        });
    }

    let mut groups_out = Vec::new();
    for group in groups::list_groups_for_plan(&mut *conn, plan_id).await? {
        let attached_to_plan = associations
            .iter()
            .any(|a| a.group_id == group.id && a.plan_id.is_some());

        let mut regulation_nodes = Vec::new();
        for regulation in regulations::list_regulations_for_group(&mut *conn, group.id).await? {
            let mut themes = Vec::new();
            for theme_id in regulations::list_regulation_themes(&mut *conn, regulation.id).await? {
                themes.push(registry.value_of(theme_id)?.to_owned());
            }
            let mut verbal_types = Vec::new();
            for verbal_id in
                regulations::list_regulation_verbal_types(&mut *conn, regulation.id).await?
            {
                verbal_types.push(registry.value_of(verbal_id)?.to_owned());
            }
            let mut additional_information = Vec::new();
            for info in regulations::list_additional_information(&mut *conn, regulation.id).await? {
                additional_information.push(AdditionalInfoNode {
                    info_type: registry
                        .value_of(info.type_of_additional_information_id)?
                        .to_owned(),
                    value: info.value.map(|v| v.0),
                });
            }
            regulation_nodes.push(RegulationNode {
                id: regulation.id,
                regulation_type: registry
                    .value_of(regulation.type_of_plan_regulation_id)?
                    .to_owned(),
                lifecycle_status: registry
                    .value_of(regulation.lifecycle_status_id)?
                    .to_owned(),
                value: regulation.value.map(|v| v.0),
                subject_identifiers: regulation.subject_identifiers.unwrap_or_default(),
                ordering: regulation.ordering,
                themes,
                verbal_types,
                additional_information,
                lifecycle: load_lifecycle(conn, registry, DateOwner::PlanRegulation(regulation.id))
                    .await?,
            });
        }

        let mut proposition_nodes = Vec::new();
        for proposition in regulations::list_propositions_for_group(&mut *conn, group.id).await? {
            let mut themes = Vec::new();
            for theme_id in
                regulations::list_proposition_themes(&mut *conn, proposition.id).await?
            {
                themes.push(registry.value_of(theme_id)?.to_owned());
            }
            proposition_nodes.push(PropositionNode {
                id: proposition.id,
                lifecycle_status: registry
                    .value_of(proposition.lifecycle_status_id)?
                    .to_owned(),
                text_value: proposition.text_value,
                ordering: proposition.ordering,
                themes,
                lifecycle: load_lifecycle(
                    conn,
                    registry,
                    DateOwner::PlanProposition(proposition.id),
                )
                .await?,
            });
        }

        groups_out.push(GroupNode {
            id: group.id,
            kind: group.kind,
            short_name: group.short_name,
            name: group.name,
            ordering: group.ordering,
            attached_to_plan,
            regulations: regulation_nodes,
            propositions: proposition_nodes,
        });
    }

    let mut documents_out = Vec::new();
    for document in documents::list_documents_for_plan(&mut *conn, plan_id).await? {
        let value_of_opt = |id: Option<Uuid>| -> Result<Option<String>> {
            Ok(match id {
                Some(id) => Some(registry.value_of(id)?.to_owned()),
                None => None,
            })
        };
        documents_out.push(DocumentNode {
            id: document.id,
            document_type: registry.value_of(document.type_of_document_id)?.to_owned(),
            category_of_publicity: value_of_opt(document.category_of_publicity_id)?,
            personal_data_content: value_of_opt(document.personal_data_content_id)?,
            retention_time: value_of_opt(document.retention_time_id)?,
            language: value_of_opt(document.language_id)?,
            permanent_document_identifier: document.permanent_document_identifier,
            name: document.name,
            url: document.url,
            accessibility: document.accessibility,
            document_date: document.document_date,
            arrival_date: document.arrival_date,
            exported_file_key: document.exported_file_key,
            exported_file_etag: document.exported_file_etag,
            exported_at: document.exported_at,
        });
    }

    Ok(PlanGraph {
        plan: plan_node,
        objects: objects_out,
        groups: groups_out,
        documents: documents_out,
    })
}

/// Load an owner's status periods with their events.
async fn load_lifecycle(
    conn: &mut PgConnection,
    registry: &CodeRegistry,
    owner: DateOwner,
) -> Result<Vec<StatusPeriod>> {
    let rows = dates::list_dates_for_owner(&mut *conn, owner).await?;
    let date_ids: Vec<Uuid> = rows.iter().map(|d| d.id).collect();
    let events = dates::list_events_for_dates(&mut *conn, &date_ids).await?;

    let mut periods = Vec::with_capacity(rows.len());
    for row in rows {
        let mut period_events = Vec::new();
        for event in events.iter().filter(|e| e.lifecycle_date_id == row.id) {
            let class = match event.event_class() {
                Some(class) => class,
                None => continue,
            };
            let code_id = match event.event_code_id() {
                Some(id) => id,
                None => continue,
            };
            period_events.push(EventRecord {
                class,
                code: registry.value_of(code_id)?.to_owned(),
                starting_at: event.starting_at,
                ending_at: event.ending_at,
            });
        }
        periods.push(StatusPeriod {
            status: registry.value_of(row.lifecycle_status_id)?.to_owned(),
            starting_at: row.starting_at,
            ending_at: row.ending_at,
            events: period_events,
        });
    }
    Ok(periods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    fn period(status: &str, day: u32) -> StatusPeriod {
        StatusPeriod {
            status: status.to_owned(),
            starting_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            ending_at: None,
            events: Vec::new(),
        }
    }

    #[test]
    fn last_period_picks_latest_match() {
        let periods = vec![period("02", 1), period("03", 5), period("02", 9)];
        let found = last_period(&periods, "02").unwrap();
        assert_eq!(found.starting_at.day(), 9);
        assert!(last_period(&periods, "13").is_none());
    }

    #[test]
    fn last_event_filters_class_and_code() {
        let t1 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 2, 5, 0, 0, 0).unwrap();
        let mut p = period("03", 1);
        p.events = vec![
            EventRecord {
                class: EventClass::Decision,
                code: "04".to_owned(),
                starting_at: t1,
                ending_at: None,
            },
            EventRecord {
                class: EventClass::Decision,
                code: "04".to_owned(),
                starting_at: t2,
                ending_at: None,
            },
            EventRecord {
                class: EventClass::ProcessingEvent,
                code: "04".to_owned(),
                starting_at: t1,
                ending_at: None,
            },
        ];
        let event = p.last_event(EventClass::Decision, "04").unwrap();
        assert_eq!(event.starting_at, t2);
        assert!(p.last_event(EventClass::InteractionEvent, "04").is_none());
    }
}
