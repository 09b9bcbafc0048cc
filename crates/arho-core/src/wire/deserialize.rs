//! Wire document to plan graph.
//!
//! The wire document carries no object or group kinds, no organisation,
//! and no plan name, so the caller supplies the missing pieces as
//! [`ImportMetadata`] and the kinds are re-derived from geometry classes
//! and attached regulations. Lifecycle history does not travel on the
//! wire either; every imported node starts a fresh period in the status
//! the document states.

use chrono::{NaiveDate, Utc};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use uuid::Uuid;

use arho_db::models::{CodeList, GroupKind, ObjectKind};
use arho_db::value::AttributeValue;
use geo_types::Geometry;

use crate::classify;
use crate::codes::{self, CodeError, CodeRegistry};
use crate::geometry::{self, GeometryError};
use crate::graph::{
    AdditionalInfoNode, DocumentNode, GroupNode, ObjectNode, PlanGraph, PlanNode, PropositionNode,
    RegulationNode, StatusPeriod,
};

use super::schema::*;

/// Facts the wire document does not carry.
#[derive(Debug, Clone)]
pub struct ImportMetadata {
    /// Language-keyed plan name.
    pub name: JsonValue,
    /// Responsible organisation in the local register.
    pub organisation_id: Uuid,
    /// Plan type code value.
    pub plan_type: String,
    pub permanent_plan_identifier: Option<String>,
    pub producers_plan_identifier: Option<String>,
}

/// Errors from reading a wire document.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error(transparent)]
    Code(#[from] CodeError),
    #[error("URI {uri:?} belongs to list {found}, expected {expected}")]
    WrongCodeList {
        uri: String,
        expected: CodeList,
        found: CodeList,
    },
    #[error("invalid SRID {0:?}")]
    InvalidSrid(String),
    #[error("invalid regulation value: {0}")]
    InvalidValue(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Resolve a code URI, checking it belongs to the expected list.
fn code_value(uri: &str, expected: CodeList) -> Result<String, DeserializeError> {
    let (found, value) = codes::parse_uri(uri)?;
    if found != expected {
        return Err(DeserializeError::WrongCodeList {
            uri: uri.to_owned(),
            expected,
            found,
        });
    }
    Ok(value)
}

fn parse_srid(srid: &str) -> Result<i32, DeserializeError> {
    srid.parse()
        .map_err(|_| DeserializeError::InvalidSrid(srid.to_owned()))
}

/// A fresh lifecycle period in the given status, starting now.
fn fresh_period(status: &str) -> Vec<StatusPeriod> {
    vec![StatusPeriod {
        status: status.to_owned(),
        starting_at: Utc::now(),
        ending_at: None,
        events: Vec::new(),
    }]
}

/// Parse a stored multi geometry out of a wire geometry. The same rules
/// as local creation apply: the SRID must be the project SRID and the
/// geometry must pass validity before anything is stored.
fn stored_geometry(wire: &WireGeometry) -> Result<(JsonValue, i32, Geometry<f64>), DeserializeError> {
    let srid = parse_srid(&wire.srid)?;
    geometry::check_srid(srid)?;
    let geometry = geometry::to_multi(geometry::parse(&wire.geometry)?)?;
    geometry::validate(&geometry)?;
    Ok((geometry::to_json(&geometry)?, srid, geometry))
}

/// Build a plan graph from a wire document.
pub fn plan_from_wire(
    registry: &CodeRegistry,
    wire: &WirePlan,
    metadata: &ImportMetadata,
) -> Result<PlanGraph, DeserializeError> {
    let status = code_value(&wire.life_cycle_status, CodeList::LifecycleStatus)?;

    let mut legal_effects = Vec::new();
    if let Some(uris) = &wire.legal_effect_of_local_master_plans {
        for uri in uris {
            legal_effects.push(code_value(uri, CodeList::LegalEffectsOfMasterPlan)?);
        }
    }

    let (plan_geom, plan_srid, _) = stored_geometry(&wire.geographical_area)?;

    let plan = PlanNode {
        id: wire.plan_key,
        organisation_id: metadata.organisation_id,
        plan_type: metadata.plan_type.clone(),
        lifecycle_status: status.clone(),
        permanent_plan_identifier: metadata.permanent_plan_identifier.clone(),
        producers_plan_identifier: metadata.producers_plan_identifier.clone(),
        matter_management_identifier: None,
        record_number: None,
        name: metadata.name.clone(),
        description: wire
            .plan_description
            .as_ref()
            .map(|text| json!({ "fin": text })),
        scale: wire.scale,
        geom: plan_geom,
        srid: plan_srid,
        legal_effects,
        municipality: None,
        administrative_region: None,
        lifecycle: fresh_period(&status),
    };

    // Groups come in two wire slots; kinds of the non-general ones are
    // re-derived once object attachments are known.
    let mut groups = Vec::new();
    for wire_group in &wire.general_regulation_groups {
        groups.push(general_group_from_wire(wire_group)?);
    }
    for wire_group in &wire.plan_regulation_groups {
        groups.push(group_from_wire(wire_group)?);
    }

    let plan_type_root = {
        let plan_type_id = registry.id_of(CodeList::PlanType, &metadata.plan_type)?;
        registry.root_value(plan_type_id)?.to_owned()
    };

    let mut objects = Vec::new();
    for wire_object in &wire.plan_objects {
        let group_ids: Vec<Uuid> = wire
            .plan_regulation_group_relations
            .iter()
            .filter(|r| r.plan_object_key == wire_object.plan_object_key)
            .map(|r| r.plan_regulation_group_key)
            .collect();
        objects.push(object_from_wire(
            wire_object,
            &group_ids,
            &groups,
            &plan_type_root,
        )?);
    }

    for group in &mut groups {
        if group.kind == GroupKind::GeneralRegulations {
            continue;
        }
        let attached = objects
            .iter()
            .filter(|o| o.group_ids.contains(&group.id))
            .map(|o| o.kind);
        group.kind = classify::classify_group(attached);
    }

    let mut documents = Vec::new();
    for map in &wire.plan_maps {
        documents.push(plan_map_from_wire(map));
    }
    for annex in &wire.plan_annexes {
        documents.push(attachment_from_wire(annex)?);
    }
    if let Some(report) = &wire.plan_report {
        for attachment in &report.attachment_documents {
            documents.push(attachment_from_wire(attachment)?);
        }
    }
    for material in &wire.other_plan_materials {
        documents.push(other_material_from_wire(material)?);
    }

    Ok(PlanGraph {
        plan,
        objects,
        groups,
        documents,
    })
}

// ---------------------------------------------------------------------------
// Groups and regulations
// ---------------------------------------------------------------------------

fn regulation_from_wire(wire: &WireRegulation) -> Result<RegulationNode, DeserializeError> {
    let status = code_value(&wire.life_cycle_status, CodeList::LifecycleStatus)?;
    let mut themes = Vec::new();
    for uri in wire.plan_themes.iter().flatten() {
        themes.push(code_value(uri, CodeList::PlanTheme)?);
    }
    let mut verbal_types = Vec::new();
    for uri in wire.verbal_regulations.iter().flatten() {
        verbal_types.push(code_value(uri, CodeList::TypeOfVerbalPlanRegulation)?);
    }
    let mut additional_information = Vec::new();
    for info in &wire.additional_informations {
        additional_information.push(AdditionalInfoNode {
            info_type: code_value(&info.type_uri, CodeList::TypeOfAdditionalInformation)?,
            value: info
                .value
                .clone()
                .map(attribute_value_from_wire)
                .transpose()?,
        });
    }
    Ok(RegulationNode {
        id: wire.plan_regulation_key,
        regulation_type: code_value(&wire.type_uri, CodeList::TypeOfPlanRegulation)?,
        lifecycle_status: status.clone(),
        value: wire
            .value
            .clone()
            .map(attribute_value_from_wire)
            .transpose()?,
        subject_identifiers: wire.subject_identifiers.clone().unwrap_or_default(),
        ordering: wire
            .regulation_number
            .as_ref()
            .and_then(|n| n.parse().ok()),
        themes,
        verbal_types,
        additional_information,
        lifecycle: fresh_period(&status),
    })
}

/// The wire coerces integer kinds to JSON integers; serde's `f64` fields
/// accept those, so the tagged form reads straight back.
fn attribute_value_from_wire(value: JsonValue) -> Result<AttributeValue, DeserializeError> {
    serde_json::from_value(value).map_err(|e| DeserializeError::InvalidValue(e.to_string()))
}

fn proposition_from_wire(wire: &WireRecommendation) -> Result<PropositionNode, DeserializeError> {
    let status = code_value(&wire.life_cycle_status, CodeList::LifecycleStatus)?;
    let mut themes = Vec::new();
    for uri in wire.plan_themes.iter().flatten() {
        themes.push(code_value(uri, CodeList::PlanTheme)?);
    }
    Ok(PropositionNode {
        id: wire.plan_recommendation_key,
        lifecycle_status: status.clone(),
        text_value: wire.value.clone(),
        ordering: wire.recommendation_number,
        themes,
        lifecycle: fresh_period(&status),
    })
}

fn group_from_wire(wire: &WireGroup) -> Result<GroupNode, DeserializeError> {
    let mut regulations = Vec::new();
    for regulation in &wire.plan_regulations {
        regulations.push(regulation_from_wire(regulation)?);
    }
    let mut propositions = Vec::new();
    for recommendation in &wire.plan_recommendations {
        propositions.push(proposition_from_wire(recommendation)?);
    }
    Ok(GroupNode {
        id: wire.plan_regulation_group_key,
        // Placeholder until object attachments are resolved.
        kind: GroupKind::OtherPointRegulations,
        short_name: wire.letter_identifier.clone(),
        name: wire.title_of_plan_regulation.clone(),
        ordering: wire.group_number,
        attached_to_plan: false,
        regulations,
        propositions,
    })
}

fn general_group_from_wire(wire: &WireGeneralGroup) -> Result<GroupNode, DeserializeError> {
    let mut regulations = Vec::new();
    for regulation in &wire.plan_regulations {
        regulations.push(regulation_from_wire(regulation)?);
    }
    let mut propositions = Vec::new();
    for recommendation in &wire.plan_recommendations {
        propositions.push(proposition_from_wire(recommendation)?);
    }
    Ok(GroupNode {
        id: wire.general_regulation_group_key,
        kind: GroupKind::GeneralRegulations,
        short_name: None,
        name: wire.title_of_plan_regulation.clone(),
        ordering: wire.group_number,
        attached_to_plan: true,
        regulations,
        propositions,
    })
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

fn object_from_wire(
    wire: &WirePlanObject,
    group_ids: &[Uuid],
    groups: &[GroupNode],
    plan_type_root: &str,
) -> Result<ObjectNode, DeserializeError> {
    let status = code_value(&wire.life_cycle_status, CodeList::LifecycleStatus)?;
    let underground = wire
        .underground_status
        .as_ref()
        .map(|uri| code_value(uri, CodeList::TypeOfUnderground))
        .transpose()?;

    let (geom, srid, geometry) = stored_geometry(&wire.geometry)?;

    let attached_regulations = || {
        groups
            .iter()
            .filter(|g| group_ids.contains(&g.id))
            .flat_map(|g| &g.regulations)
    };
    let kind = match geometry {
        Geometry::MultiPolygon(_) => classify::classify_area(
            attached_regulations()
                .flat_map(|r| &r.additional_information)
                .map(|i| i.info_type.as_str()),
        ),
        Geometry::MultiLineString(_) => ObjectKind::Line,
        Geometry::MultiPoint(_) => classify::classify_point(
            plan_type_root,
            attached_regulations().map(|r| r.regulation_type.as_str()),
        ),
        other => {
            return Err(GeometryError::Unsupported(format!("{other:?}")).into());
        }
    };

    let (height_min, height_max, height_unit) = match &wire.vertical_limit {
        Some(limit) => (
            limit.get("minimumValue").and_then(JsonValue::as_f64),
            limit.get("maximumValue").and_then(JsonValue::as_f64),
            limit
                .get("unitOfMeasure")
                .and_then(JsonValue::as_str)
                .map(ToOwned::to_owned),
        ),
        None => (None, None, None),
    };

    Ok(ObjectNode {
        id: wire.plan_object_key,
        kind,
        lifecycle_status: status.clone(),
        underground,
        name: wire.name.clone(),
        description: wire.description.clone(),
        source_data_object: None,
        height_min,
        height_max,
        height_unit,
        height_reference_point: None,
        ordering: wire.object_number,
        geom,
        srid,
        group_ids: group_ids.to_vec(),
        lifecycle: fresh_period(&status),
    })
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

fn midnight(date: NaiveDate) -> chrono::DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn plan_map_from_wire(wire: &WirePlanMap) -> DocumentNode {
    DocumentNode {
        id: wire.plan_map_key,
        document_type: "03".to_owned(),
        category_of_publicity: None,
        personal_data_content: None,
        retention_time: None,
        language: None,
        permanent_document_identifier: None,
        name: wire.name.clone(),
        url: None,
        accessibility: false,
        document_date: None,
        arrival_date: None,
        exported_file_key: wire.file_key.as_ref().and_then(|k| k.parse().ok()),
        exported_file_etag: None,
        exported_at: None,
    }
}

fn attachment_from_wire(wire: &WireAttachmentDocument) -> Result<DocumentNode, DeserializeError> {
    let language = wire
        .languages
        .first()
        .map(|uri| code_value(uri, CodeList::Language))
        .transpose()?;
    Ok(DocumentNode {
        id: wire.attachment_document_key,
        document_type: code_value(&wire.type_of_attachment, CodeList::TypeOfDocument)?,
        category_of_publicity: Some(code_value(
            &wire.category_of_publicity,
            CodeList::CategoryOfPublicity,
        )?),
        personal_data_content: Some(code_value(
            &wire.personal_data_content,
            CodeList::PersonalDataContent,
        )?),
        retention_time: Some(code_value(&wire.retention_time, CodeList::RetentionTime)?),
        language,
        permanent_document_identifier: wire.document_identifier.clone(),
        name: wire.name.clone(),
        url: None,
        accessibility: wire.accessibility,
        document_date: wire.document_date.map(midnight),
        arrival_date: wire.arrived_date.map(midnight),
        exported_file_key: wire.file_key.as_ref().and_then(|k| k.parse().ok()),
        exported_file_etag: None,
        exported_at: None,
    })
}

fn other_material_from_wire(
    wire: &WireOtherPlanMaterial,
) -> Result<DocumentNode, DeserializeError> {
    Ok(DocumentNode {
        id: wire.other_plan_material_key,
        document_type: "99".to_owned(),
        category_of_publicity: Some(code_value(
            &wire.category_of_publicity,
            CodeList::CategoryOfPublicity,
        )?),
        personal_data_content: Some(code_value(
            &wire.personal_data_content,
            CodeList::PersonalDataContent,
        )?),
        retention_time: None,
        language: None,
        permanent_document_identifier: None,
        name: wire.name.clone(),
        url: None,
        accessibility: false,
        document_date: None,
        arrival_date: None,
        exported_file_key: wire.file_key.as_ref().and_then(|k| k.parse().ok()),
        exported_file_etag: None,
        exported_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arho_db::models::Code;
    use serde_json::json;

    fn registry() -> CodeRegistry {
        let code = |list, value: &str, parent_id| Code {
            id: Uuid::new_v4(),
            code_list: list,
            value: value.to_owned(),
            short_name: None,
            name: json!({}),
            description: None,
            status: None,
            level: 1,
            parent_id,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        };
        let root = code(CodeList::PlanType, "1", None);
        let root_id = root.id;
        let leaf = code(CodeList::PlanType, "11", Some(root_id));
        CodeRegistry::from_codes(vec![root, leaf])
    }

    fn metadata() -> ImportMetadata {
        ImportMetadata {
            name: json!({"fin": "Tuotu kaava"}),
            organisation_id: Uuid::new_v4(),
            plan_type: "11".to_owned(),
            permanent_plan_identifier: None,
            producers_plan_identifier: Some("ext-7".to_owned()),
        }
    }

    fn wire_plan() -> WirePlan {
        WirePlan {
            plan_key: Uuid::new_v4(),
            life_cycle_status: "http://uri.suomi.fi/codelist/rytj/kaavaelinkaari/code/03"
                .to_owned(),
            legal_effect_of_local_master_plans: None,
            scale: Some(10_000),
            geographical_area: WireGeometry {
                srid: "3067".to_owned(),
                geometry: json!({
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0], [0.0, 0.0]]]
                }),
            },
            plan_description: Some("kuvaus".to_owned()),
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
        }
    }

    #[test]
    fn plan_geometry_is_stored_in_multi_form() {
        let graph = plan_from_wire(&registry(), &wire_plan(), &metadata()).unwrap();
        assert_eq!(graph.plan.geom["type"], "MultiPolygon");
        assert_eq!(graph.plan.srid, 3067);
        assert_eq!(graph.plan.lifecycle_status, "03");
        assert_eq!(graph.plan.description, Some(json!({"fin": "kuvaus"})));
        assert_eq!(graph.plan.lifecycle.len(), 1);
        assert_eq!(graph.plan.lifecycle[0].status, "03");
    }

    #[test]
    fn self_intersecting_geometry_is_rejected() {
        let mut wire = wire_plan();
        wire.geographical_area.geometry = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [100.0, 100.0], [100.0, 0.0], [0.0, 100.0], [0.0, 0.0]]]
        });
        let error = plan_from_wire(&registry(), &wire, &metadata()).unwrap_err();
        assert!(matches!(
            error,
            DeserializeError::Geometry(GeometryError::InvalidArea)
        ));
    }

    #[test]
    fn foreign_srid_is_rejected() {
        let mut wire = wire_plan();
        wire.geographical_area.srid = "4326".to_owned();
        let error = plan_from_wire(&registry(), &wire, &metadata()).unwrap_err();
        assert!(matches!(
            error,
            DeserializeError::Geometry(GeometryError::SridMismatch(4326))
        ));
    }

    #[test]
    fn foreign_uri_is_rejected() {
        let mut wire = wire_plan();
        wire.life_cycle_status =
            "http://uri.suomi.fi/codelist/rytj/RY_Kaavalaji/code/11".to_owned();
        let error = plan_from_wire(&registry(), &wire, &metadata()).unwrap_err();
        assert!(matches!(error, DeserializeError::WrongCodeList { .. }));
    }

    #[test]
    fn group_kind_re_derived_from_attachments() {
        let mut wire = wire_plan();
        let group_key = Uuid::new_v4();
        let object_key = Uuid::new_v4();
        wire.plan_regulation_groups.push(WireGroup {
            plan_regulation_group_key: group_key,
            title_of_plan_regulation: json!({"fin": "Viivat"}),
            group_number: Some(1),
            letter_identifier: None,
            color_number: Some("#FFFFFF".to_owned()),
            plan_recommendations: Vec::new(),
            plan_regulations: Vec::new(),
        });
        wire.plan_objects.push(WirePlanObject {
            plan_object_key: object_key,
            life_cycle_status: wire.life_cycle_status.clone(),
            underground_status: None,
            geometry: WireGeometry {
                srid: "3067".to_owned(),
                geometry: json!({
                    "type": "LineString",
                    "coordinates": [[0.0, 0.0], [50.0, 10.0]]
                }),
            },
            name: json!({"fin": "viiva"}),
            description: None,
            object_number: Some(1),
            period_of_validity: None,
            vertical_limit: None,
            related_plan_object_keys: None,
        });
        wire.plan_regulation_group_relations.push(WireGroupRelation {
            plan_object_key: object_key,
            plan_regulation_group_key: group_key,
        });

        let graph = plan_from_wire(&registry(), &wire, &metadata()).unwrap();
        assert_eq!(graph.objects[0].kind, ObjectKind::Line);
        assert_eq!(graph.objects[0].geom["type"], "MultiLineString");
        assert_eq!(graph.groups[0].kind, GroupKind::LineRegulations);
        assert_eq!(graph.objects[0].group_ids, vec![group_key]);
    }

    #[test]
    fn vertical_limit_unpacks_into_heights() {
        let mut wire = wire_plan();
        wire.plan_objects.push(WirePlanObject {
            plan_object_key: Uuid::new_v4(),
            life_cycle_status: wire.life_cycle_status.clone(),
            underground_status: None,
            geometry: WireGeometry {
                srid: "3067".to_owned(),
                geometry: json!({
                    "type": "MultiPolygon",
                    "coordinates": [[[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]]]]
                }),
            },
            name: json!({}),
            description: None,
            object_number: None,
            period_of_validity: None,
            vertical_limit: Some(json!({
                "dataType": "decimalRange",
                "minimumValue": 2.5,
                "maximumValue": 12.0,
                "unitOfMeasure": "m"
            })),
            related_plan_object_keys: None,
        });
        let graph = plan_from_wire(&registry(), &wire, &metadata()).unwrap();
        let object = &graph.objects[0];
        assert_eq!(object.height_min, Some(2.5));
        assert_eq!(object.height_max, Some(12.0));
        assert_eq!(object.height_unit.as_deref(), Some("m"));
        assert_eq!(object.kind, ObjectKind::OtherArea);
    }

    #[test]
    fn integer_coerced_value_reads_back() {
        let value = attribute_value_from_wire(json!({
            "dataType": "PositiveNumeric",
            "number": 12,
            "unitOfMeasure": "k-m2"
        }))
        .unwrap();
        match value {
            AttributeValue::PositiveNumeric { number, .. } => {
                assert_eq!(number, 12.0);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }
}
