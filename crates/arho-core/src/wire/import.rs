//! Transactional import of a wire document.
//!
//! The whole graph lands in one transaction, reusing the wire keys as row
//! ids so that a re-import of the same document finds the existing plan.
//! With overwrite the old plan is deleted first and the cascades take its
//! graph with it; either the new graph is fully inserted or nothing
//! changes.

use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use uuid::Uuid;

use arho_db::models::CodeList;
use arho_db::queries::dates::{self, DateOwner};
use arho_db::queries::documents::{self, NewDocument};
use arho_db::queries::groups::{self, NewGroup};
use arho_db::queries::objects::{self, NewPlanObject};
use arho_db::queries::plans::{self, NewPlan};
use arho_db::queries::regulations::{self, NewProposition, NewRegulation};

use crate::codes::{CodeError, CodeRegistry};
use crate::graph::{GroupNode, ObjectNode, PlanGraph};

use super::deserialize::{DeserializeError, ImportMetadata, plan_from_wire};
use super::schema::WirePlan;

/// Errors from importing a wire document.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("plan {0} already exists; re-run with overwrite to replace it")]
    PlanExists(Uuid),
    #[error(transparent)]
    Deserialize(#[from] DeserializeError),
    #[error(transparent)]
    Code(#[from] CodeError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Import a wire plan document into the local register.
///
/// Returns the inserted graph. Without `overwrite` an already-present plan
/// key aborts with [`ImportError::PlanExists`] and the database is left
/// untouched.
pub async fn import_plan(
    pool: &PgPool,
    registry: &CodeRegistry,
    wire: &WirePlan,
    metadata: &ImportMetadata,
    overwrite: bool,
) -> Result<PlanGraph, ImportError> {
    let graph = plan_from_wire(registry, wire, metadata)?;

    let mut tx = pool.begin().await.map_err(anyhow::Error::from)?;

    if plans::get_plan(&mut *tx, wire.plan_key).await?.is_some() {
        if !overwrite {
            return Err(ImportError::PlanExists(wire.plan_key));
        }
        plans::delete_plan(&mut *tx, wire.plan_key).await?;
    }

    insert_graph(&mut tx, registry, &graph).await?;

    tx.commit().await.map_err(anyhow::Error::from)?;
    tracing::info!(
        plan = %graph.plan.id,
        objects = graph.objects.len(),
        groups = graph.groups.len(),
        documents = graph.documents.len(),
        overwrite,
        "imported plan"
    );
    Ok(graph)
}

async fn insert_graph(
    conn: &mut PgConnection,
    registry: &CodeRegistry,
    graph: &PlanGraph,
) -> Result<(), ImportError> {
    let plan = &graph.plan;
    let status_id = registry.id_of(CodeList::LifecycleStatus, &plan.lifecycle_status)?;

    plans::insert_plan(
        &mut *conn,
        &NewPlan {
            id: Some(plan.id),
            organisation_id: plan.organisation_id,
            plan_type_id: registry.id_of(CodeList::PlanType, &plan.plan_type)?,
            lifecycle_status_id: status_id,
            permanent_plan_identifier: plan.permanent_plan_identifier.clone(),
            producers_plan_identifier: plan.producers_plan_identifier.clone(),
            matter_management_identifier: plan.matter_management_identifier.clone(),
            record_number: plan.record_number.clone(),
            name: plan.name.clone(),
            description: plan.description.clone(),
            scale: plan.scale,
            geom: plan.geom.clone(),
            srid: plan.srid,
        },
    )
    .await?;

    for period in &plan.lifecycle {
        dates::insert_lifecycle_date(
            &mut *conn,
            registry.id_of(CodeList::LifecycleStatus, &period.status)?,
            DateOwner::Plan(plan.id),
            period.starting_at,
            period.ending_at,
        )
        .await?;
    }

    for effect in &plan.legal_effects {
        let effect_id = registry.id_of(CodeList::LegalEffectsOfMasterPlan, effect)?;
        plans::insert_legal_effect(&mut *conn, plan.id, effect_id).await?;
    }

    for group in &graph.groups {
        insert_group(conn, registry, plan.id, group).await?;
    }
    for object in &graph.objects {
        insert_object(conn, registry, plan.id, object).await?;
    }
    for document in &graph.documents {
        insert_document(conn, registry, plan.id, document).await?;
    }

    Ok(())
}

async fn insert_group(
    conn: &mut PgConnection,
    registry: &CodeRegistry,
    plan_id: Uuid,
    group: &GroupNode,
) -> Result<(), ImportError> {
    groups::insert_group(
        &mut *conn,
        &NewGroup {
            id: Some(group.id),
            plan_id,
            kind: group.kind,
            short_name: group.short_name.clone(),
            name: group.name.clone(),
            ordering: group.ordering,
        },
    )
    .await?;
    if group.attached_to_plan {
        groups::attach_group_to_plan(&mut *conn, group.id, plan_id).await?;
    }

    for regulation in &group.regulations {
        let status_id = registry.id_of(CodeList::LifecycleStatus, &regulation.lifecycle_status)?;
        regulations::insert_regulation(
            &mut *conn,
            &NewRegulation {
                id: Some(regulation.id),
                group_id: group.id,
                type_of_plan_regulation_id: registry
                    .id_of(CodeList::TypeOfPlanRegulation, &regulation.regulation_type)?,
                lifecycle_status_id: status_id,
                value: regulation.value.clone(),
                subject_identifiers: if regulation.subject_identifiers.is_empty() {
                    None
                } else {
                    Some(regulation.subject_identifiers.clone())
                },
                ordering: regulation.ordering,
            },
        )
        .await?;
        for info in &regulation.additional_information {
            let type_id =
                registry.id_of(CodeList::TypeOfAdditionalInformation, &info.info_type)?;
            regulations::insert_additional_information(
                &mut *conn,
                regulation.id,
                type_id,
                info.value.as_ref(),
            )
            .await?;
        }
        for theme in &regulation.themes {
            let theme_id = registry.id_of(CodeList::PlanTheme, theme)?;
            regulations::insert_regulation_theme(&mut *conn, regulation.id, theme_id).await?;
        }
        for verbal in &regulation.verbal_types {
            let verbal_id = registry.id_of(CodeList::TypeOfVerbalPlanRegulation, verbal)?;
            regulations::insert_regulation_verbal_type(&mut *conn, regulation.id, verbal_id)
                .await?;
        }
        for period in &regulation.lifecycle {
            dates::insert_lifecycle_date(
                &mut *conn,
                registry.id_of(CodeList::LifecycleStatus, &period.status)?,
                DateOwner::PlanRegulation(regulation.id),
                period.starting_at,
                period.ending_at,
            )
            .await?;
        }
    }

    for proposition in &group.propositions {
        let status_id =
            registry.id_of(CodeList::LifecycleStatus, &proposition.lifecycle_status)?;
        regulations::insert_proposition(
            &mut *conn,
            &NewProposition {
                id: Some(proposition.id),
                group_id: group.id,
                lifecycle_status_id: status_id,
                text_value: proposition.text_value.clone(),
                ordering: proposition.ordering,
            },
        )
        .await?;
        for theme in &proposition.themes {
            let theme_id = registry.id_of(CodeList::PlanTheme, theme)?;
            regulations::insert_proposition_theme(&mut *conn, proposition.id, theme_id).await?;
        }
        for period in &proposition.lifecycle {
            dates::insert_lifecycle_date(
                &mut *conn,
                registry.id_of(CodeList::LifecycleStatus, &period.status)?,
                DateOwner::PlanProposition(proposition.id),
                period.starting_at,
                period.ending_at,
            )
            .await?;
        }
    }

    Ok(())
}

async fn insert_object(
    conn: &mut PgConnection,
    registry: &CodeRegistry,
    plan_id: Uuid,
    object: &ObjectNode,
) -> Result<(), ImportError> {
    let underground_id = match &object.underground {
        Some(value) => Some(registry.id_of(CodeList::TypeOfUnderground, value)?),
        None => None,
    };
    objects::insert_object(
        &mut *conn,
        &NewPlanObject {
            id: Some(object.id),
            plan_id: Some(plan_id),
            kind: object.kind,
            lifecycle_status_id: registry
                .id_of(CodeList::LifecycleStatus, &object.lifecycle_status)?,
            type_of_underground_id: underground_id,
            name: object.name.clone(),
            description: object.description.clone(),
            source_data_object: object.source_data_object.clone(),
            height_min: object.height_min,
            height_max: object.height_max,
            height_unit: object.height_unit.clone(),
            height_reference_point: object.height_reference_point.clone(),
            ordering: object.ordering,
            geom: object.geom.clone(),
            srid: object.srid,
        },
    )
    .await?;
    for group_id in &object.group_ids {
        groups::attach_group_to_object(&mut *conn, *group_id, object.id).await?;
    }
    for period in &object.lifecycle {
        dates::insert_lifecycle_date(
            &mut *conn,
            registry.id_of(CodeList::LifecycleStatus, &period.status)?,
            DateOwner::PlanObject(object.id),
            period.starting_at,
            period.ending_at,
        )
        .await?;
    }
    Ok(())
}

async fn insert_document(
    conn: &mut PgConnection,
    registry: &CodeRegistry,
    plan_id: Uuid,
    document: &crate::graph::DocumentNode,
) -> Result<(), ImportError> {
    let code_id = |list, value: &Option<String>| -> Result<Option<Uuid>, CodeError> {
        match value {
            Some(value) => Ok(Some(registry.id_of(list, value)?)),
            None => Ok(None),
        }
    };
    documents::insert_document(
        &mut *conn,
        &NewDocument {
            id: Some(document.id),
            plan_id,
            type_of_document_id: registry
                .id_of(CodeList::TypeOfDocument, &document.document_type)?,
            category_of_publicity_id: code_id(
                CodeList::CategoryOfPublicity,
                &document.category_of_publicity,
            )?,
            personal_data_content_id: code_id(
                CodeList::PersonalDataContent,
                &document.personal_data_content,
            )?,
            retention_time_id: code_id(CodeList::RetentionTime, &document.retention_time)?,
            language_id: code_id(CodeList::Language, &document.language)?,
            permanent_document_identifier: document.permanent_document_identifier.clone(),
            name: document.name.clone(),
            url: document.url.clone(),
            accessibility: document.accessibility,
            document_date: document.document_date,
            arrival_date: document.arrival_date,
            confirmation_date: None,
            decision_date: None,
        },
    )
    .await?;
    Ok(())
}
