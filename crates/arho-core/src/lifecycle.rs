//! Lifecycle state machine and consistency layer.
//!
//! A plan's lifecycle status is the sole source of truth for every record
//! it owns. All routines here take `&mut PgConnection` and run inside a
//! transaction opened by the caller, so a status change and its
//! propagation either land together or not at all. Dependent records never
//! change status on their own: the creation paths copy the owning plan's
//! current status and the only status-moving entry point is
//! [`transition_plan_status`].

use chrono::{DateTime, Utc};
use geo_types::Geometry;
use serde_json::Value as JsonValue;
use sqlx::PgConnection;
use thiserror::Error;
use uuid::Uuid;

use arho_db::models::{
    CodeList, EventClass, EventDate, ObjectKind, Plan, PlanObject, PlanProposition, PlanRegulation,
};
use arho_db::queries::dates::{self, DateOwner};
use arho_db::queries::objects::{self, NewPlanObject};
use arho_db::queries::plans::{self, NewPlan};
use arho_db::queries::regulations::{self, NewProposition, NewRegulation};
use arho_db::queries::groups;

use crate::codes::{self, CodeRegistry};
use crate::geometry::{self, GeometryError};

/// Errors from lifecycle operations. Any of these aborts the enclosing
/// transaction.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("plan {0} not found")]
    PlanNotFound(Uuid),
    #[error("regulation group {0} not found")]
    GroupNotFound(Uuid),
    #[error("lifecycle date {0} not found")]
    DateNotFound(Uuid),
    #[error("unknown lifecycle status {0:?}")]
    UnknownStatus(String),
    #[error("plan {0} status changed concurrently")]
    ConcurrentStatusChange(Uuid),
    #[error("{class} event {code:?} is not allowed in status {status:?}")]
    IllegalEvent {
        class: EventClass,
        code: String,
        status: String,
    },
    #[error("event interval ends before it starts")]
    InvertedInterval,
    #[error("event interval falls outside its status period")]
    EventOutsidePeriod,
    #[error("{kind} object carries the wrong geometry class")]
    GeometryClassMismatch { kind: ObjectKind },
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Code(#[from] codes::CodeError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Insert a plan and open its first lifecycle date.
///
/// The geometry is coerced to MultiPolygon and validated before any row
/// is written.
pub async fn create_plan(
    conn: &mut PgConnection,
    mut new_plan: NewPlan,
) -> Result<Plan, LifecycleError> {
    geometry::check_srid(new_plan.srid)?;
    let geom = geometry::to_multi(geometry::parse(&new_plan.geom)?)?;
    if !matches!(geom, Geometry::MultiPolygon(_)) {
        return Err(GeometryError::Unsupported("non-area plan geometry".to_owned()).into());
    }
    geometry::validate(&geom)?;
    new_plan.geom = geometry::to_json(&geom)?;

    let plan = plans::insert_plan(&mut *conn, &new_plan).await?;
    dates::insert_lifecycle_date(
        &mut *conn,
        plan.lifecycle_status_id,
        DateOwner::Plan(plan.id),
        Utc::now(),
        None,
    )
    .await?;

    tracing::info!(plan_id = %plan.id, "created plan");
    Ok(plan)
}

/// Move a plan to a new lifecycle status and propagate the change to every
/// owned record that still carries the old status.
///
/// Closes the open lifecycle date of the old status and opens one for the
/// new status, for the plan and for each propagated record, all inside the
/// caller's transaction. A no-op when the plan already has the status.
pub async fn transition_plan_status(
    conn: &mut PgConnection,
    registry: &CodeRegistry,
    plan_id: Uuid,
    new_status_value: &str,
) -> Result<(), LifecycleError> {
    let new_status_id = registry
        .id_of(CodeList::LifecycleStatus, new_status_value)
        .map_err(|_| LifecycleError::UnknownStatus(new_status_value.to_owned()))?;

    let plan = plans::get_plan(&mut *conn, plan_id)
        .await?
        .ok_or(LifecycleError::PlanNotFound(plan_id))?;
    let old_status_id = plan.lifecycle_status_id;
    if old_status_id == new_status_id {
        return Ok(());
    }

    let now = Utc::now();
    let changed = plans::update_plan_status(&mut *conn, plan_id, old_status_id, new_status_id)
        .await?;
    if changed == 0 {
        return Err(LifecycleError::ConcurrentStatusChange(plan_id));
    }
    dates::close_open_date(&mut *conn, DateOwner::Plan(plan_id), old_status_id, now).await?;
    dates::insert_lifecycle_date(&mut *conn, new_status_id, DateOwner::Plan(plan_id), now, None)
        .await?;

    let object_ids =
        objects::propagate_object_status(&mut *conn, plan_id, old_status_id, new_status_id).await?;
    if !object_ids.is_empty() {
        dates::close_open_dates_for_objects(&mut *conn, &object_ids, old_status_id, now).await?;
        dates::open_dates_for_objects(&mut *conn, &object_ids, new_status_id, now).await?;
    }

    let regulation_ids =
        regulations::propagate_regulation_status(&mut *conn, plan_id, old_status_id, new_status_id)
            .await?;
    if !regulation_ids.is_empty() {
        dates::close_open_dates_for_regulations(&mut *conn, &regulation_ids, old_status_id, now)
            .await?;
        dates::open_dates_for_regulations(&mut *conn, &regulation_ids, new_status_id, now).await?;
    }

    let proposition_ids = regulations::propagate_proposition_status(
        &mut *conn,
        plan_id,
        old_status_id,
        new_status_id,
    )
    .await?;
    if !proposition_ids.is_empty() {
        dates::close_open_dates_for_propositions(&mut *conn, &proposition_ids, old_status_id, now)
            .await?;
        dates::open_dates_for_propositions(&mut *conn, &proposition_ids, new_status_id, now)
            .await?;
    }

    tracing::info!(
        plan_id = %plan_id,
        status = new_status_value,
        objects = object_ids.len(),
        regulations = regulation_ids.len(),
        propositions = proposition_ids.len(),
        "plan status transition propagated"
    );
    Ok(())
}

/// Insert a plan object.
///
/// The geometry is coerced to its multi form and validated first; an
/// invalid or self-intersecting geometry aborts before any write. Without
/// a plan reference the object is auto-associated with the most recently
/// created plan whose geometry contains it; if none exists the reference
/// stays unresolved. When the object lands on a plan, its status is
/// copied from the plan (a caller-supplied status is ignored) and the
/// first lifecycle date opened.
pub async fn create_plan_object(
    conn: &mut PgConnection,
    mut new_object: NewPlanObject,
) -> Result<PlanObject, LifecycleError> {
    geometry::check_srid(new_object.srid)?;
    let geom = geometry::to_multi(geometry::parse(&new_object.geom)?)?;
    check_geometry_class(new_object.kind, &geom)?;
    geometry::validate(&geom)?;
    new_object.geom = geometry::to_json(&geom)?;

    if new_object.plan_id.is_none() {
        if let Some(plan) = find_containing_plan(conn, &geom).await? {
            new_object.plan_id = Some(plan.id);
            new_object.lifecycle_status_id = plan.lifecycle_status_id;
        }
    } else if let Some(plan_id) = new_object.plan_id {
        let plan = plans::get_plan(&mut *conn, plan_id)
            .await?
            .ok_or(LifecycleError::PlanNotFound(plan_id))?;
        new_object.lifecycle_status_id = plan.lifecycle_status_id;
    }

    let attached = new_object.plan_id.is_some();
    let object = objects::insert_object(&mut *conn, &new_object).await?;
    if attached {
        dates::insert_lifecycle_date(
            &mut *conn,
            object.lifecycle_status_id,
            DateOwner::PlanObject(object.id),
            Utc::now(),
            None,
        )
        .await?;
    } else {
        tracing::debug!(object_id = %object.id, "no containing plan, object left unattached");
    }

    Ok(object)
}

/// Insert a regulation, copying the owning plan's current status.
pub async fn create_regulation(
    conn: &mut PgConnection,
    mut new_regulation: NewRegulation,
) -> Result<PlanRegulation, LifecycleError> {
    let plan = plan_of_group(conn, new_regulation.group_id).await?;
    new_regulation.lifecycle_status_id = plan.lifecycle_status_id;

    let regulation = regulations::insert_regulation(&mut *conn, &new_regulation).await?;
    dates::insert_lifecycle_date(
        &mut *conn,
        regulation.lifecycle_status_id,
        DateOwner::PlanRegulation(regulation.id),
        Utc::now(),
        None,
    )
    .await?;
    Ok(regulation)
}

/// Insert a proposition, copying the owning plan's current status.
pub async fn create_proposition(
    conn: &mut PgConnection,
    mut new_proposition: NewProposition,
) -> Result<PlanProposition, LifecycleError> {
    let plan = plan_of_group(conn, new_proposition.group_id).await?;
    new_proposition.lifecycle_status_id = plan.lifecycle_status_id;

    let proposition = regulations::insert_proposition(&mut *conn, &new_proposition).await?;
    dates::insert_lifecycle_date(
        &mut *conn,
        proposition.lifecycle_status_id,
        DateOwner::PlanProposition(proposition.id),
        Utc::now(),
        None,
    )
    .await?;
    Ok(proposition)
}

/// Record a decision, processing event, or interaction event inside a
/// lifecycle date.
///
/// Rejected before any write when the event code is not legal for the
/// period's status, or when the event interval is not wholly inside the
/// period.
pub async fn record_event(
    conn: &mut PgConnection,
    registry: &CodeRegistry,
    lifecycle_date_id: Uuid,
    class: EventClass,
    code_value: &str,
    starting_at: DateTime<Utc>,
    ending_at: Option<DateTime<Utc>>,
) -> Result<EventDate, LifecycleError> {
    let date = dates::get_lifecycle_date(&mut *conn, lifecycle_date_id)
        .await?
        .ok_or(LifecycleError::DateNotFound(lifecycle_date_id))?;
    let status = registry.value_of(date.lifecycle_status_id)?;

    if !codes::allowed_events(class, status).contains(&code_value) {
        return Err(LifecycleError::IllegalEvent {
            class,
            code: code_value.to_owned(),
            status: status.to_owned(),
        });
    }

    if let Some(end) = ending_at {
        if end < starting_at {
            return Err(LifecycleError::InvertedInterval);
        }
    }
    if starting_at < date.starting_at {
        return Err(LifecycleError::EventOutsidePeriod);
    }
    if let Some(period_end) = date.ending_at {
        if starting_at > period_end {
            return Err(LifecycleError::EventOutsidePeriod);
        }
        if let Some(end) = ending_at {
            if end > period_end {
                return Err(LifecycleError::EventOutsidePeriod);
            }
        }
    }

    let event_code_id = registry.id_of(class.code_list(), code_value)?;
    let event = dates::insert_event_date(
        &mut *conn,
        lifecycle_date_id,
        class,
        event_code_id,
        starting_at,
        ending_at,
    )
    .await?;
    Ok(event)
}

/// Replace a plan's geometry after re-validating it.
pub async fn set_plan_geometry(
    conn: &mut PgConnection,
    plan_id: Uuid,
    geom_json: &JsonValue,
) -> Result<(), LifecycleError> {
    let geom = geometry::to_multi(geometry::parse(geom_json)?)?;
    if !matches!(geom, Geometry::MultiPolygon(_)) {
        return Err(GeometryError::Unsupported("non-area plan geometry".to_owned()).into());
    }
    geometry::validate(&geom)?;
    plans::update_plan_geometry(&mut *conn, plan_id, &geometry::to_json(&geom)?).await?;
    Ok(())
}

/// Replace a plan object's geometry after re-validating it.
pub async fn set_object_geometry(
    conn: &mut PgConnection,
    object_id: Uuid,
    kind: ObjectKind,
    geom_json: &JsonValue,
) -> Result<(), LifecycleError> {
    let geom = geometry::to_multi(geometry::parse(geom_json)?)?;
    check_geometry_class(kind, &geom)?;
    geometry::validate(&geom)?;
    objects::update_object_geometry(&mut *conn, object_id, &geometry::to_json(&geom)?).await?;
    Ok(())
}

fn check_geometry_class(kind: ObjectKind, geom: &Geometry<f64>) -> Result<(), LifecycleError> {
    let matches_kind = match geom {
        Geometry::MultiPolygon(_) => kind.is_area(),
        Geometry::MultiLineString(_) => kind == ObjectKind::Line,
        Geometry::MultiPoint(_) => kind.is_point(),
        _ => false,
    };
    if matches_kind {
        Ok(())
    } else {
        Err(LifecycleError::GeometryClassMismatch { kind })
    }
}

/// Newest plan whose geometry contains the given geometry.
async fn find_containing_plan(
    conn: &mut PgConnection,
    geom: &Geometry<f64>,
) -> Result<Option<Plan>, LifecycleError> {
    for plan in plans::list_plans(&mut *conn).await? {
        let plan_geom = match geometry::parse(&plan.geom) {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(plan_id = %plan.id, error = %e, "skipping plan with unreadable geometry");
                continue;
            }
        };
        if geometry::contains(&plan_geom, geom) {
            return Ok(Some(plan));
        }
    }
    Ok(None)
}

/// Resolve a group's owning plan.
async fn plan_of_group(conn: &mut PgConnection, group_id: Uuid) -> Result<Plan, LifecycleError> {
    let group = groups::get_group(&mut *conn, group_id)
        .await?
        .ok_or(LifecycleError::GroupNotFound(group_id))?;
    plans::get_plan(&mut *conn, group.plan_id)
        .await?
        .ok_or(LifecycleError::PlanNotFound(group.plan_id))
}
