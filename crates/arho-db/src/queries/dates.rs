//! Query functions for lifecycle status history and event dates.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{EventClass, EventDate, LifecycleDate};

/// Which record a lifecycle date row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOwner {
    Plan(Uuid),
    PlanObject(Uuid),
    PlanRegulation(Uuid),
    PlanProposition(Uuid),
}

impl DateOwner {
    fn columns(self) -> (Option<Uuid>, Option<Uuid>, Option<Uuid>, Option<Uuid>) {
        match self {
            Self::Plan(id) => (Some(id), None, None, None),
            Self::PlanObject(id) => (None, Some(id), None, None),
            Self::PlanRegulation(id) => (None, None, Some(id), None),
            Self::PlanProposition(id) => (None, None, None, Some(id)),
        }
    }

    fn column_name(self) -> &'static str {
        match self {
            Self::Plan(_) => "plan_id",
            Self::PlanObject(_) => "plan_object_id",
            Self::PlanRegulation(_) => "plan_regulation_id",
            Self::PlanProposition(_) => "plan_proposition_id",
        }
    }

    fn id(self) -> Uuid {
        match self {
            Self::Plan(id)
            | Self::PlanObject(id)
            | Self::PlanRegulation(id)
            | Self::PlanProposition(id) => id,
        }
    }
}

/// Open a new lifecycle date for an owner.
pub async fn insert_lifecycle_date(
    executor: impl PgExecutor<'_>,
    lifecycle_status_id: Uuid,
    owner: DateOwner,
    starting_at: DateTime<Utc>,
    ending_at: Option<DateTime<Utc>>,
) -> Result<LifecycleDate> {
    let (plan_id, object_id, regulation_id, proposition_id) = owner.columns();
    let row = sqlx::query_as::<_, LifecycleDate>(
        "INSERT INTO lifecycle_dates \
             (lifecycle_status_id, plan_id, plan_object_id, \
              plan_regulation_id, plan_proposition_id, starting_at, ending_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(lifecycle_status_id)
    .bind(plan_id)
    .bind(object_id)
    .bind(regulation_id)
    .bind(proposition_id)
    .bind(starting_at)
    .bind(ending_at)
    .fetch_one(executor)
    .await
    .context("failed to insert lifecycle date")?;

    Ok(row)
}

/// Close the owner's open lifecycle date for the given status. Returns the
/// number of rows closed (0 when no open period existed).
pub async fn close_open_date(
    executor: impl PgExecutor<'_>,
    owner: DateOwner,
    status_id: Uuid,
    ending_at: DateTime<Utc>,
) -> Result<u64> {
    // Owner column names are a closed set, safe to interpolate.
    let query = format!(
        "UPDATE lifecycle_dates SET ending_at = $1, modified_at = now() \
         WHERE {} = $2 AND lifecycle_status_id = $3 AND ending_at IS NULL",
        owner.column_name()
    );
    let result = sqlx::query(&query)
        .bind(ending_at)
        .bind(owner.id())
        .bind(status_id)
        .execute(executor)
        .await
        .context("failed to close lifecycle date")?;

    Ok(result.rows_affected())
}

/// Close open lifecycle dates for a batch of plan objects.
pub async fn close_open_dates_for_objects(
    executor: impl PgExecutor<'_>,
    object_ids: &[Uuid],
    status_id: Uuid,
    ending_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE lifecycle_dates SET ending_at = $1, modified_at = now() \
         WHERE plan_object_id = ANY($2) AND lifecycle_status_id = $3 AND ending_at IS NULL",
    )
    .bind(ending_at)
    .bind(object_ids)
    .bind(status_id)
    .execute(executor)
    .await
    .context("failed to close lifecycle dates for plan objects")?;

    Ok(result.rows_affected())
}

/// Open new lifecycle dates for a batch of plan objects.
pub async fn open_dates_for_objects(
    executor: impl PgExecutor<'_>,
    object_ids: &[Uuid],
    status_id: Uuid,
    starting_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "INSERT INTO lifecycle_dates (lifecycle_status_id, plan_object_id, starting_at) \
         SELECT $1, id, $2 FROM unnest($3::uuid[]) AS ids(id)",
    )
    .bind(status_id)
    .bind(starting_at)
    .bind(object_ids)
    .execute(executor)
    .await
    .context("failed to open lifecycle dates for plan objects")?;

    Ok(result.rows_affected())
}

/// Close open lifecycle dates for a batch of plan regulations.
pub async fn close_open_dates_for_regulations(
    executor: impl PgExecutor<'_>,
    regulation_ids: &[Uuid],
    status_id: Uuid,
    ending_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE lifecycle_dates SET ending_at = $1, modified_at = now() \
         WHERE plan_regulation_id = ANY($2) AND lifecycle_status_id = $3 AND ending_at IS NULL",
    )
    .bind(ending_at)
    .bind(regulation_ids)
    .bind(status_id)
    .execute(executor)
    .await
    .context("failed to close lifecycle dates for plan regulations")?;

    Ok(result.rows_affected())
}

/// Open new lifecycle dates for a batch of plan regulations.
pub async fn open_dates_for_regulations(
    executor: impl PgExecutor<'_>,
    regulation_ids: &[Uuid],
    status_id: Uuid,
    starting_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "INSERT INTO lifecycle_dates (lifecycle_status_id, plan_regulation_id, starting_at) \
         SELECT $1, id, $2 FROM unnest($3::uuid[]) AS ids(id)",
    )
    .bind(status_id)
    .bind(starting_at)
    .bind(regulation_ids)
    .execute(executor)
    .await
    .context("failed to open lifecycle dates for plan regulations")?;

    Ok(result.rows_affected())
}

/// Close open lifecycle dates for a batch of plan propositions.
pub async fn close_open_dates_for_propositions(
    executor: impl PgExecutor<'_>,
    proposition_ids: &[Uuid],
    status_id: Uuid,
    ending_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE lifecycle_dates SET ending_at = $1, modified_at = now() \
         WHERE plan_proposition_id = ANY($2) AND lifecycle_status_id = $3 AND ending_at IS NULL",
    )
    .bind(ending_at)
    .bind(proposition_ids)
    .bind(status_id)
    .execute(executor)
    .await
    .context("failed to close lifecycle dates for plan propositions")?;

    Ok(result.rows_affected())
}

/// Open new lifecycle dates for a batch of plan propositions.
pub async fn open_dates_for_propositions(
    executor: impl PgExecutor<'_>,
    proposition_ids: &[Uuid],
    status_id: Uuid,
    starting_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "INSERT INTO lifecycle_dates (lifecycle_status_id, plan_proposition_id, starting_at) \
         SELECT $1, id, $2 FROM unnest($3::uuid[]) AS ids(id)",
    )
    .bind(status_id)
    .bind(starting_at)
    .bind(proposition_ids)
    .execute(executor)
    .await
    .context("failed to open lifecycle dates for plan propositions")?;

    Ok(result.rows_affected())
}

/// Fetch a lifecycle date by id.
pub async fn get_lifecycle_date(
    executor: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<LifecycleDate>> {
    let row = sqlx::query_as::<_, LifecycleDate>("SELECT * FROM lifecycle_dates WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch lifecycle date")?;

    Ok(row)
}

/// List an owner's lifecycle dates, oldest first.
pub async fn list_dates_for_owner(
    executor: impl PgExecutor<'_>,
    owner: DateOwner,
) -> Result<Vec<LifecycleDate>> {
    let query = format!(
        "SELECT * FROM lifecycle_dates WHERE {} = $1 ORDER BY starting_at, created_at",
        owner.column_name()
    );
    let rows = sqlx::query_as::<_, LifecycleDate>(&query)
        .bind(owner.id())
        .fetch_all(executor)
        .await
        .context("failed to list lifecycle dates")?;

    Ok(rows)
}

/// Record an event inside a lifecycle date. Legality and interval checks
/// happen in `arho-core::lifecycle` before this runs.
pub async fn insert_event_date(
    executor: impl PgExecutor<'_>,
    lifecycle_date_id: Uuid,
    class: EventClass,
    event_code_id: Uuid,
    starting_at: DateTime<Utc>,
    ending_at: Option<DateTime<Utc>>,
) -> Result<EventDate> {
    let (decision_id, processing_event_id, interaction_event_id) = match class {
        EventClass::Decision => (Some(event_code_id), None, None),
        EventClass::ProcessingEvent => (None, Some(event_code_id), None),
        EventClass::InteractionEvent => (None, None, Some(event_code_id)),
    };

    let row = sqlx::query_as::<_, EventDate>(
        "INSERT INTO event_dates \
             (lifecycle_date_id, decision_id, processing_event_id, interaction_event_id, \
              starting_at, ending_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(lifecycle_date_id)
    .bind(decision_id)
    .bind(processing_event_id)
    .bind(interaction_event_id)
    .bind(starting_at)
    .bind(ending_at)
    .fetch_one(executor)
    .await
    .context("failed to insert event date")?;

    Ok(row)
}

/// List the events of one lifecycle date, oldest first.
pub async fn list_events_for_date(
    executor: impl PgExecutor<'_>,
    lifecycle_date_id: Uuid,
) -> Result<Vec<EventDate>> {
    let rows = sqlx::query_as::<_, EventDate>(
        "SELECT * FROM event_dates WHERE lifecycle_date_id = $1 \
         ORDER BY starting_at, created_at",
    )
    .bind(lifecycle_date_id)
    .fetch_all(executor)
    .await
    .context("failed to list event dates")?;

    Ok(rows)
}

/// List the events of a batch of lifecycle dates, oldest first.
pub async fn list_events_for_dates(
    executor: impl PgExecutor<'_>,
    lifecycle_date_ids: &[Uuid],
) -> Result<Vec<EventDate>> {
    let rows = sqlx::query_as::<_, EventDate>(
        "SELECT * FROM event_dates WHERE lifecycle_date_id = ANY($1) \
         ORDER BY starting_at, created_at",
    )
    .bind(lifecycle_date_ids)
    .fetch_all(executor)
    .await
    .context("failed to list event dates")?;

    Ok(rows)
}
