use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use bizdesk_core::{TenantId, UserId};
use bizdesk_events::{EventBus, EventEnvelope};
use bizdesk_projects::{Project, ProjectId};
use bizdesk_timesheets::{LogTime, TimeEntry, TimeEntryCommand};

use super::{Outcome, load_new, must_exist};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

#[derive(Debug, Clone)]
pub struct LogTimeInput {
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub work_date: NaiveDate,
    pub minutes: u32,
    pub description: String,
    pub billable: bool,
    /// Defaults to the project's hourly rate.
    pub hourly_rate: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Log time against an active project.
#[tracing::instrument(skip(dispatcher, input), fields(tenant_id = %tenant_id, project_id = %input.project_id))]
pub async fn log_time<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &LogTimeInput,
) -> Result<Outcome<TimeEntry>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut uow = dispatcher.unit_of_work(tenant_id);
    let project = uow
        .load_existing::<Project>(input.project_id.0)
        .await
        .map_err(must_exist("project", input.project_id.0))?;
    if !project.can_log_time() {
        return Err(DispatchError::InvariantViolation(format!(
            "project {} is not active",
            project.code()
        )));
    }

    let mut entry = load_new::<TimeEntry, _, _>(&mut uow).await?;
    let entry_id = entry.id_typed();
    uow.decide(
        &mut entry,
        &TimeEntryCommand::LogTime(LogTime {
            tenant_id,
            entry_id,
            project_id: input.project_id,
            user_id: input.user_id,
            work_date: input.work_date,
            minutes: input.minutes,
            description: input.description.clone(),
            billable: input.billable,
            hourly_rate: input.hourly_rate.unwrap_or_else(|| project.hourly_rate()),
            occurred_at: input.occurred_at,
        }),
    )?;

    let committed = uow.commit().await?;
    Ok(Outcome {
        document: entry,
        committed,
    })
}
