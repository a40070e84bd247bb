use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bizdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Quantity, TenantId, UserId};
use bizdesk_events::Event;
use bizdesk_projects::ProjectId;

/// One day.
pub const MAX_MINUTES_PER_ENTRY: u32 = 24 * 60;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeEntryId(pub AggregateId);

impl TimeEntryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TimeEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// `Logged → Approved → Billed`, `Logged → Rejected → Logged` (via update).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeEntryStatus {
    Logged,
    Approved,
    Rejected,
    Billed,
}

impl TimeEntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeEntryStatus::Logged => "logged",
            TimeEntryStatus::Approved => "approved",
            TimeEntryStatus::Rejected => "rejected",
            TimeEntryStatus::Billed => "billed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeEntry {
    id: TimeEntryId,
    tenant_id: Option<TenantId>,
    project_id: Option<ProjectId>,
    user_id: Option<UserId>,
    work_date: Option<NaiveDate>,
    minutes: u32,
    description: String,
    billable: bool,
    hourly_rate: u64,
    status: TimeEntryStatus,
    rejection_reason: Option<String>,
    invoice_id: Option<AggregateId>,
    version: u64,
    created: bool,
}

impl TimeEntry {
    pub fn empty(id: TimeEntryId) -> Self {
        Self {
            id,
            tenant_id: None,
            project_id: None,
            user_id: None,
            work_date: None,
            minutes: 0,
            description: String::new(),
            billable: false,
            hourly_rate: 0,
            status: TimeEntryStatus::Logged,
            rejection_reason: None,
            invoice_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TimeEntryId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn work_date(&self) -> Option<NaiveDate> {
        self.work_date
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn billable(&self) -> bool {
        self.billable
    }

    pub fn hourly_rate(&self) -> u64 {
        self.hourly_rate
    }

    pub fn status(&self) -> TimeEntryStatus {
        self.status
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn invoice_id(&self) -> Option<AggregateId> {
        self.invoice_id
    }

    pub fn hours(&self) -> Quantity {
        Quantity::from_minutes(self.minutes)
    }

    /// Hours × rate in minor units (0 on overflow, which validation prevents).
    pub fn value(&self) -> u64 {
        self.hours().extend(self.hourly_rate).unwrap_or(0)
    }

    pub fn can_bill(&self) -> bool {
        self.created && self.billable && self.status == TimeEntryStatus::Approved
    }
}

impl AggregateRoot for TimeEntry {
    type Id = TimeEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogTime {
    pub tenant_id: TenantId,
    pub entry_id: TimeEntryId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub work_date: NaiveDate,
    pub minutes: u32,
    pub description: String,
    pub billable: bool,
    /// Minor units per hour; usually the project's rate.
    pub hourly_rate: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the current value. Re-opens a rejected entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTimeEntry {
    pub tenant_id: TenantId,
    pub entry_id: TimeEntryId,
    pub work_date: Option<NaiveDate>,
    pub minutes: Option<u32>,
    pub description: Option<String>,
    pub billable: Option<bool>,
    pub hourly_rate: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveTimeEntry {
    pub tenant_id: TenantId,
    pub entry_id: TimeEntryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectTimeEntry {
    pub tenant_id: TenantId,
    pub entry_id: TimeEntryId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkTimeBilled {
    pub tenant_id: TenantId,
    pub entry_id: TimeEntryId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeEntryCommand {
    LogTime(LogTime),
    UpdateTimeEntry(UpdateTimeEntry),
    ApproveTimeEntry(ApproveTimeEntry),
    RejectTimeEntry(RejectTimeEntry),
    MarkTimeBilled(MarkTimeBilled),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLogged {
    pub tenant_id: TenantId,
    pub entry_id: TimeEntryId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub work_date: NaiveDate,
    pub minutes: u32,
    pub description: String,
    pub billable: bool,
    pub hourly_rate: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Full post-update values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntryUpdated {
    pub tenant_id: TenantId,
    pub entry_id: TimeEntryId,
    pub work_date: NaiveDate,
    pub minutes: u32,
    pub description: String,
    pub billable: bool,
    pub hourly_rate: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeApproved {
    pub tenant_id: TenantId,
    pub entry_id: TimeEntryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRejected {
    pub tenant_id: TenantId,
    pub entry_id: TimeEntryId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBilled {
    pub tenant_id: TenantId,
    pub entry_id: TimeEntryId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeEntryEvent {
    TimeLogged(TimeLogged),
    TimeEntryUpdated(TimeEntryUpdated),
    TimeApproved(TimeApproved),
    TimeRejected(TimeRejected),
    TimeBilled(TimeBilled),
}

impl Event for TimeEntryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TimeEntryEvent::TimeLogged(_) => "timesheets.entry.logged",
            TimeEntryEvent::TimeEntryUpdated(_) => "timesheets.entry.updated",
            TimeEntryEvent::TimeApproved(_) => "timesheets.entry.approved",
            TimeEntryEvent::TimeRejected(_) => "timesheets.entry.rejected",
            TimeEntryEvent::TimeBilled(_) => "timesheets.entry.billed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TimeEntryEvent::TimeLogged(e) => e.occurred_at,
            TimeEntryEvent::TimeEntryUpdated(e) => e.occurred_at,
            TimeEntryEvent::TimeApproved(e) => e.occurred_at,
            TimeEntryEvent::TimeRejected(e) => e.occurred_at,
            TimeEntryEvent::TimeBilled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for TimeEntry {
    type Command = TimeEntryCommand;
    type Event = TimeEntryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TimeEntryEvent::TimeLogged(e) => {
                self.id = e.entry_id;
                self.tenant_id = Some(e.tenant_id);
                self.project_id = Some(e.project_id);
                self.user_id = Some(e.user_id);
                self.work_date = Some(e.work_date);
                self.minutes = e.minutes;
                self.description = e.description.clone();
                self.billable = e.billable;
                self.hourly_rate = e.hourly_rate;
                self.status = TimeEntryStatus::Logged;
                self.created = true;
            }
            TimeEntryEvent::TimeEntryUpdated(e) => {
                self.work_date = Some(e.work_date);
                self.minutes = e.minutes;
                self.description = e.description.clone();
                self.billable = e.billable;
                self.hourly_rate = e.hourly_rate;
                self.status = TimeEntryStatus::Logged;
                self.rejection_reason = None;
            }
            TimeEntryEvent::TimeApproved(_) => self.status = TimeEntryStatus::Approved,
            TimeEntryEvent::TimeRejected(e) => {
                self.status = TimeEntryStatus::Rejected;
                self.rejection_reason = e.reason.clone();
            }
            TimeEntryEvent::TimeBilled(e) => {
                self.status = TimeEntryStatus::Billed;
                self.invoice_id = Some(e.invoice_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TimeEntryCommand::LogTime(cmd) => self.handle_log(cmd),
            TimeEntryCommand::UpdateTimeEntry(cmd) => self.handle_update(cmd),
            TimeEntryCommand::ApproveTimeEntry(cmd) => self.handle_approve(cmd),
            TimeEntryCommand::RejectTimeEntry(cmd) => self.handle_reject(cmd),
            TimeEntryCommand::MarkTimeBilled(cmd) => self.handle_bill(cmd),
        }
    }
}

fn validate_work(minutes: u32, description: &str, hourly_rate: u64) -> Result<(), DomainError> {
    if !(1..=MAX_MINUTES_PER_ENTRY).contains(&minutes) {
        return Err(DomainError::validation(format!(
            "minutes must be between 1 and {MAX_MINUTES_PER_ENTRY}"
        )));
    }
    if description.trim().is_empty() {
        return Err(DomainError::validation("description cannot be empty"));
    }
    if Quantity::from_minutes(minutes).extend(hourly_rate).is_none() {
        return Err(DomainError::validation("hourly rate is too large"));
    }
    Ok(())
}

impl TimeEntry {
    fn ensure_exists(&self, tenant_id: TenantId, entry_id: TimeEntryId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != entry_id {
            return Err(DomainError::invariant("entry_id mismatch"));
        }
        Ok(())
    }

    fn status_error(&self, action: &str) -> DomainError {
        DomainError::invariant(format!(
            "cannot {action} a time entry in status '{}'",
            self.status.as_str()
        ))
    }

    fn handle_log(&self, cmd: &LogTime) -> Result<Vec<TimeEntryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("time entry already exists"));
        }
        validate_work(cmd.minutes, &cmd.description, cmd.hourly_rate)?;

        Ok(vec![TimeEntryEvent::TimeLogged(TimeLogged {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            project_id: cmd.project_id,
            user_id: cmd.user_id,
            work_date: cmd.work_date,
            minutes: cmd.minutes,
            description: cmd.description.trim().to_string(),
            billable: cmd.billable,
            hourly_rate: cmd.hourly_rate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateTimeEntry) -> Result<Vec<TimeEntryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.entry_id)?;
        if !matches!(self.status, TimeEntryStatus::Logged | TimeEntryStatus::Rejected) {
            return Err(self.status_error("edit"));
        }

        let minutes = cmd.minutes.unwrap_or(self.minutes);
        let description = cmd
            .description
            .as_deref()
            .map(|d| d.trim().to_string())
            .unwrap_or_else(|| self.description.clone());
        let hourly_rate = cmd.hourly_rate.unwrap_or(self.hourly_rate);
        validate_work(minutes, &description, hourly_rate)?;

        let work_date = cmd
            .work_date
            .or(self.work_date)
            .ok_or_else(|| DomainError::invariant("time entry has no work date"))?;

        Ok(vec![TimeEntryEvent::TimeEntryUpdated(TimeEntryUpdated {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            work_date,
            minutes,
            description,
            billable: cmd.billable.unwrap_or(self.billable),
            hourly_rate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveTimeEntry) -> Result<Vec<TimeEntryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.entry_id)?;
        if self.status != TimeEntryStatus::Logged {
            return Err(self.status_error("approve"));
        }
        Ok(vec![TimeEntryEvent::TimeApproved(TimeApproved {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectTimeEntry) -> Result<Vec<TimeEntryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.entry_id)?;
        if self.status != TimeEntryStatus::Logged {
            return Err(self.status_error("reject"));
        }
        Ok(vec![TimeEntryEvent::TimeRejected(TimeRejected {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_bill(&self, cmd: &MarkTimeBilled) -> Result<Vec<TimeEntryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.entry_id)?;
        if self.status == TimeEntryStatus::Billed {
            return Err(DomainError::conflict("time entry is already billed"));
        }
        if self.status != TimeEntryStatus::Approved {
            return Err(self.status_error("bill"));
        }
        if !self.billable {
            return Err(DomainError::invariant("time entry is not billable"));
        }
        Ok(vec![TimeEntryEvent::TimeBilled(TimeBilled {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_events::execute;

    fn logged(minutes: u32, billable: bool) -> (TenantId, TimeEntryId, TimeEntry) {
        let tenant_id = TenantId::new();
        let entry_id = TimeEntryId::new(AggregateId::new());
        let mut entry = TimeEntry::empty(entry_id);
        execute(
            &mut entry,
            &TimeEntryCommand::LogTime(LogTime {
                tenant_id,
                entry_id,
                project_id: ProjectId::new(AggregateId::new()),
                user_id: UserId::new(),
                work_date: Utc::now().date_naive(),
                minutes,
                description: "Sprint planning".to_string(),
                billable,
                hourly_rate: 8_000,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (tenant_id, entry_id, entry)
    }

    fn approve(entry: &mut TimeEntry, tenant_id: TenantId, entry_id: TimeEntryId) {
        execute(
            entry,
            &TimeEntryCommand::ApproveTimeEntry(ApproveTimeEntry {
                tenant_id,
                entry_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }

    fn bill(tenant_id: TenantId, entry_id: TimeEntryId) -> TimeEntryCommand {
        TimeEntryCommand::MarkTimeBilled(MarkTimeBilled {
            tenant_id,
            entry_id,
            invoice_id: AggregateId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn value_is_hours_times_rate() {
        let (_, _, entry) = logged(90, true);
        assert_eq!(entry.hours(), Quantity::from_milli(1500));
        assert_eq!(entry.value(), 12_000);
    }

    #[test]
    fn minutes_must_fit_in_a_day() {
        let entry = TimeEntry::empty(TimeEntryId::new(AggregateId::new()));
        for minutes in [0, MAX_MINUTES_PER_ENTRY + 1] {
            let err = entry
                .handle(&TimeEntryCommand::LogTime(LogTime {
                    tenant_id: TenantId::new(),
                    entry_id: *entry.id(),
                    project_id: ProjectId::new(AggregateId::new()),
                    user_id: UserId::new(),
                    work_date: Utc::now().date_naive(),
                    minutes,
                    description: "x".to_string(),
                    billable: true,
                    hourly_rate: 1,
                    occurred_at: Utc::now(),
                }))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(msg) if msg.contains("minutes")));
        }
    }

    #[test]
    fn approved_billable_entry_is_billed_once() {
        let (tenant_id, entry_id, mut entry) = logged(60, true);
        assert!(!entry.can_bill());
        approve(&mut entry, tenant_id, entry_id);
        assert!(entry.can_bill());

        execute(&mut entry, &bill(tenant_id, entry_id)).unwrap();
        assert_eq!(entry.status(), TimeEntryStatus::Billed);
        assert!(entry.invoice_id().is_some());

        let again = entry.handle(&bill(tenant_id, entry_id)).unwrap_err();
        assert!(matches!(again, DomainError::Conflict(_)));
    }

    #[test]
    fn non_billable_entry_cannot_be_billed() {
        let (tenant_id, entry_id, mut entry) = logged(60, false);
        approve(&mut entry, tenant_id, entry_id);
        let err = entry.handle(&bill(tenant_id, entry_id)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("not billable")));
    }

    #[test]
    fn rejected_entry_reopens_on_update() {
        let (tenant_id, entry_id, mut entry) = logged(60, true);
        execute(
            &mut entry,
            &TimeEntryCommand::RejectTimeEntry(RejectTimeEntry {
                tenant_id,
                entry_id,
                reason: Some("wrong project".to_string()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(entry.rejection_reason(), Some("wrong project"));

        execute(
            &mut entry,
            &TimeEntryCommand::UpdateTimeEntry(UpdateTimeEntry {
                tenant_id,
                entry_id,
                work_date: None,
                minutes: Some(45),
                description: None,
                billable: None,
                hourly_rate: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(entry.status(), TimeEntryStatus::Logged);
        assert_eq!(entry.minutes(), 45);
        assert_eq!(entry.rejection_reason(), None);
    }

    #[test]
    fn approved_entry_is_read_only() {
        let (tenant_id, entry_id, mut entry) = logged(60, true);
        approve(&mut entry, tenant_id, entry_id);
        let err = entry
            .handle(&TimeEntryCommand::UpdateTimeEntry(UpdateTimeEntry {
                tenant_id,
                entry_id,
                work_date: None,
                minutes: Some(30),
                description: None,
                billable: None,
                hourly_rate: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("approved")));
    }
}
