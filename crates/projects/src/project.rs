use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bizdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use bizdesk_events::Event;
use bizdesk_parties::PartyId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub AggregateId);

impl ProjectId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// `Active ⇄ Completed`, either `→ Archived` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Completed,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    id: ProjectId,
    tenant_id: Option<TenantId>,
    customer_id: Option<PartyId>,
    code: String,
    name: String,
    hourly_rate: u64,
    budget: Option<u64>,
    status: ProjectStatus,
    version: u64,
    created: bool,
}

impl Project {
    pub fn empty(id: ProjectId) -> Self {
        Self {
            id,
            tenant_id: None,
            customer_id: None,
            code: String::new(),
            name: String::new(),
            hourly_rate: 0,
            budget: None,
            status: ProjectStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProjectId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn customer_id(&self) -> Option<PartyId> {
        self.customer_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default rate for time logged on this project, minor units per hour.
    pub fn hourly_rate(&self) -> u64 {
        self.hourly_rate
    }

    pub fn budget(&self) -> Option<u64> {
        self.budget
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub fn can_log_time(&self) -> bool {
        self.created && self.status == ProjectStatus::Active
    }
}

impl AggregateRoot for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProject {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub customer_id: PartyId,
    pub code: String,
    pub name: String,
    pub hourly_rate: u64,
    pub budget: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameProject {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteProject {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenProject {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProject {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectCommand {
    CreateProject(CreateProject),
    RenameProject(RenameProject),
    CompleteProject(CompleteProject),
    ReopenProject(ReopenProject),
    ArchiveProject(ArchiveProject),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCreated {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub customer_id: PartyId,
    pub code: String,
    pub name: String,
    pub hourly_rate: u64,
    pub budget: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRenamed {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCompleted {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectReopened {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectArchived {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectEvent {
    ProjectCreated(ProjectCreated),
    ProjectRenamed(ProjectRenamed),
    ProjectCompleted(ProjectCompleted),
    ProjectReopened(ProjectReopened),
    ProjectArchived(ProjectArchived),
}

impl Event for ProjectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProjectEvent::ProjectCreated(_) => "projects.project.created",
            ProjectEvent::ProjectRenamed(_) => "projects.project.renamed",
            ProjectEvent::ProjectCompleted(_) => "projects.project.completed",
            ProjectEvent::ProjectReopened(_) => "projects.project.reopened",
            ProjectEvent::ProjectArchived(_) => "projects.project.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProjectEvent::ProjectCreated(e) => e.occurred_at,
            ProjectEvent::ProjectRenamed(e) => e.occurred_at,
            ProjectEvent::ProjectCompleted(e) => e.occurred_at,
            ProjectEvent::ProjectReopened(e) => e.occurred_at,
            ProjectEvent::ProjectArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Project {
    type Command = ProjectCommand;
    type Event = ProjectEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProjectEvent::ProjectCreated(e) => {
                self.id = e.project_id;
                self.tenant_id = Some(e.tenant_id);
                self.customer_id = Some(e.customer_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.hourly_rate = e.hourly_rate;
                self.budget = e.budget;
                self.status = ProjectStatus::Active;
                self.created = true;
            }
            ProjectEvent::ProjectRenamed(e) => self.name = e.name.clone(),
            ProjectEvent::ProjectCompleted(_) => self.status = ProjectStatus::Completed,
            ProjectEvent::ProjectReopened(_) => self.status = ProjectStatus::Active,
            ProjectEvent::ProjectArchived(_) => self.status = ProjectStatus::Archived,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProjectCommand::CreateProject(cmd) => self.handle_create(cmd),
            ProjectCommand::RenameProject(cmd) => self.handle_rename(cmd),
            ProjectCommand::CompleteProject(cmd) => self.handle_complete(cmd),
            ProjectCommand::ReopenProject(cmd) => self.handle_reopen(cmd),
            ProjectCommand::ArchiveProject(cmd) => self.handle_archive(cmd),
        }
    }
}

impl Project {
    fn ensure_exists(&self, tenant_id: TenantId, project_id: ProjectId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != project_id {
            return Err(DomainError::invariant("project_id mismatch"));
        }
        Ok(())
    }

    fn ensure_not_archived(&self) -> Result<(), DomainError> {
        if self.status == ProjectStatus::Archived {
            return Err(DomainError::invariant("project is archived"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProject) -> Result<Vec<ProjectEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("project already exists"));
        }
        let code = cmd.code.trim();
        if code.is_empty() || code.len() > 20 {
            return Err(DomainError::validation("project code must be 1-20 characters"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.budget == Some(0) {
            return Err(DomainError::validation("budget, when set, must be positive"));
        }

        Ok(vec![ProjectEvent::ProjectCreated(ProjectCreated {
            tenant_id: cmd.tenant_id,
            project_id: cmd.project_id,
            customer_id: cmd.customer_id,
            code: code.to_string(),
            name: cmd.name.trim().to_string(),
            hourly_rate: cmd.hourly_rate,
            budget: cmd.budget,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rename(&self, cmd: &RenameProject) -> Result<Vec<ProjectEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.project_id)?;
        self.ensure_not_archived()?;
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(vec![ProjectEvent::ProjectRenamed(ProjectRenamed {
            tenant_id: cmd.tenant_id,
            project_id: cmd.project_id,
            name: cmd.name.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteProject) -> Result<Vec<ProjectEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.project_id)?;
        if self.status != ProjectStatus::Active {
            return Err(DomainError::invariant("only active projects can be completed"));
        }
        Ok(vec![ProjectEvent::ProjectCompleted(ProjectCompleted {
            tenant_id: cmd.tenant_id,
            project_id: cmd.project_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reopen(&self, cmd: &ReopenProject) -> Result<Vec<ProjectEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.project_id)?;
        if self.status != ProjectStatus::Completed {
            return Err(DomainError::invariant("only completed projects can be reopened"));
        }
        Ok(vec![ProjectEvent::ProjectReopened(ProjectReopened {
            tenant_id: cmd.tenant_id,
            project_id: cmd.project_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProject) -> Result<Vec<ProjectEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.project_id)?;
        self.ensure_not_archived()?;
        Ok(vec![ProjectEvent::ProjectArchived(ProjectArchived {
            tenant_id: cmd.tenant_id,
            project_id: cmd.project_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_events::execute;

    fn created(tenant_id: TenantId, project_id: ProjectId) -> Project {
        let mut project = Project::empty(project_id);
        execute(
            &mut project,
            &ProjectCommand::CreateProject(CreateProject {
                tenant_id,
                project_id,
                customer_id: PartyId::new(AggregateId::new()),
                code: " WEB-01 ".to_string(),
                name: "Website rebuild".to_string(),
                hourly_rate: 9_500,
                budget: Some(1_000_000),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        project
    }

    fn complete(tenant_id: TenantId, project_id: ProjectId) -> ProjectCommand {
        ProjectCommand::CompleteProject(CompleteProject {
            tenant_id,
            project_id,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn create_trims_code_and_allows_time() {
        let project = created(TenantId::new(), ProjectId::new(AggregateId::new()));
        assert_eq!(project.code(), "WEB-01");
        assert_eq!(project.hourly_rate(), 9_500);
        assert!(project.can_log_time());
    }

    #[test]
    fn complete_then_reopen() {
        let tenant_id = TenantId::new();
        let project_id = ProjectId::new(AggregateId::new());
        let mut project = created(tenant_id, project_id);

        execute(&mut project, &complete(tenant_id, project_id)).unwrap();
        assert_eq!(project.status(), ProjectStatus::Completed);
        assert!(!project.can_log_time());
        assert!(project.handle(&complete(tenant_id, project_id)).is_err());

        execute(
            &mut project,
            &ProjectCommand::ReopenProject(ReopenProject {
                tenant_id,
                project_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(project.can_log_time());
    }

    #[test]
    fn archived_is_terminal() {
        let tenant_id = TenantId::new();
        let project_id = ProjectId::new(AggregateId::new());
        let mut project = created(tenant_id, project_id);

        execute(
            &mut project,
            &ProjectCommand::ArchiveProject(ArchiveProject {
                tenant_id,
                project_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let rename = project.handle(&ProjectCommand::RenameProject(RenameProject {
            tenant_id,
            project_id,
            name: "New".to_string(),
            occurred_at: Utc::now(),
        }));
        assert!(matches!(rename, Err(DomainError::InvariantViolation(msg)) if msg.contains("archived")));
        assert!(project.handle(&complete(tenant_id, project_id)).is_err());
    }

    #[test]
    fn create_validates_input() {
        let project = Project::empty(ProjectId::new(AggregateId::new()));
        let err = project
            .handle(&ProjectCommand::CreateProject(CreateProject {
                tenant_id: TenantId::new(),
                project_id: *project.id(),
                customer_id: PartyId::new(AggregateId::new()),
                code: String::new(),
                name: "x".to_string(),
                hourly_rate: 0,
                budget: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
