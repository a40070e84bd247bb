//! Projects: customer work that time is logged against and quotes and
//! invoices can be attached to.

pub mod project;

pub use project::{
    ArchiveProject, CompleteProject, CreateProject, Project, ProjectArchived, ProjectCommand,
    ProjectCompleted, ProjectCreated, ProjectEvent, ProjectId, ProjectRenamed, ProjectReopened,
    ProjectStatus, RenameProject, ReopenProject,
};
