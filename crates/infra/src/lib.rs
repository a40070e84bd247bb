//! Infrastructure layer: event storage, command execution, workflows,
//! projections, reporting, configuration and external services.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod external;
pub mod projections;
pub mod read_model;
pub mod reporting;
pub mod streams;
pub mod unit_of_work;
pub mod workflows;
