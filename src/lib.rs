//! Approval Flow Engine
//!
//! A hierarchical role-based approval workflow engine for field-force
//! requests: target hospital changes, linked pharmacy changes, and region
//! adjustments. Each request carries an ordered approval chain built from a
//! per-type template, walks it one step at a time, and lands in a terminal
//! approved or rejected status.
//!
//! The [`engine::WorkflowEngine`] is the entry point; the remaining modules
//! supply its parts: the state machine, permission matrix, chain builder,
//! payload validator, scope resolver, approver configuration, persistence,
//! audit log, and short-link tokens.

pub mod approver;
pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod permission;
pub mod repository;
pub mod scope;
pub mod shortlink;
pub mod state;
pub mod steps;
pub mod types;
pub mod validation;

pub use config::{DatabaseConfig, EngineConfig, ScopeMode};
pub use engine::{ActionRequest, CreateWorkflow, WorkflowEngine};
pub use error::WorkflowError;
pub use repository::{WorkflowFilter, WorkflowSummary};
pub use types::{
    ApproverConfig, Attachment, Representative, Workflow, WorkflowAction, WorkflowActionRecord,
    WorkflowDetail, WorkflowRole, WorkflowStatus, WorkflowStep, WorkflowType,
};
