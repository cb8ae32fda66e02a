//! Security for codeloop tools: project sandboxing and permission checks.
//!
//! Provides:
//! - **Path validation**: keep file tools inside the project directory
//! - **Permissions**: approve or deny writes and command execution per session

pub mod path;
pub mod permission;

pub use path::{PathValidationError, ProjectSandbox};
pub use permission::{
    Approver, AutoApprove, Decision, DenyAll, Operation, PermissionManager, PermissionRequest,
};
