//! Scratch directories and a constrained process runner for compiling and
//! running submitted programs.

pub mod errors;
pub mod path;
pub mod run;
pub mod workspace;

pub use errors::{Result, SandboxError};
pub use run::{ProcessRunner, Stage, StageLimits, StageOutput};
pub use workspace::{RunWorkspace, WorkspaceConfig, Workspaces};
