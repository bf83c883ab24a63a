use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::errors::{Result, SandboxError};
use crate::path;
use crate::workspace::RunWorkspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compile,
    Run,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Compile => "compile",
            Stage::Run => "run",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct StageLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

/// Runs compile and run stages of a project inside its workspace.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    root: PathBuf,
    programs: HashSet<String>,
    search_path: String,
    limits: StageLimits,
}

impl ProcessRunner {
    pub fn new(
        root: impl AsRef<Path>,
        programs: impl IntoIterator<Item = String>,
        search_path: impl Into<String>,
        limits: StageLimits,
    ) -> Result<Self> {
        if limits.timeout.is_zero() {
            return Err(SandboxError::InvalidConfig(
                "stage timeout must be greater than zero".to_string(),
            ));
        }
        if limits.max_output_bytes == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_output_bytes must be greater than zero".to_string(),
            ));
        }
        let programs: HashSet<String> = programs
            .into_iter()
            .map(|program| program.trim().to_string())
            .filter(|program| !program.is_empty())
            .collect();
        if programs.is_empty() {
            return Err(SandboxError::InvalidConfig(
                "no programs allowed for the run sandbox".to_string(),
            ));
        }
        Ok(Self {
            root: path::ensure_absolute_root(root.as_ref())?,
            programs,
            search_path: search_path.into(),
            limits,
        })
    }

    pub fn limits(&self) -> &StageLimits {
        &self.limits
    }

    /// `argv[0]` must be one of the configured programs. The process starts
    /// in the workspace directory with only `PATH` set.
    #[instrument(skip(self, workspace, argv), fields(workspace = %workspace.name(), program = argv.first().map(String::as_str).unwrap_or_default()))]
    pub async fn run_stage(
        &self,
        stage: Stage,
        workspace: &RunWorkspace,
        argv: &[String],
    ) -> Result<StageOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SandboxError::InvalidConfig(format!("empty {stage} command")))?;
        if !self.programs.contains(program) {
            return Err(SandboxError::ProgramNotAllowed(program.clone()));
        }
        if !workspace.dir().starts_with(&self.root) {
            return Err(SandboxError::OutsideRoot(workspace.dir().display().to_string()));
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(workspace.dir())
            .env_clear()
            .env("PATH", &self.search_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let child = command.spawn()?;
        let output = timeout(self.limits.timeout, child.wait_with_output())
            .await
            .map_err(|_| SandboxError::Timeout(self.limits.timeout))??;
        let duration = start.elapsed();

        let limit = self.limits.max_output_bytes;
        for (stream, bytes) in [("stdout", &output.stdout), ("stderr", &output.stderr)] {
            if bytes.len() > limit {
                return Err(SandboxError::OutputTooLarge { stream, limit });
            }
        }
        let exit_code = output
            .status
            .code()
            .ok_or(SandboxError::TerminatedBySignal)?;
        debug!(%stage, exit_code, elapsed_ms = duration.as_millis() as u64, "stage finished");

        Ok(StageOutput {
            stage,
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StageOutput {
    pub stage: Stage,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl StageOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
