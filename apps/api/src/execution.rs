use async_trait::async_trait;
use dispatcher::{Executor, ProjectDescriptor, RunConfiguration, SessionInfo};
use sandbox::{
    ProcessRunner, RunWorkspace, SandboxError, Stage, StageLimits, StageOutput, WorkspaceConfig,
    Workspaces,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ApiConfig, CommandProfile, ProfileSet};

const MAX_SOURCE_BYTES: u64 = 512 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StageOutcome {
    exit_code: i32,
    stdout: String,
    stderr: String,
    duration_ms: u64,
}

impl From<StageOutput> for StageOutcome {
    fn from(output: StageOutput) -> Self {
        Self {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            duration_ms: output.duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionOutcome {
    run_conf: &'static str,
    compile: Option<StageOutcome>,
    run: Option<StageOutcome>,
    exception: Option<String>,
}

/// Compiles and runs projects in throwaway sandbox workspaces using the
/// command profile of the session's run configuration.
pub struct SandboxExecutor {
    workspaces: Workspaces,
    runner: ProcessRunner,
    profiles: ProfileSet,
}

impl SandboxExecutor {
    pub fn new(workspaces: Workspaces, runner: ProcessRunner, profiles: ProfileSet) -> Self {
        Self {
            workspaces,
            runner,
            profiles,
        }
    }

    pub fn from_config(config: &ApiConfig) -> anyhow::Result<Self> {
        let workspaces = Workspaces::new(WorkspaceConfig::new(
            &config.sandbox_root,
            MAX_SOURCE_BYTES,
        )?);
        let programs = config
            .profiles
            .iter()
            .flat_map(|profile| [profile.compile.as_deref(), Some(profile.run.as_str())])
            .flatten()
            .filter_map(|command| command.split_whitespace().next())
            .map(str::to_string);
        let runner = ProcessRunner::new(
            &config.sandbox_root,
            programs,
            "/usr/local/bin:/usr/bin:/bin",
            StageLimits {
                timeout: config.run_timeout,
                max_output_bytes: config.max_output_bytes,
            },
        )?;
        Ok(Self::new(workspaces, runner, config.profiles.clone()))
    }

    async fn run_stage(
        &self,
        stage: Stage,
        command: &str,
        workspace: &RunWorkspace,
        project: &ProjectDescriptor,
    ) -> Result<StageOutput, SandboxError> {
        let argv = expand_command(command, workspace.sources(), project);
        self.runner.run_stage(stage, workspace, &argv).await
    }

    async fn run_project(
        &self,
        profile: &CommandProfile,
        workspace: &RunWorkspace,
        project: &ProjectDescriptor,
        outcome: &mut ExecutionOutcome,
    ) -> anyhow::Result<()> {
        if let Some(compile) = &profile.compile {
            match self.run_stage(Stage::Compile, compile, workspace, project).await {
                Ok(output) => {
                    let success = output.success();
                    outcome.compile = Some(output.into());
                    if !success {
                        return Ok(());
                    }
                }
                Err(err) => return record_limit(err, outcome),
            }
        }
        match self.run_stage(Stage::Run, &profile.run, workspace, project).await {
            Ok(output) => outcome.run = Some(output.into()),
            Err(err) => return record_limit(err, outcome),
        }
        Ok(())
    }
}

/// Limits hit by the user's program end up in the outcome; anything else is
/// an executor failure.
fn record_limit(err: SandboxError, outcome: &mut ExecutionOutcome) -> anyhow::Result<()> {
    match err {
        SandboxError::Timeout(_)
        | SandboxError::OutputTooLarge { .. }
        | SandboxError::TerminatedBySignal => {
            outcome.exception = Some(err.to_string());
            Ok(())
        }
        other => Err(other.into()),
    }
}

/// Splits `command` on whitespace and replaces the whole-word placeholders
/// `{sources}`, `{args}` and `{testClasses}` with zero or more arguments.
pub fn expand_command(command: &str, sources: &[String], project: &ProjectDescriptor) -> Vec<String> {
    let mut argv = Vec::new();
    for token in command.split_whitespace() {
        match token {
            "{sources}" => argv.extend(sources.iter().cloned()),
            "{args}" => argv.extend(
                project
                    .args
                    .as_deref()
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string),
            ),
            "{testClasses}" => argv.extend(project.test_classes.iter().cloned()),
            other => argv.push(other.to_string()),
        }
    }
    argv
}

#[async_trait]
impl Executor for SandboxExecutor {
    async fn execute(
        &self,
        project: &ProjectDescriptor,
        session: &SessionInfo,
    ) -> anyhow::Result<String> {
        let conf = session
            .run_configuration()
            .or(project.conf_type)
            .unwrap_or(RunConfiguration::Java);
        let profile = self.profiles.get(conf);

        let mut workspace = self.workspaces.create()?;
        for file in &project.files {
            workspace.write_source(&file.name, &file.content)?;
        }

        let mut outcome = ExecutionOutcome {
            run_conf: conf.as_str(),
            compile: None,
            run: None,
            exception: None,
        };
        let result = self
            .run_project(profile, &workspace, project, &mut outcome)
            .await;

        let workspace_name = workspace.name().to_string();
        if let Err(err) = workspace.remove() {
            warn!(workspace = %workspace_name, error = %err, "failed to remove workspace");
        }
        result?;

        info!(
            session_id = %session.id(),
            run_conf = conf.as_str(),
            compiled = outcome.compile.as_ref().map(|stage| stage.exit_code == 0),
            exit_code = outcome.run.as_ref().map(|stage| stage.exit_code),
            "program executed"
        );
        Ok(serde_json::to_string(&outcome)?)
    }
}
