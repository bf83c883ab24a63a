use std::time::Duration;

use anyhow::Result;
use integration_tests::support::{system_path, temp_workspace};
use sandbox::{ProcessRunner, SandboxError, Stage, StageLimits, WorkspaceConfig, Workspaces};

fn runner(root: &std::path::Path) -> Result<ProcessRunner> {
    Ok(ProcessRunner::new(
        root,
        vec!["/bin/sh".to_string()],
        system_path(),
        StageLimits {
            timeout: Duration::from_secs(2),
            max_output_bytes: 32 * 1024,
        },
    )?)
}

#[tokio::test]
async fn compile_output_is_visible_to_the_run_stage() -> Result<()> {
    let temp = temp_workspace()?;
    let workspaces = Workspaces::new(WorkspaceConfig::new(temp.path(), 64 * 1024)?);
    let runner = runner(temp.path())?;

    let mut workspace = workspaces.create()?;
    workspace.write_source("src/Main.kt", "fun main() = println(\"hi\")")?;
    let compile = runner
        .run_stage(
            Stage::Compile,
            &workspace,
            &[
                "/bin/sh".to_string(),
                "-c".to_string(),
                "mkdir out && cp src/Main.kt out/Main.class".to_string(),
            ],
        )
        .await?;
    assert!(compile.success());

    let run = runner
        .run_stage(
            Stage::Run,
            &workspace,
            &["/bin/sh".to_string(), "-c".to_string(), "cat out/Main.class".to_string()],
        )
        .await?;
    assert_eq!(run.stage, Stage::Run);
    assert_eq!(run.stdout, "fun main() = println(\"hi\")");

    let dir = workspace.dir().to_path_buf();
    workspace.remove()?;
    assert!(!dir.exists());
    Ok(())
}

#[tokio::test]
async fn workspace_outside_the_runner_root_is_rejected() -> Result<()> {
    let runner_root = temp_workspace()?;
    let other_root = temp_workspace()?;
    let runner = runner(runner_root.path())?;
    let workspace = Workspaces::new(WorkspaceConfig::new(other_root.path(), 1024)?).create()?;

    let err = runner
        .run_stage(Stage::Run, &workspace, &["/bin/sh".to_string()])
        .await
        .expect_err("foreign workspace rejected");
    assert!(matches!(err, SandboxError::OutsideRoot(_)));
    Ok(())
}
