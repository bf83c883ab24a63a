use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use api::config::{CommandProfile, ProfileSet};
use api::execution::SandboxExecutor;
use api::metrics::AppMetrics;
use api::templates::FsTemplateStore;
use api::{build_router, AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use dispatcher::{
    CaretPosition, Collaborators, Completer, Converter, Diagnostics, Dispatcher, ErrorReport,
    Highlighter, ProgramStore, ProjectDescriptor, SessionInfo, UserInfo,
};
use parking_lot::Mutex;
use sandbox::{ProcessRunner, StageLimits, WorkspaceConfig, Workspaces};
use serde_json::json;
use tempfile::{tempdir, TempDir};

pub fn temp_workspace() -> Result<TempDir> {
    Ok(tempdir()?)
}

pub fn system_path() -> String {
    env::var("PATH").unwrap_or_else(|_| {
        "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string()
    })
}

#[derive(Default)]
pub struct RecordingDiagnostics {
    pub infos: Mutex<Vec<String>>,
    pub reports: Mutex<Vec<ErrorReport>>,
}

impl Diagnostics for RecordingDiagnostics {
    fn log_info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }

    fn report(&self, report: ErrorReport) {
        self.reports.lock().push(report);
    }
}

#[derive(Debug, Clone)]
struct StoredProgram {
    id: String,
    owner: String,
    name: String,
    text: String,
    args: Option<String>,
    run_conf: String,
    public_link: Option<String>,
}

/// Program store kept in memory; ids and links are sequence numbers.
#[derive(Default)]
pub struct MemoryPrograms {
    programs: Mutex<Vec<StoredProgram>>,
}

impl MemoryPrograms {
    fn render(program: &StoredProgram) -> String {
        json!({
            "id": program.id,
            "name": program.name,
            "text": program.text,
            "args": program.args,
            "runConf": program.run_conf,
        })
        .to_string()
    }
}

fn owner(user: &UserInfo) -> Result<String> {
    user.id
        .clone()
        .ok_or_else(|| anyhow!("anonymous users cannot store programs"))
}

#[async_trait]
impl ProgramStore for MemoryPrograms {
    async fn list_programs(&self, user: &UserInfo) -> Result<String> {
        let owner = owner(user)?;
        let names: Vec<_> = self
            .programs
            .lock()
            .iter()
            .filter(|program| program.owner == owner)
            .map(|program| json!({ "id": program.id, "name": program.name }))
            .collect();
        Ok(serde_json::Value::Array(names).to_string())
    }

    async fn program_text(&self, id: &str) -> Result<String> {
        let programs = self.programs.lock();
        let program = programs
            .iter()
            .find(|program| program.id == id)
            .ok_or_else(|| anyhow!("program not found"))?;
        Ok(Self::render(program))
    }

    async fn program_text_by_public_link(&self, link: &str) -> Result<String> {
        let programs = self.programs.lock();
        let program = programs
            .iter()
            .find(|program| program.public_link.as_deref() == Some(link))
            .ok_or_else(|| anyhow!("program not found"))?;
        Ok(Self::render(program))
    }

    async fn save_program(
        &self,
        user: &UserInfo,
        name: &str,
        text: &str,
        args: Option<&str>,
        run_conf: &str,
    ) -> Result<String> {
        let owner = owner(user)?;
        let mut programs = self.programs.lock();
        let id = (programs.len() + 1).to_string();
        programs.push(StoredProgram {
            id: id.clone(),
            owner,
            name: name.to_string(),
            text: text.to_string(),
            args: args.map(str::to_string),
            run_conf: run_conf.to_string(),
            public_link: None,
        });
        Ok(json!({ "id": id, "name": name }).to_string())
    }

    async fn update_program(
        &self,
        id: &str,
        text: &str,
        args: Option<&str>,
        run_conf: &str,
    ) -> Result<String> {
        let mut programs = self.programs.lock();
        let program = programs
            .iter_mut()
            .find(|program| program.id == id)
            .ok_or_else(|| anyhow!("program not found"))?;
        program.text = text.to_string();
        program.args = args.map(str::to_string);
        program.run_conf = run_conf.to_string();
        Ok(json!({ "id": id, "status": "updated" }).to_string())
    }

    async fn delete_program(&self, user: &UserInfo, id: &str) -> Result<String> {
        let owner = owner(user)?;
        let mut programs = self.programs.lock();
        let before = programs.len();
        programs.retain(|program| !(program.id == id && program.owner == owner));
        if programs.len() == before {
            return Err(anyhow!("program not found"));
        }
        Ok(json!({ "id": id, "status": "deleted" }).to_string())
    }

    async fn generate_public_link(&self, id: &str) -> Result<String> {
        let mut programs = self.programs.lock();
        let program = programs
            .iter_mut()
            .find(|program| program.id == id)
            .ok_or_else(|| anyhow!("program not found"))?;
        let link = program
            .public_link
            .get_or_insert_with(|| format!("link-{id}"))
            .clone();
        Ok(json!({ "id": id, "publicLink": link }).to_string())
    }
}

/// Analysis service double that echoes what it was asked.
#[derive(Default)]
pub struct EchoAnalysis {
    pub projects: Mutex<Vec<ProjectDescriptor>>,
}

#[async_trait]
impl Highlighter for EchoAnalysis {
    async fn highlight(&self, project: &ProjectDescriptor, _session: &SessionInfo) -> Result<String> {
        self.projects.lock().push(project.clone());
        let files: Vec<_> = project.files.iter().map(|file| &file.name).collect();
        Ok(serde_json::to_string_pretty(&json!({ "files": files }))?)
    }
}

#[async_trait]
impl Completer for EchoAnalysis {
    async fn complete(
        &self,
        project: &ProjectDescriptor,
        _session: &SessionInfo,
        filename: &str,
        caret: CaretPosition,
    ) -> Result<String> {
        self.projects.lock().push(project.clone());
        Ok(json!([{ "file": filename, "line": caret.line, "ch": caret.ch }]).to_string())
    }
}

#[async_trait]
impl Converter for EchoAnalysis {
    async fn convert(&self, text: &str, _session: &SessionInfo) -> Result<String> {
        Ok(json!([{ "text": text.to_uppercase() }]).to_string())
    }
}

/// Writes the template tree used by the end-to-end tests.
pub fn write_templates(root: &Path) -> Result<()> {
    let basics = root.join("Basics");
    fs::create_dir_all(basics.join("Inheritance"))?;
    fs::write(basics.join("Hello.kt"), "fun main() {}")?;
    fs::write(basics.join("Inheritance/main.kt"), "class Child : Base()")?;
    fs::write(basics.join("Inheritance/Base.kt"), "open class Base")?;
    fs::write(
        basics.join("Inheritance/manifest.json"),
        r#"{"files":[{"name":"main.kt"},{"name":"Base.kt","modifiable":false}],"testClasses":["ChildTest"]}"#,
    )?;
    Ok(())
}

/// Command profiles that stand in for the Kotlin toolchain with `/bin/sh`.
pub fn shell_profiles() -> ProfileSet {
    let listing = CommandProfile {
        compile: Some("/bin/sh -c true".to_string()),
        run: "/bin/sh -c ls".to_string(),
    };
    ProfileSet {
        java: listing.clone(),
        junit: listing.clone(),
        js: listing.clone(),
        canvas: listing,
    }
}

pub struct TestApp {
    pub router: Router,
    pub diagnostics: Arc<RecordingDiagnostics>,
    pub analysis: Arc<EchoAnalysis>,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        let dir = temp_workspace()?;
        let templates_root = dir.path().join("templates");
        let sandbox_root = dir.path().join("sandbox");
        write_templates(&templates_root)?;

        let workspaces = Workspaces::new(WorkspaceConfig::new(&sandbox_root, 64 * 1024)?);
        let runner = ProcessRunner::new(
            &sandbox_root,
            vec!["/bin/sh".to_string()],
            system_path(),
            StageLimits {
                timeout: Duration::from_secs(5),
                max_output_bytes: 64 * 1024,
            },
        )?;
        let executor = SandboxExecutor::new(workspaces, runner, shell_profiles());

        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let analysis = Arc::new(EchoAnalysis::default());
        let collaborators = Collaborators {
            programs: Arc::new(MemoryPrograms::default()),
            templates: Arc::new(FsTemplateStore::load(&templates_root)?),
            executor: Arc::new(executor),
            highlighter: analysis.clone(),
            completer: analysis.clone(),
            converter: analysis.clone(),
            diagnostics: diagnostics.clone(),
        };
        let state = AppState {
            dispatcher: Arc::new(Dispatcher::new(collaborators)),
            metrics: Arc::new(AppMetrics::new()?),
            max_body_bytes: 64 * 1024,
        };
        Ok(Self {
            router: build_router(state),
            diagnostics,
            analysis,
            _dir: dir,
        })
    }

    pub fn reports(&self) -> Vec<ErrorReport> {
        self.diagnostics.reports.lock().clone()
    }
}

/// A POST to `/playground` with the given query string, as a signed-in user.
pub fn playground_request(query: &str, body: impl Into<Body>) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(format!("/playground?{query}"))
        .header("x-session-id", "session-1")
        .header("x-user-id", "user-1")
        .header("origin", "http://playground.test")
        .body(body.into())?)
}

pub async fn body_text(response: Response<Body>) -> Result<String> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}
