#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use dispatcher::{
    BufferedExchange, CaretPosition, Collaborators, Completer, Converter, Diagnostics,
    Dispatcher, ErrorReport, Executor, Highlighter, ProgramStore, ProjectDescriptor,
    ProjectFile, ReconstructionError, RequestParameters, SessionInfo, TemplateStore, UserInfo,
};
use parking_lot::Mutex;

/// Names of the collaborator calls made during a test, in order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

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

#[derive(Default)]
pub struct MapTemplates {
    templates: HashMap<(String, String), ProjectDescriptor>,
}

impl MapTemplates {
    pub fn with(mut self, template: ProjectDescriptor) -> Self {
        self.templates.insert(
            (template.name.clone(), template.parent.clone()),
            template,
        );
        self
    }
}

impl TemplateStore for MapTemplates {
    fn get_example_object(
        &self,
        name: &str,
        parent: &str,
    ) -> Result<ProjectDescriptor, ReconstructionError> {
        self.templates
            .get(&(name.to_string(), parent.to_string()))
            .cloned()
            .ok_or_else(|| ReconstructionError::TemplateNotFound {
                name: name.to_string(),
                parent: parent.to_string(),
            })
    }

    fn load_example(&self, args: &str) -> anyhow::Result<String> {
        Ok(format!("{{\"example\":\"{args}\"}}"))
    }
}

pub struct StubPrograms {
    calls: CallLog,
}

#[async_trait]
impl ProgramStore for StubPrograms {
    async fn list_programs(&self, user: &UserInfo) -> anyhow::Result<String> {
        self.calls
            .lock()
            .push(format!("list:{}", user.id.clone().unwrap_or_default()));
        Ok("[]".to_string())
    }

    async fn program_text(&self, id: &str) -> anyhow::Result<String> {
        self.calls.lock().push(format!("text:{id}"));
        Ok(format!("{{\"id\":\"{id}\"}}"))
    }

    async fn program_text_by_public_link(&self, link: &str) -> anyhow::Result<String> {
        self.calls.lock().push(format!("public:{link}"));
        Ok(format!("{{\"link\":\"{link}\"}}"))
    }

    async fn save_program(
        &self,
        _user: &UserInfo,
        name: &str,
        text: &str,
        args: Option<&str>,
        run_conf: &str,
    ) -> anyhow::Result<String> {
        self.calls.lock().push(format!(
            "save:{name}:{text}:{}:{run_conf}",
            args.unwrap_or("-")
        ));
        Ok("{\"id\":\"new\"}".to_string())
    }

    async fn update_program(
        &self,
        id: &str,
        text: &str,
        args: Option<&str>,
        run_conf: &str,
    ) -> anyhow::Result<String> {
        self.calls.lock().push(format!(
            "update:{id}:{text}:{}:{run_conf}",
            args.unwrap_or("-")
        ));
        Ok("{\"status\":\"updated\"}".to_string())
    }

    async fn delete_program(&self, _user: &UserInfo, id: &str) -> anyhow::Result<String> {
        self.calls.lock().push(format!("delete:{id}"));
        Ok("{\"status\":\"deleted\"}".to_string())
    }

    async fn generate_public_link(&self, id: &str) -> anyhow::Result<String> {
        self.calls.lock().push(format!("link:{id}"));
        Ok("{\"link\":\"abc\"}".to_string())
    }
}

pub struct StubAnalysis {
    calls: CallLog,
    pub projects: Mutex<Vec<ProjectDescriptor>>,
    pub fail: bool,
}

impl StubAnalysis {
    fn record(&self, call: String, project: Option<&ProjectDescriptor>) -> anyhow::Result<()> {
        self.calls.lock().push(call);
        if let Some(project) = project {
            self.projects.lock().push(project.clone());
        }
        if self.fail {
            return Err(anyhow!("analysis backend unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for StubAnalysis {
    async fn execute(
        &self,
        project: &ProjectDescriptor,
        session: &SessionInfo,
    ) -> anyhow::Result<String> {
        let conf = session
            .run_configuration()
            .map(|conf| conf.as_str())
            .unwrap_or("none");
        self.record(format!("execute:{conf}"), Some(project))?;
        Ok("{\"text\":\"Hello\"}".to_string())
    }
}

#[async_trait]
impl Highlighter for StubAnalysis {
    async fn highlight(
        &self,
        project: &ProjectDescriptor,
        _session: &SessionInfo,
    ) -> anyhow::Result<String> {
        self.record("highlight".to_string(), Some(project))?;
        Ok("{\n  \"main.kt\": [\n    {\"x\": 1}\n  ]\n}\n".to_string())
    }
}

#[async_trait]
impl Completer for StubAnalysis {
    async fn complete(
        &self,
        project: &ProjectDescriptor,
        _session: &SessionInfo,
        filename: &str,
        caret: CaretPosition,
    ) -> anyhow::Result<String> {
        self.record(
            format!("complete:{filename}:{}:{}", caret.line, caret.ch),
            Some(project),
        )?;
        Ok("[{\"text\":\"println\"}]".to_string())
    }
}

#[async_trait]
impl Converter for StubAnalysis {
    async fn convert(&self, text: &str, _session: &SessionInfo) -> anyhow::Result<String> {
        self.record(format!("convert:{text}"), None)?;
        Ok(format!("[{{\"text\":\"{}\"}}]", text.len()))
    }
}

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub diagnostics: Arc<RecordingDiagnostics>,
    pub analysis: Arc<StubAnalysis>,
    pub calls: CallLog,
}

impl Harness {
    pub fn new(templates: MapTemplates) -> Self {
        Self::build(templates, false)
    }

    pub fn failing(templates: MapTemplates) -> Self {
        Self::build(templates, true)
    }

    fn build(templates: MapTemplates, fail: bool) -> Self {
        let calls: CallLog = Arc::default();
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let analysis = Arc::new(StubAnalysis {
            calls: Arc::clone(&calls),
            projects: Mutex::default(),
            fail,
        });
        let collaborators = Collaborators {
            programs: Arc::new(StubPrograms {
                calls: Arc::clone(&calls),
            }),
            templates: Arc::new(templates),
            executor: analysis.clone(),
            highlighter: analysis.clone(),
            completer: analysis.clone(),
            converter: analysis.clone(),
            diagnostics: diagnostics.clone(),
        };
        Self {
            dispatcher: Dispatcher::new(collaborators),
            diagnostics,
            analysis,
            calls,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn reports(&self) -> Vec<ErrorReport> {
        self.diagnostics.reports.lock().clone()
    }
}

pub fn session() -> SessionInfo {
    SessionInfo::new("10.0.0.1", "http://playground.test/")
        .with_user(UserInfo::new("user-1", Some("Ada".to_string())))
}

pub fn exchange(query: &str, body: impl Into<bytes::Bytes>) -> (RequestParameters, BufferedExchange) {
    let params = RequestParameters::parse(Some(query));
    let exchange =
        BufferedExchange::new("/playground", Some(query.to_string())).with_body(body);
    (params, exchange)
}

pub fn template_with_base() -> ProjectDescriptor {
    ProjectDescriptor {
        name: "Hello".to_string(),
        parent: "Basics".to_string(),
        files: vec![
            ProjectFile::new("main.kt", "fun main() {}", true),
            ProjectFile::new("Base.kt", "open class Base", false),
        ],
        test_classes: vec!["HelloTest".to_string()],
        ..ProjectDescriptor::default()
    }
}
