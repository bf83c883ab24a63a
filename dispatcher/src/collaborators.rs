use std::sync::Arc;

use async_trait::async_trait;

use crate::diagnostics::Diagnostics;
use crate::project::{ProjectDescriptor, TemplateStore};
use crate::session::{SessionInfo, UserInfo};

#[async_trait]
pub trait ProgramStore: Send + Sync {
    async fn list_programs(&self, user: &UserInfo) -> anyhow::Result<String>;
    async fn program_text(&self, id: &str) -> anyhow::Result<String>;
    async fn program_text_by_public_link(&self, link: &str) -> anyhow::Result<String>;
    async fn save_program(
        &self,
        user: &UserInfo,
        name: &str,
        text: &str,
        args: Option<&str>,
        run_conf: &str,
    ) -> anyhow::Result<String>;
    async fn update_program(
        &self,
        id: &str,
        text: &str,
        args: Option<&str>,
        run_conf: &str,
    ) -> anyhow::Result<String>;
    async fn delete_program(&self, user: &UserInfo, id: &str) -> anyhow::Result<String>;
    async fn generate_public_link(&self, id: &str) -> anyhow::Result<String>;
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        project: &ProjectDescriptor,
        session: &SessionInfo,
    ) -> anyhow::Result<String>;
}

#[async_trait]
pub trait Highlighter: Send + Sync {
    async fn highlight(
        &self,
        project: &ProjectDescriptor,
        session: &SessionInfo,
    ) -> anyhow::Result<String>;
}

/// Zero-based position of a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaretPosition {
    pub line: u32,
    pub ch: u32,
}

#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(
        &self,
        project: &ProjectDescriptor,
        session: &SessionInfo,
        filename: &str,
        caret: CaretPosition,
    ) -> anyhow::Result<String>;
}

#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, text: &str, session: &SessionInfo) -> anyhow::Result<String>;
}

/// The full set of dependencies handed to the dispatcher at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub programs: Arc<dyn ProgramStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub executor: Arc<dyn Executor>,
    pub highlighter: Arc<dyn Highlighter>,
    pub completer: Arc<dyn Completer>,
    pub converter: Arc<dyn Converter>,
    pub diagnostics: Arc<dyn Diagnostics>,
}
