use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use dispatcher::{
    CaretPosition, Completer, Converter, Highlighter, ProjectDescriptor, SessionInfo,
};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// HTTP client for the compiler analysis service that backs highlighting,
/// completion and conversion.
#[derive(Clone)]
pub struct AnalysisClient {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HighlightBody<'a> {
    project: &'a ProjectDescriptor,
    run_conf: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBody<'a> {
    project: &'a ProjectDescriptor,
    run_conf: Option<&'a str>,
    filename: &'a str,
    line: u32,
    ch: u32,
}

#[derive(Serialize)]
struct ConvertBody<'a> {
    text: &'a str,
}

impl AnalysisClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T, session: &SessionInfo) -> anyhow::Result<String> {
        let url = self.url(path);
        debug!(%url, session_id = %session.id(), "calling analysis service");
        let response = self
            .http
            .post(url)
            .header("X-Session-Id", session.id())
            .json(body)
            .send()
            .await
            .with_context(|| format!("analysis request to {path} failed"))?;
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return Ok(text);
        }
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(anyhow!("analysis service returned {status} for {path}: {message}"))
    }
}

#[async_trait]
impl Highlighter for AnalysisClient {
    async fn highlight(
        &self,
        project: &ProjectDescriptor,
        session: &SessionInfo,
    ) -> anyhow::Result<String> {
        let body = HighlightBody {
            project,
            run_conf: session.run_configuration().map(|conf| conf.as_str()),
        };
        self.post("/highlight", &body, session).await
    }
}

#[async_trait]
impl Completer for AnalysisClient {
    async fn complete(
        &self,
        project: &ProjectDescriptor,
        session: &SessionInfo,
        filename: &str,
        caret: CaretPosition,
    ) -> anyhow::Result<String> {
        let body = CompleteBody {
            project,
            run_conf: session.run_configuration().map(|conf| conf.as_str()),
            filename,
            line: caret.line,
            ch: caret.ch,
        };
        self.post("/complete", &body, session).await
    }
}

#[async_trait]
impl Converter for AnalysisClient {
    async fn convert(&self, text: &str, session: &SessionInfo) -> anyhow::Result<String> {
        self.post("/convert", &ConvertBody { text }, session).await
    }
}
