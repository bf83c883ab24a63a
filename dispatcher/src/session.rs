use std::fmt::{Display, Formatter};
use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Run,
    LoadExample,
    Highlight,
    WriteLog,
    ConvertToKotlin,
    ConvertToJs,
    Complete,
    SaveProgram,
    LoadProgram,
    DeleteProgram,
    GeneratePublicLink,
    IncNumberOfRequests,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Run => "RUN",
            RequestType::LoadExample => "LOAD_EXAMPLE",
            RequestType::Highlight => "HIGHLIGHT",
            RequestType::WriteLog => "WRITE_LOG",
            RequestType::ConvertToKotlin => "CONVERT_TO_KOTLIN",
            RequestType::ConvertToJs => "CONVERT_TO_JS",
            RequestType::Complete => "COMPLETE",
            RequestType::SaveProgram => "SAVE_PROGRAM",
            RequestType::LoadProgram => "LOAD_PROGRAM",
            RequestType::DeleteProgram => "DELETE_PROGRAM",
            RequestType::GeneratePublicLink => "GENERATE_PUBLIC_LINK",
            RequestType::IncNumberOfRequests => "INC_NUMBER_OF_REQUESTS",
        }
    }
}

impl Display for RequestType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunConfiguration {
    Java,
    Js,
    Junit,
    Canvas,
}

impl RunConfiguration {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "java" => Some(RunConfiguration::Java),
            "js" => Some(RunConfiguration::Js),
            "junit" => Some(RunConfiguration::Junit),
            "canvas" => Some(RunConfiguration::Canvas),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunConfiguration::Java => "java",
            RunConfiguration::Js => "js",
            RunConfiguration::Junit => "junit",
            RunConfiguration::Canvas => "canvas",
        }
    }

    pub fn is_jvm(self) -> bool {
        matches!(self, RunConfiguration::Java | RunConfiguration::Junit)
    }
}

impl Display for RunConfiguration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identity of the user behind a session. Not validated here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl UserInfo {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: Some(id.into()),
            name,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// Per-request session state. Owned by the transport, lent to the
/// dispatcher for the duration of one request.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    id: String,
    origin_url: String,
    user: UserInfo,
    request_type: Option<RequestType>,
    run_configuration: Option<RunConfiguration>,
    started: Instant,
}

impl SessionInfo {
    pub fn new(id: impl Into<String>, origin_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            origin_url: origin_url.into(),
            user: UserInfo::anonymous(),
            request_type: None,
            run_configuration: None,
            started: Instant::now(),
        }
    }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = user;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin_url(&self) -> &str {
        &self.origin_url
    }

    pub fn user(&self) -> &UserInfo {
        &self.user
    }

    pub fn request_type(&self) -> Option<RequestType> {
        self.request_type
    }

    pub fn set_request_type(&mut self, request_type: RequestType) {
        self.request_type = Some(request_type);
    }

    /// Label used in logs and reports; `UNKNOWN` before routing tagged it.
    pub fn request_type_label(&self) -> &'static str {
        self.request_type.map_or("UNKNOWN", RequestType::as_str)
    }

    pub fn run_configuration(&self) -> Option<RunConfiguration> {
        self.run_configuration
    }

    pub fn set_run_configuration(&mut self, run_configuration: Option<RunConfiguration>) {
        self.run_configuration = run_configuration;
    }

    /// Parses and records a run configuration; unknown values clear it.
    pub fn set_run_configuration_str(&mut self, value: &str) {
        self.run_configuration = RunConfiguration::parse(value);
    }

    pub fn elapsed_millis(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}
