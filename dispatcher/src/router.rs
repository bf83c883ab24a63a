use std::error::Error as _;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::collaborators::{CaretPosition, Collaborators};
use crate::diagnostics::{parse_exception, unescape_xml, ErrorReport, UNKNOWN};
use crate::errors::{DispatchError, Result};
use crate::params::{
    program_id_from_args, substring_after, substring_before, Action, RequestParameters,
};
use crate::payload::{self, PostData};
use crate::project::{self, ProjectDescriptor};
use crate::response::{write_reply, Reply, Status};
use crate::session::{RequestType, RunConfiguration, SessionInfo};
use crate::transport::Exchange;

const RUN_CONF_MARKER: &str = "&runConf=";
const INCORRECT_REQUEST: &str = "Incorrect request";
const INTERNAL_ERROR: &str = "Internal server error";
const CANNOT_READ_DATA: &str = "Cannot read data from file";

#[derive(Debug, Default)]
struct RequestScope {
    current_source: Option<String>,
    // Set when the form body was replaced by a substitute; reported once at
    // the end of the request.
    decode_error: Option<String>,
}

impl RequestScope {
    fn record_payload(&mut self, data: &PostData) {
        if !data.is_substitute() {
            self.current_source = Some(data.text.clone());
        }
    }

    fn context(&self) -> String {
        self.current_source
            .clone()
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct CompletionRequest {
    filename: String,
    line: u32,
    ch: u32,
    project: ProjectDescriptor,
}

#[derive(Clone)]
pub struct Dispatcher {
    collaborators: Collaborators,
}

impl Dispatcher {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Handles one request and returns the reply that was written.
    pub async fn route(
        &self,
        session: &mut SessionInfo,
        params: &RequestParameters,
        exchange: &mut dyn Exchange,
    ) -> Reply {
        let request_line = exchange.request_line();
        info!(
            target: "playground::requests",
            request = %request_line,
            session_id = %session.id(),
            "request received"
        );

        let mut scope = RequestScope::default();
        let reply = match params.action() {
            None => {
                warn!(
                    action = %params.action_token(),
                    origin = %session.origin_url(),
                    "unrecognised action"
                );
                self.collaborators.diagnostics.report(ErrorReport::new(
                    INCORRECT_REQUEST,
                    session.request_type_label(),
                    session.origin_url(),
                    request_line.as_str(),
                ));
                Reply::error(Status::BadRequest, INCORRECT_REQUEST)
            }
            Some(action) => {
                session.set_request_type(request_type_for(action));
                match self
                    .dispatch(action, session, params, exchange, &mut scope)
                    .await
                {
                    Ok(reply) => {
                        self.report_decode_error(session, &mut scope);
                        reply
                    }
                    Err(err) => self.fail(err, session, exchange, &scope),
                }
            }
        };

        write_reply(
            exchange,
            session,
            self.collaborators.diagnostics.as_ref(),
            scope.current_source.as_deref(),
            &reply,
        );
        reply
    }

    async fn dispatch(
        &self,
        action: Action,
        session: &mut SessionInfo,
        params: &RequestParameters,
        exchange: &mut dyn Exchange,
        scope: &mut RequestScope,
    ) -> Result<Reply> {
        match action {
            Action::Run => self.run(session, exchange, scope).await,
            Action::LoadExample => self.load_example(session, params),
            Action::Highlight => self.highlight(session, params, exchange, scope).await,
            Action::WriteLog => self.write_log(session, params, exchange, scope).await,
            Action::ConvertToKotlin => self.convert(session, exchange, scope).await,
            Action::SaveProgram => self.save_program(session, params, exchange, scope).await,
            Action::LoadProgram => self.load_program(session, params).await,
            Action::DeleteProgram => self.delete_program(session, params).await,
            Action::GeneratePublicLink => self.generate_public_link(params).await,
            Action::Complete => self.complete(session, params, exchange, scope).await,
        }
    }

    fn fail(
        &self,
        err: DispatchError,
        session: &SessionInfo,
        exchange: &dyn Exchange,
        scope: &RequestScope,
    ) -> Reply {
        error!(
            request_type = session.request_type_label(),
            origin = %session.origin_url(),
            error = %err,
            "request failed"
        );
        let (context, message) = if err.is_body_read_failure() {
            (exchange.query().unwrap_or(UNKNOWN).to_string(), CANNOT_READ_DATA)
        } else {
            (scope.context(), INTERNAL_ERROR)
        };
        let mut stack_trace = error_chain(&err);
        if let Some(decode_error) = &scope.decode_error {
            stack_trace.push_str("\npayload substituted: ");
            stack_trace.push_str(decode_error);
        }
        self.collaborators.diagnostics.report(
            ErrorReport::new(
                err.to_string(),
                session.request_type_label(),
                session.origin_url(),
                context,
            )
            .with_stack_trace(stack_trace),
        );
        Reply::error(Status::InternalServerError, message)
    }

    fn report_decode_error(&self, session: &SessionInfo, scope: &mut RequestScope) {
        if let Some(decode_error) = scope.decode_error.take() {
            self.collaborators.diagnostics.report(ErrorReport::new(
                decode_error,
                session.request_type_label(),
                session.origin_url(),
                scope.context(),
            ));
        }
    }

    fn count_request(&self, session: &SessionInfo) {
        info!(
            target: "playground::requests",
            counter = RequestType::IncNumberOfRequests.as_str(),
            session_id = %session.id(),
            request_type = session.request_type_label(),
            "request counted"
        );
    }

    async fn run(
        &self,
        session: &mut SessionInfo,
        exchange: &mut dyn Exchange,
        scope: &mut RequestScope,
    ) -> Result<Reply> {
        self.count_request(session);
        let project = self.read_project(exchange, scope).await?;

        let run_configuration = project.conf_type.unwrap_or(RunConfiguration::Java);
        session.set_run_configuration(Some(run_configuration));
        if run_configuration.is_jvm() {
            session.set_request_type(RequestType::Run);
        } else {
            session.set_request_type(RequestType::ConvertToJs);
        }

        let result = self
            .collaborators
            .executor
            .execute(&project, session)
            .await
            .map_err(|err| DispatchError::upstream("executor", err))?;
        Ok(Reply::json(result))
    }

    fn load_example(&self, session: &SessionInfo, params: &RequestParameters) -> Result<Reply> {
        self.count_request(session);
        let listing = self
            .collaborators
            .templates
            .load_example(params.args())
            .map_err(|err| DispatchError::upstream("templates", err))?;
        Ok(Reply::json(listing))
    }

    async fn highlight(
        &self,
        session: &mut SessionInfo,
        params: &RequestParameters,
        exchange: &mut dyn Exchange,
        scope: &mut RequestScope,
    ) -> Result<Reply> {
        session.set_run_configuration_str(params.args());
        let project = self.read_project(exchange, scope).await?;
        let result = self
            .collaborators
            .highlighter
            .highlight(&project, session)
            .await
            .map_err(|err| DispatchError::upstream("highlighter", err))?;
        Ok(Reply::json(result.replace('\n', "")))
    }

    async fn write_log(
        &self,
        session: &SessionInfo,
        params: &RequestParameters,
        exchange: &mut dyn Exchange,
        scope: &mut RequestScope,
    ) -> Result<Reply> {
        let data = self.post_data(session, exchange, scope, true).await?;
        scope.record_payload(&data);
        let diagnostics = &self.collaborators.diagnostics;
        match params.args() {
            "info" => diagnostics.log_info(&data.text),
            "errorInKotlin" => {
                let text = unescape_xml(&unescape_xml(&data.text));
                let fields = parse_exception(&text)?;
                diagnostics.report(ErrorReport::from_client_fields(&fields)?);
            }
            _ => {
                let fields = parse_exception(&data.text)?;
                diagnostics.report(ErrorReport::from_client_fields(&fields)?);
            }
        }
        Ok(Reply::text("Data sent"))
    }

    async fn convert(
        &self,
        session: &SessionInfo,
        exchange: &mut dyn Exchange,
        scope: &mut RequestScope,
    ) -> Result<Reply> {
        let data = self.post_data(session, exchange, scope, false).await?;
        scope.record_payload(&data);
        let result = self
            .collaborators
            .converter
            .convert(&data.text, session)
            .await
            .map_err(|err| DispatchError::upstream("converter", err))?;
        Ok(Reply::json(result))
    }

    async fn save_program(
        &self,
        session: &SessionInfo,
        params: &RequestParameters,
        exchange: &mut dyn Exchange,
        scope: &mut RequestScope,
    ) -> Result<Reply> {
        let args = params.args();
        let run_conf = substring_after(args, RUN_CONF_MARKER);
        let data = self.post_data(session, exchange, scope, false).await?;
        scope.record_payload(&data);
        let programs = &self.collaborators.programs;

        let result = if args.starts_with("id=") {
            let id = program_id_from_args(substring_before(args, RUN_CONF_MARKER));
            programs
                .update_program(id, &data.text, data.arguments.as_deref(), run_conf)
                .await
        } else {
            let name = substring_before(args, RUN_CONF_MARKER);
            programs
                .save_program(
                    session.user(),
                    name,
                    &data.text,
                    data.arguments.as_deref(),
                    run_conf,
                )
                .await
        };
        result
            .map(Reply::json)
            .map_err(|err| DispatchError::upstream("program store", err))
    }

    async fn load_program(
        &self,
        session: &SessionInfo,
        params: &RequestParameters,
    ) -> Result<Reply> {
        let args = params.args();
        let programs = &self.collaborators.programs;
        let result = if args == "all" {
            programs.list_programs(session.user()).await
        } else if args.contains("publicLink") {
            programs
                .program_text_by_public_link(program_id_from_args(args))
                .await
        } else {
            programs.program_text(program_id_from_args(args)).await
        };
        result
            .map(Reply::json)
            .map_err(|err| DispatchError::upstream("program store", err))
    }

    async fn delete_program(
        &self,
        session: &SessionInfo,
        params: &RequestParameters,
    ) -> Result<Reply> {
        let id = program_id_from_args(params.args());
        self.collaborators
            .programs
            .delete_program(session.user(), id)
            .await
            .map(Reply::json)
            .map_err(|err| DispatchError::upstream("program store", err))
    }

    async fn generate_public_link(&self, params: &RequestParameters) -> Result<Reply> {
        let id = program_id_from_args(params.args());
        self.collaborators
            .programs
            .generate_public_link(id)
            .await
            .map(Reply::json)
            .map_err(|err| DispatchError::upstream("program store", err))
    }

    async fn complete(
        &self,
        session: &mut SessionInfo,
        params: &RequestParameters,
        exchange: &mut dyn Exchange,
        scope: &mut RequestScope,
    ) -> Result<Reply> {
        self.count_request(session);
        let body = exchange.read_body().await?;
        let request: CompletionRequest = serde_json::from_slice(&body)?;
        let project = project::reconstruct(self.collaborators.templates.as_ref(), request.project)?;
        scope.current_source = project
            .file(&request.filename)
            .map(|file| file.content.clone())
            .or_else(|| project.primary_source().map(str::to_string));
        session.set_run_configuration_str(substring_after(params.args(), RUN_CONF_MARKER));

        let caret = CaretPosition {
            line: request.line,
            ch: request.ch,
        };
        let result = self
            .collaborators
            .completer
            .complete(&project, session, &request.filename, caret)
            .await
            .map_err(|err| DispatchError::upstream("completer", err))?;
        Ok(Reply::json(result))
    }

    async fn read_project(
        &self,
        exchange: &mut dyn Exchange,
        scope: &mut RequestScope,
    ) -> Result<ProjectDescriptor> {
        let body = exchange.read_body().await?;
        let submitted: ProjectDescriptor = serde_json::from_slice(&body)?;
        scope.current_source = submitted.primary_source().map(str::to_string);
        let project = project::reconstruct(self.collaborators.templates.as_ref(), submitted)?;
        if scope.current_source.is_none() {
            scope.current_source = project.primary_source().map(str::to_string);
        }
        Ok(project)
    }

    /// Decodes a form body. An undecodable body is replaced by
    /// [`PostData::substitute`] and the raw bytes become the report context.
    async fn post_data(
        &self,
        session: &SessionInfo,
        exchange: &mut dyn Exchange,
        scope: &mut RequestScope,
        preserve_newlines: bool,
    ) -> Result<PostData> {
        let raw = exchange.read_body().await?;
        match payload::decode(&raw, preserve_newlines) {
            Ok(data) => Ok(data),
            Err(err) => {
                warn!(
                    request_type = session.request_type_label(),
                    error = %err,
                    "substituting empty payload for undecodable body"
                );
                scope.current_source = Some(String::from_utf8_lossy(&raw).into_owned());
                scope.decode_error = Some(err.to_string());
                Ok(PostData::substitute())
            }
        }
    }
}

fn request_type_for(action: Action) -> RequestType {
    match action {
        Action::Run => RequestType::Run,
        Action::LoadExample => RequestType::LoadExample,
        Action::Highlight => RequestType::Highlight,
        Action::WriteLog => RequestType::WriteLog,
        Action::ConvertToKotlin => RequestType::ConvertToKotlin,
        Action::SaveProgram => RequestType::SaveProgram,
        Action::LoadProgram => RequestType::LoadProgram,
        Action::DeleteProgram => RequestType::DeleteProgram,
        Action::GeneratePublicLink => RequestType::GeneratePublicLink,
        Action::Complete => RequestType::Complete,
    }
}

/// Causes below `err`, outermost first; `err` itself when it has none.
fn error_chain(err: &DispatchError) -> String {
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    if causes.is_empty() {
        err.to_string()
    } else {
        causes.join("\ncaused by: ")
    }
}
