use serde_json::json;
use tracing::info;

use crate::diagnostics::{Diagnostics, ErrorReport, UNKNOWN};
use crate::session::SessionInfo;
use crate::transport::Exchange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    InternalServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::InternalServerError => 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub kind: ContentKind,
    pub body: String,
}

impl Reply {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            kind: ContentKind::Json,
            body: body.into(),
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            kind: ContentKind::Text,
            body: body.into(),
        }
    }

    pub fn error(status: Status, message: &str) -> Self {
        Self {
            status,
            kind: ContentKind::Json,
            body: error_json(message),
        }
    }
}

pub fn error_json(message: &str) -> String {
    json!([{ "exception": message, "type": "err" }]).to_string()
}

/// Writes `reply` once and records the audit line.
///
/// A failed write is reported to diagnostics and never retried; the channel
/// is assumed broken. The audit record is emitted either way, with
/// `delivered` telling the two cases apart.
pub fn write_reply(
    exchange: &mut dyn Exchange,
    session: &SessionInfo,
    diagnostics: &dyn Diagnostics,
    current_source: Option<&str>,
    reply: &Reply,
) -> bool {
    let request_line = exchange.request_line();
    let delivered = match exchange.write(reply) {
        Ok(()) => true,
        Err(err) => {
            diagnostics.report(ErrorReport::new(
                err.to_string(),
                session.request_type_label(),
                session.origin_url(),
                current_source.unwrap_or(UNKNOWN),
            ));
            false
        }
    };
    info!(
        target: "playground::audit",
        request_type = session.request_type_label(),
        session_id = %session.id(),
        elapsed_ms = session.elapsed_millis() as u64,
        status = reply.status.code(),
        delivered,
        request = %request_line,
        "ALL"
    );
    delivered
}
