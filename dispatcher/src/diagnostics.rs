use tracing::{error, info};

use crate::errors::LogFormatError;

pub const UNKNOWN: &str = "unknown";

/// One unexpected failure, with enough context to reproduce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub message: String,
    pub stack_trace: Option<String>,
    pub request_type: String,
    pub origin_url: String,
    pub context: String,
}

impl ErrorReport {
    pub fn new(
        message: impl Into<String>,
        request_type: impl Into<String>,
        origin_url: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            stack_trace: None,
            request_type: request_type.into(),
            origin_url: origin_url.into(),
            context: context.into(),
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Builds a report from a client-side exception log in parsed form.
    pub fn from_client_fields(fields: &[String]) -> Result<Self, LogFormatError> {
        if fields.len() < CLIENT_REPORT_FIELDS {
            return Err(LogFormatError::TooFewFields {
                found: fields.len(),
                expected: CLIENT_REPORT_FIELDS,
            });
        }
        Ok(Self::new(&fields[2], &fields[1], UNKNOWN, &fields[4]).with_stack_trace(&fields[3]))
    }
}

pub trait Diagnostics: Send + Sync {
    fn log_info(&self, message: &str);
    fn report(&self, report: ErrorReport);
}

#[derive(Debug, Clone, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn log_info(&self, message: &str) {
        info!(target: "playground::diagnostics", "{message}");
    }

    fn report(&self, report: ErrorReport) {
        error!(
            target: "playground::diagnostics",
            request_type = %report.request_type,
            origin = %report.origin_url,
            stack_trace = report.stack_trace.as_deref().unwrap_or(""),
            context = %report.context,
            "{}",
            report.message
        );
    }
}

const CLIENT_REPORT_FIELDS: usize = 5;

const XML_REFS: [(&str, &str); 5] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
    ("&#39;", "'"),
    ("&quot;", "\""),
];

/// Replaces the five predefined XML entities in a single left-to-right pass.
pub fn unescape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    'scan: while let Some(index) = rest.find('&') {
        out.push_str(&rest[..index]);
        rest = &rest[index..];
        for (reference, replacement) in XML_REFS {
            if let Some(tail) = rest.strip_prefix(reference) {
                out.push_str(replacement);
                rest = tail;
                continue 'scan;
            }
        }
        out.push('&');
        rest = &rest[1..];
    }
    out.push_str(rest);
    out
}

/// Splits a client exception log into the values of its top-level
/// `<tag>value</tag>` elements, in document order. Text between elements is
/// ignored.
pub fn parse_exception(text: &str) -> Result<Vec<String>, LogFormatError> {
    let mut fields = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('<') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('>') else {
            break;
        };
        let tag = &after_open[..close];
        if tag.is_empty() || tag.starts_with('/') {
            rest = &after_open[close + 1..];
            continue;
        }
        let body = &after_open[close + 1..];
        let end_tag = format!("</{tag}>");
        let end = body
            .find(&end_tag)
            .ok_or_else(|| LogFormatError::Unterminated(tag.to_string()))?;
        fields.push(body[..end].to_string());
        rest = &body[end + end_tag.len()..];
    }
    if fields.len() < CLIENT_REPORT_FIELDS {
        return Err(LogFormatError::TooFewFields {
            found: fields.len(),
            expected: CLIENT_REPORT_FIELDS,
        });
    }
    Ok(fields)
}
