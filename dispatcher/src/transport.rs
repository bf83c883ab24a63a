use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::TransportError;
use crate::response::Reply;

#[async_trait]
pub trait Exchange: Send {
    fn path(&self) -> &str;
    fn query(&self) -> Option<&str>;
    fn header(&self, name: &str) -> Option<&str>;
    async fn read_body(&mut self) -> Result<Bytes, TransportError>;
    fn write(&mut self, reply: &Reply) -> Result<(), TransportError>;

    /// Path plus query string, as logged in audit records.
    fn request_line(&self) -> String {
        match self.query() {
            Some(query) => format!("{}?{}", self.path(), query),
            None => self.path().to_string(),
        }
    }
}

/// An exchange whose body has already been received in full. The reply is
/// kept until the host takes it with [`BufferedExchange::take_reply`].
#[derive(Debug, Default)]
pub struct BufferedExchange {
    path: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<Result<Bytes, String>>,
    reply: Option<Reply>,
}

impl BufferedExchange {
    pub fn new(path: impl Into<String>, query: Option<String>) -> Self {
        Self {
            path: path.into(),
            query,
            body: Some(Ok(Bytes::new())),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(Ok(body.into()));
        self
    }

    /// Records that the host failed to receive the body.
    pub fn with_body_error(mut self, message: impl Into<String>) -> Self {
        self.body = Some(Err(message.into()));
        self
    }

    pub fn take_reply(&mut self) -> Option<Reply> {
        self.reply.take()
    }
}

#[async_trait]
impl Exchange for BufferedExchange {
    fn path(&self) -> &str {
        &self.path
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    async fn read_body(&mut self) -> Result<Bytes, TransportError> {
        match self.body.take() {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(message)) => Err(TransportError::Read(message)),
            None => Err(TransportError::BodyConsumed),
        }
    }

    fn write(&mut self, reply: &Reply) -> Result<(), TransportError> {
        if self.reply.is_some() {
            return Err(TransportError::Write(
                "response already committed".to_string(),
            ));
        }
        self.reply = Some(reply.clone());
        Ok(())
    }
}
