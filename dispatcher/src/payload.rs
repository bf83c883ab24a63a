use std::collections::HashMap;

use crate::errors::DecodeError;

pub const DEFAULT_PROGRAM: &str = "fun main(args : Array<String>) {  println(\"Hello, world!\")\n}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostData {
    pub text: String,
    pub arguments: Option<String>,
    pub example: Option<String>,
    pub example_folder: Option<String>,
    substituted: bool,
}

impl Default for PostData {
    fn default() -> Self {
        Self {
            text: DEFAULT_PROGRAM.to_string(),
            arguments: None,
            example: None,
            example_folder: None,
            substituted: false,
        }
    }
}

impl PostData {
    pub fn substitute() -> Self {
        Self {
            text: String::new(),
            arguments: None,
            example: None,
            example_folder: None,
            substituted: true,
        }
    }

    /// True when this payload replaced a body that failed to decode.
    pub fn is_substitute(&self) -> bool {
        self.substituted
    }
}

/// Turns raw body bytes into the text that is fed to [`decode`].
///
/// Without `preserve_newlines` line breaks are dropped and lines are joined
/// back to back.
pub fn read_body_text(raw: &[u8], preserve_newlines: bool) -> String {
    let text = String::from_utf8_lossy(raw);
    if preserve_newlines {
        text.into_owned()
    } else {
        text.lines().collect()
    }
}

pub fn decode(raw_body: &[u8], preserve_newlines: bool) -> Result<PostData, DecodeError> {
    let body = read_body_text(raw_body, preserve_newlines);
    check_escapes(&body)?;

    let mut fields = HashMap::new();
    // Split before decoding so an encoded `&` stays inside its value.
    for token in body.split('&') {
        let (key, value) = token.split_once('=').unwrap_or((token, ""));
        fields.insert(decode_component(key)?, decode_component(value)?);
    }

    let mut out = PostData::default();
    if let Some(text) = fields.remove("text") {
        out.text = text;
    }
    out.arguments = fields.remove("consoleArgs");
    out.example_folder = fields.remove("example");
    out.example = fields.remove("name");
    Ok(out)
}

/// Strict form decoding: `+` is a space and every `%` must start a two digit
/// hex escape.
pub fn decode_url(value: &str) -> Result<String, DecodeError> {
    check_escapes(value)?;
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| DecodeError::InvalidUtf8)
}

fn decode_component(value: &str) -> Result<String, DecodeError> {
    Ok(decode_url(value)?.replace("<br>", "\n"))
}

fn check_escapes(value: &str) -> Result<(), DecodeError> {
    let bytes = value.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let valid = bytes
                .get(index + 1..index + 3)
                .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(DecodeError::MalformedEscape(index));
            }
            index += 3;
        } else {
            index += 1;
        }
    }
    Ok(())
}
