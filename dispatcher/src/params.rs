use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Run,
    LoadExample,
    Highlight,
    WriteLog,
    ConvertToKotlin,
    SaveProgram,
    LoadProgram,
    DeleteProgram,
    GeneratePublicLink,
    Complete,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::Run,
        Action::LoadExample,
        Action::Highlight,
        Action::WriteLog,
        Action::ConvertToKotlin,
        Action::SaveProgram,
        Action::LoadProgram,
        Action::DeleteProgram,
        Action::GeneratePublicLink,
        Action::Complete,
    ];

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.token() == token)
    }

    pub fn token(self) -> &'static str {
        match self {
            Action::Run => "run",
            Action::LoadExample => "loadExample",
            Action::Highlight => "highlight",
            Action::WriteLog => "writeLog",
            Action::ConvertToKotlin => "convertToKotlin",
            Action::SaveProgram => "saveProgram",
            Action::LoadProgram => "loadProgram",
            Action::DeleteProgram => "deleteProgram",
            Action::GeneratePublicLink => "generatePublicLink",
            Action::Complete => "complete",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParameters {
    action_token: String,
    args: String,
}

impl RequestParameters {
    pub fn new(action_token: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            action_token: action_token.into(),
            args: args.into(),
        }
    }

    /// Splits `type=<action>&args=<rest>`. Everything after the first `args=`
    /// is the argument string, `&` included.
    pub fn parse(query: Option<&str>) -> Self {
        let query = query.unwrap_or_default();
        let args_start = if query.starts_with("args=") {
            Some(0)
        } else {
            query.find("&args=").map(|index| index + 1)
        };
        let (head, args) = match args_start {
            Some(index) => (&query[..index], &query[index + "args=".len()..]),
            None => (query, ""),
        };
        let action_token = head
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .filter(|(key, _)| *key == "type")
            .map(|(_, value)| lenient_decode(value))
            .last()
            .unwrap_or_default();
        Self {
            action_token,
            args: lenient_decode(args),
        }
    }

    pub fn compare_type(&self, token: &str) -> bool {
        self.action_token == token
    }

    pub fn action_token(&self) -> &str {
        &self.action_token
    }

    /// `None` for tokens that name no known action.
    pub fn action(&self) -> Option<Action> {
        Action::from_token(&self.action_token)
    }

    pub fn args(&self) -> &str {
        &self.args
    }
}

fn lenient_decode(value: &str) -> String {
    let value = value.replace('+', " ");
    urlencoding::decode(&value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(value)
}

pub fn substring_before<'a>(value: &'a str, delimiter: &str) -> &'a str {
    value
        .find(delimiter)
        .map_or(value, |index| &value[..index])
}

pub fn substring_after<'a>(value: &'a str, delimiter: &str) -> &'a str {
    value
        .find(delimiter)
        .map_or("", |index| &value[index + delimiter.len()..])
}

pub fn program_id_from_args(args: &str) -> &str {
    match args.split_once('=') {
        Some((_, id)) => id.trim(),
        None => args.trim(),
    }
}
