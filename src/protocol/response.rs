//! Protocol responses

use crate::protocol::request::{Fields, FIELD_TOKEN, FIELD_USERNAME};
use crate::types::{KnockError, Result};

pub const FIELD_STATUS: &str = "status";
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_CHALLENGE: &str = "challenge";

/// Outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Fail,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Fail => "fail",
        }
    }
}

/// Response to a protocol request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub message: Option<String>,
    pub challenge: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: Some(message.into()),
            challenge: None,
            token: None,
            username: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: Status::Fail,
            ..Self::ok(message)
        }
    }

    pub fn with_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.challenge = Some(challenge.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Turn a `fail` response into [`KnockError::Rejected`]
    pub fn into_result(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(KnockError::Rejected(
                self.message.unwrap_or_else(|| "Request failed".into()),
            ))
        }
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_STATUS.into(), self.status.as_str().into());

        let optional = [
            (FIELD_MESSAGE, &self.message),
            (FIELD_CHALLENGE, &self.challenge),
            (FIELD_TOKEN, &self.token),
            (FIELD_USERNAME, &self.username),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                fields.insert(name.into(), value.clone());
            }
        }

        fields
    }

    pub fn from_fields(fields: &Fields) -> Result<Self> {
        let status = match fields.get(FIELD_STATUS).map(|s| s.to_ascii_lowercase()) {
            Some(s) if s == "ok" => Status::Ok,
            Some(s) if s == "fail" => Status::Fail,
            _ => {
                return Err(KnockError::BadRequest(
                    "Response carries no valid status".into(),
                ))
            }
        };

        Ok(Self {
            status,
            message: fields.get(FIELD_MESSAGE).cloned(),
            challenge: fields.get(FIELD_CHALLENGE).cloned(),
            token: fields.get(FIELD_TOKEN).cloned(),
            username: fields.get(FIELD_USERNAME).cloned(),
        })
    }
}
