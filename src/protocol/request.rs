//! Protocol requests
//!
//! On the wire a request is a flat map of string fields. It is turned into
//! a closed [`Request`] enum at the boundary so handlers never touch
//! unchecked fields.

use std::collections::BTreeMap;

use crate::auth::validate_username;
use crate::types::{KnockError, Result};

/// Flat string-to-string mapping exchanged with the transport
pub type Fields = BTreeMap<String, String>;

pub const FIELD_TYPE: &str = "type";
pub const FIELD_USERNAME: &str = "username";
pub const FIELD_PUBLIC_KEY: &str = "publicKey";
pub const FIELD_SIGNED_CHALLENGE: &str = "signedChallenge";
pub const FIELD_TOKEN: &str = "token";

/// One variant per protocol operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Signup {
        username: String,
        /// Base64 SubjectPublicKeyInfo DER
        public_key: String,
    },
    Challenge {
        username: String,
    },
    Login {
        username: String,
        /// Base64 DER signature over the challenge text
        signed_challenge: String,
    },
    Logout {
        token: String,
    },
    GetProfile {
        token: String,
    },
}

impl Request {
    /// Wire name of the operation
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Signup { .. } => "signup",
            Self::Challenge { .. } => "challenge",
            Self::Login { .. } => "login",
            Self::Logout { .. } => "logout",
            Self::GetProfile { .. } => "getprofile",
        }
    }

    /// Validate a flat field map into a typed request.
    ///
    /// The operation name is matched case-insensitively.
    pub fn from_fields(fields: &Fields) -> Result<Self> {
        let kind = fields
            .get(FIELD_TYPE)
            .ok_or_else(|| KnockError::BadRequest("Missing request type".into()))?;

        let request = match kind.to_ascii_lowercase().as_str() {
            "signup" => Self::Signup {
                username: username(fields)?,
                public_key: required(fields, FIELD_PUBLIC_KEY)?,
            },
            "challenge" => Self::Challenge {
                username: username(fields)?,
            },
            "login" => Self::Login {
                username: username(fields)?,
                signed_challenge: required(fields, FIELD_SIGNED_CHALLENGE)?,
            },
            "logout" => Self::Logout {
                token: required(fields, FIELD_TOKEN)?,
            },
            "getprofile" => Self::GetProfile {
                token: required(fields, FIELD_TOKEN)?,
            },
            _ => return Err(KnockError::BadRequest("Unknown request type".into())),
        };

        Ok(request)
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_TYPE.into(), self.kind().into());

        match self {
            Self::Signup {
                username,
                public_key,
            } => {
                fields.insert(FIELD_USERNAME.into(), username.clone());
                fields.insert(FIELD_PUBLIC_KEY.into(), public_key.clone());
            }
            Self::Challenge { username } => {
                fields.insert(FIELD_USERNAME.into(), username.clone());
            }
            Self::Login {
                username,
                signed_challenge,
            } => {
                fields.insert(FIELD_USERNAME.into(), username.clone());
                fields.insert(FIELD_SIGNED_CHALLENGE.into(), signed_challenge.clone());
            }
            Self::Logout { token } | Self::GetProfile { token } => {
                fields.insert(FIELD_TOKEN.into(), token.clone());
            }
        }

        fields
    }
}

fn required(fields: &Fields, name: &str) -> Result<String> {
    match fields.get(name) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(KnockError::BadRequest(format!("Missing field: {name}"))),
    }
}

fn username(fields: &Fields) -> Result<String> {
    let username = required(fields, FIELD_USERNAME)?;
    validate_username(&username)?;
    Ok(username)
}
