//! Command-id minting and validation.
//!
//! Ids are hyphenated UUIDs. The pattern is enforced on both sides of the
//! bridge before an id is ever embedded in a filesystem path, which closes
//! path traversal (a malicious `../` id never reaches a path) and response
//! spoofing (the host refuses to write a response for an unvalidated id).

use crate::errors::BridgeError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^[a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{12}$",
        )
        .expect("id pattern is valid")
    })
}

/// Check a raw string against the strict id token pattern.
pub fn is_valid_id(raw: &str) -> bool {
    id_pattern().is_match(raw)
}

/// A validated command identifier.
///
/// Construction goes through [`CommandId::mint`] or [`CommandId::parse`];
/// a value of this type always satisfies the token pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandId(String);

impl CommandId {
    /// Mint a fresh id (UUID v4, hyphenated).
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Validate a raw string as a command id.
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        if is_valid_id(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(BridgeError::InvalidId)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CommandId {
    type Error = BridgeError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<CommandId> for String {
    fn from(id: CommandId) -> Self {
        id.0
    }
}
