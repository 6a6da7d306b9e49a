use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WireError;

// ─── Account ──────────────────────────────────────────────────────

/// Kind of account a long-poll session runs for.
///
/// The sign of the raw account id carries the kind: positive ids are user
/// accounts, negative ids are community (group) accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    User,
    Group,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl AccountId {
    pub fn kind(self) -> AccountKind {
        if self.0 < 0 {
            AccountKind::Group
        } else {
            AccountKind::User
        }
    }

    /// Absolute id, as expected by community endpoints (`group_id=`).
    pub fn unsigned(self) -> u64 {
        self.0.unsigned_abs()
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for AccountId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| WireError::Malformed(format!("invalid account id {s:?}: {e}")))
    }
}

// ─── Peers ────────────────────────────────────────────────────────

/// Peer ids above this value address multi-user chats.
pub const CHAT_PEER_OFFSET: i64 = 2_000_000_000;

/// Peer ids below the negated value address contact chats.
pub const CONTACT_PEER_OFFSET: i64 = -2_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerKind {
    Dialog,
    GroupChat,
    ContactChat,
}

impl PeerKind {
    pub fn of(peer_id: i64) -> Self {
        if peer_id > CHAT_PEER_OFFSET {
            Self::GroupChat
        } else if peer_id < CONTACT_PEER_OFFSET {
            Self::ContactChat
        } else {
            Self::Dialog
        }
    }
}

// ─── Cursor ───────────────────────────────────────────────────────

/// Opaque server-issued position in the update stream.
///
/// User servers hand out integer timestamps, community servers hand out
/// string tokens. Both are echoed back verbatim as the `ts` query value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    Numeric(i64),
    Token(String),
}

impl Cursor {
    pub fn as_query_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Token(t) => f.write_str(t),
        }
    }
}

impl From<i64> for Cursor {
    fn from(n: i64) -> Self {
        Self::Numeric(n)
    }
}

impl From<&str> for Cursor {
    fn from(t: &str) -> Self {
        Self::Token(t.to_owned())
    }
}

// ─── Server Descriptor ────────────────────────────────────────────

/// Host, secret key and cursor of a long-poll server.
///
/// The three fields only make sense together, so they travel as one value;
/// a session either holds a complete descriptor or none at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    #[serde(rename = "server")]
    pub host: String,
    pub key: String,
    #[serde(rename = "ts")]
    pub cursor: Cursor,
}

impl ServerDescriptor {
    pub fn new(host: impl Into<String>, key: impl Into<String>, cursor: impl Into<Cursor>) -> Self {
        Self {
            host: host.into(),
            key: key.into(),
            cursor: cursor.into(),
        }
    }

    /// A descriptor with an empty host or key cannot be polled and must be
    /// re-fetched.
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && !self.key.is_empty()
    }

    /// Same server, advanced cursor.
    pub fn with_cursor(&self, cursor: Cursor) -> Self {
        Self {
            host: self.host.clone(),
            key: self.key.clone(),
            cursor,
        }
    }
}
