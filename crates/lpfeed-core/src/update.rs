//! Typed update records and the batch that carries them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AccountId;

// ─── Records ──────────────────────────────────────────────────────

/// A new, edited or changed message.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAdded {
    pub message_id: i64,
    pub peer_id: i64,
    pub conversation_message_id: i64,
    /// Author; for outgoing messages this is the account itself.
    pub from_id: i64,
    pub timestamp: i64,
    pub text: String,
    pub is_out: bool,
    pub unread: bool,
    pub important: bool,
    pub deleted: bool,
    pub has_media: bool,
    pub random_id: Option<String>,
    pub edit_time: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forwarded: Vec<String>,
    pub reply: Option<String>,
    pub payload: Option<String>,
    pub source_act: Option<String>,
    pub source_mid: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionEventKind {
    /// The account added its own reaction.
    MineAdded,
    /// The account removed its own reaction.
    MineRemoved,
    /// Someone else's reaction changed the counters.
    CountersChanged,
}

impl ReactionEventKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::MineAdded),
            2 => Some(Self::MineRemoved),
            3 => Some(Self::CountersChanged),
            _ => None,
        }
    }

    pub fn touches_mine(self) -> bool {
        matches!(self, Self::MineAdded | Self::MineRemoved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    pub reaction_id: i64,
    pub count: i64,
}

/// Reaction counters of one message changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionChanged {
    pub kind: ReactionEventKind,
    pub peer_id: i64,
    pub conversation_message_id: i64,
    pub my_reaction: Option<i64>,
    pub my_reaction_changed: bool,
    pub reactions: Vec<ReactionCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    /// `true` when the mask was set, `false` when it was reset.
    pub set: bool,
    pub message_id: i64,
    pub mask: i64,
    pub peer_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadDirection {
    /// Incoming messages were read by the account.
    Input,
    /// Outgoing messages were read by the peer.
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesRead {
    pub direction: ReadDirection,
    pub peer_id: i64,
    pub local_id: i64,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    pub user_id: i64,
    pub online: bool,
    pub platform: Option<i64>,
    /// Offline only: went away by timeout rather than explicit logout.
    pub timed_out: bool,
    pub timestamp: i64,
    pub app_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Typing {
    pub peer_id: i64,
    pub from_ids: Vec<i64>,
    pub count: i64,
    pub voice: bool,
}

/// One typed update record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateRecord {
    MessageAdded(MessageAdded),
    ReactionChanged(ReactionChanged),
    MessageFlags(MessageFlags),
    MessagesRead(MessagesRead),
    UserPresence(UserPresence),
    Typing(Typing),
    BadgeCount { count: i64 },
}

impl UpdateRecord {
    pub fn as_message_added(&self) -> Option<&MessageAdded> {
        match self {
            Self::MessageAdded(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_reaction_changed(&self) -> Option<&ReactionChanged> {
        match self {
            Self::ReactionChanged(r) => Some(r),
            _ => None,
        }
    }
}

// ─── Batch ────────────────────────────────────────────────────────

/// Records returned by one successful poll, in server order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateBatch {
    pub account_id: AccountId,
    pub received_at: DateTime<Utc>,
    pub records: Vec<UpdateRecord>,
    /// Non-zero when the server rejected the cursor; such a batch never
    /// carries records and is never published.
    #[serde(default)]
    pub failed: u32,
}

impl UpdateBatch {
    pub fn new(account_id: AccountId, records: Vec<UpdateRecord>) -> Self {
        Self {
            account_id,
            received_at: Utc::now(),
            records,
            failed: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_failed(&self) -> bool {
        self.failed > 0
    }

    /// True iff the batch holds records and every one is a message addition.
    pub fn is_only_add_messages(&self) -> bool {
        !self.records.is_empty()
            && self
                .records
                .iter()
                .all(|r| matches!(r, UpdateRecord::MessageAdded(_)))
    }

    pub fn message_additions(&self) -> impl Iterator<Item = &MessageAdded> {
        self.records.iter().filter_map(UpdateRecord::as_message_added)
    }

    pub fn reaction_changes(&self) -> impl Iterator<Item = &ReactionChanged> {
        self.records.iter().filter_map(UpdateRecord::as_reaction_changed)
    }
}
