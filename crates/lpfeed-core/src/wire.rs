//! Wire decoding for both long-poll server variants.
//!
//! Decoding is lenient per record: one unknown or truncated event is
//! dropped, never fails the whole response. Only a broken envelope (not
//! JSON, or neither `ts` nor `failed` present) is an error.

use serde::Deserialize;
use serde_json::Value;

use crate::error::WireError;
use crate::types::{Cursor, PeerKind};
use crate::update::{
    MessageAdded, MessageFlags, MessagesRead, ReactionChanged, ReactionCount, ReactionEventKind,
    ReadDirection, Typing, UpdateRecord, UserPresence,
};

// ─── Action Codes (user variant) ──────────────────────────────────

pub const ACTION_FLAGS_SET: i64 = 2;
pub const ACTION_FLAGS_RESET: i64 = 3;
pub const ACTION_MESSAGE_ADDED: i64 = 4;
pub const ACTION_MESSAGE_EDITED: i64 = 5;
pub const ACTION_INPUT_READ: i64 = 6;
pub const ACTION_OUTPUT_READ: i64 = 7;
pub const ACTION_USER_ONLINE: i64 = 8;
pub const ACTION_USER_OFFLINE: i64 = 9;
pub const ACTION_MESSAGE_CHANGED: i64 = 18;
pub const ACTION_TYPING_TEXT: i64 = 63;
pub const ACTION_TYPING_VOICE: i64 = 64;
pub const ACTION_UNREAD_COUNTER: i64 = 80;
pub const ACTION_REACTION_CHANGED: i64 = 601;

// Message flag bits.
const FLAG_UNREAD: i64 = 1;
const FLAG_OUTBOX: i64 = 2;
const FLAG_IMPORTANT: i64 = 8;
const FLAG_DELETED: i64 = 128;

// ─── Envelopes ────────────────────────────────────────────────────

/// Raw long-poll response before record decoding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateResponse {
    #[serde(default, rename = "ts")]
    pub cursor: Option<Cursor>,
    #[serde(default)]
    pub updates: Vec<Value>,
    #[serde(default)]
    pub failed: u32,
}

impl UpdateResponse {
    pub fn from_slice(body: &[u8]) -> Result<Self, WireError> {
        let response: Self = serde_json::from_slice(body)?;
        response.validated()
    }

    pub fn from_value(value: Value) -> Result<Self, WireError> {
        let response: Self = serde_json::from_value(value)?;
        response.validated()
    }

    fn validated(self) -> Result<Self, WireError> {
        if self.failed == 0 && self.cursor.is_none() {
            return Err(WireError::Malformed(
                "response carries neither ts nor failed".to_owned(),
            ));
        }
        Ok(self)
    }

    /// Cursor to adopt after a successful response.
    pub fn next_cursor(&self) -> Option<&Cursor> {
        if self.failed > 0 {
            None
        } else {
            self.cursor.as_ref()
        }
    }
}

/// REST envelope: either `{"response": ..}` or `{"error": ..}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub response: Option<T>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

impl ApiErrorBody {
    /// Invalid or expired token, or a token lacking access.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.error_code, 5 | 27 | 28)
    }
}

// ─── Array helpers ────────────────────────────────────────────────

fn opt_i64(array: &[Value], index: usize) -> i64 {
    array.get(index).map(value_as_i64).unwrap_or(0)
}

fn value_as_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn opt_string(array: &[Value], index: usize) -> Option<String> {
    match array.get(index)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_i64(object: &Value, key: &str) -> i64 {
    object.get(key).map(value_as_i64).unwrap_or(0)
}

fn field_string(object: &Value, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn has_flag(flags: i64, flag: i64) -> bool {
    flags & flag != 0
}

/// Undo the HTML escaping the user server applies to message text.
pub fn unescape_text(text: &str) -> String {
    text.replace("<br>", "\n")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

// ─── User variant ─────────────────────────────────────────────────

/// Decode one user-server event array. Returns `None` for unknown actions
/// and for records missing their identifying fields.
pub fn parse_user_update(event: &Value) -> Option<UpdateRecord> {
    let array = event.as_array()?;
    let action = array.first().map(value_as_i64)?;
    match action {
        ACTION_MESSAGE_ADDED | ACTION_MESSAGE_EDITED | ACTION_MESSAGE_CHANGED => {
            parse_message_array(array).map(UpdateRecord::MessageAdded)
        }
        ACTION_REACTION_CHANGED => parse_reaction_array(array).map(UpdateRecord::ReactionChanged),
        ACTION_TYPING_TEXT | ACTION_TYPING_VOICE => {
            let from_ids = array
                .get(2)
                .and_then(Value::as_array)
                .map(|ids| ids.iter().map(value_as_i64).collect())
                .unwrap_or_default();
            Some(UpdateRecord::Typing(Typing {
                peer_id: opt_i64(array, 1),
                from_ids,
                count: opt_i64(array, 3),
                voice: action == ACTION_TYPING_VOICE,
            }))
        }
        ACTION_USER_ONLINE => Some(UpdateRecord::UserPresence(UserPresence {
            user_id: opt_i64(array, 1).checked_neg()?,
            online: true,
            platform: Some(opt_i64(array, 2)),
            timed_out: false,
            timestamp: opt_i64(array, 3),
            app_id: opt_i64(array, 4),
        })),
        ACTION_USER_OFFLINE => Some(UpdateRecord::UserPresence(UserPresence {
            user_id: opt_i64(array, 1).checked_neg()?,
            online: false,
            platform: None,
            timed_out: opt_i64(array, 2) != 0,
            timestamp: opt_i64(array, 3),
            app_id: opt_i64(array, 4),
        })),
        ACTION_FLAGS_SET | ACTION_FLAGS_RESET => {
            let flags = MessageFlags {
                set: action == ACTION_FLAGS_SET,
                message_id: opt_i64(array, 1),
                mask: opt_i64(array, 2),
                peer_id: opt_i64(array, 3),
            };
            (flags.peer_id != 0 && flags.message_id != 0)
                .then_some(UpdateRecord::MessageFlags(flags))
        }
        ACTION_UNREAD_COUNTER => Some(UpdateRecord::BadgeCount {
            count: opt_i64(array, 1),
        }),
        ACTION_INPUT_READ | ACTION_OUTPUT_READ => {
            let read = MessagesRead {
                direction: if action == ACTION_INPUT_READ {
                    ReadDirection::Input
                } else {
                    ReadDirection::Output
                },
                peer_id: opt_i64(array, 1),
                local_id: opt_i64(array, 2),
                unread_count: opt_i64(array, 3),
            };
            (read.peer_id != 0).then_some(UpdateRecord::MessagesRead(read))
        }
        _ => None,
    }
}

fn parse_message_array(array: &[Value]) -> Option<MessageAdded> {
    let flags = opt_i64(array, 2);
    let mut message = MessageAdded {
        message_id: opt_i64(array, 1),
        peer_id: opt_i64(array, 3),
        timestamp: opt_i64(array, 4),
        text: unescape_text(&opt_string(array, 5).unwrap_or_default()),
        is_out: has_flag(flags, FLAG_OUTBOX),
        unread: has_flag(flags, FLAG_UNREAD),
        important: has_flag(flags, FLAG_IMPORTANT),
        deleted: has_flag(flags, FLAG_DELETED),
        random_id: opt_string(array, 8),
        conversation_message_id: opt_i64(array, 9),
        edit_time: opt_i64(array, 10),
        ..Default::default()
    };

    if let Some(extra) = array.get(6).filter(|v| v.is_object()) {
        message.from_id = field_i64(extra, "from");
        message.source_act = field_string(extra, "source_act");
        message.source_mid = extra.get("source_mid").map(value_as_i64);
        message.payload = field_string(extra, "payload");
    }

    if let Some(attachments) = array.get(7).filter(|v| v.is_object()) {
        message.has_media = attachments.get("attach1_type").is_some();
        if let Some(fwd) = field_string(attachments, "fwd") {
            message.forwarded = fwd.split(',').map(str::to_owned).collect();
        }
        message.reply = field_string(attachments, "reply");
    }

    if message.from_id == 0 && PeerKind::of(message.peer_id) == PeerKind::Dialog && !message.is_out
    {
        message.from_id = message.peer_id;
    }

    (message.message_id != 0).then_some(message)
}

fn parse_reaction_array(array: &[Value]) -> Option<ReactionChanged> {
    let kind = ReactionEventKind::from_code(opt_i64(array, 1))?;
    let peer_id = opt_i64(array, 2);
    let conversation_message_id = opt_i64(array, 3);

    let (my_reaction, count_index) = if kind == ReactionEventKind::MineAdded {
        (Some(opt_i64(array, 4)), 5)
    } else {
        (None, 4)
    };

    // Each reaction block is `[block_len, reaction_id, count, ..]`.
    let declared = usize::try_from(opt_i64(array, count_index)).unwrap_or(0);
    let mut offset = count_index + 1;
    let mut reactions = Vec::with_capacity(declared.min(16));
    for _ in 0..declared {
        if offset >= array.len() {
            break;
        }
        reactions.push(ReactionCount {
            reaction_id: opt_i64(array, offset + 1),
            count: opt_i64(array, offset + 2),
        });
        let block_len = usize::try_from(opt_i64(array, offset)).unwrap_or(0);
        offset = offset.saturating_add(block_len).saturating_add(1);
    }

    Some(ReactionChanged {
        kind,
        peer_id,
        conversation_message_id,
        my_reaction,
        my_reaction_changed: kind.touches_mine(),
        reactions,
    })
}

// ─── Group variant ────────────────────────────────────────────────

/// Decode one community-server event object.
pub fn parse_group_update(event: &Value) -> Option<UpdateRecord> {
    let kind = event.get("type")?.as_str()?;
    let object = event.get("object")?;
    match kind {
        "message_new" => {
            // Newer protocol versions wrap the message next to `client_info`.
            let message = object.get("message").unwrap_or(object);
            parse_group_message(message).map(UpdateRecord::MessageAdded)
        }
        "message_reply" | "message_edit" => {
            parse_group_message(object).map(UpdateRecord::MessageAdded)
        }
        "message_typing_state" => Some(UpdateRecord::Typing(Typing {
            peer_id: field_i64(object, "from_id"),
            from_ids: vec![field_i64(object, "from_id")],
            count: 1,
            voice: object.get("state").and_then(Value::as_str) == Some("audiomessage"),
        })),
        _ => None,
    }
}

fn parse_group_message(message: &Value) -> Option<MessageAdded> {
    let parsed = MessageAdded {
        message_id: field_i64(message, "id"),
        peer_id: field_i64(message, "peer_id"),
        conversation_message_id: field_i64(message, "conversation_message_id"),
        from_id: field_i64(message, "from_id"),
        timestamp: field_i64(message, "date"),
        text: message
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        is_out: field_i64(message, "out") != 0,
        unread: false,
        important: message
            .get("important")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        deleted: false,
        has_media: message
            .get("attachments")
            .and_then(Value::as_array)
            .is_some_and(|a| !a.is_empty()),
        random_id: field_string(message, "random_id"),
        edit_time: field_i64(message, "update_time"),
        forwarded: message
            .get("fwd_messages")
            .and_then(Value::as_array)
            .map(|fwd| {
                fwd.iter()
                    .map(|m| field_i64(m, "id").to_string())
                    .collect()
            })
            .unwrap_or_default(),
        reply: message
            .get("reply_message")
            .map(|r| field_i64(r, "id").to_string()),
        payload: field_string(message, "payload"),
        source_act: None,
        source_mid: None,
    };
    (parsed.message_id != 0 || parsed.conversation_message_id != 0).then_some(parsed)
}
