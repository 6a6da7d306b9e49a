//! lpfeed-core: pure data model for the long-poll update feed.
//! Account and cursor types, typed update records, wire decoding for both
//! server variants, batch deduplication and configuration. No async, no
//! network.

pub mod config;
pub mod dedup;
pub mod error;
pub mod normalize;
pub mod types;
pub mod update;
pub mod wire;

pub use config::FeedConfig;
pub use dedup::dedup_batch;
pub use error::{ConfigError, WireError};
pub use types::{AccountId, AccountKind, Cursor, PeerKind, ServerDescriptor};
pub use update::{MessageAdded, ReactionChanged, UpdateBatch, UpdateRecord};
pub use wire::UpdateResponse;
