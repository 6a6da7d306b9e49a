//! lpfeed-session: one long-poll session per account.
//!
//! A session negotiates a server, polls it in a tight loop, and backs off on
//! any failure. Batches leave through an [`UpdateSink`]; nothing else does.

pub mod api;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod session;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use api::{LongpollApi, PollRequest};
pub use endpoint::{GroupEndpoint, LongpollEndpoint, UserEndpoint};
pub use error::{LongpollError, TransportError};
pub use http::{HttpLongpollApi, TokenSource};
pub use session::{
    GroupLongpoll, Longpoll, LongpollSessionFactory, PollSession, SessionFactory, SessionPhase,
    UpdateSink, UserLongpoll, create_session,
};
