//! Core business logic for livepoll.
//!
//! The poll aggregate lives in [`models`], persistence behind the
//! [`store::PollStore`] seam, and the vote pipeline in [`services`]:
//! intake, ledger, rooms and fan-out.

pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::VoteError;
pub use models::{Poll, PollOption, PollState, VoterId};
pub use services::*;
pub use store::{MemoryPollStore, PollQuery, PollStore, PollStoreService, SqlPollStore};
