//! Database repositories.

mod poll;

pub use poll::{PollRepository, PollVoteRepository};
