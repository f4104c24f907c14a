//! Domain models.

#![allow(missing_docs)]

pub mod poll;

pub use poll::{Poll, PollOption, PollState, StoredPoll, VoteEntry, VoterId};
