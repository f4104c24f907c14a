//! Database entities.

#![allow(missing_docs)]

pub mod poll;
pub mod poll_vote;

pub use poll::Entity as Poll;
pub use poll_vote::Entity as PollVote;
