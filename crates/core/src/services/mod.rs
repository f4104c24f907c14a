//! Business logic services.

#![allow(missing_docs)]

pub mod broadcast;
pub mod identity;
pub mod intake;
pub mod ledger;
pub mod poll;
pub mod room;

pub use broadcast::BroadcastDispatcher;
pub use identity::TokenVerifier;
pub use intake::{PushSession, RetryPolicy, VoteIntake};
pub use ledger::{PollLocks, PollSection, VoteLedger};
pub use poll::{CreatePollInput, PollService, UserPollStats};
pub use room::{Observer, ObserverId, PollSnapshot, RoomRegistry};
