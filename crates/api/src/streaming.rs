//! WebSocket streaming API.
//!
//! Each connection owns a [`PushSession`]. Room snapshots arrive on the
//! session's queue, `pollCreated` announcements on a process-wide broadcast
//! channel, and client messages on the socket; one `select!` loop drives all
//! three so writes to the socket never interleave.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use livepoll_core::{Poll, PushSession, VoteError, VoteIntake};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::middleware::AppState;

/// Streaming query parameters.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Bearer token bound to the connection at upgrade time.
    pub token: Option<String>,
}

/// Client-to-server message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Bind an identity to the connection.
    Authenticate { token: String },
    /// Join a poll's room.
    #[serde(rename_all = "camelCase")]
    JoinPoll { poll_id: String },
    /// Leave a poll's room.
    #[serde(rename_all = "camelCase")]
    LeavePoll { poll_id: String },
    /// Cast a vote. Success is observed through the room broadcast.
    #[serde(rename_all = "camelCase")]
    SubmitVote {
        poll_id: String,
        option_id: String,
        #[serde(default)]
        voter_id: Option<String>,
    },
}

/// Server-to-client message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ServerMessage<'a> {
    /// Identity bound.
    #[serde(rename_all = "camelCase")]
    Authenticated { user_id: String },
    /// Poll snapshot, either a catch-up or a room broadcast.
    PollData(&'a Poll),
    /// A poll was created somewhere.
    #[serde(rename_all = "camelCase")]
    PollCreated { poll_id: String },
    /// A request from this connection failed.
    #[serde(rename_all = "camelCase")]
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        poll_id: Option<String>,
    },
}

impl ServerMessage<'_> {
    fn vote_error(err: &VoteError, poll_id: Option<&str>) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            poll_id: poll_id.map(ToString::to_string),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::Error {
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
            poll_id: None,
        }
    }
}

/// Announcement that a poll was created.
#[derive(Debug, Clone)]
pub struct PollCreatedEvent {
    pub poll_id: String,
}

/// Shared state for streaming.
#[derive(Clone)]
pub struct StreamingState {
    /// Broadcast sender for poll creation announcements.
    pub poll_created_tx: Arc<broadcast::Sender<PollCreatedEvent>>,
}

impl StreamingState {
    /// Create a new streaming state.
    #[must_use]
    pub fn new() -> Self {
        let (poll_created_tx, _) = broadcast::channel(1000);
        Self {
            poll_created_tx: Arc::new(poll_created_tx),
        }
    }

    /// Announce a new poll to every connection.
    pub fn publish_poll_created(&self, poll_id: &str) {
        // No receivers just means nobody is connected.
        let _ = self.poll_created_tx.send(PollCreatedEvent {
            poll_id: poll_id.to_string(),
        });
    }
}

impl Default for StreamingState {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket handler for streaming.
pub async fn streaming_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    debug!("New streaming connection");

    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

type Sender = SplitSink<WebSocket, Message>;

async fn send_message(sender: &mut Sender, msg: &ServerMessage<'_>) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize server message");
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, query: StreamQuery, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let intake = state.intake.clone();
    let (mut session, mut snapshots) = intake.open_session();

    if let Some(token) = &query.token {
        let reply = authenticate(&intake, &mut session, token);
        if !send_message(&mut sender, &reply).await {
            return;
        }
    }

    info!(
        observer = %session.observer_id(),
        voter_id = ?session.voter(),
        "Streaming connection established"
    );

    let mut created_rx = state.streaming.poll_created_tx.subscribe();

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(client_msg) => {
                                handle_client_message(&intake, &mut session, client_msg).await
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to parse client message");
                                Some(ServerMessage::bad_request(format!("Invalid message: {e}")))
                            }
                        };
                        if let Some(reply) = reply
                            && !send_message(&mut sender, &reply).await
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            // Room snapshots for this connection
            Some(snapshot) = snapshots.recv() => {
                if !send_message(&mut sender, &ServerMessage::PollData(snapshot.as_ref())).await {
                    break;
                }
            }

            // Poll creation announcements
            event = created_rx.recv() => {
                match event {
                    Ok(event) => {
                        let msg = ServerMessage::PollCreated { poll_id: event.poll_id };
                        if !send_message(&mut sender, &msg).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Streaming connection lagged behind poll announcements");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!(observer = %session.observer_id(), "Streaming connection closed");
    // Dropping the session removes it from every room.
    drop(session);
}

fn authenticate(
    intake: &VoteIntake,
    session: &mut PushSession,
    token: &str,
) -> ServerMessage<'static> {
    match intake.authenticate(session, token) {
        Ok(voter) => ServerMessage::Authenticated {
            user_id: voter.to_string(),
        },
        Err(e) => {
            warn!(observer = %session.observer_id(), "Streaming authentication failed");
            ServerMessage::vote_error(&e, None)
        }
    }
}

/// Handle a client message. Returns the direct reply, if any.
async fn handle_client_message(
    intake: &VoteIntake,
    session: &mut PushSession,
    msg: ClientMessage,
) -> Option<ServerMessage<'static>> {
    match msg {
        ClientMessage::Authenticate { token } => Some(authenticate(intake, session, &token)),
        ClientMessage::JoinPoll { poll_id } => match intake.join(session, &poll_id).await {
            Ok(_) => None,
            Err(e) => Some(ServerMessage::vote_error(&e, Some(&poll_id))),
        },
        ClientMessage::LeavePoll { poll_id } => {
            intake.leave(session, &poll_id);
            None
        }
        ClientMessage::SubmitVote {
            poll_id,
            option_id,
            voter_id,
        } => match intake
            .submit(session, &poll_id, &option_id, voter_id.as_deref())
            .await
        {
            Ok(_) => None,
            Err(e) => {
                debug!(poll_id = %poll_id, code = e.code(), "Push vote rejected");
                Some(ServerMessage::vote_error(&e, Some(&poll_id)))
            }
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use livepoll_core::{
        MemoryPollStore, PollStore, RetryPolicy, RoomRegistry, TokenVerifier, VoteLedger, VoterId,
    };
    use serde_json::json;
    use std::time::Duration;

    fn sample_poll() -> Poll {
        Poll::new(
            "p1".to_string(),
            "Lunch?".to_string(),
            None,
            "alice".to_string(),
            vec![
                ("a".to_string(), "Pizza".to_string()),
                ("b".to_string(), "Tacos".to_string()),
            ],
            None,
            chrono::Utc::now(),
        )
    }

    async fn intake() -> VoteIntake {
        let store = Arc::new(MemoryPollStore::new());
        store.insert(&sample_poll()).await.unwrap();
        let ledger = VoteLedger::new(store, RoomRegistry::new(), Duration::from_secs(5));
        VoteIntake::new(ledger, TokenVerifier::new("stream-secret"), RetryPolicy::none())
    }

    fn token(intake: &VoteIntake, user: &str) -> String {
        intake
            .verifier()
            .issue(user, Duration::from_secs(60))
            .unwrap()
    }

    fn submit(option_id: &str, voter_id: Option<&str>) -> ClientMessage {
        ClientMessage::SubmitVote {
            poll_id: "p1".to_string(),
            option_id: option_id.to_string(),
            voter_id: voter_id.map(ToString::to_string),
        }
    }

    fn join(poll_id: &str) -> ClientMessage {
        ClientMessage::JoinPoll {
            poll_id: poll_id.to_string(),
        }
    }

    async fn tally(intake: &VoteIntake) -> u32 {
        intake
            .ledger()
            .store()
            .load("p1")
            .await
            .unwrap()
            .unwrap()
            .total_votes()
    }

    #[test]
    fn test_parse_client_messages() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"joinPoll","body":{"pollId":"p1"}}"#).unwrap();
        assert!(matches!(msg, ClientMessage::JoinPoll { poll_id } if poll_id == "p1"));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"submitVote","body":{"pollId":"p1","optionId":"a"}}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::SubmitVote { voter_id: None, .. }
        ));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"submitVote","body":{"pollId":"p1","optionId":"a","voterId":"x"}}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::SubmitVote { voter_id: Some(v), .. } if v == "x"
        ));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"authenticate","body":{"token":"t"}}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Authenticate { token } if token == "t"));
    }

    #[test]
    fn test_unknown_client_message_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"createPoll","body":{}}"#).is_err());
    }

    #[test]
    fn test_serialize_server_messages() {
        let msg = ServerMessage::PollCreated {
            poll_id: "p1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "type": "pollCreated", "body": { "pollId": "p1" } })
        );

        let msg = ServerMessage::vote_error(&VoteError::AlreadyVoted("p1".into()), Some("p1"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["body"]["code"], "ALREADY_VOTED");
        assert_eq!(value["body"]["pollId"], "p1");

        let msg = ServerMessage::vote_error(&VoteError::Unauthenticated, None);
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value["body"].get("pollId").is_none());
    }

    #[test]
    fn test_poll_data_carries_snapshot() {
        let poll = sample_poll();

        let value = serde_json::to_value(ServerMessage::PollData(&poll)).unwrap();
        assert_eq!(value["type"], "pollData");
        assert_eq!(value["body"]["id"], "p1");
        assert_eq!(value["body"]["options"][0]["voteCount"], 0);
    }

    #[tokio::test]
    async fn test_poll_created_reaches_subscribers() {
        let streaming = StreamingState::new();
        let mut rx = streaming.poll_created_tx.subscribe();

        streaming.publish_poll_created("p9");

        assert_eq!(rx.recv().await.unwrap().poll_id, "p9");
    }

    #[tokio::test]
    async fn test_authenticate_message_replies_with_identity() {
        let intake = intake().await;
        let (mut session, _rx) = intake.open_session();

        let msg = ClientMessage::Authenticate {
            token: token(&intake, "bob"),
        };
        let reply = handle_client_message(&intake, &mut session, msg).await.unwrap();

        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({ "type": "authenticated", "body": { "userId": "bob" } })
        );
        assert_eq!(session.voter(), Some(&VoterId::new("bob")));
    }

    #[tokio::test]
    async fn test_accepted_vote_has_no_direct_reply() {
        let intake = intake().await;
        let (mut session, mut rx) = intake.open_session();
        intake.authenticate(&mut session, &token(&intake, "bob")).unwrap();

        assert!(handle_client_message(&intake, &mut session, join("p1")).await.is_none());
        let catch_up = rx.try_recv().unwrap();
        assert_eq!(catch_up.total_votes(), 0);

        assert!(
            handle_client_message(&intake, &mut session, submit("a", None))
                .await
                .is_none()
        );

        // The result arrives through the room like for any other member.
        let snapshot = rx.try_recv().unwrap();
        assert_eq!(snapshot.total_votes(), 1);
        assert_eq!(snapshot.voters(), &[VoterId::new("bob")]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_vote_errors_only_to_invoker() {
        let intake = intake().await;
        let (mut bob, mut bob_rx) = intake.open_session();
        let (mut carol, mut carol_rx) = intake.open_session();
        intake.authenticate(&mut bob, &token(&intake, "bob")).unwrap();
        intake.authenticate(&mut carol, &token(&intake, "carol")).unwrap();
        handle_client_message(&intake, &mut bob, join("p1")).await;
        handle_client_message(&intake, &mut carol, join("p1")).await;

        assert!(handle_client_message(&intake, &mut bob, submit("a", None)).await.is_none());
        let reply = handle_client_message(&intake, &mut bob, submit("b", None))
            .await
            .unwrap();

        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["body"]["code"], "ALREADY_VOTED");
        assert_eq!(value["body"]["pollId"], "p1");

        // Catch-up plus the single accepted vote, nothing for the rejection.
        for rx in [&mut bob_rx, &mut carol_rx] {
            assert_eq!(rx.try_recv().unwrap().total_votes(), 0);
            assert_eq!(rx.try_recv().unwrap().total_votes(), 1);
            assert!(rx.try_recv().is_err());
        }
        assert_eq!(tally(&intake).await, 1);
    }

    #[tokio::test]
    async fn test_join_unknown_poll_is_silent() {
        let intake = intake().await;
        let (mut session, mut rx) = intake.open_session();

        let reply = handle_client_message(&intake, &mut session, join("nope")).await;

        assert!(reply.is_none());
        assert!(rx.try_recv().is_err());
        assert!(intake.ledger().rooms().is_member("nope", session.observer_id()));
    }

    #[tokio::test]
    async fn test_vote_for_another_voter_rejected() {
        let intake = intake().await;
        let (mut session, _rx) = intake.open_session();

        let reply = handle_client_message(&intake, &mut session, submit("a", Some("bob")))
            .await
            .unwrap();
        assert_eq!(serde_json::to_value(&reply).unwrap()["body"]["code"], "UNAUTHORIZED");

        intake.authenticate(&mut session, &token(&intake, "bob")).unwrap();
        let reply = handle_client_message(&intake, &mut session, submit("a", Some("mallory")))
            .await
            .unwrap();

        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["body"]["code"], "UNAUTHORIZED");
        assert_eq!(value["body"]["pollId"], "p1");
        assert_eq!(tally(&intake).await, 0);

        assert!(
            handle_client_message(&intake, &mut session, submit("a", Some("bob")))
                .await
                .is_none()
        );
        assert_eq!(tally(&intake).await, 1);
    }
}
