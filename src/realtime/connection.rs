use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::auth::Session;
use crate::realtime::handler::handle_frame;
use crate::realtime::protocol::{ConnectedPayload, ServerEvent};
use crate::realtime::registry::{ConnectionId, channels_for};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Admitted,
    Active,
    Closed,
}

impl ConnectionState {
    pub fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Admitted)
                | (Connecting, Closed)
                | (Admitted, Active)
                | (Admitted, Closed)
                | (Active, Closed)
        )
    }
}

/// Lifecycle bookkeeping for one websocket.
#[derive(Debug)]
pub struct Connection {
    pub session: Session,
    pub id: Option<ConnectionId>,
    state: ConnectionState,
}

impl Connection {
    /// A connection whose credential has already been verified.
    pub fn admitted(session: Session) -> Self {
        let mut connection = Self {
            session,
            id: None,
            state: ConnectionState::Connecting,
        };
        connection.advance(ConnectionState::Admitted);
        connection
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn advance(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_advance_to(next) {
            warn!(from = ?self.state, to = ?next, "ignoring invalid connection transition");
            return false;
        }
        debug!(account_id = self.session.account_id, from = ?self.state, to = ?next, "connection state");
        self.state = next;
        true
    }
}

/// Runs an admitted websocket until either side closes it.
pub async fn serve(socket: WebSocket, state: Arc<AppState>, session: Session) {
    let mut connection = Connection::admitted(session);
    let (sender, mut receiver) = socket.split();
    let (outbox, inbox) = mpsc::channel::<String>(state.config.connection_buffer_size);

    let connection_id = state.broadcaster.register(&session, outbox.clone());
    connection.id = Some(connection_id);
    connection.advance(ConnectionState::Active);

    info!(
        connection_id = %connection_id,
        account_id = session.account_id,
        role = %session.role,
        "websocket connection admitted"
    );

    if greet(&outbox, &session).await.is_err() {
        debug!(connection_id = %connection_id, "connected event not queued; closing");
        state.broadcaster.deregister(connection_id);
        connection.advance(ConnectionState::Closed);
        return;
    }

    let mut send_task = tokio::spawn(async move {
        let mut sender = sender;
        let frames = ReceiverStream::new(inbox)
            .map(|frame| Ok::<_, axum::Error>(Message::Text(frame)));
        if let Err(err) = frames.forward(&mut sender).await {
            debug!(error = %err, "websocket send failed");
        }
        let _ = sender.close().await;
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    let Some(event) = handle_frame(&recv_state, &session, &text) else {
                        continue;
                    };
                    if reply(&outbox, &event).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.broadcaster.deregister(connection_id);
    connection.advance(ConnectionState::Closed);

    info!(
        connection_id = %connection_id,
        account_id = session.account_id,
        "websocket connection closed"
    );
}

/// Queues the `connected` event naming the session's channels.
async fn greet(outbox: &mpsc::Sender<String>, session: &Session) -> Result<(), ()> {
    let welcome = ServerEvent::Connected(ConnectedPayload {
        account_id: session.account_id,
        role: session.role,
        channels: channels_for(session).iter().map(ToString::to_string).collect(),
    });
    reply(outbox, &welcome).await
}

/// Queues a frame for this connection only, waiting for buffer space.
async fn reply(outbox: &mpsc::Sender<String>, event: &ServerEvent) -> Result<(), ()> {
    let frame = serde_json::to_string(event).map_err(|err| {
        warn!(error = %err, event = event.name(), "failed to serialize reply");
    })?;
    outbox.send(frame).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::{Connection, ConnectionState, greet};
    use crate::auth::Session;
    use crate::models::account::Role;
    use crate::realtime::protocol::ServerEvent;

    fn session() -> Session {
        Session {
            account_id: 1,
            role: Role::Customer,
            vendor_id: None,
            partner_id: None,
        }
    }

    #[test]
    fn admitted_connection_activates_then_closes() {
        let mut connection = Connection::admitted(session());
        assert_eq!(connection.state(), ConnectionState::Admitted);

        assert!(connection.advance(ConnectionState::Active));
        assert!(connection.advance(ConnectionState::Closed));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[test]
    fn closed_is_final() {
        let mut connection = Connection::admitted(session());
        connection.advance(ConnectionState::Closed);

        assert!(!connection.advance(ConnectionState::Active));
        assert!(!connection.advance(ConnectionState::Admitted));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[test]
    fn activation_requires_admission() {
        assert!(!ConnectionState::Connecting.can_advance_to(ConnectionState::Active));
        assert!(ConnectionState::Connecting.can_advance_to(ConnectionState::Closed));
    }

    #[tokio::test]
    async fn greeting_names_both_channels() {
        let (outbox, mut inbox) = mpsc::channel(1);

        assert!(greet(&outbox, &session()).await.is_ok());

        let event: ServerEvent = serde_json::from_str(&inbox.recv().await.unwrap()).unwrap();
        match event {
            ServerEvent::Connected(payload) => {
                assert_eq!(payload.channels, vec!["role:customer", "identity:1"]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn greeting_a_closed_outbox_fails() {
        let (outbox, inbox) = mpsc::channel::<String>(1);
        drop(inbox);

        assert!(greet(&outbox, &session()).await.is_err());
    }
}
