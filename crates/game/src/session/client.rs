use std::sync::Arc;

use crate::identity::NetworkIdentity;
use crate::net::connection::Connection;
use crate::net::protocol::{Message, PROTOCOL_REVISION, RejectReason, sequence_greater_than};
use crate::player::{LeaveReason, PlayerKind};

use super::logic::GameSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    AwaitingConnect,
    AwaitingSync,
    Synced,
    Disconnecting,
    Disconnected,
}

/// Server-side view of one connected endpoint: its connection, session state
/// and the player it controls once the handshake went through.
pub struct Client {
    connection: Connection,
    state: ClientState,
    player: Option<NetworkIdentity>,
    last_input_frame: u32,
}

impl Client {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            state: ClientState::AwaitingConnect,
            player: None,
            last_input_frame: 0,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn player(&self) -> Option<NetworkIdentity> {
        self.player
    }

    /// Broadcasts flow to a client from the moment its snapshot is queued;
    /// the reliable channel keeps them ordered behind it.
    pub fn is_broadcast_eligible(&self) -> bool {
        matches!(self.state, ClientState::AwaitingSync | ClientState::Synced)
    }

    /// Per-tick state upkeep: promote to synced once the snapshot is acked,
    /// finish a rejection once its message went through, and drive the
    /// respawn timer of a synced player without an orb.
    pub fn update(&mut self, session: &mut GameSession, dt: f32) {
        self.promote_if_synced();
        if self.state == ClientState::Disconnecting && self.connection.reliable_pending() == 0 {
            self.connection.mark_dropped();
            self.state = ClientState::Disconnected;
        }
        if self.state == ClientState::Synced {
            if let Some(player) = self.player {
                if session.player(player).is_some_and(|p| p.orb.is_none()) {
                    session.tick_respawn(player, dt);
                }
            }
        }
    }

    /// Dispatch every buffered message through the session state machine.
    pub fn dispatch(&mut self, session: &mut GameSession) {
        let mut messages = Vec::new();
        self.connection.dispatch(&mut |message| messages.push(message));
        for message in messages {
            if matches!(
                self.state,
                ClientState::Disconnected | ClientState::Disconnecting
            ) {
                break;
            }
            self.promote_if_synced();
            self.handle_message(session, message);
        }
    }

    /// The snapshot is fully acked once no reliable message is pending; the
    /// acks were processed before any message of this batch was decoded.
    fn promote_if_synced(&mut self) {
        if self.state == ClientState::AwaitingSync && self.connection.reliable_pending() == 0 {
            self.state = ClientState::Synced;
            log::info!("client {} is synced", self.connection.remote());
        }
    }

    fn handle_message(&mut self, session: &mut GameSession, message: Message) {
        match (self.state, message) {
            (ClientState::AwaitingConnect, Message::ClientConnect { revision, name }) => {
                self.handle_connect(session, revision, &name);
            }
            (_, Message::Disconnect) => {
                if let Some(player) = self.player {
                    if let Some(p) = session.player_mut(player) {
                        p.leave_reason = LeaveReason::Disconnect;
                    }
                }
                self.state = ClientState::Disconnected;
                self.connection.mark_dropped();
            }
            (
                ClientState::Synced,
                Message::PlayerInput {
                    identity,
                    frame,
                    target,
                    history,
                    primary,
                },
            ) => {
                if Some(identity) != self.player {
                    self.misbehave(session, "input for a foreign player identity");
                    return;
                }
                if !sequence_greater_than(frame, self.last_input_frame) {
                    return;
                }
                let gap = frame.wrapping_sub(self.last_input_frame);
                self.last_input_frame = frame;
                session.handle_player_input(identity, target, history.folded(gap), primary);
            }
            (ClientState::Synced, Message::PlayerChat { identity, text }) => {
                if Some(identity) != self.player {
                    self.misbehave(session, "chat for a foreign player identity");
                    return;
                }
                session.chat(identity, text);
            }
            (ClientState::Synced, Message::PlayerName { identity, name }) => {
                if Some(identity) != self.player {
                    self.misbehave(session, "rename for a foreign player identity");
                    return;
                }
                session.rename_player(identity, &name);
            }
            (state, message) => {
                log::error!(
                    "client {} sent {:?} in state {:?}",
                    self.connection.remote(),
                    message.tag(),
                    state
                );
                self.misbehave(session, "message invalid for the session state");
            }
        }
    }

    fn handle_connect(&mut self, session: &mut GameSession, revision: u8, name: &str) {
        if revision != PROTOCOL_REVISION {
            log::warn!(
                "client {} rejected: revision {} (running {})",
                self.connection.remote(),
                revision,
                PROTOCOL_REVISION
            );
            self.reject(RejectReason::VersionMismatch);
            return;
        }
        if session.is_full() {
            log::warn!("client {} rejected: session full", self.connection.remote());
            self.reject(RejectReason::Full);
            return;
        }

        let identity = session.create_player(name, PlayerKind::Human);
        self.player = Some(identity);
        session.send_state_snapshot(&mut self.connection, identity);
        self.state = ClientState::AwaitingSync;
    }

    fn reject(&mut self, reason: RejectReason) {
        self.connection
            .enqueue(Arc::new(Message::ClientRejected { reason }));
        self.state = ClientState::Disconnecting;
    }

    /// Protocol violation: flag the player as misbehaved and cut the
    /// connection; the next sweep removes the player and announces the kick.
    fn misbehave(&mut self, session: &mut GameSession, what: &str) {
        log::error!("kicking {}: {}", self.connection.remote(), what);
        if let Some(player) = self.player {
            if let Some(p) = session.player_mut(player) {
                p.leave_reason = LeaveReason::Misbehaved;
            }
        }
        self.state = ClientState::Disconnected;
        self.connection.mark_dropped();
    }
}
