use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use skirmish::{
    Connection, EntityType, InputHistory, LeaveReason, Message, NetworkIdentity,
    PROTOCOL_REVISION, RejectReason, Server, ServerConfig, WeaponKind,
};

const TICK: f32 = 1.0 / 30.0;

fn test_server() -> Server {
    let config = ServerConfig {
        name: "Test".to_owned(),
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        enable_discovery: false,
        ..Default::default()
    };
    Server::bind(config).unwrap()
}

struct TestClient {
    connection: Connection,
    received: Vec<Message>,
}

impl TestClient {
    fn new(server: SocketAddr) -> Self {
        Self {
            connection: Connection::connect("127.0.0.1:0", server).unwrap(),
            received: Vec::new(),
        }
    }

    fn send(&mut self, message: Message) {
        self.connection.enqueue(Arc::new(message));
        self.connection.flush();
    }

    /// One round: flush (carrying acks), let the server tick, pump and
    /// dispatch whatever came back.
    fn exchange(&mut self, server: &mut Server, rounds: usize) {
        for _ in 0..rounds {
            self.connection.flush();
            std::thread::sleep(Duration::from_millis(2));
            server.tick(TICK);
            std::thread::sleep(Duration::from_millis(2));
            self.connection.pump().unwrap();
            let received = &mut self.received;
            self.connection.dispatch(&mut |message| received.push(message));
        }
    }

    fn connect(server: &mut Server, name: &str) -> Self {
        let mut client = Self::new(server.local_addr());
        client.send(Message::ClientConnect {
            revision: PROTOCOL_REVISION,
            name: name.to_owned(),
        });
        client.exchange(server, 6);
        client
    }

    fn synced_identity(&self) -> Option<NetworkIdentity> {
        self.received.iter().find_map(|m| match m {
            Message::ClientSynced { local_identity } => Some(*local_identity),
            _ => None,
        })
    }

    fn joins(&self) -> Vec<(NetworkIdentity, String)> {
        self.received
            .iter()
            .filter_map(|m| match m {
                Message::PlayerJoin { identity, name, .. } => Some((*identity, name.clone())),
                _ => None,
            })
            .collect()
    }

    fn input(
        &mut self,
        identity: NetworkIdentity,
        frame: u32,
        target: Vec2,
        history: InputHistory,
    ) {
        self.send(Message::PlayerInput {
            identity,
            frame,
            target,
            history,
            primary: WeaponKind::MiniGun,
        });
    }
}

#[test]
fn handshake_snapshot_and_duplicate_names() {
    let mut server = test_server();

    let alice = TestClient::connect(&mut server, "alice");
    let alice_id = alice.synced_identity().expect("alice never synced");
    assert_eq!(alice_id.index(), 1);

    let joins = alice.joins();
    assert!(joins.iter().any(|(id, name)| *id == alice_id && name == "alice"));

    // The snapshot precedes the sync marker and covers the whole world.
    let sync_position = alice
        .received
        .iter()
        .position(|m| matches!(m, Message::ClientSynced { .. }))
        .unwrap();
    let adds_before_sync = alice.received[..sync_position]
        .iter()
        .filter(|m| matches!(m, Message::EntityAdd { .. }))
        .count();
    assert!(adds_before_sync > 100, "only {adds_before_sync} adds");

    // Same name again: the join arrives with a suffix.
    let bob = TestClient::connect(&mut server, "alice");
    let bob_id = bob.synced_identity().expect("bob never synced");
    assert_eq!(bob_id.index(), 2);
    assert!(
        bob.joins()
            .iter()
            .any(|(id, name)| *id == bob_id && name == "alice (2)")
    );
}

#[test]
fn full_server_rejects_the_ninth_client() {
    let mut server = test_server();

    let mut clients = Vec::new();
    for n in 0..8 {
        let client = TestClient::connect(&mut server, &format!("p{n}"));
        assert!(client.synced_identity().is_some(), "p{n} never synced");
        clients.push(client);
    }

    let mut ninth = TestClient::new(server.local_addr());
    ninth.send(Message::ClientConnect {
        revision: PROTOCOL_REVISION,
        name: "late".to_owned(),
    });
    ninth.exchange(&mut server, 6);

    assert!(ninth.received.iter().any(|m| matches!(
        m,
        Message::ClientRejected {
            reason: RejectReason::Full
        }
    )));
    assert!(ninth.synced_identity().is_none());

    // Nobody saw a join for the rejected client.
    let first = &mut clients[0];
    first.exchange(&mut server, 3);
    assert!(!first.joins().iter().any(|(_, name)| name == "late"));
}

#[test]
fn version_mismatch_is_rejected() {
    let mut server = test_server();

    let mut client = TestClient::new(server.local_addr());
    client.send(Message::ClientConnect {
        revision: PROTOCOL_REVISION.wrapping_add(1),
        name: "old".to_owned(),
    });
    client.exchange(&mut server, 6);

    assert!(client.received.iter().any(|m| matches!(
        m,
        Message::ClientRejected {
            reason: RejectReason::VersionMismatch
        }
    )));
}

#[test]
fn foreign_identity_input_kicks_as_misbehaved() {
    let mut server = test_server();

    let mut alice = TestClient::connect(&mut server, "alice");
    let mut bob = TestClient::connect(&mut server, "bob");
    let alice_id = alice.synced_identity().unwrap();
    let bob_id = bob.synced_identity().unwrap();

    alice.input(bob_id, 1, Vec2::ZERO, InputHistory::default());
    alice.exchange(&mut server, 3);

    bob.exchange(&mut server, 3);
    assert!(bob.received.iter().any(|m| matches!(
        m,
        Message::PlayerLeave {
            identity,
            reason: LeaveReason::Misbehaved,
        } if *identity == alice_id
    )));
    assert!(server.session().player(alice_id).is_none());
}

#[test]
fn input_drives_the_orb() {
    let mut server = test_server();

    let mut alice = TestClient::connect(&mut server, "alice");
    let alice_id = alice.synced_identity().unwrap();

    // A couple of ticks for the respawn to happen.
    alice.exchange(&mut server, 3);
    let orb = server
        .session()
        .player(alice_id)
        .unwrap()
        .orb
        .expect("no orb after respawn");
    let before = server.session().scene().world_position(orb).unwrap();

    let mut history = InputHistory::default();
    history.right = 0b1;
    alice.input(alice_id, 1, Vec2::new(100.0, 0.0), history);
    alice.exchange(&mut server, 5);

    let after = server.session().scene().world_position(orb).unwrap();
    assert!(after.x > before.x, "orb did not move: {before} -> {after}");

    // The aim target turned the orb toward +x.
    let orientation = server.session().scene().orientation(orb).unwrap();
    assert!(orientation.abs() < 0.01);
}

#[test]
fn graceful_disconnect_announces_the_leave() {
    let mut server = test_server();

    let mut alice = TestClient::connect(&mut server, "alice");
    let mut bob = TestClient::connect(&mut server, "bob");
    let alice_id = alice.synced_identity().unwrap();

    alice.send(Message::Disconnect);
    alice.exchange(&mut server, 3);
    bob.exchange(&mut server, 3);

    assert!(bob.received.iter().any(|m| matches!(
        m,
        Message::PlayerLeave {
            identity,
            reason: LeaveReason::Disconnect,
        } if *identity == alice_id
    )));
}

#[test]
fn synced_clients_receive_entity_updates_and_stats() {
    let mut server = test_server();

    let mut alice = TestClient::connect(&mut server, "alice");
    let alice_id = alice.synced_identity().unwrap();

    // Run past the stats cadence (1 s at 30 Hz).
    alice.exchange(&mut server, 35);

    let orb_identity = alice
        .received
        .iter()
        .find_map(|m| match m {
            Message::EntityAdd {
                identity,
                owner,
                entity_type: EntityType::Orb,
                ..
            } if *owner == alice_id => Some(*identity),
            _ => None,
        })
        .expect("the orb add never arrived");

    let transform_seqs: Vec<u32> = alice
        .received
        .iter()
        .filter_map(|m| match m {
            Message::UpdateTransform { identity, seq, .. } if *identity == orb_identity => {
                Some(*seq)
            }
            _ => None,
        })
        .collect();
    assert!(transform_seqs.len() > 2);
    assert!(transform_seqs.windows(2).all(|w| w[0] < w[1]));

    assert!(alice.received.iter().any(|m| matches!(
        m,
        Message::PlayerStats { identity, .. } if *identity == alice_id
    )));
}
