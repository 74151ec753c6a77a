use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use skirmish::{Connection, Message, NetworkIdentity};

fn bound_socket() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_nonblocking(true).unwrap();
    socket
}

fn drain_raw(socket: &UdpSocket) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 2048];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((size, _)) => out.push(buf[..size].to_vec()),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => panic!("recv failed: {e}"),
        }
    }
    out
}

fn settle() {
    std::thread::sleep(Duration::from_millis(5));
}

fn chat(n: u32) -> Message {
    Message::PlayerChat {
        identity: NetworkIdentity::new(1, 0),
        text: format!("message {n}"),
    }
}

fn chat_text(message: &Message) -> Option<String> {
    match message {
        Message::PlayerChat { text, .. } => Some(text.clone()),
        _ => None,
    }
}

#[test]
fn reliable_messages_survive_a_dropped_packet() {
    let sender_socket = bound_socket();
    let receiver_socket = bound_socket();
    let receiver_addr = receiver_socket.local_addr().unwrap();
    let sender_addr = sender_socket.local_addr().unwrap();

    let mut sender = Connection::new(Arc::new(sender_socket), receiver_addr);
    let mut receiver = Connection::new(Arc::new(receiver_socket.try_clone().unwrap()), sender_addr);

    // First flush carries R1; the wire eats it.
    sender.enqueue(Arc::new(chat(1)));
    sender.flush();
    settle();
    let lost = drain_raw(&receiver_socket);
    assert_eq!(lost.len(), 1);
    drop(lost);

    // Second flush re-sends R1 and adds R2.
    sender.enqueue(Arc::new(chat(2)));
    sender.flush();
    settle();
    let mut delivered = Vec::new();
    for datagram in drain_raw(&receiver_socket) {
        receiver.receive_datagram(&datagram);
    }
    receiver.dispatch(&mut |m| delivered.extend(chat_text(&m)));
    assert_eq!(delivered, vec!["message 1", "message 2"]);

    // A further resend must not deliver duplicates.
    sender.flush();
    settle();
    for datagram in drain_raw(&receiver_socket) {
        receiver.receive_datagram(&datagram);
    }
    let mut duplicates = Vec::new();
    receiver.dispatch(&mut |m| duplicates.extend(chat_text(&m)));
    assert!(duplicates.is_empty());

    // The receiver's acks empty the sender's queue and feed its RTT estimate.
    receiver.flush();
    settle();
    sender.pump().unwrap();
    sender.dispatch(&mut |_| {});
    assert_eq!(sender.reliable_pending(), 0);
    assert!(sender.ping_ms() >= 1);
}

#[test]
fn retry_budget_exhaustion_drops_the_connection() {
    let sender_socket = bound_socket();
    let receiver_socket = bound_socket();
    let receiver_addr = receiver_socket.local_addr().unwrap();

    let mut sender = Connection::new(Arc::new(sender_socket), receiver_addr);
    sender.enqueue(Arc::new(chat(1)));

    // Nobody ever acks.
    for _ in 0..=skirmish::MAX_RELIABLE_RESENDS {
        sender.flush();
    }
    assert!(sender.is_dropped());
}

#[test]
fn both_directions_share_one_socket_pair() {
    let a_socket = bound_socket();
    let b_socket = bound_socket();
    let a_addr = a_socket.local_addr().unwrap();
    let b_addr = b_socket.local_addr().unwrap();

    let mut a = Connection::new(Arc::new(a_socket), b_addr);
    let mut b = Connection::new(Arc::new(b_socket), a_addr);

    a.enqueue(Arc::new(chat(10)));
    b.enqueue(Arc::new(chat(20)));
    a.flush();
    b.flush();
    settle();

    a.pump().unwrap();
    b.pump().unwrap();

    let mut seen_a = Vec::new();
    a.dispatch(&mut |m| seen_a.extend(chat_text(&m)));
    let mut seen_b = Vec::new();
    b.dispatch(&mut |m| seen_b.extend(chat_text(&m)));

    assert_eq!(seen_a, vec!["message 20"]);
    assert_eq!(seen_b, vec!["message 10"]);
}
