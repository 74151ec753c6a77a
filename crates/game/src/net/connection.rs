use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::codec::{CodecResult, PacketReader, PacketWriter};
use super::protocol::{
    MAX_PACKET_SIZE, Message, PACKET_HEADER_SIZE, PacketHeader, Reliability, sequence_greater_than,
};
use crate::pool::Pool;

pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_RELIABLE_RESENDS: u32 = 128;

const ACK_WINDOW: u32 = 32;
const MAX_TRACKED_PACKETS: usize = 256;
const RECENT_SEQUENCE_WINDOW: usize = 64;
const RTT_ALPHA: f32 = 0.1;

/// Duplicate filter and ack bookkeeping for received packet sequences: the
/// newest sequence plus a bitmask of the 32 preceding ones.
#[derive(Debug, Default)]
struct ReceiveFilter {
    last_received: u32,
    received_bitmask: u32,
    recent: VecDeque<u32>,
}

impl ReceiveFilter {
    /// Record a received packet sequence; returns false for duplicates.
    fn record(&mut self, sequence: u32) -> bool {
        if self.recent.contains(&sequence) {
            return false;
        }
        if self.recent.len() >= RECENT_SEQUENCE_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(sequence);

        if sequence_greater_than(sequence, self.last_received) {
            let diff = sequence.wrapping_sub(self.last_received);
            if diff <= ACK_WINDOW {
                self.received_bitmask = (self.received_bitmask << diff) | 1;
            } else {
                self.received_bitmask = 0;
            }
            self.last_received = sequence;
        } else {
            let diff = self.last_received.wrapping_sub(sequence);
            if diff > 0 && diff <= ACK_WINDOW {
                self.received_bitmask |= 1 << (diff - 1);
            }
        }
        true
    }

    fn ack_data(&self) -> (u32, u32) {
        (self.last_received, self.received_bitmask)
    }
}

struct OutgoingReliable {
    seq: u32,
    message: Arc<Message>,
    resends: u32,
}

struct SentPacket {
    seq: u32,
    sent_at: Instant,
    reliable: Vec<u32>,
    acked: bool,
}

/// One endpoint pair over UDP. Owns the outgoing queues (split by reliability
/// class), the receive window and ack bitmap, the smoothed RTT, and the drop
/// deadline. Server-side connections share the listener socket; client-side
/// ones own their socket and pump it themselves.
pub struct Connection {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    send_seq: u32,
    reliable_seq: u32,
    reliable_queue: VecDeque<OutgoingReliable>,
    sequenced_queue: Vec<Arc<Message>>,
    sent_packets: VecDeque<SentPacket>,
    receive: ReceiveFilter,
    expected_reliable: u32,
    sequenced_last: HashMap<(u8, u32), u32>,
    inbound: Vec<Vec<u8>>,
    buffers: Pool<Vec<u8>>,
    rtt_ms: f32,
    last_receive: Instant,
    dropped: bool,
}

impl Connection {
    pub fn new(socket: Arc<UdpSocket>, remote: SocketAddr) -> Self {
        Self {
            socket,
            remote,
            send_seq: 0,
            reliable_seq: 1,
            reliable_queue: VecDeque::new(),
            sequenced_queue: Vec::new(),
            sent_packets: VecDeque::new(),
            receive: ReceiveFilter::default(),
            expected_reliable: 1,
            sequenced_last: HashMap::new(),
            inbound: Vec::new(),
            buffers: Pool::new(),
            rtt_ms: 0.0,
            last_receive: Instant::now(),
            dropped: false,
        }
    }

    /// Bind a fresh nonblocking socket and connect it to `remote`. This is the
    /// client-side constructor; the server hands out shared listener sockets.
    pub fn connect<A: ToSocketAddrs>(bind: A, remote: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;
        Ok(Self::new(Arc::new(socket), remote))
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Smoothed round-trip estimate in milliseconds.
    pub fn ping_ms(&self) -> u16 {
        self.rtt_ms.round().clamp(0.0, u16::MAX as f32) as u16
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped || self.last_receive.elapsed() > CONNECTION_TIMEOUT
    }

    pub fn mark_dropped(&mut self) {
        self.dropped = true;
    }

    /// Reliable messages still awaiting acknowledgement.
    pub fn reliable_pending(&self) -> usize {
        self.reliable_queue.len()
    }

    /// Append a message to the outgoing queue; its reliability class decides
    /// which queue it lands in. Nothing is sent until `flush`.
    pub fn enqueue(&mut self, message: Arc<Message>) {
        match message.reliability() {
            Reliability::ReliableOrdered => {
                let seq = self.reliable_seq;
                self.reliable_seq = self.reliable_seq.wrapping_add(1);
                self.reliable_queue.push_back(OutgoingReliable {
                    seq,
                    message,
                    resends: 0,
                });
            }
            Reliability::UnreliableSequenced => {
                self.sequenced_queue.push(message);
            }
        }
    }

    /// Buffer one raw inbound datagram for the next `dispatch`.
    pub fn receive_datagram(&mut self, data: &[u8]) {
        if self.dropped {
            return;
        }
        let mut buf = self.buffers.acquire();
        buf.extend_from_slice(data);
        self.inbound.push(buf);
    }

    /// Drain the socket this connection owns, feeding every datagram from the
    /// remote endpoint into the inbound buffer.
    pub fn pump(&mut self) -> io::Result<()> {
        let socket = Arc::clone(&self.socket);
        let mut buf = [0u8; 2048];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((size, addr)) => {
                    if addr == self.remote && size <= MAX_PACKET_SIZE {
                        self.receive_datagram(&buf[..size]);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Decode all buffered inbound packets and hand each accepted message to
    /// `handler`. Reliable messages arrive exactly once, in send order;
    /// sequenced messages only with a fresh per-field sequence. A malformed
    /// packet or unknown message type drops the connection and stops
    /// dispatching.
    pub fn dispatch(&mut self, handler: &mut dyn FnMut(Message)) {
        let packets = std::mem::take(&mut self.inbound);
        for buf in packets {
            if !self.dropped {
                if let Err(e) = self.dispatch_packet(&buf, handler) {
                    log::error!("protocol violation from {}: {}", self.remote, e);
                    self.dropped = true;
                }
            }
            self.buffers.release(buf);
        }
    }

    fn dispatch_packet(
        &mut self,
        data: &[u8],
        handler: &mut dyn FnMut(Message),
    ) -> CodecResult<()> {
        let mut reader = PacketReader::new(data);
        let header = PacketHeader::decode(&mut reader)?;
        self.last_receive = Instant::now();

        let fresh = self.receive.record(header.sequence);
        self.process_acks(header.ack, header.ack_bitmask);
        if !fresh {
            return Ok(());
        }

        while reader.remaining() > 0 {
            let (message, seq) = Message::decode(&mut reader)?;
            match message.reliability() {
                Reliability::ReliableOrdered => {
                    if seq == self.expected_reliable {
                        self.expected_reliable = self.expected_reliable.wrapping_add(1);
                        handler(message);
                    } else if sequence_greater_than(seq, self.expected_reliable) {
                        log::debug!(
                            "reliable message {} from {} ahead of expected {}",
                            seq,
                            self.remote,
                            self.expected_reliable
                        );
                    }
                }
                Reliability::UnreliableSequenced => {
                    let key = message
                        .sequence_key()
                        .unwrap_or_else(|| (message.tag(), 0));
                    match self.sequenced_last.get(&key) {
                        Some(&last) if !sequence_greater_than(seq, last) => {
                            log::debug!(
                                "stale sequenced message (type {}, seq {} <= {}) from {}",
                                key.0,
                                seq,
                                last,
                                self.remote
                            );
                        }
                        _ => {
                            self.sequenced_last.insert(key, seq);
                            handler(message);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn process_acks(&mut self, ack: u32, ack_bitmask: u32) {
        let now = Instant::now();
        let mut acked_reliable: Vec<u32> = Vec::new();

        for sent in &mut self.sent_packets {
            if sent.acked {
                continue;
            }
            let is_acked = if sent.seq == ack {
                true
            } else if sequence_greater_than(ack, sent.seq) {
                let diff = ack.wrapping_sub(sent.seq);
                diff <= ACK_WINDOW && (ack_bitmask & (1 << (diff - 1))) != 0
            } else {
                false
            };
            if is_acked {
                sent.acked = true;
                acked_reliable.extend_from_slice(&sent.reliable);

                let rtt = now.duration_since(sent.sent_at).as_secs_f32() * 1000.0;
                if self.rtt_ms <= 0.0 {
                    self.rtt_ms = rtt;
                } else {
                    self.rtt_ms = (1.0 - RTT_ALPHA) * self.rtt_ms + RTT_ALPHA * rtt;
                }
            }
        }

        while self.sent_packets.front().is_some_and(|p| p.acked) {
            self.sent_packets.pop_front();
        }
        if !acked_reliable.is_empty() {
            self.reliable_queue
                .retain(|m| !acked_reliable.contains(&m.seq));
        }
    }

    /// Coalesce the pending messages into packets and send them. Reliable
    /// messages are re-sent every flush until acked; when the retry budget
    /// runs out the connection is dropped. A flush with nothing pending still
    /// emits one header-only packet so acks keep flowing.
    pub fn flush(&mut self) {
        if self.dropped {
            self.sequenced_queue.clear();
            return;
        }

        let sequenced = std::mem::take(&mut self.sequenced_queue);
        let mut packet = PacketWriter::with_capacity(MAX_PACKET_SIZE);
        let mut scratch = PacketWriter::with_capacity(MAX_PACKET_SIZE);
        let mut packet_reliable: Vec<u32> = Vec::new();
        let mut packets_sent = 0usize;

        for index in 0..self.reliable_queue.len() {
            let entry = &mut self.reliable_queue[index];
            entry.resends += 1;
            if entry.resends > MAX_RELIABLE_RESENDS {
                log::warn!(
                    "reliable retry budget exhausted for {}; dropping connection",
                    self.remote
                );
                self.dropped = true;
                return;
            }
            let seq = entry.seq;
            let message = Arc::clone(&entry.message);

            scratch.clear();
            if let Err(e) = message.encode(&mut scratch, seq) {
                log::error!("failed to encode reliable message for {}: {}", self.remote, e);
                self.dropped = true;
                return;
            }
            if scratch.len() > MAX_PACKET_SIZE - PACKET_HEADER_SIZE {
                log::error!(
                    "reliable message of {} bytes cannot fit a packet for {}",
                    scratch.len(),
                    self.remote
                );
                self.dropped = true;
                return;
            }
            if !self.append_framed(
                &mut packet,
                &mut packet_reliable,
                scratch.as_slice(),
                Some(seq),
                &mut packets_sent,
            ) {
                return;
            }
        }

        for message in &sequenced {
            scratch.clear();
            let seq = message.sequence().unwrap_or(0);
            if let Err(e) = message.encode(&mut scratch, seq) {
                log::warn!("dropping oversize sequenced message for {}: {}", self.remote, e);
                continue;
            }
            if scratch.len() > MAX_PACKET_SIZE - PACKET_HEADER_SIZE {
                log::warn!(
                    "sequenced message of {} bytes cannot fit a packet for {}; dropped",
                    scratch.len(),
                    self.remote
                );
                continue;
            }
            if !self.append_framed(
                &mut packet,
                &mut packet_reliable,
                scratch.as_slice(),
                None,
                &mut packets_sent,
            ) {
                return;
            }
        }

        if !packet.is_empty() || packets_sent == 0 {
            self.send_packet(&mut packet, &mut packet_reliable, &mut packets_sent);
        }
    }

    /// Append one framed message to the packet under construction, flushing
    /// the packet first when the message would not fit. Returns false when the
    /// connection dropped mid-flush.
    fn append_framed(
        &mut self,
        packet: &mut PacketWriter,
        packet_reliable: &mut Vec<u32>,
        framed: &[u8],
        reliable_seq: Option<u32>,
        packets_sent: &mut usize,
    ) -> bool {
        if packet.is_empty() {
            self.begin_packet(packet);
        }
        if packet.len() + framed.len() > MAX_PACKET_SIZE {
            self.send_packet(packet, packet_reliable, packets_sent);
            if self.dropped {
                return false;
            }
            self.begin_packet(packet);
        }
        packet.put_bytes(framed);
        if let Some(seq) = reliable_seq {
            packet_reliable.push(seq);
        }
        true
    }

    fn begin_packet(&mut self, packet: &mut PacketWriter) {
        let (ack, ack_bitmask) = self.receive.ack_data();
        let header = PacketHeader::new(self.send_seq, ack, ack_bitmask);
        packet.clear();
        header.encode(packet);
    }

    fn send_packet(
        &mut self,
        packet: &mut PacketWriter,
        packet_reliable: &mut Vec<u32>,
        packets_sent: &mut usize,
    ) {
        if packet.is_empty() {
            self.begin_packet(packet);
        }
        let seq = self.send_seq;
        self.send_seq = self.send_seq.wrapping_add(1);

        if let Err(e) = self.socket.send_to(packet.as_slice(), self.remote) {
            log::warn!("send to {} failed: {}", self.remote, e);
            self.dropped = true;
        }

        self.sent_packets.push_back(SentPacket {
            seq,
            sent_at: Instant::now(),
            reliable: std::mem::take(packet_reliable),
            acked: false,
        });
        while self.sent_packets.len() > MAX_TRACKED_PACKETS {
            self.sent_packets.pop_front();
        }

        *packets_sent += 1;
        packet.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NetworkIdentity;
    use glam::Vec2;

    fn loopback_pair() -> (Connection, Connection) {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();
        (
            Connection::new(Arc::new(a), b_addr),
            Connection::new(Arc::new(b), a_addr),
        )
    }

    fn transform(seq: u32) -> Message {
        Message::UpdateTransform {
            identity: NetworkIdentity::new(5, 0),
            position: Vec2::new(seq as f32, 0.0),
            orientation: 0.0,
            seq,
        }
    }

    /// Build a raw packet the way a remote peer would.
    fn raw_packet(packet_seq: u32, messages: &[(Message, u32)]) -> Vec<u8> {
        let mut w = PacketWriter::new();
        PacketHeader::new(packet_seq, 0, 0).encode(&mut w);
        for (message, seq) in messages {
            message.encode(&mut w, *seq).unwrap();
        }
        w.into_vec()
    }

    #[test]
    fn receive_filter_acks_out_of_order() {
        let mut filter = ReceiveFilter::default();
        assert!(filter.record(3));
        assert!(filter.record(1));
        assert!(filter.record(2));
        assert!(!filter.record(2));

        let (ack, bitmask) = filter.ack_data();
        assert_eq!(ack, 3);
        assert_eq!(bitmask & 0b11, 0b11);
    }

    #[test]
    fn sequenced_messages_drop_stale_sequences() {
        let (_peer, mut conn) = loopback_pair();

        conn.receive_datagram(&raw_packet(1, &[(transform(5), 5)]));
        conn.receive_datagram(&raw_packet(2, &[(transform(4), 4)]));
        conn.receive_datagram(&raw_packet(3, &[(transform(6), 6)]));

        let mut seen = Vec::new();
        conn.dispatch(&mut |m| seen.push(m.sequence().unwrap()));
        assert_eq!(seen, vec![5, 6]);
        assert!(!conn.is_dropped());
    }

    #[test]
    fn reliable_messages_deduplicate_and_order() {
        let (_peer, mut conn) = loopback_pair();

        let chat = |n: u32| Message::PlayerChat {
            identity: NetworkIdentity::new(1, 0),
            text: format!("msg {n}"),
        };

        // First packet lost; the retransmission carries both messages.
        conn.receive_datagram(&raw_packet(2, &[(chat(1), 1), (chat(2), 2)]));
        // A later resend repeats them.
        conn.receive_datagram(&raw_packet(3, &[(chat(1), 1), (chat(2), 2)]));

        let mut seen = Vec::new();
        conn.dispatch(&mut |m| {
            if let Message::PlayerChat { text, .. } = m {
                seen.push(text);
            }
        });
        assert_eq!(seen, vec!["msg 1", "msg 2"]);
    }

    #[test]
    fn unknown_message_drops_connection() {
        let (_peer, mut conn) = loopback_pair();

        let mut w = PacketWriter::new();
        PacketHeader::new(1, 0, 0).encode(&mut w);
        w.put_u8(0xEE);
        w.put_u32(0);
        conn.receive_datagram(&w.into_vec());
        conn.receive_datagram(&raw_packet(2, &[(transform(1), 1)]));

        let mut count = 0;
        conn.dispatch(&mut |_| count += 1);
        assert_eq!(count, 0);
        assert!(conn.is_dropped());
    }

    #[test]
    fn flush_splits_packets_at_mtu() {
        let (mut sender, mut receiver) = loopback_pair();

        for n in 0..40u32 {
            sender.enqueue(Arc::new(Message::PlayerChat {
                identity: NetworkIdentity::new(1, 0),
                text: format!("chat message number {n:03}"),
            }));
        }
        sender.flush();

        std::thread::sleep(Duration::from_millis(20));
        receiver.pump().unwrap();
        let mut seen = Vec::new();
        receiver.dispatch(&mut |m| {
            if let Message::PlayerChat { text, .. } = m {
                seen.push(text);
            }
        });
        assert_eq!(seen.len(), 40);
        assert!(seen[0].ends_with("000"));
        assert!(seen[39].ends_with("039"));
    }

    #[test]
    fn acks_clear_the_reliable_queue() {
        let (mut sender, mut receiver) = loopback_pair();

        sender.enqueue(Arc::new(Message::Disconnect));
        sender.flush();
        assert_eq!(sender.reliable_pending(), 1);

        std::thread::sleep(Duration::from_millis(20));
        receiver.pump().unwrap();
        receiver.dispatch(&mut |_| {});
        receiver.flush();

        std::thread::sleep(Duration::from_millis(20));
        sender.pump().unwrap();
        sender.dispatch(&mut |_| {});
        assert_eq!(sender.reliable_pending(), 0);
        assert!(sender.ping_ms() < 1000);
    }
}
