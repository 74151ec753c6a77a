use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use super::codec::PacketWriter;
use super::protocol::{APP_IDENTIFIER, DISCOVERY_FREQUENCY, PROTOCOL_REVISION, SERVER_NAME_LENGTH};

pub const DISCOVERY_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 99, 42);
pub const DISCOVERY_PORT_OFFSET: u16 = 1;

const RETRY_COUNT: u32 = 10;

/// LAN discovery beacon: multicasts `{app id, revision, port, name}` at a
/// fixed cadence so clients on the local network can list running servers.
/// Socket failures recreate the socket on the next attempt; after
/// `RETRY_COUNT` consecutive failures the beacon logs once and disables
/// itself.
pub struct DiscoveryBeacon {
    payload: Vec<u8>,
    target: SocketAddr,
    socket: Option<UdpSocket>,
    elapsed: f32,
    failures: u32,
    disabled: bool,
}

impl DiscoveryBeacon {
    pub fn new(server_name: &str, server_port: u16) -> Self {
        let mut name = server_name.to_owned();
        while name.len() > SERVER_NAME_LENGTH {
            name.pop();
        }

        let mut w = PacketWriter::with_capacity(SERVER_NAME_LENGTH + 16);
        w.put_u32(APP_IDENTIFIER);
        w.put_u8(PROTOCOL_REVISION);
        w.put_u16(server_port);
        w.put_string(&name, SERVER_NAME_LENGTH)
            .expect("server name was trimmed to its cap");

        Self {
            payload: w.into_vec(),
            target: SocketAddr::from((
                DISCOVERY_MULTICAST_GROUP,
                server_port.wrapping_add(DISCOVERY_PORT_OFFSET),
            )),
            socket: None,
            elapsed: 0.0,
            failures: 0,
            disabled: false,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Accumulate elapsed time and emit one beacon per discovery interval.
    pub fn send_discovery(&mut self, dt: f32) {
        if self.disabled {
            return;
        }
        self.elapsed += dt;
        let interval = 1.0 / DISCOVERY_FREQUENCY;
        if self.elapsed < interval {
            return;
        }
        self.elapsed -= interval;

        if self.socket.is_none() {
            match Self::open_socket() {
                Ok(socket) => self.socket = Some(socket),
                Err(e) => {
                    self.note_failure(&e);
                    return;
                }
            }
        }

        let result = self
            .socket
            .as_ref()
            .expect("socket was just created")
            .send_to(&self.payload, self.target);
        match result {
            Ok(_) => self.failures = 0,
            Err(e) => {
                self.socket = None;
                self.note_failure(&e);
            }
        }
    }

    fn open_socket() -> io::Result<UdpSocket> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_multicast_ttl_v4(1)?;
        Ok(socket)
    }

    fn note_failure(&mut self, err: &io::Error) {
        self.failures += 1;
        if self.failures >= RETRY_COUNT {
            self.disabled = true;
            log::warn!(
                "discovery beacon disabled after {} consecutive failures: {}",
                self.failures,
                err
            );
        } else {
            log::debug!("discovery send failed (attempt {}): {}", self.failures, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::codec::PacketReader;

    #[test]
    fn payload_layout() {
        let beacon = DiscoveryBeacon::new("Test", 32000);

        let mut r = PacketReader::new(&beacon.payload);
        assert_eq!(r.get_u32().unwrap(), APP_IDENTIFIER);
        assert_eq!(r.get_u8().unwrap(), PROTOCOL_REVISION);
        assert_eq!(r.get_u16().unwrap(), 32000);
        assert_eq!(r.get_string(SERVER_NAME_LENGTH).unwrap(), "Test");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn overlong_names_are_trimmed() {
        let beacon = DiscoveryBeacon::new(&"n".repeat(64), 32000);
        let mut r = PacketReader::new(&beacon.payload);
        r.get_u32().unwrap();
        r.get_u8().unwrap();
        r.get_u16().unwrap();
        assert_eq!(r.get_string(SERVER_NAME_LENGTH).unwrap().len(), 32);
    }

    #[test]
    fn cadence_accumulates() {
        let mut beacon = DiscoveryBeacon::new("Test", 0);
        // Sending to port offset of an ephemeral-bound name is harmless; the
        // point is the cadence bookkeeping.
        beacon.send_discovery(0.4);
        assert!(beacon.elapsed > 0.0);
        beacon.send_discovery(0.7);
        assert!(beacon.elapsed < 1.0);
        assert!(!beacon.is_disabled());
    }
}
