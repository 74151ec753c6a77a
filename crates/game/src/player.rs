use crate::identity::NetworkIdentity;
use crate::net::codec::{CodecError, CodecResult};
use crate::scene::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    Human,
    Bot,
}

impl PlayerKind {
    pub fn to_u8(self) -> u8 {
        match self {
            PlayerKind::Human => 0,
            PlayerKind::Bot => 1,
        }
    }

    pub fn from_u8(value: u8) -> CodecResult<Self> {
        match value {
            0 => Ok(PlayerKind::Human),
            1 => Ok(PlayerKind::Bot),
            _ => Err(CodecError::UnknownTag {
                what: "player kind",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaveReason {
    #[default]
    Unknown,
    Disconnect,
    ConnectionDropped,
    Misbehaved,
}

impl LeaveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveReason::Unknown => "left",
            LeaveReason::Disconnect => "disconnected",
            LeaveReason::ConnectionDropped => "connection dropped",
            LeaveReason::Misbehaved => "misbehaved",
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            LeaveReason::Unknown => 0,
            LeaveReason::Disconnect => 1,
            LeaveReason::ConnectionDropped => 2,
            LeaveReason::Misbehaved => 3,
        }
    }

    pub fn from_u8(value: u8) -> CodecResult<Self> {
        Ok(match value {
            0 => LeaveReason::Unknown,
            1 => LeaveReason::Disconnect,
            2 => LeaveReason::ConnectionDropped,
            3 => LeaveReason::Misbehaved,
            _ => {
                return Err(CodecError::UnknownTag {
                    what: "leave reason",
                    value,
                });
            }
        })
    }
}

/// The fixed palette players draw their color from.
pub const PLAYER_COLOR_PALETTE: [[u8; 3]; 9] = [
    [0xE6, 0x3C, 0x3C],
    [0x3C, 0x78, 0xE6],
    [0x3C, 0xC8, 0x50],
    [0xE6, 0xC8, 0x28],
    [0xB4, 0x50, 0xE6],
    [0x28, 0xC8, 0xC8],
    [0xE6, 0x82, 0x28],
    [0xE6, 0x5A, 0xB4],
    [0xA0, 0xA0, 0xA0],
];

/// Hands out palette indices; each is owned by at most one player at a time.
pub struct ColorPool {
    available: Vec<usize>,
}

impl ColorPool {
    pub fn new() -> Self {
        Self {
            available: (0..PLAYER_COLOR_PALETTE.len()).rev().collect(),
        }
    }

    pub fn acquire(&mut self) -> Option<usize> {
        self.available.pop()
    }

    pub fn release(&mut self, color: usize) {
        assert!(color < PLAYER_COLOR_PALETTE.len());
        assert!(
            !self.available.contains(&color),
            "color {color} released twice"
        );
        self.available.push(color);
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }
}

impl Default for ColorPool {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant of the session, human or bot. The server player exists
/// only as the reserved identity and is flagged accordingly.
pub struct Player {
    pub name: String,
    pub kind: PlayerKind,
    pub identity: NetworkIdentity,
    pub color: usize,
    pub kills: u16,
    pub deaths: u16,
    pub ping: u16,
    pub rank: u16,
    pub leave_reason: LeaveReason,
    pub respawn_delay: f32,
    pub orb: Option<NodeId>,
    pub is_local: bool,
    pub is_server: bool,
    pub stats_seq: u32,
}

impl Player {
    pub fn new(identity: NetworkIdentity, name: String, kind: PlayerKind, color: usize) -> Self {
        Self {
            name,
            kind,
            identity,
            color,
            kills: 0,
            deaths: 0,
            ping: 0,
            rank: 0,
            leave_reason: LeaveReason::Unknown,
            respawn_delay: 0.0,
            orb: None,
            is_local: false,
            is_server: false,
        stats_seq: 0,
        }
    }
}

/// Case-insensitive comparison used for everything shown as a player name.
pub fn display_equal(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_pool_hands_each_color_once() {
        let mut pool = ColorPool::new();
        let mut taken = Vec::new();
        while let Some(color) = pool.acquire() {
            assert!(!taken.contains(&color));
            taken.push(color);
        }
        assert_eq!(taken.len(), PLAYER_COLOR_PALETTE.len());
        assert_eq!(pool.available(), 0);

        pool.release(taken.pop().unwrap());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    #[should_panic]
    fn double_release_is_a_bug() {
        let mut pool = ColorPool::new();
        let color = pool.acquire().unwrap();
        pool.release(color);
        pool.release(color);
    }

    #[test]
    fn display_equality_ignores_case() {
        assert!(display_equal("Alice", "alice"));
        assert!(display_equal("ALICE", "alice"));
        assert!(!display_equal("alice", "alice (2)"));
    }
}
