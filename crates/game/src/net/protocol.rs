use bitflags::bitflags;
use glam::Vec2;

use super::codec::{CodecError, CodecResult, PacketReader, PacketWriter};
use crate::behavior::WeaponKind;
use crate::entity::{EntityType, PowerUp};
use crate::identity::NetworkIdentity;
use crate::player::{LeaveReason, PlayerKind};

pub const APP_IDENTIFIER: u32 = 0x534B_524D;
pub const PROTOCOL_REVISION: u8 = 3;
pub const DEFAULT_PORT: u16 = 32000;

pub const MAX_PACKET_SIZE: usize = 512;
pub const PACKET_HEADER_SIZE: usize = 17;

pub const MAX_PLAYERS: usize = 8;
pub const SERVER_NAME_LENGTH: usize = 32;
pub const PLAYER_NAME_LENGTH: usize = 32;
pub const MAX_CHAT_LENGTH: usize = 255;

pub const SERVER_UPDATE_FREQUENCY: u32 = 30;
pub const INPUT_UPDATE_FREQUENCY: u32 = 60;
pub const PLAYER_STATS_FREQUENCY: f32 = 1.0;
pub const DISCOVERY_FREQUENCY: f32 = 1.0;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

/// Wrap-aware sequence comparison: `s1` is newer than `s2`.
#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

/// Delivery class of a message type. The table is fixed and identical on both
/// ends of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    /// Delivered exactly once, in send order; re-sent until acknowledged.
    ReliableOrdered,
    /// Best effort; anything older than the last accepted sequence is dropped.
    UnreliableSequenced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    VersionMismatch,
    Full,
}

impl RejectReason {
    fn to_u8(self) -> u8 {
        match self {
            RejectReason::VersionMismatch => 0,
            RejectReason::Full => 1,
        }
    }

    fn from_u8(value: u8) -> CodecResult<Self> {
        match value {
            0 => Ok(RejectReason::VersionMismatch),
            1 => Ok(RejectReason::Full),
            _ => Err(CodecError::UnknownTag {
                what: "reject reason",
                value,
            }),
        }
    }
}

bitflags! {
    /// Folded input state for one server tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InputButtons: u8 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const FIRE_PRIMARY = 1 << 4;
        const FIRE_SECONDARY = 1 << 5;
    }
}

/// Per-action history masks carried by a `PlayerInput` message. Bit *i* of a
/// mask means the action was pressed during frame `frame_number - i`: a client
/// resends its recent input history every message and the server folds in
/// exactly the frames it has not yet accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputHistory {
    pub up: u8,
    pub down: u8,
    pub left: u8,
    pub right: u8,
    pub fire_primary: u8,
    pub fire_secondary: u8,
}

impl InputHistory {
    pub fn from_buttons(buttons: InputButtons) -> Self {
        let mut history = Self::default();
        history.push_frame(buttons);
        history
    }

    /// Shift one frame of history in; the newest state lands in bit 0.
    pub fn push_frame(&mut self, buttons: InputButtons) {
        let mut shift = |mask: &mut u8, flag| {
            *mask = (*mask << 1) | u8::from(buttons.contains(flag));
        };
        shift(&mut self.up, InputButtons::UP);
        shift(&mut self.down, InputButtons::DOWN);
        shift(&mut self.left, InputButtons::LEFT);
        shift(&mut self.right, InputButtons::RIGHT);
        shift(&mut self.fire_primary, InputButtons::FIRE_PRIMARY);
        shift(&mut self.fire_secondary, InputButtons::FIRE_SECONDARY);
    }

    /// Fold the `gap` newest frames into a single button set: an action counts
    /// as pressed if it was down in any frame the server has not seen yet.
    /// Gaps beyond the 8-frame history clamp to the full mask.
    pub fn folded(&self, gap: u32) -> InputButtons {
        let gap = gap.clamp(1, 8);
        let window: u8 = if gap >= 8 { 0xFF } else { (1u8 << gap) - 1 };
        let mut buttons = InputButtons::empty();
        buttons.set(InputButtons::UP, self.up & window != 0);
        buttons.set(InputButtons::DOWN, self.down & window != 0);
        buttons.set(InputButtons::LEFT, self.left & window != 0);
        buttons.set(InputButtons::RIGHT, self.right & window != 0);
        buttons.set(InputButtons::FIRE_PRIMARY, self.fire_primary & window != 0);
        buttons.set(
            InputButtons::FIRE_SECONDARY,
            self.fire_secondary & window != 0,
        );
        buttons
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.put_u8(self.up);
        w.put_u8(self.down);
        w.put_u8(self.left);
        w.put_u8(self.right);
        w.put_u8(self.fire_primary);
        w.put_u8(self.fire_secondary);
    }

    fn decode(r: &mut PacketReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            up: r.get_u8()?,
            down: r.get_u8()?,
            left: r.get_u8()?,
            right: r.get_u8()?,
            fire_primary: r.get_u8()?,
            fire_secondary: r.get_u8()?,
        })
    }
}

/// Fixed packet header preceding the framed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sequence: u32,
    pub ack: u32,
    pub ack_bitmask: u32,
}

impl PacketHeader {
    pub fn new(sequence: u32, ack: u32, ack_bitmask: u32) -> Self {
        Self {
            sequence,
            ack,
            ack_bitmask,
        }
    }

    pub fn encode(&self, w: &mut PacketWriter) {
        w.put_u32(APP_IDENTIFIER);
        w.put_u8(PROTOCOL_REVISION);
        w.put_u32(self.sequence);
        w.put_u32(self.ack);
        w.put_u32(self.ack_bitmask);
    }

    pub fn decode(r: &mut PacketReader<'_>) -> CodecResult<Self> {
        let app = r.get_u32()?;
        if app != APP_IDENTIFIER {
            return Err(CodecError::BadAppIdentifier(app));
        }
        let revision = r.get_u8()?;
        if revision != PROTOCOL_REVISION {
            return Err(CodecError::BadRevision(revision));
        }
        Ok(Self {
            sequence: r.get_u32()?,
            ack: r.get_u32()?,
            ack_bitmask: r.get_u32()?,
        })
    }
}

const TAG_CLIENT_CONNECT: u8 = 1;
const TAG_CLIENT_REJECTED: u8 = 2;
const TAG_CLIENT_SYNCED: u8 = 3;
const TAG_DISCONNECT: u8 = 4;
const TAG_PLAYER_JOIN: u8 = 5;
const TAG_PLAYER_LEAVE: u8 = 6;
const TAG_PLAYER_NAME: u8 = 7;
const TAG_PLAYER_CHAT: u8 = 8;
const TAG_PLAYER_KILL: u8 = 9;
const TAG_PLAYER_STATS: u8 = 10;
const TAG_PLAYER_INPUT: u8 = 11;
const TAG_ENTITY_ADD: u8 = 12;
const TAG_ENTITY_REMOVE: u8 = 13;
const TAG_UPDATE_TRANSFORM: u8 = 14;
const TAG_UPDATE_ORB: u8 = 15;
const TAG_UPDATE_LIGHTING_BOLT: u8 = 16;

/// Every message the wire protocol knows. Sequenced update messages carry
/// their own per-field sequence number; everything else is numbered by the
/// connection's reliable channel when framed.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ClientConnect {
        revision: u8,
        name: String,
    },
    ClientRejected {
        reason: RejectReason,
    },
    ClientSynced {
        local_identity: NetworkIdentity,
    },
    Disconnect,
    PlayerJoin {
        identity: NetworkIdentity,
        name: String,
        kind: PlayerKind,
    },
    PlayerLeave {
        identity: NetworkIdentity,
        reason: LeaveReason,
    },
    PlayerName {
        identity: NetworkIdentity,
        name: String,
    },
    PlayerChat {
        identity: NetworkIdentity,
        text: String,
    },
    PlayerKill {
        killer: NetworkIdentity,
        victim: NetworkIdentity,
    },
    PlayerStats {
        identity: NetworkIdentity,
        kills: u16,
        deaths: u16,
        ping: u16,
        seq: u32,
    },
    PlayerInput {
        identity: NetworkIdentity,
        frame: u32,
        target: Vec2,
        history: InputHistory,
        primary: WeaponKind,
    },
    EntityAdd {
        identity: NetworkIdentity,
        owner: NetworkIdentity,
        entity_type: EntityType,
        position: Vec2,
        orientation: f32,
    },
    EntityRemove {
        identity: NetworkIdentity,
    },
    UpdateTransform {
        identity: NetworkIdentity,
        position: Vec2,
        orientation: f32,
        seq: u32,
    },
    UpdateOrb {
        identity: NetworkIdentity,
        energies: [u8; 8],
        power_up: PowerUp,
        remaining_time: f32,
        health: u8,
        primary: WeaponKind,
        secondary: WeaponKind,
        seq: u32,
    },
    UpdateLightingBolt {
        identity: NetworkIdentity,
        length: f32,
        seq: u32,
    },
}

impl Message {
    pub fn tag(&self) -> u8 {
        match self {
            Message::ClientConnect { .. } => TAG_CLIENT_CONNECT,
            Message::ClientRejected { .. } => TAG_CLIENT_REJECTED,
            Message::ClientSynced { .. } => TAG_CLIENT_SYNCED,
            Message::Disconnect => TAG_DISCONNECT,
            Message::PlayerJoin { .. } => TAG_PLAYER_JOIN,
            Message::PlayerLeave { .. } => TAG_PLAYER_LEAVE,
            Message::PlayerName { .. } => TAG_PLAYER_NAME,
            Message::PlayerChat { .. } => TAG_PLAYER_CHAT,
            Message::PlayerKill { .. } => TAG_PLAYER_KILL,
            Message::PlayerStats { .. } => TAG_PLAYER_STATS,
            Message::PlayerInput { .. } => TAG_PLAYER_INPUT,
            Message::EntityAdd { .. } => TAG_ENTITY_ADD,
            Message::EntityRemove { .. } => TAG_ENTITY_REMOVE,
            Message::UpdateTransform { .. } => TAG_UPDATE_TRANSFORM,
            Message::UpdateOrb { .. } => TAG_UPDATE_ORB,
            Message::UpdateLightingBolt { .. } => TAG_UPDATE_LIGHTING_BOLT,
        }
    }

    pub fn reliability(&self) -> Reliability {
        match self {
            Message::PlayerStats { .. }
            | Message::PlayerInput { .. }
            | Message::UpdateTransform { .. }
            | Message::UpdateOrb { .. }
            | Message::UpdateLightingBolt { .. } => Reliability::UnreliableSequenced,
            _ => Reliability::ReliableOrdered,
        }
    }

    /// The per-field sequence of an unreliable-sequenced message.
    pub fn sequence(&self) -> Option<u32> {
        match self {
            Message::PlayerStats { seq, .. }
            | Message::UpdateTransform { seq, .. }
            | Message::UpdateOrb { seq, .. }
            | Message::UpdateLightingBolt { seq, .. } => Some(*seq),
            Message::PlayerInput { frame, .. } => Some(*frame),
            _ => None,
        }
    }

    /// Channel key for sequenced filtering: message type plus the identity
    /// the update applies to.
    pub fn sequence_key(&self) -> Option<(u8, u32)> {
        match self {
            Message::PlayerStats { identity, .. }
            | Message::PlayerInput { identity, .. }
            | Message::UpdateTransform { identity, .. }
            | Message::UpdateOrb { identity, .. }
            | Message::UpdateLightingBolt { identity, .. } => {
                Some((self.tag(), identity.to_bits()))
            }
            _ => None,
        }
    }

    /// Frame the message: type tag, sequence, payload. Reliable messages use
    /// the connection-assigned `channel_seq`; sequenced ones their own.
    pub fn encode(&self, w: &mut PacketWriter, channel_seq: u32) -> CodecResult<()> {
        w.put_u8(self.tag());
        w.put_u32(self.sequence().unwrap_or(channel_seq));
        match self {
            Message::ClientConnect { revision, name } => {
                w.put_u8(*revision);
                w.put_string(name, PLAYER_NAME_LENGTH)?;
            }
            Message::ClientRejected { reason } => {
                w.put_u8(reason.to_u8());
            }
            Message::ClientSynced { local_identity } => {
                w.put_u32(local_identity.to_bits());
            }
            Message::Disconnect => {}
            Message::PlayerJoin {
                identity,
                name,
                kind,
            } => {
                w.put_u32(identity.to_bits());
                w.put_string(name, PLAYER_NAME_LENGTH)?;
                w.put_u8(kind.to_u8());
            }
            Message::PlayerLeave { identity, reason } => {
                w.put_u32(identity.to_bits());
                w.put_u8(reason.to_u8());
            }
            Message::PlayerName { identity, name } => {
                w.put_u32(identity.to_bits());
                w.put_string(name, PLAYER_NAME_LENGTH)?;
            }
            Message::PlayerChat { identity, text } => {
                w.put_u32(identity.to_bits());
                w.put_string(text, MAX_CHAT_LENGTH)?;
            }
            Message::PlayerKill { killer, victim } => {
                w.put_u32(killer.to_bits());
                w.put_u32(victim.to_bits());
            }
            Message::PlayerStats {
                identity,
                kills,
                deaths,
                ping,
                seq: _,
            } => {
                w.put_u32(identity.to_bits());
                w.put_u16(*kills);
                w.put_u16(*deaths);
                w.put_u16(*ping);
            }
            Message::PlayerInput {
                identity,
                frame: _,
                target,
                history,
                primary,
            } => {
                w.put_u32(identity.to_bits());
                w.put_vec2(*target);
                history.encode(w);
                w.put_u8(primary.to_u8());
            }
            Message::EntityAdd {
                identity,
                owner,
                entity_type,
                position,
                orientation,
            } => {
                w.put_u32(identity.to_bits());
                w.put_u32(owner.to_bits());
                w.put_u8(entity_type.to_tag());
                w.put_vec2(*position);
                w.put_f32(*orientation);
            }
            Message::EntityRemove { identity } => {
                w.put_u32(identity.to_bits());
            }
            Message::UpdateTransform {
                identity,
                position,
                orientation,
                seq: _,
            } => {
                w.put_u32(identity.to_bits());
                w.put_vec2(*position);
                w.put_f32(*orientation);
            }
            Message::UpdateOrb {
                identity,
                energies,
                power_up,
                remaining_time,
                health,
                primary,
                secondary,
                seq: _,
            } => {
                w.put_u32(identity.to_bits());
                w.put_bytes(energies);
                w.put_u8(power_up.to_u8());
                w.put_f32(*remaining_time);
                w.put_u8(*health);
                w.put_u8(primary.to_u8());
                w.put_u8(secondary.to_u8());
            }
            Message::UpdateLightingBolt {
                identity,
                length,
                seq: _,
            } => {
                w.put_u32(identity.to_bits());
                w.put_f32(*length);
            }
        }
        Ok(())
    }

    /// Decode one framed message, returning it with its wire sequence (the
    /// reliable channel sequence for reliable messages).
    pub fn decode(r: &mut PacketReader<'_>) -> CodecResult<(Self, u32)> {
        let tag = r.get_u8()?;
        let seq = r.get_u32()?;
        let message = match tag {
            TAG_CLIENT_CONNECT => Message::ClientConnect {
                revision: r.get_u8()?,
                name: r.get_string(PLAYER_NAME_LENGTH)?,
            },
            TAG_CLIENT_REJECTED => Message::ClientRejected {
                reason: RejectReason::from_u8(r.get_u8()?)?,
            },
            TAG_CLIENT_SYNCED => Message::ClientSynced {
                local_identity: NetworkIdentity::from_bits(r.get_u32()?),
            },
            TAG_DISCONNECT => Message::Disconnect,
            TAG_PLAYER_JOIN => Message::PlayerJoin {
                identity: NetworkIdentity::from_bits(r.get_u32()?),
                name: r.get_string(PLAYER_NAME_LENGTH)?,
                kind: PlayerKind::from_u8(r.get_u8()?)?,
            },
            TAG_PLAYER_LEAVE => Message::PlayerLeave {
                identity: NetworkIdentity::from_bits(r.get_u32()?),
                reason: LeaveReason::from_u8(r.get_u8()?)?,
            },
            TAG_PLAYER_NAME => Message::PlayerName {
                identity: NetworkIdentity::from_bits(r.get_u32()?),
                name: r.get_string(PLAYER_NAME_LENGTH)?,
            },
            TAG_PLAYER_CHAT => Message::PlayerChat {
                identity: NetworkIdentity::from_bits(r.get_u32()?),
                text: r.get_string(MAX_CHAT_LENGTH)?,
            },
            TAG_PLAYER_KILL => Message::PlayerKill {
                killer: NetworkIdentity::from_bits(r.get_u32()?),
                victim: NetworkIdentity::from_bits(r.get_u32()?),
            },
            TAG_PLAYER_STATS => Message::PlayerStats {
                identity: NetworkIdentity::from_bits(r.get_u32()?),
                kills: r.get_u16()?,
                deaths: r.get_u16()?,
                ping: r.get_u16()?,
                seq,
            },
            TAG_PLAYER_INPUT => Message::PlayerInput {
                identity: NetworkIdentity::from_bits(r.get_u32()?),
                frame: seq,
                target: r.get_vec2()?,
                history: InputHistory::decode(r)?,
                primary: WeaponKind::from_u8(r.get_u8()?)?,
            },
            TAG_ENTITY_ADD => Message::EntityAdd {
                identity: NetworkIdentity::from_bits(r.get_u32()?),
                owner: NetworkIdentity::from_bits(r.get_u32()?),
                entity_type: EntityType::from_tag(r.get_u8()?)?,
                position: r.get_vec2()?,
                orientation: r.get_f32()?,
            },
            TAG_ENTITY_REMOVE => Message::EntityRemove {
                identity: NetworkIdentity::from_bits(r.get_u32()?),
            },
            TAG_UPDATE_TRANSFORM => Message::UpdateTransform {
                identity: NetworkIdentity::from_bits(r.get_u32()?),
                position: r.get_vec2()?,
                orientation: r.get_f32()?,
                seq,
            },
            TAG_UPDATE_ORB => {
                let identity = NetworkIdentity::from_bits(r.get_u32()?);
                let mut energies = [0u8; 8];
                for slot in &mut energies {
                    *slot = r.get_u8()?;
                }
                Message::UpdateOrb {
                    identity,
                    energies,
                    power_up: PowerUp::from_u8(r.get_u8()?)?,
                    remaining_time: r.get_f32()?,
                    health: r.get_u8()?,
                    primary: WeaponKind::from_u8(r.get_u8()?)?,
                    secondary: WeaponKind::from_u8(r.get_u8()?)?,
                    seq,
                }
            }
            TAG_UPDATE_LIGHTING_BOLT => Message::UpdateLightingBolt {
                identity: NetworkIdentity::from_bits(r.get_u32()?),
                length: r.get_f32()?,
                seq,
            },
            _ => return Err(CodecError::UnknownMessageType(tag)),
        };
        Ok((message, seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::CollectibleKind;
    use crate::level::BlockKind;

    fn round_trip(message: Message) {
        let mut w = PacketWriter::new();
        message.encode(&mut w, 42).unwrap();
        let mut r = PacketReader::new(w.as_slice());
        let (decoded, seq) = Message::decode(&mut r).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(seq, message.sequence().unwrap_or(42));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn sequence_comparison_wraps() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(sequence_greater_than(0, u32::MAX));
        assert!(!sequence_greater_than(u32::MAX, 0));
    }

    #[test]
    fn header_round_trip() {
        let header = PacketHeader::new(9, u32::MAX, 0b1011);
        let mut w = PacketWriter::new();
        header.encode(&mut w);
        assert_eq!(w.len(), PACKET_HEADER_SIZE);

        let mut r = PacketReader::new(w.as_slice());
        assert_eq!(PacketHeader::decode(&mut r).unwrap(), header);
    }

    #[test]
    fn header_rejects_foreign_traffic() {
        let header = PacketHeader::new(1, 0, 0);
        let mut w = PacketWriter::new();
        header.encode(&mut w);

        let mut bytes = w.into_vec();
        bytes[0] ^= 0xFF;
        let mut r = PacketReader::new(&bytes);
        assert!(matches!(
            PacketHeader::decode(&mut r),
            Err(CodecError::BadAppIdentifier(_))
        ));
    }

    #[test]
    fn message_round_trips_with_boundary_values() {
        round_trip(Message::ClientConnect {
            revision: PROTOCOL_REVISION,
            name: String::new(),
        });
        round_trip(Message::PlayerJoin {
            identity: NetworkIdentity::new(u16::MAX, u16::MAX),
            name: "x".repeat(PLAYER_NAME_LENGTH),
            kind: PlayerKind::Bot,
        });
        round_trip(Message::PlayerChat {
            identity: NetworkIdentity::new(1, 0),
            text: "y".repeat(MAX_CHAT_LENGTH),
        });
        round_trip(Message::UpdateTransform {
            identity: NetworkIdentity::new(7, 3),
            position: Vec2::new(-4096.0, 0.125),
            orientation: std::f32::consts::PI,
            seq: u32::MAX,
        });
        round_trip(Message::UpdateOrb {
            identity: NetworkIdentity::new(2, 1),
            energies: [0, 1, 200, 50, 0, 0, 30, 255],
            power_up: PowerUp::QuadDamage,
            remaining_time: 19.5,
            health: 200,
            primary: WeaponKind::RocketLauncher,
            secondary: WeaponKind::MiniGun,
            seq: 1,
        });
        round_trip(Message::UpdateLightingBolt {
            identity: NetworkIdentity::new(3, 0),
            length: 900.0,
            seq: 77,
        });
        round_trip(Message::PlayerInput {
            identity: NetworkIdentity::new(1, 0),
            frame: u32::MAX,
            target: Vec2::new(10.0, -3.0),
            history: InputHistory {
                up: 0b1010_1010,
                down: 0,
                left: 0xFF,
                right: 1,
                fire_primary: 0b100,
                fire_secondary: 0,
            },
            primary: WeaponKind::LightingGun,
        });
        round_trip(Message::EntityAdd {
            identity: NetworkIdentity::new(40, 2),
            owner: NetworkIdentity::new(1, 0),
            entity_type: EntityType::Collectible(CollectibleKind::Weapon(WeaponKind::RailGun)),
            position: Vec2::new(512.0, 640.0),
            orientation: 0.0,
        });
        round_trip(Message::EntityAdd {
            identity: NetworkIdentity::new(41, 0),
            owner: crate::identity::SERVER_PLAYER_IDENTITY,
            entity_type: EntityType::Wall(BlockKind::InverseCornerBottomRight),
            position: Vec2::ZERO,
            orientation: 0.0,
        });
        round_trip(Message::PlayerStats {
            identity: NetworkIdentity::new(4, 0),
            kills: u16::MAX,
            deaths: 0,
            ping: 48,
            seq: 12,
        });
        round_trip(Message::ClientRejected {
            reason: RejectReason::Full,
        });
        round_trip(Message::Disconnect);
    }

    #[test]
    fn unknown_message_type_is_an_error() {
        let mut w = PacketWriter::new();
        w.put_u8(0xEE);
        w.put_u32(0);
        let mut r = PacketReader::new(w.as_slice());
        assert!(matches!(
            Message::decode(&mut r),
            Err(CodecError::UnknownMessageType(0xEE))
        ));
    }

    #[test]
    fn reliability_table_matches_message_classes() {
        let reliable = Message::PlayerJoin {
            identity: NetworkIdentity::new(1, 0),
            name: "a".into(),
            kind: PlayerKind::Human,
        };
        assert_eq!(reliable.reliability(), Reliability::ReliableOrdered);
        assert_eq!(reliable.sequence(), None);

        let sequenced = Message::UpdateTransform {
            identity: NetworkIdentity::new(1, 0),
            position: Vec2::ZERO,
            orientation: 0.0,
            seq: 5,
        };
        assert_eq!(sequenced.reliability(), Reliability::UnreliableSequenced);
        assert_eq!(sequenced.sequence(), Some(5));
        assert_eq!(
            sequenced.sequence_key(),
            Some((14, NetworkIdentity::new(1, 0).to_bits()))
        );
    }

    #[test]
    fn input_history_folds_frame_gaps() {
        let history = InputHistory {
            up: 0b0000_0001,
            down: 0b0000_0010,
            left: 0,
            right: 0b1000_0000,
            fire_primary: 0b0000_0100,
            fire_secondary: 0,
        };

        let gap1 = history.folded(1);
        assert!(gap1.contains(InputButtons::UP));
        assert!(!gap1.contains(InputButtons::DOWN));
        assert!(!gap1.contains(InputButtons::RIGHT));

        let gap2 = history.folded(2);
        assert!(gap2.contains(InputButtons::UP));
        assert!(gap2.contains(InputButtons::DOWN));

        let gap3 = history.folded(3);
        assert!(gap3.contains(InputButtons::FIRE_PRIMARY));

        for gap in 1..8u32 {
            assert!(!history.folded(gap).contains(InputButtons::RIGHT));
        }
        assert!(history.folded(8).contains(InputButtons::RIGHT));
        assert!(history.folded(9).contains(InputButtons::RIGHT));
        assert!(history.folded(250).contains(InputButtons::RIGHT));
    }

    #[test]
    fn push_frame_builds_history() {
        let mut history = InputHistory::default();
        history.push_frame(InputButtons::UP | InputButtons::FIRE_PRIMARY);
        history.push_frame(InputButtons::LEFT);

        assert_eq!(history.up, 0b10);
        assert_eq!(history.left, 0b01);
        assert_eq!(history.fire_primary, 0b10);
    }
}
