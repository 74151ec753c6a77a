pub mod codec;
pub mod connection;
pub mod discovery;
pub mod protocol;

pub use codec::{CodecError, CodecResult, PacketReader, PacketWriter};
pub use connection::{CONNECTION_TIMEOUT, Connection, MAX_RELIABLE_RESENDS};
pub use discovery::{DISCOVERY_MULTICAST_GROUP, DISCOVERY_PORT_OFFSET, DiscoveryBeacon};
pub use protocol::{
    APP_IDENTIFIER, DEFAULT_PORT, DISCOVERY_FREQUENCY, INPUT_UPDATE_FREQUENCY, InputButtons,
    InputHistory, MAX_CHAT_LENGTH, MAX_PACKET_SIZE, MAX_PLAYERS, Message, PACKET_HEADER_SIZE,
    PLAYER_NAME_LENGTH, PLAYER_STATS_FREQUENCY, PROTOCOL_REVISION, PacketHeader, Reliability,
    RejectReason, SERVER_NAME_LENGTH, SERVER_UPDATE_FREQUENCY, sequence_greater_than,
};
