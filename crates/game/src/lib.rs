pub mod behavior;
pub mod entity;
pub mod host;
pub mod identity;
pub mod level;
pub mod net;
pub mod physics;
pub mod player;
pub mod pool;
pub mod scene;
pub mod session;

pub use behavior::{
    AiBehavior, Behavior, ColliderBehavior, PlayerInputBehavior, SpawnBehavior, WEAPON_TEMPLATES,
    WeaponBehavior, WeaponKind,
};
pub use entity::{
    CollectibleKind, Entity, EntityType, GameplayEvent, ORB_RADIUS, OrbState, PowerUp,
};
pub use host::{HostCommand, HostState, Server, ServerConfig, ServerError, ServerHost};
pub use identity::{IdentityAllocator, IdentityMap, NetworkIdentity, SERVER_PLAYER_IDENTITY};
pub use level::{BLOCK_SIZE, BlockKind, Level, LevelError, WallContact};
pub use net::{
    APP_IDENTIFIER, CONNECTION_TIMEOUT, CodecError, Connection, DEFAULT_PORT, DiscoveryBeacon,
    InputButtons, InputHistory, MAX_PACKET_SIZE, MAX_PLAYERS, MAX_RELIABLE_RESENDS, Message,
    PROTOCOL_REVISION,
    PacketHeader, PacketReader, PacketWriter, Reliability, RejectReason, SERVER_UPDATE_FREQUENCY,
    sequence_greater_than,
};
pub use physics::PhysicsSimulation;
pub use player::{ColorPool, LeaveReason, Player, PlayerKind};
pub use pool::{Pool, Reset};
pub use scene::{NodeId, SceneChange, SceneGraph};
pub use session::{Client, ClientState, GameSession, RESPAWN_DELAY};
