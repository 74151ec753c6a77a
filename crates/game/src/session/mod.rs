mod client;
mod logic;

pub use client::{Client, ClientState};
pub use logic::{GameSession, RESPAWN_DELAY};
