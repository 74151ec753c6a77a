use std::sync::Arc;

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::behavior::{
    self, AiBehavior, Behavior, ColliderBehavior, Ctx, PlayerInputBehavior, SpawnBehavior,
    WeaponKind,
};
use crate::entity::{
    CollectibleKind, Entity, EntityType, GameplayEvent, HEALTH_DECAY_RATE, MAX_HEALTH, ORB_RADIUS,
    PowerUp, REGENERATION_RATE, SOFT_HEALTH_CAP,
};
use crate::identity::{IdentityAllocator, IdentityMap, NetworkIdentity};
use crate::level::{BLOCK_SIZE, BlockKind, Level};
use crate::net::connection::Connection;
use crate::net::protocol::{InputButtons, MAX_CHAT_LENGTH, MAX_PLAYERS, Message, PLAYER_NAME_LENGTH};
use crate::physics::PhysicsSimulation;
use crate::player::{ColorPool, LeaveReason, Player, PlayerKind, display_equal};
use crate::scene::{NodeId, SceneChange, SceneGraph};

pub const RESPAWN_DELAY: f32 = 2.0;
const RESPAWN_ATTEMPTS: usize = 16;

/// The authoritative game state and its rules: scene, physics, players,
/// network identities and the broadcast queue the host distributes to every
/// synced client.
pub struct GameSession {
    scene: SceneGraph,
    physics: PhysicsSimulation,
    level: Level,
    entity_ids: IdentityAllocator,
    entity_index: IdentityMap<NodeId>,
    player_ids: IdentityAllocator,
    players: IdentityMap<Player>,
    colors: ColorPool,
    rng: StdRng,
    events: Vec<GameplayEvent>,
    broadcasts: Vec<Arc<Message>>,
    bot_counter: u32,
}

impl GameSession {
    pub fn new(level: Level) -> Self {
        let mut session = Self {
            scene: SceneGraph::new(),
            physics: PhysicsSimulation::new(),
            level,
            entity_ids: IdentityAllocator::new(u16::MAX as usize),
            entity_index: IdentityMap::new(u16::MAX as usize),
            player_ids: IdentityAllocator::new(MAX_PLAYERS + 1),
            players: IdentityMap::new(MAX_PLAYERS + 1),
            colors: ColorPool::new(),
            rng: StdRng::from_entropy(),
            events: Vec::new(),
            broadcasts: Vec::new(),
            bot_counter: 0,
        };
        session.populate_level();
        session.apply_scene_updates();
        // Nobody is connected yet; the furniture lands in snapshots instead.
        session.broadcasts.clear();
        session
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn physics(&self) -> &PhysicsSimulation {
        &self.physics
    }

    pub fn player(&self, identity: NetworkIdentity) -> Option<&Player> {
        self.players.get(identity)
    }

    pub fn player_mut(&mut self, identity: NetworkIdentity) -> Option<&mut Player> {
        self.players.get_mut(identity)
    }

    pub fn players(&self) -> impl Iterator<Item = (NetworkIdentity, &Player)> {
        self.players.iter()
    }

    pub fn entity_node(&self, identity: NetworkIdentity) -> Option<NodeId> {
        self.entity_index.get(identity).copied()
    }

    pub fn is_full(&self) -> bool {
        self.players.iter().filter(|(_, p)| !p.is_server).count() >= MAX_PLAYERS
    }

    // ---- tick ------------------------------------------------------------

    /// One simulation step: orb upkeep, bot respawns, physics, behaviors,
    /// then the sequenced entity update broadcast.
    pub fn update(&mut self, dt: f32) {
        self.apply_scene_updates();
        self.update_orbs(dt);
        self.update_bots(dt);
        self.physics
            .update(&mut self.scene, &self.level, &mut self.events, dt);
        self.apply_scene_updates();

        let mut ctx = Ctx {
            scene: &mut self.scene,
            physics: &mut self.physics,
            level: &self.level,
            events: &mut self.events,
            rng: &mut self.rng,
            dt,
        };
        behavior::execute_all(&mut ctx);
        self.apply_scene_updates();
        self.broadcast_entity_updates();
    }

    /// Apply deferred scene mutations and run the bookkeeping they imply:
    /// identity assignment and add/remove broadcasts for entities, physics
    /// registration for colliders, kill accounting.
    pub fn apply_scene_updates(&mut self) {
        self.scene.update();
        for change in self.scene.drain_changes() {
            match change {
                SceneChange::NodeAdded(node) => {
                    let position = self.scene.world_position(node).unwrap_or_default();
                    let orientation = self.scene.orientation(node).unwrap_or(0.0);
                    let Some(entity) = self.scene.entity_mut(node) else {
                        continue;
                    };
                    let identity = self.entity_ids.allocate();
                    entity.identity = Some(identity);
                    let owner = entity.owner;
                    let entity_type = entity.entity_type;
                    self.entity_index.insert(identity, node);
                    self.broadcast(Message::EntityAdd {
                        identity,
                        owner,
                        entity_type,
                        position,
                        orientation,
                    });
                }
                SceneChange::NodeRemoved { node, entity } => {
                    if let Some(identity) = entity.identity {
                        self.broadcast(Message::EntityRemove { identity });
                        self.entity_index.remove(identity);
                        self.entity_ids.free(identity);
                    }
                    if entity.is_orb() {
                        if let Some(player) = self.players.get_mut(entity.owner) {
                            if player.orb == Some(node) {
                                player.orb = None;
                            }
                        }
                    }
                }
                SceneChange::BehaviorAttached { node, behavior } => {
                    if let Some(b) = self.scene.behavior_mut(behavior) {
                        b.on_attached(node, &mut self.physics);
                    }
                }
                SceneChange::BehaviorDetached { node, mut behavior } => {
                    behavior.on_detached(node, &mut self.physics);
                }
            }
        }
        self.process_events();
    }

    fn process_events(&mut self) {
        for event in std::mem::take(&mut self.events) {
            match event {
                GameplayEvent::Kill { killer, victim } => {
                    if killer != victim {
                        if let Some(player) = self.players.get_mut(killer) {
                            player.kills = player.kills.saturating_add(1);
                        }
                    }
                    if let Some(player) = self.players.get_mut(victim) {
                        player.deaths = player.deaths.saturating_add(1);
                        player.respawn_delay = RESPAWN_DELAY;
                        log::debug!("{} was killed", player.name);
                    }
                    self.broadcast(Message::PlayerKill { killer, victim });
                }
            }
        }
    }

    /// Power-up timers and the health curve: regeneration climbs to the hard
    /// cap, anything above the soft cap decays back toward it.
    fn update_orbs(&mut self, dt: f32) {
        let orbs: Vec<NodeId> = self.scene.pre_order_of(EntityType::Orb).collect();
        for node in orbs {
            let Some(orb) = self.scene.entity_mut(node).and_then(Entity::orb_state_mut) else {
                continue;
            };
            if orb.power_up != PowerUp::None {
                orb.power_up_remaining -= dt;
                if orb.power_up_remaining <= 0.0 {
                    orb.power_up = PowerUp::None;
                    orb.power_up_remaining = 0.0;
                }
            }
            if orb.power_up == PowerUp::Regeneration {
                orb.health = (orb.health + REGENERATION_RATE * dt).min(MAX_HEALTH);
            } else if orb.health > SOFT_HEALTH_CAP {
                orb.health = (orb.health - HEALTH_DECAY_RATE * dt).max(SOFT_HEALTH_CAP);
            }
        }
    }

    fn update_bots(&mut self, dt: f32) {
        let bots: Vec<NetworkIdentity> = self
            .players
            .iter()
            .filter(|(_, p)| p.kind == PlayerKind::Bot && p.orb.is_none())
            .map(|(identity, _)| identity)
            .collect();
        for bot in bots {
            self.tick_respawn(bot, dt);
        }
    }

    // ---- players ---------------------------------------------------------

    /// Create a player with a session-unique name and a palette color, and
    /// announce the join.
    pub fn create_player(&mut self, name: &str, kind: PlayerKind) -> NetworkIdentity {
        debug_assert!(!self.is_full(), "capacity is checked before creation");
        let name = self.unique_name(name);
        let identity = self.player_ids.allocate();
        let color = self
            .colors
            .acquire()
            .expect("the palette outlasts the player cap");
        self.players
            .insert(identity, Player::new(identity, name.clone(), kind, color));
        self.broadcast(Message::PlayerJoin {
            identity,
            name: name.clone(),
            kind,
        });
        log::info!("player {name} joined as {identity}");
        identity
    }

    /// Remove a player and everything they own, then announce the leave.
    pub fn remove_player(&mut self, identity: NetworkIdentity, reason: LeaveReason) {
        if self.players.get(identity).is_none() {
            return;
        }
        let owned: Vec<NodeId> = {
            let traversal = self.scene.pre_order();
            traversal
                .filter(|&node| {
                    self.scene
                        .entity(node)
                        .is_some_and(|e| e.owner == identity)
                })
                .collect()
        };
        for node in owned {
            if self.scene.is_alive(node) {
                self.scene.remove(node);
            }
        }
        self.apply_scene_updates();

        self.broadcast(Message::PlayerLeave { identity, reason });
        if let Some(player) = self.players.remove(identity) {
            self.colors.release(player.color);
            self.player_ids.free(identity);
            log::info!("player {} left: {}", player.name, reason.as_str());
        }
    }

    /// Make `base` unique among the present non-server players,
    /// case-insensitively, by appending " (n)".
    fn unique_name(&self, base: &str) -> String {
        let mut base = base.trim().to_owned();
        while base.len() > PLAYER_NAME_LENGTH {
            base.pop();
        }
        if base.is_empty() {
            base = "Player".to_owned();
        }
        if !self.name_taken(&base) {
            return base;
        }
        for n in 2u32.. {
            let suffix = format!(" ({n})");
            let mut stem = base.clone();
            while stem.len() + suffix.len() > PLAYER_NAME_LENGTH {
                stem.pop();
            }
            let candidate = format!("{stem}{suffix}");
            if !self.name_taken(&candidate) {
                return candidate;
            }
        }
        unreachable!("a free suffix always exists");
    }

    fn name_taken(&self, name: &str) -> bool {
        self.players
            .iter()
            .any(|(_, p)| !p.is_server && display_equal(&p.name, name))
    }

    /// Tick the respawn delay of a player without a live orb and try to
    /// respawn once it reaches zero.
    pub fn tick_respawn(&mut self, identity: NetworkIdentity, dt: f32) {
        let Some(player) = self.players.get_mut(identity) else {
            return;
        };
        if player.orb.is_some() {
            return;
        }
        player.respawn_delay = (player.respawn_delay - dt).max(0.0);
        self.respawn_player(identity);
    }

    /// Pick a random player start not blocked by another orb; give up after a
    /// bounded number of attempts and try again next tick.
    pub fn respawn_player(&mut self, identity: NetworkIdentity) {
        let Some(player) = self.players.get(identity) else {
            return;
        };
        if player.orb.is_some() || player.respawn_delay > 0.0 {
            return;
        }
        let kind = player.kind;
        let starts: Vec<usize> = self.level.player_starts().to_vec();
        if starts.is_empty() {
            return;
        }

        for _ in 0..RESPAWN_ATTEMPTS {
            let index = starts[self.rng.gen_range(0..starts.len())];
            let position = self.level.block_center(index);
            let occupied = self
                .physics
                .entities_in_area(&self.scene, position, ORB_RADIUS)
                .iter()
                .any(|&node| self.scene.entity(node).is_some_and(Entity::is_orb));
            if !occupied {
                self.spawn_orb(identity, kind, position);
                return;
            }
        }
        log::debug!("no free player start for {identity} this tick");
    }

    fn spawn_orb(&mut self, identity: NetworkIdentity, kind: PlayerKind, position: Vec2) {
        let root = self.scene.root();
        let node = self.scene.add(root, position, 0.0, Entity::orb(identity));
        self.scene
            .add_behavior(node, Behavior::Collider(ColliderBehavior::new(ORB_RADIUS)));
        let brain = match kind {
            PlayerKind::Human => Behavior::PlayerInput(PlayerInputBehavior::new()),
            PlayerKind::Bot => Behavior::AiDecision(AiBehavior::new()),
        };
        self.scene.add_behavior(node, brain);
        if let Some(player) = self.players.get_mut(identity) {
            player.orb = Some(node);
        }
    }

    /// Resolve one folded input frame onto the player's orb. Without an orb
    /// the input is ignored. The primary weapon only switches to a slot with
    /// energy; the previous primary becomes the secondary.
    pub fn handle_player_input(
        &mut self,
        identity: NetworkIdentity,
        target: Vec2,
        buttons: InputButtons,
        primary: WeaponKind,
    ) {
        let Some(orb_node) = self.players.get(identity).and_then(|p| p.orb) else {
            return;
        };
        if let Some(orb) = self.scene.entity_mut(orb_node).and_then(Entity::orb_state_mut) {
            if primary != orb.primary && orb.energy(primary) > 0.0 {
                orb.secondary = orb.primary;
                orb.primary = primary;
            }
        }
        for behavior in self.scene.node_behaviors(orb_node) {
            if let Some(input) = self
                .scene
                .behavior_mut(behavior)
                .and_then(Behavior::as_player_input_mut)
            {
                input.handle_input(target, buttons);
                break;
            }
        }
    }

    /// Uniquify and apply a rename; silently keeps the current name when the
    /// request is display-equal to it.
    pub fn rename_player(&mut self, identity: NetworkIdentity, name: &str) {
        let Some(player) = self.players.get(identity) else {
            return;
        };
        if display_equal(&player.name, name.trim()) {
            return;
        }
        let unique = self.unique_name(name);
        if let Some(player) = self.players.get_mut(identity) {
            player.name = unique.clone();
        }
        self.broadcast(Message::PlayerName {
            identity,
            name: unique,
        });
    }

    pub fn chat(&mut self, identity: NetworkIdentity, text: String) {
        let mut text = text;
        while text.len() > MAX_CHAT_LENGTH {
            text.pop();
        }
        self.broadcast(Message::PlayerChat { identity, text });
    }

    pub fn set_player_ping(&mut self, identity: NetworkIdentity, ping: u16) {
        if let Some(player) = self.players.get_mut(identity) {
            player.ping = ping;
        }
    }

    // ---- broadcasting ----------------------------------------------------

    /// Everything a fresh client needs: every present player, every entity in
    /// pre-order, and finally the sync marker with the client's own identity.
    /// The client's own join is not repeated here; it is already queued as a
    /// broadcast and follows the snapshot on the same reliable channel.
    pub fn send_state_snapshot(
        &mut self,
        connection: &mut Connection,
        client_player: NetworkIdentity,
    ) {
        for (identity, player) in self.players.iter() {
            if player.is_server || identity == client_player {
                continue;
            }
            connection.enqueue(Arc::new(Message::PlayerJoin {
                identity,
                name: player.name.clone(),
                kind: player.kind,
            }));
        }
        let entities: Vec<NodeId> = self.scene.pre_order().collect();
        for node in entities {
            let Some(entity) = self.scene.entity(node) else {
                continue;
            };
            let Some(identity) = entity.identity else {
                continue;
            };
            connection.enqueue(Arc::new(Message::EntityAdd {
                identity,
                owner: entity.owner,
                entity_type: entity.entity_type,
                position: self.scene.world_position(node).unwrap_or_default(),
                orientation: self.scene.orientation(node).unwrap_or(0.0),
            }));
        }
        connection.enqueue(Arc::new(Message::ClientSynced {
            local_identity: client_player,
        }));
    }

    fn broadcast_entity_updates(&mut self) {
        let nodes: Vec<NodeId> = self.scene.pre_order().collect();
        for node in nodes {
            let position = self.scene.world_position(node).unwrap_or_default();
            let orientation = self.scene.orientation(node).unwrap_or(0.0);
            let Some(entity) = self.scene.entity_mut(node) else {
                continue;
            };
            for message in entity.broadcast_updates(position, orientation) {
                self.broadcasts.push(Arc::new(message));
            }
        }
    }

    /// Per-player stats with freshly computed ranks, at the stats cadence.
    pub fn broadcast_player_stats(&mut self) {
        let mut standings: Vec<(NetworkIdentity, u16)> = self
            .players
            .iter()
            .filter(|(_, p)| !p.is_server)
            .map(|(identity, p)| (identity, p.kills))
            .collect();
        standings.sort_by(|a, b| b.1.cmp(&a.1));
        for (position, (identity, _)) in standings.iter().enumerate() {
            if let Some(player) = self.players.get_mut(*identity) {
                player.rank = position as u16 + 1;
            }
        }

        let mut messages = Vec::new();
        for (identity, player) in self.players.iter_mut() {
            if player.is_server {
                continue;
            }
            player.stats_seq = player.stats_seq.wrapping_add(1);
            messages.push(Message::PlayerStats {
                identity,
                kills: player.kills,
                deaths: player.deaths,
                ping: player.ping,
                seq: player.stats_seq,
            });
        }
        for message in messages {
            self.broadcast(message);
        }
    }

    pub fn drain_broadcasts(&mut self) -> Vec<Arc<Message>> {
        std::mem::take(&mut self.broadcasts)
    }

    fn broadcast(&mut self, message: Message) {
        self.broadcasts.push(Arc::new(message));
    }

    // ---- bots ------------------------------------------------------------

    pub fn add_bot(&mut self) -> Option<NetworkIdentity> {
        if self.is_full() {
            log::warn!("cannot add a bot: the session is full");
            return None;
        }
        self.bot_counter += 1;
        let name = format!("Bot {}", self.bot_counter);
        Some(self.create_player(&name, PlayerKind::Bot))
    }

    pub fn remove_bot(&mut self) -> bool {
        let bot = self
            .players
            .iter()
            .filter(|(_, p)| p.kind == PlayerKind::Bot)
            .map(|(identity, _)| identity)
            .last();
        match bot {
            Some(identity) => {
                self.remove_player(identity, LeaveReason::Disconnect);
                true
            }
            None => false,
        }
    }

    pub fn dispose(&mut self) {
        self.scene.dispose();
        self.broadcasts.clear();
        self.events.clear();
    }

    // ---- level furniture -------------------------------------------------

    fn populate_level(&mut self) {
        let root = self.scene.root();
        let blocks: Vec<(i32, i32, BlockKind)> = self.level.blocks().collect();
        for (x, y, kind) in blocks {
            let center = Vec2::new(
                (x as f32 + 0.5) * BLOCK_SIZE,
                (y as f32 + 0.5) * BLOCK_SIZE,
            );
            if kind.is_solid() {
                self.scene.add(root, center, 0.0, Entity::wall(kind));
            } else if kind == BlockKind::PlayerStart {
                self.scene.add(root, center, 0.0, Entity::player_start());
            }
        }
        for (kind, position) in default_collectible_spots(&self.level) {
            self.scene
                .add_behavior(root, Behavior::Spawn(SpawnBehavior::new(kind, position)));
        }
    }
}

/// Collectible layout for a level: spread over fixed fractions of the
/// playable area.
fn default_collectible_spots(level: &Level) -> Vec<(CollectibleKind, Vec2)> {
    let size = level.world_size();
    let at = |fx: f32, fy: f32| Vec2::new(size.x * fx, size.y * fy);
    vec![
        (CollectibleKind::Health, at(0.2, 0.2)),
        (CollectibleKind::Health, at(0.8, 0.8)),
        (CollectibleKind::Armor, at(0.8, 0.2)),
        (CollectibleKind::Regeneration, at(0.2, 0.8)),
        (CollectibleKind::QuadDamage, at(0.5, 0.25)),
        (CollectibleKind::Speed, at(0.5, 0.75)),
        (CollectibleKind::Invisibility, at(0.25, 0.5)),
        (
            CollectibleKind::Weapon(WeaponKind::RocketLauncher),
            at(0.75, 0.5),
        ),
        (
            CollectibleKind::Weapon(WeaponKind::LightingGun),
            at(0.35, 0.35),
        ),
        (CollectibleKind::Weapon(WeaponKind::RailGun), at(0.65, 0.65)),
        (CollectibleKind::Weapon(WeaponKind::Shotgun), at(0.65, 0.35)),
        (
            CollectibleKind::Weapon(WeaponKind::PlasmaGun),
            at(0.35, 0.65),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> GameSession {
        GameSession::new(Level::arena())
    }

    fn connect(session: &mut GameSession, name: &str) -> NetworkIdentity {
        let identity = session.create_player(name, PlayerKind::Human);
        session.tick_respawn(identity, 0.0);
        session.apply_scene_updates();
        identity
    }

    #[test]
    fn entity_identities_stay_consistent() {
        let mut session = session();
        let player = connect(&mut session, "alice");

        let orb = session.player(player).unwrap().orb.unwrap();
        let identity = session.scene().entity(orb).unwrap().identity.unwrap();
        assert_eq!(session.entity_node(identity), Some(orb));

        for node in session.scene().pre_order() {
            let Some(entity) = session.scene().entity(node) else {
                continue;
            };
            let identity = entity.identity.unwrap();
            assert_eq!(session.entity_node(identity), Some(node));
        }
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let mut session = session();
        let a = session.create_player("alice", PlayerKind::Human);
        let b = session.create_player("Alice", PlayerKind::Human);
        let c = session.create_player("ALICE", PlayerKind::Human);

        assert_eq!(session.player(a).unwrap().name, "alice");
        assert_eq!(session.player(b).unwrap().name, "Alice (2)");
        assert_eq!(session.player(c).unwrap().name, "ALICE (3)");
    }

    #[test]
    fn player_capacity_is_enforced() {
        let mut session = session();
        for n in 0..MAX_PLAYERS {
            assert!(!session.is_full());
            session.create_player(&format!("p{n}"), PlayerKind::Human);
        }
        assert!(session.is_full());
        assert!(session.add_bot().is_none());
    }

    #[test]
    fn leaving_releases_entities_color_and_identity() {
        let mut session = session();
        let player = connect(&mut session, "alice");
        let orb = session.player(player).unwrap().orb.unwrap();
        session.drain_broadcasts();

        session.remove_player(player, LeaveReason::Disconnect);
        assert!(session.player(player).is_none());
        assert!(!session.scene().contains(orb));
        assert_eq!(session.colors.available(), 9);

        let broadcasts = session.drain_broadcasts();
        assert!(broadcasts.iter().any(|m| matches!(
            **m,
            Message::PlayerLeave {
                reason: LeaveReason::Disconnect,
                ..
            }
        )));
        assert!(
            broadcasts
                .iter()
                .any(|m| matches!(**m, Message::EntityRemove { .. }))
        );
    }

    #[test]
    fn respawn_honors_the_delay() {
        let mut session = session();
        let player = connect(&mut session, "alice");
        assert!(session.player(player).unwrap().orb.is_some());

        // Kill the orb by brute force.
        let orb = session.player(player).unwrap().orb.unwrap();
        crate::entity::damage_orb(
            &mut session.scene,
            orb,
            10_000.0,
            player,
            &mut session.events,
        );
        session.apply_scene_updates();
        assert!(session.player(player).unwrap().orb.is_none());
        assert_eq!(session.player(player).unwrap().respawn_delay, RESPAWN_DELAY);

        session.tick_respawn(player, 0.5);
        assert!(session.player(player).unwrap().orb.is_none());
        session.tick_respawn(player, RESPAWN_DELAY);
        assert!(session.player(player).unwrap().orb.is_some());
    }

    #[test]
    fn respawn_rejects_occupied_starts() {
        let mut session = session();
        let blocker = connect(&mut session, "blocker");

        // Park an orb on every start.
        let starts: Vec<usize> = session.level().player_starts().to_vec();
        for start in &starts {
            let position = session.level().block_center(*start);
            let root = session.scene.root();
            let node = session
                .scene
                .add(root, position, 0.0, Entity::orb(blocker));
            session
                .scene
                .add_behavior(node, Behavior::Collider(ColliderBehavior::new(ORB_RADIUS)));
        }
        session.apply_scene_updates();

        let victim = session.create_player("victim", PlayerKind::Human);
        session.tick_respawn(victim, 0.0);
        session.apply_scene_updates();
        assert!(session.player(victim).unwrap().orb.is_none());
    }

    #[test]
    fn kills_update_stats_and_broadcast() {
        let mut session = session();
        let killer = connect(&mut session, "killer");
        let victim = connect(&mut session, "victim");
        session.drain_broadcasts();

        let victim_orb = session.player(victim).unwrap().orb.unwrap();
        crate::entity::damage_orb(
            &mut session.scene,
            victim_orb,
            10_000.0,
            killer,
            &mut session.events,
        );
        session.apply_scene_updates();

        assert_eq!(session.player(killer).unwrap().kills, 1);
        assert_eq!(session.player(victim).unwrap().deaths, 1);
        assert!(session.drain_broadcasts().iter().any(|m| matches!(
            **m,
            Message::PlayerKill { .. }
        )));
    }

    #[test]
    fn primary_switch_requires_energy() {
        let mut session = session();
        let player = connect(&mut session, "alice");
        let orb_node = session.player(player).unwrap().orb.unwrap();

        session.handle_player_input(
            player,
            Vec2::ZERO,
            InputButtons::empty(),
            WeaponKind::RailGun,
        );
        let orb = session
            .scene()
            .entity(orb_node)
            .unwrap()
            .orb_state()
            .unwrap();
        assert_eq!(orb.primary, WeaponKind::MiniGun);

        session
            .scene
            .entity_mut(orb_node)
            .unwrap()
            .orb_state_mut()
            .unwrap()
            .add_energy(WeaponKind::RailGun, 30.0);
        session.handle_player_input(
            player,
            Vec2::ZERO,
            InputButtons::empty(),
            WeaponKind::RailGun,
        );
        let orb = session
            .scene()
            .entity(orb_node)
            .unwrap()
            .orb_state()
            .unwrap();
        assert_eq!(orb.primary, WeaponKind::RailGun);
        assert_eq!(orb.secondary, WeaponKind::MiniGun);
    }

    #[test]
    fn bots_join_respawn_and_leave() {
        let mut session = session();
        let bot = session.add_bot().unwrap();
        assert_eq!(session.player(bot).unwrap().name, "Bot 1");

        session.update(1.0 / 30.0);
        assert!(session.player(bot).unwrap().orb.is_some());

        assert!(session.remove_bot());
        assert!(session.player(bot).is_none());
        assert!(!session.remove_bot());
    }

    #[test]
    fn snapshot_covers_every_entity_before_sync() {
        let mut session = session();
        let player = connect(&mut session, "alice");

        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_nonblocking(true).unwrap();
        let remote = socket.local_addr().unwrap();
        let mut connection = Connection::new(std::sync::Arc::new(socket), remote);

        session.send_state_snapshot(&mut connection, player);

        let entity_count = session
            .scene()
            .pre_order()
            .filter(|&n| session.scene().entity(n).is_some())
            .count();
        // One add per entity plus the sync marker; the client's own join
        // travels as a broadcast instead.
        assert_eq!(connection.reliable_pending(), entity_count + 1);
    }
}
