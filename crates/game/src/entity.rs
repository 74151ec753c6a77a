use glam::Vec2;

use crate::behavior::WeaponKind;
use crate::identity::NetworkIdentity;
use crate::level::BlockKind;
use crate::net::codec::{CodecError, CodecResult};
use crate::net::protocol::Message;
use crate::physics::PhysicsSimulation;
use crate::scene::{NodeId, SceneGraph};

pub const ORB_RADIUS: f32 = 32.0;
pub const BULLET_RADIUS: f32 = 6.0;
pub const ROCKET_RADIUS: f32 = 14.0;
pub const COLLECTIBLE_RADIUS: f32 = 24.0;

pub const MAX_HEALTH: f32 = 200.0;
pub const SOFT_HEALTH_CAP: f32 = 100.0;
pub const HEALTH_DECAY_RATE: f32 = 5.0;
pub const REGENERATION_RATE: f32 = 20.0;
pub const HEALTH_PICKUP_AMOUNT: f32 = 25.0;
pub const WEAPON_PICKUP_ENERGY: f32 = 50.0;

pub const QUAD_DAMAGE_MULTIPLIER: f32 = 4.0;
pub const ARMOR_DAMAGE_MULTIPLIER: f32 = 0.5;
pub const SPEED_MULTIPLIER: f32 = 1.5;

/// Temporary effect currently active on an orb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerUp {
    #[default]
    None,
    Armor,
    Regeneration,
    QuadDamage,
    Speed,
    Invisibility,
}

impl PowerUp {
    pub fn duration(&self) -> f32 {
        match self {
            PowerUp::None => 0.0,
            PowerUp::Armor => 30.0,
            PowerUp::Regeneration => 20.0,
            PowerUp::QuadDamage => 20.0,
            PowerUp::Speed => 30.0,
            PowerUp::Invisibility => 15.0,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            PowerUp::None => 0,
            PowerUp::Armor => 1,
            PowerUp::Regeneration => 2,
            PowerUp::QuadDamage => 3,
            PowerUp::Speed => 4,
            PowerUp::Invisibility => 5,
        }
    }

    pub fn from_u8(value: u8) -> CodecResult<Self> {
        Ok(match value {
            0 => PowerUp::None,
            1 => PowerUp::Armor,
            2 => PowerUp::Regeneration,
            3 => PowerUp::QuadDamage,
            4 => PowerUp::Speed,
            5 => PowerUp::Invisibility,
            _ => {
                return Err(CodecError::UnknownTag {
                    what: "power-up",
                    value,
                });
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectibleKind {
    Health,
    Armor,
    Regeneration,
    QuadDamage,
    Speed,
    Invisibility,
    Weapon(WeaponKind),
}

/// Flat type tag of an entity; also its wire representation in `EntityAdd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Orb,
    Bullet,
    Rocket,
    LightingBolt,
    Collectible(CollectibleKind),
    Wall(BlockKind),
    PlayerStart,
}

impl EntityType {
    pub fn to_tag(self) -> u8 {
        match self {
            EntityType::Orb => 0,
            EntityType::Bullet => 1,
            EntityType::Rocket => 2,
            EntityType::LightingBolt => 3,
            EntityType::Collectible(kind) => match kind {
                CollectibleKind::Health => 4,
                CollectibleKind::Armor => 5,
                CollectibleKind::Regeneration => 6,
                CollectibleKind::QuadDamage => 7,
                CollectibleKind::Speed => 8,
                CollectibleKind::Invisibility => 9,
                CollectibleKind::Weapon(weapon) => 10 + weapon.to_u8(),
            },
            EntityType::Wall(block) => 17 + block as u8,
            EntityType::PlayerStart => 30,
        }
    }

    pub fn from_tag(tag: u8) -> CodecResult<Self> {
        Ok(match tag {
            0 => EntityType::Orb,
            1 => EntityType::Bullet,
            2 => EntityType::Rocket,
            3 => EntityType::LightingBolt,
            4 => EntityType::Collectible(CollectibleKind::Health),
            5 => EntityType::Collectible(CollectibleKind::Armor),
            6 => EntityType::Collectible(CollectibleKind::Regeneration),
            7 => EntityType::Collectible(CollectibleKind::QuadDamage),
            8 => EntityType::Collectible(CollectibleKind::Speed),
            9 => EntityType::Collectible(CollectibleKind::Invisibility),
            10..=17 => EntityType::Collectible(CollectibleKind::Weapon(WeaponKind::from_u8(
                tag - 10,
            )?)),
            18..=28 => EntityType::Wall(BlockKind::from_wire(tag - 17)?),
            30 => EntityType::PlayerStart,
            _ => {
                return Err(CodecError::UnknownTag {
                    what: "entity type",
                    value: tag,
                });
            }
        })
    }
}

/// Live state of an orb: health with its soft cap, one energy store per
/// weapon slot, the selected weapons and the active power-up.
#[derive(Debug, Clone)]
pub struct OrbState {
    pub health: f32,
    pub energies: [f32; 8],
    pub primary: WeaponKind,
    pub secondary: WeaponKind,
    pub power_up: PowerUp,
    pub power_up_remaining: f32,
}

impl OrbState {
    pub fn new() -> Self {
        let mut energies = [0.0; 8];
        energies[WeaponKind::MiniGun.slot()] = WeaponKind::MiniGun.template().max_energy;
        Self {
            health: SOFT_HEALTH_CAP,
            energies,
            primary: WeaponKind::MiniGun,
            secondary: WeaponKind::MiniGun,
            power_up: PowerUp::None,
            power_up_remaining: 0.0,
        }
    }

    pub fn energy(&self, weapon: WeaponKind) -> f32 {
        self.energies[weapon.slot()]
    }

    pub fn add_energy(&mut self, weapon: WeaponKind, amount: f32) {
        let max = weapon.template().max_energy;
        let slot = &mut self.energies[weapon.slot()];
        *slot = (*slot + amount).clamp(0.0, max);
    }

    pub fn drain_energy(&mut self, weapon: WeaponKind, amount: f32) {
        self.add_energy(weapon, -amount);
    }

    pub fn set_power_up(&mut self, power_up: PowerUp) {
        self.power_up = power_up;
        self.power_up_remaining = power_up.duration();
    }

    pub fn outgoing_damage_multiplier(&self) -> f32 {
        if self.power_up == PowerUp::QuadDamage {
            QUAD_DAMAGE_MULTIPLIER
        } else {
            1.0
        }
    }

    pub fn incoming_damage_multiplier(&self) -> f32 {
        if self.power_up == PowerUp::Armor {
            ARMOR_DAMAGE_MULTIPLIER
        } else {
            1.0
        }
    }

    pub fn speed_multiplier(&self) -> f32 {
        if self.power_up == PowerUp::Speed {
            SPEED_MULTIPLIER
        } else {
            1.0
        }
    }

    pub fn wire_energies(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        for (slot, energy) in self.energies.iter().enumerate() {
            out[slot] = energy.round().clamp(0.0, 255.0) as u8;
        }
        out
    }
}

impl Default for OrbState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectileState {
    pub damage: f32,
    pub blast_radius: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoltState {
    pub length: f32,
}

/// Per-kind mutable payload.
#[derive(Debug, Clone)]
pub enum EntityState {
    Orb(OrbState),
    Projectile(ProjectileState),
    Bolt(BoltState),
    Static,
}

/// Sequence counters for the sequenced update fields an entity broadcasts.
/// Each is bumped when the field is sent, so receivers see a strictly
/// increasing series per field.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateSequences {
    transform: u32,
    orb: u32,
    bolt: u32,
}

impl UpdateSequences {
    pub fn next_transform(&mut self) -> u32 {
        self.transform = self.transform.wrapping_add(1);
        self.transform
    }

    pub fn next_orb(&mut self) -> u32 {
        self.orb = self.orb.wrapping_add(1);
        self.orb
    }

    pub fn next_bolt(&mut self) -> u32 {
        self.bolt = self.bolt.wrapping_add(1);
        self.bolt
    }
}

/// A scene-graph payload: type tag, owning player, motion state and the
/// network identity assigned when the entity enters the world.
#[derive(Debug, Clone)]
pub struct Entity {
    pub entity_type: EntityType,
    pub state: EntityState,
    pub owner: NetworkIdentity,
    pub velocity: Vec2,
    pub identity: Option<NetworkIdentity>,
    pub update_seqs: UpdateSequences,
}

impl Entity {
    fn new(entity_type: EntityType, state: EntityState, owner: NetworkIdentity) -> Self {
        Self {
            entity_type,
            state,
            owner,
            velocity: Vec2::ZERO,
            identity: None,
            update_seqs: UpdateSequences::default(),
        }
    }

    pub fn orb(owner: NetworkIdentity) -> Self {
        Self::new(EntityType::Orb, EntityState::Orb(OrbState::new()), owner)
    }

    pub fn bullet(owner: NetworkIdentity, damage: f32, velocity: Vec2) -> Self {
        let mut entity = Self::new(
            EntityType::Bullet,
            EntityState::Projectile(ProjectileState {
                damage,
                blast_radius: 0.0,
            }),
            owner,
        );
        entity.velocity = velocity;
        entity
    }

    pub fn rocket(
        owner: NetworkIdentity,
        damage: f32,
        blast_radius: f32,
        velocity: Vec2,
    ) -> Self {
        let mut entity = Self::new(
            EntityType::Rocket,
            EntityState::Projectile(ProjectileState {
                damage,
                blast_radius,
            }),
            owner,
        );
        entity.velocity = velocity;
        entity
    }

    pub fn lighting_bolt(owner: NetworkIdentity) -> Self {
        Self::new(
            EntityType::LightingBolt,
            EntityState::Bolt(BoltState::default()),
            owner,
        )
    }

    pub fn collectible(kind: CollectibleKind) -> Self {
        Self::new(
            EntityType::Collectible(kind),
            EntityState::Static,
            crate::identity::SERVER_PLAYER_IDENTITY,
        )
    }

    pub fn wall(block: BlockKind) -> Self {
        Self::new(
            EntityType::Wall(block),
            EntityState::Static,
            crate::identity::SERVER_PLAYER_IDENTITY,
        )
    }

    pub fn player_start() -> Self {
        Self::new(
            EntityType::PlayerStart,
            EntityState::Static,
            crate::identity::SERVER_PLAYER_IDENTITY,
        )
    }

    pub fn is_orb(&self) -> bool {
        self.entity_type == EntityType::Orb
    }

    pub fn orb_state(&self) -> Option<&OrbState> {
        match &self.state {
            EntityState::Orb(orb) => Some(orb),
            _ => None,
        }
    }

    pub fn orb_state_mut(&mut self) -> Option<&mut OrbState> {
        match &mut self.state {
            EntityState::Orb(orb) => Some(orb),
            _ => None,
        }
    }

    /// The sequenced update messages this entity emits each tick. Static
    /// furniture emits nothing.
    pub fn broadcast_updates(&mut self, position: Vec2, orientation: f32) -> Vec<Message> {
        let Some(identity) = self.identity else {
            return Vec::new();
        };
        match &self.state {
            EntityState::Orb(orb) => {
                let orb_msg = Message::UpdateOrb {
                    identity,
                    energies: orb.wire_energies(),
                    power_up: orb.power_up,
                    remaining_time: orb.power_up_remaining,
                    health: orb.health.round().clamp(0.0, 255.0) as u8,
                    primary: orb.primary,
                    secondary: orb.secondary,
                    seq: self.update_seqs.next_orb(),
                };
                vec![
                    Message::UpdateTransform {
                        identity,
                        position,
                        orientation,
                        seq: self.update_seqs.next_transform(),
                    },
                    orb_msg,
                ]
            }
            EntityState::Projectile(_) => vec![Message::UpdateTransform {
                identity,
                position,
                orientation,
                seq: self.update_seqs.next_transform(),
            }],
            EntityState::Bolt(bolt) => vec![Message::UpdateLightingBolt {
                identity,
                length: bolt.length,
                seq: self.update_seqs.next_bolt(),
            }],
            EntityState::Static => match self.entity_type {
                EntityType::Collectible(_) => vec![Message::UpdateTransform {
                    identity,
                    position,
                    orientation,
                    seq: self.update_seqs.next_transform(),
                }],
                _ => Vec::new(),
            },
        }
    }
}

/// Gameplay outcome surfaced by the physics and behavior passes, consumed by
/// the session at the end of the tick.
#[derive(Debug, Clone, Copy)]
pub enum GameplayEvent {
    Kill {
        killer: NetworkIdentity,
        victim: NetworkIdentity,
    },
}

/// Two colliders overlap: dispatch on both type tags. Both sides get their
/// reaction, mirroring a symmetric pairwise pass.
pub fn handle_collision(
    scene: &mut SceneGraph,
    physics: &mut PhysicsSimulation,
    a: NodeId,
    b: NodeId,
    events: &mut Vec<GameplayEvent>,
) {
    resolve_one_side(scene, physics, a, b, events);
    resolve_one_side(scene, physics, b, a, events);
}

fn resolve_one_side(
    scene: &mut SceneGraph,
    physics: &mut PhysicsSimulation,
    me: NodeId,
    other: NodeId,
    events: &mut Vec<GameplayEvent>,
) {
    let Some(my_type) = scene.entity(me).map(|e| e.entity_type) else {
        return;
    };
    let Some(other_entity) = scene.entity(other) else {
        return;
    };
    let other_is_orb = other_entity.is_orb();
    let other_owner = other_entity.owner;

    match my_type {
        EntityType::Bullet => {
            let Some(my) = scene.entity(me) else { return };
            if other_is_orb && other_owner != my.owner {
                let (owner, damage) = match &my.state {
                    EntityState::Projectile(p) => (my.owner, p.damage),
                    _ => return,
                };
                damage_orb(scene, other, damage, owner, events);
                scene.remove(me);
            }
        }
        EntityType::Rocket => {
            let Some(my_owner) = scene.entity(me).map(|e| e.owner) else {
                return;
            };
            if other_is_orb && other_owner != my_owner {
                explode_rocket(scene, physics, me, events);
            }
        }
        EntityType::Orb => {
            if other_is_orb {
                // Nudge overlapping orbs apart; each side moves half the
                // overlap.
                let (Some(my_pos), Some(other_pos)) =
                    (scene.world_position(me), scene.world_position(other))
                else {
                    return;
                };
                let delta = my_pos - other_pos;
                let dist = delta.length();
                if dist > 1e-3 {
                    let overlap = (ORB_RADIUS * 2.0 - dist).max(0.0);
                    scene.translate(me, delta / dist * (overlap * 0.5));
                }
            }
        }
        EntityType::Collectible(kind) => {
            if other_is_orb {
                apply_pickup(scene, other, kind);
                scene.remove(me);
            }
        }
        _ => {}
    }
}

/// Apply damage to an orb, honoring its armor and crediting `attacker` with
/// the kill when health reaches zero.
pub fn damage_orb(
    scene: &mut SceneGraph,
    orb_node: NodeId,
    amount: f32,
    attacker: NetworkIdentity,
    events: &mut Vec<GameplayEvent>,
) {
    if !scene.is_alive(orb_node) {
        return;
    }
    let Some(entity) = scene.entity_mut(orb_node) else {
        return;
    };
    let victim = entity.owner;
    let Some(orb) = entity.orb_state_mut() else {
        return;
    };
    if orb.health <= 0.0 {
        return;
    }
    orb.health -= amount * orb.incoming_damage_multiplier();
    if orb.health <= 0.0 {
        orb.health = 0.0;
        events.push(GameplayEvent::Kill {
            killer: attacker,
            victim,
        });
        scene.remove(orb_node);
    }
}

/// Detonate a rocket: area damage to every orb in the blast circle (its owner
/// included), then remove the rocket.
pub fn explode_rocket(
    scene: &mut SceneGraph,
    physics: &mut PhysicsSimulation,
    rocket: NodeId,
    events: &mut Vec<GameplayEvent>,
) {
    if !scene.is_alive(rocket) {
        return;
    }
    let Some(center) = scene.world_position(rocket) else {
        return;
    };
    let (owner, damage, blast_radius) = match scene.entity(rocket) {
        Some(entity) => match &entity.state {
            EntityState::Projectile(p) => (entity.owner, p.damage, p.blast_radius),
            _ => return,
        },
        None => return,
    };
    scene.remove(rocket);

    let hits: Vec<NodeId> = physics
        .entities_in_area(scene, center, blast_radius)
        .to_vec();
    for hit in hits {
        if scene.entity(hit).is_some_and(Entity::is_orb) {
            damage_orb(scene, hit, damage, owner, events);
        }
    }
}

fn apply_pickup(scene: &mut SceneGraph, orb_node: NodeId, kind: CollectibleKind) {
    let Some(orb) = scene.entity_mut(orb_node).and_then(Entity::orb_state_mut) else {
        return;
    };
    match kind {
        CollectibleKind::Health => {
            orb.health = (orb.health + HEALTH_PICKUP_AMOUNT).min(MAX_HEALTH);
        }
        CollectibleKind::Armor => orb.set_power_up(PowerUp::Armor),
        CollectibleKind::Regeneration => orb.set_power_up(PowerUp::Regeneration),
        CollectibleKind::QuadDamage => orb.set_power_up(PowerUp::QuadDamage),
        CollectibleKind::Speed => orb.set_power_up(PowerUp::Speed),
        CollectibleKind::Invisibility => orb.set_power_up(PowerUp::Invisibility),
        CollectibleKind::Weapon(weapon) => orb.add_energy(weapon, WEAPON_PICKUP_ENERGY),
    }
}

/// Reaction to a wall contact after the position was corrected: projectiles
/// die (rockets detonate), orbs slide along the surface.
pub fn handle_wall_collision(
    scene: &mut SceneGraph,
    physics: &mut PhysicsSimulation,
    node: NodeId,
    normal: Vec2,
    events: &mut Vec<GameplayEvent>,
) {
    let Some(entity_type) = scene.entity(node).map(|e| e.entity_type) else {
        return;
    };
    match entity_type {
        EntityType::Bullet => scene.remove(node),
        EntityType::Rocket => explode_rocket(scene, physics, node, events),
        EntityType::Orb => {
            if let Some(entity) = scene.entity_mut(node) {
                let into_wall = entity.velocity.dot(normal);
                if into_wall < 0.0 {
                    entity.velocity -= normal * into_wall;
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NetworkIdentity;

    #[test]
    fn entity_type_tags_round_trip() {
        let all = [
            EntityType::Orb,
            EntityType::Bullet,
            EntityType::Rocket,
            EntityType::LightingBolt,
            EntityType::Collectible(CollectibleKind::Health),
            EntityType::Collectible(CollectibleKind::Invisibility),
            EntityType::Collectible(CollectibleKind::Weapon(WeaponKind::LightingGun)),
            EntityType::Wall(BlockKind::Wall),
            EntityType::Wall(BlockKind::InverseCornerBottomRight),
            EntityType::PlayerStart,
        ];
        for entity_type in all {
            assert_eq!(
                EntityType::from_tag(entity_type.to_tag()).unwrap(),
                entity_type
            );
        }
        assert!(EntityType::from_tag(0xF0).is_err());
    }

    #[test]
    fn energy_stays_clamped() {
        let mut orb = OrbState::new();
        let max = WeaponKind::PlasmaGun.template().max_energy;

        orb.add_energy(WeaponKind::PlasmaGun, max * 3.0);
        assert_eq!(orb.energy(WeaponKind::PlasmaGun), max);

        orb.drain_energy(WeaponKind::PlasmaGun, max * 10.0);
        assert_eq!(orb.energy(WeaponKind::PlasmaGun), 0.0);
    }

    #[test]
    fn damage_respects_armor_and_kill_credit() {
        let mut scene = SceneGraph::new();
        let owner = NetworkIdentity::new(1, 0);
        let shooter = NetworkIdentity::new(2, 0);
        let root = scene.root();
        let orb = scene.add(root, Vec2::ZERO, 0.0, Entity::orb(owner));

        scene
            .entity_mut(orb)
            .unwrap()
            .orb_state_mut()
            .unwrap()
            .set_power_up(PowerUp::Armor);

        let mut events = Vec::new();
        damage_orb(&mut scene, orb, 50.0, shooter, &mut events);
        assert_eq!(
            scene
                .entity(orb)
                .unwrap()
                .orb_state()
                .unwrap()
                .health,
            75.0
        );
        assert!(events.is_empty());

        damage_orb(&mut scene, orb, 200.0, shooter, &mut events);
        assert_eq!(events.len(), 1);
        let GameplayEvent::Kill { killer, victim } = events[0];
        assert_eq!(killer, shooter);
        assert_eq!(victim, owner);
        assert!(!scene.is_alive(orb));

        // A dead orb soaks no further damage and produces no second kill.
        damage_orb(&mut scene, orb, 10.0, shooter, &mut events);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn pickups_apply_and_vanish() {
        let mut scene = SceneGraph::new();
        let mut physics = PhysicsSimulation::new();
        let root = scene.root();
        let orb = scene.add(root, Vec2::ZERO, 0.0, Entity::orb(NetworkIdentity::new(1, 0)));
        let pickup = scene.add(
            root,
            Vec2::ZERO,
            0.0,
            Entity::collectible(CollectibleKind::QuadDamage),
        );

        let mut events = Vec::new();
        handle_collision(&mut scene, &mut physics, orb, pickup, &mut events);

        let orb_state = scene.entity(orb).unwrap().orb_state().unwrap();
        assert_eq!(orb_state.power_up, PowerUp::QuadDamage);
        assert_eq!(orb_state.power_up_remaining, PowerUp::QuadDamage.duration());
        assert!(!scene.is_alive(pickup));
    }

    #[test]
    fn orb_updates_carry_increasing_sequences() {
        let mut entity = Entity::orb(NetworkIdentity::new(1, 0));
        entity.identity = Some(NetworkIdentity::new(9, 0));

        let first = entity.broadcast_updates(Vec2::ZERO, 0.0);
        let second = entity.broadcast_updates(Vec2::ONE, 0.5);
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert!(second[0].sequence().unwrap() > first[0].sequence().unwrap());
        assert!(second[1].sequence().unwrap() > first[1].sequence().unwrap());
    }

    #[test]
    fn walls_broadcast_nothing() {
        let mut entity = Entity::wall(BlockKind::Wall);
        entity.identity = Some(NetworkIdentity::new(9, 0));
        assert!(entity.broadcast_updates(Vec2::ZERO, 0.0).is_empty());
    }
}
