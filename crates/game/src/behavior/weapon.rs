use glam::Vec2;
use rand::Rng;

use crate::entity::{self, BULLET_RADIUS, Entity, EntityState, EntityType, ORB_RADIUS, ROCKET_RADIUS};
use crate::net::codec::{CodecError, CodecResult};
use crate::scene::{NodeId, SceneGraph};

use super::{Behavior, ColliderBehavior, Ctx, TimeToLiveBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponKind {
    MiniGun,
    Shotgun,
    PlasmaGun,
    RocketLauncher,
    GrenadeLauncher,
    LightingGun,
    RailGun,
    Blaster,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 8] = [
        WeaponKind::MiniGun,
        WeaponKind::Shotgun,
        WeaponKind::PlasmaGun,
        WeaponKind::RocketLauncher,
        WeaponKind::GrenadeLauncher,
        WeaponKind::LightingGun,
        WeaponKind::RailGun,
        WeaponKind::Blaster,
    ];

    /// Index of this weapon's energy slot.
    pub fn slot(&self) -> usize {
        self.to_u8() as usize
    }

    pub fn to_u8(self) -> u8 {
        match self {
            WeaponKind::MiniGun => 0,
            WeaponKind::Shotgun => 1,
            WeaponKind::PlasmaGun => 2,
            WeaponKind::RocketLauncher => 3,
            WeaponKind::GrenadeLauncher => 4,
            WeaponKind::LightingGun => 5,
            WeaponKind::RailGun => 6,
            WeaponKind::Blaster => 7,
        }
    }

    pub fn from_u8(value: u8) -> CodecResult<Self> {
        WeaponKind::ALL
            .get(value as usize)
            .copied()
            .ok_or(CodecError::UnknownTag {
                what: "weapon kind",
                value,
            })
    }

    pub fn template(&self) -> &'static WeaponTemplate {
        &WEAPON_TEMPLATES[self.slot()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileClass {
    Bullet,
    Rocket,
    Beam,
    Hitscan,
}

/// Static tuning for one weapon slot. A negative cooldown marks a continuous
/// weapon that drains one energy every `1 / deplete_speed` seconds while
/// firing; discrete weapons pay `deplete_speed` energy per shot.
#[derive(Debug, Clone, Copy)]
pub struct WeaponTemplate {
    pub kind: WeaponKind,
    pub cooldown: f32,
    pub deplete_speed: f32,
    pub max_energy: f32,
    pub damage: f32,
    pub spread: f32,
    pub range: f32,
    pub projectile_speed: f32,
    pub pellets: u32,
    pub blast_radius: f32,
    pub class: ProjectileClass,
}

pub static WEAPON_TEMPLATES: [WeaponTemplate; 8] = [
    WeaponTemplate {
        kind: WeaponKind::MiniGun,
        cooldown: 0.2,
        deplete_speed: 0.0,
        max_energy: 1.0,
        damage: 6.0,
        spread: 0.06,
        range: 1600.0,
        projectile_speed: 1300.0,
        pellets: 1,
        blast_radius: 0.0,
        class: ProjectileClass::Bullet,
    },
    WeaponTemplate {
        kind: WeaponKind::Shotgun,
        cooldown: 0.9,
        deplete_speed: 1.0,
        max_energy: 20.0,
        damage: 9.0,
        spread: 0.25,
        range: 700.0,
        projectile_speed: 1100.0,
        pellets: 6,
        blast_radius: 0.0,
        class: ProjectileClass::Bullet,
    },
    WeaponTemplate {
        kind: WeaponKind::PlasmaGun,
        cooldown: 0.15,
        deplete_speed: 1.0,
        max_energy: 150.0,
        damage: 10.0,
        spread: 0.02,
        range: 1200.0,
        projectile_speed: 900.0,
        pellets: 1,
        blast_radius: 0.0,
        class: ProjectileClass::Bullet,
    },
    WeaponTemplate {
        kind: WeaponKind::RocketLauncher,
        cooldown: 1.2,
        deplete_speed: 1.0,
        max_energy: 20.0,
        damage: 80.0,
        spread: 0.0,
        range: 2000.0,
        projectile_speed: 450.0,
        pellets: 1,
        blast_radius: 120.0,
        class: ProjectileClass::Rocket,
    },
    WeaponTemplate {
        kind: WeaponKind::GrenadeLauncher,
        cooldown: 0.8,
        deplete_speed: 1.0,
        max_energy: 25.0,
        damage: 50.0,
        spread: 0.05,
        range: 1100.0,
        projectile_speed: 600.0,
        pellets: 1,
        blast_radius: 90.0,
        class: ProjectileClass::Rocket,
    },
    WeaponTemplate {
        kind: WeaponKind::LightingGun,
        cooldown: -1.0,
        deplete_speed: 10.0,
        max_energy: 200.0,
        damage: 50.0,
        spread: 0.0,
        range: 900.0,
        projectile_speed: 0.0,
        pellets: 0,
        blast_radius: 0.0,
        class: ProjectileClass::Beam,
    },
    WeaponTemplate {
        kind: WeaponKind::RailGun,
        cooldown: 1.5,
        deplete_speed: 3.0,
        max_energy: 30.0,
        damage: 100.0,
        spread: 0.0,
        range: 2200.0,
        projectile_speed: 0.0,
        pellets: 1,
        blast_radius: 0.0,
        class: ProjectileClass::Hitscan,
    },
    WeaponTemplate {
        kind: WeaponKind::Blaster,
        cooldown: 0.4,
        deplete_speed: 1.0,
        max_energy: 100.0,
        damage: 18.0,
        spread: 0.08,
        range: 1000.0,
        projectile_speed: 800.0,
        pellets: 1,
        blast_radius: 0.0,
        class: ProjectileClass::Bullet,
    },
];

/// Firing state for one weapon slot of one orb. Lives inside the orb's
/// input behavior, indexed by weapon slot.
pub struct WeaponBehavior {
    kind: WeaponKind,
    is_firing: bool,
    remaining_cooldown: f32,
    next_deplete: f32,
    bolt: Option<NodeId>,
}

impl WeaponBehavior {
    pub fn new(kind: WeaponKind) -> Self {
        Self {
            kind,
            is_firing: false,
            remaining_cooldown: 0.0,
            next_deplete: 0.0,
            bolt: None,
        }
    }

    pub fn kind(&self) -> WeaponKind {
        self.kind
    }

    pub fn is_firing(&self) -> bool {
        self.is_firing
    }

    pub fn update(&mut self, ctx: &mut Ctx<'_>, orb: NodeId, triggered: bool, dt: f32) {
        self.remaining_cooldown -= dt;
        let template = self.kind.template();

        if template.cooldown < 0.0 {
            self.update_continuous(ctx, orb, template, triggered, dt);
        } else {
            if triggered
                && self.remaining_cooldown <= 0.0
                && orb_energy(ctx.scene, orb, self.kind) > 0.0
            {
                self.remaining_cooldown = template.cooldown;
                if template.deplete_speed > 0.0 {
                    drain_energy(ctx.scene, orb, self.kind, template.deplete_speed);
                }
                self.fire(ctx, orb, template);
            }
            self.is_firing = triggered;
        }
    }

    fn update_continuous(
        &mut self,
        ctx: &mut Ctx<'_>,
        orb: NodeId,
        template: &WeaponTemplate,
        triggered: bool,
        dt: f32,
    ) {
        let want = triggered && orb_energy(ctx.scene, orb, self.kind) > 0.0;
        if want && !self.is_firing {
            self.start_firing(ctx, orb);
        } else if !want && self.is_firing {
            self.stop_firing(ctx);
        }
        if !self.is_firing {
            return;
        }

        self.next_deplete -= dt;
        while self.next_deplete <= 0.0 {
            drain_energy(ctx.scene, orb, self.kind, 1.0);
            self.next_deplete += 1.0 / template.deplete_speed;
        }
        if orb_energy(ctx.scene, orb, self.kind) <= 0.0 {
            self.stop_firing(ctx);
            return;
        }
        self.update_beam(ctx, orb, template, dt);
    }

    fn start_firing(&mut self, ctx: &mut Ctx<'_>, orb: NodeId) {
        self.is_firing = true;
        self.next_deplete = 0.0;
        let owner = match ctx.scene.entity(orb) {
            Some(entity) => entity.owner,
            None => return,
        };
        let bolt = ctx
            .scene
            .add(orb, Vec2::ZERO, 0.0, Entity::lighting_bolt(owner));
        self.bolt = Some(bolt);
    }

    fn stop_firing(&mut self, ctx: &mut Ctx<'_>) {
        self.is_firing = false;
        if let Some(bolt) = self.bolt.take() {
            if ctx.scene.is_alive(bolt) {
                ctx.scene.remove(bolt);
            }
        }
    }

    /// Re-cast the beam ray and apply its damage over time to the orb it
    /// lands on. The beam stops at walls.
    fn update_beam(&mut self, ctx: &mut Ctx<'_>, orb: NodeId, template: &WeaponTemplate, dt: f32) {
        let Some(origin) = ctx.scene.world_position(orb) else {
            return;
        };
        let orientation = ctx.scene.orientation(orb).unwrap_or(0.0);
        let dir = Vec2::from_angle(orientation);

        let wall_length = ctx.level.ray_cast(origin, dir, template.range);
        let orbs: Vec<NodeId> = ctx.scene.pre_order_of(EntityType::Orb).collect();
        let (hit, length) = ctx.physics.ray_cast(ctx.scene, origin, dir, wall_length, |n| {
            n != orb && orbs.contains(&n)
        });

        if let Some(bolt) = self.bolt {
            if let Some(EntityState::Bolt(state)) =
                ctx.scene.entity_mut(bolt).map(|e| &mut e.state)
            {
                state.length = length;
            }
        }

        if let Some(hit) = hit {
            let (owner, multiplier) = owner_and_damage_multiplier(ctx.scene, orb);
            entity::damage_orb(
                ctx.scene,
                hit,
                template.damage * multiplier * dt,
                owner,
                ctx.events,
            );
        }
    }

    fn fire(&mut self, ctx: &mut Ctx<'_>, orb: NodeId, template: &WeaponTemplate) {
        let Some(origin) = ctx.scene.world_position(orb) else {
            return;
        };
        let orientation = ctx.scene.orientation(orb).unwrap_or(0.0);
        let (owner, multiplier) = owner_and_damage_multiplier(ctx.scene, orb);
        let damage = template.damage * multiplier;

        match template.class {
            ProjectileClass::Bullet | ProjectileClass::Rocket => {
                let root = ctx.scene.root();
                for _ in 0..template.pellets {
                    let angle = if template.spread > 0.0 {
                        orientation + ctx.rng.gen_range(-template.spread..=template.spread)
                    } else {
                        orientation
                    };
                    let dir = Vec2::from_angle(angle);
                    let velocity = dir * template.projectile_speed;
                    let (entity, radius) = if template.class == ProjectileClass::Bullet {
                        (Entity::bullet(owner, damage, velocity), BULLET_RADIUS)
                    } else {
                        (
                            Entity::rocket(owner, damage, template.blast_radius, velocity),
                            ROCKET_RADIUS,
                        )
                    };
                    let spawn = origin + dir * (ORB_RADIUS + radius + 2.0);
                    let node = ctx.scene.add(root, spawn, angle, entity);
                    ctx.scene
                        .add_behavior(node, Behavior::Collider(ColliderBehavior::new(radius)));
                    ctx.scene.add_behavior(
                        node,
                        Behavior::TimeToLive(TimeToLiveBehavior::new(
                            template.range / template.projectile_speed,
                        )),
                    );
                }
            }
            ProjectileClass::Hitscan => {
                let dir = Vec2::from_angle(orientation);
                let wall_length = ctx.level.ray_cast(origin, dir, template.range);
                let orbs: Vec<NodeId> = ctx.scene.pre_order_of(EntityType::Orb).collect();
                let (hit, _) = ctx.physics.ray_cast(ctx.scene, origin, dir, wall_length, |n| {
                    n != orb && orbs.contains(&n)
                });
                if let Some(hit) = hit {
                    entity::damage_orb(ctx.scene, hit, damage, owner, ctx.events);
                }
            }
            ProjectileClass::Beam => unreachable!("continuous weapons never take the discrete path"),
        }
    }
}

fn orb_energy(scene: &SceneGraph, orb: NodeId, kind: WeaponKind) -> f32 {
    scene
        .entity(orb)
        .and_then(|e| e.orb_state())
        .map(|o| o.energy(kind))
        .unwrap_or(0.0)
}

fn drain_energy(scene: &mut SceneGraph, orb: NodeId, kind: WeaponKind, amount: f32) {
    if let Some(state) = scene.entity_mut(orb).and_then(Entity::orb_state_mut) {
        state.drain_energy(kind, amount);
    }
}

fn owner_and_damage_multiplier(
    scene: &SceneGraph,
    orb: NodeId,
) -> (crate::identity::NetworkIdentity, f32) {
    match scene.entity(orb) {
        Some(entity) => (
            entity.owner,
            entity
                .orb_state()
                .map(|o| o.outgoing_damage_multiplier())
                .unwrap_or(1.0),
        ),
        None => (crate::identity::SERVER_PLAYER_IDENTITY, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_cover_all_weapons() {
        for (slot, kind) in WeaponKind::ALL.iter().enumerate() {
            assert_eq!(kind.slot(), slot);
            assert_eq!(WeaponKind::from_u8(slot as u8).unwrap(), *kind);
            assert_eq!(kind.template().kind, *kind);
        }
        assert!(WeaponKind::from_u8(8).is_err());
    }

    #[test]
    fn lighting_gun_is_the_continuous_weapon() {
        let template = WeaponKind::LightingGun.template();
        assert!(template.cooldown < 0.0);
        assert_eq!(template.max_energy, 200.0);
        assert_eq!(template.damage, 50.0);
        assert_eq!(template.range, 900.0);

        for kind in WeaponKind::ALL {
            if kind != WeaponKind::LightingGun {
                assert!(kind.template().cooldown >= 0.0);
            }
        }
    }
}
