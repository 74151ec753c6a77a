use glam::Vec2;

use crate::entity::Entity;
use crate::net::protocol::InputButtons;
use crate::scene::NodeId;

use super::{Ctx, WeaponBehavior, WeaponKind};

pub const INPUT_ACCELERATION: f32 = 10_000.0;
pub const DRAG_PER_TICK: f32 = 0.85;
pub const MAX_SPEED: f32 = 4000.0;

const AIM_DEADZONE_SQ: f32 = 10.0;

/// Turns the folded input of one player into orb motion and weapon triggers.
/// Owns the eight weapon sub-behaviors, indexed by weapon slot.
pub struct PlayerInputBehavior {
    weapons: [WeaponBehavior; 8],
    accel: Vec2,
    target: Vec2,
    fire_primary: bool,
    fire_secondary: bool,
}

impl PlayerInputBehavior {
    pub fn new() -> Self {
        Self {
            weapons: std::array::from_fn(|slot| WeaponBehavior::new(WeaponKind::ALL[slot])),
            accel: Vec2::ZERO,
            target: Vec2::ZERO,
            fire_primary: false,
            fire_secondary: false,
        }
    }

    pub fn weapon(&self, kind: WeaponKind) -> &WeaponBehavior {
        &self.weapons[kind.slot()]
    }

    /// Latch the folded input state for the coming tick.
    pub fn handle_input(&mut self, target: Vec2, buttons: InputButtons) {
        let mut direction = Vec2::ZERO;
        if buttons.contains(InputButtons::UP) {
            direction.y -= 1.0;
        }
        if buttons.contains(InputButtons::DOWN) {
            direction.y += 1.0;
        }
        if buttons.contains(InputButtons::LEFT) {
            direction.x -= 1.0;
        }
        if buttons.contains(InputButtons::RIGHT) {
            direction.x += 1.0;
        }
        self.accel = direction.normalize_or_zero();
        self.target = target;
        self.fire_primary = buttons.contains(InputButtons::FIRE_PRIMARY);
        self.fire_secondary = buttons.contains(InputButtons::FIRE_SECONDARY);
    }

    pub fn execute(&mut self, ctx: &mut Ctx<'_>, node: NodeId) {
        let dt = ctx.dt;

        let Some(entity) = ctx.scene.entity_mut(node) else {
            return;
        };
        let multiplier = entity
            .orb_state()
            .map(|orb| orb.speed_multiplier())
            .unwrap_or(1.0);
        let mut velocity = entity.velocity + self.accel * INPUT_ACCELERATION * multiplier * dt;
        velocity *= DRAG_PER_TICK;
        entity.velocity = velocity.clamp_length_max(MAX_SPEED * multiplier);

        if self.target.length_squared() > AIM_DEADZONE_SQ {
            ctx.scene
                .set_orientation(node, self.target.y.atan2(self.target.x));
        }

        let Some((primary, secondary)) = ctx
            .scene
            .entity(node)
            .and_then(Entity::orb_state)
            .map(|orb| (orb.primary, orb.secondary))
        else {
            return;
        };
        for slot in 0..self.weapons.len() {
            let kind = self.weapons[slot].kind();
            let triggered = (kind == primary && self.fire_primary)
                || (kind == secondary && self.fire_secondary);
            self.weapons[slot].update(ctx, node, triggered, dt);
        }
    }
}

impl Default for PlayerInputBehavior {
    fn default() -> Self {
        Self::new()
    }
}
