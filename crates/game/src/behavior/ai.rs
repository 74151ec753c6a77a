use glam::Vec2;

use crate::entity::{EntityType, PowerUp};
use crate::net::protocol::InputButtons;
use crate::scene::NodeId;

use super::{Ctx, PlayerInputBehavior};

/// Squared distance the bot tries to keep to its target.
const STANDOFF_DISTANCE_SQ: f32 = 40_000.0;
/// Squared distance within which the bot opens fire.
const FIRE_DISTANCE_SQ: f32 = 360_000.0;

const MOVE_DEADZONE: f32 = 1.0;

/// Bot steering: picks the nearest visible orb, aims at it, keeps its
/// standoff distance and fires in range. Everything funnels through an
/// embedded input behavior, so bots drive orbs exactly the way humans do.
pub struct AiBehavior {
    input: PlayerInputBehavior,
}

impl AiBehavior {
    pub fn new() -> Self {
        Self {
            input: PlayerInputBehavior::new(),
        }
    }

    pub fn execute(&mut self, ctx: &mut Ctx<'_>, node: NodeId) {
        let Some(my_position) = ctx.scene.world_position(node) else {
            return;
        };

        let mut nearest: Option<(Vec2, f32)> = None;
        let candidates: Vec<NodeId> = ctx.scene.pre_order_of(EntityType::Orb).collect();
        for other in candidates {
            if other == node {
                continue;
            }
            let invisible = ctx
                .scene
                .entity(other)
                .and_then(|e| e.orb_state())
                .is_some_and(|orb| orb.power_up == PowerUp::Invisibility);
            if invisible {
                continue;
            }
            let Some(position) = ctx.scene.world_position(other) else {
                continue;
            };
            let distance_sq = position.distance_squared(my_position);
            if nearest.is_none_or(|(_, best)| distance_sq < best) {
                nearest = Some((position, distance_sq));
            }
        }

        let mut buttons = InputButtons::empty();
        let mut target = Vec2::ZERO;
        if let Some((position, distance_sq)) = nearest {
            let delta = position - my_position;
            target = delta;

            let move_direction = if distance_sq > STANDOFF_DISTANCE_SQ {
                delta
            } else {
                -delta
            };
            if move_direction.x > MOVE_DEADZONE {
                buttons |= InputButtons::RIGHT;
            } else if move_direction.x < -MOVE_DEADZONE {
                buttons |= InputButtons::LEFT;
            }
            if move_direction.y > MOVE_DEADZONE {
                buttons |= InputButtons::DOWN;
            } else if move_direction.y < -MOVE_DEADZONE {
                buttons |= InputButtons::UP;
            }
            if distance_sq < FIRE_DISTANCE_SQ {
                buttons |= InputButtons::FIRE_PRIMARY;
            }
        }

        self.input.handle_input(target, buttons);
        self.input.execute(ctx, node);
    }
}

impl Default for AiBehavior {
    fn default() -> Self {
        Self::new()
    }
}
