use glam::Vec2;

use crate::scene::NodeId;

use super::Ctx;

/// Orbits its node around a fixed center, used to give collectibles their
/// idle motion.
pub struct CircleMovementBehavior {
    center: Vec2,
    radius: f32,
    speed: f32,
    angle: f32,
}

impl CircleMovementBehavior {
    pub fn new(center: Vec2, radius: f32, speed: f32) -> Self {
        Self {
            center,
            radius,
            speed,
            angle: 0.0,
        }
    }

    pub fn execute(&mut self, ctx: &mut Ctx<'_>, node: NodeId) {
        self.angle += self.speed * ctx.dt;
        ctx.scene
            .set_position(node, self.center + Vec2::from_angle(self.angle) * self.radius);
        ctx.scene.set_orientation(node, self.angle);
    }
}

/// Removes its node once the configured lifetime has elapsed.
pub struct TimeToLiveBehavior {
    remaining: f32,
}

impl TimeToLiveBehavior {
    pub fn new(seconds: f32) -> Self {
        Self { remaining: seconds }
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    pub fn execute(&mut self, ctx: &mut Ctx<'_>, node: NodeId) {
        self.remaining -= ctx.dt;
        if self.remaining <= 0.0 {
            ctx.scene.remove(node);
        }
    }
}
