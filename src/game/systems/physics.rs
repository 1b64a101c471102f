use crate::game::audio::AudioCue;
use crate::game::constants::body::{
    BRAKE, BRAKE_AIRBORNE, BRAKE_GROUNDED, GRAVITY, JUMP_LIFT, JUMP_VELOCITY, MOVE_ACCELERATION,
    MOVE_SPEED, X0, X1, Y0, Y1,
};
use crate::game::constants::world::{BOUNDS_X0, BOUNDS_X1, BOUNDS_Y0, BOUNDS_Y1};
use crate::game::event::Tick;
use crate::game::state::{Player, World};

/// Per-tick inputs the physics step needs besides the world itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickContext {
    pub tick: Tick,
    /// Session seed shared by every peer
    pub seed: u64,
}

/// Move `from` toward `to` by at most `step`, never overshooting
#[inline]
pub fn reach(from: f32, to: f32, step: f32) -> f32 {
    if from < to {
        (from + step).min(to)
    } else if from > to {
        (from - step).max(to)
    } else {
        from
    }
}

/// Advance every alive body by `dt`
///
/// Bodies never interact, so iteration order does not matter. Cues are
/// returned sorted by owner so callers see the same order on every peer.
pub fn update_players(world: &mut World, dt: f32, ctx: TickContext) -> Vec<AudioCue> {
    let mut cues = Vec::new();
    for player in world.players_mut() {
        if !player.alive {
            continue;
        }
        if update_player(player, dt) {
            cues.push(AudioCue::jump(ctx.seed, ctx.tick, player.owner));
        }
    }
    cues.sort_by_key(|c| c.owner);
    cues
}

/// Integrate one body. Returns true when it jumped this step.
fn update_player(player: &mut Player, dt: f32) -> bool {
    // Integrate
    player.position += player.velocity * dt;
    player.velocity.z += GRAVITY * dt;

    // Ground
    let mut grounded = player.grounded();
    if grounded {
        player.position.z = 0.0;
        if player.velocity.z < 0.0 {
            player.velocity.z = 0.0;
        }
    }

    clamp_to_bounds(player);

    let intent = player.intent;
    let mut jumped = false;
    if grounded && intent.jumping() {
        player.position.z = JUMP_LIFT;
        player.velocity.z = JUMP_VELOCITY;
        grounded = false;
        jumped = true;
    }

    if intent.moving() {
        let dir = intent.angle();
        let step = MOVE_ACCELERATION * dt;
        player.velocity.x = reach(player.velocity.x, MOVE_SPEED * dir.cos(), step);
        player.velocity.y = reach(player.velocity.y, MOVE_SPEED * dir.sin(), step);
    } else {
        let factor = if grounded { BRAKE_GROUNDED } else { BRAKE_AIRBORNE };
        let step = BRAKE * dt * factor;
        player.velocity.x = reach(player.velocity.x, 0.0, step);
        player.velocity.y = reach(player.velocity.y, 0.0, step);
    }

    jumped
}

/// Keep the body inside the world, halving and reflecting outward velocity
fn clamp_to_bounds(player: &mut Player) {
    let (pos, vel) = (&mut player.position, &mut player.velocity);

    if pos.y + Y1 >= BOUNDS_Y1 {
        pos.y = BOUNDS_Y1 - Y1;
        if vel.y > 0.0 {
            vel.y = -vel.y / 2.0;
        }
    }
    if pos.y + Y0 <= BOUNDS_Y0 {
        pos.y = BOUNDS_Y0 - Y0;
        if vel.y < 0.0 {
            vel.y = -vel.y / 2.0;
        }
    }
    if pos.x + X0 <= BOUNDS_X0 {
        pos.x = BOUNDS_X0 - X0;
        if vel.x < 0.0 {
            vel.x = -vel.x / 2.0;
        }
    }
    if pos.x + X1 >= BOUNDS_X1 {
        pos.x = BOUNDS_X1 - X1;
        if vel.x > 0.0 {
            vel.x = -vel.x / 2.0;
        }
    }
}
