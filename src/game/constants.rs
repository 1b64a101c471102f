/// Tick timing constants
pub mod timing {
    /// Authoritative tick rate in Hz
    pub const TICK_RATE: u32 = 60;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / TICK_RATE as f32;
    /// Ticks an input is scheduled ahead so it can reach every peer in time
    pub const INPUT_DELAY: u64 = 4;
    /// Time scale applied while the net horizon is closer than half the input delay
    pub const CATCH_UP_SCALE: f64 = 1.25;
    /// Upper bound on speculative ticks simulated for one render frame
    pub const MAX_PREDICTED_TICKS: u32 = 30;
    /// A joining peer waits until every peer has confirmed this many ticks past it
    pub const JOIN_BARRIER_TICKS: u64 = 2;
}

/// World bounds (ground plane)
pub mod world {
    pub const BOUNDS_X0: f32 = 0.0;
    pub const BOUNDS_Y0: f32 = 0.0;
    pub const BOUNDS_X1: f32 = 512.0 * 4.0;
    pub const BOUNDS_Y1: f32 = 512.0 * 4.0;
    /// Map seed used by a session that seeds itself
    pub const DEFAULT_MAP_SEED: u64 = 1;
}

/// Player body and movement constants
pub mod body {
    /// Body extents relative to the player position
    pub const X0: f32 = -24.0;
    pub const X1: f32 = 24.0;
    pub const Y0: f32 = -24.0;
    pub const Y1: f32 = 24.0;

    /// Downward acceleration (units/s^2)
    pub const GRAVITY: f32 = -1000.0;
    /// Vertical velocity set by a jump
    pub const JUMP_VELOCITY: f32 = 400.0;
    /// Height a body is lifted to when it leaves the ground
    pub const JUMP_LIFT: f32 = 1.0;

    /// Target planar speed while the move bit is held
    pub const MOVE_SPEED: f32 = 500.0;
    /// Planar acceleration toward the move target (units/s^2)
    pub const MOVE_ACCELERATION: f32 = 500.0 * 16.0;
    /// Base deceleration when no move bit is held
    pub const BRAKE: f32 = 400.0;
    /// Brake multiplier on the ground
    pub const BRAKE_GROUNDED: f32 = 16.0;
    /// Brake multiplier in the air
    pub const BRAKE_AIRBORNE: f32 = 8.0;
}

/// Spawn placement ranges (picked by the joining peer, shipped in the event)
pub mod spawn {
    pub const X_RANGE: (f32, f32) = (0.0, 800.0);
    pub const Y_RANGE: (f32, f32) = (200.0, 600.0);
    pub const Z_RANGE: (f32, f32) = (0.0, 100.0);
}

/// Audio cue constants
pub mod audio {
    /// Minimum jump cue volume; the remainder is randomized
    pub const JUMP_VOLUME_BASE: f32 = 0.2;
    pub const JUMP_VOLUME_SPREAD: f32 = 0.8;
}
