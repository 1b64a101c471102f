//! Speculative advance for rendering
//!
//! Runs the simulator on a clone of the world through whatever events are
//! already buffered, covering the wall-clock time the authoritative ticks have
//! not reached yet. The result is thrown away after the frame is drawn.

use crate::game::event::Tick;
use crate::game::event_log::EventLog;
use crate::game::simulation::simulate_tick;
use crate::game::state::{PeerId, World};
use crate::game::systems::physics::TickContext;

/// Disposable world for one render frame
#[derive(Debug, Clone, Default)]
pub struct PredictedFrame {
    pub world: World,
    /// Simulated time in ticks; the fraction is the partial last step
    pub simulated_frames: f64,
    /// Simulation steps run, the partial one included
    pub steps: u32,
}

impl PredictedFrame {
    /// Whole ticks simulated ahead of the authoritative state
    pub fn whole_ticks(&self) -> u64 {
        self.simulated_frames.floor() as u64
    }
}

/// Inputs for one prediction pass
#[derive(Debug, Clone, Copy)]
pub struct PredictionParams {
    pub local_id: PeerId,
    /// First tick not yet processed authoritatively
    pub from_tick: Tick,
    /// Wall-clock seconds past the last processed tick
    pub elapsed: f64,
    /// Seconds per tick
    pub dt: f64,
    pub max_ticks: u32,
    pub seed: u64,
}

/// Fast-forward a copy of `world` through buffered events
///
/// Each step covers at most one tick of time; the last one may be partial.
/// Neither `world` nor `log` is touched, and audio cues are dropped.
pub fn predict(world: &World, log: &EventLog, params: PredictionParams) -> PredictedFrame {
    let mut frame = PredictedFrame {
        world: world.clone(),
        simulated_frames: 0.0,
        steps: 0,
    };

    let mut time = params.elapsed;
    let mut tick = params.from_tick;
    while time > 0.0 && frame.steps < params.max_ticks {
        let step = time.min(params.dt);
        let events = log.events_for_tick(tick, params.local_id);
        let ctx = TickContext {
            tick,
            seed: params.seed,
        };
        let _cues = simulate_tick(&mut frame.world, &events, step as f32, ctx);
        time -= step;
        frame.simulated_frames += step / params.dt;
        frame.steps += 1;
        tick += 1;
    }

    frame
}
