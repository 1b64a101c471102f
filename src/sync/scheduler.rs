//! Fixed-step tick scheduler
//!
//! Turns wall-clock time into whole authoritative ticks, gated by the net
//! horizon: a tick is processed only once every peer's inputs for it are known.

use crate::config::SyncConfig;
use crate::game::event::Tick;

#[derive(Debug, Clone)]
pub struct TickScheduler {
    /// Next tick to process
    tick: Tick,
    /// Highest tick all peers' inputs are known for
    net_tick: Tick,
    /// Highest local tick every peer has acknowledged
    ack_min: Tick,
    /// Wall-clock time (seconds) accounted for by processed ticks
    prev_time: f64,
    dt: f64,
    input_delay: u64,
    catch_up_scale: f64,
}

impl TickScheduler {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            tick: 0,
            net_tick: 0,
            ack_min: 0,
            prev_time: 0.0,
            dt: config.tick_duration(),
            input_delay: config.input_delay,
            catch_up_scale: config.catch_up_scale,
        }
    }

    /// Begin a new lifetime at `tick`, anchored to `now`
    pub fn start(&mut self, tick: Tick, now: f64) {
        self.tick = tick;
        self.net_tick = 0;
        self.ack_min = 0;
        self.prev_time = now;
    }

    /// Refresh the net horizon and ack floor from peer records
    ///
    /// With no peers both follow the local tick. The net tick never decreases.
    pub fn recompute(&mut self, min_confirmed: Option<Tick>, min_acknowledged: Option<Tick>) {
        let candidate = min_confirmed.unwrap_or(self.tick);
        self.net_tick = self.net_tick.max(candidate);
        self.ack_min = min_acknowledged.unwrap_or(self.tick);
    }

    /// Whole ticks of wall-clock time not yet accounted for
    pub fn frames_due(&self, now: f64) -> u64 {
        let frames = ((now - self.prev_time) / self.dt).floor();
        if frames > 0.0 {
            frames as u64
        } else {
            0
        }
    }

    /// Process due ticks up to the net horizon, calling `process` for each
    ///
    /// Returns the number of ticks processed. The clock advances by that many
    /// ticks, scaled up while the horizon is short so this peer catches up.
    pub fn run(&mut self, now: f64, mut process: impl FnMut(Tick)) -> u64 {
        let mut remaining = self.frames_due(now);
        let mut processed = 0u64;
        while self.tick <= self.net_tick && remaining > 0 {
            process(self.tick);
            self.tick += 1;
            remaining -= 1;
            processed += 1;
        }

        let lead = self.net_tick as f64 - self.tick as f64;
        let scale = if lead < self.input_delay as f64 * 0.5 {
            self.catch_up_scale
        } else {
            1.0
        };
        self.prev_time += scale * processed as f64 * self.dt;
        processed
    }

    /// Wall-clock time not yet covered by processed ticks
    pub fn elapsed(&self, now: f64) -> f64 {
        now - self.prev_time
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Last processed tick, `None` before the first one
    pub fn last_processed(&self) -> Option<Tick> {
        self.tick.checked_sub(1)
    }

    pub fn net_tick(&self) -> Tick {
        self.net_tick
    }

    pub fn ack_min(&self) -> Tick {
        self.ack_min
    }

    pub fn prev_time(&self) -> f64 {
        self.prev_time
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn input_delay(&self) -> u64 {
        self.input_delay
    }

    /// Last tick this peer has authored all inputs for
    pub fn horizon(&self) -> Tick {
        (self.tick + self.input_delay).saturating_sub(1)
    }
}
