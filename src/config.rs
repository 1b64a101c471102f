use crate::game::constants::{timing, world};

/// Lockstep timing configuration shared by every session in a process
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Authoritative ticks per second
    pub tick_rate: u32,
    /// Ticks between capturing an input and the tick it applies to
    pub input_delay: u64,
    /// Time scale used while the net horizon runs short
    pub catch_up_scale: f64,
    /// Cap on speculative ticks simulated per render frame
    pub max_predicted_ticks: u32,
    /// Map seed used when this peer seeds a new session
    pub map_seed: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_rate: timing::TICK_RATE,
            input_delay: timing::INPUT_DELAY,
            catch_up_scale: timing::CATCH_UP_SCALE,
            max_predicted_ticks: timing::MAX_PREDICTED_TICKS,
            map_seed: world::DEFAULT_MAP_SEED,
        }
    }
}

impl SyncConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(rate) = std::env::var("TICK_RATE") {
            match rate.parse::<u32>() {
                Ok(parsed) if (1..=1000).contains(&parsed) => config.tick_rate = parsed,
                Ok(_) => tracing::warn!("TICK_RATE must be 1-1000, using default"),
                Err(_) => tracing::warn!("Invalid TICK_RATE '{}', using default", rate),
            }
        }

        if let Ok(delay) = std::env::var("INPUT_DELAY") {
            match delay.parse::<u64>() {
                Ok(parsed) if (1..=120).contains(&parsed) => config.input_delay = parsed,
                Ok(_) => tracing::warn!("INPUT_DELAY must be 1-120, using default"),
                Err(_) => tracing::warn!("Invalid INPUT_DELAY '{}', using default", delay),
            }
        }

        if let Ok(scale) = std::env::var("CATCH_UP_SCALE") {
            match scale.parse::<f64>() {
                Ok(parsed) if parsed.is_finite() && parsed >= 1.0 => {
                    config.catch_up_scale = parsed
                }
                Ok(_) => tracing::warn!("CATCH_UP_SCALE must be >= 1.0, using default"),
                Err(_) => tracing::warn!("Invalid CATCH_UP_SCALE '{}', using default", scale),
            }
        }

        if let Ok(max) = std::env::var("MAX_PREDICTED_TICKS") {
            if let Ok(parsed) = max.parse::<u32>() {
                config.max_predicted_ticks = parsed;
            } else {
                tracing::warn!("Invalid MAX_PREDICTED_TICKS '{}', using default", max);
            }
        }

        if let Ok(seed) = std::env::var("MAP_SEED") {
            if let Ok(parsed) = seed.parse::<u64>() {
                config.map_seed = parsed;
            } else {
                tracing::warn!("Invalid MAP_SEED '{}', using default", seed);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if self.input_delay == 0 {
            return Err("input_delay must be at least 1".to_string());
        }
        if !self.catch_up_scale.is_finite() || self.catch_up_scale < 1.0 {
            return Err("catch_up_scale must be a finite value >= 1.0".to_string());
        }
        Ok(())
    }

    /// Seconds per tick
    #[inline]
    pub fn tick_duration(&self) -> f64 {
        1.0 / self.tick_rate as f64
    }
}

/// Settings for the in-process mesh demo
#[derive(Debug, Clone, PartialEq)]
pub struct MeshConfig {
    /// Number of peers to start
    pub peer_count: usize,
    /// Wall-clock run time in seconds
    pub run_seconds: f64,
    /// Delay between consecutive peers joining
    pub join_interval_ms: u64,
    /// Render frames per second each peer runs at
    pub frame_rate: u32,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            peer_count: 3,
            run_seconds: 5.0,
            join_interval_ms: 500,
            frame_rate: 60,
        }
    }
}

impl MeshConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(count) = std::env::var("PEER_COUNT") {
            match count.parse::<usize>() {
                Ok(parsed) if (1..=64).contains(&parsed) => config.peer_count = parsed,
                Ok(_) => tracing::warn!("PEER_COUNT must be 1-64, using default"),
                Err(_) => tracing::warn!("Invalid PEER_COUNT '{}', using default", count),
            }
        }

        if let Ok(seconds) = std::env::var("RUN_SECONDS") {
            match seconds.parse::<f64>() {
                Ok(parsed) if parsed.is_finite() && parsed > 0.0 => config.run_seconds = parsed,
                Ok(_) => tracing::warn!("RUN_SECONDS must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid RUN_SECONDS '{}', using default", seconds),
            }
        }

        if let Ok(interval) = std::env::var("JOIN_INTERVAL_MS") {
            if let Ok(parsed) = interval.parse::<u64>() {
                config.join_interval_ms = parsed;
            } else {
                tracing::warn!("Invalid JOIN_INTERVAL_MS '{}', using default", interval);
            }
        }

        if let Ok(rate) = std::env::var("FRAME_RATE") {
            match rate.parse::<u32>() {
                Ok(parsed) if (1..=1000).contains(&parsed) => config.frame_rate = parsed,
                Ok(_) => tracing::warn!("FRAME_RATE must be 1-1000, using default"),
                Err(_) => tracing::warn!("Invalid FRAME_RATE '{}', using default", rate),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.peer_count == 0 {
            return Err("peer_count must be at least 1".to_string());
        }
        if self.frame_rate == 0 {
            return Err("frame_rate must be at least 1".to_string());
        }
        if !self.run_seconds.is_finite() || self.run_seconds <= 0.0 {
            return Err("run_seconds must be positive".to_string());
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.frame_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.input_delay, 4);
        assert_eq!(config.catch_up_scale, 1.25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = SyncConfig::load_or_default();
        assert!(config.tick_rate > 0);
        assert!(config.input_delay > 0);
    }

    #[test]
    fn test_validate_rejects_zero_delay() {
        let config = SyncConfig {
            input_delay: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_slow_catch_up() {
        let config = SyncConfig {
            catch_up_scale: 0.5,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_duration() {
        let config = SyncConfig {
            tick_rate: 50,
            ..SyncConfig::default()
        };
        assert!((config.tick_duration() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_mesh_defaults() {
        let config = MeshConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_interval().as_millis(), 16);
    }
}
