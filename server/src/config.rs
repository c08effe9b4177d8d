//! Host settings for one running game

use shared::{
    GameMode, FIXED_FRAME_TIME_MS, GAME_OVER_WAIT_SECS, HIGH_DELAY_MS, MAX_WORMS,
    RESPAWN_DELAY_SECS, SERIOUS_DELAY_MS,
};
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tick duration must be greater than zero")]
    ZeroTick,
    #[error("{name} ({value:?}) must be a multiple of the tick duration")]
    NotTickMultiple { name: &'static str, value: Duration },
    #[error("serious delay must be larger than the high delay")]
    DelayOrder,
    #[error("max clients must be between 1 and {}", MAX_WORMS)]
    MaxClients,
    #[error("bonus frequency must be greater than zero when bonuses are on")]
    ZeroBonusFrequency,
    #[error("map must have at least one cell")]
    EmptyMap,
}

#[derive(Debug, Clone)]
pub struct GameSettings {
    /// Fixed simulation step
    pub tick: Duration,
    /// Lag above which the scheduler reports a high delay
    pub high_delay: Duration,
    /// Lag above which missed ticks are skipped instead of simulated
    pub serious_delay: Duration,
    pub mode: GameMode,
    /// Starting lives, `None` for unlimited
    pub lives: Option<u32>,
    pub bonuses_on: bool,
    pub bonus_frequency: Duration,
    pub bonus_life: Duration,
    pub respawn_delay: Duration,
    pub game_over_wait: Duration,
    pub max_clients: usize,
    /// Outer frame rate cap of the server loop
    pub max_fps: u32,
    /// No local player at the keyboard
    pub dedicated: bool,
    /// Start the round as soon as this many peers joined, 0 to wait for a start request
    pub auto_start_players: usize,
    pub map_cols: usize,
    pub map_rows: usize,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(FIXED_FRAME_TIME_MS),
            high_delay: Duration::from_millis(HIGH_DELAY_MS),
            serious_delay: Duration::from_millis(SERIOUS_DELAY_MS),
            mode: GameMode::Deathmatch,
            lives: None,
            bonuses_on: true,
            bonus_frequency: Duration::from_secs(30),
            bonus_life: Duration::from_secs(60),
            respawn_delay: Duration::from_secs_f32(RESPAWN_DELAY_SECS),
            game_over_wait: Duration::from_secs_f32(GAME_OVER_WAIT_SECS),
            max_clients: 8,
            max_fps: 100,
            dedicated: true,
            auto_start_players: 0,
            map_cols: 64,
            map_rows: 48,
        }
    }
}

impl GameSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        for (name, value) in [
            ("high delay", self.high_delay),
            ("serious delay", self.serious_delay),
        ] {
            if value.as_micros() % self.tick.as_micros() != 0 {
                return Err(ConfigError::NotTickMultiple { name, value });
            }
        }
        if self.serious_delay <= self.high_delay {
            return Err(ConfigError::DelayOrder);
        }
        if self.max_clients == 0 || self.max_clients > MAX_WORMS {
            return Err(ConfigError::MaxClients);
        }
        if self.bonuses_on && self.bonus_frequency.is_zero() {
            return Err(ConfigError::ZeroBonusFrequency);
        }
        if self.map_cols == 0 || self.map_rows == 0 {
            return Err(ConfigError::EmptyMap);
        }
        Ok(())
    }

    /// Shortest time one outer frame may take under the frame rate cap.
    pub fn min_frame_time(&self) -> Duration {
        if self.max_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / self.max_fps
        }
    }
}
