//! Tunable constants for the core: geometry, physics rates, scoring windows, palette.

use crate::grid::Rgb;
use std::time::Duration;
use thiserror::Error;

/// Full piece palette. Difficulty decides how many of these are in play.
pub const PALETTE: [Rgb; 7] = [
    Rgb(0x00, 0xff, 0xff),
    Rgb(0xff, 0x00, 0xff),
    Rgb(0x00, 0xff, 0x00),
    Rgb(0xff, 0xff, 0x00),
    Rgb(0xff, 0x45, 0x00),
    Rgb(0x8a, 0x2b, 0xe2),
    Rgb(0xad, 0xff, 0x2f),
];

/// Difficulty preset: fewer colours make wide clusters easier to build.
/// Only colour count and gravity vary; speed comes from the level alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn colors(self) -> usize {
        match self {
            Self::Easy => 3,
            Self::Medium => 4,
            Self::Hard => 5,
        }
    }

    /// Piece gravity in px/ms².
    pub fn gravity(self) -> f32 {
        match self {
            Self::Easy => 0.01,
            Self::Medium => 0.015,
            Self::Hard => 0.02,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("grain size must be positive, got {0}")]
    GrainSize(f32),
    #[error("tile size {tile} must be at least one grain ({grain})")]
    TileSize { tile: f32, grain: f32 },
    #[error("palette is empty")]
    EmptyPalette,
    #[error("{0} interval must be non-zero")]
    ZeroInterval(&'static str),
    #[error("clear ratio must be in (0, 1], got {0}")]
    ClearRatio(f32),
    #[error("lines per level must be non-zero")]
    LinesPerLevel,
}

/// Everything the engine needs to know up front. `Default` is the easy preset.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Piece block edge in px.
    pub tile_size: f32,
    /// Automaton cell edge in px.
    pub grain_size: f32,
    pub gravity: f32,
    /// Gravity while soft drop is held.
    pub fast_gravity: f32,
    pub sand_interval: Duration,
    pub frame_interval: Duration,
    /// Fraction of the grid width a cluster must span to clear.
    pub clear_ratio: f32,
    pub combo_window: Duration,
    pub lines_per_level: u32,
    pub hard_drop_tiles: u32,
    pub palette: Vec<Rgb>,
    /// Scale gravity with level.
    pub level_speedup: bool,
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_difficulty(Difficulty::default())
    }
}

impl Config {
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        Self {
            tile_size: 20.0,
            grain_size: 8.0,
            gravity: difficulty.gravity(),
            fast_gravity: 5.0,
            sand_interval: Duration::from_millis(50),
            frame_interval: Duration::from_micros(1_000_000 / 60),
            clear_ratio: 0.8,
            combo_window: Duration::from_millis(2000),
            lines_per_level: 10,
            hard_drop_tiles: 10,
            palette: PALETTE[..difficulty.colors()].to_vec(),
            level_speedup: true,
            seed: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grain_size.is_nan() || self.grain_size <= 0.0 {
            return Err(ConfigError::GrainSize(self.grain_size));
        }
        if self.tile_size < self.grain_size {
            return Err(ConfigError::TileSize {
                tile: self.tile_size,
                grain: self.grain_size,
            });
        }
        if self.palette.is_empty() {
            return Err(ConfigError::EmptyPalette);
        }
        if self.sand_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("sand"));
        }
        if self.frame_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("frame"));
        }
        if self.clear_ratio.is_nan() || self.clear_ratio <= 0.0 || self.clear_ratio > 1.0 {
            return Err(ConfigError::ClearRatio(self.clear_ratio));
        }
        if self.lines_per_level == 0 {
            return Err(ConfigError::LinesPerLevel);
        }
        Ok(())
    }

    /// Gravity multiplier for a level (1.0 at level 1, +0.2 per level).
    pub fn speed_for_level(&self, level: u32) -> f32 {
        if self.level_speedup {
            1.0 + level.saturating_sub(1) as f32 * 0.2
        } else {
            1.0
        }
    }
}
