//! Grainfall core: a falling-block puzzle where landed pieces crumble into sand.
//!
//! The crate is host-agnostic. [`engine::Engine`] drives everything through an
//! injected [`engine::Clock`] and [`engine::Scheduler`] and draws onto any
//! [`grid::Surface`]; the `grainfall` binary wires it to a terminal.

pub mod clear;
pub mod collision;
pub mod config;
pub mod engine;
pub mod grid;
pub mod piece;
pub mod score;

pub use clear::ClearReport;
pub use collision::Field;
pub use config::{Config, ConfigError, Difficulty, PALETTE};
pub use engine::{
    Clock, Command, Engine, FrameFlag, FrameOutcome, GameEvents, ManualClock, RunState, Scheduler,
    SystemClock,
};
pub use grid::{Cell, Rgb, SandGrid, Surface};
pub use piece::{Piece, PieceGenerator, PieceKind};
pub use score::{ScoreKeeper, ScoreSnapshot};
