//! Grainfall: falling-block puzzle in the terminal where landed pieces crumble into sand.

mod app;
mod input;
mod theme;
mod ui;

use anyhow::{Context, Result};
use app::App;
use clap::{Parser, ValueEnum};
use grainfall::{Config, Difficulty};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(path) = args.log_file.as_deref() {
        init_logging(path)?;
    }
    let theme = theme::Theme::load(args.theme.as_deref()).unwrap_or_default();
    let config = args.config(&theme)?;
    tracing::info!(
        difficulty = ?args.difficulty,
        colors = config.palette.len(),
        seed = ?config.seed,
        "starting"
    );
    let mut app = App::new(&args, config, theme)?;
    app.run()?;
    Ok(())
}

/// The terminal belongs to the game, so logs only go to a file when asked for.
fn init_logging(path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "grainfall=info".into()),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Falling-block sand puzzle in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "grainfall",
    version,
    about = "Falling-block puzzle where landed pieces crumble into sand. Clear wide same-colour clusters to score.",
    long_about = "Grainfall is a terminal puzzle game.\n\n\
        Place falling coloured blocks. When they land they crumble into sand that falls and \
        rolls. A connected patch of one colour that spans most of the field width is cleared.\n\n\
        CONTROLS (normal):\n  Left/Right  Move    Up        Rotate      Down (hold) Soft drop\n  Enter/Space Hard drop   P          Pause      Q / Esc    Quit\n\n\
        CONTROLS (vim):\n  h/l         Move    k or i     Rotate      j          Soft drop\n  Space       Hard drop   p          Pause      q          Quit\n\n\
        Use --theme to load a btop-style theme (e.g. onedark.theme)."
)]
pub struct Args {
    /// Difficulty: easy (3 colours), medium (4 colours, faster), hard (5 colours, fastest).
    #[arg(short, long, default_value = "easy")]
    pub difficulty: DifficultyArg,

    /// Path to theme file (btop-style theme[key]=\"value\"). Uses One Dark if not set.
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<PathBuf>,

    /// Playfield width in piece tiles. Clamped to the terminal.
    #[arg(long, default_value = "10", value_name = "TILES")]
    pub width: u16,

    /// Playfield height in piece tiles. Clamped to the terminal.
    #[arg(long, default_value = "20", value_name = "TILES")]
    pub height: u16,

    /// Relaxed mode: gravity does not increase with level.
    #[arg(long)]
    pub relaxed: bool,

    /// Seed for pieces and sand rolls (same seed, same game).
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Sand automaton tick interval in ms.
    #[arg(long, default_value = "50", value_name = "MS")]
    pub sand_interval_ms: u64,

    /// Game update rate (frames per second).
    #[arg(long, default_value = "60.0", value_name = "RATE")]
    pub fps: f64,

    /// Disable the flash over cleared sand.
    #[arg(long)]
    pub no_animation: bool,

    /// Write logs to this file (RUST_LOG overrides the default `grainfall=info`).
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    fn config(&self, theme: &theme::Theme) -> Result<Config> {
        let difficulty = Difficulty::from(self.difficulty);
        let mut config = Config::for_difficulty(difficulty);
        config.palette = theme.pieces.iter().copied().take(difficulty.colors()).collect();
        config.level_speedup = !self.relaxed;
        config.seed = self.seed;
        config.sand_interval = Duration::from_millis(self.sand_interval_ms);
        if self.fps.is_finite() && self.fps > 0.0 {
            config.frame_interval = Duration::from_secs_f64(1.0 / self.fps);
        } else {
            anyhow::bail!("--fps must be a positive number, got {}", self.fps);
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DifficultyArg {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl From<DifficultyArg> for Difficulty {
    fn from(arg: DifficultyArg) -> Self {
        match arg {
            DifficultyArg::Easy => Self::Easy,
            DifficultyArg::Medium => Self::Medium,
            DifficultyArg::Hard => Self::Hard,
        }
    }
}
