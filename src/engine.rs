//! Game loop: frame gating, run state, command intake and the per-pass update order.
//!
//! The engine never blocks and never owns a timer. The host supplies a [`Clock`]
//! and a [`Scheduler`]; every time the scheduler fires, the host calls
//! [`Engine::on_frame`], which runs a full update pass once a frame interval has
//! elapsed and asks for the next frame while the game is running.

use crate::clear::ClearReport;
use crate::collision::Field;
use crate::config::{Config, ConfigError};
use crate::grid::{SandGrid, Surface};
use crate::piece::{Piece, PieceGenerator};
use crate::score::{ScoreKeeper, ScoreSnapshot};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<Duration>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }

    pub fn set(&self, to: Duration) {
        self.0.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.0.get()
    }
}

/// "Call me back on the next frame" capability.
pub trait Scheduler {
    fn request_frame(&mut self);
}

/// Scheduler that just remembers whether a frame was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlag {
    requested: bool,
    requests: u64,
}

impl FrameFlag {
    /// Consume the pending request, if any.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.requested)
    }

    pub fn is_requested(&self) -> bool {
        self.requested
    }

    /// Total requests seen.
    pub fn requests(&self) -> u64 {
        self.requests
    }
}

impl Scheduler for FrameFlag {
    fn request_frame(&mut self) {
        self.requested = true;
        self.requests += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
    Paused,
}

/// One-shot player intents. The last one received before a pass wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    MoveLeft,
    MoveRight,
    SoftDropStart,
    SoftDropStop,
    Rotate,
    HardDrop,
}

/// Lifecycle hooks, fired synchronously inside the update pass.
pub trait GameEvents {
    fn on_piece_landed(&mut self, _piece: &Piece) {}
    fn on_lines_cleared(&mut self, _report: &ClearReport, _points: u32) {}
    fn on_level_up(&mut self, _level: u32) {}
    fn on_game_over(&mut self, _score: u32) {}
}

impl GameEvents for () {}

/// What a call to [`Engine::on_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Not running; nothing happened and no frame was requested.
    Idle,
    /// Too early for a pass; next frame requested.
    Waiting,
    /// A full update pass ran.
    Updated,
}

pub struct Engine<C: Clock, S: Scheduler> {
    config: Config,
    clock: C,
    scheduler: S,
    rng: StdRng,
    field: Field,
    grid: SandGrid,
    generator: PieceGenerator,
    piece: Option<Piece>,
    /// `y` of the active piece at its last collision-free check.
    last_free_y: Option<f32>,
    soft_drop: bool,
    pending: Option<Command>,
    score: ScoreKeeper,
    state: RunState,
    game_over: bool,
    last_frame: Duration,
    frames: u64,
}

impl<C: Clock, S: Scheduler> Engine<C, S> {
    /// Build a stopped engine for a `width` x `height` px field.
    pub fn new(
        config: Config,
        width: f32,
        height: f32,
        clock: C,
        scheduler: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut grid = SandGrid::new(config.grain_size, config.sand_interval);
        grid.resize(width, height);
        let generator = PieceGenerator::new(config.palette.clone(), config.tile_size, &mut rng);
        let field = Field {
            width,
            height,
            tile_size: config.tile_size,
        };
        let score = ScoreKeeper::new(config.combo_window, config.lines_per_level);
        let last_frame = clock.now();
        Ok(Self {
            config,
            clock,
            scheduler,
            rng,
            field,
            grid,
            generator,
            piece: None,
            last_free_y: None,
            soft_drop: false,
            pending: None,
            score,
            state: RunState::Stopped,
            game_over: false,
            last_frame,
            frames: 0,
        })
    }

    fn new_session(&mut self) {
        self.grid.reset();
        self.score.reset();
        self.generator =
            PieceGenerator::new(self.config.palette.clone(), self.config.tile_size, &mut self.rng);
        self.piece = None;
        self.last_free_y = None;
        self.soft_drop = false;
        self.pending = None;
        self.game_over = false;
    }

    /// Stopped → Running (fresh session) or Paused → Running.
    pub fn start(&mut self) {
        match self.state {
            RunState::Running => {}
            RunState::Paused => self.resume(),
            RunState::Stopped => {
                self.new_session();
                self.state = RunState::Running;
                self.last_frame = self.clock.now();
                info!(cols = self.grid.cols(), rows = self.grid.rows(), "game started");
                self.scheduler.request_frame();
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::Paused;
            self.soft_drop = false;
            info!("game paused");
        }
    }

    /// Paused → Running. The frame baseline restarts at now so the pause is not
    /// fed to the physics as elapsed time.
    pub fn resume(&mut self) {
        if self.state == RunState::Paused {
            self.state = RunState::Running;
            self.last_frame = self.clock.now();
            info!("game resumed");
            self.scheduler.request_frame();
        }
    }

    pub fn toggle_pause(&mut self) {
        match self.state {
            RunState::Running => self.pause(),
            RunState::Paused => self.resume(),
            RunState::Stopped => {}
        }
    }

    pub fn stop(&mut self) {
        if self.state != RunState::Stopped {
            self.state = RunState::Stopped;
            self.soft_drop = false;
            info!(score = self.score.score(), "game stopped");
        }
    }

    /// Queue a player command for the next pass. Dropped unless running.
    pub fn command(&mut self, command: Command) {
        if self.state == RunState::Running {
            self.pending = Some(command);
        } else {
            trace!(?command, "command dropped, not running");
        }
    }

    /// A command is queued for the next pass.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// New field size in px. Grains are discarded; the active piece is kept.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.field.width = width;
        self.field.height = height;
        self.grid.resize(width, height);
        debug!(width, height, cols = self.grid.cols(), rows = self.grid.rows(), "field resized");
    }

    /// Host frame callback.
    pub fn on_frame(&mut self, events: &mut dyn GameEvents) -> FrameOutcome {
        if self.state != RunState::Running {
            return FrameOutcome::Idle;
        }
        let now = self.clock.now();
        let elapsed = now.saturating_sub(self.last_frame);
        if elapsed < self.config.frame_interval {
            self.scheduler.request_frame();
            return FrameOutcome::Waiting;
        }
        self.update(elapsed, now, events);
        self.last_frame = now;
        self.frames += 1;
        if self.state == RunState::Running {
            self.scheduler.request_frame();
        }
        FrameOutcome::Updated
    }

    /// One pass: commands, sand tick, piece, collision/landing, cluster scan,
    /// scoring, game-over check.
    fn update(&mut self, elapsed: Duration, now: Duration, events: &mut dyn GameEvents) {
        trace!(frame = self.frames, elapsed_ms = elapsed.as_millis() as u64, "update pass");
        self.apply_pending();

        let ticked = self.grid.update(now, &mut self.rng);

        let dt_ms = elapsed.as_secs_f32() * 1000.0;
        let gravity = if self.soft_drop {
            self.config.fast_gravity
        } else {
            self.config.gravity * self.config.speed_for_level(self.score.level())
        };
        match self.piece.as_mut() {
            Some(piece) => piece.update(dt_ms, gravity),
            None => {
                self.piece = Some(self.generator.spawn(self.field.width, &mut self.rng));
                self.last_free_y = None;
            }
        }

        let colliding = self
            .piece
            .as_ref()
            .map(|piece| (self.field.collides(piece, &self.grid), piece.y));
        let landed = match colliding {
            Some((true, _)) => {
                self.land(events);
                true
            }
            Some((false, y)) => {
                self.last_free_y = Some(y);
                false
            }
            None => false,
        };

        if ticked || landed {
            self.scan(now, events);
        }

        if self.grid.is_game_over() {
            self.game_over = true;
            self.state = RunState::Stopped;
            self.soft_drop = false;
            self.piece = None;
            info!(score = self.score.score(), lines = self.score.lines(), "game over");
            events.on_game_over(self.score.score());
        }
    }

    fn apply_pending(&mut self) {
        let Some(command) = self.pending.take() else {
            return;
        };
        let tile = self.config.tile_size;
        match command {
            Command::SoftDropStart => self.soft_drop = true,
            Command::SoftDropStop => {
                self.soft_drop = false;
                if let Some(piece) = self.piece.as_mut() {
                    piece.velocity_y = 0.0;
                }
            }
            Command::MoveLeft | Command::MoveRight | Command::Rotate | Command::HardDrop => {
                let Some(piece) = self.piece.as_mut() else {
                    return;
                };
                let moved = match command {
                    Command::MoveLeft => self.field.try_shift(piece, -tile, &self.grid),
                    Command::MoveRight => self.field.try_shift(piece, tile, &self.grid),
                    Command::Rotate => self.field.try_rotate(piece, &self.grid),
                    _ => {
                        piece.y += tile * self.config.hard_drop_tiles as f32;
                        false
                    }
                };
                // a kick can lift the piece; landing sweeps from its new legal spot
                if moved {
                    self.last_free_y = Some(piece.y);
                }
            }
        }
    }

    /// Hand the active piece over to the grid.
    fn land(&mut self, events: &mut dyn GameEvents) {
        let Some(mut piece) = self.piece.take() else {
            return;
        };
        piece.y = self
            .field
            .landing_y(&piece, self.last_free_y.take(), &self.grid);
        self.grid.add_piece(&piece, self.config.tile_size);
        debug!(kind = ?piece.kind, color = %piece.color, x = piece.x, y = piece.y, "piece landed");
        events.on_piece_landed(&piece);
    }

    fn scan(&mut self, now: Duration, events: &mut dyn GameEvents) {
        let report = self.grid.scan_and_clear(self.config.clear_ratio);
        if report.is_empty() {
            return;
        }
        let level_before = self.score.level();
        let points = self.score.add_lines_cleared(report.count, now);
        debug!(
            clusters = report.count,
            grains = report.cells.len(),
            points,
            "clusters cleared"
        );
        events.on_lines_cleared(&report, points);
        let level = self.score.level();
        if level > level_before {
            info!(level, "level up");
            events.on_level_up(level);
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn grid(&self) -> &SandGrid {
        &self.grid
    }

    /// Direct grid access for hosts that seed or edit the field.
    pub fn grid_mut(&mut self) -> &mut SandGrid {
        &mut self.grid
    }

    pub fn piece(&self) -> Option<&Piece> {
        self.piece.as_ref()
    }

    pub fn next_piece(&self) -> &Piece {
        self.generator.next()
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn soft_drop_active(&self) -> bool {
        self.soft_drop
    }

    pub fn snapshot(&self) -> ScoreSnapshot {
        self.score.snapshot(self.clock.now())
    }

    /// Completed update passes.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Grains first, then the active piece on top.
    pub fn draw(&self, surface: &mut dyn Surface) {
        self.grid.draw(surface);
        if let Some(piece) = &self.piece {
            piece.draw(self.config.tile_size, surface);
        }
    }
}
