//! App: terminal init, main loop, key handling and the engine's host side
//! (clock, frame scheduling, lifecycle hooks).

use crate::Args;
use crate::input::{Action, key_to_action};
use crate::theme::Theme;
use anyhow::Result;
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use grainfall::{
    ClearReport, Command, Config, Engine, FrameFlag, FrameOutcome, GameEvents, Piece, RunState,
    SystemClock,
};
use ratatui::DefaultTerminal;
use std::time::{Duration, Instant};
use tachyonfx::Effect;
use tracing::debug;

pub type GameEngine = Engine<SystemClock, FrameFlag>;

/// Without key release reporting, soft drop ends this long after the last Down press.
const SOFT_DROP_HOLD: Duration = Duration::from_millis(600);
/// Score popups live this many updates.
const POPUP_TTL: u16 = 45;
/// Smallest field, in tiles, we shrink to on a tiny terminal.
const MIN_FIELD_TILES: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Playing,
    GameOver,
}

/// Floating "+points" label in grain coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub text: String,
    pub x: usize,
    pub y: f32,
    pub ttl: u16,
}

/// Lifecycle hook consumer: turns engine events into transient visuals.
#[derive(Default)]
pub struct Effects {
    /// Grains emptied by the latest clear, flashed until the fade is done.
    pub flash_cells: Vec<(usize, usize)>,
    /// TachyonFX fade over `flash_cells` (created on first draw after a clear).
    pub flash: Option<Effect>,
    /// Last time the flash was processed (for delta).
    pub flash_process_time: Option<Instant>,
    pub popups: Vec<Popup>,
    pub last_clear: Option<Instant>,
    pub level_banner: Option<(u32, Instant)>,
    pub pieces: u32,
    pub game_over: bool,
    no_animation: bool,
}

impl Effects {
    fn new(no_animation: bool) -> Self {
        Self {
            no_animation,
            ..Self::default()
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.no_animation);
    }

    /// Advance popups by one update.
    fn tick(&mut self) {
        for popup in &mut self.popups {
            popup.y -= 0.5;
            popup.ttl = popup.ttl.saturating_sub(1);
        }
        self.popups.retain(|p| p.ttl > 0 && p.y >= 0.0);
    }

    pub fn clear_flash(&mut self) {
        self.flash_cells.clear();
        self.flash = None;
        self.flash_process_time = None;
    }
}

impl GameEvents for Effects {
    fn on_piece_landed(&mut self, _piece: &Piece) {
        self.pieces += 1;
    }

    fn on_lines_cleared(&mut self, report: &ClearReport, points: u32) {
        self.last_clear = Some(Instant::now());
        if let Some((x, y)) = centroid(&report.cells) {
            self.popups.push(Popup {
                text: format!("+{points}"),
                x,
                y: y as f32,
                ttl: POPUP_TTL,
            });
        }
        if !self.no_animation {
            self.clear_flash();
            self.flash_cells.clone_from(&report.cells);
        }
    }

    fn on_level_up(&mut self, level: u32) {
        self.level_banner = Some((level, Instant::now()));
    }

    fn on_game_over(&mut self, _score: u32) {
        self.game_over = true;
    }
}

fn centroid(cells: &[(usize, usize)]) -> Option<(usize, usize)> {
    if cells.is_empty() {
        return None;
    }
    let (sx, sy) = cells
        .iter()
        .fold((0usize, 0usize), |(ax, ay), &(x, y)| (ax + x, ay + y));
    Some((sx / cells.len(), sy / cells.len()))
}

pub struct App {
    engine: GameEngine,
    theme: Theme,
    effects: Effects,
    screen: Screen,
    /// Field size asked for on the command line, in px.
    requested: (f32, f32),
    soft_drop_since: Option<Instant>,
    /// Terminal reports key releases, so soft drop can end on release.
    release_events: bool,
}

impl App {
    pub fn new(args: &Args, config: Config, theme: Theme) -> Result<Self> {
        let tile = config.tile_size;
        let requested = (f32::from(args.width) * tile, f32::from(args.height) * tile);
        let engine = Engine::new(
            config,
            requested.0,
            requested.1,
            SystemClock::new(),
            FrameFlag::default(),
        )?;
        Ok(Self {
            engine,
            theme,
            effects: Effects::new(args.no_animation),
            screen: Screen::Playing,
            requested,
            soft_drop_since: None,
            release_events: false,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags},
            execute,
            terminal::{
                EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode, size,
                supports_keyboard_enhancement,
            },
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        // Attempt to enable enhanced keyboard for Release events
        self.release_events = supports_keyboard_enhancement().unwrap_or(false);
        if self.release_events {
            let _ = execute!(
                stdout,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            );
        }

        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        let (term_cols, term_rows) = size()?;
        self.fit_to_terminal(term_cols, term_rows);
        self.engine.start();

        let result = self.run_loop(&mut terminal);

        // Restore
        if self.release_events {
            let _ = execute!(std::io::stdout(), PopKeyboardEnhancementFlags);
        }
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let now = Instant::now();
            terminal.draw(|f| {
                crate::ui::draw(f, &self.engine, &self.theme, self.screen, &mut self.effects, now);
            })?;

            let timeout = self
                .engine
                .config()
                .frame_interval
                .saturating_sub(now.elapsed());
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    match event::read()? {
                        Event::Key(key) => {
                            if self.handle_key(key) {
                                return Ok(());
                            }
                        }
                        Event::Resize(cols, rows) => self.fit_to_terminal(cols, rows),
                        _ => {}
                    }
                }
            }

            self.sync_soft_drop();
            if self.engine.scheduler_mut().take()
                && self.engine.on_frame(&mut self.effects) == FrameOutcome::Updated
            {
                self.effects.tick();
            }
            if self.effects.game_over && self.screen == Screen::Playing {
                self.screen = Screen::GameOver;
                self.soft_drop_since = None;
            }
        }
    }

    /// Returns true when the app should exit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        let action = key_to_action(key);
        match key.kind {
            KeyEventKind::Release => {
                if action == Action::SoftDrop {
                    self.soft_drop_since = None;
                    self.engine.command(Command::SoftDropStop);
                }
                return false;
            }
            KeyEventKind::Repeat if !action.repeats() => return false,
            _ => {}
        }

        match (self.screen, action) {
            (_, Action::Quit) => return true,
            (Screen::GameOver, Action::Restart) => self.restart(),
            (Screen::Playing, Action::Pause) => {
                self.engine.toggle_pause();
                if self.engine.state() == RunState::Paused {
                    self.soft_drop_since = None;
                }
            }
            (Screen::Playing, action) => {
                if let Some(command) = action.command() {
                    if action == Action::SoftDrop {
                        self.soft_drop_since = Some(Instant::now());
                    }
                    self.engine.command(command);
                }
            }
            _ => {}
        }
        false
    }

    /// Keep the engine's soft drop in step with the Down key. A stop can be lost
    /// (sent while paused, or replaced by a later key), so it is re-sent while
    /// soft drop is on, Down is up and no other command is waiting.
    fn sync_soft_drop(&mut self) {
        if !self.release_events
            && self
                .soft_drop_since
                .is_some_and(|since| since.elapsed() >= SOFT_DROP_HOLD)
        {
            self.soft_drop_since = None;
        }
        if self.soft_drop_since.is_none()
            && self.engine.soft_drop_active()
            && !self.engine.has_pending()
        {
            self.engine.command(Command::SoftDropStop);
        }
    }

    fn restart(&mut self) {
        self.effects.reset();
        self.soft_drop_since = None;
        self.screen = Screen::Playing;
        self.engine.start();
    }

    /// Shrink (or regrow up to the requested size) the field so board and sidebar
    /// fit the terminal. Any change discards the settled sand.
    fn fit_to_terminal(&mut self, cols: u16, rows: u16) {
        let grain = self.engine.config().grain_size;
        let tile = self.engine.config().tile_size;
        let (max_w, max_h) = crate::ui::max_field_px(cols, rows, grain);
        let width = self.requested.0.min(max_w).max(tile * MIN_FIELD_TILES);
        let height = self.requested.1.min(max_h).max(tile * MIN_FIELD_TILES);
        let field = self.engine.field();
        if (field.width - width).abs() > f32::EPSILON || (field.height - height).abs() > f32::EPSILON
        {
            debug!(cols, rows, width, height, "fitting field to terminal");
            self.engine.resize(width, height);
            self.effects.clear_flash();
            self.effects.popups.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use crossterm::event::{KeyCode, KeyModifiers};

    #[test]
    fn clear_events_spawn_popup_and_flash() {
        let mut effects = Effects::new(false);
        let report = ClearReport {
            count: 1,
            cells: vec![(0, 10), (4, 10), (8, 12)],
        };
        effects.on_lines_cleared(&report, 150);
        assert_eq!(effects.flash_cells.len(), 3);
        assert_eq!(
            effects.popups,
            vec![Popup {
                text: "+150".into(),
                x: 4,
                y: 10.0,
                ttl: POPUP_TTL,
            }]
        );
        assert!(effects.last_clear.is_some());
    }

    #[test]
    fn no_animation_skips_flash() {
        let mut effects = Effects::new(true);
        let report = ClearReport {
            count: 1,
            cells: vec![(1, 1)],
        };
        effects.on_lines_cleared(&report, 100);
        assert!(effects.flash_cells.is_empty());
        assert_eq!(effects.popups.len(), 1);
    }

    #[test]
    fn popups_expire() {
        let mut effects = Effects::new(false);
        effects.popups.push(Popup {
            text: "+1".into(),
            x: 0,
            y: 100.0,
            ttl: 2,
        });
        effects.tick();
        assert_eq!(effects.popups.len(), 1);
        effects.tick();
        assert!(effects.popups.is_empty());
    }

    #[test]
    fn reset_keeps_animation_setting() {
        let mut effects = Effects::new(true);
        effects.pieces = 7;
        effects.game_over = true;
        effects.reset();
        assert_eq!(effects.pieces, 0);
        assert!(!effects.game_over);
        assert!(effects.no_animation);
    }

    fn app() -> App {
        let args = Args::try_parse_from(["grainfall", "--seed", "1"]).expect("args");
        let theme = Theme::default();
        let config = args.config(&theme).expect("config");
        App::new(&args, config, theme).expect("app")
    }

    fn pass(app: &mut App) {
        std::thread::sleep(app.engine.config().frame_interval + Duration::from_millis(2));
        let _ = app.engine.scheduler_mut().take();
        assert_eq!(app.engine.on_frame(&mut app.effects), FrameOutcome::Updated);
    }

    #[test]
    fn soft_drop_stops_when_release_is_overtaken() {
        let mut app = app();
        app.release_events = true;
        app.engine.start();
        pass(&mut app);

        app.handle_key(KeyEvent::new(KeyCode::Down, KeyModifiers::NONE));
        pass(&mut app);
        assert!(app.engine.soft_drop_active());

        // release and a move in one batch: the move replaces the queued stop
        app.handle_key(KeyEvent::new_with_kind(
            KeyCode::Down,
            KeyModifiers::NONE,
            KeyEventKind::Release,
        ));
        app.handle_key(KeyEvent::new(KeyCode::Left, KeyModifiers::NONE));
        app.sync_soft_drop();
        pass(&mut app);
        app.sync_soft_drop();
        pass(&mut app);
        assert!(!app.engine.soft_drop_active());
    }

    #[test]
    fn soft_drop_released_during_pause_stays_off() {
        let mut app = app();
        app.release_events = true;
        app.engine.start();
        pass(&mut app);
        app.handle_key(KeyEvent::new(KeyCode::Down, KeyModifiers::NONE));
        pass(&mut app);

        app.handle_key(KeyEvent::new(KeyCode::Char('p'), KeyModifiers::NONE));
        app.handle_key(KeyEvent::new_with_kind(
            KeyCode::Down,
            KeyModifiers::NONE,
            KeyEventKind::Release,
        ));
        app.handle_key(KeyEvent::new(KeyCode::Char('p'), KeyModifiers::NONE));
        app.sync_soft_drop();
        pass(&mut app);
        assert!(!app.engine.soft_drop_active());
    }
}
