//! Layout and drawing: playfield, sidebar (next, colours, stats, combo), pause and
//! game-over overlays, clear flash.

use crate::app::{Effects, GameEngine, Screen};
use crate::theme::{Theme, color};
use grainfall::{Piece, Rgb, RunState, Surface};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Widget};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tachyonfx::{CellFilter, Duration as TfxDuration, EffectRenderer, Interpolation, fx, ref_count};

const SIDEBAR_WIDTH: u16 = 24;
/// Duration of the clear flash fade in ms.
const FLASH_MS: u32 = 300;
const LEVEL_BANNER: Duration = Duration::from_millis(1500);

/// Next preview: small grid.
const NEXT_PREVIEW_COLS: u16 = 4;
const NEXT_PREVIEW_ROWS: u16 = 4;
const NEXT_MINI_CELL_W: u16 = 2;
const NEXT_MINI_CELL_H: u16 = 1;

/// Largest field (px) whose board, border and sidebar fit the terminal. Each
/// terminal cell shows one grain across and two grains down (▀).
pub fn max_field_px(term_cols: u16, term_rows: u16, grain: f32) -> (f32, f32) {
    let cols = term_cols.saturating_sub(2).saturating_sub(SIDEBAR_WIDTH);
    let rows = term_rows.saturating_sub(2);
    (f32::from(cols) * grain, f32::from(rows) * 2.0 * grain)
}

/// What a raster cell holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paint {
    Grain(Rgb),
    Block(Rgb),
}

/// Grain-resolution colour buffer the engine draws into.
#[derive(Debug, Clone)]
pub struct Raster {
    cols: usize,
    rows: usize,
    grain: f64,
    cells: Vec<Option<Paint>>,
}

impl Raster {
    pub fn new(cols: usize, rows: usize, grain: f32) -> Self {
        Self {
            cols,
            rows,
            grain: f64::from(grain),
            cells: vec![None; cols * rows],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Paint> {
        if x < self.cols && y < self.rows {
            self.cells[y * self.cols + x]
        } else {
            None
        }
    }

    fn put(&mut self, x: i64, y: i64, paint: Paint) {
        if let (Ok(x), Ok(y)) = (usize::try_from(x), usize::try_from(y)) {
            if x < self.cols && y < self.rows {
                self.cells[y * self.cols + x] = Some(paint);
            }
        }
    }
}

impl Surface for Raster {
    fn fill_circle(&mut self, cx: f64, cy: f64, _radius: f64, color: Rgb) {
        let x = (cx / self.grain).floor() as i64;
        let y = (cy / self.grain).floor() as i64;
        self.put(x, y, Paint::Grain(color));
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgb) {
        let g = self.grain;
        let (x0, x1) = ((x / g).floor() as i64, ((x + width) / g).ceil() as i64);
        let (y0, y1) = ((y / g).floor() as i64, ((y + height) / g).ceil() as i64);
        for gy in y0..y1 {
            for gx in x0..x1 {
                self.put(gx, gy, Paint::Block(color));
            }
        }
    }
}

/// Slight per-grain brightness jitter so settled sand reads as grains.
fn shade(rgb: Rgb, gx: usize, gy: usize) -> Color {
    let factor = match (gx * 7 + gy * 3) % 5 {
        0 => 0.78,
        2 => 0.9,
        _ => 1.0,
    };
    let scale = |c: u8| (f32::from(c) * factor).min(255.0) as u8;
    Color::Rgb(scale(rgb.0), scale(rgb.1), scale(rgb.2))
}

fn paint_color(paint: Option<Paint>, gx: usize, gy: usize, theme: &Theme) -> Color {
    match paint {
        Some(Paint::Grain(rgb)) => shade(rgb, gx, gy),
        Some(Paint::Block(rgb)) => color(rgb),
        None => theme.bg,
    }
}

/// Board size in terminal cells.
fn board_cells(engine: &GameEngine) -> (u16, u16) {
    let grid = engine.grid();
    let w = u16::try_from(grid.cols()).unwrap_or(u16::MAX);
    let h = u16::try_from(grid.rows().div_ceil(2)).unwrap_or(u16::MAX);
    (w, h)
}

/// Draw the game with whatever overlay the screen calls for.
pub fn draw(
    frame: &mut Frame,
    engine: &GameEngine,
    theme: &Theme,
    screen: Screen,
    effects: &mut Effects,
    now: Instant,
) {
    let area = frame.area();
    let (bw, bh) = board_cells(engine);
    let (pw, ph) = (bw + 2, bh + 2);
    let total_w = pw + SIDEBAR_WIDTH;

    // Center horizontally
    let horiz_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);

    // Center vertically
    let vert_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(ph),
            Constraint::Fill(1),
        ])
        .split(horiz_chunks[1]);

    let active_area = vert_chunks[1];
    let inner = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(pw), Constraint::Length(SIDEBAR_WIDTH)])
        .split(active_area);
    let (playfield_area, sidebar_area) = (inner[0], inner[1]);

    let board_rect = draw_playfield(frame, engine, theme, effects, playfield_area);
    draw_sidebar(frame, engine, theme, effects, sidebar_area, now);

    if !effects.flash_cells.is_empty() {
        apply_flash(frame, theme, effects, board_rect, now);
    }
    match screen {
        Screen::Playing => {
            if engine.state() == RunState::Paused {
                draw_pause_overlay(frame, theme, area);
            } else if let Some((level, at)) = effects.level_banner {
                if now.saturating_duration_since(at) < LEVEL_BANNER {
                    draw_level_banner(frame, theme, board_rect, level);
                }
            }
        }
        Screen::GameOver => draw_game_over(frame, engine, theme, effects, active_area),
    }
}

/// Board + border; returns the inner board rect.
fn draw_playfield(
    frame: &mut Frame,
    engine: &GameEngine,
    theme: &Theme,
    effects: &Effects,
    area: Rect,
) -> Rect {
    let snapshot = engine.snapshot();
    let title = format!(" Grainfall  | Lv {} ", snapshot.level);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(title, theme.title));
    let inner = block.inner(area);
    block.render(area, frame.buffer_mut());

    let grid = engine.grid();
    let (cols, rows) = (grid.cols(), grid.rows());
    let (bw, bh) = board_cells(engine);
    let board_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: bw.min(inner.width),
        height: bh.min(inner.height),
    };

    let mut raster = Raster::new(cols, rows, grid.grain_size());
    engine.draw(&mut raster);

    let flashing: HashSet<(usize, usize)> = effects.flash_cells.iter().copied().collect();
    let cell_color = |x: usize, y: usize| {
        if flashing.contains(&(x, y)) {
            Color::White
        } else {
            paint_color(raster.get(x, y), x, y, theme)
        }
    };

    let buf = frame.buffer_mut();
    // Iterate by terminal rows (y step 2)
    for y in (0..rows).step_by(2) {
        for x in 0..cols {
            let rx = board_rect.x + x as u16;
            let ry = board_rect.y + (y / 2) as u16;
            if rx < board_rect.x + board_rect.width && ry < board_rect.y + board_rect.height {
                let bottom = if y + 1 < rows { cell_color(x, y + 1) } else { theme.bg };
                buf[(rx, ry)]
                    .set_symbol("▀")
                    .set_style(Style::default().fg(cell_color(x, y)).bg(bottom));
            }
        }
    }

    // Floating score popups
    for popup in &effects.popups {
        let rx = board_rect.x + popup.x as u16;
        let ry = board_rect.y + (popup.y.max(0.0) as u16 / 2);
        let room = (board_rect.x + board_rect.width).saturating_sub(rx);
        if room > 0 && ry < board_rect.y + board_rect.height {
            let style = Style::default()
                .fg(theme.title)
                .bg(theme.bg)
                .add_modifier(Modifier::BOLD);
            buf.set_stringn(rx, ry, &popup.text, room as usize, style);
        }
    }

    board_rect
}

/// Build set of buffer (x, y) positions that belong to flashing grains.
fn flash_buffer_positions(board_rect: Rect, cells: &[(usize, usize)]) -> HashSet<(u16, u16)> {
    cells
        .iter()
        .map(|&(gx, gy)| (board_rect.x + gx as u16, board_rect.y + (gy / 2) as u16))
        .filter(|&(bx, by)| {
            bx < board_rect.x + board_rect.width && by < board_rect.y + board_rect.height
        })
        .collect()
}

/// Create or advance the clear flash (TachyonFX: fade flashed grains to bg).
fn apply_flash(frame: &mut Frame, theme: &Theme, effects: &mut Effects, board_rect: Rect, now: Instant) {
    let delta = effects
        .flash_process_time
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(Duration::ZERO);
    let delta_ms = delta.as_millis().min(u128::from(u32::MAX)) as u32;
    effects.flash_process_time = Some(now);

    if effects.flash.is_none() {
        let positions = flash_buffer_positions(board_rect, &effects.flash_cells);
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| {
            positions.contains(&(pos.x, pos.y))
        }));
        let effect = fx::fade_to(theme.bg, theme.bg, (FLASH_MS, Interpolation::Linear))
            .with_filter(filter)
            .with_area(board_rect);
        effects.flash = Some(effect);
    }

    if let Some(effect) = effects.flash.as_mut() {
        frame.render_effect(effect, board_rect, TfxDuration::from_millis(delta_ms));
        if effect.done() {
            effects.clear_flash();
        }
    }
}

fn sidebar_block(theme: &Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
}

fn draw_sidebar(
    frame: &mut Frame,
    engine: &GameEngine,
    theme: &Theme,
    effects: &Effects,
    area: Rect,
    now: Instant,
) {
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let snapshot = engine.snapshot();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7), // Next (border + title + preview)
            Constraint::Length(1), // gap
            Constraint::Length(4), // Colours
            Constraint::Length(1), // gap
            Constraint::Length(6), // Stats
            Constraint::Length(1), // gap
            Constraint::Length(5), // Combo
            Constraint::Fill(1),   // keys
        ])
        .split(area);

    // --- Next ---
    let next_block = sidebar_block(theme);
    let next_inner = next_block.inner(chunks[0]);
    next_block.render(chunks[0], frame.buffer_mut());
    let next_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(NEXT_PREVIEW_ROWS)])
        .split(next_inner);
    Paragraph::new(Line::from(Span::styled("Next", title_style)))
        .render(next_layout[0], frame.buffer_mut());
    draw_piece_preview(frame, engine.next_piece(), next_layout[1]);

    // --- Colours in play ---
    let colours_block = sidebar_block(theme);
    let colours_inner = colours_block.inner(chunks[2]);
    colours_block.render(chunks[2], frame.buffer_mut());
    let colours_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(colours_inner);
    Paragraph::new(Line::from(Span::styled("Colours", title_style)))
        .render(colours_layout[0], frame.buffer_mut());
    draw_colour_strip(frame, &engine.config().palette, colours_layout[1]);

    // --- Stats ---
    let stats_block = sidebar_block(theme);
    let stats_inner = stats_block.inner(chunks[4]);
    stats_block.render(chunks[4], frame.buffer_mut());
    let stat = |label: &'static str, value: String| {
        Line::from(vec![
            Span::styled(label, title_style),
            Span::styled(value, fg_style),
        ])
    };
    let stats_lines = vec![
        stat("Score: ", snapshot.score.to_string()),
        stat("Level: ", snapshot.level.to_string()),
        stat("Lines: ", snapshot.lines.to_string()),
        stat("Pieces: ", effects.pieces.to_string()),
    ];
    Paragraph::new(Text::from(stats_lines)).render(stats_inner, frame.buffer_mut());

    // --- Combo: label, best, window bar ---
    let combo_block = sidebar_block(theme);
    let combo_inner = combo_block.inner(chunks[6]);
    combo_block.render(chunks[6], frame.buffer_mut());
    let combo_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(combo_inner);
    let combo_label = if snapshot.combo > 1 {
        format!("Combo x{}", snapshot.combo)
    } else {
        "Combo".to_string()
    };
    Paragraph::new(Line::from(Span::styled(combo_label, title_style)))
        .render(combo_layout[0], frame.buffer_mut());
    Paragraph::new(Line::from(vec![
        Span::styled("Best: ", title_style),
        Span::styled(format!("x{}", snapshot.max_combo), fg_style),
    ]))
    .render(combo_layout[1], frame.buffer_mut());
    let window = engine.config().combo_window.as_secs_f64();
    let combo_ratio = match effects.last_clear {
        Some(at) if snapshot.combo > 0 && window > 0.0 => {
            (1.0 - now.saturating_duration_since(at).as_secs_f64() / window).clamp(0.0, 1.0)
        }
        _ => 0.0,
    };
    let bar_color = if combo_ratio > 0.6 {
        Color::Green
    } else if combo_ratio > 0.3 {
        Color::Yellow
    } else {
        Color::Red
    };
    Gauge::default()
        .ratio(combo_ratio)
        .gauge_style(Style::default().fg(bar_color))
        .render(combo_layout[2], frame.buffer_mut());

    // --- Keys ---
    let keys_style = Style::default().fg(theme.inactive_fg);
    let keys = vec![
        Line::from(Span::styled(" ←/→ h/l  move", keys_style)),
        Line::from(Span::styled(" ↑ k      rotate", keys_style)),
        Line::from(Span::styled(" ↓ j      soft drop", keys_style)),
        Line::from(Span::styled(" space    hard drop", keys_style)),
        Line::from(Span::styled(" p pause  q quit", keys_style)),
    ];
    Paragraph::new(Text::from(keys)).render(chunks[7], frame.buffer_mut());
}

/// Draw the preview piece as small blocks (actual shape, spawn orientation).
#[allow(clippy::similar_names)]
fn draw_piece_preview(frame: &mut Frame, piece: &Piece, area: Rect) {
    let inner = Rect {
        x: area.x,
        y: area.y,
        width: area.width.min(NEXT_PREVIEW_COLS * NEXT_MINI_CELL_W),
        height: area.height.min(NEXT_PREVIEW_ROWS * NEXT_MINI_CELL_H),
    };

    let fill = color(piece.color);
    let cells = piece.kind.cells();
    let (dx_lo, dy_lo) = cells
        .iter()
        .fold((i8::MAX, i8::MAX), |(ax, ay), &(dx, dy)| (ax.min(dx), ay.min(dy)));
    let (dx_hi, dy_hi) = cells
        .iter()
        .fold((i8::MIN, i8::MIN), |(ax, ay), &(dx, dy)| (ax.max(dx), ay.max(dy)));

    let bw = (dx_hi - dx_lo + 1) as u16;
    let bh = (dy_hi - dy_lo + 1) as u16;
    let off_x = inner.width.saturating_sub(bw * NEXT_MINI_CELL_W) / 2;
    let off_y = inner.height.saturating_sub(bh * NEXT_MINI_CELL_H) / 2;

    for &(dx, dy) in cells {
        let px = (dx - dx_lo) as u16;
        let py = (dy - dy_lo) as u16;
        let r = Rect {
            x: inner.x + off_x + px * NEXT_MINI_CELL_W,
            y: inner.y + off_y + py * NEXT_MINI_CELL_H,
            width: NEXT_MINI_CELL_W,
            height: NEXT_MINI_CELL_H,
        }
        .intersection(inner);
        Paragraph::new("██")
            .style(Style::default().fg(fill).bg(fill))
            .render(r, frame.buffer_mut());
    }
}

/// Row of blocks, one per colour in play.
fn draw_colour_strip(frame: &mut Frame, palette: &[Rgb], area: Rect) {
    let n = u16::try_from(palette.len()).unwrap_or(u16::MAX).max(1);
    let block_w = (area.width / n).max(1);
    for (i, &rgb) in palette.iter().enumerate() {
        let r = Rect {
            x: area.x + i as u16 * block_w,
            y: area.y,
            width: block_w,
            height: area.height.min(1),
        }
        .intersection(area);
        let c = color(rgb);
        Paragraph::new("█".repeat(block_w as usize))
            .style(Style::default().fg(c).bg(c))
            .render(r, frame.buffer_mut());
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn draw_pause_overlay(frame: &mut Frame, theme: &Theme, area: Rect) {
    let popup = centered(area, 28, 5);
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " P  Resume    Q  Quit ",
            Style::default().fg(theme.main_fg),
        )),
    ];
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
        )
        .render(popup, frame.buffer_mut());
}

fn draw_level_banner(frame: &mut Frame, theme: &Theme, board_rect: Rect, level: u32) {
    let text = format!(" Level {level}! ");
    let width = text.chars().count() as u16;
    let rect = Rect {
        x: board_rect.x + board_rect.width.saturating_sub(width) / 2,
        y: board_rect.y + board_rect.height / 3,
        width: width.min(board_rect.width),
        height: 1.min(board_rect.height),
    };
    Paragraph::new(Line::from(Span::styled(
        text,
        Style::default()
            .fg(Color::Black)
            .bg(theme.title)
            .add_modifier(Modifier::BOLD),
    )))
    .render(rect, frame.buffer_mut());
}

fn draw_game_over(
    frame: &mut Frame,
    engine: &GameEngine,
    theme: &Theme,
    effects: &Effects,
    area: Rect,
) {
    let snapshot = engine.snapshot();
    let popup = centered(area, 30, 11);
    let fg = Style::default().fg(theme.main_fg);
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Game Over ",
            Style::default().fg(Color::White).bg(Color::Red),
        )),
        Line::from(""),
        Line::from(Span::styled(format!(" Score: {} ", snapshot.score), fg)),
        Line::from(Span::styled(format!(" Level: {} ", snapshot.level), fg)),
        Line::from(Span::styled(format!(" Lines: {} ", snapshot.lines), fg)),
        Line::from(Span::styled(
            format!(" Best combo: x{}  Pieces: {} ", snapshot.max_combo, effects.pieces),
            fg,
        )),
        Line::from(""),
        Line::from(Span::styled(" R  Restart    Q  Quit ", fg)),
    ];
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
                .title(Span::styled(" Grainfall ", theme.title)),
        )
        .render(popup, frame.buffer_mut());
}
