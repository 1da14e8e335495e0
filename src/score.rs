//! Score, combo and level bookkeeping.

use std::time::Duration;

/// Points for `count` clusters cleared in one pass, before multipliers.
pub fn base_score(count: u32) -> u32 {
    match count {
        1 => 100,
        2 => 300,
        3 => 500,
        4 => 800,
        n => n.saturating_mul(100),
    }
}

/// `base × level × (1 + (combo - 1) × 0.5)`, floored.
pub fn event_score(count: u32, level: u32, combo: u32) -> u32 {
    let combo_multiplier = 1.0 + f64::from(combo.max(1) - 1) * 0.5;
    let points = f64::from(base_score(count)) * f64::from(level) * combo_multiplier;
    points.floor().min(f64::from(u32::MAX)) as u32
}

/// Read-only view for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreSnapshot {
    pub score: u32,
    pub level: u32,
    pub lines: u32,
    pub combo: u32,
    pub max_combo: u32,
}

#[derive(Debug, Clone)]
pub struct ScoreKeeper {
    score: u32,
    lines: u32,
    level: u32,
    combo: u32,
    max_combo: u32,
    last_clear: Option<Duration>,
    combo_window: Duration,
    lines_per_level: u32,
}

impl ScoreKeeper {
    pub fn new(combo_window: Duration, lines_per_level: u32) -> Self {
        Self {
            score: 0,
            lines: 0,
            level: 1,
            combo: 0,
            max_combo: 0,
            last_clear: None,
            combo_window,
            lines_per_level: lines_per_level.max(1),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.combo_window, self.lines_per_level);
    }

    #[inline]
    fn within_window(&self, now: Duration) -> bool {
        self.last_clear
            .is_some_and(|last| now.saturating_sub(last) < self.combo_window)
    }

    /// Record a clear event at `now` and return the points it earned.
    pub fn add_lines_cleared(&mut self, count: u32, now: Duration) -> u32 {
        self.combo = if self.within_window(now) { self.combo + 1 } else { 1 };
        self.max_combo = self.max_combo.max(self.combo);
        self.last_clear = Some(now);

        let points = event_score(count, self.level, self.combo);
        self.score = self.score.saturating_add(points);
        self.lines = self.lines.saturating_add(count);
        self.level = self.level.max(self.lines / self.lines_per_level + 1);
        points
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    /// Current combo; 0 once the window since the last clear has lapsed.
    pub fn combo(&self, now: Duration) -> u32 {
        if self.within_window(now) { self.combo } else { 0 }
    }

    pub fn snapshot(&self, now: Duration) -> ScoreSnapshot {
        ScoreSnapshot {
            score: self.score,
            level: self.level,
            lines: self.lines,
            combo: self.combo(now),
            max_combo: self.max_combo,
        }
    }
}
