//! Sand grid: flat row-major cell buffer, granular settling, piece rasterisation.

use crate::piece::Piece;
use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Colour token carried by a grain or piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parse `#rrggbb` or `rrggbb`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('#');
        if s.len() != 6 || !s.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).ok();
        Some(Self(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Single cell: either empty or a grain of some colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Sand(Rgb),
}

impl Cell {
    #[inline]
    pub fn is_empty(self) -> bool {
        self == Self::Empty
    }
}

/// Opaque drawing target. Coordinates are field pixels, y grows downwards.
pub trait Surface {
    fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Rgb);
    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgb);
}

/// The settled material. y=0 is the top row.
///
/// Until the first [`SandGrid::resize`] the grid is uninitialised and every
/// operation on it is a no-op.
#[derive(Debug, Clone)]
pub struct SandGrid {
    grain_size: f32,
    interval: Duration,
    cols: usize,
    rows: usize,
    cells: Vec<Cell>,
    last_tick: Option<Duration>,
    initialized: bool,
}

impl SandGrid {
    pub fn new(grain_size: f32, interval: Duration) -> Self {
        Self {
            grain_size,
            interval,
            cols: 0,
            rows: 0,
            cells: Vec::new(),
            last_tick: None,
            initialized: false,
        }
    }

    /// Recompute resolution for a field of `width` x `height` px. All grains are lost.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.cols = (width / self.grain_size).floor().max(0.0) as usize;
        self.rows = (height / self.grain_size).floor().max(0.0) as usize;
        self.cells = vec![Cell::Empty; self.cols * self.rows];
        self.initialized = true;
    }

    pub fn reset(&mut self) {
        self.cells = vec![Cell::Empty; self.cols * self.rows];
        self.last_tick = None;
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn grain_size(&self) -> f32 {
        self.grain_size
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.cols && y < self.rows).then(|| y * self.cols + x)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<Cell> {
        self.index(x, y).map(|i| self.cells[i])
    }

    /// Signed lookup; anything off-grid is `None`.
    #[inline]
    pub fn cell_at(&self, gx: i64, gy: i64) -> Option<Cell> {
        let x = usize::try_from(gx).ok()?;
        let y = usize::try_from(gy).ok()?;
        self.get(x, y)
    }

    /// Out-of-range writes are dropped.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if let Some(i) = self.index(x, y) {
            self.cells[i] = cell;
        }
    }

    #[inline]
    fn is_free(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_some_and(Cell::is_empty)
    }

    /// Number of occupied cells.
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }

    /// Grid cells covered by the half-open pixel square `[x, x+size) x [y, y+size)`.
    /// Coordinates may lie off-grid; callers filter.
    pub fn footprint(&self, x: f32, y: f32, size: f32) -> impl Iterator<Item = (i64, i64)> + use<> {
        let g = self.grain_size;
        let x0 = (x / g).floor() as i64;
        let x1 = ((x + size) / g).ceil() as i64;
        let y0 = (y / g).floor() as i64;
        let y1 = ((y + size) / g).ceil() as i64;
        (y0..y1).flat_map(move |gy| (x0..x1).map(move |gx| (gx, gy)))
    }

    /// Advance the automaton if at least one interval has passed since the last tick.
    /// Returns whether a tick ran.
    pub fn update<R: Rng + ?Sized>(&mut self, now: Duration, rng: &mut R) -> bool {
        if !self.initialized {
            return false;
        }
        if let Some(last) = self.last_tick {
            if now.saturating_sub(last) < self.interval {
                return false;
            }
        }
        self.last_tick = Some(now);
        self.tick(rng);
        true
    }

    /// One automaton step. Rows are swept bottom to top so a grain moves at most
    /// one row per tick.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if !self.initialized || self.rows < 2 {
            return;
        }
        for y in (0..self.rows - 1).rev() {
            for x in 0..self.cols {
                let cell = self.cells[y * self.cols + x];
                if cell.is_empty() {
                    continue;
                }
                if self.is_free(x, y + 1) {
                    self.move_grain(x, y, x, y + 1, cell);
                    continue;
                }
                let order: [isize; 2] = if rng.gen_bool(0.5) { [-1, 1] } else { [1, -1] };
                for dx in order {
                    let Some(nx) = x.checked_add_signed(dx) else {
                        continue;
                    };
                    if self.is_free(nx, y + 1) {
                        self.move_grain(x, y, nx, y + 1, cell);
                        break;
                    }
                }
            }
        }
    }

    #[inline]
    fn move_grain(&mut self, x: usize, y: usize, nx: usize, ny: usize, cell: Cell) {
        self.set(nx, ny, cell);
        self.set(x, y, Cell::Empty);
    }

    /// Rasterise a landed piece into grains. Cells outside the grid are skipped.
    ///
    /// Every cell a block partly covers is filled, so a block that is not
    /// grain-aligned yields more material than `tile_size / grain_size` squared:
    /// a 20 px block over 8 px grains spans 3 or 4 cells per axis, so 9 to 16
    /// grains. Pieces sit at tile multiples in `x`, so in practice it is 9 or 12.
    pub fn add_piece(&mut self, piece: &Piece, tile_size: f32) {
        if !self.initialized {
            return;
        }
        let grain = Cell::Sand(piece.color);
        for (bx, by) in piece.block_origins() {
            for (gx, gy) in self.footprint(bx, by, tile_size) {
                if let (Ok(x), Ok(y)) = (usize::try_from(gx), usize::try_from(gy)) {
                    self.set(x, y, grain);
                }
            }
        }
    }

    /// Any grain in the top two rows.
    pub fn is_game_over(&self) -> bool {
        if !self.initialized {
            return false;
        }
        let top = self.cols * self.rows.min(2);
        self.cells[..top].iter().any(|c| !c.is_empty())
    }

    /// Each grain as a filled circle at its cell centre.
    pub fn draw(&self, surface: &mut dyn Surface) {
        let g = f64::from(self.grain_size);
        for y in 0..self.rows {
            for x in 0..self.cols {
                if let Cell::Sand(color) = self.cells[y * self.cols + x] {
                    let cx = (x as f64 + 0.5) * g;
                    let cy = (y as f64 + 0.5) * g;
                    surface.fill_circle(cx, cy, g / 2.0, color);
                }
            }
        }
    }
}

/// Build a grid from rows of text: `.` is empty, any other byte is a grain whose
/// colour is derived from the byte. Grain size 1, interval 50 ms.
#[cfg(test)]
pub(crate) fn grid_from_rows(rows: &[&str]) -> SandGrid {
    let cols = rows.first().map_or(0, |r| r.len());
    let mut grid = SandGrid::new(1.0, Duration::from_millis(50));
    grid.resize(cols as f32, rows.len() as f32);
    for (y, row) in rows.iter().enumerate() {
        for (x, b) in row.bytes().enumerate() {
            if b != b'.' {
                grid.set(x, y, Cell::Sand(Rgb(b, 0, 0)));
            }
        }
    }
    grid
}

#[cfg(test)]
pub(crate) fn grid_to_rows(grid: &SandGrid) -> Vec<String> {
    (0..grid.rows())
        .map(|y| {
            (0..grid.cols())
                .map(|x| match grid.get(x, y) {
                    Some(Cell::Sand(Rgb(b, _, _))) => b as char,
                    _ => '.',
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::{Piece, PieceKind};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::rngs::mock::StepRng;

    #[test]
    fn resize_computes_resolution_and_clears() {
        let mut grid = SandGrid::new(8.0, Duration::from_millis(50));
        grid.resize(205.0, 400.0);
        assert_eq!((grid.cols(), grid.rows()), (25, 50));
        grid.set(3, 3, Cell::Sand(Rgb(1, 2, 3)));
        grid.resize(100.0, 100.0);
        assert_eq!((grid.cols(), grid.rows()), (12, 12));
        assert_eq!(grid.occupied(), 0);
    }

    #[test]
    fn uninitialised_grid_ignores_everything() {
        let mut grid = SandGrid::new(8.0, Duration::from_millis(50));
        let piece = Piece::new(PieceKind::O, Rgb(9, 9, 9), 20.0);
        grid.add_piece(&piece, 20.0);
        assert!(!grid.update(Duration::from_secs(1), &mut StepRng::new(0, 0)));
        assert!(!grid.is_game_over());
        assert_eq!(grid.occupied(), 0);
    }

    #[test]
    fn grain_with_space_below_falls_one_row() {
        let mut grid = grid_from_rows(&["a..", "...", "..."]);
        grid.tick(&mut StepRng::new(0, 0));
        assert_eq!(grid_to_rows(&grid), vec!["...", "a..", "..."]);
        grid.tick(&mut StepRng::new(0, 0));
        assert_eq!(grid_to_rows(&grid), vec!["...", "...", "a.."]);
    }

    #[test]
    fn column_of_grains_moves_together_without_double_moves() {
        let mut grid = grid_from_rows(&[".a.", ".b.", "...", "..."]);
        grid.tick(&mut StepRng::new(0, 0));
        assert_eq!(grid_to_rows(&grid), vec!["...", ".a.", ".b.", "..."]);
    }

    #[test]
    fn fully_supported_grain_stays() {
        let rows = ["...", ".a.", "bbb"];
        let mut grid = grid_from_rows(&rows);
        grid.tick(&mut StepRng::new(0, 0));
        assert_eq!(grid_to_rows(&grid), rows);
    }

    #[test]
    fn blocked_grain_rolls_and_both_directions_are_reachable() {
        let rows = ["...", ".a.", ".b."];
        let mut low = grid_from_rows(&rows);
        low.tick(&mut StepRng::new(0, 0));
        let mut high = grid_from_rows(&rows);
        high.tick(&mut StepRng::new(u64::MAX, 0));

        let a = Cell::Sand(Rgb(b'a', 0, 0));
        let landed = |g: &SandGrid| (g.get(0, 2) == Some(a), g.get(2, 2) == Some(a));
        let (l1, r1) = landed(&low);
        let (l2, r2) = landed(&high);
        assert!(l1 ^ r1);
        assert!(l2 ^ r2);
        assert_ne!(l1, l2);
        assert_eq!(low.get(1, 1), Some(Cell::Empty));
    }

    #[test]
    fn roll_takes_the_only_free_side() {
        let mut grid = grid_from_rows(&["...", "a..", "b.."]);
        grid.tick(&mut StepRng::new(0, 0));
        assert_eq!(grid_to_rows(&grid), vec!["...", "...", "ba."]);
    }

    #[test]
    fn ticks_conserve_grains() {
        let mut grid = grid_from_rows(&[
            "abcabcab", "........", "a.a.a.a.", "........", ".bb..cc.", "........",
        ]);
        let before = grid.occupied();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            grid.tick(&mut rng);
            assert_eq!(grid.occupied(), before);
        }
    }

    #[test]
    fn update_is_gated_by_interval() {
        let mut grid = grid_from_rows(&["a", ".", ".", "."]);
        let mut rng = StepRng::new(0, 0);
        assert!(grid.update(Duration::from_millis(0), &mut rng));
        assert!(!grid.update(Duration::from_millis(49), &mut rng));
        assert_eq!(grid_to_rows(&grid), vec![".", "a", ".", "."]);
        assert!(grid.update(Duration::from_millis(50), &mut rng));
        assert_eq!(grid_to_rows(&grid), vec![".", ".", "a", "."]);
    }

    #[test]
    fn add_piece_rasterises_and_clips() {
        let mut grid = SandGrid::new(8.0, Duration::from_millis(50));
        grid.resize(80.0, 80.0);
        let mut piece = Piece::new(PieceKind::O, Rgb(1, 1, 1), 16.0);
        piece.x = 0.0;
        piece.y = 0.0;
        grid.add_piece(&piece, 16.0);
        // 2x2 tiles of 16 px = 4x4 grains
        assert_eq!(grid.occupied(), 16);

        grid.reset();
        piece.x = 64.0;
        piece.y = 64.0;
        grid.add_piece(&piece, 16.0);
        // only the top-left block (64..80, 64..80) lands on the 10x10 grid
        assert_eq!(grid.occupied(), 4);
    }

    #[test]
    fn footprint_covers_partial_cells() {
        let mut grid = SandGrid::new(8.0, Duration::from_millis(50));
        grid.resize(80.0, 80.0);
        let cells: Vec<_> = grid.footprint(4.0, 0.0, 20.0).collect();
        assert_eq!(cells.len(), 9);
        assert!(cells.contains(&(0, 0)));
        assert!(cells.contains(&(2, 2)));
        assert!(!cells.contains(&(3, 0)));
    }

    #[test]
    fn game_over_only_for_top_two_rows() {
        let mut rows = vec!["....".to_string(), "....".to_string()];
        rows.extend(std::iter::repeat_n("aaaa".to_string(), 4));
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let mut grid = grid_from_rows(&refs);
        assert!(!grid.is_game_over());
        grid.set(3, 1, Cell::Sand(Rgb(1, 1, 1)));
        assert!(grid.is_game_over());
        grid.set(3, 1, Cell::Empty);
        grid.set(0, 0, Cell::Sand(Rgb(1, 1, 1)));
        assert!(grid.is_game_over());
    }

    #[test]
    fn hex_colours() {
        assert_eq!(Rgb::from_hex("#8A2BE2"), Some(Rgb(0x8a, 0x2b, 0xe2)));
        assert_eq!(Rgb(0, 255, 16).to_hex(), "#00ff10");
        assert_eq!(Rgb::from_hex("#fff"), None);
    }

    struct Recorder(Vec<(f64, f64, f64)>);

    impl Surface for Recorder {
        fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, _color: Rgb) {
            self.0.push((cx, cy, radius));
        }
        fn fill_rect(&mut self, _: f64, _: f64, _: f64, _: f64, _: Rgb) {}
    }

    #[test]
    fn draws_grains_as_centred_circles() {
        let mut grid = SandGrid::new(8.0, Duration::from_millis(50));
        grid.resize(16.0, 16.0);
        grid.set(1, 0, Cell::Sand(Rgb(1, 1, 1)));
        let mut rec = Recorder(Vec::new());
        grid.draw(&mut rec);
        assert_eq!(rec.0, vec![(12.0, 4.0, 4.0)]);
    }
}
