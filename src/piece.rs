//! Falling pieces: shape tables, rotation, gravity and the next-piece lookahead.

use crate::grid::{Rgb, Surface};
use rand::Rng;
use rand::seq::SliceRandom;

/// Tetromino kinds (I, O, T, S, Z, J, L).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    pub const ALL: [Self; 7] = [Self::I, Self::O, Self::T, Self::S, Self::Z, Self::J, Self::L];

    /// 4 cells in tile units; each (dx, dy), y down.
    pub fn cells(&self) -> &'static [(i8, i8); 4] {
        match self {
            Self::I => &[(0, 0), (0, 1), (0, 2), (0, 3)],
            Self::O => &[(0, 0), (1, 0), (0, 1), (1, 1)],
            Self::T => &[(0, 0), (1, 0), (2, 0), (1, 1)],
            Self::S => &[(1, 0), (2, 0), (0, 1), (1, 1)],
            Self::Z => &[(0, 0), (1, 0), (1, 1), (2, 1)],
            Self::J => &[(1, 0), (1, 1), (1, 2), (0, 2)],
            Self::L => &[(0, 0), (0, 1), (0, 2), (1, 2)],
        }
    }

    pub fn glyph(self) -> char {
        match self {
            Self::I => 'I',
            Self::O => 'O',
            Self::T => 'T',
            Self::S => 'S',
            Self::Z => 'Z',
            Self::J => 'J',
            Self::L => 'L',
        }
    }
}

/// The active (or previewed) piece. Block offsets and position are in field px.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Rgb,
    pub blocks: [(f32, f32); 4],
    pub x: f32,
    pub y: f32,
    /// Degrees, 0..360 in steps of 90.
    pub rotation: u16,
    /// px per update pass.
    pub velocity_y: f32,
}

impl Piece {
    pub fn new(kind: PieceKind, color: Rgb, tile_size: f32) -> Self {
        let cells = *kind.cells();
        let blocks = cells.map(|(dx, dy)| (f32::from(dx) * tile_size, f32::from(dy) * tile_size));
        Self {
            kind,
            color,
            blocks,
            x: 0.0,
            y: 0.0,
            rotation: 0,
            velocity_y: 0.0,
        }
    }

    /// Top-left px corner of every block.
    pub fn block_origins(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.blocks.iter().map(|&(bx, by)| (self.x + bx, self.y + by))
    }

    /// (min_x, min_y, max_x, max_y) of the block offsets.
    pub fn offset_bounds(&self) -> (f32, f32, f32, f32) {
        self.blocks.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(x0, y0, x1, y1), &(bx, by)| (x0.min(bx), y0.min(by), x1.max(bx), y1.max(by)),
        )
    }

    /// Rotate 90° clockwise about the second block.
    pub fn rotate_cw(&mut self) {
        let (px, py) = self.blocks[1];
        self.blocks = self.blocks.map(|(bx, by)| (px - (by - py), py + (bx - px)));
        self.rotation = (self.rotation + 90) % 360;
    }

    /// Integrate one pass: velocity picks up `gravity * dt_ms`, position picks up velocity.
    pub fn update(&mut self, dt_ms: f32, gravity: f32) {
        self.velocity_y += gravity * dt_ms;
        self.y += self.velocity_y;
    }

    pub fn draw(&self, tile_size: f32, surface: &mut dyn Surface) {
        let t = f64::from(tile_size);
        for (bx, by) in self.block_origins() {
            surface.fill_rect(f64::from(bx), f64::from(by), t, t, self.color);
        }
    }
}

/// Produces random pieces and keeps one in reserve as the preview.
#[derive(Debug, Clone)]
pub struct PieceGenerator {
    palette: Vec<Rgb>,
    tile_size: f32,
    next: Piece,
}

impl PieceGenerator {
    /// `palette` must be non-empty.
    pub fn new<R: Rng + ?Sized>(palette: Vec<Rgb>, tile_size: f32, rng: &mut R) -> Self {
        let next = Self::generate(&palette, tile_size, rng);
        Self {
            palette,
            tile_size,
            next,
        }
    }

    fn generate<R: Rng + ?Sized>(palette: &[Rgb], tile_size: f32, rng: &mut R) -> Piece {
        let kind = PieceKind::ALL[rng.gen_range(0..PieceKind::ALL.len())];
        let color = palette.choose(rng).copied().unwrap_or(Rgb(0xff, 0xff, 0xff));
        Piece::new(kind, color, tile_size)
    }

    pub fn next(&self) -> &Piece {
        &self.next
    }

    /// Promote the preview to a fresh active piece centred at the top of a field
    /// `field_width` px wide, and roll a new preview.
    pub fn spawn<R: Rng + ?Sized>(&mut self, field_width: f32, rng: &mut R) -> Piece {
        let fresh = Self::generate(&self.palette, self.tile_size, rng);
        let mut piece = std::mem::replace(&mut self.next, fresh);
        let t = self.tile_size;
        let (x0, y0, x1, _) = piece.offset_bounds();
        let width = x1 - x0 + t;
        let left = ((field_width / 2.0 - width / 2.0) / t).floor().max(0.0) * t;
        piece.x = left - x0;
        piece.y = -y0;
        piece.velocity_y = 0.0;
        piece
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn blocks_are_scaled_by_tile() {
        let piece = Piece::new(PieceKind::T, Rgb(1, 2, 3), 20.0);
        assert_eq!(piece.blocks, [(0.0, 0.0), (20.0, 0.0), (40.0, 0.0), (20.0, 20.0)]);
    }

    #[test]
    fn rotates_clockwise_about_second_block() {
        let mut piece = Piece::new(PieceKind::T, Rgb(1, 2, 3), 20.0);
        piece.rotate_cw();
        // pivot (20, 0): left arm goes up, right arm goes down, stem goes left
        assert_eq!(piece.blocks, [(20.0, -20.0), (20.0, 0.0), (20.0, 20.0), (0.0, 0.0)]);
        assert_eq!(piece.rotation, 90);

        let original = Piece::new(PieceKind::T, Rgb(1, 2, 3), 20.0).blocks;
        for _ in 0..3 {
            piece.rotate_cw();
        }
        assert_eq!(piece.blocks, original);
        assert_eq!(piece.rotation, 0);
    }

    #[test]
    fn gravity_accumulates_velocity() {
        let mut piece = Piece::new(PieceKind::O, Rgb(0, 0, 0), 20.0);
        piece.update(10.0, 0.01);
        assert!((piece.velocity_y - 0.1).abs() < 1e-6);
        assert!((piece.y - 0.1).abs() < 1e-6);
        piece.update(10.0, 0.01);
        assert!((piece.velocity_y - 0.2).abs() < 1e-6);
        assert!((piece.y - 0.3).abs() < 1e-6);
    }

    #[test]
    fn spawn_promotes_lookahead_and_centres() {
        let mut rng = StdRng::seed_from_u64(3);
        let palette = vec![Rgb(1, 1, 1), Rgb(2, 2, 2)];
        let mut generator = PieceGenerator::new(palette.clone(), 20.0, &mut rng);
        let preview = generator.next().clone();
        let piece = generator.spawn(200.0, &mut rng);
        assert_eq!(piece.kind, preview.kind);
        assert_eq!(piece.color, preview.color);
        assert!(palette.contains(&piece.color));
        assert_eq!(piece.y, 0.0);
        assert_eq!(piece.velocity_y, 0.0);
        assert_eq!(piece.x % 20.0, 0.0);

        let (x0, _, x1, _) = piece.offset_bounds();
        let left = piece.x + x0;
        let right = piece.x + x1 + 20.0;
        assert!((left - (200.0 - right)).abs() <= 20.0);
    }

    #[test]
    fn generator_covers_all_kinds() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut generator = PieceGenerator::new(vec![Rgb(1, 1, 1)], 20.0, &mut rng);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(generator.spawn(200.0, &mut rng).kind);
        }
        assert_eq!(seen.len(), PieceKind::ALL.len());
    }
}
