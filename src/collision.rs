//! Piece legality against the field edges and settled grains, rotation kicks,
//! and landing resolution.

use crate::grid::SandGrid;
use crate::piece::Piece;

/// Kick offsets in tiles, tried in order: none, right, left, up, up-right, up-left.
pub const KICKS: [(f32, f32); 6] = [
    (0.0, 0.0),
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, -1.0),
    (1.0, -1.0),
    (-1.0, -1.0),
];

/// Playfield extent in px plus the piece tile size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub width: f32,
    pub height: f32,
    pub tile_size: f32,
}

impl Field {
    /// True if any block leaves the field through the left, right or bottom edge.
    /// The top edge is open.
    pub fn out_of_bounds(&self, piece: &Piece) -> bool {
        piece.block_origins().any(|(bx, by)| {
            bx < 0.0 || bx + self.tile_size > self.width || by + self.tile_size > self.height
        })
    }

    /// Edge test plus a check of every grid cell under each block's footprint.
    pub fn collides(&self, piece: &Piece, grid: &SandGrid) -> bool {
        self.out_of_bounds(piece) || self.overlaps_grains(piece, grid)
    }

    fn overlaps_grains(&self, piece: &Piece, grid: &SandGrid) -> bool {
        piece.block_origins().any(|(bx, by)| {
            grid.footprint(bx, by, self.tile_size)
                .any(|(gx, gy)| grid.cell_at(gx, gy).is_some_and(|c| !c.is_empty()))
        })
    }

    /// Below the floor or on top of grains. Side walls are ignored.
    fn buried(&self, piece: &Piece, grid: &SandGrid) -> bool {
        piece.block_origins().any(|(_, by)| by + self.tile_size > self.height)
            || self.overlaps_grains(piece, grid)
    }

    /// First kick offset (px) under which `piece` is legal.
    pub fn find_kick(&self, piece: &Piece, grid: &SandGrid) -> Option<(f32, f32)> {
        let mut probe = piece.clone();
        KICKS.iter().find_map(|&(kx, ky)| {
            let (dx, dy) = (kx * self.tile_size, ky * self.tile_size);
            probe.x = piece.x + dx;
            probe.y = piece.y + dy;
            (!self.collides(&probe, grid)).then_some((dx, dy))
        })
    }

    /// Rotate clockwise, kicking if needed. On failure the piece is left exactly as it was.
    pub fn try_rotate(&self, piece: &mut Piece, grid: &SandGrid) -> bool {
        let mut rotated = piece.clone();
        rotated.rotate_cw();
        match self.find_kick(&rotated, grid) {
            Some((dx, dy)) => {
                rotated.x += dx;
                rotated.y += dy;
                *piece = rotated;
                true
            }
            None => false,
        }
    }

    /// Shift horizontally by `dx` px unless that would collide.
    pub fn try_shift(&self, piece: &mut Piece, dx: f32, grid: &SandGrid) -> bool {
        piece.x += dx;
        if self.collides(piece, grid) {
            piece.x -= dx;
            return false;
        }
        true
    }

    /// Lowest legal `y` reachable by sweeping down from `from_y` (legal) towards
    /// `piece.y` (colliding) in 1 px steps.
    pub fn settle(&self, piece: &Piece, from_y: f32, grid: &SandGrid) -> f32 {
        let target = piece.y;
        let mut probe = piece.clone();
        let mut y = from_y;
        while y < target {
            let step = (y + 1.0).min(target);
            probe.y = step;
            if self.collides(&probe, grid) {
                break;
            }
            y = step;
        }
        y
    }

    /// Nearest `y` at or above `piece.y`, in 1 px steps, where the piece is
    /// neither below the floor nor on grains. Gives up once it is above the field.
    pub fn lift(&self, piece: &Piece, grid: &SandGrid) -> f32 {
        let mut probe = piece.clone();
        while self.buried(&probe, grid)
            && probe.block_origins().any(|(_, by)| by + self.tile_size > 0.0)
        {
            probe.y -= 1.0;
        }
        probe.y
    }

    /// Resting `y` for a colliding piece. Sweeps down from `last_free` when that
    /// spot is above the piece and still legal, otherwise lifts the piece off
    /// whatever it overlaps. The result never overlaps a grain.
    pub fn landing_y(&self, piece: &Piece, last_free: Option<f32>, grid: &SandGrid) -> f32 {
        if let Some(from) = last_free.filter(|&from| from <= piece.y) {
            let mut start = piece.clone();
            start.y = from;
            if !self.buried(&start, grid) {
                return self.settle(piece, from, grid);
            }
        }
        self.lift(piece, grid)
    }
}
