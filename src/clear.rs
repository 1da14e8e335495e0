//! Line clearance: flood-fill same-colour clusters and clear the ones that span
//! enough of the field width.

use crate::grid::{Cell, SandGrid};

const NEIGHBOURS_8: [(isize, isize); 8] = [
    (-1, -1), (0, -1), (1, -1),
    (-1, 0),           (1, 0),
    (-1, 1),  (0, 1),  (1, 1),
];

/// Result of one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Number of clusters cleared.
    pub count: u32,
    /// Every cell that was emptied, in scan order.
    pub cells: Vec<(usize, usize)>,
}

impl ClearReport {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Horizontal bounding-box span of a cluster, in cells.
pub fn span(cluster: &[(usize, usize)]) -> usize {
    let min = cluster.iter().map(|&(x, _)| x).min();
    let max = cluster.iter().map(|&(x, _)| x).max();
    match (min, max) {
        (Some(min), Some(max)) => max - min + 1,
        _ => 0,
    }
}

impl SandGrid {
    /// Maximal 8-connected same-colour component containing `(x, y)`.
    /// Cells are marked in `visited` (row-major, `cols * rows` long).
    pub fn find_cluster(&self, x: usize, y: usize, visited: &mut [bool]) -> Vec<(usize, usize)> {
        let cols = self.cols();
        let Some(color @ Cell::Sand(_)) = self.get(x, y) else {
            return Vec::new();
        };
        let mut cluster = Vec::new();
        let mut stack = vec![(x, y)];
        visited[y * cols + x] = true;

        while let Some((cx, cy)) = stack.pop() {
            cluster.push((cx, cy));
            for (dx, dy) in NEIGHBOURS_8 {
                let (Some(nx), Some(ny)) = (cx.checked_add_signed(dx), cy.checked_add_signed(dy))
                else {
                    continue;
                };
                if self.get(nx, ny) == Some(color) && !visited[ny * cols + nx] {
                    visited[ny * cols + nx] = true;
                    stack.push((nx, ny));
                }
            }
        }
        cluster
    }

    /// True when a cluster spans at least `ratio` of the grid's columns.
    pub fn is_complete_line(&self, cluster: &[(usize, usize)], ratio: f32) -> bool {
        !cluster.is_empty() && span(cluster) as f32 >= self.cols() as f32 * ratio
    }

    /// Scan every cluster once in row-major order and clear the wide ones.
    pub fn scan_and_clear(&mut self, ratio: f32) -> ClearReport {
        let mut report = ClearReport::default();
        if !self.is_initialized() {
            return report;
        }
        let (cols, rows) = (self.cols(), self.rows());
        let mut visited = vec![false; cols * rows];

        for y in 0..rows {
            for x in 0..cols {
                if visited[y * cols + x] || self.get(x, y).is_none_or(Cell::is_empty) {
                    continue;
                }
                let cluster = self.find_cluster(x, y, &mut visited);
                if self.is_complete_line(&cluster, ratio) {
                    for &(cx, cy) in &cluster {
                        self.set(cx, cy, Cell::Empty);
                    }
                    report.count += 1;
                    report.cells.extend(cluster);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{grid_from_rows, grid_to_rows};

    #[test]
    fn wide_band_is_cleared() {
        let mut grid = grid_from_rows(&[
            "..........",
            "aaaaaaaa..",
            "bbbbbbbbbb",
        ]);
        let report = grid.scan_and_clear(0.8);
        assert_eq!(report.count, 2);
        assert_eq!(report.cells.len(), 18);
        assert_eq!(grid.occupied(), 0);
    }

    #[test]
    fn narrow_band_stays() {
        let rows = ["..........", "aaaaaaa...", ".........."];
        let mut grid = grid_from_rows(&rows);
        let report = grid.scan_and_clear(0.8);
        assert!(report.is_empty());
        assert_eq!(grid_to_rows(&grid), rows);
    }

    #[test]
    fn only_the_band_is_removed() {
        let mut grid = grid_from_rows(&[
            "b.........",
            "aaaaaaaaa.",
            "cc......cc",
        ]);
        let report = grid.scan_and_clear(0.8);
        assert_eq!(report.count, 1);
        assert_eq!(
            grid_to_rows(&grid),
            vec!["b.........", "..........", "cc......cc"]
        );
    }

    #[test]
    fn sparse_diagonal_cluster_counts_by_width() {
        let mut grid = grid_from_rows(&[
            "a...a.....",
            ".a.a.a...a",
            "..a...a.a.",
            ".......a..",
        ]);
        let report = grid.scan_and_clear(0.8);
        assert_eq!(report.count, 1);
        assert_eq!(grid.occupied(), 0);
    }

    #[test]
    fn colours_do_not_merge() {
        let rows = ["aaaaabbbbb"];
        let mut grid = grid_from_rows(&rows);
        assert!(grid.scan_and_clear(0.8).is_empty());
        assert_eq!(grid_to_rows(&grid), rows);
    }

    #[test]
    fn empty_grid_is_idempotent() {
        let mut grid = grid_from_rows(&["....", "....", "...."]);
        assert_eq!(grid.scan_and_clear(0.8), ClearReport::default());
        assert_eq!(grid.occupied(), 0);
    }

    #[test]
    fn cluster_is_maximal() {
        let grid = grid_from_rows(&["aa.a", "..a.", "a..."]);
        let mut visited = vec![false; 12];
        let cluster = grid.find_cluster(0, 0, &mut visited);
        assert_eq!(cluster.len(), 4);
        assert_eq!(span(&cluster), 4);
        assert!(!visited[8]);
    }
}
