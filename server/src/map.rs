//! Collision grid of the level
//!
//! The level itself is loaded and rendered elsewhere. The game rules only need the
//! coarse grid of cells flagged as rock to pick spawn locations.

use crate::physics::Vector2;

pub trait CollisionGrid {
    fn grid_cols(&self) -> usize;
    fn grid_rows(&self) -> usize;
    fn cell_width(&self) -> f32;
    fn cell_height(&self) -> f32;
    /// True if the cell at `(x, y)` contains rock. Out-of-range cells are solid.
    fn is_solid(&self, x: usize, y: usize) -> bool;

    fn cell_center(&self, x: usize, y: usize) -> Vector2 {
        Vector2 {
            x: x as f32 * self.cell_width() + self.cell_width() / 2.0,
            y: y as f32 * self.cell_height() + self.cell_height() / 2.0,
        }
    }

    /// Solidity of the cell containing a level position.
    fn is_solid_at(&self, position: Vector2) -> bool {
        if position.x < 0.0 || position.y < 0.0 {
            return true;
        }
        let x = (position.x / self.cell_width()) as usize;
        let y = (position.y / self.cell_height()) as usize;
        self.is_solid(x, y)
    }
}

/// Grid stored as one flag per cell, row-major.
#[derive(Debug, Clone)]
pub struct GridMap {
    cols: usize,
    rows: usize,
    cell_width: f32,
    cell_height: f32,
    solid: Vec<bool>,
}

impl GridMap {
    /// A grid with no rock at all.
    pub fn open(cols: usize, rows: usize, cell_width: f32, cell_height: f32) -> Self {
        Self {
            cols,
            rows,
            cell_width,
            cell_height,
            solid: vec![false; cols * rows],
        }
    }

    /// Open grid enclosed by a one-cell rock border.
    pub fn arena(cols: usize, rows: usize, cell_width: f32, cell_height: f32) -> Self {
        let mut map = Self::open(cols, rows, cell_width, cell_height);
        for x in 0..cols {
            map.set_solid(x, 0, true);
            map.set_solid(x, rows.saturating_sub(1), true);
        }
        for y in 0..rows {
            map.set_solid(0, y, true);
            map.set_solid(cols.saturating_sub(1), y, true);
        }
        map
    }

    /// Builds a grid from text rows, `#` marking rock.
    pub fn from_rows(rows: &[&str], cell_width: f32, cell_height: f32) -> Self {
        let cols = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut map = Self::open(cols, rows.len(), cell_width, cell_height);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                map.set_solid(x, y, c == '#');
            }
        }
        map
    }

    pub fn set_solid(&mut self, x: usize, y: usize, solid: bool) {
        if x < self.cols && y < self.rows {
            self.solid[y * self.cols + x] = solid;
        }
    }

    pub fn fill(&mut self, solid: bool) {
        self.solid.iter_mut().for_each(|cell| *cell = solid);
    }
}

impl CollisionGrid for GridMap {
    fn grid_cols(&self) -> usize {
        self.cols
    }

    fn grid_rows(&self) -> usize {
        self.rows
    }

    fn cell_width(&self) -> f32 {
        self.cell_width
    }

    fn cell_height(&self) -> f32 {
        self.cell_height
    }

    fn is_solid(&self, x: usize, y: usize) -> bool {
        if x >= self.cols || y >= self.rows {
            return true;
        }
        self.solid[y * self.cols + x]
    }
}
