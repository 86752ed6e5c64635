//! D8 neighbourhood iteration

use super::{Direction, Raster, RasterElement};

/// Iterator over the valid D8 neighbours of a cell.
///
/// Yields `(row, col, direction)` in [`Direction::PRIORITY`] order, skipping
/// cells outside the grid and nodata cells.
pub struct Neighbors<'a, T: RasterElement> {
    raster: &'a Raster<T>,
    row: usize,
    col: usize,
    next: usize,
}

impl<'a, T: RasterElement> Neighbors<'a, T> {
    pub(crate) fn new(raster: &'a Raster<T>, row: usize, col: usize) -> Self {
        Self {
            raster,
            row,
            col,
            next: 0,
        }
    }
}

impl<'a, T: RasterElement> Iterator for Neighbors<'a, T> {
    type Item = (usize, usize, Direction);

    fn next(&mut self) -> Option<Self::Item> {
        let (rows, cols) = self.raster.shape();
        while self.next < Direction::PRIORITY.len() {
            let dir = Direction::PRIORITY[self.next];
            self.next += 1;

            let Some((nr, nc)) = dir.step(self.row, self.col, rows, cols) else {
                continue;
            };
            // Safe because step() only returns in-bounds cells
            let value = unsafe { self.raster.get_unchecked(nr, nc) };
            if self.raster.is_nodata(value) {
                continue;
            }
            return Some((nr, nc, dir));
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(Direction::PRIORITY.len() - self.next))
    }
}
