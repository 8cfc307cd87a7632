// Frame Module - Fixed-size 2D color grid shared by patterns, compositor and mesh
use crate::types::Rgb;

/// Row-major grid of colors. Width and height never change after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    cells: Vec<Rgb>,
}

impl Frame {
    /// All-black frame
    pub fn new(width: usize, height: usize) -> Self {
        Frame {
            width,
            height,
            cells: vec![Rgb::BLACK; width * height],
        }
    }

    #[cfg(test)]
    pub fn filled(width: usize, height: usize, color: Rgb) -> Self {
        Frame {
            width,
            height,
            cells: vec![color; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn contains(&self, row: usize, column: usize) -> bool {
        row < self.height && column < self.width
    }

    pub fn get(&self, row: usize, column: usize) -> Option<Rgb> {
        if self.contains(row, column) {
            Some(self.cells[row * self.width + column])
        } else {
            None
        }
    }

    /// Out-of-bounds writes are ignored
    pub fn set(&mut self, row: usize, column: usize, color: Rgb) {
        if self.contains(row, column) {
            self.cells[row * self.width + column] = color;
        }
    }

    #[cfg(test)]
    pub fn cells(&self) -> &[Rgb] {
        &self.cells
    }

    pub fn fill(&mut self, color: Rgb) {
        self.cells.fill(color);
    }

    pub fn clear(&mut self) {
        self.fill(Rgb::BLACK);
    }

    #[cfg(test)]
    pub fn is_black(&self) -> bool {
        self.cells.iter().all(Rgb::is_black)
    }

    pub fn map(&mut self, mut f: impl FnMut(Rgb) -> Rgb) {
        for cell in &mut self.cells {
            *cell = f(*cell);
        }
    }

    /// Multiply every channel by `factor` (truncating)
    pub fn fade(&mut self, factor: f32) {
        self.map(|cell| cell.scale(factor));
    }

    pub fn faded(&self, factor: f32) -> Frame {
        let mut frame = self.clone();
        frame.fade(factor);
        frame
    }

    /// Additive blend with per-channel saturation. Frames of a different size
    /// only blend their overlapping region.
    #[cfg(test)]
    pub fn blend(&mut self, other: &Frame) {
        self.blend_where(other, |_| true);
    }

    /// Additive blend that skips black source cells
    pub fn blend_lit(&mut self, other: &Frame) {
        self.blend_where(other, |color| !color.is_black());
    }

    fn blend_where(&mut self, other: &Frame, keep: impl Fn(&Rgb) -> bool) {
        if self.width == other.width && self.height == other.height {
            for (cell, source) in self.cells.iter_mut().zip(&other.cells) {
                if keep(source) {
                    *cell = cell.saturating_add(*source);
                }
            }
            return;
        }

        let rows = self.height.min(other.height);
        let columns = self.width.min(other.width);
        for row in 0..rows {
            for column in 0..columns {
                let source = other.cells[row * other.width + column];
                if keep(&source) {
                    let index = row * self.width + column;
                    self.cells[index] = self.cells[index].saturating_add(source);
                }
            }
        }
    }
}
