// Mesh Module - Maps 2D frame cells onto the physically ordered LED channels
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, warn};

use crate::frame::Frame;
use crate::output::LedOutput;
use crate::types::{Coordinate, Rgb};

/// Ordered table from hardware channel index to frame coordinate.
/// Index order must match the physical wiring of the strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshTable {
    coordinates: Vec<Coordinate>,
    width: usize,
    height: usize,
}

impl MeshTable {
    pub fn new(coordinates: Vec<Coordinate>) -> Result<Self> {
        if coordinates.is_empty() {
            anyhow::bail!("Mesh table is empty");
        }
        let width = coordinates.iter().map(|c| c.column).max().unwrap_or(0) + 1;
        let height = coordinates.iter().map(|c| c.row).max().unwrap_or(0) + 1;
        Ok(MeshTable {
            coordinates,
            width,
            height,
        })
    }

    /// Parse a JSON array of `[row, column]` pairs
    pub fn parse(json: &str) -> Result<Self> {
        let pairs: Vec<[i64; 2]> = serde_json::from_str(json).context("Mesh table must be a JSON array of [row, column] pairs")?;

        let mut coordinates = Vec::with_capacity(pairs.len());
        for (index, [row, column]) in pairs.into_iter().enumerate() {
            if row < 0 || column < 0 {
                anyhow::bail!("Mesh entry {} has a negative coordinate: [{}, {}]", index, row, column);
            }
            coordinates.push(Coordinate::new(row as usize, column as usize));
        }

        Self::new(coordinates)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).with_context(|| format!("Failed to read mesh file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse mesh file {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[cfg(test)]
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }
}

/// Pushes frames through the mesh table to the hardware output
pub struct MeshCoordinator<O: LedOutput> {
    table: MeshTable,
    output: O,
}

impl<O: LedOutput> MeshCoordinator<O> {
    pub fn new(table: MeshTable, output: O) -> Self {
        if output.channel_count() < table.len() {
            warn!(
                "Output has {} channels but the mesh maps {}; extra entries are dropped",
                output.channel_count(),
                table.len()
            );
        }
        MeshCoordinator { table, output }
    }

    pub fn table(&self) -> &MeshTable {
        &self.table
    }

    /// Copy every in-bounds mapped cell to its channel and commit once.
    /// Returns the number of channels written.
    pub fn render(&mut self, frame: &Frame) -> usize {
        let mut written = 0;
        for (index, coordinate) in self.table.coordinates.iter().enumerate() {
            if let Some(color) = frame.get(coordinate.row, coordinate.column) {
                self.output.set_channel(index, color);
                written += 1;
            }
        }
        self.commit();

        if written < self.table.len() {
            debug!("Rendered {} of {} mesh channels", written, self.table.len());
        }
        written
    }

    /// Set every channel to one color and commit
    pub fn fill(&mut self, color: Rgb) -> usize {
        for index in 0..self.table.len() {
            self.output.set_channel(index, color);
        }
        self.commit();
        self.table.len()
    }

    /// Hold the current picture on the hardware while nothing new is rendered
    pub fn keepalive(&mut self) {
        if let Err(e) = self.output.keepalive() {
            warn!("LED keepalive error: {:#}", e);
        }
    }

    fn commit(&mut self) {
        if let Err(e) = self.output.commit() {
            warn!("LED output error: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::testing::RecordingOutput;
    use std::io::Write;

    #[test]
    fn test_parse_derives_dimensions() {
        let table = MeshTable::parse("[[0, 0], [0, 1], [2, 5], [1, 3]]").unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.width(), 6);
        assert_eq!(table.height(), 3);
        assert_eq!(table.coordinates()[2], Coordinate::new(2, 5));
    }

    #[test]
    fn test_parse_rejects_bad_tables() {
        assert!(MeshTable::parse("[]").is_err());
        assert!(MeshTable::parse("[[0, -1]]").is_err());
        assert!(MeshTable::parse("[[0, 1, 2]]").is_err());
        assert!(MeshTable::parse("{\"rows\": 3}").is_err());
        assert!(MeshTable::parse("not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[[1, 1], [0, 2]]").unwrap();
        let table = MeshTable::load(file.path()).unwrap();
        assert_eq!(table.width(), 3);
        assert_eq!(table.height(), 2);

        assert!(MeshTable::load(Path::new("/nonexistent/mesh.json")).is_err());
    }

    #[test]
    fn test_render_writes_every_in_bounds_channel() {
        let table = MeshTable::parse("[[0, 0], [1, 2], [0, 1]]").unwrap();
        let output = RecordingOutput::new(3);
        let mut mesh = MeshCoordinator::new(table, output.clone());

        let mut frame = Frame::new(3, 2);
        frame.set(1, 2, Rgb::new(9, 9, 9));
        frame.set(0, 1, Rgb::new(1, 2, 3));

        assert_eq!(mesh.render(&frame), 3);
        assert_eq!(output.commit_count(), 1);
        assert_eq!(output.last().unwrap(), vec![Rgb::BLACK, Rgb::new(9, 9, 9), Rgb::new(1, 2, 3)]);
    }

    #[test]
    fn test_render_skips_out_of_bounds_without_error() {
        let table = MeshTable::parse("[[0, 0], [4, 4], [0, 1]]").unwrap();
        let output = RecordingOutput::new(3);
        let mut mesh = MeshCoordinator::new(table, output.clone());

        let frame = Frame::filled(2, 1, Rgb::WHITE);
        assert_eq!(mesh.render(&frame), 2);
        assert_eq!(output.commit_count(), 1);
        assert_eq!(output.last().unwrap()[1], Rgb::BLACK);
    }

    #[test]
    fn test_fill_sets_all_channels() {
        let table = MeshTable::parse("[[0, 0], [0, 1]]").unwrap();
        let output = RecordingOutput::new(2);
        let mut mesh = MeshCoordinator::new(table, output.clone());
        assert_eq!(mesh.fill(Rgb::new(5, 6, 7)), 2);
        assert_eq!(output.last().unwrap(), vec![Rgb::new(5, 6, 7); 2]);
    }
}
