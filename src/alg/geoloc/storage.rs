//! Storage of backmap cells.
//!
//! A backmap cell accumulates the full resolution pixel and line of the grid
//! positions mapping near it, together with their total weight. Once the
//! backmap is built every non empty cell has a weight of 1. Cells are kept
//! either in memory or in an anonymous scratch file, see
//! `GDAL_GEOLOC_USE_TEMP_DATASETS`.
//!
//! Reads take `&self` and need no locking; writes happen during the build
//! only and take `&mut self`.

use std::fs::File;
use std::io;

use ndarray::Array2;

use crate::errors::{GeolocError, Result};

/// Above this number of geolocation nodes the backmap goes to a scratch file
/// unless configured otherwise.
pub const TEMP_DATASET_NODE_THRESHOLD: usize = 16 * 1024 * 1024;

/// Weighted pixel sum, weighted line sum and weight. A zero weight marks an
/// empty cell.
pub type BackmapCell = [f32; 3];

const EMPTY: BackmapCell = [0.0; 3];

/// Cell access to a backmap of `size()` = `(width, height)` cells.
pub trait BackmapStorage: Send + Sync {
    fn size(&self) -> (usize, usize);
    fn get(&self, x: usize, y: usize) -> Result<BackmapCell>;
    fn set(&mut self, x: usize, y: usize, cell: BackmapCell) -> Result<()>;

    /// Pixel/line of a cell, `None` when empty.
    fn value(&self, x: usize, y: usize) -> Result<Option<[f32; 2]>> {
        let [sum_x, sum_y, weight] = self.get(x, y)?;
        Ok((weight > 0.0).then(|| [sum_x / weight, sum_y / weight]))
    }

    fn set_value(&mut self, x: usize, y: usize, value: Option<[f32; 2]>) -> Result<()> {
        self.set(x, y, value.map_or(EMPTY, |[px, py]| [px, py, 1.0]))
    }

    /// Makes the written cells durable. Called once the build is done.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn check_bounds(size: (usize, usize), x: usize, y: usize) -> Result<()> {
    if x >= size.0 || y >= size.1 {
        return Err(GeolocError::BadArgument(format!(
            "Backmap cell ({x}, {y}) is outside of a {}x{} backmap",
            size.0, size.1
        )));
    }
    Ok(())
}

/// In memory backmap.
#[derive(Debug)]
pub struct HeapStorage {
    cells: Array2<BackmapCell>,
}

impl HeapStorage {
    pub fn new(width: usize, height: usize) -> Self {
        HeapStorage {
            cells: Array2::from_elem((height, width), EMPTY),
        }
    }
}

impl BackmapStorage for HeapStorage {
    fn size(&self) -> (usize, usize) {
        (self.cells.ncols(), self.cells.nrows())
    }

    fn get(&self, x: usize, y: usize) -> Result<BackmapCell> {
        check_bounds(self.size(), x, y)?;
        Ok(self.cells[(y, x)])
    }

    fn set(&mut self, x: usize, y: usize, cell: BackmapCell) -> Result<()> {
        check_bounds(self.size(), x, y)?;
        self.cells[(y, x)] = cell;
        Ok(())
    }
}

const CELL_BYTES: usize = 3 * std::mem::size_of::<f32>();

/// Backmap stored in an anonymous temporary file, three little endian `f32`
/// per cell. The file is removed when dropped.
#[derive(Debug)]
pub struct ScratchFileStorage {
    file: File,
    size: (usize, usize),
}

impl ScratchFileStorage {
    /// Creates a scratch backmap of empty cells.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let file = tempfile::tempfile()?;
        // zero bytes decode to empty cells
        file.set_len((width * height * CELL_BYTES) as u64)?;
        tracing::debug!(width, height, "backmap scratch file created");
        Ok(ScratchFileStorage {
            file,
            size: (width, height),
        })
    }

    fn offset(&self, x: usize, y: usize) -> u64 {
        ((y * self.size.0 + x) * CELL_BYTES) as u64
    }
}

fn encode(cell: BackmapCell) -> [u8; CELL_BYTES] {
    let mut bytes = [0u8; CELL_BYTES];
    for (chunk, v) in bytes.chunks_exact_mut(4).zip(cell) {
        chunk.copy_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode(bytes: [u8; CELL_BYTES]) -> BackmapCell {
    let mut cell = EMPTY;
    for (v, chunk) in cell.iter_mut().zip(bytes.chunks_exact(4)) {
        *v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    cell
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    std::os::unix::fs::FileExt::read_exact_at(file, buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    std::os::unix::fs::FileExt::write_all_at(file, buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => return Err(io::ErrorKind::UnexpectedEof.into()),
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset)? {
            0 => return Err(io::ErrorKind::WriteZero.into()),
            n => {
                buf = &buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

impl BackmapStorage for ScratchFileStorage {
    fn size(&self) -> (usize, usize) {
        self.size
    }

    fn get(&self, x: usize, y: usize) -> Result<BackmapCell> {
        check_bounds(self.size, x, y)?;
        let mut bytes = [0u8; CELL_BYTES];
        read_exact_at(&self.file, &mut bytes, self.offset(x, y))?;
        Ok(decode(bytes))
    }

    fn set(&mut self, x: usize, y: usize, cell: BackmapCell) -> Result<()> {
        check_bounds(self.size, x, y)?;
        write_all_at(&self.file, &encode(cell), self.offset(x, y))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}
