use ndarray::Array2;

use crate::errors::Result;

/// Row-major raster samples, `size` is `(cols, rows)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer<T> {
    pub size: (usize, usize),
    pub data: Vec<T>,
}

impl<T: Copy> Buffer<T> {
    pub fn new(size: (usize, usize), data: Vec<T>) -> Self {
        assert_eq!(
            size.0 * size.1,
            data.len(),
            "size {:?} does not match length {}",
            size,
            data.len()
        );
        Buffer { size, data }
    }

    /// Buffer of `size` filled with `value`.
    pub fn filled(size: (usize, usize), value: T) -> Self {
        Buffer {
            size,
            data: vec![value; size.0 * size.1],
        }
    }

    pub fn width(&self) -> usize {
        self.size.0
    }

    pub fn height(&self) -> usize {
        self.size.1
    }

    /// Sample at column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x < self.size.0 && y < self.size.1 {
            Some(self.data[y * self.size.0 + x])
        } else {
            None
        }
    }

    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.size.0..(y + 1) * self.size.0]
    }

    pub fn to_array(self) -> Result<Array2<T>> {
        Ok(Array2::from_shape_vec(
            (self.size.1, self.size.0),
            self.data,
        )?)
    }
}

impl<T: Copy> TryFrom<Buffer<T>> for Array2<T> {
    type Error = crate::errors::GeolocError;

    fn try_from(value: Buffer<T>) -> std::result::Result<Self, Self::Error> {
        value.to_array()
    }
}

impl<T: Copy> From<Array2<T>> for Buffer<T> {
    fn from(value: Array2<T>) -> Self {
        let (rows, cols) = value.dim();
        let data = value.as_standard_layout().iter().copied().collect();
        Buffer::new((cols, rows), data)
    }
}
