//! Read-only buffers shared between batch workers.
//!
//! Reference and extra-reflection data are moved into a [`SharedBuffer`]
//! once, after which every worker reads them through an immutable view. No
//! mutable access exists, so workers can never alter the shared data.

use std::sync::Arc;

use ndarray::{Array3, ArrayView3};

/// An immutable, reference-counted 3D array.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    data: Arc<Array3<f32>>,
}

impl SharedBuffer {
    /// Move an array into a shared buffer.
    pub fn new(data: Array3<f32>) -> Self {
        log::trace!("Sharing buffer of shape {:?}", data.dim());
        Self {
            data: Arc::new(data),
        }
    }

    /// Read-only view of the data.
    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Number of handles currently sharing this buffer.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.data)
    }
}

/// A read-only cube: shared data plus its spectral index and identity.
#[derive(Debug, Clone)]
pub struct SharedCube {
    buffer: SharedBuffer,
    index: Arc<[f64]>,
    id_tag: String,
}

impl SharedCube {
    pub fn new(buffer: SharedBuffer, index: Vec<f64>, id_tag: impl Into<String>) -> Self {
        Self {
            buffer,
            index: index.into(),
            id_tag: id_tag.into(),
        }
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.buffer.view()
    }

    pub fn index(&self) -> &[f64] {
        &self.index
    }

    pub fn id_tag(&self) -> &str {
        &self.id_tag
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.buffer.dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_storage() {
        let buffer = SharedBuffer::new(Array3::from_elem((2, 2, 2), 1.0));
        let other = buffer.clone();
        assert_eq!(buffer.handle_count(), 2);
        assert_eq!(other.view().as_ptr(), buffer.view().as_ptr());
    }

    #[test]
    fn test_shared_cube_accessors() {
        let cube = SharedCube::new(
            SharedBuffer::new(Array3::zeros((1, 2, 3))),
            vec![500.0, 502.0, 504.0],
            "ref",
        );
        assert_eq!(cube.dim(), (1, 2, 3));
        assert_eq!(cube.index().len(), 3);
        assert_eq!(cube.id_tag(), "ref");
    }
}
