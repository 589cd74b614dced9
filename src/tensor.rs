//! Disposable tensor buffers.
//!
//! A [`TensorStore`] owns every numeric buffer the pipeline allocates. Callers and
//! pipeline stages only ever hold a [`TensorHandle`], an id plus a shape. Buffers stay
//! alive until the handle is passed to [`TensorStore::dispose`]; there is no implicit
//! reclamation, so [`TensorStore::num_tensors`] is an exact count of live buffers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::RgbImage;
use ndarray::{Array3, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of a buffer inside a [`TensorStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TensorId(u64);

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a live buffer. Cloning a handle does not clone the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorHandle {
    id: TensorId,
    shape: Vec<usize>,
}

impl TensorHandle {
    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

struct StoreInner {
    next_id: u64,
    buffers: HashMap<TensorId, Arc<ArrayD<f32>>>,
}

/// Registry of live tensor buffers.
///
/// The store is internally synchronised and may be shared between threads. Buffers are
/// kept behind `Arc` so that a reader never holds the registry lock while it computes.
pub struct TensorStore {
    inner: Mutex<StoreInner>,
}

impl TensorStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                next_id: 0,
                buffers: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a buffer. The returned handle is owned by the caller.
    pub fn create(&self, data: ArrayD<f32>) -> TensorHandle {
        let shape = data.shape().to_vec();
        let mut inner = self.lock();
        let id = TensorId(inner.next_id);
        inner.next_id += 1;
        inner.buffers.insert(id, Arc::new(data));
        TensorHandle { id, shape }
    }

    /// Allocate a buffer from a flat, row-major vector.
    pub fn from_shape_vec(&self, shape: &[usize], data: Vec<f32>) -> Result<TensorHandle> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|e| {
            Error::invalid_input(format!("cannot build tensor of shape {shape:?}: {e}"))
        })?;
        Ok(self.create(array))
    }

    /// Copy an RGB image into a rank-3 `height x width x 3` tensor with values in `[0, 255]`.
    pub fn from_image(&self, image: &RgbImage) -> TensorHandle {
        let (width, height) = image.dimensions();
        let array = Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
            f32::from(image.get_pixel(x as u32, y as u32)[c])
        });
        self.create(array.into_dyn())
    }

    /// Shared read access to a live buffer.
    pub fn read(&self, handle: &TensorHandle) -> Result<Arc<ArrayD<f32>>> {
        self.lock()
            .buffers
            .get(&handle.id)
            .cloned()
            .ok_or(Error::ResourceDisposal { id: handle.id })
    }

    /// Release a buffer. Releasing twice is an error, never a no-op.
    pub fn dispose(&self, handle: &TensorHandle) -> Result<()> {
        match self.lock().buffers.remove(&handle.id) {
            Some(_) => Ok(()),
            None => Err(Error::ResourceDisposal { id: handle.id }),
        }
    }

    pub fn is_live(&self, handle: &TensorHandle) -> bool {
        self.lock().buffers.contains_key(&handle.id)
    }

    /// Number of buffers currently alive.
    pub fn num_tensors(&self) -> usize {
        self.lock().buffers.len()
    }
}

impl Default for TensorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TensorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorStore")
            .field("num_tensors", &self.num_tensors())
            .finish()
    }
}
