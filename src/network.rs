//! The boundary to the landmark network.
//!
//! A [`LandmarkNet`] only sees plain arrays: a `batch x H x W x 3` input and a
//! `batch x 136` output of normalized `(x, y)` pairs. [`InferenceRunner`] does the
//! tensor bookkeeping around it and enforces that shape contract.

use std::sync::Arc;

use ndarray::{Array2, ArrayView4, Ix4};
use tracing::debug;

use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::tensor::TensorHandle;
use crate::types::NUM_LANDMARKS;

/// Width of one output row: 68 interleaved `(x, y)` pairs.
pub const OUTPUT_WIDTH: usize = NUM_LANDMARKS * 2;

/// A network producing 68 landmarks per image.
///
/// Implementations hold read-only weights and may be shared between threads; concurrent
/// forward passes must be independent of each other.
pub trait LandmarkNet: Send + Sync {
    /// Canonical `(width, height)` of the input layer.
    fn input_size(&self) -> (u32, u32);

    /// Run one forward pass. Coordinates are normalized to `[0, 1]` over the
    /// canonical frame, laid out as `[x0, y0, x1, y1, ...]` per row.
    fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>>;
}

impl<N: LandmarkNet + ?Sized> LandmarkNet for Arc<N> {
    fn input_size(&self) -> (u32, u32) {
        (**self).input_size()
    }

    fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        (**self).forward(batch)
    }
}

impl<N: LandmarkNet + ?Sized> LandmarkNet for Box<N> {
    fn input_size(&self) -> (u32, u32) {
        (**self).input_size()
    }

    fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        (**self).forward(batch)
    }
}

pub struct InferenceRunner<'n, N: ?Sized> {
    net: &'n N,
}

impl<'n, N: LandmarkNet + ?Sized> InferenceRunner<'n, N> {
    pub fn new(net: &'n N) -> Self {
        Self { net }
    }

    /// Run the network on `batch`, which is consumed and released once the pass is done.
    /// The raw output is allocated in `scope`.
    pub fn forward(&self, scope: &mut Scope<'_>, batch: TensorHandle) -> Result<TensorHandle> {
        let (width, height) = self.net.input_size();
        let n = batch.shape().first().copied().unwrap_or(0);
        let expected = vec![n, height as usize, width as usize, 3];
        if batch.shape() != expected.as_slice() {
            return Err(Error::BatchShapeMismatch {
                expected,
                actual: batch.shape().to_vec(),
            });
        }

        let output = {
            let data = scope.read(&batch)?;
            let view = data
                .view()
                .into_dimensionality::<Ix4>()
                .map_err(|_| Error::BatchShapeMismatch {
                    expected: expected.clone(),
                    actual: data.shape().to_vec(),
                })?;
            self.net.forward(view)?
        };
        scope.release(&batch)?;

        let expected_out = [n, OUTPUT_WIDTH];
        if output.shape() != expected_out {
            return Err(Error::BatchShapeMismatch {
                expected: expected_out.to_vec(),
                actual: output.shape().to_vec(),
            });
        }

        debug!(batch = n, "forward pass complete");
        Ok(scope.alloc(output.into_dyn()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorStore;
    use ndarray::{ArrayD, IxDyn};

    struct ConstantNet {
        width: usize,
    }

    impl LandmarkNet for ConstantNet {
        fn input_size(&self) -> (u32, u32) {
            (4, 4)
        }

        fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
            Ok(Array2::from_elem((batch.dim().0, self.width), 0.5))
        }
    }

    #[test]
    fn forward_consumes_batch_and_returns_output() {
        let store = TensorStore::new();
        let net = ConstantNet {
            width: OUTPUT_WIDTH,
        };

        let shape = store
            .tidy(|scope| {
                let batch = scope.alloc(ArrayD::zeros(IxDyn(&[2, 4, 4, 3])));
                let batch_id = batch.id();
                let out = InferenceRunner::new(&net).forward(scope, batch)?;
                assert_eq!(scope.num_tracked(), 1);
                assert_ne!(out.id(), batch_id);
                Ok(out.shape().to_vec())
            })
            .unwrap();

        assert_eq!(shape, vec![2, OUTPUT_WIDTH]);
        assert_eq!(store.num_tensors(), 0);
    }

    #[test]
    fn wrong_input_size_is_a_batch_mismatch() {
        let store = TensorStore::new();
        let net = ConstantNet {
            width: OUTPUT_WIDTH,
        };

        let result = store.tidy(|scope| {
            let batch = scope.alloc(ArrayD::zeros(IxDyn(&[1, 8, 8, 3])));
            InferenceRunner::new(&net).forward(scope, batch)
        });
        match result {
            Err(Error::BatchShapeMismatch { expected, actual }) => {
                assert_eq!(expected, vec![1, 4, 4, 3]);
                assert_eq!(actual, vec![1, 8, 8, 3]);
            }
            other => panic!("expected BatchShapeMismatch, got {other:?}"),
        }
        assert_eq!(store.num_tensors(), 0);
    }

    #[test]
    fn wrong_output_width_is_a_batch_mismatch() {
        let store = TensorStore::new();
        let net = ConstantNet { width: 10 };

        let result = store.tidy(|scope| {
            let batch = scope.alloc(ArrayD::zeros(IxDyn(&[3, 4, 4, 3])));
            InferenceRunner::new(&net).forward(scope, batch)
        });
        assert!(matches!(result, Err(Error::BatchShapeMismatch { .. })));
        assert_eq!(store.num_tensors(), 0);
    }
}
