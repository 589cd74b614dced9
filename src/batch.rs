use ndarray::{ArrayD, Axis};
use tracing::debug;

use crate::canonical::Canonicalizer;
use crate::error::{Error, Result};
use crate::input::{resolve_sources, InputItem, ItemSource};
use crate::scope::Scope;
use crate::tensor::TensorHandle;
use crate::types::ItemGeometry;

/// Turns an ordered list of items into one `batch x H x W x 3` tensor.
///
/// Output index `i` always corresponds to the `i`-th image of the input, with rank-4
/// inputs contributing their images in batch order.
#[derive(Debug, Clone, Copy)]
pub struct BatchAssembler<'c> {
    canonicalizer: &'c Canonicalizer,
}

impl<'c> BatchAssembler<'c> {
    pub fn new(canonicalizer: &'c Canonicalizer) -> Self {
        Self { canonicalizer }
    }

    pub fn assemble(
        &self,
        scope: &mut Scope<'_>,
        items: &[InputItem],
    ) -> Result<(TensorHandle, Vec<ItemGeometry>)> {
        let sources = resolve_sources(items)?;
        self.assemble_sources(scope, &sources)
    }

    pub(crate) fn assemble_sources(
        &self,
        scope: &mut Scope<'_>,
        sources: &[ItemSource<'_>],
    ) -> Result<(TensorHandle, Vec<ItemGeometry>)> {
        if sources.is_empty() {
            return Err(Error::invalid_input("cannot assemble an empty batch"));
        }

        let mut frames = Vec::with_capacity(sources.len());
        let mut geometries = Vec::with_capacity(sources.len());
        for source in sources {
            let (frame, geometry) = self.canonicalizer.canonicalize_source(scope, *source)?;
            frames.push(frame);
            geometries.push(geometry);
        }

        let stacked = stack_frames(scope, &frames)?;
        for frame in &frames {
            scope.release(frame)?;
        }

        let batch = scope.alloc(stacked);
        debug!(shape = ?batch.shape(), "assembled batch");
        Ok((batch, geometries))
    }
}

fn stack_frames(scope: &Scope<'_>, frames: &[TensorHandle]) -> Result<ArrayD<f32>> {
    let arrays = frames
        .iter()
        .map(|frame| scope.read(frame))
        .collect::<Result<Vec<_>>>()?;
    let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();

    ndarray::stack(Axis(0), &views).map_err(|_| {
        let expected = frames[0].shape().to_vec();
        let actual = frames
            .iter()
            .map(|f| f.shape())
            .find(|shape| *shape != expected.as_slice())
            .unwrap_or_default()
            .to_vec();
        Error::BatchShapeMismatch { expected, actual }
    })
}
