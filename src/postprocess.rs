use ndarray::Ix2;

use crate::error::{Error, Result};
use crate::network::OUTPUT_WIDTH;
use crate::scope::Scope;
use crate::tensor::TensorHandle;
use crate::types::{ItemGeometry, LandmarkSet};

/// Map raw network output back into each item's original pixel space.
///
/// Row `i` of `raw` is projected through `geometries[i]`. `raw` is released once every
/// row has been read.
pub fn postprocess(
    scope: &mut Scope<'_>,
    raw: &TensorHandle,
    geometries: &[ItemGeometry],
) -> Result<Vec<LandmarkSet>> {
    let expected = vec![geometries.len(), OUTPUT_WIDTH];
    let sets = {
        let data = scope.read(raw)?;
        let rows = data
            .view()
            .into_dimensionality::<Ix2>()
            .ok()
            .filter(|rows| rows.shape() == expected.as_slice())
            .ok_or_else(|| Error::BatchShapeMismatch {
                expected: expected.clone(),
                actual: data.shape().to_vec(),
            })?;

        rows.outer_iter()
            .zip(geometries)
            .map(|(row, geometry)| {
                let values: Vec<f32> = row.iter().copied().collect();
                LandmarkSet::from_normalized(&values, geometry)
            })
            .collect::<Vec<_>>()
    };

    scope.release(raw)?;
    Ok(sets)
}
