//! Input canonicalization.
//!
//! Every input item is resampled onto the network's canonical `height x width x 3`
//! frame. Items whose aspect ratio already matches are stretched directly; all other
//! items are letterboxed: scaled uniformly so the longer side fits, then placed
//! according to the [`PaddingPolicy`] with the remainder filled by a neutral value.

use ndarray::{Array3, Axis, Ix4};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::input::{InputItem, ItemSource};
use crate::sampling::{sample_bilinear, PixelSource, TensorPixels};
use crate::scope::Scope;
use crate::tensor::TensorHandle;
use crate::types::ItemGeometry;

/// Where letterboxed content is anchored inside the canonical frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingPolicy {
    /// Centre the content; padding is split evenly on both sides.
    #[default]
    Center,
    /// Anchor the content at the top-left corner; padding goes right and bottom.
    TopLeft,
}

#[derive(Debug, Clone)]
pub struct Canonicalizer {
    width: u32,
    height: u32,
    padding: PaddingPolicy,
    fill_value: f32,
}

impl Canonicalizer {
    /// `input_size` is the canonical `(width, height)`.
    pub fn new(input_size: (u32, u32), padding: PaddingPolicy, fill_value: f32) -> Self {
        Self {
            width: input_size.0,
            height: input_size.1,
            padding,
            fill_value,
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn padding(&self) -> PaddingPolicy {
        self.padding
    }

    /// Placement of a `width x height` item in the canonical frame.
    pub fn geometry_for(&self, width: u32, height: u32) -> Result<ItemGeometry> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_input(format!(
                "item has zero size: {width}x{height}"
            )));
        }

        if u64::from(width) * u64::from(self.height) == u64::from(height) * u64::from(self.width)
        {
            return Ok(ItemGeometry::direct(width, height));
        }

        let frame_w = self.width as f32;
        let frame_h = self.height as f32;
        let scale_x = frame_w / width as f32;
        let scale_y = frame_h / height as f32;

        // The binding axis is filled edge to edge; only the other axis is padded.
        let (scale, slack_x, slack_y) = if scale_x <= scale_y {
            (scale_x, 0.0, frame_h - height as f32 * scale_x)
        } else {
            (scale_y, frame_w - width as f32 * scale_y, 0.0)
        };

        let (shift_x, shift_y) = match self.padding {
            PaddingPolicy::Center => (slack_x / 2.0, slack_y / 2.0),
            PaddingPolicy::TopLeft => (0.0, 0.0),
        };

        Ok(ItemGeometry {
            original_width: width,
            original_height: height,
            scale,
            shift_x,
            shift_y,
            frame_width: frame_w,
            frame_height: frame_h,
        })
    }

    /// Canonicalize one item holding exactly one image.
    pub fn canonicalize(
        &self,
        scope: &mut Scope<'_>,
        item: &InputItem,
    ) -> Result<(TensorHandle, ItemGeometry)> {
        self.canonicalize_source(scope, ItemSource::single(item)?)
    }

    pub(crate) fn canonicalize_source(
        &self,
        scope: &mut Scope<'_>,
        source: ItemSource<'_>,
    ) -> Result<(TensorHandle, ItemGeometry)> {
        let (frame, geometry) = match source {
            ItemSource::Image(image) => self.resample(image)?,
            ItemSource::Tensor3(handle) => {
                let data = scope.read(handle)?;
                let view = data
                    .view()
                    .into_dimensionality::<ndarray::Ix3>()
                    .map_err(|e| Error::invalid_input(format!("rank 3 tensor expected: {e}")))?;
                self.resample(&TensorPixels::new(view)?)?
            }
            ItemSource::Tensor4 { handle, index } => {
                let data = scope.read(handle)?;
                let view = data
                    .view()
                    .into_dimensionality::<Ix4>()
                    .map_err(|e| Error::invalid_input(format!("rank 4 tensor expected: {e}")))?;
                if index >= view.len_of(Axis(0)) {
                    return Err(Error::invalid_input(format!(
                        "batch index {index} out of range for shape {:?}",
                        handle.shape()
                    )));
                }
                self.resample(&TensorPixels::new(view.index_axis_move(Axis(0), index))?)?
            }
        };

        debug!(
            width = geometry.original_width,
            height = geometry.original_height,
            scale = geometry.scale,
            shift_x = geometry.shift_x,
            shift_y = geometry.shift_y,
            "canonicalized item"
        );
        Ok((scope.alloc(frame.into_dyn()), geometry))
    }

    fn resample<P: PixelSource + ?Sized>(&self, src: &P) -> Result<(Array3<f32>, ItemGeometry)> {
        let geometry = self.geometry_for(src.width(), src.height())?;
        let (out_w, out_h) = (self.width as usize, self.height as usize);
        let src_w = geometry.original_width as f32;
        let src_h = geometry.original_height as f32;
        let step_x = geometry.frame_width / out_w as f32;
        let step_y = geometry.frame_height / out_h as f32;

        let mut frame = Array3::from_elem((out_h, out_w, 3), self.fill_value);
        for cy in 0..out_h {
            // Continuous source coordinate of this row's pixel centre.
            let v = ((cy as f32 + 0.5) * step_y - geometry.shift_y) / geometry.scale;
            if v < 0.0 || v >= src_h {
                continue;
            }
            for cx in 0..out_w {
                let u = ((cx as f32 + 0.5) * step_x - geometry.shift_x) / geometry.scale;
                if u < 0.0 || u >= src_w {
                    continue;
                }
                for c in 0..3 {
                    frame[[cy, cx, c]] = sample_bilinear(src, u - 0.5, v - 0.5, c);
                }
            }
        }
        Ok((frame, geometry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorStore;
    use image::{Rgb, RgbImage};
    use ndarray::{ArrayD, IxDyn};

    fn square(policy: PaddingPolicy) -> Canonicalizer {
        Canonicalizer::new((100, 100), policy, 0.0)
    }

    #[test]
    fn matching_aspect_has_zero_shift_and_unit_scale() {
        let canon = square(PaddingPolicy::Center);
        for size in [50, 100, 150, 1000] {
            let g = canon.geometry_for(size, size).unwrap();
            assert_eq!(g.scale, 1.0);
            assert_eq!(g.shift_x, 0.0);
            assert_eq!(g.shift_y, 0.0);
        }

        let wide = Canonicalizer::new((160, 80), PaddingPolicy::Center, 0.0);
        let g = wide.geometry_for(300, 150).unwrap();
        assert_eq!((g.scale, g.shift_x, g.shift_y), (1.0, 0.0, 0.0));
    }

    #[test]
    fn wide_item_is_centred_vertically() {
        let g = square(PaddingPolicy::Center).geometry_for(200, 120).unwrap();
        assert!((g.scale - 0.5).abs() < 1e-6);
        assert_eq!(g.shift_x, 0.0);
        assert!((g.shift_y - 20.0).abs() < 1e-4);
    }

    #[test]
    fn tall_item_is_centred_horizontally() {
        let g = square(PaddingPolicy::Center).geometry_for(50, 200).unwrap();
        assert!((g.scale - 0.5).abs() < 1e-6);
        assert!((g.shift_x - 37.5).abs() < 1e-4);
        assert_eq!(g.shift_y, 0.0);
    }

    #[test]
    fn top_left_policy_has_no_shift() {
        let g = square(PaddingPolicy::TopLeft).geometry_for(200, 120).unwrap();
        assert_eq!((g.shift_x, g.shift_y), (0.0, 0.0));
        assert!((g.scale - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_size_is_rejected() {
        let err = square(PaddingPolicy::Center).geometry_for(0, 10).unwrap_err();
        assert!(matches!(err, Error::InvalidInputShape { .. }));
    }

    #[test]
    fn letterbox_pads_with_fill_value() {
        let store = TensorStore::new();
        let canon = Canonicalizer::new((10, 10), PaddingPolicy::Center, -1.0);
        let image = RgbImage::from_pixel(20, 10, Rgb([200, 200, 200]));

        let (frame, geometry) = store
            .tidy(|scope| {
                let (handle, geometry) = canon.canonicalize(scope, &InputItem::Image(image))?;
                let frame = scope.read(&handle)?.as_ref().clone();
                Ok((frame, geometry))
            })
            .unwrap();

        assert_eq!(frame.shape(), &[10, 10, 3]);
        assert!((geometry.shift_y - 2.5).abs() < 1e-5);
        // Content covers rows 2..=6.
        assert_eq!(frame[[0, 5, 0]], -1.0);
        assert_eq!(frame[[9, 5, 1]], -1.0);
        assert!((frame[[5, 5, 2]] - 200.0).abs() < 1e-3);
        assert_eq!(store.num_tensors(), 0);
    }

    #[test]
    fn tensor_and_image_agree() {
        let store = TensorStore::new();
        let canon = Canonicalizer::new((16, 16), PaddingPolicy::Center, 0.0);
        let image = RgbImage::from_fn(24, 12, |x, y| Rgb([(x * 10) as u8, (y * 20) as u8, 3]));
        let tensor = store.from_image(&image);
        let batched = {
            let data = store.read(&tensor).unwrap();
            let arr = data.as_ref().clone().insert_axis(Axis(0));
            store.create(arr)
        };

        let frames = store
            .tidy(|scope| {
                let mut out = Vec::new();
                for item in [
                    InputItem::Image(image.clone()),
                    InputItem::Tensor3(tensor.clone()),
                    InputItem::Tensor4(batched.clone()),
                ] {
                    let (handle, _) = canon.canonicalize(scope, &item)?;
                    out.push(scope.read(&handle)?.as_ref().clone());
                }
                Ok(out)
            })
            .unwrap();

        assert_eq!(frames[0], frames[1]);
        assert_eq!(frames[0], frames[2]);
        // Caller tensors are left alone.
        assert_eq!(store.num_tensors(), 2);
    }

    #[test]
    fn multi_image_tensor4_needs_batch_path() {
        let store = TensorStore::new();
        let canon = square(PaddingPolicy::Center);
        let batched = store.create(ArrayD::zeros(IxDyn(&[2, 4, 4, 3])));

        let result = store.tidy(|scope| canon.canonicalize(scope, &InputItem::Tensor4(batched)));
        assert!(matches!(result, Err(Error::InvalidInputShape { .. })));
    }
}
