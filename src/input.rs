//! Caller-facing input variants.
//!
//! The variant of every item is fixed when the item is built; later stages match on it
//! instead of probing shapes.

use image::{DynamicImage, RgbImage};

use crate::error::{Error, Result};
use crate::tensor::TensorHandle;

/// One input item.
///
/// Tensor items are borrowed by the pipeline: their buffers remain owned by the caller
/// and are never disposed by a detection call.
#[derive(Debug, Clone)]
pub enum InputItem {
    /// A decoded image.
    Image(RgbImage),
    /// A `height x width x channels` tensor.
    Tensor3(TensorHandle),
    /// A `batch x height x width x channels` tensor, normally with a batch of one.
    Tensor4(TensorHandle),
}

impl InputItem {
    /// Wrap a tensor, choosing the variant from its rank.
    pub fn from_tensor(handle: TensorHandle) -> Result<Self> {
        match handle.rank() {
            3 => Ok(InputItem::Tensor3(handle)),
            4 => Ok(InputItem::Tensor4(handle)),
            rank => Err(Error::invalid_input(format!(
                "expected a rank 3 or rank 4 tensor, got rank {rank} with shape {:?}",
                handle.shape()
            ))),
        }
    }

    /// Number of images this item contributes to a batch.
    pub fn batch_len(&self) -> usize {
        match self {
            InputItem::Tensor4(handle) => handle.shape().first().copied().unwrap_or(0),
            InputItem::Image(_) | InputItem::Tensor3(_) => 1,
        }
    }
}

impl From<RgbImage> for InputItem {
    fn from(image: RgbImage) -> Self {
        InputItem::Image(image)
    }
}

impl From<DynamicImage> for InputItem {
    fn from(image: DynamicImage) -> Self {
        InputItem::Image(image.to_rgb8())
    }
}

/// Everything a detection call accepts.
#[derive(Debug, Clone)]
pub enum RawInput {
    Single(InputItem),
    Sequence(Vec<InputItem>),
}

impl RawInput {
    pub fn items(&self) -> &[InputItem] {
        match self {
            RawInput::Single(item) => std::slice::from_ref(item),
            RawInput::Sequence(items) => items,
        }
    }

    /// Whether results come back as a sequence. A rank-4 tensor carrying more than one
    /// image counts as already-batched input.
    pub fn is_batch(&self) -> bool {
        match self {
            RawInput::Single(item) => item.batch_len() > 1,
            RawInput::Sequence(_) => true,
        }
    }
}

impl From<InputItem> for RawInput {
    fn from(item: InputItem) -> Self {
        RawInput::Single(item)
    }
}

impl From<Vec<InputItem>> for RawInput {
    fn from(items: Vec<InputItem>) -> Self {
        RawInput::Sequence(items)
    }
}

impl From<RgbImage> for RawInput {
    fn from(image: RgbImage) -> Self {
        RawInput::Single(image.into())
    }
}

impl From<DynamicImage> for RawInput {
    fn from(image: DynamicImage) -> Self {
        RawInput::Single(image.into())
    }
}

/// A single image's worth of input, after rank-4 batches have been split up.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ItemSource<'a> {
    Image(&'a RgbImage),
    Tensor3(&'a TensorHandle),
    Tensor4 { handle: &'a TensorHandle, index: usize },
}

impl<'a> ItemSource<'a> {
    /// The source for an item that must hold exactly one image.
    pub(crate) fn single(item: &'a InputItem) -> Result<Self> {
        match item {
            InputItem::Image(image) => Ok(ItemSource::Image(image)),
            InputItem::Tensor3(handle) => Ok(ItemSource::Tensor3(handle)),
            InputItem::Tensor4(handle) => match rank4_batch(handle)? {
                1 => Ok(ItemSource::Tensor4 { handle, index: 0 }),
                _ => Err(Error::invalid_input(format!(
                    "expected a rank 4 tensor with batch size 1, got shape {:?}",
                    handle.shape()
                ))),
            },
        }
    }
}

fn rank4_batch(handle: &TensorHandle) -> Result<usize> {
    match handle.shape() {
        [0, _, _, _] => Err(Error::invalid_input(format!(
            "rank 4 tensor has an empty batch: {:?}",
            handle.shape()
        ))),
        [batch, _, _, _] => Ok(*batch),
        shape => Err(Error::invalid_input(format!(
            "expected a rank 4 tensor, got shape {shape:?}"
        ))),
    }
}

/// Flatten items into per-image sources, preserving order.
pub(crate) fn resolve_sources(items: &[InputItem]) -> Result<Vec<ItemSource<'_>>> {
    let mut sources = Vec::with_capacity(items.len());
    for item in items {
        match item {
            InputItem::Image(image) => sources.push(ItemSource::Image(image)),
            InputItem::Tensor3(handle) => sources.push(ItemSource::Tensor3(handle)),
            InputItem::Tensor4(handle) => {
                let batch = rank4_batch(handle)?;
                sources.extend((0..batch).map(|index| ItemSource::Tensor4 { handle, index }));
            }
        }
    }
    Ok(sources)
}
