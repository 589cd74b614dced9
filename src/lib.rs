//! # percent-landmark-net
//!
//! Batched 68-point facial landmark inference.
//!
//! This crate provides:
//! - **Input canonicalization**: images and rank-3 / rank-4 tensors of any size are
//!   letterboxed onto the network's fixed input frame
//! - **Batching**: mixed inputs are stacked into one `batch x H x W x 3` tensor with a
//!   per-item geometry record
//! - **Post-processing**: network output is mapped back into each image's own pixels
//! - **Tensor lifetimes**: every intermediate buffer is released on every exit path
//!
//! ## Pipeline
//!
//! 1. Resolve the input into per-image sources, in order
//! 2. Resample each source onto the canonical frame and record its scale and shift
//! 3. Stack the frames and run one forward pass of a [`LandmarkNet`]
//! 4. Undo each item's scale and shift on its 68 `(x, y)` pairs
//!
//! All four steps run inside one [`Scope`] per call, so
//! [`TensorStore::num_tensors`] is unchanged by a call unless the call explicitly hands
//! a tensor back.
//!
//! ## Quick Start
//!
//! ```rust
//! use percent_landmark_net::{
//!     default_68_point_mean_shape, LandmarkDetector, RawInput, RegressionCascadeBuilder,
//!     RegressionTree, Shape, TreeEnsemble, TreeNode,
//! };
//!
//! // A trivial cascade that always predicts the mean face.
//! let tree = RegressionTree::new(vec![TreeNode::Leaf { delta: Shape::zeros(68) }]);
//! let cascade = RegressionCascadeBuilder::new()
//!     .input_size(112, 112)
//!     .mean_shape(default_68_point_mean_shape())
//!     .add_cascade_stage(TreeEnsemble::new(vec![tree], 68))
//!     .build()
//!     .unwrap();
//!
//! let detector = LandmarkDetector::new(cascade);
//!
//! let image = image::RgbImage::new(200, 120);
//! let landmarks = detector
//!     .detect_landmarks(&RawInput::from(image))
//!     .unwrap()
//!     .into_single()
//!     .unwrap();
//!
//! assert_eq!(landmarks.num_landmarks(), 68);
//! assert_eq!(landmarks.image_width(), 200);
//! assert_eq!(detector.store().num_tensors(), 0);
//! ```
//!
//! ## Custom Networks
//!
//! Implement [`LandmarkNet`] to plug in any backend:
//!
//! ```rust
//! use ndarray::{Array2, ArrayView4};
//! use percent_landmark_net::{LandmarkNet, Result, OUTPUT_WIDTH};
//!
//! struct MyNet;
//!
//! impl LandmarkNet for MyNet {
//!     fn input_size(&self) -> (u32, u32) {
//!         (112, 112)
//!     }
//!
//!     fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
//!         // Run the model; one row of 68 normalized (x, y) pairs per image.
//!         Ok(Array2::from_elem((batch.dim().0, OUTPUT_WIDTH), 0.5))
//!     }
//! }
//! ```

mod batch;
mod canonical;
mod cascade;
mod config;
mod detector;
mod error;
mod input;
mod network;
mod postprocess;
mod sampling;
mod scope;
mod tensor;
mod types;

pub use batch::BatchAssembler;
pub use canonical::{Canonicalizer, PaddingPolicy};
pub use cascade::{
    default_68_point_mean_shape, RegressionCascade, RegressionCascadeBuilder, RegressionTree,
    SplitFeature, TreeEnsemble, TreeNode,
};
pub use config::DetectorConfig;
pub use detector::{LandmarkDetector, LandmarkDetectorBuilder};
pub use error::{Error, Result};
pub use input::{InputItem, RawInput};
pub use network::{InferenceRunner, LandmarkNet, OUTPUT_WIDTH};
pub use postprocess::postprocess;
pub use sampling::{sample_bilinear, PixelSource, TensorPixels};
pub use scope::Scope;
pub use tensor::{TensorHandle, TensorId, TensorStore};
pub use types::{ItemGeometry, LandmarkSet, Landmarks, Point, Shape, NUM_LANDMARKS};
