//! Regression-tree cascade backend.
//!
//! A [`LandmarkNet`] implementing the ensemble-of-regression-trees method from
//! "One Millisecond Face Alignment with an Ensemble of Regression Trees"
//! (Kazemi & Sullivan, 2014), run over the canonical frame instead of a face box:
//!
//! 1. Start from the mean shape, in normalized frame coordinates
//! 2. For each cascade stage:
//!    - Sample pixel intensity differences around the current landmarks
//!    - Each tree in the stage walks its splits and returns a shape delta
//!    - Sum the deltas and apply them to the current shape
//! 3. Emit the final 68 points as one `[x0, y0, x1, y1, ...]` output row
//!
//! Weights are stored with bincode, optionally bzip2-compressed.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use ndarray::{Array2, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::{LandmarkNet, OUTPUT_WIDTH};
use crate::sampling::{sample_luminance, PixelSource, TensorPixels};
use crate::types::{Point, Shape, NUM_LANDMARKS};

/// A pixel-difference probe anchored on two landmarks.
///
/// Offsets are in normalized frame units, so a probe means the same thing at any
/// canonical resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplitFeature {
    pub anchor1_idx: u16,
    pub offset1: Point,
    pub anchor2_idx: u16,
    pub offset2: Point,
}

impl SplitFeature {
    /// Intensity at the first probe point minus intensity at the second.
    pub fn value<P: PixelSource + ?Sized>(&self, shape: &Shape, frame: &P) -> f32 {
        let w = frame.width() as f32;
        let h = frame.height() as f32;
        let p1 = shape[self.anchor1_idx as usize] + self.offset1;
        let p2 = shape[self.anchor2_idx as usize] + self.offset2;

        // Normalized positions are continuous; pixel centres sit at +0.5.
        let i1 = sample_luminance(frame, p1.x * w - 0.5, p1.y * h - 0.5);
        let i2 = sample_luminance(frame, p2.x * w - 0.5, p2.y * h - 0.5);
        i1 - i2
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Split {
        feature: SplitFeature,
        threshold: f32,
        left: u32,
        right: u32,
    },
    Leaf {
        delta: Shape,
    },
}

/// One regression tree. Node 0 is the root; children always come after their parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn new(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    /// Walk from the root to a leaf. A split goes left when its feature exceeds the
    /// threshold.
    pub fn predict<F>(&self, feature_value: F) -> &Shape
    where
        F: Fn(&SplitFeature) -> f32,
    {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if feature_value(feature) > *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
                TreeNode::Leaf { delta } => return delta,
            }
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn validate(&self, num_landmarks: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidModel("Tree has no nodes".into()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    for child in [*left as usize, *right as usize] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(Error::InvalidModel(format!(
                                "Node {idx} has invalid child {child}"
                            )));
                        }
                    }
                    for anchor in [feature.anchor1_idx, feature.anchor2_idx] {
                        if anchor as usize >= num_landmarks {
                            return Err(Error::InvalidModel(format!(
                                "Node {idx} anchors landmark {anchor} of {num_landmarks}"
                            )));
                        }
                    }
                }
                TreeNode::Leaf { delta } => {
                    if delta.num_landmarks() != num_landmarks {
                        return Err(Error::InvalidModel(format!(
                            "Leaf {idx} has {} deltas, expected {num_landmarks}",
                            delta.num_landmarks()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Trees whose deltas are summed into one shape update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub trees: Vec<RegressionTree>,
    pub num_landmarks: usize,
}

impl TreeEnsemble {
    pub fn new(trees: Vec<RegressionTree>, num_landmarks: usize) -> Self {
        Self {
            trees,
            num_landmarks,
        }
    }

    pub fn predict<F>(&self, feature_value: F) -> Shape
    where
        F: Fn(&SplitFeature) -> f32,
    {
        let mut delta = Shape::zeros(self.num_landmarks);
        for tree in &self.trees {
            delta.add_delta(tree.predict(&feature_value));
        }
        delta
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionCascade {
    input_size: (u32, u32),
    mean_shape: Shape,
    stages: Vec<TreeEnsemble>,
}

impl RegressionCascade {
    pub fn new(input_size: (u32, u32), mean_shape: Shape, stages: Vec<TreeEnsemble>) -> Result<Self> {
        let cascade = Self {
            input_size,
            mean_shape,
            stages,
        };
        cascade.validate()?;
        Ok(cascade)
    }

    /// Load weights; paths ending in `.bz2` are decompressed first.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut bytes = Vec::new();
        if is_bz2(path) {
            BzDecoder::new(reader).read_to_end(&mut bytes)?;
        } else {
            let mut reader = reader;
            reader.read_to_end(&mut bytes)?;
        }
        let cascade: Self = bincode::deserialize(&bytes)?;
        cascade.validate()?;
        Ok(cascade)
    }

    /// Save weights; paths ending in `.bz2` are compressed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = bincode::serialize(self)?;
        let writer = BufWriter::new(File::create(path)?);
        if is_bz2(path) {
            let mut encoder = BzEncoder::new(writer, Compression::default());
            encoder.write_all(&bytes)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = writer;
            writer.write_all(&bytes)?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn num_landmarks(&self) -> usize {
        self.mean_shape.num_landmarks()
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn mean_shape(&self) -> &Shape {
        &self.mean_shape
    }

    /// Landmarks for one canonical frame, in normalized coordinates.
    pub fn predict_frame<P: PixelSource + ?Sized>(&self, frame: &P) -> Shape {
        let mut shape = self.mean_shape.clone();
        for stage in &self.stages {
            let delta = stage.predict(|feature| feature.value(&shape, frame));
            shape.add_delta(&delta);
        }
        shape
    }

    fn validate(&self) -> Result<()> {
        let (w, h) = self.input_size;
        if w == 0 || h == 0 {
            return Err(Error::InvalidModel(format!("Input size {w}x{h} is empty")));
        }
        if self.mean_shape.num_landmarks() != NUM_LANDMARKS {
            return Err(Error::InvalidModel(format!(
                "Mean shape has {} landmarks, expected {NUM_LANDMARKS}",
                self.mean_shape.num_landmarks()
            )));
        }
        for stage in &self.stages {
            if stage.num_landmarks != NUM_LANDMARKS {
                return Err(Error::InvalidModel(format!(
                    "Stage predicts {} landmarks, expected {NUM_LANDMARKS}",
                    stage.num_landmarks
                )));
            }
            for tree in &stage.trees {
                tree.validate(NUM_LANDMARKS)?;
            }
        }
        Ok(())
    }
}

impl LandmarkNet for RegressionCascade {
    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        let mut out = Array2::zeros((batch.len_of(Axis(0)), OUTPUT_WIDTH));
        for (item, mut row) in batch.outer_iter().zip(out.outer_iter_mut()) {
            let shape = self.predict_frame(&TensorPixels::new(item)?);
            for (i, p) in shape.points.iter().enumerate() {
                row[2 * i] = p.x;
                row[2 * i + 1] = p.y;
            }
        }
        Ok(out)
    }
}

fn is_bz2(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "bz2")
}

/// Builder for a [`RegressionCascade`].
pub struct RegressionCascadeBuilder {
    input_size: (u32, u32),
    mean_shape: Option<Shape>,
    stages: Vec<TreeEnsemble>,
}

impl RegressionCascadeBuilder {
    pub fn new() -> Self {
        Self {
            input_size: (112, 112),
            mean_shape: None,
            stages: Vec::new(),
        }
    }

    pub fn input_size(mut self, width: u32, height: u32) -> Self {
        self.input_size = (width, height);
        self
    }

    pub fn mean_shape(mut self, shape: Shape) -> Self {
        self.mean_shape = Some(shape);
        self
    }

    pub fn add_cascade_stage(mut self, ensemble: TreeEnsemble) -> Self {
        self.stages.push(ensemble);
        self
    }

    pub fn build(self) -> Result<RegressionCascade> {
        let mean_shape = self
            .mean_shape
            .ok_or_else(|| Error::InvalidModel("Missing mean shape".into()))?;
        if self.stages.is_empty() {
            return Err(Error::InvalidModel(
                "Cascade must have at least one stage".into(),
            ));
        }
        RegressionCascade::new(self.input_size, mean_shape, self.stages)
    }
}

impl Default for RegressionCascadeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A 68-point mean face following the iBUG annotation scheme, in normalized `[0,1]`
/// coordinates over a face-sized frame.
pub fn default_68_point_mean_shape() -> Shape {
    const POINTS: [(f32, f32); NUM_LANDMARKS] = [
        // Jaw line (0-16)
        (0.10, 0.35),
        (0.11, 0.45),
        (0.12, 0.55),
        (0.14, 0.65),
        (0.18, 0.73),
        (0.24, 0.80),
        (0.32, 0.85),
        (0.41, 0.88),
        (0.50, 0.89),
        (0.59, 0.88),
        (0.68, 0.85),
        (0.76, 0.80),
        (0.82, 0.73),
        (0.86, 0.65),
        (0.88, 0.55),
        (0.89, 0.45),
        (0.90, 0.35),
        // Right eyebrow (17-21)
        (0.20, 0.26),
        (0.25, 0.22),
        (0.32, 0.21),
        (0.38, 0.23),
        (0.43, 0.27),
        // Left eyebrow (22-26)
        (0.57, 0.27),
        (0.62, 0.23),
        (0.68, 0.21),
        (0.75, 0.22),
        (0.80, 0.26),
        // Nose bridge (27-30)
        (0.50, 0.32),
        (0.50, 0.40),
        (0.50, 0.48),
        (0.50, 0.55),
        // Nose bottom (31-35)
        (0.40, 0.58),
        (0.45, 0.60),
        (0.50, 0.62),
        (0.55, 0.60),
        (0.60, 0.58),
        // Right eye (36-41)
        (0.24, 0.32),
        (0.28, 0.29),
        (0.34, 0.29),
        (0.38, 0.33),
        (0.34, 0.35),
        (0.28, 0.35),
        // Left eye (42-47)
        (0.62, 0.33),
        (0.66, 0.29),
        (0.72, 0.29),
        (0.76, 0.32),
        (0.72, 0.35),
        (0.66, 0.35),
        // Outer lip (48-59)
        (0.32, 0.72),
        (0.38, 0.68),
        (0.44, 0.66),
        (0.50, 0.67),
        (0.56, 0.66),
        (0.62, 0.68),
        (0.68, 0.72),
        (0.62, 0.78),
        (0.56, 0.80),
        (0.50, 0.81),
        (0.44, 0.80),
        (0.38, 0.78),
        // Inner lip (60-67)
        (0.36, 0.72),
        (0.44, 0.70),
        (0.50, 0.70),
        (0.56, 0.70),
        (0.64, 0.72),
        (0.56, 0.74),
        (0.50, 0.75),
        (0.44, 0.74),
    ];

    Shape::new(POINTS.iter().map(|&(x, y)| Point::new(x, y)).collect())
}
