//! Shared fixtures: synthetic marker images and deterministic test networks.

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use ndarray::{Array2, ArrayView3, ArrayView4, Axis};
use percent_landmark_net::{
    Error, LandmarkNet, LandmarkSet, Point, Result, NUM_LANDMARKS, OUTPUT_WIDTH,
};

/// Tolerance for inputs that already have the canonical aspect ratio.
pub const MATCHED_TOLERANCE: f32 = 2.0;
/// Tolerance for resized or batched inputs.
pub const RESIZED_TOLERANCE: f32 = 3.0;
/// Tolerance for letterboxed rectangular inputs.
pub const LETTERBOX_TOLERANCE: f32 = 6.0;

/// A solid square patch; `(x, y)` is its top-left pixel.
#[derive(Debug, Clone, Copy)]
pub struct Marker {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl Marker {
    pub const fn new(x: u32, y: u32, size: u32) -> Self {
        Self { x, y, size }
    }

    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.size && y >= self.y && y < self.y + self.size
    }

    fn centre(&self) -> Point {
        Point::new(
            self.x as f32 + self.size as f32 / 2.0,
            self.y as f32 + self.size as f32 / 2.0,
        )
    }
}

/// A synthetic "face": a red and a green patch on black. [`MarkerNet`] places the 68
/// landmarks evenly on the segment from the red centroid to the green centroid.
#[derive(Debug, Clone, Copy)]
pub struct Face {
    pub width: u32,
    pub height: u32,
    pub red: Marker,
    pub green: Marker,
}

impl Face {
    pub fn square_150() -> Self {
        Self {
            width: 150,
            height: 150,
            red: Marker::new(30, 40, 20),
            green: Marker::new(100, 90, 20),
        }
    }

    pub fn square_150_mirrored() -> Self {
        Self {
            width: 150,
            height: 150,
            red: Marker::new(100, 30, 20),
            green: Marker::new(25, 110, 20),
        }
    }

    pub fn wide_200x120() -> Self {
        Self {
            width: 200,
            height: 120,
            red: Marker::new(20, 30, 20),
            green: Marker::new(150, 70, 24),
        }
    }

    pub fn tall_90x160() -> Self {
        Self {
            width: 90,
            height: 160,
            red: Marker::new(10, 20, 16),
            green: Marker::new(60, 120, 16),
        }
    }

    pub fn image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            if self.red.contains(x, y) {
                Rgb([255, 0, 0])
            } else if self.green.contains(x, y) {
                Rgb([0, 255, 0])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    /// Ground-truth landmarks in this image's pixel space.
    pub fn reference(&self) -> Vec<Point> {
        interpolate(self.red.centre(), self.green.centre())
    }
}

fn interpolate(from: Point, to: Point) -> Vec<Point> {
    let last = (NUM_LANDMARKS - 1) as f32;
    (0..NUM_LANDMARKS)
        .map(|k| from + (to - from) * (k as f32 / last))
        .collect()
}

/// Largest distance between a landmark set and its reference.
pub fn max_error(set: &LandmarkSet, reference: &[Point]) -> f32 {
    assert_eq!(set.num_landmarks(), reference.len());
    set.positions()
        .iter()
        .zip(reference)
        .map(|(a, b)| a.distance(b))
        .fold(0.0, f32::max)
}

/// Largest distance between two landmark sets.
pub fn max_difference(a: &LandmarkSet, b: &LandmarkSet) -> f32 {
    max_error(a, b.positions())
}

/// Locates the red and green patches by intensity-weighted centroid.
pub struct MarkerNet {
    width: u32,
    height: u32,
}

impl MarkerNet {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn locate(frame: ArrayView3<'_, f32>) -> (Point, Point) {
        let (h, w, _) = frame.dim();
        let mut red = (0.0f64, 0.0f64, 0.0f64);
        let mut green = (0.0f64, 0.0f64, 0.0f64);

        for y in 0..h {
            for x in 0..w {
                let (r, g, b) = (frame[[y, x, 0]], frame[[y, x, 1]], frame[[y, x, 2]]);
                let cx = (x as f64 + 0.5) / w as f64;
                let cy = (y as f64 + 0.5) / h as f64;

                let wr = f64::from((r - g.max(b)).max(0.0));
                red = (red.0 + wr * cx, red.1 + wr * cy, red.2 + wr);
                let wg = f64::from((g - r.max(b)).max(0.0));
                green = (green.0 + wg * cx, green.1 + wg * cy, green.2 + wg);
            }
        }

        let centroid = |(sx, sy, total): (f64, f64, f64)| {
            if total > 0.0 {
                Point::new((sx / total) as f32, (sy / total) as f32)
            } else {
                Point::new(0.5, 0.5)
            }
        };
        (centroid(red), centroid(green))
    }
}

impl LandmarkNet for MarkerNet {
    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        let mut out = Array2::zeros((batch.len_of(Axis(0)), OUTPUT_WIDTH));
        for (frame, mut row) in batch.outer_iter().zip(out.outer_iter_mut()) {
            let (red, green) = Self::locate(frame);
            for (k, p) in interpolate(red, green).into_iter().enumerate() {
                row[2 * k] = p.x;
                row[2 * k + 1] = p.y;
            }
        }
        Ok(out)
    }
}

/// A backend whose forward pass always fails.
pub struct FailingNet;

impl LandmarkNet for FailingNet {
    fn input_size(&self) -> (u32, u32) {
        (64, 64)
    }

    fn forward(&self, _batch: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        Err(Error::InvalidModel("backend unavailable".into()))
    }
}

/// A backend that returns rows of the wrong width.
pub struct WrongShapeNet;

impl LandmarkNet for WrongShapeNet {
    fn input_size(&self) -> (u32, u32) {
        (64, 64)
    }

    fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        Ok(Array2::zeros((batch.len_of(Axis(0)), 10)))
    }
}
