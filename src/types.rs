use serde::{Deserialize, Serialize};

/// Number of keypoints in the iBUG 68-point annotation scheme.
pub const NUM_LANDMARKS: usize = 68;

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::AddAssign for Point {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Mul<f32> for Point {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

/// A facial shape in normalized `[0,1]` frame coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub points: Vec<Point>,
}

impl Shape {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn zeros(n: usize) -> Self {
        Self {
            points: vec![Point::zero(); n],
        }
    }

    pub fn num_landmarks(&self) -> usize {
        self.points.len()
    }

    pub fn add_delta(&mut self, delta: &Shape) {
        debug_assert_eq!(self.points.len(), delta.points.len());
        for (p, d) in self.points.iter_mut().zip(delta.points.iter()) {
            *p += *d;
        }
    }
}

impl std::ops::Index<usize> for Shape {
    type Output = Point;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}

/// How one input item was placed into the canonical frame.
///
/// The network reports coordinates normalized to a frame of `frame_width x
/// frame_height` units. A point maps back to original pixels as
/// `(n * frame - shift) / scale`. Items whose aspect ratio already matches the
/// canonical shape are resized directly: their frame is the original image, with
/// `scale == 1` and zero shift. Letterboxed items use the canonical size as their
/// frame and carry the uniform scale and padding offset, in canonical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemGeometry {
    pub original_width: u32,
    pub original_height: u32,
    pub scale: f32,
    pub shift_x: f32,
    pub shift_y: f32,
    pub frame_width: f32,
    pub frame_height: f32,
}

impl ItemGeometry {
    /// Geometry of an item resized straight onto the canonical frame.
    pub fn direct(width: u32, height: u32) -> Self {
        Self {
            original_width: width,
            original_height: height,
            scale: 1.0,
            shift_x: 0.0,
            shift_y: 0.0,
            frame_width: width as f32,
            frame_height: height as f32,
        }
    }

    pub fn shift(&self) -> Point {
        Point::new(self.shift_x, self.shift_y)
    }

    /// Map a normalized frame coordinate back to original-image pixels.
    pub fn to_original(&self, normalized: Point) -> Point {
        Point::new(
            (normalized.x * self.frame_width - self.shift_x) / self.scale,
            (normalized.y * self.frame_height - self.shift_y) / self.scale,
        )
    }

    /// Map an original-image pixel coordinate into normalized frame coordinates.
    pub fn to_normalized(&self, original: Point) -> Point {
        Point::new(
            (original.x * self.scale + self.shift_x) / self.frame_width,
            (original.y * self.scale + self.shift_y) / self.frame_height,
        )
    }
}

/// Landmarks of one input image, in that image's pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    positions: Vec<Point>,
    image_width: u32,
    image_height: u32,
    shift: Point,
}

impl LandmarkSet {
    pub fn new(positions: Vec<Point>, image_width: u32, image_height: u32, shift: Point) -> Self {
        Self {
            positions,
            image_width,
            image_height,
            shift,
        }
    }

    /// Build from `[x0, y0, x1, y1, ...]` normalized network output.
    pub fn from_normalized(values: &[f32], geometry: &ItemGeometry) -> Self {
        debug_assert!(values.len() % 2 == 0);
        let positions = values
            .chunks_exact(2)
            .map(|pair| geometry.to_original(Point::new(pair[0], pair[1])))
            .collect();
        Self::new(
            positions,
            geometry.original_width,
            geometry.original_height,
            geometry.shift(),
        )
    }

    pub fn positions(&self) -> &[Point] {
        &self.positions
    }

    pub fn num_landmarks(&self) -> usize {
        self.positions.len()
    }

    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    /// Padding offset that was applied to this image, in canonical pixels.
    pub fn shift(&self) -> Point {
        self.shift
    }
}

/// Result of a detection call: one set for a single input, a sequence for batch input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Landmarks {
    Single(LandmarkSet),
    Batch(Vec<LandmarkSet>),
}

impl Landmarks {
    pub fn len(&self) -> usize {
        match self {
            Landmarks::Single(_) => 1,
            Landmarks::Batch(sets) => sets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_single(self) -> Option<LandmarkSet> {
        match self {
            Landmarks::Single(set) => Some(set),
            Landmarks::Batch(_) => None,
        }
    }

    pub fn into_vec(self) -> Vec<LandmarkSet> {
        match self {
            Landmarks::Single(set) => vec![set],
            Landmarks::Batch(sets) => sets,
        }
    }
}
