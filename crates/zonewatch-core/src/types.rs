//! Frame, detection and overlay types exchanged with the dataflow path.

use serde::Serialize;

use crate::geometry::Point;
use crate::lifecycle::EventRecord;

/// Class id the detector assigns to people
pub const PERSON_CLASS_ID: u32 = 0;

/// RGBA color with channels in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Color {
    /// Default highlight for tracked objects
    pub const NEUTRAL: Color = Color::rgba(0.0, 1.0, 0.0, 1.0);
    /// Highlight for objects inside a restricted zone
    pub const ALARM: Color = Color::rgba(1.0, 0.0, 0.0, 1.0);
    /// Zone outline
    pub const ZONE: Color = Color::rgba(1.0, 1.0, 0.0, 1.0);

    pub const fn rgba(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Bounding box for detected objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    /// Y coordinate of top edge (pixels)
    pub top: f32,
    /// X coordinate of left edge (pixels)
    pub left: f32,
    /// Width of bounding box (pixels)
    pub width: f32,
    /// Height of bounding box (pixels)
    pub height: f32,
}

impl BoundingBox {
    pub fn new(top: f32, left: f32, width: f32, height: f32) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Ground contact point: horizontal center of the bottom edge
    pub fn contact_point(&self) -> Point {
        Point::new(
            f64::from(self.left) + f64::from(self.width) / 2.0,
            f64::from(self.top) + f64::from(self.height),
        )
    }
}

/// A single object produced by the inference stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDetection {
    /// Class/label ID (model-specific)
    pub class_id: u32,
    /// Confidence score 0.0-1.0
    pub confidence: f32,
    /// Bounding box in frame pixel coordinates
    pub bbox: BoundingBox,
    /// Tracker-assigned object id (0 if not tracked)
    pub track_id: u64,
    /// Highlight drawn around the object by the overlay stage
    pub border_color: Color,
}

impl ObjectDetection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
            track_id: 0,
            border_color: Color::NEUTRAL,
        }
    }

    pub fn with_track_id(mut self, track_id: u64) -> Self {
        self.track_id = track_id;
        self
    }

    pub fn is_person(&self) -> bool {
        self.class_id == PERSON_CLASS_ID
    }
}

/// Line drawn onto a frame's annotation layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverlayLine {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub width: u32,
    pub color: Color,
}

/// Metadata for one frame of one stream inside a batch
#[derive(Debug, Clone, Default)]
pub struct FrameRecord {
    /// Index of the stream the frame came from
    pub source_id: u32,
    /// Frame counter within its stream
    pub frame_number: u64,
    pub detections: Vec<ObjectDetection>,
    /// Annotation layer consumed by the overlay stage
    pub overlay: Vec<OverlayLine>,
    /// Event records attached for the export path
    pub events: Vec<EventRecord>,
}

impl FrameRecord {
    pub fn new(source_id: u32, frame_number: u64) -> Self {
        Self {
            source_id,
            frame_number,
            ..Default::default()
        }
    }

    pub fn with_detections(mut self, detections: Vec<ObjectDetection>) -> Self {
        self.detections = detections;
        self
    }
}

/// A batch of frames, one or more per stream, as assembled by the batcher
#[derive(Debug, Clone, Default)]
pub struct BatchRecord {
    pub frames: Vec<FrameRecord>,
}

impl BatchRecord {
    pub fn new(frames: Vec<FrameRecord>) -> Self {
        Self { frames }
    }
}
