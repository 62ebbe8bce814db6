//! Zone geometry and containment tests.
//!
//! A zone is configured as an ordered list of boundary segments. For
//! containment it is treated as the convex region spanned by the segment
//! endpoints, so segment order and direction do not matter. Points lying on
//! the boundary are outside.

use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-9;

/// A point in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (f64, f64) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// One boundary segment `((x1, y1), (x2, y2))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Point, Point)", into = "(Point, Point)")]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    pub fn new(start: impl Into<Point>, end: impl Into<Point>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

impl From<(Point, Point)> for Segment {
    fn from((start, end): (Point, Point)) -> Self {
        Self { start, end }
    }
}

impl From<Segment> for (Point, Point) {
    fn from(s: Segment) -> Self {
        (s.start, s.end)
    }
}

/// A restricted zone.
///
/// The convex hull is computed once at construction; configuration is
/// immutable after build so the probe only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Segment>", into = "Vec<Segment>")]
pub struct Zone {
    segments: Vec<Segment>,
    hull: Vec<Point>,
}

impl Zone {
    pub fn new(segments: Vec<Segment>) -> Self {
        let points: Vec<Point> = segments.iter().flat_map(|s| [s.start, s.end]).collect();
        let hull = convex_hull(points);
        Self { segments, hull }
    }

    /// Build a closed zone from polygon corners, one segment per edge.
    pub fn from_corners(corners: &[(f64, f64)]) -> Self {
        let segments = corners
            .iter()
            .zip(corners.iter().cycle().skip(1))
            .map(|(&a, &b)| Segment::new(a, b))
            .collect();
        Self::new(segments)
    }

    /// Boundary segments in configured order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Convex hull vertices in counter-clockwise order
    pub fn hull(&self) -> &[Point] {
        &self.hull
    }

    /// Whether `point` lies strictly inside the zone's convex region.
    ///
    /// Degenerate zones (fewer than three non-collinear points) contain
    /// nothing.
    pub fn contains(&self, point: Point) -> bool {
        if self.hull.len() < 3 {
            return false;
        }
        self.hull
            .iter()
            .zip(self.hull.iter().cycle().skip(1))
            .all(|(a, b)| cross(*a, *b, point) > EPSILON)
    }
}

impl From<Vec<Segment>> for Zone {
    fn from(segments: Vec<Segment>) -> Self {
        Self::new(segments)
    }
}

impl From<Zone> for Vec<Segment> {
    fn from(zone: Zone) -> Self {
        zone.segments
    }
}

/// Z component of `(a - o) x (b - o)`; positive when `o -> a -> b` turns left.
fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Andrew's monotone chain. Collinear points are dropped.
fn convex_hull(mut points: Vec<Point>) -> Vec<Point> {
    points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    points.dedup_by(|a, b| (a.x - b.x).abs() < EPSILON && (a.y - b.y).abs() < EPSILON);

    if points.len() < 3 {
        return points;
    }

    let mut hull: Vec<Point> = Vec::with_capacity(points.len() * 2);

    for &p in &points {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= EPSILON
        {
            hull.pop();
        }
        hull.push(p);
    }

    let lower_len = hull.len() + 1;
    for &p in points.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= EPSILON
        {
            hull.pop();
        }
        hull.push(p);
    }

    // Last point repeats the first
    hull.pop();
    hull
}
