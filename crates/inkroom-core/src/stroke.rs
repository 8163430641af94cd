//! Freehand strokes.

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{ProtocolError, ProtocolResult};

/// Colour used when a stroke is started without one.
pub const DEFAULT_COLOR: &str = "#000000";
/// Brush width used when a stroke is started without one.
pub const DEFAULT_WIDTH: f64 = 4.0;

/// One continuous drawing action.
///
/// Points are stored flat as `[x0, y0, x1, y1, ...]`, which is also the wire
/// layout. A stroke is immutable once broadcast; undo removes it by id and redo
/// re-broadcasts the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: String,
    pub points: Vec<f64>,
    pub color: String,
    pub width: f64,
}

impl Stroke {
    /// Start a stroke at `origin` with a fresh id.
    pub fn begin(origin: Point, color: impl Into<String>, width: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            points: vec![origin.x, origin.y],
            color: color.into(),
            width,
        }
    }

    /// Append a point while the stroke is being drawn.
    pub fn add_point(&mut self, point: Point) {
        self.points.push(point.x);
        self.points.push(point.y);
    }

    /// Number of 2-D points.
    pub fn len(&self) -> usize {
        self.points.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.points.len() < 2
    }

    /// Iterate the points as 2-D coordinates.
    pub fn path(&self) -> impl Iterator<Item = Point> + '_ {
        self.points.chunks_exact(2).map(|xy| Point::new(xy[0], xy[1]))
    }

    /// Bounding box of the points, inflated by half the brush width.
    pub fn bounds(&self) -> Option<Rect> {
        let mut path = self.path();
        let first = path.next()?;
        let rect = path.fold(Rect::from_points(first, first), |rect, p| rect.union_pt(p));
        Some(rect.inflate(self.width / 2.0, self.width / 2.0))
    }

    pub(crate) fn validate(&self) -> ProtocolResult<()> {
        if self.id.is_empty() {
            return Err(ProtocolError::invalid("id", "must not be empty"));
        }
        if self.points.len() < 2 || self.points.len() % 2 != 0 {
            return Err(ProtocolError::invalid("points", "expected non-empty [x, y, ...] pairs"));
        }
        if self.points.iter().any(|v| !v.is_finite()) {
            return Err(ProtocolError::invalid("points", "must be finite"));
        }
        if self.color.is_empty() {
            return Err(ProtocolError::invalid("color", "must not be empty"));
        }
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err(ProtocolError::invalid("width", "must be positive"));
        }
        Ok(())
    }
}
