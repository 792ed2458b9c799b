//! Stroke assembly.
//!
//! Groups consecutive pen-down position updates into strokes, the unit a
//! drawing surface renders as one continuous line. A pen-up update ends the
//! open stroke; pen-up points themselves are travel and belong to no stroke.

use serde::{Deserialize, Serialize};

use crate::types::PositionUpdate;

/// One continuous pen-down run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub start_ms: u64,
    pub end_ms: u64,
    /// Plot-plane points `(x, y)` in arrival order.
    pub points: Vec<(f64, f64)>,
}

impl Stroke {
    fn begin(update: &PositionUpdate) -> Self {
        let (x, y, _) = update.plot_coordinates();
        Self {
            start_ms: update.timestamp_ms,
            end_ms: update.timestamp_ms,
            points: vec![(x, y)],
        }
    }

    fn extend(&mut self, update: &PositionUpdate) {
        let (x, y, _) = update.plot_coordinates();
        self.end_ms = update.timestamp_ms;
        self.points.push((x, y));
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Polyline length in the plot plane.
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| {
                let (x0, y0) = pair[0];
                let (x1, y1) = pair[1];
                (x1 - x0).hypot(y1 - y0)
            })
            .sum()
    }
}

/// Collects position updates into strokes.
#[derive(Debug, Clone, Default)]
pub struct StrokeCollector {
    completed: Vec<Stroke>,
    open: Option<Stroke>,
}

impl StrokeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one update. Returns the stroke it closed, if any.
    pub fn push(&mut self, update: &PositionUpdate) -> Option<&Stroke> {
        if update.pen_state.is_down() {
            match self.open.as_mut() {
                Some(stroke) => stroke.extend(update),
                None => self.open = Some(Stroke::begin(update)),
            }
            return None;
        }

        let closed = self.open.take()?;
        self.completed.push(closed);
        self.completed.last()
    }

    /// Strokes closed so far, excluding any open one.
    pub fn completed(&self) -> &[Stroke] {
        &self.completed
    }

    pub fn has_open_stroke(&self) -> bool {
        self.open.is_some()
    }

    /// Closes any open stroke and returns every stroke in order.
    pub fn finish(mut self) -> Vec<Stroke> {
        if let Some(stroke) = self.open.take() {
            self.completed.push(stroke);
        }
        self.completed
    }
}
