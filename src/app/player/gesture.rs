use std::time::Instant;

use ratatui::layout::{Position, Rect};

/// Minimum travel, in terminal cells, before a drag counts as a swipe.
const SWIPE_THRESHOLD_CELLS: f64 = 5.0;

/// Anything that travels no further than this is a tap.
const TAP_MAX_TRAVEL_CELLS: f64 = 1.5;

/// Minimum swipe speed in cells per millisecond; slow drags are ignored.
const SWIPE_MIN_VELOCITY: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
pub(crate) struct TouchPoint {
    pub(crate) x: u16,
    pub(crate) y: u16,
    pub(crate) at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GestureIntent {
    NextItem,
    PrevItem,
    NextAuthor,
    PrevAuthor,
    TogglePause,
    Close,
}

/// Tracks one press-drag-release sequence from the pointer stream.
#[derive(Debug, Default)]
pub(crate) struct SwipeTracker {
    start: Option<TouchPoint>,
}

impl SwipeTracker {
    pub(crate) fn press(&mut self, point: TouchPoint) {
        self.start = Some(point);
    }

    pub(crate) fn release(&mut self, point: TouchPoint) -> Option<(TouchPoint, TouchPoint)> {
        self.start.take().map(|start| (start, point))
    }

    pub(crate) fn cancel(&mut self) {
        self.start = None;
    }
}

/// Decodes a completed press/release pair into a navigation intent.
///
/// Gestures are dropped when the gate is closed (a vote or answer is in
/// flight) and when they originate on an interactive region such as the
/// poll widget, no matter how far they travel. Short presses are taps:
/// left third is previous item, right third is next item, the middle
/// toggles pause. Longer travel is a swipe: the dominant horizontal axis
/// moves between authors, swiping down closes the viewer.
pub(crate) fn decode_gesture(
    start: TouchPoint,
    end: TouchPoint,
    viewport: Rect,
    interactive: &[Rect],
    gate_closed: bool,
) -> Option<GestureIntent> {
    if gate_closed {
        return None;
    }
    let origin = Position::new(start.x, start.y);
    if interactive.iter().any(|region| region.contains(origin)) {
        return None;
    }

    let dx = f64::from(end.x) - f64::from(start.x);
    let dy = f64::from(end.y) - f64::from(start.y);
    let travel = (dx * dx + dy * dy).sqrt();

    if travel <= TAP_MAX_TRAVEL_CELLS {
        return Some(decode_tap(start, viewport));
    }

    let elapsed_ms = end.at.saturating_duration_since(start.at).as_millis().max(1) as f64;
    if travel / elapsed_ms < SWIPE_MIN_VELOCITY {
        return None;
    }

    // Terminal cells are roughly twice as tall as wide; weight rows so a
    // diagonal drag resolves the way it looks on screen.
    let weighted_dy = dy * 2.0;
    if dx.abs() >= weighted_dy.abs() {
        if dx.abs() < SWIPE_THRESHOLD_CELLS {
            return None;
        }
        if dx > 0.0 {
            Some(GestureIntent::PrevAuthor)
        } else {
            Some(GestureIntent::NextAuthor)
        }
    } else {
        if weighted_dy.abs() < SWIPE_THRESHOLD_CELLS {
            return None;
        }
        if dy > 0.0 { Some(GestureIntent::Close) } else { None }
    }
}

fn decode_tap(point: TouchPoint, viewport: Rect) -> GestureIntent {
    let width = viewport.width.max(1);
    let relative = point.x.saturating_sub(viewport.x);
    if relative < width / 3 {
        GestureIntent::PrevItem
    } else if relative >= width - width / 3 {
        GestureIntent::NextItem
    } else {
        GestureIntent::TogglePause
    }
}
