//! Press / move / release handling for placing a watermark by hand.
//!
//! The session never talks to a windowing system; a host feeds it pointer
//! coordinates in canvas pixels and draws whatever rectangle it hands back.

use tracing::debug;

use super::position::{PositionSpec, WatermarkRect, capture_drag};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    /// `grab_dx`/`grab_dy` is the pointer offset from the watermark center at
    /// press time, so the watermark does not jump under the pointer.
    Dragging {
        grab_dx: f64,
        grab_dy: f64,
        moved: bool,
    },
    Released,
}

#[derive(Debug, Clone)]
pub struct DragSession {
    state: DragState,
    position: PositionSpec,
    pending: Option<PositionSpec>,
    canvas: (u32, u32),
    watermark: (u32, u32),
}

impl DragSession {
    pub fn new(position: PositionSpec, canvas: (u32, u32), watermark: (u32, u32)) -> Self {
        Self {
            state: DragState::Idle,
            position,
            pending: None,
            canvas,
            watermark,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    /// The committed position. Provisional drag positions are not visible
    /// here until [`release`](Self::release).
    pub fn position(&self) -> PositionSpec {
        self.position
    }

    /// Update the layer extent, e.g. after the text or font size changed.
    pub fn set_watermark_size(&mut self, width: u32, height: u32) {
        self.watermark = (width, height);
    }

    pub fn set_position(&mut self, position: PositionSpec) {
        self.position = position;
        self.pending = None;
        self.state = DragState::Idle;
    }

    /// Rectangle to draw: the provisional one while dragging, otherwise the
    /// committed one.
    pub fn current_rect(&self) -> WatermarkRect {
        let position = self.pending.unwrap_or(self.position);
        self.place(&position)
    }

    fn place(&self, position: &PositionSpec) -> WatermarkRect {
        WatermarkRect::place(
            position,
            self.canvas.0,
            self.canvas.1,
            self.watermark.0,
            self.watermark.1,
        )
    }

    /// Start a drag if the pointer is over the watermark. Returns whether a
    /// drag started; a press elsewhere leaves the session where it was.
    pub fn press(&mut self, px: f64, py: f64) -> bool {
        if matches!(self.state, DragState::Dragging { .. }) {
            return false;
        }
        let rect = self.place(&self.position);
        if !rect.contains(px, py) {
            debug!("Press at ({:.1}, {:.1}) missed watermark {:?}", px, py, rect);
            return false;
        }
        let (cx, cy) = rect.center();
        self.state = DragState::Dragging {
            grab_dx: px - cx,
            grab_dy: py - cy,
            moved: false,
        };
        self.pending = None;
        true
    }

    /// Move the watermark with the pointer. Returns the provisional
    /// rectangle, or `None` when no drag is in progress.
    pub fn drag_to(&mut self, px: f64, py: f64) -> Option<WatermarkRect> {
        let DragState::Dragging {
            grab_dx, grab_dy, ..
        } = self.state
        else {
            return None;
        };
        let provisional = capture_drag(
            px - grab_dx,
            py - grab_dy,
            self.canvas.0,
            self.canvas.1,
            self.watermark.0,
            self.watermark.1,
        );
        self.pending = Some(provisional);
        self.state = DragState::Dragging {
            grab_dx,
            grab_dy,
            moved: true,
        };
        Some(self.place(&provisional))
    }

    /// Finish the drag and commit the captured position. A press and release
    /// without movement keeps the previous position, presets included.
    pub fn release(&mut self) -> Option<PositionSpec> {
        let DragState::Dragging { moved, .. } = self.state else {
            return None;
        };
        if moved {
            if let Some(captured) = self.pending.take() {
                self.position = captured;
            }
        }
        self.pending = None;
        self.state = DragState::Released;
        debug!("Drag released at {:?}", self.position);
        Some(self.position)
    }

    /// Abandon the drag and restore the committed position.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.state = DragState::Idle;
    }
}
