use serde::Serialize;

use crate::point::Point;

/// Published by a [`DisplayMarker`](super::DisplayMarker) when its screen
/// position or validity actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarkerChange {
    pub old_head_buffer_position: Point,
    pub new_head_buffer_position: Point,
    pub old_tail_buffer_position: Point,
    pub new_tail_buffer_position: Point,
    pub old_head_screen_position: Point,
    pub new_head_screen_position: Point,
    pub old_tail_screen_position: Point,
    pub new_tail_screen_position: Point,
    pub buffer_changed: bool,
    pub valid: bool,
}

impl MarkerChange {
    pub fn head_screen_moved(&self) -> bool {
        self.old_head_screen_position != self.new_head_screen_position
    }

    pub fn tail_screen_moved(&self) -> bool {
        self.old_tail_screen_position != self.new_tail_screen_position
    }
}
