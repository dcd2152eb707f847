//! The seams a [`DisplayMarker`](super::DisplayMarker) is built on.
//!
//! A marker never touches buffer text or wrapping rules directly. It asks a
//! [`PositionSource`] for authoritative buffer positions and a
//! [`CoordinateMapper`] for their screen projection.

use crate::buffer::{MarkerId, RangeChange, RangeOptions, TrackedRange};
use crate::error::Result;
use crate::event::Subscription;
use crate::point::{Point, Range};

use super::DisplayMarker;

/// Authoritative buffer-space range that survives edits.
pub trait PositionSource {
    fn id(&self) -> MarkerId;

    fn range(&self) -> Range;

    /// # Errors
    /// Implementations report misuse such as a destroyed source.
    fn set_range(&self, range: Range, options: RangeOptions) -> Result<()>;

    fn head_position(&self) -> Point;

    /// # Errors
    /// Implementations report misuse such as a destroyed source.
    fn set_head_position(&self, position: Point) -> Result<()>;

    fn tail_position(&self) -> Point;

    /// # Errors
    /// Implementations report misuse such as a destroyed source.
    fn set_tail_position(&self, position: Point) -> Result<()>;

    fn has_tail(&self) -> bool;

    /// # Errors
    /// Implementations report misuse such as a destroyed source.
    fn place_tail(&self) -> Result<Point>;

    /// # Errors
    /// Implementations report misuse such as a destroyed source.
    fn clear_tail(&self) -> Result<()>;

    fn is_reversed(&self) -> bool;

    fn is_valid(&self) -> bool;

    fn destroy(&self);

    fn observe(&self, handler: Box<dyn Fn(&RangeChange)>) -> Subscription;
}

impl PositionSource for TrackedRange {
    fn id(&self) -> MarkerId {
        Self::id(self)
    }

    fn range(&self) -> Range {
        Self::range(self)
    }

    fn set_range(&self, range: Range, options: RangeOptions) -> Result<()> {
        Self::set_range(self, range, options)
    }

    fn head_position(&self) -> Point {
        Self::head_position(self)
    }

    fn set_head_position(&self, position: Point) -> Result<()> {
        Self::set_head_position(self, position)
    }

    fn tail_position(&self) -> Point {
        Self::tail_position(self)
    }

    fn set_tail_position(&self, position: Point) -> Result<()> {
        Self::set_tail_position(self, position)
    }

    fn has_tail(&self) -> bool {
        Self::has_tail(self)
    }

    fn place_tail(&self) -> Result<Point> {
        Self::place_tail(self)
    }

    fn clear_tail(&self) -> Result<()> {
        Self::clear_tail(self)
    }

    fn is_reversed(&self) -> bool {
        Self::is_reversed(self)
    }

    fn is_valid(&self) -> bool {
        Self::is_valid(self)
    }

    fn destroy(&self) {
        Self::destroy(self);
    }

    fn observe(&self, handler: Box<dyn Fn(&RangeChange)>) -> Subscription {
        Self::observe(self, handler)
    }
}

/// How a screen position is clamped onto displayed text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipOptions {
    /// A column past the end of a line moves to the start of the next row.
    pub wrap_beyond_newlines: bool,
    /// A column at a soft-wrap boundary moves to the start of the next row
    /// instead of back onto the last char of the wrapped row.
    pub wrap_at_soft_newlines: bool,
}

impl ClipOptions {
    pub const fn wrap_at_soft_newlines() -> Self {
        Self {
            wrap_beyond_newlines: false,
            wrap_at_soft_newlines: true,
        }
    }
}

/// Converts between buffer space and screen space and hosts the registry of
/// observed markers.
pub trait CoordinateMapper {
    /// Changes whenever any projection may have changed: after a buffer edit
    /// or a change to the display itself.
    fn layout_version(&self) -> u64;

    fn screen_position_for_buffer_position(
        &self,
        position: Point,
        wrap_at_soft_newlines: bool,
    ) -> Point;

    fn buffer_position_for_screen_position(&self, position: Point, options: ClipOptions) -> Point;

    fn clip_screen_position(&self, position: Point, options: ClipOptions) -> Point;

    fn screen_range_for_buffer_range(&self, range: Range, wrap_at_soft_newlines: bool) -> Range {
        Range::new(
            self.screen_position_for_buffer_position(range.start, wrap_at_soft_newlines),
            self.screen_position_for_buffer_position(range.end, wrap_at_soft_newlines),
        )
    }

    fn buffer_range_for_screen_range(&self, range: Range) -> Range {
        Range::new(
            self.buffer_position_for_screen_position(range.start, ClipOptions::default()),
            self.buffer_position_for_screen_position(range.end, ClipOptions::default()),
        )
    }

    /// Called when `marker` gains its first observer.
    fn register_marker(&self, marker: &DisplayMarker);

    /// Called when the marker under `id` loses its last observer or is destroyed.
    fn unregister_marker(&self, id: MarkerId);
}
