// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. marker::MarkerChange)
    clippy::module_name_repetitions
)]

//! # Wrapmark
//!
//! Display markers: buffer ranges that know where they are on screen.
//!
//! A [`DisplayMarker`](marker::DisplayMarker) tracks a span of a text buffer
//! and its projection into a soft-wrapped, folded display. Screen positions
//! are memoized while the marker is observed, recomputed whenever the buffer
//! or the display changes, and observers hear about a change only when the
//! screen position or the validity of the marker actually moved.
//!
//! ## Architecture
//!
//! - **Buffer space**: [`TextBuffer`](buffer::TextBuffer) stores text and
//!   adjusts every [`TrackedRange`](buffer::TrackedRange) across edits.
//! - **Screen space**: [`DisplayMap`](display::DisplayMap) wraps and folds
//!   rows and translates points both ways.
//! - **Markers** sit between the two, caching and deduplicating.
//!
//! ## Modules
//!
//! - [`buffer`]: Rope-backed text and edit-tracked ranges
//! - [`display`]: Soft wrap, folds and coordinate translation
//! - [`marker`]: Display markers and their change events
//! - [`event`]: Observer lists and subscriptions
//! - [`point`]: Points and ranges
//! - [`config`]: Saved command-line defaults
//! - [`error`]: Library error type

pub mod buffer;
pub mod config;
pub mod display;
pub mod error;
pub mod event;
pub mod marker;
pub mod point;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::buffer::{Invalidation, MarkOptions, RangeOptions, TextBuffer, TrackedRange};
    pub use crate::display::DisplayMap;
    pub use crate::error::{MarkerError, Result};
    pub use crate::marker::{ClipOptions, CoordinateMapper, DisplayMarker, MarkerChange};
    pub use crate::point::{Point, Range};
}
