//! Ranges that follow the text they mark across buffer edits.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{MarkerError, Result};
use crate::event::{Emitter, Subscription};
use crate::point::{Point, Range};

use super::{BufferState, TextBuffer};

/// Identity of a tracked range, shared by any display marker wrapping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub(crate) u64);

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which edits invalidate a range.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Invalidation {
    /// Never invalidated.
    Never,
    /// Invalidated by edits that strictly surround the whole range.
    Surround,
    /// Invalidated by edits that strictly surround either endpoint.
    #[default]
    Overlap,
    /// Invalidated by edits that reach the interior of the range.
    Inside,
    /// Invalidated by edits that touch the range, endpoints included.
    Touch,
}

impl Invalidation {
    fn is_invalidated_by(self, range: Range, edited: Range) -> bool {
        match self {
            Self::Never => false,
            Self::Surround => edited.surrounds(&range),
            Self::Overlap => {
                edited.contains_point(range.start, true) || edited.contains_point(range.end, true)
            }
            Self::Inside => {
                edited.intersects(&range)
                    || range.contains_point(edited.start, true)
                    || edited.contains_point(range.start, true)
            }
            Self::Touch => edited.start <= range.end && range.start <= edited.end,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Surround => "surround",
            Self::Overlap => "overlap",
            Self::Inside => "inside",
            Self::Touch => "touch",
        }
    }
}

/// Options for creating a tracked range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkOptions {
    /// Put the head at the start of the range.
    pub reversed: bool,
    /// Treat insertions at either endpoint as outside the range.
    ///
    /// Defaults to `true` for tail-less ranges and [`Invalidation::Inside`],
    /// `false` otherwise.
    pub exclusive: Option<bool>,
    pub invalidate: Invalidation,
}

/// Options for repositioning a tracked range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeOptions {
    pub reversed: bool,
    /// Replace the range's exclusivity; `None` keeps the current setting.
    pub exclusive: Option<bool>,
}

/// Raw notification emitted by a tracked range.
///
/// Positions are optional so that other sources may omit what they do not
/// know; [`TrackedRange`] always fills them in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeChange {
    pub old_head: Option<Point>,
    pub new_head: Option<Point>,
    pub old_tail: Option<Point>,
    pub new_tail: Option<Point>,
    pub buffer_changed: bool,
    pub valid: Option<bool>,
}

impl RangeChange {
    /// The new validity; an omitted flag means valid.
    pub fn is_valid(&self) -> bool {
        self.valid.unwrap_or(true)
    }
}

/// A single replacement of `old_range` by text now spanning `new_range`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Edit {
    pub old_range: Range,
    pub new_range: Range,
}

/// Move `point` through `edit`.
///
/// `push` decides what happens to a point sitting exactly at the start of
/// the edit: it either stays or is pushed to the end of the new text.
fn adjust_point(point: Point, edit: &Edit, push: bool) -> Point {
    let Edit {
        old_range: old,
        new_range: new,
    } = *edit;
    if point < old.start {
        return point;
    }
    if point == old.start {
        return if push { new.end } else { point };
    }
    if point < old.end {
        return new.end;
    }
    if point.row == old.end.row {
        Point::new(new.end.row, new.end.column + (point.column - old.end.column))
    } else {
        Point::new(point.row - old.end.row + new.end.row, point.column)
    }
}

#[derive(Debug)]
struct RangeState {
    head: Point,
    tail: Option<Point>,
    exclusive: Option<bool>,
    invalidate: Invalidation,
    valid: bool,
    destroyed: bool,
}

impl RangeState {
    fn tail_or_head(&self) -> Point {
        self.tail.unwrap_or(self.head)
    }

    fn range(&self) -> Range {
        Range::new(self.head, self.tail_or_head())
    }

    fn is_reversed(&self) -> bool {
        self.tail.is_some_and(|tail| self.head < tail)
    }

    fn is_exclusive(&self) -> bool {
        self.exclusive
            .unwrap_or(self.tail.is_none() || self.invalidate == Invalidation::Inside)
    }

    fn set_range(&mut self, range: Range, reversed: bool) {
        if reversed {
            self.head = range.start;
            self.tail = Some(range.end);
        } else {
            self.head = range.end;
            self.tail = Some(range.start);
        }
    }
}

pub(crate) struct RangeInner {
    id: MarkerId,
    state: RefCell<RangeState>,
    observers: RefCell<Emitter<RangeChange>>,
}

impl RangeInner {
    pub(crate) fn new(id: MarkerId, range: Range, options: MarkOptions, has_tail: bool) -> Self {
        let mut state = RangeState {
            head: range.end,
            tail: None,
            exclusive: options.exclusive,
            invalidate: options.invalidate,
            valid: true,
            destroyed: false,
        };
        if has_tail {
            state.set_range(range, options.reversed);
        }
        Self {
            id,
            state: RefCell::new(state),
            observers: RefCell::new(Emitter::new()),
        }
    }

    /// Adjust for `edit` and describe the result. Does not notify.
    pub(crate) fn apply_edit(&self, edit: &Edit) -> RangeChange {
        let mut state = self.state.borrow_mut();
        let old_head = state.head;
        let old_tail = state.tail_or_head();
        let range = state.range();

        if state.valid && state.invalidate.is_invalidated_by(range, edit.old_range) {
            state.valid = false;
        }

        let exclusive = state.is_exclusive();
        if state.tail.is_none() {
            let head = adjust_point(state.head, edit, exclusive);
            state.head = head;
        } else {
            let (start, end) = if range.is_empty() && exclusive {
                let point = adjust_point(range.start, edit, true);
                (point, point)
            } else {
                (
                    adjust_point(range.start, edit, exclusive),
                    adjust_point(range.end, edit, !exclusive),
                )
            };
            let reversed = state.is_reversed();
            state.set_range(Range::new(start, end), reversed);
        }

        RangeChange {
            old_head: Some(old_head),
            new_head: Some(state.head),
            old_tail: Some(old_tail),
            new_tail: Some(state.tail_or_head()),
            buffer_changed: true,
            valid: Some(state.valid),
        }
    }

    pub(crate) fn notify(&self, change: &RangeChange) {
        let callbacks = self.observers.borrow().snapshot();
        for callback in callbacks {
            callback(change);
        }
    }
}

/// A buffer range that survives edits.
///
/// Handles are cheap to clone; clones refer to the same range.
#[derive(Clone)]
pub struct TrackedRange {
    inner: Rc<RangeInner>,
    buffer: Weak<RefCell<BufferState>>,
}

impl TrackedRange {
    pub(crate) const fn new(inner: Rc<RangeInner>, buffer: Weak<RefCell<BufferState>>) -> Self {
        Self { inner, buffer }
    }

    pub fn id(&self) -> MarkerId {
        self.inner.id
    }

    pub fn range(&self) -> Range {
        self.inner.state.borrow().range()
    }

    pub fn head_position(&self) -> Point {
        self.inner.state.borrow().head
    }

    /// The tail, or the head when the range has no tail.
    pub fn tail_position(&self) -> Point {
        self.inner.state.borrow().tail_or_head()
    }

    pub fn has_tail(&self) -> bool {
        self.inner.state.borrow().tail.is_some()
    }

    /// Whether the head comes before the tail.
    pub fn is_reversed(&self) -> bool {
        self.inner.state.borrow().is_reversed()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.state.borrow().valid
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.borrow().destroyed
    }

    pub fn is_exclusive(&self) -> bool {
        self.inner.state.borrow().is_exclusive()
    }

    /// Reposition both ends. Revalidates the range.
    ///
    /// # Errors
    /// Returns an error if the range was destroyed or its buffer dropped.
    pub fn set_range(&self, range: Range, options: RangeOptions) -> Result<()> {
        self.update(|state, clip| {
            state.set_range(Range::new(clip(range.start), clip(range.end)), options.reversed);
            if options.exclusive.is_some() {
                state.exclusive = options.exclusive;
            }
        })
    }

    /// Move the head. Revalidates the range.
    ///
    /// # Errors
    /// Returns an error if the range was destroyed or its buffer dropped.
    pub fn set_head_position(&self, position: Point) -> Result<()> {
        self.update(|state, clip| state.head = clip(position))
    }

    /// Move the tail, creating one if the range has none. Revalidates the range.
    ///
    /// # Errors
    /// Returns an error if the range was destroyed or its buffer dropped.
    pub fn set_tail_position(&self, position: Point) -> Result<()> {
        self.update(|state, clip| state.tail = Some(clip(position)))
    }

    /// Anchor a tail at the head if there is none. Returns the tail.
    ///
    /// # Errors
    /// Returns an error if the range was destroyed or its buffer dropped.
    pub fn place_tail(&self) -> Result<Point> {
        self.update(|state, _| {
            if state.tail.is_none() {
                state.tail = Some(state.head);
            }
        })?;
        Ok(self.tail_position())
    }

    /// Drop the tail, collapsing the range onto its head.
    ///
    /// # Errors
    /// Returns an error if the range was destroyed or its buffer dropped.
    pub fn clear_tail(&self) -> Result<()> {
        self.update(|state, _| state.tail = None)
    }

    /// Stop tracking. The range is removed from its buffer and loses all observers.
    pub fn destroy(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
        }
        self.inner.observers.borrow_mut().clear();
        TextBuffer::forget_range(&self.buffer, self.inner.id);
        tracing::trace!(range = %self.inner.id, "tracked range destroyed");
    }

    /// Receive a [`RangeChange`] after every buffer edit and every effective
    /// repositioning.
    pub fn observe(&self, handler: impl Fn(&RangeChange) + 'static) -> Subscription {
        let id = self.inner.observers.borrow_mut().subscribe(handler);
        let inner = Rc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(inner) = inner.upgrade() {
                inner.observers.borrow_mut().unsubscribe(id);
            }
        })
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    /// Apply an explicit repositioning and notify if anything moved.
    fn update(&self, apply: impl FnOnce(&mut RangeState, &dyn Fn(Point) -> Point)) -> Result<()> {
        let buffer = self.buffer.upgrade().ok_or(MarkerError::BufferDropped)?;
        let change = {
            let buffer = buffer.borrow();
            let clip = |point: Point| buffer.clip_position(point);
            let mut state = self.inner.state.borrow_mut();
            if state.destroyed {
                return Err(MarkerError::Destroyed(self.inner.id));
            }
            let old_head = state.head;
            let old_tail = state.tail_or_head();
            let was_valid = state.valid;

            apply(&mut *state, &clip);
            state.valid = true;

            let moved = state.head != old_head || state.tail_or_head() != old_tail;
            (moved || !was_valid).then(|| RangeChange {
                old_head: Some(old_head),
                new_head: Some(state.head),
                old_tail: Some(old_tail),
                new_tail: Some(state.tail_or_head()),
                buffer_changed: false,
                valid: Some(true),
            })
        };
        if let Some(change) = change {
            self.inner.notify(&change);
        }
        Ok(())
    }
}

impl fmt::Debug for TrackedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("TrackedRange")
            .field("id", &self.inner.id)
            .field("head", &state.head)
            .field("tail", &state.tail)
            .field("valid", &state.valid)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TextBuffer;

    fn recorded(range: &TrackedRange) -> (Rc<RefCell<Vec<RangeChange>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let sub = range.observe(move |change| sink.borrow_mut().push(*change));
        (log, sub)
    }

    // --- Edit adjustment ---

    #[test]
    fn test_edit_before_range_shifts_it() {
        let buf = TextBuffer::from_text("hello world");
        let range = buf.mark_range(Range::new((0, 6), (0, 11)), MarkOptions::default());
        buf.insert(Point::new(0, 0), ">> ");
        assert_eq!(range.range(), Range::new((0, 9), (0, 14)));
    }

    #[test]
    fn test_edit_after_range_leaves_it() {
        let buf = TextBuffer::from_text("hello world");
        let range = buf.mark_range(Range::new((0, 0), (0, 5)), MarkOptions::default());
        buf.insert(Point::new(0, 11), "!");
        assert_eq!(range.range(), Range::new((0, 0), (0, 5)));
    }

    #[test]
    fn test_newline_before_range_moves_rows() {
        let buf = TextBuffer::from_text("abc\ndef");
        let range = buf.mark_range(Range::new((1, 1), (1, 3)), MarkOptions::default());
        buf.insert(Point::new(0, 1), "\n\n");
        assert_eq!(range.range(), Range::new((3, 1), (3, 3)));
    }

    #[test]
    fn test_insert_on_same_row_before_range_shifts_columns_only() {
        let buf = TextBuffer::from_text("abcdef");
        let range = buf.mark_range(Range::new((0, 3), (0, 5)), MarkOptions::default());
        buf.insert(Point::new(0, 1), "x\ny");
        assert_eq!(range.range(), Range::new((1, 3), (1, 5)));
    }

    #[test]
    fn test_inclusive_range_grows_at_end_but_not_start() {
        let buf = TextBuffer::from_text("abcdef");
        let range = buf.mark_range(Range::new((0, 2), (0, 4)), MarkOptions::default());
        buf.insert(Point::new(0, 4), "XX");
        assert_eq!(range.range(), Range::new((0, 2), (0, 6)));
        buf.insert(Point::new(0, 2), "YY");
        assert_eq!(range.range(), Range::new((0, 2), (0, 8)));
    }

    #[test]
    fn test_exclusive_range_does_not_grow() {
        let buf = TextBuffer::from_text("abcdef");
        let options = MarkOptions {
            exclusive: Some(true),
            ..MarkOptions::default()
        };
        let range = buf.mark_range(Range::new((0, 2), (0, 4)), options);
        buf.insert(Point::new(0, 4), "XX");
        assert_eq!(range.range(), Range::new((0, 2), (0, 4)));
        buf.insert(Point::new(0, 2), "YY");
        assert_eq!(range.range(), Range::new((0, 4), (0, 6)));
    }

    #[test]
    fn test_tailless_position_is_pushed_by_insertion() {
        let buf = TextBuffer::from_text("abc");
        let range = buf.mark_position(Point::new(0, 1), MarkOptions::default());
        buf.insert(Point::new(0, 1), "zz");
        assert_eq!(range.head_position(), Point::new(0, 3));
    }

    #[test]
    fn test_empty_inclusive_range_expands() {
        let buf = TextBuffer::from_text("abc");
        let range = buf.mark_range(Range::empty_at((0, 1)), MarkOptions::default());
        buf.insert(Point::new(0, 1), "zz");
        assert_eq!(range.range(), Range::new((0, 1), (0, 3)));
        assert_eq!(range.head_position(), Point::new(0, 3));
    }

    #[test]
    fn test_endpoint_inside_deletion_collapses_to_edit() {
        let buf = TextBuffer::from_text("0123456789");
        let options = MarkOptions {
            invalidate: Invalidation::Never,
            ..MarkOptions::default()
        };
        let range = buf.mark_range(Range::new((0, 4), (0, 8)), options);
        buf.delete(Range::new((0, 2), (0, 6)));
        assert_eq!(range.range(), Range::new((0, 2), (0, 4)));
    }

    #[test]
    fn test_reversed_range_keeps_orientation() {
        let buf = TextBuffer::from_text("abcdef");
        let options = MarkOptions {
            reversed: true,
            ..MarkOptions::default()
        };
        let range = buf.mark_range(Range::new((0, 1), (0, 3)), options);
        assert!(range.is_reversed());
        buf.insert(Point::new(0, 0), "__");
        assert!(range.is_reversed());
        assert_eq!(range.head_position(), Point::new(0, 3));
        assert_eq!(range.tail_position(), Point::new(0, 5));
    }

    // --- Invalidation ---

    #[test]
    fn test_overlap_invalidates_when_endpoint_deleted() {
        let buf = TextBuffer::from_text("0123456789");
        let range = buf.mark_range(Range::new((0, 3), (0, 6)), MarkOptions::default());
        buf.delete(Range::new((0, 5), (0, 8)));
        assert!(!range.is_valid());
    }

    #[test]
    fn test_overlap_survives_typing_inside() {
        let buf = TextBuffer::from_text("0123456789");
        let range = buf.mark_range(Range::new((0, 3), (0, 6)), MarkOptions::default());
        buf.insert(Point::new(0, 4), "abc");
        assert!(range.is_valid());
        assert_eq!(range.range(), Range::new((0, 3), (0, 9)));
    }

    #[test]
    fn test_inside_invalidates_when_typing_inside() {
        let buf = TextBuffer::from_text("0123456789");
        let options = MarkOptions {
            invalidate: Invalidation::Inside,
            ..MarkOptions::default()
        };
        let range = buf.mark_range(Range::new((0, 3), (0, 6)), options);
        buf.insert(Point::new(0, 6), "abc");
        assert!(range.is_valid(), "edit at the end does not reach inside");
        buf.insert(Point::new(0, 4), "abc");
        assert!(!range.is_valid());
    }

    #[test]
    fn test_surround_requires_enclosing_edit() {
        let buf = TextBuffer::from_text("0123456789");
        let options = MarkOptions {
            invalidate: Invalidation::Surround,
            ..MarkOptions::default()
        };
        let range = buf.mark_range(Range::new((0, 3), (0, 6)), options);
        buf.delete(Range::new((0, 4), (0, 8)));
        assert!(range.is_valid());
        buf.delete(Range::new((0, 1), (0, 6)));
        assert!(!range.is_valid());
    }

    #[test]
    fn test_touch_invalidates_adjacent_insert() {
        let buf = TextBuffer::from_text("0123456789");
        let options = MarkOptions {
            invalidate: Invalidation::Touch,
            ..MarkOptions::default()
        };
        let range = buf.mark_range(Range::new((0, 3), (0, 6)), options);
        buf.insert(Point::new(0, 6), "x");
        assert!(!range.is_valid());
    }

    #[test]
    fn test_never_survives_everything() {
        let buf = TextBuffer::from_text("0123456789");
        let options = MarkOptions {
            invalidate: Invalidation::Never,
            ..MarkOptions::default()
        };
        let range = buf.mark_range(Range::new((0, 3), (0, 6)), options);
        buf.delete(Range::new((0, 0), (0, 10)));
        assert!(range.is_valid());
        assert_eq!(range.range(), Range::empty_at((0, 0)));
    }

    #[test]
    fn test_set_range_revalidates() {
        let buf = TextBuffer::from_text("0123456789");
        let range = buf.mark_range(Range::new((0, 3), (0, 6)), MarkOptions::default());
        buf.delete(Range::new((0, 2), (0, 4)));
        assert!(!range.is_valid());
        range
            .set_range(Range::new((0, 0), (0, 1)), RangeOptions::default())
            .unwrap();
        assert!(range.is_valid());
    }

    // --- Events ---

    #[test]
    fn test_every_edit_notifies_even_when_unmoved() {
        let buf = TextBuffer::from_text("hello world");
        let range = buf.mark_range(Range::new((0, 0), (0, 5)), MarkOptions::default());
        let (log, _sub) = recorded(&range);
        buf.insert(Point::new(0, 11), "!");
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert!(log[0].buffer_changed);
        assert_eq!(log[0].old_head, log[0].new_head);
    }

    #[test]
    fn test_setter_notifies_only_on_change() {
        let buf = TextBuffer::from_text("hello world");
        let range = buf.mark_range(Range::new((0, 0), (0, 5)), MarkOptions::default());
        let (log, _sub) = recorded(&range);
        range.set_head_position(Point::new(0, 5)).unwrap();
        assert!(log.borrow().is_empty());
        range.set_head_position(Point::new(0, 7)).unwrap();
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].old_head, Some(Point::new(0, 5)));
        assert_eq!(log[0].new_head, Some(Point::new(0, 7)));
        assert!(!log[0].buffer_changed);
    }

    #[test]
    fn test_setters_clip_to_buffer() {
        let buf = TextBuffer::from_text("abc\nde");
        let range = buf.mark_range(Range::empty_at((0, 0)), MarkOptions::default());
        range.set_head_position(Point::new(7, 7)).unwrap();
        assert_eq!(range.head_position(), Point::new(1, 2));
    }

    #[test]
    fn test_head_before_tail_reverses() {
        let buf = TextBuffer::from_text("abcdef");
        let range = buf.mark_range(Range::new((0, 2), (0, 4)), MarkOptions::default());
        range.set_head_position(Point::new(0, 0)).unwrap();
        assert!(range.is_reversed());
        assert_eq!(range.range(), Range::new((0, 0), (0, 2)));
    }

    #[test]
    fn test_place_tail_twice_keeps_tail() {
        let buf = TextBuffer::from_text("abcdef");
        let range = buf.mark_position(Point::new(0, 2), MarkOptions::default());
        assert_eq!(range.place_tail().unwrap(), Point::new(0, 2));
        range.set_head_position(Point::new(0, 5)).unwrap();
        assert_eq!(range.place_tail().unwrap(), Point::new(0, 2));
        assert_eq!(range.range(), Range::new((0, 2), (0, 5)));
    }

    #[test]
    fn test_clear_tail_collapses_to_head() {
        let buf = TextBuffer::from_text("abcdef");
        let range = buf.mark_range(Range::new((0, 1), (0, 4)), MarkOptions::default());
        range.clear_tail().unwrap();
        assert!(!range.has_tail());
        assert_eq!(range.range(), Range::empty_at((0, 4)));
    }

    #[test]
    fn test_cancelled_subscription_stops_events() {
        let buf = TextBuffer::from_text("abc");
        let range = buf.mark_range(Range::empty_at((0, 1)), MarkOptions::default());
        let (log, sub) = recorded(&range);
        sub.cancel();
        buf.insert(Point::new(0, 0), "x");
        assert!(log.borrow().is_empty());
        assert_eq!(range.observer_count(), 0);
    }

    #[test]
    fn test_destroyed_range_rejects_mutation() {
        let buf = TextBuffer::from_text("abc");
        let range = buf.mark_range(Range::empty_at((0, 1)), MarkOptions::default());
        let id = range.id();
        range.destroy();
        assert_eq!(
            range.set_head_position(Point::new(0, 0)),
            Err(MarkerError::Destroyed(id))
        );
        assert!(range.is_destroyed());
    }

    #[test]
    fn test_dropped_buffer_is_reported() {
        let range = {
            let buf = TextBuffer::from_text("abc");
            buf.mark_range(Range::empty_at((0, 1)), MarkOptions::default())
        };
        assert_eq!(
            range.set_head_position(Point::new(0, 0)),
            Err(MarkerError::BufferDropped)
        );
    }

    #[test]
    fn test_observer_may_read_buffer_during_edit() {
        let buf = TextBuffer::from_text("abc");
        let range = buf.mark_range(Range::new((0, 0), (0, 3)), MarkOptions::default());
        let seen = Rc::new(RefCell::new(String::new()));
        let sink = Rc::clone(&seen);
        let reader = buf.clone();
        let _sub = range.observe(move |_| *sink.borrow_mut() = reader.text());
        buf.insert(Point::new(0, 3), "d");
        assert_eq!(*seen.borrow(), "abcd");
    }
}
