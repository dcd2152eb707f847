//! Rope-backed text buffer with edit-tracked ranges.
//!
//! [`TextBuffer`] is a cheap-to-clone shared handle. Every mutation goes
//! through [`TextBuffer::set_text_in_range`], which updates the text, adjusts
//! every live [`TrackedRange`] and only then, with no internal borrow held,
//! notifies range observers. Observers may therefore query the buffer freely.

mod tracked;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use ropey::Rope;

use crate::point::{Point, Range};

pub use tracked::{Invalidation, MarkOptions, MarkerId, RangeChange, RangeOptions, TrackedRange};

use tracked::{Edit, RangeInner};

pub(crate) struct BufferState {
    rope: Rope,
    version: u64,
    next_range_id: u64,
    ranges: BTreeMap<MarkerId, Rc<RangeInner>>,
}

impl BufferState {
    fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Length of a row in chars, without its line terminator.
    fn line_len(&self, row: usize) -> usize {
        if row >= self.rope.len_lines() {
            return 0;
        }
        let line = self.rope.line(row);
        let mut len = line.len_chars();
        if len > 0 && is_line_break(line.char(len - 1)) {
            len -= 1;
            // CRLF counts as one terminator.
            if len > 0 && line.char(len) == '\n' && line.char(len - 1) == '\r' {
                len -= 1;
            }
        }
        len
    }

    fn max_position(&self) -> Point {
        let last_row = self.line_count().saturating_sub(1);
        Point::new(last_row, self.line_len(last_row))
    }

    pub(crate) fn clip_position(&self, point: Point) -> Point {
        if point.row >= self.line_count() {
            return self.max_position();
        }
        Point::new(point.row, point.column.min(self.line_len(point.row)))
    }

    /// Char index of an already clipped point.
    fn char_index(&self, point: Point) -> usize {
        self.rope.line_to_char(point.row) + point.column
    }

    fn point_for_char(&self, char_idx: usize) -> Point {
        let row = self.rope.char_to_line(char_idx);
        Point::new(row, char_idx - self.rope.line_to_char(row))
    }
}

const fn is_line_break(ch: char) -> bool {
    matches!(
        ch,
        '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}' | '\u{2029}'
    )
}

/// A shared, mutable text buffer.
///
/// Clones share the same underlying text and tracked ranges.
#[derive(Clone)]
pub struct TextBuffer {
    state: Rc<RefCell<BufferState>>,
}

impl TextBuffer {
    /// Create a new buffer from a string.
    pub fn from_text(text: &str) -> Self {
        Self {
            state: Rc::new(RefCell::new(BufferState {
                rope: Rope::from_str(text),
                version: 0,
                next_range_id: 0,
                ranges: BTreeMap::new(),
            })),
        }
    }

    /// Create an empty buffer.
    pub fn empty() -> Self {
        Self::from_text("")
    }

    /// Incremented by every mutation.
    pub fn version(&self) -> u64 {
        self.state.borrow().version
    }

    /// Total number of lines in the buffer.
    pub fn line_count(&self) -> usize {
        self.state.borrow().line_count()
    }

    /// Get the content of a line (without trailing newline).
    pub fn line_at(&self, row: usize) -> Option<String> {
        let state = self.state.borrow();
        if row >= state.line_count() {
            return None;
        }
        let len = state.line_len(row);
        Some(state.rope.line(row).slice(..len).to_string())
    }

    /// Length of a line in chars (without trailing newline).
    pub fn line_len(&self, row: usize) -> usize {
        self.state.borrow().line_len(row)
    }

    /// The full text content of the buffer.
    pub fn text(&self) -> String {
        self.state.borrow().rope.to_string()
    }

    /// The text covered by `range`, after clipping it to the buffer.
    pub fn text_in_range(&self, range: Range) -> String {
        let state = self.state.borrow();
        let start = state.char_index(state.clip_position(range.start));
        let end = state.char_index(state.clip_position(range.end));
        state.rope.slice(start..end).to_string()
    }

    /// The last valid position in the buffer.
    pub fn max_position(&self) -> Point {
        self.state.borrow().max_position()
    }

    /// Clamp `point` to an existing location.
    ///
    /// Rows past the end clip to the end of the buffer; columns past the end
    /// of a line clip to the end of that line.
    pub fn clip_position(&self, point: Point) -> Point {
        self.state.borrow().clip_position(point)
    }

    /// Replace the text in `range` with `text`.
    ///
    /// Returns the range now occupied by `text`. Every live tracked range is
    /// adjusted and then notified, including ranges the edit did not move.
    pub fn set_text_in_range(&self, range: Range, text: &str) -> Range {
        let (edit, pending) = {
            let mut state = self.state.borrow_mut();
            let old_range = Range::new(
                state.clip_position(range.start),
                state.clip_position(range.end),
            );
            let start_idx = state.char_index(old_range.start);
            let end_idx = state.char_index(old_range.end);
            state.rope.remove(start_idx..end_idx);
            state.rope.insert(start_idx, text);
            let new_end = state.point_for_char(start_idx + text.chars().count());
            state.version += 1;

            let edit = Edit {
                old_range,
                new_range: Range::new(old_range.start, new_end),
            };
            let pending = state
                .ranges
                .values()
                .map(|range| (Rc::clone(range), range.apply_edit(&edit)))
                .collect::<Vec<_>>();
            (edit, pending)
        };

        tracing::trace!(
            old = %edit.old_range,
            new = %edit.new_range,
            ranges = pending.len(),
            "buffer edit"
        );
        for (range, change) in pending {
            range.notify(&change);
        }
        edit.new_range
    }

    /// Insert `text` at `point`.
    pub fn insert(&self, point: Point, text: &str) -> Range {
        self.set_text_in_range(Range::empty_at(point), text)
    }

    /// Delete the text in `range`.
    pub fn delete(&self, range: Range) -> Range {
        self.set_text_in_range(range, "")
    }

    /// Append `text` at the end of the buffer.
    pub fn append(&self, text: &str) -> Range {
        self.insert(self.max_position(), text)
    }

    /// Start tracking `range` across edits.
    pub fn mark_range(&self, range: Range, options: MarkOptions) -> TrackedRange {
        self.track(range, options, true)
    }

    /// Start tracking a single position; the range has no tail.
    pub fn mark_position(&self, point: Point, options: MarkOptions) -> TrackedRange {
        self.track(Range::empty_at(point), options, false)
    }

    fn track(&self, range: Range, options: MarkOptions, has_tail: bool) -> TrackedRange {
        let inner = {
            let mut state = self.state.borrow_mut();
            let id = MarkerId(state.next_range_id);
            state.next_range_id += 1;
            let range = Range::new(
                state.clip_position(range.start),
                state.clip_position(range.end),
            );
            let inner = Rc::new(RangeInner::new(id, range, options, has_tail));
            state.ranges.insert(id, Rc::clone(&inner));
            inner
        };
        TrackedRange::new(inner, Rc::downgrade(&self.state))
    }

    /// Number of tracked ranges that have not been destroyed.
    pub fn tracked_range_count(&self) -> usize {
        self.state.borrow().ranges.len()
    }

    pub(crate) fn forget_range(state: &Weak<RefCell<BufferState>>, id: MarkerId) {
        if let Some(state) = state.upgrade() {
            state.borrow_mut().ranges.remove(&id);
        }
    }
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for TextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("TextBuffer")
            .field(
                "rope",
                &format_args!("Rope({} lines)", state.rope.len_lines()),
            )
            .field("version", &state.version)
            .field("ranges", &state.ranges.len())
            .finish()
    }
}
