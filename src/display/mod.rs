//! Screen-space projection of a [`TextBuffer`].
//!
//! A [`DisplayMap`] soft-wraps buffer rows to a display width, hides folded
//! rows, translates points between buffer and screen space and owns the
//! registry of observed [`DisplayMarker`]s. Any change to the display itself
//! (wrap width, folds) refreshes every registered marker so observers hear
//! about screen moves that no buffer edit caused.
//!
//! The screen layout is rebuilt lazily and cached per buffer version and
//! display revision.

mod layout;


use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::buffer::{Invalidation, MarkOptions, MarkerId, TextBuffer, TrackedRange};
use crate::error::{MarkerError, Result};
use crate::marker::{ClipOptions, CoordinateMapper, DisplayMarker, WeakDisplayMarker};
use crate::point::{Point, Range};

use layout::{Layout, RowPlacement};

pub use layout::{ScreenLine, wrap_segments};

/// Identifies a fold created by [`DisplayMap::fold_buffer_rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FoldId(MarkerId);

impl fmt::Display for FoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fold#{}", self.0)
    }
}

pub struct DisplayMap {
    buffer: TextBuffer,
    self_ref: Weak<Self>,
    soft_wrap_column: Cell<Option<usize>>,
    folds: RefCell<BTreeMap<FoldId, TrackedRange>>,
    revision: Cell<u64>,
    layout: RefCell<Option<Rc<Layout>>>,
    markers: RefCell<HashMap<MarkerId, WeakDisplayMarker>>,
}

impl DisplayMap {
    /// Create a display over `buffer` with no wrapping and no folds.
    pub fn new(buffer: TextBuffer) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            buffer,
            self_ref: self_ref.clone(),
            soft_wrap_column: Cell::new(None),
            folds: RefCell::new(BTreeMap::new()),
            revision: Cell::new(0),
            layout: RefCell::new(None),
            markers: RefCell::new(HashMap::new()),
        })
    }

    pub const fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    // --- Configuration ---

    pub fn soft_wrap_column(&self) -> Option<usize> {
        self.soft_wrap_column.get()
    }

    /// Wrap rows wider than `column` display cells; `None` disables wrapping.
    pub fn set_soft_wrap_column(&self, column: Option<usize>) {
        if self.soft_wrap_column.replace(column) == column {
            return;
        }
        debug!(?column, "soft wrap column changed");
        self.display_changed();
    }

    /// Hide buffer rows `start + 1..=end` behind row `start`.
    ///
    /// The fold follows edits like any other tracked range.
    ///
    /// # Errors
    /// Returns [`MarkerError::InvalidFold`] unless `start < end` and `end` is
    /// an existing row.
    pub fn fold_buffer_rows(&self, start: usize, end: usize) -> Result<FoldId> {
        if end <= start || end >= self.buffer.line_count() {
            return Err(MarkerError::InvalidFold { start, end });
        }
        let range = Range::new(
            (start, self.buffer.line_len(start)),
            (end, self.buffer.line_len(end)),
        );
        let tracked = self.buffer.mark_range(
            range,
            MarkOptions {
                invalidate: Invalidation::Never,
                ..MarkOptions::default()
            },
        );
        let id = FoldId(tracked.id());
        self.folds.borrow_mut().insert(id, tracked);
        debug!(fold = %id, start, end, "rows folded");
        self.display_changed();
        Ok(id)
    }

    /// Remove a fold. Returns `false` if it does not exist.
    pub fn unfold(&self, id: FoldId) -> bool {
        let Some(tracked) = self.folds.borrow_mut().remove(&id) else {
            return false;
        };
        tracked.destroy();
        debug!(fold = %id, "fold removed");
        self.display_changed();
        true
    }

    pub fn unfold_all(&self) {
        let folds = std::mem::take(&mut *self.folds.borrow_mut());
        if folds.is_empty() {
            return;
        }
        for tracked in folds.values() {
            tracked.destroy();
        }
        debug!(count = folds.len(), "all folds removed");
        self.display_changed();
    }

    pub fn fold_count(&self) -> usize {
        self.folds.borrow().len()
    }

    /// Whether `row` starts a fold or is hidden by one.
    pub fn is_folded_at_buffer_row(&self, row: usize) -> bool {
        let layout = self.layout();
        match layout.rows.get(row) {
            Some(RowPlacement::Hidden { .. }) => true,
            Some(RowPlacement::Visible { first, .. }) => layout.lines[*first].folded,
            None => false,
        }
    }

    // --- Rendering ---

    pub fn screen_line_count(&self) -> usize {
        self.layout().lines.len()
    }

    pub fn screen_line(&self, row: usize) -> Option<ScreenLine> {
        self.layout().lines.get(row).copied()
    }

    /// The buffer text shown on screen row `row`.
    pub fn text_for_screen_row(&self, row: usize) -> Option<String> {
        let line = self.screen_line(row)?;
        let text = self.buffer.line_at(line.buffer_row)?;
        Some(
            text.chars()
                .skip(line.start_column)
                .take(line.len())
                .collect(),
        )
    }

    // --- Markers ---

    /// Track `range` and wrap it in a marker projected through this display.
    ///
    /// # Errors
    /// Returns [`MarkerError::DisplayDropped`] if the display is being torn down.
    pub fn mark_buffer_range(&self, range: Range, options: MarkOptions) -> Result<DisplayMarker> {
        let display = self.shared()?;
        let source = self.buffer.mark_range(range, options);
        Ok(DisplayMarker::new(Rc::new(source), display))
    }

    /// Like [`DisplayMap::mark_buffer_range`], for a range given in screen space.
    ///
    /// # Errors
    /// Returns [`MarkerError::DisplayDropped`] if the display is being torn down.
    pub fn mark_screen_range(&self, range: Range, options: MarkOptions) -> Result<DisplayMarker> {
        self.mark_buffer_range(self.buffer_range_for_screen_range(range), options)
    }

    /// Track a single position. The marker has no tail.
    ///
    /// # Errors
    /// Returns [`MarkerError::DisplayDropped`] if the display is being torn down.
    pub fn mark_buffer_position(
        &self,
        position: Point,
        options: MarkOptions,
    ) -> Result<DisplayMarker> {
        let display = self.shared()?;
        let source = self.buffer.mark_position(position, options);
        Ok(DisplayMarker::new(Rc::new(source), display))
    }

    /// Like [`DisplayMap::mark_buffer_position`], for a screen position.
    ///
    /// # Errors
    /// Returns [`MarkerError::DisplayDropped`] if the display is being torn down.
    pub fn mark_screen_position(
        &self,
        position: Point,
        options: MarkOptions,
    ) -> Result<DisplayMarker> {
        let position = self.buffer_position_for_screen_position(position, ClipOptions::default());
        self.mark_buffer_position(position, options)
    }

    /// An observed marker, by id.
    pub fn marker(&self, id: MarkerId) -> Option<DisplayMarker> {
        self.markers.borrow().get(&id).and_then(WeakDisplayMarker::upgrade)
    }

    /// Ids of all markers that currently have observers, in ascending order.
    pub fn observed_marker_ids(&self) -> Vec<MarkerId> {
        let mut ids: Vec<MarkerId> = self.markers.borrow().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Have every observed marker re-derive its screen positions.
    pub fn refresh_markers(&self) {
        let markers: Vec<DisplayMarker> = self
            .markers
            .borrow()
            .values()
            .filter_map(WeakDisplayMarker::upgrade)
            .collect();
        debug!(count = markers.len(), "refreshing markers");
        for marker in markers {
            marker.refresh_screen_positions();
        }
    }

    // --- Internals ---

    fn shared(&self) -> Result<Rc<dyn CoordinateMapper>> {
        let display: Rc<dyn CoordinateMapper> =
            self.self_ref.upgrade().ok_or(MarkerError::DisplayDropped)?;
        Ok(display)
    }

    fn display_changed(&self) {
        self.revision.set(self.revision.get() + 1);
        self.refresh_markers();
    }

    fn layout(&self) -> Rc<Layout> {
        let key = (self.buffer.version(), self.revision.get());
        let cached = self
            .layout
            .borrow()
            .as_ref()
            .filter(|layout| layout.key == key)
            .cloned();
        if let Some(layout) = cached {
            return layout;
        }

        let lines: Vec<String> = (0..self.buffer.line_count())
            .map(|row| self.buffer.line_at(row).unwrap_or_default())
            .collect();
        let folds: Vec<(usize, usize)> = self
            .folds
            .borrow()
            .values()
            .map(|tracked| {
                let range = tracked.range();
                (range.start.row, range.end.row)
            })
            .collect();
        let layout = Rc::new(Layout::build(
            key,
            &lines,
            self.soft_wrap_column.get(),
            &folds,
        ));
        *self.layout.borrow_mut() = Some(Rc::clone(&layout));
        layout
    }
}

impl CoordinateMapper for DisplayMap {
    fn layout_version(&self) -> u64 {
        // Both counters only grow, so the sum moves whenever either does.
        self.buffer.version() + self.revision.get()
    }

    fn screen_position_for_buffer_position(
        &self,
        position: Point,
        wrap_at_soft_newlines: bool,
    ) -> Point {
        let position = self.buffer.clip_position(position);
        let layout = self.layout();
        let (first, count) = match layout.rows[position.row] {
            RowPlacement::Visible { first, count } => (first, count),
            RowPlacement::Hidden { fold_row } => {
                let row = layout.last_screen_row_for(fold_row);
                return Point::new(row, layout.lines[row].len());
            }
        };
        let row = (first..first + count)
            .find(|&row| position.column <= layout.lines[row].end_column)
            .unwrap_or(first + count - 1);
        let column = position.column - layout.lines[row].start_column;
        self.clip_screen_position(
            Point::new(row, column),
            ClipOptions {
                wrap_at_soft_newlines,
                ..ClipOptions::default()
            },
        )
    }

    fn buffer_position_for_screen_position(&self, position: Point, options: ClipOptions) -> Point {
        let position = self.clip_screen_position(position, options);
        let layout = self.layout();
        let line = layout.lines[position.row];
        Point::new(line.buffer_row, line.start_column + position.column)
    }

    fn clip_screen_position(&self, position: Point, options: ClipOptions) -> Point {
        let layout = self.layout();
        let last = layout.lines.len() - 1;
        let position = if position.row > last {
            Point::new(last, usize::MAX)
        } else {
            position
        };
        let line = layout.lines[position.row];
        let len = line.len();

        if options.wrap_beyond_newlines && position.column > len && position.row < last {
            return Point::new(position.row + 1, 0);
        }
        if line.soft_wrapped && position.column >= len {
            return if options.wrap_at_soft_newlines {
                Point::new(position.row + 1, 0)
            } else {
                Point::new(position.row, len - 1)
            };
        }
        Point::new(position.row, position.column.min(len))
    }

    fn register_marker(&self, marker: &DisplayMarker) {
        self.markers
            .borrow_mut()
            .insert(marker.id(), marker.downgrade());
    }

    fn unregister_marker(&self, id: MarkerId) {
        self.markers.borrow_mut().remove(&id);
    }
}

impl fmt::Debug for DisplayMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayMap")
            .field("soft_wrap_column", &self.soft_wrap_column.get())
            .field("folds", &self.folds.borrow().len())
            .field("revision", &self.revision.get())
            .field("markers", &self.markers.borrow().len())
            .finish_non_exhaustive()
    }
}
