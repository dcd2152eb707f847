//! Display markers: buffer ranges with memoized screen positions.
//!
//! A [`DisplayMarker`] wraps a [`PositionSource`] (buffer-space truth) and a
//! [`CoordinateMapper`] (screen projection). While at least one observer is
//! attached the marker keeps its screen head and tail cached, listens to the
//! source's raw change feed, and republishes a [`MarkerChange`] only when a
//! screen position or the validity actually changed.
//!
//! ```text
//! Unobserved --observe()--> Observed
//!     ^                        |
//!     +--- last unobserve() ---+
//! ```
//!
//! Entering `Observed` caches both screen positions, subscribes to the
//! source and registers the marker with its display; leaving it undoes all
//! three. Screen positions are only memoized while observed, since an
//! unobserved marker does not hear about edits.
//!
//! A cached position is stamped with the mapper's layout version. Reads made
//! after an edit or display change but before this marker has reconciled it
//! (for example from another marker's change callback) miss and project
//! live; the stale value is kept as the old position for reconciliation.

mod cache;
mod change;
mod collaborators;


use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::buffer::{MarkerId, RangeChange, RangeOptions};
use crate::error::{MarkerError, Result};
use crate::event::{Emitter, ObserverId, Subscription};
use crate::point::{Point, Range};

use cache::ScreenCache;

pub use change::MarkerChange;
pub use collaborators::{ClipOptions, CoordinateMapper, PositionSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Head,
    Tail,
}

#[derive(Debug)]
struct MarkerState {
    head_screen: ScreenCache,
    tail_screen: ScreenCache,
    valid: bool,
    destroyed: bool,
    source_subscription: Option<Subscription>,
}

impl MarkerState {
    const fn cache(&self, end: End) -> ScreenCache {
        match end {
            End::Head => self.head_screen,
            End::Tail => self.tail_screen,
        }
    }

    const fn cache_mut(&mut self, end: End) -> &mut ScreenCache {
        match end {
            End::Head => &mut self.head_screen,
            End::Tail => &mut self.tail_screen,
        }
    }

    const fn invalidate_screen_positions(&mut self) {
        self.head_screen.invalidate();
        self.tail_screen.invalidate();
    }
}

struct MarkerInner {
    id: MarkerId,
    source: Rc<dyn PositionSource>,
    display: Rc<dyn CoordinateMapper>,
    state: RefCell<MarkerState>,
    observers: RefCell<Emitter<MarkerChange>>,
    pending: RefCell<VecDeque<RangeChange>>,
    reconciling: Cell<bool>,
}

impl Drop for MarkerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.destroyed {
            return;
        }
        // Nothing can reach the source once the last handle is gone.
        drop(state.source_subscription.take());
        self.display.unregister_marker(self.id);
        self.source.destroy();
        debug!(marker = %self.id, "marker dropped");
    }
}

/// Clears the reconciling flag even if an observer panics.
struct ReconcileGuard<'a>(&'a Cell<bool>);

impl<'a> ReconcileGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for ReconcileGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A buffer range tracked in screen space.
///
/// Handles are cheap to clone; clones refer to the same marker. Dropping the
/// last handle destroys the marker.
#[derive(Clone)]
pub struct DisplayMarker {
    inner: Rc<MarkerInner>,
}

/// A non-owning reference to a [`DisplayMarker`], as held by display registries.
#[derive(Clone)]
pub struct WeakDisplayMarker {
    inner: Weak<MarkerInner>,
}

impl WeakDisplayMarker {
    pub fn upgrade(&self) -> Option<DisplayMarker> {
        self.inner.upgrade().map(|inner| DisplayMarker { inner })
    }
}

impl fmt::Debug for WeakDisplayMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDisplayMarker")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl DisplayMarker {
    /// Wrap `source`, projecting it through `display`.
    ///
    /// The marker takes over the source: destroying the marker destroys it.
    pub fn new(source: Rc<dyn PositionSource>, display: Rc<dyn CoordinateMapper>) -> Self {
        let id = source.id();
        let valid = source.is_valid();
        Self {
            inner: Rc::new(MarkerInner {
                id,
                source,
                display,
                state: RefCell::new(MarkerState {
                    head_screen: ScreenCache::Stale,
                    tail_screen: ScreenCache::Stale,
                    valid,
                    destroyed: false,
                    source_subscription: None,
                }),
                observers: RefCell::new(Emitter::new()),
                pending: RefCell::new(VecDeque::new()),
                reconciling: Cell::new(false),
            }),
        }
    }

    /// Same as the id of the underlying position source.
    pub fn id(&self) -> MarkerId {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakDisplayMarker {
        WeakDisplayMarker {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Last validity published to observers, or the source's validity
    /// while nobody is observing.
    pub fn is_valid(&self) -> bool {
        let state = self.inner.state.borrow();
        if state.source_subscription.is_some() || state.destroyed {
            state.valid
        } else {
            self.inner.source.is_valid()
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.borrow().destroyed
    }

    /// Whether the marker currently holds a subscription to its source.
    pub fn is_observed(&self) -> bool {
        self.inner.state.borrow().source_subscription.is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    // --- Buffer space ---

    /// # Errors
    /// Returns [`MarkerError::Destroyed`] after [`DisplayMarker::destroy`].
    pub fn buffer_range(&self) -> Result<Range> {
        self.ensure_live()?;
        Ok(self.inner.source.range())
    }

    /// # Errors
    /// Returns an error if the marker was destroyed, if called from one of
    /// its own change callbacks, or if the source rejects the update.
    pub fn set_buffer_range(&self, range: Range, options: RangeOptions) -> Result<()> {
        self.ensure_mutable()?;
        self.inner.source.set_range(range, options)
    }

    /// # Errors
    /// Returns [`MarkerError::Destroyed`] after [`DisplayMarker::destroy`].
    pub fn head_buffer_position(&self) -> Result<Point> {
        self.ensure_live()?;
        Ok(self.inner.source.head_position())
    }

    /// # Errors
    /// Returns [`MarkerError::Destroyed`] after [`DisplayMarker::destroy`].
    pub fn tail_buffer_position(&self) -> Result<Point> {
        self.ensure_live()?;
        Ok(self.inner.source.tail_position())
    }

    /// # Errors
    /// Returns an error if the marker was destroyed, if called from one of
    /// its own change callbacks, or if the source rejects the update.
    pub fn set_head_buffer_position(&self, position: Point) -> Result<()> {
        self.ensure_mutable()?;
        self.inner.source.set_head_position(position)
    }

    /// # Errors
    /// Returns an error if the marker was destroyed, if called from one of
    /// its own change callbacks, or if the source rejects the update.
    pub fn set_tail_buffer_position(&self, position: Point) -> Result<()> {
        self.ensure_mutable()?;
        self.inner.source.set_tail_position(position)
    }

    // --- Screen space ---

    /// # Errors
    /// Returns [`MarkerError::Destroyed`] after [`DisplayMarker::destroy`].
    pub fn screen_range(&self) -> Result<Range> {
        self.ensure_live()?;
        Ok(self
            .inner
            .display
            .screen_range_for_buffer_range(self.inner.source.range(), true))
    }

    /// Translate `range` to buffer space and set it.
    ///
    /// # Errors
    /// Returns an error if the marker was destroyed, if called from one of
    /// its own change callbacks, or if the source rejects the update.
    pub fn set_screen_range(&self, range: Range, options: RangeOptions) -> Result<()> {
        self.ensure_mutable()?;
        let buffer_range = self.inner.display.buffer_range_for_screen_range(range);
        self.set_buffer_range(buffer_range, options)
    }

    /// The memoized screen position of the head.
    ///
    /// # Errors
    /// Returns [`MarkerError::Destroyed`] after [`DisplayMarker::destroy`].
    pub fn head_screen_position(&self) -> Result<Point> {
        self.ensure_live()?;
        Ok(self.screen_position(End::Head))
    }

    /// The memoized screen position of the tail.
    ///
    /// # Errors
    /// Returns [`MarkerError::Destroyed`] after [`DisplayMarker::destroy`].
    pub fn tail_screen_position(&self) -> Result<Point> {
        self.ensure_live()?;
        Ok(self.screen_position(End::Tail))
    }

    /// Clip `position`, translate it to buffer space and move the head there.
    ///
    /// # Errors
    /// Returns an error if the marker was destroyed, if called from one of
    /// its own change callbacks, or if the source rejects the update.
    pub fn set_head_screen_position(&self, position: Point, options: ClipOptions) -> Result<()> {
        self.ensure_mutable()?;
        let buffer_position = self.buffer_position_for_screen(position, options);
        self.set_head_buffer_position(buffer_position)
    }

    /// Clip `position`, translate it to buffer space and move the tail there.
    ///
    /// # Errors
    /// Returns an error if the marker was destroyed, if called from one of
    /// its own change callbacks, or if the source rejects the update.
    pub fn set_tail_screen_position(&self, position: Point, options: ClipOptions) -> Result<()> {
        self.ensure_mutable()?;
        let buffer_position = self.buffer_position_for_screen(position, options);
        self.set_tail_buffer_position(buffer_position)
    }

    // --- Tail and orientation ---

    /// Anchor a tail at the head if the marker has none. Returns the tail.
    ///
    /// Calling this when a tail already exists leaves it where it is.
    ///
    /// # Errors
    /// Returns an error if the marker was destroyed, if called from one of
    /// its own change callbacks, or if the source rejects the update.
    pub fn place_tail(&self) -> Result<Point> {
        self.ensure_mutable()?;
        self.inner.source.place_tail()
    }

    /// Collapse the marker onto its head.
    ///
    /// # Errors
    /// Returns an error if the marker was destroyed, if called from one of
    /// its own change callbacks, or if the source rejects the update.
    pub fn clear_tail(&self) -> Result<()> {
        self.ensure_mutable()?;
        self.inner.source.clear_tail()
    }

    /// # Errors
    /// Returns [`MarkerError::Destroyed`] after [`DisplayMarker::destroy`].
    pub fn has_tail(&self) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.inner.source.has_tail())
    }

    /// # Errors
    /// Returns [`MarkerError::Destroyed`] after [`DisplayMarker::destroy`].
    pub fn is_reversed(&self) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.inner.source.is_reversed())
    }

    // --- Observation ---

    /// Call `callback` with every change to this marker's screen position or
    /// validity.
    ///
    /// The first observer starts the subscription to the position source and
    /// registers the marker with its display. Dropping the returned handle is
    /// the same as [`DisplayMarker::unobserve`].
    ///
    /// # Errors
    /// Returns [`MarkerError::Destroyed`] after [`DisplayMarker::destroy`].
    pub fn observe(&self, callback: impl Fn(&MarkerChange) + 'static) -> Result<Subscription> {
        self.ensure_live()?;
        if !self.is_observed() {
            self.start_observing();
        }
        let id = self.inner.observers.borrow_mut().subscribe(callback);
        let inner = Rc::downgrade(&self.inner);
        Ok(Subscription::new(id, move || {
            if let Some(inner) = inner.upgrade() {
                DisplayMarker { inner }.unobserve(id);
            }
        }))
    }

    /// Detach the observer `id`. Unknown ids are ignored.
    ///
    /// Removing the last observer cancels the source subscription and
    /// unregisters the marker from its display.
    pub fn unobserve(&self, id: ObserverId) {
        let remaining = {
            let mut observers = self.inner.observers.borrow_mut();
            if !observers.unsubscribe(id) {
                return;
            }
            observers.len()
        };
        if remaining == 0 && self.is_observed() {
            self.stop_observing();
        }
    }

    /// Re-derive screen positions after the display itself changed, e.g. a
    /// new wrap width or a fold. Publishes a change if anything moved.
    pub fn refresh_screen_positions(&self) {
        if self.is_destroyed() || !self.is_observed() {
            return;
        }
        let change = RangeChange {
            valid: Some(self.is_valid()),
            ..RangeChange::default()
        };
        self.handle_source_change(&change);
    }

    /// Unregister, drop all observers and destroy the position source.
    ///
    /// Destroying twice is a no-op. Every other method then reports
    /// [`MarkerError::Destroyed`].
    pub fn destroy(&self) {
        let subscription = {
            let mut state = self.inner.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.invalidate_screen_positions();
            state.source_subscription.take()
        };
        drop(subscription);
        self.inner.observers.borrow_mut().clear();
        self.inner.pending.borrow_mut().clear();
        self.inner.display.unregister_marker(self.inner.id);
        self.inner.source.destroy();
        debug!(marker = %self.inner.id, "marker destroyed");
    }

    // --- Internals ---

    fn ensure_live(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(MarkerError::Destroyed(self.inner.id));
        }
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<()> {
        self.ensure_live()?;
        if self.inner.reconciling.get() {
            warn!(marker = %self.inner.id, "mutation from inside a change callback rejected");
            return Err(MarkerError::Reentrant(self.inner.id));
        }
        Ok(())
    }

    fn buffer_position_for_screen(&self, position: Point, options: ClipOptions) -> Point {
        let display = &self.inner.display;
        let clipped = display.clip_screen_position(position, options);
        display.buffer_position_for_screen_position(clipped, options)
    }

    /// Cached screen position for `end` while it is current, otherwise a
    /// live projection. Only reconciliation stores.
    fn screen_position(&self, end: End) -> Point {
        let layout_version = self.inner.display.layout_version();
        let settled = self.inner.pending.borrow().is_empty();
        let cached = self.inner.state.borrow().cache(end).get(layout_version);
        if let Some(point) = cached.filter(|_| settled) {
            trace!(marker = %self.inner.id, ?end, "screen position cache hit");
            return point;
        }
        self.project(end)
    }

    /// The last stored screen position for `end`, even if it is outdated.
    fn last_screen_position(&self, end: End) -> Point {
        let last = self.inner.state.borrow().cache(end).last();
        last.unwrap_or_else(|| self.project(end))
    }

    fn project(&self, end: End) -> Point {
        let buffer_position = match end {
            End::Head => self.inner.source.head_position(),
            End::Tail => self.inner.source.tail_position(),
        };
        self.inner
            .display
            .screen_position_for_buffer_position(buffer_position, true)
    }

    fn store_screen_positions(&self, head: Point, tail: Point) {
        let layout_version = self.inner.display.layout_version();
        let mut state = self.inner.state.borrow_mut();
        state.cache_mut(End::Head).store(head, layout_version);
        state.cache_mut(End::Tail).store(tail, layout_version);
    }

    fn start_observing(&self) {
        self.inner.state.borrow_mut().valid = self.inner.source.is_valid();
        self.store_screen_positions(self.project(End::Head), self.project(End::Tail));

        let marker = Rc::downgrade(&self.inner);
        let subscription = self.inner.source.observe(Box::new(move |change| {
            if let Some(inner) = marker.upgrade() {
                DisplayMarker { inner }.handle_source_change(change);
            }
        }));
        self.inner.state.borrow_mut().source_subscription = Some(subscription);
        self.inner.display.register_marker(self);
        debug!(marker = %self.inner.id, "marker observed");
    }

    fn stop_observing(&self) {
        let subscription = {
            let mut state = self.inner.state.borrow_mut();
            state.invalidate_screen_positions();
            state.source_subscription.take()
        };
        drop(subscription);
        self.inner.display.unregister_marker(self.inner.id);
        debug!(marker = %self.inner.id, "marker unobserved");
    }

    /// Queue `change` and drain the queue unless a drain is already running.
    ///
    /// Edits made by an observer while a change is being delivered arrive
    /// here re-entrantly; they are processed after the current one, in order.
    fn handle_source_change(&self, change: &RangeChange) {
        self.inner.pending.borrow_mut().push_back(*change);
        if self.inner.reconciling.get() {
            trace!(marker = %self.inner.id, "raw change queued behind reconciliation");
            return;
        }
        let _guard = ReconcileGuard::enter(&self.inner.reconciling);
        loop {
            let next = self.inner.pending.borrow_mut().pop_front();
            let Some(change) = next else { break };
            if let Some(event) = self.reconcile(&change) {
                let callbacks = self.inner.observers.borrow().snapshot();
                for callback in callbacks {
                    callback(&event);
                }
            }
        }
    }

    /// Re-derive both screen positions and describe what observers can see.
    ///
    /// Returns `None` when neither screen position nor validity changed.
    fn reconcile(&self, change: &RangeChange) -> Option<MarkerChange> {
        if self.is_destroyed() || !self.is_observed() {
            return None;
        }
        let old_head_screen = self.last_screen_position(End::Head);
        let old_tail_screen = self.last_screen_position(End::Tail);

        // Invalid markers keep their last known screen positions.
        let valid = change.is_valid();
        let (new_head_screen, new_tail_screen) = if valid {
            (self.project(End::Head), self.project(End::Tail))
        } else {
            (old_head_screen, old_tail_screen)
        };
        self.store_screen_positions(new_head_screen, new_tail_screen);

        let validity_changed = valid != self.inner.state.borrow().valid;
        let head_changed = old_head_screen != new_head_screen;
        let tail_changed = old_tail_screen != new_tail_screen;
        if !validity_changed && !head_changed && !tail_changed {
            trace!(marker = %self.inner.id, "raw change suppressed");
            return None;
        }

        let source = &self.inner.source;
        let event = MarkerChange {
            old_head_buffer_position: change.old_head.unwrap_or_else(|| source.head_position()),
            new_head_buffer_position: change.new_head.unwrap_or_else(|| source.head_position()),
            old_tail_buffer_position: change.old_tail.unwrap_or_else(|| source.tail_position()),
            new_tail_buffer_position: change.new_tail.unwrap_or_else(|| source.tail_position()),
            old_head_screen_position: old_head_screen,
            new_head_screen_position: new_head_screen,
            old_tail_screen_position: old_tail_screen,
            new_tail_screen_position: new_tail_screen,
            buffer_changed: change.buffer_changed,
            valid,
        };
        self.inner.state.borrow_mut().valid = valid;
        debug!(
            marker = %self.inner.id,
            head = %new_head_screen,
            tail = %new_tail_screen,
            valid,
            "marker changed"
        );
        Some(event)
    }
}

impl fmt::Debug for DisplayMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("DisplayMarker")
            .field("id", &self.inner.id)
            .field("valid", &state.valid)
            .field("destroyed", &state.destroyed)
            .field("observed", &state.source_subscription.is_some())
            .field("observers", &self.inner.observers.borrow().len())
            .finish()
    }
}
