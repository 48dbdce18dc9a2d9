//! # Render Event Stream
//!
//! Double-buffered hand-off of transform updates from the simulation thread
//! to the render thread.
//!
//! ```text
//!   simulation thread                          render thread
//!   ─────────────────                          ─────────────
//!   push / retract ──► [current buffer]
//!   submit(tick, alpha) ──► pending ──────────► acquire() ──► RenderFrame
//!   next buffer ◄────────── spare  ◄────────── release(frame)
//! ```
//!
//! The two threads meet only at the exchange, once per frame. No store data
//! is shared: a frame owns its events by value.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytemuck::{Pod, Zeroable};
use keystone_shared::{Affine, Quat, Vec3};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

const NO_SLOT: u32 = u32::MAX;
/// Released buffers kept for reuse. Extra releases are dropped.
const MAX_SPARE: usize = 2;

/// What a render event tells the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderEventKind {
    /// New interpolated pose for a visible render proxy.
    Transform,
    /// The proxy is gone. The renderer may forget its state.
    Removed,
}

impl RenderEventKind {
    const COUNT: usize = 2;

    const fn slot(self) -> usize {
        match self {
            Self::Transform => 0,
            Self::Removed => 1,
        }
    }
}

/// Absolute pose carried by an event.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TransformPayload {
    /// World position.
    pub position: Vec3,
    /// World rotation.
    pub rotation: Quat,
    /// World 4x3 matrix.
    pub matrix: Affine,
}

impl Default for TransformPayload {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            matrix: Affine::IDENTITY,
        }
    }
}

/// One entry of a render frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderEvent {
    /// Slot index of the entity the event is about.
    pub entity_index: u32,
    /// Event kind.
    pub kind: RenderEventKind,
    /// Pose data. Default for [`RenderEventKind::Removed`].
    pub payload: TransformPayload,
}

impl RenderEvent {
    /// A transform update.
    #[must_use]
    pub const fn transform(entity_index: u32, payload: TransformPayload) -> Self {
        Self {
            entity_index,
            kind: RenderEventKind::Transform,
            payload,
        }
    }

    /// A removal notice.
    #[must_use]
    pub fn removed(entity_index: u32) -> Self {
        Self {
            entity_index,
            kind: RenderEventKind::Removed,
            payload: TransformPayload::default(),
        }
    }
}

/// How `submit` behaves when the render thread has not caught up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    /// Wait for the render thread to take the previous frame and hand back a
    /// spare buffer. At most one frame is ever in flight.
    #[default]
    Block,
    /// Take back an unconsumed pending frame and replace it. Never waits.
    Replace,
}

/// Event list deduplicated per `(entity_index, kind)`.
///
/// Pushing an event for a key that is already present overwrites it in place.
pub struct EventBuffer {
    events: Vec<RenderEvent>,
    /// `entity_index * 2 + kind` → position in `events`, or `NO_SLOT`.
    lookup: Vec<u32>,
}

impl EventBuffer {
    /// Creates a buffer sized for `events` entries over `entities` slots.
    #[must_use]
    pub fn with_capacity(events: usize, entities: usize) -> Self {
        Self {
            events: Vec::with_capacity(events),
            lookup: vec![NO_SLOT; entities * RenderEventKind::COUNT],
        }
    }

    fn key(entity_index: u32, kind: RenderEventKind) -> usize {
        entity_index as usize * RenderEventKind::COUNT + kind.slot()
    }

    /// Inserts or overwrites the event for its key.
    #[allow(clippy::cast_possible_truncation)]
    pub fn push(&mut self, event: RenderEvent) {
        let key = Self::key(event.entity_index, event.kind);
        if key >= self.lookup.len() {
            self.lookup.resize(key + 1, NO_SLOT);
        }

        match self.lookup[key] {
            NO_SLOT => {
                self.lookup[key] = self.events.len() as u32;
                self.events.push(event);
            }
            slot => self.events[slot as usize] = event,
        }
    }

    /// Drops the event for a key. Returns `false` if none was pending.
    #[allow(clippy::cast_possible_truncation)]
    pub fn retract(&mut self, entity_index: u32, kind: RenderEventKind) -> bool {
        let key = Self::key(entity_index, kind);
        let Some(&slot) = self.lookup.get(key) else {
            return false;
        };
        if slot == NO_SLOT {
            return false;
        }

        self.lookup[key] = NO_SLOT;
        self.events.swap_remove(slot as usize);
        if let Some(moved) = self.events.get(slot as usize) {
            self.lookup[Self::key(moved.entity_index, moved.kind)] = slot;
        }
        true
    }

    /// Pending event for a key.
    #[must_use]
    pub fn get(&self, entity_index: u32, kind: RenderEventKind) -> Option<&RenderEvent> {
        let slot = *self.lookup.get(Self::key(entity_index, kind))?;
        self.events.get(slot as usize)
    }

    /// All events, in first-push order except where retraction reordered them.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &[RenderEvent] {
        &self.events
    }

    /// Number of events.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if no event is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Empties the buffer, keeping its allocations.
    pub fn clear(&mut self) {
        for event in &self.events {
            self.lookup[Self::key(event.entity_index, event.kind)] = NO_SLOT;
        }
        self.events.clear();
    }
}

/// A submitted batch of events.
pub struct RenderFrame {
    tick: u64,
    alpha: f32,
    buffer: EventBuffer,
}

impl RenderFrame {
    /// Simulation tick the frame was produced in.
    #[inline]
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Interpolation factor the events were blended with.
    #[inline]
    #[must_use]
    pub const fn alpha(&self) -> f32 {
        self.alpha
    }

    /// The frame's events.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &[RenderEvent] {
        self.buffer.events()
    }

    /// Number of events.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True if the frame carries no events.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Counters kept by the exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Frames handed to the exchange.
    pub submitted: u64,
    /// Frames taken back unconsumed in [`SubmitMode::Replace`].
    pub replaced: u64,
    /// Frames the render side acquired.
    pub acquired: u64,
}

struct Exchange {
    pending: Option<RenderFrame>,
    spare: Vec<EventBuffer>,
    closed: bool,
    stats: StreamStats,
}

struct Shared {
    state: Mutex<Exchange>,
    /// Signalled when a frame becomes pending or the stream closes.
    frame_ready: Condvar,
    /// Signalled when the pending slot empties or the stream closes.
    slot_free: Condvar,
}

impl Shared {
    fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            tracing::debug!("render stream closed");
        }
        drop(state);
        self.frame_ready.notify_all();
        self.slot_free.notify_all();
    }
}

/// Creates a connected writer/reader pair.
///
/// `events_capacity` pre-sizes each buffer, `entity_capacity` sizes the
/// dedup lookup.
#[must_use]
pub fn render_stream(
    events_capacity: usize,
    entity_capacity: usize,
    mode: SubmitMode,
) -> (RenderStreamWriter, RenderStreamReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(Exchange {
            pending: None,
            spare: vec![EventBuffer::with_capacity(events_capacity, entity_capacity)],
            closed: false,
            stats: StreamStats::default(),
        }),
        frame_ready: Condvar::new(),
        slot_free: Condvar::new(),
    });

    let writer = RenderStreamWriter {
        shared: Arc::clone(&shared),
        current: EventBuffer::with_capacity(events_capacity, entity_capacity),
        mode,
        events_capacity,
        entity_capacity,
    };
    let reader = RenderStreamReader { shared };
    (writer, reader)
}

/// Simulation side of the stream.
pub struct RenderStreamWriter {
    shared: Arc<Shared>,
    current: EventBuffer,
    mode: SubmitMode,
    events_capacity: usize,
    entity_capacity: usize,
}

impl RenderStreamWriter {
    /// Submit behaviour.
    #[inline]
    #[must_use]
    pub const fn mode(&self) -> SubmitMode {
        self.mode
    }

    /// Adds or overwrites an event in the frame being built.
    #[inline]
    pub fn push(&mut self, event: RenderEvent) {
        self.current.push(event);
    }

    /// Drops an event from the frame being built.
    #[inline]
    pub fn retract(&mut self, entity_index: u32, kind: RenderEventKind) -> bool {
        self.current.retract(entity_index, kind)
    }

    /// The frame being built.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &EventBuffer {
        &self.current
    }

    /// Hands the frame being built to the render thread.
    ///
    /// In [`SubmitMode::Block`] this waits until the previous frame was taken.
    /// A released buffer is reused when one came back; frames the render side
    /// dropped without releasing are replaced by a fresh allocation.
    ///
    /// # Errors
    ///
    /// [`StoreError::StreamClosed`] if either side closed the stream.
    pub fn submit(&mut self, tick: u64, alpha: f32) -> StoreResult<()> {
        let mut state = self.shared.state.lock();

        let next = match self.mode {
            SubmitMode::Block => {
                while !state.closed && state.pending.is_some() {
                    self.shared.slot_free.wait(&mut state);
                }
                if state.closed {
                    return Err(StoreError::StreamClosed);
                }
                state.spare.pop()
            }
            SubmitMode::Replace => {
                if state.closed {
                    return Err(StoreError::StreamClosed);
                }
                if let Some(stale) = state.pending.take() {
                    state.stats.replaced += 1;
                    tracing::warn!(stale_tick = stale.tick, tick, "render thread behind, replacing pending frame");
                    let mut buffer = stale.buffer;
                    buffer.clear();
                    Some(buffer)
                } else {
                    state.spare.pop()
                }
            }
        };
        let next = next
            .unwrap_or_else(|| EventBuffer::with_capacity(self.events_capacity, self.entity_capacity));

        let buffer = std::mem::replace(&mut self.current, next);
        tracing::debug!(tick, events = buffer.len(), "render frame submitted");
        state.pending = Some(RenderFrame { tick, alpha, buffer });
        state.stats.submitted += 1;
        drop(state);

        self.shared.frame_ready.notify_one();
        Ok(())
    }

    /// Exchange counters.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.shared.state.lock().stats
    }

    /// Closes the stream. A blocked reader wakes with `None`.
    pub fn close(&self) {
        self.shared.close();
    }

    /// True once either side closed the stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl Drop for RenderStreamWriter {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Render side of the stream.
pub struct RenderStreamReader {
    shared: Arc<Shared>,
}

impl RenderStreamReader {
    fn take_pending(&self, state: &mut Exchange) -> Option<RenderFrame> {
        let frame = state.pending.take()?;
        state.stats.acquired += 1;
        self.shared.slot_free.notify_one();
        Some(frame)
    }

    /// Waits for the next frame.
    ///
    /// Returns `None` once the stream is closed and nothing is pending.
    pub fn acquire(&self) -> Option<RenderFrame> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(frame) = self.take_pending(&mut state) {
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            self.shared.frame_ready.wait(&mut state);
        }
    }

    /// Takes the pending frame without waiting.
    pub fn try_acquire(&self) -> Option<RenderFrame> {
        let mut state = self.shared.state.lock();
        self.take_pending(&mut state)
    }

    /// Waits up to `timeout` for the next frame.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<RenderFrame> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(frame) = self.take_pending(&mut state) {
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            if self
                .shared
                .frame_ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return self.take_pending(&mut state);
            }
        }
    }

    /// Returns a consumed frame's buffer to the writer.
    pub fn release(&self, frame: RenderFrame) {
        let mut buffer = frame.buffer;
        buffer.clear();
        let mut state = self.shared.state.lock();
        if state.spare.len() < MAX_SPARE {
            state.spare.push(buffer);
        }
    }

    /// Closes the stream. A blocked writer fails with [`StoreError::StreamClosed`].
    pub fn close(&self) {
        self.shared.close();
    }

    /// True once either side closed the stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl Drop for RenderStreamReader {
    fn drop(&mut self) {
        self.shared.close();
    }
}
