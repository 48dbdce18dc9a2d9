//! # Simulation → Render Synchronization
//!
//! ```text
//! Tick N (simulation thread):
//!   begin_tick        previous ← current for every render proxy
//!   simulate          local writes mark subtrees dirty
//!   push events       resolve + blend(previous, current, alpha)
//!   submit            buffer → exchange, spare → writer
//!
//! Render thread:
//!   acquire → TransformMirror::apply → draw → release
//! ```
//!
//! One mutex-guarded exchange per frame. Nothing else crosses threads.

mod frame_clock;
mod mirror;
mod render_stream;

pub use frame_clock::{FixedTimestep, MAX_FRAME_DELTA};
pub use mirror::TransformMirror;
pub use render_stream::{
    render_stream, EventBuffer, RenderEvent, RenderEventKind, RenderFrame, RenderStreamReader,
    RenderStreamWriter, StreamStats, SubmitMode, TransformPayload,
};
