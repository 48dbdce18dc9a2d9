//! # Transform Mirror
//!
//! Render-side "last known state" per entity slot, fed by render frames.

use super::render_stream::{RenderEventKind, RenderFrame, TransformPayload};

/// Last pose received for every entity slot the renderer knows about.
#[derive(Default)]
pub struct TransformMirror {
    entries: Vec<Option<TransformPayload>>,
    live: usize,
    last_tick: Option<u64>,
}

impl TransformMirror {
    /// Creates a mirror pre-sized for `capacity` entity slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity],
            live: 0,
            last_tick: None,
        }
    }

    /// Applies a frame: transforms replace the stored pose, removals forget it.
    pub fn apply(&mut self, frame: &RenderFrame) {
        for event in frame.events() {
            let index = event.entity_index as usize;
            match event.kind {
                RenderEventKind::Transform => {
                    if index >= self.entries.len() {
                        self.entries.resize(index + 1, None);
                    }
                    if self.entries[index].replace(event.payload).is_none() {
                        self.live += 1;
                    }
                }
                RenderEventKind::Removed => {
                    if let Some(entry) = self.entries.get_mut(index) {
                        if entry.take().is_some() {
                            self.live -= 1;
                        }
                    }
                }
            }
        }
        self.last_tick = Some(frame.tick());
    }

    /// Last known pose of an entity slot.
    #[must_use]
    pub fn get(&self, entity_index: u32) -> Option<&TransformPayload> {
        self.entries.get(entity_index as usize)?.as_ref()
    }

    /// Number of slots with a known pose.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// True if no pose is known.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Tick of the last applied frame.
    #[must_use]
    pub const fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{render_stream, RenderEvent, SubmitMode};
    use keystone_shared::Vec3;

    #[test]
    fn test_apply_replaces_and_forgets() {
        let (mut writer, reader) = render_stream(4, 4, SubmitMode::Block);
        let mut mirror = TransformMirror::with_capacity(2);

        let pose = TransformPayload {
            position: Vec3::new(1.0, 2.0, 3.0),
            ..TransformPayload::default()
        };
        writer.push(RenderEvent::transform(0, pose));
        writer.push(RenderEvent::transform(5, pose));
        writer.submit(1, 0.0).unwrap();

        let frame = reader.acquire().unwrap();
        mirror.apply(&frame);
        reader.release(frame);
        assert_eq!(mirror.len(), 2);
        assert_eq!(mirror.get(5).map(|p| p.position), Some(Vec3::new(1.0, 2.0, 3.0)));

        writer.push(RenderEvent::removed(0));
        writer.submit(2, 0.0).unwrap();
        let frame = reader.acquire().unwrap();
        mirror.apply(&frame);

        assert_eq!(mirror.len(), 1);
        assert!(mirror.get(0).is_none());
        assert_eq!(mirror.last_tick(), Some(2));
    }
}
