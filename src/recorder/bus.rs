// Frame bus
//
// Fans each captured frame out from the capture thread. The recording sink
// is called synchronously and sees every frame in order; preview receivers
// share a single latest-frame slot, so a receiver that falls behind skips
// frames instead of holding up capture.

use std::sync::Arc;
use tokio::sync::watch;

use super::overlay::{self, OverlayStyle, RecordingBadge};
use super::types::{Frame, PreviewFrame};

/// Consumer that must see every frame
pub trait RecordingSink {
    /// Handle one frame; failures are the sink's own business
    fn deliver(&mut self, frame: &Frame);

    /// Status to draw on preview frames, if any
    fn badge(&self) -> Option<RecordingBadge>;
}

/// Preview receiver; `borrow()` always yields the newest frame
pub type PreviewReceiver = watch::Receiver<Option<PreviewFrame>>;

pub struct FrameBus {
    preview: watch::Sender<Option<PreviewFrame>>,
    style: OverlayStyle,
    dispatched: u64,
}

impl FrameBus {
    pub fn new(style: OverlayStyle) -> Self {
        let (preview, _) = watch::channel(None);
        Self {
            preview,
            style,
            dispatched: 0,
        }
    }

    /// Add a preview receiver
    pub fn subscribe(&self) -> PreviewReceiver {
        self.preview.subscribe()
    }

    pub fn preview_receivers(&self) -> usize {
        self.preview.receiver_count()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Deliver `frame` to the sink, then publish it for preview
    ///
    /// Never blocks: publishing replaces whatever preview frame has not been
    /// picked up yet. The overlay is only rendered when someone is watching.
    pub fn dispatch(&mut self, frame: Frame, sink: &mut dyn RecordingSink) -> Option<PreviewFrame> {
        sink.deliver(&frame);
        self.dispatched += 1;

        if self.preview.receiver_count() == 0 {
            return None;
        }

        let preview = match sink.badge() {
            Some(badge) => overlay::render(&frame, &badge, &self.style),
            None => frame,
        };
        let preview: PreviewFrame = Arc::new(preview);
        self.preview.send_replace(Some(preview.clone()));
        Some(preview)
    }
}
