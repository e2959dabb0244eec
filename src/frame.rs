//! Frame cycle: apply queued pixel updates and present the result.
//!
//! The accumulating surface is owned by `FrameCycle` alone. Each call to
//! `advance` drains the update queue into it and then publishes a copy as
//! the new presented snapshot, so connection handlers reading pixels only
//! ever see complete frames.

use crate::canvas::{Frame, Pixel, PresentedFrame};
use crate::display::{DisplaySink, InputSource};
use crate::queue::UpdateReceiver;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// Outcome of one frame cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Sequence number of the presented frame, starting at 1
    pub frame: u64,
    /// Updates written to the canvas
    pub applied: usize,
    /// Updates dropped for lying outside the canvas
    pub skipped: usize,
    /// Whether the canvas was reset before applying updates
    pub cleared: bool,
}

/// Owner of the accumulating surface and sole consumer of the update queue.
pub struct FrameCycle {
    surface: Frame,
    updates: UpdateReceiver,
    presented: Arc<PresentedFrame>,
    /// Previously presented frame, reused when no reader still holds it
    spare: Option<Arc<Frame>>,
    frames: u64,
}

impl FrameCycle {
    /// The accumulating surface starts as a copy of the presented frame.
    pub fn new(updates: UpdateReceiver, presented: Arc<PresentedFrame>) -> Self {
        let surface = Frame::clone(&presented.load());
        Self {
            surface,
            updates,
            presented,
            spare: None,
            frames: 0,
        }
    }

    /// Advance one frame.
    ///
    /// Clears the surface if requested, applies every update queued at this
    /// moment in FIFO order, then publishes the result.
    pub fn advance(&mut self, clear: bool) -> FrameStats {
        if clear {
            self.surface.fill(Pixel::BLACK);
        }

        let mut applied = 0;
        let mut skipped = 0;
        for update in self.updates.drain() {
            if self.surface.set(update.x, update.y, update.pixel) {
                applied += 1;
            } else {
                skipped += 1;
            }
        }

        let snapshot = self.snapshot();
        self.spare = Some(self.presented.publish(snapshot));
        self.frames += 1;

        FrameStats {
            frame: self.frames,
            applied,
            skipped,
            cleared: clear,
        }
    }

    /// The most recently presented frame
    pub fn presented(&self) -> Arc<Frame> {
        self.presented.load()
    }

    fn snapshot(&mut self) -> Arc<Frame> {
        if let Some(mut spare) = self.spare.take() {
            if let Some(frame) = Arc::get_mut(&mut spare) {
                frame.copy_from(&self.surface);
                return spare;
            }
        }
        Arc::new(self.surface.clone())
    }
}

/// Drive `cycle` at `frame_rate` frames per second for the process lifetime.
pub async fn run_frame_loop<D, I>(mut cycle: FrameCycle, frame_rate: u32, mut sink: D, mut input: I)
where
    D: DisplaySink,
    I: InputSource,
{
    let period = Duration::from_secs(1) / frame_rate.max(1);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(frame_rate, period_us = period.as_micros() as u64, "Frame loop started");

    loop {
        interval.tick().await;

        let stats = cycle.advance(input.clear_requested());
        if stats.cleared {
            debug!(frame = stats.frame, "Canvas cleared");
        }
        trace!(
            frame = stats.frame,
            applied = stats.applied,
            skipped = stats.skipped,
            "Frame applied"
        );

        sink.present(&cycle.presented());
    }
}
