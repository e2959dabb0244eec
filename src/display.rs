//! Boundary to the display and input collaborators.
//!
//! The frame cycle hands each presented frame to a `DisplaySink` and asks an
//! `InputSource` once per tick whether the canvas should be cleared. A
//! windowed backend plugs in here; the server binary ships a headless sink
//! and a clear switch driven by `SIGUSR1`.

use crate::canvas::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Consumer of presented frames.
pub trait DisplaySink: Send {
    fn present(&mut self, frame: &Frame);
}

/// Per-tick input signals.
pub trait InputSource: Send {
    /// Whether the canvas should be reset to blank this tick.
    fn clear_requested(&mut self) -> bool;
}

/// Display sink for running without a screen.
#[derive(Debug, Default)]
pub struct HeadlessSink {
    presented: u64,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplaySink for HeadlessSink {
    fn present(&mut self, frame: &Frame) {
        self.presented += 1;
        trace!(
            frame = self.presented,
            width = frame.width(),
            height = frame.height(),
            "Screen updated"
        );
    }
}

/// One-shot clear request shared between a trigger and the frame cycle.
///
/// `request` may be called from any thread; the next tick observes it once.
#[derive(Debug, Clone, Default)]
pub struct ClearSwitch {
    requested: Arc<AtomicBool>,
}

impl ClearSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }
}

impl InputSource for ClearSwitch {
    fn clear_requested(&mut self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}

/// Request a clear every time the process receives `SIGUSR1`.
#[cfg(unix)]
pub async fn clear_on_signal(switch: ClearSwitch) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::info;

    let mut signals = signal(SignalKind::user_defined1())?;
    while signals.recv().await.is_some() {
        info!("Clear requested by SIGUSR1");
        switch.request();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_switch_is_one_shot() {
        let trigger = ClearSwitch::new();
        let mut input = trigger.clone();

        assert!(!input.clear_requested());

        trigger.request();
        trigger.request();
        assert!(input.clear_requested());
        assert!(!input.clear_requested());
    }

    #[test]
    fn test_headless_sink_counts_frames() {
        let mut sink = HeadlessSink::new();
        let frame = Frame::new(2, 2);
        sink.present(&frame);
        sink.present(&frame);
        assert_eq!(sink.presented, 2);
    }
}
