//! Camera capture and classification loop.
//!
//! `CaptureCore::tick` does one grab/classify/submit step and is driven
//! either directly (tests, `self-check`) or by `CaptureLoop` on its own
//! thread. Classification never blocks on the sort sequence: detections go
//! through a `DetectionSink`, which answers immediately.
use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use sorter_traits::clock::Clock;
use sorter_traits::{Classifier, FrameSource};
use tracing::{debug, info, trace, warn};

use crate::config::CaptureCfg;
use crate::hw_error::hw_message;
use crate::orchestrator::{Rejection, SortHandle, Submission};
use crate::publisher::StatePublisher;
use crate::status::{Component, Health};
use crate::types::DetectionEvent;
use crate::util::SHUTDOWN_POLL;

/// Where accepted detections go.
pub trait DetectionSink: Send {
    fn submit(&self, event: DetectionEvent) -> Submission;
}

impl DetectionSink for SortHandle {
    fn submit(&self, event: DetectionEvent) -> Submission {
        SortHandle::submit(self, event)
    }
}

impl DetectionSink for xch::Sender<DetectionEvent> {
    fn submit(&self, event: DetectionEvent) -> Submission {
        match self.try_send(event) {
            Ok(()) => Submission::Accepted,
            Err(_) => Submission::Rejected(Rejection::Closed),
        }
    }
}

/// What one `tick` did.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Grab failed; wait this long before trying again.
    Backoff(Duration),
    /// Frame dropped by frame skipping or the inference rate bound.
    Skipped,
    /// Classified; nothing (confident enough) in view.
    Empty,
    /// Same label as the last submission with no empty frame in between.
    Suppressed(String),
    Submitted(String, Submission),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: u64,
    pub classified: u64,
    pub submitted: u64,
    pub grab_failures: u64,
    pub reopens: u64,
}

pub struct CaptureCore<F, K, D, C> {
    source: F,
    classifier: K,
    sink: D,
    publisher: StatePublisher,
    cfg: CaptureCfg,
    clock: C,
    frame_counter: u64,
    last_inference: Option<Instant>,
    consecutive_failures: u32,
    last_submitted: Option<String>,
    stats: CaptureStats,
}

impl<F, K, D, C> CaptureCore<F, K, D, C>
where
    F: FrameSource,
    K: Classifier,
    D: DetectionSink,
    C: Clock,
{
    pub fn new(
        source: F,
        classifier: K,
        sink: D,
        publisher: StatePublisher,
        cfg: CaptureCfg,
        clock: C,
    ) -> Self {
        Self {
            source,
            classifier,
            sink,
            publisher,
            cfg,
            clock,
            frame_counter: 0,
            last_inference: None,
            consecutive_failures: 0,
            last_submitted: None,
            stats: CaptureStats::default(),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn tick(&mut self) -> Tick {
        let frame = match self.source.grab() {
            Ok(f) => f,
            Err(e) => return self.grab_failed(&hw_message(&*e)),
        };
        if self.consecutive_failures > 0 {
            info!(after = self.consecutive_failures, "camera recovered");
            self.consecutive_failures = 0;
        }
        self.publisher.set_health(Component::Capture, Health::Ok);
        self.stats.frames += 1;
        self.frame_counter = self.frame_counter.wrapping_add(1);

        if self.frame_counter % (u64::from(self.cfg.skip_frames) + 1) != 0 {
            return Tick::Skipped;
        }
        let now = self.clock.now();
        if let Some(last) = self.last_inference {
            if now.saturating_duration_since(last) < self.cfg.min_inference_interval {
                return Tick::Skipped;
            }
        }
        self.last_inference = Some(now);

        let frame = frame.downscale(self.cfg.frame_width);
        let result = match self.classifier.classify(&frame) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %hw_message(&*e), "classification failed; frame skipped");
                return Tick::Skipped;
            }
        };
        self.stats.classified += 1;

        let Some(c) = result.filter(|c| c.confidence >= self.cfg.min_confidence) else {
            if self.last_submitted.take().is_some() {
                trace!("scene cleared");
            }
            return Tick::Empty;
        };
        if self.cfg.suppress_repeats && self.last_submitted.as_deref() == Some(c.label.as_str()) {
            return Tick::Suppressed(c.label);
        }

        let label = c.label.clone();
        let submission = self.sink.submit(DetectionEvent::new(c.label, c.confidence));
        match &submission {
            Submission::Accepted => {
                debug!(%label, confidence = c.confidence, "detection submitted");
                self.stats.submitted += 1;
                self.last_submitted = Some(label.clone());
            }
            Submission::Rejected(r) => trace!(%label, reason = ?r, "detection not taken"),
        }
        Tick::Submitted(label, submission)
    }

    fn grab_failed(&mut self, message: &str) -> Tick {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.stats.grab_failures += 1;
        warn!(failures = self.consecutive_failures, error = %message, "frame grab failed");
        self.publisher.set_health(
            Component::Capture,
            Health::Error(format!("camera unavailable: {message}")),
        );
        if self.consecutive_failures % self.cfg.reopen_after.max(1) == 0 {
            self.stats.reopens += 1;
            match self.source.reopen() {
                Ok(()) => info!("camera reopened"),
                Err(e) => warn!(error = %hw_message(&*e), "camera reopen failed"),
            }
        }
        Tick::Backoff(self.cfg.retry_backoff)
    }
}

/// Runs a `CaptureCore` on its own thread until shut down or dropped.
pub struct CaptureLoop {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<CaptureStats>>,
    stats: Option<CaptureStats>,
}

impl CaptureLoop {
    pub fn spawn<F, K, D, C>(mut core: CaptureCore<F, K, D, C>) -> Self
    where
        F: FrameSource + Send + 'static,
        K: Classifier + Send + 'static,
        D: DetectionSink + 'static,
        C: Clock + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let join_handle = std::thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    if let Tick::Backoff(d) = core.tick() {
                        let keep = flag.clone();
                        core.clock
                            .sleep_while(d, SHUTDOWN_POLL, &move || !keep.load(Ordering::Relaxed));
                    }
                }
                trace!("capture loop exiting cleanly");
                core.stats()
            });
        let join_handle = match join_handle {
            Ok(j) => Some(j),
            Err(e) => {
                warn!(error = %e, "failed to spawn capture loop");
                None
            }
        };
        Self {
            shutdown,
            join_handle,
            stats: None,
        }
    }

    /// Stop the loop and return its counters. Idempotent.
    pub fn shutdown(&mut self) -> CaptureStats {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(h) = self.join_handle.take() {
            match h.join() {
                Ok(s) => self.stats = Some(s),
                Err(e) => warn!(?e, "capture loop panicked during shutdown"),
            }
        }
        self.stats.unwrap_or_default()
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
