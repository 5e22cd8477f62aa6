//! Top-level orchestration: calibrate if needed, then track until stable.
//!
//! A [`Locator`] owns exactly one active session at a time. Frames and
//! clicks are routed to it; when calibration completes the locator switches
//! to tracking with the fresh homography, and when tracking settles it
//! records the located world point.

use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use image::RgbImage;

use crate::calibration::{CalibrationError, CalibrationSession, ClickOutcome};
use crate::config::LocatorConfig;
use crate::frame_slot::{FrameReceiver, RecvError};
use crate::geometry::{PixelPoint, WorldPoint};
use crate::homography::{HomographyStore, StoreError};
use crate::tracking::{TrackingSession, TrackingState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Calibration,
    Tracking,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Calibration => f.write_str("calibration"),
            Stage::Tracking => f.write_str("tracking"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("{stage} did not finish within {elapsed:?}")]
    Timeout { stage: Stage, elapsed: Duration },
    #[error("frame source closed")]
    FrameSourceClosed,
    #[error("click source closed before calibration finished")]
    ClickSourceClosed,
    #[error("no usable homography and calibration is disabled: {0}")]
    MissingHomography(StoreError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Externally visible phase of a [`Locator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Calibrating,
    Tracking,
    /// Terminal.
    Located(WorldPoint),
}

enum Session {
    Calibrating(CalibrationSession),
    Tracking(TrackingSession),
    Located(WorldPoint),
}

pub struct Locator {
    config: LocatorConfig,
    session: Session,
    stage_started: Instant,
}

impl Locator {
    /// Load the stored homography and start tracking, or start calibration
    /// when none is usable and `calibrate_on_missing` is set.
    pub fn start(
        config: LocatorConfig,
        store: Box<dyn HomographyStore>,
    ) -> Result<Self, LocateError> {
        let session = match TrackingSession::from_store(config.tracking.clone(), store.as_ref()) {
            Ok(tracking) => {
                tracing::info!("Loaded homography, starting tracking");
                Session::Tracking(tracking)
            }
            Err(e) if config.calibrate_on_missing => {
                tracing::info!("No usable homography ({}), starting calibration", e);
                Session::Calibrating(CalibrationSession::new(&config.calibration, store))
            }
            Err(e) => return Err(LocateError::MissingHomography(e)),
        };
        Ok(Self {
            config,
            session,
            stage_started: Instant::now(),
        })
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        match &self.session {
            Session::Calibrating(_) => Mode::Calibrating,
            Session::Tracking(_) => Mode::Tracking,
            Session::Located(p) => Mode::Located(*p),
        }
    }

    pub fn calibration(&self) -> Option<&CalibrationSession> {
        match &self.session {
            Session::Calibrating(s) => Some(s),
            _ => None,
        }
    }

    pub fn tracking(&self) -> Option<&TrackingSession> {
        match &self.session {
            Session::Tracking(s) => Some(s),
            _ => None,
        }
    }

    pub fn handle_frame(&mut self, frame: &RgbImage) -> Mode {
        match &mut self.session {
            Session::Calibrating(s) => {
                s.handle_frame(frame);
            }
            Session::Tracking(s) => {
                if s.handle_frame(frame) == TrackingState::Stable {
                    if let Some(p) = s.target_location() {
                        tracing::info!("Target located at {}", p);
                        self.session = Session::Located(p);
                    }
                }
            }
            Session::Located(_) => {}
        }
        self.mode()
    }

    /// Route a display-space click. Outside calibration clicks are ignored.
    pub fn handle_click(&mut self, click: PixelPoint) -> Result<Mode, LocateError> {
        let Session::Calibrating(s) = &mut self.session else {
            tracing::debug!("Ignoring click {} outside calibration", click);
            return Ok(self.mode());
        };
        if let ClickOutcome::Completed(h) = s.handle_click(click)? {
            tracing::info!("Calibration complete, starting tracking");
            self.session = Session::Tracking(TrackingSession::new(self.config.tracking.clone(), h));
            self.stage_started = Instant::now();
        }
        Ok(self.mode())
    }

    fn stage_deadline(&self) -> Option<(Stage, Instant)> {
        let (stage, timeout) = match self.session {
            Session::Calibrating(_) => (Stage::Calibration, self.config.calibration_timeout()),
            Session::Tracking(_) => (Stage::Tracking, self.config.tracking_timeout()),
            Session::Located(_) => return None,
        };
        // A deadline past the clock's range is no deadline.
        let deadline = self.stage_started.checked_add(timeout?)?;
        Some((stage, deadline))
    }

    /// Drain pending clicks into the active session.
    fn pump_clicks(&mut self, clicks: &Receiver<PixelPoint>) -> Result<(), LocateError> {
        loop {
            match clicks.try_recv() {
                Ok(click) => match self.handle_click(click) {
                    Ok(_) => {}
                    // The session already rolled back; the operator clicks again.
                    Err(LocateError::Calibration(e)) => {
                        tracing::warn!("Click {} rejected: {}", click, e);
                    }
                    Err(e) => return Err(e),
                },
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    if matches!(self.session, Session::Calibrating(_)) {
                        return Err(LocateError::ClickSourceClosed);
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Block until the target is located, a stage times out, or a source closes.
    ///
    /// Waits for frames at most `poll_interval` at a time so clicks and
    /// deadlines are serviced even when the camera stalls.
    pub fn run(
        &mut self,
        frames: &FrameReceiver<RgbImage>,
        clicks: &Receiver<PixelPoint>,
    ) -> Result<WorldPoint, LocateError> {
        loop {
            if let Session::Located(p) = self.session {
                return Ok(p);
            }
            self.pump_clicks(clicks)?;
            if matches!(self.session, Session::Located(_)) {
                continue;
            }

            let now = Instant::now();
            let poll = self.config.poll_interval();
            let mut wait_until = now.checked_add(poll).unwrap_or(now);
            if let Some((stage, deadline)) = self.stage_deadline() {
                if now >= deadline {
                    let elapsed = now - self.stage_started;
                    tracing::warn!("{} timed out after {:?}", stage, elapsed);
                    return Err(LocateError::Timeout { stage, elapsed });
                }
                wait_until = wait_until.min(deadline);
            }

            match frames.recv_deadline(wait_until) {
                Ok(frame) => {
                    self.handle_frame(&frame);
                }
                Err(RecvError::Timeout) => {}
                Err(RecvError::Disconnected) => return Err(LocateError::FrameSourceClosed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalibrationConfig;
    use crate::frame_slot::latest_frame_slot;
    use crate::homography::{Homography, MemoryStore};
    use crate::test_utils::frame_with_square;
    use approx::assert_relative_eq;
    use image::Rgb;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    const BG: [u8; 3] = [0, 0, 0];
    const TARGET: [u8; 3] = [255, 0, 118];

    fn half_scale() -> Homography {
        Homography::from_rows([[0.5, 0.0, 0.0], [0.0, 0.5, 0.0], [0.0, 0.0, 1.0]]).unwrap()
    }

    /// Four targets whose clicks below make pixel → world a half-scale map.
    fn config() -> LocatorConfig {
        LocatorConfig {
            calibration: CalibrationConfig {
                world_points: vec![[0.0, 140.0], [0.0, 60.0], [40.0, 100.0], [-40.0, 100.0]],
                ..CalibrationConfig::default()
            },
            poll_interval_ms: 5,
            ..LocatorConfig::default()
        }
    }

    const CLICKS: [(f64, f64); 4] = [(0.0, 280.0), (0.0, 120.0), (80.0, 200.0), (-80.0, 200.0)];

    /// Publish `frame` until told to stop, then close the source.
    fn spawn_camera(
        frame: RgbImage,
        tx: crate::frame_slot::FrameSender<RgbImage>,
    ) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let start = Instant::now();
            while !flag.load(Ordering::Relaxed) && start.elapsed() < Duration::from_secs(10) {
                tx.publish(frame.clone());
                thread::sleep(Duration::from_millis(1));
            }
        });
        (stop, handle)
    }

    #[test]
    fn stored_homography_goes_straight_to_tracking() {
        let store = MemoryStore::with_homography(half_scale());
        let mut locator = Locator::start(config(), Box::new(store)).unwrap();
        assert_eq!(locator.mode(), Mode::Tracking);

        let frame = frame_with_square(64, 128, BG, TARGET, 24, 96, 9);
        for _ in 0..4 {
            assert_eq!(locator.handle_frame(&frame), Mode::Tracking);
        }
        assert_eq!(
            locator.handle_frame(&frame),
            Mode::Located(WorldPoint::new(12.0, 48.0))
        );
    }

    #[test]
    fn missing_homography_without_fallback_fails() {
        let cfg = LocatorConfig {
            calibrate_on_missing: false,
            ..config()
        };
        assert!(matches!(
            Locator::start(cfg, Box::new(MemoryStore::new())),
            Err(LocateError::MissingHomography(StoreError::Missing))
        ));
    }

    #[test]
    fn calibration_hands_over_to_tracking() {
        let mut locator = Locator::start(config(), Box::new(MemoryStore::new())).unwrap();
        assert_eq!(locator.mode(), Mode::Calibrating);
        assert!(locator.tracking().is_none());

        for &(x, y) in &CLICKS[..3] {
            assert_eq!(
                locator.handle_click(PixelPoint::new(x, y)).unwrap(),
                Mode::Calibrating
            );
        }
        assert_eq!(locator.calibration().unwrap().correspondences().len(), 3);
        let (x, y) = CLICKS[3];
        assert_eq!(
            locator.handle_click(PixelPoint::new(x, y)).unwrap(),
            Mode::Tracking
        );

        let w = locator
            .tracking()
            .unwrap()
            .homography()
            .pixel_to_world(PixelPoint::new(24.0, 96.0))
            .unwrap();
        assert_relative_eq!(w.x, 12.0, epsilon = 1e-6);
        assert_relative_eq!(w.y, 48.0, epsilon = 1e-6);

        // Clicks after calibration do nothing.
        assert_eq!(
            locator.handle_click(PixelPoint::new(1.0, 1.0)).unwrap(),
            Mode::Tracking
        );
    }

    #[test]
    fn run_calibrates_then_locates() {
        let mut locator = Locator::start(config(), Box::new(MemoryStore::new())).unwrap();
        let (click_tx, click_rx) = crossbeam_channel::unbounded();
        for &(x, y) in &CLICKS {
            click_tx.send(PixelPoint::new(x, y)).unwrap();
        }
        let (tx, rx) = latest_frame_slot();
        let (stop, camera) =
            spawn_camera(frame_with_square(64, 128, BG, TARGET, 24, 96, 9), tx);

        let located = locator.run(&rx, &click_rx);
        stop.store(true, Ordering::Relaxed);
        camera.join().unwrap();

        let p = located.unwrap();
        assert_relative_eq!(p.x, 12.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 48.0, epsilon = 1e-6);
        assert!(matches!(locator.mode(), Mode::Located(_)));
    }

    #[test]
    fn run_times_out_when_target_never_appears() {
        let cfg = LocatorConfig {
            tracking_timeout_s: Some(0.1),
            ..config()
        };
        let store = MemoryStore::with_homography(half_scale());
        let mut locator = Locator::start(cfg, Box::new(store)).unwrap();
        let (_click_tx, click_rx) = crossbeam_channel::unbounded::<PixelPoint>();
        let (tx, rx) = latest_frame_slot();
        let (stop, camera) = spawn_camera(RgbImage::from_pixel(32, 32, Rgb(BG)), tx);

        let res = locator.run(&rx, &click_rx);
        stop.store(true, Ordering::Relaxed);
        camera.join().unwrap();

        match res {
            Err(LocateError::Timeout { stage, elapsed }) => {
                assert_eq!(stage, Stage::Tracking);
                assert!(elapsed >= Duration::from_millis(100));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn huge_timeout_means_no_deadline() {
        // Representable as a Duration but far past what an Instant can hold.
        let cfg = LocatorConfig {
            tracking_timeout_s: Some(1e19),
            ..config()
        };
        cfg.validate().unwrap();
        let store = MemoryStore::with_homography(half_scale());
        let mut locator = Locator::start(cfg, Box::new(store)).unwrap();
        assert_eq!(locator.stage_deadline(), None);

        let (_click_tx, click_rx) = crossbeam_channel::unbounded::<PixelPoint>();
        let (tx, rx) = latest_frame_slot();
        let (stop, camera) =
            spawn_camera(frame_with_square(64, 128, BG, TARGET, 24, 96, 9), tx);
        let located = locator.run(&rx, &click_rx);
        stop.store(true, Ordering::Relaxed);
        camera.join().unwrap();
        assert_eq!(located.unwrap(), WorldPoint::new(12.0, 48.0));
    }

    #[test]
    fn unrepresentable_timeout_does_not_panic() {
        // Bypasses validation the way a hand-built config would.
        let cfg = LocatorConfig {
            tracking_timeout_s: Some(1e20),
            ..config()
        };
        let store = MemoryStore::with_homography(half_scale());
        let mut locator = Locator::start(cfg, Box::new(store)).unwrap();
        assert_eq!(locator.stage_deadline(), None);

        let (_click_tx, click_rx) = crossbeam_channel::unbounded::<PixelPoint>();
        let (tx, rx) = latest_frame_slot();
        tx.publish(frame_with_square(64, 128, BG, TARGET, 24, 96, 9));
        drop(tx);
        assert!(matches!(
            locator.run(&rx, &click_rx),
            Err(LocateError::FrameSourceClosed)
        ));
    }

    #[test]
    fn run_reports_closed_sources() {
        let store = MemoryStore::with_homography(half_scale());
        let mut locator = Locator::start(config(), Box::new(store)).unwrap();
        let (_click_tx, click_rx) = crossbeam_channel::unbounded::<PixelPoint>();
        let (tx, rx) = latest_frame_slot::<RgbImage>();
        drop(tx);
        assert!(matches!(
            locator.run(&rx, &click_rx),
            Err(LocateError::FrameSourceClosed)
        ));

        let mut locator = Locator::start(config(), Box::new(MemoryStore::new())).unwrap();
        let (click_tx, click_rx) = crossbeam_channel::unbounded::<PixelPoint>();
        click_tx.send(PixelPoint::new(0.0, 280.0)).unwrap();
        drop(click_tx);
        let (_tx, rx) = latest_frame_slot::<RgbImage>();
        assert!(matches!(
            locator.run(&rx, &click_rx),
            Err(LocateError::ClickSourceClosed)
        ));
        assert_eq!(locator.calibration().unwrap().correspondences().len(), 1);
    }
}
