//! End-to-end: calibrate from clicks, persist, reload, and track to a stable point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use image::{Rgb, RgbImage};

use laserloc::{
    latest_frame_slot, verification_grid, CalibrationConfig, CalibrationSession, ClickOutcome,
    GridSpec, HomographyStore, JsonFileStore, Locator, LocatorConfig, Mode, PixelPoint,
    TrackerConfig, TrackingSession, TrackingState, WorldPoint,
};

const TARGET: [u8; 3] = [255, 0, 118];

/// Ground truth camera model: world (x, y) → pixel.
fn world_to_pixel(x: f64, y: f64) -> (f64, f64) {
    let depth = 1.0 + y / 400.0;
    (320.0 + 3.0 * x / depth, 470.0 - 800.0 * (1.0 - 1.0 / depth))
}

fn frame_with_target(px: f64, py: f64) -> RgbImage {
    let mut frame = RgbImage::from_pixel(640, 480, Rgb([20, 30, 25]));
    let (cx, cy) = (px.round() as i64, py.round() as i64);
    for y in (cy - 5)..=(cy + 5) {
        for x in (cx - 5)..=(cx + 5) {
            frame.put_pixel(x as u32, y as u32, Rgb(TARGET));
        }
    }
    frame
}

#[test]
fn calibrate_persist_reload_and_track() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("homography.json");

    let calib_cfg = CalibrationConfig::default();
    let mut calibration = CalibrationSession::new(&calib_cfg, Box::new(JsonFileStore::new(&path)));
    calibration.handle_frame(&RgbImage::new(640, 480));
    let mut homography = None;
    for target in calib_cfg.targets() {
        assert_eq!(calibration.next_target(), Some(target));
        let (px, py) = world_to_pixel(target.x, target.y);
        match calibration.handle_click(PixelPoint::new(px, py)).unwrap() {
            ClickOutcome::Accepted { world, .. } => assert_eq!(world, target),
            ClickOutcome::Completed(h) => homography = Some(h),
            ClickOutcome::Ignored => panic!("click ignored while collecting"),
        }
    }
    let homography = homography.expect("calibration should complete");
    assert!(path.exists());

    let store = JsonFileStore::new(&path);
    assert_eq!(store.load().unwrap(), homography);

    let grid = verification_grid(&homography, &GridSpec::default());
    assert_eq!(grid.nodes.len(), 81);

    let mut tracking = TrackingSession::from_store(TrackerConfig::default(), &store).unwrap();
    let (px, py) = world_to_pixel(20.0, 60.0);
    let frame = frame_with_target(px, py);
    let mut state = TrackingState::Active;
    for _ in 0..5 {
        state = tracking.handle_frame(&frame);
    }
    assert_eq!(state, TrackingState::Stable);
    let located = tracking.target_location().unwrap();
    // Clicks and centroids are whole pixels; a pixel is about a world unit here.
    assert!((located.x - 20.0).abs() < 2.0, "{}", located);
    assert!((located.y - 60.0).abs() < 2.0, "{}", located);
}

#[test]
fn locator_runs_on_a_threaded_frame_source() {
    let dir = tempfile::tempdir().unwrap();
    let config = LocatorConfig {
        homography_path: dir.path().join("homography.json"),
        tracking_timeout_s: Some(10.0),
        calibration_timeout_s: Some(10.0),
        ..LocatorConfig::default()
    };
    let store = JsonFileStore::new(&config.homography_path);
    let mut locator = Locator::start(config.clone(), Box::new(store)).unwrap();
    assert_eq!(locator.mode(), Mode::Calibrating);

    let (click_tx, click_rx) = crossbeam_channel::unbounded();
    for target in config.calibration.targets() {
        let (px, py) = world_to_pixel(target.x, target.y);
        click_tx.send(PixelPoint::new(px, py)).unwrap();
    }

    let (frame_tx, frame_rx) = latest_frame_slot();
    let (px, py) = world_to_pixel(-10.0, 80.0);
    let frame = frame_with_target(px, py);
    let stop = Arc::new(AtomicBool::new(false));
    let camera = {
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                frame_tx.publish(frame.clone());
                std::thread::sleep(Duration::from_millis(2));
            }
        })
    };

    let located: WorldPoint = locator.run(&frame_rx, &click_rx).unwrap();
    stop.store(true, Ordering::Relaxed);
    camera.join().unwrap();
    assert!((located.x + 10.0).abs() < 2.0, "{}", located);
    assert!((located.y - 80.0).abs() < 2.0, "{}", located);
    assert!(config.homography_path.exists());

    // A second run reuses the stored calibration.
    let store = JsonFileStore::new(&config.homography_path);
    let locator = Locator::start(config, Box::new(store)).unwrap();
    assert_eq!(locator.mode(), Mode::Tracking);
    let h = locator.tracking().unwrap().homography();
    let w = h.pixel_to_world(PixelPoint::new(320.0, 470.0)).unwrap();
    assert_relative_eq!(w.x, 0.0, epsilon = 2.0);
    assert_relative_eq!(w.y, 0.0, epsilon = 2.0);
}
