//! Device position and the pulsing "you are here" marker.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Point;

/// Interval between pulse animation frames.
pub const PULSE_INTERVAL: Duration = Duration::from_millis(50);
/// Radius the pulse starts from and wraps back to, in metres.
pub const PULSE_MIN_RADIUS: f64 = 3.0;
/// Radius at which the pulse wraps, in metres.
pub const PULSE_MAX_RADIUS: f64 = 50.0;
const PULSE_BASE_OPACITY: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
}

/// Position fix reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub horizontal_accuracy: Option<f64>,
    pub vertical_accuracy: Option<f64>,
}

impl GeoPosition {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            speed: None,
            horizontal_accuracy: None,
            vertical_accuracy: None,
        }
    }

    pub fn point(&self) -> Point {
        Point::from_lat_lng(self.latitude, self.longitude)
    }
}

/// Source of device positions.
pub trait PositionProvider {
    fn current_position(&mut self, high_accuracy: bool) -> Result<GeoPosition, LocationError>;
}

/// Values shown in the GPS panel. Missing readings show as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsReadout {
    pub lat: f64,
    pub lng: f64,
    pub alt: f64,
    pub vel: f64,
    pub acc_h: f64,
    pub acc_v: f64,
}

impl GpsReadout {
    pub fn from_position(pos: &GeoPosition) -> Self {
        Self {
            lat: round_to(pos.latitude, 4),
            lng: round_to(pos.longitude, 4),
            alt: pos.altitude.map_or(0.0, |v| round_to(v, 4)),
            vel: pos.speed.map_or(0.0, |v| round_to(v, 2)),
            acc_h: pos.horizontal_accuracy.map_or(0.0, |v| round_to(v, 4)),
            acc_v: pos.vertical_accuracy.map_or(0.0, |v| round_to(v, 2)),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// One frame of the pulse animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseFrame {
    pub radius: f64,
    pub fill_opacity: f64,
}

impl PulseFrame {
    pub fn initial() -> Self {
        Self {
            radius: PULSE_MIN_RADIUS,
            fill_opacity: 0.3,
        }
    }

    /// Grows the radius by one metre, wrapping to the minimum at the maximum,
    /// and fades the fill as the circle grows.
    pub fn next(self) -> Self {
        let mut radius = self.radius + 1.0;
        if radius >= PULSE_MAX_RADIUS {
            radius = PULSE_MIN_RADIUS;
        }
        Self {
            radius,
            fill_opacity: PULSE_BASE_OPACITY * (PULSE_MAX_RADIUS - radius) / PULSE_MAX_RADIUS,
        }
    }
}

impl Default for PulseFrame {
    fn default() -> Self {
        Self::initial()
    }
}

/// Repeating animation task. Stops when dropped.
pub struct PulseTask {
    frame: Arc<Mutex<PulseFrame>>,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PulseTask {
    /// Starts ticking every `interval` on a background thread.
    pub fn start(interval: Duration) -> Self {
        let frame = Arc::new(Mutex::new(PulseFrame::initial()));
        let (stop, stopped) = mpsc::channel::<()>();
        let shared = Arc::clone(&frame);
        let spawned = thread::Builder::new()
            .name("pulse".into())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let mut frame = match shared.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        *frame = frame.next();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });
        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("failed to spawn pulse thread: {}", e);
                None
            }
        };
        Self {
            frame,
            stop: Some(stop),
            handle,
        }
    }

    /// Current animation frame.
    pub fn frame(&self) -> PulseFrame {
        match self.frame.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the task and waits for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            debug!("pulse task stopped");
        }
    }
}

impl Drop for PulseTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// User position marker with its pulse animation.
///
/// The animation lives exactly as long as the marker.
pub struct UserMarker {
    center: Point,
    pulse: PulseTask,
}

impl UserMarker {
    pub fn new(center: Point) -> Self {
        Self::with_interval(center, PULSE_INTERVAL)
    }

    pub fn with_interval(center: Point, interval: Duration) -> Self {
        Self {
            center,
            pulse: PulseTask::start(interval),
        }
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn move_to(&mut self, center: Point) {
        self.center = center;
    }

    pub fn pulse_frame(&self) -> PulseFrame {
        self.pulse.frame()
    }

    pub fn is_pulsing(&self) -> bool {
        self.pulse.is_running()
    }
}
