//! Demo reporter: plays a driver device pushing its own position.
//!
//! Useful against `tracking-server` to watch the pipeline end to end.

use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, info};
use tracking_core::{ClientMessage, DriverId, DriverLocation};

use crate::connection::ConnectionManager;
use crate::error::Result;

const METERS_PER_DEGREE: f64 = 111_320.0;

impl ConnectionManager {
    /// Send one `reportLocation` sample on the current link.
    pub fn report_location(&self, location: DriverLocation) -> Result<()> {
        location
            .validate()
            .map_err(|e| crate::error::TrackingError::ProtocolViolation(e.to_string()))?;
        self.send(ClientMessage::ReportLocation(location))
    }
}

/// Synthetic driver moving at a constant speed, turning slowly.
#[derive(Debug, Clone)]
pub struct SyntheticDriver {
    pub driver_id: DriverId,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub speed: f64,
}

impl SyntheticDriver {
    pub fn new(driver_id: DriverId, latitude: f64, longitude: f64) -> Self {
        Self {
            driver_id,
            latitude,
            longitude,
            heading: 0.0,
            speed: 8.0,
        }
    }

    /// Advance by `dt` and return the resulting sample.
    pub fn step(&mut self, dt: Duration) -> DriverLocation {
        let meters = self.speed * dt.as_secs_f64();
        let rad = self.heading.to_radians();

        self.latitude = (self.latitude + meters * rad.cos() / METERS_PER_DEGREE).clamp(-90.0, 90.0);
        let lng_scale = METERS_PER_DEGREE * self.latitude.to_radians().cos().max(0.01);
        self.longitude += meters * rad.sin() / lng_scale;
        if self.longitude > 180.0 {
            self.longitude -= 360.0;
        } else if self.longitude < -180.0 {
            self.longitude += 360.0;
        }
        self.heading = (self.heading + 7.5) % 360.0;

        DriverLocation {
            driver_id: self.driver_id,
            latitude: self.latitude,
            longitude: self.longitude,
            heading: Some(self.heading),
            speed: Some(self.speed),
            timestamp: Utc::now(),
            is_online: true,
        }
    }
}

/// Report `driver`'s position every `period` until the task is dropped.
pub async fn run_reporter(
    manager: ConnectionManager,
    mut driver: SyntheticDriver,
    period: Duration,
) {
    manager.connect();
    let mut ticker = interval(period);

    loop {
        ticker.tick().await;
        let sample = driver.step(period);
        match manager.report_location(sample) {
            Ok(()) => debug!(
                "Reported driver {} at {:.5}, {:.5}",
                driver.driver_id, driver.latitude, driver.longitude
            ),
            Err(e) => {
                info!("Report skipped: {}", e);
                // A previous cycle may have given up; start a new one.
                manager.connect();
            }
        }
    }
}
