//! Latest-known location / presence record for a driver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::driver::DriverId;
use crate::error::LocationError;

/// One location sample.
///
/// Value type: a newer sample replaces the old one wholesale. Presence-only
/// changes produce a new value through [`DriverLocation::with_presence`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    pub driver_id: DriverId,

    /// Decimal degrees.
    pub latitude: f64,
    pub longitude: f64,

    /// Degrees, `0..360`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,

    /// Meters per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,

    /// When the sample was produced upstream (not receipt time).
    pub timestamp: DateTime<Utc>,

    pub is_online: bool,
}

impl DriverLocation {
    pub fn new(
        driver_id: DriverId,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        DriverLocation {
            driver_id,
            latitude,
            longitude,
            heading: None,
            speed: None,
            timestamp,
            is_online: true,
        }
    }

    /// Same sample with a different presence flag.
    pub fn with_presence(&self, is_online: bool) -> Self {
        DriverLocation {
            is_online,
            ..self.clone()
        }
    }

    /// Reject samples that cannot describe a real position.
    pub fn validate(&self) -> Result<(), LocationError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(LocationError::Latitude(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(LocationError::Longitude(self.longitude));
        }
        if let Some(heading) = self.heading {
            if !(0.0..360.0).contains(&heading) {
                return Err(LocationError::Heading(heading));
            }
        }
        if let Some(speed) = self.speed {
            if !speed.is_finite() || speed < 0.0 {
                return Err(LocationError::Speed(speed));
            }
        }
        Ok(())
    }
}
