//! Error types for the tracking model.

use thiserror::Error;

/// A location sample that cannot describe a real position.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("latitude {0} out of range [-90, 90]")]
    Latitude(f64),

    #[error("longitude {0} out of range [-180, 180]")]
    Longitude(f64),

    #[error("heading {0} out of range [0, 360)")]
    Heading(f64),

    #[error("speed {0} must be finite and non-negative")]
    Speed(f64),
}
