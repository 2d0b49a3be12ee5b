//! tracking-core
//!
//! Pure driver tracking model:
//! - driver identifiers
//! - location / presence samples
//! - messages (client requests, server pushes, query replies)
//! - validation errors

pub mod driver;
pub mod location;
pub mod messages;
pub mod error;

pub use driver::DriverId;
pub use location::DriverLocation;

pub use messages::{
    ClientMessage,
    DriverLocationReply,
    DriverRef,
    OnlineDriversReply,
    ServerMessage,
};

pub use error::LocationError;
