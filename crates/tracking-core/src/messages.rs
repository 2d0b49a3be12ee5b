//! Message types exchanged over the tracking channel.
//!
//! These are **transport-agnostic** logical messages:
//! - [`ClientMessage`]: what a client sends (requests, subscriptions,
//!   reports from driver devices).
//! - [`ServerMessage`]: what the server pushes without being asked.
//!
//! Point-query replies ([`DriverLocationReply`], [`OnlineDriversReply`])
//! travel inside acknowledgements, which are a wire-level concept and
//! live in `tracking-protocol`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::driver::DriverId;
use crate::location::DriverLocation;

/// A request from a client to the tracking server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Start `driverLocationUpdate` pushes for one driver.
    SubscribeToDriver(DriverRef),

    /// Stop pushes for one driver.
    UnsubscribeFromDriver(DriverRef),

    /// Point query: latest location for one driver (acknowledged).
    GetDriverLocation(DriverRef),

    /// Point query: every online driver (acknowledged).
    GetOnlineDrivers,

    /// A driver device reporting its own position.
    ReportLocation(DriverLocation),

    /// Keep-alive.
    Ping,
}

impl ClientMessage {
    pub fn subscribe(driver_id: DriverId) -> Self {
        ClientMessage::SubscribeToDriver(DriverRef { driver_id })
    }

    pub fn unsubscribe(driver_id: DriverId) -> Self {
        ClientMessage::UnsubscribeFromDriver(DriverRef { driver_id })
    }

    pub fn get_driver_location(driver_id: DriverId) -> Self {
        ClientMessage::GetDriverLocation(DriverRef { driver_id })
    }

    /// True for messages that expect exactly one acknowledgement.
    pub fn expects_ack(&self) -> bool {
        matches!(
            self,
            ClientMessage::GetDriverLocation(_) | ClientMessage::GetOnlineDrivers
        )
    }
}

/// A push from the tracking server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Sample for a driver, sent to that driver's subscribers only.
    DriverLocationUpdate(DriverLocation),

    /// Sample for any driver, sent on the unscoped "all drivers" stream.
    LocationUpdate(DriverLocation),

    /// Presence patch: driver came online.
    DriverOnline(DriverRef),

    /// Presence patch: driver went offline.
    DriverOffline(DriverRef),

    /// Server diagnostics, forwarded verbatim.
    Stats(Value),

    /// Heartbeat answer.
    Pong,
}

/// Payload carrying nothing but a driver id (`{ "driverId": 7 }`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRef {
    pub driver_id: DriverId,
}

/// Reply to `getDriverLocation`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocationReply {
    pub location: Option<DriverLocation>,
    #[serde(default)]
    pub is_online: bool,
}

impl DriverLocationReply {
    /// The "unknown" shape: no location, not online.
    pub fn not_found() -> Self {
        DriverLocationReply::default()
    }
}

/// Reply to `getOnlineDrivers`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OnlineDriversReply {
    #[serde(default)]
    pub drivers: Vec<DriverLocation>,
}
