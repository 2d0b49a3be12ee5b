//! Low-level wire types and constants.
//!
//! This module defines:
//! - Event names for client and server messages.
//! - Protocol versioning and the channel namespace.
//! - Frame size limits.
//!
//! The actual encode/decode logic lives in `json_codec`.

/// Current protocol version, carried as `v` in every envelope.
pub const PROTOCOL_VERSION: u8 = 1;

/// Namespace every tracking envelope is scoped to.
pub const TRACKING_NAMESPACE: &str = "tracking";

/// Bytes in the big-endian length prefix of each frame.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest accepted JSON payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Event names on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireEvent {
    // client → server
    SubscribeToDriver,
    UnsubscribeFromDriver,
    GetDriverLocation,
    GetOnlineDrivers,
    ReportLocation,
    Ping,

    // server → client
    DriverLocationUpdate,
    LocationUpdate,
    DriverOnline,
    DriverOffline,
    Stats,
    Pong,
    Ack,
}

impl WireEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            WireEvent::SubscribeToDriver => "subscribeToDriver",
            WireEvent::UnsubscribeFromDriver => "unsubscribeFromDriver",
            WireEvent::GetDriverLocation => "getDriverLocation",
            WireEvent::GetOnlineDrivers => "getOnlineDrivers",
            WireEvent::ReportLocation => "reportLocation",
            WireEvent::Ping => "ping",
            WireEvent::DriverLocationUpdate => "driverLocationUpdate",
            WireEvent::LocationUpdate => "locationUpdate",
            WireEvent::DriverOnline => "driverOnline",
            WireEvent::DriverOffline => "driverOffline",
            WireEvent::Stats => "stats",
            WireEvent::Pong => "pong",
            WireEvent::Ack => "ack",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "subscribeToDriver" => Some(WireEvent::SubscribeToDriver),
            "unsubscribeFromDriver" => Some(WireEvent::UnsubscribeFromDriver),
            "getDriverLocation" => Some(WireEvent::GetDriverLocation),
            "getOnlineDrivers" => Some(WireEvent::GetOnlineDrivers),
            "reportLocation" => Some(WireEvent::ReportLocation),
            "ping" => Some(WireEvent::Ping),
            "driverLocationUpdate" => Some(WireEvent::DriverLocationUpdate),
            "locationUpdate" => Some(WireEvent::LocationUpdate),
            "driverOnline" => Some(WireEvent::DriverOnline),
            "driverOffline" => Some(WireEvent::DriverOffline),
            "stats" => Some(WireEvent::Stats),
            "pong" => Some(WireEvent::Pong),
            "ack" => Some(WireEvent::Ack),
            _ => None,
        }
    }
}
