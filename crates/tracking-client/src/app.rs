// crates/tracking-client/src/app.rs

use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracking_client::{BusEvent, ConnectionManager, EventKind, Handler, Tracker, TrackingTarget};
use tracking_core::{DriverId, DriverLocation};

/// Caller-supplied display names; the tracking engine never resolves them.
pub type LabelLookup = Box<dyn Fn(DriverId) -> Option<String>>;

pub struct App {
    pub manager: ConnectionManager,
    pub tracker: Tracker,
    labels: LabelLookup,

    // Rows in first-seen order so the table doesn't jump around.
    pub rows: IndexMap<DriverId, DriverLocation>,
    pub selected: usize,

    pub stats: Arc<Mutex<Option<Value>>>,
    stats_handler: Handler,

    pub should_quit: bool,
    pub message: Option<String>,
}

impl App {
    pub fn new(manager: ConnectionManager, target: TrackingTarget, labels: LabelLookup) -> Self {
        let tracker = Tracker::new(&manager, target);

        let stats = Arc::new(Mutex::new(None));
        let stats_handler: Handler = {
            let stats = stats.clone();
            Arc::new(move |event: &BusEvent| {
                if let BusEvent::Stats(v) = event {
                    *stats.lock() = Some(v.clone());
                }
            })
        };
        manager.bus().on(EventKind::Stats, stats_handler.clone());

        Self {
            manager,
            tracker,
            labels,
            rows: IndexMap::new(),
            selected: 0,
            stats,
            stats_handler,
            should_quit: false,
            message: None,
        }
    }

    pub fn label(&self, id: DriverId) -> String {
        (self.labels)(id).unwrap_or_else(|| format!("Driver {}", id))
    }

    /// Re-read the tracker into the table rows.
    pub fn sync_rows(&mut self) {
        let current: Vec<DriverLocation> = match self.tracker.target() {
            TrackingTarget::Driver(_) => self.tracker.location().into_iter().collect(),
            TrackingTarget::Fleet => self.tracker.all_locations(),
        };

        self.rows.retain(|id, _| current.iter().any(|loc| loc.driver_id == *id));
        for loc in current {
            self.rows.insert(loc.driver_id, loc);
        }

        if self.selected >= self.rows.len() {
            self.selected = self.rows.len().saturating_sub(1);
        }
    }

    /// Ask the server for fresh data without blocking the UI loop.
    pub fn request_refresh(&mut self) {
        if !self.tracker.is_connected() {
            self.message = Some("Not connected; showing last known positions".to_string());
            return;
        }

        let manager = self.manager.clone();
        match self.tracker.target() {
            TrackingTarget::Driver(id) => {
                tokio::spawn(async move {
                    manager.get_driver_location(id).await;
                });
            }
            TrackingTarget::Fleet => {
                tokio::spawn(async move {
                    manager.get_online_drivers().await;
                });
            }
        }
        self.message = Some("Refresh requested".to_string());
    }

    pub fn move_selection_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn move_selection_down(&mut self) {
        if self.selected < self.rows.len().saturating_sub(1) {
            self.selected += 1;
        }
    }

    pub fn online_count(&self) -> usize {
        self.rows.values().filter(|loc| loc.is_online).count()
    }

    pub fn title(&self) -> String {
        match self.tracker.target() {
            TrackingTarget::Driver(id) => self.label(id),
            TrackingTarget::Fleet => "Fleet".to_string(),
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.manager.bus().off(EventKind::Stats, &self.stats_handler);
        self.tracker.close();
    }
}

/// "12s", "4m", "2h" since the sample was produced upstream.
pub fn sample_age(loc: &DriverLocation) -> String {
    let secs = (Utc::now() - loc.timestamp).num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h", secs / 3600)
    }
}
