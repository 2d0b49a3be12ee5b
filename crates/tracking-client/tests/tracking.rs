mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracking_client::{
    BusEvent, ConnectionState, EventKind, Handler, LocationHandler, Scope, SubscriptionRegistry,
    Tracker, TrackerPhase, TrackingError, TrackingTarget,
};
use tracking_core::{ClientMessage, DriverId, DriverLocation, DriverRef, ServerMessage};

use common::{location, mock_manager, settle, subscribes, test_config, unsubscribes, Mode};

fn counting_handler() -> (Arc<AtomicUsize>, LocationHandler) {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let handler: LocationHandler = Arc::new(move |_: &DriverLocation| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    (hits, handler)
}

#[tokio::test(start_paused = true)]
async fn reconnect_resubscribes_exactly_once() {
    let (manager, mut harness) = mock_manager(test_config());
    let tracker = Tracker::new(&manager, TrackingTarget::Driver(DriverId(7)));

    let mut server = harness.accept().await;
    let frames = server.drain().await;
    assert_eq!(subscribes(&frames, 7), 1);
    assert_eq!(tracker.phase(), TrackerPhase::Subscribed);

    // Transport drops.
    drop(server);
    settle().await;
    assert!(!tracker.is_connected());
    assert_eq!(tracker.phase(), TrackerPhase::Connecting);

    let mut server = harness.accept().await;
    let frames = server.drain().await;
    assert_eq!(subscribes(&frames, 7), 1);
    assert_eq!(unsubscribes(&frames, 7), 0);
    assert!(tracker.is_connected());
    assert_eq!(tracker.phase(), TrackerPhase::Subscribed);

    // Pushes flow again after the reconnect.
    server.push(ServerMessage::DriverLocationUpdate(location(7, 6.25, -75.56, 5)));
    settle().await;
    assert_eq!(tracker.location(), Some(location(7, 6.25, -75.56, 5)));
}

#[tokio::test(start_paused = true)]
async fn bounded_wait_surfaces_error() {
    let (manager, harness) = mock_manager(test_config());
    harness.set_mode(Mode::Hang);

    let tracker = Tracker::new(&manager, TrackingTarget::Fleet);
    assert!(tracker.is_loading());
    assert!(tracker.error().is_none());

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(tracker.is_loading());
    assert!(tracker.error().is_none());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!tracker.is_loading());
    assert!(matches!(tracker.error(), Some(TrackingError::ConnectTimeout { .. })));
    assert!(!tracker.is_connected());
}

#[tokio::test(start_paused = true)]
async fn successful_connection_clears_error() {
    let (manager, mut harness) = mock_manager(test_config());
    harness.set_mode(Mode::Refuse);

    let tracker = Tracker::new(&manager, TrackingTarget::Fleet);
    tokio::time::sleep(Duration::from_millis(5500)).await;
    assert!(tracker.error().is_some());

    harness.set_mode(Mode::Accept);
    let _server = harness.accept().await;
    settle().await;

    assert!(tracker.is_connected());
    assert!(tracker.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_stay_disconnected_until_connect() {
    let (manager, mut harness) = mock_manager(test_config());
    harness.set_mode(Mode::Refuse);

    let changes = Arc::new(AtomicUsize::new(0));
    let c = changes.clone();
    let handler: Handler = Arc::new(move |event: &BusEvent| {
        if *event == BusEvent::ConnectionChange(false) {
            c.fetch_add(1, Ordering::SeqCst);
        }
    });
    manager.bus().on(EventKind::ConnectionChange, handler);

    manager.connect();
    // 1s + 2s + 3s + 4s + 5s of backoff between six attempts.
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(harness.attempts(), 6);
    assert_eq!(changes.load(Ordering::SeqCst), 6);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.attempts(), 6, "no attempts after giving up");

    harness.set_mode(Mode::Accept);
    manager.connect();
    let _server = harness.accept().await;
    settle().await;
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    manager.connect();
    let _server = harness.accept().await;
    settle().await;
    manager.connect();
    settle().await;

    assert_eq!(harness.attempts(), 1);
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn disconnected_query_degrades_gracefully() {
    let (manager, harness) = mock_manager(test_config());

    let reply = manager.get_driver_location(DriverId(42)).await;
    assert_eq!(reply.location, None);
    assert!(!reply.is_online);

    let roster = manager.get_online_drivers().await;
    assert!(roster.drivers.is_empty());

    assert_eq!(harness.attempts(), 0, "queries must not start a connection");
    assert_eq!(manager.pending_queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn query_timeout_resolves_not_found() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    let mut server = harness.accept().await;
    settle().await;

    let started = tokio::time::Instant::now();
    let reply = manager.get_driver_location(DriverId(42)).await;
    assert_eq!(reply.location, None);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(manager.pending_queries(), 0);

    // The request did go out; a late ack is ignored.
    let frame = server.next_frame().await.expect("query frame");
    let id = frame.ack.expect("ack id");
    server.ack(id, json!({ "location": null, "isOnline": true }));
    settle().await;
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn query_reply_is_written_through_to_cache() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    let mut server = harness.accept().await;
    settle().await;

    let query = tokio::spawn({
        let manager = manager.clone();
        async move { manager.get_driver_location(DriverId(9)).await }
    });

    let frame = server.next_frame().await.expect("query frame");
    assert_eq!(frame.message, ClientMessage::get_driver_location(DriverId(9)));
    let loc = location(9, 6.2, -75.5, 1);
    server.ack(
        frame.ack.expect("ack id"),
        json!({ "location": serde_json::to_value(&loc).unwrap(), "isOnline": false }),
    );

    let reply = query.await.unwrap();
    assert_eq!(reply.location.as_ref().map(|l| l.driver_id), Some(DriverId(9)));
    assert!(!reply.is_online);
    // The returned record agrees with the reply flag and with the cache.
    assert_eq!(reply.location.as_ref().map(|l| l.is_online), Some(false));

    let cached = manager.cache().get(DriverId(9)).expect("read-through");
    assert_eq!(cached.latitude, 6.2);
    assert!(!cached.is_online);
}

#[tokio::test(start_paused = true)]
async fn online_roster_is_written_through_to_cache() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    let mut server = harness.accept().await;
    settle().await;

    let query = tokio::spawn({
        let manager = manager.clone();
        async move { manager.get_online_drivers().await }
    });

    let frame = server.next_frame().await.expect("query frame");
    assert_eq!(frame.message, ClientMessage::GetOnlineDrivers);
    let drivers = vec![location(1, 6.0, -75.0, 0), location(2, 6.1, -75.1, 0)];
    server.ack(frame.ack.expect("ack id"), json!({ "drivers": drivers }));

    let reply = query.await.unwrap();
    assert_eq!(reply.drivers.len(), 2);
    assert_eq!(manager.cache().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn connection_loss_abandons_pending_query() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    let server = harness.accept().await;
    settle().await;

    let query = tokio::spawn({
        let manager = manager.clone();
        async move { manager.get_online_drivers().await }
    });
    settle().await;
    assert_eq!(manager.pending_queries(), 1);

    drop(server);
    let reply = query.await.unwrap();
    assert!(reply.drivers.is_empty());
    assert_eq!(manager.pending_queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_subscription_twice_sends_one_unsubscribe() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    let mut server = harness.accept().await;
    settle().await;

    let registry = SubscriptionRegistry::new(manager.clone());
    let (_hits, handler) = counting_handler();
    let sub = registry.subscribe_to_driver(DriverId(5), handler);
    assert_eq!(registry.listener_count(Scope::Driver(DriverId(5))), 1);

    sub.cancel();
    sub.cancel();
    drop(sub);

    let frames = server.drain().await;
    assert_eq!(subscribes(&frames, 5), 1);
    assert_eq!(unsubscribes(&frames, 5), 1);
    assert_eq!(registry.listener_count(Scope::Driver(DriverId(5))), 0);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_waits_for_last_local_listener() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    let mut server = harness.accept().await;
    settle().await;

    let registry = SubscriptionRegistry::new(manager.clone());
    let (_a, ha) = counting_handler();
    let (_b, hb) = counting_handler();
    let first = registry.subscribe_to_driver(DriverId(5), ha);
    let second = registry.subscribe_to_driver(DriverId(5), hb);

    first.cancel();
    assert_eq!(unsubscribes(&server.drain().await, 5), 0);

    second.cancel();
    assert_eq!(unsubscribes(&server.drain().await, 5), 1);
}

#[tokio::test(start_paused = true)]
async fn pushes_reach_only_matching_listeners() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    let mut server = harness.accept().await;
    settle().await;

    let registry = SubscriptionRegistry::new(manager.clone());
    let (one, h1) = counting_handler();
    let (two, h2) = counting_handler();
    let (all, ha) = counting_handler();
    let _s1 = registry.subscribe_to_driver(DriverId(1), h1);
    let _s2 = registry.subscribe_to_driver(DriverId(2), h2);
    let _sa = registry.subscribe_to_all(ha);

    let frames = server.drain().await;
    assert_eq!(frames.len(), 2, "the all-drivers stream sends nothing");

    server.push(ServerMessage::DriverLocationUpdate(location(1, 6.0, -75.0, 0)));
    settle().await;
    assert_eq!(one.load(Ordering::SeqCst), 1);
    assert_eq!(two.load(Ordering::SeqCst), 0);
    assert_eq!(all.load(Ordering::SeqCst), 0);

    server.push(ServerMessage::LocationUpdate(location(2, 6.1, -75.1, 0)));
    settle().await;
    assert_eq!(one.load(Ordering::SeqCst), 1);
    assert_eq!(two.load(Ordering::SeqCst), 0);
    assert_eq!(all.load(Ordering::SeqCst), 1);

    assert_eq!(manager.cache().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn panicking_listener_does_not_stop_dispatch() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    let server = harness.accept().await;
    settle().await;

    let registry = SubscriptionRegistry::new(manager.clone());
    let _bad = registry.subscribe_to_all(Arc::new(|_: &DriverLocation| panic!("listener bug")));
    let (hits, good) = counting_handler();
    let _good = registry.subscribe_to_all(good);

    server.push(ServerMessage::LocationUpdate(location(3, 6.0, -75.0, 0)));
    server.push(ServerMessage::LocationUpdate(location(3, 6.1, -75.0, 1)));
    settle().await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(manager.is_connected());
    assert_eq!(manager.cache().get(DriverId(3)).unwrap().latitude, 6.1);
}

#[tokio::test(start_paused = true)]
async fn presence_before_location_is_dropped_then_applied() {
    let (manager, mut harness) = mock_manager(test_config());
    let tracker = Tracker::new(&manager, TrackingTarget::Driver(DriverId(7)));
    let server = harness.accept().await;
    settle().await;
    assert!(tracker.is_connected());

    server.push(ServerMessage::DriverOnline(DriverRef { driver_id: DriverId(7) }));
    settle().await;
    assert!(manager.cache().get(DriverId(7)).is_none(), "no phantom record");

    let t1 = location(7, 6.25, -75.56, 1);
    server.push(ServerMessage::DriverLocationUpdate(t1.clone()));
    settle().await;
    assert_eq!(tracker.location(), Some(t1.clone()));

    server.push(ServerMessage::DriverOffline(DriverRef { driver_id: DriverId(7) }));
    settle().await;

    let after = manager.cache().get(DriverId(7)).unwrap();
    assert!(!after.is_online);
    assert_eq!(after.latitude, 6.25);
    assert_eq!(after.longitude, -75.56);
    assert_eq!(after.timestamp, t1.timestamp);
    assert!(!tracker.is_driver_online(DriverId(7)));
}

#[tokio::test(start_paused = true)]
async fn two_trackers_observe_the_same_location() {
    let (manager, mut harness) = mock_manager(test_config());
    let a = Tracker::new(&manager, TrackingTarget::Driver(DriverId(4)));
    let server = harness.accept().await;
    settle().await;

    // Created after the manager is connected: subscribes straight away.
    let b = Tracker::new(&manager, TrackingTarget::Driver(DriverId(4)));
    assert!(!b.is_loading());
    assert_eq!(b.phase(), TrackerPhase::Subscribed);

    let fleet = Tracker::new(&manager, TrackingTarget::Fleet);

    server.push(ServerMessage::DriverLocationUpdate(location(4, 6.3, -75.6, 2)));
    settle().await;

    assert!(a.location().is_some());
    assert_eq!(a.location(), b.location());
    assert_eq!(fleet.all_locations(), vec![location(4, 6.3, -75.6, 2)]);
    assert_eq!(fleet.location(), None);
}

#[tokio::test(start_paused = true)]
async fn tracker_changes_fire_on_updates() {
    let (manager, mut harness) = mock_manager(test_config());
    let tracker = Tracker::new(&manager, TrackingTarget::Driver(DriverId(8)));
    let server = harness.accept().await;
    settle().await;

    let mut changes = tracker.changes();
    changes.borrow_and_update();

    server.push(ServerMessage::DriverLocationUpdate(location(8, 6.0, -75.0, 0)));
    tokio::time::timeout(Duration::from_secs(1), changes.changed())
        .await
        .expect("change notification")
        .unwrap();

    changes.borrow_and_update();
    server.push(ServerMessage::LocationUpdate(location(99, 6.0, -75.0, 0)));
    settle().await;
    assert!(!changes.has_changed().unwrap(), "other drivers don't concern a single-driver view");
}

#[tokio::test(start_paused = true)]
async fn cache_survives_transient_reconnect_but_not_disconnect() {
    let (manager, mut harness) = mock_manager(test_config());
    let tracker = Tracker::new(&manager, TrackingTarget::Fleet);
    let server = harness.accept().await;
    settle().await;

    server.push(ServerMessage::LocationUpdate(location(1, 6.0, -75.0, 0)));
    settle().await;

    drop(server);
    settle().await;
    assert!(!tracker.is_connected());
    assert_eq!(tracker.all_locations().len(), 1, "last known data stays visible");

    let _server = harness.accept().await;
    settle().await;
    assert!(tracker.is_connected());
    assert_eq!(tracker.all_locations().len(), 1);

    manager.disconnect();
    assert!(!tracker.is_connected());
    assert!(tracker.all_locations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_emits_once_and_is_safe_to_repeat() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    let _server = harness.accept().await;
    settle().await;

    let downs = Arc::new(AtomicUsize::new(0));
    let d = downs.clone();
    manager.bus().on(
        EventKind::ConnectionChange,
        Arc::new(move |event: &BusEvent| {
            if *event == BusEvent::ConnectionChange(false) {
                d.fetch_add(1, Ordering::SeqCst);
            }
        }),
    );

    manager.disconnect();
    manager.disconnect();
    settle().await;

    assert_eq!(downs.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // Superseded cycle stays quiet.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_after_giving_up_keeps_last_known_data() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    let server = harness.accept().await;
    server.push(ServerMessage::LocationUpdate(location(1, 6.0, -75.0, 0)));
    settle().await;
    assert_eq!(manager.cache().len(), 1);

    harness.set_mode(Mode::Refuse);
    drop(server);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    let downs = Arc::new(AtomicUsize::new(0));
    let d = downs.clone();
    manager.bus().on(
        EventKind::ConnectionChange,
        Arc::new(move |_: &BusEvent| {
            d.fetch_add(1, Ordering::SeqCst);
        }),
    );

    manager.disconnect();
    manager.disconnect();

    assert_eq!(downs.load(Ordering::SeqCst), 0);
    assert_eq!(manager.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn losing_an_established_link_is_not_a_connect_timeout() {
    let (manager, mut harness) = mock_manager(test_config());
    let tracker = Tracker::new(&manager, TrackingTarget::Driver(DriverId(7)));
    let server = harness.accept().await;
    settle().await;
    assert!(tracker.is_connected());

    tokio::time::sleep(Duration::from_secs(3)).await;
    harness.set_mode(Mode::Refuse);
    drop(server);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!tracker.is_connected());
    assert!(tracker.error().is_none());
    assert_eq!(tracker.phase(), TrackerPhase::Connecting);
}

#[tokio::test(start_paused = true)]
async fn tracker_close_is_idempotent_and_detaches() {
    let (manager, mut harness) = mock_manager(test_config());
    let baseline = manager.bus().handler_count(EventKind::ConnectionChange);

    let tracker = Tracker::new(&manager, TrackingTarget::Driver(DriverId(6)));
    let mut server = harness.accept().await;
    assert_eq!(subscribes(&server.drain().await, 6), 1);
    assert_eq!(manager.bus().handler_count(EventKind::ConnectionChange), baseline + 1);

    tracker.close();
    tracker.close();
    drop(tracker);

    assert_eq!(manager.bus().handler_count(EventKind::ConnectionChange), baseline);
    assert_eq!(unsubscribes(&server.drain().await, 6), 1);
}

#[tokio::test(start_paused = true)]
async fn stats_are_forwarded_on_the_bus() {
    let (manager, mut harness) = mock_manager(test_config());
    manager.connect();
    let server = harness.accept().await;
    settle().await;

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let s = seen.clone();
    manager.bus().on(
        EventKind::Stats,
        Arc::new(move |event: &BusEvent| {
            if let BusEvent::Stats(v) = event {
                s.lock().push(v.clone());
            }
        }),
    );

    server.push(ServerMessage::Stats(json!({ "connectedClients": 2 })));
    settle().await;

    assert_eq!(*seen.lock(), vec![json!({ "connectedClients": 2 })]);
}
