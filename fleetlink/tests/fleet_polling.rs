//! Fleet poller cycles against an in-memory fleet source.

use fleetlink::fleet::{FleetPoller, PeerRecord, PeerStatus, Role, RosterSlot};
use fleetlink_devkit::{init_logging, settle, wait_until, FleetFixtures, MockFleetSource};
use std::time::Duration;

const EVERY: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn test_first_cycle_runs_immediately() {
    init_logging();
    let source = MockFleetSource::new(
        Some(FleetFixtures::finish_node(1_250)),
        Some(FleetFixtures::full_fleet()),
    );
    let fleet = FleetPoller::start(source.clone(), EVERY);

    settle().await;
    let snapshot = fleet.latest();
    assert_eq!(snapshot.cycle, 1);
    assert_eq!(source.info_calls(), 1);
    assert_eq!(source.peer_calls(), 1);

    assert_eq!(snapshot.local_role, Some(Role::Finish));
    let roster = snapshot.roster.expect("roster after first cycle");
    assert_eq!(roster.roles(), vec![Role::Start, Role::Speedtrap, Role::Telemetry]);
    assert_eq!(
        roster.to_string(),
        "\u{25CF} Start [online] \u{25CF} Trap [online] \u{25CF} Telem [online]"
    );

    let summary = snapshot.self_summary.expect("summary after first cycle");
    assert_eq!(summary.clock.map(|c| c.label().to_string()), Some("1ms".to_string()));

    fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cycles_follow_interval() {
    let source = MockFleetSource::new(
        Some(FleetFixtures::self_info("start", "masstrap-start")),
        Some(FleetFixtures::full_fleet()),
    );
    let fleet = FleetPoller::start(source.clone(), EVERY);
    let mut updates = fleet.subscribe();

    settle().await;
    assert_eq!(fleet.latest().cycle, 1);

    tokio::time::advance(Duration::from_secs(9)).await;
    settle().await;
    assert_eq!(fleet.latest().cycle, 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(wait_until(Duration::from_millis(100), || fleet.latest().cycle == 2).await);
    assert!(updates.has_changed().unwrap_or(false));
    assert_eq!(updates.borrow_and_update().cycle, 2);
    assert_eq!(source.info_calls(), 2);

    fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetches_keep_previous_view() {
    let source = MockFleetSource::new(
        Some(FleetFixtures::self_info("speedtrap", "masstrap-trap")),
        Some(FleetFixtures::full_fleet()),
    );
    let fleet = FleetPoller::start(source.clone(), EVERY);
    settle().await;
    let first = fleet.latest();

    // Node unreachable for a cycle.
    source.set_self_info(None);
    source.set_peers(None);
    tokio::time::advance(EVERY).await;
    assert!(wait_until(Duration::from_millis(100), || fleet.latest().cycle == 2).await);

    let second = fleet.latest();
    assert_eq!(second.self_summary, first.self_summary);
    assert_eq!(second.roster, first.roster);
    assert_eq!(second.local_role, Some(Role::Speedtrap));

    fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_updates_the_other_half() {
    let source = MockFleetSource::new(None, Some(FleetFixtures::full_fleet()));
    let fleet = FleetPoller::start(source.clone(), EVERY);
    settle().await;

    // No self info yet: every role is listed.
    let snapshot = fleet.latest();
    assert!(snapshot.self_summary.is_none());
    assert_eq!(snapshot.roster.as_ref().map(|r| r.len()), Some(4));

    source.set_self_info(Some(FleetFixtures::self_info("telemetry", "masstrap-telem")));
    source.set_peers(Some(vec![
        PeerRecord::new("start", "masstrap-start", "offline"),
        PeerRecord::new("start", "masstrap-start-b", "stale"),
    ]));
    tokio::time::advance(EVERY).await;
    assert!(wait_until(Duration::from_millis(100), || fleet.latest().cycle == 2).await);

    let roster = fleet.latest().roster.expect("roster");
    assert_eq!(roster.roles(), vec![Role::Start, Role::Speedtrap, Role::Finish]);
    let start = roster.get(Role::Start).expect("start entry");
    assert_eq!(
        start.slot,
        RosterSlot::Discovered {
            hostname: "masstrap-start-b".to_string(),
            status: PeerStatus::Stale,
        }
    );
    assert!(!roster.get(Role::Finish).expect("finish entry").is_discovered());

    fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fetches_run_together_and_merge_waits_for_both() {
    let source = MockFleetSource::new(None, Some(FleetFixtures::full_fleet()));
    source.set_info_delay(Duration::from_secs(3));
    source.set_peer_delay(Duration::from_secs(3));
    let fleet = FleetPoller::start(source.clone(), EVERY);

    // Both requests are in flight before either answers.
    settle().await;
    assert_eq!(source.info_calls(), 1);
    assert_eq!(source.peer_calls(), 1);
    assert_eq!(fleet.latest().cycle, 0);

    // Concurrent: both answer after 3s, not 6s.
    tokio::time::advance(Duration::from_millis(3_010)).await;
    settle().await;
    let snapshot = fleet.latest();
    assert_eq!(snapshot.cycle, 1);
    assert!(snapshot.self_summary.is_none());
    assert_eq!(snapshot.roster.as_ref().map(|r| r.len()), Some(4));

    fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fast_failure_waits_for_slow_fetch() {
    let source = MockFleetSource::new(None, Some(FleetFixtures::full_fleet()));
    source.set_peer_delay(Duration::from_secs(4));
    let fleet = FleetPoller::start(source.clone(), EVERY);

    // Self info already failed, but nothing is merged until the peers answer.
    settle().await;
    assert_eq!(fleet.latest().cycle, 0);
    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(fleet.latest().cycle, 0);

    tokio::time::advance(Duration::from_millis(2_010)).await;
    settle().await;
    let snapshot = fleet.latest();
    assert_eq!(snapshot.cycle, 1);
    assert!(snapshot.roster.is_some());
    assert!(snapshot.self_summary.is_none());

    fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_polling() {
    let source = MockFleetSource::new(None, None);
    let fleet = FleetPoller::start(source.clone(), EVERY);
    settle().await;
    fleet.shutdown().await;

    tokio::time::advance(EVERY * 3).await;
    settle().await;
    assert_eq!(source.info_calls(), 1);
}
