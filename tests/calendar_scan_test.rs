/// Calendar scanning against the scripted portal: full scan, furthest-date
/// search, weekend exclusion and the per-session furthest-date cache.
mod common;

use common::*;
use slot_watch::calendar::{CalendarScanner, FrontierPolicy, ScanMode, ScannerSettings};
use slot_watch::session::Session;
use slot_watch::workflow::{CycleReport, Workflow};
use std::sync::Arc;

async fn run_cycle(
    locations: Vec<FakeLocation>,
    scanner: ScannerSettings,
) -> (CycleReport, FakePortal, Arc<RecordingNotifier>) {
    init_logger();
    let expected = locations.len();
    let portal = FakePortal::new(FakeState::new(locations));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut session = Session::new(
        Box::new(portal.clone()),
        notifier.clone(),
        session_settings(),
    );
    let workflow = Workflow::new(workflow_settings(expected), CalendarScanner::new(scanner));

    let report = tokio_test::assert_ok!(workflow.run(&mut session).await);
    session.close().await;
    (report, portal, notifier)
}

fn full(months_to_check: u32) -> ScannerSettings {
    ScannerSettings {
        mode: ScanMode::Full,
        months_to_check,
        ..ScannerSettings::default()
    }
}

fn furthest() -> ScannerSettings {
    ScannerSettings {
        mode: ScanMode::Furthest,
        ..ScannerSettings::default()
    }
}

fn clicks(portal: &FakePortal) -> Vec<(String, u32)> {
    portal.state().day_clicks.clone()
}

#[tokio::test(start_paused = true)]
async fn full_scan_stops_after_two_empty_months() {
    let locations = vec![FakeLocation::new(
        "Office A",
        &["Queue A"],
        vec![
            FakeMonth::new("PAŹ 2025", &[]),
            FakeMonth::new("LIS 2025", &[]),
            FakeMonth::new("GRU 2025", &[5]).with_slots(5, 2),
        ],
    )];

    let (report, portal, _) = run_cycle(locations, full(3)).await;

    assert!(report.findings.is_empty());
    let state = portal.state();
    assert!(state.day_clicks.is_empty(), "no day should be opened");
    assert_eq!(state.next_clicks, 1, "stops right after the second empty month");
    assert_eq!(state.previous_clicks, 1, "calendar returned to the initial month");
    assert_eq!(state.view, 0);
}

#[tokio::test(start_paused = true)]
async fn full_scan_opens_every_enabled_day_and_reports_slots() {
    let locations = vec![FakeLocation::new(
        "Office A",
        &["Queue A"],
        vec![
            FakeMonth::new("PAŹ 2025", &[3, 10]).with_slots(10, 2),
            FakeMonth::new("LIS 2025", &[7]),
        ],
    )];

    let (report, portal, notifier) = run_cycle(locations, full(2)).await;

    assert_eq!(
        clicks(&portal),
        vec![
            ("PAŹ 2025".to_string(), 3),
            ("PAŹ 2025".to_string(), 10),
            ("LIS 2025".to_string(), 7),
        ]
    );
    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert_eq!(finding.date_label, "10");
    assert_eq!(finding.month_label, "PAŹ 2025");
    assert_eq!(finding.slot_count, 2);
    assert!(notifier
        .messages()
        .contains(&"🎯 SLOT FOUND! 10 PAŹ 2025: Office A - Queue A (2 slots)".to_string()));

    let state = portal.state();
    assert_eq!((state.next_clicks, state.previous_clicks), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn furthest_date_follows_full_month_and_is_reused_for_next_location() {
    // November 2025 is open through Friday the 28th, so the search looks at
    // December, where the 20th/21st are a weekend and the 15th wins.
    let locations = vec![
        FakeLocation::new(
            "Office A",
            &["Queue A"],
            vec![
                FakeMonth::new("LIS 2025", &[27, 28]),
                FakeMonth::new("GRU 2025", &[10, 15, 20, 21]).with_slots(15, 1),
            ],
        ),
        FakeLocation::new(
            "Office B",
            &["Queue B"],
            vec![
                FakeMonth::new("LIS 2025", &[28]),
                FakeMonth::new("GRU 2025", &[3, 15, 22]).with_slots(15, 4),
            ],
        ),
    ];

    let (report, portal, notifier) = run_cycle(locations, furthest()).await;

    // Office B alone would pick the 22nd; the cached (15, +1 month) is used instead.
    assert_eq!(
        clicks(&portal),
        vec![("GRU 2025".to_string(), 15), ("GRU 2025".to_string(), 15)]
    );
    assert_eq!(report.findings.len(), 2);
    assert_eq!(report.findings[1].slot_count, 4);
    assert_eq!(notifier.count_containing("🎯 SLOT FOUND! 15 GRU 2025"), 2);

    let state = portal.state();
    assert_eq!(state.next_clicks, 2, "exactly one month forward per location");
    assert_eq!(state.previous_clicks, 2, "each location restored");
}

#[tokio::test(start_paused = true)]
async fn furthest_date_backs_off_when_next_month_is_weekend_only() {
    let locations = vec![FakeLocation::new(
        "Office A",
        &["Queue A"],
        vec![
            FakeMonth::new("PAŹ 2025", &[31]).with_slots(31, 2),
            FakeMonth::new("LIS 2025", &[29, 30]),
        ],
    )];

    let (report, portal, _) = run_cycle(locations, furthest()).await;

    assert_eq!(clicks(&portal), vec![("PAŹ 2025".to_string(), 31)]);
    assert_eq!(report.findings.len(), 1);
    let state = portal.state();
    assert_eq!((state.next_clicks, state.previous_clicks), (1, 1));
    assert_eq!(state.view, 0);
}

#[tokio::test(start_paused = true)]
async fn cached_day_missing_for_next_location_is_skipped() {
    let locations = vec![
        FakeLocation::new(
            "Office A",
            &["Queue A"],
            vec![
                FakeMonth::new("PAŹ 2025", &[31]),
                FakeMonth::new("LIS 2025", &[14]),
            ],
        ),
        FakeLocation::new(
            "Office B",
            &["Queue B"],
            vec![
                FakeMonth::new("PAŹ 2025", &[31]),
                FakeMonth::new("LIS 2025", &[3]),
            ],
        ),
    ];

    let (report, portal, _) = run_cycle(locations, furthest()).await;

    assert_eq!(clicks(&portal), vec![("LIS 2025".to_string(), 14)]);
    assert!(report.findings.is_empty());
    assert_eq!(report.scanned.len(), 2, "both locations reached the calendar");
    let state = portal.state();
    assert_eq!((state.next_clicks, state.previous_clicks), (2, 2));
}

#[tokio::test(start_paused = true)]
async fn weekend_only_month_yields_no_target() {
    // 4 and 5 October 2025 are Saturday and Sunday.
    let locations = vec![FakeLocation::new(
        "Office A",
        &["Queue A"],
        vec![FakeMonth::new("PAŹ 2025", &[4, 5]).with_slots(4, 3)],
    )];

    let (report, portal, notifier) = run_cycle(locations, furthest()).await;

    assert!(clicks(&portal).is_empty());
    assert!(report.findings.is_empty());
    assert_eq!(notifier.count_containing("SLOT FOUND"), 0);
}

#[tokio::test(start_paused = true)]
async fn frontier_stops_at_the_configured_month_cap() {
    let locations = vec![FakeLocation::new(
        "Office A",
        &["Queue A"],
        vec![
            FakeMonth::new("PAŹ 2025", &[31]),
            FakeMonth::new("LIS 2025", &[28]),
            FakeMonth::new("GRU 2025", &[31]),
        ],
    )];
    let scanner = ScannerSettings {
        frontier: FrontierPolicy {
            max_months_forward: 2,
            follow_full_months: true,
        },
        ..furthest()
    };

    let (_, portal, _) = run_cycle(locations, scanner).await;

    // November is full too, but the cap of two views stops the search there.
    assert_eq!(clicks(&portal), vec![("LIS 2025".to_string(), 28)]);
    let state = portal.state();
    assert_eq!((state.next_clicks, state.previous_clicks), (1, 1));
}
