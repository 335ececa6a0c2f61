use std::sync::Arc;
use tracing::{error, info, warn};

use slot_watch::core::config::{load_config, resolve_log_level};
use slot_watch::cycle::{CycleOutcome, CycleRunner};
use slot_watch::scheduler::{install_shutdown_signal, LocalClock, Scheduler};
use slot_watch::Settings;

fn print_usage() {
    println!(
        "slot-watch [--once | --probe]\n\n  \
         (default)  run cycles inside working hours until Ctrl+C\n  \
         --once     run a single cycle and exit (exit code 1 on login/case failure)\n  \
         --probe    list locations and their queues, then exit\n\n\
         Settings come from slot-watch.json and environment variables (EMAIL, PASSWORD, CASE_ID, ...)."
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    if let Some(unknown) = args
        .iter()
        .find(|a| !matches!(a.as_str(), "--once" | "--probe"))
    {
        eprintln!("unknown argument: {}", unknown);
        print_usage();
        std::process::exit(2);
    }

    let loaded = load_config();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "{},chromiumoxide=warn",
            resolve_log_level(&loaded.config)
        ))
    });
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match (&loaded.source, &loaded.problem) {
        (_, Some(problem)) => warn!("{}; using defaults + env vars", problem),
        (Some(path), None) => info!("Loaded config from {}", path.display()),
        (None, None) => info!("No slot-watch.json found; using env vars"),
    }

    let settings = Settings::resolve(&loaded.config)?;
    info!(
        "Watching case {} at {} ({:?} scan, {} month(s))",
        settings.case_id,
        settings.portal.base(),
        settings.scan_mode,
        settings.months_to_check
    );

    let runner = Arc::new(CycleRunner::new(
        Arc::new(settings.launcher()),
        settings.notifier()?,
        settings.session_settings(),
        settings.workflow(),
    ));
    let mut shutdown = install_shutdown_signal();

    if args.iter().any(|a| a == "--probe") {
        let report = runner.probe(shutdown).await?;
        for (location, queue) in report {
            match queue {
                Some(queue) => println!("{} -> {}", location, queue),
                None => println!("{} -> (no queues)", location),
            }
        }
        return Ok(());
    }

    if args.iter().any(|a| a == "--once") {
        let outcome = runner.run_guarded(shutdown).await;
        match &outcome {
            CycleOutcome::Completed(report) => info!(
                "Cycle done: {} location(s) scanned, {} skipped, {} finding(s)",
                report.scanned.len(),
                report.skipped.len(),
                report.findings.len()
            ),
            CycleOutcome::Interrupted => warn!("Cycle interrupted"),
            CycleOutcome::Failed(_) | CycleOutcome::Panicked => {}
        }
        if outcome.is_fatal() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut scheduler = Scheduler::new(settings.schedule(), Arc::new(LocalClock));
    let cycle_shutdown = shutdown.clone();
    scheduler
        .run(
            || {
                let runner = runner.clone();
                let shutdown = cycle_shutdown.clone();
                async move {
                    match runner.run_guarded(shutdown).await {
                        CycleOutcome::Completed(report) => info!(
                            "Cycle done: {} finding(s) across {} location(s)",
                            report.findings.len(),
                            report.scanned.len()
                        ),
                        CycleOutcome::Failed(e) => error!("Cycle failed: {}", e),
                        CycleOutcome::Interrupted => warn!("Cycle interrupted"),
                        CycleOutcome::Panicked => error!("Cycle panicked; continuing"),
                    }
                }
            },
            &mut shutdown,
        )
        .await;

    info!("Shut down cleanly");
    Ok(())
}
