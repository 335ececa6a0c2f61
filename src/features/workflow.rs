//! Navigation state machine.
//!
//! `LoggedOut → Authenticating → CaseOpening → PanelExpansion →
//! LocationListing → {LocationSelected → QueueSelected → CalendarScanned}* → Done`
//!
//! Login and case opening are retried with linear backoff and abort the
//! cycle when exhausted. Everything after that is best effort per location:
//! a failing location is logged and the next one is tried.

use crate::core::locale::{self, Concept};
use crate::core::retry::{retry_with, RetryPolicy};
use crate::core::types::{Location, Queue, SlotFinding};
use crate::features::calendar::{CalendarScanner, ScanError};
use crate::features::session::Session;
use crate::features::timing::DelayRange;
use crate::scraping::port::{PortError, WAIT_POLL};
use crate::scraping::selectors::{self, PLACEHOLDER_OPTION};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("login rejected: incorrect credentials or portal maintenance")]
    InvalidCredentials,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("case page did not open: {0}")]
    CaseOpening(String),

    #[error("no locations offered on the case page")]
    NoLocations,

    #[error("cycle interrupted")]
    Interrupted,

    #[error(transparent)]
    Port(#[from] PortError),
}

impl WorkflowError {
    /// Worth another attempt under the navigation retry policy.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            WorkflowError::Interrupted | WorkflowError::Port(PortError::Closed)
        )
    }

    /// Failures that should turn into a non-zero exit in one-shot mode.
    pub fn is_fatal_for_cycle(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidCredentials
                | WorkflowError::Authentication(_)
                | WorkflowError::CaseOpening(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    LoggedOut,
    Authenticating,
    CaseOpening,
    PanelExpansion,
    LocationListing,
    LocationSelected,
    QueueSelected,
    CalendarScanned,
    Done,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn enter(state: WorkflowState) {
    info!("workflow_state={}", state);
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Number of locations the case page normally offers.
    pub expected_locations: usize,
    /// Login and case page.
    pub navigation_retry: RetryPolicy,
    /// Re-reading dropdown options after stale or early-closing menus.
    pub option_read_retry: RetryPolicy,
    /// Settle after expanding the appointment panel.
    pub panel_settle: DelayRange,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            expected_locations: 4,
            navigation_retry: RetryPolicy::navigation(),
            option_read_retry: RetryPolicy::immediate(3),
            panel_settle: DelayRange::new(1500, 2500),
        }
    }
}

/// Outcome of one full pass over the case page.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub locations: Vec<Location>,
    pub scanned: Vec<(Location, Queue)>,
    pub skipped: Vec<Location>,
    pub findings: Vec<SlotFinding>,
}

/// First queue offered per location, as seen by `--probe`.
pub type ProbeReport = Vec<(Location, Option<Queue>)>;

#[derive(Debug, Clone)]
pub struct Workflow {
    pub settings: WorkflowSettings,
    pub scanner: CalendarScanner,
}

impl Workflow {
    pub fn new(settings: WorkflowSettings, scanner: CalendarScanner) -> Self {
        Self { settings, scanner }
    }

    /// Runs the whole state machine once.
    pub async fn run(&self, session: &mut Session) -> Result<CycleReport, WorkflowError> {
        enter(WorkflowState::LoggedOut);
        self.authenticate(session).await?;
        self.open_case(session).await?;
        self.expand_panel(session).await?;

        let locations = self.list_locations(session).await?;
        let mut report = CycleReport {
            locations: locations.clone(),
            ..CycleReport::default()
        };

        for (index, location) in locations.iter().enumerate() {
            info!("=== Checking location: {} ===", location);
            if index > 0 {
                if let Err(e) = self.open_location_menu(session).await {
                    error!("Error reopening locations for \"{}\": {}", location, e);
                    report.skipped.push(location.clone());
                    continue;
                }
            }

            match self.check_location(session, location).await {
                Ok(Some((queue, findings))) => {
                    report.scanned.push((location.clone(), queue));
                    report.findings.extend(findings);
                }
                Ok(None) => report.skipped.push(location.clone()),
                Err(e) => {
                    error!("Error checking location \"{}\": {}", location, e);
                    report.skipped.push(location.clone());
                }
            }
        }

        enter(WorkflowState::Done);
        info!(
            "Cycle done: {} location(s), {} scanned, {} finding(s)",
            report.locations.len(),
            report.scanned.len(),
            report.findings.len()
        );
        Ok(report)
    }

    /// Diagnostic pass: list every location with its first queue, no scanning.
    pub async fn probe(&self, session: &mut Session) -> Result<ProbeReport, WorkflowError> {
        self.authenticate(session).await?;
        self.open_case(session).await?;
        self.expand_panel(session).await?;
        let locations = self.list_locations(session).await?;

        let mut report = Vec::with_capacity(locations.len());
        for (index, location) in locations.into_iter().enumerate() {
            if index > 0 {
                self.open_location_menu(session).await?;
            }
            self.select_location(session, &location).await?;
            let queue = self.select_first_queue(session, &location).await?;
            info!(
                "probe: {} -> {}",
                location,
                queue.as_ref().map(Queue::name).unwrap_or("<no queues>")
            );
            report.push((location, queue));
        }
        Ok(report)
    }

    /// Selects `location` and its first queue, then scans the calendar.
    /// `Ok(None)` when the location has nothing to scan.
    async fn check_location(
        &self,
        session: &mut Session,
        location: &Location,
    ) -> Result<Option<(Queue, Vec<SlotFinding>)>, WorkflowError> {
        self.select_location(session, location).await?;

        let Some(queue) = self.select_first_queue(session, location).await? else {
            let msg = format!("⚠️ No queues available for location \"{}\" - skipping", location);
            warn!("{}", msg);
            session.notify(&msg).await;
            return Ok(None);
        };

        match self.scanner.scan(session, location, &queue).await {
            Ok(findings) => {
                enter(WorkflowState::CalendarScanned);
                Ok(Some((queue, findings)))
            }
            Err(ScanError::CalendarMissing(_)) => {
                warn!(
                    "Calendar did not load for \"{}\" - \"{}\" - skipping",
                    location, queue
                );
                Ok(None)
            }
            Err(e) => {
                error!("Calendar scan failed for \"{}\" - \"{}\": {}", location, queue, e);
                Ok(None)
            }
        }
    }

    // ── Authenticating ───────────────────────────────────────────────────────

    pub async fn authenticate(&self, session: &Session) -> Result<(), WorkflowError> {
        enter(WorkflowState::Authenticating);
        retry_with(
            self.settings.navigation_retry,
            "login",
            WorkflowError::is_retryable,
            || self.login_once(session),
        )
        .await
    }

    async fn login_once(&self, session: &Session) -> Result<(), WorkflowError> {
        let port = session.port();
        let human = session.human();
        let timeout = session.wait_timeout();

        port.navigate(&session.settings().portal.login_url()).await?;
        human.read(port).await;

        let submit = port
            .wait_until_visible(&selectors::login_submit(), timeout)
            .await
            .map_err(|e| WorkflowError::Authentication(e.to_string()))?;

        if let Ok(Some(cookie)) = port.find_visible(&selectors::cookie_dismiss()).await {
            if let Err(e) = human.click(port, cookie).await {
                debug!("cookie banner dismissal failed: {}", e);
            }
        }

        let credentials = &session.settings().credentials;
        let email = port.find(&selectors::email_input()).await?;
        human.slow_type(port, email, &credentials.email).await?;
        human.between_fields().await;

        let password = port.find(&selectors::password_input()).await?;
        human.slow_type(port, password, &credentials.password).await?;
        human.think().await;

        info!("sign in");
        human.click(port, submit).await?;
        human.wander_pointer(port).await;

        // Either the error banner or the signed-in marker settles the attempt.
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !port.find_all(&selectors::login_error()).await?.is_empty() {
                error!("Wrong password or maintenance hours");
                return Err(WorkflowError::InvalidCredentials);
            }
            if port
                .find_visible(&selectors::authenticated_marker())
                .await?
                .is_some()
            {
                info!("Signed in");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(WorkflowError::Authentication(format!(
                    "signed-in marker not shown after {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    // ── CaseOpening ──────────────────────────────────────────────────────────

    pub async fn open_case(&self, session: &Session) -> Result<(), WorkflowError> {
        enter(WorkflowState::CaseOpening);
        retry_with(
            self.settings.navigation_retry,
            "case page",
            WorkflowError::is_retryable,
            || self.open_case_once(session),
        )
        .await
    }

    async fn open_case_once(&self, session: &Session) -> Result<(), WorkflowError> {
        let port = session.port();
        let url = session.settings().portal.case_url(&session.settings().case_id);
        port.navigate(&url).await?;
        session.human().read(port).await;
        session.check_challenge().await;

        match port
            .wait_until_present(&selectors::appointment_section(), session.wait_timeout())
            .await
        {
            Ok(_) => {
                info!("Appointment section found (detected location dropdown)");
                Ok(())
            }
            Err(e) => {
                let buttons = port
                    .find_all(&selectors::any_button())
                    .await
                    .map(|b| b.len())
                    .unwrap_or(0);
                error!("Appointment section not found: {} ({} buttons on page)", e, buttons);
                Err(WorkflowError::CaseOpening(e.to_string()))
            }
        }
    }

    // ── PanelExpansion ───────────────────────────────────────────────────────

    /// Expands the appointment accordion unless the location control is
    /// already visible.
    pub async fn expand_panel(&self, session: &Session) -> Result<(), WorkflowError> {
        enter(WorkflowState::PanelExpansion);
        let port = session.port();

        if port
            .find_visible(&selectors::location_select())
            .await?
            .is_some()
        {
            info!("Panel already expanded (location dropdown visible)");
            return Ok(());
        }

        let mut heading = None;
        for candidate in port.find_all(&selectors::section_headings()).await? {
            let text = port.text(candidate).await.unwrap_or_default();
            if locale::matches_concept(Concept::Appointment, &text) {
                debug!("appointment heading: {}", text.trim());
                heading = Some(candidate);
                break;
            }
        }
        let Some(heading) = heading else {
            warn!("Appointment heading not found; assuming the panel is open");
            return Ok(());
        };

        port.execute_script(selectors::MARK_HEADING_SCRIPT, Some(heading))
            .await?;
        let button = port.find(&selectors::anchored_accordion_button()).await?;

        info!("Panel collapsed, clicking accordion button to expand");
        port.scroll_into_view(button).await?;
        session.human().think().await;
        // Script-level click: the animated layers above the button swallow
        // synthetic pointer events.
        port.execute_script("this.click(); return null;", Some(button))
            .await?;
        self.settings.panel_settle.sleep().await;
        Ok(())
    }

    // ── LocationListing ──────────────────────────────────────────────────────

    /// Opens the location menu and reads its options in portal order.
    pub async fn list_locations(&self, session: &Session) -> Result<Vec<Location>, WorkflowError> {
        enter(WorkflowState::LocationListing);
        self.open_location_menu(session).await?;

        let labels = self.read_options(session).await?;
        let locations: Vec<Location> = labels.into_iter().map(Location).collect();

        if locations.len() != self.settings.expected_locations {
            let names: Vec<&str> = locations.iter().map(Location::name).collect();
            let msg = format!(
                "⚠️ Unexpected list of locations {:?} (expected {})",
                names, self.settings.expected_locations
            );
            warn!("{}", msg);
            session.notify(&msg).await;
        }
        if locations.is_empty() {
            return Err(WorkflowError::NoLocations);
        }
        Ok(locations)
    }

    async fn open_location_menu(&self, session: &Session) -> Result<(), WorkflowError> {
        let port = session.port();
        close_open_menu(session).await;
        session.human().before_menu().await;

        let select = port
            .wait_until_visible(&selectors::location_select(), session.wait_timeout())
            .await?;
        session.human().click(port, select).await?;
        port.wait_until_visible(&selectors::option_labels(), session.wait_timeout())
            .await?;
        Ok(())
    }

    /// Labels of the open dropdown, placeholder removed.
    async fn read_options(&self, session: &Session) -> Result<Vec<String>, PortError> {
        let port = session.port();
        retry_with(
            self.settings.option_read_retry,
            "read options",
            PortError::is_transient,
            || async move {
                let mut labels = Vec::new();
                for option in port.find_all(&selectors::option_labels()).await? {
                    let label = port.text(option).await?.trim().to_string();
                    if !label.is_empty() && label != PLACEHOLDER_OPTION {
                        labels.push(label);
                    }
                }
                Ok(labels)
            },
        )
        .await
    }

    // ── LocationSelected / QueueSelected ─────────────────────────────────────

    /// Picks `location` from the open location menu.
    pub async fn select_location(
        &self,
        session: &Session,
        location: &Location,
    ) -> Result<(), WorkflowError> {
        info!("location selection ({})", location);
        let port = session.port();
        session.human().before_menu().await;

        let option = port
            .find(&selectors::option_with_label(location.name()))
            .await?;
        session.human().click(port, option).await?;
        session.wait_busy().await?;
        enter(WorkflowState::LocationSelected);
        Ok(())
    }

    /// Opens the queue menu, reads it and clicks the first queue in one go:
    /// the menu closes on blur, so nothing is awaited between reading and
    /// clicking except the click itself. `None` when no queue is offered.
    pub async fn select_first_queue(
        &self,
        session: &Session,
        location: &Location,
    ) -> Result<Option<Queue>, WorkflowError> {
        let port = session.port();
        let human = session.human();
        human.before_menu().await;

        let select = port
            .wait_until_visible(&selectors::queue_select(), session.wait_timeout())
            .await?;
        human.click(port, select).await?;

        match port
            .wait_until_visible(&selectors::option_labels(), session.wait_timeout())
            .await
        {
            Ok(_) => {}
            Err(PortError::Timeout { .. }) => {
                close_open_menu(session).await;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let queues = self.read_options(session).await?;
        let Some(first) = queues.first().cloned() else {
            close_open_menu(session).await;
            return Ok(None);
        };

        let option = port.find(&selectors::option_with_label(&first)).await?;
        port.click(option).await?;
        human.profile.post_click.sleep().await;

        if queues.len() > 1 {
            let msg = format!(
                "⚠️ Unexpected list of queues {:?} for location \"{}\" - using \"{}\"",
                queues, location, first
            );
            warn!("{}", msg);
            session.notify(&msg).await;
        }

        session.wait_busy().await?;
        info!("queue selection ({})", first);
        enter(WorkflowState::QueueSelected);
        Ok(Some(Queue(first)))
    }
}

/// Closes a dropdown left open, if any.
async fn close_open_menu(session: &Session) {
    let port = session.port();
    if let Ok(Some(backdrop)) = port.find_visible(&selectors::overlay_backdrop()).await {
        if let Err(e) = port.click(backdrop).await {
            debug!("closing menu failed: {}", e);
        }
        let _ = port
            .wait_until_gone(&selectors::overlay_backdrop(), Duration::from_secs(2))
            .await;
    }
}
