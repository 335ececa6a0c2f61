//! Scripted in-memory portal for integration tests.
//!
//! Queries are resolved by comparing them against the production selectors,
//! so a selector change that the fake does not know about shows up as a
//! missing element rather than a silent pass.

#![allow(dead_code)]

use async_trait::async_trait;
use slot_watch::challenge::{ChallengeMonitor, ChallengeSettings};
use slot_watch::core::retry::RetryPolicy;
use slot_watch::notifier::{Notifier, NotifyError};
use slot_watch::port::{ElementHandle, PortError, PortLauncher, PortResult, Size, UiPort};
use slot_watch::scraping::query::Query;
use slot_watch::scraping::selectors;
use slot_watch::session::{Credentials, Portal, SessionSettings};
use slot_watch::timing::{DelayRange, Humanizer, TimingProfile};
use slot_watch::workflow::WorkflowSettings;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

pub const EMAIL: &str = "watcher@example.com";
pub const PASSWORD: &str = "correct horse";
pub const CASE_ID: &str = "case-42";
pub const BASE_URL: &str = "https://portal.test";

// ── Scenario data ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FakeMonth {
    pub label: String,
    pub enabled: Vec<u32>,
    /// Day → number of time-slot tiles shown after clicking it.
    pub slots: HashMap<u32, usize>,
}

impl FakeMonth {
    pub fn new(label: &str, enabled: &[u32]) -> Self {
        Self {
            label: label.to_string(),
            enabled: enabled.to_vec(),
            slots: HashMap::new(),
        }
    }

    pub fn with_slots(mut self, day: u32, tiles: usize) -> Self {
        self.slots.insert(day, tiles);
        self
    }
}

#[derive(Debug, Clone)]
pub struct FakeLocation {
    pub name: String,
    pub queues: Vec<String>,
    pub months: Vec<FakeMonth>,
}

impl FakeLocation {
    pub fn new(name: &str, queues: &[&str], months: Vec<FakeMonth>) -> Self {
        Self {
            name: name.to_string(),
            queues: queues.iter().map(|q| q.to_string()).collect(),
            months,
        }
    }
}

/// Challenge elements currently rendered.
#[derive(Debug, Clone, Default)]
pub struct FakeChallenge {
    pub proceed_label: Option<String>,
    pub proceed_hidden: bool,
    pub frame: Option<Size>,
    pub overlay: Option<(Size, f64)>,
    pub dialog_text: Option<String>,
}

impl FakeChallenge {
    fn is_empty(&self) -> bool {
        self.proceed_label.is_none()
            && self.frame.is_none()
            && self.overlay.is_none()
            && self.dialog_text.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Blank,
    Login,
    Case,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Menu {
    Location,
    Queue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Email,
    Password,
}

/// Everything the fake renders from.
#[derive(Debug, Clone, PartialEq)]
enum El {
    LoginSubmit,
    CookieDismiss,
    EmailInput,
    PasswordInput,
    LoginError,
    AuthMarker,
    AppointmentSection,
    Button(usize),
    Heading(usize),
    AccordionButton,
    LocationSelect,
    QueueSelect,
    OptionLabel(String),
    Backdrop,
    Busy,
    Calendar,
    MonthLabel,
    NextMonth,
    PreviousMonth,
    DayCell(u32),
    SlotContainer,
    SlotTile(usize),
    ProceedControl,
    ChallengeFrame,
    ChallengeOverlay,
    ChallengeDialog,
}

#[derive(Debug)]
pub struct FakeState {
    // scenario
    pub locations: Vec<FakeLocation>,
    pub headings: Vec<String>,
    pub panel_expanded: bool,
    pub cookie_banner: bool,
    /// Submits rejected with the error banner before one succeeds.
    pub reject_logins: u32,
    pub case_page_loads: bool,
    pub challenge: FakeChallenge,
    /// Challenge shown when the case page is opened, cleared after the delay.
    pub challenge_on_case: Option<(FakeChallenge, Duration)>,
    pub busy_polls_per_action: u32,

    // live page
    pub page: Page,
    pub logged_in: bool,
    pub login_error_shown: bool,
    pub heading_anchor: Option<usize>,
    pub open_menu: Option<Menu>,
    pub selected_location: Option<usize>,
    pub queue_selected: bool,
    pub view: usize,
    pub selected_day: Option<u32>,
    challenge_clears_at: Option<Instant>,
    busy_polls: u32,
    focus: Option<Field>,
    typed_email: String,
    typed_password: String,
    elements: Vec<El>,

    // observations
    pub navigations: Vec<String>,
    pub login_attempts: u32,
    pub submitted_email: Option<String>,
    pub next_clicks: u32,
    pub previous_clicks: u32,
    pub day_clicks: Vec<(String, u32)>,
    pub pointer_moves: u32,
    pub closes: u32,
    pub launches: u32,
}

impl FakeState {
    pub fn new(locations: Vec<FakeLocation>) -> Self {
        Self {
            locations,
            headings: vec!["Dodaj załączniki".into(), "Umów wizytę".into()],
            panel_expanded: false,
            cookie_banner: true,
            reject_logins: 0,
            case_page_loads: true,
            challenge: FakeChallenge::default(),
            challenge_on_case: None,
            busy_polls_per_action: 1,
            page: Page::Blank,
            logged_in: false,
            login_error_shown: false,
            heading_anchor: None,
            open_menu: None,
            selected_location: None,
            queue_selected: false,
            view: 0,
            selected_day: None,
            challenge_clears_at: None,
            busy_polls: 0,
            focus: None,
            typed_email: String::new(),
            typed_password: String::new(),
            elements: Vec::new(),
            navigations: Vec::new(),
            login_attempts: 0,
            submitted_email: None,
            next_clicks: 0,
            previous_clicks: 0,
            day_clicks: Vec::new(),
            pointer_moves: 0,
            closes: 0,
            launches: 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closes > 0
    }

    fn location(&self) -> Option<&FakeLocation> {
        self.selected_location.and_then(|i| self.locations.get(i))
    }

    fn month(&self) -> Option<&FakeMonth> {
        if !self.queue_selected {
            return None;
        }
        self.location().and_then(|l| l.months.get(self.view))
    }

    fn active_challenge(&self) -> Option<&FakeChallenge> {
        if let Some(until) = self.challenge_clears_at {
            if Instant::now() >= until {
                return None;
            }
        }
        (!self.challenge.is_empty()).then_some(&self.challenge)
    }

    fn menu_options(&self) -> Vec<String> {
        let mut options = vec![selectors::PLACEHOLDER_OPTION.to_string()];
        match self.open_menu {
            Some(Menu::Location) => options.extend(self.locations.iter().map(|l| l.name.clone())),
            Some(Menu::Queue) => {
                if let Some(loc) = self.location() {
                    options.extend(loc.queues.iter().cloned());
                }
            }
            None => return Vec::new(),
        }
        options
    }

    fn on_case_page(&self) -> bool {
        self.page == Page::Case && self.logged_in && self.case_page_loads
    }

    /// Elements matching `query` right now.
    fn resolve(&mut self, query: &Query) -> Vec<El> {
        let q = query;
        if *q == selectors::login_submit() && self.page == Page::Login {
            return vec![El::LoginSubmit];
        }
        if *q == selectors::cookie_dismiss() && self.page == Page::Login && self.cookie_banner {
            return vec![El::CookieDismiss];
        }
        if *q == selectors::email_input() && self.page == Page::Login {
            return vec![El::EmailInput];
        }
        if *q == selectors::password_input() && self.page == Page::Login {
            return vec![El::PasswordInput];
        }
        if *q == selectors::login_error() {
            return if self.login_error_shown {
                vec![El::LoginError]
            } else {
                vec![]
            };
        }
        if *q == selectors::authenticated_marker() {
            return if self.logged_in && self.page != Page::Blank {
                vec![El::AuthMarker]
            } else {
                vec![]
            };
        }
        if *q == selectors::busy_indicator() {
            if self.busy_polls > 0 {
                self.busy_polls -= 1;
                return vec![El::Busy];
            }
            return vec![];
        }

        // Challenge probes work on any page.
        if *q == selectors::challenge_proceed_controls() {
            return match self.active_challenge() {
                Some(c) if c.proceed_label.is_some() => vec![El::ProceedControl],
                _ => vec![],
            };
        }
        if *q == selectors::vendor_challenge_frame() {
            return match self.active_challenge() {
                Some(c) if c.frame.is_some() => vec![El::ChallengeFrame],
                _ => vec![],
            };
        }
        if selectors::vendor_challenge_overlays().first() == Some(q) {
            return match self.active_challenge() {
                Some(c) if c.overlay.is_some() => vec![El::ChallengeOverlay],
                _ => vec![],
            };
        }
        if selectors::vendor_challenge_overlays().contains(q) {
            return vec![];
        }
        if *q == selectors::dialog_containers() {
            return match self.active_challenge() {
                Some(c) if c.dialog_text.is_some() => vec![El::ChallengeDialog],
                _ => vec![],
            };
        }

        if !self.on_case_page() {
            return vec![];
        }

        if *q == selectors::appointment_section() {
            return vec![El::AppointmentSection];
        }
        if *q == selectors::any_button() {
            return (0..3).map(El::Button).collect();
        }
        if *q == selectors::section_headings() {
            return (0..self.headings.len()).map(El::Heading).collect();
        }
        if *q == selectors::anchored_accordion_button() {
            return if self.heading_anchor.is_some() {
                vec![El::AccordionButton]
            } else {
                vec![]
            };
        }
        if *q == selectors::location_select() {
            return vec![El::LocationSelect];
        }
        if *q == selectors::queue_select() {
            return if self.selected_location.is_some() && self.panel_expanded {
                vec![El::QueueSelect]
            } else {
                vec![]
            };
        }
        if *q == selectors::option_labels() {
            return self.menu_options().into_iter().map(El::OptionLabel).collect();
        }
        if *q == selectors::overlay_backdrop() {
            return if self.open_menu.is_some() {
                vec![El::Backdrop]
            } else {
                vec![]
            };
        }
        for label in self.menu_options() {
            if *q == selectors::option_with_label(&label) {
                return vec![El::OptionLabel(label)];
            }
        }

        let Some(month) = self.month().cloned() else {
            return vec![];
        };
        if *q == selectors::calendar() {
            return vec![El::Calendar];
        }
        if *q == selectors::month_label() {
            return vec![El::MonthLabel];
        }
        if *q == selectors::next_month() {
            return vec![El::NextMonth];
        }
        if *q == selectors::previous_month() {
            return vec![El::PreviousMonth];
        }
        if *q == selectors::enabled_day_cells() {
            return month.enabled.iter().copied().map(El::DayCell).collect();
        }
        let tiles = self.selected_day.and_then(|d| month.slots.get(&d).copied());
        if *q == selectors::slot_container() {
            return tiles.map(|_| vec![El::SlotContainer]).unwrap_or_default();
        }
        if *q == selectors::slot_tiles() {
            return (0..tiles.unwrap_or(0)).map(El::SlotTile).collect();
        }
        vec![]
    }

    fn handle(&mut self, el: El) -> ElementHandle {
        self.elements.push(el);
        ElementHandle((self.elements.len() - 1) as u64)
    }

    fn element(&self, handle: ElementHandle) -> PortResult<El> {
        self.elements
            .get(handle.0 as usize)
            .cloned()
            .ok_or(PortError::Stale)
    }

    fn start_busy(&mut self) {
        self.busy_polls = self.busy_polls_per_action;
    }

    fn displayed(&self, el: &El) -> bool {
        match el {
            El::LocationSelect | El::QueueSelect => self.panel_expanded && self.on_case_page(),
            El::OptionLabel(label) => self.menu_options().contains(label),
            El::Backdrop => self.open_menu.is_some(),
            El::CookieDismiss => self.cookie_banner,
            El::ProceedControl => self
                .active_challenge()
                .map(|c| !c.proceed_hidden)
                .unwrap_or(false),
            El::ChallengeFrame | El::ChallengeOverlay | El::ChallengeDialog => {
                self.active_challenge().is_some()
            }
            _ => true,
        }
    }

    fn click(&mut self, el: El) -> PortResult<()> {
        match el {
            El::CookieDismiss => self.cookie_banner = false,
            El::EmailInput => self.focus = Some(Field::Email),
            El::PasswordInput => self.focus = Some(Field::Password),
            El::LoginSubmit => {
                self.login_attempts += 1;
                self.submitted_email = Some(self.typed_email.clone());
                let accepted = self.typed_email == EMAIL && self.typed_password == PASSWORD;
                if accepted && self.login_attempts > self.reject_logins {
                    self.logged_in = true;
                } else {
                    self.login_error_shown = true;
                }
            }
            El::LocationSelect => {
                self.open_menu = Some(Menu::Location);
            }
            El::QueueSelect => {
                self.open_menu = Some(Menu::Queue);
            }
            El::OptionLabel(label) => {
                if !self.menu_options().contains(&label) {
                    return Err(PortError::Stale);
                }
                match self.open_menu.take() {
                    Some(Menu::Location) => {
                        self.selected_location = self.locations.iter().position(|l| l.name == label);
                        self.queue_selected = false;
                        self.view = 0;
                        self.selected_day = None;
                    }
                    Some(Menu::Queue) => {
                        self.queue_selected = true;
                        self.view = 0;
                        self.selected_day = None;
                    }
                    None => {}
                }
                self.start_busy();
            }
            El::Backdrop => self.open_menu = None,
            El::NextMonth => {
                self.next_clicks += 1;
                self.view += 1;
                self.selected_day = None;
                self.start_busy();
            }
            El::PreviousMonth => {
                self.previous_clicks += 1;
                self.view = self.view.saturating_sub(1);
                self.selected_day = None;
                self.start_busy();
            }
            El::DayCell(day) => {
                let label = self.month().map(|m| m.label.clone()).unwrap_or_default();
                self.day_clicks.push((label, day));
                self.selected_day = Some(day);
                self.start_busy();
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&self, el: &El) -> String {
        match el {
            El::Heading(i) => self.headings.get(*i).cloned().unwrap_or_default(),
            El::OptionLabel(label) => format!(" {} ", label),
            El::MonthLabel => self.month().map(|m| m.label.clone()).unwrap_or_default(),
            El::DayCell(day) => format!(" {} ", day),
            El::LoginError => "Incorrect email or password".into(),
            El::ProceedControl => self
                .challenge
                .proceed_label
                .clone()
                .unwrap_or_default(),
            El::ChallengeDialog => self.challenge.dialog_text.clone().unwrap_or_default(),
            El::LoginSubmit => "Zaloguj".into(),
            _ => String::new(),
        }
    }

    fn navigate(&mut self, url: &str) {
        self.navigations.push(url.to_string());
        self.elements.clear();
        self.open_menu = None;
        self.selected_location = None;
        self.queue_selected = false;
        self.selected_day = None;
        self.login_error_shown = false;
        self.heading_anchor = None;
        self.typed_email.clear();
        self.typed_password.clear();

        if url.ends_with("/login") {
            self.page = Page::Login;
        } else if url.contains("/home/cases/") {
            if self.logged_in {
                self.page = Page::Case;
                if let Some((challenge, clears_after)) = self.challenge_on_case.take() {
                    self.challenge = challenge;
                    self.challenge_clears_at = Some(Instant::now() + clears_after);
                }
            } else {
                self.page = Page::Login;
            }
        } else {
            self.page = Page::Blank;
        }
    }

    /// Fresh browser: signed out, blank page, scenario data kept.
    fn relaunch(&mut self) {
        self.launches += 1;
        self.page = Page::Blank;
        self.logged_in = false;
        self.elements.clear();
        self.open_menu = None;
        self.selected_location = None;
        self.queue_selected = false;
        self.view = 0;
        self.selected_day = None;
    }
}

// ── UiPort ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct FakePortal {
    state: Arc<Mutex<FakeState>>,
    pub panic_on_navigate: bool,
}

impl FakePortal {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            panic_on_navigate: false,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state lock")
    }
}

#[async_trait]
impl UiPort for FakePortal {
    async fn navigate(&self, url: &str) -> PortResult<()> {
        if self.panic_on_navigate {
            panic!("renderer crashed while loading {}", url);
        }
        self.state().navigate(url);
        Ok(())
    }

    async fn find_all(&self, query: &Query) -> PortResult<Vec<ElementHandle>> {
        let mut state = self.state();
        if state.is_closed() {
            return Err(PortError::Closed);
        }
        let found = state.resolve(query);
        Ok(found.into_iter().map(|el| state.handle(el)).collect())
    }

    async fn click(&self, element: ElementHandle) -> PortResult<()> {
        let mut state = self.state();
        let el = state.element(element)?;
        state.click(el)
    }

    async fn type_text(&self, element: ElementHandle, text: &str) -> PortResult<()> {
        let mut state = self.state();
        let el = state.element(element)?;
        match (el, state.focus) {
            (El::EmailInput, Some(Field::Email)) => state.typed_email.push_str(text),
            (El::PasswordInput, Some(Field::Password)) => state.typed_password.push_str(text),
            _ => return Err(PortError::Browser("typing into unfocused element".into())),
        }
        Ok(())
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> PortResult<()> {
        self.state().element(element).map(|_| ())
    }

    async fn execute_script(
        &self,
        script: &str,
        target: Option<ElementHandle>,
    ) -> PortResult<serde_json::Value> {
        let mut state = self.state();
        let target = target.map(|h| state.element(h)).transpose()?;
        match (script, target) {
            (selectors::MARK_HEADING_SCRIPT, Some(El::Heading(i))) => {
                state.heading_anchor = Some(i);
            }
            ("this.click(); return null;", Some(El::AccordionButton)) => {
                state.panel_expanded = true;
            }
            ("this.click(); return null;", Some(el)) => state.click(el)?,
            _ => {}
        }
        Ok(serde_json::Value::Null)
    }

    async fn text(&self, element: ElementHandle) -> PortResult<String> {
        let state = self.state();
        let el = state.element(element)?;
        Ok(state.text(&el))
    }

    async fn is_displayed(&self, element: ElementHandle) -> PortResult<bool> {
        let state = self.state();
        let el = state.element(element)?;
        Ok(state.displayed(&el))
    }

    async fn size(&self, element: ElementHandle) -> PortResult<Size> {
        let state = self.state();
        let size = match state.element(element)? {
            El::ChallengeFrame => state.challenge.frame.unwrap_or_default(),
            El::ChallengeOverlay => state.challenge.overlay.map(|(s, _)| s).unwrap_or_default(),
            _ => Size {
                width: 120.0,
                height: 40.0,
            },
        };
        Ok(size)
    }

    async fn css_property(&self, element: ElementHandle, name: &str) -> PortResult<String> {
        let state = self.state();
        match (state.element(element)?, name) {
            (El::ChallengeOverlay, "opacity") => Ok(state
                .challenge
                .overlay
                .map(|(_, o)| o.to_string())
                .unwrap_or_else(|| "1".into())),
            _ => Ok(String::new()),
        }
    }

    async fn hover(&self, element: ElementHandle, _dx: f64, _dy: f64) -> PortResult<()> {
        let mut state = self.state();
        state.element(element)?;
        state.pointer_moves += 1;
        Ok(())
    }

    async fn move_pointer(&self, _x: f64, _y: f64) -> PortResult<()> {
        self.state().pointer_moves += 1;
        Ok(())
    }

    async fn viewport(&self) -> PortResult<Size> {
        Ok(Size {
            width: 1300.0,
            height: 800.0,
        })
    }

    async fn close(&self) -> PortResult<()> {
        self.state().closes += 1;
        Ok(())
    }
}

/// Hands out the same scripted portal for every cycle.
pub struct FakeLauncher {
    pub portal: FakePortal,
    pub launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(portal: FakePortal) -> Self {
        Self {
            portal,
            launches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PortLauncher for FakeLauncher {
    async fn launch(&self) -> PortResult<Box<dyn UiPort>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.portal.state();
            state.relaunch();
            state.closes = 0;
        }
        Ok(Box::new(self.portal.clone()))
    }
}

// ── Notifier ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("notifier lock").clone()
    }

    pub fn count_containing(&self, fragment: &str) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.contains(fragment))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .expect("notifier lock")
            .push(message.to_string());
        Ok(())
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

pub fn session_settings() -> SessionSettings {
    SessionSettings {
        credentials: Credentials {
            email: EMAIL.into(),
            password: PASSWORD.into(),
        },
        case_id: CASE_ID.into(),
        portal: Portal::parse(BASE_URL).expect("test portal url"),
        wait_timeout: Duration::from_secs(5),
        human: Humanizer::new(TimingProfile::instant()),
        challenges: ChallengeMonitor::new(ChallengeSettings::default(), Duration::from_secs(5)),
    }
}

pub fn workflow_settings(expected_locations: usize) -> WorkflowSettings {
    WorkflowSettings {
        expected_locations,
        navigation_retry: RetryPolicy::linear(3, Duration::from_secs(1)),
        option_read_retry: RetryPolicy::immediate(2),
        panel_settle: DelayRange::new(0, 0),
    }
}

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
