//! Per-cycle session.
//!
//! A [`Session`] exclusively owns the automation port for one scheduler
//! cycle. It also owns the only state that spans locations within a cycle,
//! the furthest-date cache, which is dropped together with the session.

use crate::core::types::FurthestDateCache;
use crate::features::challenge::{ChallengeKind, ChallengeMonitor};
use crate::features::notifier::{notify, Notifier};
use crate::features::timing::Humanizer;
use crate::scraping::port::{PortResult, UiPort};
use crate::scraping::selectors;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Addresses on the portal.
#[derive(Debug, Clone)]
pub struct Portal {
    base: Url,
}

impl Portal {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn parse(base: &str) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &str {
        self.base.as_str()
    }

    pub fn login_url(&self) -> String {
        self.join("login")
    }

    pub fn case_url(&self, case_id: &str) -> String {
        self.join(&format!("home/cases/{}", case_id))
    }

    fn join(&self, path: &str) -> String {
        self.base
            .join(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.base, path))
    }
}

/// Everything a session needs besides the port and the notifier.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub credentials: Credentials,
    pub case_id: String,
    pub portal: Portal,
    /// Timeout for every wait on the remote UI.
    pub wait_timeout: Duration,
    pub human: Humanizer,
    pub challenges: ChallengeMonitor,
}

pub struct Session {
    port: Box<dyn UiPort>,
    notifier: Arc<dyn Notifier>,
    settings: SessionSettings,
    furthest_date: Option<FurthestDateCache>,
    closed: bool,
}

impl Session {
    pub fn new(port: Box<dyn UiPort>, notifier: Arc<dyn Notifier>, settings: SessionSettings) -> Self {
        Self {
            port,
            notifier,
            settings,
            furthest_date: None,
            closed: false,
        }
    }

    pub fn port(&self) -> &dyn UiPort {
        self.port.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn human(&self) -> &Humanizer {
        &self.settings.human
    }

    pub fn wait_timeout(&self) -> Duration {
        self.settings.wait_timeout
    }

    pub async fn notify(&self, message: &str) {
        notify(self.notifier.as_ref(), message).await;
    }

    /// Short random pause, then wait for the busy indicator to clear.
    pub async fn wait_busy(&self) -> PortResult<()> {
        self.settings.human.before_busy_wait().await;
        self.port
            .wait_until_gone(&selectors::busy_indicator(), self.settings.wait_timeout)
            .await
    }

    /// Runs the challenge monitor against the current page.
    pub async fn check_challenge(&self) -> Option<ChallengeKind> {
        self.settings
            .challenges
            .check(self.port.as_ref(), self.notifier.as_ref())
            .await
    }

    pub fn furthest_date(&self) -> Option<&FurthestDateCache> {
        self.furthest_date.as_ref()
    }

    pub fn remember_furthest_date(&mut self, cache: FurthestDateCache) {
        debug!(
            "Caching furthest date: day {} ({}), {} month(s) forward",
            cache.day, cache.month_label, cache.months_forward
        );
        self.furthest_date = Some(cache);
    }

    /// Releases the browser and forgets the cache. Safe to call twice.
    pub async fn close(&mut self) {
        self.furthest_date = None;
        if self.closed {
            return;
        }
        self.closed = true;
        match self.port.close().await {
            Ok(()) => info!("Session closed"),
            Err(e) => warn!("Session close failed: {}", e),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
