//! Anti-automation challenge detection and the pause/resume protocol.
//!
//! Detection is priority ordered and visibility gated; the first indicator
//! found names the challenge. The monitor never interacts with a challenge:
//! it tells the operator, waits out a cooldown so a human can resolve it in
//! the browser window, and hands control back.

use crate::core::locale::{self, Concept};
use crate::features::notifier::{notify, Notifier};
use crate::scraping::port::{PortResult, UiPort};
use crate::scraping::selectors;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which indicator identified the challenge, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChallengeKind {
    ProceedControl,
    VendorFrame,
    VendorOverlay,
    DialogPrompt,
}

impl ChallengeKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ChallengeKind::ProceedControl => "proceed button",
            ChallengeKind::VendorFrame => "Akamai challenge frame",
            ChallengeKind::VendorOverlay => "Akamai challenge overlay",
            ChallengeKind::DialogPrompt => "challenge dialog text",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Thresholds and cooldown.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChallengeSettings {
    /// Pause for manual resolution. Default 2 minutes.
    #[serde(with = "crate::core::durations::serde_compact")]
    pub cooldown: Duration,
    /// A vendor frame smaller than this in either dimension is a tracking
    /// pixel, not a challenge.
    pub min_frame_side: f64,
    /// Minimum rendered area (px²) of a vendor overlay.
    pub min_overlay_area: f64,
    /// Overlays at or below this opacity are fading in or out.
    pub min_overlay_opacity: f64,
    /// Wait for the busy indicator to clear after the cooldown.
    pub wait_busy_after: bool,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(120),
            min_frame_side: 50.0,
            min_overlay_area: 10_000.0,
            min_overlay_opacity: 0.1,
            wait_busy_after: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChallengeMonitor {
    pub settings: ChallengeSettings,
    /// Upper bound for the post-cooldown busy wait.
    pub busy_timeout: Duration,
}

impl ChallengeMonitor {
    pub fn new(settings: ChallengeSettings, busy_timeout: Duration) -> Self {
        Self {
            settings,
            busy_timeout,
        }
    }

    /// Runs detection once. Port failures while probing count as "no
    /// challenge": the page is then in a state the next step will report.
    pub async fn detect(&self, port: &dyn UiPort) -> Option<ChallengeKind> {
        match self.probe(port).await {
            Ok(found) => found,
            Err(e) => {
                debug!("Challenge probe error: {}", e);
                None
            }
        }
    }

    /// Detects, and on a hit notifies once and sleeps the cooldown once.
    pub async fn check(
        &self,
        port: &dyn UiPort,
        notifier: &dyn Notifier,
    ) -> Option<ChallengeKind> {
        let kind = self.detect(port).await?;

        let message = format!(
            "⚠️ CHALLENGE DETECTED ({})! Please solve it manually within {}",
            kind,
            describe_wait(self.settings.cooldown)
        );
        warn!("{}", message);
        notify(notifier, &message).await;

        tokio::time::sleep(self.settings.cooldown).await;
        info!("Challenge cooldown over, resuming");

        if self.settings.wait_busy_after {
            if let Err(e) = port
                .wait_until_gone(&selectors::busy_indicator(), self.busy_timeout)
                .await
            {
                warn!("Busy indicator still shown after challenge: {}", e);
            }
        }
        Some(kind)
    }

    async fn probe(&self, port: &dyn UiPort) -> PortResult<Option<ChallengeKind>> {
        if self.proceed_control_shown(port).await? {
            return Ok(Some(ChallengeKind::ProceedControl));
        }
        if self.vendor_frame_shown(port).await? {
            return Ok(Some(ChallengeKind::VendorFrame));
        }
        if self.vendor_overlay_shown(port).await? {
            return Ok(Some(ChallengeKind::VendorOverlay));
        }
        if self.dialog_prompt_shown(port).await? {
            return Ok(Some(ChallengeKind::DialogPrompt));
        }
        Ok(None)
    }

    async fn proceed_control_shown(&self, port: &dyn UiPort) -> PortResult<bool> {
        for control in port.find_all(&selectors::challenge_proceed_controls()).await? {
            if !port.is_displayed(control).await.unwrap_or(false) {
                continue;
            }
            let label = port.text(control).await.unwrap_or_default();
            if locale::matches_concept(Concept::ChallengeProceed, &label) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn vendor_frame_shown(&self, port: &dyn UiPort) -> PortResult<bool> {
        let min = self.settings.min_frame_side;
        for frame in port.find_all(&selectors::vendor_challenge_frame()).await? {
            if !port.is_displayed(frame).await.unwrap_or(false) {
                continue;
            }
            if let Ok(size) = port.size(frame).await {
                if size.width >= min && size.height >= min {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn vendor_overlay_shown(&self, port: &dyn UiPort) -> PortResult<bool> {
        for query in selectors::vendor_challenge_overlays() {
            for overlay in port.find_all(&query).await? {
                if !port.is_displayed(overlay).await.unwrap_or(false) {
                    continue;
                }
                let Ok(size) = port.size(overlay).await else {
                    continue;
                };
                if size.area() < self.settings.min_overlay_area {
                    continue;
                }
                let opacity = port
                    .css_property(overlay, "opacity")
                    .await
                    .ok()
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(1.0);
                if opacity > self.settings.min_overlay_opacity {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn dialog_prompt_shown(&self, port: &dyn UiPort) -> PortResult<bool> {
        for dialog in port.find_all(&selectors::dialog_containers()).await? {
            if !port.is_displayed(dialog).await.unwrap_or(false) {
                continue;
            }
            let text = port.text(dialog).await.unwrap_or_default();
            if locale::matches_concept(Concept::ChallengePrompt, &text) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn describe_wait(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        format!("{} seconds", secs)
    }
}
