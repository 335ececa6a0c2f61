//! Human-pacing timing model.
//!
//! Every simulated user action is wrapped in delays drawn from a bounded
//! range, with a distinct range per action kind. Constant pauses are an
//! automation signature of their own, so nothing here sleeps a fixed amount.

use crate::scraping::port::{ElementHandle, PortResult, UiPort};
use rand::prelude::*;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Inclusive delay range in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Draws a delay uniformly from the range. Swapped bounds are tolerated.
    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(lo..=hi))
    }

    pub async fn sleep(&self) {
        tokio::time::sleep(self.sample()).await;
    }
}

/// Tunable ranges for every action kind.
///
/// Defaults follow the pacing the portal tolerated in practice.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingProfile {
    /// "Thinking" before a click. Default 300-800ms.
    pub pre_click: DelayRange,
    /// Between pointer placement and the click itself. Default 100-300ms.
    pub pointer_settle: DelayRange,
    /// Settle after a click. Default 200-500ms.
    pub post_click: DelayRange,
    /// Pointer offset from the element centre, as a fraction of the element
    /// size in each direction. Default 0.3.
    pub pointer_offset_fraction: f64,
    /// Per keystroke while typing. Default 50-150ms.
    pub keystroke: DelayRange,
    /// Pause between form fields. Default 500-1200ms.
    pub between_fields: DelayRange,
    /// Reading pause after page loads. Default 1500-3000ms.
    pub reading: DelayRange,
    /// Probability of wandering the pointer during a reading pause. Default 0.3.
    pub pointer_wander_chance: f64,
    /// Pause between wandering pointer moves. Default 200-500ms.
    pub pointer_wander_pause: DelayRange,
    /// Before opening a dropdown or selecting an option. Default 2000-5000ms.
    pub before_menu: DelayRange,
    /// Before clicking the probed calendar day. Default 150-500ms.
    pub before_day: DelayRange,
    /// Before switching months. Default 150-350ms.
    pub before_month_switch: DelayRange,
    /// Short random pause before waiting on the busy indicator. Default 300-500ms.
    pub before_busy_wait: DelayRange,
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self {
            pre_click: DelayRange::new(300, 800),
            pointer_settle: DelayRange::new(100, 300),
            post_click: DelayRange::new(200, 500),
            pointer_offset_fraction: 0.3,
            keystroke: DelayRange::new(50, 150),
            between_fields: DelayRange::new(500, 1200),
            reading: DelayRange::new(1500, 3000),
            pointer_wander_chance: 0.3,
            pointer_wander_pause: DelayRange::new(200, 500),
            before_menu: DelayRange::new(2000, 5000),
            before_day: DelayRange::new(150, 500),
            before_month_switch: DelayRange::new(150, 350),
            before_busy_wait: DelayRange::new(300, 500),
        }
    }
}

impl TimingProfile {
    /// Near-zero pacing for tests and dry runs.
    pub fn instant() -> Self {
        let zero = DelayRange::new(0, 0);
        Self {
            pre_click: zero,
            pointer_settle: zero,
            post_click: zero,
            pointer_offset_fraction: 0.0,
            keystroke: zero,
            between_fields: zero,
            reading: zero,
            pointer_wander_chance: 0.0,
            pointer_wander_pause: zero,
            before_menu: zero,
            before_day: zero,
            before_month_switch: zero,
            before_busy_wait: zero,
        }
    }
}

/// Applies a [`TimingProfile`] around port actions.
#[derive(Debug, Clone, Default)]
pub struct Humanizer {
    pub profile: TimingProfile,
}

impl Humanizer {
    pub fn new(profile: TimingProfile) -> Self {
        Self { profile }
    }

    /// Think, place the pointer off-centre inside the element, click, settle.
    pub async fn click(&self, port: &dyn UiPort, element: ElementHandle) -> PortResult<()> {
        self.profile.pre_click.sleep().await;

        let (dx, dy) = match port.size(element).await {
            Ok(size) => self.pointer_offset(size.width, size.height),
            Err(_) => (0.0, 0.0),
        };
        if let Err(e) = port.hover(element, dx, dy).await {
            debug!("pointer placement skipped: {}", e);
        }
        self.profile.pointer_settle.sleep().await;

        port.click(element).await?;
        self.profile.post_click.sleep().await;
        Ok(())
    }

    /// Focus the field, then type one character at a time.
    pub async fn slow_type(
        &self,
        port: &dyn UiPort,
        element: ElementHandle,
        text: &str,
    ) -> PortResult<()> {
        port.click(element).await?;
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            port.type_text(element, ch.encode_utf8(&mut buf)).await?;
            self.profile.keystroke.sleep().await;
        }
        Ok(())
    }

    /// Idle "reading" pause, occasionally wandering the pointer.
    pub async fn read(&self, port: &dyn UiPort) {
        let wander = {
            let mut rng = rand::rng();
            rng.random_range(0.0..1.0) < self.profile.pointer_wander_chance
        };
        if wander {
            self.wander_pointer(port).await;
        }
        self.profile.reading.sleep().await;
    }

    /// One to three pointer moves to random viewport points. Failures are
    /// ignored; pointer movement is cosmetic.
    pub async fn wander_pointer(&self, port: &dyn UiPort) {
        let Ok(viewport) = port.viewport().await else {
            return;
        };
        let points: Vec<(f64, f64)> = {
            let mut rng = rand::rng();
            let moves = rng.random_range(1..=3usize);
            let max_x = (viewport.width - 100.0).max(101.0);
            let max_y = (viewport.height - 100.0).max(101.0);
            (0..moves)
                .map(|_| (rng.random_range(100.0..max_x), rng.random_range(100.0..max_y)))
                .collect()
        };
        for (x, y) in points {
            if port.move_pointer(x, y).await.is_err() {
                return;
            }
            self.profile.pointer_wander_pause.sleep().await;
        }
    }

    pub async fn think(&self) {
        self.profile.pre_click.sleep().await;
    }

    pub async fn between_fields(&self) {
        self.profile.between_fields.sleep().await;
    }

    pub async fn before_menu(&self) {
        self.profile.before_menu.sleep().await;
    }

    pub async fn before_day(&self) {
        self.profile.before_day.sleep().await;
    }

    pub async fn before_month_switch(&self) {
        self.profile.before_month_switch.sleep().await;
    }

    pub async fn before_busy_wait(&self) {
        self.profile.before_busy_wait.sleep().await;
    }

    fn pointer_offset(&self, width: f64, height: f64) -> (f64, f64) {
        let fraction = self.profile.pointer_offset_fraction.clamp(0.0, 0.5);
        let span_x = (width * fraction).floor();
        let span_y = (height * fraction).floor();
        let mut rng = rand::rng();
        let dx = if span_x > 0.0 {
            rng.random_range(-span_x..=span_x)
        } else {
            0.0
        };
        let dy = if span_y > 0.0 {
            rng.random_range(-span_y..=span_y)
        } else {
            0.0
        };
        (dx, dy)
    }
}
