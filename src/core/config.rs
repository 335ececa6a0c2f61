use crate::core::durations::parse_duration;
use crate::features::calendar::{CalendarScanner, FrontierPolicy, ScanMode, ScannerSettings};
use crate::features::challenge::{ChallengeMonitor, ChallengeSettings};
use crate::features::notifier::{ConsoleNotifier, Notifier, TelegramNotifier};
use crate::features::scheduler::{parse_windows, Schedule, WorkingHoursWindow};
use crate::features::session::{Credentials, Portal, SessionSettings};
use crate::features::timing::{Humanizer, TimingProfile};
use crate::features::workflow::{Workflow, WorkflowSettings};
use crate::scraping::browser_manager::LaunchOptions;
use crate::scraping::chromium::ChromiumLauncher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// WatchConfig: file-based config loader (slot-watch.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const CONFIG_FILE_NAME: &str = "slot-watch.json";
pub const ENV_CONFIG_PATH: &str = "SLOT_WATCH_CONFIG";
pub const DEFAULT_PORTAL_URL: &str = "https://inpol.mazowieckie.pl";
pub const DEFAULT_WORKING_HOURS: &str = "7h30m-29h59m59s,0s-57m";

/// Raw contents of `slot-watch.json`. Every field is optional; a missing
/// field falls back to its environment variable, then to the default.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct WatchConfig {
    pub email: Option<String>,
    /// Never logged.
    pub password: Option<String>,
    pub case_id: Option<String>,
    pub portal_url: Option<String>,
    pub page_load_timeout: Option<String>,
    pub expected_locations: Option<usize>,
    pub scan_mode: Option<String>,
    pub months_to_check: Option<u32>,
    /// Comma-separated `BEGIN-END` offsets from midnight.
    pub working_hours: Option<String>,
    pub sleep_interval: Option<String>,
    pub sleep_interval_jitter: Option<String>,
    pub challenge_cooldown: Option<String>,
    /// `WIDTH,HEIGHT`.
    pub window_size: Option<String>,
    pub headless: Option<bool>,
    pub profile_path: Option<String>,
    pub proxy_server: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub log_level: Option<String>,
    pub timing: Option<TimingProfile>,
    pub frontier: Option<FrontierPolicy>,
}

/// Result of looking for a config file.
#[derive(Debug, Default)]
pub struct LoadedConfig {
    pub config: WatchConfig,
    pub source: Option<PathBuf>,
    /// Parse error of the file that was found, if any.
    pub problem: Option<String>,
}

/// Load `slot-watch.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `SLOT_WATCH_CONFIG` env var path
/// 2. `./slot-watch.json`
/// 3. `../slot-watch.json`
/// 4. `~/.slot-watch/slot-watch.json`
///
/// Missing file → defaults (all env-var fallbacks apply).
/// Parse error → reported in [`LoadedConfig::problem`], defaults used.
/// Nothing is logged here: this runs before the subscriber is installed.
pub fn load_config() -> LoadedConfig {
    let mut candidates = vec![
        PathBuf::from(CONFIG_FILE_NAME),
        PathBuf::from("..").join(CONFIG_FILE_NAME),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".slot-watch").join(CONFIG_FILE_NAME));
    }
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in candidates {
        let Ok(contents) = std::fs::read_to_string(&path) else {
            continue;
        };
        return match serde_json::from_str::<WatchConfig>(&contents) {
            Ok(config) => LoadedConfig {
                config,
                source: Some(path),
                problem: None,
            },
            Err(e) => LoadedConfig {
                config: WatchConfig::default(),
                problem: Some(format!("{} parse error at {}: {}", CONFIG_FILE_NAME, path.display(), e)),
                source: Some(path),
            },
        };
    }
    LoadedConfig::default()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting '{field}' (set {env} or \"{field}\" in slot-watch.json)")]
    Missing {
        field: &'static str,
        env: &'static str,
    },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Settings: fully resolved configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub case_id: String,
    pub portal: Portal,
    pub page_load_timeout: Duration,
    pub expected_locations: usize,
    pub scan_mode: ScanMode,
    pub months_to_check: u32,
    pub windows: Vec<WorkingHoursWindow>,
    pub sleep_interval: Duration,
    pub sleep_jitter: Duration,
    pub challenge_cooldown: Duration,
    pub launch: LaunchOptions,
    pub telegram: Option<(String, String)>,
    pub timing: TimingProfile,
    pub frontier: FrontierPolicy,
}

/// Log filter directive: JSON `log_level` → `LOG_LEVEL` env var → `info`.
pub fn resolve_log_level(config: &WatchConfig) -> String {
    first_non_empty(config.log_level.clone(), std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string())
        .to_lowercase()
}

fn first_non_empty(file: Option<String>, env: Option<String>) -> Option<String> {
    file.map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| env.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_window_size(v: &str) -> Option<(u32, u32)> {
    let (w, h) = v.split_once([',', 'x'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

struct Resolver<'a> {
    file: &'a WatchConfig,
    env: &'a dyn Fn(&str) -> Option<String>,
}

impl Resolver<'_> {
    fn text(&self, file: &Option<String>, env: &str) -> Option<String> {
        first_non_empty(file.clone(), (self.env)(env))
    }

    fn required(
        &self,
        file: &Option<String>,
        field: &'static str,
        env: &'static str,
    ) -> Result<String, ConfigError> {
        self.text(file, env)
            .ok_or(ConfigError::Missing { field, env })
    }

    fn duration(
        &self,
        file: &Option<String>,
        field: &'static str,
        env: &str,
        default: &str,
    ) -> Result<Duration, ConfigError> {
        let raw = self.text(file, env).unwrap_or_else(|| default.to_string());
        parse_duration(&raw).map_err(|e| invalid(field, e))
    }

    fn number<T: std::str::FromStr>(
        &self,
        file: Option<T>,
        field: &'static str,
        env: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        if let Some(v) = file {
            return Ok(v);
        }
        match (self.env)(env).filter(|v| !v.trim().is_empty()) {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| invalid(field, format!("'{}' is not a number", v))),
            None => Ok(default),
        }
    }
}

impl Settings {
    /// Resolves against the process environment.
    pub fn resolve(config: &WatchConfig) -> Result<Self, ConfigError> {
        Self::resolve_with(config, &|key| std::env::var(key).ok())
    }

    /// Resolves with an explicit environment lookup.
    pub fn resolve_with(
        config: &WatchConfig,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let r = Resolver { file: config, env };
        let f = r.file;

        let credentials = Credentials {
            email: r.required(&f.email, "email", "EMAIL")?,
            password: r.required(&f.password, "password", "PASSWORD")?,
        };
        let case_id = r.required(&f.case_id, "case_id", "CASE_ID")?;

        let portal_url = r
            .text(&f.portal_url, "PORTAL_URL")
            .unwrap_or_else(|| DEFAULT_PORTAL_URL.to_string());
        let portal = Portal::parse(&portal_url).map_err(|e| invalid("portal_url", e))?;

        let scan_mode = match r.text(&f.scan_mode, "SCAN_MODE") {
            Some(v) => v
                .parse::<ScanMode>()
                .map_err(|e| invalid("scan_mode", e))?,
            None => ScanMode::default(),
        };

        let hours = r
            .text(&f.working_hours, "WORKING_HOURS")
            .unwrap_or_else(|| DEFAULT_WORKING_HOURS.to_string());
        let windows = parse_windows(&hours).map_err(|e| invalid("working_hours", e))?;

        let (width, height) = match r.text(&f.window_size, "WINDOW_SIZE") {
            Some(v) => parse_window_size(&v)
                .ok_or_else(|| invalid("window_size", format!("'{}' is not WIDTH,HEIGHT", v)))?,
            None => (1300, 800),
        };
        let headless = match f.headless {
            Some(b) => b,
            None => match (r.env)("HEADLESS") {
                Some(v) => parse_flag(&v)
                    .ok_or_else(|| invalid("headless", format!("'{}' is not a boolean", v)))?,
                None => false,
            },
        };
        let profile_dir = r
            .text(&f.profile_path, "PROFILE_PATH")
            .unwrap_or_else(|| "./.browser-profile".to_string());

        let telegram = match (
            r.text(&f.telegram_token, "TELEGRAM_TOKEN"),
            r.text(&f.telegram_chat_id, "TELEGRAM_CHAT_ID"),
        ) {
            (Some(token), Some(chat)) => Some((token, chat)),
            _ => None,
        };

        Ok(Self {
            credentials,
            case_id,
            portal,
            page_load_timeout: r.duration(
                &f.page_load_timeout,
                "page_load_timeout",
                "PAGE_LOAD_TIMEOUT",
                "30s",
            )?,
            expected_locations: r.number(
                f.expected_locations,
                "expected_locations",
                "EXPECTED_LOCATIONS",
                4,
            )?,
            scan_mode,
            months_to_check: r.number(f.months_to_check, "months_to_check", "MONTHS_TO_CHECK", 5)?,
            windows,
            sleep_interval: r.duration(&f.sleep_interval, "sleep_interval", "SLEEP_INTERVAL", "15m")?,
            sleep_jitter: r.duration(
                &f.sleep_interval_jitter,
                "sleep_interval_jitter",
                "SLEEP_INTERVAL_JITTER",
                "3m",
            )?,
            challenge_cooldown: r.duration(
                &f.challenge_cooldown,
                "challenge_cooldown",
                "CHALLENGE_COOLDOWN",
                "2m",
            )?,
            launch: LaunchOptions {
                window_width: width,
                window_height: height,
                headless,
                profile_dir: Some(PathBuf::from(profile_dir)),
                proxy_server: r.text(&f.proxy_server, "PROXY_SERVER"),
            },
            telegram,
            timing: f.timing.clone().unwrap_or_default(),
            frontier: f.frontier.clone().unwrap_or_default(),
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            credentials: self.credentials.clone(),
            case_id: self.case_id.clone(),
            portal: self.portal.clone(),
            wait_timeout: self.page_load_timeout,
            human: Humanizer::new(self.timing.clone()),
            challenges: ChallengeMonitor::new(
                ChallengeSettings {
                    cooldown: self.challenge_cooldown,
                    ..ChallengeSettings::default()
                },
                self.page_load_timeout,
            ),
        }
    }

    pub fn workflow(&self) -> Workflow {
        Workflow::new(
            WorkflowSettings {
                expected_locations: self.expected_locations,
                ..WorkflowSettings::default()
            },
            CalendarScanner::new(ScannerSettings {
                mode: self.scan_mode,
                months_to_check: self.months_to_check,
                frontier: self.frontier.clone(),
                ..ScannerSettings::default()
            }),
        )
    }

    pub fn schedule(&self) -> Schedule {
        Schedule {
            windows: self.windows.clone(),
            interval: self.sleep_interval,
            jitter: self.sleep_jitter,
        }
    }

    pub fn launcher(&self) -> ChromiumLauncher {
        ChromiumLauncher {
            options: self.launch.clone(),
            page_load_timeout: self.page_load_timeout,
        }
    }

    /// Telegram when both token and chat id are set, console otherwise.
    pub fn notifier(&self) -> Result<Arc<dyn Notifier>, ConfigError> {
        match &self.telegram {
            Some((token, chat)) => {
                let telegram =
                    TelegramNotifier::new(token, chat.clone()).map_err(|e| invalid("telegram", e))?;
                Ok(Arc::new(telegram))
            }
            None => Ok(Arc::new(ConsoleNotifier)),
        }
    }
}
