//! Browser discovery and launch configuration for `chromiumoxide`.
//!
//! * Finding a usable browser executable (Chrome → Chromium → Brave, cross-platform).
//! * Building the launch config: persistent profile, fixed window, optional proxy.
//! * Spawning the CDP handler loop.
//!
//! The portal's challenge pages are resolved by a human at the keyboard, so the
//! browser is headed by default and keeps its profile between cycles.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Browser;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{info, warn};

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/usr/bin/brave-browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Launch config ────────────────────────────────────────────────────────────

/// Browser settings taken from configuration.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub window_width: u32,
    pub window_height: u32,
    pub headless: bool,
    pub profile_dir: Option<PathBuf>,
    pub proxy_server: Option<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            window_width: 1300,
            window_height: 800,
            headless: false,
            profile_dir: None,
            proxy_server: None,
        }
    }
}

/// Build a `BrowserConfig` for the portal session.
///
/// `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag at process level; the rest is done by the
/// injected stealth script.
pub fn build_config(exe: &str, options: &LaunchOptions) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: options.window_width,
            height: options.window_height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(options.window_width, options.window_height)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--lang=pl-PL");

    if !options.headless {
        builder = builder.with_head();
    }
    if let Some(dir) = options.profile_dir.as_ref() {
        builder = builder.user_data_dir(dir);
    }
    if let Some(proxy) = options.proxy_server.as_deref() {
        builder = builder.arg(format!("--proxy-server={}", proxy));
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

/// Launches the browser and drives its CDP event loop on a background task.
/// Abort the returned handle after closing the browser.
pub async fn launch(options: &LaunchOptions) -> Result<(Browser, JoinHandle<()>)> {
    let exe = find_chrome_executable().ok_or_else(|| {
        anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE.")
    })?;

    info!(
        "🚀 Launching browser ({}, {}x{}, headless={})",
        exe, options.window_width, options.window_height, options.headless
    );
    let config = build_config(&exe, options)?;
    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

    let handle = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {}", e);
            }
        }
    });

    Ok((browser, handle))
}
