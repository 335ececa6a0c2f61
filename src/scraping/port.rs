//! UI automation port.
//!
//! The workflow engine, calendar scanner and challenge monitor only talk to
//! the portal through [`UiPort`]. The production implementation lives in
//! `scraping::chromium`; tests provide a scripted in-memory portal.

use super::query::Query;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Opaque reference to an element located by a port.
///
/// Handles are only valid until the next navigation of the owning port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// Rendered element size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

#[derive(Debug, Error)]
pub enum PortError {
    #[error("element not found: {0}")]
    NotFound(String),

    #[error("timed out after {}ms waiting for {what}", after.as_millis())]
    Timeout { what: String, after: Duration },

    #[error("stale element reference")]
    Stale,

    #[error("script failed: {0}")]
    Script(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("automation port already closed")]
    Closed,
}

impl PortError {
    /// Transient errors are worth an immediate bounded retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::NotFound(_) | PortError::Stale | PortError::Timeout { .. }
        )
    }
}

pub type PortResult<T> = Result<T, PortError>;

/// Poll interval used by the provided wait helpers.
pub const WAIT_POLL: Duration = Duration::from_millis(250);

#[async_trait]
pub trait UiPort: Send + Sync {
    async fn navigate(&self, url: &str) -> PortResult<()>;

    /// All elements matching `query`, in document order. Empty when none.
    async fn find_all(&self, query: &Query) -> PortResult<Vec<ElementHandle>>;

    async fn click(&self, element: ElementHandle) -> PortResult<()>;

    /// Types `text` into the element without any pacing; the timing model
    /// calls this once per character.
    async fn type_text(&self, element: ElementHandle, text: &str) -> PortResult<()>;

    async fn scroll_into_view(&self, element: ElementHandle) -> PortResult<()>;

    /// Runs `script` as the body of a function. When `target` is given the
    /// element is bound to `this`.
    async fn execute_script(
        &self,
        script: &str,
        target: Option<ElementHandle>,
    ) -> PortResult<serde_json::Value>;

    async fn text(&self, element: ElementHandle) -> PortResult<String>;

    async fn is_displayed(&self, element: ElementHandle) -> PortResult<bool>;

    async fn size(&self, element: ElementHandle) -> PortResult<Size>;

    async fn css_property(&self, element: ElementHandle, name: &str) -> PortResult<String>;

    /// Moves the pointer to the element centre shifted by (`dx`, `dy`).
    async fn hover(&self, element: ElementHandle, dx: f64, dy: f64) -> PortResult<()>;

    /// Moves the pointer to absolute viewport coordinates.
    async fn move_pointer(&self, x: f64, y: f64) -> PortResult<()>;

    async fn viewport(&self) -> PortResult<Size>;

    /// Releases the underlying browser. Idempotent.
    async fn close(&self) -> PortResult<()>;

    async fn find(&self, query: &Query) -> PortResult<ElementHandle> {
        self.find_all(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PortError::NotFound(query.to_string()))
    }

    /// First displayed element matching `query`, if any.
    async fn find_visible(&self, query: &Query) -> PortResult<Option<ElementHandle>> {
        for element in self.find_all(query).await? {
            match self.is_displayed(element).await {
                Ok(true) => return Ok(Some(element)),
                Ok(false) | Err(PortError::Stale) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Waits until an element matching `query` is attached to the document.
    async fn wait_until_present(
        &self,
        query: &Query,
        timeout: Duration,
    ) -> PortResult<ElementHandle> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(element) = self.find_all(query).await?.into_iter().next() {
                return Ok(element);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PortError::Timeout {
                    what: query.to_string(),
                    after: timeout,
                });
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    /// Waits until an element matching `query` is displayed.
    async fn wait_until_visible(
        &self,
        query: &Query,
        timeout: Duration,
    ) -> PortResult<ElementHandle> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(element) = self.find_visible(query).await? {
                return Ok(element);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PortError::Timeout {
                    what: query.to_string(),
                    after: timeout,
                });
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    /// Waits until no element matching `query` is displayed.
    async fn wait_until_gone(&self, query: &Query, timeout: Duration) -> PortResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.find_visible(query).await?.is_none() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PortError::Timeout {
                    what: format!("{} to disappear", query),
                    after: timeout,
                });
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }
}

/// Opens a fresh [`UiPort`] for one scheduler cycle.
#[async_trait]
pub trait PortLauncher: Send + Sync {
    async fn launch(&self) -> PortResult<Box<dyn UiPort>>;
}
