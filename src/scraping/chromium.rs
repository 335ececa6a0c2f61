//! [`UiPort`] over a `chromiumoxide` page.
//!
//! Queries are rendered to XPath here and nowhere else. Located elements are
//! kept in a per-page arena; an [`ElementHandle`] packs the arena generation
//! and the slot index, so handles taken before a navigation report
//! [`PortError::Stale`] instead of touching a detached node.

use super::browser_manager::{self, LaunchOptions};
use super::port::{ElementHandle, PortError, PortLauncher, PortResult, Size, UiPort};
use super::query::Query;
use super::stealth::STEALTH_SCRIPT;
use super::xpath;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::layout::Point;
use chromiumoxide::{Browser, Element, Page};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DISPLAYED_JS: &str = "function() {
    if (!this.isConnected) return false;
    const style = window.getComputedStyle(this);
    if (style.display === 'none' || style.visibility === 'hidden') return false;
    const rect = this.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}";

const SIZE_JS: &str = "function() {
    const rect = this.getBoundingClientRect();
    return [rect.width, rect.height];
}";

#[derive(Default)]
struct Arena {
    generation: u32,
    elements: Vec<Element>,
}

impl Arena {
    fn insert(&mut self, element: Element) -> ElementHandle {
        let index = self.elements.len() as u64;
        self.elements.push(element);
        ElementHandle(((self.generation as u64) << 32) | index)
    }

    fn get(&self, handle: ElementHandle) -> PortResult<&Element> {
        let generation = (handle.0 >> 32) as u32;
        if generation != self.generation {
            return Err(PortError::Stale);
        }
        self.elements
            .get((handle.0 & 0xffff_ffff) as usize)
            .ok_or(PortError::Stale)
    }

    fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.elements.clear();
    }
}

fn cdp_error(e: impl std::fmt::Display) -> PortError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("no node")
        || lower.contains("could not find node")
        || lower.contains("not attached")
        || lower.contains("cannot find object")
    {
        PortError::Stale
    } else {
        PortError::Browser(msg)
    }
}

pub struct ChromiumPort {
    browser: Mutex<Option<Browser>>,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
    page: Page,
    arena: Mutex<Arena>,
    page_load_timeout: Duration,
}

impl ChromiumPort {
    async fn call_on(
        &self,
        handle: ElementHandle,
        declaration: &str,
    ) -> PortResult<serde_json::Value> {
        let arena = self.arena.lock().await;
        let element = arena.get(handle)?;
        let returns = element
            .call_js_fn(declaration, false)
            .await
            .map_err(cdp_error)?;
        if let Some(details) = returns.exception_details {
            return Err(PortError::Script(details.text));
        }
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }

    async fn evaluate(&self, expression: String) -> PortResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| PortError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl UiPort for ChromiumPort {
    async fn navigate(&self, url: &str) -> PortResult<()> {
        self.arena.lock().await.reset();
        debug!("navigate: {}", url);
        match tokio::time::timeout(self.page_load_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(cdp_error(e)),
            Err(_) => Err(PortError::Timeout {
                what: format!("page load of {}", url),
                after: self.page_load_timeout,
            }),
        }
    }

    async fn find_all(&self, query: &Query) -> PortResult<Vec<ElementHandle>> {
        let rendered = xpath::render(query);
        let quoted =
            serde_json::to_string(&rendered).map_err(|e| PortError::Script(e.to_string()))?;

        // DOM.performSearch errors on zero hits, so count first.
        let count = self
            .evaluate(format!(
                "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength",
                quoted
            ))
            .await?
            .as_u64()
            .unwrap_or(0);
        if count == 0 {
            return Ok(Vec::new());
        }

        let elements = self.page.find_xpaths(rendered).await.map_err(cdp_error)?;
        let mut arena = self.arena.lock().await;
        Ok(elements.into_iter().map(|el| arena.insert(el)).collect())
    }

    async fn click(&self, element: ElementHandle) -> PortResult<()> {
        let arena = self.arena.lock().await;
        arena.get(element)?.click().await.map_err(cdp_error)?;
        Ok(())
    }

    async fn type_text(&self, element: ElementHandle, text: &str) -> PortResult<()> {
        let arena = self.arena.lock().await;
        arena.get(element)?.type_str(text).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> PortResult<()> {
        let arena = self.arena.lock().await;
        arena
            .get(element)?
            .scroll_into_view()
            .await
            .map_err(cdp_error)?;
        Ok(())
    }

    async fn execute_script(
        &self,
        script: &str,
        target: Option<ElementHandle>,
    ) -> PortResult<serde_json::Value> {
        match target {
            Some(handle) => {
                self.call_on(handle, &format!("function() {{ {} }}", script))
                    .await
            }
            None => self.evaluate(format!("(() => {{ {} }})()", script)).await,
        }
    }

    async fn text(&self, element: ElementHandle) -> PortResult<String> {
        let arena = self.arena.lock().await;
        let text = arena
            .get(element)?
            .inner_text()
            .await
            .map_err(cdp_error)?;
        Ok(text.unwrap_or_default())
    }

    async fn is_displayed(&self, element: ElementHandle) -> PortResult<bool> {
        Ok(self
            .call_on(element, DISPLAYED_JS)
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn size(&self, element: ElementHandle) -> PortResult<Size> {
        let value = self.call_on(element, SIZE_JS).await?;
        let (width, height): (f64, f64) =
            serde_json::from_value(value).map_err(|e| PortError::Script(e.to_string()))?;
        Ok(Size { width, height })
    }

    async fn css_property(&self, element: ElementHandle, name: &str) -> PortResult<String> {
        let quoted = serde_json::to_string(name).map_err(|e| PortError::Script(e.to_string()))?;
        let value = self
            .call_on(
                element,
                &format!(
                    "function() {{ return window.getComputedStyle(this).getPropertyValue({}); }}",
                    quoted
                ),
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().trim().to_string())
    }

    async fn hover(&self, element: ElementHandle, dx: f64, dy: f64) -> PortResult<()> {
        let centre = {
            let arena = self.arena.lock().await;
            let bounds = arena
                .get(element)?
                .bounding_box()
                .await
                .map_err(cdp_error)?;
            Point::new(
                bounds.x + bounds.width / 2.0 + dx,
                bounds.y + bounds.height / 2.0 + dy,
            )
        };
        self.page.move_mouse(centre).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn move_pointer(&self, x: f64, y: f64) -> PortResult<()> {
        self.page
            .move_mouse(Point::new(x, y))
            .await
            .map_err(cdp_error)?;
        Ok(())
    }

    async fn viewport(&self) -> PortResult<Size> {
        let value = self
            .evaluate("[window.innerWidth, window.innerHeight]".to_string())
            .await?;
        let (width, height): (f64, f64) =
            serde_json::from_value(value).map_err(|e| PortError::Script(e.to_string()))?;
        Ok(Size { width, height })
    }

    async fn close(&self) -> PortResult<()> {
        let browser = self.browser.lock().await.take();
        let Some(mut browser) = browser else {
            return Ok(());
        };
        self.arena.lock().await.reset();

        let result = browser.close().await;
        let _ = browser.wait().await;
        if let Ok(mut guard) = self.handler.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        info!("🛑 Browser closed");
        result.map(|_| ()).map_err(cdp_error)
    }
}

impl Drop for ChromiumPort {
    fn drop(&mut self) {
        // Drop cannot await; spawn the close so no Chromium process outlives the port.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let handler = self.handler.lock().ok().and_then(|mut g| g.take());
        if let Ok(mut guard) = self.browser.try_lock() {
            if let Some(mut browser) = guard.take() {
                warn!("Automation port dropped without close(); closing browser");
                handle.spawn(async move {
                    let _ = browser.close().await;
                    if let Some(handler) = handler {
                        handler.abort();
                    }
                });
            }
        }
    }
}

/// Launches one headed Chromium per cycle.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    pub options: LaunchOptions,
    pub page_load_timeout: Duration,
}

#[async_trait]
impl PortLauncher for ChromiumLauncher {
    async fn launch(&self) -> PortResult<Box<dyn UiPort>> {
        let (mut browser, handler) = browser_manager::launch(&self.options)
            .await
            .map_err(|e| PortError::Browser(format!("{:#}", e)))?;

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler.abort();
                return Err(cdp_error(e));
            }
        };

        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
        {
            warn!("Failed to inject stealth script: {}", e);
        }

        Ok(Box::new(ChromiumPort {
            browser: Mutex::new(Some(browser)),
            handler: std::sync::Mutex::new(Some(handler)),
            page,
            arena: Mutex::new(Arena::default()),
            page_load_timeout: self.page_load_timeout,
        }))
    }
}
