pub mod browser_manager;
pub mod chromium;
pub mod port;
pub mod query;
pub mod selectors;
pub mod stealth;
pub mod xpath;
