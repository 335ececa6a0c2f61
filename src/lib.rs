pub mod core;
pub mod features;
pub mod scraping;

// --- Primary core exports ---
pub use core::types;
pub use core::types::*;
pub use core::{Settings, WatchConfig};

// --- Short module paths ---
pub use features::{calendar, challenge, cycle, notifier, scheduler, session, timing, workflow};
pub use scraping::port;
