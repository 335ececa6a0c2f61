pub mod config;
pub mod durations;
pub mod locale;
pub mod retry;
pub mod types;

pub use config::{Settings, WatchConfig};
