pub mod calendar;
pub mod challenge;
pub mod cycle;
pub mod notifier;
pub mod scheduler;
pub mod session;
pub mod timing;
pub mod workflow;
