//! Scrape job tracking: polling, presentation and lifecycle control.

pub mod controller;
pub mod poller;
pub mod presenter;

#[cfg(test)]
mod testing;

pub use controller::{outcome, ControllerState, JobController};
pub use poller::PollerConfig;
pub use presenter::{format_duration, JobView};
