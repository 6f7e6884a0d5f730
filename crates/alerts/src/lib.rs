pub mod client;
pub mod silence;

pub use client::AlertmanagerClient;
pub use silence::{MonitorReport, RemovalReport, SilenceManager, SilencePolicy};
