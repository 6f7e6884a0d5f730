pub mod client;
pub mod http;
pub mod query;
pub mod write;

pub use client::VmClient;
