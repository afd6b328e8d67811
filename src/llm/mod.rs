pub mod client;
pub mod prompts;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod sse_parser;
pub mod types;

pub use client::DecisionClient;
pub use registry::OperatingMode;
