//! FeatureCast - Foundry 功能演示 Relay
//!
//! 将浏览器/CLI 的功能运行请求转发到托管的 Anthropic Messages API，
//! 并以 SSE 事件流返回结果。

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod providers;
pub mod relay;
pub mod server;
pub mod sse;
pub mod storage;

pub use error::RelayError;
pub use server::{build_router, AppState, ServerState};
