//! Relay 客户端
//!
//! 会话状态机、缓存倒计时与基于 reqwest 的流式客户端。

pub mod countdown;
pub mod session;
pub mod stream_client;

pub use countdown::{cache_countdown, remaining_secs, CacheCountdown, CACHE_WINDOW};
pub use session::{RunRejected, SessionState, StatusKind};
pub use stream_client::{apply_frame, ClientError, StreamClient};
