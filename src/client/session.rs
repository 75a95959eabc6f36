//! 客户端会话状态
//!
//! 一个会话同一时间最多只有一个运行中的流。每种事件对应一个状态转换方法，
//! 运行开始时重置输出，缓存倒计时除外（切换到其他功能时才清除）。

use super::countdown::{cache_countdown, remaining_secs};
use crate::models::{FilePayload, MetricsPayload, StreamEvent};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusKind {
    #[default]
    Idle,
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RunRejected {
    #[error("A run is already in progress")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub output: String,
    pub status: String,
    pub status_kind: StatusKind,
    pub running: bool,
    pub metrics: Option<MetricsPayload>,
    pub artifact: Option<FilePayload>,
    pub started_at: Option<Instant>,
    pub elapsed_secs: u64,
    pub cache_anchor: Option<Instant>,
    pub cache_remaining_secs: Option<u64>,
    pub selected_feature: Option<String>,
    pub selected_sub_feature: Option<String>,
    /// 本次运行中是否出现过 error 事件
    saw_error: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset_output(&mut self) {
        self.output.clear();
        self.status.clear();
        self.status_kind = StatusKind::Idle;
        self.metrics = None;
        self.artifact = None;
        self.started_at = None;
        self.elapsed_secs = 0;
        self.saw_error = false;
    }

    pub fn select_feature(&mut self, feature_id: &str) -> Result<(), RunRejected> {
        if self.running {
            return Err(RunRejected::AlreadyRunning);
        }
        if self.selected_feature.as_deref() != Some(feature_id) {
            self.selected_feature = Some(feature_id.to_string());
            self.selected_sub_feature = None;
            self.cache_anchor = None;
            self.cache_remaining_secs = None;
            self.reset_output();
        }
        Ok(())
    }

    pub fn select_sub_feature(&mut self, sub_feature_id: &str) -> Result<(), RunRejected> {
        if self.running {
            return Err(RunRejected::AlreadyRunning);
        }
        self.selected_sub_feature = Some(sub_feature_id.to_string());
        Ok(())
    }

    /// 开始运行；已有运行中的流时拒绝且不修改状态
    pub fn begin_run(&mut self, now: Instant) -> Result<(), RunRejected> {
        if self.running {
            return Err(RunRejected::AlreadyRunning);
        }
        self.reset_output();
        self.running = true;
        self.status_kind = StatusKind::Info;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn apply(&mut self, event: StreamEvent, now: Instant) {
        match event {
            StreamEvent::Token(p) => self.on_token(&p.text),
            StreamEvent::Status(p) => self.on_status(p.message),
            StreamEvent::File(p) => self.on_file(p),
            StreamEvent::Metrics(p) => self.on_metrics(p, now),
            StreamEvent::Error(p) => self.on_error(p.message),
            StreamEvent::Done(p) => self.on_done(p.message, now),
        }
    }

    pub fn on_token(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub fn on_status(&mut self, message: String) {
        self.status = message;
        self.status_kind = StatusKind::Info;
    }

    pub fn on_file(&mut self, file: FilePayload) {
        self.artifact = Some(file);
    }

    pub fn on_metrics(&mut self, metrics: MetricsPayload, now: Instant) {
        if metrics.cache_type().is_some() {
            let countdown = cache_countdown(now, self.cache_anchor);
            self.cache_anchor = Some(countdown.anchor);
            self.cache_remaining_secs = Some(countdown.remaining_secs);
        }
        self.metrics = Some(metrics);
    }

    pub fn on_error(&mut self, message: String) {
        self.status = message;
        self.status_kind = StatusKind::Error;
        self.saw_error = true;
    }

    pub fn on_done(&mut self, message: String, now: Instant) {
        self.status = message;
        self.tick(now);
        self.running = false;
        self.status_kind = if self.saw_error {
            StatusKind::Error
        } else {
            StatusKind::Success
        };
    }

    /// 流在 done 之前结束：视为正常完成，可重复调用
    pub fn on_stream_end(&mut self, now: Instant) {
        if !self.running {
            return;
        }
        self.tick(now);
        self.running = false;
        if self.status_kind != StatusKind::Error {
            self.status_kind = StatusKind::Success;
        }
    }

    /// 建立流之前的失败（连接失败、非 2xx）
    pub fn on_request_failed(&mut self, message: String) {
        self.status = message;
        self.status_kind = StatusKind::Error;
        self.running = false;
    }

    pub fn on_cancelled(&mut self, now: Instant) {
        if !self.running {
            return;
        }
        self.tick(now);
        self.running = false;
        self.status = "Run cancelled.".to_string();
        self.status_kind = StatusKind::Error;
    }

    /// 刷新耗时与缓存剩余时间（不重新锚定）
    pub fn tick(&mut self, now: Instant) {
        if self.running {
            if let Some(started) = self.started_at {
                self.elapsed_secs = now.saturating_duration_since(started).as_secs();
            }
        }
        if let Some(anchor) = self.cache_anchor {
            self.cache_remaining_secs = Some(remaining_secs(now, anchor));
        }
    }
}
