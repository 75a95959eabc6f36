//! SSE 帧解析状态机
//!
//! 两个状态：等待 `event:` 行，或已记下事件类型、等待对应的 `data:` 行。
//! 收到 `data:` 后产出一帧并回到等待 `event:` 的状态。

const EVENT_PREFIX: &str = "event: ";
const DATA_PREFIX: &str = "data: ";

/// 一帧原始数据（尚未解析 JSON）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub event: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParserState {
    #[default]
    AwaitingEvent,
    AwaitingData(String),
}

#[derive(Debug, Default)]
pub struct FrameParser {
    state: ParserState,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// 输入一行（不含换行符），若构成完整帧则返回
    pub fn push_line(&mut self, line: &str) -> Option<RawFrame> {
        if let Some(kind) = line.strip_prefix(EVENT_PREFIX) {
            self.state = ParserState::AwaitingData(kind.trim().to_string());
            return None;
        }

        if let Some(data) = line.strip_prefix(DATA_PREFIX) {
            return match std::mem::take(&mut self.state) {
                ParserState::AwaitingData(event) => Some(RawFrame {
                    event,
                    data: data.to_string(),
                }),
                // 没有事件类型的 data 行直接忽略
                ParserState::AwaitingEvent => None,
            };
        }

        None
    }
}
