//! SSE 编解码模块
//!
//! 客户端解析 Relay 输出、Relay 解析上游 Messages API 的流式响应，
//! 共用同一套行解码器与帧状态机。

mod decoder;
mod frame;

pub use decoder::LineDecoder;
pub use frame::{FrameParser, ParserState, RawFrame};

/// 字节流 → 帧的增量解码器
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: LineDecoder,
    frames: FrameParser,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 输入一个字节块，返回本次完成的所有帧
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.lines
            .feed(chunk)
            .iter()
            .filter_map(|line| self.frames.push_line(line))
            .collect()
    }

    /// 输入结束，冲刷最后一个不带换行的行
    pub fn finish(&mut self) -> Vec<RawFrame> {
        self.lines
            .finish()
            .and_then(|line| self.frames.push_line(&line))
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let mut frames = decoder.feed(b"event: token\nda");
        assert!(frames.is_empty());
        frames.extend(decoder.feed(b"ta: {\"text\":\"a\"}\n\nevent: done\n"));
        frames.extend(decoder.feed(b"data: {\"message\":\"ok\"}"));
        frames.extend(decoder.finish());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "token");
        assert_eq!(frames[1].event, "done");
        assert_eq!(frames[1].data, "{\"message\":\"ok\"}");
    }
}
