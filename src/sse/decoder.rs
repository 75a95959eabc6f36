//! 字节块 → 文本行解码器
//!
//! 网络读取可能在任意位置切断数据：帧中间、行中间，甚至多字节 UTF-8 字符中间。
//! 解码器保留不完整的 UTF-8 尾部字节与不带换行的行片段，拼接到下一次读取的内容前。

/// 增量行解码器
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// 尚未构成完整 UTF-8 字符的尾部字节
    pending_bytes: Vec<u8>,
    /// 尚未遇到换行符的行片段
    partial_line: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 输入一个字节块，返回其中所有完整的行（不含换行符）
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }
        let text = self.decode(chunk);
        self.partial_line.push_str(&text);
        self.drain_lines()
    }

    /// 输入结束：冲刷剩余字节与行片段
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.partial_line.push_str(&tail);
            self.pending_bytes.clear();
        }
        if self.partial_line.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.partial_line);
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    /// 当前是否还有未完成的数据
    pub fn has_pending(&self) -> bool {
        !self.pending_bytes.is_empty() || !self.partial_line.is_empty()
    }

    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending_bytes);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match e.error_len() {
                        // 尾部是被截断的多字节字符，等待下一块
                        None => {
                            self.pending_bytes = rest[valid..].to_vec();
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + len..];
                        }
                    }
                }
            }
        }
        out
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.partial_line.find('\n') {
            let mut line: String = self.partial_line.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }
}
