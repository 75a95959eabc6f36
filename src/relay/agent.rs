//! Code Execution + 程序化工具调用（PTC）Agent 循环
//!
//! 每轮非流式调用上游，复用返回的容器 ID；`tool_use` 时在本地执行工具并回传
//! `tool_result`，直到 `end_turn`、其他停止原因或达到最大轮数。

use super::expense_tools::{execute_tool, ptc_tools, PTC_CALLER};
use super::{timed, EventStream, RelayContext};
use crate::models::{ComparisonMetrics, ComparisonRow, Message, MessagesRequest, MetricsPayload, StreamEvent};
use serde_json::{json, Value};
use std::time::Instant;

const BETAS: &[&str] = &["advanced-tool-use-2025-11-20"];
const MAX_TOKENS: u32 = 4000;

/// 传统工具调用方式的基线（同一场景下的实测值）
pub const TRADITIONAL_TOKENS: u64 = 110_473;
pub const TRADITIONAL_SECONDS: f64 = 50.6;

/// 千位分隔：`110473` -> `110,473`
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// 四舍五入到指定小数位
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// 浮点数展示：整数值保留一位小数（`12.0`），其余使用最短表示
pub fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// 构建传统方式 vs PTC 对比表
pub fn comparison_metrics(api_calls: u32, total_tokens: u64, elapsed: f64) -> MetricsPayload {
    let token_reduction = round_to(
        (TRADITIONAL_TOKENS as f64 - total_tokens as f64) / TRADITIONAL_TOKENS as f64 * 100.0,
        1,
    );
    let time_reduction = round_to(
        (TRADITIONAL_SECONDS - elapsed) / TRADITIONAL_SECONDS * 100.0,
        1,
    );
    let row = |metric: &str, traditional: String, ptc: String| ComparisonRow {
        metric: metric.to_string(),
        traditional,
        ptc,
    };
    MetricsPayload::Comparison(ComparisonMetrics {
        comparison: true,
        rows: vec![
            row("API Calls", api_calls.to_string(), api_calls.to_string()),
            row(
                "Total Tokens",
                format_thousands(TRADITIONAL_TOKENS),
                format_thousands(total_tokens),
            ),
            row(
                "Elapsed Time (s)",
                format_decimal(TRADITIONAL_SECONDS),
                format_decimal(elapsed),
            ),
            row(
                "Token Reduction",
                "—".to_string(),
                format!("{}%", format_decimal(token_reduction)),
            ),
            row(
                "Time Reduction",
                "—".to_string(),
                format!("{}%", format_decimal(time_reduction)),
            ),
        ],
    })
}

fn tool_call_status(caller_type: &str, name: &str, input: &Value) -> String {
    if caller_type == PTC_CALLER {
        format!("🔧 [PTC] Code called tool: {name}({input})")
    } else {
        format!("🔧 [Direct] Model called tool: {name}({input})")
    }
}

pub fn run_code_execution(ctx: RelayContext, input: String) -> EventStream {
    Box::pin(async_stream::try_stream! {
        yield StreamEvent::status("💻 Running PTC agent with team expense tools...");

        let tools = ptc_tools();
        let idle = ctx.idle_timeout();
        let max_turns = ctx.upstream.max_agent_turns.max(1);
        let mut messages = vec![Message::user(input)];
        let mut container_id: Option<String> = None;
        let mut total_tokens = 0u64;
        let mut api_calls = 0u32;
        let started = Instant::now();

        loop {
            if api_calls >= max_turns {
                let elapsed = round_to(started.elapsed().as_secs_f64(), 2);
                tracing::warn!("[RELAY] PTC Agent 达到最大轮数 {}", max_turns);
                yield StreamEvent::Metrics(comparison_metrics(api_calls, total_tokens, elapsed));
                yield StreamEvent::done(format!(
                    "⚠️ Stopped: max turns reached ({} API calls, {}s)",
                    api_calls,
                    format_decimal(elapsed)
                ));
                break;
            }

            let mut request = MessagesRequest::new(ctx.provider.model(), MAX_TOKENS, messages.clone())
                .with_tools(tools.clone());
            if let Some(id) = &container_id {
                request = request.with_container(json!(id));
            }

            let response = timed(idle, ctx.provider.create_message(&request, BETAS)).await?;
            api_calls += 1;
            total_tokens += response.usage.total();
            tracing::debug!(
                "[RELAY] PTC 第 {} 轮: stop_reason={:?} tokens={}",
                api_calls,
                response.stop_reason,
                total_tokens
            );

            if let Some(container) = &response.container {
                let short: String = container.id.chars().take(16).collect();
                yield StreamEvent::status(format!("📦 Container: {short}..."));
                container_id = Some(container.id.clone());
            }

            match response.stop_reason.as_deref() {
                Some("end_turn") => {
                    let elapsed = round_to(started.elapsed().as_secs_f64(), 2);
                    if let Some(text) = response.first_text() {
                        yield StreamEvent::token(text);
                    }
                    yield StreamEvent::Metrics(comparison_metrics(api_calls, total_tokens, elapsed));
                    yield StreamEvent::done(format!(
                        "✅ PTC agent complete! ({} API calls, {} tokens, {}s)",
                        api_calls,
                        format_thousands(total_tokens),
                        format_decimal(elapsed)
                    ));
                    break;
                }
                Some("tool_use") => {
                    let mut results = Vec::new();
                    for call in response.tool_uses() {
                        yield StreamEvent::status(tool_call_status(&call.caller_type, &call.name, &call.input));
                        let result = match execute_tool(&call.name, &call.input) {
                            Ok(content) => json!({
                                "type": "tool_result",
                                "tool_use_id": call.id,
                                "content": content,
                            }),
                            Err(message) => {
                                tracing::warn!("[RELAY] 工具 {} 执行失败: {}", call.name, message);
                                json!({
                                    "type": "tool_result",
                                    "tool_use_id": call.id,
                                    "content": message,
                                    "is_error": true,
                                })
                            }
                        };
                        results.push(result);
                    }
                    messages.push(Message::assistant_blocks(response.content.clone()));
                    messages.push(Message::user_blocks(results));
                }
                other => {
                    let reason = other.unwrap_or("unknown").to_string();
                    let elapsed = round_to(started.elapsed().as_secs_f64(), 2);
                    let text = response
                        .first_text()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Stopped with reason: {reason}"));
                    yield StreamEvent::token(text);
                    yield StreamEvent::Metrics(comparison_metrics(api_calls, total_tokens, elapsed));
                    yield StreamEvent::done(format!(
                        "⚠️ Stopped: {} ({}s)",
                        reason,
                        format_decimal(elapsed)
                    ));
                    break;
                }
            }
        }
    })
}
