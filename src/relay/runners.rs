//! 流式转发的功能：Web Search / Web Fetch / Files API / Prompt Caching

use super::agent::{format_decimal, round_to};
use super::{next_upstream, timed, EventStream, RelayContext};
use crate::error::RelayError;
use crate::models::{CacheMetrics, Message, MessagesRequest, MetricsPayload, StreamEvent, Usage};
use crate::providers::foundry::FILES_API_BETA;
use crate::providers::UpstreamEvent;
use serde_json::json;
use std::time::Instant;

const DEFAULT_MAX_TOKENS: u32 = 4096;
const CACHE_MAX_TOKENS: u32 = 300;

/// 流式调用上游，文本增量逐个转为 token 事件
fn relay_streamed(
    ctx: RelayContext,
    request: MessagesRequest,
    betas: &'static [&'static str],
    status: String,
    done: String,
) -> EventStream {
    Box::pin(async_stream::try_stream! {
        yield StreamEvent::status(status);

        let idle = ctx.idle_timeout();
        let mut upstream = timed(idle, ctx.provider.stream_message(&request, betas)).await?;
        while let Some(event) = next_upstream(&mut upstream, idle).await? {
            if let UpstreamEvent::TextDelta(text) = event {
                yield StreamEvent::token(text);
            }
        }

        yield StreamEvent::done(done);
    })
}

pub fn run_web_search(ctx: RelayContext, input: String) -> EventStream {
    let request = MessagesRequest::new(ctx.provider.model(), DEFAULT_MAX_TOKENS, vec![Message::user(input)])
        .with_tools(vec![json!({
            "type": "web_search_20250305",
            "name": "web_search",
            "max_uses": 5,
        })]);
    relay_streamed(
        ctx,
        request,
        &[],
        "🔍 Claude is searching the web...".to_string(),
        "✅ Web search complete!".to_string(),
    )
}

pub fn run_web_fetch(ctx: RelayContext, input: String) -> EventStream {
    let request = MessagesRequest::new(ctx.provider.model(), DEFAULT_MAX_TOKENS, vec![Message::user(input)])
        .with_tools(vec![json!({
            "type": "web_fetch_20250910",
            "name": "web_fetch",
            "max_uses": 3,
        })]);
    relay_streamed(
        ctx,
        request,
        &["web-fetch-2025-09-10"],
        "🌐 Claude is fetching the URL...".to_string(),
        "✅ Web fetch complete!".to_string(),
    )
}

pub fn run_files_api(ctx: RelayContext, input: String, upload_key: Option<String>) -> EventStream {
    let Some(record) = upload_key.as_deref().and_then(|key| ctx.uploads.get(key)) else {
        tracing::debug!("[RELAY] files_api 缺少有效的 uploadKey: {:?}", upload_key);
        return Box::pin(futures::stream::iter([
            Ok::<_, RelayError>(StreamEvent::error("Please upload a file first.")),
            Ok(StreamEvent::done("❌ No file uploaded.")),
        ]));
    };

    let request = MessagesRequest::new(
        ctx.provider.model(),
        DEFAULT_MAX_TOKENS,
        vec![Message::user_blocks(vec![
            json!({"type": "text", "text": input}),
            json!({
                "type": "document",
                "source": {"type": "file", "file_id": record.file_id},
            }),
        ])],
    );
    relay_streamed(
        ctx,
        request,
        &[FILES_API_BETA],
        format!("📎 Analyzing {}...", record.filename),
        format!("✅ Analysis of {} complete!", record.filename),
    )
}

fn cache_status(usage: &Usage) -> &'static str {
    if usage.cache_read_input_tokens.unwrap_or(0) > 0 {
        "✅ Cache HIT"
    } else if usage.cache_creation_input_tokens.unwrap_or(0) > 0 {
        "📝 Cache CREATED"
    } else {
        "❌ No caching"
    }
}

/// 根据基线与本次耗时构建缓存指标；`baseline` 为空表示本次即基线运行
pub fn cache_metrics(usage: &Usage, baseline: Option<f64>, elapsed: f64) -> CacheMetrics {
    let (non_cached, cached, speedup) = match baseline {
        None => (elapsed, None, "—".to_string()),
        Some(base) => {
            let speedup = if elapsed > 0.0 {
                round_to(base / elapsed, 1)
            } else {
                0.0
            };
            (base, Some(elapsed), format!("{}x faster", format_decimal(speedup)))
        }
    };
    CacheMetrics {
        cache_type: "1-hour".to_string(),
        cache_status: cache_status(usage).to_string(),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cache_creation_input_tokens: usage.cache_creation_input_tokens.unwrap_or(0),
        cache_read_input_tokens: usage.cache_read_input_tokens.unwrap_or(0),
        response_time_seconds: cached,
        non_cached_time_seconds: Some(non_cached),
        speedup,
    }
}

pub fn run_prompt_caching(ctx: RelayContext, input: String) -> EventStream {
    Box::pin(async_stream::try_stream! {
        let Some(document) = ctx.prompt_cache.cached_text() else {
            yield StreamEvent::error("Annual Report not loaded. Check uploads folder.");
            yield StreamEvent::done("❌ Missing Annual Report.");
            return;
        };

        let baseline = ctx.prompt_cache.baseline(Instant::now());
        if baseline.is_none() {
            yield StreamEvent::status("⚡ First run – recording baseline (cache_control=ephemeral, ttl=1h)...");
        } else {
            yield StreamEvent::status("⚡ Running with 1-hour prompt caching (cache_control=ephemeral, ttl=1h)...");
        }

        let request = MessagesRequest::new(
            ctx.provider.model(),
            CACHE_MAX_TOKENS,
            vec![Message::user_blocks(vec![
                json!({
                    "type": "text",
                    "text": document,
                    "cache_control": {"type": "ephemeral", "ttl": "1h"},
                }),
                json!({"type": "text", "text": input}),
            ])],
        );

        let idle = ctx.idle_timeout();
        let started = Instant::now();
        let mut usage = Usage::default();
        let mut upstream = timed(idle, ctx.provider.stream_message(&request, &[])).await?;
        while let Some(event) = next_upstream(&mut upstream, idle).await? {
            match event {
                UpstreamEvent::TextDelta(text) => yield StreamEvent::token(text),
                UpstreamEvent::Usage(delta) => usage.merge(&delta),
                UpstreamEvent::Stop(_) | UpstreamEvent::MessageStop => {}
            }
        }
        let elapsed = round_to(started.elapsed().as_secs_f64(), 2);

        if baseline.is_none() {
            ctx.prompt_cache.record_baseline(elapsed, Instant::now());
        }
        let metrics = cache_metrics(&usage, baseline, elapsed);
        tracing::info!(
            "[RELAY] Prompt Caching: {} 耗时 {}s (read={}, created={})",
            metrics.cache_status,
            elapsed,
            metrics.cache_read_input_tokens,
            metrics.cache_creation_input_tokens
        );
        let done = format!("✅ Prompt caching run complete! ({}s)", format_decimal(elapsed));
        yield StreamEvent::Metrics(MetricsPayload::Cache(metrics));
        yield StreamEvent::done(done);
    })
}
