/*!
 * Tracing
 * Structured tracing for kernel requests using the tracing crate
 *
 * Logs go to stderr; stdout belongs to the driver's JSON protocol.
 */

use crate::core::types::Pid;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - KERNEL_TRACE_JSON: Enable JSON output (default: false)
///
/// Does nothing if a global subscriber is already installed.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("KERNEL_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        let installed = registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok();
        if installed {
            info!("Structured tracing initialized with JSON output");
        }
    } else {
        let installed = registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .compact(),
            )
            .try_init()
            .is_ok();
        if installed {
            info!("Structured tracing initialized");
        }
    }
}

/// Span covering the handling of one kernel request
pub struct RequestSpan {
    span: tracing::Span,
    start: Instant,
    request_id: u64,
}

impl RequestSpan {
    pub fn new(op: &'static str, caller: Option<Pid>) -> Self {
        let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        let span = span!(
            Level::DEBUG,
            "request",
            request_id,
            op,
            caller = ?caller,
            duration_us = tracing::field::Empty,
            result = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            request_id,
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for RequestSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        // The loop is single-writer; anything this slow stalls every unit
        if duration.as_millis() > 10 {
            warn!(
                request_id = self.request_id,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow request"
            );
        } else {
            debug!(request_id = self.request_id, "request completed");
        }
    }
}

/// Record how the request in the current span ended
///
/// Outside a request span this does nothing.
pub fn record_outcome(outcome: &'static str) {
    tracing::Span::current().record("result", outcome);
}

/// Helper to create a request span
#[inline]
pub fn span_request(op: &'static str, caller: Option<Pid>) -> RequestSpan {
    RequestSpan::new(op, caller)
}
