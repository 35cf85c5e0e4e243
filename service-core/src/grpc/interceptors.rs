//! Correlation metadata carried on gRPC calls: `x-request-id` plus the W3C
//! `traceparent`/`tracestate` pair.

use opentelemetry::trace::TraceContextExt;
use tonic::metadata::MetadataMap;
use tonic::{Request, Status};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub const TRACEPARENT_KEY: &str = "traceparent";
pub const TRACESTATE_KEY: &str = "tracestate";
pub const REQUEST_ID_KEY: &str = "x-request-id";

fn metadata_str<'a>(metadata: &'a MetadataMap, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(|v| v.to_str().ok())
}

fn insert_ascii(metadata: &mut MetadataMap, key: &'static str, value: &str) {
    match value.parse() {
        Ok(value) => {
            metadata.insert(key, value);
        }
        Err(_) => tracing::debug!(key, "Dropping non-ASCII metadata value"),
    }
}

/// Server-side interceptor: logs the correlation ids of each incoming call.
#[allow(clippy::result_large_err)]
pub fn trace_context_interceptor(request: Request<()>) -> Result<Request<()>, Status> {
    tracing::debug!(
        request_id = extract_request_id(&request).as_deref().unwrap_or("-"),
        traceparent = extract_traceparent(&request).as_deref().unwrap_or("-"),
        "Received gRPC call"
    );
    Ok(request)
}

/// Copy the current span's OpenTelemetry context onto an outgoing call.
///
/// No-op unless an OpenTelemetry layer is installed.
pub fn inject_trace_context<T>(request: &mut Request<T>) {
    let context = Span::current().context();
    let span = context.span();
    let span_context = span.span_context();
    if !span_context.is_valid() {
        return;
    }

    let traceparent = format!(
        "00-{}-{}-{:02x}",
        span_context.trace_id(),
        span_context.span_id(),
        span_context.trace_flags().to_u8()
    );
    insert_ascii(request.metadata_mut(), TRACEPARENT_KEY, &traceparent);

    let tracestate = span_context.trace_state().header();
    if !tracestate.is_empty() {
        insert_ascii(request.metadata_mut(), TRACESTATE_KEY, &tracestate);
    }
}

pub fn inject_trace_context_with_request_id<T>(request: &mut Request<T>, request_id: &str) {
    inject_trace_context(request);
    insert_ascii(request.metadata_mut(), REQUEST_ID_KEY, request_id);
}

pub fn extract_traceparent<T>(request: &Request<T>) -> Option<String> {
    metadata_str(request.metadata(), TRACEPARENT_KEY).map(str::to_string)
}

pub fn extract_request_id<T>(request: &Request<T>) -> Option<String> {
    metadata_str(request.metadata(), REQUEST_ID_KEY).map(str::to_string)
}
