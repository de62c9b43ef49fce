//! Observability setup for Waystone: tracing subscriber and OpenTelemetry export.

pub mod tracing_setup;
