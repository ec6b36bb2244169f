//! Observability setup for Lectern: structured logging and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
