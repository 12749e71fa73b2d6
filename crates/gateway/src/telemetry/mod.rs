//! Structured logging and optional span export.
//!
//! Logs are always written to stdout as JSON. Spans are additionally exported
//! over OTLP/gRPC when `OTEL_EXPORTER_OTLP_ENDPOINT` is configured.
//!
//! # Telemetry invariants
//!
//! - **No key material, token, message content or sender id** may appear in
//!   any span attribute or log field. Rejections are logged by reason code
//!   plus [`common::RejectReason::detail`], never by parser messages.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`).

pub mod init;

pub use init::init_telemetry;
