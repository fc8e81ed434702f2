//! `scout-runtime` – the fusion loop and everything it talks to.
//!
//! # Modules
//!
//! - [`fusion_loop`] – [`FusionLoop`][fusion_loop::FusionLoop]: composes the
//!   peripherals, the perception stages and the backend into one sequential
//!   cycle, with startup authentication and guaranteed release on shutdown.
//! - [`alert`] – [`AlertController`][alert::AlertController]: blocking buzzer
//!   patterns for proximity, detection and cycle errors.
//! - [`sync_client`] – [`SyncClient`][sync_client::SyncClient]: the
//!   authenticated session and best-effort record saves, over a
//!   [`Transport`][sync_client::Transport] seam.
//! - [`storage`] – [`ImageSink`][storage::ImageSink]: local disk or signed
//!   upload to an S3 bucket.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with optional OTLP export.

pub mod alert;
pub mod fusion_loop;
pub mod storage;
pub mod sync_client;
pub mod telemetry;

pub use alert::{AlertController, AlertPattern};
pub use fusion_loop::{
    CycleRecord, FusionLoop, FusionLoopConfig, PersistenceReport, Peripherals, RunSummary,
};
pub use storage::{
    ImageSink, LocalImageSink, ObjectStoreCredentials, ObjectStoreSink, ObjectStoreTarget,
    StoredImage,
};
pub use sync_client::{HttpTransport, SyncClient, SyncOutcome, Transport, TransportResponse};
pub use telemetry::{TracerProviderGuard, init_tracing};
