//! hostwatch - Host Telemetry Agent
//!
//! This crate provides the core functionality of the hostwatch agent. It can
//! be used as a library, or run as a background service with the `hostwatch`
//! executable.
//!
//! # Architecture
//!
//! - **Collectors**: per-domain platform readings (processor, memory, disk, battery, inventory)
//! - **Aggregation**: bounded sample windows reduced by mean or last value per field
//! - **Event log**: incremental, checkpointed scanning of OS crash and shutdown events
//! - **Storage**: SQLite persistence for event-log checkpoints
//! - **Sink**: typed point assembly and fire-and-forget InfluxDB publishing
//! - **Scheduler**: three non-reentrant periodic triggers with shutdown flush
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hostwatch::collector::memory::MemorySource;
//! use hostwatch::scheduler::{MetricSampler, Scheduler};
//! use hostwatch::sink::{Dispatcher, InfluxConfig, InfluxSink, PayloadAssembler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = InfluxSink::new(&InfluxConfig::default())?;
//!     let dispatcher = Dispatcher::new(Arc::new(sink));
//!     let assembler = PayloadAssembler::new("web-1", Default::default());
//!
//!     let sampler = MetricSampler::new(
//!         std::time::Duration::from_secs(3),
//!         10,
//!         assembler,
//!         dispatcher.clone(),
//!     )
//!     .with_source(MemorySource::new());
//!
//!     let mut scheduler = Scheduler::new(dispatcher);
//!     scheduler.spawn(sampler, false);
//!     tokio::signal::ctrl_c().await?;
//!     scheduler.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod eventlog;
pub mod scheduler;
pub mod service;
pub mod sink;
pub mod storage;

pub use aggregate::{AggregateError, SampleBuffer, Window, WindowStatus, aggregate};
pub use collector::{Domain, MetricSource, Sample, SourceError};
pub use config::{AppConfig, ConfigError, Overrides};
pub use eventlog::{EventKind, EventLogScanner, EventRecord, ScanBackoff, ScanError, ScanReport};
pub use scheduler::{EventLogJob, InventoryJob, MetricSampler, Scheduler};
pub use service::{InstallOptions, ServiceError, ServiceManager};
pub use sink::{Dispatcher, InfluxSink, MetricPoint, MetricsSink, PayloadAssembler, SinkError};
pub use storage::{CheckpointStore, StorageError};
