//! Collector Layer
//!
//! Per-domain metric sources. Each source returns one typed reading per call
//! and fails independently of the others.
//!
//! # Architecture
//!
//! - [`MetricSource`]: Core trait for implementing a domain collector
//! - [`Sample`]: A windowable reading with its per-field reduction policy
//! - [`Domain`]: Metric domain classification
//!
//! # Example
//!
//! ```rust,no_run
//! use hostwatch::collector::{MetricSource, processor::ProcessorSource};
//!
//! # async fn run() -> Result<(), hostwatch::collector::SourceError> {
//! let source = ProcessorSource::new();
//! let reading = source.sample().await?;
//! println!("cpu: {:?}%", reading.usage_percent);
//! # Ok(())
//! # }
//! ```

pub mod battery;
pub mod disk;
pub mod inventory;
pub mod memory;
pub mod processor;
mod traits;

pub use traits::{Domain, MetricSource, Sample, SourceError};
