//! Sink Layer
//!
//! Turns typed samples and event records into measurement points and ships
//! them to the time-series backend.
//!
//! # Architecture
//!
//! - [`PayloadAssembler`]: per-domain point builders plus static host tags
//! - [`MetricPoint`]: one point and its line-protocol encoding
//! - [`MetricsSink`]: publishing seam, implemented by [`InfluxSink`]
//! - [`Dispatcher`]: fire-and-forget publishing with drain-on-shutdown

mod dispatch;
mod influx;
mod payload;
mod point;
mod traits;

pub use dispatch::{DEFAULT_SHUTDOWN_TIMEOUT, Dispatcher};
pub use influx::{DEFAULT_SINK_TIMEOUT, InfluxConfig, InfluxSink, TlsConfig, TlsMode};
pub use payload::{Measurement, PayloadAssembler};
pub use point::{FieldValue, MetricPoint, StaticTags};
pub use traits::{MetricsSink, SinkError};
