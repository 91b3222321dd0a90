//! Scheduler Layer
//!
//! Drives the three periodic triggers and owns window rollover.
//!
//! # Architecture
//!
//! - [`Trigger`]: a [`Job`] plus an idle/running flag; handlers never overlap
//!   themselves and always re-arm
//! - [`MetricSampler`]: samples every [`SamplingLane`] per tick and flushes all
//!   windows every N ticks
//! - [`EventLogJob`]: event-log scan with adaptive interval
//! - [`InventoryJob`]: inventory refresh through an [`InventoryCache`]
//! - [`Scheduler`]: spawns triggers and flushes partial windows on shutdown

mod eventlog;
mod inventory;
mod lane;
mod metrics;
mod runner;
mod trigger;

pub use eventlog::EventLogJob;
pub use inventory::{DEFAULT_INVENTORY_INTERVAL, InventoryCache, InventoryJob, Refresh};
pub use lane::{Lane, SamplingLane};
pub use metrics::{DEFAULT_AGGREGATION_COUNT, DEFAULT_SAMPLING_INTERVAL, MetricSampler};
pub use runner::{Scheduler, ShutdownReport, TriggerStatus};
pub use trigger::{Job, MIN_INTERVAL, Trigger, TriggerState, clamp_interval};
