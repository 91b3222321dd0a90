//! Aggregation windows.
//!
//! A [`SampleBuffer`] collects up to N readings of one domain. Once full it
//! reports [`WindowStatus::ReadyToFlush`]; the owner drains it and reduces the
//! readings with [`aggregate`], which applies the sample type's per-field
//! policy through the [`Window`] helpers.

use thiserror::Error;

use crate::collector::Sample;

/// Errors raised by window reduction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    /// Reduction was requested for a window with no samples.
    #[error("cannot aggregate an empty window")]
    EmptyWindow,
}

/// Reduce a window of samples into one summary sample.
///
/// # Errors
/// Returns [`AggregateError::EmptyWindow`] if `samples` is empty.
pub fn aggregate<S: Sample>(samples: &[S]) -> Result<S, AggregateError> {
    let window = Window::new(samples)?;
    Ok(S::reduce(&window))
}

/// Non-empty, read-only view over a window of samples.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a, T> {
    samples: &'a [T],
}

impl<'a, T> Window<'a, T> {
    /// Wrap a slice, rejecting empty input.
    pub fn new(samples: &'a [T]) -> Result<Self, AggregateError> {
        if samples.is_empty() {
            Err(AggregateError::EmptyWindow)
        } else {
            Ok(Self { samples })
        }
    }

    /// Number of samples in the window (always at least one).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; present for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Most recent sample.
    pub fn newest(&self) -> &'a T {
        // Non-empty by construction.
        &self.samples[self.samples.len() - 1]
    }

    /// Last-value policy: the field as observed in the newest sample.
    pub fn last<V>(&self, field: impl Fn(&T) -> V) -> V {
        field(self.newest())
    }

    /// Mean policy over the samples that reported the field.
    ///
    /// Returns `None` when no sample in the window reported a value. The mean
    /// is computed as an offset from the first reported value, so a constant
    /// series reduces to exactly that constant.
    pub fn mean(&self, field: impl Fn(&T) -> Option<f64>) -> Option<f64> {
        let mut values = self.samples.iter().filter_map(field);
        let base = values.next()?;
        let (count, offset_sum) = values.fold((1usize, 0.0f64), |(n, sum), v| {
            (n + 1, sum + (v - base))
        });
        Some(base + offset_sum / count as f64)
    }

    /// Mean policy for integer counters, rounded to the nearest integer.
    pub fn mean_u64(&self, field: impl Fn(&T) -> Option<u64>) -> Option<u64> {
        self.mean(|s| field(s).map(|v| v as f64))
            .map(|m| m.round().max(0.0) as u64)
    }
}

/// Fill state reported after each append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    /// More samples fit before the window is complete.
    Open {
        /// Samples currently held.
        len: usize,
    },
    /// The window holds N samples and must be drained.
    ReadyToFlush,
}

/// Bounded, ordered buffer of samples for one domain.
///
/// The buffer never grows past its capacity: samples offered while it is
/// full are discarded with a warning until the owner drains it.
#[derive(Debug)]
pub struct SampleBuffer<T> {
    samples: Vec<T>,
    capacity: usize,
    dropped: u64,
}

impl<T: Sample> SampleBuffer<T> {
    /// Create a buffer holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append a sample, or discard it if the window is already full.
    pub fn append(&mut self, sample: T) -> WindowStatus {
        if self.samples.len() >= self.capacity {
            self.dropped += 1;
            tracing::warn!(
                domain = %T::DOMAIN,
                capacity = self.capacity,
                dropped_total = self.dropped,
                "Aggregation window full, discarding sample"
            );
            return WindowStatus::ReadyToFlush;
        }

        self.samples.push(sample);
        self.status()
    }

    /// Current fill state.
    pub fn status(&self) -> WindowStatus {
        if self.samples.len() >= self.capacity {
            WindowStatus::ReadyToFlush
        } else {
            WindowStatus::Open {
                len: self.samples.len(),
            }
        }
    }

    /// Take every buffered sample, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.samples, Vec::with_capacity(self.capacity))
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Configured window size N.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples discarded because the window was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
