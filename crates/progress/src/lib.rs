//! Progress reporting
//!
//! Per-step status updates emitted while a request's route is executed.

#![warn(missing_docs)]

pub mod tracker;

pub use tracker::{
    ChannelProgressSink, ProgressRecorder, ProgressSink, ProgressSnapshot,
    TracingProgressSink,
};
