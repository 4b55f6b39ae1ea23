//! Rewind Recorder
//!
//! Records the execution of a dynamic object-graph runtime as a text log
//! that a time-travel debugger can replay. The host calls a [`Recorder`]
//! hook at every instrumented operation; the recorder assigns each object a
//! logical identity token, defines it in the log the first time it is
//! mentioned, and writes the operation as a record over those tokens.

pub mod config;
pub mod error;
pub mod host;
pub mod recorder;
pub mod registry;
pub mod scope;
pub mod trace;

pub use config::RecorderConfig;
pub use error::RecorderError;
pub use host::{Address, CodeInfo, Diagnostic, FrameView, Host, Shape, SliceBounds, Value};
pub use recorder::{Recorder, SessionSummary};
pub use registry::Token;
pub use trace::verify::{verify_log, LogStats, VerifyError};
