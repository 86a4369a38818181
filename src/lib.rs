//! Snack classification over a camera stream with bounded frame admission.

#[cfg(feature = "camera")]
pub mod camera;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod frame;
pub mod gate;
pub mod ipc;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod report;

pub use classifier::{Classifier, NullClassifier};
pub use cli::{execute, run_cli, Cli, Commands, ConfigSubcommand};
pub use dispatch::{Dispatcher, FrameAdmitter, Pipeline, PhotoSubmitter};
pub use frame::{load_photo, DirectorySource, Frame, FrameSource, Photo};
pub use gate::{AdmissionGate, GateError, GateStats, Permit, DEFAULT_CAPACITY};
pub use report::{Classification, MemorySink, Outcome, Report, ResultSink, Source};
