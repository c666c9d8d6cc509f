pub mod capture;
pub mod naming;

pub use capture::{CaptureController, CaptureSessions, OutputPolicy};
