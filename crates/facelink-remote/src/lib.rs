//! facelink-remote: HTTP client for the face-recognition backend.
//!
//! Uploads frames for recognition, registers enrollment images and looks up
//! registered faces. Response payloads are normalized to
//! [`facelink_core::RecognitionRecord`] lists.

pub mod client;
pub mod enroll;
pub mod response;

pub use client::{RecognitionClient, RemoteError, DEFAULT_API_URL};
pub use enroll::{run_enrollment, EnrollmentPlan, EnrollmentTally};
pub use response::parse_recognitions;
