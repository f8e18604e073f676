//! HTTP implementation of the upload control plane.
//!
//! [`HttpControlPlane`] registers videos and renews storage credentials
//! against the platform API, implementing
//! [`ControlPlane`](vidup_upload::ControlPlane).

pub mod client;

pub use client::{HttpControlPlane, HttpError};
