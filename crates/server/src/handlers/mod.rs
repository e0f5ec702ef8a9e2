//! Request handlers for the OCI surface.

pub mod blobs;
pub mod manifests;
pub mod meta;
pub mod referrers;
pub mod uploads;
