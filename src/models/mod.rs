//! Core data models shared by the ingest endpoint and the mirror sweeper.
//!
//! `RemoteObject` is what the remote media store hands back; `UploadFields`
//! is the metadata a client submits alongside an image.

pub mod remote_object;
pub mod upload;
