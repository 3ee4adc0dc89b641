//! Services behind the HTTP layer and the sweeper process.

pub mod cloudinary;
pub mod ingest_service;
pub mod key_mapper;
pub mod mirror_writer;
pub mod remote_store;
pub mod scheduler;
pub mod sweeper;
