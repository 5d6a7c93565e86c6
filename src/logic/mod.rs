//! Logic modules: turn configuration into backup work and carry it out.
//!
//! # Modules
//!
//! - `resolver` joins target declarations with the database and volume catalogs
//! - `poller` requests snapshots and waits for their jobs
//! - `driver` runs the quiesce, snapshot and unquiesce workflow per target

pub mod driver;
pub mod poller;
pub mod resolver;
