//! # gpsd-location
//!
//! A Rust client for GPSD (GPS Service Daemon) that acquires position fixes.
//!
//! The client opens a connection to GPSD, subscribes in watch mode, reads the
//! newline-delimited JSON records that GPSD streams back and turns every usable
//! TPV (Time-Position-Velocity) report into a [`Fix`](protocol::v3::Fix):
//! latitude, longitude, altitude and the timestamp reported by the server.
//!
//! ## Overview
//!
//! GPSD monitors GPS receivers attached to a host and makes their data
//! available on TCP port 2947. This crate implements only the subset of the
//! JSON protocol needed to obtain a location:
//!
//! - one `?WATCH=` subscription command sent on connect
//! - classification of incoming records by their `class` field
//! - extraction of `lat`, `lon`, `alt` and `time` from TPV records
//!
//! Two operating modes are supported: single-fix (the "check connection" use
//! case, which stops at the first usable fix) and continuous tracking.
//!
//! ## Example
//!
//! ```no_run
//! use gpsd_location::client::{Endpoint, Mode, SessionConfig, blocking::Session};
//! use gpsd_location::protocol::v3::Fix;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::new(Endpoint::new("127.0.0.1", 2947), Mode::SingleFix);
//! let mut session = Session::new(config);
//!
//! let mut sink = |fix: Fix| println!("{fix}");
//! let fix = session.run(&mut sink)?;
//! println!("Session ended in {:?} with {:?}", session.state(), fix);
//! # Ok(())
//! # }
//! ```

use crate::error::GpsdLocationError;

/// Session configuration, the async client and the blocking session
pub mod client;

/// Error types used throughout the library
pub mod error;

/// Line codec and GPSD JSON protocol records
pub mod protocol;

/// Collaborators that consume delivered fixes
pub mod sink;

/// Convenience type alias for Results with GpsdLocationError
pub type Result<T> = core::result::Result<T, GpsdLocationError>;
