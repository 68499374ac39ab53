//! Fix consumers for host applications
//!
//! A host application usually wants two things from a session: the most
//! recent fix and the latest status line to show its user, and a way to
//! push that fix into its own notion of the observer's location.
//! [`LatestFix`] provides both.

use crate::client::{FixSink, Status};
use crate::protocol::v3::Fix;

/// Something that holds an observer's geographic location
///
/// Implemented by the host application, e.g. on its astronomy profile.
pub trait ObserverLocation {
    fn set_latitude(&mut self, degrees: f64);
    fn set_longitude(&mut self, degrees: f64);
    fn set_elevation(&mut self, meters: f64);
}

/// Errors from applying a fix to an observer location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyError {
    /// No fix has been acquired yet
    NoLocation,
}

impl core::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyError::NoLocation => write!(f, "Location data is not available."),
        }
    }
}

impl core::error::Error for ApplyError {}

/// Keeps the most recent fix and status message of a session
///
/// Each delivered fix replaces the previous one as a whole.
#[derive(Debug, Clone, Default)]
pub struct LatestFix {
    fix: Option<Fix>,
    status: Option<String>,
}

impl LatestFix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fix(&self) -> Option<&Fix> {
        self.fix.as_ref()
    }

    /// The last status line reported by the session
    pub fn status_message(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Pushes the held fix to an observer location
    ///
    /// Altitude becomes the observer's elevation.
    pub fn apply<O: ObserverLocation + ?Sized>(&self, observer: &mut O) -> Result<(), ApplyError> {
        let fix = self.fix.as_ref().ok_or(ApplyError::NoLocation)?;
        observer.set_latitude(fix.latitude());
        observer.set_longitude(fix.longitude());
        observer.set_elevation(fix.altitude_meters());
        log::info!("Location data applied to observer: {}", fix);
        Ok(())
    }
}

impl FixSink for LatestFix {
    fn deliver(&mut self, fix: Fix) {
        self.fix = Some(fix);
    }

    fn status(&mut self, status: &Status) {
        self.status = Some(status.to_string());
    }
}
