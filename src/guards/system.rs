//! System guards over the live service flags.
//!
//! Every guard chain already starts with a status check, so these are only
//! needed where availability must be tested inside a composite.

use crate::core::{Guard, GuardFamily, Verdict};
use crate::error::{Denial, ErrorKind};
use crate::guards::reasons::SERVICE_UNAVAILABLE;

/// Allow while the service switch is on.
pub fn service_available() -> Guard {
    Guard::local("system.service", GuardFamily::System, |env, _, _| {
        if env.status.is_available() {
            Verdict::allow("system.service")
        } else {
            Verdict::Deny(Denial::new(
                ErrorKind::ServiceUnavailable,
                "system.service",
                SERVICE_UNAVAILABLE,
            ))
        }
    })
}

/// Allow unless maintenance mode is on.
pub fn not_in_maintenance() -> Guard {
    Guard::local("system.maintenance", GuardFamily::System, |env, _, _| {
        if env.status.is_maintenance() {
            Verdict::Deny(Denial::new(
                ErrorKind::ServiceUnavailable,
                "system.maintenance",
                SERVICE_UNAVAILABLE,
            ))
        } else {
            Verdict::allow("system.maintenance")
        }
    })
}
