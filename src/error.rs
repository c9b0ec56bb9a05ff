// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `espnet` library.
//!
//! Every public entry point returns an explicit [`Result`]. Errors raised
//! synchronously (allocation, arguments, state, admission) are returned to
//! the caller; errors produced by asynchronous transport or radio
//! completions are delivered through connection error callbacks or the
//! supervisor's fatal callback, carrying the same [`Error`] type.

use thiserror::Error;

use crate::event::{EventCode, Group};

/// The main error type for this library.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A record could not be allocated.
    #[error("out of memory")]
    OutOfMemory,

    /// The callback is already attached to the event under another group.
    #[error("event {code} already attached under group {existing}, not {group}")]
    GroupConflict {
        /// The event code.
        code: EventCode,
        /// The group requested by the caller.
        group: Group,
        /// The group of the live subscription.
        existing: Group,
    },

    /// The transport handle is already tracked by the registry.
    #[error("transport handle is already registered")]
    DuplicateRegistration,

    /// An argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not allowed from the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// Description of the current state.
        state: String,
    },

    /// The connection is not tracked by the registry.
    #[error("connection is not registered")]
    NotRegistered,

    /// The transport layer reported an error.
    #[error("network error (transport code {0})")]
    Network(i16),

    /// The supervisor has already been started.
    #[error("supervisor already started")]
    AlreadyStarted,

    /// The supervisor has not been started.
    #[error("supervisor not started")]
    NotStarted,

    /// The station gave up associating after reaching its retry ceiling.
    #[error("wifi association failed after {attempts} attempts (reason {reason})")]
    WifiAssociationFailed {
        /// Hardware disconnect reason of the last attempt.
        reason: u8,
        /// Number of consecutive failed attempts.
        attempts: u8,
    },

    /// A previously associated station lost its association.
    #[error("wifi disconnected (reason {reason})")]
    WifiDisconnected {
        /// Hardware disconnect reason.
        reason: u8,
    },

    /// A platform call returned failure.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}

impl Error {
    /// Returns the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::OutOfMemory => ErrorCategory::Memory,
            Self::GroupConflict { .. }
            | Self::DuplicateRegistration
            | Self::InvalidArgument(_) => ErrorCategory::Argument,
            Self::InvalidState { .. } | Self::NotRegistered => ErrorCategory::State,
            Self::Network(_) => ErrorCategory::Network,
            Self::AlreadyStarted | Self::NotStarted => ErrorCategory::Admission,
            Self::WifiAssociationFailed { .. } | Self::WifiDisconnected { .. } => {
                ErrorCategory::Wifi
            }
            Self::Platform(_) => ErrorCategory::Platform,
        }
    }

    pub(crate) fn invalid_state(operation: &'static str, state: impl ToString) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Allocation failures.
    Memory,
    /// Rejected arguments, group conflicts and duplicate registrations.
    Argument,
    /// Operations attempted from a state that forbids them.
    State,
    /// Transport-layer failures.
    Network,
    /// Station association failures.
    Wifi,
    /// Supervisor admission control.
    Admission,
    /// Platform call failures.
    Platform,
}

/// A platform (radio or IP configuration) call returned failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{operation} failed")]
pub struct PlatformError {
    /// Name of the failing platform operation.
    pub operation: &'static str,
}

impl PlatformError {
    /// Creates a platform error for the named operation.
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self { operation }
    }
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_conflict_display() {
        let err = Error::GroupConflict {
            code: 10,
            group: 2,
            existing: 1,
        };
        assert_eq!(
            err.to_string(),
            "event 10 already attached under group 1, not 2"
        );
    }

    #[test]
    fn error_from_platform_error() {
        let err: Error = PlatformError::new("dhcp_start").into();
        assert!(matches!(err, Error::Platform(PlatformError { operation: "dhcp_start" })));
        assert_eq!(err.to_string(), "platform error: dhcp_start failed");
    }

    #[test]
    fn categories() {
        assert_eq!(Error::OutOfMemory.category(), ErrorCategory::Memory);
        assert_eq!(Error::DuplicateRegistration.category(), ErrorCategory::Argument);
        assert_eq!(Error::Network(-8).category(), ErrorCategory::Network);
        assert_eq!(
            Error::WifiAssociationFailed {
                reason: 201,
                attempts: 3
            }
            .category(),
            ErrorCategory::Wifi
        );
        assert_eq!(Error::NotStarted.category(), ErrorCategory::Admission);
        assert_eq!(
            Error::invalid_state("connect", "connected").category(),
            ErrorCategory::State
        );
    }

    #[test]
    fn invalid_state_display() {
        let err = Error::invalid_state("send", "idle");
        assert_eq!(err.to_string(), "cannot send while idle");
    }
}
