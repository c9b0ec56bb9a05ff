// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-shot delay timer.
//!
//! A [`DelayTimer`] runs a closure once on the current tokio runtime after
//! the requested delay. Dropping the timer does not cancel it; call
//! [`DelayTimer::cancel`] for that.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// A scheduled one-shot callback.
#[derive(Debug)]
pub struct DelayTimer {
    handle: JoinHandle<()>,
    delay: Duration,
}

impl DelayTimer {
    /// Schedules `callback` to run once after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when called outside a tokio runtime.
    pub fn start<F>(delay: Duration, callback: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|_| Error::invalid_state("start timer", "outside a tokio runtime"))?;

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });

        Ok(Self { handle, delay })
    }

    /// Cancels the timer if it has not fired yet.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Returns true once the timer has fired or been cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Returns the delay the timer was armed with.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}
