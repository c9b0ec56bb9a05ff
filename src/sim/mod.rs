// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory platform doubles.
//!
//! [`SimTransport`] and [`SimWifi`] implement the platform traits without
//! hardware, with failure injection. They drive the test suite and let the
//! library run on a host.

mod transport;
mod wifi;

pub use transport::{ERR_ARG, ERR_ROUTE, SimTransport};
pub use wifi::SimWifi;
