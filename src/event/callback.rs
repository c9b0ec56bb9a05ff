// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event callbacks and delivered events.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::EventCode;

/// Opaque trigger argument shared with every subscriber.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// An event as delivered to subscribers.
#[derive(Clone)]
pub struct Event {
    code: EventCode,
    payload: Option<Payload>,
}

impl Event {
    /// Creates an event.
    #[must_use]
    pub fn new(code: EventCode, payload: Option<Payload>) -> Self {
        Self { code, payload }
    }

    /// Returns the event code.
    #[must_use]
    pub fn code(&self) -> EventCode {
        self.code
    }

    /// Returns the trigger payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Returns the payload downcast to `T`.
    ///
    /// Returns `None` if there is no payload or it has another type.
    #[must_use]
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("code", &self.code)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// A subscriber callback with a comparable identity.
///
/// The bus keys subscriptions by `(event code, callback identity)`. Two
/// `EventCallback`s are equal only if one was cloned from the other, so keep
/// the value around to detach later.
///
/// # Examples
///
/// ```
/// use espnet::event::EventCallback;
///
/// let a = EventCallback::new(|_| {});
/// let b = EventCallback::new(|_| {});
///
/// assert_eq!(a, a.clone());
/// assert_ne!(a, b);
/// ```
#[derive(Clone)]
pub struct EventCallback(Arc<dyn Fn(&Event) + Send + Sync>);

impl EventCallback {
    /// Wraps a closure into a callback with a fresh identity.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub(crate) fn call(&self, event: &Event) {
        (self.0)(event);
    }
}

impl PartialEq for EventCallback {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl Eq for EventCallback {}

impl fmt::Debug for EventCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventCallback({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn identity_follows_clones() {
        let a = EventCallback::new(|_| {});
        let b = EventCallback::new(|_| {});

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn payload_downcast() {
        let event = Event::new(7, Some(Arc::new(42_u32)));
        assert_eq!(event.code(), 7);
        assert_eq!(event.payload_as::<u32>(), Some(&42));
        assert!(event.payload_as::<String>().is_none());

        let empty = Event::new(7, None);
        assert!(empty.payload_as::<u32>().is_none());
    }

    #[test]
    fn call_invokes_closure() {
        let seen = Arc::new(AtomicU32::new(0));
        let sink = Arc::clone(&seen);
        let cb = EventCallback::new(move |event| {
            sink.store(u32::from(event.code()), Ordering::SeqCst);
        });

        cb.call(&Event::new(12, None));
        assert_eq!(seen.load(Ordering::SeqCst), 12);
    }
}
