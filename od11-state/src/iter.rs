//! Blocking iterator over property change events
//!
//! Only watched properties produce events.
//!
//! ```rust,ignore
//! let mirror = StateMirror::new();
//! mirror.watch(Volume::KEY);
//!
//! for event in mirror.iter() {
//!     println!("{} changed", event.property_key);
//! }
//!
//! // Drain whatever is queued without blocking
//! for event in mirror.iter().try_iter() {
//!     println!("{} changed", event.property_key);
//! }
//! ```

use std::sync::{mpsc, Arc};
use std::time::Duration;

use parking_lot::Mutex;

use crate::event::ChangeEvent;

/// Blocking iterator over property change events
///
/// All iterators created from the same mirror share one queue, so each event
/// is delivered to exactly one of them.
pub struct ChangeIterator {
    rx: Arc<Mutex<mpsc::Receiver<ChangeEvent>>>,
}

impl ChangeIterator {
    pub(crate) fn new(rx: Arc<Mutex<mpsc::Receiver<ChangeEvent>>>) -> Self {
        Self { rx }
    }

    /// Block until the next event is available
    ///
    /// Returns `None` if the channel is closed.
    pub fn recv(&self) -> Option<ChangeEvent> {
        self.rx.lock().recv().ok()
    }

    /// Block until the next event or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        self.rx.lock().recv_timeout(timeout).ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<ChangeEvent> {
        self.rx.lock().try_recv().ok()
    }

    /// Iterator over the events currently queued
    pub fn try_iter(&self) -> TryIter<'_> {
        TryIter { inner: self }
    }

    /// Iterator that waits up to `timeout` for each event
    ///
    /// Stops at the first timeout.
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIter<'_> {
        TimeoutIter {
            inner: self,
            timeout,
        }
    }
}

impl Iterator for ChangeIterator {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Non-blocking iterator over currently available events
pub struct TryIter<'a> {
    inner: &'a ChangeIterator,
}

impl<'a> Iterator for TryIter<'a> {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with timeout
pub struct TimeoutIter<'a> {
    inner: &'a ChangeIterator,
    timeout: Duration,
}

impl<'a> Iterator for TimeoutIter<'a> {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}
