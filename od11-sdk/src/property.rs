//! Generic PropertyHandle for typed access to mirrored values
//!
//! - `get()` - cached value (instant, no network)
//! - `watch()` - register for change notifications
//! - `unwatch()` - unregister from change notifications

use std::marker::PhantomData;
use std::sync::Arc;

use od11_state::Property;

use crate::device::DeviceContext;

/// Handle to one property of a device
///
/// # Example
///
/// ```rust,ignore
/// let volume = device.property::<Volume>();
///
/// // Cached value, no network call
/// let current = volume.get();
///
/// // Changes now appear in device.iter()
/// volume.watch();
/// for event in device.iter() {
///     if event.property_key == Volume::KEY {
///         println!("Volume changed to: {:?}", volume.get());
///     }
/// }
/// ```
#[derive(Clone)]
pub struct PropertyHandle<P: Property> {
    context: Arc<DeviceContext>,
    _phantom: PhantomData<P>,
}

impl<P: Property> PropertyHandle<P> {
    pub(crate) fn new(context: Arc<DeviceContext>) -> Self {
        Self {
            context,
            _phantom: PhantomData,
        }
    }

    /// Get the mirrored value, or `None` if the device has not reported it
    /// on the current connection
    pub fn get(&self) -> Option<P> {
        self.context.mirror.get::<P>()
    }

    /// Start watching this property and return its current value
    pub fn watch(&self) -> Option<P> {
        self.context.mirror.watch(P::KEY);
        self.get()
    }

    pub fn unwatch(&self) {
        self.context.mirror.unwatch(P::KEY);
    }

    pub fn is_watched(&self) -> bool {
        self.context.mirror.is_watched(P::KEY)
    }

    pub fn key(&self) -> &'static str {
        P::KEY
    }
}

impl<P: Property + std::fmt::Debug> std::fmt::Debug for PropertyHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyHandle")
            .field("key", &P::KEY)
            .field("value", &self.get())
            .finish()
    }
}
