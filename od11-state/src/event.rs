use std::time::Instant;

/// A change event emitted when a watched property changes
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Property key that changed
    pub property_key: &'static str,
    /// When the change occurred
    pub timestamp: Instant,
}

impl ChangeEvent {
    pub fn new(property_key: &'static str) -> Self {
        Self {
            property_key,
            timestamp: Instant::now(),
        }
    }
}
