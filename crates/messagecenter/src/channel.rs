//! Device channel interface
//!
//! Channel registration is owned by the wider SDK; the message center only
//! needs to know the current channel ID to scope its requests and to detect
//! when the user identity must be re-associated.

/// Source of the device channel ID.
pub trait ChannelSource: Send + Sync {
    /// The current channel ID, or `None` if registration has not completed
    fn channel_id(&self) -> Option<String>;
}

/// A fixed channel ID, for embedders that manage registration themselves
pub struct FixedChannel {
    id: String,
}

impl FixedChannel {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl ChannelSource for FixedChannel {
    fn channel_id(&self) -> Option<String> {
        Some(self.id.clone())
    }
}
