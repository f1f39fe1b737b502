//! Installation identity.

/// What the server knows this device by.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Installation {
    /// Push token last handed to the server.
    pub device_token: Option<String>,
    /// Server-assigned installation id; sync requires it.
    pub internal_id: Option<String>,
}

impl Installation {
    /// Creates an installation already known to the server.
    pub fn registered(internal_id: impl Into<String>) -> Self {
        Self {
            device_token: None,
            internal_id: Some(internal_id.into()),
        }
    }

    /// Returns true once the server assigned an id.
    pub fn is_registered(&self) -> bool {
        self.internal_id.is_some()
    }

    /// Forgets both the token and the id.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
