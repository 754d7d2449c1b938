//! Traffic channels throttled by the service.

use std::fmt;

/// Property key carrying the in-app message rate.
pub const IN_APP_RATE_PROPERTY: &str = "max.inapp.message.rate";

/// Property key carrying the push notification rate.
pub const PUSH_RATE_PROPERTY: &str = "max.push.message.rate";

/// An independently rate-limited class of outbound traffic.
///
/// ```rust
/// use dispatch_throttle::Channel;
///
/// assert_eq!(Channel::from_property("max.push.message.rate"), Some(Channel::Push));
/// assert_eq!(Channel::InApp.to_string(), "in_app");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Messages delivered inside the application.
    InApp,
    /// Mobile push notifications.
    Push,
}

impl Channel {
    /// Both channels, in a fixed order.
    pub const ALL: [Channel; 2] = [Channel::InApp, Channel::Push];

    /// Stable lowercase name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::InApp => "in_app",
            Self::Push => "push",
        }
    }

    /// Configuration property holding this channel's rate.
    pub const fn property_key(self) -> &'static str {
        match self {
            Self::InApp => IN_APP_RATE_PROPERTY,
            Self::Push => PUSH_RATE_PROPERTY,
        }
    }

    /// Maps a configuration property name to its channel.
    ///
    /// Matching is exact; anything else, including the empty string, is
    /// not a rate property.
    pub fn from_property(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.property_key() == name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
