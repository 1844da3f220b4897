//! Location state of a connected user and partial updates to it.

use serde::{Deserialize, Deserializer, Serialize};

use crate::value_objects::SessionKey;

/// Who may see a user's location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// Hidden from everyone
    #[default]
    None,
    /// Visible to friends
    Friends,
    /// Visible to connections
    Connections,
    /// Visible to everyone
    All,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Friends => write!(f, "friends"),
            Self::Connections => write!(f, "connections"),
            Self::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for Availability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "friends" => Ok(Self::Friends),
            "connections" => Ok(Self::Connections),
            "all" => Ok(Self::All),
            _ => Err(format!("Invalid availability: {s}")),
        }
    }
}

/// Live location of a user session
///
/// The default value is the state of a freshly created session: no
/// availability, disconnected, no domain, empty network address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocationState {
    pub availability: Availability,
    pub connected: bool,
    pub domain_id: Option<SessionKey>,
    pub network_address: String,
    pub network_port: String,
    pub node_id: Option<String>,
    pub path: String,
    pub place_id: Option<String>,
}

/// Partial location update
///
/// Absent fields keep their current value. For nullable fields the outer
/// `Option` says whether the field was provided and the inner one carries the
/// value, so an explicit `null` clears the field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct LocationPatch {
    pub availability: Option<Availability>,
    pub connected: Option<bool>,
    #[serde(deserialize_with = "provided")]
    pub domain_id: Option<Option<SessionKey>>,
    pub network_address: Option<String>,
    pub network_port: Option<String>,
    #[serde(deserialize_with = "provided")]
    pub node_id: Option<Option<String>>,
    pub path: Option<String>,
    #[serde(deserialize_with = "provided")]
    pub place_id: Option<Option<String>>,
}

/// Marks a present field (including `null`) as provided.
fn provided<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl LocationPatch {
    /// Create an empty patch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn availability(mut self, availability: Availability) -> Self {
        self.availability = Some(availability);
        self
    }

    #[must_use]
    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = Some(connected);
        self
    }

    /// Move into a domain, or leave the current one with `None`
    #[must_use]
    pub fn domain(mut self, domain_id: Option<SessionKey>) -> Self {
        self.domain_id = Some(domain_id);
        self
    }

    #[must_use]
    pub fn network(mut self, address: impl Into<String>, port: impl Into<String>) -> Self {
        self.network_address = Some(address.into());
        self.network_port = Some(port.into());
        self
    }

    #[must_use]
    pub fn node(mut self, node_id: Option<String>) -> Self {
        self.node_id = Some(node_id);
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn place(mut self, place_id: Option<String>) -> Self {
        self.place_id = Some(place_id);
        self
    }

    /// The requested domain change, if the patch provides one
    pub fn domain_change(&self) -> Option<Option<&SessionKey>> {
        self.domain_id.as_ref().map(Option::as_ref)
    }

    /// Apply every provided field except `domain_id`
    ///
    /// The domain is owned by the presence linker, which must update the
    /// rosters before the new value becomes visible.
    pub fn apply(&self, location: &mut LocationState) {
        if let Some(availability) = self.availability {
            location.availability = availability;
        }
        if let Some(connected) = self.connected {
            location.connected = connected;
        }
        if let Some(address) = &self.network_address {
            location.network_address.clone_from(address);
        }
        if let Some(port) = &self.network_port {
            location.network_port.clone_from(port);
        }
        if let Some(node_id) = &self.node_id {
            location.node_id.clone_from(node_id);
        }
        if let Some(path) = &self.path {
            location.path.clone_from(path);
        }
        if let Some(place_id) = &self.place_id {
            location.place_id.clone_from(place_id);
        }
    }
}
