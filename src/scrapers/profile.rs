use std::fmt;

/// Identity and rank of a scraper strategy. Lower priority is tried earlier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteServerProfile {
    pub id: String,
    pub priority: u32,
    pub display_name: String,
}

impl RemoteServerProfile {
    pub fn new(id: &str, priority: u32, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            priority,
            display_name: display_name.to_string(),
        }
    }
}

impl fmt::Display for RemoteServerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, priority {})", self.display_name, self.id, self.priority)
    }
}
