/// Origins accepted even when nothing else is configured.
pub const DEFAULT_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

/// Exact-match allow-list for the `Origin` request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self {
            allowed: DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

impl OriginPolicy {
    /// Defaults plus every entry of a comma-separated list.
    pub fn with_extra(extra: &[String]) -> Self {
        let mut policy = Self::default();
        for origin in extra.iter().map(|o| o.trim()).filter(|o| !o.is_empty()) {
            if !policy.allowed.iter().any(|a| a == origin) {
                policy.allowed.push(origin.to_string());
            }
        }
        policy
    }

    /// Requests without an origin (curl, server-to-server) always pass.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(origin) => self.allowed.iter().any(|a| a == origin),
        }
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }
}
