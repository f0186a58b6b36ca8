use crate::core::Update;

/// Drops endpoint updates for endpoints hosted on other nodes.
///
/// Policy and profile updates always pass, since any of them may apply to a local endpoint.
#[derive(Clone, Debug, Default)]
pub struct LocalEndpointFilter {
    hostname: Option<String>,
}

impl LocalEndpointFilter {
    /// Accepts only endpoints on `hostname`.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: Some(hostname.into()),
        }
    }

    /// Accepts every endpoint.
    pub fn any_host() -> Self {
        Self::default()
    }

    pub fn accepts(&self, update: &Update) -> bool {
        let Some(hostname) = self.hostname.as_deref() else {
            return true;
        };
        match update.endpoint_key() {
            Some(key) => key.hostname() == hostname,
            None => true,
        }
    }
}
