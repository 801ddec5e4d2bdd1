use crate::cache::ServiceCache;
use crate::client::{Connector, Credentials, JablotronClientError};

/// Owns the account credentials and the data cached for every discovered service.
pub struct JablotronClient<C: Connector> {
    connector: C,
    credentials: Credentials,
    /// Passed along with arm requests to override open-zone warnings.
    pub force_arm: bool,
    pub services: ServiceCache,
}

impl<C: Connector> JablotronClient<C> {
    pub fn new(
        connector: C,
        username: impl Into<String>,
        password: impl Into<String>,
        default_pin: impl Into<String>,
        force_arm: bool,
    ) -> Self {
        JablotronClient {
            connector,
            credentials: Credentials {
                username: username.into(),
                password: password.into(),
                default_pin: default_pin.into(),
            },
            force_arm,
            services: ServiceCache::new(),
        }
    }

    /// Log in again and hand out the new session.
    pub fn get_bridge(&self) -> Result<C::Bridge, JablotronClientError> {
        self.connector.connect(&self.credentials)
    }

    pub fn code_or_default<'a>(&'a self, code: Option<&'a str>) -> &'a str {
        match code {
            Some(c) if !c.is_empty() => c,
            _ => &self.credentials.default_pin,
        }
    }
}
