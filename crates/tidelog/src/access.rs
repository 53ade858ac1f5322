//! Write-permission checks consulted on local append and remote merge.

use std::collections::HashSet;

use crate::entry::Entry;
use crate::error::LogError;
use crate::identity::IdentityProvider;

/// Decides whether an entry may enter a log.
///
/// Consulted once per appended entry and once per entry received in a join.
#[async_trait::async_trait]
pub trait AccessController: Send + Sync {
    /// Return `true` if `entry` may be added.
    async fn can_append(
        &self,
        entry: &Entry,
        provider: &dyn IdentityProvider,
    ) -> Result<bool, LogError>;
}

/// Lets every entry through. The default when a log is built without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait::async_trait]
impl AccessController for AllowAll {
    async fn can_append(&self, _: &Entry, _: &dyn IdentityProvider) -> Result<bool, LogError> {
        Ok(true)
    }
}

/// Allow-list keyed by identity id or public key hex. `"*"` admits everyone.
#[derive(Debug, Clone, Default)]
pub struct WriteAccess {
    writers: HashSet<String>,
}

impl WriteAccess {
    /// Build an allow-list from identity ids and/or public key hex strings.
    pub fn new<I, S>(writers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            writers: writers.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait::async_trait]
impl AccessController for WriteAccess {
    async fn can_append(&self, entry: &Entry, _: &dyn IdentityProvider) -> Result<bool, LogError> {
        if self.writers.contains("*") {
            return Ok(true);
        }

        let Some(identity) = &entry.identity else {
            return Ok(false);
        };

        Ok(self.writers.contains(&identity.id)
            || self.writers.contains(&identity.public_key_hex()))
    }
}
