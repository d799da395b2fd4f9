use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::flag::FeatureFlag;
use crate::{validate_name, Client, FlagError};

/// Where a [`FlagResolver`](crate::FlagResolver) reads and writes flags.
///
/// Unlike [`Client::read_flag`], `fetch_flag` reports read failures so the
/// resolver can record them; the resolver still treats a failed read as
/// disabled.
#[async_trait]
pub trait FlagSource: Send + Sync {
    async fn fetch_flag(&self, name: &str) -> Result<bool, FlagError>;
    async fn write_flag(&self, name: &str, enabled: bool) -> Result<(), FlagError>;
}

#[async_trait]
impl FlagSource for Client {
    async fn fetch_flag(&self, name: &str) -> Result<bool, FlagError> {
        Client::fetch_flag(self, name).await
    }

    async fn write_flag(&self, name: &str, enabled: bool) -> Result<(), FlagError> {
        Client::write_flag(self, name, enabled).await
    }
}

/// In-process flag store for offline runs and tests.
///
/// Reading an unknown flag fails with [`FlagError::NotFound`], the way the
/// flag service answers 404. Writing upserts.
#[derive(Default)]
pub struct MemorySource {
    flags: RwLock<HashMap<String, bool>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, name: &str, enabled: bool) -> Self {
        self.flags.get_mut().insert(name.to_string(), enabled);
        self
    }

    pub async fn flags(&self) -> Vec<FeatureFlag> {
        let flags = self.flags.read().await;
        let mut all_flags: Vec<FeatureFlag> = flags
            .iter()
            .map(|(name, enabled)| FeatureFlag::new(name.clone(), *enabled))
            .collect();
        all_flags.sort_by(|a, b| a.name.cmp(&b.name));
        all_flags
    }
}

#[async_trait]
impl FlagSource for MemorySource {
    async fn fetch_flag(&self, name: &str) -> Result<bool, FlagError> {
        validate_name(name)?;
        let flags = self.flags.read().await;
        flags
            .get(name)
            .copied()
            .ok_or_else(|| FlagError::NotFound(name.to_string()))
    }

    async fn write_flag(&self, name: &str, enabled: bool) -> Result<(), FlagError> {
        validate_name(name)?;
        let mut flags = self.flags.write().await;
        flags.insert(name.to_string(), enabled);
        Ok(())
    }
}
