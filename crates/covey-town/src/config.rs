//! Town configuration.

use serde::{Deserialize, Serialize};

use crate::TownError;

/// Settings shared by every town a registry creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownConfig {
    /// Characters town ids are drawn from. Kept small and unambiguous so
    /// ids can be read out loud.
    pub town_id_alphabet: String,

    /// Length of a town id.
    pub town_id_len: usize,

    /// Length of the alphanumeric update password.
    pub password_len: usize,

    /// Capacity of each town's command channel. When it fills up,
    /// senders wait.
    pub channel_size: usize,
}

impl Default for TownConfig {
    fn default() -> Self {
        Self {
            town_id_alphabet: "0123456789ABCDEF".to_string(),
            town_id_len: 8,
            password_len: 24,
            channel_size: 64,
        }
    }
}

impl TownConfig {
    /// Checks that towns can be created with this config.
    ///
    /// # Errors
    /// [`TownError::InvalidConfig`] for an empty id alphabet, a zero id
    /// length, or a zero channel size.
    pub fn validate(&self) -> Result<(), TownError> {
        if self.town_id_alphabet.is_empty() {
            return Err(TownError::InvalidConfig("town_id_alphabet is empty".into()));
        }
        if self.town_id_len == 0 {
            return Err(TownError::InvalidConfig("town_id_len must be at least 1".into()));
        }
        if self.channel_size == 0 {
            return Err(TownError::InvalidConfig("channel_size must be at least 1".into()));
        }
        Ok(())
    }
}
