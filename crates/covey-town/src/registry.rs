//! Town registry: creates, tracks, lists, and deletes towns.

use std::collections::HashMap;

use covey_protocol::{TownId, TownSummary};
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::town::spawn_town;
use crate::{TownConfig, TownError, TownHandle};

/// What the creator of a town gets back. The password is shown exactly
/// once, here; it is never listed or logged.
#[derive(Debug, Clone)]
pub struct CreatedTown {
    pub town_id: TownId,
    pub update_password: String,
    pub handle: TownHandle,
}

/// Every live town, keyed by id.
///
/// This is the entry point for town operations from the service layer.
/// It only maps ids to handles; all per-town state lives in the town
/// actors.
pub struct TownRegistry {
    towns: HashMap<TownId, TownHandle>,
    config: TownConfig,
}

impl Default for TownRegistry {
    fn default() -> Self {
        Self::new(TownConfig::default())
    }
}

impl TownRegistry {
    /// Creates an empty registry.
    pub fn new(config: TownConfig) -> Self {
        Self {
            towns: HashMap::new(),
            config,
        }
    }

    /// Creates a town, starts its actor, and registers it.
    ///
    /// The id is unique among live towns. The caller is expected to have
    /// rejected blank names already.
    ///
    /// # Errors
    /// - [`TownError::InvalidConfig`] if the registry's config fails
    ///   [`TownConfig::validate`]
    /// - [`TownError::IdSpaceExhausted`] if no free id was found
    pub fn create_town(
        &mut self,
        friendly_name: impl Into<String>,
        is_public: bool,
    ) -> Result<CreatedTown, TownError> {
        self.config.validate()?;
        let town_id = unique_town_id(
            &self.towns,
            &self.config.town_id_alphabet,
            self.config.town_id_len,
        )?;
        let update_password = generate_password(self.config.password_len);

        let handle = spawn_town(
            town_id.clone(),
            friendly_name.into(),
            is_public,
            update_password.clone(),
            self.config.channel_size,
        );
        self.towns.insert(town_id.clone(), handle.clone());

        tracing::info!(%town_id, is_public, towns = self.towns.len(), "town created");
        Ok(CreatedTown {
            town_id,
            update_password,
            handle,
        })
    }

    /// Returns a handle to the live town with this id.
    pub fn lookup(&self, town_id: &TownId) -> Option<TownHandle> {
        self.towns.get(town_id).cloned()
    }

    /// Lists public towns, ordered by id.
    ///
    /// Towns that fail to answer (e.g. mid-deletion) are skipped.
    pub async fn list_public_towns(&self) -> Vec<TownSummary> {
        let mut towns = Vec::with_capacity(self.towns.len());
        for handle in self.towns.values() {
            if let Ok(info) = handle.info().await {
                if info.is_public {
                    towns.push(info.summary());
                }
            }
        }
        towns.sort_by(|a, b| a.town_id.cmp(&b.town_id));
        towns
    }

    /// Applies a metadata update. Returns `false` if the town does not
    /// exist, the password is wrong, or the new name is blank. The caller
    /// cannot tell these apart.
    pub async fn update_town(
        &self,
        town_id: &TownId,
        password: &str,
        friendly_name: Option<String>,
        is_public: Option<bool>,
    ) -> bool {
        let Some(handle) = self.towns.get(town_id) else {
            return false;
        };
        handle
            .update_metadata(password, friendly_name, is_public)
            .await
            .unwrap_or(false)
    }

    /// Deletes a town if `password` matches: every listener is told the
    /// town is gone, the town is emptied, and it leaves the registry.
    ///
    /// Returns `false`, changing nothing, for an unknown town or a wrong
    /// password.
    pub async fn delete_town(&mut self, town_id: &TownId, password: &str) -> bool {
        let Some(handle) = self.towns.get(town_id) else {
            return false;
        };

        match handle.destroy(password).await {
            Ok(true) => {
                self.towns.remove(town_id);
                tracing::info!(%town_id, towns = self.towns.len(), "town deleted");
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(%town_id, error = %e, "dropping unresponsive town");
                self.towns.remove(town_id);
                false
            }
        }
    }

    /// Returns the number of live towns.
    pub fn town_count(&self) -> usize {
        self.towns.len()
    }
}

/// Random draws made before giving up on finding a free id.
const MAX_ID_ATTEMPTS: usize = 64;

/// Draws random ids from `alphabet` until one is not in use.
///
/// Fails fast when every possible id is taken, and gives up after
/// [`MAX_ID_ATTEMPTS`] draws when the space is merely crowded.
fn unique_town_id<V>(
    existing: &HashMap<TownId, V>,
    alphabet: &str,
    len: usize,
) -> Result<TownId, TownError> {
    let chars: Vec<char> = alphabet.chars().collect();
    if chars.is_empty() || len == 0 {
        return Err(TownError::InvalidConfig(
            "town ids need a non-empty alphabet and length".into(),
        ));
    }

    let mut distinct = chars.clone();
    distinct.sort_unstable();
    distinct.dedup();
    let capacity = u32::try_from(len)
        .ok()
        .and_then(|len| distinct.len().checked_pow(len));
    if capacity.is_some_and(|capacity| capacity <= existing.len()) {
        return Err(TownError::IdSpaceExhausted);
    }

    let mut rng = rand::rng();
    for _ in 0..MAX_ID_ATTEMPTS {
        let candidate: String = (0..len)
            .map(|_| chars[rng.random_range(0..chars.len())])
            .collect();
        let candidate = TownId(candidate);
        if !existing.contains_key(&candidate) {
            return Ok(candidate);
        }
    }
    Err(TownError::IdSpaceExhausted)
}

fn generate_password(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_town_id_uses_alphabet_and_length() {
        let id = unique_town_id::<()>(&HashMap::new(), "0123456789ABCDEF", 8).unwrap();

        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!id.as_str().chars().any(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_unique_town_id_skips_taken_ids() {
        let mut existing = HashMap::new();
        existing.insert(TownId::from("A"), ());

        for _ in 0..20 {
            assert_eq!(unique_town_id(&existing, "AB", 1).unwrap(), TownId::from("B"));
        }
    }

    #[test]
    fn test_unique_town_id_empty_alphabet_returns_invalid_config() {
        let result = unique_town_id::<()>(&HashMap::new(), "", 4);
        assert!(matches!(result, Err(TownError::InvalidConfig(_))));
    }

    #[test]
    fn test_unique_town_id_zero_length_returns_invalid_config() {
        let result = unique_town_id::<()>(&HashMap::new(), "ABC", 0);
        assert!(matches!(result, Err(TownError::InvalidConfig(_))));
    }

    #[test]
    fn test_unique_town_id_full_space_returns_exhausted() {
        let mut existing = HashMap::new();
        existing.insert(TownId::from("A"), ());
        existing.insert(TownId::from("B"), ());

        let result = unique_town_id(&existing, "ABBA", 1);

        assert!(matches!(result, Err(TownError::IdSpaceExhausted)));
    }

    #[tokio::test]
    async fn test_create_town_one_char_alphabet_second_create_returns_error() {
        let mut registry = TownRegistry::new(TownConfig {
            town_id_alphabet: "A".into(),
            town_id_len: 1,
            ..TownConfig::default()
        });

        let first = registry.create_town("First", true).unwrap();
        let second = registry.create_town("Second", true);

        assert_eq!(first.town_id, TownId::from("A"));
        assert!(matches!(second, Err(TownError::IdSpaceExhausted)));
        assert_eq!(registry.town_count(), 1);
    }

    #[tokio::test]
    async fn test_create_town_zero_length_ids_returns_error() {
        let mut registry = TownRegistry::new(TownConfig {
            town_id_len: 0,
            ..TownConfig::default()
        });

        let result = registry.create_town("Lobby", true);

        assert!(matches!(result, Err(TownError::InvalidConfig(_))));
        assert_eq!(registry.town_count(), 0);
    }

    #[test]
    fn test_generate_password_is_alphanumeric() {
        let password = generate_password(24);

        assert_eq!(password.len(), 24);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_password_differs_each_call() {
        assert_ne!(generate_password(24), generate_password(24));
    }

    #[tokio::test]
    async fn test_create_town_registers_and_lists() {
        let mut registry = TownRegistry::default();

        let created = registry.create_town("Lobby", true).unwrap();

        assert_eq!(registry.town_count(), 1);
        assert!(registry.lookup(&created.town_id).is_some());
        let listed = registry.list_public_towns().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].friendly_name, "Lobby");
        assert_eq!(listed[0].occupancy, 0);
    }

    #[tokio::test]
    async fn test_delete_town_wrong_password_keeps_town() {
        let mut registry = TownRegistry::default();
        let created = registry.create_town("Lobby", true).unwrap();

        assert!(!registry.delete_town(&created.town_id, "nope").await);
        assert!(registry.lookup(&created.town_id).is_some());

        assert!(
            registry
                .delete_town(&created.town_id, &created.update_password)
                .await
        );
        assert!(registry.lookup(&created.town_id).is_none());
    }

    #[tokio::test]
    async fn test_update_town_unknown_id_returns_false() {
        let registry = TownRegistry::default();
        assert!(
            !registry
                .update_town(&TownId::from("00000000"), "pw", None, Some(false))
                .await
        );
    }
}
