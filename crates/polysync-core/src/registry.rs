//! Adapter registry
//!
//! Maps a stable [`AdapterTypeId`] to a factory that rebuilds an adapter
//! instance from its persisted configuration. The registry is an ordinary
//! value owned by whoever constructs adapters; there is no global instance.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{AdapterId, AdapterTypeId, DeltaCursor};
use crate::ports::IAdapter;

/// An adapter instance as stored in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedAdapter {
    /// Instance identifier
    pub id: AdapterId,
    /// Implementation identifier, used to find the factory
    pub type_id: AdapterTypeId,
    /// Display name
    pub name: String,
    /// Implementation-specific settings, deserialized into the registered config type
    #[serde(default)]
    pub settings: serde_json::Value,
    /// Last change-tracking cursor, for backends that support it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_cursor: Option<DeltaCursor>,
}

/// Public description of one registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    /// Implementation identifier
    pub type_id: AdapterTypeId,
    /// Human-readable implementation name
    pub name: String,
    /// Rust type name of the configuration object
    pub config_type: &'static str,
}

type BuildFn = dyn Fn(&PersistedAdapter) -> anyhow::Result<Arc<dyn IAdapter>> + Send + Sync;

struct Registration {
    info: RegistrationInfo,
    build: Box<BuildFn>,
}

/// Registry of adapter implementations keyed by type id
#[derive(Default)]
pub struct AdapterRegistry {
    registrations: HashMap<AdapterTypeId, Registration>,
}

impl AdapterRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter implementation and its configuration type `C`
    ///
    /// Re-registering an already known `type_id` is a no-op and returns `false`.
    pub fn register<C, F>(&mut self, type_id: AdapterTypeId, name: impl Into<String>, factory: F) -> bool
    where
        C: DeserializeOwned + 'static,
        F: Fn(AdapterId, C) -> anyhow::Result<Arc<dyn IAdapter>> + Send + Sync + 'static,
    {
        if self.registrations.contains_key(&type_id) {
            debug!(%type_id, "Adapter type already registered");
            return false;
        }

        let info = RegistrationInfo {
            type_id,
            name: name.into(),
            config_type: type_name::<C>(),
        };
        info!(%type_id, name = %info.name, "Registered adapter type");

        let build = move |persisted: &PersistedAdapter| {
            let config: C = serde_json::from_value(persisted.settings.clone()).with_context(|| {
                format!(
                    "Invalid settings for adapter '{}' ({})",
                    persisted.name,
                    type_name::<C>()
                )
            })?;
            factory(persisted.id, config)
        };

        self.registrations.insert(
            type_id,
            Registration {
                info,
                build: Box::new(build),
            },
        );
        true
    }

    /// Returns true if `type_id` has a factory
    pub fn is_registered(&self, type_id: AdapterTypeId) -> bool {
        self.registrations.contains_key(&type_id)
    }

    /// Rebuilds an adapter instance from its persisted form
    ///
    /// # Errors
    /// Returns error if the type is unknown, the settings do not match the
    /// registered configuration type, or the factory fails
    pub fn create(&self, persisted: &PersistedAdapter) -> anyhow::Result<Arc<dyn IAdapter>> {
        let registration = self.registrations.get(&persisted.type_id).ok_or_else(|| {
            anyhow!(
                "No adapter registered for type {} (adapter '{}')",
                persisted.type_id,
                persisted.name
            )
        })?;
        debug!(
            adapter_id = %persisted.id,
            adapter_type = %registration.info.name,
            "Creating adapter from persisted configuration"
        );
        (registration.build)(persisted)
    }

    /// Lists all registrations, sorted by name
    pub fn registrations(&self) -> Vec<RegistrationInfo> {
        let mut infos: Vec<RegistrationInfo> = self
            .registrations
            .values()
            .map(|registration| registration.info.clone())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("registrations", &self.registrations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        compare_attributes, AdapterItem, ChangeDetection, ContentHash, EntryUpdateInfo,
        HashKind, ItemId, Side, SyncEntry, SyncFault,
    };
    use crate::ports::{AdapterCapabilities, Enumeration, IReadStream, IWriteStream};
    use async_trait::async_trait;
    use serde_json::json;

    const NULL_TYPE: AdapterTypeId = AdapterTypeId::from_u128(0x5eed);

    #[derive(Deserialize)]
    struct NullConfig {
        label: String,
    }

    struct NullAdapter {
        id: AdapterId,
        label: String,
    }

    #[async_trait]
    impl IAdapter for NullAdapter {
        fn adapter_id(&self) -> AdapterId {
            self.id
        }
        fn adapter_type(&self) -> AdapterTypeId {
            NULL_TYPE
        }
        fn capabilities(&self) -> AdapterCapabilities {
            AdapterCapabilities::default()
        }
        async fn root(&self) -> Result<AdapterItem, SyncFault> {
            Ok(AdapterItem::directory(self.id, ItemId::new(self.label.clone()).unwrap(), "", None))
        }
        async fn enumerate_children(&self, _folder: &AdapterItem) -> Result<Enumeration, SyncFault> {
            Ok(Enumeration::default())
        }
        async fn open_read_stream(
            &self,
            _update: &EntryUpdateInfo,
        ) -> Result<Box<dyn IReadStream>, SyncFault> {
            Err(SyncFault::contract("unsupported"))
        }
        async fn open_write_stream(
            &self,
            _update: &EntryUpdateInfo,
            _expected_length: u64,
        ) -> Result<Box<dyn IWriteStream>, SyncFault> {
            Err(SyncFault::contract("unsupported"))
        }
        async fn create_directory(&self, _update: &EntryUpdateInfo) -> Result<ItemId, SyncFault> {
            Err(SyncFault::contract("unsupported"))
        }
        async fn delete_item(&self, _update: &EntryUpdateInfo) -> Result<(), SyncFault> {
            Ok(())
        }
        fn detect_change(&self, known: &SyncEntry, live: &AdapterItem, side: Side) -> ChangeDetection {
            compare_attributes(known, live, side)
        }
        async fn compute_hash(
            &self,
            _kind: HashKind,
            _item: &AdapterItem,
        ) -> Result<Option<ContentHash>, SyncFault> {
            Ok(None)
        }
    }

    fn registry() -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry.register(NULL_TYPE, "null", |id, config: NullConfig| {
            Ok(Arc::new(NullAdapter {
                id,
                label: config.label,
            }) as Arc<dyn IAdapter>)
        });
        registry
    }

    fn persisted(settings: serde_json::Value) -> PersistedAdapter {
        PersistedAdapter {
            id: AdapterId::new(),
            type_id: NULL_TYPE,
            name: "scratch".to_string(),
            settings,
            delta_cursor: None,
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = registry();
        let again = registry.register(NULL_TYPE, "other", |id, config: NullConfig| {
            Ok(Arc::new(NullAdapter {
                id,
                label: config.label,
            }) as Arc<dyn IAdapter>)
        });
        assert!(!again);

        let infos = registry.registrations();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "null");
        assert!(infos[0].config_type.ends_with("NullConfig"));
    }

    #[tokio::test]
    async fn test_create_from_persisted_settings() {
        let registry = registry();
        let stored = persisted(json!({ "label": "root-id" }));

        let adapter = registry.create(&stored).unwrap();
        assert_eq!(adapter.adapter_id(), stored.id);
        assert_eq!(adapter.root().await.unwrap().item_id.as_str(), "root-id");
    }

    #[test]
    fn test_create_rejects_bad_settings() {
        let registry = registry();
        let err = registry.create(&persisted(json!({ "wrong": 1 }))).err().unwrap();
        assert!(err.to_string().contains("Invalid settings"));
    }

    #[test]
    fn test_create_unknown_type() {
        let registry = AdapterRegistry::new();
        assert!(!registry.is_registered(NULL_TYPE));
        assert!(registry.create(&persisted(json!({}))).is_err());
    }
}
