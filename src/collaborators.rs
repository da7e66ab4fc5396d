//! Contracts for the systems the engine consults but does not own, plus the
//! in-process implementations the server ships with.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorError(pub String);

impl std::fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CollaboratorError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogService {
    pub id: Ulid,
    pub name: String,
    /// Current price in minor currency units.
    pub price: u64,
}

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// The subset of `ids` that name real services.
    async fn validate_service_ids(&self, ids: &[Ulid]) -> Result<Vec<Ulid>, CollaboratorError>;
    async fn service(&self, id: Ulid) -> Result<Option<CatalogService>, CollaboratorError>;
}

#[async_trait]
pub trait VehicleRegistry: Send + Sync {
    async fn is_vehicle_in_active_workflow(&self, vehicle_id: Ulid) -> Result<bool, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store the described media, returning one id per descriptor in order.
    async fn persist(&self, media: &[MediaDescriptor]) -> Result<Vec<Ulid>, CollaboratorError>;
}

// ── In-process implementations ───────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    services: DashMap<Ulid, CatalogService>,
}

impl InMemoryCatalog {
    pub fn new(services: impl IntoIterator<Item = CatalogService>) -> Self {
        let catalog = Self::default();
        for s in services {
            catalog.services.insert(s.id, s);
        }
        catalog
    }

    /// Load a JSON array of services.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read(path)?;
        let services: Vec<CatalogService> = serde_json::from_slice(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self::new(services))
    }

    pub fn set_price(&self, id: Ulid, price: u64) {
        if let Some(mut s) = self.services.get_mut(&id) {
            s.price = price;
        }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[async_trait]
impl ServiceCatalog for InMemoryCatalog {
    async fn validate_service_ids(&self, ids: &[Ulid]) -> Result<Vec<Ulid>, CollaboratorError> {
        Ok(ids
            .iter()
            .copied()
            .filter(|id| self.services.contains_key(id))
            .collect())
    }

    async fn service(&self, id: Ulid) -> Result<Option<CatalogService>, CollaboratorError> {
        Ok(self.services.get(&id).map(|s| s.value().clone()))
    }
}

/// Registry that knows of no workflows outside this engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleVehicleRegistry;

#[async_trait]
impl VehicleRegistry for IdleVehicleRegistry {
    async fn is_vehicle_in_active_workflow(&self, _vehicle_id: Ulid) -> Result<bool, CollaboratorError> {
        Ok(false)
    }
}

/// Registry backed by a fixed set of busy vehicles.
#[derive(Debug, Default)]
pub struct StaticVehicleRegistry {
    busy: HashSet<Ulid>,
}

impl StaticVehicleRegistry {
    pub fn new(busy: impl IntoIterator<Item = Ulid>) -> Self {
        Self {
            busy: busy.into_iter().collect(),
        }
    }
}

#[async_trait]
impl VehicleRegistry for StaticVehicleRegistry {
    async fn is_vehicle_in_active_workflow(&self, vehicle_id: Ulid) -> Result<bool, CollaboratorError> {
        Ok(self.busy.contains(&vehicle_id))
    }
}

/// Keeps descriptors in memory and hands out fresh ids.
#[derive(Debug, Default)]
pub struct InMemoryMediaStore {
    items: DashMap<Ulid, MediaDescriptor>,
}

impl InMemoryMediaStore {
    pub fn get(&self, id: &Ulid) -> Option<MediaDescriptor> {
        self.items.get(id).map(|m| m.value().clone())
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn persist(&self, media: &[MediaDescriptor]) -> Result<Vec<Ulid>, CollaboratorError> {
        let mut ids = Vec::with_capacity(media.len());
        for m in media {
            if m.file_name.is_empty() {
                return Err(CollaboratorError("media file name is empty".into()));
            }
            let id = Ulid::new();
            self.items.insert(id, m.clone());
            ids.push(id);
        }
        Ok(ids)
    }
}

/// Price lookup result keyed by service id.
pub async fn price_services(
    catalog: &dyn ServiceCatalog,
    ids: &[Ulid],
) -> Result<HashMap<Ulid, CatalogService>, CollaboratorError> {
    let mut priced = HashMap::with_capacity(ids.len());
    for id in ids {
        if let Some(service) = catalog.service(*id).await? {
            priced.insert(*id, service);
        }
    }
    Ok(priced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn catalog_filters_unknown_ids() {
        let known = Ulid::new();
        let catalog = InMemoryCatalog::new([CatalogService {
            id: known,
            name: "Oil change".into(),
            price: 4_500,
        }]);
        let unknown = Ulid::new();
        let valid = catalog.validate_service_ids(&[known, unknown]).await.unwrap();
        assert_eq!(valid, vec![known]);

        catalog.set_price(known, 5_000);
        let priced = price_services(&catalog, &[known, unknown]).await.unwrap();
        assert_eq!(priced.len(), 1);
        assert_eq!(priced[&known].price, 5_000);
    }

    #[tokio::test]
    async fn catalog_loads_from_json() {
        let dir = std::env::temp_dir().join("shopfloor_test_catalog");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("catalog.json");
        let id = Ulid::new();
        std::fs::write(
            &path,
            format!(r#"[{{"id":"{id}","name":"Brake check","price":3000}}]"#),
        )
        .unwrap();
        let catalog = InMemoryCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.service(id).await.unwrap().unwrap().price, 3_000);
    }

    #[tokio::test]
    async fn media_store_assigns_ids_in_order() {
        let store = InMemoryMediaStore::default();
        let media = vec![
            MediaDescriptor {
                file_name: "front.jpg".into(),
                content_type: "image/jpeg".into(),
                size_bytes: 10,
            },
            MediaDescriptor {
                file_name: "rear.jpg".into(),
                content_type: "image/jpeg".into(),
                size_bytes: 20,
            },
        ];
        let ids = store.persist(&media).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.get(&ids[1]).unwrap().file_name, "rear.jpg");
    }

    #[tokio::test]
    async fn static_registry_reports_busy_vehicles() {
        let busy = Ulid::new();
        let registry = StaticVehicleRegistry::new([busy]);
        assert!(registry.is_vehicle_in_active_workflow(busy).await.unwrap());
        assert!(!registry.is_vehicle_in_active_workflow(Ulid::new()).await.unwrap());
    }
}
