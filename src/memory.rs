//! In-memory collaborators.
//!
//! Used by the replay binary and by tests. The store, factory, and content
//! service keep everything in `Mutex`-guarded vectors and record what the
//! engine asked of them so callers can inspect the outcome.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::collab::{
    AuthContext, ContentService, EntityFactory, EntityStore, HpTarget, Orientation, Pack, Placed, TokenDescriptor,
    WorldEntity,
};
use crate::entry::PlacementEntry;
use crate::error::{ContentError, EntityError};
use crate::hp::HpOverride;
use crate::scene::Point;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// CONTENT
// =============================================================================

/// Content service that "downloads" by recording a cache path.
#[derive(Default)]
pub struct MemoryContent {
    cached: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    latency: Option<Duration>,
    downloads: AtomicUsize,
}

impl MemoryContent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate network latency on every download.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make downloads of `identity` fail with a 404.
    pub fn fail_on(&self, identity: &str) {
        lock(&self.failing).insert(identity.to_string());
    }

    #[must_use]
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ContentService for MemoryContent {
    async fn resolve_remote_url(&self, entry: &PlacementEntry, _auth: &AuthContext) -> Result<String, ContentError> {
        if entry.full_path.is_empty() {
            return Err(ContentError::MissingPath(entry.display_name.clone()));
        }
        Ok(format!("memory://{}", entry.full_path))
    }

    async fn ensure_local(
        &self,
        entry: &PlacementEntry,
        url: &str,
        _auth: &AuthContext,
    ) -> Result<String, ContentError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if lock(&self.failing).contains(&entry.identity_key) {
            return Err(ContentError::Status { status: 404, url: url.to_string() });
        }
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let path = format!("cache/{}", entry.full_path);
        lock(&self.cached).insert(entry.identity_key.clone(), path.clone());
        Ok(path)
    }

    async fn probe_local(&self, entry: &PlacementEntry) -> Result<Option<String>, ContentError> {
        Ok(self.local_path(entry))
    }

    fn local_path(&self, entry: &PlacementEntry) -> Option<String> {
        lock(&self.cached).get(&entry.identity_key).cloned()
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Entity store over plain vectors.
#[derive(Default)]
pub struct MemoryStore {
    world: Mutex<Vec<WorldEntity>>,
    packs: Mutex<Vec<Pack>>,
    excluded: Mutex<HashSet<String>>,
    failing_imports: Mutex<HashSet<String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_world(&self, entity: WorldEntity) {
        lock(&self.world).push(entity);
    }

    /// Remove a world entity. Returns whether it existed.
    pub fn remove_world(&self, id: &str) -> bool {
        let mut world = lock(&self.world);
        let before = world.len();
        world.retain(|e| e.id != id);
        world.len() != before
    }

    pub fn add_pack(&self, pack: Pack) {
        lock(&self.packs).push(pack);
    }

    pub fn exclude_pack(&self, pack_id: &str) {
        lock(&self.excluded).insert(pack_id.to_string());
    }

    /// Make imports of compendium entry `entry_id` fail.
    pub fn fail_import(&self, entry_id: &str) {
        lock(&self.failing_imports).insert(entry_id.to_string());
    }

    /// Stop failing imports of `entry_id`.
    pub fn allow_import(&self, entry_id: &str) {
        lock(&self.failing_imports).remove(entry_id);
    }

    fn update_world<F: FnOnce(&mut WorldEntity)>(&self, id: &str, f: F) -> Result<(), EntityError> {
        let mut world = lock(&self.world);
        let entity = world.iter_mut().find(|e| e.id == id).ok_or_else(|| EntityError::NotFound(id.to_string()))?;
        f(entity);
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    fn world_entities(&self) -> Vec<WorldEntity> {
        lock(&self.world).clone()
    }

    fn packs(&self) -> Vec<Pack> {
        lock(&self.packs).clone()
    }

    fn excluded_packs(&self) -> HashSet<String> {
        lock(&self.excluded).clone()
    }

    fn world_entity(&self, id: &str) -> Option<WorldEntity> {
        lock(&self.world).iter().find(|e| e.id == id).cloned()
    }

    async fn import_from_pack(&self, pack_id: &str, entry_id: &str) -> Result<WorldEntity, EntityError> {
        let import_error = |message: &str| EntityError::Import { id: format!("{pack_id}.{entry_id}"), message: message.into() };
        if lock(&self.failing_imports).contains(entry_id) {
            return Err(import_error("import rejected"));
        }
        let source = {
            let packs = lock(&self.packs);
            packs
                .iter()
                .find(|p| p.id == pack_id)
                .and_then(|p| p.entries.iter().find(|e| e.id == entry_id))
                .cloned()
        };
        let source = source.ok_or_else(|| import_error("no such compendium entry"))?;
        let entity = WorldEntity {
            id: Uuid::new_v4().to_string(),
            name: source.name,
            folder_path: None,
            img: source.img,
            hp: None,
        };
        lock(&self.world).push(entity.clone());
        Ok(entity)
    }
}

// =============================================================================
// FACTORY
// =============================================================================

/// One placed instance as recorded by `MemoryFactory`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub entity_id: String,
    pub name: String,
    pub image_path: String,
    pub at: Point,
    pub linked: bool,
    pub size: Option<String>,
    pub hp: Option<HpOverride>,
    pub orientation: Orientation,
}

/// Entity factory that records instances and writes new entities into a
/// `MemoryStore`.
pub struct MemoryFactory {
    store: Arc<MemoryStore>,
    instances: Mutex<Vec<InstanceRecord>>,
    template_writes: Mutex<Vec<(String, TokenDescriptor)>>,
    fail_writes: AtomicBool,
}

impl MemoryFactory {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            instances: Mutex::new(Vec::new()),
            template_writes: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every create call fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn instances(&self) -> Vec<InstanceRecord> {
        lock(&self.instances).clone()
    }

    /// `(entity_id, descriptor)` for each template write.
    #[must_use]
    pub fn template_writes(&self) -> Vec<(String, TokenDescriptor)> {
        lock(&self.template_writes).clone()
    }

    fn check_writable(&self) -> Result<(), EntityError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EntityError::Write("store is read-only".into()));
        }
        Ok(())
    }

    fn record(&self, entity_id: &str, descriptor: &TokenDescriptor, at: Point, linked: bool) -> Placed {
        let instance_id = Uuid::new_v4().to_string();
        lock(&self.instances).push(InstanceRecord {
            instance_id: instance_id.clone(),
            entity_id: entity_id.to_string(),
            name: descriptor.name.clone(),
            image_path: descriptor.image_path.clone(),
            at,
            linked,
            size: descriptor.size.clone(),
            hp: None,
            orientation: Orientation::default(),
        });
        Placed { entity_id: entity_id.to_string(), instance_id }
    }

    fn update_instance<F: FnOnce(&mut InstanceRecord)>(&self, id: &str, f: F) -> Result<(), EntityError> {
        let mut instances = lock(&self.instances);
        let record =
            instances.iter_mut().find(|r| r.instance_id == id).ok_or_else(|| EntityError::NotFound(id.to_string()))?;
        f(record);
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntityFactory for MemoryFactory {
    async fn create_from_placement(&self, descriptor: &TokenDescriptor, at: Point) -> Result<Placed, EntityError> {
        self.check_writable()?;
        let entity = WorldEntity {
            id: Uuid::new_v4().to_string(),
            name: descriptor.name.clone(),
            folder_path: None,
            img: Some(descriptor.image_path.clone()),
            hp: None,
        };
        self.store.add_world(entity.clone());
        Ok(self.record(&entity.id, descriptor, at, true))
    }

    async fn bind_existing_template(
        &self,
        entity: &WorldEntity,
        descriptor: &TokenDescriptor,
    ) -> Result<(), EntityError> {
        self.check_writable()?;
        self.store.update_world(&entity.id, |e| {
            e.img = Some(descriptor.image_path.clone());
            e.name.clone_from(&descriptor.name);
        })?;
        lock(&self.template_writes).push((entity.id.clone(), descriptor.clone()));
        Ok(())
    }

    async fn create_instance(
        &self,
        entity: &WorldEntity,
        descriptor: &TokenDescriptor,
        at: Point,
        linked: bool,
    ) -> Result<Placed, EntityError> {
        self.check_writable()?;
        if self.store.world_entity(&entity.id).is_none() {
            return Err(EntityError::NotFound(entity.id.clone()));
        }
        Ok(self.record(&entity.id, descriptor, at, linked))
    }

    async fn apply_hp(&self, target: &HpTarget, hp: &HpOverride) -> Result<(), EntityError> {
        match target {
            HpTarget::Entity(id) => self.store.update_world(id, |e| e.hp = Some(hp.max)),
            HpTarget::Instance(id) => self.update_instance(id, |r| r.hp = Some(hp.clone())),
        }
    }

    async fn apply_orientation(&self, instance_id: &str, orientation: &Orientation) -> Result<(), EntityError> {
        self.update_instance(instance_id, |r| r.orientation = *orientation)
    }
}
