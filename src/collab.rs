//! Collaborator contracts consumed by the placement engine.
//!
//! ARCHITECTURE
//! ============
//! Downloading assets, reading and writing entities, rolling dice, and
//! converting coordinates all belong to the host. The engine only sees these
//! traits, bundled into `Collaborators` and shared by `Arc` with the session
//! task and every commit job it spawns.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entry::{AssetTier, PlacementEntry};
use crate::error::{ContentError, EntityError, FormulaError};
use crate::hp::HpOverride;
use crate::scene::{Point, Scene};

// =============================================================================
// CONTENT
// =============================================================================

/// Account state gating premium-tier downloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub authenticated: bool,
    /// Opaque session state (bearer token) handed to the content service.
    pub state: Option<String>,
}

/// Asset download and cache service.
#[async_trait::async_trait]
pub trait ContentService: Send + Sync {
    /// Resolve the URL an entry should be downloaded from.
    async fn resolve_remote_url(&self, entry: &PlacementEntry, auth: &AuthContext) -> Result<String, ContentError>;

    /// Download `url` into the local cache and return the local path.
    async fn ensure_local(&self, entry: &PlacementEntry, url: &str, auth: &AuthContext)
    -> Result<String, ContentError>;

    /// Check the local cache without downloading.
    async fn probe_local(&self, entry: &PlacementEntry) -> Result<Option<String>, ContentError>;

    /// Synchronous cache lookup.
    fn local_path(&self, entry: &PlacementEntry) -> Option<String>;
}

/// Make an entry available locally, downloading it when needed.
///
/// # Errors
///
/// Returns `AuthRequired` for premium assets without sign-in, or any error
/// from the content service.
pub async fn materialize(
    content: &dyn ContentService,
    entry: &PlacementEntry,
    auth: &AuthContext,
) -> Result<String, ContentError> {
    if entry.is_available() {
        return Ok(entry.cached_local_path.clone());
    }
    if let Some(path) = content.local_path(entry) {
        return Ok(path);
    }
    if let Some(path) = content.probe_local(entry).await? {
        return Ok(path);
    }
    if entry.tier == AssetTier::Premium && !auth.authenticated {
        return Err(ContentError::AuthRequired(entry.display_name.clone()));
    }
    let url = content.resolve_remote_url(entry, auth).await?;
    content.ensure_local(entry, &url, auth).await
}

// =============================================================================
// ENTITY STORE
// =============================================================================

/// A world entity that placements can bind to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldEntity {
    pub id: String,
    pub name: String,
    pub folder_path: Option<String>,
    pub img: Option<String>,
    /// Current maximum HP, when the entity has one.
    pub hp: Option<u32>,
}

/// One row of a compendium pack index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackEntry {
    pub id: String,
    pub name: String,
    pub img: Option<String>,
}

/// A compendium pack and its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pack {
    pub id: String,
    pub label: String,
    pub entries: Vec<PackEntry>,
}

/// Read access to bindable entities.
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    fn world_entities(&self) -> Vec<WorldEntity>;

    fn packs(&self) -> Vec<Pack>;

    /// Pack ids to leave out of matching.
    fn excluded_packs(&self) -> HashSet<String>;

    fn world_entity(&self, id: &str) -> Option<WorldEntity>;

    /// Import a compendium entry into the world.
    async fn import_from_pack(&self, pack_id: &str, entry_id: &str) -> Result<WorldEntity, EntityError>;
}

// =============================================================================
// ENTITY FACTORY
// =============================================================================

/// Everything the factory needs to build an entity or instance from an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub name: String,
    pub image_path: String,
    pub grid_width: f64,
    pub grid_height: f64,
    pub scale: f64,
    /// Size category for the active game system, if it has one.
    pub size: Option<String>,
    /// Where the active game system keeps hit points.
    pub hp_attribute_path: String,
    pub color_variant: Option<String>,
}

/// Ids of what a placement created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placed {
    pub entity_id: String,
    pub instance_id: String,
}

/// Where an HP override is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum HpTarget {
    Entity(String),
    Instance(String),
}

/// Rotation and mirroring applied to a placed instance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub rotation_deg: f64,
    pub mirror_h: bool,
    pub mirror_v: bool,
}

/// Creates entities and scene instances.
#[async_trait::async_trait]
pub trait EntityFactory: Send + Sync {
    /// Create a brand-new entity and an instance of it at `at`.
    async fn create_from_placement(&self, descriptor: &TokenDescriptor, at: Point) -> Result<Placed, EntityError>;

    /// Write the asset and naming overrides onto an existing entity's template.
    async fn bind_existing_template(&self, entity: &WorldEntity, descriptor: &TokenDescriptor)
    -> Result<(), EntityError>;

    /// Create an instance of an existing entity at `at`.
    async fn create_instance(
        &self,
        entity: &WorldEntity,
        descriptor: &TokenDescriptor,
        at: Point,
        linked: bool,
    ) -> Result<Placed, EntityError>;

    async fn apply_hp(&self, target: &HpTarget, hp: &HpOverride) -> Result<(), EntityError>;

    async fn apply_orientation(&self, instance_id: &str, orientation: &Orientation) -> Result<(), EntityError>;
}

// =============================================================================
// DICE
// =============================================================================

/// Evaluates dice formulas for formula-mode HP.
#[async_trait::async_trait]
pub trait FormulaRoller: Send + Sync {
    async fn roll(&self, formula: &str) -> Result<i64, FormulaError>;
}

// =============================================================================
// BUNDLE
// =============================================================================

/// All collaborators a placement controller needs.
#[derive(Clone)]
pub struct Collaborators {
    pub content: Arc<dyn ContentService>,
    pub store: Arc<dyn EntityStore>,
    pub factory: Arc<dyn EntityFactory>,
    pub roller: Arc<dyn FormulaRoller>,
    pub scene: Arc<dyn Scene>,
}
