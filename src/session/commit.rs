//! The commit pipeline: turn one pointer-down into a placed instance.
//!
//! DESIGN
//! ======
//! A commit runs as a detached task so the controller keeps handling input.
//! Steps, in order:
//!
//! 1. wait for any in-flight download of the entry
//! 2. resolve the final asset path (downloading if still needed)
//! 3. resolve the binding target, importing from a compendium if needed
//! 4. resolve the HP override, then create the entity/instance and apply HP
//! 5. apply the pending rotation and mirroring
//!
//! Each suspension point is followed by a check that the session is still the
//! live one. A stale job stops before its next write and reports `Stale`.
//! Failures come back as `CommitFailure` for the controller to classify.

#[cfg(test)]
#[path = "commit_test.rs"]
mod commit_test;

use tracing::{debug, info, warn};

use crate::collab::{AuthContext, Collaborators, HpTarget, Orientation, TokenDescriptor, materialize};
use crate::entry::PlacementEntry;
use crate::error::{CommitFailure, HpError};
use crate::events::SessionContext;
use crate::hp::{HpMode, HpOverride, HpParams, HpResolver};
use crate::prefetch::PrefetchQueue;
use crate::scene::{Footprint, Point};
use crate::system::GameSystem;

/// What the commit binds to, decided when it is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BindPlan {
    New,
    World { candidate_id: String, entity_id: String },
    Compendium { pack_id: String, entry_id: String },
}

/// Everything a commit needs, copied out of the session when it is issued.
#[derive(Debug, Clone)]
pub(crate) struct CommitJob {
    pub session: u64,
    pub commit: u64,
    pub entry: PlacementEntry,
    pub at: Point,
    pub orientation: Orientation,
    pub plan: BindPlan,
    pub linked: bool,
    pub write_template: bool,
    pub label: String,
    /// Auto-number used in `label`, recorded on success.
    pub number: Option<(String, u32)>,
    pub hp_mode: HpMode,
    pub hp_params: HpParams,
    pub system: GameSystem,
    pub auth: AuthContext,
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub entity_id: String,
    pub instance_id: String,
    pub image_path: String,
    pub hp: Option<HpOverride>,
    /// HP input that could not be applied; the commit used inherited HP.
    pub hp_error: Option<HpError>,
    /// Candidate id of a world binding that no longer exists.
    pub purged: Option<String>,
}

#[derive(Debug)]
pub(crate) enum CommitOutcome {
    Placed(CommitReport),
    Failed(CommitFailure),
    Stale,
}

impl CommitJob {
    fn descriptor(&self, image_path: &str) -> TokenDescriptor {
        let footprint = Footprint { width: self.entry.grid_width, height: self.entry.grid_height };
        TokenDescriptor {
            name: self.label.clone(),
            image_path: image_path.to_string(),
            grid_width: self.entry.grid_width,
            grid_height: self.entry.grid_height,
            scale: self.entry.scale,
            size: self.system.size_for(footprint).map(str::to_string),
            hp_attribute_path: self.system.hp_attribute_path().to_string(),
            color_variant: self.entry.color_variant.clone(),
        }
    }
}

/// Run a commit to completion.
pub(crate) async fn run_commit(
    job: &CommitJob,
    collab: &Collaborators,
    queue: &PrefetchQueue,
    ctx: &SessionContext,
) -> CommitOutcome {
    info!(session = job.session, commit = job.commit, identity = %job.entry.identity_key, "commit started");
    match execute(job, collab, queue, ctx).await {
        Ok(Some(report)) => CommitOutcome::Placed(report),
        Ok(None) => {
            debug!(session = job.session, commit = job.commit, "commit abandoned; session is no longer live");
            CommitOutcome::Stale
        }
        Err(failure) => CommitOutcome::Failed(failure),
    }
}

/// `Ok(None)` means the session went stale before the next write.
async fn execute(
    job: &CommitJob,
    collab: &Collaborators,
    queue: &PrefetchQueue,
    ctx: &SessionContext,
) -> Result<Option<CommitReport>, CommitFailure> {
    let image_path = resolve_asset(job, collab, queue).await?;
    if !ctx.is_current(job.session) {
        return Ok(None);
    }

    let mut purged = None;
    let existing = match &job.plan {
        BindPlan::New => None,
        BindPlan::World { candidate_id, entity_id } => {
            let found = collab.store.world_entity(entity_id);
            if found.is_none() {
                warn!(candidate = %candidate_id, "bound entity no longer exists; creating new");
                purged = Some(candidate_id.clone());
            }
            found
        }
        BindPlan::Compendium { pack_id, entry_id } => {
            let imported = collab.store.import_from_pack(pack_id, entry_id).await.map_err(CommitFailure::Import)?;
            if !ctx.is_current(job.session) {
                return Ok(None);
            }
            Some(imported)
        }
    };

    let descriptor = job.descriptor(&image_path);
    let base_hp = existing.as_ref().and_then(|e| e.hp).or(job.hp_params.base);
    let resolver = HpResolver::new(collab.roller.as_ref(), job.system.hp_attribute_path());
    let (hp, hp_error) = match resolver.resolve(job.hp_mode, &job.hp_params, base_hp).await {
        Ok(hp) => (hp, None),
        Err(e) => (None, Some(e)),
    };
    if !ctx.is_current(job.session) {
        return Ok(None);
    }

    let factory = &collab.factory;
    let (placed, hp_targets) = match &existing {
        None => {
            let placed = factory.create_from_placement(&descriptor, job.at).await.map_err(CommitFailure::Factory)?;
            let targets = vec![HpTarget::Entity(placed.entity_id.clone()), HpTarget::Instance(placed.instance_id.clone())];
            (placed, targets)
        }
        Some(entity) => {
            if job.write_template {
                factory.bind_existing_template(entity, &descriptor).await.map_err(CommitFailure::Factory)?;
            }
            let placed = factory
                .create_instance(entity, &descriptor, job.at, job.linked)
                .await
                .map_err(CommitFailure::Factory)?;
            let target = if job.linked {
                HpTarget::Entity(entity.id.clone())
            } else {
                HpTarget::Instance(placed.instance_id.clone())
            };
            (placed, vec![target])
        }
    };

    if let Some(hp) = &hp {
        for target in &hp_targets {
            if let Err(e) = factory.apply_hp(target, hp).await {
                warn!(hp_target = ?target, error = %e, "hp override not applied");
            }
        }
    }
    if let Err(e) = factory.apply_orientation(&placed.instance_id, &job.orientation).await {
        warn!(instance = %placed.instance_id, error = %e, "orientation not applied");
    }

    info!(
        session = job.session,
        commit = job.commit,
        entity = %placed.entity_id,
        instance = %placed.instance_id,
        "commit placed"
    );
    Ok(Some(CommitReport {
        entity_id: placed.entity_id,
        instance_id: placed.instance_id,
        image_path,
        hp,
        hp_error,
        purged,
    }))
}

/// Steps 1 and 2: the entry's local path, waiting on or performing the download.
async fn resolve_asset(job: &CommitJob, collab: &Collaborators, queue: &PrefetchQueue) -> Result<String, CommitFailure> {
    if job.entry.is_available() {
        return Ok(job.entry.cached_local_path.clone());
    }
    if let Some(path) = queue.wait_for(&job.entry.identity_key).await {
        return Ok(path);
    }
    let path = materialize(collab.content.as_ref(), &job.entry, &job.auth).await?;
    queue.mark_resolved(&job.entry.identity_key, &path);
    Ok(path)
}
