#![allow(clippy::float_cmp)]

use std::sync::Arc;

use super::*;
use crate::collab::{EntityStore, Pack, PackEntry, WorldEntity};
use crate::dice::DiceRoller;
use crate::entry::{RawEntry, normalize};
use crate::error::{ContentError, EntityError};
use crate::memory::{MemoryContent, MemoryFactory, MemoryStore};
use crate::prefetch::ContentFetcher;
use crate::scene::GridScene;

struct Harness {
    store: Arc<MemoryStore>,
    content: Arc<MemoryContent>,
    factory: Arc<MemoryFactory>,
    collab: Collaborators,
    queue: PrefetchQueue,
    ctx: SessionContext,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let content = Arc::new(MemoryContent::new());
        let factory = Arc::new(MemoryFactory::new(store.clone()));
        let collab = Collaborators {
            content: content.clone(),
            store: store.clone(),
            factory: factory.clone(),
            roller: Arc::new(DiceRoller),
            scene: Arc::new(GridScene::new(100.0)),
        };
        let queue = PrefetchQueue::new(Arc::new(ContentFetcher::new(content.clone(), AuthContext::default())), 3);
        let ctx = SessionContext::new();
        ctx.begin(1);
        Self { store, content, factory, collab, queue, ctx }
    }

    async fn run(&self, job: &CommitJob) -> CommitOutcome {
        run_commit(job, &self.collab, &self.queue, &self.ctx).await
    }
}

fn cloud_entry(name: &str) -> PlacementEntry {
    normalize(&RawEntry {
        source: Some("cloud".into()),
        full_path: Some(format!("creatures/{name}.webp")),
        ..Default::default()
    })
}

fn job(entry: PlacementEntry) -> CommitJob {
    CommitJob {
        session: 1,
        commit: 1,
        label: entry.display_name.clone(),
        entry,
        at: Point::new(150.0, 250.0),
        orientation: Orientation { rotation_deg: 90.0, mirror_h: true, mirror_v: false },
        plan: BindPlan::New,
        linked: false,
        write_template: false,
        number: None,
        hp_mode: HpMode::Static,
        hp_params: HpParams { static_input: "12".into(), ..Default::default() },
        system: GameSystem::Dnd5e,
        auth: AuthContext::default(),
    }
}

fn world(id: &str, hp: Option<u32>) -> WorldEntity {
    WorldEntity { id: id.into(), name: "Goblin".into(), folder_path: None, img: None, hp }
}

fn placed(outcome: CommitOutcome) -> CommitReport {
    match outcome {
        CommitOutcome::Placed(report) => report,
        other => panic!("expected placement, got {other:?}"),
    }
}

// =============================================================================
// create-new
// =============================================================================

#[tokio::test]
async fn create_new_writes_hp_to_entity_and_instance() {
    let h = Harness::new();
    let report = placed(h.run(&job(cloud_entry("goblin"))).await);

    assert_eq!(report.image_path, "cache/creatures/goblin.webp");
    assert_eq!(report.hp.as_ref().map(|hp| hp.max), Some(12));
    assert_eq!(report.hp.as_ref().map(|hp| hp.attribute_path.as_str()), Some("system.attributes.hp"));

    let instances = h.factory.instances();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].instance_id, report.instance_id);
    assert_eq!(instances[0].hp.as_ref().map(|hp| hp.value), Some(12));
    assert_eq!(instances[0].orientation.rotation_deg, 90.0);
    assert!(instances[0].orientation.mirror_h);
    assert_eq!(instances[0].at, Point::new(150.0, 250.0));

    let entity = h.store.world_entity(&report.entity_id).unwrap();
    assert_eq!(entity.hp, Some(12));
}

#[tokio::test]
async fn available_entry_skips_download() {
    let h = Harness::new();
    let entry = normalize(&RawEntry { full_path: Some("local/wolf.png".into()), ..Default::default() });
    let report = placed(h.run(&job(entry)).await);
    assert_eq!(report.image_path, "local/wolf.png");
    assert_eq!(h.content.download_count(), 0);
}

#[tokio::test]
async fn size_follows_game_system_and_footprint() {
    let h = Harness::new();
    let entry = normalize(&RawEntry {
        full_path: Some("local/ogre.png".into()),
        grid_width: Some(2.0),
        grid_height: Some(2.0),
        ..Default::default()
    });
    placed(h.run(&job(entry.clone())).await);
    let mut generic = job(entry);
    generic.system = GameSystem::Generic;
    placed(h.run(&generic).await);

    let instances = h.factory.instances();
    assert_eq!(instances[0].size.as_deref(), Some("lg"));
    assert_eq!(instances[1].size, None);
}

// =============================================================================
// existing entity
// =============================================================================

#[tokio::test]
async fn linked_binding_writes_hp_to_entity_only() {
    let h = Harness::new();
    h.store.add_world(world("gob", Some(7)));
    let mut j = job(cloud_entry("goblin"));
    j.plan = BindPlan::World { candidate_id: "world.gob".into(), entity_id: "gob".into() };
    j.linked = true;

    let report = placed(h.run(&j).await);
    assert_eq!(report.entity_id, "gob");
    assert_eq!(h.store.world_entity("gob").unwrap().hp, Some(12));
    let instances = h.factory.instances();
    assert!(instances[0].linked);
    assert_eq!(instances[0].hp, None);
}

#[tokio::test]
async fn unlinked_binding_writes_hp_to_instance_only() {
    let h = Harness::new();
    h.store.add_world(world("gob", Some(7)));
    let mut j = job(cloud_entry("goblin"));
    j.plan = BindPlan::World { candidate_id: "world.gob".into(), entity_id: "gob".into() };

    placed(h.run(&j).await);
    assert_eq!(h.store.world_entity("gob").unwrap().hp, Some(7));
    let instances = h.factory.instances();
    assert!(!instances[0].linked);
    assert_eq!(instances[0].hp.as_ref().map(|hp| hp.max), Some(12));
}

#[tokio::test]
async fn percent_mode_uses_bound_entity_hp() {
    let h = Harness::new();
    h.store.add_world(world("gob", Some(40)));
    let mut j = job(cloud_entry("goblin"));
    j.plan = BindPlan::World { candidate_id: "world.gob".into(), entity_id: "gob".into() };
    j.hp_mode = HpMode::Percent;
    j.hp_params = HpParams { percent: 0.0, base: Some(5), ..Default::default() };

    let report = placed(h.run(&j).await);
    assert_eq!(report.hp.map(|hp| hp.max), Some(40));
}

#[tokio::test]
async fn missing_world_entity_is_purged_and_created_new() {
    let h = Harness::new();
    let mut j = job(cloud_entry("goblin"));
    j.plan = BindPlan::World { candidate_id: "world.gone".into(), entity_id: "gone".into() };

    let report = placed(h.run(&j).await);
    assert_eq!(report.purged.as_deref(), Some("world.gone"));
    assert_ne!(report.entity_id, "gone");
    assert!(h.store.world_entity(&report.entity_id).is_some());
}

#[tokio::test]
async fn compendium_binding_imports_first() {
    let h = Harness::new();
    h.store.add_pack(Pack {
        id: "monsters".into(),
        label: "Monsters".into(),
        entries: vec![PackEntry { id: "g1".into(), name: "Goblin".into(), img: None }],
    });
    let mut j = job(cloud_entry("goblin"));
    j.plan = BindPlan::Compendium { pack_id: "monsters".into(), entry_id: "g1".into() };

    let report = placed(h.run(&j).await);
    let imported = h.store.world_entity(&report.entity_id).unwrap();
    assert_eq!(imported.name, "Goblin");
}

#[tokio::test]
async fn template_write_happens_when_requested() {
    let h = Harness::new();
    h.store.add_world(world("gob", None));
    let mut j = job(cloud_entry("goblin"));
    j.plan = BindPlan::World { candidate_id: "world.gob".into(), entity_id: "gob".into() };
    j.write_template = true;
    j.label = "Snaga".into();

    placed(h.run(&j).await);
    let writes = h.factory.template_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "gob");
    let entity = h.store.world_entity("gob").unwrap();
    assert_eq!(entity.name, "Snaga");
    assert_eq!(entity.img.as_deref(), Some("cache/creatures/goblin.webp"));
}

// =============================================================================
// failures
// =============================================================================

#[tokio::test]
async fn import_failure_is_reported() {
    let h = Harness::new();
    h.store.fail_import("g1");
    let mut j = job(cloud_entry("goblin"));
    j.plan = BindPlan::Compendium { pack_id: "monsters".into(), entry_id: "g1".into() };

    match h.run(&j).await {
        CommitOutcome::Failed(failure @ CommitFailure::Import(EntityError::Import { .. })) => {
            assert!(!failure.fatal());
        }
        other => panic!("expected import failure, got {other:?}"),
    }
    assert!(h.factory.instances().is_empty());
}

#[tokio::test]
async fn download_failure_is_fatal() {
    let h = Harness::new();
    let entry = cloud_entry("goblin");
    h.content.fail_on(&entry.identity_key);

    match h.run(&job(entry)).await {
        CommitOutcome::Failed(failure @ CommitFailure::Download(ContentError::Status { status: 404, .. })) => {
            assert!(failure.fatal());
        }
        other => panic!("expected download failure, got {other:?}"),
    }
    assert!(h.factory.instances().is_empty());
}

#[tokio::test]
async fn premium_asset_without_auth_fails_download() {
    let h = Harness::new();
    let entry = normalize(&RawEntry {
        source: Some("cloud".into()),
        tier: Some("premium".into()),
        full_path: Some("premium/dragon.webp".into()),
        ..Default::default()
    });
    assert!(matches!(
        h.run(&job(entry)).await,
        CommitOutcome::Failed(CommitFailure::Download(ContentError::AuthRequired(_)))
    ));
}

#[tokio::test]
async fn factory_failure_is_fatal() {
    let h = Harness::new();
    h.factory.set_fail_writes(true);
    match h.run(&job(cloud_entry("goblin"))).await {
        CommitOutcome::Failed(failure @ CommitFailure::Factory(_)) => assert!(failure.fatal()),
        other => panic!("expected factory failure, got {other:?}"),
    }
}

#[tokio::test]
async fn formula_error_places_with_inherited_hp() {
    let h = Harness::new();
    let mut j = job(cloud_entry("goblin"));
    j.hp_mode = HpMode::Formula;
    j.hp_params = HpParams { formula: "2d6+".into(), ..Default::default() };

    let report = placed(h.run(&j).await);
    assert_eq!(report.hp, None);
    assert!(matches!(report.hp_error, Some(HpError::Formula(_))));
    assert_eq!(h.factory.instances()[0].hp, None);
}

// =============================================================================
// staleness
// =============================================================================

#[tokio::test]
async fn ended_session_creates_nothing() {
    let h = Harness::new();
    h.ctx.end();
    assert!(matches!(h.run(&job(cloud_entry("goblin"))).await, CommitOutcome::Stale));
    assert!(h.factory.instances().is_empty());
}

#[tokio::test]
async fn superseded_session_creates_nothing() {
    let h = Harness::new();
    h.ctx.begin(2);
    assert!(matches!(h.run(&job(cloud_entry("goblin"))).await, CommitOutcome::Stale));
    assert!(h.factory.instances().is_empty());
}

#[tokio::test]
async fn download_is_recorded_in_queue() {
    let h = Harness::new();
    let entry = cloud_entry("goblin");
    h.queue.set_pool(vec![entry.clone()]);
    placed(h.run(&job(entry.clone())).await);
    assert_eq!(h.queue.resolved_path(&entry.identity_key).as_deref(), Some("cache/creatures/goblin.webp"));
    assert_eq!(h.content.download_count(), 1);
}
