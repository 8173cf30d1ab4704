//! Replay a scripted placement session against in-memory collaborators.
//!
//! The script is a JSON document naming the world entities, compendium packs,
//! entries, and a list of input steps. Each step is sent to a live controller
//! and commits are allowed to settle before the next step. The committed
//! instances, every session event, and the final UI snapshot are printed to
//! stdout as JSON; logs go to stderr.


use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use tokenstamp::collab::{AuthContext, Collaborators, Pack, WorldEntity};
use tokenstamp::config::PlacementConfig;
use tokenstamp::dice::DiceRoller;
use tokenstamp::entry::RawEntry;
use tokenstamp::error::ControllerClosed;
use tokenstamp::events::{CancelReason, SessionEvent};
use tokenstamp::input::{Button, Key, Modifiers, PointerTarget, WheelDelta};
use tokenstamp::memory::{InstanceRecord, MemoryContent, MemoryFactory, MemoryStore};
use tokenstamp::scene::{GridScene, Point};
use tokenstamp::session::{Control, Phase, PlacementController, PlacementHandle, StartOptions, UiSnapshot};
use tokenstamp::system::GameSystem;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "tokenstamp", about = "Replay a scripted token placement session")]
struct Cli {
    /// Path to the replay script (JSON).
    script: PathBuf,

    /// Game system id (dnd5e, pf2e, generic). Overrides STAMP_GAME_SYSTEM.
    #[arg(long)]
    system: Option<String>,
}

#[derive(Deserialize)]
#[serde(default)]
struct Script {
    grid_size: f64,
    auth: AuthContext,
    world: Vec<WorldEntity>,
    packs: Vec<Pack>,
    entries: Vec<RawEntry>,
    options: StartOptions,
    /// Applied before the session starts.
    controls: Vec<Control>,
    steps: Vec<Step>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            grid_size: 100.0,
            auth: AuthContext::default(),
            world: Vec::new(),
            packs: Vec::new(),
            entries: Vec::new(),
            options: StartOptions::default(),
            controls: Vec::new(),
            steps: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Step {
    Move {
        x: f64,
        y: f64,
    },
    Click {
        x: f64,
        y: f64,
        #[serde(default = "primary")]
        button: Button,
        #[serde(default)]
        modifiers: Modifiers,
        #[serde(default = "scene_target")]
        target: PointerTarget,
    },
    Wheel {
        x: f64,
        y: f64,
        #[serde(default)]
        dx: f64,
        dy: f64,
        #[serde(default)]
        modifiers: Modifiers,
    },
    Key {
        key: String,
    },
    Set {
        control: Control,
    },
    Cancel {
        #[serde(default = "user_reason")]
        reason: CancelReason,
    },
    Entries {
        entries: Vec<RawEntry>,
        #[serde(default)]
        options: StartOptions,
    },
    EntitiesChanged,
    Teardown,
    Wait {
        ms: u64,
    },
}

fn primary() -> Button {
    Button::Primary
}

fn scene_target() -> PointerTarget {
    PointerTarget::Scene
}

fn user_reason() -> CancelReason {
    CancelReason::User
}

#[derive(Serialize)]
struct Report {
    instances: Vec<InstanceRecord>,
    events: Vec<SessionEvent>,
    #[serde(rename = "final")]
    final_state: UiSnapshot,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let raw = tokio::fs::read_to_string(&cli.script).await?;
    let script: Script = serde_json::from_str(&raw)?;

    let mut config = PlacementConfig::from_env();
    if let Some(id) = &cli.system {
        config.game_system = GameSystem::from_id(id);
    }

    let store = Arc::new(MemoryStore::new());
    for entity in script.world {
        store.add_world(entity);
    }
    for pack in script.packs {
        store.add_pack(pack);
    }
    let factory = Arc::new(MemoryFactory::new(store.clone()));
    let collab = Collaborators {
        content: Arc::new(MemoryContent::new()),
        store,
        factory: factory.clone(),
        roller: Arc::new(DiceRoller),
        scene: Arc::new(GridScene::new(script.grid_size)),
    };

    let handle = PlacementController::spawn(collab, config);
    let mut events = handle.subscribe();
    handle.set_auth(script.auth).await?;
    for control in script.controls {
        handle.set(control).await?;
    }
    handle.start(script.entries, script.options).await?;
    let mut log = drain(&mut events);

    let total = script.steps.len();
    for (i, step) in script.steps.into_iter().enumerate() {
        info!(step = i + 1, total, ?step, "replaying step");
        apply(&handle, step).await?;
        settle(&handle, &mut events, &mut log).await?;
    }

    let final_state = handle.snapshot().await?;
    log.extend(drain(&mut events));
    let report = Report { instances: factory.instances(), events: log, final_state };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn apply(handle: &PlacementHandle, step: Step) -> Result<(), ControllerClosed> {
    match step {
        Step::Move { x, y } => handle.pointer_move(Point::new(x, y)).await,
        Step::Click { x, y, button, modifiers, target } => {
            handle.pointer_down(Point::new(x, y), button, modifiers, target).await
        }
        Step::Wheel { x, y, dx, dy, modifiers } => {
            handle.wheel(Point::new(x, y), WheelDelta { dx, dy }, modifiers).await
        }
        Step::Key { key } => handle.key_down(Key(key)).await,
        Step::Set { control } => handle.set(control).await,
        Step::Cancel { reason } => handle.cancel(reason).await,
        Step::Entries { entries, options } => handle.update_entries(entries, options).await,
        Step::EntitiesChanged => handle.entities_changed().await,
        Step::Teardown => handle.scene_teardown().await,
        Step::Wait { ms } => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(())
        }
    }
}

/// Wait until no commit is in flight, collecting events as they arrive so a
/// long script never outruns the broadcast buffer.
async fn settle(
    handle: &PlacementHandle,
    events: &mut broadcast::Receiver<SessionEvent>,
    log: &mut Vec<SessionEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    let wait = async {
        loop {
            let phase = handle.snapshot().await?.phase;
            log.extend(drain(events));
            if phase != Phase::Committing {
                return Ok::<(), ControllerClosed>(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(SETTLE_TIMEOUT, wait).await??;
    Ok(())
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                tracing::warn!(missed, "replay event log lagged");
            }
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => return out,
        }
    }
}
