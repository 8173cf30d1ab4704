//! The placement controller: a single task that owns every piece of session
//! state.
//!
//! ARCHITECTURE
//! ============
//! `PlacementController::spawn` starts the task and returns a cloneable
//! `PlacementHandle`. Every input (pointer, wheel, key, setter, entity-store
//! change) is a `Command` on one `mpsc` channel, so mutations are applied one
//! at a time in arrival order and no session state is ever shared.
//!
//! Slow work never runs on the controller task. Commits and debounce timers are
//! spawned and report back through a weak sender to the same channel, tagged
//! with the session token and commit sequence they were issued under. Reports
//! whose tags no longer match the live session are dropped.
//!
//! TRADE-OFFS
//! ==========
//! `snapshot()` round-trips through the channel, so it is never stale relative
//! to earlier commands but costs an await. Hosts that only need "is a session
//! live" read `SessionContext` directly.

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use super::commit::{BindPlan, CommitJob, CommitOutcome, run_commit};
use super::state::{
    Binding, BindingMode, BindingView, HpView, LabelCounter, Naming, PendingTransform, Phase, PlacementMode,
    PlacementSession, StartOptions, TransformSettings, UiSnapshot, hints_for,
};
use crate::collab::{AuthContext, Collaborators};
use crate::config::PlacementConfig;
use crate::consts::{COMMAND_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY};
use crate::entry::{PlacementEntry, RawEntry, normalize_pool};
use crate::error::{ControllerClosed, HpError};
use crate::events::{CancelReason, EndReason, Notice, NoticeLevel, SessionContext, SessionEvent};
use crate::hp::{HpMode, HpParams, parse_static, percent_bounds};
use crate::input::{Button, Key, Modifiers, PointerTarget, WheelDelta, WheelIntent, normalize_degrees_360, wheel_intent};
use crate::matcher::{CandidateTarget, MatchCandidate, Query, RankedCandidate, auto_select, build_candidates, rank, search};
use crate::prefetch::{ContentFetcher, PrefetchQueue};
use crate::scene::Point;

// =============================================================================
// COMMANDS
// =============================================================================

/// A user-adjustable control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "control", content = "value", rename_all = "snake_case")]
pub enum Control {
    RotationBase(f64),
    RotationStrength(f64),
    RotationRandom(bool),
    MirrorH(bool),
    MirrorV(bool),
    MirrorRandomH(bool),
    MirrorRandomV(bool),
    /// Search text for the binding options list. Empty clears it.
    BindingQuery(String),
    /// Bind to a candidate id, or `None` for "create new". Marks the binding manual.
    BindingSelect(Option<String>),
    BindingLinked(bool),
    BindingWriteTemplate(bool),
    HpMode(HpMode),
    HpFormula(String),
    HpPercent(f64),
    HpStatic(String),
    HpBase(Option<u32>),
    NameOverride(Option<String>),
    AutoNumber(bool),
    GridSnap(bool),
    Sticky(bool),
    Auth(AuthContext),
}

#[derive(Debug)]
enum Command {
    Start { entries: Vec<RawEntry>, options: StartOptions },
    UpdateEntries { entries: Vec<RawEntry>, options: StartOptions },
    Cancel(CancelReason),
    PointerMove(Point),
    PointerDown { screen: Point, button: Button, modifiers: Modifiers, target: PointerTarget },
    Wheel { screen: Point, delta: WheelDelta, modifiers: Modifiers },
    KeyDown(Key),
    EntitiesChanged,
    RefreshDue(u64),
    SceneTeardown,
    Control(Control),
    Snapshot(oneshot::Sender<UiSnapshot>),
    CommitFinished(Box<CommitJob>, CommitOutcome),
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable front end of a running controller.
#[derive(Clone)]
pub struct PlacementHandle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    ctx: Arc<SessionContext>,
}

impl PlacementHandle {
    async fn send(&self, command: Command) -> Result<(), ControllerClosed> {
        self.tx.send(command).await.map_err(|_| ControllerClosed)
    }

    /// Start a session, cancelling any live one first.
    ///
    /// # Errors
    ///
    /// Returns `ControllerClosed` when the controller task has stopped.
    pub async fn start(&self, entries: Vec<RawEntry>, options: StartOptions) -> Result<(), ControllerClosed> {
        self.send(Command::Start { entries, options }).await
    }

    /// Replace the live pool, or start a session when idle.
    ///
    /// # Errors
    ///
    /// Returns `ControllerClosed` when the controller task has stopped.
    pub async fn update_entries(&self, entries: Vec<RawEntry>, options: StartOptions) -> Result<(), ControllerClosed> {
        self.send(Command::UpdateEntries { entries, options }).await
    }

    /// Cancel the live session. Safe in any phase; a no-op when idle.
    ///
    /// # Errors
    ///
    /// Returns `ControllerClosed` when the controller task has stopped.
    pub async fn cancel(&self, reason: CancelReason) -> Result<(), ControllerClosed> {
        self.send(Command::Cancel(reason)).await
    }

    /// # Errors
    ///
    /// Returns `ControllerClosed` when the controller task has stopped.
    pub async fn pointer_move(&self, screen: Point) -> Result<(), ControllerClosed> {
        self.send(Command::PointerMove(screen)).await
    }

    /// # Errors
    ///
    /// Returns `ControllerClosed` when the controller task has stopped.
    pub async fn pointer_down(
        &self,
        screen: Point,
        button: Button,
        modifiers: Modifiers,
        target: PointerTarget,
    ) -> Result<(), ControllerClosed> {
        self.send(Command::PointerDown { screen, button, modifiers, target }).await
    }

    /// # Errors
    ///
    /// Returns `ControllerClosed` when the controller task has stopped.
    pub async fn wheel(&self, screen: Point, delta: WheelDelta, modifiers: Modifiers) -> Result<(), ControllerClosed> {
        self.send(Command::Wheel { screen, delta, modifiers }).await
    }

    /// # Errors
    ///
    /// Returns `ControllerClosed` when the controller task has stopped.
    pub async fn key_down(&self, key: Key) -> Result<(), ControllerClosed> {
        self.send(Command::KeyDown(key)).await
    }

    /// Notify that world entities or compendium indexes changed. Bursts are
    /// coalesced before candidates are rebuilt.
    ///
    /// # Errors
    ///
    /// Returns `ControllerClosed` when the controller task has stopped.
    pub async fn entities_changed(&self) -> Result<(), ControllerClosed> {
        self.send(Command::EntitiesChanged).await
    }

    /// # Errors
    ///
    /// Returns `ControllerClosed` when the controller task has stopped.
    pub async fn scene_teardown(&self) -> Result<(), ControllerClosed> {
        self.send(Command::SceneTeardown).await
    }

    /// Apply one control change.
    ///
    /// # Errors
    ///
    /// Returns `ControllerClosed` when the controller task has stopped.
    pub async fn set(&self, control: Control) -> Result<(), ControllerClosed> {
        self.send(Command::Control(control)).await
    }

    /// Read-only view of the controller, after every command sent before it.
    ///
    /// # Errors
    ///
    /// Returns `ControllerClosed` when the controller task has stopped.
    pub async fn snapshot(&self) -> Result<UiSnapshot, ControllerClosed> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| ControllerClosed)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn context(&self) -> Arc<SessionContext> {
        self.ctx.clone()
    }
}

/// Named setters, one per control.
#[allow(clippy::missing_errors_doc)]
impl PlacementHandle {
    pub async fn set_rotation_base(&self, deg: f64) -> Result<(), ControllerClosed> {
        self.set(Control::RotationBase(deg)).await
    }

    pub async fn set_rotation_strength(&self, deg: f64) -> Result<(), ControllerClosed> {
        self.set(Control::RotationStrength(deg)).await
    }

    pub async fn set_rotation_random(&self, enabled: bool) -> Result<(), ControllerClosed> {
        self.set(Control::RotationRandom(enabled)).await
    }

    pub async fn set_mirror(&self, horizontal: bool, vertical: bool) -> Result<(), ControllerClosed> {
        self.set(Control::MirrorH(horizontal)).await?;
        self.set(Control::MirrorV(vertical)).await
    }

    pub async fn set_mirror_random(&self, horizontal: bool, vertical: bool) -> Result<(), ControllerClosed> {
        self.set(Control::MirrorRandomH(horizontal)).await?;
        self.set(Control::MirrorRandomV(vertical)).await
    }

    pub async fn search_bindings(&self, query: impl Into<String>) -> Result<(), ControllerClosed> {
        self.set(Control::BindingQuery(query.into())).await
    }

    pub async fn select_binding(&self, candidate_id: Option<String>) -> Result<(), ControllerClosed> {
        self.set(Control::BindingSelect(candidate_id)).await
    }

    pub async fn set_linked(&self, linked: bool) -> Result<(), ControllerClosed> {
        self.set(Control::BindingLinked(linked)).await
    }

    pub async fn set_write_template(&self, enabled: bool) -> Result<(), ControllerClosed> {
        self.set(Control::BindingWriteTemplate(enabled)).await
    }

    pub async fn set_hp_mode(&self, mode: HpMode) -> Result<(), ControllerClosed> {
        self.set(Control::HpMode(mode)).await
    }

    pub async fn set_hp_formula(&self, formula: impl Into<String>) -> Result<(), ControllerClosed> {
        self.set(Control::HpFormula(formula.into())).await
    }

    pub async fn set_hp_percent(&self, percent: f64) -> Result<(), ControllerClosed> {
        self.set(Control::HpPercent(percent)).await
    }

    pub async fn set_hp_static(&self, input: impl Into<String>) -> Result<(), ControllerClosed> {
        self.set(Control::HpStatic(input.into())).await
    }

    pub async fn set_hp_base(&self, base: Option<u32>) -> Result<(), ControllerClosed> {
        self.set(Control::HpBase(base)).await
    }

    pub async fn set_name_override(&self, name: Option<String>) -> Result<(), ControllerClosed> {
        self.set(Control::NameOverride(name)).await
    }

    pub async fn set_auto_number(&self, enabled: bool) -> Result<(), ControllerClosed> {
        self.set(Control::AutoNumber(enabled)).await
    }

    pub async fn set_grid_snap(&self, enabled: bool) -> Result<(), ControllerClosed> {
        self.set(Control::GridSnap(enabled)).await
    }

    pub async fn set_sticky(&self, sticky: bool) -> Result<(), ControllerClosed> {
        self.set(Control::Sticky(sticky)).await
    }

    pub async fn set_auth(&self, auth: AuthContext) -> Result<(), ControllerClosed> {
        self.set(Control::Auth(auth)).await
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// State owned by the controller task.
pub struct PlacementController {
    collab: Collaborators,
    config: PlacementConfig,
    events: broadcast::Sender<SessionEvent>,
    ctx: Arc<SessionContext>,
    self_tx: mpsc::WeakSender<Command>,
    queue: PrefetchQueue,
    auth: AuthContext,
    next_token: u64,
    session: Option<PlacementSession>,
    transform: TransformSettings,
    binding: Binding,
    query: Option<String>,
    candidates: Vec<MatchCandidate>,
    options: Vec<RankedCandidate>,
    hp_mode: HpMode,
    hp_params: HpParams,
    naming: Naming,
    grid_snap: bool,
    refresh_generation: u64,
}

impl PlacementController {
    /// Start a controller task and return its handle. Must be called inside a
    /// tokio runtime.
    #[must_use]
    pub fn spawn(collab: Collaborators, config: PlacementConfig) -> PlacementHandle {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let ctx = Arc::new(SessionContext::new());
        let auth = AuthContext::default();
        let queue = build_queue(&collab, &auth, config.prefetch_count);

        info!(
            prefetch_count = config.prefetch_count,
            game_system = config.game_system.id(),
            grid_snap = config.grid_snap,
            "placement controller configured"
        );

        let controller = Self {
            grid_snap: config.grid_snap,
            collab,
            config,
            events: events.clone(),
            ctx: ctx.clone(),
            self_tx: tx.downgrade(),
            queue,
            auth,
            next_token: 0,
            session: None,
            transform: TransformSettings::default(),
            binding: Binding::default(),
            query: None,
            candidates: Vec::new(),
            options: Vec::new(),
            hp_mode: HpMode::default(),
            hp_params: HpParams::default(),
            naming: Naming::default(),
            refresh_generation: 0,
        };
        tokio::spawn(controller.run(rx));

        PlacementHandle { tx, events, ctx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        if self.session.is_some() {
            self.cancel(CancelReason::User);
        }
        debug!("placement controller stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start { entries, options } => self.start(&entries, options),
            Command::UpdateEntries { entries, options } => self.update_entries(&entries, options),
            Command::Cancel(reason) => self.cancel(reason),
            Command::PointerMove(screen) => self.pointer_move(screen),
            Command::PointerDown { screen, button, modifiers, target } => {
                self.pointer_down(screen, button, modifiers, &target);
            }
            Command::Wheel { screen, delta, modifiers } => self.wheel(screen, delta, modifiers),
            Command::KeyDown(key) => {
                if key.is_escape() && self.session.is_some() {
                    self.cancel(CancelReason::Esc);
                }
            }
            Command::EntitiesChanged => self.schedule_refresh(),
            Command::RefreshDue(generation) => self.refresh_candidates(generation),
            Command::SceneTeardown => self.cancel(CancelReason::CanvasTeardown),
            Command::Control(control) => self.apply_control(control),
            Command::Snapshot(reply) => {
                if reply.send(self.snapshot()).is_err() {
                    debug!("snapshot requester went away");
                }
            }
            Command::CommitFinished(job, outcome) => self.commit_finished(&job, outcome),
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("no session event subscribers");
        }
    }

    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => error!(code = %notice.code, message = %notice.message, "placement error"),
            NoticeLevel::Warn => warn!(code = %notice.code, message = %notice.message, "placement warning"),
            NoticeLevel::Info => info!(code = %notice.code, message = %notice.message, "placement notice"),
        }
        self.emit(SessionEvent::Notice(notice));
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    fn start(&mut self, raws: &[RawEntry], options: StartOptions) {
        if let Some(live) = &self.session {
            info!(session = live.token, "restarting placement session");
            self.cancel(CancelReason::Restart);
        }

        let pool = normalize_pool(raws);
        if pool.is_empty() {
            self.notify(Notice::new(NoticeLevel::Warn, "E_EMPTY_POOL", "nothing to place: no usable entries"));
            return;
        }
        let mode = mode_for(&pool, options);

        self.queue.set_pool(pool.clone());
        let first = match mode {
            PlacementMode::Single => pool.first().cloned(),
            PlacementMode::Random => self.queue.random_entry(),
        };
        let Some(current) = first else {
            return;
        };
        if mode == PlacementMode::Random {
            self.queue.prime(Some(&current.identity_key));
        }

        self.next_token += 1;
        let token = self.next_token;
        self.binding.create_new();
        self.binding.manual = false;
        self.query = None;
        self.candidates = build_candidates(self.collab.store.as_ref());
        self.ctx.begin(token);

        let pool_size = pool.len();
        let identity = current.identity_key.clone();
        self.session = Some(PlacementSession {
            token,
            phase: Phase::Active,
            mode,
            sticky: options.sticky,
            pool,
            current,
            pending: PendingTransform::generate(&self.transform, None, &mut rand::rng()),
            commit_seq: 0,
            keep_after_commit: false,
            placed: 0,
            labels: LabelCounter::default(),
        });
        self.rerank();

        info!(
            session = token,
            ?mode,
            pool = pool_size,
            sticky = options.sticky,
            identity = %identity,
            "placement session started"
        );
        self.emit(SessionEvent::Started { session: token, mode, pool_size });
        self.emit(SessionEvent::EntryChanged { session: token, identity });
    }

    fn update_entries(&mut self, raws: &[RawEntry], options: StartOptions) {
        if self.session.is_none() {
            self.start(raws, options);
            return;
        }
        let pool = normalize_pool(raws);
        if pool.is_empty() {
            self.notify(Notice::new(NoticeLevel::Warn, "E_EMPTY_POOL", "entry update ignored: no usable entries"));
            return;
        }
        let mode = mode_for(&pool, options);
        self.queue.set_pool(pool.clone());

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.mode = mode;
        session.sticky = options.sticky;
        let keep_current = pool.iter().any(|e| e.identity_key == session.current.identity_key);
        session.pool = pool;
        let token = session.token;
        debug!(session = token, pool = session.pool.len(), ?mode, "placement pool updated");

        if !keep_current {
            let replacement = match mode {
                PlacementMode::Single => session.pool.first().cloned(),
                PlacementMode::Random => self.queue.random_entry(),
            };
            if let Some(entry) = replacement {
                let identity = entry.identity_key.clone();
                session.current = entry;
                self.emit(SessionEvent::EntryChanged { session: token, identity });
                self.rerank();
            }
        }
        if mode == PlacementMode::Random {
            let current = self.session.as_ref().map(|s| s.current.identity_key.clone());
            self.queue.prime(current.as_deref());
        }
    }

    /// Idempotent: a second call, or a call while idle, changes nothing.
    fn cancel(&mut self, reason: CancelReason) {
        if self.session.is_none() {
            debug!(?reason, "cancel ignored; no live session");
            return;
        }
        self.finish(EndReason::Cancelled(reason));
    }

    fn finish(&mut self, reason: EndReason) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.ctx.end();
        self.queue.reset();
        self.options.clear();
        self.query = None;
        info!(session = session.token, ?reason, placed = session.placed, "placement session ended");
        self.emit(SessionEvent::Ended { session: session.token, reason });
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    fn pointer_move(&mut self, screen: Point) {
        let grid_snap = self.grid_snap;
        let scene = self.collab.scene.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.pending.screen = Some(screen);
        let Some(world) = scene.screen_to_world(screen) else {
            session.pending.world = None;
            session.pending.preview = None;
            return;
        };
        let world = if grid_snap { scene.apply_grid_snap(world, session.footprint()) } else { world };
        session.pending.world = Some(world);
        session.pending.preview = Some(scene.world_to_screen(world).unwrap_or(screen));
    }

    fn pointer_down(&mut self, screen: Point, button: Button, modifiers: Modifiers, target: &PointerTarget) {
        let Some(session) = &self.session else {
            return;
        };
        match button {
            Button::Secondary => {
                self.cancel(CancelReason::User);
                return;
            }
            Button::Middle => return,
            Button::Primary => {}
        }
        if session.phase == Phase::Committing {
            debug!(session = session.token, "commit in flight; click ignored");
            return;
        }
        match target {
            PointerTarget::Other => return,
            PointerTarget::Scene => {}
            PointerTarget::Entity { entity_id } => {
                debug!(entity = %entity_id, "placement dropped onto entity; binding to it");
                self.binding.bind(&format!("world.{entity_id}"));
                self.binding.manual = true;
            }
        }

        self.pointer_move(screen);
        let plan = self.bind_plan();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(at) = session.pending.world else {
            self.notify(Notice::new(NoticeLevel::Warn, "E_NO_SCENE", "no active scene to place onto"));
            return;
        };

        let base = self.naming.base(&session.current.display_name).to_string();
        let (label, number) = session.labels.peek(&base, self.naming.auto_number);
        let bound = self.binding.mode == BindingMode::Entity;

        session.phase = Phase::Committing;
        session.commit_seq += 1;
        session.keep_after_commit = modifiers.keep_placing();

        let job = CommitJob {
            session: session.token,
            commit: session.commit_seq,
            entry: session.current.clone(),
            at,
            orientation: session.pending.orientation(),
            plan,
            linked: bound && self.binding.linked,
            write_template: bound && self.binding.write_template,
            label,
            number: number.map(|n| (base, n)),
            hp_mode: self.hp_mode,
            hp_params: self.hp_params.clone(),
            system: self.config.game_system,
            auth: self.auth.clone(),
        };
        self.spawn_commit(job);
    }

    fn spawn_commit(&self, job: CommitJob) {
        let collab = self.collab.clone();
        let queue = self.queue.clone();
        let ctx = self.ctx.clone();
        let reply = self.self_tx.clone();
        tokio::spawn(async move {
            let outcome = run_commit(&job, &collab, &queue, &ctx).await;
            let Some(tx) = reply.upgrade() else {
                debug!(session = job.session, commit = job.commit, "controller gone; commit report dropped");
                return;
            };
            if tx.send(Command::CommitFinished(Box::new(job), outcome)).await.is_err() {
                debug!("controller closed before commit report");
            }
        });
    }

    fn wheel(&mut self, screen: Point, delta: WheelDelta, modifiers: Modifiers) {
        if self.session.is_none() {
            return;
        }
        let scene = self.collab.scene.clone();
        match wheel_intent(delta, modifiers, scene.scale(), self.config.wheel_steps()) {
            WheelIntent::Rotate(step) => {
                if let Some(session) = self.session.as_mut() {
                    session.pending.rotation_deg = normalize_degrees_360(session.pending.rotation_deg + step);
                    // With random rotation off the wheel sets the base, so it
                    // carries over to later placements.
                    if !self.transform.rotation_enabled {
                        self.transform.rotation_base_deg = session.pending.rotation_deg;
                    }
                    trace!(rotation = session.pending.rotation_deg, "preview rotated");
                }
            }
            WheelIntent::Zoom(target) => {
                scene.zoom_at_cursor(target, screen);
                let world = self.session.as_ref().and_then(|s| s.pending.world);
                if let (Some(world), Some(session)) = (world, self.session.as_mut()) {
                    session.pending.preview = scene.world_to_screen(world);
                }
            }
            WheelIntent::None => {}
        }
    }

    // =========================================================================
    // COMMIT RESULTS
    // =========================================================================

    fn commit_finished(&mut self, job: &CommitJob, outcome: CommitOutcome) {
        let Some(session) = self.session.as_mut() else {
            debug!(session = job.session, commit = job.commit, "stale commit report discarded");
            return;
        };
        if session.token != job.session || session.commit_seq != job.commit {
            debug!(session = job.session, commit = job.commit, live = session.token, "stale commit report discarded");
            return;
        }
        debug_assert!(session.phase == Phase::Committing, "commit report without a commit in flight");
        session.phase = Phase::Active;

        match outcome {
            CommitOutcome::Stale => {}
            CommitOutcome::Placed(report) => {
                self.queue.mark_resolved(&job.entry.identity_key, &report.image_path);
                session.placed += 1;
                if session.current.identity_key == job.entry.identity_key {
                    session.current.cached_local_path.clone_from(&report.image_path);
                }
                if let Some(entry) = session.pool.iter_mut().find(|e| e.identity_key == job.entry.identity_key) {
                    entry.cached_local_path.clone_from(&report.image_path);
                }
                if let Some((base, n)) = &job.number {
                    session.labels.record(base, *n);
                }
                let keep = session.sticky || session.keep_after_commit;

                self.emit(SessionEvent::Committed {
                    session: job.session,
                    commit: job.commit,
                    identity: job.entry.identity_key.clone(),
                    label: job.label.clone(),
                    entity_id: report.entity_id.clone(),
                    instance_id: report.instance_id.clone(),
                    hp: report.hp.clone(),
                });
                if let Some(err) = &report.hp_error {
                    self.hp_warning(err);
                }
                if let Some(candidate_id) = &report.purged {
                    self.purge_candidate(candidate_id);
                }

                if keep {
                    self.advance();
                } else {
                    self.finish(EndReason::Completed);
                }
            }
            CommitOutcome::Failed(failure) => {
                if failure.fatal() {
                    self.notify(Notice::from_error(NoticeLevel::Error, &failure));
                    self.cancel(CancelReason::Error);
                } else {
                    self.notify(Notice::from_error(NoticeLevel::Warn, &failure));
                }
            }
        }
    }

    fn hp_warning(&self, err: &HpError) {
        match err {
            HpError::Formula(_) => {
                if self.ctx.take_formula_warning() {
                    self.notify(Notice::from_error(NoticeLevel::Warn, err));
                } else {
                    debug!(error = %err, "repeat formula failure suppressed");
                }
            }
            HpError::InvalidStatic(_) | HpError::InvalidPercent(_) => {
                self.notify(Notice::from_error(NoticeLevel::Warn, err));
            }
        }
    }

    fn purge_candidate(&mut self, candidate_id: &str) {
        self.candidates.retain(|c| c.id != candidate_id);
        self.options.retain(|r| r.candidate.id != candidate_id);
        if self.binding.entity_ref.as_deref() == Some(candidate_id) {
            self.binding.create_new();
            self.binding.manual = false;
        }
        info!(candidate = %candidate_id, "stale binding purged");
    }

    /// Re-arm the preview after a commit that keeps the session live.
    fn advance(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.pending = PendingTransform::generate(&self.transform, Some(&session.pending), &mut rand::rng());
        if session.mode == PlacementMode::Single {
            return;
        }

        let previous = session.current.identity_key.clone();
        let next = self.queue.next(Some(&previous)).or_else(|| self.queue.random_entry());
        if let Some(entry) = next {
            let identity = entry.identity_key.clone();
            let changed = identity != previous;
            session.current = entry;
            let token = session.token;
            debug!(session = token, identity = %identity, "next pool entry");
            if changed {
                self.emit(SessionEvent::EntryChanged { session: token, identity });
            }
        }
        self.queue.prime(None);
        self.rerank();
    }

    // =========================================================================
    // MATCHING
    // =========================================================================

    /// Rank candidates for the current entry, auto-bind unless the user chose
    /// a binding, and rebuild the options list.
    fn rerank(&mut self) {
        let Some(session) = &self.session else {
            self.options.clear();
            return;
        };
        let ranked = rank(&self.candidates, &Query::from_entry(&session.current), false);
        if !self.binding.manual {
            match auto_select(&ranked, self.config.auto_select_min_score, false) {
                Some(top) => self.binding.bind(&top.candidate.id),
                None => self.binding.create_new(),
            }
        }
        self.options = match self.query.as_deref() {
            Some(text) => search(&self.candidates, text, self.config.match_option_limit),
            None => ranked.into_iter().take(self.config.match_option_limit).collect(),
        };
    }

    fn bind_plan(&self) -> BindPlan {
        let Some(id) = self.binding.target() else {
            return BindPlan::New;
        };
        match self.candidates.iter().find(|c| c.id == id).map(|c| &c.target) {
            Some(CandidateTarget::World { entity_id }) => {
                BindPlan::World { candidate_id: id.to_string(), entity_id: entity_id.clone() }
            }
            Some(CandidateTarget::Compendium { pack_id, entry_id }) => {
                BindPlan::Compendium { pack_id: pack_id.clone(), entry_id: entry_id.clone() }
            }
            None => match id.strip_prefix("world.") {
                Some(entity_id) => BindPlan::World { candidate_id: id.to_string(), entity_id: entity_id.to_string() },
                None => BindPlan::New,
            },
        }
    }

    fn schedule_refresh(&mut self) {
        self.refresh_generation += 1;
        let generation = self.refresh_generation;
        let delay = self.config.entity_refresh_debounce;
        let reply = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = reply.upgrade() {
                if tx.send(Command::RefreshDue(generation)).await.is_err() {
                    debug!("controller closed before entity refresh");
                }
            }
        });
    }

    fn refresh_candidates(&mut self, generation: u64) {
        if generation != self.refresh_generation {
            trace!(generation, latest = self.refresh_generation, "superseded entity refresh skipped");
            return;
        }
        if self.session.is_none() {
            return;
        }
        self.candidates = build_candidates(self.collab.store.as_ref());
        if let Some(id) = self.binding.target() {
            if !self.candidates.iter().any(|c| c.id == id) {
                info!(candidate = %id, "bound candidate disappeared; reverting to create new");
                self.binding.create_new();
                self.binding.manual = false;
            }
        }
        self.rerank();
        debug!(candidates = self.candidates.len(), "entity refresh applied");
    }

    // =========================================================================
    // CONTROLS
    // =========================================================================

    fn apply_control(&mut self, control: Control) {
        trace!(?control, "control changed");
        match control {
            Control::RotationBase(deg) => {
                self.transform.rotation_base_deg = normalize_degrees_360(deg);
                self.regenerate_preview();
            }
            Control::RotationStrength(deg) => {
                self.transform.rotation_random_strength_deg = if deg.is_finite() { deg.abs().min(180.0) } else { 0.0 };
                self.regenerate_preview();
            }
            Control::RotationRandom(on) => {
                self.transform.rotation_enabled = on;
                self.regenerate_preview();
            }
            Control::MirrorH(on) => {
                self.transform.mirror_h = on;
                self.regenerate_preview();
            }
            Control::MirrorV(on) => {
                self.transform.mirror_v = on;
                self.regenerate_preview();
            }
            Control::MirrorRandomH(on) => {
                self.transform.mirror_random_h = on;
                self.regenerate_preview();
            }
            Control::MirrorRandomV(on) => {
                self.transform.mirror_random_v = on;
                self.regenerate_preview();
            }
            Control::BindingQuery(text) => {
                let text = text.trim().to_string();
                self.query = if text.is_empty() { None } else { Some(text) };
                self.rerank();
            }
            Control::BindingSelect(Some(id)) => {
                if self.candidates.iter().any(|c| c.id == id) {
                    self.binding.bind(&id);
                    self.binding.manual = true;
                } else {
                    let message = format!("no entity option '{id}'");
                    self.notify(Notice::new(NoticeLevel::Warn, "E_UNKNOWN_BINDING", message));
                }
            }
            Control::BindingSelect(None) => {
                self.binding.create_new();
                self.binding.manual = true;
            }
            Control::BindingLinked(on) => self.binding.linked = on,
            Control::BindingWriteTemplate(on) => self.binding.write_template = on,
            Control::HpMode(mode) => self.hp_mode = mode,
            Control::HpFormula(formula) => self.hp_params.formula = formula,
            Control::HpPercent(percent) => self.hp_params.percent = percent,
            Control::HpStatic(input) => self.hp_params.static_input = input,
            Control::HpBase(base) => self.hp_params.base = base,
            Control::NameOverride(name) => self.naming.name_override = name,
            Control::AutoNumber(on) => self.naming.auto_number = on,
            Control::GridSnap(on) => {
                self.grid_snap = on;
                if let Some(screen) = self.session.as_ref().and_then(|s| s.pending.screen) {
                    self.pointer_move(screen);
                }
            }
            Control::Sticky(on) => {
                if let Some(session) = self.session.as_mut() {
                    session.sticky = on;
                }
            }
            Control::Auth(auth) => self.set_auth(auth),
        }
    }

    fn regenerate_preview(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.pending = PendingTransform::generate(&self.transform, Some(&session.pending), &mut rand::rng());
        }
    }

    /// Downloads started under the old account state are dropped and the
    /// pool is re-primed with the new one.
    fn set_auth(&mut self, auth: AuthContext) {
        self.auth = auth;
        self.queue.reset();
        self.queue = build_queue(&self.collab, &self.auth, self.config.prefetch_count);
        if let Some(session) = &self.session {
            self.queue.set_pool(session.pool.clone());
            if session.mode == PlacementMode::Random {
                self.queue.prime(Some(&session.current.identity_key));
            }
        }
        debug!(authenticated = self.auth.authenticated, "auth context updated");
    }

    // =========================================================================
    // SNAPSHOT
    // =========================================================================

    fn snapshot(&self) -> UiSnapshot {
        let session = self.session.as_ref();
        let phase = session.map_or(Phase::Idle, |s| s.phase);
        let mode = session.map(|s| s.mode);
        let label = self
            .binding
            .target()
            .and_then(|id| self.candidates.iter().find(|c| c.id == id))
            .map(|c| c.label.clone());

        UiSnapshot {
            session: session.map_or(0, |s| s.token),
            phase,
            mode,
            sticky: session.is_some_and(|s| s.sticky),
            current: session.map(|s| s.current.clone()),
            pool_size: session.map_or(0, |s| s.pool.len()),
            pending: session.map(|s| s.pending),
            transform: self.transform,
            binding: BindingView {
                binding: self.binding.clone(),
                label,
                query: self.query.clone(),
                options: self.options.clone(),
            },
            hp: HpView { mode: self.hp_mode, params: self.hp_params.clone(), validation: self.hp_validation() },
            naming: self.naming.clone(),
            grid_snap: self.grid_snap,
            placed: session.map_or(0, |s| s.placed),
            hints: hints_for(phase, mode),
        }
    }

    /// Inline message for HP input the next commit would ignore.
    fn hp_validation(&self) -> Option<String> {
        match self.hp_mode {
            HpMode::Static if !self.hp_params.static_input.trim().is_empty() => {
                match parse_static(&self.hp_params.static_input) {
                    Ok(_) => None,
                    Err(e) => Some(e.to_string()),
                }
            }
            HpMode::Percent => match percent_bounds(1, self.hp_params.percent) {
                Ok(_) => None,
                Err(e) => Some(e.to_string()),
            },
            HpMode::Static | HpMode::Inherit | HpMode::Formula => None,
        }
    }
}

fn mode_for(pool: &[PlacementEntry], options: StartOptions) -> PlacementMode {
    if pool.len() == 1 && !options.force_random { PlacementMode::Single } else { PlacementMode::Random }
}

fn build_queue(collab: &Collaborators, auth: &AuthContext, prefetch_count: usize) -> PrefetchQueue {
    let fetcher = ContentFetcher::new(collab.content.clone(), auth.clone());
    PrefetchQueue::new(Arc::new(fetcher), prefetch_count)
}
