//! The build executor: a resumable state machine over a placement plan.
//!
//! One executor owns at most one [`BuildSession`]. The step loop processes
//! the op at the session's cursor, one op per [`BuildExecutor::step`] call,
//! and every status change is checkpointed and published as a
//! [`BuildEvent`].
//!
//! # Step order
//!
//! 1. Halt unless the session is Running.
//! 2. Complete when the cursor has consumed the plan.
//! 3. Step past empty ops.
//! 4. Pause with a material shortage when none of the op's material is held
//!    and no container restock (if enabled for the session) supplies it.
//! 5. Check drift: relocate to the origin on check steps when far away,
//!    otherwise navigate toward the target when out of reach.
//! 6. Equip and place, then apply the failure policy on error.
//! 7. Checkpoint and report progress every `checkpoint_interval` placements.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info, warn};

use blockwright_plan::{CompiledPlan, PlanCompiler, PlanLibrary};
use blockwright_store::CheckpointStore;
use blockwright_types::{
    BlockPos, BuildEvent, BuildId, BuildSession, BuildStatus, CheckpointRecord, CompileOptions,
    CompletionSummary, MaterialHistogram, MaterialId, PauseReason, PlanSource, Requester,
    SessionSummary,
};

use crate::capabilities::WorldActions;
use crate::drift::{self, DriftClass, DriftThresholds};
use crate::error::BuildError;
use crate::events::EventBus;
use crate::gate::{self, GateReport};

/// What to do when a placement fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log, record the index in `skipped`, and move on.
    #[default]
    Skip,
    /// Retry the same op; pause after this many consecutive failures.
    PauseAfter(u32),
}

/// Runtime tuning for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    /// Reach and relocation distance bands.
    pub thresholds: DriftThresholds,
    /// Relocation is considered on every Nth non-empty step.
    pub relocation_check_interval: u32,
    /// Checkpoint and report progress every N placements.
    pub checkpoint_interval: u64,
    /// Delay between placement attempts at speed factor 1.0.
    pub placement_delay: Duration,
    /// Slowest accepted speed factor.
    pub min_speed_factor: Decimal,
    /// Fastest accepted speed factor.
    pub max_speed_factor: Decimal,
    /// Placement failure handling.
    pub failure_policy: FailurePolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            thresholds: DriftThresholds::default(),
            relocation_check_interval: 1,
            checkpoint_interval: 10,
            placement_delay: Duration::from_millis(500),
            min_speed_factor: Decimal::new(1, 1),
            max_speed_factor: Decimal::new(5, 0),
            failure_policy: FailurePolicy::Skip,
        }
    }
}

/// Parameters of a new build.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    /// Plan source to compile.
    pub source: PlanSource,
    /// Compile options (images only).
    pub options: CompileOptions,
    /// Absolute anchor; `None` uses the agent's current block.
    pub origin: Option<BlockPos>,
    /// Who asked.
    pub requester: Requester,
    /// Placement rate multiplier; `None` means 1.0.
    pub speed_factor: Option<Decimal>,
    /// Restock from the nearest container instead of pausing on a shortage.
    pub use_containers: bool,
}

impl StartRequest {
    /// Request with default options anchored at the agent.
    pub fn new(source: PlanSource, requester: Requester) -> Self {
        Self {
            source,
            options: CompileOptions::default(),
            origin: None,
            requester,
            speed_factor: None,
            use_containers: false,
        }
    }
}

/// Result of one [`BuildExecutor::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// No running session.
    Idle,
    /// An empty op was stepped past.
    Empty,
    /// A block was placed.
    Placed,
    /// A placement failed and was skipped.
    Skipped,
    /// A placement failed and will be retried.
    Retrying,
    /// The session paused.
    Paused(PauseReason),
    /// The plan is done.
    Completed,
}

impl StepOutcome {
    /// The step spent time on a placement attempt, so the caller should
    /// wait the placement delay before the next one.
    pub const fn attempted_placement(&self) -> bool {
        matches!(self, Self::Placed | Self::Skipped | Self::Retrying)
    }

    /// The session is still Running after this step.
    pub const fn keeps_running(&self) -> bool {
        matches!(
            self,
            Self::Empty | Self::Placed | Self::Skipped | Self::Retrying
        )
    }
}

struct ActiveBuild {
    session: BuildSession,
    /// `None` for a session restored from a checkpoint until it is resumed.
    plan: Option<CompiledPlan>,
    non_empty_steps: u64,
    consecutive_failures: u32,
}

impl ActiveBuild {
    fn restored(record: CheckpointRecord) -> Self {
        Self {
            session: BuildSession::from_record(record),
            plan: None,
            non_empty_steps: 0,
            consecutive_failures: 0,
        }
    }

    /// Histogram of the ops at and after the cursor.
    fn remaining_histogram(&self) -> MaterialHistogram {
        self.plan.as_ref().map_or_else(
            || self.session.histogram.clone(),
            |compiled| compiled.plan.histogram_from(self.session.cursor),
        )
    }
}

/// Single-session build executor for one agent.
pub struct BuildExecutor {
    agent: String,
    settings: ExecutorSettings,
    compiler: PlanCompiler,
    library: PlanLibrary,
    world: Arc<dyn WorldActions>,
    store: Arc<dyn CheckpointStore>,
    events: EventBus,
    active: Option<ActiveBuild>,
}

impl BuildExecutor {
    /// Executor for `agent` with a fresh event bus.
    pub fn new(
        agent: impl Into<String>,
        settings: ExecutorSettings,
        compiler: PlanCompiler,
        library: PlanLibrary,
        world: Arc<dyn WorldActions>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            agent: agent.into(),
            settings,
            compiler,
            library,
            world,
            store,
            events: EventBus::new(),
            active: None,
        }
    }

    /// Agent name.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Settings in effect.
    pub const fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// The event bus this executor publishes on.
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<&BuildSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// Whether the step loop has work to do.
    pub fn is_running(&self) -> bool {
        self.session()
            .is_some_and(|s| s.status == BuildStatus::Running)
    }

    /// Delay between placement attempts, scaled by the session's speed.
    pub fn placement_delay(&self) -> Duration {
        let base = self.settings.placement_delay;
        let Some(speed) = self.session().map(|s| s.speed_factor) else {
            return base;
        };
        let base_ms = Decimal::from(u64::try_from(base.as_millis()).unwrap_or(u64::MAX));
        base_ms
            .checked_div(speed)
            .and_then(|ms| ms.round().to_u64())
            .map_or(base, Duration::from_millis)
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Compile `request.source` and start a new session.
    ///
    /// Rejected without side effects while another session is active, an
    /// unfinished checkpoint is waiting in the store, or the store cannot be
    /// read. A finished build left in the slot is archived first.
    pub async fn start(&mut self, request: StartRequest) -> Result<SessionSummary, BuildError> {
        if let Some(active) = self
            .active
            .as_ref()
            .filter(|a| a.session.status.is_active())
        {
            return Err(BuildError::BuildActive {
                build_id: active.session.id,
            });
        }
        let unfinished = self.load_unfinished().await.inspect_err(|e| {
            warn!(error = %e, "Could not check for an unfinished build, refusing to start");
        })?;
        if let Some(record) = unfinished {
            return Err(BuildError::UnfinishedBuild {
                build_id: record.build_id,
            });
        }

        let speed = request.speed_factor.unwrap_or(Decimal::ONE);
        if speed < self.settings.min_speed_factor || speed > self.settings.max_speed_factor {
            return Err(BuildError::InvalidSpeed {
                speed,
                min: self.settings.min_speed_factor,
                max: self.settings.max_speed_factor,
            });
        }

        let compiled = self.compile(&request.source, &request.options).await?;
        let mut origin = request.origin;
        if origin.is_none() {
            origin = self.world.position().await.map(|p| p.floored());
        }
        let origin = origin.ok_or(BuildError::PositionUnknown)?;
        let report = gate::survey(&compiled.histogram, self.world.as_ref()).await;

        let mut session = BuildSession {
            id: BuildId::new(),
            agent: self.agent.clone(),
            source: request.source,
            options: request.options,
            dimensions: compiled.plan.dimensions(),
            origin,
            cursor: 0,
            placed_count: 0,
            total_count: compiled.plan.total_count(),
            status: BuildStatus::Running,
            pause_reason: None,
            requester: request.requester,
            speed_factor: speed,
            use_containers: request.use_containers,
            histogram: compiled.histogram.clone(),
            plan_digest: compiled.digest.clone(),
            skipped: Vec::new(),
            started_at: Utc::now(),
            last_checkpoint_at: None,
        };
        info!(
            build_id = %session.id,
            source = %session.source,
            origin = %origin,
            total = session.total_count,
            deficits = report.deficits.len(),
            use_containers = session.use_containers,
            "Build started"
        );
        self.checkpoint(&mut session).await;
        self.events.publish(BuildEvent::Started {
            build_id: session.id,
            source: session.source.clone(),
            total: session.total_count,
            dimensions: session.dimensions,
            deficits: report.deficits,
            requester: session.requester.clone(),
        });

        let summary = session.summary(Utc::now(), None);
        self.active = Some(ActiveBuild {
            session,
            plan: Some(compiled),
            non_empty_steps: 0,
            consecutive_failures: 0,
        });
        Ok(summary)
    }

    /// Pause the running session. Pausing a paused session is a no-op.
    pub async fn pause(&mut self) -> Result<SessionSummary, BuildError> {
        let Some(mut active) = self.active.take() else {
            return Err(BuildError::NoActiveBuild);
        };
        if active.session.status == BuildStatus::Running {
            self.pause_session(&mut active.session, PauseReason::Operator)
                .await;
        }
        let summary = active.session.summary(Utc::now(), None);
        self.active = Some(active);
        Ok(summary)
    }

    /// Resume a paused session, loading it from the store if needed.
    ///
    /// The plan is recompiled and must match the checkpoint's digest. The
    /// agent returns to the origin first when it is out of reach; if that
    /// fails, or the world has not reported a position, the session stays
    /// paused.
    pub async fn resume(&mut self, requester: Requester) -> Result<SessionSummary, BuildError> {
        if self.active.is_none() {
            let record = self
                .load_unfinished()
                .await?
                .ok_or(BuildError::NoActiveBuild)?;
            self.active = Some(ActiveBuild::restored(record));
        }
        let Some(mut active) = self.active.take() else {
            return Err(BuildError::NoActiveBuild);
        };
        let result = self.resume_active(&mut active, requester).await;
        self.active = Some(active);
        result
    }

    async fn resume_active(
        &self,
        active: &mut ActiveBuild,
        requester: Requester,
    ) -> Result<SessionSummary, BuildError> {
        let status = active.session.status;
        if status != BuildStatus::Paused {
            return Err(BuildError::NotPaused { status });
        }

        if active.plan.is_none() {
            let compiled = self
                .compile(&active.session.source, &active.session.options)
                .await?;
            if compiled.digest != active.session.plan_digest {
                return Err(BuildError::PlanChanged {
                    expected: active.session.plan_digest.clone(),
                    actual: compiled.digest,
                });
            }
            active.plan = Some(compiled);
        }

        let session = &mut active.session;
        session.requester = requester;

        let Some(position) = self.world.position().await else {
            warn!(build_id = %session.id, "Agent position unknown, build stays paused");
            return Err(BuildError::PositionUnknown);
        };
        let reading = drift::classify(self.settings.thresholds, session.origin, &position);
        if reading.class != DriftClass::InRange {
            if let Err(distance) = self.relocate(session, reading.distance).await {
                self.pause_session(session, PauseReason::DisplacementUnrecoverable { distance })
                    .await;
                return Err(BuildError::DisplacementUnrecoverable { distance });
            }
        }

        session.status = BuildStatus::Running;
        session.pause_reason = None;
        active.consecutive_failures = 0;
        info!(
            build_id = %session.id,
            cursor = session.cursor,
            placed = session.placed_count,
            total = session.total_count,
            requester = %session.requester.name,
            "Build resumed"
        );
        self.checkpoint(session).await;
        self.events.publish(BuildEvent::Resumed {
            build_id: session.id,
            cursor: session.cursor,
            placed: session.placed_count,
            total: session.total_count,
            requester: session.requester.clone(),
        });
        Ok(session.summary(Utc::now(), None))
    }

    /// Cancel the active session (in memory or in the store) and archive it.
    pub async fn stop(&mut self) -> Result<SessionSummary, BuildError> {
        if self.active.is_none() {
            self.active = self.load_unfinished().await?.map(ActiveBuild::restored);
        }
        let Some(mut active) = self.active.take() else {
            return Err(BuildError::NoActiveBuild);
        };
        let session = &mut active.session;
        session.status = BuildStatus::Cancelled;
        session.pause_reason = None;
        info!(
            build_id = %session.id,
            cursor = session.cursor,
            placed = session.placed_count,
            total = session.total_count,
            "Build cancelled"
        );
        self.finish(session).await;
        self.events.publish(BuildEvent::Cancelled {
            build_id: session.id,
            placed: session.placed_count,
            total: session.total_count,
            requester: session.requester.clone(),
        });
        Ok(session.summary(Utc::now(), None))
    }

    /// Status of the current session, with the agent's distance to origin.
    pub async fn status(&self) -> Option<SessionSummary> {
        let session = self.session()?;
        let distance = self
            .world
            .position()
            .await
            .map(|p| p.distance_to(&session.origin.to_position()));
        Some(session.summary(Utc::now(), distance))
    }

    /// Image and blueprint files that can be built.
    pub async fn list_available_plans(&self) -> Result<Vec<PlanSource>, BuildError> {
        Ok(self.library.list().await?)
    }

    /// Up to `limit` finished builds, newest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<CheckpointRecord>, BuildError> {
        Ok(self.store.history(limit).await?)
    }

    /// Material gate over what remains of the current plan.
    pub async fn inventory(&self) -> Result<GateReport, BuildError> {
        let active = self.active.as_ref().ok_or(BuildError::NoActiveBuild)?;
        let histogram = active.remaining_histogram();
        Ok(gate::survey(&histogram, self.world.as_ref()).await)
    }

    /// Look for a checkpoint left by a previous run.
    ///
    /// A dangling record comes back Paused and is announced with
    /// [`BuildEvent::UnfinishedBuild`]; it only runs after an explicit
    /// resume. A terminal record that missed archiving is archived now.
    pub async fn recover(&mut self) -> Result<Option<SessionSummary>, BuildError> {
        if self.active.is_some() {
            return Ok(None);
        }
        let Some(record) = self.load_unfinished().await? else {
            return Ok(None);
        };

        let mut active = ActiveBuild::restored(record);
        let session = &mut active.session;
        warn!(
            build_id = %session.id,
            source = %session.source,
            cursor = session.cursor,
            placed = session.placed_count,
            total = session.total_count,
            "Unfinished build found"
        );
        self.checkpoint(session).await;
        self.events.publish(BuildEvent::UnfinishedBuild {
            build_id: session.id,
            source: session.source.clone(),
            placed: session.placed_count,
            total: session.total_count,
            percent: session.percent(),
        });
        let summary = session.summary(Utc::now(), None);
        self.active = Some(active);
        Ok(Some(summary))
    }

    /// Checkpoint the active session, if any.
    pub async fn flush(&mut self) {
        if let Some(mut active) = self.active.take() {
            self.checkpoint(&mut active.session).await;
            self.active = Some(active);
        }
    }

    // -----------------------------------------------------------------------
    // Step loop
    // -----------------------------------------------------------------------

    /// Process the op at the cursor.
    pub async fn step(&mut self) -> StepOutcome {
        let Some(mut active) = self.active.take() else {
            return StepOutcome::Idle;
        };
        let outcome = self.advance(&mut active).await;
        if outcome != StepOutcome::Completed {
            self.active = Some(active);
        }
        outcome
    }

    /// Step until the session stops running, without delays.
    pub async fn run_until_halt(&mut self) -> StepOutcome {
        loop {
            let outcome = self.step().await;
            if !outcome.keeps_running() {
                return outcome;
            }
        }
    }

    async fn advance(&self, active: &mut ActiveBuild) -> StepOutcome {
        if active.session.status != BuildStatus::Running {
            return StepOutcome::Idle;
        }
        let Some(compiled) = active.plan.as_ref() else {
            warn!(build_id = %active.session.id, "Running session has no compiled plan");
            return StepOutcome::Idle;
        };
        let Some(op) = compiled.plan.get(active.session.cursor).cloned() else {
            self.complete(&mut active.session).await;
            return StepOutcome::Completed;
        };
        let Some(material) = op.material else {
            active.session.record_empty();
            return StepOutcome::Empty;
        };

        if self.world.inventory_count(&material).await == 0
            && !self.restock(&active.session, &material).await
        {
            let histogram = active.remaining_histogram();
            let report = gate::survey(&histogram, self.world.as_ref()).await;
            let reason = PauseReason::MaterialShortage {
                material,
                deficits: report.top(5),
            };
            self.pause_session(&mut active.session, reason.clone())
                .await;
            return StepOutcome::Paused(reason);
        }

        let Some(target) = active.session.origin.checked_offset(op.position) else {
            return self
                .placement_failed(active, &material, "target coordinate overflows")
                .await;
        };
        if let Some(halt) = self.approach(active, target, &material).await {
            return halt;
        }

        if let Err(e) = self.world.equip(&material).await {
            return self.placement_failed(active, &material, &e.to_string()).await;
        }
        if let Err(e) = self.world.place(target, &material, target.below()).await {
            return self.placement_failed(active, &material, &e.to_string()).await;
        }

        active.consecutive_failures = 0;
        active.session.record_placed();
        if active
            .session
            .placed_count
            .checked_rem(self.settings.checkpoint_interval)
            == Some(0)
        {
            self.report_progress(&mut active.session).await;
        }
        StepOutcome::Placed
    }

    /// Bring the agent within reach of `target`. `Some` ends the step.
    ///
    /// On check steps a far target sends the agent back to the origin
    /// first; between checks it is treated as an ordinary navigation.
    async fn approach(
        &self,
        active: &mut ActiveBuild,
        target: BlockPos,
        material: &MaterialId,
    ) -> Option<StepOutcome> {
        active.non_empty_steps = active.non_empty_steps.saturating_add(1);
        let check_relocation = active
            .non_empty_steps
            .checked_rem(u64::from(self.settings.relocation_check_interval))
            == Some(0);

        // Unknown position: place without a drift check.
        let position = self.world.position().await?;
        let mut reading = drift::classify(self.settings.thresholds, target, &position);
        if reading.class == DriftClass::NeedsRelocate && check_relocation {
            let origin_distance = position.distance_to(&active.session.origin.to_position());
            if let Err(distance) = self.relocate(&active.session, origin_distance).await {
                let reason = PauseReason::DisplacementUnrecoverable { distance };
                self.pause_session(&mut active.session, reason.clone())
                    .await;
                return Some(StepOutcome::Paused(reason));
            }
            if let Some(moved) = self.world.position().await {
                reading = drift::classify(self.settings.thresholds, target, &moved);
            }
        }
        if reading.class == DriftClass::InRange {
            return None;
        }
        debug!(
            build_id = %active.session.id,
            target = %target,
            distance = reading.distance,
            class = reading.class.as_str(),
            "Navigating to target"
        );
        let range = self.settings.thresholds.reach;
        match self.world.navigate(target, range).await {
            Ok(()) => None,
            Err(e) => Some(
                self.placement_failed(active, material, &e.to_string())
                    .await,
            ),
        }
    }

    /// Refill `material` from a container. `true` when the agent now holds
    /// some.
    async fn restock(&self, session: &BuildSession, material: &MaterialId) -> bool {
        if !session.use_containers {
            return false;
        }
        match self.world.restock(material).await {
            Ok(held) if held > 0 => {
                info!(
                    build_id = %session.id,
                    cursor = session.cursor,
                    material = %material,
                    held,
                    "Restocked from container"
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(build_id = %session.id, material = %material, error = %e, "Restock failed");
                false
            }
        }
    }

    async fn report_progress(&self, session: &mut BuildSession) {
        self.checkpoint(session).await;
        info!(
            build_id = %session.id,
            cursor = session.cursor,
            placed = session.placed_count,
            total = session.total_count,
            percent = %session.percent(),
            "Build progress"
        );
        self.events.publish(BuildEvent::Progress {
            build_id: session.id,
            placed: session.placed_count,
            total: session.total_count,
            percent: session.percent(),
            requester: session.requester.clone(),
        });
    }

    async fn placement_failed(
        &self,
        active: &mut ActiveBuild,
        material: &MaterialId,
        detail: &str,
    ) -> StepOutcome {
        active.consecutive_failures = active.consecutive_failures.saturating_add(1);
        let consecutive = active.consecutive_failures;
        let session = &mut active.session;
        match self.settings.failure_policy {
            FailurePolicy::Skip => {
                warn!(
                    build_id = %session.id,
                    cursor = session.cursor,
                    placed = session.placed_count,
                    total = session.total_count,
                    material = %material,
                    error = %detail,
                    "Placement failed, skipping"
                );
                session.record_skipped();
                StepOutcome::Skipped
            }
            FailurePolicy::PauseAfter(limit) if consecutive >= limit => {
                warn!(
                    build_id = %session.id,
                    cursor = session.cursor,
                    material = %material,
                    error = %detail,
                    consecutive,
                    "Placement failed repeatedly"
                );
                let reason = PauseReason::PlacementFailures { consecutive };
                self.pause_session(session, reason.clone()).await;
                StepOutcome::Paused(reason)
            }
            FailurePolicy::PauseAfter(limit) => {
                warn!(
                    build_id = %session.id,
                    cursor = session.cursor,
                    material = %material,
                    error = %detail,
                    attempt = consecutive,
                    limit,
                    "Placement failed, retrying"
                );
                StepOutcome::Retrying
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Walk back to the origin. Returns the remaining distance on failure.
    async fn relocate(&self, session: &BuildSession, distance: f64) -> Result<(), f64> {
        info!(
            build_id = %session.id,
            cursor = session.cursor,
            distance,
            "Relocating to build origin"
        );
        self.events.publish(BuildEvent::Relocating {
            build_id: session.id,
            distance,
        });
        match self
            .world
            .navigate(session.origin, self.settings.thresholds.reach)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                let remaining = self
                    .world
                    .position()
                    .await
                    .map_or(distance, |p| p.distance_to(&session.origin.to_position()));
                warn!(build_id = %session.id, error = %e, distance = remaining, "Relocation failed");
                Err(remaining)
            }
        }
    }

    async fn pause_session(&self, session: &mut BuildSession, reason: PauseReason) {
        session.status = BuildStatus::Paused;
        session.pause_reason = Some(reason.clone());
        info!(
            build_id = %session.id,
            cursor = session.cursor,
            placed = session.placed_count,
            total = session.total_count,
            reason = %reason.describe(),
            "Build paused"
        );
        self.checkpoint(session).await;
        self.events.publish(BuildEvent::Paused {
            build_id: session.id,
            reason,
            cursor: session.cursor,
            placed: session.placed_count,
            requester: session.requester.clone(),
        });
    }

    async fn complete(&self, session: &mut BuildSession) {
        session.status = BuildStatus::Completed;
        session.pause_reason = None;
        let now = Utc::now();
        let summary = CompletionSummary {
            total_placed: session.placed_count,
            skipped: u64::try_from(session.skipped.len()).unwrap_or(u64::MAX),
            elapsed_seconds: session.elapsed_seconds(now),
        };
        info!(
            build_id = %session.id,
            cursor = session.cursor,
            placed = session.placed_count,
            total = session.total_count,
            skipped = summary.skipped,
            elapsed_seconds = summary.elapsed_seconds,
            "Build completed"
        );
        self.finish(session).await;
        self.events.publish(BuildEvent::Completed {
            build_id: session.id,
            summary,
            requester: session.requester.clone(),
        });
    }

    /// Move the terminal state into history and free the slot.
    ///
    /// When archiving fails the terminal record is left in the slot, and the
    /// next [`Self::recover`] or [`Self::start`] archives it.
    async fn finish(&self, session: &mut BuildSession) {
        let now = Utc::now();
        let mut record = session.to_record();
        record.last_checkpoint_at = Some(now);
        match self.store.archive_active(&record).await {
            Ok(archived) => {
                session.last_checkpoint_at = Some(now);
                debug!(
                    build_id = %archived.build_id,
                    status = %archived.status,
                    placed = archived.placed_count,
                    total = archived.total_count,
                    "Build archived"
                );
            }
            Err(e) => {
                self.report_store_failure(session, "archive", &e.to_string());
                self.checkpoint(session).await;
            }
        }
    }

    /// The non-terminal record in the active slot, if any. A terminal record
    /// that missed archiving is archived on the way.
    async fn load_unfinished(&self) -> Result<Option<CheckpointRecord>, BuildError> {
        let Some(record) = self.store.load_active().await? else {
            return Ok(None);
        };
        if !record.status.is_terminal() {
            return Ok(Some(record));
        }
        info!(
            build_id = %record.build_id,
            status = %record.status,
            "Archiving finished build left in the active slot"
        );
        self.store.archive_active(&record).await?;
        Ok(None)
    }

    /// Persist the session. Failures are reported, never returned.
    async fn checkpoint(&self, session: &mut BuildSession) {
        let now = Utc::now();
        let mut record = session.to_record();
        record.last_checkpoint_at = Some(now);
        match self.store.save_active(&record).await {
            Ok(()) => {
                session.last_checkpoint_at = Some(now);
                debug!(
                    build_id = %session.id,
                    status = %session.status,
                    cursor = session.cursor,
                    placed = session.placed_count,
                    total = session.total_count,
                    "Checkpoint written"
                );
            }
            Err(e) => self.report_store_failure(session, "checkpoint", &e.to_string()),
        }
    }

    fn report_store_failure(&self, session: &BuildSession, operation: &str, detail: &str) {
        warn!(
            build_id = %session.id,
            cursor = session.cursor,
            placed = session.placed_count,
            total = session.total_count,
            operation,
            error = detail,
            "Checkpoint store write failed, continuing"
        );
        self.events.publish(BuildEvent::Error {
            build_id: Some(session.id),
            detail: format!("{operation} failed: {detail}"),
            requester: Some(session.requester.clone()),
        });
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn compile(
        &self,
        source: &PlanSource,
        options: &CompileOptions,
    ) -> Result<CompiledPlan, BuildError> {
        let bytes = self.library.read(source).await?;
        Ok(self.compiler.compile(source, &bytes, options)?)
    }
}
