//! End-to-end executor scenarios against a simulated world.
//!
//! Plans are real PNG files written into a temporary images directory and
//! compiled by the executor, so every test goes through the same path as a
//! `!build` command.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::missing_panics_doc
)]

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use blockwright_core::{
    BuildError, BuildExecutor, ExecutorSettings, FailurePolicy, SimulatedWorld, StartRequest,
    StepOutcome, WorldActions, gate,
};
use blockwright_plan::{PlanCompiler, PlanLibrary};
use blockwright_store::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, StoreError,
};
use blockwright_types::{
    BlockPos, BuildEvent, BuildStatus, CheckpointRecord, CompileOptions, MaterialHistogram,
    MaterialId, PauseReason, PlanSource, Position, Requester,
};
use image::{ImageFormat, Rgba, RgbaImage};
use rust_decimal::Decimal;
use tempfile::TempDir;
use tokio::sync::broadcast;

const BLUE: Rgba<u8> = Rgba([0x35, 0x4F, 0x9C, 255]);
const YELLOW: Rgba<u8> = Rgba([0xFE, 0xCB, 0x00, 255]);
const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

fn origin() -> BlockPos {
    BlockPos::new(0, 64, 0)
}

fn at_origin() -> Position {
    origin().to_position()
}

fn settings() -> ExecutorSettings {
    ExecutorSettings {
        placement_delay: Duration::ZERO,
        ..ExecutorSettings::default()
    }
}

fn png(img: &RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn four_by_four_with_two_holes() -> RgbaImage {
    let mut img = RgbaImage::from_pixel(4, 4, BLUE);
    img.put_pixel(0, 0, CLEAR);
    img.put_pixel(3, 3, CLEAR);
    for x in 0..4 {
        img.put_pixel(x, 1, YELLOW);
    }
    img
}

struct Fixture {
    tmp: TempDir,
    library: PlanLibrary,
}

impl Fixture {
    async fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let library = PlanLibrary::new(tmp.path().join("images"), tmp.path().join("schematics"));
        library.ensure_dirs().await.unwrap();
        Self { tmp, library }
    }

    async fn add_image(&self, file: &str, img: &RgbaImage) {
        self.library.save_image(file, &png(img)).await.unwrap();
    }

    fn executor(
        &self,
        settings: ExecutorSettings,
        world: &Arc<SimulatedWorld>,
        store: Arc<dyn CheckpointStore>,
    ) -> BuildExecutor {
        BuildExecutor::new(
            "builder",
            settings,
            PlanCompiler::default(),
            self.library.clone(),
            Arc::clone(world) as _,
            store,
        )
    }
}

fn request(file: &str, size: u32) -> StartRequest {
    StartRequest {
        source: PlanSource::Image {
            file: file.to_owned(),
            url: None,
        },
        options: CompileOptions {
            width: Some(size),
            height: Some(size),
            ..CompileOptions::default()
        },
        origin: Some(origin()),
        requester: Requester::public("alice"),
        speed_factor: None,
        use_containers: false,
    }
}

fn strip(file: &str, width: u32) -> StartRequest {
    let mut req = request(file, width);
    req.options.height = Some(1);
    req
}

/// Memory store whose saves or archives can be made to fail separately.
#[derive(Default)]
struct ScriptedStore {
    inner: MemoryCheckpointStore,
    fail_saves: AtomicBool,
    fail_archive: AtomicBool,
}

impl ScriptedStore {
    fn refuse(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: "scripted".into(),
                source: std::io::Error::other("refused"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for ScriptedStore {
    async fn save_active(&self, record: &CheckpointRecord) -> Result<(), StoreError> {
        Self::refuse(&self.fail_saves)?;
        self.inner.save_active(record).await
    }

    async fn load_active(&self) -> Result<Option<CheckpointRecord>, StoreError> {
        self.inner.load_active().await
    }

    async fn archive_active(
        &self,
        record: &CheckpointRecord,
    ) -> Result<CheckpointRecord, StoreError> {
        Self::refuse(&self.fail_archive)?;
        self.inner.archive_active(record).await
    }

    async fn history(&self, limit: usize) -> Result<Vec<CheckpointRecord>, StoreError> {
        self.inner.history(limit).await
    }
}

fn drain(rx: &mut broadcast::Receiver<BuildEvent>) -> Vec<BuildEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn assert_counts_hold(executor: &BuildExecutor) {
    if let Some(session) = executor.session() {
        assert!(session.placed_count <= session.total_count);
    }
}

#[tokio::test]
async fn four_by_four_image_with_two_holes_places_fourteen_blocks() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store.clone());
    let mut rx = executor.events().subscribe();

    let summary = executor.start(request("wall.png", 4)).await.unwrap();
    assert_eq!(summary.total, 14);
    assert_eq!(summary.status, BuildStatus::Running);

    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);
    assert!(executor.session().is_none());

    let placements = world.placements();
    assert_eq!(placements.len(), 14);
    let yellow = MaterialId::from("yellow_wool");
    assert_eq!(placements.iter().filter(|(_, m)| *m == yellow).count(), 4);
    // Top-left pixel is transparent, so the first block is at column 1.
    assert_eq!(placements[0].0, BlockPos::new(1, 64, 0));
    assert_eq!(world.block_at(BlockPos::new(3, 67, 0)), None);

    let history = store.history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, BuildStatus::Completed);
    assert_eq!(history[0].placed_count, 14);
    assert!(store.load_active().await.unwrap().is_none());

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(BuildEvent::Started { total: 14, .. })));
    assert!(events.iter().any(|e| matches!(e, BuildEvent::Progress { placed: 10, .. })));
    match events.last() {
        Some(BuildEvent::Completed { summary, .. }) => {
            assert_eq!(summary.total_placed, 14);
            assert_eq!(summary.skipped, 0);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn gate_reports_every_missing_material() {
    let histogram: MaterialHistogram = [(MaterialId::from("A"), 5), (MaterialId::from("B"), 3)]
        .into_iter()
        .collect();
    let report = gate::evaluate(&histogram, |_| 0);
    let deficits: Vec<(String, u64)> = report
        .lines
        .iter()
        .map(|l| (l.material.to_string(), l.deficit))
        .collect();
    assert_eq!(deficits, vec![("A".to_owned(), 5), ("B".to_owned(), 3)]);
    assert!(!report.deficits.is_empty());
}

#[tokio::test]
async fn start_with_empty_inventory_reports_deficits_then_pauses_on_shortage() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::new(at_origin()).with_item("blue_wool", 1));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store.clone());
    let mut rx = executor.events().subscribe();

    executor.start(request("wall.png", 4)).await.unwrap();
    match drain(&mut rx).first() {
        Some(BuildEvent::Started { deficits, .. }) => {
            assert_eq!(
                deficits,
                &vec!["blue_wool: 1/10".to_owned(), "yellow_wool: 0/4".to_owned()]
            );
        }
        other => panic!("expected start event, got {other:?}"),
    }

    assert_eq!(executor.step().await, StepOutcome::Empty);
    assert_eq!(executor.step().await, StepOutcome::Placed);
    let outcome = executor.step().await;
    let StepOutcome::Paused(PauseReason::MaterialShortage { material, deficits }) = outcome.clone() else {
        panic!("expected shortage pause, got {outcome:?}");
    };
    assert_eq!(material.as_str(), "blue_wool");
    assert!(deficits.iter().any(|d| d.starts_with("blue_wool: 0/")));

    let session = executor.session().unwrap();
    assert_eq!(session.status, BuildStatus::Paused);
    assert_eq!(session.cursor, 2);
    let record = store.load_active().await.unwrap().unwrap();
    assert_eq!(record.cursor, 2);
    assert_eq!(record.placed_count, 1);

    // Restocking and resuming carries on from the blocked op.
    world.set_item("blue_wool", 64);
    world.set_item("yellow_wool", 64);
    executor.resume(Requester::private("bob")).await.unwrap();
    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);
    assert_eq!(world.placements().len(), 14);
    assert!(matches!(
        drain(&mut rx).last(),
        Some(BuildEvent::Completed { requester, .. }) if requester.delivery_is_private
    ));
}

#[tokio::test]
async fn second_start_is_rejected_without_touching_the_active_session() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store);

    executor.start(request("wall.png", 4)).await.unwrap();
    for _ in 0..5 {
        executor.step().await;
    }
    let before = executor.session().cloned().unwrap();

    let err = executor.start(request("wall.png", 4)).await.unwrap_err();
    assert!(matches!(err, BuildError::BuildActive { build_id } if build_id == before.id));
    assert_eq!(executor.session(), Some(&before));

    executor.pause().await.unwrap();
    assert!(matches!(
        executor.start(request("wall.png", 4)).await,
        Err(BuildError::BuildActive { .. })
    ));
}

#[tokio::test]
async fn resume_then_pause_leaves_progress_unchanged() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store);

    executor.start(request("wall.png", 4)).await.unwrap();
    for _ in 0..6 {
        executor.step().await;
    }
    let paused = executor.pause().await.unwrap();
    // Pausing twice is harmless.
    assert_eq!(executor.pause().await.unwrap().cursor, paused.cursor);

    let resumed = executor.resume(Requester::public("alice")).await.unwrap();
    assert_eq!(resumed.status, BuildStatus::Running);
    let again = executor.pause().await.unwrap();
    assert_eq!(again.cursor, paused.cursor);
    assert_eq!(again.placed, paused.placed);
    assert_eq!(again.pause_reason, Some(PauseReason::Operator));

    assert_eq!(executor.step().await, StepOutcome::Idle);
    assert!(matches!(
        executor.resume(Requester::public("alice")).await,
        Ok(summary) if summary.status == BuildStatus::Running
    ));
    assert!(matches!(
        executor.resume(Requester::public("alice")).await,
        Err(BuildError::NotPaused { status: BuildStatus::Running })
    ));
}

#[tokio::test]
async fn failed_relocation_pauses_at_the_last_placed_index() {
    let fx = Fixture::new().await;
    fx.add_image("solid.png", &RgbaImage::from_pixel(4, 4, BLUE))
        .await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    world.set_fail_navigation(true);
    world.displace_after(5, Position::new(100.0, 64.0, 0.0));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store.clone());

    executor.start(request("solid.png", 4)).await.unwrap();
    let outcome = executor.run_until_halt().await;
    let StepOutcome::Paused(PauseReason::DisplacementUnrecoverable { distance }) = outcome.clone() else {
        panic!("expected displacement pause, got {outcome:?}");
    };
    assert!(distance > 10.0);

    let record = store.load_active().await.unwrap().unwrap();
    assert_eq!(record.status, BuildStatus::Paused);
    assert_eq!(record.placed_count, 5);
    assert_eq!(record.cursor, 5);
    assert!(matches!(
        record.pause_reason,
        Some(PauseReason::DisplacementUnrecoverable { .. })
    ));

    // Still stranded: resume refuses and the session stays paused.
    assert!(matches!(
        executor.resume(Requester::public("alice")).await,
        Err(BuildError::DisplacementUnrecoverable { .. })
    ));
    assert_eq!(executor.session().unwrap().status, BuildStatus::Paused);
    assert_eq!(executor.session().unwrap().cursor, 5);

    // Once the agent is back, resume succeeds and finishes the plan.
    world.set_position(Some(at_origin()));
    world.set_fail_navigation(false);
    executor.resume(Requester::public("alice")).await.unwrap();
    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);
    assert_eq!(world.placements().len(), 16);
}

#[tokio::test]
async fn restart_resumes_from_the_checkpointed_cursor() {
    let fx = Fixture::new().await;
    fx.add_image("big.png", &RgbaImage::from_pixel(10, 10, BLUE))
        .await;
    let data_dir = fx.tmp.path().join("database");

    // First run: place 40 of 100 blocks, then "crash" without a final flush.
    {
        let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
        let store = Arc::new(FileCheckpointStore::new(&data_dir, "builder", 100).unwrap());
        let mut executor = fx.executor(settings(), &world, store);
        let started = executor.start(request("big.png", 10)).await.unwrap();
        assert_eq!(started.total, 100);
        while executor.session().unwrap().placed_count < 40 {
            assert_eq!(executor.step().await, StepOutcome::Placed);
            assert_counts_hold(&executor);
        }
    }

    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(FileCheckpointStore::new(&data_dir, "builder", 100).unwrap());
    let mut executor = fx.executor(settings(), &world, store.clone());
    let mut rx = executor.events().subscribe();

    let recovered = executor.recover().await.unwrap().unwrap();
    assert_eq!(recovered.placed, 40);
    assert_eq!(recovered.total, 100);
    assert_eq!(recovered.status, BuildStatus::Paused);
    assert_eq!(recovered.pause_reason, Some(PauseReason::Restored));
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [BuildEvent::UnfinishedBuild { placed: 40, total: 100, .. }]
    ));

    // Restored sessions never run on their own.
    assert_eq!(executor.step().await, StepOutcome::Idle);
    assert!(matches!(
        executor.start(request("big.png", 10)).await,
        Err(BuildError::BuildActive { .. })
    ));

    let resumed = executor.resume(Requester::public("carol")).await.unwrap();
    assert_eq!(resumed.cursor, 40);
    assert_eq!(resumed.placed, 40);

    assert_eq!(executor.step().await, StepOutcome::Placed);
    assert_eq!(world.placements()[0].0, BlockPos::new(0, 68, 0));
    assert_eq!(executor.session().unwrap().placed_count, 41);

    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);
    assert_eq!(world.placements().len(), 60);
    let history = store.history(1).await.unwrap();
    assert_eq!(history[0].placed_count, 100);
    assert_eq!(history[0].requester, "carol");
}

#[tokio::test]
async fn resume_refuses_a_changed_plan_source() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    {
        let mut executor = fx.executor(settings(), &world, store.clone());
        executor.start(request("wall.png", 4)).await.unwrap();
        executor.step().await;
    }

    fx.add_image("wall.png", &RgbaImage::from_pixel(4, 4, YELLOW))
        .await;
    let mut executor = fx.executor(settings(), &world, store);
    executor.recover().await.unwrap().unwrap();
    assert!(matches!(
        executor.resume(Requester::public("alice")).await,
        Err(BuildError::PlanChanged { .. })
    ));
    assert_eq!(executor.session().unwrap().status, BuildStatus::Paused);
}

#[tokio::test]
async fn checkpoint_failures_do_not_halt_the_build() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store.clone());
    let mut rx = executor.events().subscribe();

    executor.start(request("wall.png", 4)).await.unwrap();
    store.set_fail_writes(true);
    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);
    assert_eq!(world.placements().len(), 14);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, BuildEvent::Error { .. })));
    assert!(matches!(events.last(), Some(BuildEvent::Completed { .. })));
}

#[tokio::test]
async fn skip_policy_records_failed_indices() {
    let fx = Fixture::new().await;
    fx.add_image("solid.png", &RgbaImage::from_pixel(4, 4, BLUE))
        .await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    world.fail_placement_at(BlockPos::new(2, 64, 0));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store.clone());

    executor.start(request("solid.png", 4)).await.unwrap();
    assert_eq!(executor.step().await, StepOutcome::Placed);
    assert_eq!(executor.step().await, StepOutcome::Placed);
    assert_eq!(executor.step().await, StepOutcome::Skipped);
    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);

    let history = store.history(1).await.unwrap();
    let record = &history[0];
    assert_eq!(record.skipped, vec![2]);
    assert_eq!(record.placed_count, 15);
    assert_eq!(record.total_count, 16);
}

#[tokio::test]
async fn pause_after_policy_retries_then_pauses_on_the_failing_op() {
    let fx = Fixture::new().await;
    fx.add_image("solid.png", &RgbaImage::from_pixel(4, 4, BLUE))
        .await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    world.fail_placement_at(BlockPos::new(1, 64, 0));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(
        ExecutorSettings {
            failure_policy: FailurePolicy::PauseAfter(3),
            ..settings()
        },
        &world,
        store,
    );

    executor.start(request("solid.png", 4)).await.unwrap();
    assert_eq!(executor.step().await, StepOutcome::Placed);
    assert_eq!(executor.step().await, StepOutcome::Retrying);
    assert_eq!(executor.step().await, StepOutcome::Retrying);
    assert_eq!(
        executor.step().await,
        StepOutcome::Paused(PauseReason::PlacementFailures { consecutive: 3 })
    );
    let session = executor.session().unwrap();
    assert_eq!(session.cursor, 1);
    assert_eq!(session.placed_count, 1);
    assert!(session.skipped.is_empty());
}

#[tokio::test]
async fn stop_archives_the_session_and_frees_the_slot() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store.clone());
    let mut rx = executor.events().subscribe();

    executor.start(request("wall.png", 4)).await.unwrap();
    for _ in 0..4 {
        executor.step().await;
    }
    let stopped = executor.stop().await.unwrap();
    assert_eq!(stopped.status, BuildStatus::Cancelled);
    assert!(executor.session().is_none());
    assert!(store.load_active().await.unwrap().is_none());
    assert_eq!(
        store.history(5).await.unwrap()[0].status,
        BuildStatus::Cancelled
    );
    assert!(matches!(
        drain(&mut rx).last(),
        Some(BuildEvent::Cancelled { .. })
    ));

    assert!(matches!(executor.stop().await, Err(BuildError::NoActiveBuild)));
    executor.start(request("wall.png", 4)).await.unwrap();
}

#[tokio::test]
async fn dangling_checkpoint_blocks_start_until_stopped() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    {
        let mut executor = fx.executor(settings(), &world, store.clone());
        executor.start(request("wall.png", 4)).await.unwrap();
    }

    let mut executor = fx.executor(settings(), &world, store.clone());
    assert!(matches!(
        executor.start(request("wall.png", 4)).await,
        Err(BuildError::UnfinishedBuild { .. })
    ));
    executor.stop().await.unwrap();
    assert_eq!(store.history(5).await.unwrap().len(), 1);
    executor.start(request("wall.png", 4)).await.unwrap();
}

#[tokio::test]
async fn rejected_starts_create_no_session() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store.clone());

    let mut fast = request("wall.png", 4);
    fast.speed_factor = Some(Decimal::new(6, 0));
    assert!(matches!(
        executor.start(fast).await,
        Err(BuildError::InvalidSpeed { .. })
    ));
    assert!(matches!(
        executor.start(request("missing.png", 4)).await,
        Err(BuildError::PlanCompilation(_))
    ));
    assert!(executor.session().is_none());
    assert!(store.load_active().await.unwrap().is_none());
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn origin_defaults_to_the_agent_block() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(Position::new(10.7, 70.2, -3.5)));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store);

    let mut req = request("wall.png", 4);
    req.origin = None;
    executor.start(req).await.unwrap();
    assert_eq!(executor.session().unwrap().origin, BlockPos::new(10, 70, -4));

    world.set_position(None);
    executor.stop().await.unwrap();
    let mut req = request("wall.png", 4);
    req.origin = None;
    assert!(matches!(
        executor.start(req).await,
        Err(BuildError::PositionUnknown)
    ));
}

#[tokio::test]
async fn speed_factor_scales_the_placement_delay() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(ExecutorSettings::default(), &world, store);
    assert_eq!(executor.placement_delay(), Duration::from_millis(500));

    let mut req = request("wall.png", 4);
    req.speed_factor = Some(Decimal::new(2, 0));
    executor.start(req).await.unwrap();
    assert_eq!(executor.placement_delay(), Duration::from_millis(250));
}

#[tokio::test]
async fn inventory_reports_the_remaining_plan() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(
        SimulatedWorld::new(at_origin())
            .with_item("blue_wool", 20)
            .with_item("yellow_wool", 20),
    );
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store);

    executor.start(request("wall.png", 4)).await.unwrap();
    // Consume the first two rows.
    for _ in 0..8 {
        executor.step().await;
    }
    let report = executor.inventory().await.unwrap();
    assert!(report.is_satisfied());
    let required: Vec<u64> = report.lines.iter().map(|l| l.required).collect();
    assert_eq!(required, vec![7]);
}

#[tokio::test]
async fn unreadable_store_refuses_start_and_keeps_the_dangling_checkpoint() {
    let fx = Fixture::new().await;
    fx.add_image("solid.png", &RgbaImage::from_pixel(4, 4, BLUE))
        .await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    {
        let mut executor = fx.executor(settings(), &world, store.clone());
        executor.start(request("solid.png", 4)).await.unwrap();
        for _ in 0..10 {
            assert_eq!(executor.step().await, StepOutcome::Placed);
        }
    }
    let dangling = store.load_active().await.unwrap().unwrap();
    assert_eq!(dangling.placed_count, 10);

    let mut executor = fx.executor(settings(), &world, store.clone());
    store.set_fail_reads(true);
    assert!(matches!(
        executor.start(request("solid.png", 4)).await,
        Err(BuildError::Store(_))
    ));
    assert!(executor.session().is_none());

    store.set_fail_reads(false);
    assert_eq!(store.load_active().await.unwrap(), Some(dangling));
    assert!(matches!(
        executor.start(request("solid.png", 4)).await,
        Err(BuildError::UnfinishedBuild { .. })
    ));
}

#[tokio::test]
async fn history_holds_the_final_record_even_when_checkpoints_failed() {
    let fx = Fixture::new().await;
    fx.add_image("solid.png", &RgbaImage::from_pixel(4, 4, BLUE))
        .await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(ScriptedStore::default());
    let mut executor = fx.executor(settings(), &world, store.clone());

    executor.start(request("solid.png", 4)).await.unwrap();
    store.fail_saves.store(true, Ordering::SeqCst);
    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);

    let history = store.history(5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, BuildStatus::Completed);
    assert_eq!(history[0].cursor, 16);
    assert_eq!(history[0].placed_count, 16);
    assert!(store.load_active().await.unwrap().is_none());
}

#[tokio::test]
async fn failed_archive_leaves_a_terminal_record_for_the_next_start() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(ScriptedStore::default());
    let mut executor = fx.executor(settings(), &world, store.clone());

    executor.start(request("wall.png", 4)).await.unwrap();
    store.fail_archive.store(true, Ordering::SeqCst);
    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);
    let left = store.load_active().await.unwrap().unwrap();
    assert_eq!(left.status, BuildStatus::Completed);
    assert_eq!(left.placed_count, 14);
    assert!(store.history(5).await.unwrap().is_empty());

    store.fail_archive.store(false, Ordering::SeqCst);
    executor.start(request("wall.png", 4)).await.unwrap();
    let history = store.history(5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].build_id, left.build_id);
    assert_eq!(history[0].placed_count, 14);
}

#[tokio::test]
async fn resume_without_a_position_stays_paused() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store);

    executor.start(request("wall.png", 4)).await.unwrap();
    for _ in 0..3 {
        executor.step().await;
    }
    let paused = executor.pause().await.unwrap();

    world.set_position(None);
    assert!(matches!(
        executor.resume(Requester::public("alice")).await,
        Err(BuildError::PositionUnknown)
    ));
    let session = executor.session().unwrap();
    assert_eq!(session.status, BuildStatus::Paused);
    assert_eq!(session.cursor, paused.cursor);
    assert_eq!(executor.step().await, StepOutcome::Idle);

    world.set_position(Some(at_origin()));
    executor.resume(Requester::public("alice")).await.unwrap();
    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);
}

#[tokio::test]
async fn targets_just_out_of_reach_are_walked_to() {
    let fx = Fixture::new().await;
    fx.add_image("strip.png", &RgbaImage::from_pixel(8, 1, BLUE))
        .await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store);
    let mut rx = executor.events().subscribe();

    executor.start(strip("strip.png", 8)).await.unwrap();
    for _ in 0..5 {
        assert_eq!(executor.step().await, StepOutcome::Placed);
    }
    assert_eq!(world.navigation_count(), 0);

    // (5, 64, 0) is five blocks away: past reach, short of relocation.
    assert_eq!(executor.step().await, StepOutcome::Placed);
    assert_eq!(world.navigation_count(), 1);
    assert_eq!(world.placements()[5].0, BlockPos::new(5, 64, 0));

    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);
    assert_eq!(world.navigation_count(), 1);
    assert_eq!(world.placements().len(), 8);
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, BuildEvent::Relocating { .. })));
}

#[tokio::test]
async fn far_targets_between_relocation_checks_are_plain_navigation() {
    let fx = Fixture::new().await;
    fx.add_image("solid.png", &RgbaImage::from_pixel(4, 4, BLUE))
        .await;
    let far = Position::new(60.0, 64.0, 0.0);

    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    world.displace_after(1, far);
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(
        ExecutorSettings {
            relocation_check_interval: 3,
            ..settings()
        },
        &world,
        store,
    );
    let mut rx = executor.events().subscribe();
    executor.start(request("solid.png", 4)).await.unwrap();
    assert_eq!(executor.step().await, StepOutcome::Placed);
    assert_eq!(world.position().await, Some(far));

    // Second non-empty step is not a check step.
    assert_eq!(executor.step().await, StepOutcome::Placed);
    assert_eq!(world.navigation_count(), 1);
    assert_eq!(world.placements()[1].0, BlockPos::new(1, 64, 0));
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, BuildEvent::Relocating { .. })));

    // With a check on every step the same displacement relocates first.
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    world.displace_after(1, far);
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store);
    let mut rx = executor.events().subscribe();
    executor.start(request("solid.png", 4)).await.unwrap();
    assert_eq!(executor.step().await, StepOutcome::Placed);
    assert_eq!(executor.step().await, StepOutcome::Placed);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, BuildEvent::Relocating { .. })));
}

#[tokio::test]
async fn resume_walks_back_to_the_origin_before_running() {
    let fx = Fixture::new().await;
    fx.add_image("wall.png", &four_by_four_with_two_holes()).await;
    let world = Arc::new(SimulatedWorld::unlimited(at_origin()));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store);
    let mut rx = executor.events().subscribe();

    executor.start(request("wall.png", 4)).await.unwrap();
    for _ in 0..4 {
        executor.step().await;
    }
    executor.pause().await.unwrap();
    world.set_position(Some(Position::new(0.0, 64.0, 50.0)));
    drain(&mut rx);

    let resumed = executor.resume(Requester::public("alice")).await.unwrap();
    assert_eq!(resumed.status, BuildStatus::Running);
    assert_eq!(world.navigation_count(), 1);
    assert_eq!(world.position().await, Some(at_origin()));
    let events = drain(&mut rx);
    assert!(matches!(
        events.as_slice(),
        [BuildEvent::Relocating { distance, .. }, BuildEvent::Resumed { .. }] if *distance > 10.0
    ));

    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);
    assert_eq!(world.placements().len(), 14);
}

#[tokio::test]
async fn container_restock_keeps_the_build_running() {
    let fx = Fixture::new().await;
    fx.add_image("solid.png", &RgbaImage::from_pixel(4, 4, BLUE))
        .await;
    let world = Arc::new(SimulatedWorld::new(at_origin()).with_item("blue_wool", 4));
    world.stock_container("blue_wool", 12);
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store.clone());

    let mut req = request("solid.png", 4);
    req.use_containers = true;
    executor.start(req).await.unwrap();
    assert!(store.load_active().await.unwrap().unwrap().use_containers);
    assert_eq!(executor.run_until_halt().await, StepOutcome::Completed);
    assert_eq!(world.placements().len(), 16);
    assert_eq!(world.restock_count(), 1);
}

#[tokio::test]
async fn empty_containers_still_pause_on_shortage() {
    let fx = Fixture::new().await;
    fx.add_image("solid.png", &RgbaImage::from_pixel(4, 4, BLUE))
        .await;
    let world = Arc::new(SimulatedWorld::new(at_origin()).with_item("blue_wool", 2));
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store);

    let mut req = request("solid.png", 4);
    req.use_containers = true;
    executor.start(req).await.unwrap();
    assert!(matches!(
        executor.run_until_halt().await,
        StepOutcome::Paused(PauseReason::MaterialShortage { .. })
    ));
    assert_eq!(world.restock_count(), 1);
    assert_eq!(executor.session().unwrap().cursor, 2);
}

#[tokio::test]
async fn containers_are_left_alone_unless_enabled() {
    let fx = Fixture::new().await;
    fx.add_image("solid.png", &RgbaImage::from_pixel(4, 4, BLUE))
        .await;
    let world = Arc::new(SimulatedWorld::new(at_origin()).with_item("blue_wool", 2));
    world.stock_container("blue_wool", 64);
    let store = Arc::new(MemoryCheckpointStore::default());
    let mut executor = fx.executor(settings(), &world, store);

    executor.start(request("solid.png", 4)).await.unwrap();
    assert!(matches!(
        executor.run_until_halt().await,
        StepOutcome::Paused(PauseReason::MaterialShortage { .. })
    ));
    assert_eq!(world.restock_count(), 0);
}
