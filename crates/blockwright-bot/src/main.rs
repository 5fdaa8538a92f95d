//! Blockwright chat bot binary.
//!
//! Wires configuration, logging, the checkpoint store, the plan library and
//! one agent session together, then relays chat: commands are read from
//! stdin and every build event is printed to stdout as a chat line. The
//! world is a dry-run [`SimulatedWorld`] with unlimited materials.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `blockwright-config.yaml`
//! 2. Initialize structured logging (tracing, to stderr)
//! 3. Open the configured checkpoint store
//! 4. Prepare the plan directories
//! 5. Create the build executor and recover any unfinished build
//! 6. Spawn the agent session and the event renderer
//! 7. Relay stdin commands until end of input

mod decoder;
mod error;
mod fetch;
mod render;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use blockwright_core::config::LoggingConfig;
use blockwright_core::{
    AgentHandle, AgentSession, BlockwrightConfig, BuildExecutor, Command, CommandDecoder,
    LogFormat, SimulatedWorld, StartRequest, StoreBackend,
};
use blockwright_plan::{PlanCompiler, PlanLibrary};
use blockwright_store::{
    CheckpointStore, DragonflyCheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
};
use blockwright_types::{BuildEvent, Position, Requester};

use crate::decoder::{BangDecoder, ChatCommand};
use crate::error::BotError;
use crate::fetch::ImageFetcher;
use crate::render::ChatLine;

/// Configuration file, relative to the working directory.
const CONFIG_PATH: &str = "blockwright-config.yaml";

/// Where the dry-run agent stands when the process starts.
const DRY_RUN_SPAWN: Position = Position::new(0.0, 64.0, 0.0);

/// Application entry point for the bot.
///
/// # Errors
///
/// Returns an error if configuration, the store, or startup recovery fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("blockwright-bot starting");
    if !Path::new(CONFIG_PATH).exists() {
        info!(path = CONFIG_PATH, "Config file not found, using defaults");
    }
    info!(
        agent = config.agent.name,
        store = ?config.store.backend,
        images_dir = %config.paths.images_dir.display(),
        schematics_dir = %config.paths.schematics_dir.display(),
        "Configuration loaded"
    );

    run(config).await?;

    info!("blockwright-bot shutdown complete");
    Ok(())
}

/// Load configuration from `blockwright-config.yaml`.
///
/// Looks for the file relative to the current working directory.
fn load_config() -> Result<BlockwrightConfig, BotError> {
    Ok(BlockwrightConfig::from_file_or_default(Path::new(
        CONFIG_PATH,
    ))?)
}

/// Route tracing output to stderr so stdout carries only chat lines.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: BlockwrightConfig) -> anyhow::Result<()> {
    // 3. Open the checkpoint store.
    let store = open_store(&config)
        .await
        .context("failed to open the checkpoint store")?;
    info!(backend = ?config.store.backend, "Checkpoint store ready");

    // 4. Prepare plan directories.
    let library = PlanLibrary::new(&config.paths.images_dir, &config.paths.schematics_dir);
    library
        .ensure_dirs()
        .await
        .context("failed to prepare plan directories")?;
    let fetcher = ImageFetcher::new(&config.fetch, library.clone())?;

    // 5. Create the executor and recover.
    let world = Arc::new(SimulatedWorld::unlimited(DRY_RUN_SPAWN));
    let mut executor = BuildExecutor::new(
        &config.agent.name,
        config.executor.settings(),
        PlanCompiler::new(config.compiler.raster_settings()),
        library,
        world,
        store,
    );
    let events = executor.events().subscribe();
    let renderer = tokio::spawn(render_events(events));
    if let Some(unfinished) = executor
        .recover()
        .await
        .context("failed to inspect the checkpoint store")?
    {
        info!(
            build_id = %unfinished.build_id,
            placed = unfinished.placed,
            total = unfinished.total,
            "Unfinished build awaiting resume"
        );
    }

    // 6. Spawn the agent session.
    let (handle, session) = AgentSession::spawn(executor);
    let decoder = BangDecoder::new(config.compiler.default_palette, config.compiler.layout);

    // 7. Relay stdin.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let (sender, message) = decoder::split_chat_line(&line);
        let Some(decoded) = decoder.decode(message, &sender) else {
            continue;
        };
        let output = match decoded {
            Ok(command) => dispatch(&handle, &fetcher, &sender, command).await,
            Err(e) => vec![render::failure(&sender, &e)],
        };
        for chat in output {
            println!("{chat}");
        }
    }

    info!("Input closed, stopping agent session");
    drop(handle);
    session.await.context("agent session task failed")?;
    renderer.await.context("event renderer task failed")?;
    Ok(())
}

async fn open_store(config: &BlockwrightConfig) -> Result<Arc<dyn CheckpointStore>, BotError> {
    let agent = config.agent.name.as_str();
    let retention = config.store.history_retention;
    let store: Arc<dyn CheckpointStore> = match config.store.backend {
        StoreBackend::File => Arc::new(FileCheckpointStore::new(
            &config.paths.data_dir,
            agent,
            retention,
        )?),
        StoreBackend::Memory => Arc::new(MemoryCheckpointStore::new(retention)),
        StoreBackend::Dragonfly => Arc::new(
            DragonflyCheckpointStore::connect(&config.store.dragonfly_url, agent, retention)
                .await?,
        ),
    };
    Ok(store)
}

/// Execute one decoded command and render its outcome.
async fn dispatch(
    handle: &AgentHandle,
    fetcher: &ImageFetcher,
    sender: &Requester,
    command: ChatCommand,
) -> Vec<ChatLine> {
    let command = match command {
        ChatCommand::Core(command) => command,
        ChatCommand::Help => return render::help(sender),
        ChatCommand::Download {
            url,
            options,
            speed_factor,
            requester,
        } => match fetcher.fetch(&url).await {
            Ok(source) => Command::Start(StartRequest {
                options,
                speed_factor,
                ..StartRequest::new(source, requester)
            }),
            Err(e) => {
                warn!(url = url, error = %e, "Image download failed");
                return vec![render::failure(sender, &e)];
            }
        },
    };
    debug!(command = command.name(), sender = sender.name, "Dispatching command");
    match handle.execute(command).await {
        Ok(reply) => render::reply(sender, &reply),
        Err(e) => vec![render::build_error(sender, &e)],
    }
}

/// Print every build event until the bus closes.
async fn render_events(mut events: broadcast::Receiver<BuildEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                for line in render::event(&event) {
                    println!("{line}");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Event renderer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
