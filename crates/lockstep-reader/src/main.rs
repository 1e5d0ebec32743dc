use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lockstep_reader::broker::SdkBroker;
use lockstep_reader::interrupt::spawn_interrupt_handler;
use lockstep_reader::select::choose_entity_until_cancelled;
use lockstep_reader::{
    ChannelInput, Console, EntityDescriptor, ReaderConfig, ReaderError, ReceiveOptions,
    ResolutionPolicy, RunSummary, SequentialProcessor, SubQueue,
};
use lockstep_sdk::LockstepClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "lockstep-reader",
    about = "Review broker messages one at a time and decide what happens to each",
    version
)]
struct Cli {
    /// Queue to read from
    #[arg(long, conflicts_with = "topic")]
    queue: Option<String>,

    /// Topic to read from (needs --subscription)
    #[arg(long, requires = "subscription")]
    topic: Option<String>,

    /// Topic subscription to read from
    #[arg(long, requires = "topic")]
    subscription: Option<String>,

    /// Read the dead-letter sub-queue instead of the entity itself
    #[arg(long)]
    dead_letter: bool,

    /// Configuration file (default: lockstep-reader.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    lockstep_core::telemetry::init_tracing_stderr();

    let cli = Cli::parse();
    let console = Console::stdout();

    match run(cli, console.clone()).await {
        Ok(summary) => {
            let _ = console.line(format!(
                "\nDone. completed: {}, abandoned: {}, dead-lettered: {}, skipped: {}, failed: {}",
                summary.acknowledged,
                summary.requeued,
                summary.dead_lettered,
                summary.skipped,
                summary.failed
            ));
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "reader failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, console: Console) -> Result<RunSummary, ReaderError> {
    let config =
        ReaderConfig::load_with_env(cli.config.as_deref(), |key| std::env::var(key).ok())?;
    let connection_string = config.connection_string()?.to_string();

    let cancel = CancellationToken::new();
    let interrupts = spawn_interrupt_handler(cancel.clone(), console.clone());
    let result = read(cli, &config, &connection_string, console, cancel).await;
    interrupts.abort();
    result
}

async fn read(
    cli: Cli,
    config: &ReaderConfig,
    connection_string: &str,
    console: Console,
    cancel: CancellationToken,
) -> Result<RunSummary, ReaderError> {
    let _ = console.line("Lockstep reader starting...");
    let mut input = ChannelInput::stdin().map_err(lockstep_reader::PromptError::Input)?;

    let entity = match (cli.queue, cli.topic, cli.subscription) {
        (Some(name), None, None) => EntityDescriptor::Queue { name },
        (None, Some(name), Some(subscription)) => EntityDescriptor::Topic { name, subscription },
        _ => match choose_entity_until_cancelled(&mut input, &console, config, &cancel).await? {
            Some(entity) => entity,
            None => return Ok(RunSummary::default()),
        },
    };

    let client = LockstepClient::connect(connection_string).await?;
    info!(%entity, "connected to broker");
    let broker = SdkBroker::new(client, config.receiver_settings());

    let policy = ResolutionPolicy::new(input, console.clone(), config.lease_renewal(), cancel.clone());
    let mut processor = SequentialProcessor::new(broker, policy, console, cancel);

    let options = ReceiveOptions {
        sub_queue: if cli.dead_letter {
            SubQueue::DeadLetter
        } else {
            SubQueue::Active
        },
        ..Default::default()
    };
    processor.run(&entity, options).await
}
