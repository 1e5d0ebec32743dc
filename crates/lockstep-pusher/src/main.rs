mod envelope;

use std::time::Duration;

use clap::Parser;
use lockstep_sdk::LockstepClient;
use tracing::{error, info};

use crate::envelope::{sample_text, Envelope};

#[derive(Parser)]
#[command(
    name = "lockstep-pusher",
    about = "Send sample envelope messages to a lockstep queue or topic",
    version
)]
struct Cli {
    /// Broker connection string (Endpoint=...;SharedAccessKey=...)
    #[arg(long, env = "LOCKSTEP_CONNECTION_STRING", hide_env_values = true)]
    connection_string: String,

    /// Queue to send to
    #[arg(long, conflicts_with = "topic", required_unless_present = "topic")]
    queue: Option<String>,

    /// Topic to send to
    #[arg(long)]
    topic: Option<String>,

    /// Number of messages to send
    #[arg(long, default_value_t = 1)]
    count: u64,

    /// Pause between messages in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Category property and envelope field
    #[arg(long)]
    category: Option<String>,

    /// Priority property and envelope field
    #[arg(long)]
    priority: Option<String>,

    /// Source property and envelope field
    #[arg(long, default_value = "lockstep-pusher")]
    source: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lockstep_core::telemetry::init_tracing_stderr();

    let cli = Cli::parse();
    let (entity, kind) = match (&cli.queue, &cli.topic) {
        (Some(queue), _) => (queue.clone(), "queue"),
        (None, Some(topic)) => (topic.clone(), "topic"),
        (None, None) => return Err("either --queue or --topic is required".into()),
    };

    let client = LockstepClient::connect(&cli.connection_string).await?;
    info!(%entity, kind, count = cli.count, "connected, sending messages");

    for sequence in 0..cli.count {
        if sequence > 0 {
            tokio::time::sleep(Duration::from_millis(cli.interval_ms)).await;
        }

        let envelope = Envelope::new(sample_text(sequence), cli.source.as_str())
            .with_category(cli.category.clone())
            .with_priority(cli.priority.clone())
            .with_metadata(kind, entity.as_str())
            .with_metadata("sequence", sequence);

        match client.send(&entity, envelope.to_message()?).await {
            Ok(message_id) => {
                info!(%entity, %message_id, content = %envelope.content, "message sent");
                println!("{message_id}");
            }
            Err(e) => {
                error!(%entity, error = %e, "failed to send message");
                return Err(e.into());
            }
        }
    }

    Ok(())
}
