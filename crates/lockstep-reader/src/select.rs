//! Interactive entity selection when no entity is given on the command line.

use tokio_util::sync::CancellationToken;

use crate::broker::EntityDescriptor;
use crate::config::ReaderConfig;
use crate::console::Console;
use crate::error::PromptError;
use crate::input::OperatorInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Queue,
    Topic,
}

pub fn parse_entity_kind(input: &str) -> Option<EntityKind> {
    match input.trim().to_ascii_uppercase().as_str() {
        "Q" | "1" => Some(EntityKind::Queue),
        "T" | "2" => Some(EntityKind::Topic),
        _ => None,
    }
}

/// Ask for queue or topic, then for names, offering configured defaults.
pub async fn choose_entity<I>(
    input: &mut I,
    console: &Console,
    config: &ReaderConfig,
) -> Result<EntityDescriptor, PromptError>
where
    I: OperatorInput + ?Sized,
{
    let kind = loop {
        console
            .prompt(
                "Select entity type:\n  [Q] Queue\n  [T] Topic (requires a subscription)\nYour choice (Q/T): ",
            )
            .map_err(PromptError::Console)?;
        match parse_entity_kind(&read(input).await?) {
            Some(kind) => break kind,
            None => console
                .line("Invalid choice. Enter Q for a queue or T for a topic.")
                .map_err(PromptError::Console)?,
        }
    };

    let entity = match kind {
        EntityKind::Queue => {
            let name = ask_name(input, console, "Queue name", &config.default_queue).await?;
            EntityDescriptor::Queue { name }
        }
        EntityKind::Topic => {
            let name = ask_name(input, console, "Topic name", &config.default_topic).await?;
            let subscription = ask_name(
                input,
                console,
                "Subscription name",
                &config.default_subscription,
            )
            .await?;
            EntityDescriptor::Topic { name, subscription }
        }
    };

    console
        .line(format!("\nReading from {entity}.\n"))
        .map_err(PromptError::Console)?;
    Ok(entity)
}

/// Like [`choose_entity`], but gives up with `None` once `cancel` fires.
pub async fn choose_entity_until_cancelled<I>(
    input: &mut I,
    console: &Console,
    config: &ReaderConfig,
    cancel: &CancellationToken,
) -> Result<Option<EntityDescriptor>, PromptError>
where
    I: OperatorInput + ?Sized,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Ok(None),
        entity = choose_entity(input, console, config) => entity.map(Some),
    }
}

/// An empty answer takes the default; with no default the name is asked
/// for again.
async fn ask_name<I>(
    input: &mut I,
    console: &Console,
    label: &str,
    default: &str,
) -> Result<String, PromptError>
where
    I: OperatorInput + ?Sized,
{
    loop {
        let prompt = if default.is_empty() {
            format!("{label}: ")
        } else {
            format!("{label} (default: {default}): ")
        };
        console.prompt(prompt).map_err(PromptError::Console)?;

        let answer = read(input).await?;
        let answer = answer.trim();
        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
        if !default.is_empty() {
            return Ok(default.to_string());
        }
        console
            .line(format!("{label} is required."))
            .map_err(PromptError::Console)?;
    }
}

async fn read<I>(input: &mut I) -> Result<String, PromptError>
where
    I: OperatorInput + ?Sized,
{
    input
        .read_line()
        .await
        .map_err(PromptError::Input)?
        .ok_or(PromptError::InputClosed)
}
