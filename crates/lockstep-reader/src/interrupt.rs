use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::broker::TransportError;
use crate::console::Console;

/// Log and echo transport error events until the channel closes.
pub fn spawn_error_reporter(
    mut errors: mpsc::Receiver<TransportError>,
    console: Console,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = errors.recv().await {
            report_error(&event, &console);
        }
    })
}

pub fn report_error(event: &TransportError, console: &Console) {
    error!(
        source = %event.source,
        entity_path = %event.entity_path,
        error = %event.message,
        "broker transport error"
    );
    let notice = format!(
        "Broker error: {}\n  Source: {}\n  Entity path: {}\n",
        event.message, event.source, event.entity_path
    );
    if let Err(e) = console.write(notice.as_bytes()) {
        warn!(error = %e, "console write failed");
    }
}

/// Turn Ctrl+C into cooperative cancellation.
pub fn spawn_interrupt_handler(cancel: CancellationToken, console: Console) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            on_interrupt(&cancel, &console);
        }
    })
}

/// The first interrupt cancels; later ones only remind the operator that the
/// current message still needs an answer.
pub fn on_interrupt(cancel: &CancellationToken, console: &Console) {
    let notice = if cancel.is_cancelled() {
        "Shutdown already requested. Answer the pending prompt, or press Ctrl+D to requeue the message and exit."
    } else {
        info!("shutdown requested");
        cancel.cancel();
        "\nShutdown requested. Finishing the current message..."
    };
    if let Err(e) = console.line(notice) {
        warn!(error = %e, "console write failed");
    }
}
