use std::io::{self, BufRead};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

/// Source of operator answers, one line at a time.
#[async_trait]
pub trait OperatorInput: Send {
    /// The next line without its terminator. `Ok(None)` at end of input.
    async fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Lines delivered over a channel. End of input once every sender is gone
/// and the buffered lines are consumed.
#[derive(Debug)]
pub struct ChannelInput {
    lines: mpsc::UnboundedReceiver<String>,
}

impl ChannelInput {
    pub fn channel() -> (mpsc::UnboundedSender<String>, Self) {
        let (tx, lines) = mpsc::unbounded_channel();
        (tx, Self { lines })
    }

    /// Fixed answers followed by end of input.
    pub fn scripted<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, input) = Self::channel();
        for line in lines {
            // The receiver is alive in `input`.
            let _ = tx.send(line.into());
        }
        input
    }

    /// Read stdin on a dedicated thread. A blocked terminal read then never
    /// holds up runtime shutdown.
    pub fn stdin() -> io::Result<Self> {
        let (tx, input) = Self::channel();
        std::thread::Builder::new()
            .name("operator-input".to_string())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to read operator input");
                            break;
                        }
                    }
                }
            })?;
        Ok(input)
    }
}

#[async_trait]
impl OperatorInput for ChannelInput {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.lines.recv().await)
    }
}
