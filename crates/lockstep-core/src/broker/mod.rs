pub mod command;
pub mod config;
mod scheduler;

use std::thread;

use tracing::info;

use crate::error::{BrokerError, BrokerResult};

pub use command::{EntityInfo, LockedMessage, SchedulerCommand};
pub use config::{AuthConfig, BrokerConfig, SchedulerConfig, ServerConfig};

use scheduler::Scheduler;

/// Handle to the scheduler thread. gRPC handlers hand `SchedulerCommand`s
/// to it through [`Broker::send_command`]; the scheduler applies them one at
/// a time, so entity state is never shared between threads.
pub struct Broker {
    command_tx: crossbeam_channel::Sender<SchedulerCommand>,
    scheduler_thread: Option<thread::JoinHandle<()>>,
}

impl Broker {
    #[tracing::instrument(skip_all, fields(listen_addr = %config.server.listen_addr))]
    pub fn new(config: BrokerConfig) -> BrokerResult<Self> {
        config.validate()?;

        let (command_tx, command_rx) =
            crossbeam_channel::bounded(config.scheduler.command_channel_capacity);

        let scheduler_thread = thread::Builder::new()
            .name("lockstep-scheduler".to_string())
            .spawn(move || Scheduler::new(command_rx, &config).run())
            .map_err(|e| BrokerError::SchedulerSpawn(e.to_string()))?;

        info!("broker started");
        Ok(Self {
            command_tx,
            scheduler_thread: Some(scheduler_thread),
        })
    }

    /// Never blocks: a full queue surfaces as `ChannelFull` so callers can
    /// answer `resource_exhausted`.
    #[tracing::instrument(skip_all)]
    pub fn send_command(&self, cmd: SchedulerCommand) -> BrokerResult<()> {
        use crossbeam_channel::TrySendError;

        self.command_tx.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => BrokerError::ChannelFull,
            TrySendError::Disconnected(_) => BrokerError::ChannelDisconnected,
        })
    }

    #[tracing::instrument(skip_all)]
    pub fn shutdown(mut self) -> BrokerResult<()> {
        info!("stopping broker");
        let stopped = self.stop_scheduler();
        info!("broker stopped");
        stopped
    }

    fn stop_scheduler(&mut self) -> BrokerResult<()> {
        let Some(handle) = self.scheduler_thread.take() else {
            return Ok(());
        };
        // The scheduler may already be gone
        let _ = self.command_tx.send(SchedulerCommand::Shutdown);
        handle.join().map_err(|_| BrokerError::SchedulerPanicked)
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        let _ = self.stop_scheduler();
    }
}
