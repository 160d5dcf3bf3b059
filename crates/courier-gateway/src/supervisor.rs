//! Process supervisor seam. The gateway never kills or launches the external
//! chat-client process itself; it asks the owning supervisor to do it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

/// Terminates and relaunches the external chat-client process. The relaunch
/// itself is typically handled by a container or service manager; the
/// supervisor only has to make the old process go away.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn restart(&self) -> Result<()>;
}

/// Supervisor that runs a configured kill command (e.g. `pkill -f simplex-chat`)
/// and relies on the surrounding service manager to bring the process back.
pub struct CommandSupervisor {
    program: String,
    args: Vec<String>,
}

impl CommandSupervisor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl ProcessSupervisor for CommandSupervisor {
    async fn restart(&self) -> Result<()> {
        info!(program = %self.program, "signalling chat-client process restart");
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;
        // pkill exits non-zero when no process matched; the relaunch still
        // proceeds, so only log it.
        if !output.status.success() {
            info!(
                code = output.status.code().unwrap_or(-1),
                "restart command exited non-zero"
            );
        }
        Ok(())
    }
}

/// No-op supervisor for deployments where something external watches the
/// process, and for tests.
pub struct NoopSupervisor;

#[async_trait]
impl ProcessSupervisor for NoopSupervisor {
    async fn restart(&self) -> Result<()> {
        Ok(())
    }
}
