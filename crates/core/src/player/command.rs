use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Player, PlayerConfig, PlayerError};

/// Runs an external program with the stream URL as its last argument.
pub struct CommandPlayer {
    config: PlayerConfig,
}

impl CommandPlayer {
    pub fn new(config: PlayerConfig) -> Self {
        Self { config }
    }

    fn command(&self, url: &str) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Player for CommandPlayer {
    async fn play(&self, url: &str) -> Result<(), PlayerError> {
        debug!(program = %self.config.program, args = ?self.config.args, url, "Launching player");

        let mut child = self
            .command(url)
            .spawn()
            .map_err(|e| PlayerError::LaunchFailed {
                program: self.config.program.clone(),
                reason: e.to_string(),
            })?;

        let status = child.wait().await.map_err(|e| PlayerError::LaunchFailed {
            program: self.config.program.clone(),
            reason: e.to_string(),
        })?;

        if status.success() {
            info!(program = %self.config.program, "Player exited");
            Ok(())
        } else {
            warn!(program = %self.config.program, code = ?status.code(), "Player exited with failure");
            Err(PlayerError::ExitFailure {
                code: status.code(),
            })
        }
    }
}
