//! External media player used to consume a stream gateway URL.

mod command;

pub use command::CommandPlayer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while launching or running a player.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The player program could not be started.
    #[error("Failed to launch player '{program}': {reason}")]
    LaunchFailed { program: String, reason: String },

    /// The player exited with a failure status.
    #[error("Player exited with code {code:?}")]
    ExitFailure { code: Option<i32> },
}

/// Something that plays a URL and returns once playback ends.
#[async_trait]
pub trait Player: Send + Sync {
    async fn play(&self, url: &str) -> Result<(), PlayerError>;
}

/// External player configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Program to run, looked up on `PATH` if not absolute.
    #[serde(default = "default_program")]
    pub program: String,
    /// Extra arguments placed before the URL.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
        }
    }
}

fn default_program() -> String {
    "mpv".to_string()
}
