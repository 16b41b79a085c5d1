//! Mock media player for testing.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::player::{Player, PlayerError};

/// Records the URLs it is asked to play.
///
/// By default playback ends immediately. A holding player keeps playing
/// until [`MockPlayer::finish`] is called, which lets tests act while a
/// stream is live.
#[derive(Debug, Default)]
pub struct MockPlayer {
    played: Mutex<Vec<String>>,
    hold: bool,
    duration: Duration,
    fail: bool,
    started: Notify,
    release: Notify,
}

impl MockPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plays until `finish` is called.
    pub fn holding() -> Self {
        Self {
            hold: true,
            ..Self::default()
        }
    }

    /// Plays for a fixed duration.
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    /// Exits with a failure status.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until playback of some URL has started.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// End a holding playback.
    pub fn finish(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl Player for MockPlayer {
    async fn play(&self, url: &str) -> Result<(), PlayerError> {
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        self.started.notify_one();

        if self.hold {
            self.release.notified().await;
        } else if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }

        if self.fail {
            Err(PlayerError::ExitFailure { code: Some(1) })
        } else {
            Ok(())
        }
    }
}
