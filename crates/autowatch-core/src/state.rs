use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::status::StatusSnapshot;

/// Where the session stands, derived from the latest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum WatchPhase {
    /// Nothing polled yet.
    #[default]
    Starting,
    /// Logged out and not on a page we can work with.
    NeedsLogin,
    NeedsChannelPage,
    OnChannelPage,
    OnStreamWaiting,
    OnStreamLive { rewards: bool },
    /// Page metadata still describes the previous video.
    VideoIdStale,
}

impl WatchPhase {
    pub fn classify(status: &StatusSnapshot) -> Self {
        if status.is_video_id_mismatch {
            WatchPhase::VideoIdStale
        } else if status.is_channel_page {
            WatchPhase::OnChannelPage
        } else if status.is_stream && status.is_stream_waiting {
            WatchPhase::OnStreamWaiting
        } else if status.is_stream {
            WatchPhase::OnStreamLive {
                rewards: status.is_stream_rewards,
            }
        } else if status.login_url.is_some() {
            WatchPhase::NeedsLogin
        } else {
            WatchPhase::NeedsChannelPage
        }
    }
}

/// What the controller did in one poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Stale metadata; the page was reloaded.
    ReloadedStalePage,
    NavigatedToChannel,
    NavigatedToStream { url: String, is_live: bool },
    /// Listing had nothing to open; waited and reloaded.
    NoStreamsFound,
    StreamWaiting,
    RewardsActive,
    RewardsMissing { reloaded: bool },
}

/// Everything the status API exposes.  `rev` increments on every change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WatchState {
    #[serde(default)]
    pub rev: u64,
    pub phase: WatchPhase,
    pub channel_page: String,
    pub current_url: Option<String>,
    pub status: Option<StatusSnapshot>,
    pub last_outcome: Option<CycleOutcome>,
    pub status_message: Option<String>,
    pub last_error: Option<String>,
    pub login_prompted: bool,
    pub cycles: u64,
    pub updated_at: Option<DateTime<Local>>,
}

pub struct StateManager {
    state: Arc<RwLock<WatchState>>,
}

impl StateManager {
    pub fn new(channel_page: impl Into<String>) -> Self {
        let state = WatchState {
            rev: 1,
            channel_page: channel_page.into(),
            ..WatchState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn get_state(&self) -> WatchState {
        self.state.read().await.clone()
    }

    pub async fn set_status(&self, status: StatusSnapshot, current_url: Option<String>) {
        let mut state = self.state.write().await;
        state.phase = WatchPhase::classify(&status);
        state.status = Some(status);
        state.current_url = current_url;
        touch(&mut state);
    }

    pub async fn set_login_prompted(&self) {
        let mut state = self.state.write().await;
        state.login_prompted = true;
        touch(&mut state);
    }

    pub async fn set_status_message(&self, message: &str) {
        let mut state = self.state.write().await;
        state.status_message = Some(message.to_string());
        touch(&mut state);
    }

    pub async fn finish_cycle(&self, outcome: Result<CycleOutcome, String>) {
        let mut state = self.state.write().await;
        state.cycles += 1;
        match outcome {
            Ok(outcome) => {
                state.last_outcome = Some(outcome);
                state.last_error = None;
            }
            Err(error) => state.last_error = Some(error),
        }
        touch(&mut state);
    }
}

fn touch(state: &mut WatchState) {
    state.rev += 1;
    state.updated_at = Some(Local::now());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_priorities() {
        let stale = StatusSnapshot::default().with_video_ids(Some("a".into()), Some("b".into()));
        assert_eq!(WatchPhase::classify(&stale), WatchPhase::VideoIdStale);

        let blank = StatusSnapshot::default();
        assert_eq!(WatchPhase::classify(&blank), WatchPhase::NeedsChannelPage);

        let logged_out = StatusSnapshot {
            login_url: Some("https://accounts.test/login".into()),
            ..StatusSnapshot::default()
        };
        assert_eq!(WatchPhase::classify(&logged_out), WatchPhase::NeedsLogin);

        let ambiguous = StatusSnapshot {
            is_channel_page: true,
            is_stream: true,
            ..StatusSnapshot::default()
        };
        assert_eq!(WatchPhase::classify(&ambiguous), WatchPhase::OnChannelPage);

        let waiting = StatusSnapshot {
            is_stream: true,
            is_stream_waiting: true,
            ..StatusSnapshot::default()
        };
        assert_eq!(WatchPhase::classify(&waiting), WatchPhase::OnStreamWaiting);

        let live = StatusSnapshot {
            is_stream: true,
            is_stream_rewards: true,
            login_url: Some("https://accounts.test/login".into()),
            ..StatusSnapshot::default()
        };
        assert_eq!(
            WatchPhase::classify(&live),
            WatchPhase::OnStreamLive { rewards: true }
        );
    }

    #[tokio::test]
    async fn test_state_manager_bumps_rev() {
        let manager = StateManager::new("https://yt.test/@chan");
        let initial = manager.get_state().await;
        assert_eq!(initial.rev, 1);
        assert_eq!(initial.phase, WatchPhase::Starting);

        manager
            .set_status(StatusSnapshot::default(), Some("about:blank".into()))
            .await;
        manager.finish_cycle(Err("boom".into())).await;
        manager.finish_cycle(Ok(CycleOutcome::NavigatedToChannel)).await;

        let state = manager.get_state().await;
        assert_eq!(state.rev, 4);
        assert_eq!(state.cycles, 2);
        assert_eq!(state.phase, WatchPhase::NeedsChannelPage);
        assert_eq!(state.last_outcome, Some(CycleOutcome::NavigatedToChannel));
        assert!(state.last_error.is_none());
        assert!(state.updated_at.is_some());
    }

    #[test]
    fn test_phase_serialises_tagged() {
        let json = serde_json::to_value(WatchPhase::OnStreamLive { rewards: false }).unwrap();
        assert_eq!(json["phase"], "on_stream_live");
        assert_eq!(json["rewards"], false);
    }
}
