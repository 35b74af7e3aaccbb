//! The watch loop.
//!
//! Each poll cycle:
//!
//! ```text
//!   inspect(page) ──► stale metadata? ──► reload ─────────────────────┐
//!        │                                                            │
//!        ├── logged out, not asked yet ──► confirm ──► login + wait   │
//!        │                                                            │
//!        ├── neither listing nor stream ──► open <channel>/streams ───┤
//!        ├── listing ──► locate() ──► open stream | wait + reload ────┤
//!        └── stream  ──► waiting | rewards | no rewards (+ reload) ───┤
//!                                                                     ▼
//!                                                        sleep(poll_interval)
//! ```
//!
//! At most one navigation happens per cycle.  Failed navigations are retried
//! a bounded number of times; a failed reload falls back to the channel page.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Level};

use crate::config::WatchSettings;
use crate::error::{CycleError, PageError};
use crate::locator;
use crate::page::{NavigateOptions, Page};
use crate::state::{CycleOutcome, StateManager};
use crate::status::{self, StatusSnapshot};

pub const LOGIN_PROMPT: &str = "[Autowatch Live] It looks like you're not logged in. \
You can't earn rewards without being logged in. Would you like to login now?";

pub const MSG_WAITING: &str = "Waiting for stream to begin...";
pub const MSG_REWARDS_ACTIVE: &str = "Stream has begun and rewards detected";
pub const MSG_REWARDS_MISSING: &str = "Stream has begun but no rewards detected";

/// Suspension points of the loop.  Swapped out in tests so runs finish
/// without real timers.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Logs a status line only when it differs from the previous one.
#[derive(Debug, Default)]
pub struct StatusLog {
    last: Option<String>,
}

impl StatusLog {
    /// Returns whether the message was emitted.
    pub fn emit(&mut self, level: Level, message: &str) -> bool {
        if self.last.as_deref() == Some(message) {
            return false;
        }
        match level {
            Level::ERROR => error!("{}", message),
            Level::WARN => warn!("{}", message),
            _ => info!("{}", message),
        }
        self.last = Some(message.to_string());
        true
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// Per-run memory of the controller.
#[derive(Debug, Default)]
pub struct Session {
    /// The login prompt is shown at most once per run.
    pub asked_login: bool,
    pub status_log: StatusLog,
}

pub struct Controller<P, S = TokioSleeper> {
    page: P,
    settings: WatchSettings,
    sleeper: S,
    session: Session,
    state: Arc<StateManager>,
}

impl<P, S> Controller<P, S>
where
    P: Page,
    S: Sleeper,
{
    pub fn new(page: P, settings: WatchSettings, sleeper: S, state: Arc<StateManager>) -> Self {
        Self {
            page,
            settings,
            sleeper,
            session: Session::default(),
            state,
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Poll forever.  Only process shutdown stops it.
    pub async fn run(&mut self) {
        self.run_until(|_| true).await;
    }

    /// Poll while `keep_going(cycles_completed)` holds.  Cycle failures are
    /// logged and never end the loop.
    pub async fn run_until<F>(&mut self, mut keep_going: F)
    where
        F: FnMut(u64) -> bool + Send,
    {
        let mut cycles = 0u64;
        while keep_going(cycles) {
            match self.cycle().await {
                Ok(outcome) => {
                    debug!(?outcome, "poll cycle finished");
                    self.state.finish_cycle(Ok(outcome)).await;
                }
                Err(e) => {
                    let e = anyhow::Error::from(e);
                    error!("poll cycle failed: {:#}", e);
                    self.state.finish_cycle(Err(format!("{:#}", e))).await;
                }
            }
            cycles += 1;
            self.sleeper.sleep(self.settings.poll_interval).await;
        }
    }

    /// Run one poll cycle.
    pub async fn cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let mut status = self.inspect().await?;

        if status.is_video_id_mismatch {
            warn!(
                "Page metadata is stale (video {:?}, url {:?}), reloading",
                status.video_id, status.url_video_id
            );
            self.reload_or_fallback().await?;
            return Ok(CycleOutcome::ReloadedStalePage);
        }

        if let Some(login_url) = status.login_url.clone() {
            if !self.session.asked_login {
                status = self.prompt_login(&login_url, status).await?;
            }
        }

        if !status.is_stream && !status.is_channel_page {
            self.go_to_channel_page().await?;
            return Ok(CycleOutcome::NavigatedToChannel);
        }

        if status.is_channel_page {
            return self.open_best_stream().await;
        }

        self.report_stream(&status).await
    }

    async fn inspect(&self) -> Result<StatusSnapshot, PageError> {
        let status = status::inspect(&self.page).await?;
        let url = self.page.current_url().await.ok();
        self.state.set_status(status.clone(), url).await;
        Ok(status)
    }

    /// Ask once whether to log in.  When accepted, open the login page and
    /// block until the browser is back on a listing or a stream.
    async fn prompt_login(
        &mut self,
        login_url: &str,
        status: StatusSnapshot,
    ) -> Result<StatusSnapshot, CycleError> {
        self.session.asked_login = true;
        self.state.set_login_prompted().await;
        warn!("User not logged in. Prompting in browser for login");

        if !self.page.prompt_confirm(LOGIN_PROMPT).await? {
            info!("Login declined, continuing without rewards");
            return Ok(status);
        }

        self.navigate_with_retry(login_url, NavigateOptions::default())
            .await?;
        // No upper bound; page errors do not end the wait.
        loop {
            info!("Waiting for login to complete...");
            self.sleeper.sleep(self.settings.login_poll_interval).await;
            match self.inspect().await {
                Ok(status) if status.is_channel_page || status.is_stream => {
                    info!("Login complete");
                    return Ok(status);
                }
                Ok(_) => {}
                Err(e) => warn!("Could not check the page during login ({}), still waiting", e),
            }
        }
    }

    async fn open_best_stream(&mut self) -> Result<CycleOutcome, CycleError> {
        match locator::locate(&self.page).await? {
            Some(candidate) => {
                info!(
                    "{} stream detected, redirecting...",
                    if candidate.is_live { "Live" } else { "Scheduled" }
                );
                self.navigate_with_retry(&candidate.url, NavigateOptions::default())
                    .await?;
                Ok(CycleOutcome::NavigatedToStream {
                    url: candidate.url,
                    is_live: candidate.is_live,
                })
            }
            None => {
                warn!("Could not find any streams right now");
                self.sleeper.sleep(self.settings.retry_wait).await;
                self.reload_or_fallback().await?;
                Ok(CycleOutcome::NoStreamsFound)
            }
        }
    }

    async fn report_stream(&mut self, status: &StatusSnapshot) -> Result<CycleOutcome, CycleError> {
        if status.is_stream_waiting {
            self.status_message(Level::INFO, MSG_WAITING).await;
            return Ok(CycleOutcome::StreamWaiting);
        }
        if status.is_stream_rewards {
            self.status_message(Level::INFO, MSG_REWARDS_ACTIVE).await;
            return Ok(CycleOutcome::RewardsActive);
        }

        self.status_message(Level::WARN, MSG_REWARDS_MISSING).await;
        if !self.settings.refresh_no_rewards {
            return Ok(CycleOutcome::RewardsMissing { reloaded: false });
        }
        self.sleeper.sleep(self.settings.retry_wait).await;
        self.reload_or_fallback().await?;
        Ok(CycleOutcome::RewardsMissing { reloaded: true })
    }

    async fn status_message(&mut self, level: Level, message: &str) {
        if self.session.status_log.emit(level, message) {
            self.state.set_status_message(message).await;
        }
    }

    async fn go_to_channel_page(&self) -> Result<(), PageError> {
        let url = self.settings.streams_page();
        warn!("No live stream detected, going to channel {}", url);
        self.navigate_with_retry(&url, NavigateOptions::dom_content_loaded())
            .await
    }

    /// Navigate, retrying immediately up to `max_navigation_retries` times.
    async fn navigate_with_retry(&self, url: &str, options: NavigateOptions) -> Result<(), PageError> {
        let mut retries = 0u32;
        loop {
            match self.page.navigate(url, options).await {
                Ok(()) => return Ok(()),
                Err(e) if retries < self.settings.max_navigation_retries => {
                    retries += 1;
                    warn!(
                        "Navigation to {} failed ({}), retry {}/{}",
                        url, e, retries, self.settings.max_navigation_retries
                    );
                }
                Err(e) => {
                    error!("Navigation to {} failed after {} retries: {}", url, retries, e);
                    return Err(e);
                }
            }
        }
    }

    /// Reload once; on failure go to the channel page instead.
    async fn reload_or_fallback(&self) -> Result<(), PageError> {
        match self.page.reload().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Reload failed ({}), falling back to the channel page", e);
                self.go_to_channel_page().await
            }
        }
    }
}
