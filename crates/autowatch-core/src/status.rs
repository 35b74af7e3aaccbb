//! Page classification.
//!
//! [`inspect`] looks at whatever the browser currently shows and reports it
//! as a [`StatusSnapshot`].  Missing elements read as "not present"; only
//! driver failures are errors.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PageError;
use crate::page::{self, Page};

/// Landmark present on a channel's video/stream listing.
pub const CHANNEL_CONTAINER: &str = "#channel-container";
/// Broadcast metadata, present on live and replayed streams.
pub const LIVE_BROADCAST_META: &str = r#"meta[itemprop="isLiveBroadcast"]"#;
/// Only replays (finished broadcasts) carry an end date.
pub const BROADCAST_END_META: &str = r#"meta[itemprop="endDate"]"#;
/// Player "LIVE" badge; rendered but hidden until the broadcast starts.
pub const LIVE_BADGE: &str = ".ytp-live-badge";
/// Premiere / offline countdown overlay in the player.
pub const OFFLINE_SLATE: &str = ".ytp-offline-slate";
/// Rewards account-link button.
pub const REWARDS_INDICATOR: &str = ".ytd-account-link-button-renderer";
/// Sign-in link in the masthead, only rendered for logged-out viewers.
pub const SIGN_IN_LINK: &str = r#"#masthead a[href*="ServiceLogin"]"#;
/// Video id embedded in the watch page metadata.
pub const VIDEO_ID_META: &str = r#"meta[itemprop="identifier"]"#;

const REWARDS_CONNECTED: &str = "CONNECTED";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub is_channel_page: bool,
    pub is_stream: bool,
    pub is_stream_waiting: bool,
    pub is_stream_rewards: bool,
    pub login_url: Option<String>,
    pub video_id: Option<String>,
    pub url_video_id: Option<String>,
    /// Page metadata lags behind a client-side navigation.
    pub is_video_id_mismatch: bool,
}

impl StatusSnapshot {
    /// Set both ids and recompute `is_video_id_mismatch`.
    pub fn with_video_ids(mut self, video_id: Option<String>, url_video_id: Option<String>) -> Self {
        self.is_video_id_mismatch = video_ids_differ(video_id.as_deref(), url_video_id.as_deref());
        self.video_id = video_id;
        self.url_video_id = url_video_id;
        self
    }
}

/// True only when both ids are known and disagree.
pub fn video_ids_differ(video_id: Option<&str>, url_video_id: Option<&str>) -> bool {
    match (video_id, url_video_id) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => a != b,
        _ => false,
    }
}

pub async fn inspect<P>(page: &P) -> Result<StatusSnapshot, PageError>
where
    P: Page + ?Sized,
{
    let is_channel_page = page.query_element(CHANNEL_CONTAINER).await?.is_some();
    let is_stream = detect_active_stream(page).await?;
    let is_stream_waiting = detect_waiting(page).await?;
    let is_stream_rewards = detect_rewards(page).await?;
    let login_url = detect_login_url(page).await?;

    let video_id = match page.query_element(VIDEO_ID_META).await? {
        Some(meta) => page
            .read_attribute(&meta, "content")
            .await?
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
        None => None,
    };
    let url_video_id = page::url_video_id(&page.current_url().await?);

    let snapshot = StatusSnapshot {
        is_channel_page,
        is_stream,
        is_stream_waiting,
        is_stream_rewards,
        login_url,
        ..StatusSnapshot::default()
    }
    .with_video_ids(video_id, url_video_id);

    debug!(?snapshot, "status checked");
    Ok(snapshot)
}

async fn detect_active_stream<P>(page: &P) -> Result<bool, PageError>
where
    P: Page + ?Sized,
{
    if page.query_element(LIVE_BROADCAST_META).await?.is_none() {
        return Ok(false);
    }
    Ok(page.query_element(BROADCAST_END_META).await?.is_none())
}

async fn detect_waiting<P>(page: &P) -> Result<bool, PageError>
where
    P: Page + ?Sized,
{
    if let Some(badge) = page.query_element(LIVE_BADGE).await? {
        if !page.is_visible(&badge).await? {
            return Ok(true);
        }
    }
    match page.query_element(OFFLINE_SLATE).await? {
        Some(slate) => page.is_visible(&slate).await,
        None => Ok(false),
    }
}

async fn detect_rewards<P>(page: &P) -> Result<bool, PageError>
where
    P: Page + ?Sized,
{
    match page.query_element(REWARDS_INDICATOR).await? {
        Some(indicator) => {
            let text = page.read_text(&indicator).await?;
            Ok(text.trim().to_uppercase() == REWARDS_CONNECTED)
        }
        None => Ok(false),
    }
}

async fn detect_login_url<P>(page: &P) -> Result<Option<String>, PageError>
where
    P: Page + ?Sized,
{
    let Some(link) = page.query_element(SIGN_IN_LINK).await? else {
        return Ok(None);
    };
    let Some(href) = page.read_attribute(&link, "href").await? else {
        return Ok(None);
    };
    let base = page.current_url().await?;
    Ok(page::resolve_url(&base, &href))
}
