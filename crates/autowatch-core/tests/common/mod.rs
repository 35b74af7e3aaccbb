#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autowatch_core::config::WatchSettings;
use autowatch_core::page::DocumentPage;
use autowatch_core::state::StateManager;
use autowatch_core::{Controller, Sleeper};

pub const CHANNEL: &str = "https://www.youtube.com/@testchannel";
pub const STREAMS: &str = "https://www.youtube.com/@testchannel/streams";
pub const LOGIN_URL: &str = "https://accounts.google.com/ServiceLogin?service=youtube";

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// One entry on the fake listing page.
pub enum Card<'a> {
    Live(&'a str),
    /// Upcoming entry with an optional schedule line.
    Upcoming(&'a str, Option<&'a str>),
    /// Upcoming marker that is not wrapped in a video card.
    LooseUpcoming(&'a str),
}

pub fn listing(cards: &[Card<'_>], logged_in: bool) -> String {
    let mut body = String::new();
    for card in cards {
        let entry = match card {
            Card::Live(id) => format!(
                r#"<ytd-rich-item-renderer>
                     <a id="thumbnail" href="/watch?v={id}">
                       <div id="overlays"><span overlay-style="LIVE">LIVE</span></div>
                     </a>
                     <div id="details"><span>Now streaming</span></div>
                   </ytd-rich-item-renderer>"#
            ),
            Card::Upcoming(id, schedule) => format!(
                r#"<ytd-rich-item-renderer>
                     <a id="thumbnail" href="/watch?v={id}">
                       <div id="overlays"><span overlay-style="UPCOMING">UPCOMING</span></div>
                     </a>
                     <div id="metadata-line"><span>12 waiting</span><span>{}</span></div>
                   </ytd-rich-item-renderer>"#,
                schedule.unwrap_or("")
            ),
            Card::LooseUpcoming(id) => format!(
                r#"<a href="/watch?v={id}"><span overlay-style="UPCOMING">UPCOMING</span></a>"#
            ),
        };
        body.push_str(&entry);
    }

    format!(
        r#"<html><head><title>Test Channel - YouTube</title></head><body>
             {masthead}
             <div id="channel-container"><h1>Test Channel</h1></div>
             <div id="contents">{body}</div>
           </body></html>"#,
        masthead = masthead(logged_in),
    )
}

pub struct WatchPage<'a> {
    pub video_id: &'a str,
    pub meta_video_id: Option<&'a str>,
    pub waiting: bool,
    pub rewards: Option<&'a str>,
    pub replay: bool,
    pub logged_in: bool,
}

impl<'a> WatchPage<'a> {
    pub fn live(video_id: &'a str) -> Self {
        Self {
            video_id,
            meta_video_id: Some(video_id),
            waiting: false,
            rewards: Some("CONNECTED"),
            replay: false,
            logged_in: true,
        }
    }

    pub fn html(&self) -> String {
        let identifier = self
            .meta_video_id
            .map(|id| format!(r#"<meta itemprop="identifier" content="{id}">"#))
            .unwrap_or_default();
        let end_date = if self.replay {
            r#"<meta itemprop="endDate" content="2024-06-01T20:00:00+00:00">"#
        } else {
            ""
        };
        let badge_style = if self.waiting { r#" style="display: none""# } else { "" };
        let slate = if self.waiting {
            r#"<div class="ytp-offline-slate"><span>Waiting for Test Channel</span></div>"#
        } else {
            ""
        };
        let rewards = self
            .rewards
            .map(|text| {
                format!(r#"<div class="ytd-account-link-button-renderer"><span>{text}</span></div>"#)
            })
            .unwrap_or_default();

        format!(
            r#"<html><head>{identifier}</head><body>
                 {masthead}
                 <div id="player">
                   <div class="ytp-live-badge"{badge_style}>LIVE</div>
                   {slate}
                 </div>
                 <span itemprop="publication">
                   <meta itemprop="isLiveBroadcast" content="True">
                   <meta itemprop="startDate" content="2024-06-01T18:00:00+00:00">
                   {end_date}
                 </span>
                 {rewards}
               </body></html>"#,
            masthead = masthead(self.logged_in),
        )
    }
}

fn masthead(logged_in: bool) -> String {
    if logged_in {
        r#"<div id="masthead"><button id="avatar-btn">Me</button></div>"#.to_string()
    } else {
        format!(r#"<div id="masthead"><a href="{LOGIN_URL}">Sign in</a></div>"#)
    }
}

type SleepHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Records every requested sleep and returns immediately.  The optional hook
/// runs with the 1-based sleep count, letting a test change the page "while"
/// the controller waits.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
    hook: Option<SleepHook>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        Self {
            slept: Arc::default(),
            hook: Some(Arc::new(hook)),
        }
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut slept = self.slept.lock().unwrap();
            slept.push(duration);
            slept.len()
        };
        if let Some(hook) = &self.hook {
            hook(count);
        }
    }
}

pub fn settings() -> WatchSettings {
    WatchSettings::new(CHANNEL)
}

pub fn controller(
    page: &DocumentPage,
    settings: WatchSettings,
    sleeper: &RecordingSleeper,
) -> (Controller<DocumentPage, RecordingSleeper>, Arc<StateManager>) {
    let state = Arc::new(StateManager::new(settings.channel_page.clone()));
    let controller = Controller::new(page.clone(), settings, sleeper.clone(), state.clone());
    (controller, state)
}

/// Page showing `url`, served from `html`.
pub fn page_at(url: &str, html: &str) -> DocumentPage {
    let page = DocumentPage::new().with_route(url, html);
    page.open(url);
    page
}
