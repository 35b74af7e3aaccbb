//! Pick the stream to open from a channel's listing page.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CycleError;
use crate::page::{resolve_enclosing, resolve_enclosing_link, Page};

pub const LIVE_MARKER: &str = "[overlay-style=LIVE]";
pub const UPCOMING_MARKER: &str = "[overlay-style=UPCOMING]";

/// Containers a listing uses for one video entry.
const VIDEO_CARD_TAGS: &[&str] = &[
    "ytd-rich-item-renderer",
    "ytd-grid-video-renderer",
    "ytd-video-renderer",
];

const PREMIERE_PREFIX: &str = "Premieres ";

const DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%y, %I:%M %p",
    "%m/%d/%Y, %I:%M %p",
    "%b %d, %Y, %I:%M %p",
    "%B %d, %Y, %I:%M %p",
];

const DATE_FORMATS: &[&str] = &["%b %d, %Y", "%B %d, %Y", "%m/%d/%y", "%Y-%m-%d"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCandidate {
    pub url: String,
    pub is_live: bool,
}

/// Find the stream worth opening: anything live, else the soonest premiere.
pub async fn locate<P>(page: &P) -> Result<Option<StreamCandidate>, CycleError>
where
    P: Page + ?Sized,
{
    debug!("finding livestreams...");

    for live in page.query_all_elements(LIVE_MARKER).await? {
        match resolve_enclosing_link(page, &live).await? {
            Some(url) => {
                let candidate = StreamCandidate { url, is_live: true };
                debug!(?candidate, "live stream found");
                return Ok(Some(candidate));
            }
            None => debug!("skipping live marker without an enclosing link"),
        }
    }

    let mut scheduled: Vec<(NaiveDateTime, String)> = Vec::new();
    for marker in page.query_all_elements(UPCOMING_MARKER).await? {
        let card = resolve_enclosing(page, &marker, |tag| VIDEO_CARD_TAGS.contains(&tag))
            .await?
            .ok_or_else(|| {
                CycleError::Structural("upcoming stream marker outside of a video card".to_string())
            })?;

        let text = page.read_text(&card).await?;
        let Some(starts_at) = schedule_line(&text).and_then(parse_premiere) else {
            debug!("skipping upcoming stream without a readable schedule");
            continue;
        };
        let Some(url) = resolve_enclosing_link(page, &marker).await? else {
            debug!("skipping upcoming stream without a link");
            continue;
        };
        scheduled.push((starts_at, url));
    }

    scheduled.sort_by_key(|(starts_at, _)| *starts_at);

    let candidate = scheduled
        .into_iter()
        .next()
        .map(|(_, url)| StreamCandidate { url, is_live: false });
    debug!(?candidate, "scheduled stream search done");
    Ok(candidate)
}

/// The line of a card's text that announces the premiere.
fn schedule_line(card_text: &str) -> Option<&str> {
    card_text.lines().find(|line| line.contains(PREMIERE_PREFIX))
}

/// Parse the date following `Premieres ` in a schedule line.  Date-only values
/// resolve to midnight.
pub fn parse_premiere(line: &str) -> Option<NaiveDateTime> {
    let normalised = line.replace(['\u{a0}', '\u{202f}'], " ");
    let (_, rest) = normalised.split_once(PREMIERE_PREFIX)?;
    let rest = rest.trim();

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(rest, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(rest, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_parse_premiere_dates() {
        assert_eq!(parse_premiere("Premieres Jan 5, 2025"), Some(date(2025, 1, 5)));
        assert_eq!(parse_premiere("Premieres January 15, 2025"), Some(date(2025, 1, 15)));
        assert_eq!(parse_premiere("Premieres 2025-03-01"), Some(date(2025, 3, 1)));
    }

    #[test]
    fn test_parse_premiere_with_time() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 5)
            .and_then(|d| d.and_hms_opt(19, 0, 0))
            .unwrap();
        assert_eq!(parse_premiere("Premieres 1/5/25, 7:00 PM"), Some(expected));
        assert_eq!(parse_premiere("Premieres 1/5/25, 7:00\u{202f}PM"), Some(expected));
        assert_eq!(parse_premiere("Premieres Jan 5, 2025, 7:00 PM"), Some(expected));
    }

    #[test]
    fn test_parse_premiere_rejects_relative_and_garbage() {
        assert_eq!(parse_premiere("Premieres in 3 hours"), None);
        assert_eq!(parse_premiere("Scheduled for Jan 5, 2025"), None);
        assert_eq!(parse_premiere("Premieres "), None);
    }

    #[test]
    fn test_schedule_line_picks_premiere_line() {
        let text = "Weekly stream\n12 waiting\nPremieres Jan 3, 2025\nDetails";
        assert_eq!(schedule_line(text), Some("Premieres Jan 3, 2025"));
        assert_eq!(schedule_line("Weekly stream\n12 waiting"), None);
    }
}
