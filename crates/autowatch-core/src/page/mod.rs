//! The browser page as seen by the watch loop.
//!
//! Everything the inspector, locator and controller do to the browser goes
//! through [`Page`].  The daemon implements it on top of a WebDriver session;
//! [`DocumentPage`] implements it over static HTML for tests and offline runs.

mod document;

pub use document::{DocumentElement, DocumentPage};

use async_trait::async_trait;
use url::Url;

use crate::error::PageError;

/// How long `navigate` waits before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// `DOMContentLoaded` fired; subresources may still be loading.
    DomContentLoaded,
    /// Full `load` event.
    #[default]
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
}

impl NavigateOptions {
    pub fn dom_content_loaded() -> Self {
        Self {
            wait_until: WaitUntil::DomContentLoaded,
        }
    }
}

#[async_trait]
pub trait Page: Send + Sync {
    /// Opaque handle to an element of the currently loaded document.  Handles
    /// are only meaningful until the next navigation or reload.
    type Element: Clone + Send + Sync;

    async fn query_element(&self, selector: &str) -> Result<Option<Self::Element>, PageError>;

    async fn query_all_elements(&self, selector: &str) -> Result<Vec<Self::Element>, PageError>;

    /// Rendered text of the element, one line per block.
    async fn read_text(&self, element: &Self::Element) -> Result<String, PageError>;

    async fn read_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, PageError>;

    /// Lower-case tag name.
    async fn tag_name(&self, element: &Self::Element) -> Result<String, PageError>;

    async fn parent(&self, element: &Self::Element) -> Result<Option<Self::Element>, PageError>;

    async fn is_visible(&self, element: &Self::Element) -> Result<bool, PageError>;

    async fn current_url(&self) -> Result<String, PageError>;

    async fn navigate(&self, url: &str, options: NavigateOptions) -> Result<(), PageError>;

    async fn reload(&self) -> Result<(), PageError>;

    /// Ask the person at the browser a yes/no question.
    async fn prompt_confirm(&self, message: &str) -> Result<bool, PageError>;
}

/// Walk from `element` (inclusive) up the ancestor chain and return the first
/// element whose tag name satisfies `predicate`.
pub async fn resolve_enclosing<P, F>(
    page: &P,
    element: &P::Element,
    predicate: F,
) -> Result<Option<P::Element>, PageError>
where
    P: Page + ?Sized,
    F: Fn(&str) -> bool + Send,
{
    let mut current = Some(element.clone());
    while let Some(el) = current {
        let tag = page.tag_name(&el).await?;
        if predicate(&tag) {
            return Ok(Some(el));
        }
        current = page.parent(&el).await?;
    }
    Ok(None)
}

/// Absolute URL of the nearest `<a href>` at or above `element`.
pub async fn resolve_enclosing_link<P>(
    page: &P,
    element: &P::Element,
) -> Result<Option<String>, PageError>
where
    P: Page + ?Sized,
{
    let Some(anchor) = resolve_enclosing(page, element, |tag| tag == "a").await? else {
        return Ok(None);
    };
    let Some(href) = page.read_attribute(&anchor, "href").await? else {
        return Ok(None);
    };
    let base = page.current_url().await?;
    Ok(resolve_url(&base, &href))
}

/// Resolve a possibly relative `href` against `base`.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(_) => Url::parse(base)
            .and_then(|b| b.join(href))
            .ok()
            .map(|u| u.to_string()),
    }
}

/// Value of the `v` query parameter, e.g. the id in `/watch?v=abc123`.
pub fn url_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|v| !v.is_empty())
}
