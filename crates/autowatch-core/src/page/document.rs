use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{NavigateOptions, Page};
use crate::error::PageError;

const BLANK_DOCUMENT: &str = "<html><head></head><body></body></html>";

/// Handle into a `DocumentPage`: the element's position in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentElement(usize);

#[derive(Debug)]
struct DocumentState {
    url: String,
    html: String,
    routes: HashMap<String, String>,
    navigations: Vec<String>,
    reloads: usize,
    prompts: Vec<String>,
    confirm_answer: bool,
    failing_navigations: usize,
    failing_reloads: usize,
    failing_queries: usize,
}

impl Default for DocumentState {
    fn default() -> Self {
        Self {
            url: "about:blank".to_string(),
            html: BLANK_DOCUMENT.to_string(),
            routes: HashMap::new(),
            navigations: Vec::new(),
            reloads: 0,
            prompts: Vec::new(),
            confirm_answer: false,
            failing_navigations: 0,
            failing_reloads: 0,
            failing_queries: 0,
        }
    }
}

/// A `Page` over static HTML.
///
/// URLs map to documents through a route table; navigating to an unknown URL
/// loads a blank document.  Clones share state, so a test can keep a handle,
/// swap routes while the controller runs, and inspect what was visited.
/// Styles are not evaluated: an element counts as hidden when it or an
/// ancestor carries `hidden` or an inline `display: none`.
#[derive(Debug, Clone, Default)]
pub struct DocumentPage {
    state: Arc<Mutex<DocumentState>>,
}

impl DocumentPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.set_route(url, html);
        self
    }

    /// Add or replace the document served for `url`.  Takes effect on the
    /// next navigation or reload.
    pub fn set_route(&self, url: impl Into<String>, html: impl Into<String>) {
        self.lock().routes.insert(url.into(), html.into());
    }

    /// Show `url` without recording a navigation.
    pub fn open(&self, url: &str) {
        let mut state = self.lock();
        let html = state
            .routes
            .get(url)
            .cloned()
            .unwrap_or_else(|| BLANK_DOCUMENT.to_string());
        state.html = html;
        state.url = url.to_string();
    }

    pub fn answer_confirm(&self, answer: bool) {
        self.lock().confirm_answer = answer;
    }

    pub fn fail_next_navigations(&self, count: usize) {
        self.lock().failing_navigations = count;
    }

    pub fn fail_next_reloads(&self, count: usize) {
        self.lock().failing_reloads = count;
    }

    /// Fail the next `count` element queries with a driver error.
    pub fn fail_next_queries(&self, count: usize) {
        self.lock().failing_queries = count;
    }

    /// Every navigation attempt, failed ones included.
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    /// Successful and failed reload attempts.
    pub fn reload_count(&self) -> usize {
        self.lock().reloads
    }

    pub fn prompts(&self) -> Vec<String> {
        self.lock().prompts.clone()
    }

    pub fn url(&self) -> String {
        self.lock().url.clone()
    }

    fn lock(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_query_failure(&self) -> Result<(), PageError> {
        let mut state = self.lock();
        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(PageError::Driver("no such window".to_string()));
        }
        Ok(())
    }

    /// Parse the current document and run `f` against it.  Parsing is
    /// deterministic, so handles stay valid across calls on the same document.
    fn with_document<R>(&self, f: impl FnOnce(&Html) -> R) -> R {
        let html = self.lock().html.clone();
        let document = Html::parse_document(&html);
        f(&document)
    }
}

fn elements(document: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    document.tree.root().descendants().filter_map(ElementRef::wrap)
}

fn element_at(document: &Html, handle: DocumentElement) -> Result<ElementRef<'_>, PageError> {
    elements(document)
        .nth(handle.0)
        .ok_or_else(|| PageError::Driver("stale element reference".to_string()))
}

fn handle_of(document: &Html, element: ElementRef<'_>) -> Option<DocumentElement> {
    elements(document)
        .position(|e| e.id() == element.id())
        .map(DocumentElement)
}

fn parse_selector(selector: &str) -> Result<Selector, PageError> {
    Selector::parse(selector).map_err(|_| PageError::Selector(selector.to_string()))
}

fn rendered_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_rendered(element: ElementRef<'_>) -> bool {
    std::iter::successors(Some(element), |e| e.parent().and_then(ElementRef::wrap)).all(|e| {
        let el = e.value();
        let display_none = el
            .attr("style")
            .map(|s| s.replace(char::is_whitespace, "").contains("display:none"))
            .unwrap_or(false);
        el.attr("hidden").is_none() && !display_none
    })
}

#[async_trait]
impl Page for DocumentPage {
    type Element = DocumentElement;

    async fn query_element(&self, selector: &str) -> Result<Option<DocumentElement>, PageError> {
        self.take_query_failure()?;
        let selector = parse_selector(selector)?;
        Ok(self.with_document(|doc| {
            doc.select(&selector)
                .next()
                .and_then(|el| handle_of(doc, el))
        }))
    }

    async fn query_all_elements(&self, selector: &str) -> Result<Vec<DocumentElement>, PageError> {
        self.take_query_failure()?;
        let selector = parse_selector(selector)?;
        Ok(self.with_document(|doc| {
            doc.select(&selector)
                .filter_map(|el| handle_of(doc, el))
                .collect()
        }))
    }

    async fn read_text(&self, element: &DocumentElement) -> Result<String, PageError> {
        self.with_document(|doc| element_at(doc, *element).map(rendered_text))
    }

    async fn read_attribute(
        &self,
        element: &DocumentElement,
        name: &str,
    ) -> Result<Option<String>, PageError> {
        self.with_document(|doc| {
            element_at(doc, *element).map(|el| el.value().attr(name).map(str::to_string))
        })
    }

    async fn tag_name(&self, element: &DocumentElement) -> Result<String, PageError> {
        self.with_document(|doc| {
            element_at(doc, *element).map(|el| el.value().name().to_ascii_lowercase())
        })
    }

    async fn parent(&self, element: &DocumentElement) -> Result<Option<DocumentElement>, PageError> {
        self.with_document(|doc| {
            let el = element_at(doc, *element)?;
            Ok(el
                .parent()
                .and_then(ElementRef::wrap)
                .and_then(|p| handle_of(doc, p)))
        })
    }

    async fn is_visible(&self, element: &DocumentElement) -> Result<bool, PageError> {
        self.with_document(|doc| element_at(doc, *element).map(is_rendered))
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.url())
    }

    async fn navigate(&self, url: &str, _options: NavigateOptions) -> Result<(), PageError> {
        let mut state = self.lock();
        state.navigations.push(url.to_string());
        if state.failing_navigations > 0 {
            state.failing_navigations -= 1;
            debug!("document page: failing navigation to {}", url);
            return Err(PageError::Timeout(format!(
                "navigation to {} exceeded the page load timeout",
                url
            )));
        }
        let html = state
            .routes
            .get(url)
            .cloned()
            .unwrap_or_else(|| BLANK_DOCUMENT.to_string());
        state.html = html;
        state.url = url.to_string();
        Ok(())
    }

    async fn reload(&self) -> Result<(), PageError> {
        let mut state = self.lock();
        state.reloads += 1;
        if state.failing_reloads > 0 {
            state.failing_reloads -= 1;
            return Err(PageError::Timeout("reload exceeded the page load timeout".to_string()));
        }
        let reloaded = state.routes.get(&state.url).cloned();
        if let Some(html) = reloaded {
            state.html = html;
        }
        Ok(())
    }

    async fn prompt_confirm(&self, message: &str) -> Result<bool, PageError> {
        let mut state = self.lock();
        state.prompts.push(message.to_string());
        Ok(state.confirm_answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{resolve_enclosing, resolve_enclosing_link};

    const LISTING: &str = r#"
        <html><body>
          <div id="contents">
            <ytd-rich-item-renderer>
              <a id="thumbnail" href="/watch?v=live1">
                <div><span overlay-style="LIVE">LIVE</span></div>
              </a>
            </ytd-rich-item-renderer>
            <p hidden><span class="ghost">gone</span></p>
            <p style="display : none">nope</p>
          </div>
        </body></html>
    "#;

    fn page() -> DocumentPage {
        let page = DocumentPage::new().with_route("https://yt.test/@chan/streams", LISTING);
        page.open("https://yt.test/@chan/streams");
        page
    }

    #[tokio::test]
    async fn test_query_and_walk() {
        let page = page();
        let live = page
            .query_element("[overlay-style=LIVE]")
            .await
            .unwrap()
            .expect("live marker");
        assert_eq!(page.tag_name(&live).await.unwrap(), "span");
        assert_eq!(page.read_text(&live).await.unwrap(), "LIVE");

        let card = resolve_enclosing(&page, &live, |t| t == "ytd-rich-item-renderer")
            .await
            .unwrap();
        assert!(card.is_some());

        let link = resolve_enclosing_link(&page, &live).await.unwrap();
        assert_eq!(link.as_deref(), Some("https://yt.test/watch?v=live1"));

        let missing = resolve_enclosing(&page, &live, |t| t == "table").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_visibility_follows_ancestors() {
        let page = page();
        let ghost = page.query_element(".ghost").await.unwrap().unwrap();
        assert!(!page.is_visible(&ghost).await.unwrap());

        let paragraphs = page.query_all_elements("p").await.unwrap();
        assert_eq!(paragraphs.len(), 2);
        assert!(!page.is_visible(&paragraphs[1]).await.unwrap());

        let live = page.query_element("[overlay-style=LIVE]").await.unwrap().unwrap();
        assert!(page.is_visible(&live).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_selector() {
        let err = page().query_element("[[nope").await.unwrap_err();
        assert!(matches!(err, PageError::Selector(_)));
    }

    #[tokio::test]
    async fn test_query_failures() {
        let page = page();
        page.fail_next_queries(1);
        let err = page.query_element("span").await.unwrap_err();
        assert!(matches!(err, PageError::Driver(_)));
        assert!(page.query_element("span").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_navigation_failures_and_routes() {
        let page = page();
        page.fail_next_navigations(1);
        assert!(page
            .navigate("https://yt.test/x", NavigateOptions::default())
            .await
            .is_err());
        assert_eq!(page.url(), "https://yt.test/@chan/streams");

        page.navigate("https://yt.test/x", NavigateOptions::default())
            .await
            .unwrap();
        assert_eq!(page.url(), "https://yt.test/x");
        assert!(page.query_element("span").await.unwrap().is_none());
        assert_eq!(page.navigations().len(), 2);

        page.set_route("https://yt.test/x", "<html><body><span>hi</span></body></html>");
        page.reload().await.unwrap();
        assert!(page.query_element("span").await.unwrap().is_some());
        assert_eq!(page.reload_count(), 1);
    }
}
