use async_trait::async_trait;
use autowatch_core::page::{NavigateOptions, Page, WaitUntil};
use autowatch_core::PageError;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, Locator};
use serde_json::Value;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

/// Global the confirm dialog writes its answer into.
const CONFIRM_RESULT_VAR: &str = "__autowatchConfirm";

const DIALOG_POLL: Duration = Duration::from_millis(250);
const READY_STATE_POLL: Duration = Duration::from_millis(100);

/// `Page` backed by a live WebDriver session.
#[derive(Clone)]
pub struct WebDriverPage {
    client: Client,
    page_load_timeout: Duration,
}

impl WebDriverPage {
    pub fn new(client: Client, page_load_timeout: Duration) -> Self {
        Self {
            client,
            page_load_timeout,
        }
    }

    async fn wait_for_load(&self, url: &str) -> Result<(), PageError> {
        let deadline = Instant::now() + self.page_load_timeout;
        loop {
            let state = self
                .client
                .execute("return document.readyState;", vec![])
                .await
                .map_err(driver_error)?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PageError::Timeout(format!(
                    "{} did not finish loading within {:?}",
                    url, self.page_load_timeout
                )));
            }
            sleep(READY_STATE_POLL).await;
        }
    }
}

fn driver_error(e: CmdError) -> PageError {
    PageError::Driver(e.to_string())
}

/// Interpret the confirm answer variable: `None` while the dialog has not
/// been answered yet.  A lost answer counts as declined.
fn confirm_answer(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(answer) => Some(*answer),
        _ => Some(false),
    }
}

fn missing_as_none<T>(result: Result<T, CmdError>) -> Result<Option<T>, PageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_no_such_element() => Ok(None),
        Err(e) => Err(driver_error(e)),
    }
}

#[async_trait]
impl Page for WebDriverPage {
    type Element = Element;

    async fn query_element(&self, selector: &str) -> Result<Option<Element>, PageError> {
        missing_as_none(self.client.find(Locator::Css(selector)).await)
    }

    async fn query_all_elements(&self, selector: &str) -> Result<Vec<Element>, PageError> {
        self.client
            .find_all(Locator::Css(selector))
            .await
            .map_err(driver_error)
    }

    async fn read_text(&self, element: &Element) -> Result<String, PageError> {
        element.text().await.map_err(driver_error)
    }

    async fn read_attribute(&self, element: &Element, name: &str) -> Result<Option<String>, PageError> {
        element.attr(name).await.map_err(driver_error)
    }

    async fn tag_name(&self, element: &Element) -> Result<String, PageError> {
        element
            .tag_name()
            .await
            .map(|t| t.to_ascii_lowercase())
            .map_err(driver_error)
    }

    async fn parent(&self, element: &Element) -> Result<Option<Element>, PageError> {
        // The root element's parent is the document, which XPath cannot return
        // as an element.
        if self.tag_name(element).await? == "html" {
            return Ok(None);
        }
        missing_as_none(element.find(Locator::XPath("..")).await)
    }

    async fn is_visible(&self, element: &Element) -> Result<bool, PageError> {
        element.is_displayed().await.map_err(driver_error)
    }

    async fn current_url(&self) -> Result<String, PageError> {
        self.client
            .current_url()
            .await
            .map(|url| url.to_string())
            .map_err(driver_error)
    }

    async fn navigate(&self, url: &str, options: NavigateOptions) -> Result<(), PageError> {
        // The session's eager load strategy returns at DOMContentLoaded.
        self.client
            .goto(url)
            .await
            .map_err(|e| PageError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if options.wait_until == WaitUntil::Load {
            self.wait_for_load(url).await?;
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), PageError> {
        self.client.refresh().await.map_err(driver_error)?;
        let url = self.current_url().await?;
        self.wait_for_load(&url).await
    }

    async fn prompt_confirm(&self, message: &str) -> Result<bool, PageError> {
        // `confirm` blocks the page's script thread, so it is opened from a
        // timer and the answer is read back once the dialog is gone.
        let open = format!(
            "var message = arguments[0]; window.{var} = null; \
             setTimeout(function () {{ window.{var} = window.confirm(message); }}, 0);",
            var = CONFIRM_RESULT_VAR
        );
        self.client
            .execute(&open, vec![Value::String(message.to_string())])
            .await
            .map_err(driver_error)?;

        // `null` until the dialog is answered; gone entirely if the page
        // navigated away underneath it.
        let read = format!(
            "return window.{var} === undefined ? 'gone' : window.{var};",
            var = CONFIRM_RESULT_VAR
        );
        loop {
            sleep(DIALOG_POLL).await;
            if self.client.get_alert_text().await.is_ok() {
                continue;
            }
            match self.client.execute(&read, vec![]).await {
                Ok(value) => {
                    if let Some(answer) = confirm_answer(&value) {
                        debug!(?value, answer, "confirm dialog closed");
                        return Ok(answer);
                    }
                }
                Err(e) => {
                    // The dialog may have opened between the two calls
                    if self.client.get_alert_text().await.is_err() {
                        return Err(driver_error(e));
                    }
                }
            }
        }
    }
}
