/// Browser session management.
///
/// ```text
///   BrowserDriver::launch()
///         │
///         ├── connect(webdriver url) ──► ok ──────────────────────────┐
///         │                                                           │
///         └── refused + spawn enabled ──► chromedriver --port=<port>  │
///                                         wait until it accepts ──────┤
///                                                                     ▼
///                                                      fantoccini::Client (session)
/// ```
///
/// The session runs the user's browser binary against their own profile so
/// that an existing login carries over.
use anyhow::Context;
use autowatch_core::config::LaunchSettings;
use autowatch_core::platform;
use fantoccini::wd::TimeoutConfiguration;
use fantoccini::{Client, ClientBuilder};
use serde_json::{json, Map, Value};
use tokio::process::{Child, Command};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_WEBDRIVER_PORT: u16 = 9515;

pub struct BrowserDriver {
    client: Client,
    chromedriver: Option<Child>,
}

impl BrowserDriver {
    /// Open a browser session, starting chromedriver first when nothing is
    /// listening at the configured URL.
    pub async fn launch(settings: &LaunchSettings) -> anyhow::Result<Self> {
        let capabilities = capabilities(settings);

        match connect(&settings.webdriver_url, capabilities.clone()).await {
            Ok(client) => {
                info!("browser: attached to WebDriver at {}", settings.webdriver_url);
                return Self::ready(client, None, settings).await;
            }
            Err(e) if !settings.spawn_webdriver => {
                return Err(e).with_context(|| {
                    format!(
                        "Could not reach WebDriver at {}. Start chromedriver or enable webdriver.spawn",
                        settings.webdriver_url
                    )
                });
            }
            Err(e) => debug!("browser: no WebDriver yet ({:#}), spawning chromedriver", e),
        }

        let mut child = spawn_chromedriver(settings)?;

        // Wait for chromedriver to accept sessions
        let mut last_error = None;
        for _ in 0..50 {
            sleep(Duration::from_millis(100)).await;
            if let Ok(Some(status)) = child.try_wait() {
                anyhow::bail!("chromedriver exited during startup ({})", status);
            }
            match connect(&settings.webdriver_url, capabilities.clone()).await {
                Ok(client) => {
                    info!("browser: session started via spawned chromedriver");
                    return Self::ready(client, Some(child), settings).await;
                }
                Err(e) => last_error = Some(e),
            }
        }

        let _ = child.kill().await;
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no connection attempt made")))
            .context("chromedriver did not accept a session. Close other windows using the profile and check the browser/driver versions match")
    }

    async fn ready(
        client: Client,
        chromedriver: Option<Child>,
        settings: &LaunchSettings,
    ) -> anyhow::Result<Self> {
        let timeouts = TimeoutConfiguration::new(None, Some(settings.page_load_timeout), None);
        if let Err(e) = client.update_timeouts(timeouts).await {
            warn!("browser: could not set page load timeout: {}", e);
        }
        Ok(Self {
            client,
            chromedriver,
        })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// End the session and stop chromedriver if we started it.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.client.clone().close().await {
            warn!("browser: failed to close session: {}", e);
        }
        if let Some(mut child) = self.chromedriver.take() {
            let _ = child.kill().await;
        }
        info!("browser: shut down");
    }
}

async fn connect(webdriver_url: &str, capabilities: Map<String, Value>) -> anyhow::Result<Client> {
    let client = ClientBuilder::native()
        .capabilities(capabilities)
        .connect(webdriver_url)
        .await?;
    Ok(client)
}

fn spawn_chromedriver(settings: &LaunchSettings) -> anyhow::Result<Child> {
    let binary = settings
        .chromedriver_path
        .clone()
        .or_else(platform::find_chromedriver_binary)
        .ok_or_else(|| anyhow::anyhow!("chromedriver binary not found. Install it or set CHROMEDRIVER_PATH"))?;
    let port = webdriver_port(&settings.webdriver_url)?;

    info!("browser: spawning {:?} on port {}", binary, port);
    let child = Command::new(&binary)
        .arg(format!("--port={}", port))
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start {:?}", binary))?;
    Ok(child)
}

fn webdriver_port(webdriver_url: &str) -> anyhow::Result<u16> {
    let url = Url::parse(webdriver_url)
        .with_context(|| format!("Invalid WebDriver URL {}", webdriver_url))?;
    Ok(url.port().unwrap_or(DEFAULT_WEBDRIVER_PORT))
}

/// Chrome capabilities for the user's own browser and profile.
fn capabilities(settings: &LaunchSettings) -> Map<String, Value> {
    let mut args = vec![
        format!("--user-data-dir={}", settings.data_folder.display()),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--autoplay-policy=no-user-gesture-required".to_string(),
    ];
    if let Some(profile) = settings.profile_folder.as_ref().filter(|p| !p.trim().is_empty()) {
        args.push(format!("--profile-directory={}", profile));
    }
    if settings.headless {
        args.push("--headless=new".to_string());
    }
    args.extend(settings.extra_args.iter().cloned());

    let caps = json!({
        "browserName": "chrome",
        "pageLoadStrategy": "eager",
        "unhandledPromptBehavior": "ignore",
        "goog:chromeOptions": {
            "binary": settings.browser_path.display().to_string(),
            "args": args,
            "excludeSwitches": ["enable-automation", "enable-logging"]
        }
    });
    match caps {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn launch_settings() -> LaunchSettings {
        LaunchSettings {
            browser_path: PathBuf::from("/opt/google/chrome/chrome"),
            data_folder: PathBuf::from("/home/me/.config/google-chrome"),
            profile_folder: Some("Profile 1".to_string()),
            headless: false,
            extra_args: vec!["--mute-audio".to_string()],
            webdriver_url: "http://localhost:9600".to_string(),
            spawn_webdriver: true,
            chromedriver_path: None,
            page_load_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_capabilities_use_profile() {
        let caps = capabilities(&launch_settings());
        let chrome = &caps["goog:chromeOptions"];
        assert_eq!(chrome["binary"], "/opt/google/chrome/chrome");

        let args: Vec<&str> = chrome["args"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(args.contains(&"--user-data-dir=/home/me/.config/google-chrome"));
        assert!(args.contains(&"--profile-directory=Profile 1"));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled"));
        assert!(args.contains(&"--mute-audio"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert_eq!(caps["pageLoadStrategy"], "eager");
    }

    #[test]
    fn test_headless_and_blank_profile() {
        let mut settings = launch_settings();
        settings.headless = true;
        settings.profile_folder = Some("  ".to_string());
        let caps = capabilities(&settings);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert!(!args
            .iter()
            .filter_map(Value::as_str)
            .any(|a| a.starts_with("--profile-directory")));
    }

    #[test]
    fn test_webdriver_port() {
        assert_eq!(webdriver_port("http://localhost:9600").unwrap(), 9600);
        assert_eq!(webdriver_port("http://localhost").unwrap(), DEFAULT_WEBDRIVER_PORT);
        assert!(webdriver_port("not a url").is_err());
    }
}
