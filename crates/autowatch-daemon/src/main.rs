mod browser;
mod http;
mod webdriver_page;

use autowatch_core::config::Config;
use autowatch_core::state::StateManager;
use autowatch_core::{Controller, TokioSleeper};
use browser::BrowserDriver;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use webdriver_page::WebDriverPage;

/// Console timestamps as local wall-clock time.
struct LocalClock;

impl FormatTime for LocalClock {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S"))
    }
}

fn init_logging() -> anyhow::Result<std::path::PathBuf> {
    let data_dir = autowatch_core::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("autowatch.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Console for the person at the machine, file for later digging
    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(LocalClock)
        .with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,autowatch=debug,autowatch_core=debug")
            }),
        )
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // A missing .env is fine; the config file and process env still apply
    let dotenv_path = dotenv::dotenv().ok();

    let log_path = init_logging()?;
    info!("Log file: {:?}", log_path);
    if let Some(path) = dotenv_path {
        info!("Loaded environment from {:?}", path);
    }

    let settings = match Config::load().and_then(|mut config| {
        config.apply_process_env();
        config.resolve()
    }) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    info!("Config loaded from: {:?}", Config::config_path());
    info!("Watching {}", settings.watch.channel_page);

    let driver = BrowserDriver::launch(&settings.launch).await?;
    let page = WebDriverPage::new(driver.client(), settings.launch.page_load_timeout);

    let state_manager = Arc::new(StateManager::new(settings.watch.channel_page.clone()));

    if settings.http.enabled {
        let _http_handle = http::start_server(
            settings.http.bind_address.clone(),
            settings.http.port,
            state_manager.clone(),
        );
    }

    let mut controller = Controller::new(page, settings.watch, TokioSleeper, state_manager);

    info!("Watch loop running, press Ctrl-C to stop");
    tokio::select! {
        _ = controller.run() => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down");
        }
    }

    driver.shutdown().await;
    Ok(ExitCode::SUCCESS)
}
