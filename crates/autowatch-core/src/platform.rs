use std::path::PathBuf;

pub const APP_DIR_NAME: &str = "autowatch";

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/autowatch/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR_NAME)
    }
    #[cfg(windows)]
    {
        if let Some(dir) = portable_dir("data") {
            return dir;
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(dir) = portable_dir("config.toml").and_then(|p| p.parent().map(PathBuf::from)) {
            return dir;
        }
    }

    // On macOS and Linux, always use ~/.config/autowatch/
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR_NAME)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }
}

/// Entry beside the current executable, used for portable installs.
#[cfg(windows)]
fn portable_dir(name: &str) -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let candidate = exe_path.parent()?.join(name);
    candidate.exists().then_some(candidate)
}

#[cfg(unix)]
fn chromedriver_binary_names() -> &'static [&'static str] {
    &["chromedriver"]
}

#[cfg(windows)]
fn chromedriver_binary_names() -> &'static [&'static str] {
    &["chromedriver.exe", "chromedriver"]
}

fn find_beside_exe(names: &[&str]) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    for name in names {
        let p = dir.join(name);
        if p.exists() {
            return Some(p);
        }
        let p = dir.join("external").join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        for name in names {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

/// Find the chromedriver binary.
///
/// Searches in order:
/// 1. CHROMEDRIVER_PATH environment variable
/// 2. Beside the current executable (or its `external/` folder)
/// 3. PATH
pub fn find_chromedriver_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROMEDRIVER_PATH") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(p) = find_beside_exe(chromedriver_binary_names()) {
        return Some(p);
    }

    find_on_path(chromedriver_binary_names())
}
