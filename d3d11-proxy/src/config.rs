use std::path::PathBuf;
use std::str::FromStr;

use log::LevelFilter;

pub const LOG_LEVEL_VAR: &str = "D3D11_PROXY_LOG_LEVEL";
pub const LOG_FILE_VAR: &str = "D3D11_PROXY_LOG_FILE";
pub const HOOK_VAR: &str = "D3D11_PROXY_HOOK";
pub const CONSOLE_VAR: &str = "D3D11_PROXY_CONSOLE";

const DEFAULT_LOG_FILE: &str = "d3d11_proxy.log";

/// Start-up settings, read once when the library is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_level: LevelFilter,
    /// `None` disables the file sink.
    pub log_file: Option<PathBuf>,
    /// Detour the `d3d11.dll` creation exports on attach.
    pub hook_entry_points: bool,
    /// Open a console window for the terminal sink.
    pub console: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: LevelFilter::Info,
            log_file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            hook_entry_points: true,
            console: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Config {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, falling back to the default for
    /// every variable that is unset or unparsable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Config {
        let mut config = Config::default();

        if let Some(level) = lookup(LOG_LEVEL_VAR).and_then(|level| LevelFilter::from_str(level.trim()).ok()) {
            config.log_level = level;
        }
        if let Some(file) = lookup(LOG_FILE_VAR) {
            let file = file.trim();
            config.log_file = (!file.is_empty()).then(|| PathBuf::from(file));
        }
        if let Some(hook) = lookup(HOOK_VAR).as_deref().and_then(parse_flag) {
            config.hook_entry_points = hook;
        }
        if let Some(console) = lookup(CONSOLE_VAR).as_deref().and_then(parse_flag) {
            config.console = console;
        }
        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
