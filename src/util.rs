use std::path::PathBuf;

pub const CONFIG_PATH: &str = "HEARTBEAT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.json";

pub fn get_default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

pub fn get_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH).map_or_else(|_| get_default_config_path(), PathBuf::from)
}

pub const SMTP_PASSWORD: &str = "HEARTBEAT_SMTP_PASSWORD";

/// Password from the environment, taking precedence over the config file.
pub fn get_smtp_password() -> Option<String> {
    std::env::var(SMTP_PASSWORD)
        .ok()
        .filter(|password| !password.is_empty())
}

/// Daily rotation appends the date: `server_check.log.YYYY-MM-DD`
pub const LOG_FILE_NAME: &str = "server_check.log";
