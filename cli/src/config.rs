// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, path::PathBuf, str::FromStr};

use pimdav_caldav::CalDavConfig;
use tokio::fs;

/// Application name, used for the configuration and state directories.
pub const APP_NAME: &str = "pimdav";

const PIMDAV_CONFIG_ENV: &str = "PIMDAV_CONFIG";

/// Configuration of the command-line driver.
#[derive(Debug, Clone)]
pub struct Config {
    /// Account and collection to synchronize.
    pub caldav: CalDavConfig,

    /// Where the cache snapshot is kept between runs.
    pub state_file: PathBuf,
}

#[derive(Debug, serde::Deserialize)]
struct ConfigRaw {
    caldav: CalDavConfig,
    state_file: Option<String>,
}

impl FromStr for ConfigRaw {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

/// Reads the configuration from `--config`, `$PIMDAV_CONFIG` or the user config directory.
#[tracing::instrument]
pub async fn parse_config(path: Option<PathBuf>) -> Result<Config, Box<dyn Error>> {
    let path = if let Some(path) = path {
        path
    } else if let Ok(env_path) = std::env::var(PIMDAV_CONFIG_ENV) {
        PathBuf::from(env_path)
    } else {
        let config = get_config_dir()?.join(format!("{APP_NAME}/config.toml"));
        if !config.exists() {
            return Err(format!("No config found at: {}", config.display()).into());
        }
        config
    };

    let raw = fs::read_to_string(&path)
        .await
        .map_err(|e| format!("Failed to read config file at {}: {}", path.display(), e))?
        .parse::<ConfigRaw>()?;

    let state_file = match raw.state_file {
        Some(p) => expand_path(&p)?,
        None => get_state_dir()?.join(format!("{APP_NAME}/state.json")),
    };
    Ok(Config {
        caldav: raw.caldav,
        state_file,
    })
}

fn get_config_dir() -> Result<PathBuf, Box<dyn Error>> {
    #[cfg(unix)]
    let config_dir = xdg::BaseDirectories::new().get_config_home();
    #[cfg(windows)]
    let config_dir = dirs::config_dir();
    config_dir.ok_or_else(|| "User-specific home directory not found".into())
}

fn get_state_dir() -> Result<PathBuf, Box<dyn Error>> {
    #[cfg(unix)]
    let state_dir = xdg::BaseDirectories::new().get_state_home();
    #[cfg(windows)]
    let state_dir = dirs::data_local_dir();
    state_dir.ok_or_else(|| "User-specific state directory not found".into())
}

fn expand_path(path: &str) -> Result<PathBuf, Box<dyn Error>> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| "User-specific home directory not found".into()),
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use pimdav_caldav::{AuthMethod, ComponentKind};
    use std::fs;
    use std::sync::OnceLock;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn write_config(dir: &TempDir, name: &str, collection: &str) -> PathBuf {
        let path = dir.path().join(name);
        let state = dir.path().join("state.json");
        let content = format!(
            r#"
state_file = "{}"

[caldav]
base_url = "https://dav.example.com"
collection = "{collection}"
component = "todo"

[caldav.auth]
type = "basic"
username = "alice"
password = "secret"
"#,
            state.to_str().unwrap().replace('\\', "/")
        );
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn parses_caldav_table() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.toml", "/cal/alice/tasks/");

        let config = parse_config(Some(path)).await.unwrap();
        assert_eq!(config.caldav.base_url, "https://dav.example.com");
        assert_eq!(config.caldav.collection, "/cal/alice/tasks/");
        assert_eq!(config.caldav.component, ComponentKind::Todo);
        assert_eq!(config.caldav.auth.username(), Some("alice"));
        assert!(matches!(config.caldav.auth, AuthMethod::Basic { .. }));
        assert_eq!(config.caldav.timeout_secs, 30);
        assert_eq!(config.state_file, dir.path().join("state.json"));
    }

    #[tokio::test]
    async fn cli_flag_overrides_env_var() {
        let dir = TempDir::new().unwrap();
        let cli_path = write_config(&dir, "cli.toml", "/cli/");
        let env_path = write_config(&dir, "env.toml", "/env/");

        let _guard = env_lock().lock().await;
        unsafe {
            std::env::set_var(PIMDAV_CONFIG_ENV, env_path.to_str().unwrap());
        }

        let config = parse_config(Some(cli_path)).await.unwrap();
        assert_eq!(config.caldav.collection, "/cli/");

        let config = parse_config(None).await.unwrap();
        assert_eq!(config.caldav.collection, "/env/");

        unsafe {
            std::env::remove_var(PIMDAV_CONFIG_ENV);
        }
    }

    #[tokio::test]
    async fn missing_caldav_table_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "state_file = \"/tmp/x.json\"\n").unwrap();

        assert!(parse_config(Some(path)).await.is_err());
    }

    #[tokio::test]
    async fn unreadable_file_names_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");

        let err = parse_config(Some(path)).await.unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn expands_home_prefix() {
        assert_eq!(
            expand_path("/var/lib/pimdav.json").unwrap(),
            PathBuf::from("/var/lib/pimdav.json")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/s.json").unwrap(), home.join("s.json"));
        }
    }
}
