// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use crate::types::ComponentKind;

/// `CalDAV` authentication method.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "type")]
pub enum AuthMethod {
    /// No authentication.
    #[serde(rename = "none")]
    #[default]
    None,
    /// Basic authentication (username/password).
    #[serde(rename = "basic")]
    Basic {
        /// Username for authentication.
        username: String,
        /// Password for authentication.
        password: String,
    },
    /// Bearer token authentication (OAuth).
    #[serde(rename = "bearer")]
    Bearer {
        /// Bearer token.
        token: String,
    },
}

impl AuthMethod {
    /// Returns true if any credentials are configured.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Returns the configured username, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Basic { username, .. } if !username.is_empty() => Some(username),
            _ => None,
        }
    }
}

/// `CalDAV` account configuration for one calendar collection.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CalDavConfig {
    /// Base URL of the `CalDAV` server.
    pub base_url: String,
    /// Path of the calendar collection (e.g., /dav/calendars/user/work/).
    pub collection: String,
    /// Authentication method.
    #[serde(default)]
    pub auth: AuthMethod,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Component kind this backend serves.
    #[serde(default)]
    pub component: ComponentKind,
    /// Account e-mail address, used as the free/busy organizer.
    #[serde(default)]
    pub email_address: Option<String>,
    /// Let the server deliver meeting invitations.
    #[serde(default)]
    pub auto_schedule: bool,
    /// Half-width, in weeks, of the window listed by the first refresh pass.
    #[serde(default = "default_refresh_window_weeks")]
    pub refresh_window_weeks: u32,
}

const fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("pimdav-caldav/", env!("CARGO_PKG_VERSION")).to_string()
}

const fn default_refresh_window_weeks() -> u32 {
    5
}

impl Default for CalDavConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            collection: String::new(),
            auth: AuthMethod::default(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            component: ComponentKind::default(),
            email_address: None,
            auto_schedule: false,
            refresh_window_weeks: default_refresh_window_weeks(),
        }
    }
}

impl CalDavConfig {
    /// Returns the part of the configuration that identifies the server connection.
    #[must_use]
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            collection: self.collection.clone(),
            auth: self.auth.clone(),
        }
    }

    /// Returns the collection path with a trailing slash.
    #[must_use]
    pub fn collection_path(&self) -> String {
        let mut path = self.collection.clone();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        if !path.ends_with('/') {
            path.push('/');
        }
        path
    }
}

/// Connection-identifying subset of [`CalDavConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Collection path as configured.
    pub collection: String,
    /// Credentials.
    pub auth: AuthMethod,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let config: CalDavConfig = serde_json::from_str(
            r#"{"base_url":"https://dav.example.com","collection":"cal/work"}"#,
        )
        .unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.refresh_window_weeks, 5);
        assert_eq!(config.component, ComponentKind::Event);
        assert!(!config.auto_schedule);
        assert_eq!(config.auth, AuthMethod::None);
        assert_eq!(config.collection_path(), "/cal/work/");
    }

    #[test]
    fn deserializes_basic_auth() {
        let config: CalDavConfig = serde_json::from_str(
            r#"{"base_url":"x","collection":"/c/","component":"todo",
                "auth":{"type":"basic","username":"u","password":"p"}}"#,
        )
        .unwrap();
        assert_eq!(config.auth.username(), Some("u"));
        assert!(config.auth.has_credentials());
        assert_eq!(config.component, ComponentKind::Todo);
    }

    #[test]
    fn connection_params_ignore_trailing_slash() {
        let a = CalDavConfig {
            base_url: "https://dav.example.com/".into(),
            collection: "/c/".into(),
            ..Default::default()
        };
        let b = CalDavConfig {
            base_url: "https://dav.example.com".into(),
            collection: "/c/".into(),
            auto_schedule: true,
            ..Default::default()
        };
        assert_eq!(a.connection_params(), b.connection_params());
    }
}
