//! Configuration loaded from a TOML file with environment overrides.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format as _, Toml};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, consts};

/// The complete bot configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Tracing configuration
    #[serde(default)]
    pub tracing: TracingConfig,
    /// IRC client configuration
    pub irc: IrcConfig,
    /// Bitbucket repository to watch
    pub bitbucket: BitbucketConfig,
}

impl Config {
    /// Loads the configuration from the TOML file at `path`, with `SNARFER_`-prefixed environment
    /// variables taking precedence. Nested keys are separated by `__`, e.g.
    /// `SNARFER_BITBUCKET__REPO_SLUG`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the sources cannot be read or don't form a valid config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(consts::ENV_PREFIX).split("__"));

        Self::from_figment(&figment)
    }

    /// Extracts the configuration from an already assembled figment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the figment doesn't form a valid config.
    pub fn from_figment(figment: &Figment) -> Result<Self, Error> {
        figment
            .extract()
            .map_err(|err| Error::Config(Box::new(err)))
    }
}

/// Output format for log lines written to stdout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human readable output.
    Pretty,
    /// Single-line human readable output.
    Compact,
}

/// Logging and span export.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TracingConfig {
    /// Export spans over OTLP
    #[serde(default)]
    pub enabled: bool,
    /// Format of the stdout log
    #[serde(default)]
    pub format: Format,
}

/// Per-channel settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IrcChannelConfig {
    /// The shared key to access the channel.
    pub key: Option<String>,
}

/// TLS settings for the IRC connection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IrcTlsConfig {
    /// Enable TLS.
    pub enabled: bool,
}

/// Connection details for the IRC network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IrcConfig {
    /// The client's nickname.
    pub nickname: String,
    /// Alternative nicknames for the client, if the default is taken.
    #[serde(default)]
    pub alt_nicks: Vec<String>,
    /// The client's username.
    pub username: Option<String>,
    /// The client's real name.
    pub realname: Option<String>,
    /// The hostname of the server to connect to.
    pub hostname: String,
    /// The password to connect to the server.
    pub password: Option<String>,
    /// The port number of the server to connect to.
    pub port: Option<u16>,
    /// TLS configuration.
    pub tls: Option<IrcTlsConfig>,
    /// List of channels to automatically join.
    #[serde(default)]
    pub channels: HashMap<String, Option<IrcChannelConfig>>,
}

impl IrcConfig {
    /// Returns the configured port, or the conventional port for the TLS setting.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.fallback_port())
    }

    fn fallback_port(&self) -> u16 {
        if self.tls.as_ref().is_some_and(|tls| tls.enabled) {
            6697
        } else {
            6667
        }
    }
}

impl From<IrcConfig> for irc::client::data::Config {
    fn from(config: IrcConfig) -> Self {
        let port = config.port();
        let use_tls = config.tls.map(|tls| tls.enabled);
        let channel_keys = config
            .channels
            .iter()
            .filter_map(|(name, channel)| {
                let key = channel.as_ref()?.key.clone()?;

                Some((name.clone(), key))
            })
            .collect();
        let channels = config.channels.into_keys().collect();

        Self {
            nickname: Some(config.nickname),
            alt_nicks: config.alt_nicks,
            username: config.username,
            realname: config.realname,
            server: Some(config.hostname),
            password: config.password,
            port: Some(port),
            use_tls,
            channels,
            channel_keys,
            ..Default::default()
        }
    }
}

/// The Bitbucket repository whose pull requests are looked up.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitbucketConfig {
    /// The account (workspace) that owns the repository.
    #[serde(rename = "accountname", alias = "account_name")]
    pub account_name: String,
    /// The repository slug.
    pub repo_slug: String,
    /// How long a snarfed pull request is ignored after it was looked up.
    #[serde(
        rename = "snarferTimeout",
        alias = "snarfer_timeout",
        alias = "snarfertimeout",
        default = "default_snarfer_timeout",
        with = "humantime_serde"
    )]
    pub snarfer_timeout: Duration,
    /// Base URL of the REST API.
    #[serde(default = "default_api_url")]
    pub api_url: Url,
    /// Base URL of the web interface.
    #[serde(default = "default_web_url")]
    pub web_url: Url,
}

impl BitbucketConfig {
    /// Creates a config for `account_name/repo_slug` against the public Bitbucket service.
    #[must_use]
    pub fn new(account_name: impl Into<String>, repo_slug: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            repo_slug: repo_slug.into(),
            snarfer_timeout: default_snarfer_timeout(),
            api_url: default_api_url(),
            web_url: default_web_url(),
        }
    }
}

/// Default for [`BitbucketConfig::snarfer_timeout`].
#[must_use]
pub const fn default_snarfer_timeout() -> Duration {
    consts::DEFAULT_SNARFER_TIMEOUT
}

/// Default for [`BitbucketConfig::api_url`].
///
/// # Panics
///
/// Never, the default is a valid URL.
#[must_use]
pub fn default_api_url() -> Url {
    Url::parse(consts::BITBUCKET_API_URL).expect("default api url is valid")
}

/// Default for [`BitbucketConfig::web_url`].
///
/// # Panics
///
/// Never, the default is a valid URL.
#[must_use]
pub fn default_web_url() -> Url {
    Url::parse(consts::BITBUCKET_WEB_URL).expect("default web url is valid")
}
