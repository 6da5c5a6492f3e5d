//! Crate-wide constants.

use std::time::Duration;

/// The `User-Agent` header to send when issuing HTTP requests.
pub const HTTP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The duration before a HTTP request times out.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Base URL of the Bitbucket REST API.
pub const BITBUCKET_API_URL: &str = "https://api.bitbucket.org/2.0";

/// Base URL of the Bitbucket web interface, used when building links to pull requests.
pub const BITBUCKET_WEB_URL: &str = "https://bitbucket.org";

/// How long a snarfed pull request id is ignored after it has been looked up.
pub const DEFAULT_SNARFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Prefix for environment variables that override values from the config file.
pub const ENV_PREFIX: &str = "SNARFER_";
