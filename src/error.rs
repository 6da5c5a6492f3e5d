//! Error types

use miette::Diagnostic;
use thiserror::Error;

/// Application errors for configuration, IRC, and plugin operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The configuration could not be loaded or is invalid.
    #[error("Could not load configuration")]
    #[diagnostic(code(snarfer::config), help("check the config file and SNARFER_* variables"))]
    Config(#[source] Box<figment::Error>),
    /// Failed to create the IRC client.
    #[error("Could not create IRC client")]
    IrcClient(#[source] irc::error::Error),
    /// Failed to register with the IRC server.
    #[error("Could not send registration details for IRC")]
    IrcRegistration(#[source] irc::error::Error),
    /// General IRC communication error.
    #[error("IRC error")]
    Irc(#[from] irc::error::Error),
    /// A plugin could not be initialized.
    #[error("Could not initialize plugin {name}")]
    PluginInit {
        /// The name of the plugin.
        name: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
