use std::fmt;

use async_trait::async_trait;
use irc::client::Client;
use irc::proto::Message;
use tracing::debug;

use crate::{Context, Error};

/// Bitbucket pull request lookups
#[cfg(feature = "plugin-bitbucket")]
pub mod bitbucket;

/// A newtype wrapper for plugin metadata strings.
macro_rules! metadata_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Eq, PartialEq, Hash)]
        pub struct $name(&'static str);

        impl $name {
            /// Returns the inner string value.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                self.0
            }
        }

        impl From<&'static str> for $name {
            fn from(value: &'static str) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.0)
            }
        }
    };
}

metadata_type!(Name, "The name of a plugin.");
metadata_type!(Author, "The author of a plugin.");
metadata_type!(Version, "The version of a plugin.");

/// Common includes used in plugins.
#[allow(unused)]
mod prelude {
    pub use super::{Author, Name, Plugin, Version};
    pub use crate::Context;
    pub use crate::Error as ZetaError;
    pub use crate::command::Command as ZetaCommand;
    pub use async_trait::async_trait;
    pub use irc::client::Client;
    pub use irc::proto::{Command, Message};
}

/// The base trait that all plugins must implement.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// The constructor for a new plugin.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin cannot be set up with the given context.
    fn new(ctx: &Context) -> Result<Self, Error>
    where
        Self: Sized;

    /// Returns the name of the plugin.
    fn name() -> Name
    where
        Self: Sized;

    /// Returns the author of the plugin.
    fn author() -> Author
    where
        Self: Sized;

    /// Returns the version of the plugin.
    fn version() -> Version
    where
        Self: Sized;

    /// Process an IRC protocol message.
    async fn handle_message(
        &self,
        _ctx: &Context,
        _client: &Client,
        _message: &Message,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Plugin registry.
#[derive(Default)]
pub struct Registry {
    /// List of loaded plugins.
    pub plugins: Vec<Box<dyn Plugin>>,
}

impl Registry {
    /// Constructs and returns a new, empty plugin registry.
    #[must_use]
    pub fn new() -> Self {
        Self { plugins: vec![] }
    }

    /// Constructs and returns a new plugin registry with initialized plugins.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a plugin constructor.
    pub fn preloaded(ctx: &Context) -> Result<Self, Error> {
        let mut registry = Self::new();
        debug!("registering plugins");

        #[cfg(feature = "plugin-bitbucket")]
        registry.register::<bitbucket::Bitbucket>(ctx)?;

        let num_plugins = registry.plugins.len();
        debug!(%num_plugins, "finished registering plugins");

        Ok(registry)
    }

    /// Registers a new plugin based on its type.
    ///
    /// # Errors
    ///
    /// Returns the error raised by the plugin constructor.
    pub fn register<P: Plugin + 'static>(&mut self, ctx: &Context) -> Result<(), Error> {
        let plugin = P::new(ctx)?;
        debug!(name = %P::name(), version = %P::version(), author = %P::author(), "registered plugin");

        self.plugins.push(Box::new(plugin));

        Ok(())
    }
}
