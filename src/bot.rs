//! The main process for communicating over IRC and managing state.
use futures::stream::StreamExt;
use irc::client::prelude::Client;
use irc::proto::Message;
use tracing::{debug, info};

use crate::Context;
use crate::Error;
use crate::Registry;

/// The IRC bot that owns the connection and dispatches messages to plugins.
pub struct Bot {
    /// The IRC client - None until connection is established
    client: Option<Client>,
    /// The registry containing all loaded plugins
    registry: Registry,
    /// The shared context for plugins
    context: Context,
}

impl Bot {
    /// Creates a new bot from the provided context and initializes its plugins.
    ///
    /// The IRC connection isn't established until [`Bot::run`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if a plugin fails to initialize.
    pub fn new(context: Context) -> Result<Self, Error> {
        let registry = Registry::preloaded(&context)?;

        Ok(Self {
            client: None,
            registry,
            context,
        })
    }

    /// Connects to the configured network and processes messages until the stream ends.
    ///
    /// # Errors
    ///
    /// This function will return an error in the following situations:
    ///
    /// - [`Error::IrcClient`] - if the instantiation of the IRC client fails (e.g. due to
    ///   configuration issues.)
    /// - [`Error::IrcRegistration`] - if user registration fails.
    /// - [`Error::Irc`] - if a protocol or communication error occurred.
    pub async fn run(&mut self) -> Result<(), Error> {
        let irc_config = self.context.config.irc.clone().into();
        let mut client = Client::from_config(irc_config)
            .await
            .map_err(Error::IrcClient)?;

        client.identify().map_err(Error::IrcRegistration)?;
        info!(hostname = %self.context.config.irc.hostname, "connected");

        let mut stream = client.stream()?;

        self.client = Some(client);

        if let Some(client) = &self.client {
            while let Some(message) = stream.next().await.transpose()? {
                self.handle_message(client, message).await?;
            }
        }

        Ok(())
    }

    /// Dispatches a single IRC message to each plugin in the registry.
    async fn handle_message(&self, client: &Client, message: Message) -> Result<(), Error> {
        debug!(?message, "processing irc message");

        for plugin in &self.registry.plugins {
            plugin
                .handle_message(&self.context, client, &message)
                .await?;
        }

        Ok(())
    }
}
