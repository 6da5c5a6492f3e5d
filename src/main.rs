use std::path::PathBuf;

use argh::FromArgs;
use miette::WrapErr;
use tracing::warn;

use bitbucket_snarfer::{Bot, Config, Context, telemetry};

/// Announces Bitbucket pull requests mentioned on IRC.
#[derive(Debug, FromArgs)]
struct Opts {
    /// path to config file
    #[argh(option, short = 'c', default = "PathBuf::from(\"config.toml\")")]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let opts: Opts = argh::from_env();

    let config = Config::load(&opts.config_path)
        .wrap_err_with(|| format!("loading {}", opts.config_path.display()))?;

    telemetry::try_init(&config.tracing)?;

    let mut bot = Bot::new(Context::new(config))?;
    let result = bot.run().await;

    warn!("the irc stream ended");

    Ok(result?)
}
