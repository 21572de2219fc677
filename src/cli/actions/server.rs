use crate::api;
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { port, dsn, config } => {
            // Validate the DSN shape up front; the raw value stays wrapped
            // until the connector needs it.
            Url::parse(dsn.expose_secret()).context("Invalid database DSN")?;

            api::new(port, dsn.expose_secret().to_string(), config).await?;
        }
    }

    Ok(())
}
