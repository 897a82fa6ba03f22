use crate::bridge::TomlStore;
use crate::config::Config;
use crate::error::Result;
use crate::sheets::TokenManager;
use tracing::warn;

pub async fn execute(reset: bool) -> Result<()> {
    let config = Config::load()?;
    let tokens = TokenManager::new(
        config.google.clone(),
        Box::new(TomlStore::new(config)),
    )?;

    if reset {
        tokens.clear_tokens()?;
    }

    match tokens.consent_url() {
        Some(url) => {
            println!("Open this URL in your browser to authorize access:\n{}", url);
            println!();
            println!("Paste the \"code\" parameter from the redirect into the config file.");
        }
        None => warn!("Client credentials are not configured"),
    }

    Ok(())
}
