mod auth;
mod run;
mod show;

use crate::error::Result;
use clap::{Parser, Subcommand};

pub use show::ShowResource;

#[derive(Parser, Debug)]
#[command(name = "sheetbridge")]
#[command(about = "Bridge button-automation surfaces to Google Sheets", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Run => run::execute().await,
            Commands::Auth { reset } => auth::execute(*reset).await,
            Commands::Show { resource } => resource.execute().await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll configured spreadsheets and serve the local read API
    Run,
    /// Print the OAuth consent URL
    Auth {
        /// Clear stored tokens first
        #[arg(long)]
        reset: bool,
    },
    Show {
        #[command(subcommand)]
        resource: ShowResource,
    },
}
