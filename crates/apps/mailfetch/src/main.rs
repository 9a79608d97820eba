//! mailfetch - print the HTML body of the latest matching Gmail message

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use mailfetch::{CredentialStore, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "mailfetch",
    version,
    about = "Print the HTML body of the latest Gmail message matching a filter",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Arguments for the default `fetch` command
    #[command(flatten)]
    fetch: FetchArgs,
}

#[derive(Args, Debug, Clone, PartialEq)]
struct FetchArgs {
    /// Gmail search filter, e.g. `from:(reservation@example.com)`
    #[arg(env = "GMAIL_FILTER")]
    filter: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Print the latest matching HTML body (default)
    Fetch(FetchArgs),
    /// List mailboxes (Gmail labels)
    Labels,
    /// Forget the persisted token
    Logout,
}

impl Cli {
    fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Fetch(self.fetch))
    }
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let command = Cli::parse().into_command();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let settings = Settings::from_env()?;

    match command {
        Command::Fetch(args) => {
            match mailfetch::fetch_latest_html(&settings, args.filter.as_deref())? {
                Some(html) => println!("{}", html),
                None => info!("No HTML body found"),
            }
        }
        Command::Labels => {
            for mailbox in mailfetch::list_mailboxes(&settings)? {
                println!("{}", mailbox);
            }
        }
        Command::Logout => CredentialStore::from_settings(&settings).logout()?,
    }
    Ok(())
}
