use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use rmtracker_lib::error::TrackerError;
use rmtracker_lib::linkify::{decorate_issue_links, page_origin, should_decorate};
use rmtracker_lib::options::{mask_api_key, save_options, OptionsForm};
use rmtracker_lib::redmine::client::RedmineClient;
use rmtracker_lib::state::{ConfigStore, FileConfigStore};

#[derive(Debug, Parser)]
#[command(
    name = "rmtracker",
    version,
    about = "Watch Redmine for \"Awaiting answer\" issues assigned to you"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll Redmine and raise notifications (default)
    Run,
    /// Set host, API key and link decoration; prints settings without flags
    Configure {
        /// Redmine URL; scheme and trailing slash are added when missing
        #[arg(long)]
        host: Option<String>,
        /// API key from "My account" in Redmine
        #[arg(long)]
        apikey: Option<String>,
        /// Link bare #1234 references on tracker pages
        #[arg(long)]
        issue_fix: Option<bool>,
    },
    /// Show stored settings and the last known count
    Status,
    /// Open the "Awaiting answer" list in the browser
    Open,
    /// Link #1234 references in an HTML page (stdin when FILE is omitted)
    Linkify {
        /// URL the page was loaded from
        #[arg(long)]
        url: String,
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => rmtracker_lib::run_daemon().await,
        Command::Configure {
            host,
            apikey,
            issue_fix,
        } => configure(OptionsForm {
            api_key: apikey,
            host,
            issue_fix,
        }),
        Command::Status => status(),
        Command::Open => open_issues_page(),
        Command::Linkify { url, file } => linkify(&url, file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rmtracker: {}", e);
            eprintln!("{}", e.recovery_suggestion());
            ExitCode::FAILURE
        }
    }
}

fn configure(form: OptionsForm) -> Result<(), TrackerError> {
    let store = FileConfigStore::open_default()?;
    if !form.is_empty() {
        save_options(&store, &form)?;
    }
    status()
}

fn status() -> Result<(), TrackerError> {
    let store = FileConfigStore::open_default()?;
    let config = store.load()?;

    println!("config:        {}", store.path().display());
    println!("host:          {}", config.host.as_deref().unwrap_or("<unset>"));
    println!(
        "apikey:        {}",
        config
            .api_key
            .as_deref()
            .map(mask_api_key)
            .unwrap_or_else(|| "<unset>".to_string())
    );
    println!("issueFix:      {}", config.issue_fix);
    println!("notifications: {:?}", config.notifications);
    println!("count:         {}", config.count);
    Ok(())
}

fn open_issues_page() -> Result<(), TrackerError> {
    let config = FileConfigStore::open_default()?.load()?;
    let credentials = config.credentials().ok_or_else(|| {
        TrackerError::Configuration("host and API key must be set".to_string())
    })?;

    let url = RedmineClient::new(credentials)?.awaiting_issues_page_url()?;
    log::info!("Opening {}", url);
    open::that(url.as_str())?;
    Ok(())
}

fn linkify(page_url: &str, file: Option<PathBuf>) -> Result<(), TrackerError> {
    let html = match file {
        Some(path) => std::fs::read_to_string(&path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let settings = FileConfigStore::open_default()?.load()?.settings();
    let output = if should_decorate(&settings, page_url) {
        let decorated = decorate_issue_links(&html, &page_origin(page_url)?);
        log::info!("Linked issue references in {} element(s)", decorated.converted);
        decorated.html
    } else {
        log::debug!("{} is not a tracker page or issueFix is off", page_url);
        html
    };

    io::stdout().write_all(output.as_bytes())?;
    Ok(())
}
