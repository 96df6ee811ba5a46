mod api;
mod config;
mod credentials;
mod mr;
mod projector;
mod report;
mod session;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use api::{GitLabClient, ReqwestTransport};
use credentials::{CredentialStore, FileCredentialStore, StoredCredentials};
use session::Session;

/// Number of token characters shown in the debug curl command.
const TOKEN_PREVIEW_LEN: usize = 10;

/// MR Viewer: inspect, approve, comment on and merge a single GitLab
/// merge request from its web URL.
#[derive(Parser, Debug)]
#[command(name = "mr-viewer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save a Personal Access Token (and optionally the instance URL)
    Login {
        /// Personal Access Token, starting with "glpat-"
        #[arg(long)]
        token: String,

        /// GitLab instance URL (defaults to https://gitlab.com)
        #[arg(long)]
        url: Option<String>,
    },

    /// Forget the saved token and instance URL
    Logout,

    /// Show which instance is used and whether a token is configured
    Status,

    /// Show a merge request with its approvals and comments
    View {
        /// Merge request URL (e.g., https://gitlab.com/org/repo/-/merge_requests/42)
        url: String,

        /// Also load and show the changed files
        #[arg(long)]
        changes: bool,

        /// Optional output file path for a markdown export
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show only the changed files of a merge request
    Changes { url: String },

    /// Approve a merge request as the current user
    Approve { url: String },

    /// Revoke the current user's approval
    Unapprove { url: String },

    /// Merge a merge request
    Merge {
        url: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Add a comment to a merge request
    Comment { url: String, text: String },

    /// Check that the token can read the project of a merge request URL
    CheckAccess { url: String },

    /// Show the mergeability pre-check and an equivalent curl command
    MergeStatus { url: String },

    /// Show how a merge request URL is parsed and encoded
    Parse { url: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report::print_error(err.as_ref());
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Login { token, url } => {
            let stored = StoredCredentials {
                token: Some(credentials::validate_token(&token)?),
                endpoint: url.as_deref().map(credentials::validate_endpoint).transpose()?,
            };
            let store = FileCredentialStore::default_location()?;
            store.set(&stored)?;
            info!(path = %store.path().display(), "credentials saved");
            report::print_success("Token saved");
        }

        Command::Logout => {
            FileCredentialStore::default_location()?.clear()?;
            report::print_success("Token removed");
        }

        Command::Status => {
            let settings = settings()?;
            println!("GitLab instance: {}", settings.endpoint);
            let token_state = if settings.token.is_some() { "configured" } else { "not set" };
            println!("Token: {token_state}");
        }

        Command::Parse { url } => {
            let locator = mr::parse_mr_url(&url)?;
            let candidates = mr::encode::encoding_candidates(&locator.project_path_string());
            report::print_locator(&locator, &candidates);
        }

        Command::CheckAccess { url } => {
            let locator = mr::parse_mr_url(&url)?;
            let session = connect()?;
            let project = session
                .client()
                .probe_project(&locator.project_path_string())
                .instrument(info_span!("check_access", project = %locator.project_path_string()))
                .await?;
            report::print_project(&project);
        }

        Command::View { url, changes, output } => {
            let session = connect()?;
            let mut view = session.view(&url).await?;
            if changes {
                view = session.load_changes().await?;
            }
            report::output(&view, output.as_deref())?;
            if let Some(path) = output {
                report::print_success(&format!("Markdown written to {}", path.display()));
            }
        }

        Command::Changes { url } => {
            let session = connect()?;
            session.view(&url).await?;
            let view = session.load_changes().await?;
            if let Some(changes) = &view.changes {
                report::print_changes(changes);
            }
        }

        Command::Approve { url } => {
            let session = connect()?;
            session.view(&url).await?;
            let view = session.approve().await?;
            report::print_success("Merge request approved");
            report::output(&view, None)?;
        }

        Command::Unapprove { url } => {
            let session = connect()?;
            session.view(&url).await?;
            let view = session.unapprove().await?;
            report::print_success("Approval removed");
            report::output(&view, None)?;
        }

        Command::Comment { url, text } => {
            let session = connect()?;
            session.view(&url).await?;
            let view = session.add_comment(&text).await?;
            report::print_success("Comment added");
            report::output(&view, None)?;
        }

        Command::Merge { url, yes } => {
            let session = connect()?;
            let view = session.view(&url).await?;
            let check = session.merge_check().await?;
            report::print_merge_check(&check);
            if !check.can_merge {
                return Err(mr::MrError::MergeBlocked { reason: check.reason }.into());
            }

            let mr = &view.merge_request;
            if !yes && !confirm(&format!(
                "Merge \"{}\" ({} → {})?",
                mr.title, mr.source_branch, mr.target_branch
            ))
            .await?
            {
                info!("merge cancelled by user");
                println!("Merge cancelled");
                return Ok(());
            }

            let view = session.merge(Some(&check)).await?;
            report::print_success("Merge request merged");
            report::output(&view, None)?;
        }

        Command::MergeStatus { url } => {
            let settings = settings()?;
            let session = connect()?;
            let view = session.view(&url).await?;
            let check = session.merge_check().await?;
            report::print_merge_check(&check);

            let token = settings.token.unwrap_or_default();
            let preview: String = token.chars().take(TOKEN_PREVIEW_LEN).collect();
            let mr = &view.merge_request;
            println!("Equivalent request:");
            println!(
                "  curl -X PUT -H \"PRIVATE-TOKEN: {}...\" \"{}/projects/{}/merge_requests/{}/merge\"",
                preview,
                session.client().api_base(),
                mr.project_id,
                mr.iid
            );
        }
    }

    Ok(())
}

/// Resolve endpoint and token from saved credentials, the config file and
/// the environment.
fn settings() -> Result<config::Settings, Box<dyn std::error::Error>> {
    let store = FileCredentialStore::default_location()?;
    let settings = config::Config::load()?.settings(&store)?;
    debug!(endpoint = %settings.endpoint, token_set = settings.token.is_some(), "resolved settings");
    Ok(settings)
}

/// Build a session for the resolved instance. Requires a token.
fn connect() -> Result<Session<ReqwestTransport>, Box<dyn std::error::Error>> {
    let settings = settings()?;
    let token = settings
        .token
        .ok_or("No GitLab token configured. Run `mr-viewer login --token <glpat-...>` or set GITLAB_TOKEN.")?;
    info!(endpoint = %settings.endpoint, "connecting to GitLab");
    let client = GitLabClient::new(&settings.endpoint, token, ReqwestTransport::new());
    Ok(Session::new(client))
}

/// Ask a yes/no question on stdin. Anything but "y" or "yes" declines.
async fn confirm(question: &str) -> Result<bool, std::io::Error> {
    println!("{question} [y/N]");
    let mut answer = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut answer).await?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
