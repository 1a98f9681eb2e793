mod analysis;
mod config;
mod domain;
mod github;
mod llm;
mod report;
mod store;
mod track;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{debug, error, info, info_span};
use tracing_subscriber::EnvFilter;

use analysis::Analyzer;
use domain::PrState;
use github::{GitHubClient, ListState, SourceControl};
use llm::{GeminiClient, ModelInvoker};
use store::{DocumentStore, Store};

/// Sunfyre: mirrors GitHub pull requests and stores structured AI reviews
/// of their diffs.
#[derive(Parser, Debug)]
#[command(name = "sunfyre", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a pull request (e.g. https://github.com/org/repo/pull/42) and its repository
    Track { pr_url: String },

    /// List tracked repositories
    Repos {
        /// List repositories visible to the token upstream instead
        #[arg(long)]
        remote: bool,
    },

    /// List pull requests of a tracked repository
    Pulls {
        repository_id: String,

        #[arg(long)]
        state: Option<PrState>,

        /// List the repository's pull requests upstream instead
        #[arg(long)]
        remote: bool,
    },

    /// Flip a repository's active flag
    Toggle { repository_id: String },

    /// Run an AI review of a tracked pull request
    Analyze {
        pull_request_id: String,

        /// Optional output file path for markdown report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show a pull request and its latest review
    Show {
        pull_request_id: String,

        /// Optional output file path for markdown report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the reviews of a pull request, newest first
    Reviews { pull_request_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::Config::load()?;
    let user_id = config.user_id();

    let source = GitHubClient::new(&config.github)?;
    let model = GeminiClient::new(&config.llm)?;
    debug!(model = model.model(), "model client ready");

    let store_path = config.store_path();
    debug!(path = %store_path.display(), "opening store");
    let store = DocumentStore::open(&store_path).await?;

    match cli.command {
        Command::Track { pr_url } => {
            let _span = info_span!("track", pr_url = %pr_url).entered();
            let url = github::parse_pr_url(&pr_url)?;
            let (repo, pr) = track::track_pull_request(&source, &store, user_id, &url).await?;
            println!("repository {}  {}", repo.id, repo.full_name);
            println!("pull request {}  #{} {}", pr.id, pr.number, pr.title);
        }

        Command::Repos { remote: true } => {
            for repo in source.list_repositories().await? {
                let visibility = if repo.private { "private" } else { "public" };
                println!("{}  {}  ★{}", repo.full_name, visibility, repo.stargazers_count);
            }
        }

        Command::Repos { remote: false } => {
            let repos = store.list_repositories(user_id).await?;
            if repos.is_empty() {
                println!("No tracked repositories. Use `sunfyre track <pr-url>` to add one.");
            }
            for repo in repos {
                let synced = repo
                    .last_synced_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!("{}  {}  synced {}", repo.id, repo.full_name, synced);
            }
        }

        Command::Pulls { repository_id, state, remote: true } => {
            let repo = store.load_repository(user_id, &repository_id).await?;
            let (owner, name) = repo
                .owner_and_name()
                .ok_or_else(|| format!("Repository has no owner/name: {}", repo.full_name))?;
            let list_state = match state {
                None => ListState::All,
                Some(PrState::Open) => ListState::Open,
                Some(PrState::Closed | PrState::Merged) => ListState::Closed,
            };
            for pr in source.list_pull_requests(owner, name, list_state).await? {
                let pr_state = PrState::from_upstream(&pr.state, pr.merged_at.is_some());
                if state.is_some_and(|s| s != pr_state) {
                    continue;
                }
                println!("#{}  {}  {}  @{}", pr.number, pr_state, pr.title, pr.user.login);
            }
        }

        Command::Pulls { repository_id, state, remote: false } => {
            for pr in store.list_pull_requests(user_id, &repository_id, state).await? {
                println!(
                    "{}  #{}  {}  {}  +{} -{}",
                    pr.id, pr.number, pr.state, pr.title, pr.counters.additions, pr.counters.deletions
                );
            }
        }

        Command::Toggle { repository_id } => {
            let repo = store.load_repository(user_id, &repository_id).await?;
            let repo = store
                .set_repository_active(user_id, &repository_id, !repo.is_active)
                .await?;
            let label = if repo.is_active { "active".green() } else { "inactive".yellow() };
            println!("{}  {}", repo.full_name, label);
        }

        Command::Analyze { pull_request_id, output } => {
            let _span = info_span!("pr_analyze", pull_request_id = %pull_request_id).entered();
            let analyzer = Analyzer::new(&source, &model, &store);
            let review = match analyzer.analyze(user_id, &pull_request_id).await {
                Ok(review) => review,
                Err(err) => {
                    error!(status = err.status_code(), "analysis failed");
                    return Err(err.into());
                }
            };
            info!(review_id = %review.id, risk_score = review.risk_score, "analysis complete");

            let pr = store.load_pull_request(user_id, &pull_request_id).await?;
            report::output(&report::Report::new(&pr, &review), output.as_deref())?;
        }

        Command::Show { pull_request_id, output } => {
            let pr = store.load_pull_request(user_id, &pull_request_id).await?;
            match store.latest_review(user_id, &pull_request_id).await? {
                Some(review) => report::output(&report::Report::new(&pr, &review), output.as_deref())?,
                None => println!(
                    "PR #{}: \"{}\" ({}) has not been analyzed yet.",
                    pr.number, pr.title, pr.state
                ),
            }
        }

        Command::Reviews { pull_request_id } => {
            store.load_pull_request(user_id, &pull_request_id).await?;
            let reviews = store.reviews_for(user_id, &pull_request_id).await?;
            if reviews.is_empty() {
                println!("No reviews yet.");
            }
            for review in &reviews {
                println!("{}", report::history_line(review));
            }
        }
    }

    Ok(())
}
