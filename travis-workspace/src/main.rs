use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use travis_github::GithubClient;
use travis_workspace::sync::SyncTarget;
use travis_workspace::{
    FileStore, WorkspaceConfig, WorkspaceImporter, WorkspacePublisher, WorkspaceStore,
};

const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Repos,
    Branches {
        repo: String,
    },
    Import {
        repo: String,
        branch: Option<String>,
        path: Option<String>,
    },
    Publish {
        repo: String,
        branch: String,
        message: String,
        path: Option<String>,
    },
    List,
    Help,
}

fn parse_cli<I>(args: I) -> anyhow::Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let Some(command) = args.next() else {
        return Ok(Command::Help);
    };
    let mut positional = Vec::new();
    let mut branch = None;
    let mut message = None;
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--branch" | "-b" => branch = Some(flag_value(&arg, args.next())?),
            "--message" | "-m" => message = Some(flag_value(&arg, args.next())?),
            "--path" | "-p" => path = Some(flag_value(&arg, args.next())?),
            "--help" | "-h" => return Ok(Command::Help),
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            _ => positional.push(arg),
        }
    }

    let command = match command.as_str() {
        "--help" | "-h" | "help" => Command::Help,
        "repos" => Command::Repos,
        "list" => Command::List,
        "branches" => Command::Branches {
            repo: single_repo(&command, positional)?,
        },
        "import" => Command::Import {
            repo: single_repo(&command, positional)?,
            branch,
            path,
        },
        "publish" => Command::Publish {
            repo: single_repo(&command, positional)?,
            branch: branch.context("publish requires --branch")?,
            message: message.context("publish requires --message")?,
            path,
        },
        other => anyhow::bail!("unknown command: {other}"),
    };
    Ok(command)
}

fn flag_value(flag: &str, value: Option<String>) -> anyhow::Result<String> {
    value
        .filter(|value| !value.starts_with('-'))
        .with_context(|| format!("{flag} requires a value"))
}

fn single_repo(command: &str, positional: Vec<String>) -> anyhow::Result<String> {
    match <[String; 1]>::try_from(positional) {
        Ok([repo]) => Ok(repo),
        Err(_) => anyhow::bail!("{command} expects exactly one <owner/repo> argument"),
    }
}

fn print_usage() {
    println!("Usage: travis-workspace <command> [options]");
    println!("  repos                                   List repositories of the authenticated user");
    println!("  branches <owner/repo>                   List branches of a repository");
    println!("  import <owner/repo> [--branch B] [--path P]");
    println!("                                          Replace the workspace with a repository snapshot");
    println!("  publish <owner/repo> --branch B --message M [--path P]");
    println!("                                          Commit workspace files back to the repository");
    println!("  list                                    List workspace files and folders");
}

fn init_tracing() {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("travis_workspace=info,travis_github=info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn github_client(config: &WorkspaceConfig) -> anyhow::Result<GithubClient> {
    let client = match &config.github_api_url {
        Some(url) => GithubClient::with_base_url(url, config.github_token.clone()),
        None => GithubClient::new(config.github_token.clone()),
    };
    client.context("failed to build GitHub client")
}

async fn open_store(config: &WorkspaceConfig) -> anyhow::Result<Arc<WorkspaceStore>> {
    let store = match &config.db_path {
        Some(path) => WorkspaceStore::open(path).await,
        None => WorkspaceStore::new_default().await,
    };
    Ok(Arc::new(store.context("failed to open workspace store")?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let command = parse_cli(std::env::args())?;
    if command == Command::Help {
        print_usage();
        return Ok(());
    }
    let config = WorkspaceConfig::from_env()?;

    match command {
        Command::Help => {}
        Command::Repos => {
            let client = github_client(&config)?;
            for repo in client.list_repositories().await? {
                let branch = repo.default_branch.as_deref().unwrap_or("-");
                println!("{}\t{}", repo.full_name, branch);
            }
        }
        Command::Branches { repo } => {
            let client = github_client(&config)?;
            for branch in client.list_branches(&repo).await? {
                println!("{}\t{}", branch.name, branch.commit.sha);
            }
        }
        Command::List => {
            let store = open_store(&config).await?;
            for node in store.list().await? {
                println!("{:?}\t{}", node.kind, node.path);
            }
        }
        Command::Import { repo, branch, path } => {
            let client = github_client(&config)?;
            let store = open_store(&config).await?;
            let mut target = SyncTarget::parse(&repo, branch.as_deref().unwrap_or(DEFAULT_BRANCH))?;
            if let Some(path) = path {
                target = target.with_path(path);
            }
            let importer = WorkspaceImporter::from_config(&config, Arc::new(client), store);
            let outcome = match importer.request_sync(&target).await {
                Ok(outcome) => outcome,
                Err(rejected) => anyhow::bail!("sync rejected: {rejected}"),
            };
            println!("{}", outcome.summary());
            for path in outcome.failed_paths() {
                println!("  failed: {path}");
            }
            for path in &outcome.degraded_files {
                println!("  empty (content unavailable): {path}");
            }
            if !outcome.succeeded() {
                anyhow::bail!("import of {target} produced nothing");
            }
        }
        Command::Publish {
            repo,
            branch,
            message,
            path,
        } => {
            let client = github_client(&config)?;
            let store = open_store(&config).await?;
            let target = SyncTarget::parse(&repo, branch)?;
            let publisher = WorkspacePublisher::new(client, store);
            let outcome = publisher.publish(&target, &message, path.as_deref()).await?;
            println!("{}", outcome.summary());
            for path in &outcome.failed {
                println!("  failed: {path}");
            }
        }
    }
    Ok(())
}
