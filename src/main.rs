//! Roost - multi-account timeline sync for Mastodon-compatible servers
#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use roost::auth::{CredentialResolver, CredentialStore};
use roost::events::Action;
use roost::{
    Collection, Config, Database, DomainEvent, EventBus, EventKind, Notice, Predicate,
    SyncCoordinator,
};

/// Refresh interval used by `watch` when the config leaves it at 0
const DEFAULT_WATCH_INTERVAL_SECS: u64 = 120;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG=debug for verbose output)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match parse_args()? {
        Command::Auth { instance } => auth_flow(&instance).await,
        Command::Accounts => list_accounts(),
        Command::Refresh => refresh_once().await,
        Command::Watch => watch().await,
        Command::Timeline { account, limit } => timeline(account, limit),
        Command::Mutate {
            action,
            account,
            target,
        } => mutate(action, account, target).await,
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            print_version();
            Ok(())
        }
    }
}

/// CLI commands
enum Command {
    Auth {
        instance: String,
    },
    Accounts,
    Refresh,
    Watch,
    Timeline {
        account: Option<i64>,
        limit: usize,
    },
    Mutate {
        action: Action,
        account: i64,
        target: i64,
    },
    Help,
    Version,
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() == 1 {
        return Ok(Command::Help);
    }

    let command = args[1].as_str();
    if let Some(action) = mutation_action(command) {
        let account = parse_id(args.get(2), "account id")?;
        let target = parse_id(args.get(3), "target id")?;
        return Ok(Command::Mutate {
            action,
            account,
            target,
        });
    }

    match command {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "-v" | "--version" | "version" => Ok(Command::Version),

        "auth" => {
            let instance = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("Missing instance (e.g. mastodon.social)"))?
                .clone();
            Ok(Command::Auth { instance })
        }

        "accounts" => Ok(Command::Accounts),
        "refresh" => Ok(Command::Refresh),
        "watch" => Ok(Command::Watch),

        "timeline" | "tl" => {
            let account = args
                .get(2)
                .filter(|a| !a.starts_with('-'))
                .and_then(|a| a.parse().ok());
            let limit = args
                .iter()
                .position(|a| a == "--limit" || a == "-l")
                .and_then(|i| args.get(i + 1))
                .and_then(|s| s.parse().ok())
                .unwrap_or(20);
            Ok(Command::Timeline { account, limit })
        }

        other => Err(anyhow::anyhow!(
            "Unknown command: {other}\nRun 'roost --help' for usage"
        )),
    }
}

fn mutation_action(command: &str) -> Option<Action> {
    let action = match command {
        "favorite" | "fav" => Action::CreateFavorite,
        "unfavorite" | "unfav" => Action::DestroyFavorite,
        "retweet" | "boost" => Action::Retweet,
        "delete" => Action::DestroyStatus,
        "follow" => Action::CreateFriendship,
        "unfollow" => Action::DestroyFriendship,
        "block" => Action::CreateBlock,
        "unblock" => Action::DestroyBlock,
        "mute" => Action::CreateMute,
        "unmute" => Action::DestroyMute,
        "spam" => Action::ReportSpam,
        _ => return None,
    };
    Some(action)
}

fn parse_id(arg: Option<&String>, what: &str) -> Result<i64> {
    let arg = arg.ok_or_else(|| anyhow::anyhow!("Missing {what}"))?;
    arg.parse()
        .with_context(|| format!("Invalid {what}: {arg}"))
}

fn print_help() {
    let config_path = roost::paths::config_path()
        .map_or_else(|_| "Unknown".to_string(), |p| p.display().to_string());

    println!(
        r#"{}
Roost - multi-account timeline sync for Mastodon-compatible servers

USAGE:
    roost [COMMAND]

COMMANDS:
    auth <instance>                    Sign in to an instance
      Example:
        roost auth mastodon.social

    accounts                           List configured accounts
    refresh                            Refresh all activated accounts once
    watch                              Refresh periodically until Ctrl-C

    timeline [account] [OPTIONS]       Show the locally stored home timeline
      Options:
        -l, --limit <n>                Number of statuses (default: 20)

    favorite|unfavorite|retweet|delete <account> <status>
    follow|unfollow|block|unblock|mute|unmute|spam <account> <user>

OPTIONS:
    -h, --help                         Show this help message
    -v, --version                      Show version information

CONFIG:
    {}

HOMEPAGE:
    {}
"#,
        roost::LOGO,
        config_path,
        roost::REPO_URL
    );
}

fn print_version() {
    println!("roost {}", roost::VERSION);
}

/// Wire up the store, credentials and coordinator
fn open_sync() -> Result<SyncCoordinator> {
    let config = Config::load()?;
    let bus = EventBus::new();
    let db = Arc::new(Mutex::new(Database::open()?.with_notifier(bus.clone())));
    let resolver = CredentialResolver::new(Arc::clone(&db), CredentialStore::open()?);
    Ok(SyncCoordinator::new(Arc::new(resolver), db, bus, config))
}

/// Print notices from the coordinator until the bus goes away
fn print_notices(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut messages = bus.subscribe(EventKind::Message);
    tokio::spawn(async move {
        loop {
            match messages.recv().await {
                Ok(DomainEvent::Message(Notice::Error(text))) => eprintln!("✗ {text}"),
                Ok(DomainEvent::Message(Notice::Ok(text) | Notice::Info(text))) => {
                    println!("✓ {text}");
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "notice printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn auth_flow(instance: &str) -> Result<()> {
    let instance = if instance.starts_with("http") {
        instance.to_string()
    } else {
        format!("https://{}", instance)
    };

    println!("🐘 Authenticating with {}...", instance);

    let store = CredentialStore::open()?;
    let (client_id, client_secret) = match store.oauth_client(&instance)? {
        Some(client) => client,
        None => {
            let app = roost::api::mastodon::oauth::register_app(&instance).await?;
            println!("✓ App registered");
            store.store_oauth_client(&instance, &app.client_id, &app.client_secret)?;
            (app.client_id, app.client_secret)
        }
    };

    let auth_url = roost::api::mastodon::oauth::get_auth_url(&instance, &client_id);
    println!("\n📋 Open this URL in your browser:\n\n  {}\n", auth_url);

    // Try to open browser
    let _ = open::that(&auth_url);

    println!("Paste the authorization code here:");
    let mut code = String::new();
    std::io::stdin().read_line(&mut code)?;
    let code = code.trim();

    let token =
        roost::api::mastodon::oauth::get_token(&instance, &client_id, &client_secret, code).await?;

    let client = roost::api::mastodon::MastodonClient::new(&instance, &token.access_token);
    let user = client.verify_credentials().await?;

    let mut account = roost::Account::new(user.id, &user.screen_name, &instance, user.display_name());
    account.avatar_url = user.avatar_url.clone();

    let db = Database::open()?;
    account.id = db.insert_account(&account)?;
    store.store_token(&account, &token.access_token)?;

    println!("\n✓ Logged in as {}", account.full_handle());
    println!("✓ Account saved (id {})", account.id);
    Ok(())
}

fn list_accounts() -> Result<()> {
    let db = Database::open()?;
    let accounts = db.get_accounts()?;

    if accounts.is_empty() {
        println!("No accounts configured.");
        println!("\nAdd an account with:");
        println!("  roost auth <instance>");
        return Ok(());
    }

    println!("Configured accounts:\n");

    for account in accounts {
        let default_marker = if account.is_default { " (default)" } else { "" };
        let activated = if account.is_activated { "" } else { " [inactive]" };
        println!(
            "  [{}] {} {}{}{}\n    Server: {}",
            account.id,
            account.display_name,
            account.full_handle(),
            default_marker,
            activated,
            account.server
        );
    }

    Ok(())
}

async fn refresh_once() -> Result<()> {
    let sync = open_sync()?;
    let printer = print_notices(sync.bus());

    let started = sync.refresh_all().await?;
    if started.is_empty() {
        println!("No activated accounts. Run: roost auth <instance>");
    }
    sync.wait_idle().await;

    printer.abort();
    Ok(())
}

async fn watch() -> Result<()> {
    let sync = open_sync()?;
    let printer = print_notices(sync.bus());

    let secs = match sync.config().refresh_interval_secs {
        0 => DEFAULT_WATCH_INTERVAL_SECS,
        secs => secs,
    };
    println!("Refreshing every {secs}s, Ctrl-C to stop");

    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sync.refresh_all().await {
                    eprintln!("✗ Refresh failed: {e:#}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("\nWaiting for running tasks...");
    sync.wait_idle().await;
    printer.abort();
    Ok(())
}

fn timeline(account: Option<i64>, limit: usize) -> Result<()> {
    let db = Database::open()?;
    let predicate = account.map_or(Predicate::All, Predicate::account);
    let statuses = db.get_statuses(Collection::HomeStatuses, &predicate, limit)?;

    if statuses.is_empty() {
        println!("Nothing stored yet. Run: roost refresh");
        return Ok(());
    }

    println!("{}", "─".repeat(60));
    for status in statuses {
        match &status.retweeted_by {
            Some(retweeter) => println!(
                "\n@{} · {} (🔁 @{})",
                status.user.screen_name,
                status.relative_time(),
                retweeter.screen_name
            ),
            None => println!("\n@{} · {}", status.user.screen_name, status.relative_time()),
        }
        println!("{}", textwrap::fill(&status.text, 60));
        println!(
            "♥ {}  🔁 {}  💬 {}{}",
            status.favorite_count,
            status.retweet_count,
            status.reply_count,
            if status.is_favorite { "  ★" } else { "" }
        );
        if status.is_gap {
            println!("\n{:─^60}", " load more ");
        }
    }

    Ok(())
}

async fn mutate(action: Action, account: i64, target: i64) -> Result<()> {
    let sync = open_sync()?;

    let outcome = match action {
        Action::CreateFavorite => sync.create_favorite(account, target).await.map(drop),
        Action::DestroyFavorite => sync.destroy_favorite(account, target).await.map(drop),
        Action::Retweet => sync.retweet_status(account, target).await.map(drop),
        Action::DestroyStatus => sync.destroy_status(account, target).await.map(drop),
        other => sync.friendship(other, account, target).await.map(drop),
    };
    outcome.with_context(|| format!("Failed to {}", action.label()))?;

    println!("✓ {} succeeded", action.label());
    Ok(())
}
