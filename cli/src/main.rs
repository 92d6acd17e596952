use std::path::Path;

use anyhow::Context;
use clap::Parser;
use gazette_client::{ClientConfig, Gazette, Intent, ProfileFilters, ThreadUpdate};
use gazette_shared::{ArticleForm, Comment, Profile, ProfileUpdate};
use tracing::info;

mod cli;

use cli::{Cli, Commands, UsersAction};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("gazette error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = ClientConfig::from_env().context("invalid client configuration")?;
    let gazette = Gazette::new(config);

    let signed_in = match (&cli.email, &cli.password) {
        (Some(email), Some(password)) => {
            let session = gazette
                .rest
                .sign_in_with_password(email, password)
                .await
                .context("sign-in failed")?;
            info!(user_id = %session.user.id, "Signed in");
            true
        }
        _ => false,
    };
    if cli.command.requires_sign_in() && !signed_in {
        anyhow::bail!("this command needs --email and --password (or GAZETTE_EMAIL / GAZETTE_PASSWORD)");
    }

    let result = match cli.command {
        Commands::Submit { form, draft } => submit(&gazette, &form, draft).await,
        Commands::Comments { article_id, follow } => comments(&gazette, &article_id, follow).await,
        Commands::Comment {
            article_id,
            content,
            parent,
        } => comment(&gazette, &article_id, &content, parent.as_deref()).await,
        Commands::Users { action } => users(&gazette, action).await,
    };

    if signed_in {
        // Logout failures are already logged and never mask the command result.
        let _ = gazette.rest.sign_out().await;
    }
    result
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "warn" };

    let filter = tracing_subscriber::EnvFilter::try_from_env("GAZETTE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

async fn submit(gazette: &Gazette, path: &Path, draft: bool) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let form: ArticleForm =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a valid article form", path.display()))?;

    let intent = if draft { Intent::Draft } else { Intent::Review };
    let article_id = gazette.articles.submit_with_session(&form, intent).await?;
    println!("{article_id}");
    Ok(())
}

async fn comments(gazette: &Gazette, article_id: &str, follow: bool) -> anyhow::Result<()> {
    let mut thread = gazette
        .comments
        .open(article_id, gazette.session().user_id())
        .await
        .with_context(|| format!("failed to load comments for {article_id}"))?;

    for comment in thread.thread() {
        print_comment(comment, 0);
        for reply in &comment.replies {
            print_comment(reply, 1);
        }
    }

    if follow {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                update = thread.next_update() => match update {
                    Some(ThreadUpdate::CommentAdded(comment)) => print_comment(&comment, 0),
                    Some(ThreadUpdate::ReplyAdded { reply, .. }) => print_comment(&reply, 1),
                    None => {
                        eprintln!("live feed ended");
                        break;
                    }
                },
            }
        }
    }

    thread.close();
    Ok(())
}

async fn comment(gazette: &Gazette, article_id: &str, content: &str, parent: Option<&str>) -> anyhow::Result<()> {
    let mut thread = gazette
        .comments
        .open(article_id, gazette.session().user_id())
        .await
        .with_context(|| format!("failed to open comments for {article_id}"))?;

    let posted = match parent {
        Some(parent_id) => thread.submit_reply(content, parent_id).await,
        None => thread.submit_comment(content).await,
    };
    thread.close();

    println!("{}", posted?.id);
    Ok(())
}

async fn users(gazette: &Gazette, action: UsersAction) -> anyhow::Result<()> {
    match action {
        UsersAction::List { search, role, page } => {
            let filters = ProfileFilters {
                search,
                role,
                page,
                ..ProfileFilters::default()
            };
            let listing = gazette.rest.list_profiles(&filters).await?;
            for profile in &listing.profiles {
                print_profile(profile);
            }
            let pages = listing.total.div_ceil(u64::from(listing.page_size)).max(1);
            println!("{} users, page {} of {}", listing.total, listing.page + 1, pages);
        }
        UsersAction::Update {
            user_id,
            role,
            username,
            display_name,
            email,
            bio,
            avatar_url,
        } => {
            let update = ProfileUpdate {
                username,
                display_name,
                email,
                bio,
                avatar_url,
                role,
            };
            let profile = gazette
                .rest
                .update_profile(&user_id, update)
                .await
                .with_context(|| format!("failed to update user {user_id}"))?;
            print_profile(&profile);
        }
    }
    Ok(())
}

fn print_profile(profile: &Profile) {
    let badges = profile.badges();
    let badges = if badges.is_empty() {
        String::new()
    } else {
        format!(" [{}]", badges.join(", "))
    };
    let name = profile.display_name.as_deref().unwrap_or(&profile.username);
    println!("{} {} (@{}){}", profile.id, name, profile.username, badges);
}

fn print_comment(comment: &Comment, depth: usize) {
    let indent = "    ".repeat(depth);
    let badges = if comment.author.badges.is_empty() {
        String::new()
    } else {
        format!(" [{}]", comment.author.badges.join(", "))
    };
    println!("{indent}{} {}{} ({})", comment.id, comment.author.name, badges, comment.created_at);
    for line in comment.content.lines() {
        println!("{indent}  {line}");
    }
}
