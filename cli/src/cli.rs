use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "gazette", version, about = "Submit articles and follow comment threads")]
pub struct Cli {
    /// Debug-level logs (overridden by GAZETTE_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, env = "GAZETTE_EMAIL", global = true)]
    pub email: Option<String>,

    #[arg(long, env = "GAZETTE_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit an article form (JSON) for review, or save it as a draft.
    Submit {
        form: PathBuf,
        #[arg(long)]
        draft: bool,
    },
    /// Print the comment thread of an article.
    Comments {
        article_id: String,
        /// Keep printing live additions until Ctrl-C.
        #[arg(short, long)]
        follow: bool,
    },
    /// Post a comment, or a reply with --parent.
    Comment {
        article_id: String,
        content: String,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Manage user profiles (admins only).
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum UsersAction {
    /// List profiles, newest first, twenty per page.
    List {
        /// Matches username or display name.
        #[arg(short, long)]
        search: Option<String>,
        /// Role to filter on, or "all".
        #[arg(short, long)]
        role: Option<String>,
        /// Zero-based page number.
        #[arg(short, long, default_value_t = 0)]
        page: u32,
    },
    /// Change fields of one profile.
    Update {
        user_id: String,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
}

impl Commands {
    pub fn requires_sign_in(&self) -> bool {
        !matches!(self, Self::Comments { .. })
    }
}
