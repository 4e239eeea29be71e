//! Command-line parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "insight")]
#[command(about = "AI Insight CLI - terminal front end for the AI Insight dashboard")]
#[command(version)]
pub struct Cli {
    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    #[command(about = "Log in (password from INSIGHT_PASSWORD or prompt)")]
    Login { username: Option<String> },

    #[command(about = "Forget the stored session")]
    Logout,

    #[command(name = "whoami", alias = "status")]
    #[command(about = "Show the session and which views it can open")]
    WhoAmI,

    #[command(about = "Ask for an AI analysis of a topic")]
    Analyze {
        topic: String,
        /// Optional text to analyze; extra words are joined with spaces
        #[arg(trailing_var_arg = true)]
        text: Vec<String>,
    },

    #[command(about = "Manage user accounts (admin)")]
    Users {
        #[command(subcommand)]
        cmd: Option<UsersCommand>,
    },

    #[command(about = "Call the protected data endpoint")]
    Probe,

    #[command(about = "Run the authorization checks against the backend")]
    Check,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum UsersCommand {
    #[command(about = "List users")]
    List,

    #[command(about = "Show one user")]
    Get { id: i64 },

    #[command(about = "Search users by name or email")]
    Search { query: String },

    #[command(about = "Create a user (password is prompted)")]
    Create { username: String, email: String },

    #[command(about = "Change a user's email")]
    Update { id: i64, email: String },

    #[command(about = "Delete a user")]
    Delete { id: i64 },
}

impl Command {
    /// Text to analyze, if any words followed the topic
    pub fn joined_text(words: &[String]) -> Option<String> {
        (!words.is_empty()).then(|| words.join(" "))
    }
}
