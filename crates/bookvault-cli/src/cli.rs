use bookvault_core::config::ENV_API_BASE_URL;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bookvault", version, about = "Library circulation client")]
pub struct Cli {
    /// API base URL (overrides the config file)
    #[arg(long, global = true, env = ENV_API_BASE_URL)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and store the session
    Login {
        /// Email address (defaults to the last used one)
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Create a reader account, or an administrator account with --admin
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Register an administrator (requires an administrator session)
        #[arg(long)]
        admin: bool,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user and credential details
    Whoami,
    /// Browse and administer the catalog
    Books {
        #[command(subcommand)]
        action: BookCommand,
    },
    /// Borrow a book
    Borrow { book_id: i64 },
    /// Return a book using the issue record ID printed when it was borrowed
    Return { issue_record_id: i64 },
    /// Keep the session open and report when it expires
    Watch,
}

#[derive(Debug, Subcommand)]
pub enum BookCommand {
    List,
    Show { id: i64 },
    Add(BookFields),
    Update {
        id: i64,
        #[command(flatten)]
        fields: BookFields,
    },
    Delete { id: i64 },
}

/// Catalog form fields. On update, omitted fields keep their current value.
#[derive(Debug, Args)]
pub struct BookFields {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub isbn: Option<String>,
    #[arg(long)]
    pub quantity: Option<i32>,
    #[arg(long)]
    pub available: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_update_with_partial_fields() {
        let cli = Cli::parse_from(["bookvault", "books", "update", "4", "--quantity", "6"]);
        match cli.command {
            Command::Books {
                action: BookCommand::Update { id, fields },
            } => {
                assert_eq!(id, 4);
                assert_eq!(fields.quantity, Some(6));
                assert!(fields.title.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_api_url_reads_environment() {
        use clap::CommandFactory;
        let command = Cli::command();
        let arg = command
            .get_arguments()
            .find(|arg| arg.get_id() == "api_url")
            .expect("api_url argument");
        assert_eq!(arg.get_env(), Some(std::ffi::OsStr::new(ENV_API_BASE_URL)));
    }

    #[test]
    fn test_parse_global_api_url() {
        let cli = Cli::parse_from(["bookvault", "whoami", "--api-url", "http://lib:8080"]);
        assert_eq!(cli.api_url.as_deref(), Some("http://lib:8080"));
    }
}
