use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "simplenote")]
#[command(about = "Keep notes in step with your SimpleNote server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local cache database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name (server and credentials)
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Quick capture: simplenote "my note here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title (defaults to the first line of the content)
        #[arg(short, long)]
        title: Option<String>,
        /// Note content
        content: Vec<String>,
    },
    /// List cached notes
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Reconcile with the server before listing
        #[arg(long)]
        sync: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a single note
    Show {
        /// Note ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note
    Edit {
        /// Note ID
        id: String,
        /// New title (content is edited in $EDITOR)
        #[arg(short, long)]
        title: Option<String>,
    },
    /// Delete an existing note
    Delete {
        /// Note ID
        id: String,
    },
    /// Reconcile the local cache with the server
    Sync,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the account and stored credentials
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// API root, e.g. http://localhost:8000/api/
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// HTTP request timeout in seconds
        #[arg(long, value_name = "SECS")]
        request_timeout_secs: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Show the resolved configuration for a profile
    Show {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Login with username/password and store credentials in the keychain
    Login {
        /// Account username
        #[arg(long, value_name = "USERNAME")]
        username: String,
        /// Account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show whether the profile holds credentials
    Status,
    /// Clear stored credentials
    Logout,
    /// Register a new account
    Signup {
        #[arg(long, value_name = "USERNAME")]
        username: String,
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
        #[arg(long, value_name = "NAME")]
        first_name: Option<String>,
        #[arg(long, value_name = "NAME")]
        last_name: Option<String>,
    },
    /// Show the signed-in user's profile
    Whoami,
    /// Change the account password
    ChangePassword {
        #[arg(long, value_name = "PASSWORD")]
        old_password: String,
        #[arg(long, value_name = "PASSWORD")]
        new_password: String,
    },
}
