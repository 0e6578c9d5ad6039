use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "notememo")]
#[command(about = "Minimal Markdown notes with offline-first sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Never contact the sync server for this invocation
    #[arg(long, global = true)]
    pub offline: bool,

    /// Quick capture: notememo "my note here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note content (Markdown)
        content: Vec<String>,
        /// Title; defaults to the first line of the content
        #[arg(short, long)]
        title: Option<String>,
        /// Category name
        #[arg(short, long)]
        category: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },
    /// List recent notes
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Filter notes by category name
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search notes
    Search {
        /// Search query
        query: String,
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note (opens $EDITOR when no field flags are given)
    Edit {
        /// Note ID or unique ID prefix
        id: String,
        /// New title
        #[arg(short, long)]
        title: Option<String>,
        /// New category name
        #[arg(short, long)]
        category: Option<String>,
        /// Replace tags (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Option<Vec<String>>,
    },
    /// Delete an existing note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Manage categories
    Categories {
        #[command(subcommand)]
        command: Option<CategoryCommands>,
    },
    /// Export notes
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Sync with the NoteMemo server
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl From<ExportFormat> for notememo_core::export::ExportFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Json => Self::Json,
            ExportFormat::Markdown => Self::Markdown,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// List categories with note counts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a category
    Add {
        /// Category name
        name: String,
        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Rename a category; its notes follow
    Rename {
        /// Current name
        name: String,
        /// New name
        new_name: String,
        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a category; its notes move to 其他
    Delete {
        /// Category name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run one sync pass now
    Run,
    /// Show sync status reported by the server
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget sync watermarks and run a full pass
    Reset,
    /// List devices that have synced for this user
    Devices {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing on the configured interval until interrupted
    Watch,
}
