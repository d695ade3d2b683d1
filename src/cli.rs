use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "storydeck",
    version,
    about = "Browse and play ephemeral story feeds in the terminal"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the story viewer (default command)
    View {
        /// Jump straight to one author's stories by handle
        #[arg(long)]
        author: Option<String>,
        /// Start on a specific story id (requires --author)
        #[arg(long, requires = "author")]
        item: Option<String>,
    },
    /// Print the feed roster without opening the viewer
    List,
}
