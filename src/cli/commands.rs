use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arcana", version, about = "Arcana Tarot Reading Server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve,

    /// Run an interactive tarot reading in the terminal
    Reading {
        /// How many cards to draw
        #[arg(short = 'n', long, default_value_t = 3)]
        cards: usize,
        /// Level of detail for the interpretation (e.g. "brief", "detailed")
        #[arg(short, long)]
        detail: Option<String>,
    },

    /// Inspect stored reading sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Browse the card catalog
    Cards {
        #[command(subcommand)]
        action: CardsAction,
    },

    /// Manage bearer tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Print a session transcript
    Show {
        id: String,
    },

    /// Export a session transcript to a .txt file
    Export {
        id: String,
        /// The path to the output file (optional)
        #[arg(short, long)]
        path: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CardsAction {
    /// List every card in the catalog
    List,

    /// Draw a random spread
    Draw {
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },
}

#[derive(Subcommand)]
pub enum TokenAction {
    /// Issue a token for a user id
    Issue {
        #[arg(short, long)]
        user: i64,
    },
}
