use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "kayako-tickets",
    version,
    about = "Summarize open Kayako tickets per department for desktop widgets"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch open tickets and print the summary (the default command).
    Poll {
        #[arg(long, help = "Print a human-readable listing instead of JSON")]
        text: bool,
    },
    /// Show configuration and cached session state.
    Status,
    /// Authenticate now and replace the cached session.
    Login,
    /// Forget the cached session.
    Logout,
}
