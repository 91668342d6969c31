use clap::{Parser, Subcommand};

/// HTTP gateway that runs media transcode jobs through ffmpeg
#[derive(Debug, Parser)]
#[command(name = "media-gateway", version, about)]
pub struct Cli {
    /// Listen port, overrides PORT
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Run one janitor pass over the work directory and exit
    Sweep,
    /// Report the media engine path and version; fails if none is found
    CheckEngine,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}
