use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "mstfinder")]
#[command(about = "Resolves business tax codes (MST) to authoritative registry records")]
#[command(version)]
pub struct Cli {
    /// Create default configuration file at ./config/mstfinder.toml
    #[arg(long)]
    pub init: bool,

    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the pending-input directory from config
    #[arg(long)]
    pub pending_dir: Option<String>,

    /// Override the output directory from config
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Only synthesize candidate links and write the LINKS projection;
    /// no browser, no network, inputs stay pending
    #[arg(long)]
    pub dry_run: bool,

    /// Skip operator pauses (warm-up and challenges). Challenges then fail
    /// their tier as blocked instead of waiting for a human
    #[arg(long)]
    pub auto_continue: bool,

    /// Verbose logging (use -v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Map the -v count to a tracing directive for the default env filter.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "mstfinder=info",
            1 => "mstfinder=debug",
            _ => "mstfinder=trace",
        }
    }
}
