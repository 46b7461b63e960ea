use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Offline request cache for the network monitor dashboard",
    long_about = "Drives the dashboard's offline cache against a running backend.\n\
                  \n\
                  The cache is stored on disk, so a version installed by one run\n\
                  keeps answering requests in the next one, with or without network."
)]
pub struct CliArgs {
    /// Origin the dashboard is served from
    #[arg(long, env = "NETMON_OFFLINE_ORIGIN", global = true)]
    pub origin: Option<String>,

    /// Directory holding the cache store
    #[arg(long, env = "NETMON_OFFLINE_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Populate the current cache version from the asset manifest
    Install,

    /// Remove stale cache versions and take control
    Activate,

    /// Install, then activate immediately
    Start,

    /// Answer one request the way the dashboard page would see it
    Fetch {
        /// Path on the origin, e.g. /static/css/styles.css
        path: String,

        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Accept header to send, e.g. text/html
        #[arg(short, long)]
        accept: Option<String>,

        /// Behave as if the network were down
        #[arg(long)]
        offline: bool,

        /// Write the response body to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Deliver a push message as a notification
    Push {
        /// JSON payload, e.g. '{"title":"Latency alert"}'
        payload: Option<String>,

        /// Also simulate a click on the notification
        #[arg(long)]
        click: bool,
    },

    /// Show the cache versions and lifecycle state
    Status,

    /// Write the effective configuration to the config file
    InitConfig,
}
