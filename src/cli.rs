use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stargazer")]
#[command(about = "Kubernetes topology & reachability diagnostic tool")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// The three host-program commands `spec.md` §6 names: `setup`,
/// `scan [--namespace]`, `web`. `check`/`list` are kept as thin
/// cluster-access smoke tests in the same idiom the teacher crate uses for
/// its own `check`/`list` commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Write a validated configuration file (`spec.md` §6's YAML shape).
    Setup {
        /// Destination path for the config file.
        #[arg(long, default_value = "~/.stargazer/config.yaml")]
        output: String,
    },

    /// Build one topology snapshot and report issues found.
    Scan {
        /// Namespace to scope the scan to; empty or "all" means cluster-wide.
        #[arg(long, default_value = "")]
        namespace: String,

        /// Emit the full snapshot and issue list as JSON instead of a
        /// human-readable summary.
        #[arg(long)]
        json: bool,
    },

    /// Serve the last scan as JSON plus a Prometheus `/metrics` endpoint.
    Web {
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,
    },

    /// Check cluster connectivity and permissions.
    Check,

    /// List Kubernetes resources (pods).
    List {
        /// Resource type to list (pods).
        resource: String,
    },
}
