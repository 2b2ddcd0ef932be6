mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use stargazer::StargazerError;

/// Exit codes of `spec.md` §6: 0 success, 1 usage error (handled by `clap`
/// itself when argument parsing fails, before `main` body runs), 2
/// cluster-access failure, 3 validation failure.
const EXIT_CLUSTER_ACCESS_FAILURE: i32 = 2;
const EXIT_VALIDATION_FAILURE: i32 = 3;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Setup { output } => commands::setup::run(&output),
        Commands::Scan { namespace, json } => commands::scan::run(namespace, json).await,
        Commands::Web { addr } => commands::web::run(&addr).await,
        Commands::Check => commands::check::run().await.map_err(anyhow_as_cluster_failure),
        Commands::List { resource } => commands::list::run(resource)
            .await
            .map_err(anyhow_as_cluster_failure),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(exit_code_for(&err));
    }
}

fn anyhow_as_cluster_failure(err: anyhow::Error) -> StargazerError {
    StargazerError::PermanentOther {
        context: "cluster access".to_string(),
        source: err,
    }
}

fn exit_code_for(err: &StargazerError) -> i32 {
    match err {
        StargazerError::ValidationError(_) => EXIT_VALIDATION_FAILURE,
        StargazerError::NotAuthorized(_)
        | StargazerError::Transient(_)
        | StargazerError::PermanentOther { .. } => EXIT_CLUSTER_ACCESS_FAILURE,
    }
}
