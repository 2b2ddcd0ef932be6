use std::time::Duration;

use kube::Client;

use stargazer::access::{KubeClusterAccess, NamespaceScope};
use stargazer::cache::TtlCache;
use stargazer::clock::system_clock;
use stargazer::evaluator::default_evaluator;
use stargazer::issues::{self, IssueDetectorConfig};
use stargazer::logging::tracing_logger;
use stargazer::topology::{self, BuildParams};
use stargazer::StargazerError;

/// Default query deadline, `spec.md` §5: "Each query carries a deadline
/// (default 30s)".
const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

pub async fn run(namespace: String, json: bool) -> Result<(), StargazerError> {
    let client = Client::try_default().await.map_err(|e| {
        StargazerError::PermanentOther {
            context: "connecting to cluster".to_string(),
            source: anyhow::anyhow!(e),
        }
    })?;

    let access = KubeClusterAccess::new(client);
    let cache = TtlCache::new(stargazer::cache::DEFAULT_TTL);
    let clock = system_clock();
    let logger = tracing_logger();
    let evaluator = default_evaluator();
    let scope = NamespaceScope::parse(&namespace);

    let params = BuildParams {
        typed: &access,
        dynamic: &access,
        cache: &cache,
        clock: clock.as_ref(),
        logger: logger.as_ref(),
        evaluator: &evaluator,
        scope,
        deadline: DEFAULT_DEADLINE,
    };

    let snapshot = topology::build(params).await?;
    let issue_config = IssueDetectorConfig::default();
    let found = issues::detect(&snapshot, &issue_config, snapshot.generated_at);

    if json {
        let payload = serde_json::json!({
            "snapshot": snapshot,
            "issues": found,
        });
        println!("{}", serde_json::to_string_pretty(&payload).unwrap());
        return Ok(());
    }

    println!(
        "Scanned {} service(s) across {} namespace(s) at {}",
        snapshot.services.len(),
        snapshot.namespaces.len(),
        snapshot.generated_at.to_rfc3339()
    );
    if !snapshot.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &snapshot.warnings {
            println!("  - {warning}");
        }
    }

    println!("\nIssues found: {}", found.len());
    for issue in &found {
        println!(
            "  [{:?}] {} ({} {}/{})",
            issue.priority, issue.title, issue.resource_type, issue.namespace, issue.resource_name
        );
    }

    Ok(())
}
