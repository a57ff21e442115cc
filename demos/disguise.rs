//! Validate every built-in identity against a fingerprint probe, then fetch
//! a target with profile rotation.
//!
//! Run with: cargo run --example disguise -- [probe_url] [target_url]
//!
//! Defaults: probe https://tls.peet.ws/api/all, target https://example.com/.
//! The static-header baseline is validated too, for contrast.

use guise::validate::DEFAULT_PROBE_URL;
use guise::{
    BoringEngine, Controller, Profile, ProfileRegistry, RequestIntent, RetryPolicy,
    ValidationResult, Validator, ValidatorConfig,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> guise::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,guise=debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let probe_url = args.next().unwrap_or_else(|| DEFAULT_PROBE_URL.to_string());
    let target_url = args.next().unwrap_or_else(|| "https://example.com/".to_string());

    let mut registry = ProfileRegistry::builtin();
    registry.register(Profile::static_headers())?;
    let controller = Controller::new(BoringEngine::new(), registry);
    let validator = Validator::new(
        controller.clone(),
        ValidatorConfig::default().probe_url(probe_url.clone()),
    );

    info!(probe = %probe_url, "validating identities");
    let names: Vec<String> = controller
        .registry()
        .list_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut tasks = Vec::new();
    for name in &names {
        let validator = validator.clone();
        let name = name.clone();
        tasks.push(tokio::spawn(async move {
            let report = validator.validate_report(&name).await;
            (name, report)
        }));
    }

    for task in tasks {
        let (name, report) = match task.await {
            Ok(done) => done,
            Err(e) => {
                error!(error = %e, "validation task panicked");
                continue;
            }
        };
        match report {
            Ok(report) => match &report.result {
                ValidationResult::Consistent => {
                    info!(profile = %name, protocol = ?report.observation.protocol, "PASS")
                }
                ValidationResult::Inconsistent(mismatches) => {
                    warn!(profile = %name, fields = ?report.result.mismatched_fields(), "FAIL");
                    for m in mismatches {
                        warn!(profile = %name, "  {}", m);
                    }
                }
            },
            Err(e) => error!(profile = %name, error = %e, "probe failed"),
        }
    }

    // Rotate through the browser identities only
    let sequence: Vec<&str> = names.iter().map(String::as_str).filter(|n| *n != "baseline").collect();
    let intent = RequestIntent::get(&target_url);
    info!(target = %target_url, "fetching with rotation");
    match controller.run(&intent, &sequence, &RetryPolicy::new(3)).await {
        Ok(outcome) => {
            info!(
                status = outcome.response.status,
                profile = outcome.response.profile(),
                protocol = %outcome.response.protocol(),
                bytes = outcome.response.body().len(),
                "fetched"
            );
            info!(attempts = %outcome.attempts, "attempt history");
        }
        Err(e) => error!(error = %e, "fetch failed"),
    }

    Ok(())
}
