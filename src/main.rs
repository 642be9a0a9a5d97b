use std::process::ExitCode;

use cachescale::ClusterVerifier;
use cachescale::PlanReport;
use cachescale::Result;
use cachescale::SyncStrategy;
use cachescale::TcpConnector;
use cachescale::VerifierConfig;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    init_observability();

    match run().await {
        Ok(reports) if reports.iter().all(PlanReport::is_success) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("cachescale stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<Vec<PlanReport>> {
    let settings = VerifierConfig::new()?.validate()?;
    if settings.plans.is_empty() {
        warn!("No plans configured; set CONFIG_PATH to a file with [[plans]]");
        return Ok(Vec::new());
    }
    info!(?settings, "configuration loaded");

    let sync = SyncStrategy::from_config(&settings.sync, &settings.network);
    let connector = TcpConnector::new(settings.network.clone());
    let verifier = ClusterVerifier::new(sync, settings.verify.clone());

    let reports = tokio::select! {
        reports = verifier.run_all(&settings.plans, &settings.cluster, &connector) => reports,
        _ = tokio::signal::ctrl_c() => {
            warn!("Ctrl+C detected, abandoning the remaining plans");
            return Ok(vec![interrupted()]);
        }
    };

    print_summary(&reports);
    Ok(reports)
}

fn interrupted() -> PlanReport {
    let mut report = PlanReport::new("interrupted");
    report.aborted = Some(cachescale::Error::Fatal("interrupted by operator".to_string()));
    report
}

fn print_summary(reports: &[PlanReport]) {
    for plan in reports {
        info!("{}", plan);
        for stage in &plan.stages {
            info!("  {}", stage);
            for check in &stage.checks {
                info!("    {}", check);
            }
            for scenario in &stage.scenarios {
                info!("    {}", scenario);
            }
        }
        for defect in plan.tolerated_defects() {
            warn!("  tolerated: {}", defect);
        }
    }
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::registry().with(base_subscriber).init();
}
