use clap::Parser;

use cgi_gateway::conformance::{Harness, HarnessConfig, RunOutcome, BASE_URL_1, BASE_URL_2};

#[derive(Parser)]
#[command(name = "cgi-conformance")]
#[command(about = "Conformance harness for a running CGI gateway", long_about = None)]
struct Cli {
    /// First gateway endpoint.
    #[arg(long, default_value = BASE_URL_1)]
    base_url_1: String,

    /// Second gateway endpoint.
    #[arg(long, default_value = BASE_URL_2)]
    base_url_2: String,

    /// Handler used for the crash resilience suite.
    #[arg(long, default_value = "/test_error.py")]
    error_handler: String,

    /// Number of requests in the concurrency suite.
    #[arg(long, default_value_t = 50)]
    concurrency: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = HarnessConfig {
        base_url_1: cli.base_url_1,
        base_url_2: cli.base_url_2,
        error_handler: cli.error_handler,
        concurrency: cli.concurrency,
        ..HarnessConfig::default()
    };

    println!("CGI gateway conformance harness");
    println!("Targets: {} and {}\n", config.base_url_1, config.base_url_2);

    let harness = Harness::new(config)?;
    let outcome = harness.run().await;

    match &outcome {
        RunOutcome::Unreachable { url, error } => {
            eprintln!("Gateway not reachable at {url}: {error}");
            eprintln!("No tests were run.");
        }
        RunOutcome::Completed(report) => report.print_summary(),
    }

    std::process::exit(outcome.exit_code());
}
