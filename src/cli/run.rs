//! Load test execution: workload, clients, scheduler, report

use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use tokenbench_core::{
    summarize, BenchmarkReport, ClientPool, LoadTestConfig, Normalizer, SchedulerBuilder,
    TestMetadata, TokenCounter,
};
use tokenbench_samplers::{ApproxTokenCounter, HfTokenCounter, PromptSource, WorkloadGenerator};
use tokenbench_vendors::{construct_clients, ClientConfig};

use super::{output, Cli};

/// Run a load test described by `cli`
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.to_config()?;
    let counter = token_counter(&config)?;

    let source = match &config.custom_prompt {
        Some(text) => PromptSource::Custom(text.clone()),
        None => PromptSource::Corpus {
            mean_input_tokens: config.mean_input_tokens,
            stddev_input_tokens: config.stddev_input_tokens,
        },
    };
    let workload = WorkloadGenerator::from_seed(config.seed)
        .build_workload(
            &*counter,
            &source,
            config.max_completed_requests,
            config.mean_output_tokens as f64,
            config.stddev_output_tokens,
        )
        .context("failed to generate workload")?;
    let prompt = workload.prompt().clone();

    let client_config = ClientConfig::new(config.endpoint.clone().unwrap_or_default())
        .with_api_key(config.api_key.clone())
        .with_request_timeout(config.timeout + config.final_drain_grace);
    let clients = construct_clients(config.api, config.concurrency, &client_config)
        .context("failed to construct clients")?;
    let pool = ClientPool::new(clients)?;

    let scheduler = SchedulerBuilder::new()
        .pool(pool)
        .normalizer(Normalizer::new(counter))
        .workload(workload)
        .template(config.request_template())
        .limits(&config)
        .progress(progress_bar(config.max_completed_requests))
        .build()?;

    let outcome = scheduler.run_with_signal_handling().await?;
    let pool_stats = &outcome.pool_stats;
    info!(
        stop_reason = %outcome.stop_reason,
        submitted = outcome.submitted,
        finished = pool_stats.total_requests(),
        client_errors = pool_stats.errors,
        client_error_rate = pool_stats.error_rate(),
        input_tokens_sent = pool_stats.input_tokens,
        busy_secs = pool_stats.busy_time.as_secs_f64(),
        abandoned = pool_stats.abandoned,
        "Run complete"
    );

    let summary = summarize(&outcome.records, outcome.start, outcome.end)?;
    summary.log();

    let report = BenchmarkReport::new(
        TestMetadata::new(&config, &prompt),
        summary,
        config.user_metadata.clone(),
        outcome.records,
    );
    println!("{}", output::render_summary(&report.results));

    if let Some(dir) = &cli.results_dir {
        let (summary_path, individual_path) = output::write_results(&report, dir)?;
        info!(
            summary = %summary_path.display(),
            individual_responses = %individual_path.display(),
            "Wrote results"
        );
    }

    Ok(())
}

fn token_counter(config: &LoadTestConfig) -> Result<Arc<dyn TokenCounter>> {
    match &config.tokenizer {
        Some(path) => {
            let counter = HfTokenCounter::from_path(path).context("failed to load tokenizer")?;
            info!(tokenizer = %counter.source().display(), "Counting tokens with tokenizer");
            Ok(Arc::new(counter))
        }
        None => {
            info!("No tokenizer given, estimating four characters per token");
            Ok(Arc::new(ApproxTokenCounter))
        }
    }
}

fn progress_bar(total: usize) -> ProgressBar {
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} completed {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    ProgressBar::new(total as u64).with_style(style)
}
