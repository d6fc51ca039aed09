mod cli;

use anyhow::Context;
use futures::stream::{self, StreamExt};
use log::{error, info};
use ratelimit_client::{Config, RateLimitClient};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli::build_cli().get_matches();
    let opts = cli::CliOptions::from_matches(&matches);

    cli::init_logging(opts.log_level.as_deref());

    if opts.version {
        println!("ratelimit-client {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let url = opts.url.clone().context("missing URL")?;
    let mut cfg = Config::from_env()?;
    if let Some(n) = opts.max_retries {
        cfg.max_retries = n;
    }
    if let Some(ms) = opts.base_backoff_ms {
        cfg.base_backoff = Duration::from_millis(ms);
    }
    if opts.token.is_some() {
        cfg.token = opts.token.clone();
    }

    run_fetch(&cfg, &url, opts.count, opts.concurrency.max(1)).await
}

async fn run_fetch(cfg: &Config, url: &str, count: usize, concurrency: usize) -> anyhow::Result<()> {
    let client = Arc::new(RateLimitClient::from_config(cfg)?);
    info!("sending {} request(s) to {} with concurrency {}", count, url, concurrency);

    let mut results: Vec<(usize, Result<reqwest::StatusCode, ratelimit_client::Error>)> =
        stream::iter(0..count)
            .map(|i| {
                let client = Arc::clone(&client);
                let mut builder = client.transport().client().get(url);
                if let Some(token) = &cfg.token {
                    builder = builder.bearer_auth(token);
                }
                async move {
                    let outcome = match builder.build() {
                        Ok(req) => client.execute(req).await.map(|resp| resp.status()),
                        Err(e) => Err(e.into()),
                    };
                    (i, outcome)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
    results.sort_by_key(|(i, _)| *i);

    let mut failures = 0usize;
    for (i, outcome) in &results {
        match outcome {
            Ok(status) => println!("{} {}", i, status.as_u16()),
            Err(e) => {
                failures += 1;
                error!("request {} failed: {}", i, e);
                println!("{} error", i);
            }
        }
    }

    println!("{}", serde_json::to_string(&client.snapshot())?);

    if failures > 0 {
        anyhow::bail!("{} of {} requests failed", failures, count);
    }
    Ok(())
}
