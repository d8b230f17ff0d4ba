use std::sync::Arc;

use clap::Parser;
use eyre::WrapErr;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fanout::{
    config::{Args, Config},
    endpoint::{EndpointSelector, HttpDialer},
    input,
    keystore::FileKeyStore,
    notify::{ResultSink, WebhookNotifier},
    pipeline::Pipeline,
    schedule::WorkSchedule,
    submitter::TransactionSubmitter,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config).await?;

    let input = input::collect(args.private_key, args.accounts, args.workers)
        .wrap_err("reading operator input")?;
    let operator = input.operator;
    info!(operator = %operator.address(), accounts = input.accounts, workers = input.workers, "starting run");

    let dialer = HttpDialer {
        chain_id: config.chain_id,
        call_timeout: config.call_timeout,
    };
    let connected = EndpointSelector::connect(&dialer, &config.endpoints).await?;
    info!(url = %connected.endpoint.url, chain_id = config.chain_id, "using endpoint");

    let submitter = Arc::new(TransactionSubmitter::new(
        Arc::new(connected.rpc),
        config.submitter,
    ));
    let keystore = Arc::new(FileKeyStore::new(&config.key_file));
    let sink = Arc::new(match &config.notify {
        Some(notify) => {
            info!(batch_size = notify.batch_size, "webhook notification enabled");
            let notifier = WebhookNotifier::new(notify.url.clone(), notify.timeout)?;
            ResultSink::new(Box::new(notifier), notify.batch_size)
        }
        None => ResultSink::disabled(),
    });
    let pipeline = Arc::new(Pipeline::new(
        submitter,
        keystore,
        sink.clone(),
        operator,
        config.route(),
    ));

    let report = WorkSchedule::new(input.workers)
        .run(input.accounts, |index| {
            let pipeline = pipeline.clone();
            async move { pipeline.run(index).await }
        })
        .await;

    let key_file = config
        .notify
        .as_ref()
        .filter(|notify| notify.send_key_file)
        .map(|_| config.key_file.as_path());
    sink.finish(key_file).await;

    let skipped = report
        .completed
        .iter()
        .filter(|(_, outcome)| outcome.sweep.is_none())
        .count();
    for (index, outcome) in &report.completed {
        info!(index, address = %outcome.account.address(), "account ready");
    }
    if !report.failed.is_empty() {
        warn!(failed = ?report.failed, "some pipelines were abandoned");
    }
    info!(
        succeeded = report.completed.len(),
        failed = report.failed.len(),
        sweeps_skipped = skipped,
        key_file = %config.key_file.display(),
        "done"
    );

    Ok(())
}
