use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use taskwire::{
    cli::Args,
    client::TaskStreamClient,
    config::Config,
    formatter::{EventFormatter, OutputFormat},
    monitoring::setup_metrics,
    tracing_setup::setup_tracing,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_tracing(&args.log_level, args.json_logs)?;
    info!("starting taskwire v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_args(&args)?;
    if config.metrics.enabled {
        setup_metrics(config.metrics.port).await?;
    }

    let formatter = Arc::new(EventFormatter::new(
        OutputFormat::from(args.format.as_str()),
        !args.no_color,
    ));
    let client = TaskStreamClient::new(config);

    {
        let formatter = formatter.clone();
        client.on_any(Arc::new(move |event| formatter.print_event(event)));
    }

    if !args.quiet {
        formatter.print_status(
            "connecting",
            &format!(
                "task {} via {}",
                args.task_id,
                if args.push_only {
                    "push-only stream"
                } else {
                    "bidirectional channel"
                }
            ),
        );
    }

    if args.push_only {
        client.connect_push_only(&args.task_id).await?;
    } else {
        client.connect_bidirectional(&args.task_id).await?;
    }

    if !args.quiet {
        formatter.print_status("connected", &args.task_id);
        formatter.print_header();
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    client.disconnect().await;

    if !args.quiet {
        formatter.print_status("disconnected", &args.task_id);
    }
    Ok(())
}
