//! Pushes one JSON document onto a gateway queue through the reliable
//! publisher. Broker settings come from `RABBITMQ_*` variables.
//!
//! Exit status: 0 when the broker confirmed the message, 75 (EX_TEMPFAIL)
//! when publishing failed and may be retried, 1 for bad input.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use wms_messaging_core::KnownQueue;
use wms_messaging_rabbitmq::{global, init_tracing, push_message, ShutdownHook};

const EXIT_TEMPFAIL: u8 = 75;

#[derive(Parser, Debug)]
#[command(name = "wms-publish", version, about = "Push a JSON document onto a WMS gateway queue")]
struct Cli {
    /// Target queue; unknown names are declared as plain durable queues
    #[arg(short, long, required_unless_present = "list_queues")]
    queue: Option<String>,

    /// Inline JSON payload (stdin is read when neither this nor --file is given)
    #[arg(short, long, conflicts_with = "file")]
    payload: Option<String>,

    /// Read the JSON payload from a file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Print the known queues with their dead-letter routing and exit
    #[arg(long)]
    list_queues: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("wms-publish: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if cli.list_queues {
        print_queues();
        return Ok(ExitCode::SUCCESS);
    }

    let raw = read_payload(cli.payload, cli.file.as_ref())?;
    let payload: serde_json::Value =
        serde_json::from_str(&raw).context("payload is not valid JSON")?;
    let queue = cli.queue.context("--queue is required")?;

    let hook = ShutdownHook::new(global());
    hook.install();

    let published = push_message(&queue, &payload).await;
    hook.run().await;

    if published {
        info!(queue = %queue, "message delivered");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(queue = %queue, "message not delivered, safe to retry");
        Ok(ExitCode::from(EXIT_TEMPFAIL))
    }
}

fn read_payload(inline: Option<String>, file: Option<&PathBuf>) -> Result<String> {
    if let Some(raw) = inline {
        return Ok(raw);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("reading payload from {}", path.display()));
    }
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("reading payload from stdin")?;
    Ok(raw)
}

fn print_queues() {
    for queue in KnownQueue::ALL {
        match queue.dead_letter() {
            Some(dl) => println!(
                "{:<36} {:?} dlx={} dlk={}",
                queue.name(),
                queue,
                dl.exchange,
                dl.routing_key
            ),
            None => println!("{:<36} {:?}", queue.name(), queue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn queue_required_unless_listing() {
        assert!(Cli::try_parse_from(["wms-publish", "--payload", "{}"]).is_err());
        assert!(Cli::try_parse_from(["wms-publish", "--list-queues"]).is_ok());

        let cli = Cli::try_parse_from(["wms-publish", "-q", "stock_out_back", "-p", "{\"a\":1}"])
            .unwrap();
        assert_eq!(cli.queue.as_deref(), Some("stock_out_back"));
    }

    #[test]
    fn inline_payload_wins() {
        let raw = read_payload(Some("{\"a\":1}".into()), None).unwrap();
        assert_eq!(raw, "{\"a\":1}");
    }
}
