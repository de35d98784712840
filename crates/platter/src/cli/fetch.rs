//! The `platter fetch` command: re-host one URL and print its report.

use clap::Args;
use platter_core::output::to_json;
use platter_core::{Config, ImageRequest, Ingestor};

/// Arguments for the `fetch` command.
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Image URL as found in model output
    pub url: String,

    /// Referer to send upstream
    #[arg(long)]
    pub referer: Option<String>,

    /// Single-line JSON instead of pretty-printed
    #[arg(long)]
    pub compact: bool,
}

/// Execute the fetch command.
///
/// A failed ingest still prints a report; the exit status only reflects
/// errors in Platter itself.
pub async fn execute(args: FetchArgs, config: Config) -> anyhow::Result<()> {
    let ingestor = Ingestor::from_config(&config)?;

    let mut request = ImageRequest::new(&args.url);
    if let Some(referer) = args.referer {
        request = request.with_referer(referer);
    }

    let report = ingestor.report(&request).await;
    println!("{}", to_json(&report, !args.compact)?);
    Ok(())
}
