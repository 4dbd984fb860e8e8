#[cfg(not(unix))]
compile_error!("Only unix targets are currently supported");

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use courier::{
    config::{CourierConfig, find_config_file},
    controller::{Courier, cancel_on_shutdown},
    response::Response,
};
use courier_common::{internal, logging};
use courier_delivery::{CancellationToken, SendRequest};

/// Send a message through the configured providers
#[derive(Parser)]
#[command(name = "courier", about, version)]
struct Cli {
    /// Path to the configuration file
    ///
    /// Defaults to `COURIER_CONFIG`, then ./courier.config.ron, then
    /// /etc/courier/courier.config.ron
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recipient address
    #[arg(short, long)]
    recipient: String,

    #[arg(short, long, default_value = "")]
    subject: String,

    #[arg(short, long, default_value = "")]
    body: String,

    /// Key for duplicate suppression (requires `idempotency_ttl_secs`)
    #[arg(long)]
    request_id: Option<String>,

    /// Cancel outstanding deliveries after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Send the same request this many times concurrently
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    count: u32,
}

impl Cli {
    fn request(&self) -> SendRequest {
        let request = SendRequest::new(&self.recipient, &self.subject, &self.body);
        match &self.request_id {
            Some(id) => request.with_request_id(id),
            None => request,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init();

    let config = match find_config_file(cli.config.clone())? {
        Some(path) => {
            internal!(level = DEBUG, path = %path.display(), "Loading configuration");
            CourierConfig::load(&path)?
        }
        None => CourierConfig::default(),
    };

    let courier = match Courier::from_config(&config) {
        Ok(courier) => Arc::new(courier),
        Err(error) => {
            println!("{}", Response::from_result(&Err(error)));
            return Ok(ExitCode::FAILURE);
        }
    };

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_shutdown(
        cancel.clone(),
        cli.timeout_secs.map(Duration::from_secs),
    ));

    let request = cli.request();
    let requests = std::iter::repeat_n(request, cli.count as usize).collect();
    let responses = courier.run(requests, cancel.clone()).await?;

    cancel.cancel();
    watcher.await??;

    for response in &responses {
        println!("{response}");
    }

    Ok(if responses.iter().all(Response::is_success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
