// nws_lookup - Current conditions from api.weather.gov for a street address
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::Parser;
use nws_lookup::census::CensusClient;
use nws_lookup::client::WeatherGovClient;
use nws_lookup::http::RequestContext;
use nws_lookup::metrics::LookupMetrics;
use nws_lookup::pipeline::LookupPipeline;
use prometheus_client::registry::Registry;
use reqwest::{Client, Url};
use std::error::Error;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8000);
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_API_URL: &str = "https://api.weather.gov/";
const DEFAULT_GEOCODER_URL: &str = "https://geocoding.geo.census.gov/";

#[derive(Debug, Parser)]
#[clap(name = "nws_lookup", version = clap::crate_version!())]
struct NwsLookupApplication {
    /// Base URL for the Weather.gov API
    #[clap(long, default_value = DEFAULT_API_URL)]
    api_url: Url,

    /// Base URL for the Census Bureau geocoder
    #[clap(long, default_value = DEFAULT_GEOCODER_URL)]
    geocoder_url: Url,

    /// Census Bureau address benchmark to geocode against
    #[clap(long, default_value_t = CensusClient::DEFAULT_BENCHMARK.into())]
    benchmark: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for each request made to the geocoder or the Weather.gov API, in milliseconds.
    /// A lookup makes four of these in sequence.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = NwsLookupApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let census = CensusClient::new(http_client.clone(), opts.geocoder_url.clone(), opts.benchmark.clone());
    let weather = WeatherGovClient::new(http_client, opts.api_url.clone());
    let pipeline = LookupPipeline::from_clients(census, weather);

    let mut registry = Registry::default();
    let metrics = LookupMetrics::new(&mut registry);
    let context = Arc::new(RequestContext::new(pipeline, metrics, registry));
    let app = nws_lookup::http::router(context);

    let server = axum::Server::try_bind(&opts.bind)
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
            process::exit(1)
        })
        .serve(app.into_make_service());

    tracing::info!(
        message = "server started",
        address = %server.local_addr(),
        api_url = %opts.api_url,
        geocoder_url = %opts.geocoder_url,
    );

    server.with_graceful_shutdown(shutdown()).await?;

    tracing::info!("server shutdown");
    Ok(())
}

#[cfg(unix)]
async fn shutdown() {
    use tokio::signal::unix::{self, SignalKind};

    // Wait for either SIGTERM or SIGINT to shutdown
    let (mut term, mut int) = match (unix::signal(SignalKind::terminate()), unix::signal(SignalKind::interrupt())) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(message = "unable to install signal handlers", error = %e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = term.recv() => {}
        _ = int.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(message = "unable to install Ctrl+C handler", error = %e);
        std::future::pending::<()>().await
    }
}
