// Tanklog - Log water quality sensor readings to Google Sheets
//
// Copyright 2025 The tanklog authors
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
use std::path::PathBuf;
use std::process;
use tanklog::config::{Config, CredentialsSource, FlagValues};
use tanklog::sensor::{HttpTransport, SensorError, TuyaClient};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_SECRETS_FILE: &str = "tanklog-secrets.json";

/// Dump device info, functions, and status from the IoT platform
///
/// Wiring check for the probe: authenticate with the configured credentials,
/// then print the platform's device metadata, supported instruction set, and
/// current status snapshot as JSON on stdout. Makes no spreadsheet or
/// weather calls and writes nothing.
#[derive(Debug, Parser)]
#[clap(name = "tankprobe", version = clap::crate_version!())]
struct TankprobeApplication {
    /// Where credentials are read from. Allowed values are 'env' and 'file'
    /// (case insensitive)
    #[arg(long, default_value_t = CredentialsSource::Env)]
    credentials: CredentialsSource,

    /// Path to the JSON secrets file for the 'file' credentials source
    #[arg(long, default_value = DEFAULT_SECRETS_FILE)]
    secrets_file: PathBuf,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = TankprobeApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let config = Config::load(opts.credentials, FlagValues::default(), &opts.secrets_file).unwrap_or_else(|e| {
        tracing::error!(message = "unable to load configuration", source = %opts.credentials, error = %e);
        process::exit(1)
    });

    let client = TuyaClient::new(
        HttpTransport::new(config.api_endpoint.clone()),
        config.access_id.clone(),
        config.access_key.clone(),
    );

    let info = client
        .device_info(&config.device_id)
        .await
        .unwrap_or_else(|e| die("unable to read device info", e));
    println!("device info:\n{}", serde_json::to_string_pretty(&info)?);

    let functions = client
        .device_functions(&config.device_id)
        .await
        .unwrap_or_else(|e| die("unable to read device functions", e));
    println!("device functions:\n{}", serde_json::to_string_pretty(&functions)?);

    let datapoints = client
        .device_datapoints(&config.device_id)
        .await
        .unwrap_or_else(|e| die("unable to read device status", e));
    println!("device status:\n{}", serde_json::to_string_pretty(&datapoints)?);

    Ok(())
}

fn die<T>(msg: &'static str, e: SensorError) -> T {
    tracing::error!(message = msg, kind = e.kind().as_label(), error = %e);
    process::exit(1)
}
