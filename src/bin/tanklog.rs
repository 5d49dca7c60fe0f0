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

use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tanklog::config::{Config, CredentialsSource, FlagValues};
use tanklog::pipeline::{self, DevicePoller, SheetRecorder};
use tanklog::sensor::{HttpTransport, TuyaClient};
use tanklog::sheets::SheetsClient;
use tanklog::weather::WeatherClient;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_SECRETS_FILE: &str = "tanklog-secrets.json";
const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;

/// Poll a water quality sensor and append the reading to a spreadsheet
///
/// Read the current status of a cloud connected water quality probe (pH,
/// TDS, conductivity, temperature), look up current weather for the city
/// configured on the spreadsheet's layout sheet, and append one row of
/// combined values to the measurement sheet. Each invocation performs one
/// cycle; schedule invocations with cron or a systemd timer for periodic
/// logging.
#[derive(Debug, Parser)]
#[clap(name = "tanklog", version = clap::crate_version!())]
struct TanklogApplication {
    /// Where credentials are read from. Allowed values are 'flags', 'env',
    /// and 'file' (case insensitive)
    #[arg(long, default_value_t = CredentialsSource::Env)]
    credentials: CredentialsSource,

    /// Path to the JSON secrets file for the 'file' credentials source
    #[arg(long, default_value = DEFAULT_SECRETS_FILE)]
    secrets_file: PathBuf,

    /// Timezone used to stamp measurement rows
    #[arg(long, env = "TANKLOG_TIMEZONE", default_value_t = DEFAULT_TIMEZONE)]
    timezone: Tz,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Platform API endpoint for the 'flags' credentials source
    #[arg(long)]
    api_endpoint: Option<String>,

    /// Platform access id for the 'flags' credentials source
    #[arg(long)]
    access_id: Option<String>,

    /// Platform access key for the 'flags' credentials source
    #[arg(long)]
    access_key: Option<String>,

    /// Device id of the probe for the 'flags' credentials source
    #[arg(long)]
    device_id: Option<String>,

    /// Weather provider API key for the 'flags' credentials source
    #[arg(long)]
    weather_api_key: Option<String>,

    /// Spreadsheet name for the 'flags' credentials source
    #[arg(long)]
    spreadsheet_name: Option<String>,

    /// Path to the service account key file for the 'flags' credentials source
    #[arg(long)]
    google_credentials: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = TanklogApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let flags = FlagValues {
        api_endpoint: opts.api_endpoint,
        access_id: opts.access_id,
        access_key: opts.access_key,
        device_id: opts.device_id,
        weather_api_key: opts.weather_api_key,
        spreadsheet_name: opts.spreadsheet_name,
        google_credentials: opts.google_credentials,
    };
    let config = Config::load(opts.credentials, flags, &opts.secrets_file).unwrap_or_else(|e| {
        tracing::error!(message = "unable to load configuration", source = %opts.credentials, error = %e);
        process::exit(1)
    });

    let sensor = DevicePoller {
        client: TuyaClient::new(
            HttpTransport::new(config.api_endpoint.clone()),
            config.access_id.clone(),
            config.access_key.clone(),
        ),
        device_id: config.device_id.clone(),
        timezone: opts.timezone,
    };
    let weather = WeatherClient::new(config.weather_api_key.clone());
    let sheets = SheetRecorder {
        client: SheetsClient::new(config.google.clone(), config.spreadsheet_name.clone()),
        layout_sheet: config.layout_sheet.clone(),
        measurement_sheet: config.measurement_sheet.clone(),
    };

    tracing::info!(
        message = "starting poll cycle",
        device_id = %config.device_id,
        spreadsheet = %config.spreadsheet_name,
        timezone = %opts.timezone,
    );

    match pipeline::run(&sheets, &weather, &sensor, &sheets).await {
        Ok(()) => {
            tracing::info!(message = "run complete, one row appended");
        }
        Err(e) => {
            tracing::error!(message = "run aborted", error = %e);
            process::exit(1)
        }
    }

    Ok(())
}
