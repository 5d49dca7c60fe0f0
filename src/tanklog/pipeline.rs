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

use crate::city;
use crate::sensor::{Measurement, SensorError, Transport, TuyaClient};
use crate::sheets::{self, SheetError, SheetsClient};
use crate::weather::{WeatherClient, WeatherReading};
use chrono_tz::Tz;
use serde_json::Value;
use std::error::Error;
use std::fmt::{self, Formatter};

/// Reader of the layout cell that names the weather city.
#[allow(async_fn_in_trait)]
pub trait CityCell {
    async fn city_cell(&self) -> Result<Option<String>, SheetError>;
}

/// Best-effort source of current weather for a city.
#[allow(async_fn_in_trait)]
pub trait WeatherSource {
    async fn current(&self, city: &str) -> Option<WeatherReading>;
}

/// Single-poll source of a unit-scaled sensor measurement.
#[allow(async_fn_in_trait)]
pub trait MeasurementSource {
    async fn fetch_measurement(&self) -> Result<Measurement, SensorError>;
}

/// Destination for one assembled measurement row.
#[allow(async_fn_in_trait)]
pub trait RowSink {
    async fn append_row(&self, cells: Vec<Value>) -> Result<(), SheetError>;
}

/// Terminal failure for a poll cycle. Only the device poll and the row write
/// can abort a run; city and weather failures degrade to defaults.
#[derive(Debug)]
pub enum RunError {
    Sensor(SensorError),
    Sheet(SheetError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Sensor(e) => write!(f, "device poll failed: {}", e),
            RunError::Sheet(e) => write!(f, "row write failed: {}", e),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RunError::Sensor(ref e) => Some(e),
            RunError::Sheet(ref e) => Some(e),
        }
    }
}

/// Device poller bound to one device id and the timezone rows are stamped in.
pub struct DevicePoller<T> {
    pub client: TuyaClient<T>,
    pub device_id: String,
    pub timezone: Tz,
}

impl<T> MeasurementSource for DevicePoller<T>
where
    T: Transport,
{
    async fn fetch_measurement(&self) -> Result<Measurement, SensorError> {
        self.client.fetch_measurement(&self.device_id, self.timezone).await
    }
}

impl WeatherSource for WeatherClient {
    async fn current(&self, city: &str) -> Option<WeatherReading> {
        WeatherClient::current(self, city).await
    }
}

/// Sheets access bound to the configured worksheet layout: the layout sheet
/// carries the city cell, the measurement sheet receives rows.
pub struct SheetRecorder {
    pub client: SheetsClient,
    pub layout_sheet: String,
    pub measurement_sheet: String,
}

impl CityCell for SheetRecorder {
    async fn city_cell(&self) -> Result<Option<String>, SheetError> {
        self.client.read_cell(&self.layout_sheet, city::CITY_CELL).await
    }
}

impl RowSink for SheetRecorder {
    async fn append_row(&self, cells: Vec<Value>) -> Result<(), SheetError> {
        self.client.append_row(&self.measurement_sheet, cells).await
    }
}

/// Determine the weather city for this run. Read failures are logged and
/// degrade to the fallback city; this step never aborts a run.
pub async fn resolve_city<C>(cells: &C) -> String
where
    C: CityCell,
{
    match cells.city_cell().await {
        Ok(cell) => city::normalize(cell),
        Err(e) => {
            tracing::warn!(
                message = "unable to read the city cell, using the fallback",
                fallback = city::FALLBACK_CITY,
                kind = e.kind().as_label(),
                error = %e,
            );
            city::FALLBACK_CITY.to_string()
        }
    }
}

/// Run one poll cycle: resolve the weather city, fetch weather (best effort),
/// poll the device, and append the combined row to the measurement sheet.
///
/// Exactly one device poll, at most one weather lookup, and at most one new
/// row per call.
pub async fn run<C, W, M, R>(cells: &C, weather: &W, sensor: &M, sink: &R) -> Result<(), RunError>
where
    C: CityCell,
    W: WeatherSource,
    M: MeasurementSource,
    R: RowSink,
{
    let city = resolve_city(cells).await;
    tracing::info!(message = "using city", city = %city);

    let reading = weather.current(&city).await;
    match &reading {
        Some(reading) => {
            tracing::info!(
                message = "current weather",
                city = %city,
                temp_f = reading.temp_f,
                condition = %reading.condition,
            );
        }
        None => {
            tracing::warn!(message = "weather unavailable, writing blank weather columns", city = %city);
        }
    }

    let measurement = sensor.fetch_measurement().await.map_err(RunError::Sensor)?;
    tracing::info!(
        message = "sensor reading",
        ph = %measurement.ph,
        dissolved_solids = %measurement.dissolved_solids,
        conductivity = %measurement.conductivity,
        water_temp = %measurement.water_temp,
    );

    let row = sheets::assemble_row(&measurement, reading.as_ref());
    sink.append_row(row).await.map_err(RunError::Sheet)?;

    tracing::info!(message = "row appended");
    Ok(())
}
