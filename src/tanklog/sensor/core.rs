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

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Formatter};

// Sensor codes the platform reports for the water quality probe.
pub(crate) const CODE_PH: &str = "ph";
pub(crate) const CODE_TDS: &str = "tds_in";
pub(crate) const CODE_CONDUCTIVITY: &str = "conductivity_value";
pub(crate) const CODE_TEMPERATURE: &str = "temp_current";

/// Acidity, in pH
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(transparent)]
pub struct Ph(f64);

impl From<Ph> for f64 {
    fn from(v: Ph) -> Self {
        v.0
    }
}

impl From<f64> for Ph {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

impl fmt::Display for Ph {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}pH", self.0)
    }
}

/// Total dissolved solids, in parts per million
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(transparent)]
pub struct DissolvedSolids(f64);

impl From<DissolvedSolids> for f64 {
    fn from(v: DissolvedSolids) -> Self {
        v.0
    }
}

impl From<f64> for DissolvedSolids {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

impl fmt::Display for DissolvedSolids {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}ppm", self.0)
    }
}

/// Electrical conductivity, in microsiemens per centimeter
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(transparent)]
pub struct Conductivity(f64);

impl From<Conductivity> for f64 {
    fn from(v: Conductivity) -> Self {
        v.0
    }
}

impl From<f64> for Conductivity {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

impl fmt::Display for Conductivity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}uS/cm", self.0)
    }
}

/// Water temperature, as logged to the spreadsheet
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(transparent)]
pub struct WaterTemp(f64);

impl From<WaterTemp> for f64 {
    fn from(v: WaterTemp) -> Self {
        v.0
    }
}

impl From<f64> for WaterTemp {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

impl fmt::Display for WaterTemp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}f", self.0)
    }
}

/// Potential kinds of errors that can be encountered talking to the IoT platform
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub enum SensorErrorKind {
    Authentication,
    Transport,
    Response,
    Query,
}

impl SensorErrorKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            SensorErrorKind::Authentication => "authentication",
            SensorErrorKind::Transport => "transport",
            SensorErrorKind::Response => "response",
            SensorErrorKind::Query => "query",
        }
    }
}

/// Error authenticating to the IoT platform or reading a device through it
#[derive(Debug)]
pub enum SensorError {
    Rejected(serde_json::Value),
    KindMsg(SensorErrorKind, &'static str),
    KindMsgCause(SensorErrorKind, &'static str, Box<dyn Error + Send + Sync>),
}

impl SensorError {
    pub fn kind(&self) -> SensorErrorKind {
        match self {
            SensorError::Rejected(_) => SensorErrorKind::Query,
            SensorError::KindMsg(kind, _) => *kind,
            SensorError::KindMsgCause(kind, _, _) => *kind,
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Rejected(raw) => {
                write!(f, "platform rejected the request: {}", raw)
            }
            SensorError::KindMsg(_, msg) => msg.fmt(f),
            SensorError::KindMsgCause(_, msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for SensorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SensorError::KindMsgCause(_, _, ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Single code/value pair from a device status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDatapoint {
    pub code: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Flat code/value snapshot of the sensor readings reported by the platform.
///
/// Values are kept exactly as reported; scaling into engineering units happens
/// when a `Measurement` is derived from the snapshot.
#[derive(Debug, Clone, Default)]
pub struct DeviceStatus {
    values: HashMap<String, f64>,
}

impl DeviceStatus {
    /// Flatten the platform's datapoint list into a code/value map. Datapoints
    /// that don't carry a numeric value are dropped.
    pub fn from_datapoints(points: &[StatusDatapoint]) -> Self {
        let values = points
            .iter()
            .filter_map(|p| p.value.as_f64().map(|v| (p.code.clone(), v)))
            .collect();

        DeviceStatus { values }
    }

    /// Raw value for a sensor code, zero when the device didn't report it.
    pub fn value(&self, code: &str) -> f64 {
        self.values.get(code).copied().unwrap_or(0.0)
    }
}

/// Unit-scaled sensor reading, stamped with the local time it was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub taken_at: DateTime<Tz>,
    pub ph: Ph,
    pub dissolved_solids: DissolvedSolids,
    pub conductivity: Conductivity,
    pub water_temp: WaterTemp,
}

impl Measurement {
    /// Derive a measurement from a raw status snapshot.
    ///
    /// Scaling factors are fixed by the device specification: pH is reported
    /// in hundredths, TDS and conductivity are reported directly, temperature
    /// is reported in tenths.
    pub fn from_status(status: &DeviceStatus, taken_at: DateTime<Tz>) -> Self {
        // The spreadsheet has always stored the temperature column with this
        // fahrenheit conversion applied to the tenths value.
        // TODO: confirm against the probe whether temp_current is tenths of a
        // degree celsius and relabel the spreadsheet column to match.
        let water_temp = (status.value(CODE_TEMPERATURE) / 10.0) * 9.0 / 5.0 + 32.0;

        Measurement {
            taken_at,
            ph: Ph::from(status.value(CODE_PH) / 100.0),
            dissolved_solids: DissolvedSolids::from(status.value(CODE_TDS)),
            conductivity: Conductivity::from(status.value(CODE_CONDUCTIVITY)),
            water_temp: WaterTemp::from(water_temp),
        }
    }
}

/// Abstraction around an authenticated HTTP GET against the platform to allow
/// for easier testing.
///
/// Implementations return the response body for any HTTP status; platform
/// errors are reported in-band through the envelope's success flag. Only
/// connection-level failures produce an error.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get(&self, path_and_query: &str, headers: &[(&'static str, String)]) -> Result<String, SensorError>;
}
