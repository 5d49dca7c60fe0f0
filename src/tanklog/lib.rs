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

//! Log water quality sensor readings to Google Sheets.
//!
//! ## Features
//!
//! Tanklog polls a cloud connected water quality probe (pH, total dissolved
//! solids, electrical conductivity, temperature) through the Tuya IoT API,
//! looks up current weather for the city configured on the spreadsheet's
//! layout sheet, and appends one row of combined values to the measurement
//! sheet for manual review and charting.
//!
//! Each row carries nine columns:
//!
//! * date and time the reading was taken, in the configured timezone
//! * pH, TDS (ppm), conductivity (uS/cm), and temperature from the probe
//! * air temperature and conditions for the configured city, blank when the
//!   weather provider is unavailable
//! * a trailing blank column for the review checkbox on the sheet
//!
//! One invocation performs one poll cycle: a failed device poll or row write
//! aborts the run, a failed city or weather lookup degrades to defaults.
//! There are no retries and no state between invocations, so runs can be
//! scheduled with cron or a systemd timer without coordination.
//!
//! ## Build
//!
//! `tanklog` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Configuration
//!
//! Credentials come from one of three sources selected with `--credentials`:
//!
//! * `env` (default) - read from the process environment: `TUYA_ACCESS_ID`,
//!   `TUYA_ACCESS_KEY`, `TUYA_DEVICE_ID`, `WEATHER_API_KEY`, and
//!   `GOOGLE_CREDENTIALS` (the service account key JSON, inline). Optional:
//!   `TUYA_API_ENDPOINT` and `SPREADSHEET_NAME`.
//! * `file` - read from the JSON secrets file named by `--secrets-file`,
//!   which points at the service account key file on disk.
//! * `flags` - read from command line flags; useful for one-off runs.
//!
//! The spreadsheet is opened by name. The layout worksheet provides the
//! weather city in cell `G22` and the measurement worksheet receives the
//! rows.
//!
//! ## Run
//!
//! ```text
//! tanklog --credentials env
//! ```
//!
//! A companion binary, `tankprobe`, authenticates with the same credentials
//! and dumps the platform's device info, function set, and current status as
//! JSON for wiring checks.
//!

pub mod city;
pub mod config;
pub mod pipeline;
pub mod sensor;
pub mod sheets;
pub mod weather;
