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

use crate::sensor::Measurement;
use crate::weather::WeatherReading;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{self, Formatter};

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_BASE: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
const TOKEN_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.readonly";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

// Measurement rows span columns A through I: date, time, the four sensor
// values, the weather pair, and the trailing checkbox column.
const FIRST_COLUMN: char = 'A';
const LAST_COLUMN: char = 'I';
pub(crate) const ROW_WIDTH: usize = 9;

/// Service-account key material for the spreadsheet service, in the layout
/// the service hands out for download.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Potential kinds of errors that can be encountered talking to the
/// spreadsheet service
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub enum SheetErrorKind {
    Authentication,
    Lookup,
    Read,
    Write,
    Response,
}

impl SheetErrorKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            SheetErrorKind::Authentication => "authentication",
            SheetErrorKind::Lookup => "lookup",
            SheetErrorKind::Read => "read",
            SheetErrorKind::Write => "write",
            SheetErrorKind::Response => "response",
        }
    }
}

/// Error authenticating to the spreadsheet service or reading/writing a
/// worksheet through it
#[derive(Debug)]
pub enum SheetError {
    KindMsg(SheetErrorKind, &'static str),
    KindMsgCause(SheetErrorKind, &'static str, Box<dyn Error + Send + Sync>),
}

impl SheetError {
    pub fn kind(&self) -> SheetErrorKind {
        match self {
            SheetError::KindMsg(kind, _) => *kind,
            SheetError::KindMsgCause(kind, _, _) => *kind,
        }
    }
}

impl fmt::Display for SheetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SheetError::KindMsg(_, msg) => msg.fmt(f),
            SheetError::KindMsgCause(_, msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for SheetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SheetError::KindMsgCause(_, _, ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Claims of the service-account assertion exchanged for a bearer token.
#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct GrantResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct FileListing {
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReadRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct WriteRange<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'a str,
    values: Vec<Vec<Value>>,
}

/// Client for the spreadsheet service, bound to one named spreadsheet.
///
/// The spreadsheet is opened by name the way the original sheet was set up,
/// so each operation resolves the name to an id through the drive files
/// listing before touching the values API. Every operation authenticates
/// from scratch; nothing is cached between calls.
pub struct SheetsClient {
    http: reqwest::Client,
    key: ServiceAccountKey,
    spreadsheet_name: String,
}

impl SheetsClient {
    pub fn new<S>(key: ServiceAccountKey, spreadsheet_name: S) -> Self
    where
        S: Into<String>,
    {
        SheetsClient {
            http: reqwest::Client::new(),
            key,
            spreadsheet_name: spreadsheet_name.into(),
        }
    }

    /// Read a single cell by A1 address, `None` when the cell is empty.
    pub async fn read_cell(&self, worksheet: &str, cell: &str) -> Result<Option<String>, SheetError> {
        let token = self.bearer_token().await?;
        let spreadsheet_id = self.spreadsheet_id(&token).await?;
        let range = format!("'{}'!{}", worksheet, cell);
        let url = values_url(&spreadsheet_id, &range)?;

        let response = self.http.get(url).bearer_auth(&token).send().await.map_err(|e| {
            SheetError::KindMsgCause(SheetErrorKind::Read, "cell read request failed", Box::new(e))
        })?;

        if !response.status().is_success() {
            return Err(SheetError::KindMsg(SheetErrorKind::Read, "cell read was refused"));
        }

        let body: ReadRange = response.json().await.map_err(|e| {
            SheetError::KindMsgCause(SheetErrorKind::Response, "malformed cell read response", Box::new(e))
        })?;

        let cell = body
            .values
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .and_then(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            });

        Ok(cell)
    }

    /// Write one row of cells into the first empty row of a worksheet,
    /// letting the service interpret each value as if a user had typed it.
    pub async fn append_row(&self, worksheet: &str, cells: Vec<Value>) -> Result<(), SheetError> {
        let token = self.bearer_token().await?;
        let spreadsheet_id = self.spreadsheet_id(&token).await?;
        let next = self.next_free_row(&token, &spreadsheet_id, worksheet).await?;

        let range = format!("'{}'!{}{}:{}{}", worksheet, FIRST_COLUMN, next, LAST_COLUMN, next);
        let url = values_url(&spreadsheet_id, &range)?;
        let body = WriteRange {
            range: &range,
            major_dimension: "ROWS",
            values: vec![cells],
        };

        let response = self
            .http
            .put(url)
            .bearer_auth(&token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .await
            .map_err(|e| SheetError::KindMsgCause(SheetErrorKind::Write, "row write request failed", Box::new(e)))?;

        if !response.status().is_success() {
            return Err(SheetError::KindMsg(SheetErrorKind::Write, "row write was refused"));
        }

        Ok(())
    }

    /// Exchange a signed service-account assertion for a bearer token.
    async fn bearer_token(&self) -> Result<String, SheetError> {
        let now = chrono::Utc::now().timestamp();
        let claims = GrantClaims {
            iss: &self.key.client_email,
            scope: TOKEN_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };

        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes()).map_err(|e| {
            SheetError::KindMsgCause(
                SheetErrorKind::Authentication,
                "service account private key is not a usable rsa pem",
                Box::new(e),
            )
        })?;

        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key).map_err(|e| {
            SheetError::KindMsgCause(SheetErrorKind::Authentication, "failed to sign token assertion", Box::new(e))
        })?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| {
                SheetError::KindMsgCause(SheetErrorKind::Authentication, "token exchange request failed", Box::new(e))
            })?;

        if !response.status().is_success() {
            return Err(SheetError::KindMsg(
                SheetErrorKind::Authentication,
                "token endpoint refused the assertion",
            ));
        }

        let grant: GrantResponse = response.json().await.map_err(|e| {
            SheetError::KindMsgCause(SheetErrorKind::Response, "malformed token response", Box::new(e))
        })?;

        Ok(grant.access_token)
    }

    /// Resolve the configured spreadsheet name to an id through the drive
    /// files listing.
    async fn spreadsheet_id(&self, token: &str) -> Result<String, SheetError> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            self.spreadsheet_name, SPREADSHEET_MIME
        );

        let response = self
            .http
            .get(DRIVE_FILES_BASE)
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)"), ("pageSize", "1")])
            .send()
            .await
            .map_err(|e| {
                SheetError::KindMsgCause(SheetErrorKind::Lookup, "spreadsheet lookup request failed", Box::new(e))
            })?;

        if !response.status().is_success() {
            return Err(SheetError::KindMsg(SheetErrorKind::Lookup, "spreadsheet lookup was refused"));
        }

        let listing: FileListing = response.json().await.map_err(|e| {
            SheetError::KindMsgCause(SheetErrorKind::Response, "malformed spreadsheet listing", Box::new(e))
        })?;

        listing
            .files
            .into_iter()
            .next()
            .map(|file| file.id)
            .ok_or(SheetError::KindMsg(SheetErrorKind::Lookup, "no spreadsheet with the configured name"))
    }

    /// Index of the first empty row on a worksheet, counting from one the way
    /// the sheet UI does.
    async fn next_free_row(&self, token: &str, spreadsheet_id: &str, worksheet: &str) -> Result<usize, SheetError> {
        let range = format!("'{}'!{}:{}", worksheet, FIRST_COLUMN, LAST_COLUMN);
        let url = values_url(spreadsheet_id, &range)?;

        let response = self.http.get(url).bearer_auth(token).send().await.map_err(|e| {
            SheetError::KindMsgCause(SheetErrorKind::Read, "used range read request failed", Box::new(e))
        })?;

        if !response.status().is_success() {
            return Err(SheetError::KindMsg(SheetErrorKind::Read, "used range read was refused"));
        }

        let body: ReadRange = response.json().await.map_err(|e| {
            SheetError::KindMsgCause(SheetErrorKind::Response, "malformed used range response", Box::new(e))
        })?;

        Ok(body.values.len() + 1)
    }
}

/// Values API url for a range, with the quoted worksheet title living in a
/// percent-encoded path segment.
fn values_url(spreadsheet_id: &str, range: &str) -> Result<reqwest::Url, SheetError> {
    let mut url = reqwest::Url::parse(SHEETS_BASE).map_err(|e| {
        SheetError::KindMsgCause(SheetErrorKind::Response, "invalid values api base url", Box::new(e))
    })?;

    url.path_segments_mut()
        .map_err(|_| SheetError::KindMsg(SheetErrorKind::Response, "values api base url cannot take a path"))?
        .push(spreadsheet_id)
        .push("values")
        .push(range);

    Ok(url)
}

/// Assemble the 9 cells of a measurement row: date, time, the four scaled
/// sensor values, the weather pair (blank when unavailable), and the trailing
/// blank checkbox column.
///
/// Numbers stay numbers so the user-entered interpretation on the service
/// side types the cells instead of storing quoted text.
pub fn assemble_row(measurement: &Measurement, weather: Option<&WeatherReading>) -> Vec<Value> {
    let mut row = vec![
        Value::from(measurement.taken_at.format("%m/%d/%Y").to_string()),
        Value::from(measurement.taken_at.format("%I:%M %p").to_string()),
        Value::from(f64::from(measurement.ph)),
        Value::from(f64::from(measurement.dissolved_solids)),
        Value::from(f64::from(measurement.conductivity)),
        Value::from(f64::from(measurement.water_temp)),
    ];

    match weather {
        Some(reading) => {
            row.push(Value::from(reading.temp_f));
            row.push(Value::from(reading.condition.clone()));
        }
        None => {
            row.push(Value::from(""));
            row.push(Value::from(""));
        }
    }

    row.push(Value::from(""));

    debug_assert_eq!(ROW_WIDTH, row.len());
    row
}

#[cfg(test)]
mod test {
    use super::{assemble_row, values_url, ServiceAccountKey, ROW_WIDTH};
    use crate::sensor::{DeviceStatus, Measurement, StatusDatapoint};
    use crate::weather::WeatherReading;
    use chrono::TimeZone;
    use serde_json::Value;

    fn measurement() -> Measurement {
        let points = [
            StatusDatapoint {
                code: "ph".to_string(),
                value: 650.into(),
            },
            StatusDatapoint {
                code: "tds_in".to_string(),
                value: 540.into(),
            },
            StatusDatapoint {
                code: "conductivity_value".to_string(),
                value: 1080.into(),
            },
            StatusDatapoint {
                code: "temp_current".to_string(),
                value: 235.into(),
            },
        ];
        let taken_at = chrono_tz::America::Los_Angeles
            .with_ymd_and_hms(2025, 7, 1, 14, 5, 0)
            .unwrap();

        Measurement::from_status(&DeviceStatus::from_datapoints(&points), taken_at)
    }

    #[test]
    fn test_assemble_row_with_weather() {
        let weather = WeatherReading {
            temp_f: 73,
            condition: "Clouds".to_string(),
        };
        let row = assemble_row(&measurement(), Some(&weather));

        assert_eq!(ROW_WIDTH, row.len());
        assert_eq!(Value::from("07/01/2025"), row[0]);
        assert_eq!(Value::from("02:05 PM"), row[1]);
        assert_eq!(Value::from(6.5), row[2]);
        assert_eq!(Value::from(540.0), row[3]);
        assert_eq!(Value::from(1080.0), row[4]);
        assert_eq!(Value::from(73), row[6]);
        assert_eq!(Value::from("Clouds"), row[7]);
        assert_eq!(Value::from(""), row[8]);
    }

    #[test]
    fn test_assemble_row_without_weather() {
        let row = assemble_row(&measurement(), None);

        assert_eq!(ROW_WIDTH, row.len());
        assert_eq!(Value::from(""), row[6]);
        assert_eq!(Value::from(""), row[7]);
        assert_eq!(Value::from(""), row[8]);
    }

    #[test]
    fn test_assemble_row_keeps_numbers_numeric() {
        let row = assemble_row(&measurement(), None);

        assert!(row[2].is_number());
        assert!(row[3].is_number());
        assert!(row[4].is_number());
        assert!(row[5].is_number());
    }

    #[test]
    fn test_values_url_encodes_worksheet_title() {
        let url = values_url("sheet-id-1", "'Measurements - GC1'!A5:I5").unwrap();
        let rendered = url.as_str();

        assert!(rendered.starts_with("https://sheets.googleapis.com/v4/spreadsheets/sheet-id-1/values/"));
        assert!(rendered.ends_with("!A5:I5"));
        assert!(!rendered.contains(' '));
    }

    #[test]
    fn test_service_account_key_default_token_uri() {
        let key: ServiceAccountKey =
            serde_json::from_str(r#"{"client_email":"svc@example.iam.gserviceaccount.com","private_key":"pem"}"#)
                .unwrap();

        assert_eq!("https://oauth2.googleapis.com/token", key.token_uri);
    }
}
