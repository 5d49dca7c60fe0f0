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

use crate::sheets::ServiceAccountKey;
use serde::Deserialize;
use std::env;
use std::error::Error;
use std::fmt::{self, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_API_ENDPOINT: &str = "https://openapi.tuyaus.com";
pub const DEFAULT_SPREADSHEET_NAME: &str = "Hydroponics Datasheet";
pub const DEFAULT_LAYOUT_SHEET: &str = "Layout - GC1";
pub const DEFAULT_MEASUREMENT_SHEET: &str = "Measurements - GC1";

// Environment variables recognized by the env credentials source.
const ENV_API_ENDPOINT: &str = "TUYA_API_ENDPOINT";
const ENV_ACCESS_ID: &str = "TUYA_ACCESS_ID";
const ENV_ACCESS_KEY: &str = "TUYA_ACCESS_KEY";
const ENV_DEVICE_ID: &str = "TUYA_DEVICE_ID";
const ENV_WEATHER_API_KEY: &str = "WEATHER_API_KEY";
const ENV_SPREADSHEET_NAME: &str = "SPREADSHEET_NAME";
const ENV_GOOGLE_CREDENTIALS: &str = "GOOGLE_CREDENTIALS";

/// Where credential material is sourced from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CredentialsSource {
    /// Values passed as command line flags
    Flags,
    /// Process environment variables
    Env,
    /// A local JSON secrets file
    File,
}

impl FromStr for CredentialsSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flags" => Ok(CredentialsSource::Flags),
            "env" => Ok(CredentialsSource::Env),
            "file" => Ok(CredentialsSource::File),
            _ => Err(format!("unknown credentials source '{}'", s)),
        }
    }
}

impl fmt::Display for CredentialsSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsSource::Flags => "flags".fmt(f),
            CredentialsSource::Env => "env".fmt(f),
            CredentialsSource::File => "file".fmt(f),
        }
    }
}

/// Error resolving the configuration from the selected source
#[derive(Debug)]
pub enum ConfigError {
    MissingCredential(&'static str),
    Invalid(&'static str, Box<dyn Error + Send + Sync>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingCredential(field) => write!(f, "missing credential: {}", field),
            ConfigError::Invalid(msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Invalid(_, ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Credential values collected from command line flags, for the flags source.
#[derive(Debug, Clone, Default)]
pub struct FlagValues {
    pub api_endpoint: Option<String>,
    pub access_id: Option<String>,
    pub access_key: Option<String>,
    pub device_id: Option<String>,
    pub weather_api_key: Option<String>,
    pub spreadsheet_name: Option<String>,
    pub google_credentials: Option<PathBuf>,
}

/// On-disk layout of the secrets file for the file source. Identifiers with
/// well-known defaults may be omitted.
#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    api_endpoint: Option<String>,
    access_id: Option<String>,
    access_key: Option<String>,
    device_id: Option<String>,
    weather_api_key: Option<String>,
    spreadsheet_name: Option<String>,
    layout_sheet: Option<String>,
    measurement_sheet: Option<String>,
    google_credentials_file: Option<PathBuf>,
}

/// Immutable configuration for one run, constructed once at startup before
/// any network call is made.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_endpoint: String,
    pub access_id: String,
    pub access_key: String,
    pub device_id: String,
    pub weather_api_key: String,
    pub spreadsheet_name: String,
    pub layout_sheet: String,
    pub measurement_sheet: String,
    pub google: ServiceAccountKey,
}

impl Config {
    /// Resolve configuration from the selected credentials source.
    pub fn load(source: CredentialsSource, flags: FlagValues, secrets_file: &Path) -> Result<Config, ConfigError> {
        match source {
            CredentialsSource::Flags => Config::from_flags(flags),
            CredentialsSource::Env => Config::from_env(),
            CredentialsSource::File => Config::from_file(secrets_file),
        }
    }

    /// Build configuration from process environment variables. The Google
    /// service account key is taken inline from `GOOGLE_CREDENTIALS`.
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_env_lookup(|name| env::var(name).ok())
    }

    fn from_env_lookup<L>(lookup: L) -> Result<Config, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| lookup(name).ok_or(ConfigError::MissingCredential(name));
        let google_json = require(ENV_GOOGLE_CREDENTIALS)?;

        Ok(Config {
            api_endpoint: lookup(ENV_API_ENDPOINT).unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            access_id: require(ENV_ACCESS_ID)?,
            access_key: require(ENV_ACCESS_KEY)?,
            device_id: require(ENV_DEVICE_ID)?,
            weather_api_key: require(ENV_WEATHER_API_KEY)?,
            spreadsheet_name: lookup(ENV_SPREADSHEET_NAME).unwrap_or_else(|| DEFAULT_SPREADSHEET_NAME.to_string()),
            layout_sheet: DEFAULT_LAYOUT_SHEET.to_string(),
            measurement_sheet: DEFAULT_MEASUREMENT_SHEET.to_string(),
            google: parse_service_account(&google_json)?,
        })
    }

    /// Build configuration from a local JSON secrets file. The Google service
    /// account key is read from the file the secrets name.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid("unable to read secrets file", Box::new(e)))?;
        let secrets: SecretsFile = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Invalid("secrets file is not valid json", Box::new(e)))?;

        let credentials_file = secrets
            .google_credentials_file
            .ok_or(ConfigError::MissingCredential("google_credentials_file"))?;

        Ok(Config {
            api_endpoint: secrets.api_endpoint.unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            access_id: secrets.access_id.ok_or(ConfigError::MissingCredential("access_id"))?,
            access_key: secrets.access_key.ok_or(ConfigError::MissingCredential("access_key"))?,
            device_id: secrets.device_id.ok_or(ConfigError::MissingCredential("device_id"))?,
            weather_api_key: secrets
                .weather_api_key
                .ok_or(ConfigError::MissingCredential("weather_api_key"))?,
            spreadsheet_name: secrets
                .spreadsheet_name
                .unwrap_or_else(|| DEFAULT_SPREADSHEET_NAME.to_string()),
            layout_sheet: secrets.layout_sheet.unwrap_or_else(|| DEFAULT_LAYOUT_SHEET.to_string()),
            measurement_sheet: secrets
                .measurement_sheet
                .unwrap_or_else(|| DEFAULT_MEASUREMENT_SHEET.to_string()),
            google: read_service_account(&credentials_file)?,
        })
    }

    /// Build configuration from values passed on the command line. The Google
    /// service account key is read from the file the flag points at.
    pub fn from_flags(flags: FlagValues) -> Result<Config, ConfigError> {
        let credentials_file = flags
            .google_credentials
            .ok_or(ConfigError::MissingCredential("--google-credentials"))?;

        Ok(Config {
            api_endpoint: flags.api_endpoint.unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            access_id: flags.access_id.ok_or(ConfigError::MissingCredential("--access-id"))?,
            access_key: flags.access_key.ok_or(ConfigError::MissingCredential("--access-key"))?,
            device_id: flags.device_id.ok_or(ConfigError::MissingCredential("--device-id"))?,
            weather_api_key: flags
                .weather_api_key
                .ok_or(ConfigError::MissingCredential("--weather-api-key"))?,
            spreadsheet_name: flags
                .spreadsheet_name
                .unwrap_or_else(|| DEFAULT_SPREADSHEET_NAME.to_string()),
            layout_sheet: DEFAULT_LAYOUT_SHEET.to_string(),
            measurement_sheet: DEFAULT_MEASUREMENT_SHEET.to_string(),
            google: read_service_account(&credentials_file)?,
        })
    }
}

fn parse_service_account(raw: &str) -> Result<ServiceAccountKey, ConfigError> {
    serde_json::from_str(raw)
        .map_err(|e| ConfigError::Invalid("service account credentials are not valid json", Box::new(e)))
}

fn read_service_account(path: &Path) -> Result<ServiceAccountKey, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid("unable to read service account key file", Box::new(e)))?;
    parse_service_account(&raw)
}

#[cfg(test)]
mod test {
    use super::{Config, ConfigError, CredentialsSource, FlagValues, DEFAULT_API_ENDPOINT, DEFAULT_SPREADSHEET_NAME};
    use std::collections::HashMap;

    const SERVICE_ACCOUNT_JSON: &str =
        r#"{"client_email":"svc@example.iam.gserviceaccount.com","private_key":"pem material"}"#;

    fn env_fixture() -> HashMap<&'static str, String> {
        HashMap::from([
            ("TUYA_ACCESS_ID", "access-id".to_string()),
            ("TUYA_ACCESS_KEY", "access-key".to_string()),
            ("TUYA_DEVICE_ID", "device-1".to_string()),
            ("WEATHER_API_KEY", "weather-key".to_string()),
            ("GOOGLE_CREDENTIALS", SERVICE_ACCOUNT_JSON.to_string()),
        ])
    }

    fn lookup<'a>(vars: &'a HashMap<&'static str, String>) -> impl Fn(&str) -> Option<String> + 'a {
        |name| vars.get(name).cloned()
    }

    #[test]
    fn test_credentials_source_from_str() {
        assert_eq!(Ok(CredentialsSource::Env), "env".parse());
        assert_eq!(Ok(CredentialsSource::File), "FILE".parse());
        assert_eq!(Ok(CredentialsSource::Flags), "flags".parse());
        assert!("vault".parse::<CredentialsSource>().is_err());
    }

    #[test]
    fn test_from_env_applies_defaults() {
        let vars = env_fixture();
        let config = Config::from_env_lookup(lookup(&vars)).unwrap();

        assert_eq!(DEFAULT_API_ENDPOINT, config.api_endpoint);
        assert_eq!(DEFAULT_SPREADSHEET_NAME, config.spreadsheet_name);
        assert_eq!("access-id", config.access_id);
        assert_eq!("svc@example.iam.gserviceaccount.com", config.google.client_email);
    }

    #[test]
    fn test_from_env_honors_overrides() {
        let mut vars = env_fixture();
        vars.insert("TUYA_API_ENDPOINT", "https://openapi.tuyaeu.com".to_string());
        vars.insert("SPREADSHEET_NAME", "Greenhouse Datasheet".to_string());

        let config = Config::from_env_lookup(lookup(&vars)).unwrap();

        assert_eq!("https://openapi.tuyaeu.com", config.api_endpoint);
        assert_eq!("Greenhouse Datasheet", config.spreadsheet_name);
    }

    #[test]
    fn test_from_env_names_the_missing_credential() {
        let mut vars = env_fixture();
        vars.remove("TUYA_ACCESS_KEY");

        match Config::from_env_lookup(lookup(&vars)) {
            Err(ConfigError::MissingCredential(field)) => assert_eq!("TUYA_ACCESS_KEY", field),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_from_env_rejects_malformed_service_account() {
        let mut vars = env_fixture();
        vars.insert("GOOGLE_CREDENTIALS", "not json".to_string());

        assert!(matches!(
            Config::from_env_lookup(lookup(&vars)),
            Err(ConfigError::Invalid(_, _))
        ));
    }

    #[test]
    fn test_from_file_round_trip() {
        let dir = std::env::temp_dir();
        let key_path = dir.join(format!("tanklog-test-key-{}.json", std::process::id()));
        let secrets_path = dir.join(format!("tanklog-test-secrets-{}.json", std::process::id()));

        std::fs::write(&key_path, SERVICE_ACCOUNT_JSON).unwrap();
        std::fs::write(
            &secrets_path,
            serde_json::json!({
                "access_id": "access-id",
                "access_key": "access-key",
                "device_id": "device-1",
                "weather_api_key": "weather-key",
                "spreadsheet_name": "Test Datasheet",
                "google_credentials_file": key_path,
            })
            .to_string(),
        )
        .unwrap();

        let config = Config::from_file(&secrets_path).unwrap();

        assert_eq!("access-id", config.access_id);
        assert_eq!("Test Datasheet", config.spreadsheet_name);
        assert_eq!(DEFAULT_API_ENDPOINT, config.api_endpoint);
        assert_eq!("svc@example.iam.gserviceaccount.com", config.google.client_email);

        std::fs::remove_file(&key_path).ok();
        std::fs::remove_file(&secrets_path).ok();
    }

    #[test]
    fn test_from_file_names_the_missing_credential() {
        let dir = std::env::temp_dir();
        let secrets_path = dir.join(format!("tanklog-test-partial-{}.json", std::process::id()));
        std::fs::write(&secrets_path, r#"{"access_id":"access-id"}"#).unwrap();

        match Config::from_file(&secrets_path) {
            Err(ConfigError::MissingCredential(field)) => assert_eq!("google_credentials_file", field),
            other => panic!("unexpected result: {:?}", other),
        }

        std::fs::remove_file(&secrets_path).ok();
    }

    #[test]
    fn test_from_missing_file() {
        let missing = std::env::temp_dir().join("tanklog-test-does-not-exist.json");

        assert!(matches!(Config::from_file(&missing), Err(ConfigError::Invalid(_, _))));
    }

    #[test]
    fn test_from_flags_names_the_missing_credential() {
        match Config::from_flags(FlagValues::default()) {
            Err(ConfigError::MissingCredential(field)) => assert_eq!("--google-credentials", field),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
