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

use crate::sensor::core::{DeviceStatus, Measurement, SensorError, SensorErrorKind, StatusDatapoint, Transport};
use chrono::Utc;
use chrono_tz::Tz;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const SIGN_METHOD: &str = "HMAC-SHA256";
const TOKEN_PATH: &str = "/v1.0/token?grant_type=1";

/// Successful token grant from the platform.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
}

/// Client for the Tuya cloud API using its v2 request signature.
///
/// Every call is a fresh token grant followed by the business request, the
/// same single authenticated request/response cycle the vendor SDK performs.
/// There are no retries; a failed call is a failed call.
pub struct TuyaClient<T> {
    transport: T,
    access_id: String,
    access_key: String,
}

impl<T> TuyaClient<T>
where
    T: Transport,
{
    pub fn new<I, K>(transport: T, access_id: I, access_key: K) -> Self
    where
        I: Into<String>,
        K: Into<String>,
    {
        TuyaClient {
            transport,
            access_id: access_id.into(),
            access_key: access_key.into(),
        }
    }

    /// Read the current status of a device as a flat code/value snapshot.
    pub async fn device_status(&self, device_id: &str) -> Result<DeviceStatus, SensorError> {
        let points = self.device_datapoints(device_id).await?;
        Ok(DeviceStatus::from_datapoints(&points))
    }

    /// Read the current status of a device as the raw datapoint list.
    pub async fn device_datapoints(&self, device_id: &str) -> Result<Vec<StatusDatapoint>, SensorError> {
        let path = format!("/v1.0/iot-03/devices/{}/status", device_id);
        let body = self.authorized_get(&path).await?;
        parse_envelope(&body)
    }

    /// Read the platform's metadata record for a device.
    pub async fn device_info(&self, device_id: &str) -> Result<serde_json::Value, SensorError> {
        let path = format!("/v1.0/iot-03/devices/{}", device_id);
        let body = self.authorized_get(&path).await?;
        parse_envelope(&body)
    }

    /// Read the instruction set a device supports.
    pub async fn device_functions(&self, device_id: &str) -> Result<serde_json::Value, SensorError> {
        let path = format!("/v1.0/iot-03/devices/{}/functions", device_id);
        let body = self.authorized_get(&path).await?;
        parse_envelope(&body)
    }

    /// Poll a device once and derive a measurement stamped with the current
    /// time in the given timezone.
    pub async fn fetch_measurement(&self, device_id: &str, timezone: Tz) -> Result<Measurement, SensorError> {
        let status = self.device_status(device_id).await?;
        let taken_at = Utc::now().with_timezone(&timezone);
        Ok(Measurement::from_status(&status, taken_at))
    }

    /// Obtain a short-lived access token using the client credentials grant.
    async fn token(&self) -> Result<String, SensorError> {
        let body = self.signed_get(TOKEN_PATH, None).await?;
        let grant: TokenGrant = parse_envelope(&body).map_err(|e| match e {
            SensorError::Rejected(_) => SensorError::KindMsgCause(
                SensorErrorKind::Authentication,
                "platform refused the token grant",
                Box::new(e),
            ),
            other => other,
        })?;

        Ok(grant.access_token)
    }

    /// Fetch a token and issue a token-authorized GET.
    async fn authorized_get(&self, path_and_query: &str) -> Result<String, SensorError> {
        let token = self.token().await?;
        self.signed_get(path_and_query, Some(&token)).await
    }

    async fn signed_get(&self, path_and_query: &str, token: Option<&str>) -> Result<String, SensorError> {
        let t = Utc::now().timestamp_millis().to_string();
        let headers = self.signature_headers("GET", path_and_query, token, &t, "");
        self.transport.get(path_and_query, &headers).await
    }

    fn signature_headers(
        &self,
        method: &str,
        path_and_query: &str,
        token: Option<&str>,
        t: &str,
        nonce: &str,
    ) -> Vec<(&'static str, String)> {
        let sign = request_signature(
            &self.access_id,
            &self.access_key,
            token,
            t,
            nonce,
            method,
            "",
            path_and_query,
        );

        let mut headers = vec![
            ("client_id", self.access_id.clone()),
            ("sign", sign),
            ("t", t.to_string()),
            ("sign_method", SIGN_METHOD.to_string()),
            ("nonce", nonce.to_string()),
        ];

        if let Some(token) = token {
            headers.push(("access_token", token.to_string()));
        }

        headers
    }
}

/// Check the success flag every platform response carries and pull the result
/// payload out of the envelope.
fn parse_envelope<R>(body: &str) -> Result<R, SensorError>
where
    R: DeserializeOwned,
{
    let raw: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        SensorError::KindMsgCause(SensorErrorKind::Response, "platform returned malformed json", Box::new(e))
    })?;

    let success = raw.get("success").and_then(serde_json::Value::as_bool).unwrap_or(false);
    if !success {
        return Err(SensorError::Rejected(raw));
    }

    let result = raw.get("result").cloned().unwrap_or(serde_json::Value::Null);
    serde_json::from_value(result).map_err(|e| {
        SensorError::KindMsgCause(SensorErrorKind::Response, "unexpected result payload", Box::new(e))
    })
}

/// Canonical string covered by the v2 signature: the method, the SHA256 of the
/// body, an empty optional-headers section, and the path with its query.
fn string_to_sign(method: &str, body: &str, path_and_query: &str) -> String {
    let body_hash = hex::encode(Sha256::digest(body.as_bytes()));
    format!("{}\n{}\n\n{}", method, body_hash, path_and_query)
}

/// Upper-hex HMAC-SHA256 over the concatenation the platform expects: client
/// id, access token for business calls, timestamp, nonce, canonical string.
fn request_signature(
    access_id: &str,
    access_key: &str,
    token: Option<&str>,
    t: &str,
    nonce: &str,
    method: &str,
    body: &str,
    path_and_query: &str,
) -> String {
    let mut message = String::from(access_id);
    if let Some(token) = token {
        message.push_str(token);
    }
    message.push_str(t);
    message.push_str(nonce);
    message.push_str(&string_to_sign(method, body, path_and_query));

    let mut mac = HmacSha256::new_from_slice(access_key.as_bytes()).expect("hmac accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode_upper(mac.finalize().into_bytes())
}

/// `Transport` implementation backed by a shared reqwest client.
pub struct HttpTransport {
    base: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new<S>(base: S) -> Self
    where
        S: Into<String>,
    {
        HttpTransport {
            base: base.into(),
            http: reqwest::Client::new(),
        }
    }
}

impl Transport for HttpTransport {
    async fn get(&self, path_and_query: &str, headers: &[(&'static str, String)]) -> Result<String, SensorError> {
        let url = format!("{}{}", self.base.trim_end_matches('/'), path_and_query);
        let mut request = self.http.get(&url);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await.map_err(|e| {
            SensorError::KindMsgCause(SensorErrorKind::Transport, "request to the platform failed", Box::new(e))
        })?;

        response.text().await.map_err(|e| {
            SensorError::KindMsgCause(SensorErrorKind::Transport, "failed to read the platform response", Box::new(e))
        })
    }
}

#[cfg(test)]
mod test {
    use super::{parse_envelope, request_signature, string_to_sign, TuyaClient};
    use crate::sensor::core::{Ph, SensorError, SensorErrorKind, StatusDatapoint, WaterTemp};
    use crate::sensor::test::{SequenceTransport, UnreachableTransport};

    const TOKEN_BODY: &str = r#"{"success":true,"t":1700000000000,"result":{"access_token":"atoken","expire_time":7200,"refresh_token":"rtoken","uid":"uid1"}}"#;

    const STATUS_BODY: &str = r#"{"success":true,"t":1700000000000,"result":[
        {"code":"ph","value":650},
        {"code":"tds_in","value":540},
        {"code":"conductivity_value","value":1080},
        {"code":"temp_current","value":235}
    ]}"#;

    const REJECTED_BODY: &str = r#"{"success":false,"t":1700000000000,"code":1106,"msg":"permission deny"}"#;

    #[test]
    fn test_string_to_sign_empty_body() {
        let s = string_to_sign("GET", "", "/v1.0/token?grant_type=1");

        // SHA256 of the empty string is a fixed constant
        assert_eq!(
            "GET\ne3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\n\n/v1.0/token?grant_type=1",
            s
        );
    }

    #[test]
    fn test_request_signature_shape() {
        let sign = request_signature("id", "key", None, "1700000000000", "", "GET", "", "/v1.0/token?grant_type=1");

        assert_eq!(64, sign.len());
        assert!(sign.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_request_signature_deterministic() {
        let first = request_signature("id", "key", Some("tok"), "1700000000000", "", "GET", "", "/v1.0/x");
        let second = request_signature("id", "key", Some("tok"), "1700000000000", "", "GET", "", "/v1.0/x");
        let other_token = request_signature("id", "key", Some("other"), "1700000000000", "", "GET", "", "/v1.0/x");

        assert_eq!(first, second);
        assert_ne!(first, other_token);
    }

    #[test]
    fn test_parse_envelope_rejected() {
        let res = parse_envelope::<Vec<StatusDatapoint>>(REJECTED_BODY);

        assert!(res.is_err());
        assert_eq!(SensorErrorKind::Query, res.unwrap_err().kind());
    }

    #[test]
    fn test_parse_envelope_rejected_carries_raw_response() {
        let res = parse_envelope::<Vec<StatusDatapoint>>(REJECTED_BODY);

        match res.unwrap_err() {
            SensorError::Rejected(raw) => {
                assert_eq!(Some(1106), raw.get("code").and_then(serde_json::Value::as_i64));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_parse_envelope_malformed() {
        let res = parse_envelope::<Vec<StatusDatapoint>>("not json");

        assert!(res.is_err());
        assert_eq!(SensorErrorKind::Response, res.unwrap_err().kind());
    }

    #[tokio::test]
    async fn test_device_status_success() {
        let transport = SequenceTransport::new([TOKEN_BODY, STATUS_BODY]);
        let client = TuyaClient::new(transport, "id", "key");

        let status = client.device_status("dev1").await.unwrap();

        assert_eq!(650.0, status.value("ph"));
        assert_eq!(540.0, status.value("tds_in"));
        assert_eq!(0.0, status.value("missing"));
    }

    #[tokio::test]
    async fn test_device_status_rejected_by_platform() {
        let transport = SequenceTransport::new([TOKEN_BODY, REJECTED_BODY]);
        let client = TuyaClient::new(transport, "id", "key");

        let res = client.device_status("dev1").await;

        assert!(res.is_err());
        assert_eq!(SensorErrorKind::Query, res.unwrap_err().kind());
    }

    #[tokio::test]
    async fn test_token_grant_rejected() {
        let transport = SequenceTransport::new([REJECTED_BODY]);
        let client = TuyaClient::new(transport, "id", "key");

        let res = client.device_status("dev1").await;

        assert!(res.is_err());
        assert_eq!(SensorErrorKind::Authentication, res.unwrap_err().kind());
    }

    #[tokio::test]
    async fn test_unreachable_transport() {
        let client = TuyaClient::new(UnreachableTransport, "id", "key");

        let res = client.device_status("dev1").await;

        assert!(res.is_err());
        assert_eq!(SensorErrorKind::Transport, res.unwrap_err().kind());
    }

    #[tokio::test]
    async fn test_fetch_measurement_scaling() {
        let transport = SequenceTransport::new([TOKEN_BODY, STATUS_BODY]);
        let client = TuyaClient::new(transport, "id", "key");

        let measurement = client
            .fetch_measurement("dev1", chrono_tz::America::Los_Angeles)
            .await
            .unwrap();

        assert_eq!(Ph::from(6.5), measurement.ph);
        assert_eq!(540.0, f64::from(measurement.dissolved_solids));
        assert_eq!(1080.0, f64::from(measurement.conductivity));
        assert_eq!(WaterTemp::from((235.0 / 10.0) * 9.0 / 5.0 + 32.0), measurement.water_temp);
    }
}
