//! Wire types for the store's HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Login request body for JWT-based auth methods.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub role: &'a str,
    pub jwt: &'a str,
}

/// Lease renewal request body.
#[derive(Debug, Serialize)]
pub struct RenewRequest<'a> {
    pub lease_id: &'a str,
    pub increment: u64,
}

/// Lease revocation request body.
#[derive(Debug, Serialize)]
pub struct RevokeRequest<'a> {
    pub lease_id: &'a str,
}

/// Auth response returned by login and token renewal.
#[derive(Deserialize)]
pub struct AuthResponse {
    pub auth: AuthData,
}

#[derive(Deserialize)]
pub struct AuthData {
    pub client_token: String,
    #[serde(default)]
    pub accessor: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
}

/// Secret read response. `data` stays untyped until it is moved into a
/// credential.
#[derive(Deserialize)]
pub struct SecretResponse {
    #[serde(default)]
    pub lease_id: String,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl SecretResponse {
    /// Secret fields, with KV v2 `{"data": {...}, "metadata": {...}}`
    /// envelopes unwrapped.
    pub fn into_fields(self) -> Map<String, Value> {
        let mut data = self.data.unwrap_or_default();
        let is_kv2 = data.len() == 2
            && data.get("metadata").is_some_and(Value::is_object)
            && data.get("data").is_some_and(Value::is_object);

        if is_kv2 {
            if let Some(Value::Object(inner)) = data.remove("data") {
                return inner;
            }
        }
        data
    }
}

/// Lease renewal response.
#[derive(Debug, Deserialize)]
pub struct RenewResponse {
    pub lease_id: String,
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
}

/// Render a JSON value as the string written for a secret field.
pub fn field_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kv1_and_dynamic_fields_pass_through() {
        let response: SecretResponse = serde_json::from_value(json!({
            "lease_id": "database/creds/app/xyz",
            "lease_duration": 3600,
            "renewable": true,
            "data": {"username": "v-app", "password": "pw"}
        }))
        .unwrap();

        let fields = response.into_fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["username"], json!("v-app"));
    }

    #[test]
    fn test_kv2_envelope_unwrapped() {
        let response: SecretResponse = serde_json::from_value(json!({
            "data": {
                "data": {"api_key": "k"},
                "metadata": {"version": 3, "destroyed": false}
            }
        }))
        .unwrap();

        assert_eq!(response.lease_duration, 0);
        let fields = response.into_fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["api_key"], json!("k"));
    }

    #[test]
    fn test_secret_named_data_is_not_unwrapped() {
        let response: SecretResponse = serde_json::from_value(json!({
            "data": {"data": {"nested": true}, "other": "x"}
        }))
        .unwrap();

        assert_eq!(response.into_fields().len(), 2);
    }

    #[test]
    fn test_field_value_rendering() {
        assert_eq!(field_value(json!("s")), "s");
        assert_eq!(field_value(json!(5432)), "5432");
        assert_eq!(field_value(json!(true)), "true");
        assert_eq!(field_value(Value::Null), "");
    }
}
