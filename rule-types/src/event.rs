//! Observed exchanges delivered to callback listeners.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One request/response pair seen by the proxy.
///
/// Bodies are raw bytes; on the wire they are standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackEvent {
    /// HTTP method of the request.
    pub method: String,
    /// Path and query of the request.
    pub path: String,
    /// Request headers, lower-case names.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Raw request body.
    #[serde(with = "b64")]
    pub request_body: Vec<u8>,
    /// Raw response body (synthetic if the request was blocked).
    #[serde(with = "b64")]
    pub response_body: Vec<u8>,
    /// Status code the client received.
    pub response_code: u16,
}

impl CallbackEvent {
    /// The access token of the request, from `Authorization: Bearer` or the
    /// `access_token` query parameter.
    pub fn access_token(&self) -> Option<&str> {
        if let Some(token) = self
            .headers
            .get("authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
        {
            return Some(token);
        }
        let (_, query) = self.path.split_once('?')?;
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("access_token="))
    }

    /// Parse the request body as JSON.
    pub fn request_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.request_body)
    }

    /// Parse the response body as JSON.
    pub fn response_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.response_body)
    }
}

mod b64 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
