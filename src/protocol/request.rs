use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Result, RpcError};

/// Content type stamped on every request and reply.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A command invocation as carried in a message body.
///
/// Wire form: `{"Cmd": "<name>", "Params": {"<key>": "<value>", ...}}`.
/// Lowercase `cmd` / `params` keys are accepted too. `Params` may be omitted
/// or `null`; a missing `Cmd` reads as the empty command name, which no
/// service knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    // ---
    #[serde(rename = "Cmd", alias = "cmd", default)]
    pub cmd: String,

    #[serde(
        rename = "Params",
        alias = "params",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub params: HashMap<String, String>,
}

fn null_as_empty<'de, D>(d: D) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(d)?.unwrap_or_default())
}

impl Request {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Parse a message body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Encode as a message body.
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Like [`param`](Self::param), failing with [`RpcError::MissingParam`].
    pub fn require_param(&self, name: &str) -> Result<&str> {
        self.param(name)
            .ok_or_else(|| RpcError::MissingParam(name.to_string()))
    }

    /// Decode a parameter whose value is itself a JSON document.
    ///
    /// Services pass structured arguments this way, e.g.
    /// `{"Cmd": "store", "Params": {"release": "{\"title\": ...}"}}`.
    pub fn parse_param<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        // ---
        let raw = self.require_param(name)?;
        Ok(serde_json::from_str(raw)?)
    }
}

/// Body of every error reply: `{"error": "<message>", "context": "<context>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    pub context: String,
}

impl ErrorReply {
    pub fn new(error: &dyn fmt::Display, context: &str) -> Self {
        Self {
            error: error.to_string(),
            context: context.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn parses_wire_request() {
        // ---
        let req = Request::parse(br#"{"Cmd":"ping","Params":{"a":"1"}}"#).unwrap();
        assert_eq!(req.cmd, "ping");
        assert_eq!(req.param("a"), Some("1"));
    }

    #[test]
    fn params_may_be_missing_or_null() {
        // ---
        let missing = Request::parse(br#"{"Cmd":"bogus"}"#).unwrap();
        let null = Request::parse(br#"{"Cmd":"bogus","Params":null}"#).unwrap();
        assert!(missing.params.is_empty());
        assert!(null.params.is_empty());
    }

    #[test]
    fn malformed_bodies_fail() {
        // ---
        let bodies: [&[u8]; 5] = [
            b"not json",
            b"[1,2]",
            br#"{"Cmd":7}"#,
            br#"{"Cmd":"x","Params":{"a":1}}"#,
            b"",
        ];
        for body in bodies {
            assert!(Request::parse(body).is_err(), "{:?}", String::from_utf8_lossy(body));
        }
    }

    #[test]
    fn lowercase_keys_and_missing_command() {
        // ---
        let lower = Request::parse(br#"{"cmd":"ping","params":{"a":"1"}}"#).unwrap();
        assert_eq!(lower.cmd, "ping");
        assert_eq!(lower.param("a"), Some("1"));

        let nameless = Request::parse(br#"{"Params":{}}"#).unwrap();
        assert_eq!(nameless.cmd, "");
        assert_eq!(
            RpcError::UnknownCommand(nameless.cmd).to_string(),
            "Unknown command: "
        );
    }

    #[test]
    fn encodes_with_wire_field_names() {
        // ---
        let bytes = Request::new("info").to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["Cmd"], "info");
        assert!(value["Params"].as_object().unwrap().is_empty());
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Release {
        title: String,
        year: u16,
    }

    #[test]
    fn structured_parameter() {
        // ---
        let req = Request::new("store").with_param("release", r#"{"title":"Kind of Blue","year":1959}"#);

        let release: Release = req.parse_param("release").unwrap();
        assert_eq!(release.title, "Kind of Blue");
        assert_eq!(release.year, 1959);

        let err = req.parse_param::<Release>("missing").unwrap_err();
        assert!(matches!(err, RpcError::MissingParam(name) if name == "missing"));
    }

    #[test]
    fn error_reply_escapes_message() {
        // ---
        let reply = ErrorReply::new(&"bad \"quote\"", "Message dispatcher");
        let decoded: ErrorReply = serde_json::from_slice(&reply.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, reply);
    }
}
