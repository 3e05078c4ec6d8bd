//! # Request and response types
//!
//! Wire-level shapes of a batch call. A [`BatchRequest`] is an ordered list of
//! [`SubRequest`]s; the matching [`BatchResponse`] holds exactly one
//! [`SubResponse`] per sub-request, at the same index.
//!
//! Sub-requests carry no index of their own: position is their only identity.
//!
//! ## JSON
//!
//! ```json
//! { "requests": [
//!     { "type": "account", "account_id": "acc-1" },
//!     { "type": "account", "account_alias": "treasury" }
//! ] }
//! ```
//!
//! ```json
//! { "responses": [
//!     { "control_program": { "account_id": "acc-1", "program": "6374..." } },
//!     { "error": { "kind": "not_found", "message": "account alias not found",
//!                  "detail": { "key": "treasury" }, "temporary": false } }
//! ] }
//! ```

use crate::common::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// An ordered batch of sub-requests submitted as one call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub requests: Vec<SubRequest>,
}

/// The ordered outcome of a [`BatchRequest`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub responses: Vec<SubResponse>,
}

/// One item of a batch, tagged by kind.
///
/// Unknown `type` tags deserialize to [`SubRequest::Unsupported`] so that a
/// single unrecognized item fails on its own instead of rejecting the batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubRequest {
    /// Create a control program for an account, named by id or alias.
    Account(AccountRequest),
    #[serde(other)]
    Unsupported,
}

impl SubRequest {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Account(_) => "account",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Account selector. A non-empty `account_id` takes precedence over the alias.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_alias: Option<String>,
}

impl AccountRequest {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            account_id: Some(id.into()),
            account_alias: None,
        }
    }

    pub fn by_alias(alias: impl Into<String>) -> Self {
        Self {
            account_id: None,
            account_alias: Some(alias.into()),
        }
    }
}

/// A control program created for an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlProgram {
    pub account_id: String,
    /// Lower-case hex encoding of the program bytes.
    pub program: String,
}

/// The outcome of one sub-request: exactly one of a control program or an
/// error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubResponse {
    ControlProgram(ControlProgram),
    Error(WireError),
}

impl SubResponse {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::ControlProgram(_))
    }

    pub const fn error(&self) -> Option<&WireError> {
        match self {
            Self::Error(err) => Some(err),
            Self::ControlProgram(_) => None,
        }
    }

    pub const fn control_program(&self) -> Option<&ControlProgram> {
        match self {
            Self::ControlProgram(program) => Some(program),
            Self::Error(_) => None,
        }
    }
}

impl From<crate::Result<ControlProgram>> for SubResponse {
    fn from(result: crate::Result<ControlProgram>) -> Self {
        match result {
            Ok(program) => Self::ControlProgram(program),
            Err(err) => Self::Error(err.into()),
        }
    }
}

/// Client-facing failure descriptor.
///
/// Domain errors and recovered panics both end up in this shape; only `kind`,
/// `message` and `detail` tell them apart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub temporary: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_type_tag_is_unsupported() {
        let req: BatchRequest = serde_json::from_value(json!({
            "requests": [
                { "type": "account", "account_alias": "treasury" },
                { "type": "asset", "asset_id": "a1" }
            ]
        }))
        .unwrap();

        assert_eq!(
            req.requests,
            vec![
                SubRequest::Account(AccountRequest::by_alias("treasury")),
                SubRequest::Unsupported,
            ]
        );
    }

    #[test]
    fn missing_type_tag_rejects_the_envelope() {
        let res = serde_json::from_value::<BatchRequest>(json!({
            "requests": [{ "account_id": "acc-1" }]
        }));
        assert!(res.is_err());
    }

    #[test]
    fn sub_response_has_exactly_one_key() {
        let ok = SubResponse::ControlProgram(ControlProgram {
            account_id: "acc-1".to_string(),
            program: "00ff".to_string(),
        });
        let err = SubResponse::Error(WireError {
            kind: ErrorKind::NotFound,
            message: "account not found".to_string(),
            detail: None,
            temporary: false,
        });

        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "control_program": { "account_id": "acc-1", "program": "00ff" } })
        );
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "error": { "kind": "not_found", "message": "account not found", "temporary": false } })
        );
    }
}
