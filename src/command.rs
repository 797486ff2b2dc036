//! The request envelope shared by the TCP wire and the client, and the
//! dispatcher that turns an envelope into an engine operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::Database;

/// One request as it travels over the TCP wire: an action name, a dotted
/// path, and (for save/add) a JSON value. Fields are optional so that a
/// malformed envelope still deserializes and can be answered with a
/// structured error instead of dropping the connection.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    /// one of `save`, `read`, `delete`, `add`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// the dotted path the action targets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// the value carried by save/add requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    /// a `save` envelope
    pub fn save(path: impl Into<String>, data: Value) -> Self {
        Request {
            action: Some("save".to_string()),
            path: Some(path.into()),
            data: Some(data),
        }
    }

    /// a `read` envelope
    pub fn read(path: impl Into<String>) -> Self {
        Request {
            action: Some("read".to_string()),
            path: Some(path.into()),
            data: None,
        }
    }

    /// a `delete` envelope
    pub fn delete(path: impl Into<String>) -> Self {
        Request {
            action: Some("delete".to_string()),
            path: Some(path.into()),
            data: None,
        }
    }

    /// an `add` envelope
    pub fn add(path: impl Into<String>, data: Value) -> Self {
        Request {
            action: Some("add".to_string()),
            path: Some(path.into()),
            data: Some(data),
        }
    }
}

/// One response on the TCP wire: `{"status":"ok"}` with an optional `data`
/// field, or `{"error": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// the request was accepted (and, for reads, resolved)
    Ok {
        /// always the literal `"ok"`
        status: String,
        /// the resolved value, present on read responses only
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// the request failed; the message is client-facing
    Err {
        /// what went wrong
        error: String,
    },
}

impl Response {
    /// a bare acknowledgement
    pub fn ok() -> Self {
        Response::Ok {
            status: "ok".to_string(),
            data: None,
        }
    }

    /// an acknowledgement carrying a resolved value
    pub fn with_data(data: Value) -> Self {
        Response::Ok {
            status: "ok".to_string(),
            data: Some(data),
        }
    }

    /// an error response
    pub fn err(message: impl Into<String>) -> Self {
        Response::Err {
            error: message.into(),
        }
    }
}

/// Validates the envelope and invokes the matching engine operation. An empty
/// path is valid only for `read`, where it returns the whole store view.
pub fn dispatch(db: &Database, request: Request) -> Response {
    let action = match request.action.as_deref() {
        Some(action) => action,
        None => return Response::err("missing or invalid action"),
    };
    let path = match request.path {
        Some(path) => path,
        None => return Response::err("missing or invalid path"),
    };

    match action {
        "save" => {
            let data = match request.data {
                Some(data) => data,
                None => return Response::err("missing or invalid data"),
            };
            match db.set(&path, data) {
                Ok(()) => Response::ok(),
                Err(e) => Response::err(format!("failed to save data: {}", e)),
            }
        }
        "read" => match db.get(&path) {
            Ok(Some(value)) => Response::with_data(value),
            Ok(None) => Response::err("data not found"),
            Err(e) => Response::err(format!("failed to read data: {}", e)),
        },
        "delete" => match db.delete(&path) {
            Ok(()) => Response::ok(),
            Err(e) => Response::err(format!("failed to delete data: {}", e)),
        },
        "add" => {
            let data = match request.data {
                Some(data) => data,
                None => return Response::err("missing or invalid data"),
            };
            match db.add(&path, data) {
                Ok(()) => Response::ok(),
                Err(e) => Response::err(format!("failed to add data: {}", e)),
            }
        }
        _ => Response::err("unknown action"),
    }
}
