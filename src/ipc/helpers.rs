use rusqlite::Connection;

use crate::engine::EngineError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};

pub fn engine_err(req: &Request, e: EngineError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, EngineError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::new("bad_params", format!("missing {}", key)))
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn required_i64(params: &serde_json::Value, key: &str) -> Result<i64, EngineError> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| EngineError::new("bad_params", format!("missing {}", key)))
}
