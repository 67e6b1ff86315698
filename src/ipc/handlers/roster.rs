use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, engine_err, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roster;

fn handle_reorganize(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };

    match roster::reorganize(conn, &class_id) {
        Ok(view) => ok(&req.id, view),
        Err(e) => engine_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.reorganize" => Some(handle_reorganize(state, req)),
        _ => None,
    }
}
