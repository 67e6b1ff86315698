use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, engine_err, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_departments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let code = match required_str(&req.params, "code") {
        Ok(v) => v.to_uppercase(),
        Err(e) => return engine_err(req, e),
    };
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };

    let department_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO departments(id, code, name) VALUES(?, ?, ?)",
        (&department_id, &code, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "departments" })),
        );
    }

    ok(
        &req.id,
        json!({ "departmentId": department_id, "code": code, "name": name }),
    )
}

fn handle_departments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT
           d.id,
           d.code,
           d.name,
           (SELECT COUNT(*) FROM classes c WHERE c.department_id = d.id) AS class_count
         FROM departments d
         ORDER BY d.code",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            let name: String = row.get(2)?;
            let class_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "code": code,
                "name": name,
                "classCount": class_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(departments) => ok(&req.id, json!({ "departments": departments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "departments.create" => Some(handle_departments_create(state, req)),
        "departments.list" => Some(handle_departments_list(state, req)),
        _ => None,
    }
}
