use crate::engine::{EngineError, MAX_CLASS_CAPACITY, MIN_CLASS_CAPACITY};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, engine_err, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub fn resolve_department_by_code(
    conn: &Connection,
    code: &str,
) -> Result<String, EngineError> {
    conn.query_row(
        "SELECT id FROM departments WHERE code = ?",
        [&code.to_uppercase()],
        |r| r.get::<_, String>(0),
    )
    .optional()
    .map_err(|e| EngineError::new("db_query_failed", e.to_string()))?
    .ok_or_else(|| {
        EngineError::new("not_found", format!("unknown department code: {}", code))
    })
}

pub fn resolve_class_by_name(
    conn: &Connection,
    department_id: &str,
    name: &str,
) -> Result<String, EngineError> {
    conn.query_row(
        "SELECT id FROM classes WHERE department_id = ? AND name = ?",
        (department_id, name),
        |r| r.get::<_, String>(0),
    )
    .optional()
    .map_err(|e| EngineError::new("db_query_failed", e.to_string()))?
    .ok_or_else(|| EngineError::new("not_found", format!("unknown class: {}", name)))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };
    let year = match required_i64(&req.params, "year") {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };
    let max_capacity = match required_i64(&req.params, "maxCapacity") {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };
    if !(MIN_CLASS_CAPACITY..=MAX_CLASS_CAPACITY).contains(&max_capacity) {
        return err(
            &req.id,
            "bad_params",
            format!(
                "maxCapacity must be between {} and {}",
                MIN_CLASS_CAPACITY, MAX_CLASS_CAPACITY
            ),
            Some(json!({ "maxCapacity": max_capacity })),
        );
    }
    let department_code = match required_str(&req.params, "departmentCode") {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };
    let department_id = match resolve_department_by_code(conn, &department_code) {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name, year, department_id, max_capacity)
         VALUES(?, ?, ?, ?, ?)",
        (&class_id, &name, year, &department_id, max_capacity),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(
        &req.id,
        json!({
            "classId": class_id,
            "name": name,
            "year": year,
            "maxCapacity": max_capacity
        }),
    )
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    // Counts via correlated subqueries so joins cannot double-count.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.year,
           c.max_capacity,
           d.code,
           (SELECT COUNT(*)
              FROM student_profiles sp
              JOIN people p ON p.id = sp.person_id
             WHERE sp.class_id = c.id AND p.active = 1) AS student_count
         FROM classes c
         JOIN departments d ON d.id = c.department_id
         ORDER BY d.code, c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let year: i64 = row.get(2)?;
            let max_capacity: i64 = row.get(3)?;
            let department_code: String = row.get(4)?;
            let student_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "year": year,
                "maxCapacity": max_capacity,
                "departmentCode": department_code,
                "studentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_set_coordinator(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };
    let person_id = match required_str(&req.params, "personId") {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };

    let role: Option<String> = match conn
        .query_row(
            "SELECT role FROM people WHERE id = ? AND active = 1",
            [&person_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(role) = role else {
        return err(&req.id, "not_found", "person not found", None);
    };
    if role != "teacher" && role != "classcoordinator" && role != "hod" {
        return err(
            &req.id,
            "bad_params",
            "coordinator must be teaching staff",
            Some(json!({ "role": role })),
        );
    }

    let updated = match conn.execute(
        "UPDATE classes SET coordinator_id = ? WHERE id = ?",
        (&person_id, &class_id),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if updated == 0 {
        return err(&req.id, "not_found", "class not found", None);
    }

    ok(&req.id, json!({ "classId": class_id, "coordinatorId": person_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.setCoordinator" => Some(handle_classes_set_coordinator(state, req)),
        _ => None,
    }
}
