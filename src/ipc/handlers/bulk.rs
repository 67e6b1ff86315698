use crate::engine::{self, EngineError};
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, engine_err, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

use super::classes::{resolve_class_by_name, resolve_department_by_code};
use super::staff::{provision_staff, staff_input_from_params};
use super::students::{provision_student, student_input_from_params};

fn rows_from_params(params: &serde_json::Value) -> Result<Vec<serde_json::Value>, EngineError> {
    params
        .get("rows")
        .and_then(|v| v.as_array())
        .map(|v| v.to_vec())
        .ok_or_else(|| EngineError::new("bad_params", "missing rows"))
}

/// Rows resolve their class by department code + class name, the way the
/// uploaded sheet names them, never by internal id.
fn handle_students_bulk_upload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let rows = match rows_from_params(&req.params) {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };

    let outcome = engine::import_rows(
        &rows,
        |row| {
            student_input_from_params(row)?;
            required_str(row, "departmentCode")?;
            required_str(row, "className")?;
            Ok(())
        },
        |row| {
            let mut input = student_input_from_params(row)?;
            let department_id =
                resolve_department_by_code(conn, &required_str(row, "departmentCode")?)?;
            let class_id =
                resolve_class_by_name(conn, &department_id, &required_str(row, "className")?)?;
            input.class_id = Some(class_id);
            let (_, credentials) = provision_student(conn, &input)?;
            Ok(credentials)
        },
    );

    ok(&req.id, json!(outcome))
}

fn handle_staff_bulk_upload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let rows = match rows_from_params(&req.params) {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };

    let outcome = engine::import_rows(
        &rows,
        |row| {
            staff_input_from_params(row)?;
            required_str(row, "departmentCode")?;
            Ok(())
        },
        |row| {
            let mut input = staff_input_from_params(row)?;
            input.department_id = Some(resolve_department_by_code(
                conn,
                &required_str(row, "departmentCode")?,
            )?);
            let (_, credentials) = provision_staff(conn, &input)?;
            Ok(credentials)
        },
    );

    ok(&req.id, json!(outcome))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.bulkUpload" => Some(handle_students_bulk_upload(state, req)),
        "staff.bulkUpload" => Some(handle_staff_bulk_upload(state, req)),
        _ => None,
    }
}
