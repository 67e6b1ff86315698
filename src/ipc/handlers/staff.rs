use crate::engine::{self, CredentialRecord, EngineError, Role};
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, engine_err, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use super::students::username_exists;

#[derive(Debug, Clone)]
pub struct StaffInput {
    pub role: Role,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub department_id: Option<String>,
}

pub fn staff_input_from_params(params: &serde_json::Value) -> Result<StaffInput, EngineError> {
    let role = Role::parse(&required_str(params, "role")?)?;
    if !role.is_staff() {
        return Err(EngineError::new(
            "bad_params",
            format!("{} accounts are not provisioned as staff", role.as_str()),
        ));
    }
    Ok(StaffInput {
        role,
        first_name: required_str(params, "firstName")?,
        middle_name: optional_str(params, "middleName"),
        last_name: required_str(params, "lastName")?,
        birth_date: engine::parse_birth_date(&required_str(params, "birthDate")?)?,
        department_id: None,
    })
}

/// Staff usernames derive the same way as students: first + last + birth
/// year, suffixed on collision.
pub fn provision_staff(
    conn: &Connection,
    input: &StaffInput,
) -> Result<(serde_json::Value, Vec<CredentialRecord>), EngineError> {
    let password = engine::derive_password(&input.first_name, input.birth_date);
    let seed = engine::username_seed(&input.first_name, &input.last_name, input.birth_date);
    let username = engine::issue_username(&seed, |c| username_exists(conn, c))?;
    let password_hash = engine::password_hash(&password);

    let person_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO people(
           id, role, first_name, middle_name, last_name, birth_date,
           username, password_hash, must_change_password, active,
           department_id, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1, 1, ?,
                  strftime('%Y-%m-%dT%H:%M:%SZ','now'),
                  strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &person_id,
            input.role.as_str(),
            &input.first_name,
            input.middle_name.as_deref(),
            &input.last_name,
            input.birth_date.format("%Y-%m-%d").to_string(),
            &username,
            &password_hash,
            input.department_id.as_deref(),
        ),
    )
    .map_err(|e| EngineError::new("db_insert_failed", e.to_string()))?;

    let credentials = vec![CredentialRecord {
        role: input.role.as_str().to_string(),
        username: username.clone(),
        password,
    }];
    let person = json!({
        "id": person_id,
        "role": input.role.as_str(),
        "firstName": input.first_name,
        "middleName": input.middle_name,
        "lastName": input.last_name,
        "birthDate": input.birth_date.format("%Y-%m-%d").to_string(),
        "username": username,
        "mustChangePassword": true,
        "departmentId": input.department_id
    });

    Ok((person, credentials))
}

fn handle_staff_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut input = match staff_input_from_params(&req.params) {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };
    if let Some(code) = optional_str(&req.params, "departmentCode") {
        input.department_id =
            match super::classes::resolve_department_by_code(conn, &code) {
                Ok(v) => Some(v),
                Err(e) => return engine_err(req, e),
            };
    }

    match provision_staff(conn, &input) {
        Ok((person, credentials)) => ok(
            &req.id,
            json!({ "person": person, "credentials": credentials }),
        ),
        Err(e) => engine_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "staff.create" => Some(handle_staff_create(state, req)),
        _ => None,
    }
}
