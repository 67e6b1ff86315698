use crate::engine::{self, CredentialRecord, EngineError};
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, engine_err, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct PersonRow {
    role: String,
    first_name: String,
    birth_date: Option<String>,
    username: String,
}

fn load_person(conn: &Connection, person_id: &str) -> Result<PersonRow, EngineError> {
    conn.query_row(
        "SELECT role, first_name, birth_date, username
         FROM people WHERE id = ? AND active = 1",
        [person_id],
        |r| {
            Ok(PersonRow {
                role: r.get(0)?,
                first_name: r.get(1)?,
                birth_date: r.get(2)?,
                username: r.get(3)?,
            })
        },
    )
    .optional()
    .map_err(|e| EngineError::new("db_query_failed", e.to_string()))?
    .ok_or_else(|| EngineError::new("not_found", "person not found"))
}

/// Deterministic reset re-derives the issuance password from the same
/// biographical fields, so support staff can read it back to the user. A
/// parent's password is the linked student's, by the shared-credential
/// policy.
fn derive_reset_password(
    conn: &Connection,
    person_id: &str,
    person: &PersonRow,
) -> Result<String, EngineError> {
    if person.role == "parent" {
        let student: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT p.first_name, p.birth_date
                 FROM student_profiles sp
                 JOIN people p ON p.id = sp.person_id
                 WHERE sp.parent_id = ?",
                [person_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(|e| EngineError::new("db_query_failed", e.to_string()))?;
        let Some((first, birth_date)) = student else {
            return Err(EngineError::new("not_found", "linked student not found"));
        };
        let Some(birth_date) = birth_date else {
            return Err(EngineError::new(
                "bad_params",
                "linked student has no birth date on record",
            ));
        };
        return Ok(engine::derive_password(
            &first,
            engine::parse_birth_date(&birth_date)?,
        ));
    }

    let Some(birth_date) = person.birth_date.as_deref() else {
        return Err(EngineError::new(
            "bad_params",
            "person has no birth date on record",
        ));
    };
    Ok(engine::derive_password(
        &person.first_name,
        engine::parse_birth_date(birth_date)?,
    ))
}

fn handle_reset_password(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let person_id = match required_str(&req.params, "personId") {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };
    let randomize = req
        .params
        .get("randomize")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let person = match load_person(conn, &person_id) {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };

    let password = if randomize {
        let mut token = Uuid::new_v4().simple().to_string();
        token.truncate(10);
        token
    } else {
        match derive_reset_password(conn, &person_id, &person) {
            Ok(v) => v,
            Err(e) => return engine_err(req, e),
        }
    };

    let updated = conn
        .execute(
            "UPDATE people SET password_hash = ?, must_change_password = 1,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ?",
            (engine::password_hash(&password), &person_id),
        )
        .map_err(|e| EngineError::new("db_update_failed", e.to_string()));
    match updated {
        Ok(0) => return engine_err(req, EngineError::new("not_found", "person not found")),
        Ok(_) => {}
        Err(e) => return engine_err(req, e),
    }

    let credentials = CredentialRecord {
        role: person.role,
        username: person.username,
        password,
    };
    ok(&req.id, json!({ "credentials": credentials }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "people.resetPassword" => Some(handle_reset_password(state, req)),
        _ => None,
    }
}
