use crate::engine::{self, CredentialRecord, EngineError, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, engine_err, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StudentInput {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub class_id: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
}

pub fn student_input_from_params(
    params: &serde_json::Value,
) -> Result<StudentInput, EngineError> {
    let first_name = required_str(params, "firstName")?;
    let last_name = required_str(params, "lastName")?;
    let birth_date = engine::parse_birth_date(&required_str(params, "birthDate")?)?;

    let father_name = optional_str(params, "fatherName");
    let mother_name = optional_str(params, "motherName");
    if father_name.is_some() != mother_name.is_some() {
        return Err(EngineError::new(
            "bad_params",
            "fatherName and motherName must be provided together",
        ));
    }

    Ok(StudentInput {
        first_name,
        middle_name: optional_str(params, "middleName"),
        last_name,
        birth_date,
        class_id: optional_str(params, "classId"),
        father_name,
        mother_name,
    })
}

pub fn username_exists(conn: &Connection, candidate: &str) -> Result<bool, EngineError> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM people WHERE username = ?",
            [candidate],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| EngineError::new("db_query_failed", e.to_string()))?;
    Ok(hit.is_some())
}

fn check_class_capacity(conn: &Connection, class_id: &str) -> Result<(), EngineError> {
    let max_capacity: Option<i64> = conn
        .query_row(
            "SELECT max_capacity FROM classes WHERE id = ?",
            [class_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| EngineError::new("db_query_failed", e.to_string()))?;
    let Some(max_capacity) = max_capacity else {
        return Err(EngineError::new("not_found", "class not found"));
    };

    let active: i64 = conn
        .query_row(
            "SELECT COUNT(*)
             FROM student_profiles sp
             JOIN people p ON p.id = sp.person_id
             WHERE sp.class_id = ? AND p.active = 1",
            [class_id],
            |r| r.get(0),
        )
        .map_err(|e| EngineError::new("db_query_failed", e.to_string()))?;

    if active + 1 > max_capacity {
        return Err(EngineError::new(
            "capacity_exceeded",
            format!("class is at capacity {}", max_capacity),
        )
        .with_details(json!({
            "studentCount": active,
            "maxCapacity": max_capacity
        })));
    }
    Ok(())
}

/// Create a student (and, when both parent names are given, the linked parent
/// account) in one transaction. The parent shares the student's password and
/// its username keys on the student's birth year. The UNIQUE constraint on
/// people.username is the final collision check inside the same transaction
/// that writes the name.
pub fn provision_student(
    conn: &Connection,
    input: &StudentInput,
) -> Result<(serde_json::Value, Vec<CredentialRecord>), EngineError> {
    if let Some(class_id) = input.class_id.as_deref() {
        check_class_capacity(conn, class_id)?;
    }

    let password = engine::derive_password(&input.first_name, input.birth_date);
    let seed = engine::username_seed(&input.first_name, &input.last_name, input.birth_date);
    let username = engine::issue_username(&seed, |c| username_exists(conn, c))?;

    let parent = match (input.father_name.as_deref(), input.mother_name.as_deref()) {
        (Some(father), Some(mother)) => {
            let parent_seed = engine::parent_username_seed(
                father,
                &input.last_name,
                mother,
                input.birth_date,
            );
            let parent_username =
                engine::issue_username(&parent_seed, |c| username_exists(conn, c))?;
            Some((father.to_string(), parent_username))
        }
        _ => None,
    };

    let password_hash = engine::password_hash(&password);
    let student_id = Uuid::new_v4().to_string();
    let parent_id = parent.as_ref().map(|_| Uuid::new_v4().to_string());

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| EngineError::new("db_tx_failed", e.to_string()))?;

    let inserted = tx.execute(
        "INSERT INTO people(
           id, role, first_name, middle_name, last_name, birth_date,
           username, password_hash, must_change_password, active,
           created_at, updated_at
         ) VALUES(?, 'student', ?, ?, ?, ?, ?, ?, 1, 1,
                  strftime('%Y-%m-%dT%H:%M:%SZ','now'),
                  strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &student_id,
            &input.first_name,
            input.middle_name.as_deref(),
            &input.last_name,
            input.birth_date.format("%Y-%m-%d").to_string(),
            &username,
            &password_hash,
        ),
    );
    if let Err(e) = inserted {
        let _ = tx.rollback();
        return Err(EngineError::new("db_insert_failed", e.to_string()));
    }

    if let (Some((father, parent_username)), Some(pid)) = (&parent, &parent_id) {
        let inserted = tx.execute(
            "INSERT INTO people(
               id, role, first_name, last_name, birth_date,
               username, password_hash, must_change_password, active,
               created_at, updated_at
             ) VALUES(?, 'parent', ?, ?, NULL, ?, ?, 1, 1,
                      strftime('%Y-%m-%dT%H:%M:%SZ','now'),
                      strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
            (pid, father, &input.last_name, parent_username, &password_hash),
        );
        if let Err(e) = inserted {
            let _ = tx.rollback();
            return Err(EngineError::new("db_insert_failed", e.to_string()));
        }
    }

    let inserted = tx.execute(
        "INSERT INTO student_profiles(
           person_id, class_id, roll_no, parent_id, father_name, mother_name
         ) VALUES(?, ?, NULL, ?, ?, ?)",
        (
            &student_id,
            input.class_id.as_deref(),
            parent_id.as_deref(),
            input.father_name.as_deref(),
            input.mother_name.as_deref(),
        ),
    );
    if let Err(e) = inserted {
        let _ = tx.rollback();
        return Err(EngineError::new("db_insert_failed", e.to_string()));
    }

    tx.commit()
        .map_err(|e| EngineError::new("db_tx_failed", e.to_string()))?;

    let mut credentials = vec![CredentialRecord {
        role: Role::Student.as_str().to_string(),
        username: username.clone(),
        password: password.clone(),
    }];
    if let Some((_, parent_username)) = &parent {
        credentials.push(CredentialRecord {
            role: Role::Parent.as_str().to_string(),
            username: parent_username.clone(),
            password,
        });
    }

    let person = json!({
        "id": student_id,
        "role": "student",
        "firstName": input.first_name,
        "middleName": input.middle_name,
        "lastName": input.last_name,
        "birthDate": input.birth_date.format("%Y-%m-%d").to_string(),
        "username": username,
        "mustChangePassword": true,
        "classId": input.class_id,
        "rollNo": serde_json::Value::Null,
        "parentId": parent_id
    });

    Ok((person, credentials))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let input = match student_input_from_params(&req.params) {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };
    match provision_student(conn, &input) {
        Ok((person, credentials)) => ok(
            &req.id,
            json!({ "person": person, "credentials": credentials }),
        ),
        Err(e) => engine_err(req, e),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };

    let mut stmt = match conn.prepare(
        "SELECT p.id, p.first_name, p.middle_name, p.last_name, p.username,
                sp.roll_no, sp.parent_id
         FROM student_profiles sp
         JOIN people p ON p.id = sp.person_id
         WHERE sp.class_id = ? AND p.active = 1
         ORDER BY sp.roll_no IS NULL, sp.roll_no, p.rowid",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let first_name: String = row.get(1)?;
            let middle_name: Option<String> = row.get(2)?;
            let last_name: String = row.get(3)?;
            let username: String = row.get(4)?;
            let roll_no: Option<i64> = row.get(5)?;
            let parent_id: Option<String> = row.get(6)?;
            Ok(json!({
                "id": id,
                "firstName": first_name,
                "middleName": middle_name,
                "lastName": last_name,
                "username": username,
                "rollNo": roll_no,
                "parentId": parent_id
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return engine_err(req, e),
    };

    let parent_id: Option<Option<String>> = match conn
        .query_row(
            "SELECT sp.parent_id
             FROM student_profiles sp
             JOIN people p ON p.id = sp.person_id
             WHERE sp.person_id = ? AND p.role = 'student' AND p.active = 1",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(parent_id) = parent_id else {
        return err(&req.id, "not_found", "student not found", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Deactivate, never delete: usernames stay reserved and the audit trail
    // survives. The linked parent account retires with the student.
    if let Err(e) = tx.execute(
        "UPDATE people SET active = 0,
                updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        [&student_id],
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.execute(
        "UPDATE student_profiles SET roll_no = NULL WHERE person_id = ?",
        [&student_id],
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Some(pid) = &parent_id {
        if let Err(e) = tx.execute(
            "UPDATE people SET active = 0,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ?",
            [pid],
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "studentId": student_id, "parentRetired": parent_id.is_some() }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
