use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use crate::engine::{self, EngineError, TARGET_BATCH_SIZE};

#[derive(Debug, Clone)]
pub struct ClassRow {
    pub id: String,
    pub name: String,
    pub max_capacity: i64,
    pub roster_version: i64,
}

#[derive(Debug, Clone)]
pub struct RosterStudent {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub roll_no: Option<i64>,
}

pub fn load_class(conn: &Connection, class_id: &str) -> Result<ClassRow, EngineError> {
    conn.query_row(
        "SELECT id, name, max_capacity, roster_version FROM classes WHERE id = ?",
        [class_id],
        |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                name: r.get(1)?,
                max_capacity: r.get(2)?,
                roster_version: r.get(3)?,
            })
        },
    )
    .optional()
    .map_err(|e| EngineError::new("db_query_failed", e.to_string()))?
    .ok_or_else(|| EngineError::new("not_found", "class not found"))
}

/// Active students of a class, in their prior roll order (unrolled students
/// last, by insertion order). This load order is what makes the subsequent
/// stable sort churn-free: students whose sort keys tie keep their old
/// relative position.
pub fn load_active_students(
    conn: &Connection,
    class_id: &str,
) -> Result<Vec<RosterStudent>, EngineError> {
    let mut stmt = conn
        .prepare(
            "SELECT p.id, p.first_name, p.last_name, sp.roll_no
             FROM student_profiles sp
             JOIN people p ON p.id = sp.person_id
             WHERE sp.class_id = ? AND p.active = 1
             ORDER BY sp.roll_no IS NULL, sp.roll_no, p.rowid",
        )
        .map_err(|e| EngineError::new("db_query_failed", e.to_string()))?;

    stmt.query_map([class_id], |r| {
        Ok(RosterStudent {
            id: r.get(0)?,
            first_name: r.get(1)?,
            last_name: r.get(2)?,
            roll_no: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| EngineError::new("db_query_failed", e.to_string()))
}

/// Case-insensitive last name, then first name. `sort_by` is stable, so full
/// ties preserve the prior roll order from the load.
pub fn sort_for_rolls(students: &mut [RosterStudent]) {
    students.sort_by(|a, b| {
        let ka = (a.last_name.to_lowercase(), a.first_name.to_lowercase());
        let kb = (b.last_name.to_lowercase(), b.first_name.to_lowercase());
        ka.cmp(&kb)
    });
}

/// Reorganize a class roster: wholesale roll reassignment 1..n in sorted
/// order, then the batch view. Commits everything or nothing; a concurrent
/// out-of-band write to the same class surfaces as `conflict` via the
/// roster_version gate, leaving prior roll numbers intact.
pub fn reorganize(conn: &Connection, class_id: &str) -> Result<serde_json::Value, EngineError> {
    let class = load_class(conn, class_id)?;
    let mut students = load_active_students(conn, class_id)?;
    sort_for_rolls(&mut students);

    let ordered_ids: Vec<String> = students.iter().map(|s| s.id.clone()).collect();
    // Plan first: an over-capacity roster must fail before any write.
    let batches = engine::plan_batches(
        &ordered_ids,
        TARGET_BATCH_SIZE,
        class.max_capacity as usize,
    )?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| EngineError::new("db_tx_failed", e.to_string()))?;

    // Clear first so the 1..n rewrite never trips over stale assignments.
    if let Err(e) = tx.execute(
        "UPDATE student_profiles SET roll_no = NULL WHERE class_id = ?",
        [class_id],
    ) {
        let _ = tx.rollback();
        return Err(EngineError::new("db_update_failed", e.to_string()));
    }
    for (i, student) in students.iter().enumerate() {
        if let Err(e) = tx.execute(
            "UPDATE student_profiles SET roll_no = ? WHERE person_id = ?",
            ((i + 1) as i64, &student.id),
        ) {
            let _ = tx.rollback();
            return Err(EngineError::new("db_update_failed", e.to_string()));
        }
    }

    let bumped = tx
        .execute(
            "UPDATE classes SET roster_version = roster_version + 1
             WHERE id = ? AND roster_version = ?",
            (class_id, class.roster_version),
        )
        .map_err(|e| EngineError::new("db_update_failed", e.to_string()))?;
    if bumped == 0 {
        let _ = tx.rollback();
        return Err(EngineError::new(
            "conflict",
            "class roster changed concurrently; retry",
        ));
    }

    tx.commit()
        .map_err(|e| EngineError::new("db_tx_failed", e.to_string()))?;

    let all_students: Vec<serde_json::Value> = students
        .iter()
        .enumerate()
        .map(|(i, s)| {
            json!({
                "id": s.id,
                "rollNo": (i + 1) as i64,
                "firstName": s.first_name,
                "lastName": s.last_name
            })
        })
        .collect();

    Ok(json!({
        "class": {
            "id": class.id,
            "name": class.name,
            "totalStudents": students.len(),
            "maxCapacity": class.max_capacity
        },
        "batches": batches,
        "allStudents": all_students
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use uuid::Uuid;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("init schema");
        conn
    }

    fn seed_class(conn: &Connection, max_capacity: i64) -> String {
        conn.execute(
            "INSERT INTO departments(id, code, name) VALUES('d1', 'CS', 'Computer Science')",
            [],
        )
        .expect("insert department");
        let class_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO classes(id, name, year, department_id, max_capacity)
             VALUES(?, 'CS-A', 2026, 'd1', ?)",
            (&class_id, max_capacity),
        )
        .expect("insert class");
        class_id
    }

    fn seed_student(conn: &Connection, class_id: &str, first: &str, last: &str) -> String {
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO people(id, role, first_name, last_name, birth_date,
                                username, password_hash, active)
             VALUES(?, 'student', ?, ?, '2006-01-15', ?, 'x', 1)",
            (&id, first, last, format!("{}{}{}", first, last, &id)),
        )
        .expect("insert person");
        conn.execute(
            "INSERT INTO student_profiles(person_id, class_id) VALUES(?, ?)",
            (&id, class_id),
        )
        .expect("insert profile");
        id
    }

    fn rolls(view: &serde_json::Value) -> Vec<(String, i64)> {
        view["allStudents"]
            .as_array()
            .expect("allStudents")
            .iter()
            .map(|s| {
                (
                    s["lastName"].as_str().expect("lastName").to_string(),
                    s["rollNo"].as_i64().expect("rollNo"),
                )
            })
            .collect()
    }

    #[test]
    fn reorganize_assigns_contiguous_rolls_in_name_order() {
        let conn = memory_db();
        let class_id = seed_class(&conn, 75);
        seed_student(&conn, &class_id, "Zara", "Ahmed");
        seed_student(&conn, &class_id, "Amit", "Verma");
        seed_student(&conn, &class_id, "bela", "banerjee");
        seed_student(&conn, &class_id, "Chris", "Verma");

        let view = reorganize(&conn, &class_id).expect("reorganize");
        let got = rolls(&view);
        assert_eq!(
            got,
            vec![
                ("Ahmed".to_string(), 1),
                ("banerjee".to_string(), 2),
                ("Verma".to_string(), 3), // Amit before Chris
                ("Verma".to_string(), 4),
            ]
        );
        assert_eq!(view["class"]["totalStudents"], 4);
        assert_eq!(view["batches"].as_array().expect("batches").len(), 1);
    }

    #[test]
    fn reorganize_is_idempotent_without_membership_change() {
        let conn = memory_db();
        let class_id = seed_class(&conn, 75);
        for (f, l) in [("Ravi", "Kumar"), ("Sita", "Rao"), ("Anil", "Kumar")] {
            seed_student(&conn, &class_id, f, l);
        }

        let first = reorganize(&conn, &class_id).expect("first run");
        let second = reorganize(&conn, &class_id).expect("second run");
        assert_eq!(first, second);
    }

    #[test]
    fn ties_keep_prior_roll_order() {
        let conn = memory_db();
        let class_id = seed_class(&conn, 75);
        let a = seed_student(&conn, &class_id, "Ravi", "Kumar");
        let b = seed_student(&conn, &class_id, "Ravi", "Kumar");

        let view = reorganize(&conn, &class_id).expect("reorganize");
        let order: Vec<&str> = view["allStudents"]
            .as_array()
            .expect("allStudents")
            .iter()
            .map(|s| s["id"].as_str().expect("id"))
            .collect();
        // Identical sort keys: insertion order holds, on every run.
        assert_eq!(order, vec![a.as_str(), b.as_str()]);
        let again = reorganize(&conn, &class_id).expect("again");
        assert_eq!(view, again);
    }

    #[test]
    fn over_capacity_fails_without_touching_rolls() {
        let conn = memory_db();
        let class_id = seed_class(&conn, 15);
        for i in 0..16 {
            seed_student(&conn, &class_id, &format!("S{}", i), "Lastname");
        }

        let e = reorganize(&conn, &class_id).unwrap_err();
        assert_eq!(e.code, "capacity_exceeded");

        let assigned: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM student_profiles WHERE class_id = ? AND roll_no IS NOT NULL",
                [&class_id],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(assigned, 0);
        let version: i64 = conn
            .query_row(
                "SELECT roster_version FROM classes WHERE id = ?",
                [&class_id],
                |r| r.get(0),
            )
            .expect("version");
        assert_eq!(version, 0);
    }

    #[test]
    fn unknown_class_is_not_found() {
        let conn = memory_db();
        let e = reorganize(&conn, "nope").unwrap_err();
        assert_eq!(e.code, "not_found");
    }

    #[test]
    fn inactive_students_are_skipped_and_gaps_close() {
        let conn = memory_db();
        let class_id = seed_class(&conn, 75);
        let a = seed_student(&conn, &class_id, "Asha", "Iyer");
        let b = seed_student(&conn, &class_id, "Kiran", "Mehta");
        let c = seed_student(&conn, &class_id, "Tara", "Nair");
        reorganize(&conn, &class_id).expect("first run");

        conn.execute("UPDATE people SET active = 0 WHERE id = ?", [&b])
            .expect("deactivate");

        let view = reorganize(&conn, &class_id).expect("second run");
        let order: Vec<(&str, i64)> = view["allStudents"]
            .as_array()
            .expect("allStudents")
            .iter()
            .map(|s| {
                (
                    s["id"].as_str().expect("id"),
                    s["rollNo"].as_i64().expect("rollNo"),
                )
            })
            .collect();
        assert_eq!(order, vec![(a.as_str(), 1), (c.as_str(), 2)]);
    }
}
