use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

// Persistence calls must never block a request forever; a busy workspace
// file fails the whole operation instead.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("rosterd.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            year INTEGER NOT NULL,
            department_id TEXT NOT NULL,
            coordinator_id TEXT,
            max_capacity INTEGER NOT NULL,
            roster_version INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(department_id) REFERENCES departments(id),
            FOREIGN KEY(coordinator_id) REFERENCES people(id),
            UNIQUE(department_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_department ON classes(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS people(
            id TEXT PRIMARY KEY,
            role TEXT NOT NULL,
            first_name TEXT NOT NULL,
            middle_name TEXT,
            last_name TEXT NOT NULL,
            birth_date TEXT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            must_change_password INTEGER NOT NULL DEFAULT 1,
            active INTEGER NOT NULL DEFAULT 1,
            department_id TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_people_role ON people(role)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_profiles(
            person_id TEXT PRIMARY KEY,
            class_id TEXT,
            roll_no INTEGER,
            parent_id TEXT,
            father_name TEXT,
            mother_name TEXT,
            FOREIGN KEY(person_id) REFERENCES people(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(parent_id) REFERENCES people(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_profiles_class ON student_profiles(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_profiles_class_roll
         ON student_profiles(class_id, roll_no)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_profiles_parent ON student_profiles(parent_id)",
        [],
    )?;

    // Workspaces created before roster versioning existed get the column
    // backfilled at zero.
    ensure_classes_roster_version(conn)?;

    Ok(())
}

fn ensure_classes_roster_version(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "classes", "roster_version")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE classes ADD COLUMN roster_version INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
