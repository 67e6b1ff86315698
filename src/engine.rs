use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

pub const TARGET_BATCH_SIZE: usize = 25;
pub const MIN_CLASS_CAPACITY: i64 = 15;
pub const MAX_CLASS_CAPACITY: i64 = 75;

// Suffixed retries are a collision escape hatch, not a namespace; a storm
// this deep means the identity store is broken and we stop hard.
const MAX_USERNAME_ATTEMPTS: u64 = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct EngineError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl EngineError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
    Hod,
    ClassCoordinator,
    Parent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Hod => "hod",
            Role::ClassCoordinator => "classcoordinator",
            Role::Parent => "parent",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Result<Role, EngineError> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "hod" => Ok(Role::Hod),
            "classcoordinator" => Ok(Role::ClassCoordinator),
            "parent" => Ok(Role::Parent),
            "admin" => Ok(Role::Admin),
            other => Err(EngineError::new(
                "bad_params",
                format!("unknown role: {}", other),
            )),
        }
    }

    /// Roles provisioned through `staff.create` / `staff.bulkUpload`.
    pub fn is_staff(&self) -> bool {
        matches!(
            self,
            Role::Teacher | Role::Hod | Role::ClassCoordinator | Role::Admin
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name_token: String,
    pub dob_token: String,
}

/// Canonical tokens for username/password derivation. Stable for auditing:
/// the same biographical fields always produce the same tokens.
pub fn normalize(first: &str, last: &str, birth_date: NaiveDate) -> Identity {
    Identity {
        name_token: name_token(&[first, last]),
        dob_token: dob_token(birth_date),
    }
}

pub fn parse_birth_date(raw: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        EngineError::new("bad_params", "birthDate must be a valid YYYY-MM-DD date")
            .with_details(serde_json::json!({ "birthDate": raw }))
    })
}

fn name_token(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts {
        for ch in part.chars() {
            if ch.is_alphanumeric() {
                out.extend(ch.to_lowercase());
            }
        }
    }
    out
}

fn dob_token(d: NaiveDate) -> String {
    d.format("%d%m%y").to_string()
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub role: String,
    pub username: String,
    pub password: String,
}

/// `firstname + ddmmyy`. A linked parent shares the student's password
/// verbatim, so parent callers pass the student's fields here.
pub fn derive_password(first: &str, birth_date: NaiveDate) -> String {
    format!("{}{}", name_token(&[first]), dob_token(birth_date))
}

/// Username seed for everyone except parents: `firstname + lastname + yyyy`.
pub fn username_seed(first: &str, last: &str, birth_date: NaiveDate) -> String {
    let identity = normalize(first, last, birth_date);
    format!("{}{}", identity.name_token, birth_date.year())
}

/// Parent usernames key on the family: father's name, the shared last name,
/// mother's name, and the *student's* birth year (not the parent's own DOB,
/// which is never collected).
pub fn parent_username_seed(
    father: &str,
    last: &str,
    mother: &str,
    student_birth_date: NaiveDate,
) -> String {
    format!(
        "{}{}",
        name_token(&[father, last, mother]),
        student_birth_date.year()
    )
}

/// Resolve the seed to a free username. The first candidate is the bare seed;
/// collisions append 2, 3, ... `exists` is consulted fresh for every
/// candidate so a concurrently issued name is seen, never re-used from a
/// cache.
pub fn issue_username<F>(seed: &str, mut exists: F) -> Result<String, EngineError>
where
    F: FnMut(&str) -> Result<bool, EngineError>,
{
    for attempt in 1..=MAX_USERNAME_ATTEMPTS {
        let candidate = if attempt == 1 {
            seed.to_string()
        } else {
            format!("{}{}", seed, attempt)
        };
        if !exists(&candidate)? {
            return Ok(candidate);
        }
    }
    Err(
        EngineError::new("credential_exhausted", "could not find a free username")
            .with_details(serde_json::json!({
                "seed": seed,
                "attempts": MAX_USERNAME_ATTEMPTS
            })),
    )
}

/// SHA-256 hex of the plaintext. The plaintext itself is returned once in the
/// issuance response and never stored.
pub fn password_hash(plain: &str) -> String {
    let digest = Sha256::digest(plain.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub name: String,
    pub student_ids: Vec<String>,
    pub student_count: usize,
}

/// Partition a roll-ordered roster into contiguous batches of at most
/// `target` students. Earlier batches absorb the remainder, so sizes are
/// monotonically non-increasing. More students than `max_capacity` is a
/// caller precondition violation, never a silent truncation.
pub fn plan_batches(
    ordered_ids: &[String],
    target: usize,
    max_capacity: usize,
) -> Result<Vec<Batch>, EngineError> {
    let n = ordered_ids.len();
    if n > max_capacity {
        return Err(EngineError::new(
            "capacity_exceeded",
            format!("{} students exceed class capacity {}", n, max_capacity),
        )
        .with_details(serde_json::json!({
            "studentCount": n,
            "maxCapacity": max_capacity
        })));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let batch_count = (n + target - 1) / target;
    let base = n / batch_count;
    let remainder = n % batch_count;

    let mut batches = Vec::with_capacity(batch_count);
    let mut offset = 0usize;
    for i in 0..batch_count {
        let size = if i < remainder { base + 1 } else { base };
        let ids = ordered_ids[offset..offset + size].to_vec();
        batches.push(Batch {
            name: format!("Batch {}", i + 1),
            student_count: ids.len(),
            student_ids: ids,
        });
        offset += size;
    }
    Ok(batches)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRowError {
    pub row: serde_json::Value,
    pub code: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub success_count: usize,
    pub failed_count: usize,
    pub credentials: Vec<CredentialRecord>,
    pub errors: Vec<BulkRowError>,
}

/// Row-wise import with partial-failure tolerance. Rows are handled
/// independently in input order; a failed row is recorded with its original
/// payload and the reason, and the rest of the batch proceeds. Credentials
/// keep the input order of the rows that succeeded.
pub fn import_rows<V, P>(rows: &[serde_json::Value], mut validate: V, mut process: P) -> BulkOutcome
where
    V: FnMut(&serde_json::Value) -> Result<(), EngineError>,
    P: FnMut(&serde_json::Value) -> Result<Vec<CredentialRecord>, EngineError>,
{
    let mut outcome = BulkOutcome {
        success_count: 0,
        failed_count: 0,
        credentials: Vec::new(),
        errors: Vec::new(),
    };

    for row in rows {
        let result = validate(row).and_then(|_| process(row));
        match result {
            Ok(issued) => {
                outcome.success_count += 1;
                outcome.credentials.extend(issued);
            }
            Err(e) => {
                outcome.failed_count += 1;
                outcome.errors.push(BulkRowError {
                    row: row.clone(),
                    code: e.code,
                    error: e.message,
                });
            }
        }
    }

    outcome
}
