
use serde_json::json;
use test_support::{bootstrap_class, request_ok, spawn_sidecar, temp_dir};

#[test]
fn reorganize_assigns_contiguous_rolls_and_batches() {
    let workspace = temp_dir("rosterd-reorganize");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let class_id = bootstrap_class(&mut stdin, &mut reader, &workspace, 75);

    // 26 students with descending last names, so the sorted roster inverts
    // the insertion order.
    for i in 0..26u8 {
        let last = format!("{}son", (b'z' - i) as char);
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({
                "firstName": format!("Kid{}", i),
                "lastName": last,
                "birthDate": "2006-04-01",
                "classId": class_id.clone()
            }),
        );
    }

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "roster.reorganize",
        json!({ "classId": class_id.clone() }),
    );

    assert_eq!(view["class"]["totalStudents"], 26);
    assert_eq!(view["class"]["maxCapacity"], 75);

    let students = view["allStudents"].as_array().expect("allStudents");
    assert_eq!(students.len(), 26);
    for (i, s) in students.iter().enumerate() {
        assert_eq!(s["rollNo"].as_i64(), Some((i + 1) as i64), "roll at {}", i);
    }
    // Alphabetical by last name: "ason" first, "zson" last.
    assert_eq!(students[0]["lastName"], "ason");
    assert_eq!(students[25]["lastName"], "zson");

    // 26 students: two batches, 13 + 13, roll order preserved across the cut.
    let batches = view["batches"].as_array().expect("batches");
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0]["name"], "Batch 1");
    assert_eq!(batches[0]["studentCount"], 13);
    assert_eq!(batches[1]["studentCount"], 13);
    let first_ids = batches[0]["studentIds"].as_array().expect("ids");
    assert_eq!(first_ids[0], students[0]["id"]);
    assert_eq!(
        batches[1]["studentIds"].as_array().expect("ids")[12],
        students[25]["id"]
    );
}

#[test]
fn reorganize_twice_returns_identical_views() {
    let workspace = temp_dir("rosterd-reorganize-idempotent");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let class_id = bootstrap_class(&mut stdin, &mut reader, &workspace, 75);

    for (i, (first, last)) in [("Ravi", "Kumar"), ("Sita", "Rao"), ("Anil", "Kumar")]
        .iter()
        .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({
                "firstName": first,
                "lastName": last,
                "birthDate": "2006-04-01",
                "classId": class_id.clone()
            }),
        );
    }

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "roster.reorganize",
        json!({ "classId": class_id.clone() }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "roster.reorganize",
        json!({ "classId": class_id }),
    );
    assert_eq!(first, second);
}

#[test]
fn reorganize_closes_gaps_after_membership_change() {
    let workspace = temp_dir("rosterd-reorganize-gaps");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let class_id = bootstrap_class(&mut stdin, &mut reader, &workspace, 75);

    let mut ids = Vec::new();
    for (i, last) in ["Ahmed", "Banerjee", "Chawla"].iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({
                "firstName": "Kid",
                "lastName": last,
                "birthDate": "2006-04-01",
                "classId": class_id.clone()
            }),
        );
        ids.push(created["person"]["id"].as_str().expect("id").to_string());
    }
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "roster.reorganize",
        json!({ "classId": class_id.clone() }),
    );

    // Drop the middle of the roster; the rerun renumbers everyone below.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "students.delete",
        json!({ "studentId": ids[1].clone() }),
    );
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "roster.reorganize",
        json!({ "classId": class_id }),
    );
    let students = view["allStudents"].as_array().expect("allStudents");
    assert_eq!(students.len(), 2);
    assert_eq!(students[0]["lastName"], "Ahmed");
    assert_eq!(students[0]["rollNo"], 1);
    assert_eq!(students[1]["lastName"], "Chawla");
    assert_eq!(students[1]["rollNo"], 2);
}
