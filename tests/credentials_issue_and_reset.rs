
use serde_json::json;
use test_support::{bootstrap_class, request_ok, spawn_sidecar, temp_dir};

#[test]
fn student_and_parent_credentials_derive_from_biography() {
    let workspace = temp_dir("rosterd-credentials");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let class_id = bootstrap_class(&mut stdin, &mut reader, &workspace, 75);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "students.create",
        json!({
            "firstName": "Ravi",
            "lastName": "Kumar",
            "birthDate": "2006-11-30",
            "classId": class_id,
            "fatherName": "Suresh",
            "motherName": "Lakshmi"
        }),
    );

    let credentials = created["credentials"].as_array().expect("credentials");
    assert_eq!(credentials.len(), 2);

    let student = &credentials[0];
    assert_eq!(student["role"], "student");
    assert_eq!(student["username"], "ravikumar2006");
    assert_eq!(student["password"], "ravi301106");

    // Parent username carries the student's birth year; the password is the
    // student's, shared.
    let parent = &credentials[1];
    assert_eq!(parent["role"], "parent");
    assert_eq!(parent["username"], "sureshkumarlakshmi2006");
    assert_eq!(parent["password"], student["password"]);

    assert_eq!(created["person"]["username"], "ravikumar2006");
    assert_eq!(created["person"]["mustChangePassword"], true);
}

#[test]
fn username_collisions_take_numeric_suffixes_from_two() {
    let workspace = temp_dir("rosterd-collisions");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let class_id = bootstrap_class(&mut stdin, &mut reader, &workspace, 75);

    let mut usernames = Vec::new();
    for i in 0..3 {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({
                "firstName": "Ravi",
                "lastName": "Kumar",
                "birthDate": "2006-11-30",
                "classId": class_id.clone()
            }),
        );
        usernames.push(
            created["credentials"][0]["username"]
                .as_str()
                .expect("username")
                .to_string(),
        );
    }
    assert_eq!(
        usernames,
        vec!["ravikumar2006", "ravikumar20062", "ravikumar20063"]
    );
}

#[test]
fn deterministic_reset_reissues_the_original_password() {
    let workspace = temp_dir("rosterd-reset");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let class_id = bootstrap_class(&mut stdin, &mut reader, &workspace, 75);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "students.create",
        json!({
            "firstName": "Meera",
            "lastName": "Pillai",
            "birthDate": "2007-02-05",
            "classId": class_id,
            "fatherName": "Mohan",
            "motherName": "Devi"
        }),
    );
    let student_id = created["person"]["id"].as_str().expect("id").to_string();
    let parent_id = created["person"]["parentId"]
        .as_str()
        .expect("parentId")
        .to_string();
    let original = created["credentials"][0]["password"]
        .as_str()
        .expect("password")
        .to_string();
    assert_eq!(original, "meera050207");

    let reset = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "people.resetPassword",
        json!({ "personId": student_id.clone() }),
    );
    assert_eq!(reset["credentials"]["password"], original.as_str());
    assert_eq!(reset["credentials"]["username"], "meerapillai2007");

    // Parent reset follows the shared-credential policy.
    let parent_reset = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "people.resetPassword",
        json!({ "personId": parent_id }),
    );
    assert_eq!(parent_reset["credentials"]["password"], original.as_str());

    // The explicit randomized variant must not echo the derived password.
    let randomized = request_ok(
        &mut stdin,
        &mut reader,
        "r3",
        "people.resetPassword",
        json!({ "personId": student_id, "randomize": true }),
    );
    let random_pw = randomized["credentials"]["password"]
        .as_str()
        .expect("password");
    assert_ne!(random_pw, original);
    assert_eq!(random_pw.len(), 10);
}
