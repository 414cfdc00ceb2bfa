mod test_support;

use serde_json::json;
use test_support::{open_workspace_db, str_field, temp_dir, Sidecar};

#[test]
fn missing_identity_is_unauthenticated_before_any_read() {
    let mut sc = Sidecar::spawn();
    // No workspace selected: identity is still checked first.
    assert_eq!(sc.request_err(None, "roster.load", json!({})), "unauthenticated");
    assert_eq!(sc.request_err(Some("  "), "roster.load", json!({})), "unauthenticated");
    assert_eq!(sc.request_err(Some("user_a"), "roster.load", json!({})), "no_workspace");
    assert_eq!(
        sc.request_err(None, "classes.create", json!({ "className": "x" })),
        "unauthenticated"
    );
}

#[test]
fn teacher_without_classes_gets_an_empty_list() {
    let workspace = temp_dir("classpoints-errors-empty");
    let mut sc = Sidecar::spawn();
    sc.select_workspace(&workspace);
    assert!(sc.load_classes("user_nobody").is_empty());
}

#[test]
fn corrupt_ledger_row_fails_the_whole_load_with_a_generic_message() {
    let workspace = temp_dir("classpoints-errors-corrupt");
    let mut sc = Sidecar::spawn_with_env(&[("CLASSPOINTS_ROSTER_TTL_SECS", "0")]);
    sc.select_workspace(&workspace);
    let class = sc.request_ok(Some("user_a"), "classes.create", json!({ "className": "5C" }));
    let class_id = str_field(&class, "classId").to_string();
    assert_eq!(sc.load_classes("user_a").len(), 1);

    let conn = open_workspace_db(&workspace);
    conn.execute(
        "INSERT INTO points(id, user_id, class_id, student_id, type, number_of_points, created_date, updated_date)
         VALUES('point_bad', 'user_a', ?, 'student_x', 'bonus', 1, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
        [&class_id],
    )
    .expect("seed corrupt row");

    let resp = sc.request(Some("user_a"), "roster.load", json!({}));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("internal"));
    assert_eq!(
        resp["error"]["message"],
        json!("Unable to fetch classes due to an internal error.")
    );
    assert!(resp.get("result").is_none());
    assert!(!resp["error"]["message"].as_str().unwrap_or("").contains("bonus"));
}

#[test]
fn malformed_lines_and_unknown_methods_get_error_envelopes() {
    let mut sc = Sidecar::spawn();
    let bad = sc.send_raw("{not json");
    assert_eq!(bad["ok"], json!(false));
    assert_eq!(bad["error"]["code"], json!("bad_json"));

    assert_eq!(
        sc.request_err(Some("user_a"), "roster.explode", json!({})),
        "not_implemented"
    );
}
