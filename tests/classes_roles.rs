mod test_support;

use serde_json::json;
use test_support::{find_class, open_workspace_db, str_field, temp_dir, Sidecar};

const PRIMARY: &str = "user_primary";
const ASSISTANT: &str = "user_assistant";
const STRANGER: &str = "user_stranger";

fn class_with_assistant(sc: &mut Sidecar) -> (String, String, String) {
    let class = sc.request_ok(Some(PRIMARY), "classes.create", json!({ "className": "6A" }));
    let class_id = str_field(&class, "classId").to_string();
    let code = str_field(&class, "classCode").to_string();
    assert_eq!(code.len(), 6);

    let joined = sc.request_ok(
        Some(ASSISTANT),
        "classes.join",
        json!({ "classCode": code.to_lowercase() }),
    );
    assert_eq!(joined["role"], json!("assistant"));
    let again = sc.request_ok(Some(ASSISTANT), "classes.join", json!({ "classCode": code }));
    assert_eq!(again["classId"], json!(class_id));

    let added = sc.request_ok(
        Some(PRIMARY),
        "students.add",
        json!({ "classId": class_id, "students": [{ "firstName": "Cleo" }] }),
    );
    let student_id = added["studentIds"][0].as_str().expect("student").to_string();
    (class_id, code, student_id)
}

#[test]
fn assistants_can_use_but_not_configure_a_class() {
    let workspace = temp_dir("classpoints-roles-gate");
    let mut sc = Sidecar::spawn();
    sc.select_workspace(&workspace);
    let (class_id, _, student_id) = class_with_assistant(&mut sc);

    let behavior = sc.request_ok(
        Some(PRIMARY),
        "behaviors.create",
        json!({ "classId": class_id, "name": "Focus", "pointValue": 2 }),
    );
    let behavior_id = str_field(&behavior, "behaviorId").to_string();

    sc.request_ok(
        Some(ASSISTANT),
        "points.applyBehavior",
        json!({ "classId": class_id, "behaviorId": behavior_id, "studentIds": [student_id] }),
    );
    sc.request_ok(
        Some(ASSISTANT),
        "attendance.save",
        json!({ "classId": class_id, "date": "2024-05-02", "absentStudentIds": [student_id] }),
    );

    for (method, params) in [
        ("behaviors.create", json!({ "classId": class_id, "name": "X", "pointValue": 1 })),
        ("behaviors.delete", json!({ "behaviorId": behavior_id })),
        ("classes.update", json!({ "classId": class_id, "className": "Renamed" })),
        ("groups.create", json!({ "classId": class_id, "groupName": "G" })),
        ("students.add", json!({ "classId": class_id, "students": [{ "firstName": "Z" }] })),
        ("topics.create", json!({ "classId": class_id, "name": "T" })),
    ] {
        assert_eq!(
            sc.request_err(Some(ASSISTANT), method, params),
            "forbidden",
            "{} should be refused for assistants",
            method
        );
    }

    assert_eq!(
        sc.request_err(
            Some(STRANGER),
            "points.applyBehavior",
            json!({ "classId": class_id, "behaviorId": behavior_id, "studentIds": [student_id] }),
        ),
        "forbidden"
    );
    assert!(sc.load_classes(STRANGER).is_empty());

    let seen_by_assistant = sc.load_classes(ASSISTANT);
    let class = find_class(&seen_by_assistant, &class_id);
    assert_eq!(class["role"], json!("assistant"));
    assert_eq!(class["students"][0]["points"], json!(2));
}

#[test]
fn assistant_remove_only_leaves_the_class() {
    let workspace = temp_dir("classpoints-roles-leave");
    let mut sc = Sidecar::spawn();
    sc.select_workspace(&workspace);
    let (class_id, _, _) = class_with_assistant(&mut sc);

    let left = sc.request_ok(Some(ASSISTANT), "classes.remove", json!({ "classId": class_id }));
    assert_eq!(left["deleted"], json!(false));
    assert!(sc.load_classes(ASSISTANT).is_empty());
    assert_eq!(sc.load_classes(PRIMARY).len(), 1);
}

#[test]
fn primary_remove_cascades_through_every_class_table() {
    let workspace = temp_dir("classpoints-roles-cascade");
    let mut sc = Sidecar::spawn();
    sc.select_workspace(&workspace);
    let (class_id, code, student_id) = class_with_assistant(&mut sc);

    let behavior = sc.request_ok(
        Some(PRIMARY),
        "behaviors.create",
        json!({ "classId": class_id, "name": "Kind", "pointValue": 3,
                "achievements": [{ "threshold": 9, "name": "Kindness" }] }),
    );
    let item = sc.request_ok(
        Some(PRIMARY),
        "rewards.create",
        json!({ "classId": class_id, "name": "Pencil", "price": 2, "type": "class" }),
    );
    let group = sc.request_ok(
        Some(PRIMARY),
        "groups.create",
        json!({ "classId": class_id, "groupName": "Blue", "studentIds": [student_id] }),
    );
    sc.request_ok(
        Some(PRIMARY),
        "subgroups.create",
        json!({ "groupId": str_field(&group, "groupId"), "subGroupName": "Blue 1", "studentIds": [student_id] }),
    );
    sc.request_ok(
        Some(PRIMARY),
        "points.applyBehavior",
        json!({ "classId": class_id, "behaviorId": str_field(&behavior, "behaviorId"), "studentIds": [student_id] }),
    );
    sc.request_ok(
        Some(PRIMARY),
        "points.redeem",
        json!({ "classId": class_id, "itemId": str_field(&item, "itemId"), "studentIds": [student_id] }),
    );
    sc.request_ok(
        Some(PRIMARY),
        "attendance.save",
        json!({ "classId": class_id, "date": "2024-05-03", "absentStudentIds": [student_id] }),
    );
    let a = sc.request_ok(Some(PRIMARY), "assignments.create", json!({ "classId": class_id, "name": "Essay" }));
    sc.request_ok(
        Some(PRIMARY),
        "assignments.setComplete",
        json!({ "assignmentId": str_field(&a, "assignmentId"), "studentId": student_id, "complete": true }),
    );
    let e = sc.request_ok(Some(PRIMARY), "expectations.create", json!({ "classId": class_id, "name": "Tidy" }));
    sc.request_ok(
        Some(PRIMARY),
        "expectations.setStudentValue",
        json!({ "expectationId": str_field(&e, "expectationId"), "studentId": student_id, "number": 2 }),
    );
    sc.request_ok(Some(PRIMARY), "topics.create", json!({ "classId": class_id, "name": "Writing" }));

    let removed = sc.request_ok(Some(PRIMARY), "classes.remove", json!({ "classId": class_id }));
    assert_eq!(removed["deleted"], json!(true));
    assert_eq!(removed["studentsRemoved"], json!(1));

    let conn = open_workspace_db(&workspace);
    for table in [
        "classes",
        "teacher_classes",
        "students",
        "student_classes",
        "class_groups",
        "student_groups",
        "sub_groups",
        "student_sub_groups",
        "behaviors",
        "reward_items",
        "achievements",
        "points",
        "absent_dates",
        "topics",
        "assignments",
        "student_assignments",
        "expectations",
        "student_expectations",
    ] {
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 0, "{} should be empty after class removal", table);
    }

    assert!(sc.load_classes(PRIMARY).is_empty());
    assert!(sc.load_classes(ASSISTANT).is_empty());
    assert_eq!(
        sc.request_err(Some(ASSISTANT), "classes.join", json!({ "classCode": code })),
        "not_found"
    );
}

#[test]
fn deleting_a_behavior_keeps_its_ledger_rows() {
    let workspace = temp_dir("classpoints-roles-behavior-delete");
    let mut sc = Sidecar::spawn();
    sc.select_workspace(&workspace);
    let (class_id, _, student_id) = class_with_assistant(&mut sc);

    let behavior = sc.request_ok(
        Some(PRIMARY),
        "behaviors.create",
        json!({ "classId": class_id, "name": "Tidy desk", "pointValue": 4 }),
    );
    let behavior_id = str_field(&behavior, "behaviorId").to_string();
    sc.request_ok(
        Some(PRIMARY),
        "points.applyBehavior",
        json!({ "classId": class_id, "behaviorId": behavior_id, "studentIds": [student_id], "quantity": 2 }),
    );
    sc.request_ok(Some(PRIMARY), "behaviors.delete", json!({ "behaviorId": behavior_id }));

    let classes = sc.load_classes(PRIMARY);
    let class = find_class(&classes, &class_id);
    assert_eq!(class["behaviors"], json!([]));
    let student = &class["students"][0];
    assert_eq!(student["points"], json!(8));
    assert_eq!(student["point_history"][0]["behavior_id"], json!(null));
    assert_eq!(student["point_history"][0]["type"], json!("positive"));
}

#[test]
fn updating_a_class_and_student_is_visible_in_the_roster() {
    let workspace = temp_dir("classpoints-roles-update");
    let mut sc = Sidecar::spawn();
    sc.select_workspace(&workspace);
    let (class_id, _, student_id) = class_with_assistant(&mut sc);

    sc.request_ok(
        Some(PRIMARY),
        "classes.update",
        json!({ "classId": class_id, "className": "6A Maths", "classYear": "2025", "complete": { "s1": true } }),
    );
    sc.request_ok(
        Some(PRIMARY),
        "students.update",
        json!({ "studentId": student_id, "lastName": "Park", "number": 12 }),
    );
    assert_eq!(
        sc.request_err(
            Some(ASSISTANT),
            "students.update",
            json!({ "studentId": student_id, "lastName": "Nope" }),
        ),
        "forbidden"
    );

    let classes = sc.load_classes(PRIMARY);
    let class = find_class(&classes, &class_id);
    assert_eq!(class["class_name"], json!("6A Maths"));
    assert_eq!(class["class_year"], json!("2025"));
    assert_eq!(class["complete"], json!({ "s1": true, "s2": false }));
    let student = &class["students"][0];
    assert_eq!(student["student_name_en"], json!("Cleo Park"));
    assert_eq!(student["student_name_last_en"], json!("Park"));
    assert_eq!(student["student_number"], json!(12));

    sc.request_ok(
        Some(PRIMARY),
        "students.remove",
        json!({ "classId": class_id, "studentId": student_id }),
    );
    let classes = sc.load_classes(PRIMARY);
    assert_eq!(find_class(&classes, &class_id)["students"], json!([]));
}
