// tests/api_tests.rs

mod common;

use chrono::TimeDelta;
use common::{ADMIN_EMAIL, ADMIN_PASSWORD, sample_test, spawn_app};
use serde_json::{Value, json};

#[tokio::test]
async fn unknown_route_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn signup_login_and_me_work() {
    let app = spawn_app().await;
    let unique = uuid::Uuid::new_v4().simple().to_string();
    let email = format!("user_{}@exam.test", &unique[..8]);

    let response = app
        .client
        .post(app.url("/api/auth/signup"))
        .json(&json!({ "email": email, "password": "password123", "full_name": "Ada" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["role"], "student");
    assert!(body["user"].get("password_hash").is_none());

    // Same email, different case
    let response = app
        .client
        .post(app.url("/api/auth/signup"))
        .json(&json!({ "email": email.to_uppercase(), "password": "password123", "full_name": "Ada" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 409);

    let token = common::login(&app.client, &app.address, &email, "password123").await;
    let response = app
        .client
        .get(app.url("/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let me: Value = response.json().await.unwrap();
    assert_eq!(me["email"], email.as_str());
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let app = spawn_app().await;

    for (email, password) in [(ADMIN_EMAIL, "wrong_password"), ("nobody@exam.test", ADMIN_PASSWORD)] {
        let response = app
            .client
            .post(app.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 401);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Invalid email or password");
    }
}

#[tokio::test]
async fn admin_routes_require_admin() {
    let app = spawn_app().await;
    let student = app.student().await;

    let response = app
        .client
        .get(app.url("/api/admin/tests"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Missing bearer token");

    let response = app
        .client
        .post(app.url("/api/admin/tests"))
        .bearer_auth(&student)
        .json(&sample_test(10))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Admin access required");
}

#[tokio::test]
async fn create_test_validates_questions() {
    let app = spawn_app().await;

    let mut no_questions = sample_test(10);
    no_questions["questions"] = json!([]);

    let mut two_keys = sample_test(10);
    two_keys["questions"][0]["correct_answers"] = json!(["1", "2"]);

    let mut no_key = sample_test(10);
    no_key["questions"][1]["correct_answers"] = json!([]);

    let cases = [
        (no_questions, "Please add at least one question"),
        (two_keys, "Question 1: Single-correct questions need exactly one correct answer"),
        (no_key, "Question 2: Please select at least one correct answer"),
    ];

    for (payload, message) in cases {
        let response = app
            .client
            .post(app.url("/api/admin/tests"))
            .bearer_auth(&app.admin_token)
            .json(&payload)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], message);
    }
}

#[tokio::test]
async fn created_test_sums_marks_and_starts_inactive() {
    let app = spawn_app().await;
    let student = app.student().await;

    let response = app
        .client
        .post(app.url("/api/admin/tests"))
        .bearer_auth(&app.admin_token)
        .json(&sample_test(10))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    let test: Value = response.json().await.unwrap();
    assert_eq!(test["total_marks"], 10);
    assert_eq!(test["is_active"], false);

    let listed: Value = app
        .client
        .get(app.url("/api/tests"))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.as_array().unwrap().iter().all(|t| t["id"] != test["id"]));

    let response = app.start(&student, &test["id"]).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn student_takes_test_and_gets_scored() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(10).await;
    let q1 = &test["questions"][0]["id"];
    let q2 = &test["questions"][1]["id"];

    let response = app.start(&student, &test["id"]).await;
    assert_eq!(response.status().as_u16(), 201);
    let paper: Value = response.json().await.unwrap();
    let attempt_id = paper["attempt"]["id"].clone();
    assert_eq!(paper["attempt"]["status"], "in_progress");
    assert_eq!(paper["remaining_seconds"], 600);
    assert!(paper["questions"][0].get("correct_answers").is_none());

    // Single-correct: the later choice replaces the earlier one
    app.select(&student, &attempt_id, q1, "2").await;
    let response = app.select(&student, &attempt_id, q1, "1").await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["selected_answers"], json!(["1"]));

    // Multi-correct: selecting twice toggles back off
    app.select(&student, &attempt_id, q2, "1").await;
    app.select(&student, &attempt_id, q2, "2").await;
    app.select(&student, &attempt_id, q2, "3").await;
    let response = app.select(&student, &attempt_id, q2, "2").await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["selected_answers"], json!(["1", "3"]));

    app.clock.advance(TimeDelta::seconds(90));

    let response = app.submit(&student, &attempt_id).await;
    assert_eq!(response.status().as_u16(), 200);
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["status"], "submitted");
    assert_eq!(result["score"], 7);
    assert_eq!(result["total_marks"], 10);
    assert_eq!(result["percentage"], "70.0%");
    assert_eq!(result["passed"], true);
    assert_eq!(result["time_taken_seconds"], 90);
    assert_eq!(result["already_finalized"], false);
    assert_eq!(result["answers"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn submitting_twice_keeps_first_result() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(10).await;

    let paper: Value = app.start(&student, &test["id"]).await.json().await.unwrap();
    let attempt_id = paper["attempt"]["id"].clone();
    app.select(&student, &attempt_id, &test["questions"][0]["id"], "2").await;

    let first: Value = app.submit(&student, &attempt_id).await.json().await.unwrap();
    app.clock.advance(TimeDelta::seconds(30));
    let response = app.submit(&student, &attempt_id).await;
    assert_eq!(response.status().as_u16(), 200);
    let second: Value = response.json().await.unwrap();

    assert_eq!(second["already_finalized"], true);
    assert_eq!(second["score"], first["score"]);
    assert_eq!(second["submitted_at"], first["submitted_at"]);
    assert_eq!(second["score"], 3);

    // Unanswered questions are recorded as wrong with zero marks
    let answers = second["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 2);
    assert!(answers.iter().any(|a| a["is_correct"] == false && a["marks_obtained"] == 0));
}

#[tokio::test]
async fn starting_again_resumes_open_attempt() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(10).await;

    let first: Value = app.start(&student, &test["id"]).await.json().await.unwrap();
    app.select(&student, &first["attempt"]["id"], &test["questions"][0]["id"], "2").await;

    app.clock.advance(TimeDelta::minutes(4));
    let response = app.start(&student, &test["id"]).await;
    assert_eq!(response.status().as_u16(), 200);
    let resumed: Value = response.json().await.unwrap();

    assert_eq!(resumed["attempt"]["id"], first["attempt"]["id"]);
    assert_eq!(resumed["remaining_seconds"], 360);
    let q1 = test["questions"][0]["id"].to_string();
    assert_eq!(resumed["selections"][q1.as_str()], json!(["2"]));

    let listed: Value = app
        .client
        .get(app.url("/api/tests"))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entry = listed
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == test["id"])
        .unwrap();
    assert_eq!(entry["open_attempt_id"], first["attempt"]["id"]);
}

#[tokio::test]
async fn completed_test_cannot_be_retaken() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(10).await;

    let paper: Value = app.start(&student, &test["id"]).await.json().await.unwrap();
    app.submit(&student, &paper["attempt"]["id"]).await;

    let response = app.start(&student, &test["id"]).await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn expired_attempt_is_auto_submitted() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(10).await;
    let q2 = &test["questions"][1]["id"];

    let paper: Value = app.start(&student, &test["id"]).await.json().await.unwrap();
    let attempt_id = paper["attempt"]["id"].clone();
    app.select(&student, &attempt_id, q2, "1").await;
    app.select(&student, &attempt_id, q2, "3").await;

    app.clock.advance(TimeDelta::minutes(11));

    let response = app
        .client
        .get(app.url(&format!("/api/attempts/{}", attempt_id)))
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let paper: Value = response.json().await.unwrap();
    assert_eq!(paper["attempt"]["status"], "auto_submitted");
    assert_eq!(paper["attempt"]["score"], 7);
    assert_eq!(paper["attempt"]["time_taken_seconds"], 600);
    assert_eq!(paper["remaining_seconds"], 0);
    assert_eq!(paper["graded"].as_array().unwrap().len(), 2);

    let response = app.select(&student, &attempt_id, q2, "2").await;
    assert_eq!(response.status().as_u16(), 409);

    let response = app.submit(&student, &attempt_id).await;
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["already_finalized"], true);
    assert_eq!(result["status"], "auto_submitted");
}

#[tokio::test]
async fn expiry_signal_respects_deadline() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(1).await;

    let paper: Value = app.start(&student, &test["id"]).await.json().await.unwrap();
    let attempt_id = paper["attempt"]["id"].clone();
    let expire_url = app.url(&format!("/api/attempts/{}/expire", attempt_id));

    app.clock.advance(TimeDelta::seconds(30));
    let response = app
        .client
        .post(&expire_url)
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 400);

    // Within the grace window before the deadline
    app.clock.advance(TimeDelta::seconds(27));
    let response = app
        .client
        .post(&expire_url)
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["status"], "auto_submitted");
    assert_eq!(result["already_finalized"], false);
}

#[tokio::test]
async fn late_manual_submit_within_grace_counts_as_submitted() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(1).await;

    let paper: Value = app.start(&student, &test["id"]).await.json().await.unwrap();
    app.clock.advance(TimeDelta::seconds(63));

    let result: Value = app
        .submit(&student, &paper["attempt"]["id"])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result["status"], "submitted");
    assert_eq!(result["time_taken_seconds"], 60);
    assert_eq!(result["percentage"], "0.0%");
    assert_eq!(result["passed"], false);
}

#[tokio::test]
async fn selection_rejects_unknown_option_and_foreign_attempt() {
    let app = spawn_app().await;
    let student = app.student().await;
    let intruder = app.student().await;
    let test = app.active_test(10).await;
    let q1 = &test["questions"][0]["id"];

    let paper: Value = app.start(&student, &test["id"]).await.json().await.unwrap();
    let attempt_id = paper["attempt"]["id"].clone();

    let response = app.select(&student, &attempt_id, q1, "9").await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.select(&intruder, &attempt_id, q1, "2").await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app.submit(&intruder, &attempt_id).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn history_and_results_list_finished_attempts() {
    let app = spawn_app().await;
    let student = app.student().await;
    let finished = app.active_test(10).await;
    let open = app.active_test(10).await;

    let paper: Value = app.start(&student, &finished["id"]).await.json().await.unwrap();
    app.select(&student, &paper["attempt"]["id"], &finished["questions"][0]["id"], "2").await;
    app.submit(&student, &paper["attempt"]["id"]).await;
    app.start(&student, &open["id"]).await;

    let history: Value = app
        .client
        .get(app.url("/api/attempts"))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["test_title"], "Rust Basics");
    assert_eq!(history[0]["percentage"], "30.0%");

    let response = app
        .client
        .get(app.url(&format!("/api/admin/tests/{}/results", finished["id"])))
        .bearer_auth(&app.admin_token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let results: Value = response.json().await.unwrap();
    assert_eq!(results[0]["student_name"], "Test Student");
    assert_eq!(results[0]["score"], 3);
}

#[tokio::test]
async fn questions_locked_once_attempted() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(10).await;
    let url = app.url(&format!("/api/admin/tests/{}/questions", test["id"]));
    let questions = json!({ "questions": sample_test(10)["questions"] });

    let response = app
        .client
        .put(&url)
        .bearer_auth(&app.admin_token)
        .json(&questions)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    app.start(&student, &test["id"]).await;

    let response = app
        .client
        .put(&url)
        .bearer_auth(&app.admin_token)
        .json(&questions)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn deleting_test_removes_attempts() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(10).await;

    let paper: Value = app.start(&student, &test["id"]).await.json().await.unwrap();
    app.submit(&student, &paper["attempt"]["id"]).await;

    let response = app
        .client
        .delete(app.url(&format!("/api/admin/tests/{}", test["id"])))
        .bearer_auth(&app.admin_token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 204);

    let history: Value = app
        .client
        .get(app.url("/api/attempts"))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(history.as_array().unwrap().is_empty());

    let response = app
        .client
        .get(app.url(&format!("/api/attempts/{}", paper["attempt"]["id"])))
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn duration_edit_does_not_move_running_deadline() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(30).await;

    let paper: Value = app.start(&student, &test["id"]).await.json().await.unwrap();
    let attempt_id = paper["attempt"]["id"].clone();
    app.clock.advance(TimeDelta::minutes(10));

    let response = app
        .client
        .put(app.url(&format!("/api/admin/tests/{}", test["id"])))
        .bearer_auth(&app.admin_token)
        .json(&json!({ "duration_minutes": 5 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let paper: Value = app
        .client
        .get(app.url(&format!("/api/attempts/{}", attempt_id)))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(paper["attempt"]["status"], "in_progress");
    assert_eq!(paper["attempt"]["duration_minutes"], 30);
    assert_eq!(paper["remaining_seconds"], 1200);

    let result: Value = app.submit(&student, &attempt_id).await.json().await.unwrap();
    assert_eq!(result["status"], "submitted");
    assert_eq!(result["time_taken_seconds"], 600);
}

#[tokio::test]
async fn simultaneous_starts_share_one_attempt() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(10).await;

    let (first, second) = tokio::join!(
        app.start(&student, &test["id"]),
        app.start(&student, &test["id"]),
    );
    let mut statuses = [first.status().as_u16(), second.status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, [200, 201]);

    let first: Value = first.json().await.unwrap();
    let second: Value = second.json().await.unwrap();
    assert_eq!(first["attempt"]["id"], second["attempt"]["id"]);
}

#[tokio::test]
async fn simultaneous_toggles_keep_every_option() {
    let app = spawn_app().await;
    let student = app.student().await;
    let test = app.active_test(10).await;
    let q2 = &test["questions"][1]["id"];

    let paper: Value = app.start(&student, &test["id"]).await.json().await.unwrap();
    let attempt_id = paper["attempt"]["id"].clone();

    let (a, b, c) = tokio::join!(
        app.select(&student, &attempt_id, q2, "1"),
        app.select(&student, &attempt_id, q2, "2"),
        app.select(&student, &attempt_id, q2, "3"),
    );
    for response in [a, b, c] {
        assert_eq!(response.status().as_u16(), 200);
    }

    let paper: Value = app
        .client
        .get(app.url(&format!("/api/attempts/{}", attempt_id)))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let key = q2.to_string();
    assert_eq!(paper["selections"][key.as_str()], json!(["1", "2", "3"]));
}
