// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use exam_portal::{
    config::Config,
    handlers::auth::seed_admin_user,
    routes,
    state::AppState,
    store::MemoryStore,
    utils::clock::Clock,
};
use serde_json::{Value, json};

pub const ADMIN_EMAIL: &str = "admin@exam.test";
pub const ADMIN_PASSWORD: &str = "admin_password";

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub clock: Arc<ManualClock>,
    pub admin_token: String,
}

/// Spawns the app on a random port, backed by the in-memory store and a manual clock.
pub async fn spawn_app() -> TestApp {
    let config = Config {
        database_url: None,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_email: Some(ADMIN_EMAIL.to_string()),
        admin_password: Some(ADMIN_PASSWORD.to_string()),
        port: 0,
        submit_grace_seconds: 5,
    };

    let store = Arc::new(MemoryStore::new());
    seed_admin_user(store.as_ref(), &config)
        .await
        .expect("Failed to seed admin");

    let clock = Arc::new(ManualClock::new());
    let state = AppState {
        store,
        config,
        clock: clock.clone(),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let admin_token = login(&client, &address, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    TestApp {
        address,
        client,
        clock,
        admin_token,
    }
}

pub async fn login(client: &reqwest::Client, address: &str, email: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Signs up a fresh student and returns their token.
    pub async fn student(&self) -> String {
        let unique = uuid::Uuid::new_v4().simple().to_string();
        let response = self
            .client
            .post(self.url("/api/auth/signup"))
            .json(&json!({
                "email": format!("student_{}@exam.test", &unique[..8]),
                "password": "password123",
                "full_name": "Test Student",
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);

        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    /// Creates and activates a test with one 3-mark single-correct question
    /// (answer "2") and one 7-mark multi-correct question (answers "1" and "3").
    /// Returns the created test body.
    pub async fn active_test(&self, duration_minutes: i32) -> Value {
        let response = self
            .client
            .post(self.url("/api/admin/tests"))
            .bearer_auth(&self.admin_token)
            .json(&sample_test(duration_minutes))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);
        let test: Value = response.json().await.unwrap();

        let response = self
            .client
            .post(self.url(&format!("/api/admin/tests/{}/toggle", test["id"])))
            .bearer_auth(&self.admin_token)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 200);

        test
    }

    pub async fn start(&self, token: &str, test_id: &Value) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/tests/{}/attempts", test_id)))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn select(
        &self,
        token: &str,
        attempt_id: &Value,
        question_id: &Value,
        option_id: &str,
    ) -> reqwest::Response {
        self.client
            .put(self.url(&format!("/api/attempts/{}/answers", attempt_id)))
            .bearer_auth(token)
            .json(&json!({ "question_id": question_id, "option_id": option_id }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn submit(&self, token: &str, attempt_id: &Value) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/attempts/{}/submit", attempt_id)))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }
}

pub fn sample_test(duration_minutes: i32) -> Value {
    json!({
        "title": "Rust Basics",
        "description": "Ownership and traits",
        "duration_minutes": duration_minutes,
        "questions": [
            {
                "text": "Which keyword declares an immutable binding?",
                "question_type": "single_correct",
                "options": [
                    { "id": "1", "text": "mut" },
                    { "id": "2", "text": "let" },
                    { "id": "3", "text": "var" },
                    { "id": "4", "text": "const fn" }
                ],
                "correct_answers": ["2"],
                "marks": 3
            },
            {
                "text": "Which of these are smart pointers?",
                "question_type": "multi_correct",
                "options": [
                    { "id": "1", "text": "Box" },
                    { "id": "2", "text": "i32" },
                    { "id": "3", "text": "Rc" },
                    { "id": "4", "text": "bool" }
                ],
                "correct_answers": ["1", "3"],
                "marks": 7
            }
        ]
    })
}
