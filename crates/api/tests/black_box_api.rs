use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use reqwest::StatusCode;
use serde_json::json;

use bootnet_api::app::services::{AppServices, SharedStore, build_services_with};
use bootnet_auth::{ActivationPolicy, ActivationToken, JwtClaims};
use bootnet_infra::config::AppConfig;
use bootnet_infra::notifications::{ActivationEmail, NotificationError, NotificationSender};
use bootnet_infra::store::{CredentialStore, InMemoryCredentialStore};

const JWT_SECRET: &str = "test-secret";

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<ActivationEmail>>,
}

#[async_trait::async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, email: &ActivationEmail) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

impl RecordingSender {
    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Notifications are spawned; poll until the `n`th one lands.
    async fn nth_code_eventually(&self, n: usize) -> String {
        for _ in 0..100 {
            if let Some(email) = self.sent.lock().unwrap().get(n) {
                return email.code.clone();
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("notification #{n} was not sent within timeout");
    }
}

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    mail: Arc<RecordingSender>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            ..AppConfig::default()
        };
        let store: SharedStore = Arc::new(InMemoryCredentialStore::new());
        let mail = Arc::new(RecordingSender::default());

        let services = Arc::new(
            build_services_with(&config, store, mail.clone())
                .await
                .expect("failed to wire services"),
        );

        // Same router as prod, bound to an ephemeral port.
        let app = bootnet_api::app::build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            mail,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn jane() -> serde_json::Value {
    json!({
        "firstName": "Jane",
        "lastName": "Doe",
        "email": "jane@x.com",
        "password": "Secret123!"
    })
}

fn mint_jwt(subject: &str, issued: chrono::DateTime<Utc>, ttl: ChronoDuration) -> String {
    let claims = JwtClaims {
        sub: subject.to_string(),
        full_name: "Jane Doe".to_string(),
        authorities: vec![],
        iat: issued.timestamp(),
        exp: (issued + ttl).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

/// Register Jane and return her activation code.
async fn register_jane(client: &reqwest::Client, srv: &TestServer) -> String {
    let before = srv.mail.count();
    let res = client
        .post(srv.url("/api/v1/auth/register"))
        .json(&jane())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    srv.mail.nth_code_eventually(before).await
}

/// Register, activate and authenticate Jane; returns the bearer token.
async fn active_jane(client: &reqwest::Client, srv: &TestServer) -> String {
    let code = register_jane(client, srv).await;
    activate_and_login(client, srv, &code).await
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_activate_authenticate_scenario() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let code = register_jane(&client, &srv).await;
    assert_eq!(code.len(), 6);
    assert!(code.bytes().all(|b| b.is_ascii_digit()));

    let user = srv
        .services
        .store
        .find_user_by_email("jane@x.com")
        .await
        .unwrap()
        .unwrap();
    assert!(!user.enabled);

    let token = activate_and_login(&client, &srv, &code).await;
    assert!(!token.is_empty());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let decoded = jsonwebtoken::decode::<serde_json::Value>(
        &token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &validation,
    )
    .unwrap();
    assert_eq!(decoded.claims["sub"], "jane@x.com");
    assert_eq!(decoded.claims["fullName"], "Jane Doe");
    assert_eq!(decoded.claims["authorities"], json!(["USER"]));

    let stored = srv
        .services
        .store
        .find_token_by_code(&code)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.validated_at.is_some());

    let res = client
        .get(srv.url("/api/v1/users/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: serde_json::Value = res.json().await.unwrap();
    assert_eq!(me["firstName"], "Jane");
    assert_eq!(me["lastName"], "Doe");
    assert_eq!(me["email"], "jane@x.com");
    assert_eq!(me["roles"], json!(["USER"]));
}

async fn activate_and_login(
    client: &reqwest::Client,
    srv: &TestServer,
    code: &str,
) -> String {
    let res = client
        .get(srv.url("/api/v1/auth/activate-account"))
        .query(&[("token", code)])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/api/v1/auth/authenticate"))
        .json(&json!({ "email": "jane@x.com", "password": "Secret123!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn auth_required_for_user_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/api/v1/users/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["businessErrorCode"], 401);

    for header in ["Bearer not.a.jwt", "bearer abc", "Token abc", "Bearer   "] {
        let res = client
            .get(srv.url("/api/v1/users/me"))
            .header("Authorization", header)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "header {header:?}");
    }
}

#[tokio::test]
async fn auth_endpoints_ignore_bad_bearer_tokens() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/v1/auth/register"))
        .header("Authorization", "Bearer garbage")
        .json(&jane())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    register_jane(&client, &srv).await;

    let res = client
        .post(srv.url("/api/v1/auth/register"))
        .json(&jane())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["businessErrorCode"], 320);
}

#[tokio::test]
async fn invalid_registration_reports_deduplicated_messages() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/v1/auth/register"))
        .json(&json!({
            "firstName": "  ",
            "lastName": "",
            "email": "nope",
            "password": "short"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["businessErrorCode"], 400);
    let messages: Vec<&str> = body["validationErrors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap())
        .collect();
    assert!(messages.contains(&"Firstname is mandatory"));
    assert!(messages.contains(&"Email is not well formatted"));
    let mut unique = messages.clone();
    unique.dedup();
    assert_eq!(unique.len(), messages.len());

    // Nothing was created.
    assert_eq!(srv.mail.count(), 0);
}

#[tokio::test]
async fn inactive_account_cannot_authenticate() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    register_jane(&client, &srv).await;

    let res = client
        .post(srv.url("/api/v1/auth/authenticate"))
        .json(&json!({ "email": "jane@x.com", "password": "Secret123!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["businessErrorCode"], 303);
}

#[tokio::test]
async fn wrong_password_is_bad_credentials() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    active_jane(&client, &srv).await;

    let res = client
        .post(srv.url("/api/v1/auth/authenticate"))
        .json(&json!({ "email": "jane@x.com", "password": "Secret123?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["businessErrorCode"], 304);
}

#[tokio::test]
async fn activation_code_faults() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/api/v1/auth/activate-account?token=999999"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["businessErrorCode"], 310);

    let code = register_jane(&client, &srv).await;
    activate_and_login(&client, &srv, &code).await;

    let res = client
        .get(srv.url("/api/v1/auth/activate-account"))
        .query(&[("token", code.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["businessErrorCode"], 312);
}

#[tokio::test]
async fn expired_code_sends_a_new_one() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    register_jane(&client, &srv).await;

    let user = srv
        .services
        .store
        .find_user_by_email("jane@x.com")
        .await
        .unwrap()
        .unwrap();
    let stale = ActivationToken::issue(
        user.id,
        "424242".to_string(),
        &ActivationPolicy::default(),
        Utc::now() - ChronoDuration::hours(2),
    );
    srv.services.store.save_token(stale).await.unwrap();

    let res = client
        .get(srv.url("/api/v1/auth/activate-account?token=424242"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::GONE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["businessErrorCode"], 311);

    let fresh = srv.mail.nth_code_eventually(1).await;
    assert_ne!(fresh, "424242");

    let res = client
        .get(srv.url("/api/v1/auth/activate-account"))
        .query(&[("token", fresh.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn expired_bearer_token_is_unauthenticated() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    active_jane(&client, &srv).await;

    let expired = mint_jwt(
        "jane@x.com",
        Utc::now() - ChronoDuration::hours(1),
        ChronoDuration::minutes(10),
    );
    let res = client
        .get(srv.url("/api/v1/users/me"))
        .bearer_auth(expired)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn roles_come_from_the_store_not_the_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    active_jane(&client, &srv).await;

    // Minted with no authorities; the store still grants USER.
    let token = mint_jwt("jane@x.com", Utc::now(), ChronoDuration::minutes(10));
    let res = client
        .get(srv.url("/api/v1/users/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Strip the role in the store; the same token is now forbidden.
    let mut user = srv
        .services
        .store
        .find_user_by_email("jane@x.com")
        .await
        .unwrap()
        .unwrap();
    user.roles.clear();
    srv.services.store.save_user(user).await.unwrap();

    let res = client
        .get(srv.url("/api/v1/users/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn locked_account_is_shut_out() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = active_jane(&client, &srv).await;

    let mut user = srv
        .services
        .store
        .find_user_by_email("jane@x.com")
        .await
        .unwrap()
        .unwrap();
    user.account_locked = true;
    srv.services.store.save_user(user).await.unwrap();

    let res = client
        .get(srv.url("/api/v1/users/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/api/v1/auth/authenticate"))
        .json(&json!({ "email": "jane@x.com", "password": "Secret123!" }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["businessErrorCode"], 302);
}

#[tokio::test]
async fn user_lookups() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = active_jane(&client, &srv).await;

    let res = client
        .get(srv.url("/api/v1/users/email/jane@x.com"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let by_email: serde_json::Value = res.json().await.unwrap();
    let id = by_email["id"].as_str().unwrap().to_string();

    let res = client
        .get(srv.url(&format!("/api/v1/users/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let by_id: serde_json::Value = res.json().await.unwrap();
    assert_eq!(by_id, by_email);
    assert!(by_id.get("passwordHash").is_none());

    let res = client
        .get(srv.url("/api/v1/users/email/nobody@x.com"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/api/v1/users/not-a-uuid"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
