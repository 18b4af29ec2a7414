//! API client for the HR backend.
//!
//! Every protected call goes through `AuthenticatedRequestGate`, so an expired
//! access token is renewed and the call retried once without the caller
//! noticing. A session that cannot be renewed shows up as
//! `ApiError::Unauthorized` here and as `Session::Anonymous` on the
//! controller's subscription.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::ApiError;
use crate::auth::{AuthenticatedRequestGate, SessionController};
use crate::models::{
    AttendanceRecord, DateFilter, Employee, HealthStatus, LeaveRequest, LeaveStatus, LogoUpload,
    NewAttendance, NewEmployee, NewLeaveRequest, NewPayrollRun, PayrollRun, Profile,
};

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Build the shared HTTP client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    gate: AuthenticatedRequestGate,
}

impl ApiClient {
    pub fn new(client: Client, base_url: &str, session: SessionController) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            gate: AuthenticatedRequestGate::new(session),
        }
    }

    pub fn session(&self) -> &SessionController {
        self.gate.session()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        self.send_with(method, path, |request| {
            let request = request.query(query);
            match body {
                Some(body) => request.json(body),
                None => request,
            }
        })
        .await
    }

    /// Send through the gate. `build` runs once per attempt, so it must be
    /// able to produce the request body again for the retry.
    async fn send_with<F>(&self, method: Method, path: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let url = self.url(path);
        let response = self
            .gate
            .execute(|token| {
                let mut request = build(self.client.request(method.clone(), &url));
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }
                request.send()
            })
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send {} request to {}", method, url))?;

        Self::check_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self.send::<()>(Method::GET, path, query, None).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", path))
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.send(Method::POST, path, &[], Some(body)).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", path))
    }

    async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.send(Method::PUT, path, &[], Some(body)).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", path))
    }

    // ===== Unauthenticated =====

    /// Server health. Never fails: an unreachable server reads as degraded.
    pub async fn health(&self) -> HealthStatus {
        let result = async {
            let response = self.client.get(self.url("/health")).send().await?;
            response.json::<HealthStatus>().await
        }
        .await;

        match result {
            Ok(health) => health,
            Err(e) => {
                debug!(error = %e, "Health check failed");
                HealthStatus::unreachable()
            }
        }
    }

    // ===== Profile =====

    pub async fn fetch_profile(&self) -> Result<Profile> {
        self.get("/api/profile", &[]).await
    }

    /// Upload a new organization logo as multipart field `file`. Returns the
    /// URL the server now serves it from.
    pub async fn upload_logo(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read logo file {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "logo".to_string());

        let response = self
            .send_with(Method::POST, "/api/settings/logo", |request| {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                request.multipart(Form::new().part("file", part))
            })
            .await?;
        let uploaded: LogoUpload = response
            .json()
            .await
            .context("Failed to parse JSON response from /api/settings/logo")?;
        Ok(uploaded.logo_url)
    }

    // ===== Employees =====

    pub async fn fetch_employees(&self) -> Result<Vec<Employee>> {
        self.get("/api/hr/employees", &[]).await
    }

    pub async fn create_employee(&self, employee: &NewEmployee) -> Result<Employee> {
        self.post("/api/hr/employees", employee).await
    }

    pub async fn update_employee(&self, id: i64, employee: &NewEmployee) -> Result<Employee> {
        self.put(&format!("/api/hr/employees/{}", id), employee).await
    }

    // ===== Attendance =====

    pub async fn fetch_attendance(&self, filter: &DateFilter) -> Result<Vec<AttendanceRecord>> {
        self.get("/api/hr/attendance", &filter.query()).await
    }

    pub async fn record_attendance(&self, entry: &NewAttendance) -> Result<AttendanceRecord> {
        self.post("/api/hr/attendance", entry).await
    }

    // ===== Leave =====

    pub async fn fetch_leave(&self, filter: &DateFilter) -> Result<Vec<LeaveRequest>> {
        self.get("/api/hr/leave", &filter.query()).await
    }

    pub async fn request_leave(&self, request: &NewLeaveRequest) -> Result<LeaveRequest> {
        request.validate().map_err(ApiError::BadRequest)?;
        self.post("/api/hr/leave", request).await
    }

    /// Approve or reject a leave request. Needs a manager or admin role; the
    /// server answers 403 otherwise.
    pub async fn set_leave_status(&self, id: i64, status: LeaveStatus) -> Result<()> {
        let body = serde_json::json!({ "status": status.as_str() });
        self.send(Method::PUT, &format!("/api/hr/leave/{}", id), &[], Some(&body))
            .await?;
        Ok(())
    }

    // ===== Payroll =====

    pub async fn fetch_payroll_runs(&self) -> Result<Vec<PayrollRun>> {
        self.get("/api/hr/payroll/runs", &[]).await
    }

    pub async fn create_payroll_run(&self, run: &NewPayrollRun) -> Result<PayrollRun> {
        self.post("/api/hr/payroll/runs", run).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::test_server::{closed_port, serve};
    use crate::auth::claims::token_expiring_in;
    use crate::auth::testing::FakeBackend;
    use crate::auth::{AuthBackend, Session, SessionConfig, TokenPair, TokenStore};

    fn client_for(base: &str, backend: &Arc<FakeBackend>, pair: Option<TokenPair>) -> ApiClient {
        let session = SessionController::start(
            TokenStore::in_memory(),
            Arc::clone(backend) as Arc<dyn AuthBackend>,
            SessionConfig::default(),
        );
        session.set_session(pair);
        ApiClient::new(Client::new(), base, session)
    }

    #[tokio::test]
    async fn test_get_sends_bearer_token() {
        let (base, server) =
            serve(vec![(200, r#"[{"id":1,"first_name":"Ana","last_name":"Vea"}]"#)]);
        let backend = Arc::new(FakeBackend::rejecting(401));
        let access = token_expiring_in(3600);
        let api = client_for(&base, &backend, Some(TokenPair::new(access.clone(), "rt1")));

        let employees = api.fetch_employees().await.expect("employees");

        assert_eq!(employees.len(), 1);
        assert_eq!(employees[0].full_name(), "Ana Vea");
        let requests = server.join().expect("server");
        assert_eq!(requests[0].path, "/api/hr/employees");
        assert_eq!(requests[0].authorization, Some(format!("Bearer {}", access)));
    }

    #[tokio::test]
    async fn test_update_employee_puts_json() {
        let (base, server) = serve(vec![(
            200,
            r#"{"id":7,"first_name":"Sione","last_name":"Taufa","position":"Clerk"}"#,
        )]);
        let backend = Arc::new(FakeBackend::rejecting(401));
        let api = client_for(&base, &backend, Some(TokenPair::new(token_expiring_in(3600), "rt1")));

        let update = NewEmployee {
            first_name: "Sione".to_string(),
            last_name: "Taufa".to_string(),
            position: Some("Clerk".to_string()),
            ..NewEmployee::default()
        };
        let updated = api.update_employee(7, &update).await.expect("updated");

        assert_eq!(updated.position.as_deref(), Some("Clerk"));
        let requests = server.join().expect("server");
        assert_eq!(requests[0].method, "PUT");
        assert_eq!(requests[0].path, "/api/hr/employees/7");
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).expect("json body");
        assert_eq!(body["position"], "Clerk");
    }

    fn logo_file(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("mbfhr-logo-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).expect("create dir");
        let path = dir.join("logo.png");
        std::fs::write(&path, b"PNGDATA").expect("write logo");
        path
    }

    #[tokio::test]
    async fn test_upload_logo_sends_multipart_file() {
        let (base, server) = serve(vec![(200, r#"{"logo_url":"/static/logo.png"}"#)]);
        let backend = Arc::new(FakeBackend::rejecting(401));
        let access = token_expiring_in(3600);
        let api = client_for(&base, &backend, Some(TokenPair::new(access.clone(), "rt1")));

        let url = api.upload_logo(&logo_file("upload")).await.expect("upload");

        assert_eq!(url, "/static/logo.png");
        let requests = server.join().expect("server");
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/api/settings/logo");
        assert_eq!(requests[0].authorization, Some(format!("Bearer {}", access)));
        assert!(requests[0].body.contains(r#"name="file"; filename="logo.png""#));
        assert!(requests[0].body.contains("PNGDATA"));
    }

    #[tokio::test]
    async fn test_upload_logo_retry_resends_file() {
        let (base, server) = serve(vec![
            (401, r#"{"detail":"Token is expired"}"#),
            (200, r#"{"logo_url":"/static/logo.png"}"#),
        ]);
        let renewed = TokenPair::new(token_expiring_in(3600), "rt2");
        let backend = Arc::new(FakeBackend::renewing(renewed.clone()));
        let api = client_for(&base, &backend, Some(TokenPair::new(token_expiring_in(3600), "rt1")));

        api.upload_logo(&logo_file("retry")).await.expect("upload");

        let requests = server.join().expect("server");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].authorization, Some(format!("Bearer {}", renewed.access_token)));
        assert!(requests[1].body.contains("PNGDATA"));
    }

    #[tokio::test]
    async fn test_upload_missing_logo_file_fails_before_sending() {
        let backend = Arc::new(FakeBackend::rejecting(401));
        let api = client_for(&closed_port(), &backend, Some(TokenPair::new("at1", "rt1")));

        let err = api
            .upload_logo(std::path::Path::new("/nonexistent/mbfhr/logo.png"))
            .await
            .expect_err("missing file");

        assert!(err.to_string().contains("Failed to read logo file"));
        assert_eq!(backend.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_and_retried() {
        let (base, server) = serve(vec![
            (401, r#"{"detail":"Token is expired"}"#),
            (200, r#"{"username":"admin","role":"admin","currency":"TOP"}"#),
        ]);
        let renewed = TokenPair::new(token_expiring_in(3600), "rt2");
        let backend = Arc::new(FakeBackend::renewing(renewed.clone()));
        let api = client_for(&base, &backend, Some(TokenPair::new(token_expiring_in(3600), "rt1")));

        let profile = api.fetch_profile().await.expect("profile");

        assert!(profile.can_approve_leave());
        assert_eq!(backend.refresh_calls(), vec!["rt1".to_string()]);
        let requests = server.join().expect("server");
        assert_eq!(requests[1].authorization, Some(format!("Bearer {}", renewed.access_token)));
        assert_eq!(api.session().session(), Session::Authenticated(renewed));
    }

    #[tokio::test]
    async fn test_failed_refresh_surfaces_unauthorized() {
        let (base, server) = serve(vec![(401, "{}")]);
        let backend = Arc::new(FakeBackend::rejecting(401));
        let api = client_for(&base, &backend, Some(TokenPair::new(token_expiring_in(3600), "rt1")));

        let err = api.fetch_payroll_runs().await.expect_err("unauthorized");

        assert!(err.downcast_ref::<ApiError>().is_some_and(ApiError::is_unauthorized));
        assert_eq!(api.session().session(), Session::Anonymous);
        server.join().expect("server");
    }

    #[tokio::test]
    async fn test_forbidden_is_access_denied_without_session_effect() {
        let (base, server) = serve(vec![(403, r#"{"detail":"Managers only"}"#)]);
        let backend = Arc::new(FakeBackend::rejecting(401));
        let pair = TokenPair::new(token_expiring_in(3600), "rt1");
        let api = client_for(&base, &backend, Some(pair.clone()));

        let err = api.set_leave_status(4, LeaveStatus::Approved).await.expect_err("forbidden");

        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::AccessDenied(_))));
        assert_eq!(backend.refresh_count(), 0);
        assert_eq!(api.session().session(), Session::Authenticated(pair));
        let requests = server.join().expect("server");
        assert_eq!(requests[0].method, "PUT");
        assert_eq!(requests[0].path, "/api/hr/leave/4");
        assert_eq!(requests[0].body, r#"{"status":"approved"}"#);
    }

    #[tokio::test]
    async fn test_filter_becomes_query_string() {
        let (base, server) = serve(vec![(200, "[]")]);
        let backend = Arc::new(FakeBackend::rejecting(401));
        let api = client_for(&base, &backend, Some(TokenPair::new(token_expiring_in(3600), "rt1")));
        let filter = DateFilter {
            date_from: chrono::NaiveDate::from_ymd_opt(2024, 5, 1),
            date_to: None,
            status: Some("absent".into()),
        };

        let records = api.fetch_attendance(&filter).await.expect("attendance");

        assert!(records.is_empty());
        let requests = server.join().expect("server");
        assert_eq!(requests[0].path, "/api/hr/attendance?date_from=2024-05-01&status=absent");
    }

    #[tokio::test]
    async fn test_health_degraded_when_unreachable() {
        let backend = Arc::new(FakeBackend::rejecting(401));
        let api = client_for(&closed_port(), &backend, None);

        let health = api.health().await;

        assert_eq!(health.status, "degraded");
        assert_eq!(health.db.as_deref(), Some("unavailable"));
    }
}
