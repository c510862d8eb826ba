//! Authenticated request pipeline.
//!
//! `AuthGateway` attaches the stored access credential to outgoing requests,
//! detects credential expiry (HTTP 401), refreshes the credential once and
//! retries the original request exactly once. Concurrent callers that observe
//! the same expiry share a single in-flight refresh, and a refresh credential
//! the server rejected is not sent again.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;

use super::credentials::{CredentialPair, CredentialStore};
use crate::api::{ApiError, ApiRequest, ApiResponse, ApiResult, HttpTransport};
use crate::models::{SignupRequest, UserProfile};

const LOGIN_PATH: &str = "auth/token/";
const REFRESH_PATH: &str = "auth/token/refresh/";
const REGISTER_PATH: &str = "auth/register/";
const CHANGE_PASSWORD_PATH: &str = "auth/change-password/";
const USERINFO_PATH: &str = "auth/userinfo/";

type RefreshFuture = Shared<BoxFuture<'static, ApiResult<String>>>;

/// The latest refresh, kept after it settles so that callers holding the same
/// refresh credential can reuse a rejection instead of repeating it.
struct RefreshAttempt {
    refresh_token: String,
    outcome: RefreshFuture,
}

#[derive(Clone)]
pub struct AuthGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn CredentialStore>,
    /// At most one refresh runs at a time; late callers attach to it.
    last_refresh: Mutex<Option<RefreshAttempt>>,
}

impl AuthGateway {
    pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                transport,
                store,
                last_refresh: Mutex::new(None),
            }),
        }
    }

    /// A refresh credential is stored, so authenticated calls can proceed.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.inner.store.refresh_token(), Ok(Some(_)))
    }

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<CredentialPair> {
        validate_credentials(username, password)?;

        let request = ApiRequest::post(LOGIN_PATH).json(serde_json::json!({
            "username": username,
            "password": password,
        }));
        let response = self.inner.transport.send(request).await?;
        if matches!(response.status, 400 | 401) {
            tracing::info!(status = response.status, "Login rejected");
            return Err(ApiError::InvalidCredentials);
        }
        if !response.is_success() {
            return Err(ApiError::network(response.error_message()));
        }

        let pair: CredentialPair = response.json()?;
        self.inner.store.save(&pair)?;
        tracing::info!("Logged in as {}", username);
        Ok(pair)
    }

    /// Forget the stored credentials. The server keeps no session to end.
    pub fn logout(&self) -> ApiResult<()> {
        self.inner.store.clear()?;
        tracing::info!("Stored credentials cleared");
        Ok(())
    }

    /// Exchange the refresh credential for a new access credential.
    ///
    /// Joins a refresh that is already in flight instead of starting another.
    pub async fn refresh(&self) -> ApiResult<()> {
        self.shared_refresh().await.map(|_| ())
    }

    /// Execute `request` with the access credential attached, refreshing and
    /// retrying once if the server rejects the credential.
    pub async fn perform_authenticated(&self, request: ApiRequest) -> ApiResult<Vec<u8>> {
        let Some(token) = self.current_access_token()? else {
            return Err(ApiError::AuthRequired);
        };

        let response = self.send_with_token(&request, &token).await?;
        if !response.is_unauthorized() {
            return response.into_success_body();
        }

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            "Access credential rejected; refreshing"
        );
        let fresh_token = match self.current_access_token()? {
            // Someone else already replaced the credential we used.
            Some(current) if current != token => current,
            _ => self.shared_refresh().await?,
        };

        let retried = self.send_with_token(&request, &fresh_token).await?;
        if retried.is_unauthorized() {
            tracing::warn!(
                method = %request.method,
                path = %request.path,
                "Request rejected again after credential refresh"
            );
            return Err(ApiError::AuthRequired);
        }
        retried.into_success_body()
    }

    pub async fn signup(&self, request: &SignupRequest) -> ApiResult<()> {
        let body = serde_json::to_value(request)
            .map_err(|error| ApiError::decoding(error.to_string()))?;
        let response = self
            .inner
            .transport
            .send(ApiRequest::post(REGISTER_PATH).json(body))
            .await?;
        response.into_success_body()?;
        tracing::info!("Registered account {}", request.username);
        Ok(())
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> ApiResult<()> {
        let request = ApiRequest::post(CHANGE_PASSWORD_PATH).json(serde_json::json!({
            "old_password": old_password,
            "new_password": new_password,
        }));
        self.perform_authenticated(request).await?;
        Ok(())
    }

    pub async fn fetch_user_profile(&self) -> ApiResult<UserProfile> {
        let body = self
            .perform_authenticated(ApiRequest::get(USERINFO_PATH))
            .await?;
        ApiResponse::new(200, body).json()
    }

    fn current_access_token(&self) -> ApiResult<Option<String>> {
        self.inner.store.access_token().map_err(|error| {
            tracing::warn!("Failed to read access credential: {}", error);
            ApiError::from(error)
        })
    }

    async fn send_with_token(&self, request: &ApiRequest, token: &str) -> ApiResult<ApiResponse> {
        self.inner
            .transport
            .send(request.clone().with_bearer(token))
            .await
    }

    async fn shared_refresh(&self) -> ApiResult<String> {
        let refresh_token = match self.inner.store.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("No refresh credential stored");
                return Err(ApiError::AuthRequired);
            }
            Err(error) => {
                tracing::warn!("Failed to read refresh credential: {}", error);
                return Err(error.into());
            }
        };

        let refresh = {
            let mut last = self
                .inner
                .last_refresh
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let reusable = last
                .as_ref()
                .filter(|attempt| attempt.refresh_token == refresh_token)
                .and_then(|attempt| match attempt.outcome.peek() {
                    None => {
                        tracing::debug!("Joining in-flight credential refresh");
                        Some(attempt.outcome.clone())
                    }
                    Some(Err(error)) if error.is_auth_required() => {
                        tracing::debug!("Refresh credential was already rejected");
                        Some(attempt.outcome.clone())
                    }
                    Some(_) => None,
                });
            match reusable {
                Some(outcome) => outcome,
                None => {
                    let outcome = refresh_access_token(
                        Arc::clone(&self.inner.transport),
                        Arc::clone(&self.inner.store),
                        refresh_token.clone(),
                    )
                    .boxed()
                    .shared();
                    *last = Some(RefreshAttempt {
                        refresh_token,
                        outcome: outcome.clone(),
                    });
                    outcome
                }
            }
        };

        refresh.await
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access: String,
}

async fn refresh_access_token(
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn CredentialStore>,
    refresh_token: String,
) -> ApiResult<String> {
    let request = ApiRequest::post(REFRESH_PATH).json(serde_json::json!({
        "refresh": refresh_token,
    }));
    let response = transport.send(request).await.map_err(|error| {
        tracing::warn!("Credential refresh failed: {}", error);
        ApiError::AuthRequired
    })?;
    if !response.is_success() {
        tracing::warn!(status = response.status, "Refresh credential rejected");
        return Err(ApiError::AuthRequired);
    }

    let payload: AccessTokenResponse = response.json().map_err(|error| {
        tracing::warn!("Malformed refresh response: {}", error);
        ApiError::AuthRequired
    })?;
    store.save_access_token(&payload.access).map_err(|error| {
        tracing::warn!("Failed to store refreshed access credential: {}", error);
        ApiError::from(error)
    })?;

    tracing::info!("Access credential refreshed");
    Ok(payload.access)
}

fn validate_credentials(username: &str, password: &str) -> ApiResult<()> {
    if username.trim().is_empty() || password.trim().is_empty() {
        return Err(ApiError::InvalidCredentials);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::Method;
    use crate::auth::{MemoryCredentialStore, StoreError, StoreResult};
    use crate::testing::{json_response, FakeTransport};
    use serde_json::json;
    use tokio::sync::Barrier;

    fn gateway_with(
        transport: Arc<FakeTransport>,
        store: Arc<MemoryCredentialStore>,
    ) -> AuthGateway {
        AuthGateway::new(transport, store)
    }

    fn signed_in(access: &str) -> Arc<MemoryCredentialStore> {
        Arc::new(MemoryCredentialStore::with_pair(&CredentialPair::new(
            access,
            "refresh-1",
        )))
    }

    /// Keychain that refuses reads, optionally still handing out an access
    /// credential.
    struct LockedStore {
        access: Option<&'static str>,
    }

    fn locked() -> StoreError {
        StoreError::Backend("keychain locked".to_string())
    }

    impl CredentialStore for LockedStore {
        fn save(&self, _pair: &CredentialPair) -> StoreResult<()> {
            Err(locked())
        }

        fn save_access_token(&self, _access_token: &str) -> StoreResult<()> {
            Err(locked())
        }

        fn access_token(&self) -> StoreResult<Option<String>> {
            self.access.map(|token| Some(token.to_string())).ok_or_else(locked)
        }

        fn refresh_token(&self) -> StoreResult<Option<String>> {
            Err(locked())
        }

        fn clear(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn login_saves_credential_pair() {
        let transport = FakeTransport::new(|request| {
            assert_eq!(request.path, LOGIN_PATH);
            assert_eq!(request.bearer, None);
            assert_eq!(request.body.as_ref().unwrap()["username"], "alice");
            json_response(200, json!({"access": "a1", "refresh": "r1"}))
        });
        let store = Arc::new(MemoryCredentialStore::new());
        let gateway = gateway_with(transport, Arc::clone(&store));

        let pair = gateway.login("alice", "pw").await.unwrap();

        assert_eq!(pair, CredentialPair::new("a1", "r1"));
        assert_eq!(store.access_token().unwrap().as_deref(), Some("a1"));
        assert_eq!(store.refresh_token().unwrap().as_deref(), Some("r1"));
        assert!(gateway.is_authenticated());
    }

    #[tokio::test]
    async fn login_maps_client_errors_to_invalid_credentials() {
        for status in [400, 401] {
            let transport = FakeTransport::new(move |_| {
                json_response(status, json!({"detail": "No active account"}))
            });
            let gateway = gateway_with(transport, Arc::new(MemoryCredentialStore::new()));
            let error = gateway.login("alice", "wrong").await.unwrap_err();
            assert_eq!(error, ApiError::InvalidCredentials);
        }
    }

    #[tokio::test]
    async fn login_maps_server_errors_to_network() {
        let transport = FakeTransport::new(|_| Ok(ApiResponse::new(503, "")));
        let gateway = gateway_with(transport, Arc::new(MemoryCredentialStore::new()));
        let error = gateway.login("alice", "pw").await.unwrap_err();
        assert!(matches!(error, ApiError::Network(_)));
    }

    #[tokio::test]
    async fn login_maps_transport_failure_to_network() {
        let transport = FakeTransport::new(|_| Err(ApiError::network("connection refused")));
        let gateway = gateway_with(transport, Arc::new(MemoryCredentialStore::new()));
        let error = gateway.login("alice", "pw").await.unwrap_err();
        assert_eq!(error, ApiError::network("connection refused"));
    }

    #[tokio::test]
    async fn login_maps_malformed_body_to_decoding() {
        let transport = FakeTransport::new(|_| json_response(200, json!({"token": "a1"})));
        let store = Arc::new(MemoryCredentialStore::new());
        let gateway = gateway_with(transport, Arc::clone(&store));

        let error = gateway.login("alice", "pw").await.unwrap_err();

        assert!(matches!(error, ApiError::Decoding(_)));
        assert_eq!(store.access_token().unwrap(), None);
    }

    #[tokio::test]
    async fn login_rejects_blank_input_without_network() {
        let transport = FakeTransport::new(|_| Ok(ApiResponse::new(200, "")));
        let gateway = gateway_with(Arc::clone(&transport), Arc::new(MemoryCredentialStore::new()));

        let error = gateway.login("  ", "pw").await.unwrap_err();

        assert_eq!(error, ApiError::InvalidCredentials);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn logout_clears_store() {
        let transport = FakeTransport::new(|_| Ok(ApiResponse::new(200, "")));
        let store = signed_in("a1");
        let gateway = gateway_with(transport, Arc::clone(&store));

        gateway.logout().unwrap();

        assert!(!gateway.is_authenticated());
        assert_eq!(store.access_token().unwrap(), None);
    }

    #[tokio::test]
    async fn refresh_without_refresh_credential_makes_no_call() {
        let transport = FakeTransport::new(|_| json_response(200, json!({"access": "a2"})));
        let gateway = gateway_with(Arc::clone(&transport), Arc::new(MemoryCredentialStore::new()));

        let error = gateway.refresh().await.unwrap_err();

        assert_eq!(error, ApiError::AuthRequired);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn refresh_stores_access_and_keeps_refresh_credential() {
        let transport = FakeTransport::new(|request| {
            assert_eq!(request.path, REFRESH_PATH);
            assert_eq!(request.body.as_ref().unwrap()["refresh"], "refresh-1");
            json_response(200, json!({"access": "a2"}))
        });
        let store = signed_in("a1");
        let gateway = gateway_with(transport, Arc::clone(&store));

        gateway.refresh().await.unwrap();

        assert_eq!(store.access_token().unwrap().as_deref(), Some("a2"));
        assert_eq!(store.refresh_token().unwrap().as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn refresh_rejection_leaves_store_untouched() {
        let transport = FakeTransport::new(|_| {
            json_response(401, json!({"detail": "Token is blacklisted"}))
        });
        let store = signed_in("a1");
        let gateway = gateway_with(transport, Arc::clone(&store));

        let error = gateway.refresh().await.unwrap_err();

        assert_eq!(error, ApiError::AuthRequired);
        assert_eq!(store.access_token().unwrap().as_deref(), Some("a1"));
        assert_eq!(store.refresh_token().unwrap().as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn authenticated_call_without_access_fails_fast() {
        let transport = FakeTransport::new(|_| Ok(ApiResponse::new(200, "[]")));
        let gateway = gateway_with(Arc::clone(&transport), Arc::new(MemoryCredentialStore::new()));

        let error = gateway
            .perform_authenticated(ApiRequest::get("notes/"))
            .await
            .unwrap_err();

        assert_eq!(error, ApiError::AuthRequired);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn authenticated_call_attaches_bearer() {
        let transport = FakeTransport::new(|request| {
            assert_eq!(request.bearer.as_deref(), Some("a1"));
            Ok(ApiResponse::new(200, "[]"))
        });
        let gateway = gateway_with(transport, signed_in("a1"));

        let body = gateway
            .perform_authenticated(ApiRequest::get("notes/"))
            .await
            .unwrap();

        assert_eq!(body, b"[]".to_vec());
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_and_request_retried_once() {
        let transport = FakeTransport::new(|request| match request.path.as_str() {
            REFRESH_PATH => json_response(200, json!({"access": "fresh"})),
            _ if request.bearer.as_deref() == Some("fresh") => Ok(ApiResponse::new(200, "[]")),
            _ => Ok(ApiResponse::new(401, "")),
        });
        let store = signed_in("stale");
        let gateway = gateway_with(Arc::clone(&transport), Arc::clone(&store));

        let body = gateway
            .perform_authenticated(ApiRequest::get("notes/"))
            .await
            .unwrap();

        assert_eq!(body, b"[]".to_vec());
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 1);
        assert_eq!(transport.count(Method::Get, "notes/"), 2);
        assert_eq!(store.access_token().unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn second_rejection_is_not_retried() {
        let transport = FakeTransport::new(|request| match request.path.as_str() {
            REFRESH_PATH => json_response(200, json!({"access": "fresh"})),
            _ => Ok(ApiResponse::new(401, "")),
        });
        let gateway = gateway_with(Arc::clone(&transport), signed_in("stale"));

        let error = gateway
            .perform_authenticated(ApiRequest::get("notes/"))
            .await
            .unwrap_err();

        assert_eq!(error, ApiError::AuthRequired);
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 1);
        assert_eq!(transport.count(Method::Get, "notes/"), 2);
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_auth_required() {
        let transport = FakeTransport::new(|_| Ok(ApiResponse::new(401, "")));
        let gateway = gateway_with(Arc::clone(&transport), signed_in("stale"));

        let error = gateway
            .perform_authenticated(ApiRequest::get("notes/"))
            .await
            .unwrap_err();

        assert_eq!(error, ApiError::AuthRequired);
        assert_eq!(transport.count(Method::Get, "notes/"), 1);
    }

    #[tokio::test]
    async fn non_auth_failure_is_network_without_refresh() {
        let transport = FakeTransport::new(|_| Ok(ApiResponse::new(500, "boom")));
        let gateway = gateway_with(Arc::clone(&transport), signed_in("a1"));

        let error = gateway
            .perform_authenticated(ApiRequest::delete("notes/7/"))
            .await
            .unwrap_err();

        assert_eq!(error, ApiError::network("boom (500)"));
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn credential_replaced_meanwhile_is_reused_without_refresh() {
        let store = signed_in("stale");
        let handler_store = Arc::clone(&store);
        let transport = FakeTransport::new(move |request| match request.bearer.as_deref() {
            Some("stale") => {
                // Another caller finished refreshing while this one was in flight.
                handler_store.save_access_token("fresh").unwrap();
                Ok(ApiResponse::new(401, ""))
            }
            Some("fresh") => Ok(ApiResponse::new(200, "{}")),
            _ => json_response(200, json!({"access": "unexpected"})),
        });
        let gateway = gateway_with(Arc::clone(&transport), store);

        gateway
            .perform_authenticated(ApiRequest::get("notes/"))
            .await
            .unwrap();

        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_expiry_triggers_single_refresh() {
        const CALLERS: usize = 8;
        let barrier = Arc::new(Barrier::new(CALLERS));
        let transport = FakeTransport::new_async(move |request| {
            let barrier = Arc::clone(&barrier);
            async move {
                match (request.path.as_str(), request.bearer.as_deref()) {
                    (REFRESH_PATH, _) => {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        json_response(200, json!({"access": "fresh"}))
                    }
                    (_, Some("stale")) => {
                        barrier.wait().await;
                        Ok(ApiResponse::new(401, ""))
                    }
                    (_, Some("fresh")) => Ok(ApiResponse::new(200, "[]")),
                    _ => Ok(ApiResponse::new(500, "")),
                }
            }
            .boxed()
        });
        let gateway = gateway_with(Arc::clone(&transport), signed_in("stale"));

        let tasks = (0..CALLERS)
            .map(|_| {
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    gateway
                        .perform_authenticated(ApiRequest::get("notes/"))
                        .await
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), b"[]".to_vec());
        }
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 1);
        assert_eq!(transport.count(Method::Get, "notes/"), CALLERS * 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_refresh_failure() {
        const CALLERS: usize = 6;
        let barrier = Arc::new(Barrier::new(CALLERS));
        let transport = FakeTransport::new_async(move |request| {
            let barrier = Arc::clone(&barrier);
            async move {
                if request.path == REFRESH_PATH {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    return Ok(ApiResponse::new(401, ""));
                }
                barrier.wait().await;
                Ok(ApiResponse::new(401, ""))
            }
            .boxed()
        });
        let gateway = gateway_with(Arc::clone(&transport), signed_in("stale"));

        let tasks = (0..CALLERS)
            .map(|_| {
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    gateway
                        .perform_authenticated(ApiRequest::get("notes/"))
                        .await
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap_err(), ApiError::AuthRequired);
        }
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 1);
        assert_eq!(transport.count(Method::Get, "notes/"), CALLERS);
    }

    #[tokio::test]
    async fn late_caller_reuses_rejected_refresh() {
        let transport = FakeTransport::new_async(|request| {
            async move {
                if request.path == "notes/late/" {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Ok(ApiResponse::new(401, ""))
            }
            .boxed()
        });
        let gateway = gateway_with(Arc::clone(&transport), signed_in("stale"));

        let (early, late) = tokio::join!(
            gateway.perform_authenticated(ApiRequest::get("notes/")),
            gateway.perform_authenticated(ApiRequest::get("notes/late/")),
        );

        assert_eq!(early.unwrap_err(), ApiError::AuthRequired);
        assert_eq!(late.unwrap_err(), ApiError::AuthRequired);
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 1);
        assert_eq!(transport.count(Method::Get, "notes/late/"), 1);
    }

    #[tokio::test]
    async fn new_refresh_credential_is_tried_after_rejection() {
        let transport = FakeTransport::new(|request| match request.body.as_ref() {
            Some(body) if body["refresh"] == "refresh-2" => {
                json_response(200, json!({"access": "a2"}))
            }
            _ => Ok(ApiResponse::new(401, "")),
        });
        let store = signed_in("a1");
        let gateway = gateway_with(Arc::clone(&transport), Arc::clone(&store));

        assert_eq!(gateway.refresh().await.unwrap_err(), ApiError::AuthRequired);
        assert_eq!(gateway.refresh().await.unwrap_err(), ApiError::AuthRequired);
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 1);

        store.save(&CredentialPair::new("a1", "refresh-2")).unwrap();
        gateway.refresh().await.unwrap();

        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 2);
        assert_eq!(store.access_token().unwrap().as_deref(), Some("a2"));
    }

    #[tokio::test]
    async fn unreadable_access_credential_is_storage_error() {
        let transport = FakeTransport::new(|_| Ok(ApiResponse::new(200, "[]")));
        let gateway = AuthGateway::new(transport.clone(), Arc::new(LockedStore { access: None }));

        let error = gateway
            .perform_authenticated(ApiRequest::get("notes/"))
            .await
            .unwrap_err();

        assert!(matches!(&error, ApiError::Storage(message) if message.contains("keychain locked")));
        assert!(!error.is_auth_required());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn unreadable_refresh_credential_is_storage_error() {
        let transport = FakeTransport::new(|_| Ok(ApiResponse::new(401, "")));
        let gateway = AuthGateway::new(
            transport.clone(),
            Arc::new(LockedStore {
                access: Some("stale"),
            }),
        );

        let error = gateway
            .perform_authenticated(ApiRequest::get("notes/"))
            .await
            .unwrap_err();

        assert!(matches!(error, ApiError::Storage(_)));
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn unwritable_refreshed_credential_is_storage_error() {
        struct ReadOnlyStore;

        impl CredentialStore for ReadOnlyStore {
            fn save(&self, _pair: &CredentialPair) -> StoreResult<()> {
                Err(locked())
            }

            fn save_access_token(&self, _access_token: &str) -> StoreResult<()> {
                Err(locked())
            }

            fn access_token(&self) -> StoreResult<Option<String>> {
                Ok(Some("stale".to_string()))
            }

            fn refresh_token(&self) -> StoreResult<Option<String>> {
                Ok(Some("refresh-1".to_string()))
            }

            fn clear(&self) -> StoreResult<()> {
                Ok(())
            }
        }

        let transport = FakeTransport::new(|request| match request.path.as_str() {
            REFRESH_PATH => json_response(200, json!({"access": "fresh"})),
            _ => Ok(ApiResponse::new(401, "")),
        });
        let gateway = AuthGateway::new(transport.clone(), Arc::new(ReadOnlyStore));

        let error = gateway.refresh().await.unwrap_err();

        assert!(matches!(error, ApiError::Storage(_)));
        // A storage failure is not remembered as a rejected credential.
        gateway.refresh().await.unwrap_err();
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 2);
    }

    #[tokio::test]
    async fn change_password_is_authenticated_post() {
        let transport = FakeTransport::new(|request| {
            assert_eq!(request.method, Method::Post);
            assert_eq!(request.path, CHANGE_PASSWORD_PATH);
            assert_eq!(request.bearer.as_deref(), Some("a1"));
            assert_eq!(request.body.as_ref().unwrap()["new_password"], "new-pw");
            Ok(ApiResponse::new(200, ""))
        });
        let gateway = gateway_with(transport, signed_in("a1"));

        gateway.change_password("old-pw", "new-pw").await.unwrap();
    }

    #[tokio::test]
    async fn fetch_user_profile_decodes_body() {
        let transport = FakeTransport::new(|_| {
            json_response(
                200,
                json!({"id": 3, "username": "alice", "email": "alice@example.com"}),
            )
        });
        let gateway = gateway_with(transport, signed_in("a1"));

        let profile = gateway.fetch_user_profile().await.unwrap();

        assert_eq!(profile.username, "alice");
        assert_eq!(profile.first_name, None);
    }

    #[tokio::test]
    async fn fetch_user_profile_reports_malformed_body() {
        let transport = FakeTransport::new(|_| json_response(200, json!({"id": "x"})));
        let gateway = gateway_with(transport, signed_in("a1"));

        let error = gateway.fetch_user_profile().await.unwrap_err();
        assert!(matches!(error, ApiError::Decoding(_)));
    }

    #[tokio::test]
    async fn signup_is_unauthenticated_and_reports_failures() {
        let transport = FakeTransport::new(|request| {
            assert_eq!(request.path, REGISTER_PATH);
            assert_eq!(request.bearer, None);
            json_response(400, json!({"username": ["A user with that username already exists."]}))
        });
        let gateway = gateway_with(transport, Arc::new(MemoryCredentialStore::new()));
        let request = SignupRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "pw".to_string(),
            first_name: None,
            last_name: None,
        };

        let error = gateway.signup(&request).await.unwrap_err();
        assert!(matches!(error, ApiError::Network(message) if message.contains("already exists")));
    }
}
