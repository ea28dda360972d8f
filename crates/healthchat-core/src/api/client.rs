use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::cache::{QueryCache, QueryKey};
use super::endpoint::Endpoint;
use crate::config::ClientConfig;
use crate::error::{HealthchatError, Result};
use crate::model::*;
use crate::proxy::tolerant_json;
use crate::session::{AuthStore, Credentials};

/// Client for the remote API. Every call goes through the local proxy and
/// carries the session's access token as a bearer credential when one is set.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Arc<AuthStore>,
    cache: Mutex<QueryCache>,
    refetch_on_invalidate: bool,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.auth.is_authenticated())
            .finish()
    }
}

impl ApiClient {
    /// `proxy_url` is the base of the local proxy route, e.g. `http://127.0.0.1:3000/api/proxy/`.
    pub fn new(proxy_url: &str, auth: Arc<AuthStore>) -> Result<Self> {
        let mut raw = proxy_url.to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw)
            .map_err(|e| HealthchatError::Config(format!("invalid proxy URL '{proxy_url}': {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            auth,
            cache: Mutex::new(QueryCache::new()),
            refetch_on_invalidate: true,
        })
    }

    pub fn from_config(config: &ClientConfig, auth: Arc<AuthStore>) -> Result<Self> {
        let mut client = Self::new(&config.proxy_url, auth)?;
        client.refetch_on_invalidate = config.refetch_on_invalidate;
        Ok(client)
    }

    pub fn with_refetch(mut self, refetch: bool) -> Self {
        self.refetch_on_invalidate = refetch;
        self
    }

    pub fn auth(&self) -> &Arc<AuthStore> {
        &self.auth
    }

    pub fn is_cached(&self, endpoint: Endpoint, id: Option<i64>) -> bool {
        self.cache().get(&QueryKey::new(endpoint, id)).is_some()
    }

    // -- Auth --

    /// Register a new account. Tokens in the response, if any, start a session.
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<AuthResponse> {
        let value = self
            .mutate(Endpoint::SignUp, None, Some(serde_json::to_value(request)?))
            .await?;
        let response: AuthResponse = serde_json::from_value(value)?;
        if response.has_token() {
            self.start_session(&response)?;
        }
        Ok(response)
    }

    /// Sign in and replace the current session with the returned tokens.
    pub async fn sign_in(&self, request: &SignInRequest) -> Result<AuthResponse> {
        let value = self
            .mutate(Endpoint::SignIn, None, Some(serde_json::to_value(request)?))
            .await?;
        let response: AuthResponse = serde_json::from_value(value)?;
        self.start_session(&response)?;
        Ok(response)
    }

    /// Tell the server to end the session, then clear it locally whatever the
    /// server said. The request error, if any, is still returned.
    pub async fn logout(&self) -> Result<()> {
        let result = self.mutate(Endpoint::Logout, None, None).await;
        if let Err(ref e) = result {
            tracing::warn!(error = %e, "logout request failed, clearing session anyway");
        }
        self.cache().clear();
        logout_outcome(result.map(|_| ()), self.auth.logout())
    }

    fn start_session(&self, response: &AuthResponse) -> Result<()> {
        self.cache().clear();
        self.auth.set_credentials(&Credentials::from(response))
    }

    // -- Profile --

    pub async fn get_user_profile(&self) -> Result<UserProfile> {
        self.query(QueryKey::new(Endpoint::GetUserProfile, None))
            .await
    }

    pub async fn update_user_profile(
        &self,
        request: &UpdateUserProfileRequest,
    ) -> Result<UserProfile> {
        if request.is_empty() {
            return Err(HealthchatError::InvalidInput(
                "nothing to update".to_string(),
            ));
        }
        let value = self
            .mutate(
                Endpoint::UpdateUserProfile,
                None,
                Some(serde_json::to_value(request)?),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    // -- Chats --

    pub async fn create_chat(&self, request: &CreateChatRequest) -> Result<CreateChatResponse> {
        require_text("message", &request.message_content)?;
        require_text("model name", &request.model_name)?;
        let value = self
            .mutate(Endpoint::CreateChat, None, Some(serde_json::to_value(request)?))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the stored message when the server echoes it back.
    pub async fn add_message_to_chat(&self, request: &AddMessageRequest) -> Result<Option<Message>> {
        require_text("message", &request.message_content)?;
        require_text("model name", &request.model_name)?;
        let value = self
            .mutate(
                Endpoint::AddMessageToChat,
                None,
                Some(serde_json::to_value(request)?),
            )
            .await?;
        Ok(decode_optional::<Message>(value))
    }

    pub async fn get_user_chat_list(&self) -> Result<Vec<Chat>> {
        let payload: Payload<Vec<Chat>> = self
            .query(QueryKey::new(Endpoint::GetUserChatList, None))
            .await?;
        Ok(payload.into_inner())
    }

    pub async fn get_chat_content(&self, chat_id: i64) -> Result<ChatContent> {
        let payload: Payload<ChatContent> = self
            .query(QueryKey::new(Endpoint::GetChatContent, Some(chat_id)))
            .await?;
        Ok(payload.into_inner())
    }

    /// Returns the renamed chat when the server echoes it back.
    pub async fn update_chat_title(&self, chat_id: i64, title: &str) -> Result<Option<Chat>> {
        require_text("title", title)?;
        let body = serde_json::to_value(UpdateChatTitleRequest {
            title: title.to_string(),
        })?;
        let value = self
            .mutate(Endpoint::UpdateChatTitle, Some(chat_id), Some(body))
            .await?;
        Ok(decode_optional::<Chat>(value))
    }

    pub async fn delete_chat(&self, chat_id: i64) -> Result<()> {
        self.mutate(Endpoint::DeleteChat, Some(chat_id), None)
            .await
            .map(|_| ())
    }

    // -- Plumbing --

    /// Serve a query from the cache, or fetch and cache it.
    async fn query<T: DeserializeOwned>(&self, key: QueryKey) -> Result<T> {
        let cached = self.cache().get(&key).cloned();
        let value = match cached {
            Some(value) => {
                tracing::debug!(endpoint = key.endpoint.name(), id = ?key.id, "cache hit");
                value
            }
            None => {
                let generation = self.cache().generation(&key);
                let value = self.send(Method::GET, &key.path(), None).await?;
                self.cache().insert_if_current(key, value.clone(), generation);
                value
            }
        };
        Ok(serde_json::from_value(value)?)
    }

    /// Run a mutation, then invalidate (and re-issue) the queries it affects.
    async fn mutate(&self, endpoint: Endpoint, id: Option<i64>, body: Option<Value>) -> Result<Value> {
        let spec = endpoint.spec();
        let value = self
            .send(spec.method.as_method(), &endpoint.path(id), body)
            .await?;

        let stale = self.cache().invalidate(spec.invalidates);
        if self.refetch_on_invalidate && !stale.is_empty() {
            self.refetch(stale).await;
        }
        Ok(value)
    }

    /// Re-issue invalidated queries. A failed refetch leaves the entry empty,
    /// so the next read goes to the network.
    async fn refetch(&self, keys: Vec<QueryKey>) {
        for key in keys {
            let generation = self.cache().generation(&key);
            match self.send(Method::GET, &key.path(), None).await {
                Ok(value) => {
                    self.cache().insert_if_current(key, value, generation);
                }
                Err(e) => {
                    tracing::warn!(endpoint = key.endpoint.name(), id = ?key.id, error = %e, "refetch failed");
                }
            }
        }
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| HealthchatError::InvalidInput(format!("bad request path '{path}': {e}")))?;

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.auth.access_token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let value = tolerant_json(&bytes);
        tracing::debug!(%method, %url, status = status.as_u16(), "api call finished");

        if !status.is_success() {
            return Err(HealthchatError::Api {
                status: status.as_u16(),
                message: error_message(&value, status),
            });
        }
        Ok(value)
    }

    fn cache(&self) -> MutexGuard<'_, QueryCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The request error wins over a storage error; the one not returned is logged.
fn logout_outcome(request: Result<()>, cleared: Result<()>) -> Result<()> {
    match (request, cleared) {
        (Err(request), Err(storage)) => {
            tracing::warn!(error = %storage, "failed to remove stored session");
            Err(request)
        }
        (Err(request), Ok(())) => Err(request),
        (Ok(()), cleared) => cleared,
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(HealthchatError::InvalidInput(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

fn decode_optional<T: DeserializeOwned>(value: Value) -> Option<T> {
    match serde_json::from_value::<Payload<T>>(value) {
        Ok(payload) => Some(payload.into_inner()),
        Err(e) => {
            tracing::debug!(error = %e, "response body did not match, ignoring");
            None
        }
    }
}

/// Pick the most useful message from an error body: `detail`, `message`,
/// then `error`, falling back to the status reason.
fn error_message(body: &Value, status: StatusCode) -> String {
    ["detail", "message", "error"]
        .iter()
        .find_map(|field| body.get(field).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_priority() {
        let body = json!({"message": "m", "detail": "d", "error": "e"});
        assert_eq!(error_message(&body, StatusCode::BAD_REQUEST), "d");

        let body = json!({"message": "m", "error": "e"});
        assert_eq!(error_message(&body, StatusCode::BAD_REQUEST), "m");

        let body = json!({"error": "e"});
        assert_eq!(error_message(&body, StatusCode::BAD_REQUEST), "e");
    }

    #[test]
    fn test_error_message_falls_back_to_reason() {
        assert_eq!(
            error_message(&json!({}), StatusCode::UNAUTHORIZED),
            "Unauthorized"
        );
        assert_eq!(
            error_message(&json!({"detail": 5}), StatusCode::NOT_FOUND),
            "Not Found"
        );
    }

    #[test]
    fn test_logout_outcome_prefers_request_error() {
        let request = Err(HealthchatError::Api {
            status: 502,
            message: "Bad Gateway".into(),
        });
        let storage = Err(HealthchatError::Storage("disk full".into()));
        let err = logout_outcome(request, storage).unwrap_err();
        assert!(matches!(err, HealthchatError::Api { status: 502, .. }));
    }

    #[test]
    fn test_logout_outcome_reports_storage_error_after_success() {
        let storage = Err(HealthchatError::Storage("disk full".into()));
        let err = logout_outcome(Ok(()), storage).unwrap_err();
        assert!(matches!(err, HealthchatError::Storage(_)));
        assert!(logout_outcome(Ok(()), Ok(())).is_ok());
    }

    #[test]
    fn test_require_text() {
        assert!(require_text("title", "hello").is_ok());
        assert!(matches!(
            require_text("title", "   "),
            Err(HealthchatError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_decode_optional() {
        let msg = json!({"id": 1, "content": "hi", "sender": "bot", "created_at": ""});
        assert!(decode_optional::<Message>(msg).is_some());
        assert!(decode_optional::<Message>(json!({})).is_none());
        let wrapped = json!({"data": {"id": 2, "title": "x"}});
        assert_eq!(decode_optional::<Chat>(wrapped).unwrap().id, 2);
    }

    #[test]
    fn test_new_appends_slash() {
        let client = ApiClient::new(
            "http://127.0.0.1:3000/api/proxy",
            Arc::new(AuthStore::in_memory()),
        )
        .unwrap();
        assert_eq!(client.base_url.as_str(), "http://127.0.0.1:3000/api/proxy/");
    }

    #[tokio::test]
    async fn test_empty_message_not_sent() {
        // Nothing listens on this address; validation must fail first.
        let client = ApiClient::new("http://127.0.0.1:9/api/proxy/", Arc::new(AuthStore::in_memory()))
            .unwrap();
        let err = client
            .create_chat(&CreateChatRequest {
                model_name: "Chartwright".into(),
                message_content: "  ".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, HealthchatError::InvalidInput(_)));

        let err = client.update_chat_title(1, "").await.unwrap_err();
        assert!(matches!(err, HealthchatError::InvalidInput(_)));

        let err = client
            .update_user_profile(&UpdateUserProfileRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HealthchatError::InvalidInput(_)));
    }
}
