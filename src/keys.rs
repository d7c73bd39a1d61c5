use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::builder::{CONTENT_TYPE_JSON, PreparedRequest};
use crate::catalog::HttpMethod;
use crate::client::{RawResponse, Transport, decode_response};
use crate::params::join_url;
use crate::session::SessionStore;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ApiKey {
    pub key_id: String,
    pub created_at: String,
    pub description: Option<String>,
    pub last_used: Option<String>,
}

/// Returned by create and regenerate; `api_key` is the only time the secret is shown.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ApiKeyResponse {
    pub key_id: String,
    pub api_key: Option<String>,
    pub created_at: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyStats {
    pub total_keys: usize,
    pub last_used: Option<DateTime<Utc>>,
}

/// Account and key management calls against the backend.
pub struct BackendClient<'a> {
    transport: &'a dyn Transport,
    base_url: String,
}

impl<'a> BackendClient<'a> {
    pub fn new(transport: &'a dyn Transport, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }

    fn exchange(
        &self,
        method: HttpMethod,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        let mut headers = vec![("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string())];
        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        let request = PreparedRequest {
            method,
            url: join_url(&self.base_url, path),
            headers,
            body: body.map(Value::to_string),
        };
        Ok(self.transport.execute(&request)?)
    }

    fn call(
        &self,
        method: HttpMethod,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let resp = self.exchange(method, path, token, body)?;
        Ok(decode_response(&resp)?)
    }

    fn authed_exchange(
        &self,
        session: &dyn SessionStore,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        let token = session
            .get_token()
            .ok_or_else(|| anyhow!("Authentication required"))?;
        self.exchange(method, path, Some(&token), body)
    }

    fn authed_call(
        &self,
        session: &dyn SessionStore,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let resp = self.authed_exchange(session, method, path, body)?;
        Ok(decode_response(&resp)?)
    }

    pub fn login(
        &self,
        session: &mut dyn SessionStore,
        email: &str,
        password: &str,
    ) -> Result<String> {
        self.authenticate(session, "/api/signin", email, password)
    }

    pub fn register(
        &self,
        session: &mut dyn SessionStore,
        email: &str,
        password: &str,
    ) -> Result<String> {
        self.authenticate(session, "/api/signup", email, password)
    }

    fn authenticate(
        &self,
        session: &mut dyn SessionStore,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<String> {
        let body = json!({ "email": email, "password": password });
        let value = self.call(HttpMethod::Post, path, None, Some(&body))?;
        let token: TokenResponse =
            serde_json::from_value(value).context("decode access token response")?;
        session.set_token(&token.access_token)?;
        log::info!("signed in as {email}");
        Ok(token.access_token)
    }

    pub fn logout(&self, session: &mut dyn SessionStore) -> Result<()> {
        session.clear_token()
    }

    pub fn list_keys(&self, session: &dyn SessionStore) -> Result<Vec<ApiKey>> {
        let value = self.authed_call(session, HttpMethod::Get, "/api/api-keys", None)?;
        serde_json::from_value(value).context("decode api key list")
    }

    pub fn create_key(
        &self,
        session: &dyn SessionStore,
        description: Option<&str>,
    ) -> Result<ApiKeyResponse> {
        let mut body = json!({});
        if let Some(description) = description {
            body["description"] = json!(description);
        }
        let value = self.authed_call(session, HttpMethod::Post, "/api/api-keys", Some(&body))?;
        serde_json::from_value(value).context("decode created api key")
    }

    pub fn regenerate_key(&self, session: &dyn SessionStore, key_id: &str) -> Result<ApiKeyResponse> {
        let path = format!("/api/api-keys/{}/regenerate", urlencoding::encode(key_id));
        let value = self.authed_call(session, HttpMethod::Post, &path, None)?;
        serde_json::from_value(value).context("decode regenerated api key")
    }

    /// Only the status matters on success; the body is not read.
    pub fn delete_key(&self, session: &dyn SessionStore, key_id: &str) -> Result<()> {
        let path = format!("/api/api-keys/{}", urlencoding::encode(key_id));
        let resp = self.authed_exchange(session, HttpMethod::Delete, &path, None)?;
        if !resp.is_success() {
            decode_response(&resp)?;
        }
        Ok(())
    }
}

pub fn key_stats(keys: &[ApiKey]) -> KeyStats {
    let last_used = keys
        .iter()
        .filter_map(|key| key.last_used.as_deref())
        .filter_map(parse_timestamp)
        .max();
    KeyStats {
        total_keys: keys.len(),
        last_used,
    }
}

/// Accepts RFC 3339 and offset-less ISO timestamps (read as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsoleError;
    use crate::session::MemorySessionStore;
    use std::cell::RefCell;

    struct ScriptedTransport {
        replies: RefCell<Vec<(u16, &'static str)>>,
        seen: RefCell<Vec<PreparedRequest>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<(u16, &'static str)>) -> Self {
            Self {
                replies: RefCell::new(replies),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&self, request: &PreparedRequest) -> Result<RawResponse, ConsoleError> {
            self.seen.borrow_mut().push(request.clone());
            let (status, body) = self.replies.borrow_mut().remove(0);
            Ok(RawResponse {
                status,
                status_text: String::new(),
                body: body.to_string(),
            })
        }
    }

    fn key(id: &str, last_used: Option<&str>) -> ApiKey {
        ApiKey {
            key_id: id.to_string(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
            description: None,
            last_used: last_used.map(str::to_string),
        }
    }

    #[test]
    fn login_stores_access_token() {
        let transport =
            ScriptedTransport::new(vec![(200, r#"{"access_token":"jwt","token_type":"bearer"}"#)]);
        let client = BackendClient::new(&transport, "http://h");
        let mut session = MemorySessionStore::new();

        let token = client.login(&mut session, "a@b.c", "pw").unwrap();
        assert_eq!(token, "jwt");
        assert_eq!(session.get_token().as_deref(), Some("jwt"));

        let seen = transport.seen.borrow();
        assert_eq!(seen[0].url, "http://h/api/signin");
        assert!(seen[0].headers.iter().all(|(k, _)| k != "Authorization"));
        let body: Value = serde_json::from_str(seen[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"email": "a@b.c", "password": "pw"}));
    }

    #[test]
    fn failed_login_surfaces_detail_and_keeps_session() {
        let transport = ScriptedTransport::new(vec![(400, r#"{"detail":"Email already registered"}"#)]);
        let client = BackendClient::new(&transport, "http://h");
        let mut session = MemorySessionStore::new();

        let err = client.register(&mut session, "a@b.c", "pw").unwrap_err();
        assert_eq!(err.to_string(), "Email already registered");
        assert_eq!(session.get_token(), None);
    }

    #[test]
    fn key_calls_require_a_session() {
        let transport = ScriptedTransport::new(Vec::new());
        let client = BackendClient::new(&transport, "http://h");
        let err = client.list_keys(&MemorySessionStore::new()).unwrap_err();
        assert_eq!(err.to_string(), "Authentication required");
        assert!(transport.seen.borrow().is_empty());
    }

    #[test]
    fn key_management_uses_bearer_token() {
        let transport = ScriptedTransport::new(vec![
            (
                200,
                r#"[{"key_id":"k1","created_at":"2025-01-01T00:00:00Z","description":null,"last_used":null}]"#,
            ),
            (
                200,
                r#"{"key_id":"k2","api_key":"sk-new","created_at":"2025-01-02T00:00:00Z","description":"ci"}"#,
            ),
            (
                200,
                r#"{"key_id":"k2","api_key":"sk-rot","created_at":"2025-01-02T00:00:00Z","description":"ci"}"#,
            ),
            (204, ""),
        ]);
        let client = BackendClient::new(&transport, "http://h/");
        let session = MemorySessionStore::with_token("jwt");

        let keys = client.list_keys(&session).unwrap();
        assert_eq!(keys, vec![key("k1", None)]);

        let created = client.create_key(&session, Some("ci")).unwrap();
        assert_eq!(created.api_key.as_deref(), Some("sk-new"));

        let rotated = client.regenerate_key(&session, "k2").unwrap();
        assert_eq!(rotated.api_key.as_deref(), Some("sk-rot"));

        client.delete_key(&session, "k2").unwrap();

        let seen = transport.seen.borrow();
        let lines: Vec<String> = seen.iter().map(|r| format!("{} {}", r.method, r.url)).collect();
        assert_eq!(
            lines,
            [
                "GET http://h/api/api-keys",
                "POST http://h/api/api-keys",
                "POST http://h/api/api-keys/k2/regenerate",
                "DELETE http://h/api/api-keys/k2",
            ]
        );
        for request in seen.iter() {
            assert!(request
                .headers
                .contains(&("Authorization".to_string(), "Bearer jwt".to_string())));
        }
        assert_eq!(seen[1].body.as_deref(), Some(r#"{"description":"ci"}"#));
    }

    #[test]
    fn delete_ignores_non_json_success_body() {
        let transport = ScriptedTransport::new(vec![
            (200, "Deleted"),
            (404, r#"{"detail":"API key not found"}"#),
        ]);
        let client = BackendClient::new(&transport, "http://h");
        let session = MemorySessionStore::with_token("jwt");

        client.delete_key(&session, "k1").unwrap();
        let err = client.delete_key(&session, "k1").unwrap_err();
        assert_eq!(err.to_string(), "API key not found");
    }

    #[test]
    fn create_without_description_omits_the_field() {
        let transport = ScriptedTransport::new(vec![(
            200,
            r#"{"key_id":"k3","api_key":"sk","created_at":"2025-01-03T00:00:00Z","description":null}"#,
        )]);
        let client = BackendClient::new(&transport, "http://h");
        let session = MemorySessionStore::with_token("jwt");

        let created = client.create_key(&session, None).unwrap();
        assert_eq!(created.description, None);
        assert_eq!(transport.seen.borrow()[0].body.as_deref(), Some("{}"));
    }

    #[test]
    fn logout_clears_session() {
        let transport = ScriptedTransport::new(Vec::new());
        let client = BackendClient::new(&transport, "http://h");
        let mut session = MemorySessionStore::with_token("jwt");
        client.logout(&mut session).unwrap();
        assert_eq!(session.get_token(), None);
    }

    #[test]
    fn stats_pick_most_recent_use() {
        let stats = key_stats(&[
            key("a", Some("2025-03-01T10:00:00Z")),
            key("b", None),
            key("c", Some("2025-04-02T08:30:00.123456")),
            key("d", Some("garbage")),
        ]);
        assert_eq!(stats.total_keys, 4);
        assert_eq!(
            stats.last_used.unwrap().to_rfc3339(),
            "2025-04-02T08:30:00.123456+00:00"
        );

        let empty = key_stats(&[key("a", None)]);
        assert_eq!(empty.total_keys, 1);
        assert_eq!(empty.last_used, None);
    }
}
