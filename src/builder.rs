use anyhow::{Result, anyhow};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::catalog::{EndpointCatalog, EndpointDescriptor, HttpMethod};
use crate::client::{Transport, decode_response};
use crate::codegen::{self, Language};
use crate::error::ConsoleError;
use crate::params::{join_url, render_path, render_query};
use crate::session::SessionStore;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Exactly what goes on the wire. Both the live sender and the snippet
/// renderers are fed from this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveResult {
    Success(Value),
    Failure(String),
}

impl LiveResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Per-session explorer state. Never written anywhere.
#[derive(Debug, Clone)]
pub struct RequestDraft<'a> {
    pub selected_endpoint: &'a EndpointDescriptor,
    pub param_values: BTreeMap<String, String>,
    pub body_override: Option<String>,
    pub auth_token: String,
    pub target_language: Language,
}

pub struct RequestBuilder<'a> {
    catalog: &'a EndpointCatalog,
    base_url: String,
    draft: RequestDraft<'a>,
    live_result: Option<LiveResult>,
}

impl<'a> RequestBuilder<'a> {
    /// Starts on the catalog's default endpoint, seeding the token from the session.
    pub fn new(
        catalog: &'a EndpointCatalog,
        base_url: impl Into<String>,
        session: &dyn SessionStore,
    ) -> Result<Self> {
        let selected_endpoint = catalog
            .default_endpoint()
            .ok_or_else(|| anyhow!("endpoint catalog is empty"))?;
        Ok(Self {
            catalog,
            base_url: base_url.into(),
            draft: RequestDraft {
                selected_endpoint,
                param_values: BTreeMap::new(),
                body_override: None,
                auth_token: session.get_token().unwrap_or_default(),
                target_language: Language::default(),
            },
            live_result: None,
        })
    }

    pub fn draft(&self) -> &RequestDraft<'a> {
        &self.draft
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn live_result(&self) -> Option<&LiveResult> {
        self.live_result.as_ref()
    }

    pub fn select_endpoint(&mut self, endpoint: &'a EndpointDescriptor) {
        self.draft.selected_endpoint = endpoint;
        self.draft.param_values.clear();
        self.draft.body_override = None;
        self.live_result = None;
    }

    /// Resolves the selection through the catalog by path and method.
    pub fn select(&mut self, path: &str, method: HttpMethod) -> Result<()> {
        let endpoint = self
            .catalog
            .find(path, method)
            .ok_or_else(|| anyhow!("unknown endpoint {method} {path}"))?;
        self.select_endpoint(endpoint);
        Ok(())
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.draft.param_values.insert(name.into(), value.into());
    }

    pub fn clear_param(&mut self, name: &str) {
        self.draft.param_values.remove(name);
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.draft.body_override = Some(body.into());
    }

    pub fn set_auth_token(&mut self, token: impl Into<String>) {
        self.draft.auth_token = token.into();
    }

    pub fn set_target_language(&mut self, language: Language) {
        self.draft.target_language = language;
    }

    /// Path with placeholders substituted, followed by any set query parameters.
    pub fn build_url(&self) -> String {
        let endpoint = self.draft.selected_endpoint;
        let path_values: BTreeMap<String, String> = endpoint
            .path_params
            .iter()
            .filter_map(|name| {
                self.draft
                    .param_values
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();
        let path = render_path(&endpoint.path, &path_values);
        let query = render_query(
            endpoint.query_params.iter().map(String::as_str),
            &self.draft.param_values,
        );
        format!("{path}{query}")
    }

    pub fn full_url(&self) -> String {
        join_url(&self.base_url, &self.build_url())
    }

    pub fn build_headers(&self) -> Vec<(String, String)> {
        let token = &self.draft.auth_token;
        let auth = if self
            .catalog
            .requires_bearer_auth(&self.draft.selected_endpoint.path)
        {
            ("Authorization".to_string(), format!("Bearer {token}"))
        } else {
            ("x-api-key".to_string(), token.clone())
        };
        vec![
            ("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string()),
            auth,
        ]
    }

    /// Body text for non-GET methods: the edited body if any, else the template.
    /// A body edited down to whitespace sends nothing.
    pub fn body(&self) -> Option<String> {
        let endpoint = self.draft.selected_endpoint;
        if !endpoint.method.sends_body() {
            return None;
        }
        match &self.draft.body_override {
            Some(text) if text.trim().is_empty() => None,
            Some(text) => Some(text.clone()),
            None => endpoint.request_body.clone(),
        }
    }

    pub fn prepare(&self) -> PreparedRequest {
        PreparedRequest {
            method: self.draft.selected_endpoint.method,
            url: self.full_url(),
            headers: self.build_headers(),
            body: self.body(),
        }
    }

    pub fn is_sendable(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<(), ConsoleError> {
        if self.draft.auth_token.is_empty() {
            return Err(ConsoleError::Validation(
                "an auth token or API key is required".to_string(),
            ));
        }
        let missing: Vec<&str> = self
            .draft
            .selected_endpoint
            .path_params
            .iter()
            .filter(|name| {
                self.draft
                    .param_values
                    .get(name.as_str())
                    .is_none_or(|value| value.is_empty())
            })
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ConsoleError::Validation(format!(
                "missing path parameter: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Fires the draft. Validation failures are returned and nothing is sent;
    /// every other failure lands in the live result, replacing the previous one.
    pub fn send(&mut self, transport: &dyn Transport) -> Result<&LiveResult, ConsoleError> {
        self.validate()?;
        let request = self.prepare();
        let result = match transport
            .execute(&request)
            .and_then(|resp| decode_response(&resp))
        {
            Ok(value) => LiveResult::Success(value),
            Err(err) => {
                log::warn!("{} {} failed: {err}", request.method, request.url);
                LiveResult::Failure(err.to_string())
            }
        };
        Ok(&*self.live_result.insert(result))
    }

    /// Snippet for the draft's current target language.
    pub fn snippet(&self) -> String {
        codegen::generate(&self.prepare(), self.draft.target_language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::load_catalog;
    use crate::client::RawResponse;
    use crate::session::MemorySessionStore;
    use std::cell::RefCell;

    struct FakeTransport {
        response: Result<RawResponse, ConsoleError>,
        seen: RefCell<Vec<PreparedRequest>>,
    }

    impl FakeTransport {
        fn replying(status: u16, status_text: &str, body: &str) -> Self {
            Self {
                response: Ok(RawResponse {
                    status,
                    status_text: status_text.to_string(),
                    body: body.to_string(),
                }),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                response: Err(ConsoleError::Transport(message.to_string())),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for FakeTransport {
        fn execute(&self, request: &PreparedRequest) -> Result<RawResponse, ConsoleError> {
            self.seen.borrow_mut().push(request.clone());
            self.response.clone()
        }
    }

    fn builder(catalog: &EndpointCatalog) -> RequestBuilder<'_> {
        RequestBuilder::new(catalog, "http://localhost:8000", &MemorySessionStore::new()).unwrap()
    }

    #[test]
    fn starts_on_first_endpoint_of_first_category() {
        let catalog = load_catalog().unwrap();
        let b = builder(&catalog);
        assert_eq!(
            b.draft().selected_endpoint.path,
            "/api/thread/{thread_id}/agent/start"
        );
        assert!(b.draft().auth_token.is_empty());
    }

    #[test]
    fn token_is_seeded_from_session() {
        let catalog = load_catalog().unwrap();
        let session = MemorySessionStore::with_token("tok");
        let b = RequestBuilder::new(&catalog, "http://h", &session).unwrap();
        assert_eq!(b.draft().auth_token, "tok");
    }

    #[test]
    fn build_url_substitutes_path_params() {
        let catalog = load_catalog().unwrap();
        let mut b = builder(&catalog);
        b.select("/api/thread/{thread_id}/agent/start", HttpMethod::Post)
            .unwrap();
        assert_eq!(b.build_url(), "/api/thread/{thread_id}/agent/start");
        b.set_param("thread_id", "abc123");
        assert_eq!(b.build_url(), "/api/thread/abc123/agent/start");
        assert_eq!(
            b.full_url(),
            "http://localhost:8000/api/thread/abc123/agent/start"
        );
    }

    #[test]
    fn build_url_appends_set_query_params() {
        let catalog = load_catalog().unwrap();
        let mut b = builder(&catalog);
        b.select("/api/thread/{thread_id}/agent-runs", HttpMethod::Get)
            .unwrap();
        b.set_param("thread_id", "t1");
        b.set_param("offset", "20");
        assert_eq!(b.build_url(), "/api/thread/t1/agent-runs?offset=20");
    }

    #[test]
    fn header_policy_splits_bearer_and_api_key() {
        let catalog = load_catalog().unwrap();
        let mut b = builder(&catalog);
        b.set_auth_token("T");

        b.select("/api/signin", HttpMethod::Post).unwrap();
        let headers = b.build_headers();
        assert!(headers.contains(&("Authorization".into(), "Bearer T".into())));
        assert!(headers.iter().all(|(k, _)| k != "x-api-key"));
        assert!(headers.contains(&("Content-Type".into(), "application/json".into())));

        b.select("/api/thread/{thread_id}/agent/start", HttpMethod::Post)
            .unwrap();
        let headers = b.build_headers();
        assert!(headers.contains(&("x-api-key".into(), "T".into())));
        assert!(headers.iter().all(|(k, _)| k != "Authorization"));
    }

    #[test]
    fn select_endpoint_resets_draft_and_result() {
        let catalog = load_catalog().unwrap();
        let mut b = builder(&catalog);
        b.set_auth_token("T");
        b.set_param("thread_id", "abc");
        b.set_body("{}");
        let transport = FakeTransport::replying(200, "OK", "{}");
        b.send(&transport).unwrap();
        assert!(b.live_result().is_some());

        b.select("/api/health", HttpMethod::Get).unwrap();
        assert!(b.draft().param_values.is_empty());
        assert!(b.draft().body_override.is_none());
        assert!(b.live_result().is_none());
        assert_eq!(b.draft().auth_token, "T");
    }

    #[test]
    fn sendable_requires_token_and_path_params() {
        let catalog = load_catalog().unwrap();
        let mut b = builder(&catalog);
        b.select("/api/thread/{thread_id}/agent/start", HttpMethod::Post)
            .unwrap();
        b.set_param("thread_id", "abc");
        assert!(!b.is_sendable());

        b.set_auth_token("T");
        assert!(b.is_sendable());

        b.set_param("thread_id", "");
        assert!(!b.is_sendable());
        assert!(b.validate().unwrap_err().to_string().contains("thread_id"));
    }

    #[test]
    fn unsendable_draft_is_not_transmitted() {
        let catalog = load_catalog().unwrap();
        let mut b = builder(&catalog);
        let transport = FakeTransport::replying(200, "OK", "{}");
        let err = b.send(&transport).unwrap_err();
        assert!(err.is_validation());
        assert!(transport.seen.borrow().is_empty());
        assert!(b.live_result().is_none());
    }

    #[test]
    fn body_only_for_non_get_and_override_wins() {
        let catalog = load_catalog().unwrap();
        let mut b = builder(&catalog);
        b.select("/api/signin", HttpMethod::Post).unwrap();
        assert_eq!(b.body(), catalog.find("/api/signin", HttpMethod::Post).unwrap().request_body);

        b.set_body(r#"{"email":"a@b.c","password":"x"}"#);
        assert_eq!(b.body().as_deref(), Some(r#"{"email":"a@b.c","password":"x"}"#));

        b.set_body("   ");
        assert_eq!(b.body(), None);

        b.select("/api/api-keys", HttpMethod::Get).unwrap();
        b.set_body("{}");
        assert_eq!(b.body(), None);
    }

    #[test]
    fn send_stores_success_and_transmits_prepared_request() {
        let catalog = load_catalog().unwrap();
        let mut b = builder(&catalog);
        b.set_auth_token("T");
        b.set_param("thread_id", "abc123");
        let transport = FakeTransport::replying(200, "OK", r#"{"success":true}"#);

        let result = b.send(&transport).unwrap().clone();
        assert_eq!(result, LiveResult::Success(serde_json::json!({"success": true})));
        assert_eq!(transport.seen.borrow()[0], b.prepare());
    }

    #[test]
    fn send_surfaces_detail_and_fallback_messages() {
        let catalog = load_catalog().unwrap();
        let mut b = builder(&catalog);
        b.set_auth_token("T");
        b.set_param("thread_id", "abc123");

        let transport = FakeTransport::replying(401, "Unauthorized", r#"{"detail":"Invalid key"}"#);
        assert_eq!(
            b.send(&transport).unwrap(),
            &LiveResult::Failure("Invalid key".to_string())
        );

        let transport = FakeTransport::replying(404, "Not Found", "{}");
        assert_eq!(
            b.send(&transport).unwrap(),
            &LiveResult::Failure("API error: 404 Not Found".to_string())
        );
    }

    #[test]
    fn transport_failure_replaces_previous_result() {
        let catalog = load_catalog().unwrap();
        let mut b = builder(&catalog);
        b.set_auth_token("T");
        b.set_param("thread_id", "abc123");

        b.send(&FakeTransport::replying(200, "OK", "{}")).unwrap();
        let result = b.send(&FakeTransport::failing("connection refused")).unwrap();
        assert_eq!(
            result,
            &LiveResult::Failure("request failed: connection refused".to_string())
        );
        assert!(!b.live_result().unwrap().is_success());
    }
}
