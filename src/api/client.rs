use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use url::Url;

use crate::api::commerce::{Order, OrderFilter, Page, Product, ProductFilter};
use crate::api::error::ApiError;
use crate::api::models::{
    Agent, AgentStatus, AgentSummary, ContactPresence, Conversation, Envelope, MessageKind,
    MessagePage, Notification, Presence, ServerMessage, TransferReceipt, TransferRecord,
};
use crate::sync::{MessageTransport, Outgoing};

/// Path of the Tanzanite REST namespace below the WordPress root.
const API_SEGMENTS: [&str; 3] = ["wp-json", "tanzanite", "v1"];

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Page size used by keyword searches over orders and products.
const SEARCH_PAGE_SIZE: u32 = 50;

/// Successful `/agent/login` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub token: String,
    pub agent: Agent,
}

/// A file picked for upload into a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub async fn from_path(path: &Path) -> Result<Self, ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.jpg")
            .to_string();
        let mime_type = mime_for(&file_name).to_string();
        Ok(Self { file_name, mime_type, bytes })
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub http: HttpClient,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: Self::site_root(base_url)?, token: None })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Accepts a bare host, a site URL, or a URL already pointing at the
    /// REST namespace, and returns the WordPress site root.
    fn site_root(base_url: &str) -> Result<Url, ApiError> {
        let normalized = crate::utils::normalize_url(base_url);
        let trimmed = normalized.trim_end_matches('/');
        let trimmed = trimmed
            .strip_suffix(&format!("/{}", API_SEGMENTS.join("/")))
            .unwrap_or(trimmed);
        Ok(Url::parse(&format!("{trimmed}/"))?)
    }

    fn url_under(&self, prefix: &[&str], segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(prefix)
            .extend(segments);
        Ok(url)
    }

    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        self.url_under(&API_SEGMENTS, segments)
    }

    pub(crate) fn endpoint_with(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Url, ApiError> {
        let mut url = self.endpoint(segments)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn with_auth(req: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    fn require_token(&self) -> Result<&str, ApiError> {
        self.token.as_deref().filter(|t| !t.is_empty()).ok_or(ApiError::NotAuthenticated)
    }

    async fn read_json(resp: reqwest::Response) -> Result<Value, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        Ok(resp.json::<Value>().await?)
    }

    async fn agent_get(&self, url: Url) -> Result<Envelope, ApiError> {
        let token = self.require_token()?;
        log::debug!("GET {url}");
        let resp = Self::with_auth(self.http.get(url), Some(token)).send().await?;
        Envelope::from_value(Self::read_json(resp).await?)
    }

    async fn agent_post(&self, url: Url, body: Option<Value>) -> Result<Envelope, ApiError> {
        let token = self.require_token()?;
        log::debug!("POST {url}");
        let mut req = Self::with_auth(self.http.post(url), Some(token));
        if let Some(body) = body {
            req = req.json(&body);
        }
        Envelope::from_value(Self::read_json(req.send().await?).await?)
    }

    /// Catalog endpoints take the bearer token when there is one.
    async fn catalog_get(&self, url: Url) -> Result<Value, ApiError> {
        log::debug!("GET {url}");
        let resp = Self::with_auth(self.http.get(url), self.token.as_deref()).send().await?;
        Self::read_json(resp).await
    }

    pub async fn login(
        &self,
        agent_id: &str,
        password: &str,
        device_info: &str,
    ) -> Result<LoginGrant, ApiError> {
        let url = self.endpoint(&["agent", "login"])?;
        let body = json!({
            "agent_id": agent_id,
            "password": password,
            "device_info": device_info,
        });
        let resp = self.http.post(url).json(&body).send().await?;
        let status = resp.status();
        // Failed logins still carry a `{success: false, message}` body.
        let value = match resp.json::<Value>().await {
            Ok(value) => value,
            Err(_) if !status.is_success() => return Err(ApiError::Status(status.as_u16())),
            Err(e) => return Err(e.into()),
        };
        let env = Envelope::from_value(value)?.into_result()?;
        let token = env.token.filter(|t| !t.is_empty()).ok_or(ApiError::MissingField("token"))?;
        let agent = env.agent.ok_or(ApiError::MissingField("agent"))?;
        Ok(LoginGrant { token, agent })
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["agent", "logout"])?;
        self.agent_post(url, None).await.map(|_| ())
    }

    pub async fn me(&self) -> Result<Agent, ApiError> {
        let url = self.endpoint(&["agent", "me"])?;
        let env = self.agent_get(url).await?.into_result()?;
        match env.agent.clone() {
            Some(agent) => Ok(agent),
            None => env.data_as::<Agent>(),
        }
    }

    pub async fn conversations(&self, status: &str, page: u32) -> Result<Vec<Conversation>, ApiError> {
        let url = self.endpoint_with(
            &["agent", "conversations"],
            &[("status", status.to_string()), ("page", page.to_string())],
        )?;
        let env = self.agent_get(url).await?.into_result()?;
        Ok(env.conversations.unwrap_or_default())
    }

    pub async fn messages(&self, conversation_id: &str, page: u64) -> Result<MessagePage, ApiError> {
        let url = self.endpoint_with(
            &["agent", "conversations", conversation_id, "messages"],
            &[("page", page.to_string())],
        )?;
        Ok(self.agent_get(url).await?.into_result()?.into_page())
    }

    pub async fn send_message(
        &self,
        conversation_id: &str,
        message: &str,
        kind: MessageKind,
        attachment_url: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        let url = self.endpoint(&["agent", "messages"])?;
        let body = json!({
            "conversation_id": conversation_id,
            "message": message,
            "message_type": kind.as_str(),
            "attachment_url": attachment_url,
        });
        self.agent_post(url, Some(body)).await?.into_result()
    }

    pub async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["agent", "messages", "read"])?;
        let body = json!({ "conversation_id": conversation_id });
        self.agent_post(url, Some(body)).await?.into_result().map(|_| ())
    }

    pub async fn transfer(
        &self,
        conversation_id: &str,
        to_agent_id: &str,
        note: &str,
    ) -> Result<TransferReceipt, ApiError> {
        let url = self.endpoint(&["agent", "conversations", conversation_id, "transfer"])?;
        let body = json!({ "to_agent_id": to_agent_id, "note": note });
        let env = self.agent_post(url, Some(body)).await?.into_result()?;
        Ok(env.data_as::<TransferReceipt>().unwrap_or_default())
    }

    pub async fn transfer_history(&self, conversation_id: &str) -> Result<Vec<TransferRecord>, ApiError> {
        let url = self.endpoint(&["agent", "conversations", conversation_id, "transfer-history"])?;
        let env = self.agent_get(url).await?.into_result()?;
        if env.data.is_none() {
            return Ok(Vec::new());
        }
        env.data_as()
    }

    /// Every agent known to the customer-service plugin. This is the public
    /// visitor-side listing, so no token is sent, but a session is required.
    pub async fn agents(&self) -> Result<Vec<AgentSummary>, ApiError> {
        self.require_token()?;
        let url = self.endpoint(&["customer-service", "agents"])?;
        log::debug!("GET {url}");
        let resp = self.http.get(url).send().await?;
        let env = Envelope::from_value(Self::read_json(resp).await?)?.into_result()?;
        env.data_as()
    }

    pub async fn online_agents(&self) -> Result<Vec<AgentSummary>, ApiError> {
        let url = self.endpoint(&["agent", "online-agents"])?;
        self.agent_get(url).await?.into_result()?.data_as()
    }

    /// Online agents first, falling back to the full listing.
    pub async fn transfer_candidates(&self) -> Result<Vec<AgentSummary>, ApiError> {
        match self.online_agents().await {
            Ok(list) => Ok(list),
            Err(e) => {
                log::warn!("Online agent list unavailable ({e}), falling back to all agents");
                self.agents().await
            }
        }
    }

    pub async fn update_status(&self, status: AgentStatus) -> Result<(), ApiError> {
        let url = self.endpoint(&["agent", "status"])?;
        let body = json!({ "status": status.as_str() });
        self.agent_post(url, Some(body)).await?.into_result().map(|_| ())
    }

    pub async fn notifications(&self, unread_only: bool) -> Result<Vec<Notification>, ApiError> {
        let query = if unread_only { vec![("unread_only", "true".to_string())] } else { Vec::new() };
        let url = self.endpoint_with(&["agent", "notifications"], &query)?;
        let env = self.agent_get(url).await?.into_result()?;
        if env.data.is_none() {
            return Ok(Vec::new());
        }
        env.data_as()
    }

    pub async fn mark_notification_read(&self, notification_id: u64) -> Result<(), ApiError> {
        let id = notification_id.to_string();
        let url = self.endpoint(&["agent", "notifications", &id, "read"])?;
        self.agent_post(url, None).await?.into_result().map(|_| ())
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["agent", "notifications", "read-all"])?;
        self.agent_post(url, None).await?.into_result().map(|_| ())
    }

    /// Multipart upload; returns the public URL of the stored file.
    pub async fn upload(&self, conversation_id: &str, attachment: Attachment) -> Result<String, ApiError> {
        let token = self.require_token()?;
        let url = self.endpoint(&["agent", "upload"])?;
        let part = Part::bytes(attachment.bytes)
            .file_name(attachment.file_name)
            .mime_str(&attachment.mime_type)?;
        let form = Form::new()
            .part("file", part)
            .text("conversation_id", conversation_id.to_string());
        log::debug!("POST {url} (multipart)");
        let resp = Self::with_auth(self.http.post(url), Some(token)).multipart(form).send().await?;
        let env = Envelope::from_value(Self::read_json(resp).await?)?;
        uploaded_url(&env).ok_or_else(|| match env.error_text() {
            Some(text) => ApiError::Rejected(text),
            None => ApiError::MissingField("url"),
        })
    }

    pub async fn orders(&self, page: u32, per_page: u32, filter: &OrderFilter) -> Result<Page<Order>, ApiError> {
        let mut query = vec![("page", page.to_string()), ("per_page", per_page.to_string())];
        query.extend(filter.query_pairs());
        let url = self.endpoint_with(&["orders"], &query)?;
        Ok(serde_json::from_value(self.catalog_get(url).await?)?)
    }

    pub async fn order_detail(&self, order_id: u64) -> Result<Order, ApiError> {
        let id = order_id.to_string();
        let url = self.endpoint(&["orders", &id])?;
        let mut value = self.catalog_get(url).await?;
        let order = value.get_mut("order").map(Value::take).ok_or(ApiError::MissingField("order"))?;
        Ok(serde_json::from_value(order)?)
    }

    pub async fn search_orders(&self, keyword: &str) -> Result<Vec<Order>, ApiError> {
        Ok(self.orders(1, SEARCH_PAGE_SIZE, &OrderFilter::keyword(keyword)).await?.items)
    }

    pub async fn products(&self, page: u32, per_page: u32, filter: &ProductFilter) -> Result<Page<Product>, ApiError> {
        let mut query = vec![("page", page.to_string()), ("per_page", per_page.to_string())];
        query.extend(filter.query_pairs());
        let url = self.endpoint_with(&["products"], &query)?;
        Ok(serde_json::from_value(self.catalog_get(url).await?)?)
    }

    pub async fn product_detail(&self, product_id: u64) -> Result<Product, ApiError> {
        let id = product_id.to_string();
        let url = self.endpoint(&["products", &id])?;
        let mut value = self.catalog_get(url).await?;
        let product = value.get_mut("product").map(Value::take).ok_or(ApiError::MissingField("product"))?;
        Ok(serde_json::from_value(product)?)
    }

    pub async fn search_products(&self, keyword: &str) -> Result<Vec<Product>, ApiError> {
        Ok(self.products(1, SEARCH_PAGE_SIZE, &ProductFilter::search(keyword)).await?.items)
    }

    /// Visitor presence for one conversation. Presence is decoration, so any
    /// failure is logged and reported as unknown.
    pub async fn chat_presence(&self, chat_id: &str) -> Option<Presence> {
        let result = async {
            let mut url = self.url_under(&["api", "chat", "status"], &[])?;
            url.query_pairs_mut().append_pair("chatId", chat_id);
            let value = Self::read_json(self.http.get(url).send().await?).await?;
            Ok::<_, ApiError>(serde_json::from_value::<Presence>(value).ok())
        }
        .await;
        result.unwrap_or_else(|e| {
            log::warn!("[heartbeat] presence for {chat_id} failed: {e}");
            None
        })
    }

    pub async fn batch_presence(&self, user_id: &str) -> Vec<ContactPresence> {
        let result = async {
            let mut url = self.url_under(&["api", "chat", "heartbeat"], &[])?;
            url.query_pairs_mut().append_pair("uid", user_id);
            let mut value = Self::read_json(self.http.get(url).send().await?).await?;
            let contacts = value.get_mut("contacts").map(Value::take).unwrap_or(Value::Null);
            Ok::<_, ApiError>(serde_json::from_value::<Vec<ContactPresence>>(contacts).unwrap_or_default())
        }
        .await;
        result.unwrap_or_else(|e| {
            log::warn!("[heartbeat] batch presence failed: {e}");
            Vec::new()
        })
    }
}

fn uploaded_url(env: &Envelope) -> Option<String> {
    env.url
        .clone()
        .or_else(|| {
            env.data
                .as_ref()
                .and_then(|d| d.get("url"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .filter(|u| !u.is_empty())
}

#[async_trait]
impl MessageTransport for ApiClient {
    async fn fetch_messages(&self, conversation_id: &str, page: u64) -> Result<MessagePage, ApiError> {
        self.messages(conversation_id, page).await
    }

    async fn send_message(&self, conversation_id: &str, outgoing: &Outgoing) -> Result<ServerMessage, ApiError> {
        let env = ApiClient::send_message(
            self,
            conversation_id,
            &outgoing.text,
            outgoing.kind,
            outgoing.attachment_url.as_deref(),
        )
        .await?;
        env.sent_message().cloned().ok_or(ApiError::MissingField("message"))
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError> {
        ApiClient::mark_read(self, conversation_id).await
    }

    async fn upload(&self, conversation_id: &str, attachment: Attachment) -> Result<String, ApiError> {
        ApiClient::upload(self, conversation_id, attachment).await
    }

    async fn transfer(&self, conversation_id: &str, to_agent_id: &str, note: &str) -> Result<TransferReceipt, ApiError> {
        ApiClient::transfer(self, conversation_id, to_agent_id, note).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::sync::{MessageId, MessageSync, SendOutcome};
    use crate::test_support::{serve_once, serve_once_with};

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base).expect("client should build")
    }

    #[test]
    fn bare_host_gets_https_and_namespace() {
        let api = client("shop.example.com");
        let url = api.endpoint(&["agent", "me"]).expect("url");
        assert_eq!(url.as_str(), "https://shop.example.com/wp-json/tanzanite/v1/agent/me");
    }

    #[test]
    fn namespace_suffix_is_not_doubled() {
        let api = client("https://shop.example.com/blog/wp-json/tanzanite/v1/");
        assert_eq!(api.base_url().as_str(), "https://shop.example.com/blog/");
        let url = api.endpoint(&["orders"]).expect("url");
        assert_eq!(url.as_str(), "https://shop.example.com/blog/wp-json/tanzanite/v1/orders");
    }

    #[test]
    fn conversation_ids_are_escaped_as_one_segment() {
        let api = client("http://localhost:8080");
        let url = api
            .endpoint_with(&["agent", "conversations", "conv 1/2", "messages"], &[("page", "3".into())])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/wp-json/tanzanite/v1/agent/conversations/conv%201%2F2/messages?page=3"
        );
    }

    #[test]
    fn order_query_carries_filters() {
        let api = client("https://shop.example.com");
        let mut query = vec![("page", "1".to_string()), ("per_page", "50".to_string())];
        query.extend(OrderFilter::keyword("li wei").query_pairs());
        let url = api.endpoint_with(&["orders"], &query).expect("url");
        assert_eq!(url.query(), Some("page=1&per_page=50&customer_keyword=li+wei"));
    }

    #[tokio::test]
    async fn agent_calls_without_token_fail_fast() {
        let api = client("https://shop.example.com");
        assert!(matches!(api.me().await, Err(ApiError::NotAuthenticated)));
        assert!(matches!(api.messages("c1", 1).await, Err(ApiError::NotAuthenticated)));
        assert!(matches!(api.agents().await, Err(ApiError::NotAuthenticated)));
    }

    #[test]
    fn upload_url_is_read_from_either_location() {
        let top = Envelope { url: Some("https://cdn/a.jpg".into()), ..Envelope::default() };
        assert_eq!(uploaded_url(&top).as_deref(), Some("https://cdn/a.jpg"));

        let nested = Envelope { data: Some(json!({ "url": "https://cdn/b.png" })), ..Envelope::default() };
        assert_eq!(uploaded_url(&nested).as_deref(), Some("https://cdn/b.png"));

        assert_eq!(uploaded_url(&Envelope::default()), None);
    }

    #[tokio::test]
    async fn order_search_asks_for_first_page_of_fifty() {
        let (base, server) = serve_once(
            r#"{"items":[{"id":"12","order_number":"1012","customer_name":"Li Wei","status":"processing","total":"88.50"}],"total":1,"page":1,"per_page":50,"total_pages":1}"#,
        );
        let orders = client(&base).search_orders("li wei").await.expect("orders");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, 12);
        assert_eq!(orders[0].total, 88.5);

        let head = server.join().expect("server");
        assert!(head.starts_with("GET /wp-json/tanzanite/v1/orders?page=1&per_page=50&customer_keyword=li+wei "));
        assert!(!head.to_ascii_lowercase().contains("authorization:"));
    }

    #[tokio::test]
    async fn product_search_sends_bearer_when_logged_in() {
        let (base, server) = serve_once(r#"{"items":[{"id":7,"name":"Blue mug","price":"12"}],"page":1,"total_pages":1}"#);
        let products = client(&base).with_token("tok-1").search_products("mug").await.expect("products");
        assert_eq!(products[0].name, "Blue mug");

        let head = server.join().expect("server");
        assert!(head.starts_with("GET /wp-json/tanzanite/v1/products?page=1&per_page=50&search=mug "));
        assert!(head.to_ascii_lowercase().contains("authorization: bearer tok-1"));
    }

    #[tokio::test]
    async fn notification_read_posts_to_its_own_path() {
        let (base, server) = serve_once(r#"{"success":true}"#);
        client(&base).with_token("tok-1").mark_notification_read(42).await.expect("marked");
        let head = server.join().expect("server");
        assert!(head.starts_with("POST /wp-json/tanzanite/v1/agent/notifications/42/read "));
    }

    #[tokio::test]
    async fn rejected_reply_carries_server_text() {
        let (base, server) = serve_once(r#"{"success":false,"message":"Notification not found"}"#);
        let err = client(&base).with_token("tok-1").mark_notification_read(9).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "Notification not found"));
        server.join().expect("server");
    }

    #[tokio::test]
    async fn batch_presence_reads_contacts() {
        let (base, server) = serve_once(r#"{"contacts":[{"id":5,"online":true,"lastSeen":1700000000000}]}"#);
        let contacts = client(&base).batch_presence("agent-3").await;
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].id, "5");
        assert!(contacts[0].online);

        let head = server.join().expect("server");
        assert!(head.starts_with("GET /api/chat/heartbeat?uid=agent-3 "));
    }

    #[tokio::test]
    async fn presence_failure_is_unknown() {
        // Nothing listens on the discard port.
        let api = ApiClient::with_timeout("http://127.0.0.1:9", Duration::from_millis(500)).expect("client");
        assert_eq!(api.chat_presence("c1").await, None);
        assert!(api.batch_presence("u1").await.is_empty());
    }

    #[tokio::test]
    async fn login_failure_keeps_server_message() {
        let (base, server) = serve_once_with("401 Unauthorized", r#"{"success":false,"message":"Wrong password"}"#);
        let err = client(&base).login("a7", "nope", "desktop").await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "Wrong password"));

        let head = server.join().expect("server");
        assert!(head.starts_with("POST /wp-json/tanzanite/v1/agent/login "));
    }

    #[tokio::test]
    async fn login_without_token_is_missing_field() {
        let (base, server) = serve_once(r#"{"success":true,"agent":{"agent_id":"a7"}}"#);
        let err = client(&base).login("a7", "pw", "desktop").await.unwrap_err();
        assert!(matches!(err, ApiError::MissingField("token")));
        server.join().expect("server");
    }

    #[tokio::test]
    async fn send_ack_without_message_rolls_back() {
        let (base, server) = serve_once(r#"{"success":true,"message":"sent"}"#);
        let api = Arc::new(client(&base).with_token("tok-1"));
        let (sync, _events) = MessageSync::new(api, "c1");

        let err = sync.send("hello").await.unwrap_err();
        assert!(matches!(err, ApiError::MissingField("message")));
        assert!(sync.messages().is_empty());
        assert!(!sync.is_sending());

        let head = server.join().expect("server");
        assert!(head.starts_with("POST /wp-json/tanzanite/v1/agent/messages "));
    }

    #[tokio::test]
    async fn rejected_send_rolls_back() {
        let (base, server) = serve_once(r#"{"success":false,"message":"Conversation is closed"}"#);
        let api = Arc::new(client(&base).with_token("tok-1"));
        let (sync, _events) = MessageSync::new(api, "c1");

        let err = sync.send("hello").await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "Conversation is closed"));
        assert!(sync.messages().is_empty());
        server.join().expect("server");
    }

    #[tokio::test]
    async fn acknowledged_send_takes_server_id() {
        let (base, server) = serve_once(
            r#"{"success":true,"message":{"id":"311","conversation_id":"c1","sender_type":"agent","message":"hello","created_at":"2025-03-04 10:15:00"}}"#,
        );
        let api = Arc::new(client(&base).with_token("tok-1"));
        let (sync, _events) = MessageSync::new(api, "c1");

        let outcome = sync.send("hello").await.expect("sent");
        assert_eq!(outcome, SendOutcome::Confirmed(MessageId::Confirmed(311)));
        let list = sync.messages();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, MessageId::Confirmed(311));
        assert_eq!(list[0].time, "10:15");
        server.join().expect("server");
    }

    #[test]
    fn guesses_mime_from_extension() {
        assert_eq!(mime_for("IMG_0001.JPG"), "image/jpeg");
        assert_eq!(mime_for("invoice.pdf"), "application/pdf");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }
}
