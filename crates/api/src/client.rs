use std::sync::Arc;

use {
    secrecy::ExposeSecret,
    serde::de::DeserializeOwned,
    serde_json::Value,
    tracing::{debug, warn},
};

use {
    wxgate_common::{Clock, Error, Result, SystemClock},
    wxgate_config::{ClientConfig, Endpoints, TransportConfig, WxgateConfig},
};

use crate::{
    proxy::{ProxyRequest, RequestProxy, check_errcode},
    signature::{self, SignedPayload, WebhookQuery},
    store::CredentialStore,
    template::TemplateMessage,
    types::{
        AppTokenReply, CachedCredential, OAuthScope, TicketReply, UserToken, VALIDITY_WINDOW_SECS,
    },
    url_builder::UrlSpec,
};

const APP_TOKEN_PATH: &str = "/cgi-bin/token";
const TICKET_PATH: &str = "/cgi-bin/ticket/getticket";
const USER_TOKEN_PATH: &str = "/sns/oauth2/access_token";
const USER_REFRESH_PATH: &str = "/sns/oauth2/refresh_token";
const TEMPLATE_SEND_PATH: &str = "/cgi-bin/message/template/send";
const AUTHORIZE_PATH: &str = "/connect/oauth2/authorize";

/// Client for one platform application: owns the credential cache and signs
/// calls in both directions.
pub struct WechatClient {
    config: ClientConfig,
    endpoints: Endpoints,
    proxy: RequestProxy,
    store: CredentialStore,
    clock: Arc<dyn Clock>,
    validity_window: u64,
}

impl WechatClient {
    pub fn new(
        config: ClientConfig,
        transport: &TransportConfig,
        endpoints: Endpoints,
    ) -> Result<Self> {
        Ok(Self {
            config,
            endpoints,
            proxy: RequestProxy::new(transport)?,
            store: CredentialStore::new(),
            clock: Arc::new(SystemClock),
            validity_window: VALIDITY_WINDOW_SECS,
        })
    }

    pub fn from_config(cfg: WxgateConfig) -> Result<Self> {
        Self::new(cfg.client, &cfg.transport, cfg.endpoints)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_validity_window(mut self, secs: u64) -> Self {
        self.validity_window = secs;
        self
    }

    pub fn app_id(&self) -> &str {
        &self.config.app_id
    }

    fn api_url(&self, path: &str) -> UrlSpec {
        UrlSpec::new(&self.endpoints.scheme, &self.endpoints.api_host, path)
    }

    async fn fetch<T: DeserializeOwned>(&self, req: ProxyRequest, what: &str) -> Result<T> {
        let value = check_errcode(self.proxy.send(req).await?)?;
        serde_json::from_value(value).map_err(|e| {
            warn!(what, error = %e, "unexpected reply shape");
            Error::system(format!("{what}: {e}"))
        })
    }

    /// Application access token, served from cache while fresh.
    pub async fn get_app_token(&self) -> Result<String> {
        self.store
            .app_token
            .get_or_refresh(self.clock.as_ref(), self.validity_window, || async {
                let url = self
                    .api_url(APP_TOKEN_PATH)
                    .query("grant_type", "client_credential")
                    .query("appid", &self.config.app_id)
                    .query("secret", self.config.app_secret.expose_secret())
                    .build()?;
                let reply: AppTokenReply = self.fetch(ProxyRequest::get(url), "app token").await?;
                Ok::<_, Error>(reply.access_token)
            })
            .await
    }

    /// User token for an authorization code. Each code has its own cache entry.
    pub async fn get_user_token(&self, code: &str) -> Result<UserToken> {
        let slot = self.store.user_slot(code);
        let result = slot
            .get_or_refresh(self.clock.as_ref(), self.validity_window, || async {
                let url = self
                    .api_url(USER_TOKEN_PATH)
                    .query("appid", &self.config.app_id)
                    .query("secret", self.config.app_secret.expose_secret())
                    .query("code", code)
                    .query("grant_type", "authorization_code")
                    .build()?;
                self.fetch::<UserToken>(ProxyRequest::get(url), "user token").await
            })
            .await;
        if result.is_err() {
            drop(slot);
            self.store.release_user_slot(code);
        }
        result
    }

    /// Exchange a refresh token for a new user token. Always hits the network
    /// and does not touch the cache.
    pub async fn refresh_user_token(&self, openid: &str, refresh_token: &str) -> Result<UserToken> {
        let url = self
            .api_url(USER_REFRESH_PATH)
            .query("appid", &self.config.app_id)
            .query("grant_type", "refresh_token")
            .query("refresh_token", refresh_token)
            .build()?;
        let token: UserToken = self.fetch(ProxyRequest::get(url), "refresh user token").await?;
        if token.openid != openid {
            warn!(expected = openid, got = %token.openid, "refreshed token belongs to another openid");
        }
        Ok(token)
    }

    /// JS-API ticket. Refreshing it first makes sure the app token is fresh.
    pub async fn get_ticket(&self) -> Result<String> {
        self.store
            .ticket
            .get_or_refresh(self.clock.as_ref(), self.validity_window, || async {
                let access_token = self.get_app_token().await?;
                let url = self
                    .api_url(TICKET_PATH)
                    .query("access_token", access_token)
                    .query("type", "jsapi")
                    .build()?;
                let reply: TicketReply = self.fetch(ProxyRequest::get(url), "jsapi ticket").await?;
                Ok::<_, Error>(reply.ticket)
            })
            .await
    }

    /// Sign `target_url` for the JS-SDK.
    pub async fn sign_for_url(&self, target_url: &str) -> Result<SignedPayload> {
        let ticket = self.get_ticket().await?;
        let nonce_str = signature::nonce_str();
        let timestamp = self.clock.now_secs();
        let signature = signature::js_signature(&ticket, &nonce_str, timestamp, target_url)?;
        debug!(timestamp, "signed js-sdk url");
        Ok(SignedPayload {
            signature,
            nonce_str,
            timestamp,
            app_id: self.config.app_id.clone(),
        })
    }

    /// Check an inbound webhook call against the configured token.
    pub fn verify_webhook(&self, query: &WebhookQuery) -> bool {
        let token = self.config.webhook_token.expose_secret();
        if token.is_empty() {
            warn!("webhook token not configured, rejecting webhook call");
            return false;
        }
        let ok = signature::verify_webhook_signature(token, query);
        if !ok {
            debug!(timestamp = %query.timestamp, "webhook signature mismatch");
        }
        ok
    }

    /// Browser URL that starts the OAuth authorization flow.
    pub fn auth_url(&self, redirect_uri: &str, scope: OAuthScope) -> Result<String> {
        UrlSpec::new(&self.endpoints.scheme, &self.endpoints.open_host, AUTHORIZE_PATH)
            .query("appid", &self.config.app_id)
            .query("redirect_uri", redirect_uri)
            .query("response_type", "code")
            .query("scope", scope.as_str())
            .query("state", &self.config.state)
            .fragment("wechat_redirect")
            .build()
    }

    /// Send a template message; returns the platform's `msgid`.
    pub async fn send_template(&self, msg: &TemplateMessage) -> Result<i64> {
        let access_token = self.get_app_token().await?;
        let url = self
            .api_url(TEMPLATE_SEND_PATH)
            .query("access_token", access_token)
            .build()?;
        let req = ProxyRequest::post_json(url, msg.body());
        let reply = check_errcode(self.proxy.send(req).await?)?;
        reply
            .get("msgid")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::system("template send: missing msgid"))
    }

    pub async fn cached_app_token(&self) -> Option<CachedCredential<String>> {
        self.store.app_token.snapshot().await
    }

    pub async fn cached_ticket(&self) -> Option<CachedCredential<String>> {
        self.store.ticket.snapshot().await
    }

    pub async fn cached_user_token(&self, code: &str) -> Option<CachedCredential<UserToken>> {
        match self.store.existing_user_slot(code) {
            Some(slot) => slot.snapshot().await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        mockito::{Matcher, Server, ServerGuard},
        serde_json::json,
        wxgate_common::ManualClock,
    };

    fn client(server: &ServerGuard, clock: Arc<ManualClock>) -> WechatClient {
        WechatClient::new(
            ClientConfig::new("wx123", "secret", "hooktoken"),
            &TransportConfig::default(),
            Endpoints::local(&server.host_with_port()),
        )
        .unwrap()
        .with_clock(clock)
    }

    async fn mock_app_token(server: &mut ServerGuard, token: &str, hits: usize) -> mockito::Mock {
        server
            .mock("GET", APP_TOKEN_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credential".into()),
                Matcher::UrlEncoded("appid".into(), "wx123".into()),
                Matcher::UrlEncoded("secret".into(), "secret".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(json!({"access_token": token, "expires_in": 7200}).to_string())
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn app_token_fetched_once_for_back_to_back_calls() {
        let mut server = Server::new_async().await;
        let mock = mock_app_token(&mut server, "AT1", 1).await;
        let client = client(&server, Arc::new(ManualClock::new(1_000)));

        assert_eq!(client.get_app_token().await.unwrap(), "AT1");
        assert_eq!(client.get_app_token().await.unwrap(), "AT1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn app_token_refreshed_after_window() {
        let mut server = Server::new_async().await;
        let mock = mock_app_token(&mut server, "AT1", 2).await;
        let clock = Arc::new(ManualClock::new(0));
        let client = client(&server, Arc::clone(&clock));

        client.get_app_token().await.unwrap();
        clock.set(7199);
        client.get_app_token().await.unwrap();
        assert_eq!(client.cached_app_token().await.unwrap().acquired_at, 0);

        clock.set(7201);
        client.get_app_token().await.unwrap();
        assert_eq!(client.cached_app_token().await.unwrap().acquired_at, 7201);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_misses_issue_one_request() {
        let mut server = Server::new_async().await;
        let mock = mock_app_token(&mut server, "AT1", 1).await;
        let client = Arc::new(client(&server, Arc::new(ManualClock::new(0))));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.get_app_token().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "AT1");
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn platform_error_leaves_cache_empty() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", APP_TOKEN_PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"errcode":40013,"errmsg":"invalid appid"}"#)
            .create_async()
            .await;
        let client = client(&server, Arc::new(ManualClock::new(0)));

        let err = client.get_app_token().await.unwrap_err();
        assert_eq!(
            err,
            Error::Platform {
                errcode: 40013,
                errmsg: "invalid appid".into()
            }
        );
        assert!(client.cached_app_token().await.is_none());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_token() {
        let mut server = Server::new_async().await;
        let ok = mock_app_token(&mut server, "AT1", 1).await;
        let clock = Arc::new(ManualClock::new(0));
        let client = client(&server, Arc::clone(&clock));
        client.get_app_token().await.unwrap();
        ok.remove_async().await;

        let _m = server
            .mock("GET", APP_TOKEN_PATH)
            .match_query(Matcher::Any)
            .with_body("gateway timeout")
            .create_async()
            .await;
        clock.set(8_000);
        let err = client.get_app_token().await.unwrap_err();
        assert!(matches!(err, Error::System(_)));

        let kept = client.cached_app_token().await.unwrap();
        assert_eq!(kept.value, "AT1");
        assert_eq!(kept.acquired_at, 0);
    }

    #[tokio::test]
    async fn missing_access_token_field_is_system_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", APP_TOKEN_PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"expires_in":7200}"#)
            .create_async()
            .await;
        let client = client(&server, Arc::new(ManualClock::new(0)));
        assert!(matches!(client.get_app_token().await, Err(Error::System(_))));
    }

    #[tokio::test]
    async fn user_tokens_cached_per_code() {
        let mut server = Server::new_async().await;
        let mut mocks = Vec::new();
        for code in ["c1", "c2"] {
            mocks.push(
                server
                    .mock("GET", USER_TOKEN_PATH)
                    .match_query(Matcher::AllOf(vec![
                        Matcher::UrlEncoded("appid".into(), "wx123".into()),
                        Matcher::UrlEncoded("secret".into(), "secret".into()),
                        Matcher::UrlEncoded("code".into(), code.into()),
                        Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                    ]))
                    .with_body(
                        json!({
                            "access_token": format!("UAT-{code}"),
                            "expires_in": 7200,
                            "refresh_token": "RT",
                            "openid": format!("open-{code}"),
                            "scope": "snsapi_base",
                        })
                        .to_string(),
                    )
                    .expect(1)
                    .create_async()
                    .await,
            );
        }
        let client = client(&server, Arc::new(ManualClock::new(0)));

        let t1 = client.get_user_token("c1").await.unwrap();
        let t2 = client.get_user_token("c2").await.unwrap();
        let t1_again = client.get_user_token("c1").await.unwrap();

        assert_eq!(t1.access_token, "UAT-c1");
        assert_eq!(t2.openid, "open-c2");
        assert_eq!(t1, t1_again);
        assert!(client.cached_user_token("c1").await.is_some());
        assert!(client.cached_user_token("c3").await.is_none());
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn refresh_user_token_bypasses_cache() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", USER_REFRESH_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("appid".into(), "wx123".into()),
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "RT".into()),
            ]))
            .with_body(
                r#"{"access_token":"UAT2","expires_in":7200,"refresh_token":"RT","openid":"o1","scope":"snsapi_base"}"#,
            )
            .expect(2)
            .create_async()
            .await;
        let client = client(&server, Arc::new(ManualClock::new(0)));

        let first = client.refresh_user_token("o1", "RT").await.unwrap();
        let second = client.refresh_user_token("o1", "RT").await.unwrap();
        assert_eq!(first.access_token, "UAT2");
        assert_eq!(first, second);
        assert!(client.cached_user_token("RT").await.is_none());
        mock.assert_async().await;
    }

    async fn mock_ticket(server: &mut ServerGuard, hits: usize) -> mockito::Mock {
        server
            .mock("GET", TICKET_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("access_token".into(), "AT1".into()),
                Matcher::UrlEncoded("type".into(), "jsapi".into()),
            ]))
            .with_body(r#"{"errcode":0,"errmsg":"ok","ticket":"TICKET1","expires_in":7200}"#)
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn ticket_chains_through_app_token() {
        let mut server = Server::new_async().await;
        let token = mock_app_token(&mut server, "AT1", 1).await;
        let ticket = mock_ticket(&mut server, 1).await;
        let client = client(&server, Arc::new(ManualClock::new(0)));

        assert_eq!(client.get_ticket().await.unwrap(), "TICKET1");
        assert_eq!(client.get_ticket().await.unwrap(), "TICKET1");
        assert!(client.cached_app_token().await.is_some());
        token.assert_async().await;
        ticket.assert_async().await;
    }

    #[tokio::test]
    async fn ticket_failure_when_app_token_fails() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", APP_TOKEN_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        let ticket = mock_ticket(&mut server, 0).await;
        let client = client(&server, Arc::new(ManualClock::new(0)));

        assert!(client.get_ticket().await.is_err());
        assert!(client.cached_ticket().await.is_none());
        ticket.assert_async().await;
    }

    #[tokio::test]
    async fn sign_for_url_hides_ticket_and_url() {
        let mut server = Server::new_async().await;
        let _token = mock_app_token(&mut server, "AT1", 1).await;
        let _ticket = mock_ticket(&mut server, 1).await;
        let client = client(&server, Arc::new(ManualClock::new(1_414_587_457)));
        let page = "http://mp.weixin.qq.com?params=value";

        let a = client.sign_for_url(page).await.unwrap();
        let b = client.sign_for_url(page).await.unwrap();

        assert_eq!(a.app_id, "wx123");
        assert_eq!(a.timestamp, 1_414_587_457);
        assert_eq!(
            a.signature,
            signature::js_signature("TICKET1", &a.nonce_str, a.timestamp, page).unwrap()
        );
        assert_ne!(a.nonce_str, b.nonce_str);

        let json = serde_json::to_value(&a).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("jsapi_ticket"));
        assert!(!obj.contains_key("url"));
        assert!(!json.to_string().contains("TICKET1"));
    }

    #[tokio::test]
    async fn verify_webhook_uses_configured_token() {
        let server = Server::new_async().await;
        let client = client(&server, Arc::new(ManualClock::new(0)));
        let good = WebhookQuery {
            signature: signature::webhook_signature("hooktoken", "1700000000", "42"),
            timestamp: "1700000000".into(),
            nonce: "42".into(),
            echostr: Some("hello".into()),
        };
        assert!(client.verify_webhook(&good));

        let forged = WebhookQuery {
            signature: signature::webhook_signature("guess", "1700000000", "42"),
            ..good
        };
        assert!(!client.verify_webhook(&forged));
    }

    #[tokio::test]
    async fn failed_code_exchange_leaves_no_entry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", USER_TOKEN_PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"errcode":40029,"errmsg":"invalid code"}"#)
            .expect(20)
            .create_async()
            .await;
        let client = client(&server, Arc::new(ManualClock::new(0)));

        for i in 0..20 {
            let err = client.get_user_token(&format!("bad-{i}")).await.unwrap_err();
            assert!(err.is_auth());
        }
        assert_eq!(client.store.user_token_count(), 0);
        assert!(client.cached_user_token("bad-0").await.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_webhook_token_rejects_everything() {
        let client = WechatClient::new(
            ClientConfig::new("wx1", "s", ""),
            &TransportConfig::default(),
            Endpoints::default(),
        )
        .unwrap();
        let forged = WebhookQuery {
            signature: signature::webhook_signature("", "1700000000", "42"),
            timestamp: "1700000000".into(),
            nonce: "42".into(),
            echostr: None,
        };
        assert!(!client.verify_webhook(&forged));
    }

    #[test]
    fn auth_url_layout() {
        let client = WechatClient::new(
            ClientConfig::new("wx123", "secret", "tok").with_state("s1"),
            &TransportConfig::default(),
            Endpoints::default(),
        )
        .unwrap();
        let url = client
            .auth_url("https://app.example.com/cb", OAuthScope::UserInfo)
            .unwrap();
        assert_eq!(
            url,
            "https://open.weixin.qq.com/connect/oauth2/authorize?appid=wx123&redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb&response_type=code&scope=snsapi_userinfo&state=s1#wechat_redirect"
        );
    }

    #[tokio::test]
    async fn send_template_posts_json() {
        let mut server = Server::new_async().await;
        let _token = mock_app_token(&mut server, "AT1", 1).await;
        let msg = TemplateMessage {
            openid: "o1".into(),
            template_id: "tpl".into(),
            first: "hi".into(),
            ..Default::default()
        };
        let send = server
            .mock("POST", TEMPLATE_SEND_PATH)
            .match_query(Matcher::UrlEncoded("access_token".into(), "AT1".into()))
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(msg.body()))
            .with_body(r#"{"errcode":0,"errmsg":"ok","msgid":200228332}"#)
            .expect(1)
            .create_async()
            .await;
        let client = client(&server, Arc::new(ManualClock::new(0)));

        assert_eq!(client.send_template(&msg).await.unwrap(), 200228332);
        send.assert_async().await;
    }
}
