//! Bot Framework connector: POST reply activities to the channel's serviceUrl.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::channels::activity::ConversationRef;
use crate::channels::{MessageSender, TransportError};
use crate::message::OutboundMessage;

const DEFAULT_AUTH_BASE: &str = "https://login.microsoftonline.com";
const DEFAULT_TENANT: &str = "botframework.com";
const CONNECTOR_SCOPE: &str = "https://api.botframework.com/.default";
/// Refresh this long before the token actually expires.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);
/// Lifetime assumed when the token response has no `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Hosts (and their subdomains) that may receive the bot's connector token.
pub const DEFAULT_TRUSTED_SERVICE_HOSTS: &[&str] = &[
    "botframework.com",
    "botframework.us",
    "botframework.azure.us",
    "smba.trafficmanager.net",
    "smba.infra.gcc.teams.microsoft.com",
];

/// Bot app registration used for client-credentials tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCredentials {
    pub app_id: String,
    pub app_password: String,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Sends activities to the connector REST API. Without credentials no Authorization header is sent (emulator).
///
/// With credentials, replies only go to service URLs on the trusted host list.
pub struct BotConnector {
    client: reqwest::Client,
    credentials: Option<AppCredentials>,
    auth_base: String,
    trusted_hosts: Vec<String>,
    token: RwLock<Option<CachedToken>>,
}

impl BotConnector {
    pub fn new(credentials: Option<AppCredentials>) -> Self {
        Self::with_auth_base(credentials, None)
    }

    /// Override the login authority (tests, sovereign clouds).
    pub fn with_auth_base(credentials: Option<AppCredentials>, auth_base: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            auth_base: auth_base
                .map(|b| b.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_AUTH_BASE.to_string()),
            trusted_hosts: DEFAULT_TRUSTED_SERVICE_HOSTS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            token: RwLock::new(None),
        }
    }

    /// Replace the trusted service hosts. Entries match the host itself or any subdomain;
    /// a leading `*.` is accepted.
    pub fn with_trusted_hosts(mut self, hosts: Vec<String>) -> Self {
        self.trusted_hosts = hosts
            .iter()
            .map(|h| h.trim().trim_start_matches("*.").trim_end_matches('.').to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        self
    }

    fn is_trusted(&self, url: &reqwest::Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.trusted_hosts.iter().any(|t| {
            host == *t
                || host
                    .strip_suffix(t.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }

    fn token_url(&self, creds: &AppCredentials) -> String {
        let tenant = creds
            .tenant_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TENANT);
        format!("{}/{}/oauth2/v2.0/token", self.auth_base, tenant)
    }

    /// Bearer token for the connector, fetched on first use and cached until near expiry.
    async fn bearer(&self) -> Result<Option<String>, TransportError> {
        let Some(ref creds) = self.credentials else {
            return Ok(None);
        };
        {
            let cached = self.token.read().await;
            if let Some(ref t) = *cached {
                if Instant::now() < t.expires_at {
                    return Ok(Some(t.value.clone()));
                }
            }
        }
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", creds.app_id.as_str()),
            ("client_secret", creds.app_password.as_str()),
            ("scope", CONNECTOR_SCOPE),
        ];
        let res = self
            .client
            .post(self.token_url(creds))
            .form(&form)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Auth(format!("token request failed: {} {}", status, body)));
        }
        let data: TokenResponse = res.json().await?;
        let lifetime = data
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME)
            .saturating_sub(TOKEN_EXPIRY_SLACK);
        *self.token.write().await = Some(CachedToken {
            value: data.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        log::debug!("connector: refreshed bot token");
        Ok(Some(data.access_token))
    }
}

/// `{serviceUrl}/v3/conversations/{id}/activities[/{replyToId}]`, with id segments percent-encoded.
pub fn activities_url(conversation: &ConversationRef) -> Result<reqwest::Url, TransportError> {
    let mut url = reqwest::Url::parse(&conversation.service_url)
        .map_err(|e| TransportError::ServiceUrl(format!("{}: {}", conversation.service_url, e)))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| TransportError::ServiceUrl(conversation.service_url.clone()))?;
        segments
            .pop_if_empty()
            .extend(["v3", "conversations", conversation.conversation.id.as_str(), "activities"]);
        if let Some(ref id) = conversation.activity_id {
            segments.push(id);
        }
    }
    Ok(url)
}

#[async_trait]
impl MessageSender for BotConnector {
    async fn send(
        &self,
        conversation: &ConversationRef,
        message: &OutboundMessage,
    ) -> Result<(), TransportError> {
        let url = activities_url(conversation)?;
        if self.credentials.is_some() && !self.is_trusted(&url) {
            log::warn!(
                "connector: refusing to send to untrusted service url {}",
                conversation.service_url
            );
            return Err(TransportError::UntrustedServiceUrl(
                conversation.service_url.clone(),
            ));
        }
        let activity = conversation.reply(message);
        let mut req = self.client.post(url).json(&activity);
        if let Some(token) = self.bearer().await? {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }
        log::debug!("connector: sent {} activity", message.kind());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::activity::{ChannelAccount, ConversationAccount};
    use axum::http::{HeaderMap, Uri};
    use std::sync::{Arc, Mutex};

    /// (path, Authorization header) of every request a fake server saw.
    type Hits = Arc<Mutex<Vec<(String, Option<String>)>>>;

    /// Answers every request like both the login authority and the connector would.
    /// The token response carries no `expires_in`.
    async fn fake_server(hits: Hits) -> String {
        let app = axum::Router::new().fallback(move |uri: Uri, headers: HeaderMap| {
            let hits = hits.clone();
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                hits.lock().unwrap().push((uri.path().to_string(), auth));
                axum::Json(serde_json::json!({
                    "token_type": "Bearer",
                    "access_token": "SECRET-BOT-TOKEN",
                    "id": "sent"
                }))
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    fn creds() -> AppCredentials {
        AppCredentials {
            app_id: "id".into(),
            app_password: "pw".into(),
            tenant_id: None,
        }
    }

    fn conv(service_url: &str, conversation_id: &str, activity_id: Option<&str>) -> ConversationRef {
        ConversationRef {
            channel_id: "msteams".into(),
            service_url: service_url.into(),
            conversation: ConversationAccount {
                id: conversation_id.into(),
                extra: Default::default(),
            },
            bot: ChannelAccount::new("28:bot"),
            user: ChannelAccount::new("29:user"),
            activity_id: activity_id.map(String::from),
        }
    }

    #[test]
    fn reply_url_keeps_teams_conversation_id() {
        let url = activities_url(&conv("https://smba.trafficmanager.net/emea/", "a:1x;messageid=9", Some("act-1"))).unwrap();
        assert_eq!(
            url.as_str(),
            "https://smba.trafficmanager.net/emea/v3/conversations/a:1x;messageid=9/activities/act-1"
        );
    }

    #[test]
    fn url_segments_are_escaped() {
        let url = activities_url(&conv("http://localhost:3979", "a/b#c", Some("act 1"))).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3979/v3/conversations/a%2Fb%23c/activities/act%201"
        );
    }

    #[test]
    fn url_without_reply_id() {
        let url = activities_url(&conv("http://localhost:3979", "conv-1", None)).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3979/v3/conversations/conv-1/activities"
        );
    }

    #[test]
    fn invalid_service_url() {
        let err = activities_url(&conv("not a url", "conv-1", None)).unwrap_err();
        assert!(matches!(err, TransportError::ServiceUrl(_)));
    }

    #[test]
    fn token_url_defaults_to_botframework_tenant() {
        let creds = AppCredentials {
            app_id: "id".into(),
            app_password: "pw".into(),
            tenant_id: None,
        };
        let c = BotConnector::new(Some(creds.clone()));
        assert_eq!(
            c.token_url(&creds),
            "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token"
        );
        let single = AppCredentials {
            tenant_id: Some("contoso.onmicrosoft.com".into()),
            ..creds
        };
        let c = BotConnector::with_auth_base(Some(single.clone()), Some("http://auth.local/".into()));
        assert_eq!(
            c.token_url(&single),
            "http://auth.local/contoso.onmicrosoft.com/oauth2/v2.0/token"
        );
    }

    #[tokio::test]
    async fn no_credentials_means_no_bearer() {
        let c = BotConnector::new(None);
        assert_eq!(c.bearer().await.unwrap(), None);
    }

    #[test]
    fn trusted_hosts_match_host_and_subdomains() {
        let c = BotConnector::new(Some(creds()));
        let trusted = |u: &str| c.is_trusted(&reqwest::Url::parse(u).unwrap());
        assert!(trusted("https://smba.trafficmanager.net/emea/"));
        assert!(trusted("https://europe.webchat.botframework.com/"));
        assert!(trusted("https://BotFramework.com/"));
        assert!(!trusted("https://botframework.com.attacker.net/"));
        assert!(!trusted("https://evilbotframework.com/"));
        assert!(!trusted("http://attacker/"));

        let c = BotConnector::new(None).with_trusted_hosts(vec!["*.example.org".into(), " ".into()]);
        assert_eq!(c.trusted_hosts, vec!["example.org".to_string()]);
    }

    #[tokio::test]
    async fn untrusted_service_url_never_sees_the_token() {
        let auth_hits = Hits::default();
        let auth = fake_server(auth_hits.clone()).await;
        let attacker_hits = Hits::default();
        let attacker = fake_server(attacker_hits.clone()).await;

        let c = BotConnector::with_auth_base(Some(creds()), Some(auth));
        let err = c
            .send(&conv(&format!("{}/", attacker), "conv-1", None), &OutboundMessage::Typing)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UntrustedServiceUrl(_)));
        assert!(attacker_hits.lock().unwrap().is_empty());
        assert!(auth_hits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn trusted_host_gets_bearer_and_token_is_cached() {
        let hits = Hits::default();
        let base = fake_server(hits.clone()).await;
        let c = BotConnector::with_auth_base(Some(creds()), Some(base.clone()))
            .with_trusted_hosts(vec!["127.0.0.1".into()]);
        let conversation = conv(&format!("{}/", base), "conv-1", Some("act-1"));

        c.send(&conversation, &OutboundMessage::Typing).await.unwrap();
        c.send(&conversation, &OutboundMessage::text("hi")).await.unwrap();

        let hits = hits.lock().unwrap().clone();
        let token_requests = hits.iter().filter(|(p, _)| p.ends_with("/oauth2/v2.0/token")).count();
        assert_eq!(token_requests, 1);
        let sends: Vec<_> = hits
            .iter()
            .filter(|(p, _)| p == "/v3/conversations/conv-1/activities/act-1")
            .collect();
        assert_eq!(sends.len(), 2);
        for (_, auth) in sends {
            assert_eq!(auth.as_deref(), Some("Bearer SECRET-BOT-TOKEN"));
        }
    }

    #[tokio::test]
    async fn emulator_send_has_no_authorization() {
        let hits = Hits::default();
        let base = fake_server(hits.clone()).await;
        let c = BotConnector::new(None);
        c.send(&conv(&format!("{}/", base), "conv-1", None), &OutboundMessage::Typing)
            .await
            .unwrap();
        assert_eq!(
            *hits.lock().unwrap(),
            vec![("/v3/conversations/conv-1/activities".to_string(), None)]
        );
    }
}
