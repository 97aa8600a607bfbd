//! Whitebooks eWay Bill and eInvoice products.
//!
//! Both products share the handshake and header set but authenticate against
//! different paths and hold separate sessions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde_json::Value;

use crate::config::WhitebooksConfig;
use crate::credentials::{Authenticator, Credential, Session, SessionManager};
use crate::error::{GatewayError, GatewayResult};
use crate::providers::clock;
use crate::providers::response::{decode, ProviderResponse, ResponseShape};
use crate::providers::transport::Transport;

pub const PROVIDER: &str = "WHITEBOOKS";

/// Whitebooks product line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitebooksProduct {
    Eway,
    Einvoice,
}

impl WhitebooksProduct {
    fn auth_path(self) -> &'static str {
        match self {
            WhitebooksProduct::Eway => "/ewaybillapi/v1.03/authenticate",
            WhitebooksProduct::Einvoice => "/irnapi/v1.03/authenticate",
        }
    }

    fn label(self) -> &'static str {
        match self {
            WhitebooksProduct::Eway => "WHITEBOOKS_EWAY",
            WhitebooksProduct::Einvoice => "WHITEBOOKS_EINVOICE",
        }
    }
}

fn with_identity(request: RequestBuilder, config: &WhitebooksConfig) -> RequestBuilder {
    request
        .header("ip_address", &config.ip_address)
        .header("client_id", &config.client_id)
        .header("client_secret", &config.client_secret)
        .header("gstin", &config.gstin)
        .header("Accept", "application/json")
}

pub struct WhitebooksAuthenticator {
    product: WhitebooksProduct,
    config: WhitebooksConfig,
    transport: Transport,
}

#[async_trait]
impl Authenticator for WhitebooksAuthenticator {
    fn provider(&self) -> &'static str {
        self.product.label()
    }

    async fn authenticate(&self) -> GatewayResult<Credential> {
        let request = self
            .transport
            .client()
            .get(format!("{}{}", self.config.url.trim_end_matches('/'), self.product.auth_path()))
            .query(&[
                ("email", self.config.email.as_str()),
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ]);
        let reply = self.transport.send(with_identity(request, &self.config)).await;

        match decode(&ResponseShape::WHITEBOOKS, reply) {
            ProviderResponse::Success(body) => {
                let token = body
                    .pointer("/data/AuthToken")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| GatewayError::Authentication {
                        provider: self.product.label().to_string(),
                        message: "authentication response carried no AuthToken".to_string(),
                    })?;
                let lifetime = body
                    .pointer("/data/TokenExpiry")
                    .and_then(Value::as_str)
                    .map(clock::lifetime_until);
                Ok(Credential::token(token).with_lifetime(lifetime))
            }
            ProviderResponse::BusinessError { message, .. } => Err(GatewayError::Authentication {
                provider: self.product.label().to_string(),
                message,
            }),
            ProviderResponse::Transport(error) => Err(error),
        }
    }
}

/// Client for one Whitebooks product. One attempt per call.
pub struct WhitebooksClient {
    product: WhitebooksProduct,
    sessions: SessionManager<WhitebooksAuthenticator>,
    transport: Transport,
    config: WhitebooksConfig,
}

impl WhitebooksClient {
    pub fn new(product: WhitebooksProduct, config: WhitebooksConfig) -> GatewayResult<Self> {
        let transport = Transport::new(product.label(), Duration::from_secs(config.timeout_secs))?;
        let sessions = SessionManager::new(
            WhitebooksAuthenticator {
                product,
                config: config.clone(),
                transport: transport.clone(),
            },
            Duration::from_secs(config.token_ttl_secs),
        );
        Ok(Self {
            product,
            sessions,
            transport,
            config,
        })
    }

    pub fn product(&self) -> WhitebooksProduct {
        self.product
    }

    pub fn sessions(&self) -> &SessionManager<WhitebooksAuthenticator> {
        &self.sessions
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        with_identity(request, &self.config)
            .query(&[("email", self.config.email.as_str())])
            .bearer_auth(session.token().unwrap_or_default())
    }

    /// POST a JSON body to `path`.
    pub async fn post(&self, path: &str, body: &Value, shape: &ResponseShape) -> GatewayResult<Value> {
        let session = self.sessions.ensure_authenticated().await?;
        let request = self.authorized(self.transport.client().post(self.url(path)), &session).json(body);
        self.finish(request, shape).await
    }

    /// GET `path` with extra query parameters.
    pub async fn get(&self, path: &str, query: &[(&str, &str)], shape: &ResponseShape) -> GatewayResult<Value> {
        let session = self.sessions.ensure_authenticated().await?;
        let request = self
            .authorized(self.transport.client().get(self.url(path)), &session)
            .query(query);
        self.finish(request, shape).await
    }

    async fn finish(&self, request: RequestBuilder, shape: &ResponseShape) -> GatewayResult<Value> {
        let reply = self.transport.send(request).await;
        if let Err(GatewayError::ClientRequest { status: 401, .. }) = &reply {
            self.sessions.invalidate();
        }
        decode(shape, reply).into_result(PROVIDER)
    }
}
