//! VAHAN vehicle registration and driving licence lookups.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::VahanConfig;
use crate::credentials::{Authenticator, Credential, Session, SessionManager};
use crate::error::{GatewayError, GatewayResult};
use crate::providers::clock;
use crate::providers::envelope::{EnvelopeCodec, SealedEnvelope};
use crate::providers::response::{decode, ResponseShape};
use crate::providers::transport::{HttpReply, Transport};

pub const PROVIDER: &str = "VAHAN";

const RC_PATH: &str = "/protean/vehicle-detailed-advanced";
const DL_PATH: &str = "/retail/dl";
const ENVELOPE_VERSION: &str = "1.0.0";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// OAuth2 client-credentials handshake.
pub struct VahanAuthenticator {
    config: VahanConfig,
    transport: Transport,
}

#[async_trait]
impl Authenticator for VahanAuthenticator {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn authenticate(&self) -> GatewayResult<Credential> {
        let url = format!("{}/oauth/token", self.config.auth_url.trim_end_matches('/'));
        let request = self
            .transport
            .client()
            .post(url)
            .basic_auth(&self.config.api_key, Some(&self.config.secret_key))
            .form(&[("grant_type", "client_credentials")]);

        let reply = self.transport.send(request).await?;
        let token: TokenResponse = serde_json::from_value(reply.body)
            .map_err(|e| GatewayError::Internal(format!("malformed token response: {}", e)))?;

        match token.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(Credential::token(access_token)
                .with_lifetime(token.expires_in.map(Duration::from_secs))),
            _ => Err(GatewayError::Authentication {
                provider: PROVIDER.to_string(),
                message: "token response carried no access_token".to_string(),
            }),
        }
    }
}

/// VAHAN API client. One attempt per call.
pub struct VahanClient {
    sessions: SessionManager<VahanAuthenticator>,
    transport: Transport,
    codec: Arc<dyn EnvelopeCodec>,
    config: VahanConfig,
}

impl VahanClient {
    pub fn new(config: VahanConfig, codec: Arc<dyn EnvelopeCodec>) -> GatewayResult<Self> {
        let transport = Transport::new(PROVIDER, Duration::from_secs(config.timeout_secs))?;
        let sessions = SessionManager::new(
            VahanAuthenticator {
                config: config.clone(),
                transport: transport.clone(),
            },
            Duration::from_secs(config.token_ttl_secs),
        );
        Ok(Self {
            sessions,
            transport,
            codec,
            config,
        })
    }

    pub fn sessions(&self) -> &SessionManager<VahanAuthenticator> {
        &self.sessions
    }

    /// Registration certificate lookup.
    pub async fn validate_vehicle(&self, vehicle_number: &str) -> GatewayResult<Value> {
        self.lookup(RC_PATH, json!({ "vehicleNumber": vehicle_number })).await
    }

    /// Driving licence lookup.
    pub async fn validate_dl(&self, dl_number: &str, dob: Option<&str>) -> GatewayResult<Value> {
        let mut payload = json!({ "dlNumber": dl_number });
        if let Some(dob) = dob {
            payload["dob"] = Value::String(dob.to_string());
        }
        self.lookup(DL_PATH, payload).await
    }

    async fn lookup(&self, path: &str, payload: Value) -> GatewayResult<Value> {
        let session = self.sessions.ensure_authenticated().await?;
        let body = self.sealed_body(&payload)?;
        let request = self
            .transport
            .client()
            .post(format!("{}{}", self.config.api_url.trim_end_matches('/'), path))
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer(&session))
            .json(&body);

        let reply = self.transport.send(request).await;
        if let Err(GatewayError::ClientRequest { status: 401, .. }) = &reply {
            self.sessions.invalidate();
        }
        let reply = reply.and_then(|r| self.open_reply(r));
        decode(&ResponseShape::VAHAN, reply).into_result(PROVIDER)
    }

    fn sealed_body(&self, payload: &Value) -> GatewayResult<Value> {
        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| GatewayError::Internal(format!("payload serialization failed: {}", e)))?;
        let sealed = self.codec.seal(&plaintext)?;
        Ok(json!({
            "data": sealed.data,
            "version": ENVELOPE_VERSION,
            "symmetricKey": sealed.symmetric_key,
            "hash": sealed.hash,
            "timestamp": clock::request_timestamp(),
            "requestId": Uuid::new_v4().to_string(),
        }))
    }

    /// Replace a sealed reply body with its opened JSON. Unsealed bodies pass through.
    fn open_reply(&self, reply: HttpReply) -> GatewayResult<HttpReply> {
        let field = |name: &str| reply.body.get(name).and_then(Value::as_str).map(str::to_string);
        let (Some(data), Some(symmetric_key), Some(hash)) = (field("data"), field("symmetricKey"), field("hash")) else {
            return Ok(reply);
        };
        let opened = self.codec.open(&SealedEnvelope {
            data,
            symmetric_key,
            hash,
        })?;
        let body = serde_json::from_slice(&opened)
            .map_err(|e| GatewayError::Envelope(format!("opened payload is not JSON: {}", e)))?;
        Ok(HttpReply {
            status: reply.status,
            body,
        })
    }
}

fn bearer(session: &Session) -> &str {
    session.token().unwrap_or_default()
}

