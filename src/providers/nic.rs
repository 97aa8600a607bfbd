//! NIC eWay Bill channel (sealed payloads, session token).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::NicEwayConfig;
use crate::credentials::{Authenticator, Credential, SessionManager};
use crate::error::{GatewayError, GatewayResult};
use crate::providers::clock;
use crate::providers::envelope::EnvelopeCodec;
use crate::providers::response::{decode, ProviderResponse, ResponseShape};
use crate::providers::transport::Transport;

pub const PROVIDER: &str = "NIC";

fn seal_json(codec: &dyn EnvelopeCodec, payload: &Value) -> GatewayResult<(String, String)> {
    let plaintext = serde_json::to_vec(payload)
        .map_err(|e| GatewayError::Internal(format!("payload serialization failed: {}", e)))?;
    let sealed = codec.seal(&plaintext)?;
    Ok((sealed.data, sealed.symmetric_key))
}

pub struct NicAuthenticator {
    config: NicEwayConfig,
    transport: Transport,
    codec: Arc<dyn EnvelopeCodec>,
}

#[async_trait]
impl Authenticator for NicAuthenticator {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn authenticate(&self) -> GatewayResult<Credential> {
        let (data, sek) = seal_json(
            self.codec.as_ref(),
            &json!({
                "UserName": self.config.username,
                "Password": self.config.password,
                "AppKey": self.config.asp_id,
            }),
        )?;
        let request = self
            .transport
            .client()
            .post(format!("{}authenticate", self.config.url))
            .header("SEK", sek)
            .header("Appkey", &self.config.asp_id)
            .json(&json!({ "Data": data }));

        let reply = self.transport.send(request).await;
        match decode(&ResponseShape::NIC, reply) {
            ProviderResponse::Success(body) => {
                let token = body
                    .pointer("/data/AuthToken")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| GatewayError::Authentication {
                        provider: PROVIDER.to_string(),
                        message: "authentication response carried no AuthToken".to_string(),
                    })?;
                let lifetime = body
                    .pointer("/data/TokenExpiry")
                    .and_then(Value::as_str)
                    .map(clock::lifetime_until);
                Ok(Credential::token(token).with_lifetime(lifetime))
            }
            ProviderResponse::BusinessError { code, message, .. } => Err(GatewayError::Authentication {
                provider: PROVIDER.to_string(),
                message: format!("{} ({})", message, code),
            }),
            ProviderResponse::Transport(error) => Err(error),
        }
    }
}

/// NIC eWay Bill client. One attempt per call.
pub struct NicEwayClient {
    sessions: SessionManager<NicAuthenticator>,
    transport: Transport,
    codec: Arc<dyn EnvelopeCodec>,
    config: NicEwayConfig,
}

impl NicEwayClient {
    pub fn new(config: NicEwayConfig, codec: Arc<dyn EnvelopeCodec>) -> GatewayResult<Self> {
        let transport = Transport::new(PROVIDER, Duration::from_secs(config.timeout_secs))?;
        let sessions = SessionManager::new(
            NicAuthenticator {
                config: config.clone(),
                transport: transport.clone(),
                codec: codec.clone(),
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

    pub fn sessions(&self) -> &SessionManager<NicAuthenticator> {
        &self.sessions
    }

    /// Issue an eWay Bill from an already normalized NIC payload.
    pub async fn generate(&self, payload: &Value) -> GatewayResult<Value> {
        let session = self.sessions.ensure_authenticated().await?;
        let (data, sek) = seal_json(self.codec.as_ref(), payload)?;
        let request = self
            .transport
            .client()
            .post(format!("{}genewaybill", self.config.url))
            .header("SEK", sek)
            .header("Appkey", &self.config.asp_id)
            .header("AuthToken", session.token().unwrap_or_default())
            .header("username", &self.config.username)
            .header("gstin", &self.config.gstin)
            .json(&json!({ "Data": data }));

        let reply = self.transport.send(request).await;
        if let Err(GatewayError::ClientRequest { status: 401, .. }) = &reply {
            self.sessions.invalidate();
        }
        decode(&ResponseShape::NIC, reply).into_result(PROVIDER)
    }
}

