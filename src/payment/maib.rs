//! MAIB e-commerce API client.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::{CallbackParams, GatewayError, GatewayStatus, PaymentGateway, PaymentRequest, PaymentSession, RefundReport, StatusReport};

const DESCRIPTION_LIMIT: usize = 255;
const DEFAULT_TOKEN_TTL: u64 = 300;
const TOKEN_SAFETY_MARGIN: u64 = 30;

#[derive(Clone)]
pub struct MaibConfig {
    pub api_url: String,
    pub project_id: String,
    pub project_secret: String,
    pub signature_key: String,
    pub callback_url: Option<String>,
    pub ok_url: Option<String>,
    pub fail_url: Option<String>,
    pub currency: String,
}

impl std::fmt::Debug for MaibConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaibConfig")
            .field("api_url", &self.api_url)
            .field("project_id", &self.project_id)
            .field("project_secret", &"[REDACTED]")
            .field("signature_key", &"[REDACTED]")
            .field("callback_url", &self.callback_url)
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

impl MaibConfig {
    pub fn is_configured(&self) -> bool { !self.project_id.is_empty() && !self.project_secret.is_empty() }
}

/// Lowercase hex SHA-256 of `k1=v1&k2=v2&...&key=<signature key>`, keys sorted, `signature` excluded.
pub fn sign(fields: &BTreeMap<String, String>, signature_key: &str) -> String {
    let joined = fields.iter().filter(|(k, _)| k.as_str() != "signature").map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
    hex::encode(Sha256::digest(format!("{joined}&key={signature_key}").as_bytes()))
}

pub fn verify(fields: &BTreeMap<String, String>, signature: &str, signature_key: &str) -> bool {
    sign(fields, signature_key).eq_ignore_ascii_case(signature.trim())
}

struct AccessToken { value: String, expires_at: Instant }

pub struct MaibClient {
    config: MaibConfig,
    client: reqwest::Client,
    token: Mutex<Option<AccessToken>>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    ok: Option<bool>,
    result: Option<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResult { access_token: String, expires_in: Option<u64> }

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayResult { pay_id: String, pay_url: Option<String> }

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayInfoResult { status: Option<String>, transaction_status: Option<String>, status_message: Option<String> }

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefundResult { status: Option<String>, refund_amount: Option<Decimal> }

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayBody<'a> {
    amount: f64,
    currency: &'a str,
    description: String,
    language: &'a str,
    order_id: &'a str,
    client_name: &'a str,
    email: &'a str,
    client_ip: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    #[serde(rename = "callBackUrl", skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ok_url: Option<&'a str>,
    fail_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    items: Vec<PayItem<'a>>,
}

#[derive(Serialize)]
struct PayItem<'a> { id: &'a str, name: &'a str, price: f64, quantity: u32 }

fn to_f64(d: Decimal) -> f64 { d.to_f64().unwrap_or(0.0) }

async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Envelope<T>, GatewayError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message").or_else(|| v.get("error")).and_then(|m| m.as_str().map(str::to_string))
                    .or_else(|| v.pointer("/errors/0/errorMessage").and_then(|m| m.as_str().map(str::to_string)))
            })
            .unwrap_or(body);
        return Err(GatewayError::Http { status: status.as_u16(), message });
    }
    serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))
}

fn result_of<T>(envelope: Envelope<T>) -> Result<T, GatewayError> {
    envelope.result.ok_or_else(|| GatewayError::Decode("response has no result".into()))
}

impl MaibClient {
    pub fn new(config: MaibConfig) -> Self {
        Self { config, client: reqwest::Client::new(), token: Mutex::new(None) }
    }

    fn url(&self, path: &str) -> String { format!("{}{}", self.config.api_url.trim_end_matches('/'), path) }

    /// Bearer token, reused until shortly before it expires.
    async fn access_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value.clone());
        }
        if !self.config.is_configured() { return Err(GatewayError::NotConfigured); }
        let resp = self.client
            .post(self.url("/v1/generate-token"))
            .json(&json!({ "projectId": self.config.project_id, "projectSecret": self.config.project_secret }))
            .send()
            .await?;
        let token: TokenResult = result_of(read(resp).await?)?;
        let ttl = token.expires_in.unwrap_or(DEFAULT_TOKEN_TTL).saturating_sub(TOKEN_SAFETY_MARGIN).max(TOKEN_SAFETY_MARGIN);
        *cached = Some(AccessToken { value: token.access_token.clone(), expires_at: Instant::now() + Duration::from_secs(ttl) });
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentGateway for MaibClient {
    #[instrument(skip(self, request), fields(order_ref = %request.order_ref, amount = %request.amount))]
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentSession, GatewayError> {
        let token = self.access_token().await?;
        let ok_url = self.config.ok_url.as_deref();
        let body = PayBody {
            amount: to_f64(request.amount),
            currency: &self.config.currency,
            description: request.description.chars().take(DESCRIPTION_LIMIT).collect(),
            language: request.language.gateway_code(),
            order_id: &request.order_ref,
            client_name: &request.client_name,
            email: &request.email,
            client_ip: request.client_ip.as_deref().unwrap_or("127.0.0.1"),
            phone: request.phone.as_deref().filter(|p| !p.is_empty()),
            callback_url: self.config.callback_url.as_deref(),
            ok_url,
            fail_url: self.config.fail_url.as_deref().or(ok_url),
            items: request.items.iter().filter(|i| !i.id.is_empty() && !i.name.is_empty())
                .map(|i| PayItem { id: &i.id, name: &i.name, price: to_f64(i.price), quantity: i.quantity.max(1) })
                .collect(),
        };
        let resp = self.client.post(self.url("/v1/pay")).bearer_auth(token).json(&body).send().await?;
        let result: PayResult = result_of(read(resp).await?)?;
        let redirect_url = result.pay_url.ok_or_else(|| GatewayError::Decode("payment has no payUrl".into()))?;
        info!(pay_id = %result.pay_id, "payment session created");
        Ok(PaymentSession { pay_id: result.pay_id, redirect_url })
    }

    #[instrument(skip(self))]
    async fn check_status(&self, pay_id: &str, order_id: Option<&str>) -> Result<StatusReport, GatewayError> {
        let token = self.access_token().await?;
        let resp = self.client.get(self.url(&format!("/v1/pay-info/{pay_id}"))).bearer_auth(token).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            warn!(pay_id, "pay-info has no record of payment yet");
            return Ok(StatusReport::new(GatewayStatus::NotFound));
        }
        let info: PayInfoResult = result_of(read(resp).await?)?;
        let status = info.status.or(info.transaction_status).map_or(GatewayStatus::Pending, |s| GatewayStatus::classify(&s));
        Ok(StatusReport { status, message: info.status_message })
    }

    async fn process_callback(&self, params: &CallbackParams) -> Result<StatusReport, GatewayError> {
        let signature = params.signature.as_deref().filter(|s| !s.is_empty()).ok_or(GatewayError::MissingSignature)?;
        if self.config.signature_key.is_empty() { return Err(GatewayError::NotConfigured); }
        if !verify(&params.signed_fields(), signature, &self.config.signature_key) {
            warn!(pay_id = ?params.pay_id, "callback signature mismatch");
            return Err(GatewayError::InvalidSignature);
        }
        let status = params.redirect_status().unwrap_or(GatewayStatus::Pending);
        let message = params.extra.get("statusMessage").and_then(|v| v.as_str()).map(str::to_string);
        Ok(StatusReport { status, message })
    }

    #[instrument(skip(self))]
    async fn refund(&self, pay_id: &str, amount: Option<Decimal>) -> Result<RefundReport, GatewayError> {
        let token = self.access_token().await?;
        let mut body = json!({ "payId": pay_id });
        if let Some(amount) = amount { body["refundAmount"] = json!(to_f64(amount)); }
        let resp = self.client
            .post(self.url("/v1/refund"))
            .bearer_auth(token)
            .header("X-Project-Id", &self.config.project_id)
            .json(&body)
            .send()
            .await?;
        let envelope: Envelope<RefundResult> = read(resp).await?;
        let ok = envelope.ok.unwrap_or(true);
        let result = envelope.result;
        Ok(RefundReport {
            ok,
            status: result.as_ref().and_then(|r| r.status.clone()),
            amount: result.and_then(|r| r.refund_amount).or(amount),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_signature_over_sorted_fields() {
        let f = fields(&[("status", "OK"), ("payId", "p1"), ("orderId", "o1")]);
        let expected = hex::encode(Sha256::digest(b"orderId=o1&payId=p1&status=OK&key=secret"));
        assert_eq!(sign(&f, "secret"), expected);
    }

    #[test]
    fn test_signature_ignores_signature_field_and_case() {
        let mut f = fields(&[("payId", "p1")]);
        let sig = sign(&f, "k");
        f.insert("signature".into(), "whatever".into());
        assert!(verify(&f, &sig.to_uppercase(), "k"));
        assert!(!verify(&f, &sig, "other-key"));
    }
}
