use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::{
    CreateGatewayOrder, GatewayError, GatewayOrder, GatewayPayment, GatewayRefund, PaymentGateway,
};
use crate::config::RazorpayConfig;

/// REST client for the Razorpay v1 API (basic auth with key id and secret).
#[derive(Clone)]
pub struct RazorpayClient {
    http: Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl RazorpayClient {
    pub fn new(config: &RazorpayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("stonecraft-api/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, GatewayError> {
        if self.key_id.is_empty() || self.key_secret.is_empty() {
            return Err(GatewayError::NotConfigured);
        }
        Ok(builder.basic_auth(&self.key_id, Some(&self.key_secret)))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let started = Instant::now();
        let result = match self.authed(builder)?.send().await {
            Ok(response) => Self::decode(response).await,
            Err(err) => Err(GatewayError::from(err)),
        };

        histogram!("stonecraft_gateway.request_duration", started.elapsed(), "operation" => operation);
        if let Err(err) = &result {
            counter!("stonecraft_gateway.errors", 1, "operation" => operation);
            warn!(operation, error = %err, "razorpay request failed");
        }
        result
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|e| GatewayError::Decode(e.to_string()));
        }

        let message = serde_json::from_slice::<ApiErrorEnvelope>(&body)
            .ok()
            .and_then(|env| env.error.description.or(env.error.code))
            .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    #[instrument(skip(self, request), fields(receipt = %request.receipt, amount = request.amount))]
    async fn create_order(&self, request: CreateGatewayOrder) -> Result<GatewayOrder, GatewayError> {
        let builder = self.http.post(self.url("orders")).json(&json!({
            "amount": request.amount,
            "currency": request.currency,
            "receipt": request.receipt,
        }));
        let order: GatewayOrder = self.send("create_order", builder).await?;
        debug!(gateway_order_id = %order.id, "razorpay order created");
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let builder = self.http.get(self.url(&format!("payments/{}", payment_id)));
        self.send("fetch_payment", builder).await
    }

    #[instrument(skip(self))]
    async fn refund_payment(
        &self,
        payment_id: &str,
        amount: i64,
        receipt: &str,
    ) -> Result<GatewayRefund, GatewayError> {
        let builder = self
            .http
            .post(self.url(&format!("payments/{}/refund", payment_id)))
            .json(&json!({
                "amount": amount,
                "receipt": receipt,
            }));
        self.send("refund_payment", builder).await
    }
}
