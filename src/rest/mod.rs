//! Order management over the REST API
//!
//! Every request is signed with the same HMAC scheme as the realtime
//! handshake and draws its nonce from the shared sequencer.

mod order;

pub use order::{exec_inst, ord_type, time_in_force, Order};

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, Request};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::{Credentials, NonceSequencer};
use crate::config::Config;
use crate::error::{BitmexError, Result};

/// Path prefix of every REST resource
pub const API_VERSION: &str = "/api/v1";

const ORDER_PATH: &str = "/order";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Signed REST client for order placement
pub struct OrderClient {
    client: Client,
    endpoint: String,
    credentials: Credentials,
    nonce: Arc<NonceSequencer>,
}

impl OrderClient {
    pub fn new(endpoint: &str, credentials: Credentials, nonce: Arc<NonceSequencer>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
            nonce,
        })
    }

    /// Client for the configured REST endpoint. Requires credentials.
    pub fn from_config(config: &Config, nonce: Arc<NonceSequencer>) -> Result<Self> {
        let credentials = config.credentials().ok_or(BitmexError::MissingCredentials)?;
        Self::new(&config.rest_endpoint, credentials, nonce)
    }

    /// Build a signed request for `path` under the API prefix
    pub fn build_request(&self, method: Method, path: &str, body: Vec<u8>) -> Result<Request> {
        let resource = format!("{}{}", API_VERSION, path);
        let nonce = self.nonce.next();
        let signature = self
            .credentials
            .sign(method.as_str(), &resource, nonce, &body);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("api-nonce", header_value(&nonce.to_string())?);
        headers.insert("api-key", header_value(self.credentials.key())?);
        headers.insert("api-signature", header_value(&signature)?);

        let request = self
            .client
            .request(method, format!("{}{}", self.endpoint, resource))
            .headers(headers)
            .body(body)
            .build()?;

        Ok(request)
    }

    /// Place an order without waiting for the order document
    pub async fn send(&self, order: &Order) -> Result<()> {
        let request = self.build_request(Method::POST, ORDER_PATH, serde_json::to_vec(order)?)?;
        let response = self.client.execute(request).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Order rejected");
            return Err(BitmexError::RestApiError(format!("HTTP {}: {}", status, body)));
        }
        Ok(())
    }

    /// Place an order and return the venue's order document
    pub async fn create(&self, order: &Order) -> Result<Order> {
        self.execute(Method::POST, ORDER_PATH, order).await
    }

    /// Cancel by order id. The venue answers with every order it touched.
    pub async fn cancel(&self, order_id: &str) -> Result<Vec<Order>> {
        self.execute(Method::DELETE, ORDER_PATH, &Order::with_id(order_id))
            .await
    }

    /// Amend an open order identified by `order_id` or `cl_ord_id`
    pub async fn modify(&self, order: &Order) -> Result<Order> {
        self.execute(Method::PUT, ORDER_PATH, order).await
    }

    async fn execute<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let request = self.build_request(method.clone(), path, serde_json::to_vec(body)?)?;
        debug!(method = %method, path = %path, "Sending REST request");

        let response = self.client.execute(request).await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(status = %status, body = %text, "REST request failed");
            return Err(BitmexError::RestApiError(format!("HTTP {}: {}", status, text)));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| BitmexError::RestApiError(format!("Invalid header value: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sign;
    use crate::parser::Side;
    use rust_decimal_macros::dec;

    fn client(nonce: u64) -> OrderClient {
        OrderClient::new(
            "https://testnet.bitmex.com/",
            Credentials::new("key-id", "secret"),
            Arc::new(NonceSequencer::starting_at(nonce)),
        )
        .unwrap()
    }

    #[test]
    fn test_request_is_signed_over_body() {
        let client = client(99);
        let order = Order::limit("XBTUSD", Side::Buy, dec!(10), dec!(6500), true);
        let body = serde_json::to_vec(&order).unwrap();

        let request = client
            .build_request(Method::POST, "/order", body.clone())
            .unwrap();

        assert_eq!(request.url().as_str(), "https://testnet.bitmex.com/api/v1/order");
        assert_eq!(request.method(), &Method::POST);

        let headers = request.headers();
        assert_eq!(headers["api-nonce"], "100");
        assert_eq!(headers["api-key"], "key-id");
        assert_eq!(headers[CONTENT_TYPE], "application/json");

        let expected = sign("secret", "POST", "/api/v1/order", 100, &body);
        assert_eq!(headers["api-signature"], expected.as_str());

        let sent = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(sent, body.as_slice());
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let nonce = Arc::new(NonceSequencer::starting_at(0));
        let result = OrderClient::from_config(&Config::default(), nonce.clone());
        assert!(matches!(result, Err(BitmexError::MissingCredentials)));

        let config = Config {
            api_key: Some("key-id".to_string()),
            api_secret: Some("secret".to_string()),
            ..Config::default()
        };
        let client = OrderClient::from_config(&config, nonce).unwrap();
        let request = client.build_request(Method::GET, "/order", Vec::new()).unwrap();
        assert_eq!(request.url().as_str(), "https://www.bitmex.com/api/v1/order");
    }

    #[test]
    fn test_each_request_draws_a_nonce() {
        let client = client(1);
        let first = client.build_request(Method::DELETE, "/order", Vec::new()).unwrap();
        let second = client.build_request(Method::PUT, "/order", Vec::new()).unwrap();

        assert_eq!(first.headers()["api-nonce"], "2");
        assert_eq!(second.headers()["api-nonce"], "3");
    }
}
