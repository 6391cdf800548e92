//! # exchange::okx
//!
//! [`Exchange`] implementation for OKX v5 REST (USDT-margined perpetual
//! swaps, cross margin).
//!
//! ## Signing
//! ```text
//! OK-ACCESS-SIGN = base64( HMAC_SHA256( secret, timestamp + METHOD + path?query + body ) )
//! ```
//! `timestamp` is ISO-8601 UTC with milliseconds, e.g. `2024-05-01T12:00:00.123Z`.
//!
//! Every response is wrapped in `{ "code": "0", "msg": "", "data": [...] }`;
//! any `code` other than `"0"` is an [`ExchangeError::Api`], except order
//! placement where a per-order `sCode` turns into [`ExchangeError::Rejected`].

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, warn};

use super::{
    Exchange, ExchangeError, MarketOrder, OrderFill, OrderReceipt, RawBalance, RawPosition,
};
use crate::config::OkxCredentials;
use crate::models::{Candle, Timeframe};

type HmacSha256 = Hmac<Sha256>;

/// Upper bound for any single OKX call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub const OKX_BASE_URL: &str = "https://www.okx.com";

// ─── Envelope ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg:  String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<Vec<T>, ExchangeError> {
        if self.code != "0" {
            return Err(ExchangeError::Api { code: self.code, msg: self.msg });
        }
        Ok(self.data)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    #[serde(default)]
    ord_id:     String,
    #[serde(default)]
    cl_ord_id:  String,
    #[serde(default)]
    s_code:     String,
    #[serde(default)]
    s_msg:      String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct OrderDetail {
    state:       String,
    acc_fill_sz: Option<String>,
    avg_px:      Option<String>,
    pnl:         Option<String>,
}

// ─── Client ───────────────────────────────────────────────────────────────────

pub struct OkxClient {
    http:        reqwest::Client,
    credentials: OkxCredentials,
    base_url:    String,
    /// Sends `x-simulated-trading: 1` (OKX demo trading).
    simulated:   bool,
}

impl OkxClient {
    pub fn new(http: reqwest::Client, credentials: OkxCredentials) -> Self {
        Self {
            http,
            credentials,
            base_url:  OKX_BASE_URL.to_string(),
            simulated: false,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_simulated(mut self, simulated: bool) -> Self {
        self.simulated = simulated;
        self
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
        private: bool,
    ) -> Result<Envelope<T>, ExchangeError> {
        let raw_url = format!("{}{path}", self.base_url);
        let url = if query.is_empty() {
            reqwest::Url::parse(&raw_url)
        } else {
            reqwest::Url::parse_with_params(&raw_url, query)
        }
        .map_err(|e| ExchangeError::Malformed(format!("bad request url: {e}")))?;
        let request_path = match url.query() {
            Some(q) if !q.is_empty() => format!("{}?{q}", url.path()),
            _ => url.path().to_string(),
        };
        let body_text = body.as_ref().map(|b| b.to_string()).unwrap_or_default();

        let mut req = self
            .http
            .request(method.clone(), url)
            .header("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT);

        if private {
            let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
            let signature = sign(
                &self.credentials.secret,
                &timestamp,
                method.as_str(),
                &request_path,
                &body_text,
            )?;
            req = req
                .header("OK-ACCESS-KEY", &self.credentials.api_key)
                .header("OK-ACCESS-SIGN", signature)
                .header("OK-ACCESS-TIMESTAMP", timestamp)
                .header("OK-ACCESS-PASSPHRASE", &self.credentials.passphrase);
        }
        if self.simulated {
            req = req.header("x-simulated-trading", "1");
        }
        if !body_text.is_empty() {
            req = req.body(body_text);
        }

        debug!(%method, path = %request_path, "OKX request");

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ExchangeError::Http { status, body });
        }

        let text = resp.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ExchangeError::Malformed(format!("{e}: {text}")))
    }
}

/// Computes the `OK-ACCESS-SIGN` header value.
pub fn sign(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Malformed(format!("unusable API secret: {e}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.to_uppercase().as_bytes());
    mac.update(request_path.as_bytes());
    mac.update(body.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// OKX numeric strings: `""` means absent.
fn parse_opt(value: &Option<String>) -> Option<f64> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

fn parse_candle(row: &[String]) -> Result<Candle, ExchangeError> {
    if row.len() < 6 {
        return Err(ExchangeError::Malformed(format!(
            "candle row has {} fields, expected at least 6",
            row.len()
        )));
    }
    let num = |i: usize| -> Result<f64, ExchangeError> {
        row[i]
            .parse::<f64>()
            .map_err(|_| ExchangeError::Malformed(format!("candle field {i} = '{}'", row[i])))
    };
    let ts_ms: i64 = row[0]
        .parse()
        .map_err(|_| ExchangeError::Malformed(format!("candle timestamp '{}'", row[0])))?;
    let open_time = Utc
        .timestamp_millis_opt(ts_ms)
        .single()
        .ok_or_else(|| ExchangeError::Malformed(format!("candle timestamp out of range: {ts_ms}")))?;

    Ok(Candle {
        open_time,
        open:   num(1)?,
        high:   num(2)?,
        low:    num(3)?,
        close:  num(4)?,
        volume: num(5)?,
    })
}

// ─── Exchange impl ────────────────────────────────────────────────────────────

#[async_trait]
impl Exchange for OkxClient {
    async fn get_candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let limit = limit.to_string();
        let rows: Vec<Vec<String>> = self
            .request(
                Method::GET,
                "/api/v5/market/candles",
                &[("instId", instrument), ("bar", timeframe.okx_bar()), ("limit", limit.as_str())],
                None,
                false,
            )
            .await?
            .into_data()?;

        rows.iter().map(|row| parse_candle(row)).collect()
    }

    async fn get_position(&self, instrument: &str) -> Result<Option<RawPosition>, ExchangeError> {
        let positions: Vec<RawPosition> = self
            .request(
                Method::GET,
                "/api/v5/account/positions",
                &[("instId", instrument)],
                None,
                true,
            )
            .await?
            .into_data()?;

        debug!(count = positions.len(), "OKX positions fetched");
        Ok(positions.into_iter().find(|p| p.inst_id == instrument))
    }

    async fn get_balance(&self, currency: &str) -> Result<RawBalance, ExchangeError> {
        let balances: Vec<RawBalance> = self
            .request(
                Method::GET,
                "/api/v5/account/balance",
                &[("ccy", currency)],
                None,
                true,
            )
            .await?
            .into_data()?;

        balances
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::Malformed("balance response carried no data".into()))
    }

    async fn submit_market_order(&self, order: &MarketOrder) -> Result<OrderReceipt, ExchangeError> {
        let body = json!({
            "instId":     order.instrument,
            "tdMode":     "cross",
            "side":       order.side.as_str(),
            "ordType":    "market",
            "sz":         order.size.to_string(),
            "reduceOnly": order.reduce_only,
            "clOrdId":    order.client_order_id,
        });

        let envelope: Envelope<OrderAck> = self
            .request(Method::POST, "/api/v5/trade/order", &[], Some(body), true)
            .await?;

        // A refused order comes back with code "1" and the reason in sCode/sMsg.
        let Envelope { code, msg, data } = envelope;
        let Some(ack) = data.into_iter().next() else {
            return Err(if code != "0" {
                ExchangeError::Api { code, msg }
            } else {
                ExchangeError::Malformed("order response carried no data".into())
            });
        };

        if ack.s_code != "0" {
            warn!(code = %ack.s_code, reason = %ack.s_msg, "OKX refused order");
            return Err(ExchangeError::Rejected { code: ack.s_code, msg: ack.s_msg });
        }

        Ok(OrderReceipt {
            order_id:        ack.ord_id,
            client_order_id: ack.cl_ord_id,
        })
    }

    async fn get_order(&self, instrument: &str, order_id: &str) -> Result<OrderFill, ExchangeError> {
        let details: Vec<OrderDetail> = self
            .request(
                Method::GET,
                "/api/v5/trade/order",
                &[("instId", instrument), ("ordId", order_id)],
                None,
                true,
            )
            .await?
            .into_data()?;

        let detail = details
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::Malformed(format!("order {order_id} not found")))?;

        Ok(OrderFill {
            filled_size:  parse_opt(&detail.acc_fill_sz).unwrap_or(0.0),
            average_px:   parse_opt(&detail.avg_px).unwrap_or(0.0),
            realized_pnl: parse_opt(&detail.pnl),
            state:        detail.state,
        })
    }

    async fn set_leverage(&self, instrument: &str, leverage: u32) -> Result<(), ExchangeError> {
        let body = json!({
            "instId":  instrument,
            "lever":   leverage.to_string(),
            "mgnMode": "cross",
        });
        let _: Vec<serde_json::Value> = self
            .request(Method::POST, "/api/v5/account/set-leverage", &[], Some(body), true)
            .await?
            .into_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::OrderSide;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OkxClient {
        OkxClient::new(
            reqwest::Client::new(),
            OkxCredentials {
                api_key:    "key".into(),
                secret:     "secret".into(),
                passphrase: "pass".into(),
            },
        )
        .with_base_url(server.uri())
    }

    #[test]
    fn test_sign_is_deterministic_base64() {
        let a = sign("secret", "2024-01-01T00:00:00.000Z", "GET", "/api/v5/account/balance?ccy=USDT", "").unwrap();
        let b = sign("secret", "2024-01-01T00:00:00.000Z", "GET", "/api/v5/account/balance?ccy=USDT", "").unwrap();
        assert_eq!(a, b);
        // SHA-256 digest → 32 bytes → 44 base64 chars
        assert_eq!(a.len(), 44);
        let c = sign("secret", "2024-01-01T00:00:00.000Z", "POST", "/api/v5/account/balance?ccy=USDT", "").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_parse_opt_treats_empty_as_absent() {
        assert_eq!(parse_opt(&Some(String::new())), None);
        assert_eq!(parse_opt(&Some("12.5".into())), Some(12.5));
        assert_eq!(parse_opt(&None), None);
    }

    #[tokio::test]
    async fn test_get_candles_keeps_native_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/market/candles"))
            .and(query_param("bar", "1H"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0", "msg": "",
                "data": [
                    ["1700003600000", "101", "103", "100", "102", "12.5", "0", "0", "1"],
                    ["1700000000000", "100", "102", "99", "101", "10.0", "0", "0", "1"]
                ]
            })))
            .mount(&server)
            .await;

        let candles = client(&server)
            .get_candles("BTC-USDT-SWAP", Timeframe::H1, 10)
            .await
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 102.0);
        assert!(candles[0].open_time > candles[1].open_time);
    }

    #[tokio::test]
    async fn test_malformed_candle_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/market/candles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0", "msg": "", "data": [["1700000000000", "abc"]]
            })))
            .mount(&server)
            .await;

        let result = client(&server).get_candles("BTC-USDT-SWAP", Timeframe::M15, 10).await;
        assert!(matches!(result, Err(ExchangeError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_private_calls_are_signed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/account/balance"))
            .and(header("OK-ACCESS-KEY", "key"))
            .and(header("OK-ACCESS-PASSPHRASE", "pass"))
            .and(header_exists("OK-ACCESS-SIGN"))
            .and(header_exists("OK-ACCESS-TIMESTAMP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0", "msg": "",
                "data": [{
                    "totalEq": "1000.5",
                    "details": [{ "ccy": "USDT", "availBal": "800", "eq": "1000.5" }]
                }]
            })))
            .mount(&server)
            .await;

        let balance = client(&server).get_balance("USDT").await.unwrap();
        assert_eq!(balance.total_eq.as_deref(), Some("1000.5"));
        assert_eq!(balance.details[0].avail_bal.as_deref(), Some("800"));
        assert_eq!(balance.details[0].avail_eq, None);
    }

    #[tokio::test]
    async fn test_position_filtered_by_instrument() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/account/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0", "msg": "",
                "data": [
                    { "instId": "ETH-USDT-SWAP", "pos": "3" },
                    { "instId": "BTC-USDT-SWAP", "pos": "-2", "avgPx": "65000" }
                ]
            })))
            .mount(&server)
            .await;

        let pos = client(&server).get_position("BTC-USDT-SWAP").await.unwrap().unwrap();
        assert_eq!(pos.pos.as_deref(), Some("-2"));
        assert_eq!(pos.avg_px.as_deref(), Some("65000"));
    }

    #[tokio::test]
    async fn test_order_rejection_maps_scode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v5/trade/order"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "1", "msg": "Operation failed.",
                "data": [{ "ordId": "", "clOrdId": "abc", "sCode": "51008", "sMsg": "Insufficient margin" }]
            })))
            .mount(&server)
            .await;

        let order = MarketOrder {
            instrument:      "BTC-USDT-SWAP".into(),
            side:            OrderSide::Buy,
            size:            0.01,
            reduce_only:     false,
            client_order_id: "abc".into(),
        };
        match client(&server).submit_market_order(&order).await {
            Err(ExchangeError::Rejected { code, msg }) => {
                assert_eq!(code, "51008");
                assert_eq!(msg, "Insufficient margin");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_api_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/account/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "50113", "msg": "Invalid Sign", "data": []
            })))
            .mount(&server)
            .await;

        let result = client(&server).get_position("BTC-USDT-SWAP").await;
        assert!(matches!(result, Err(ExchangeError::Api { ref code, .. }) if code == "50113"));
    }

    #[tokio::test]
    async fn test_get_order_reads_realized_pnl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/trade/order"))
            .and(query_param("ordId", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0", "msg": "",
                "data": [{ "state": "filled", "accFillSz": "1", "avgPx": "64000", "pnl": "-12.5" }]
            })))
            .mount(&server)
            .await;

        let fill = client(&server).get_order("BTC-USDT-SWAP", "42").await.unwrap();
        assert_eq!(fill.state, "filled");
        assert_eq!(fill.filled_size, 1.0);
        assert_eq!(fill.realized_pnl, Some(-12.5));
    }
}
