//! Scripted in-memory [`Exchange`] for engine and supervisor tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use super::{
    Exchange, ExchangeError, MarketOrder, OrderFill, OrderReceipt, RawBalance, RawBalanceDetail,
    RawPosition,
};
use crate::models::{Candle, Timeframe};

/// How `submit_market_order` answers.
#[derive(Debug, Clone)]
pub enum OrderBehaviour {
    Accept,
    Reject(String),
    Unreachable,
}

pub struct ScriptedExchange {
    pub candles:        Mutex<Option<Vec<Candle>>>,
    /// Popped once per `get_position` call; the last entry repeats.
    pub positions:      Mutex<VecDeque<Option<RawPosition>>>,
    pub balance:        Mutex<Option<RawBalance>>,
    /// 1-based `get_balance` calls that fail.
    pub balance_outages: Mutex<Vec<usize>>,
    balance_calls:      AtomicUsize,
    pub order_behaviour: Mutex<OrderBehaviour>,
    pub fill_pnl:       Mutex<Option<f64>>,
    pub submitted:      Mutex<Vec<MarketOrder>>,
    pub leverage_calls: Mutex<Vec<u32>>,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self {
            candles:         Mutex::new(Some(candles(&[100.0, 101.0, 102.0]))),
            positions:       Mutex::new(VecDeque::from([None])),
            balance:         Mutex::new(Some(usdt_balance("1000", "1000"))),
            balance_outages: Mutex::new(Vec::new()),
            balance_calls:   AtomicUsize::new(0),
            order_behaviour: Mutex::new(OrderBehaviour::Accept),
            fill_pnl:        Mutex::new(None),
            submitted:       Mutex::new(Vec::new()),
            leverage_calls:  Mutex::new(Vec::new()),
        }
    }

    pub fn with_positions(self, positions: Vec<Option<RawPosition>>) -> Self {
        *self.positions.lock().unwrap() = positions.into();
        self
    }

    pub fn with_order_behaviour(self, behaviour: OrderBehaviour) -> Self {
        *self.order_behaviour.lock().unwrap() = behaviour;
        self
    }

    pub fn with_fill_pnl(self, pnl: f64) -> Self {
        *self.fill_pnl.lock().unwrap() = Some(pnl);
        self
    }

    pub fn with_balance(self, balance: Option<RawBalance>) -> Self {
        *self.balance.lock().unwrap() = balance;
        self
    }

    pub fn with_balance_outage_on(self, call: usize) -> Self {
        self.balance_outages.lock().unwrap().push(call);
        self
    }

    pub fn with_candles(self, candles: Option<Vec<Candle>>) -> Self {
        *self.candles.lock().unwrap() = candles;
        self
    }

    pub fn submitted(&self) -> Vec<MarketOrder> {
        self.submitted.lock().unwrap().clone()
    }
}

/// Chronological one-minute bars closing at the given prices.
pub fn candles(closes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open_time: start + Duration::minutes(i as i64),
            open:      close - 0.5,
            high:      close + 1.0,
            low:       close - 1.0,
            close,
            volume:    10.0,
        })
        .collect()
}

pub fn raw_position(pos: &str, upl: &str) -> RawPosition {
    RawPosition {
        inst_id:   "BTC-USDT-SWAP".into(),
        pos:       Some(pos.into()),
        avg_px:    Some("65000".into()),
        mark_px:   Some("65100".into()),
        upl:       Some(upl.into()),
        lever:     Some("10".into()),
        imr:       Some("65".into()),
        mmr:       Some("2".into()),
        mgn_ratio: Some("0.35".into()),
        liq_px:    Some("59000".into()),
    }
}

pub fn usdt_balance(avail_bal: &str, eq: &str) -> RawBalance {
    RawBalance {
        total_eq: None,
        avail_eq: None,
        eq_usd:   None,
        details:  vec![RawBalanceDetail {
            ccy:       "USDT".into(),
            avail_bal: Some(avail_bal.into()),
            avail_eq:  None,
            eq:        Some(eq.into()),
            cash_bal:  None,
        }],
    }
}

#[async_trait]
impl Exchange for ScriptedExchange {
    async fn get_candles(
        &self,
        _instrument: &str,
        _timeframe: Timeframe,
        _limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.candles
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ExchangeError::Malformed("scripted candle outage".into()))
    }

    async fn get_position(&self, _instrument: &str) -> Result<Option<RawPosition>, ExchangeError> {
        let mut queue = self.positions.lock().unwrap();
        let next = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        Ok(next.flatten())
    }

    async fn get_balance(&self, _currency: &str) -> Result<RawBalance, ExchangeError> {
        let call = self.balance_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.balance_outages.lock().unwrap().contains(&call) {
            return Err(ExchangeError::Malformed("scripted balance blip".into()));
        }
        self.balance.lock().unwrap().clone().ok_or(ExchangeError::Http {
            status: 503,
            body:   "scripted outage".into(),
        })
    }

    async fn submit_market_order(&self, order: &MarketOrder) -> Result<OrderReceipt, ExchangeError> {
        let behaviour = self.order_behaviour.lock().unwrap().clone();
        match behaviour {
            OrderBehaviour::Accept => {
                let mut submitted = self.submitted.lock().unwrap();
                submitted.push(order.clone());
                Ok(OrderReceipt {
                    order_id:        format!("ord-{}", submitted.len()),
                    client_order_id: order.client_order_id.clone(),
                })
            }
            OrderBehaviour::Reject(reason) => {
                self.submitted.lock().unwrap().push(order.clone());
                Err(ExchangeError::Rejected { code: "51008".into(), msg: reason })
            }
            OrderBehaviour::Unreachable => Err(ExchangeError::Http {
                status: 502,
                body:   "scripted gateway failure".into(),
            }),
        }
    }

    async fn get_order(&self, _instrument: &str, _order_id: &str) -> Result<OrderFill, ExchangeError> {
        let last = self.submitted.lock().unwrap().last().cloned();
        let size = last.map(|o| o.size).unwrap_or(0.0);
        Ok(OrderFill {
            state:        "filled".into(),
            filled_size:  size,
            average_px:   65000.0,
            realized_pnl: *self.fill_pnl.lock().unwrap(),
        })
    }

    async fn set_leverage(&self, _instrument: &str, leverage: u32) -> Result<(), ExchangeError> {
        self.leverage_calls.lock().unwrap().push(leverage);
        Ok(())
    }
}
