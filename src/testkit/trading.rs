//! Scripted [`TradingApi`] mock.
//!
//! Market-order results pop from a FIFO queue; `fetch_order` responses are
//! scripted per order id and the last state repeats once the script runs
//! out, mirroring how a venue keeps reporting a terminal order.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::domain::{Balance, ExecutedOrder, OrderSide, Symbol, Venue};
use crate::error::{Error, Result};
use crate::exchange::TradingApi;

#[derive(Default)]
struct Inner {
    market_results: VecDeque<Result<ExecutedOrder>>,
    limit_results: VecDeque<Result<ExecutedOrder>>,
    fetch_scripts: HashMap<String, VecDeque<ExecutedOrder>>,
    balances: HashMap<Venue, Vec<Balance>>,
    canceled: Vec<String>,
}

pub struct ScriptedTradingApi {
    inner: Mutex<Inner>,
    market_count: Arc<AtomicU32>,
    cancel_count: Arc<AtomicU32>,
}

impl ScriptedTradingApi {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            market_count: Arc::new(AtomicU32::new(0)),
            cancel_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_market_order(self, result: Result<ExecutedOrder>) -> Self {
        self.inner.lock().market_results.push_back(result);
        self
    }

    pub fn with_limit_order(self, result: Result<ExecutedOrder>) -> Self {
        self.inner.lock().limit_results.push_back(result);
        self
    }

    pub fn with_fetch_script(self, order_id: &str, states: Vec<ExecutedOrder>) -> Self {
        self.inner
            .lock()
            .fetch_scripts
            .insert(order_id.to_string(), states.into());
        self
    }

    pub fn with_balances(self, venue: Venue, balances: Vec<Balance>) -> Self {
        self.inner.lock().balances.insert(venue, balances);
        self
    }

    pub fn market_order_count(&self) -> u32 {
        self.market_count.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> u32 {
        self.cancel_count.load(Ordering::SeqCst)
    }

    pub fn canceled_orders(&self) -> Vec<String> {
        self.inner.lock().canceled.clone()
    }
}

impl Default for ScriptedTradingApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradingApi for ScriptedTradingApi {
    async fn create_market_order(
        &self,
        venue: Venue,
        symbol: &Symbol,
        _side: OrderSide,
        _amount: Decimal,
    ) -> Result<ExecutedOrder> {
        self.market_count.fetch_add(1, Ordering::SeqCst);
        self.inner
            .lock()
            .market_results
            .pop_front()
            .unwrap_or_else(|| {
                Err(Error::Execution(format!(
                    "no scripted market order for {venue} {symbol}"
                )))
            })
    }

    async fn create_limit_order(
        &self,
        venue: Venue,
        symbol: &Symbol,
        _side: OrderSide,
        _amount: Decimal,
        _price: Decimal,
    ) -> Result<ExecutedOrder> {
        self.inner
            .lock()
            .limit_results
            .pop_front()
            .unwrap_or_else(|| {
                Err(Error::Execution(format!(
                    "no scripted limit order for {venue} {symbol}"
                )))
            })
    }

    async fn fetch_order(
        &self,
        _venue: Venue,
        order_id: &str,
        _symbol: &Symbol,
    ) -> Result<ExecutedOrder> {
        let mut inner = self.inner.lock();
        let Some(script) = inner.fetch_scripts.get_mut(order_id) else {
            return Err(Error::Execution(format!("unknown order {order_id}")));
        };
        match script.len() {
            0 => Err(Error::Execution(format!("script exhausted for {order_id}"))),
            1 => Ok(script.front().expect("len checked").clone()),
            _ => Ok(script.pop_front().expect("len checked")),
        }
    }

    async fn cancel_order(&self, _venue: Venue, order_id: &str, _symbol: &Symbol) -> Result<()> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        self.inner.lock().canceled.push(order_id.to_string());
        Ok(())
    }

    async fn fetch_balances(&self, venue: Venue) -> Result<Vec<Balance>> {
        Ok(self
            .inner
            .lock()
            .balances
            .get(&venue)
            .cloned()
            .unwrap_or_default())
    }
}
