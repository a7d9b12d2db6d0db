//! Scripted venue for execution tests.
//!
//! Every hop fills at the order's expected output unless its pool has been
//! scripted with a different behavior.

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::arbitrage::routing::executor::{HopOrder, HopReceipt, TradeExecutor};
use crate::error::{Result, RoutingError};

#[derive(Debug, Clone, PartialEq)]
pub enum HopBehavior {
    /// Fill at the expected output
    Confirm,
    /// Reject every submission as fatal
    Fatal,
    /// Reject the first `n` submissions as transient, then fill
    TransientFailures(u32),
    /// Fill `fraction` below the expected output
    Slip(f64),
    /// Fill after sleeping
    Delay(Duration),
    /// Never confirm
    Hang,
}

#[derive(Debug, Default)]
struct VenueState {
    behaviors: HashMap<Pubkey, HopBehavior>,
    attempts: HashMap<Pubkey, u32>,
    orders: Vec<HopOrder>,
}

#[derive(Debug, Default)]
pub struct ScriptedTradeExecutor {
    state: Mutex<VenueState>,
}

impl ScriptedTradeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, pool: Pubkey, behavior: HopBehavior) {
        if let Ok(mut state) = self.state.lock() {
            state.behaviors.insert(pool, behavior);
        }
    }

    /// Total submissions seen, retries included
    pub fn submissions(&self) -> usize {
        self.state.lock().map(|s| s.orders.len()).unwrap_or(0)
    }

    pub fn submissions_for(&self, pool: &Pubkey) -> usize {
        self.state
            .lock()
            .map(|s| s.orders.iter().filter(|o| &o.pool == pool).count())
            .unwrap_or(0)
    }

    pub fn orders(&self) -> Vec<HopOrder> {
        self.state.lock().map(|s| s.orders.clone()).unwrap_or_default()
    }

    fn record(&self, order: &HopOrder) -> (HopBehavior, u32) {
        match self.state.lock() {
            Ok(mut state) => {
                state.orders.push(order.clone());
                let attempt = {
                    let counter = state.attempts.entry(order.pool).or_insert(0);
                    *counter += 1;
                    *counter
                };
                let behavior = state
                    .behaviors
                    .get(&order.pool)
                    .cloned()
                    .unwrap_or(HopBehavior::Confirm);
                (behavior, attempt)
            }
            Err(_) => (HopBehavior::Fatal, 0),
        }
    }
}

fn receipt(order: &HopOrder, amount_out: f64) -> HopReceipt {
    HopReceipt {
        signature: format!(
            "mock-{}-{}-{}",
            order.execution_id, order.leg_index, order.hop_index
        ),
        pool: order.pool,
        hop_index: order.hop_index,
        amount_in: order.amount_in,
        amount_out,
        confirmed_at: Utc::now(),
    }
}

#[async_trait]
impl TradeExecutor for ScriptedTradeExecutor {
    async fn execute_hop(&self, order: &HopOrder) -> Result<HopReceipt> {
        let (behavior, attempt) = self.record(order);
        debug!(
            "Mock venue: pool {} attempt {} -> {:?}",
            order.pool, attempt, behavior
        );

        match behavior {
            HopBehavior::Confirm => Ok(receipt(order, order.expected_amount_out)),
            HopBehavior::Fatal => Err(RoutingError::ExecutionFatal(format!(
                "pool {} rejected the swap",
                order.pool
            ))),
            HopBehavior::TransientFailures(n) if attempt <= n => Err(
                RoutingError::ExecutionTransient(format!("pool {} busy", order.pool)),
            ),
            HopBehavior::TransientFailures(_) => Ok(receipt(order, order.expected_amount_out)),
            HopBehavior::Slip(fraction) => {
                Ok(receipt(order, order.expected_amount_out * (1.0 - fraction)))
            }
            HopBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(receipt(order, order.expected_amount_out))
            }
            HopBehavior::Hang => {
                futures::future::pending::<()>().await;
                Err(RoutingError::Timeout("venue never answered".to_string()))
            }
        }
    }
}
