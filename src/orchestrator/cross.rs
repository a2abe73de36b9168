//! Cross-venue trade orchestration.
//!
//! Buys on one venue and sells on another in parallel. There is no global
//! atomicity across venues: if only one leg fills, the trade terminates as
//! PARTIAL with both order states journaled, and remediation is left to the
//! operator (moving the base asset between venues is out of scope).

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::{
    CrossOpportunity, ExecutedOrder, Opportunity, OpportunityKind, OrderSide, TradeAttempt,
    TradeStatus,
};
use crate::service::{FundsRequirement, RiskCandidate};

use super::{now_ms, order_request, ExecutionConfig, TradeServices, TradeStrategy};

pub struct CrossOrchestrator {
    services: TradeServices,
    config: ExecutionConfig,
}

impl CrossOrchestrator {
    pub fn new(services: TradeServices, config: ExecutionConfig) -> Self {
        Self { services, config }
    }

    pub async fn run(&self, opp: &CrossOpportunity) -> TradeAttempt {
        let services = &self.services;
        let mut trade = TradeAttempt::new(
            &opp.id,
            OpportunityKind::CrossExchange,
            opp.net_profit,
            now_ms(),
        );
        services.journal.record(&trade).await;

        let approval = services.risk.evaluate(&candidate_for(opp));
        if !approval.approved {
            services
                .terminate(&mut trade, TradeStatus::Rejected, approval.reasons.join("; "))
                .await;
            return trade;
        }
        services.transition(&mut trade, TradeStatus::Approved).await;

        // Reserve quote on the buy side and base on the sell side.
        let quote = opp.symbol.quote().to_string();
        let base = opp.symbol.base().to_string();
        let trade_value = opp.trade_value();
        if let Err(e) = services
            .balances
            .lock(&trade.id, opp.buy_venue, &quote, trade_value)
        {
            services
                .terminate(&mut trade, TradeStatus::Failed, e.to_string())
                .await;
            return trade;
        }
        if let Err(e) = services
            .balances
            .lock(&trade.id, opp.sell_venue, &base, opp.trade_size)
        {
            services.balances.release_all(&trade.id);
            services
                .terminate(&mut trade, TradeStatus::Failed, e.to_string())
                .await;
            return trade;
        }

        services.risk.begin_trade(OpportunityKind::CrossExchange);
        self.execute_legs(&mut trade, opp).await;

        // Terminal housekeeping runs on every path out of execution.
        services.balances.release_all(&trade.id);
        services
            .balances
            .refresh_all(&[opp.buy_venue, opp.sell_venue])
            .await;
        services.risk.end_trade(OpportunityKind::CrossExchange);
        trade
    }

    async fn execute_legs(&self, trade: &mut TradeAttempt, opp: &CrossOpportunity) {
        let services = &self.services;
        services.transition(trade, TradeStatus::Executing).await;

        let buy_request = order_request(
            opp.buy_venue,
            opp.symbol.clone(),
            OrderSide::Buy,
            opp.trade_size,
            Some(opp.metrics.effective_buy_price),
            &self.config,
        );
        let sell_request = order_request(
            opp.sell_venue,
            opp.symbol.clone(),
            OrderSide::Sell,
            opp.trade_size,
            Some(opp.metrics.effective_sell_price),
            &self.config,
        );

        let attempts = self.config.order_retry_attempts;
        let (buy_placed, sell_placed) = tokio::join!(
            services.place_with_retry(&buy_request, attempts),
            services.place_with_retry(&sell_request, attempts),
        );

        match (buy_placed, sell_placed) {
            (Ok(buy), Ok(sell)) => {
                trade.orders = vec![buy.clone(), sell.clone()];
                services.transition(trade, TradeStatus::Monitoring).await;

                let (buy_final, sell_final) =
                    tokio::join!(self.settle(buy), self.settle(sell));
                trade.orders = vec![buy_final.clone(), sell_final.clone()];

                match (buy_final.is_filled(), sell_final.is_filled()) {
                    (true, true) => {
                        let realized = (sell_final.cost - sell_final.fee)
                            - (buy_final.cost + buy_final.fee);
                        services.check_realized_sanity(trade, realized);
                        trade.realized_profit = Some(realized);
                        services.risk.record(realized);
                        info!(
                            trade_id = %trade.id,
                            realized = %realized,
                            "Cross-venue trade completed"
                        );
                        services.transition(trade, TradeStatus::Completed).await;
                    }
                    (true, false) | (false, true) => {
                        warn!(
                            trade_id = %trade.id,
                            buy_status = ?buy_final.status,
                            sell_status = ?sell_final.status,
                            "One leg filled, no cross-venue rollback attempted"
                        );
                        services
                            .terminate(
                                trade,
                                TradeStatus::Partial,
                                "one leg filled; counterleg unfilled",
                            )
                            .await;
                    }
                    (false, false) => {
                        services
                            .terminate(trade, TradeStatus::Failed, "neither leg filled")
                            .await;
                    }
                }
            }
            (Ok(placed), Err(e)) | (Err(e), Ok(placed)) => {
                trade.orders = vec![placed.clone()];
                services.transition(trade, TradeStatus::Monitoring).await;
                let settled = self.settle(placed).await;
                trade.orders = vec![settled.clone()];
                if settled.is_filled() {
                    services
                        .terminate(
                            trade,
                            TradeStatus::Partial,
                            format!("counterleg placement failed: {e}"),
                        )
                        .await;
                } else {
                    services
                        .terminate(
                            trade,
                            TradeStatus::Failed,
                            format!("leg placement failed: {e}"),
                        )
                        .await;
                }
            }
            (Err(buy_err), Err(sell_err)) => {
                services
                    .terminate(
                        trade,
                        TradeStatus::Failed,
                        format!("both placements failed: {buy_err}; {sell_err}"),
                    )
                    .await;
            }
        }
    }

    /// Drive one order to a terminal state. On timeout, request a
    /// best-effort cancel and report the last observed state; the order may
    /// still have filled in the meantime.
    async fn settle(&self, order: ExecutedOrder) -> ExecutedOrder {
        if order.status.is_terminal() {
            return order;
        }
        let executor = &self.services.executor;
        match executor
            .wait_for_terminal(
                order.venue,
                &order.order_id,
                &order.symbol,
                self.config.order_timeout_ms,
                self.config.poll_ms,
            )
            .await
        {
            Ok(settled) => settled,
            Err(e) => {
                warn!(order_id = %order.order_id, error = %e, "Fill wait failed, canceling");
                let _ = executor
                    .cancel(order.venue, &order.order_id, &order.symbol)
                    .await;
                executor
                    .poll(order.venue, &order.order_id, &order.symbol)
                    .await
                    .unwrap_or(order)
            }
        }
    }
}

fn candidate_for(opp: &CrossOpportunity) -> RiskCandidate {
    let trade_value = opp.trade_value();
    RiskCandidate {
        kind: OpportunityKind::CrossExchange,
        venues: vec![opp.buy_venue, opp.sell_venue],
        symbols: vec![opp.symbol.clone()],
        profit_percent: opp.net_profit_percent,
        position_value: trade_value,
        required_funds: vec![
            FundsRequirement {
                venue: opp.buy_venue,
                currency: opp.symbol.quote().to_string(),
                amount: trade_value,
            },
            FundsRequirement {
                venue: opp.sell_venue,
                currency: opp.symbol.base().to_string(),
                amount: opp.trade_size,
            },
        ],
    }
}

#[async_trait]
impl TradeStrategy for CrossOrchestrator {
    fn kind(&self) -> OpportunityKind {
        OpportunityKind::CrossExchange
    }

    async fn execute(&self, opportunity: &Opportunity) -> TradeAttempt {
        match opportunity {
            Opportunity::CrossExchange(opp) => self.run(opp).await,
            other => {
                let mut trade = TradeAttempt::new(
                    other.id(),
                    OpportunityKind::CrossExchange,
                    Decimal::ZERO,
                    now_ms(),
                );
                self.services
                    .terminate(
                        &mut trade,
                        TradeStatus::Rejected,
                        "opportunity kind mismatch",
                    )
                    .await;
                trade
            }
        }
    }
}
