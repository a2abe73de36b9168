//! Triangular trade orchestration.
//!
//! Legs execute sequentially on one venue, each leg's output funding the
//! next. A mid-cycle failure leaves the venue holding the intermediate
//! currency; no automatic unwind is attempted and the journal carries the
//! per-leg fills for operator action.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::{
    LegSide, Opportunity, OpportunityKind, OrderSide, TradeAttempt, TradeStatus,
    TriangularOpportunity,
};
use crate::service::{FundsRequirement, RiskCandidate};

use super::{now_ms, order_request, ExecutionConfig, TradeServices, TradeStrategy};

pub struct TriangularOrchestrator {
    services: TradeServices,
    config: ExecutionConfig,
}

impl TriangularOrchestrator {
    pub fn new(services: TradeServices, config: ExecutionConfig) -> Self {
        Self { services, config }
    }

    pub async fn run(&self, opp: &TriangularOpportunity) -> TradeAttempt {
        let services = &self.services;
        let mut trade = TradeAttempt::new(
            &opp.id,
            OpportunityKind::Triangular,
            opp.profit(),
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

        // Only the start currency is reserved; intermediate holdings exist
        // for milliseconds and are not separately lockable.
        let start_currency = start_currency(opp);
        if let Err(e) =
            services
                .balances
                .lock(&trade.id, opp.venue, &start_currency, opp.start_amount)
        {
            services
                .terminate(&mut trade, TradeStatus::Failed, e.to_string())
                .await;
            return trade;
        }

        services.risk.begin_trade(OpportunityKind::Triangular);
        self.execute_cycle(&mut trade, opp).await;

        services.balances.release_all(&trade.id);
        services.balances.refresh_all(&[opp.venue]).await;
        services.risk.end_trade(OpportunityKind::Triangular);
        trade
    }

    async fn execute_cycle(&self, trade: &mut TradeAttempt, opp: &TriangularOpportunity) {
        let services = &self.services;
        services.transition(trade, TradeStatus::Executing).await;

        let mut amount = opp.start_amount;

        for (index, leg) in opp.legs.iter().enumerate() {
            // Convert the running amount into the base quantity this leg
            // trades: buys size off the effective price, sells pass the
            // held base through.
            let base_amount = match leg.side {
                LegSide::Buy => {
                    if leg.effective_price.is_zero() {
                        services
                            .terminate(trade, TradeStatus::Failed, "zero effective price")
                            .await;
                        return;
                    }
                    amount / leg.effective_price
                }
                LegSide::Sell => amount,
            };
            let side = match leg.side {
                LegSide::Buy => OrderSide::Buy,
                LegSide::Sell => OrderSide::Sell,
            };
            let request = order_request(
                opp.venue,
                leg.symbol.clone(),
                side,
                base_amount,
                Some(leg.effective_price),
                &self.config,
            );

            let placed = match services
                .place_with_retry(&request, self.config.order_retry_attempts)
                .await
            {
                Ok(order) => order,
                Err(e) => {
                    warn!(
                        trade_id = %trade.id,
                        leg = index + 1,
                        error = %e,
                        "Triangular leg placement failed, position left in intermediate currency"
                    );
                    services
                        .terminate(
                            trade,
                            TradeStatus::Failed,
                            format!("leg {} placement failed: {e}", index + 1),
                        )
                        .await;
                    return;
                }
            };
            trade.orders.push(placed.clone());

            if index == 0 {
                services.transition(trade, TradeStatus::Monitoring).await;
            }

            let settled = if placed.status.is_terminal() {
                placed
            } else {
                match services
                    .executor
                    .wait_for_terminal(
                        opp.venue,
                        &placed.order_id,
                        &leg.symbol,
                        self.config.order_timeout_ms,
                        self.config.poll_ms,
                    )
                    .await
                {
                    Ok(order) => order,
                    Err(e) => {
                        let _ = services
                            .executor
                            .cancel(opp.venue, &placed.order_id, &leg.symbol)
                            .await;
                        services
                            .terminate(
                                trade,
                                TradeStatus::Failed,
                                format!("leg {} fill wait failed: {e}", index + 1),
                            )
                            .await;
                        return;
                    }
                }
            };
            if let Some(last) = trade.orders.last_mut() {
                *last = settled.clone();
            }

            if !settled.is_filled() {
                services
                    .terminate(
                        trade,
                        TradeStatus::Failed,
                        format!("leg {} not filled ({:?})", index + 1, settled.status),
                    )
                    .await;
                return;
            }

            // Output of a buy is the base received; output of a sell is the
            // quote proceeds net of fee.
            amount = match leg.side {
                LegSide::Buy => settled.filled,
                LegSide::Sell => settled.cost - settled.fee,
            };
        }

        let end_amount = amount;
        let realized = end_amount - opp.start_amount;
        services.check_realized_sanity(trade, realized);
        trade.realized_profit = Some(realized);
        services.risk.record(realized);
        info!(
            trade_id = %trade.id,
            start = %opp.start_amount,
            end = %end_amount,
            realized = %realized,
            "Triangular cycle completed"
        );
        services.transition(trade, TradeStatus::Completed).await;
    }
}

/// The currency spent by the first leg: quote for a buy, base for a sell.
fn start_currency(opp: &TriangularOpportunity) -> String {
    let first = &opp.legs[0];
    match first.side {
        LegSide::Buy => first.symbol.quote().to_string(),
        LegSide::Sell => first.symbol.base().to_string(),
    }
}

fn candidate_for(opp: &TriangularOpportunity) -> RiskCandidate {
    RiskCandidate {
        kind: OpportunityKind::Triangular,
        venues: vec![opp.venue],
        symbols: opp.legs.iter().map(|l| l.symbol.clone()).collect(),
        profit_percent: opp.profit_percent(),
        position_value: opp.start_amount,
        required_funds: vec![FundsRequirement {
            venue: opp.venue,
            currency: start_currency(opp),
            amount: opp.start_amount,
        }],
    }
}

#[async_trait]
impl TradeStrategy for TriangularOrchestrator {
    fn kind(&self) -> OpportunityKind {
        OpportunityKind::Triangular
    }

    async fn execute(&self, opportunity: &Opportunity) -> TradeAttempt {
        match opportunity {
            Opportunity::Triangular(opp) => self.run(opp).await,
            other => {
                let mut trade = TradeAttempt::new(
                    other.id(),
                    OpportunityKind::Triangular,
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
