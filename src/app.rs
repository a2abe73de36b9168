//! Application wiring and the event dispatch loop.
//!
//! One ingest task per venue feeds a single dispatcher channel. The
//! dispatcher applies events to the registries, triggers detection on
//! ticks, and spawns one execution task per actionable opportunity.
//! Shutdown drains: adapters stop, in-flight trades get a bounded grace
//! period, the journal flushes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::adapter::{build_stream, PaperTradingApi};
use crate::config::Config;
use crate::detector::{CrossVenueDetector, OpportunityStore, TriangularDetector};
use crate::domain::{Opportunity, Venue};
use crate::error::Result;
use crate::exchange::{MarketEvent, TradingApi, VenueStream};
use crate::executor::OrderExecutor;
use crate::orchestrator::{
    CrossOrchestrator, ExecutionConfig, TradeServices, TradeStrategy, TriangularOrchestrator,
};
use crate::registry::{BookRegistry, PriceRegistry};
use crate::service::{BalanceLedger, RiskManager, TransactionJournal};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct App;

struct Trading {
    cross: Arc<CrossOrchestrator>,
    triangular: Arc<TriangularOrchestrator>,
    journal: TransactionJournal,
    journal_task: tokio::task::JoinHandle<()>,
}

impl App {
    pub async fn run(config: Config) -> Result<()> {
        let prices = Arc::new(PriceRegistry::new());
        let books = Arc::new(BookRegistry::new());
        let store = Arc::new(OpportunityStore::new());

        let cross_detector = Arc::new(CrossVenueDetector::new(
            config.cross.clone(),
            prices.clone(),
            books.clone(),
            store.clone(),
        ));
        let triangular_detector = Arc::new(TriangularDetector::new(
            config.triangular.detector.clone(),
            config.triangular.paths.clone(),
            prices.clone(),
            books.clone(),
            store.clone(),
        ));

        let venues = config.active_venues();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let trading = init_trading(&config, &books, &venues, shutdown_rx.clone()).await;

        let (event_tx, mut event_rx) = mpsc::channel::<MarketEvent>(EVENT_CHANNEL_CAPACITY);
        let mut ingest_tasks = JoinSet::new();
        for &venue in &venues {
            let Some(venue_config) = config.venues.get(&venue).cloned() else {
                continue;
            };
            let stream = build_stream(
                venue,
                &venue_config.ws_url,
                venue_config.rest_url.as_deref(),
                venue_config.reconnect.clone(),
                config.engine.throttle(),
            )?;
            let tx = event_tx.clone();
            let symbols = config.engine.symbols.clone();
            let shutdown = shutdown_rx.clone();
            ingest_tasks.spawn(run_ingest(stream, symbols, tx, shutdown));
        }
        drop(event_tx);

        info!(
            venues = venues.len(),
            symbols = config.engine.symbols.len(),
            trading = trading.is_some(),
            "Engine started"
        );

        let mut trade_tasks = JoinSet::new();
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        warn!("All venue streams ended");
                        break;
                    };
                    handle_event(
                        event,
                        &prices,
                        &books,
                        &cross_detector,
                        &triangular_detector,
                        trading.as_ref(),
                        &mut trade_tasks,
                    );
                    // Keep the completed-task set from growing unbounded.
                    while trade_tasks.try_join_next().is_some() {}
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received, draining");
                    break;
                }
            }
        }

        let _ = shutdown_tx.send(true);
        ingest_tasks.abort_all();

        if let Some(trading) = trading {
            let grace = Duration::from_secs(config.trading.drain_grace_secs);
            let drained = tokio::time::timeout(grace, async {
                while trade_tasks.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(grace_secs = grace.as_secs(), "Drain grace expired, aborting trades");
                trade_tasks.abort_all();
            }
            trading.journal.shutdown().await;
            let _ = trading.journal_task.await;
        }

        info!("Engine stopped");
        Ok(())
    }
}

/// Build the trade pipeline, or return `None` for detection-only mode.
async fn init_trading(
    config: &Config,
    books: &Arc<BookRegistry>,
    venues: &[Venue],
    shutdown: watch::Receiver<bool>,
) -> Option<Trading> {
    let api: Arc<dyn TradingApi> = if config.trading.test_mode {
        let paper = PaperTradingApi::new(books.clone());
        for seed in &config.balance.paper {
            paper.seed_balance(seed.venue, &seed.currency, seed.amount);
        }
        info!("Paper trading API active (TEST_MODE)");
        Arc::new(paper)
    } else {
        // Live order routing plugs in behind TradingApi; until one is
        // wired the engine only detects and logs opportunities.
        warn!("No live trading API wired - detection only mode");
        return None;
    };

    let balances = Arc::new(BalanceLedger::new(api.clone()));
    balances.refresh_all(venues).await;
    tokio::spawn(balances.clone().run_refresher(
        venues.to_vec(),
        Duration::from_secs(config.balance.refresh_secs),
        shutdown,
    ));

    let risk = Arc::new(RiskManager::new(config.risk.clone(), balances.clone()));
    let (journal, journal_task) = TransactionJournal::spawn(config.journal.dir.clone());
    let executor = Arc::new(OrderExecutor::new(api));

    let services = TradeServices {
        risk,
        balances: balances.clone(),
        executor,
        journal: journal.clone(),
    };
    let execution: ExecutionConfig = config.trading.execution.clone();

    Some(Trading {
        cross: Arc::new(CrossOrchestrator::new(services.clone(), execution.clone())),
        triangular: Arc::new(TriangularOrchestrator::new(services, execution)),
        journal,
        journal_task,
    })
}

/// Pump one venue stream into the dispatcher channel.
async fn run_ingest(
    mut stream: Box<dyn VenueStream>,
    symbols: Vec<crate::domain::Symbol>,
    tx: mpsc::Sender<MarketEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let venue = stream.venue();
    if let Err(e) = stream.connect().await {
        error!(venue = %venue, error = %e, "Initial connect failed");
        // The reconnect wrapper takes over from the first next_event call.
    } else if let Err(e) = stream.subscribe(&symbols).await {
        error!(venue = %venue, error = %e, "Subscribe failed");
    }

    loop {
        tokio::select! {
            event = stream.next_event() => {
                let Some(event) = event else {
                    info!(venue = %venue, "Venue stream ended");
                    break;
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(venue = %venue, "Ingest stopping");
                    break;
                }
            }
        }
    }
}

fn handle_event(
    event: MarketEvent,
    prices: &Arc<PriceRegistry>,
    books: &Arc<BookRegistry>,
    cross_detector: &Arc<CrossVenueDetector>,
    triangular_detector: &Arc<TriangularDetector>,
    trading: Option<&Trading>,
    trade_tasks: &mut JoinSet<()>,
) {
    let now_ms = Utc::now().timestamp_millis();
    match event {
        MarketEvent::Tick(tick) => {
            let venue = tick.venue;
            let symbol = tick.symbol.clone();
            prices.update(tick);

            for opp in cross_detector.on_tick(&symbol, now_ms) {
                spawn_trade(trading, trade_tasks, Opportunity::CrossExchange(opp));
            }
            for opp in triangular_detector.on_tick(venue, &symbol, now_ms) {
                spawn_trade(trading, trade_tasks, Opportunity::Triangular(opp));
            }
        }
        event @ (MarketEvent::BookSnapshot { .. }
        | MarketEvent::BookDelta { .. }
        | MarketEvent::BookInvalidate { .. }) => {
            books.apply(&event, now_ms);
        }
        MarketEvent::Connected { venue } => {
            info!(venue = %venue, "Venue connected");
        }
        MarketEvent::Disconnected { venue, reason } => {
            warn!(venue = %venue, reason = %reason, "Venue disconnected");
        }
        MarketEvent::ConnectionLost { venue } => {
            error!(venue = %venue, "Venue connection lost; operator restart required");
            books.invalidate_venue(venue);
        }
    }
}

fn spawn_trade(
    trading: Option<&Trading>,
    trade_tasks: &mut JoinSet<()>,
    opportunity: Opportunity,
) {
    let Some(trading) = trading else {
        info!(
            id = opportunity.id(),
            kind = opportunity.kind().as_str(),
            "Opportunity detected (detection-only mode)"
        );
        return;
    };
    let cross = trading.cross.clone();
    let triangular = trading.triangular.clone();
    trade_tasks.spawn(async move {
        let attempt = match &opportunity {
            Opportunity::CrossExchange(_) => cross.execute(&opportunity).await,
            Opportunity::Triangular(_) => triangular.execute(&opportunity).await,
        };
        info!(
            trade_id = %attempt.id,
            status = ?attempt.status,
            realized = ?attempt.realized_profit,
            "Trade attempt finished"
        );
    });
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
