//! Spot exchange core simulation.
//!
//! Walks the exchange through admission, matching, settlement and
//! cancellation, then runs a threaded burst through the match workers and
//! audits the ledger. Set `RUST_LOG=spot_core=debug` for per-step logs and
//! `SPOT_ENV` to pick a config preset.

use rust_decimal_macros::dec;
use spot_core::*;
use std::error::Error;
use std::sync::Arc;
use std::thread;
use tracing::info;
use tracing_subscriber::EnvFilter;

type SimResult = Result<(), Box<dyn Error>>;

fn main() -> SimResult {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,spot_core=info")),
        )
        .init();

    let environment = Environment::from_env()?;
    info!(?environment, "Starting spot exchange simulation");

    println!("Spot Exchange Core Simulation");
    println!("Limit orders, price-time priority, taker fee\n");

    scenario_1_fee_on_taker(environment)?;
    scenario_2_price_and_time_priority(environment)?;
    scenario_3_spread_refund(environment)?;
    scenario_4_cancellation(environment)?;
    scenario_5_concurrent_workers(environment)?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn exchange(environment: Environment) -> Result<Exchange, ConfigError> {
    Exchange::new(environment.config(), EngineConfig::default())
}

/// One maker, one taker, fee charged to the taker only.
fn scenario_1_fee_on_taker(environment: Environment) -> SimResult {
    println!("Scenario 1: Fee On Taker\n");

    let ex = exchange(environment)?;
    let buyer = ex.create_user();
    let seller = ex.create_user();
    ex.deposit_cash(buyer, dec!(100000))?;
    ex.deposit_asset(seller, "BTC", dec!(10))?;

    ex.place_order(seller, "BTC", Side::Sell, dec!(50000), dec!(1))?;
    let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(50000), dec!(1))?;
    println!("  Seller rests SELL 1 BTC @ $50,000, buyer sends BUY 1 BTC @ $50,000");

    if let Some(trade) = ex.attempt_match(bid.id)? {
        println!(
            "  Trade {}: {} BTC @ ${}, volume ${}, fee ${}",
            trade.id, trade.amount, trade.price, trade.volume, trade.fee
        );
    }

    print_cash(&ex, "Buyer", buyer);
    print_cash(&ex, "Seller", seller);
    println!("  Fees collected: ${}\n", ex.fees_collected());
    Ok(())
}

/// Best price first, earliest first within a price.
fn scenario_2_price_and_time_priority(environment: Environment) -> SimResult {
    println!("Scenario 2: Price-Time Priority\n");

    let ex = exchange(environment)?;
    let mm1 = ex.create_user();
    let mm2 = ex.create_user();
    let taker = ex.create_user();
    for mm in [mm1, mm2] {
        ex.deposit_asset(mm, "ETH", dec!(20))?;
    }
    ex.deposit_cash(taker, dec!(100000))?;

    ex.place_order(mm1, "ETH", Side::Sell, dec!(2010), dec!(2))?;
    ex.place_order(mm1, "ETH", Side::Sell, dec!(2000), dec!(1))?;
    ex.place_order(mm2, "ETH", Side::Sell, dec!(2000), dec!(1))?;
    ex.place_order(mm2, "ETH", Side::Sell, dec!(2020), dec!(2))?;

    let book = ex.order_book("ETH")?;
    for level in &book.ask_levels {
        println!("  Ask ${}: {} ETH in {} orders", level.price, level.total_amount, level.order_count);
    }

    let order = ex.place_order(taker, "ETH", Side::Buy, dec!(2015), dec!(3.5))?;
    let sweep = ex.match_until_idle(order.id)?;
    for trade in &sweep.trades {
        println!(
            "  Filled {} ETH @ ${} against order {}",
            trade.amount, trade.price, trade.sell_order_id
        );
    }

    if let Some(rest) = ex.order(order.id) {
        println!("  Taker {} with {} ETH left\n", rest.status, rest.remaining_amount);
    }
    Ok(())
}

/// Buyer bids above the ask, the difference comes back.
fn scenario_3_spread_refund(environment: Environment) -> SimResult {
    println!("Scenario 3: Spread Refund\n");

    let ex = exchange(environment)?;
    let buyer = ex.create_user();
    let seller = ex.create_user();
    ex.deposit_cash(buyer, dec!(1000))?;
    ex.deposit_asset(seller, "SOL", dec!(1))?;

    ex.place_order(seller, "SOL", Side::Sell, dec!(100), dec!(1))?;
    let bid = ex.place_order(buyer, "SOL", Side::Buy, dec!(110), dec!(1))?;
    print_cash(&ex, "Buyer after locking $110", buyer);

    ex.attempt_match(bid.id)?;
    print_cash(&ex, "Buyer after fill @ $100", buyer);
    if let Some(holding) = ex.holding(buyer, "SOL") {
        println!("  Buyer holds {} SOL\n", holding.available);
    }
    Ok(())
}

fn scenario_4_cancellation(environment: Environment) -> SimResult {
    println!("Scenario 4: Cancellation\n");

    let ex = exchange(environment)?;
    let user = ex.create_user();
    ex.deposit_asset(user, "BTC", dec!(3))?;

    let ask = ex.place_order(user, "BTC", Side::Sell, dec!(60000), dec!(2))?;
    let cancel = ex.cancel_order(user, ask.id)?;
    println!("  Cancelled {}, released {} BTC", cancel.order.id, cancel.released_asset);

    match ex.cancel_order(user, ask.id) {
        Ok(_) => println!("  Second cancel unexpectedly succeeded"),
        Err(e) => println!("  Second cancel rejected ({:?}): {}\n", e.kind(), e),
    }
    Ok(())
}

/// Traders on several threads, matching on a worker pool.
fn scenario_5_concurrent_workers(environment: Environment) -> SimResult {
    println!("Scenario 5: Concurrent Workers\n");

    let ex = Arc::new(exchange(environment)?);
    let (trigger, rx) = ChannelTrigger::channel();
    ex.set_trigger(Arc::new(trigger));
    let workers = MatchWorkers::spawn(Arc::clone(&ex), rx, 4);

    let traders: Vec<UserId> = (0..8).map(|_| ex.create_user()).collect();
    for &trader in &traders {
        ex.deposit_cash(trader, dec!(1000000))?;
        ex.deposit_asset(trader, "BTC", dec!(100))?;
    }

    let handles: Vec<_> = traders
        .iter()
        .enumerate()
        .map(|(i, &trader)| {
            let ex = Arc::clone(&ex);
            thread::spawn(move || {
                let mut rejected = 0usize;
                for n in 0..50u32 {
                    let side = if (i + n as usize) % 2 == 0 { Side::Buy } else { Side::Sell };
                    let price = dec!(50000) + rust_decimal::Decimal::from(n % 7) * dec!(10);
                    if ex.place_order(trader, "BTC", side, price, dec!(0.1)).is_err() {
                        rejected += 1;
                    }
                }
                rejected
            })
        })
        .collect();

    let rejected: usize = handles.into_iter().filter_map(|h| h.join().ok()).sum();

    ex.clear_trigger();
    let stats = workers.join();

    let report = ex.solvency_report();
    println!(
        "  {} orders swept by {} workers, {} fills, {} rejected at admission",
        stats.orders_swept, 4, stats.fills, rejected
    );
    println!("  Trades recorded: {}", ex.trade_count());
    println!(
        "  Cash: deposited ${}, accounted ${} (fees ${})",
        report.cash_deposited,
        report.cash_accounted(),
        report.fees_collected
    );
    println!("  Solvent: {}", report.is_solvent());
    Ok(())
}

fn print_cash(ex: &Exchange, label: &str, user: UserId) {
    if let Some(account) = ex.user(user) {
        println!("  {label}: cash ${}", account.cash_balance);
    }
}
