//! Scenario tests for admission, matching, settlement and cancellation.
//!
//! Each test drives the public exchange API through one trading story and
//! checks balances, order state and the trade record at the end.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spot_core::*;
use std::sync::Arc;

fn exchange() -> Exchange {
    Exchange::new(ExchangeConfig::default(), EngineConfig::deterministic()).unwrap()
}

fn funded(ex: &Exchange, cash: Decimal, btc: Decimal) -> UserId {
    let user = ex.create_user();
    if cash > Decimal::ZERO {
        ex.deposit_cash(user, cash).unwrap();
    }
    if btc > Decimal::ZERO {
        ex.deposit_asset(user, "BTC", btc).unwrap();
    }
    user
}

fn cash(ex: &Exchange, user: UserId) -> Decimal {
    ex.user(user).unwrap().cash_balance.value()
}

mod fee_tests {
    use super::*;

    #[test]
    fn fee_charged_to_taker_only() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(100000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(10));

        let ask = ex.place_order(seller, "BTC", Side::Sell, dec!(50000), dec!(1)).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(50000), dec!(1)).unwrap();
        assert_eq!(cash(&ex, buyer), dec!(50000));

        let trade = ex.attempt_match(bid.id).unwrap().expect("orders cross");
        assert_eq!(trade.price.value(), dec!(50000));
        assert_eq!(trade.amount, dec!(1));
        assert_eq!(trade.volume.value(), dec!(50000));
        assert_eq!(trade.fee.value(), dec!(750));
        assert_eq!(trade.buy_order_id, bid.id);
        assert_eq!(trade.sell_order_id, ask.id);

        assert_eq!(cash(&ex, buyer), dec!(49250));
        assert_eq!(cash(&ex, seller), dec!(50000));
        assert_eq!(ex.order(bid.id).unwrap().status, OrderStatus::Filled);
        assert_eq!(ex.order(ask.id).unwrap().status, OrderStatus::Filled);
        assert_eq!(ex.fees_collected().value(), dec!(750));

        assert_eq!(ex.holding(buyer, "BTC").unwrap().available, dec!(1));
        let seller_btc = ex.holding(seller, "BTC").unwrap();
        assert_eq!(seller_btc.available, dec!(9));
        assert_eq!(seller_btc.locked, dec!(0));
    }

    #[test]
    fn sell_taker_pays_fee_out_of_proceeds() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(100000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(10));

        ex.place_order(buyer, "BTC", Side::Buy, dec!(50000), dec!(1)).unwrap();
        let ask = ex.place_order(seller, "BTC", Side::Sell, dec!(49000), dec!(1)).unwrap();

        let trade = ex.attempt_match(ask.id).unwrap().unwrap();
        // resting bid sets the price
        assert_eq!(trade.price.value(), dec!(50000));
        assert_eq!(trade.fee.value(), dec!(750));
        assert_eq!(cash(&ex, buyer), dec!(50000));
        assert_eq!(cash(&ex, seller), dec!(49250));
    }

    #[test]
    fn testnet_preset_trades_free() {
        let ex = Exchange::new(ExchangeConfig::testnet(), EngineConfig::deterministic()).unwrap();
        let buyer = funded(&ex, dec!(100), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(1));

        ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(1)).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(100), dec!(1)).unwrap();
        let trade = ex.attempt_match(bid.id).unwrap().unwrap();

        assert!(trade.fee.is_zero());
        assert_eq!(cash(&ex, buyer), dec!(0));
        assert_eq!(cash(&ex, seller), dec!(100));
    }
}

mod refund_tests {
    use super::*;

    #[test]
    fn spread_refunded_to_buyer() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(1000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(1));

        ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(1)).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(110), dec!(1)).unwrap();
        assert_eq!(cash(&ex, buyer), dec!(890));

        let trade = ex.attempt_match(bid.id).unwrap().unwrap();
        assert_eq!(trade.price.value(), dec!(100));

        // 890 + 10 refund - 1.5 fee
        assert_eq!(cash(&ex, buyer), dec!(898.5));
        let bid = ex.order(bid.id).unwrap();
        assert_eq!(bid.locked_usd.unwrap().value(), dec!(0));
        assert_eq!(cash(&ex, seller), dec!(100));
    }

    #[test]
    fn maker_buyer_gets_no_refund() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(1000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(1));

        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(110), dec!(1)).unwrap();
        let ask = ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(1)).unwrap();
        ex.attempt_match(ask.id).unwrap().unwrap();

        assert_eq!(cash(&ex, buyer), dec!(890));
        assert_eq!(ex.order(bid.id).unwrap().locked_usd.unwrap().value(), dec!(0));
        // 110 - 1.65 taker fee
        assert_eq!(cash(&ex, seller), dec!(108.35));
    }

    #[test]
    fn partial_fills_release_proportionally() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(10000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(5));

        ex.place_order(seller, "BTC", Side::Sell, dec!(95), dec!(1)).unwrap();
        ex.place_order(seller, "BTC", Side::Sell, dec!(98), dec!(1)).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(100), dec!(4)).unwrap();

        let sweep = ex.match_until_idle(bid.id).unwrap();
        assert_eq!(sweep.trades.len(), 2);

        let bid = ex.order(bid.id).unwrap();
        assert_eq!(bid.status, OrderStatus::Open);
        assert_eq!(bid.remaining_amount, dec!(2));
        assert_eq!(bid.locked_usd.unwrap().value(), dec!(200));

        let cancel = ex.cancel_order(buyer, bid.id).unwrap();
        assert_eq!(cancel.refunded_cash.value(), dec!(200));
        // spent 95 + 98, fees 1.425 + 1.47
        assert_eq!(cash(&ex, buyer), dec!(10000) - dec!(193) - dec!(2.895));
    }
}

mod priority_tests {
    use super::*;

    #[test]
    fn best_price_matched_first() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(1000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(3));

        let mut asks = Vec::new();
        for price in [dec!(101), dec!(100), dec!(102)] {
            asks.push(ex.place_order(seller, "BTC", Side::Sell, price, dec!(1)).unwrap());
        }
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(105), dec!(1)).unwrap();

        let trade = ex.attempt_match(bid.id).unwrap().unwrap();
        assert_eq!(trade.price.value(), dec!(100));
        assert_eq!(trade.sell_order_id, asks[1].id);
    }

    #[test]
    fn highest_bid_matched_first() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(1000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(1));

        ex.place_order(buyer, "BTC", Side::Buy, dec!(99), dec!(1)).unwrap();
        let best = ex.place_order(buyer, "BTC", Side::Buy, dec!(101), dec!(1)).unwrap();
        ex.place_order(buyer, "BTC", Side::Buy, dec!(100), dec!(1)).unwrap();
        let ask = ex.place_order(seller, "BTC", Side::Sell, dec!(95), dec!(1)).unwrap();

        let trade = ex.attempt_match(ask.id).unwrap().unwrap();
        assert_eq!(trade.buy_order_id, best.id);
        assert_eq!(trade.price.value(), dec!(101));
    }

    #[test]
    fn earliest_order_wins_at_equal_price() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(1000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(2));

        ex.set_time(Timestamp::from_millis(1_000));
        let first = ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(1)).unwrap();
        ex.set_time(Timestamp::from_millis(2_000));
        let second = ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(1)).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(100), dec!(1)).unwrap();

        let trade = ex.attempt_match(bid.id).unwrap().unwrap();
        assert_eq!(trade.sell_order_id, first.id);
        assert_eq!(ex.order(second.id).unwrap().status, OrderStatus::Open);
    }

    #[test]
    fn timestamp_not_id_decides_time_priority() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(1000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(2));

        ex.set_time(Timestamp::from_millis(5_000));
        ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(1)).unwrap();
        ex.set_time(Timestamp::from_millis(4_000));
        let earlier = ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(1)).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(100), dec!(1)).unwrap();

        let trade = ex.attempt_match(bid.id).unwrap().unwrap();
        assert_eq!(trade.sell_order_id, earlier.id);
    }

    #[test]
    fn listings_follow_priority() {
        let ex = exchange();
        let seller = funded(&ex, dec!(0), dec!(3));
        ex.place_order(seller, "BTC", Side::Sell, dec!(101), dec!(1)).unwrap();
        ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(1)).unwrap();
        ex.place_order(seller, "BTC", Side::Sell, dec!(102), dec!(1)).unwrap();

        let filter = OrderFilter::open(Symbol::new("BTC").unwrap()).with_side(Side::Sell);
        let prices: Vec<Decimal> = ex
            .open_orders(&filter)
            .iter()
            .map(|o| o.price.value())
            .collect();
        assert_eq!(prices, vec![dec!(100), dec!(101), dec!(102)]);

        let book = ex.order_book("BTC").unwrap();
        assert_eq!(book.best_ask.unwrap().value(), dec!(100));
        assert_eq!(book.ask_levels.len(), 3);
    }

    #[test]
    fn symbols_do_not_cross() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(1000), dec!(0));
        let seller = ex.create_user();
        ex.deposit_asset(seller, "ETH", dec!(1)).unwrap();

        ex.place_order(seller, "ETH", Side::Sell, dec!(10), dec!(1)).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(100), dec!(1)).unwrap();
        assert!(ex.attempt_match(bid.id).unwrap().is_none());
    }
}

mod noop_tests {
    use super::*;

    #[test]
    fn matching_terminal_or_unknown_orders_changes_nothing() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(1000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(2));

        ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(2)).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(100), dec!(1)).unwrap();
        ex.attempt_match(bid.id).unwrap().unwrap();

        let before_cash = cash(&ex, buyer);
        let before_trades = ex.trade_count();

        assert!(ex.attempt_match(bid.id).unwrap().is_none());
        assert!(ex.attempt_match(OrderId(9_999)).unwrap().is_none());
        assert!(ex.match_until_idle(bid.id).unwrap().trades.is_empty());

        assert_eq!(cash(&ex, buyer), before_cash);
        assert_eq!(ex.trade_count(), before_trades);
        assert_eq!(ex.order(bid.id).unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn terminal_orders_never_change() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(1000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(1));

        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(100), dec!(1)).unwrap();
        let cancelled = ex.cancel_order(buyer, bid.id).unwrap().order;

        // a crossing ask arrives after the cancel
        let ask = ex.place_order(seller, "BTC", Side::Sell, dec!(90), dec!(1)).unwrap();
        assert!(ex.attempt_match(ask.id).unwrap().is_none());
        assert_eq!(ex.order(bid.id).unwrap(), cancelled);
    }
}

mod cancel_tests {
    use super::*;

    #[test]
    fn cancel_sell_restores_asset_then_rejects_repeat() {
        let ex = exchange();
        let seller = funded(&ex, dec!(0), dec!(2));

        let ask = ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(2)).unwrap();
        let holding = ex.holding(seller, "BTC").unwrap();
        assert_eq!(holding.available, dec!(0));
        assert_eq!(holding.locked, dec!(2));

        let result = ex.cancel_order(seller, ask.id).unwrap();
        assert_eq!(result.order.status, OrderStatus::Cancelled);
        let holding = ex.holding(seller, "BTC").unwrap();
        assert_eq!(holding.available, dec!(2));
        assert_eq!(holding.locked, dec!(0));

        let err = ex.cancel_order(seller, ask.id).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn cancel_filled_order_rejected() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(1000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(1));

        let ask = ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(1)).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(100), dec!(1)).unwrap();
        ex.attempt_match(bid.id).unwrap().unwrap();

        let err = ex.cancel_order(seller, ask.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn cancel_unknown_order_not_found() {
        let ex = exchange();
        let user = ex.create_user();
        let err = ex.cancel_order(user, OrderId(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

mod rejection_tests {
    use super::*;

    #[test]
    fn insufficient_funds_leaves_state_unchanged() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(1000), dec!(0));

        let err = ex.place_order(buyer, "BTC", Side::Buy, dec!(500), dec!(2.5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(cash(&ex, buyer), dec!(1000));
        assert!(ex.all_orders().is_empty());
        assert!(ex.order_book("BTC").unwrap().bids.is_empty());
    }

    #[test]
    fn insufficient_asset_leaves_state_unchanged() {
        let ex = exchange();
        let seller = funded(&ex, dec!(0), dec!(1));

        let err = ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(1.5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientAsset);
        let holding = ex.holding(seller, "BTC").unwrap();
        assert_eq!(holding.available, dec!(1));
        assert_eq!(holding.locked, dec!(0));
        assert!(ex.all_orders().is_empty());
    }

    #[test]
    fn funds_exactly_equal_to_cost_accepted() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(250), dec!(0));
        ex.place_order(buyer, "BTC", Side::Buy, dec!(100), dec!(2.5)).unwrap();
        assert_eq!(cash(&ex, buyer), dec!(0));
    }
}

mod event_tests {
    use super::*;

    #[test]
    fn trade_event_emitted_after_commit() {
        let ex = exchange();
        let collector = Arc::new(EventCollector::new());
        ex.add_sink(collector.clone());

        let buyer = funded(&ex, dec!(100000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(1));
        ex.place_order(seller, "BTC", Side::Sell, dec!(50000), dec!(1)).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(50000), dec!(1)).unwrap();
        let trade = ex.attempt_match(bid.id).unwrap().unwrap();

        let trades = collector.trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].trade, trade);
        assert_eq!(trades[0].buyer, buyer);
        assert_eq!(trades[0].seller, seller);
        assert_eq!(trades[0].taker_order_id, bid.id);

        let labels: Vec<&str> = collector.events().iter().map(|e| e.label()).collect();
        assert_eq!(
            labels,
            vec![
                "cash_deposited",
                "asset_deposited",
                "order_placed",
                "order_placed",
                "trade_executed"
            ]
        );
        assert_eq!(ex.trades_for_order(bid.id), vec![trade]);
    }

    #[test]
    fn failed_settlement_emits_nothing() {
        let ex = exchange();
        let collector = Arc::new(EventCollector::new());

        let buyer = funded(&ex, dec!(100), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(1));
        ex.place_order(seller, "BTC", Side::Sell, dec!(100), dec!(1)).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, dec!(100), dec!(1)).unwrap();

        ex.add_sink(collector.clone());
        assert!(ex.attempt_match(bid.id).is_err());
        assert!(collector.is_empty());
        assert!(ex.solvency_report().is_solvent());
    }
}

/// Reserves and fills at the full 8-digit price, 16-digit size precision.
mod precision_tests {
    use super::*;

    fn split_buy(price: Decimal, total: Decimal, first: Decimal) {
        let ex = exchange();
        let buyer = funded(&ex, dec!(10_000_000), dec!(0));
        let seller = funded(&ex, dec!(0), total);

        ex.place_order(seller, "BTC", Side::Sell, price, first).unwrap();
        ex.place_order(seller, "BTC", Side::Sell, price, total - first).unwrap();
        let bid = ex.place_order(buyer, "BTC", Side::Buy, price, total).unwrap();
        assert_eq!(bid.locked_usd.unwrap().value().scale(), 8);

        let sweep = ex.match_until_idle(bid.id).unwrap();
        assert_eq!(sweep.trades.len(), 2);

        let bid = ex.order(bid.id).unwrap();
        assert_eq!(bid.status, OrderStatus::Filled);
        assert_eq!(bid.locked_usd, Some(Quote::zero()));
        assert_eq!(ex.holding(buyer, "BTC").unwrap().available, total);

        let report = ex.solvency_report();
        assert_eq!(report.stranded_locks, 0);
        assert!(report.is_solvent(), "{report:?}");
    }

    #[test]
    fn split_fill_releases_whole_reserve() {
        split_buy(
            dec!(98765.43210987),
            dec!(12.3456789012345678),
            dec!(6.1728394506172839),
        );
    }

    #[test]
    fn last_fill_never_exceeds_what_is_left() {
        split_buy(
            dec!(948103.26493295),
            dec!(0.8073399231725219),
            dec!(0.6647729668204549),
        );
    }

    #[test]
    fn spread_refund_at_full_precision() {
        let ex = exchange();
        let buyer = funded(&ex, dec!(10_000_000), dec!(0));
        let seller = funded(&ex, dec!(0), dec!(1));

        ex.place_order(seller, "BTC", Side::Sell, dec!(1234.56789012), dec!(0.3333333333333333))
            .unwrap();
        let bid = ex
            .place_order(buyer, "BTC", Side::Buy, dec!(1300.00000001), dec!(0.3333333333333333))
            .unwrap();
        let trade = ex.attempt_match(bid.id).unwrap().unwrap();

        // volume rounds down to the cash scale, the reserve rounded up
        assert_eq!(trade.volume.value(), dec!(411.52263003));
        assert_eq!(bid.locked_usd.unwrap().value(), dec!(433.33333334));
        let fee = trade.fee.value();
        assert_eq!(
            cash(&ex, buyer),
            dec!(10_000_000) - trade.volume.value() - fee
        );
        assert!(ex.solvency_report().is_solvent());
    }
}

/// Balances that would pass `Decimal::MAX` are rejected, not wrapped or panicked on.
mod overflow_tests {
    use super::*;

    #[test]
    fn deposit_past_decimal_max_rejected() {
        let ex = exchange();
        let user = ex.create_user();
        ex.deposit_cash(user, dec!(50_000_000_000_000_000_000_000_000_000))
            .unwrap();

        let err = ex
            .deposit_cash(user, dec!(50_000_000_000_000_000_000_000_000_000))
            .unwrap_err();
        assert!(matches!(err, EngineError::ArithmeticOverflow));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(cash(&ex, user), dec!(50_000_000_000_000_000_000_000_000_000));
        assert_eq!(ex.events().len(), 1);
    }

    #[test]
    fn asset_deposit_past_decimal_max_rejected() {
        let ex = exchange();
        let user = ex.create_user();
        ex.deposit_asset(user, "BTC", Decimal::MAX).unwrap();

        let err = ex.deposit_asset(user, "BTC", dec!(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(ex.holding(user, "BTC").unwrap().available, Decimal::MAX);
        assert!(ex.solvency_report().is_solvent());
    }

    #[test]
    fn sale_proceeds_past_decimal_max_abort_the_fill() {
        let ex = exchange();
        let seller = funded(&ex, dec!(79_000_000_000_000_000_000_000_000_000), dec!(1));
        let buyer = funded(&ex, dec!(2_000_000_000_000_000_000_000_000_000), dec!(0));

        let ask = ex
            .place_order(seller, "BTC", Side::Sell, dec!(1_000_000_000_000_000_000_000_000_000), dec!(1))
            .unwrap();
        let bid = ex
            .place_order(buyer, "BTC", Side::Buy, dec!(1_000_000_000_000_000_000_000_000_000), dec!(1))
            .unwrap();

        let err = ex.attempt_match(bid.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(ex.trade_count(), 0);
        assert!(ex.fees_collected().is_zero());
        assert_eq!(cash(&ex, seller), dec!(79_000_000_000_000_000_000_000_000_000));
        assert_eq!(cash(&ex, buyer), dec!(1_000_000_000_000_000_000_000_000_000));
        assert_eq!(ex.order(ask.id).unwrap().status, OrderStatus::Open);
        assert_eq!(ex.order(bid.id).unwrap().remaining_amount, dec!(1));
    }
}
