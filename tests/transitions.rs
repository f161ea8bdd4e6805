//! Planning tests: every row of the transition table, rejections and quantity rules,
//! plus what happens when plans from one snapshot reach the service unserialised.

mod common;

use chrono::Utc;
use paper_trader::remote::PortfolioService;
use paper_trader::{RemoteError, Session, TradingError};
use paper_trader::machine::transition::{parse_quantity, weighted_average};
use paper_trader::machine::{Effect, SOLD_OUT_NOTE, Snapshot, StockState, TradeAction, plan};
use paper_trader::types::position::Position;
use paper_trader::types::watchlist::WatchlistEntry;

use common::{AAPL, seeded_portfolio};

const STOCK: i64 = 42;

fn position(id: i64, quantity: u64, average_price: f64) -> Position {
    Position {
        id,
        user_id: 7,
        stock_id: STOCK,
        symbol: "AAPL".to_string(),
        quantity,
        average_price,
        purchased_at: Utc::now(),
    }
}

fn entry(id: i64, note: Option<&str>) -> WatchlistEntry {
    WatchlistEntry {
        id,
        user_id: 7,
        stock_id: STOCK,
        symbol: "AAPL".to_string(),
        note: note.map(str::to_string),
        added_at: Utc::now(),
    }
}

fn untracked() -> Snapshot {
    Snapshot::from_listing(vec![], vec![], 1)
}

fn watching() -> Snapshot {
    Snapshot::from_listing(vec![], vec![entry(11, Some("earnings soon"))], 1)
}

fn held(quantity: u64, average_price: f64) -> Snapshot {
    Snapshot::from_listing(vec![position(21, quantity, average_price)], vec![], 1)
}

fn buy(quantity: i64, price: Option<f64>) -> TradeAction {
    TradeAction::Buy {
        stock_id: STOCK,
        quantity,
        price,
    }
}

fn sell(quantity: i64) -> TradeAction {
    TradeAction::Sell {
        stock_id: STOCK,
        quantity,
    }
}

fn watch(note: Option<&str>) -> TradeAction {
    TradeAction::Watch {
        stock_id: STOCK,
        note: note.map(str::to_string),
    }
}

fn unwatch() -> TradeAction {
    TradeAction::Unwatch { stock_id: STOCK }
}

#[test]
fn buy_untracked_creates_position() {
    let snap = untracked();
    let p = plan(snap.holding(STOCK), "AAPL", &buy(10, Some(150.0)), None).unwrap();

    assert_eq!(p.from, StockState::Untracked);
    assert_eq!(p.to, StockState::Held);
    assert_eq!(p.quantity, 10);
    assert_eq!(p.average_price, Some(150.0));
    assert_eq!(
        p.effects,
        vec![Effect::CreateOrIncreasePosition {
            stock_id: STOCK,
            quantity: 10,
            price: 150.0
        }]
    );
}

#[test]
fn buy_watching_creates_position_before_removing_entry() {
    let snap = watching();
    let p = plan(snap.holding(STOCK), "AAPL", &buy(5, Some(100.0)), None).unwrap();

    assert_eq!(p.from, StockState::Watching);
    assert_eq!(p.to, StockState::Held);
    assert_eq!(
        p.effects,
        vec![
            Effect::CreateOrIncreasePosition {
                stock_id: STOCK,
                quantity: 5,
                price: 100.0
            },
            Effect::RemoveWatchlistEntry { entry_id: 11 },
        ]
    );
}

#[test]
fn buy_held_uses_weighted_average() {
    let snap = held(10, 100.0);
    let p = plan(snap.holding(STOCK), "AAPL", &buy(5, Some(130.0)), None).unwrap();

    assert_eq!(p.from, StockState::Held);
    assert_eq!(p.to, StockState::Held);
    assert_eq!(p.quantity, 15);
    let expected = (10.0 * 100.0 + 5.0 * 130.0) / 15.0;
    assert!((p.average_price.unwrap() - expected).abs() < 1e-6);
    assert_eq!(p.effects.len(), 1);
}

#[test]
fn buy_without_price_uses_market_price() {
    let snap = untracked();
    let p = plan(snap.holding(STOCK), "AAPL", &buy(2, None), Some(187.5)).unwrap();

    assert_eq!(p.average_price, Some(187.5));
    assert_eq!(
        p.effects,
        vec![Effect::CreateOrIncreasePosition {
            stock_id: STOCK,
            quantity: 2,
            price: 187.5
        }]
    );
}

#[test]
fn buy_without_any_price_is_rejected() {
    let snap = untracked();
    let err = plan(snap.holding(STOCK), "AAPL", &buy(2, None), None).unwrap_err();
    assert!(matches!(err, TradingError::PriceUnavailable(ref s) if s == "AAPL"));
}

#[test]
fn buy_rejects_bad_quantity_and_price() {
    let snap = untracked();
    for quantity in [0, -1, -100] {
        let err = plan(snap.holding(STOCK), "AAPL", &buy(quantity, Some(10.0)), None).unwrap_err();
        assert!(matches!(err, TradingError::InvalidQuantity(_)));
    }
    for price in [0.0, -5.0, f64::NAN, f64::INFINITY] {
        let err = plan(snap.holding(STOCK), "AAPL", &buy(1, Some(price)), None).unwrap_err();
        assert!(matches!(err, TradingError::InvalidPrice(_)));
    }
}

#[test]
fn partial_sell_keeps_average_price() {
    let snap = held(10, 120.0);
    let p = plan(snap.holding(STOCK), "AAPL", &sell(4), None).unwrap();

    assert_eq!(p.to, StockState::Held);
    assert_eq!(p.quantity, 6);
    assert_eq!(p.average_price, Some(120.0));
    assert_eq!(
        p.effects,
        vec![Effect::DecreaseOrDeletePosition {
            position_id: 21,
            quantity: 4
        }]
    );
}

#[test]
fn full_sell_moves_stock_back_to_watchlist() {
    let snap = held(10, 120.0);
    let p = plan(snap.holding(STOCK), "AAPL", &sell(10), None).unwrap();

    assert_eq!(p.from, StockState::Held);
    assert_eq!(p.to, StockState::Watching);
    assert_eq!(p.quantity, 0);
    assert_eq!(p.average_price, None);
    assert_eq!(
        p.effects,
        vec![
            Effect::DecreaseOrDeletePosition {
                position_id: 21,
                quantity: 10
            },
            Effect::AddWatchlistEntry {
                stock_id: STOCK,
                note: Some(SOLD_OUT_NOTE.to_string())
            },
        ]
    );
}

#[test]
fn full_sell_reuses_shadowed_entry() {
    let snap = Snapshot::from_listing(vec![position(21, 3, 50.0)], vec![entry(11, None)], 1);
    let p = plan(snap.holding(STOCK), "AAPL", &sell(3), None).unwrap();

    assert_eq!(p.to, StockState::Watching);
    assert_eq!(
        p.effects,
        vec![Effect::DecreaseOrDeletePosition {
            position_id: 21,
            quantity: 3
        }]
    );
}

#[test]
fn buy_on_held_removes_shadowed_entry() {
    let snap = Snapshot::from_listing(vec![position(21, 3, 50.0)], vec![entry(11, None)], 1);
    let p = plan(snap.holding(STOCK), "AAPL", &buy(1, Some(50.0)), None).unwrap();

    assert_eq!(p.effects.len(), 2);
    assert_eq!(p.effects[1], Effect::RemoveWatchlistEntry { entry_id: 11 });
}

#[test]
fn oversell_is_rejected_with_held_quantity() {
    let snap = held(3, 10.0);
    let err = plan(snap.holding(STOCK), "AAPL", &sell(5), None).unwrap_err();
    match err {
        TradingError::InsufficientShares {
            symbol,
            requested,
            held,
        } => {
            assert_eq!(symbol, "AAPL");
            assert_eq!(requested, 5);
            assert_eq!(held, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn sell_without_position_is_not_owned() {
    for snap in [untracked(), watching()] {
        let err = plan(snap.holding(STOCK), "AAPL", &sell(1), None).unwrap_err();
        assert!(matches!(err, TradingError::NotOwned(_)));
    }
}

#[test]
fn watch_untracked_adds_entry_with_note() {
    let snap = untracked();
    let p = plan(snap.holding(STOCK), "AAPL", &watch(Some("dip")), None).unwrap();

    assert_eq!(p.to, StockState::Watching);
    assert_eq!(
        p.effects,
        vec![Effect::AddWatchlistEntry {
            stock_id: STOCK,
            note: Some("dip".to_string())
        }]
    );
}

#[test]
fn watch_twice_is_a_noop() {
    let snap = watching();
    let p = plan(snap.holding(STOCK), "AAPL", &watch(None), None).unwrap();
    assert!(p.is_noop());
    assert_eq!(p.to, StockState::Watching);
}

#[test]
fn unwatch_removes_entry_and_is_idempotent() {
    let snap = watching();
    let p = plan(snap.holding(STOCK), "AAPL", &unwatch(), None).unwrap();
    assert_eq!(p.to, StockState::Untracked);
    assert_eq!(p.effects, vec![Effect::RemoveWatchlistEntry { entry_id: 11 }]);

    let snap = untracked();
    let p = plan(snap.holding(STOCK), "AAPL", &unwatch(), None).unwrap();
    assert!(p.is_noop());
}

#[test]
fn held_stock_cannot_be_watched_unwatched_or_annotated() {
    let snap = held(1, 10.0);
    let annotate = TradeAction::Annotate {
        stock_id: STOCK,
        note: None,
    };
    for action in [watch(None), unwatch(), annotate] {
        let err = plan(snap.holding(STOCK), "AAPL", &action, None).unwrap_err();
        assert!(
            matches!(err, TradingError::ConflictingState { ref symbol, .. } if symbol == "AAPL"),
            "{action:?} gave {err:?}"
        );
    }
}

#[test]
fn annotate_updates_note_only_when_watching() {
    let action = TradeAction::Annotate {
        stock_id: STOCK,
        note: Some("target 200".to_string()),
    };

    let snap = watching();
    let p = plan(snap.holding(STOCK), "AAPL", &action, None).unwrap();
    assert_eq!(p.from, StockState::Watching);
    assert_eq!(p.to, StockState::Watching);
    assert_eq!(
        p.effects,
        vec![Effect::UpdateWatchlistNote {
            entry_id: 11,
            note: Some("target 200".to_string())
        }]
    );

    let snap = untracked();
    let err = plan(snap.holding(STOCK), "AAPL", &action, None).unwrap_err();
    assert!(matches!(err, TradingError::NotWatching(_)));
}

#[test]
fn buy_then_sell_conserves_quantity() {
    let mut quantity = 0u64;
    let mut average = 0.0;
    let lots = [(10u64, 100.0), (5, 130.0), (7, 90.0)];
    for (q, price) in lots {
        average = if quantity == 0 {
            price
        } else {
            weighted_average(quantity, average, q, price)
        };
        quantity += q;
    }
    let snap = held(quantity, average);
    let p = plan(snap.holding(STOCK), "AAPL", &sell(8), None).unwrap();

    assert_eq!(p.quantity, 22 - 8);
    let cost: f64 = lots.iter().map(|(q, p)| *q as f64 * p).sum();
    assert!((p.average_price.unwrap() - cost / 22.0).abs() < 1e-6);
}

#[test]
fn parse_quantity_accepts_only_positive_integers() {
    assert_eq!(parse_quantity("12").unwrap(), 12);
    assert_eq!(parse_quantity(" 3 ").unwrap(), 3);
    for raw in ["0", "-1", "1.5", "", "abc", "1e3"] {
        assert!(
            matches!(parse_quantity(raw), Err(TradingError::InvalidQuantity(_))),
            "{raw:?} should be rejected"
        );
    }
}

#[test]
fn plans_from_the_same_stale_snapshot_lose_an_update() {
    // Two buys planned against one snapshot each expect held + own quantity;
    // only serialising them per stock makes the second see the first.
    let snap = held(5, 100.0);
    let first = plan(snap.holding(STOCK), "AAPL", &buy(2, Some(100.0)), None).unwrap();
    let second = plan(snap.holding(STOCK), "AAPL", &buy(3, Some(100.0)), None).unwrap();
    assert_eq!(first.quantity, 7);
    assert_eq!(second.quantity, 8);

    let after_first = held(first.quantity, 100.0);
    let serialised =
        plan(after_first.holding(STOCK), "AAPL", &buy(3, Some(100.0)), None).unwrap();
    assert_eq!(serialised.quantity, 10);
}

fn buy_aapl(quantity: i64) -> TradeAction {
    TradeAction::Buy {
        stock_id: AAPL,
        quantity,
        price: Some(100.0),
    }
}

async fn apply(
    service: &dyn PortfolioService,
    session: &Session,
    effect: &Effect,
) -> Result<(), RemoteError> {
    match effect {
        Effect::CreateOrIncreasePosition {
            stock_id,
            quantity,
            price,
        } => service
            .create_or_increase_position(session, *stock_id, *quantity, *price)
            .await
            .map(|_| ()),
        Effect::DecreaseOrDeletePosition {
            position_id,
            quantity,
        } => service
            .decrease_or_delete_position(session, *position_id, *quantity)
            .await
            .map(|_| ()),
        Effect::AddWatchlistEntry { stock_id, note } => service
            .add_watchlist_entry(session, *stock_id, note.as_deref())
            .await
            .map(|_| ()),
        Effect::UpdateWatchlistNote { entry_id, note } => service
            .update_watchlist_note(session, *entry_id, note.as_deref())
            .await
            .map(|_| ()),
        Effect::RemoveWatchlistEntry { entry_id } => {
            service.remove_watchlist_entry(session, *entry_id).await
        }
    }
}

#[tokio::test]
async fn unserialised_buys_from_one_watching_snapshot_collide_on_the_service() {
    let service = seeded_portfolio().await;
    let session = common::session();
    service
        .add_watchlist_entry(&session, AAPL, Some("dip"))
        .await
        .unwrap();
    let stale = Snapshot::from_listing(
        service.list_positions(&session).await.unwrap(),
        service.list_watchlist(&session).await.unwrap(),
        1,
    );

    let first = plan(stale.holding(AAPL), "AAPL", &buy_aapl(2), None).unwrap();
    let second = plan(stale.holding(AAPL), "AAPL", &buy_aapl(3), None).unwrap();
    // Both think they are leaving Watching and both plan to remove the same entry.
    assert_eq!(first.effects.len(), 2);
    assert_eq!(second.effects[1], first.effects[1]);

    for effect in &first.effects {
        apply(service.as_ref(), &session, effect).await.unwrap();
    }
    apply(service.as_ref(), &session, &second.effects[0]).await.unwrap();
    let err = apply(service.as_ref(), &session, &second.effects[1])
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteError::NotFound(_)));
    let positions = service.list_positions(&session).await.unwrap();
    assert_eq!(positions[0].quantity, 5);
    assert_ne!(positions[0].quantity, second.quantity);
}

#[test]
fn snapshot_ignores_positions_without_shares() {
    let snap = Snapshot::from_listing(vec![position(21, 0, 50.0)], vec![entry(11, None)], 1);
    assert_eq!(snap.state_of(STOCK), StockState::Watching);
    assert!(snap.position(STOCK).is_none());
    assert_eq!(snap.shadowed().count(), 0);
}

#[test]
fn snapshot_keeps_stocks_exclusive() {
    let snap = Snapshot::from_listing(vec![position(21, 3, 50.0)], vec![entry(11, None)], 1);
    assert!(snap.is_exclusive());
    assert_eq!(snap.state_of(STOCK), StockState::Held);
    assert_eq!(snap.watchlist().count(), 0);
    assert_eq!(snap.shadowed().count(), 1);
}
