//! Runs one register shift end to end and prints the Z report as JSON.
//!
//! ```text
//! shift-demo [path/to/tally.toml]
//! ```
//!
//! Without a path the platform config file is used when present, otherwise
//! defaults. `TALLY_*` variables override either.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};

use tally_core::{
    Cart, CashMovementKind, Discount, ItemCondition, LineItem, Money, NewCashMovement, Quantity,
    ReturnItem, ReturnRequest, ShiftReport, TenderMethod,
};
use tally_engine::{init_tracing, CreateOrder, EngineConfig, EngineResult, PosEngine};

const CASHIER: &str = "cashier-1";

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = EngineConfig::load_or_default(config_path);

    match run(config).await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Failed to render report");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!(error = %e, "Shift failed");
            if let Ok(json) = serde_json::to_string_pretty(&e.to_response()) {
                eprintln!("{json}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(config: EngineConfig) -> EngineResult<ShiftReport> {
    let engine = PosEngine::from_config(config).await?;
    info!(terminal_id = engine.config().terminal_id(), "Starting shift");

    let session = engine
        .open_session(CASHIER, Money::from_cents(20_000))
        .await?;

    // Sale 1: cash, customer overpays.
    let mut cart = Cart::new();
    cart.add_item(LineItem::new(
        "rice-2kg",
        "Rice 2kg",
        Quantity::from_units(2),
        Money::from_cents(1_250),
    ))?;
    cart.add_item(
        LineItem::new("bread", "Bread", Quantity::from_units(1), Money::from_cents(300)).exempt(),
    )?;
    let key = uuid::Uuid::new_v4().to_string();
    let first = engine
        .create_order(
            CreateOrder::new(cart.clone())
                .in_session(&session.id)
                .idempotency_key(&key),
        )
        .await?;
    // A retried submit with the same key lands on the same order.
    let retried = engine
        .create_order(
            CreateOrder::new(cart)
                .in_session(&session.id)
                .idempotency_key(&key),
        )
        .await?;
    info!(order_id = %first.id, same_order = first.id == retried.id, "Order created");

    let tendered = Money::from_cents(5_000);
    let outcome = engine
        .add_payment(&first.id, TenderMethod::Cash, first.amount_due, Some(tendered))
        .await?;
    info!(
        order_id = %first.id,
        completed = outcome.order_completed,
        "Cash payment taken"
    );

    // Sale 2: split tender with a discount, card confirmed later.
    let mut cart = Cart::new();
    cart.add_item(
        LineItem::new("oil-1l", "Cooking Oil 1L", Quantity::from_units(3), Money::from_cents(900))
            .with_discount(Discount::percent_bps(1_000)),
    )?;
    let second = engine
        .create_order(CreateOrder::new(cart).in_session(&session.id))
        .await?;
    let cash_part = Money::from_cents(1_000);
    engine
        .add_payment(&second.id, TenderMethod::Cash, cash_part, None)
        .await?;
    let card = engine
        .add_payment(&second.id, TenderMethod::Card, second.amount_due - cash_part, None)
        .await?;
    engine
        .mark_payment_completed(&second.id, &card.payment.id, Some("AUTH-0042"))
        .await?;

    // Sale 3: parked, then abandoned.
    let mut cart = Cart::new();
    cart.add_item(LineItem::new(
        "soap",
        "Soap",
        Quantity::from_units(4),
        Money::from_cents(150),
    ))?;
    let third = engine
        .create_order(CreateOrder::new(cart).in_session(&session.id))
        .await?;
    engine.hold_order(&third.id, Some("customer fetching wallet")).await?;
    engine.void_order(&third.id, Some("customer left")).await?;

    engine
        .record_cash_movement(
            &session.id,
            NewCashMovement::new(CashMovementKind::Payout, Money::from_cents(500), CASHIER)
                .reason("window cleaner"),
        )
        .await?;

    // One bag of rice comes back.
    let rice_line = first.lines[0].id.clone();
    let refund = engine
        .process_return(
            &first.id,
            ReturnRequest {
                items: vec![ReturnItem {
                    line_id: rice_line,
                    quantity: Quantity::from_units(1),
                    condition: ItemCondition::Resellable,
                }],
                reason: "bought twice".to_string(),
                refund_method: TenderMethod::Cash,
                actor: CASHIER.to_string(),
                session_id: None,
            },
        )
        .await?;
    info!(
        return_id = %refund.id,
        refund = %refund.total_refund,
        status = ?refund.status,
        "Return processed"
    );

    let interim = engine.generate_report(&session.id, CASHIER).await?;
    info!(
        number = %interim.report_number,
        expected = %interim.cash.expected_cash,
        "Interim report"
    );

    let closed = engine
        .close_session(&session.id, interim.cash.expected_cash, Some("end of day"), CASHIER)
        .await?;
    info!(variance = ?closed.variance, "Drawer counted");

    engine.generate_report(&session.id, CASHIER).await
}
