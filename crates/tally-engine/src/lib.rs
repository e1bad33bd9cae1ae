//! # tally-engine: Transaction Service for Tally POS
//!
//! [`PosEngine`] is what a register talks to. Each call takes entity ids,
//! serialises itself against other writers of the same order or session,
//! applies one `tally-core` rule and saves through a [`tally_store::Store`].
//!
//! ## Module Organization
//! ```text
//! tally_engine/
//! ├── lib.rs          ◄─── You are here
//! ├── engine.rs       ◄─── PosEngine, reads, staged commits, idempotency index
//! ├── locks.rs        ◄─── Per-entity async locks
//! ├── orders.rs       ◄─── create / hold / resume / submit / void / complete
//! ├── payments.rs     ◄─── add / confirm / fail / remove tenders
//! ├── sessions.rs     ◄─── open / movements / suspend / resume / close
//! ├── returns.rs      ◄─── returnable quantity / process / approve / reject
//! ├── reports.rs      ◄─── X and Z reports
//! ├── config.rs       ◄─── EngineConfig (defaults → TOML → TALLY_* env)
//! ├── error.rs        ◄─── EngineError, ErrorResponse
//! └── bin/shift_demo.rs ◄─ drives a whole shift end to end
//! ```
//!
//! ## Example
//! ```rust,ignore
//! let engine = PosEngine::from_config(EngineConfig::load(None)?).await?;
//! let session = engine.open_session("ana", Money::from_cents(5_000_00)).await?;
//! let order = engine.create_order(CreateOrder::new(cart).in_session(&session.id)).await?;
//! engine.add_payment(&order.id, TenderMethod::Cash, order.amount_due, None).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
mod locks;
pub mod orders;
pub mod payments;
pub mod reports;
pub mod returns;
pub mod sessions;

pub use config::{EngineConfig, StorageBackend};
pub use engine::PosEngine;
pub use error::{EngineError, EngineResult, ErrorResponse};
pub use orders::CreateOrder;

use tracing_subscriber::EnvFilter;

/// Default log filter; `RUST_LOG` overrides it.
pub const DEFAULT_LOG_FILTER: &str = "info,tally=debug,sqlx=warn";

/// Installs the global `tracing` subscriber. Binaries call this once.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
