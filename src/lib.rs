//! # assetx - peer-to-peer asset exchange
//!
//! Negotiation and settlement of asset swaps between two actors over a
//! confidential-transaction ledger.
//!
//! ## Architecture
//!
//! - **Trader**: Axum server exposing /walletinfo, /offer and /send; quotes every held asset and settles one offer
//! - **Exchanger**: Axum server pricing swaps from a fixed rate table and funding binding offers from its own coins
//! - **Reservations**: time-bounded coin leases shared by concurrent selections, with a background sweep
//! - **Ledger**: JSON-RPC node client (unspent coins, addresses, blinding, signing, broadcast)
//! - **Templates**: unsigned transactions assembled by an external command-line builder

pub mod client;
pub mod config;
pub mod error;
pub mod exchanger;
pub mod ids;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod quotation;
pub mod rates;
pub mod registry;
pub mod reservation;
pub mod selector;
pub mod server;
pub mod template;
pub mod trader;

pub use client::{ExchangeApi, ExchangerClient};
pub use config::AppConfig;
pub use error::{ExchangeError, Result};
pub use exchanger::ExchangerService;
pub use ledger::{Ledger, RpcLedger};
pub use model::{Amount, CoinId, Offer, Quotation, Utxo};
pub use quotation::QuotationStore;
pub use rates::RateTable;
pub use registry::{AddressKind, CoinRegistry};
pub use reservation::{LeaseId, ReservationTable};
pub use selector::CoinSelector;
pub use template::{CommandTemplateBuilder, TemplateBase, TemplateBuilder, TxDirective};
pub use trader::{SettlementStage, TraderService};
