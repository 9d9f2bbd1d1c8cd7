//! # Zync
//!
//! Client state layer for the Zync nightlife platform.
//!
//! Every feature is a reducer-driven store from `zync-runtime`:
//!
//! - [`session`]: signed-in user, wallet balance, loyalty points, the single
//!   DJ song request and saved cards
//! - [`cart`]: cart lines, totals and the checkout state machine; the
//!   [`ledger`] of placed orders lives in cart state
//! - [`establishment`]: the venue the user is at
//!
//! Around them sit two HTTP clients ([`catalog`] for track search, [`backend`]
//! for the Zync auth service), [`storage`] for the auth token, and the
//! [`app::ZyncApp`] coordinator that owns the stores and runs cross-store
//! flows.
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> zync::error::Result<()> {
//! use zync::{fixtures, ZyncApp, ZyncConfig};
//!
//! let app = ZyncApp::development(&ZyncConfig::from_env())?;
//! assert!(app.login("frank@zync.com").await?);
//!
//! let neon_noir = fixtures::product("d1").expect("fixture");
//! app.add_to_cart(neon_noir.clone()).await?;
//! app.add_to_cart(neon_noir).await?;
//!
//! let outcome = app.checkout(true).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod backend;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod establishment;
pub mod fixtures;
pub mod ledger;
pub mod routing;
pub mod session;
pub mod storage;
pub mod types;
pub mod wallet;

pub use app::{AppDependencies, ZyncApp};
pub use cart::{CheckoutOutcome, CheckoutPhase, RedemptionQuote};
pub use catalog::SearchOutcome;
pub use config::ZyncConfig;
pub use error::ZyncError;
