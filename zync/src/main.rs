//! Zync demo: walks one night out against the development fixtures.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin zync-demo
//! ```
//!
//! Faster, always-approved checkout:
//!
//! ```bash
//! ZYNC_CHECKOUT_LATENCY_MS=200 ZYNC_CHECKOUT_APPROVAL_RATE=1 cargo run --bin zync-demo
//! ```
//!
//! Set `ZYNC_CATALOG_CLIENT_ID` / `ZYNC_CATALOG_CLIENT_SECRET` to include a
//! live track search.

use anyhow::{bail, Context};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zync::wallet::TopUpForm;
use zync::{fixtures, CheckoutOutcome, SearchOutcome, ZyncApp, ZyncConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ZyncConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("=== Zync demo ===");

    let app = ZyncApp::development(&config)?;

    let restored = app.restore().await?;
    info!(restored, "Startup restore finished");

    if !app.login("frank@zync.com").await? {
        bail!("development user is missing");
    }
    let (name, balance, points) = app
        .session(|s| {
            (
                s.user().map(|u| u.name.clone()).unwrap_or_default(),
                s.balance(),
                s.points(),
            )
        })
        .await;
    info!(%name, balance, points, "Signed in");

    let venue = fixtures::establishment("e1").context("venue fixture")?;
    info!(venue = %venue.name, "Checking in");
    app.select_establishment(venue).await?;

    let neon_noir = fixtures::product("d1").context("menu fixture")?;
    app.add_to_cart(neon_noir.clone()).await?;
    app.add_to_cart(neon_noir).await?;

    let quote = app.quote(true).await;
    info!(
        cart_total = quote.cart_total,
        discount = quote.discount,
        final_total = quote.final_total,
        "Checkout quote"
    );

    match app.checkout(true).await? {
        CheckoutOutcome::Succeeded { order_id } => {
            info!(%order_id, "Order placed");
            for order in app.orders().await {
                info!(
                    order_id = %order.id,
                    total = order.total,
                    savings = order.savings,
                    items = order.items.len(),
                    "Ticket"
                );
            }
            app.finish_checkout().await?;
        },
        CheckoutOutcome::Failed { reason } => {
            info!(%reason, "Checkout declined");
            app.reset_checkout().await?;
        },
        other => info!(outcome = ?other, "Checkout did not run"),
    }

    let mut form = TopUpForm::new();
    form.select_preset(50);
    let balance = app.top_up_form(&form).await?;
    info!(balance, "Wallet topped up");

    if config.catalog.has_credentials() {
        match app.search_tracks("blue monday").await {
            SearchOutcome::Found(tracks) => {
                for track in tracks.iter().take(3) {
                    info!(track = %track.name, artists = %track.artist_line(), "Search hit");
                }
                if let Some(track) = tracks.into_iter().next() {
                    let request_id = app.request_song(track, 1000).await?;
                    info!(%request_id, "Song requested");
                }
            },
            SearchOutcome::Empty => info!("No tracks found"),
            SearchOutcome::Failed(error) => info!(%error, "Track search failed"),
        }
    }

    app.logout().await?;
    info!(
        venue_cleared = app.current_establishment().await.is_none(),
        "Signed out"
    );

    app.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}
