//! App coordinator: owns every store and runs the flows that span them.
//!
//! Stores never talk to each other. Cross-store rules live here:
//!
//! - checkout reserves the points balance in the session before the charge
//!   and returns what the order did not redeem once the attempt settles
//! - logout waits for `SessionEnded` and then clears the selected venue
//! - song requests are paid from the session balance inside one reducer step

use crate::backend::BackendClient;
use crate::cart::{
    CartAction, CartEnvironment, CartReducer, CartState, CheckoutOutcome, CheckoutPhase, PaymentGateway,
    RedemptionQuote, SimulatedGateway,
};
use crate::catalog::{CatalogClient, SearchOutcome};
use crate::config::ZyncConfig;
use crate::error::{Result, ZyncError};
use crate::establishment::{EstablishmentAction, EstablishmentReducer, EstablishmentState};
use crate::routing::{protected_redirect, Route};
use crate::session::{
    Authenticator, BackendAuthenticator, InMemoryDirectory, LoginOutcome, SessionAction, SessionEnvironment,
    SessionReducer, SessionState,
};
use crate::storage::{FileTokenStorage, InMemoryTokenStorage, TokenStorage};
use crate::types::{
    ActiveOrder, CartItem, CheckoutAttemptId, Establishment, LoginAttemptId, OrderId, PaymentMethod, Product,
    ProductId, SongRequestId, Track,
};
use crate::wallet::TopUpForm;
use std::sync::Arc;
use std::time::Duration;
use zync_core::environment::{Clock, SystemClock};
use zync_runtime::Store;

/// Session store
pub type SessionStore = Store<SessionState, SessionAction, SessionEnvironment, SessionReducer>;

/// Cart store
pub type CartStore = Store<CartState, CartAction, CartEnvironment, CartReducer>;

/// Establishment store
pub type EstablishmentStore = Store<EstablishmentState, EstablishmentAction, (), EstablishmentReducer>;

/// Slack added to the configured latencies when waiting for effect results
const WAIT_SLACK: Duration = Duration::from_secs(5);

/// Collaborators injected into the stores
#[derive(Clone)]
pub struct AppDependencies {
    /// Credential checks
    pub authenticator: Arc<dyn Authenticator>,
    /// Token persistence
    pub storage: Arc<dyn TokenStorage>,
    /// Charges checkouts
    pub gateway: Arc<dyn PaymentGateway>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl AppDependencies {
    /// In-memory directory, simulated gateway, storage per `config`
    #[must_use]
    pub fn development(config: &ZyncConfig) -> Self {
        Self {
            authenticator: Arc::new(InMemoryDirectory::development()),
            storage: storage_for(config),
            gateway: SimulatedGateway::new(config.checkout.latency, config.checkout.approval_rate).shared(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Swap the authenticator
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Swap the token storage
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn TokenStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Swap the payment gateway
    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    /// Swap the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

fn storage_for(config: &ZyncConfig) -> Arc<dyn TokenStorage> {
    match &config.storage.token_dir {
        Some(dir) => Arc::new(FileTokenStorage::new(dir.clone())),
        None => Arc::new(InMemoryTokenStorage::new()),
    }
}

/// The Zync client
///
/// Built explicitly and passed around; there is no global instance. Cloning
/// is cheap and every clone drives the same stores.
#[derive(Clone)]
pub struct ZyncApp {
    session: SessionStore,
    cart: CartStore,
    establishment: EstablishmentStore,
    catalog: Arc<CatalogClient>,
    backend: Option<BackendClient>,
    auth_timeout: Duration,
    checkout_timeout: Duration,
}

impl ZyncApp {
    /// Assemble the app from explicit collaborators
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Catalog`] if the catalog HTTP client cannot be built.
    pub fn new(config: &ZyncConfig, deps: AppDependencies) -> Result<Self> {
        let catalog = CatalogClient::new(config.catalog.clone(), Arc::clone(&deps.clock))?;
        let session = Store::new(
            SessionState::new(),
            SessionReducer::new(),
            SessionEnvironment::new(deps.authenticator, deps.storage, Arc::clone(&deps.clock)),
        );
        let cart = Store::new(
            CartState::new(),
            CartReducer::new(),
            CartEnvironment::new(deps.gateway, Arc::clone(&deps.clock)),
        );
        let establishment = Store::new(EstablishmentState::default(), EstablishmentReducer::new(), ());

        Ok(Self {
            session,
            cart,
            establishment,
            catalog: Arc::new(catalog),
            backend: None,
            auth_timeout: Duration::from_secs(config.api.timeout_secs) + WAIT_SLACK,
            checkout_timeout: config.checkout.latency + WAIT_SLACK,
        })
    }

    /// App backed by the development directory and the simulated gateway
    ///
    /// # Errors
    ///
    /// Same as [`ZyncApp::new`].
    pub fn development(config: &ZyncConfig) -> Result<Self> {
        Self::new(config, AppDependencies::development(config))
    }

    /// App that authenticates against the Zync backend
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Backend`] or [`ZyncError::Catalog`] if an HTTP
    /// client cannot be built.
    pub fn connected(config: &ZyncConfig) -> Result<Self> {
        let backend = BackendClient::new(&config.api)?;
        let deps = AppDependencies::development(config)
            .with_authenticator(Arc::new(BackendAuthenticator::new(backend.clone())));

        let mut app = Self::new(config, deps)?;
        app.backend = Some(backend);
        Ok(app)
    }

    /// Backend client, when the app was built with [`ZyncApp::connected`]
    #[must_use]
    pub const fn backend(&self) -> Option<&BackendClient> {
        self.backend.as_ref()
    }

    /// Session store handle
    #[must_use]
    pub const fn session_store(&self) -> &SessionStore {
        &self.session
    }

    /// Cart store handle
    #[must_use]
    pub const fn cart_store(&self) -> &CartStore {
        &self.cart
    }

    // ========== Session ==========

    /// Resolve the persisted token, if any; returns whether a session was restored
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Store`] if the store is shutting down or the
    /// authenticator does not answer in time.
    pub async fn restore(&self) -> Result<bool> {
        if self.session.state(SessionState::is_loading).await {
            return Err(ZyncError::Rejected("Session restore already running".to_string()));
        }
        self.session
            .send_and_wait_for(
                SessionAction::Restore,
                |a| matches!(a, SessionAction::Restored { .. }),
                self.auth_timeout,
            )
            .await?;
        Ok(self.session.state(SessionState::is_authenticated).await)
    }

    /// Sign in by identifier alone, as the development directory allows
    ///
    /// Returns `false` for an unknown identifier.
    ///
    /// # Errors
    ///
    /// [`ZyncError::Rejected`] if another login is running or the
    /// authenticator failed, [`ZyncError::Store`] on runtime failures.
    pub async fn login(&self, identifier: &str) -> Result<bool> {
        self.login_with_password(identifier, "").await
    }

    /// Sign in with identifier and password
    ///
    /// # Errors
    ///
    /// Same as [`ZyncApp::login`].
    #[tracing::instrument(skip(self, identifier, secret))]
    pub async fn login_with_password(&self, identifier: &str, secret: &str) -> Result<bool> {
        let attempt = LoginAttemptId::new();
        let finished = self
            .session
            .send_and_wait_for(
                SessionAction::Login {
                    attempt,
                    identifier: identifier.to_string(),
                    secret: secret.to_string(),
                },
                move |a| matches!(a, SessionAction::LoginFinished { attempt: id, .. } if *id == attempt),
                self.auth_timeout,
            )
            .await?;

        match finished {
            SessionAction::LoginFinished { outcome, .. } => match outcome {
                LoginOutcome::Authenticated(_) => Ok(true),
                LoginOutcome::UnknownIdentifier => Ok(false),
                LoginOutcome::Busy => Err(ZyncError::Rejected("A login is already in progress".to_string())),
                LoginOutcome::Failed { reason } => Err(ZyncError::Rejected(reason)),
            },
            _ => Ok(false),
        }
    }

    /// Sign out, forget the stored token and the selected venue
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Store`] on runtime failures.
    pub async fn logout(&self) -> Result<()> {
        self.session
            .send_and_wait_for(
                SessionAction::Logout,
                |a| matches!(a, SessionAction::SessionEnded),
                self.auth_timeout,
            )
            .await?;
        self.establishment.send(EstablishmentAction::Clear).await?;
        Ok(())
    }

    /// Read session state
    pub async fn session<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        self.session.state(f).await
    }

    /// Redirect the navigation layer should perform
    pub async fn redirect_for(&self, in_auth_group: bool) -> Option<Route> {
        let (loading, authenticated) = self
            .session
            .state(|s| (s.is_loading(), s.is_authenticated()))
            .await;
        protected_redirect(loading, authenticated, in_auth_group)
    }

    /// Send a session command and turn a recorded rejection into an error
    async fn session_command(&self, action: SessionAction) -> Result<()> {
        let (_, rejection) = self
            .session
            .send_and_inspect(action, |s| s.last_error.clone())
            .await?;
        rejection.map_or(Ok(()), |reason| Err(ZyncError::Rejected(reason)))
    }

    // ========== Venue ==========

    /// Make `establishment` the current venue
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Store`] if the store is shutting down.
    pub async fn select_establishment(&self, establishment: Establishment) -> Result<()> {
        self.establishment
            .send(EstablishmentAction::Select { establishment })
            .await?;
        Ok(())
    }

    /// The selected venue
    pub async fn current_establishment(&self) -> Option<Establishment> {
        self.establishment.state(|s| s.current.clone()).await
    }

    // ========== Cart ==========

    /// Add one unit of `product`
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Store`] if the store is shutting down.
    pub async fn add_to_cart(&self, product: Product) -> Result<()> {
        self.cart.send(CartAction::AddToCart { product }).await?;
        Ok(())
    }

    /// Remove one unit of a product
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Store`] if the store is shutting down.
    pub async fn remove_item_quantity(&self, product_id: ProductId) -> Result<()> {
        self.cart.send(CartAction::RemoveItemQuantity { product_id }).await?;
        Ok(())
    }

    /// Remove a product line
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Store`] if the store is shutting down.
    pub async fn remove_from_cart(&self, product_id: ProductId) -> Result<()> {
        self.cart.send(CartAction::RemoveFromCart { product_id }).await?;
        Ok(())
    }

    /// Empty the cart
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Store`] if the store is shutting down.
    pub async fn clear_cart(&self) -> Result<()> {
        self.cart.send(CartAction::ClearCart).await?;
        Ok(())
    }

    /// Read cart state
    pub async fn cart<T>(&self, f: impl FnOnce(&CartState) -> T) -> T {
        self.cart.state(f).await
    }

    /// Cart lines
    pub async fn cart_items(&self) -> Vec<CartItem> {
        self.cart.state(|s| s.items().to_vec()).await
    }

    /// What checkout would charge right now
    pub async fn quote(&self, redeem_points: bool) -> RedemptionQuote {
        let points = if redeem_points {
            self.session.state(SessionState::points).await
        } else {
            0
        };
        let total = self.cart.state(CartState::total_amount).await;
        RedemptionQuote::new(total, points)
    }

    // ========== Checkout ==========

    /// Charge the cart, optionally redeeming loyalty points
    ///
    /// Points are reserved before the gateway is called: the whole points
    /// balance is debited up front and whatever the order did not redeem is
    /// credited back once the attempt is settled. The cart keeps its items
    /// until [`ZyncApp::finish_checkout`].
    ///
    /// # Errors
    ///
    /// [`ZyncError::NotAuthenticated`] when redeeming without a session,
    /// [`ZyncError::Rejected`] if the points cannot be reserved,
    /// [`ZyncError::Store`] if the gateway does not answer in time. An
    /// approved charge is always reported as `Ok`.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, redeem_points: bool) -> Result<CheckoutOutcome> {
        let reserved = if redeem_points { self.reserve_points().await? } else { 0 };
        let establishment_name = self.establishment.state(|s| s.current.as_ref().map(|e| e.name.clone())).await;

        let attempt = CheckoutAttemptId::new();
        let answer = self
            .cart
            .send_and_wait_for(
                CartAction::Checkout {
                    attempt,
                    redeemable_points: reserved,
                    establishment_name,
                },
                move |a| CheckoutOutcome::for_attempt(a, attempt).is_some(),
                self.checkout_timeout,
            )
            .await;

        let outcome = match answer {
            Ok(answer) => CheckoutOutcome::for_attempt(&answer, attempt).unwrap_or(CheckoutOutcome::Cancelled),
            Err(e) => match self.abandon_checkout().await {
                Some(order_id) => CheckoutOutcome::Succeeded { order_id },
                None => {
                    self.release_points(reserved, 0).await;
                    return Err(e.into());
                },
            },
        };

        let redeemed = match &outcome {
            CheckoutOutcome::Succeeded { order_id } => {
                self.cart
                    .state(|s| s.ledger.get(order_id).map_or(0, |o| o.savings))
                    .await
            },
            _ => 0,
        };
        self.release_points(reserved, redeemed).await;
        Ok(outcome)
    }

    /// Debit the whole points balance for a checkout about to start
    async fn reserve_points(&self) -> Result<u64> {
        let points = self
            .session
            .state(|s| s.is_authenticated().then_some(s.points()))
            .await
            .ok_or(ZyncError::NotAuthenticated)?;
        if points > 0 {
            self.session_command(SessionAction::DebitPoints { points }).await?;
        }
        Ok(points)
    }

    /// Give back the part of a reservation the order did not redeem
    async fn release_points(&self, reserved: u64, redeemed: u64) {
        let unused = reserved.saturating_sub(redeemed);
        if unused == 0 {
            return;
        }
        if let Err(e) = self.session_command(SessionAction::CreditPoints { points: unused }).await {
            tracing::warn!(unused, error = %e, "Reserved points could not be returned");
        }
    }

    /// Abort a checkout whose answer never came; returns the order id if the
    /// charge was approved before the abort landed
    async fn abandon_checkout(&self) -> Option<OrderId> {
        match self
            .cart
            .send_and_inspect(CartAction::CancelCheckout, |s| match &s.phase {
                CheckoutPhase::Success { order_id } => Some(order_id.clone()),
                _ => None,
            })
            .await
        {
            Ok((_, approved)) => approved,
            Err(e) => {
                tracing::warn!(error = %e, "Could not abort unanswered checkout");
                None
            },
        }
    }

    /// Leave the success screen: clears the cart
    ///
    /// # Errors
    ///
    /// [`ZyncError::Rejected`] if no checkout has succeeded.
    pub async fn finish_checkout(&self) -> Result<()> {
        let (_, rejection) = self
            .cart
            .send_and_inspect(CartAction::FinishCheckout, |s| s.last_error.clone())
            .await?;
        rejection.map_or(Ok(()), |reason| Err(ZyncError::Rejected(reason)))
    }

    /// Leave the failure screen
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Store`] if the store is shutting down.
    pub async fn reset_checkout(&self) -> Result<()> {
        self.cart.send(CartAction::ResetCheckout).await?;
        Ok(())
    }

    /// Abort a checkout that is waiting for the gateway
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Store`] if the store is shutting down.
    pub async fn cancel_checkout(&self) -> Result<()> {
        self.cart.send(CartAction::CancelCheckout).await?;
        Ok(())
    }

    /// Placed orders, newest first
    pub async fn orders(&self) -> Vec<ActiveOrder> {
        self.cart.state(|s| s.ledger.orders().to_vec()).await
    }

    /// Mark an order as ready for pickup
    ///
    /// # Errors
    ///
    /// [`ZyncError::Rejected`] for an unknown order id.
    pub async fn mark_order_ready(&self, order_id: OrderId) -> Result<()> {
        let (_, rejection) = self
            .cart
            .send_and_inspect(CartAction::MarkOrderReady { order_id }, |s| s.last_error.clone())
            .await?;
        rejection.map_or(Ok(()), |reason| Err(ZyncError::Rejected(reason)))
    }

    // ========== Wallet ==========

    /// Credit the balance; returns the new balance
    ///
    /// # Errors
    ///
    /// [`ZyncError::Rejected`] when signed out.
    pub async fn top_up(&self, amount: u64) -> Result<u64> {
        self.session_command(SessionAction::Credit { amount }).await?;
        Ok(self.session.state(SessionState::balance).await)
    }

    /// Credit the amount selected in `form`
    ///
    /// # Errors
    ///
    /// [`ZyncError::Rejected`] when the form has no valid amount or the
    /// session is signed out.
    pub async fn top_up_form(&self, form: &TopUpForm) -> Result<u64> {
        let amount = form
            .amount()
            .ok_or_else(|| ZyncError::Rejected("Enter a valid amount".to_string()))?;
        self.top_up(amount).await
    }

    /// Save a card on the signed-in user
    ///
    /// # Errors
    ///
    /// [`ZyncError::Rejected`] when signed out or the card id is taken.
    pub async fn add_payment_method(&self, method: PaymentMethod) -> Result<()> {
        self.session_command(SessionAction::AddPaymentMethod { method }).await
    }

    // ========== Song requests ==========

    /// Search the music catalog
    pub async fn search_tracks(&self, query: &str) -> SearchOutcome {
        self.catalog.search_tracks(query).await
    }

    /// Request `track` from the DJ, paying `price` from the balance
    ///
    /// # Errors
    ///
    /// [`ZyncError::Rejected`] if a request is already active, the session is
    /// signed out, or the balance does not cover the price.
    pub async fn request_song(&self, track: Track, price: u64) -> Result<SongRequestId> {
        let request_id = SongRequestId::new();
        self.session_command(SessionAction::SubmitSongRequest {
            request_id,
            track,
            price,
        })
        .await?;
        Ok(request_id)
    }

    /// Free the song-request slot
    ///
    /// # Errors
    ///
    /// Returns [`ZyncError::Store`] if the store is shutting down.
    pub async fn clear_song_request(&self) -> Result<()> {
        self.session.send(SessionAction::ClearRequest).await?;
        Ok(())
    }

    // ========== Lifecycle ==========

    /// Stop every store and wait for running effects
    ///
    /// # Errors
    ///
    /// Returns the first [`ZyncError::Store`] timeout.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        let (session, cart, establishment) = tokio::join!(
            self.session.shutdown(timeout),
            self.cart.shutdown(timeout),
            self.establishment.shutdown(timeout),
        );
        session?;
        cart?;
        establishment?;
        Ok(())
    }
}
