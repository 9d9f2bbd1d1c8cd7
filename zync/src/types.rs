//! Domain types for the Zync client.
//!
//! Value objects shared by every store: users and their wallet, venues, menu
//! products, cart lines, orders, and catalog tracks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Defines an identifier that wraps an opaque string issued elsewhere
/// (fixtures, backend, payment processor).
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a user account
    UserId
);
string_id!(
    /// Identifier of a venue
    EstablishmentId
);
string_id!(
    /// Identifier of a menu product
    ProductId
);
string_id!(
    /// Identifier of a saved card
    PaymentMethodId
);
string_id!(
    /// Order number shown on the ticket (e.g. `"4821"`)
    OrderId
);
string_id!(
    /// Identifier of a catalog track
    TrackId
);

/// Correlates a login command with its outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoginAttemptId(Uuid);

impl LoginAttemptId {
    /// Creates a new random `LoginAttemptId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LoginAttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoginAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlates a checkout command with the gateway result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckoutAttemptId(Uuid);

impl CheckoutAttemptId {
    /// Creates a new random `CheckoutAttemptId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CheckoutAttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CheckoutAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a submitted song request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SongRequestId(Uuid);

impl SongRequestId {
    /// Creates a new random `SongRequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SongRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SongRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Users
// ============================================================================

/// Account role
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular guest
    #[default]
    User,
    /// Platform administrator
    Admin,
    /// Venue staff
    Staff,
}

/// Loyalty tier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// Entry tier
    #[default]
    Standard,
    /// Mid tier
    Gold,
    /// Top tier
    Platinum,
}

/// Card network of a saved payment method
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardNetwork {
    /// Visa
    Visa,
    /// Mastercard
    Mastercard,
    /// American Express
    Amex,
}

/// A saved card
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    /// Card id
    pub id: PaymentMethodId,
    /// Network
    #[serde(rename = "type")]
    pub network: CardNetwork,
    /// Last four digits
    pub last4: String,
    /// Expiry as `MM/YY`
    pub expiry: String,
    /// Name printed on the card
    pub holder_name: String,
}

/// Aggregate activity counters shown on the profile
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    /// Orders placed
    pub orders: u32,
    /// Total spent, currency units
    pub spent: u64,
    /// Nights attended
    pub nights: u32,
}

/// An authenticated user and the wallet data reachable from the client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Account id
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
    /// Public handle, e.g. `@frank_cyber`
    pub handle: String,
    /// Avatar URL
    pub avatar: String,
    /// Role
    pub role: Role,
    /// Wallet balance, currency units
    pub balance: u64,
    /// Loyalty points, redeemable 1:1 against order totals
    pub zync_points: u64,
    /// Loyalty tier
    pub tier: Tier,
    /// Saved cards, append only
    pub cards: Vec<PaymentMethod>,
    /// Activity counters
    pub stats: UserStats,
}

// ============================================================================
// Venues
// ============================================================================

/// Visual theme tag of a venue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Neon
    Cyber,
    /// Vintage
    Retro,
    /// Warehouse
    Industrial,
}

/// The DJ currently booked at a venue
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentDj {
    /// Artist name
    pub name: String,
    /// Genre
    pub genre: String,
    /// Set start, `HH:MM`
    pub start_time: String,
    /// Set end, `HH:MM`
    pub end_time: String,
    /// Whether the set is playing now
    pub is_live: bool,
}

/// A venue
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Establishment {
    /// Venue id
    pub id: EstablishmentId,
    /// Name
    pub name: String,
    /// Human readable location
    pub location: String,
    /// Cover image URL
    pub image: String,
    /// Background video URL
    pub video: String,
    /// Average rating
    pub rating: f32,
    /// Theme tag
    pub theme: Theme,
    /// Booked DJ, if any
    pub current_dj: Option<CurrentDj>,
}

// ============================================================================
// Menu, cart, orders
// ============================================================================

/// An item on a venue's menu
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product id
    pub id: ProductId,
    /// Menu section
    pub category: String,
    /// Name
    pub name: String,
    /// Description
    pub description: String,
    /// Unit price, currency units
    pub price: u64,
    /// Image URL, may be empty
    pub image: String,
    /// Shown in the featured carousel
    pub is_featured: bool,
}

/// A product and how many units of it are in the cart
///
/// The quantity is never zero: a line whose last unit is removed disappears.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    product: Product,
    quantity: NonZeroU32,
}

impl CartItem {
    /// A new line holding one unit
    #[must_use]
    pub const fn new(product: Product) -> Self {
        Self {
            product,
            quantity: NonZeroU32::MIN,
        }
    }

    /// The product on this line
    #[must_use]
    pub const fn product(&self) -> &Product {
        &self.product
    }

    /// Units on this line (always at least one)
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity.get()
    }

    /// `price × quantity`
    #[must_use]
    pub const fn subtotal(&self) -> u64 {
        self.product.price.saturating_mul(self.quantity.get() as u64)
    }

    pub(crate) const fn increment(&mut self) {
        self.quantity = self.quantity.saturating_add(1);
    }

    /// Remove one unit; `None` means the line is now empty
    pub(crate) fn decrement(self) -> Option<Self> {
        NonZeroU32::new(self.quantity.get() - 1).map(|quantity| Self {
            product: self.product,
            quantity,
        })
    }
}

/// Fulfilment status of an order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Paid, being prepared
    #[default]
    Pending,
    /// Ready for pickup at the bar
    Ready,
}

/// An order produced by a successful checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveOrder {
    /// Order number
    pub id: OrderId,
    /// Cart lines at checkout time
    pub items: Vec<CartItem>,
    /// Amount charged after discounts
    pub total: u64,
    /// Points redeemed against the cart total
    pub savings: u64,
    /// Fulfilment status
    pub status: OrderStatus,
    /// Venue selected when the order was placed
    pub establishment_name: Option<String>,
    /// When the payment was approved
    pub placed_at: DateTime<Utc>,
}

// ============================================================================
// Catalog tracks and song requests
// ============================================================================

/// A cover image in one resolution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumImage {
    /// Image URL
    pub url: String,
    /// Height in pixels, when known
    pub height: Option<u32>,
    /// Width in pixels, when known
    pub width: Option<u32>,
}

/// A track returned by the music catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Catalog id
    pub id: TrackId,
    /// Title
    pub name: String,
    /// Artist names in credit order
    pub artists: Vec<String>,
    /// Album title
    pub album_name: String,
    /// Album covers, largest first as delivered by the catalog
    pub album_images: Vec<AlbumImage>,
    /// Catalog URI
    pub uri: String,
}

impl Track {
    /// Artist names joined for display
    #[must_use]
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// The single song request a session may have outstanding
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRequest {
    /// Request id
    pub id: SongRequestId,
    /// Requested track
    pub track: Track,
    /// Price debited from the balance
    pub price: u64,
    /// When the request was accepted
    pub requested_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beer() -> Product {
        Product {
            id: ProductId::new("b1"),
            category: "Cervezas".to_string(),
            name: "Cyber IPA".to_string(),
            description: "Hazy IPA 6.5%".to_string(),
            price: 5000,
            image: String::new(),
            is_featured: false,
        }
    }

    #[test]
    fn cart_item_starts_at_one_unit() {
        let item = CartItem::new(beer());
        assert_eq!(item.quantity(), 1);
        assert_eq!(item.subtotal(), 5000);
    }

    #[test]
    fn decrementing_last_unit_empties_the_line() {
        let mut item = CartItem::new(beer());
        item.increment();
        let item = item.decrement();
        assert_eq!(item.as_ref().map(CartItem::quantity), Some(1));
        assert!(item.and_then(CartItem::decrement).is_none());
    }

    #[test]
    fn payment_method_uses_wire_names() {
        let json = serde_json::json!({
            "id": "c1",
            "type": "visa",
            "last4": "4242",
            "expiry": "12/26",
            "holderName": "FRANK YANEZ"
        });
        let method: PaymentMethod = serde_json::from_value(json).unwrap();
        assert_eq!(method.network, CardNetwork::Visa);
        assert_eq!(method.holder_name, "FRANK YANEZ");
    }
}
