//! Development fixtures: the built-in user directory, venues and menu.
//!
//! Used by [`crate::session::InMemoryDirectory`] and the demo binary when no
//! backend is configured.

use crate::types::{
    CardNetwork, CurrentDj, Establishment, EstablishmentId, PaymentMethod, PaymentMethodId,
    Product, ProductId, Role, Theme, Tier, User, UserId, UserStats,
};

/// Token issued by the in-memory directory
pub const DEVELOPMENT_TOKEN: &str = "mock-token-xyz";

/// Users known to the in-memory directory
#[must_use]
pub fn users() -> Vec<User> {
    vec![User {
        id: UserId::new("u1"),
        name: "Frank Yanez".to_string(),
        email: "frank@zync.com".to_string(),
        handle: "@frank_cyber".to_string(),
        avatar: "https://i.pravatar.cc/150?u=frank".to_string(),
        role: Role::User,
        balance: 15000,
        zync_points: 2450,
        tier: Tier::Gold,
        cards: vec![
            card("c1", CardNetwork::Visa, "4242", "12/26"),
            card("c2", CardNetwork::Mastercard, "8899", "09/25"),
        ],
        stats: UserStats {
            orders: 12,
            spent: 154_000,
            nights: 5,
        },
    }]
}

fn card(id: &str, network: CardNetwork, last4: &str, expiry: &str) -> PaymentMethod {
    PaymentMethod {
        id: PaymentMethodId::new(id),
        network,
        last4: last4.to_string(),
        expiry: expiry.to_string(),
        holder_name: "FRANK YANEZ".to_string(),
    }
}

/// Venues available for selection
#[must_use]
pub fn establishments() -> Vec<Establishment> {
    let venue = |id: &str, name: &str, current_dj: Option<CurrentDj>| Establishment {
        id: EstablishmentId::new(id),
        name: name.to_string(),
        location: "Sector 7, Neo-Santiago".to_string(),
        image: "https://example.com/vertigo.jpg".to_string(),
        video: "https://www.pexels.com/es-es/download/video/854128/".to_string(),
        rating: 4.5,
        theme: Theme::Cyber,
        current_dj,
    };

    vec![
        venue(
            "e1",
            "Brothers",
            Some(CurrentDj {
                name: "K-LIX".to_string(),
                genre: "Tech House".to_string(),
                start_time: "22:00".to_string(),
                end_time: "04:00".to_string(),
                is_live: true,
            }),
        ),
        venue("e2", "Club Vertigo", None),
        venue("e3", "Ogham", None),
        venue("e4", "Harrys", None),
        venue("e5", "The Last", None),
    ]
}

/// The drink menu
#[must_use]
pub fn menu() -> Vec<Product> {
    let product = |id: &str, category: &str, name: &str, description: &str, price: u64, image: &str| Product {
        id: ProductId::new(id),
        category: category.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        price,
        image: image.to_string(),
        is_featured: category == "Autor",
    };

    vec![
        product(
            "d1",
            "Autor",
            "Neon Noir",
            "Gin, blackberry liqueur, lemon, tonic, activated charcoal foam.",
            12000,
            "https://example.com/neon-noir.jpg",
        ),
        product(
            "d2",
            "Autor",
            "Cyber Sour",
            "Pisco, lime, egg white, neon bitters, electric dust.",
            10000,
            "https://example.com/cyber-sour.jpg",
        ),
        product(
            "d3",
            "Autor",
            "Matrix Mule",
            "Vodka, ginger beer, lime, cucumber, digital mint.",
            11000,
            "https://example.com/matrix-mule.jpg",
        ),
        product(
            "d4",
            "Autor",
            "Void Walker",
            "Blue curaçao, white rum, pineapple, glowing ice cube.",
            14000,
            "https://example.com/void-walker.jpg",
        ),
        product("d5", "Clásicos", "Old Fashioned", "Bourbon, sugar, angostura bitters.", 9000, ""),
        product("d6", "Clásicos", "Mojito", "Rum, mint, lime, soda.", 8500, ""),
        product("b1", "Cervezas", "Cyber IPA", "Hazy IPA 6.5%", 5000, ""),
        product("b2", "Cervezas", "Stella Artois", "Lager", 4000, ""),
    ]
}

/// Look up a menu product by id
#[must_use]
pub fn product(id: &str) -> Option<Product> {
    menu().into_iter().find(|p| p.id.as_str() == id)
}

/// Look up a venue by id
#[must_use]
pub fn establishment(id: &str) -> Option<Establishment> {
    establishments().into_iter().find(|e| e.id.as_str() == id)
}
