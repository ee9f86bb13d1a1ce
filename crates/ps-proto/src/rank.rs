//! Authority ranks.
//!
//! Ranks form a fixed total order. A caller's position in the order *is* the
//! access policy: a check for `%` passes for `%`, `@`, `★`, `*`, `#` and `&`.
//!
//! Symbols the server sends that are not part of the order map to
//! [`Rank::Unknown`], which sorts below every defined rank, so an unexpected
//! symbol never grants access.

use std::fmt;

/// A user's authority, globally or within a room.
///
/// Variant order is the access order (derived `Ord`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Rank {
    /// Any symbol outside the known order.
    Unknown,
    /// No rank (`' '`).
    #[default]
    Regular,
    /// Room whitelist.
    Whitelist,
    /// Voice (`+`).
    Voice,
    /// Battle player (`☆`).
    Player,
    /// Driver (`%`).
    Driver,
    /// Moderator (`@`).
    Moderator,
    /// Room host (`★`).
    Host,
    /// Bot (`*`).
    Bot,
    /// Room owner (`#`).
    Owner,
    /// Administrator (`&`).
    Admin,
}

impl Rank {
    /// Every defined rank, lowest first.
    pub const ORDER: [Rank; 10] = [
        Rank::Regular,
        Rank::Whitelist,
        Rank::Voice,
        Rank::Player,
        Rank::Driver,
        Rank::Moderator,
        Rank::Host,
        Rank::Bot,
        Rank::Owner,
        Rank::Admin,
    ];

    /// Parse a rank symbol as the server writes it.
    ///
    /// The empty string and a single space both mean [`Rank::Regular`].
    pub fn from_symbol(symbol: &str) -> Rank {
        match symbol {
            "" | " " => Rank::Regular,
            "whitelist" => Rank::Whitelist,
            "+" => Rank::Voice,
            "☆" => Rank::Player,
            "%" => Rank::Driver,
            "@" => Rank::Moderator,
            "★" => Rank::Host,
            "*" => Rank::Bot,
            "#" => Rank::Owner,
            "&" => Rank::Admin,
            _ => Rank::Unknown,
        }
    }

    /// Parse a single-character rank prefix.
    pub fn from_char(c: char) -> Rank {
        let mut buf = [0u8; 4];
        Rank::from_symbol(c.encode_utf8(&mut buf))
    }

    /// The wire symbol. [`Rank::Unknown`] has none.
    pub fn symbol(self) -> Option<&'static str> {
        Some(match self {
            Rank::Unknown => return None,
            Rank::Regular => " ",
            Rank::Whitelist => "whitelist",
            Rank::Voice => "+",
            Rank::Player => "☆",
            Rank::Driver => "%",
            Rank::Moderator => "@",
            Rank::Host => "★",
            Rank::Bot => "*",
            Rank::Owner => "#",
            Rank::Admin => "&",
        })
    }

    /// Returns `true` if `self` grants at least `required`.
    pub fn at_least(self, required: Rank) -> bool {
        self >= required
    }

    /// Returns `true` for any rank above regular. Ranked users may post bot
    /// replies publicly in a room.
    pub fn is_staff(self) -> bool {
        self > Rank::Regular
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.symbol() {
            Some(symbol) => f.write_str(symbol),
            None => f.write_str("?"),
        }
    }
}
