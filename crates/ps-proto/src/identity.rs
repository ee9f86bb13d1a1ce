//! User identities.
//!
//! The server writes users as an *identity*: a rank symbol followed by the
//! display name, e.g. `"+bob"`, `" alice"` or `"@Mod Person@!"`. A trailing
//! `@!` marks the user as away and is not part of the name.

use std::fmt;

use crate::id::to_id;
use crate::rank::Rank;

/// Suffix marking an away or busy user.
pub const AWAY_MARKER: &str = "@!";

/// A rank-prefixed user identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Rank carried by the prefix symbol.
    pub rank: Rank,
    /// Display name without prefix or away marker.
    pub name: String,
    /// Whether the away marker was present.
    pub away: bool,
}

impl Identity {
    /// Parse an identity as it appears in chat and presence lines.
    ///
    /// Names never start with an alphanumeric rank symbol, so an input that
    /// starts with a letter or digit is treated as a bare regular-rank name.
    pub fn parse(raw: &str) -> Identity {
        let (body, away) = match raw.split_once(AWAY_MARKER) {
            Some((body, _)) => (body, true),
            None => (raw, false),
        };

        let mut chars = body.chars();
        match chars.next() {
            Some(first) if !first.is_ascii_alphanumeric() => Identity {
                rank: Rank::from_char(first),
                name: chars.as_str().to_owned(),
                away,
            },
            _ => Identity {
                rank: Rank::Regular,
                name: body.to_owned(),
                away,
            },
        }
    }

    /// Parse the bot's own full identity from an `updateuser` line, which
    /// carries no rank prefix.
    pub fn parse_bare(raw: &str) -> Identity {
        let (name, away) = match raw.split_once(AWAY_MARKER) {
            Some((name, _)) => (name, true),
            None => (raw, false),
        };
        Identity {
            rank: Rank::Regular,
            name: name.trim_start().to_owned(),
            away,
        }
    }

    /// The user id.
    pub fn id(&self) -> String {
        to_id(&self.name)
    }

    /// Returns `true` for unregistered guest names.
    pub fn is_guest(&self) -> bool {
        self.id().starts_with("guest")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.name)?;
        if self.away {
            f.write_str(AWAY_MARKER)?;
        }
        Ok(())
    }
}
