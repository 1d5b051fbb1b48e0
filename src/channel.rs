//! Channel reference parsing.
//!
//! Users identify a channel by numeric id, by public username (with or
//! without `@`), or by a `t.me` link. Parsing happens before any network
//! call so that a malformed reference fails fast.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Link form: `https://t.me/<path>`, scheme and `www.` optional
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.)?(?:t|telegram)\.me/(.+)$")
        .expect("Invalid regex pattern")
});

/// Public usernames: 5-32 chars, leading letter
static USERNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]{4,31}$").expect("Invalid regex pattern")
});

static NUMERIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+$").expect("Invalid regex pattern"));

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChannelRefError {
    #[error("Empty channel reference")]
    Empty,

    #[error("Channel id out of range: {0}")]
    IdOutOfRange(String),

    #[error("Not a valid channel username: {0}")]
    InvalidUsername(String),

    #[error("Unrecognized channel link: {0}")]
    InvalidLink(String),
}

/// A parsed, not yet resolved, channel reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelRef {
    Id(i64),
    Username(String),
    /// Private invite hash (`t.me/+hash` or `t.me/joinchat/hash`)
    Invite(String),
}

impl ChannelRef {
    pub fn parse(input: &str) -> Result<Self, ChannelRefError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ChannelRefError::Empty);
        }

        if NUMERIC_PATTERN.is_match(trimmed) {
            return trimmed
                .parse::<i64>()
                .map(Self::Id)
                .map_err(|_| ChannelRefError::IdOutOfRange(trimmed.to_string()));
        }

        if let Some(caps) = LINK_PATTERN.captures(trimmed) {
            return Self::parse_link_path(&caps[1])
                .ok_or_else(|| ChannelRefError::InvalidLink(trimmed.to_string()));
        }

        let name = trimmed.strip_prefix('@').unwrap_or(trimmed);
        if USERNAME_PATTERN.is_match(name) {
            Ok(Self::Username(name.to_string()))
        } else {
            Err(ChannelRefError::InvalidUsername(trimmed.to_string()))
        }
    }

    fn parse_link_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = path.trim_end_matches('/');

        if let Some(hash) = path.strip_prefix('+') {
            return (!hash.is_empty() && !hash.contains('/')).then(|| Self::Invite(hash.to_string()));
        }
        if let Some(hash) = path.strip_prefix("joinchat/") {
            return (!hash.is_empty() && !hash.contains('/')).then(|| Self::Invite(hash.to_string()));
        }

        // `t.me/s/<name>` is the web preview; `t.me/<name>/<msg>` a post link
        let path = path.strip_prefix("s/").unwrap_or(path);
        let name = path.split('/').next()?;
        USERNAME_PATTERN
            .is_match(name)
            .then(|| Self::Username(name.to_string()))
    }
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelRef::Id(id) => write!(f, "{}", id),
            ChannelRef::Username(name) => write!(f, "@{}", name),
            ChannelRef::Invite(hash) => write!(f, "+{}", hash),
        }
    }
}

impl std::str::FromStr for ChannelRef {
    type Err = ChannelRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
