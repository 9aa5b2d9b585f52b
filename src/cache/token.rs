use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: String, expires_at: DateTime<Utc>) -> Self {
        Self { value, expires_at }
    }

    /// Still usable at `now` with `buffer` to spare. A buffer past the
    /// representable range leaves no token valid.
    pub fn is_valid_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        now.checked_add_signed(buffer).is_some_and(|deadline| deadline < self.expires_at)
    }
}

/// Cached token of one provider. Token and expiry are held together, so they
/// are always set and cleared as a pair.
#[derive(Debug, Default)]
pub struct TokenState {
    current: Option<Token>,
}

impl TokenState {
    pub fn valid_token(&self, now: DateTime<Utc>, buffer: Duration) -> Option<&Token> {
        self.current.as_ref().filter(|token| token.is_valid_at(now, buffer))
    }

    pub fn replace(&mut self, token: Token) {
        self.current = Some(token);
    }

    /// Returns whether a token was actually held.
    pub fn clear(&mut self) -> bool {
        self.current.take().is_some()
    }

    pub fn value(&self) -> Option<&str> {
        self.current.as_ref().map(|token| token.value.as_str())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current.as_ref().map(|token| token.expires_at)
    }
}

/// What the admin API may show about a cached token. Never the value itself.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenStatus {
    pub provider: String,
    pub cached: bool,
    pub expires_at: Option<DateTime<Utc>>,
}
