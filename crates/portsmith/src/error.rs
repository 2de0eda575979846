use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Other,
    CacheTokenNotConfigured,
    CacheTokenNotSpecified,
    CacheTokenMismatch,
    CircularDependency,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self {
            kind: ErrorKind::Other,
            msg: msg.into(),
        }
    }

    pub fn with_kind<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn cache_token_not_configured() -> Self {
        Self::with_kind(
            ErrorKind::CacheTokenNotConfigured,
            "cache token is not configured in [cache].token",
        )
    }

    pub fn cache_token_not_specified() -> Self {
        Self::with_kind(
            ErrorKind::CacheTokenNotSpecified,
            "cache token is not specified (use --cache-token)",
        )
    }

    pub fn cache_token_mismatch() -> Self {
        Self::with_kind(
            ErrorKind::CacheTokenMismatch,
            "cache tokens do not match, check --cache-token and [cache].token",
        )
    }

    /// `active` is the resolution stack; `repeat` is the port that re-entered it.
    pub fn circular_dependency<T: fmt::Display>(active: &[(T, bool)], repeat: &T) -> Self {
        let chain: Vec<String> = active
            .iter()
            .map(|(n, _)| n.to_string())
            .chain(std::iter::once(repeat.to_string()))
            .collect();
        Self::with_kind(
            ErrorKind::CircularDependency,
            format!("circular dependency: {}", chain.join(" -> ")),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    // Prefix the message with context while keeping the kind.
    pub fn context<C: fmt::Display>(self, ctx: C) -> Self {
        Self {
            kind: self.kind,
            msg: format!("{ctx}: {}", self.msg),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
