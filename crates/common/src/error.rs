use serde::Serialize;

/// Platform `errcode` values that mean the credential itself was rejected.
const AUTH_ERRCODES: &[i64] = &[40001, 40014, 40029, 40163, 41001, 42001, 42007];

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The call did not produce usable data: transport failure, timeout,
    /// non-success status, or a body that is not the JSON we expected.
    #[error("system error: {0}")]
    System(String),

    /// The platform answered with a non-zero `errcode`.
    #[error("platform error {errcode}: {errmsg}")]
    Platform { errcode: i64, errmsg: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Two argument keys are equal once lower-cased.
    #[error("canonical key collision: {0}")]
    KeyCollision(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    System,
    Auth,
    Platform,
    InvalidInput,
}

impl Error {
    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::System(_) => ErrorKind::System,
            Self::Platform { errcode, .. } if AUTH_ERRCODES.contains(errcode) => ErrorKind::Auth,
            Self::Platform { .. } => ErrorKind::Platform,
            Self::InvalidUrl(_) | Self::KeyCollision(_) => ErrorKind::InvalidInput,
        }
    }

    /// Stable string code, suitable for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::System => "ERR_SYSTEM_ERROR",
            ErrorKind::Auth => "ERR_AUTH_ERROR",
            ErrorKind::Platform => "ERR_PLATFORM_ERROR",
            ErrorKind::InvalidInput => "ERR_INVALID_INPUT",
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }
}
