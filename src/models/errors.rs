use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

/// Error kinds raised by the data-access and validation layers.
///
/// Domain kinds carry a user-safe message (see [`ModelError::public`]);
/// wrapping kinds are only ever logged.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("models: resource not found")]
    NotFound,
    #[error("models: ID provided was invalid")]
    IdInvalid,
    #[error("models: incorrect password provided")]
    PasswordIncorrect,
    #[error("models: email address is required")]
    EmailRequired,
    #[error("models: email address is not valid")]
    EmailInvalid,
    #[error("models: email address is already taken")]
    EmailTaken,
    #[error("models: password is required")]
    PasswordRequired,
    #[error("models: password must be at least 8 characters long")]
    PasswordTooShort,
    #[error("models: password hash is required")]
    PasswordHashRequired,
    #[error("models: remember token is required")]
    RememberRequired,
    #[error("models: remember token must be at least 32 bytes")]
    RememberTooShort,
    #[error("models: user ID is required")]
    UserIdRequired,
    #[error("models: title is required")]
    TitleRequired,
    #[error("models: token provided is not valid")]
    TokenInvalid,
    #[error("models: filename is not valid")]
    FilenameInvalid,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hash error: {0}")]
    PasswordHash(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ModelError {
    /// Message that may be shown to the user verbatim, if any.
    pub fn public(&self) -> Option<String> {
        match self {
            ModelError::Database(_)
            | ModelError::PasswordHash(_)
            | ModelError::Io(_)
            | ModelError::Internal(_) => None,
            domain => {
                let text = domain.to_string();
                let text = text.trim_start_matches("models: ");
                let mut chars = text.chars();
                chars
                    .next()
                    .map(|first| first.to_uppercase().chain(chars).collect())
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::NotFound)
    }
}
