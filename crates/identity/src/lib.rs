use std::{error, fmt, io, sync::Arc};

pub mod auth;
pub mod backend;
pub mod cpf;
pub mod identifier;
pub mod settings;

pub use auth::{Auth, Registration};
pub use backend::{IdentityBackend, InMemoryBackend, Session, UserRef};
pub use identifier::Identifier;
pub use settings::{Settings, USER_STORAGE_KEY};

#[derive(Debug, Clone)]
pub enum IdentityError {
    MissingFields,
    InvalidCpf,
    InvalidEmail,
    UserNotFound,
    WrongPassword,
    ProfileNotFound,
    CpfAlreadyRegistered,
    EmailAlreadyRegistered,
    NotLoggedIn,
    /// The backend failed for reasons unrelated to the request.
    Backend(String),
    StorageError(Arc<io::Error>),
    JsonError(Arc<serde_json::Error>),
}

impl error::Error for IdentityError {}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingFields => write!(f, "Please fill in all fields."),
            Self::InvalidCpf => write!(f, "Invalid CPF."),
            Self::InvalidEmail => write!(f, "Invalid email address."),
            Self::UserNotFound => write!(f, "User not found."),
            Self::WrongPassword => write!(f, "Wrong password."),
            Self::ProfileNotFound => write!(f, "Profile not found."),
            Self::CpfAlreadyRegistered => write!(
                f,
                "This CPF is already registered. Recover your password if you forgot it."
            ),
            Self::EmailAlreadyRegistered => write!(
                f,
                "This email is already registered. Use another email or log in."
            ),
            Self::NotLoggedIn => write!(f, "Not logged in."),
            Self::Backend(why) => write!(f, "Identity backend error: {why}"),
            Self::StorageError(e) => write!(f, "Settings storage error: {e}"),
            Self::JsonError(e) => write!(f, "Settings JSON error: {e}"),
        }
    }
}

impl From<io::Error> for IdentityError {
    fn from(e: io::Error) -> Self {
        Self::StorageError(Arc::new(e))
    }
}

impl From<serde_json::Error> for IdentityError {
    fn from(e: serde_json::Error) -> Self {
        Self::JsonError(Arc::new(e))
    }
}

pub type IdentityResult<O> = Result<O, IdentityError>;
