use thiserror::Error as ThisError;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("{0} not found")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("transaction conflict")]
    Conflict,
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("blocked")]
    Blocked,
    #[error("another request is already in flight")]
    InFlight,
    #[error("malformed document: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Malformed(e.to_string())
    }
}

impl Error {
    pub fn is_upload(&self) -> bool {
        matches!(self, Error::Upload(_))
    }

    /// Text shown in the blocking alert.
    pub fn user_message(&self) -> String {
        match self {
            Error::NotLoggedIn => "You need to be logged in to do that.".to_string(),
            Error::NotFound(what) => format!("This {} is no longer available.", what),
            Error::PermissionDenied(_) => "You don't have permission to do that.".to_string(),
            Error::Unavailable(_) | Error::Conflict => {
                "Something went wrong. Please try again.".to_string()
            }
            Error::Upload(_) => "Your image could not be uploaded. Tap retry to try again.".to_string(),
            Error::InvalidInput(reason) => reason.clone(),
            Error::Blocked => "You can't interact with this account.".to_string(),
            Error::InFlight => "Please wait for the previous request to finish.".to_string(),
            Error::Malformed(_) => "Received unexpected data. Please try again later.".to_string(),
        }
    }
}
