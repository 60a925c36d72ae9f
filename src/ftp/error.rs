use thiserror::Error;

#[derive(Debug, Error)]
pub enum FtpError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out during {0}")]
    Timeout(&'static str),

    #[error("server closed the control connection")]
    Disconnected,

    #[error("login rejected ({code}): {text}")]
    AuthRejected { code: u16, text: String },

    #[error("unexpected reply to {command} ({code}): {text}")]
    Unexpected {
        command: &'static str,
        code: u16,
        text: String,
    },

    #[error("malformed reply: {0}")]
    Protocol(String),

    #[error("transfer finished without data")]
    EmptyTransfer,

    #[error("invalid FTP url: {0}")]
    InvalidUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FtpError {
    pub fn is_auth(&self) -> bool {
        matches!(self, FtpError::AuthRejected { .. })
    }

    /// The control channel can no longer be trusted: a reply may still be pending, or the
    /// socket is gone. The session must be dropped rather than reused.
    pub fn ends_session(&self) -> bool {
        matches!(self, FtpError::Timeout(_) | FtpError::Disconnected | FtpError::Io(_))
    }

    /// 550-class replies: the path does not exist on this server.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FtpError::Unexpected { code: 550 | 450 | 551, .. })
    }
}

pub type FtpResult<T> = Result<T, FtpError>;
