use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential is empty")]
    Empty,

    #[error("Credential is not a three-part token")]
    Malformed,

    #[error("Credential payload is not valid base64url")]
    Encoding(#[from] base64::DecodeError),

    #[error("Credential payload is not a JSON object")]
    Payload,

    #[error("Credential is missing claim: {0}")]
    MissingClaim(&'static str),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame has no command line")]
    MissingCommand,

    #[error("Unknown frame command: {0}")]
    UnknownCommand(String),

    #[error("Malformed header line: {0}")]
    MalformedHeader(String),

    #[error("Invalid escape sequence in header")]
    InvalidEscape,
}
