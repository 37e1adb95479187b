use std::{error, fmt, io};

/// Error at the SECIO layer communication.
#[derive(Debug)]
pub enum SecioError {
    /// I/O error.
    IoError(io::Error),
    /// Failed to parse one of the handshake protobuf messages.
    HandshakeParsingFailure,
    /// A message arrived in a phase where it cannot be handled.
    InvalidNegotiationState,
    /// There is no protocol supported by both the local and remote hosts.
    NoSupportIntersection,
    /// The remote presented a public key we could not decode.
    InvalidRemotePubKey,
    /// Both ends of the channel derive the same ordering hash, i.e. we are
    /// talking to ourselves.
    SelfConnecting,
    /// The signature of the exchange packet doesn't verify the remote public key.
    SignatureVerificationFailed,
    /// Failed to generate the ephemeral key or the shared secret.
    SecretGenerationFailed,
    /// The final check of the handshake failed: the remote did not return our
    /// nonce over the secured channel.
    NonceVerificationFailed,
    /// A frame on the secured channel is too short to carry its MAC.
    FrameTooShort,
    /// The MAC of a received frame doesn't match its content.
    HmacNotMatching,
    /// We received an invalid proposition from remote.
    InvalidProposition(&'static str),
}

impl fmt::Display for SecioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SecioError::IoError(e) => write!(f, "i/o error: {}", e),
            SecioError::HandshakeParsingFailure => {
                f.write_str("failed to parse one of the handshake messages")
            }
            SecioError::InvalidNegotiationState => {
                f.write_str("handshake message received in the wrong phase")
            }
            SecioError::NoSupportIntersection => {
                f.write_str("no algorithm supported by both ends of the channel")
            }
            SecioError::InvalidRemotePubKey => f.write_str("invalid remote public key"),
            SecioError::SelfConnecting => f.write_str("connecting to ourselves"),
            SecioError::SignatureVerificationFailed => {
                f.write_str("signature of the exchange packet did not verify")
            }
            SecioError::SecretGenerationFailed => {
                f.write_str("failed to generate ephemeral key material")
            }
            SecioError::NonceVerificationFailed => {
                f.write_str("the remote did not return our nonce on the secured channel")
            }
            SecioError::FrameTooShort => f.write_str("frame too short to carry its MAC"),
            SecioError::HmacNotMatching => f.write_str("frame MAC does not match"),
            SecioError::InvalidProposition(msg) => write!(f, "invalid proposition: {}", msg),
        }
    }
}

impl error::Error for SecioError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            SecioError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SecioError {
    fn from(e: io::Error) -> SecioError {
        SecioError::IoError(e)
    }
}

impl From<SecioError> for io::Error {
    fn from(e: SecioError) -> io::Error {
        match e {
            SecioError::IoError(e) => e,
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
