use std::{error, fmt, io};

/// Error at the Noise layer.
#[derive(Debug)]
pub enum NoiseError {
    /// I/O error.
    Io(io::Error),
    /// A frame exceeds the Noise message size limit.
    FrameTooLarge(usize),
    /// An error raised by the handshake tape itself.
    Noise(snow::Error),
    /// The handshake payload protobuf could not be parsed.
    InvalidPayload,
    /// The identity signature over the remote's static Noise key is wrong.
    SignatureVerificationFailed,
    /// The remote sent a payload in a handshake phase that carries none, or
    /// never sent the payload it owes us.
    UnexpectedPayload,
}

impl fmt::Display for NoiseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NoiseError::Io(e) => write!(f, "i/o error: {}", e),
            NoiseError::FrameTooLarge(n) => write!(f, "noise frame of {} bytes is too large", n),
            NoiseError::Noise(e) => write!(f, "noise protocol error: {}", e),
            NoiseError::InvalidPayload => f.write_str("malformed handshake payload"),
            NoiseError::SignatureVerificationFailed => {
                f.write_str("static key signature did not verify")
            }
            NoiseError::UnexpectedPayload => f.write_str("handshake payload missing or misplaced"),
        }
    }
}

impl error::Error for NoiseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            NoiseError::Io(e) => Some(e),
            NoiseError::Noise(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for NoiseError {
    fn from(e: io::Error) -> NoiseError {
        NoiseError::Io(e)
    }
}

impl From<snow::Error> for NoiseError {
    fn from(e: snow::Error) -> NoiseError {
        NoiseError::Noise(e)
    }
}

impl From<NoiseError> for io::Error {
    fn from(e: NoiseError) -> io::Error {
        match e {
            NoiseError::Io(e) => e,
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
