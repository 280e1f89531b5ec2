use std::fmt;

#[derive(Debug)]
pub enum RecorderError {
    /// Hardware unreachable or replay source missing. Fatal for that device
    /// only; other devices proceed.
    DeviceInit(String),
    /// Operation invoked outside its required lifecycle state.
    State(String),
    Capture(String),
    Encoding(String),
    Decoding(String),
    /// Video save requested without JPEG-encoded buffers.
    UnsupportedBufferType(String),
    /// Container declares more frame entries than the file holds.
    TruncatedFile(String),
    Io(String),
    Muxing(String),
    Trigger(String),
    NotFound(String),
    /// Malformed command line; recorder exits -1 with a usage hint.
    Usage(String),
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecorderError::DeviceInit(msg) => write!(f, "Device initialization error: {}", msg),
            RecorderError::State(msg) => write!(f, "State error: {}", msg),
            RecorderError::Capture(msg) => write!(f, "Capture error: {}", msg),
            RecorderError::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            RecorderError::Decoding(msg) => write!(f, "Decoding error: {}", msg),
            RecorderError::UnsupportedBufferType(msg) => {
                write!(f, "Unsupported buffer type: {}", msg)
            }
            RecorderError::TruncatedFile(msg) => write!(f, "Truncated file: {}", msg),
            RecorderError::Io(msg) => write!(f, "IO error: {}", msg),
            RecorderError::Muxing(msg) => write!(f, "Muxing error: {}", msg),
            RecorderError::Trigger(msg) => write!(f, "Trigger channel error: {}", msg),
            RecorderError::NotFound(msg) => write!(f, "Not found: {}", msg),
            RecorderError::Usage(msg) => write!(f, "Usage error: {}", msg),
        }
    }
}

impl std::error::Error for RecorderError {}

impl From<std::io::Error> for RecorderError {
    fn from(e: std::io::Error) -> Self {
        RecorderError::Io(e.to_string())
    }
}
