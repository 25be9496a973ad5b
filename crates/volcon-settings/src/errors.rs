use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A value parsed but falls outside its accepted range.
    #[error("{key} = {value} is outside {min}..={max}")]
    InvalidValue {
        key: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_file() {
        let err = SettingsError::Io {
            path: PathBuf::from("/etc/volcon.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot read /etc/volcon.json: denied");
    }

    #[test]
    fn invalid_value_shows_range() {
        let err = SettingsError::InvalidValue {
            key: "server.maxSendQueue",
            value: 0,
            min: 1,
            max: 65_536,
        };
        assert_eq!(err.to_string(), "server.maxSendQueue = 0 is outside 1..=65536");
    }
}
