use tracing::warn;

use crate::{Error, Result};

/// Policy for handling chunks that fail to decode during iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Surface the failure to the caller
    #[default]
    Propagate,
    /// Log the failure and continue with the next chunk
    SkipChunk,
}
impl DecodePolicy {
    /// Applies the policy to an error raised while reading the chunk under `key`
    ///
    /// Returns `Ok(())` when the chunk should be skipped. Only decode errors can be
    /// skipped: storage and configuration failures are always returned.
    pub fn handle(&self, key: &[u8], err: Error) -> Result<()> {
        match self {
            Self::SkipChunk if err.is_decode_error() => {
                warn!(key = ?key, error = %err, "skipping corrupt chunk");
                Ok(())
            }
            _ => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, StoreError};

    #[test]
    fn test_policies() {
        let corrupt = || Error::from(DecodeError::InvalidRowKey("x".into()));
        assert!(DecodePolicy::Propagate.handle(b"k", corrupt()).is_err());
        assert!(DecodePolicy::SkipChunk.handle(b"k", corrupt()).is_ok());

        let outage = Error::from(StoreError::Unavailable("down".into()));
        let err = DecodePolicy::SkipChunk.handle(b"k", outage).unwrap_err();
        assert!(err.is_retryable());
    }
}
