use crate::error::ScanError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;

/// A decrypted mailbox password. Lives only as long as one mailbox session.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Turns a stored mailbox secret back into a usable password.
pub trait CredentialCodec: Send + Sync {
    fn decrypt(&self, stored: &str) -> Result<Password, ScanError>;
}

/// Secrets stored as standard base64 of the UTF-8 password.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl Base64Codec {
    pub fn encode(password: &str) -> String {
        STANDARD.encode(password.as_bytes())
    }
}

impl CredentialCodec for Base64Codec {
    fn decrypt(&self, stored: &str) -> Result<Password, ScanError> {
        let bytes = STANDARD
            .decode(stored.trim())
            .map_err(|e| ScanError::Decrypt(e.to_string()))?;
        let plain = String::from_utf8(bytes).map_err(|e| ScanError::Decrypt(e.to_string()))?;
        Ok(Password(plain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypts_what_encode_produced() {
        let stored = Base64Codec::encode("hunter2");
        let password = Base64Codec.decrypt(&stored).unwrap();
        assert_eq!(password.expose(), "hunter2");
    }

    #[test]
    fn malformed_secret_is_a_decrypt_error() {
        let err = Base64Codec.decrypt("not base64 !!").unwrap_err();
        assert!(matches!(err, ScanError::Decrypt(_)));
        assert_eq!(err.reason(), "decrypt");
    }

    #[test]
    fn debug_output_never_shows_password() {
        assert_eq!(format!("{:?}", Password::new("hunter2")), "Password(<redacted>)");
    }
}
