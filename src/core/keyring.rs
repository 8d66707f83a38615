//! Server passwords kept in the platform keyring instead of the config file.

use crate::core::constants::KEYRING_SERVICE;
use keyring::Entry;
use std::error::Error;
use std::fmt;

/// Describes failures when attempting to access the system keyring.
///
/// Recoverable errors indicate that the credential backend was
/// temporarily unavailable (for example when the keychain service is
/// locked or inaccessible). Permanent errors surface the underlying
/// cause directly so callers can report them to the user.
#[derive(Debug)]
pub enum KeyringAccessError {
    Recoverable(keyring::Error),
    Permanent(keyring::Error),
}

impl KeyringAccessError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringAccessError::Recoverable(err) | KeyringAccessError::Permanent(err) => err,
        }
    }

    /// Returns true when the error represents a temporary outage of the
    /// platform keyring backend.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyringAccessError::Recoverable(_))
    }
}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err)
            }
            other => KeyringAccessError::Permanent(other),
        }
    }
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner())
    }
}

impl Error for KeyringAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

/// Keyring account under which a server profile's password lives.
pub fn server_account(server_name: &str) -> String {
    format!("server/{server_name}")
}

fn server_entry(server_name: &str) -> Result<Entry, KeyringAccessError> {
    Ok(Entry::new(KEYRING_SERVICE, &server_account(server_name))?)
}

pub fn get_server_password(server_name: &str) -> Result<Option<String>, KeyringAccessError> {
    match server_entry(server_name)?.get_password() {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub fn set_server_password(server_name: &str, password: &str) -> Result<(), KeyringAccessError> {
    server_entry(server_name)?.set_password(password)?;
    Ok(())
}

/// Remove a stored password. Returns false when none was stored.
pub fn delete_server_password(server_name: &str) -> Result<bool, KeyringAccessError> {
    match server_entry(server_name)?.delete_credential() {
        Ok(()) => Ok(true),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounts_are_namespaced_per_server() {
        assert_eq!(server_account("web-1"), "server/web-1");
    }

    #[test]
    fn platform_failures_are_recoverable() {
        let err: KeyringAccessError = keyring::Error::PlatformFailure("locked".into()).into();
        assert!(err.is_recoverable());

        let err: KeyringAccessError = keyring::Error::NoEntry.into();
        assert!(!err.is_recoverable());
        assert!(err.source().is_some());
    }
}
