use crate::backend::remote::{Credential, RemoteTarget};
use crate::core::config::data::{expand_home, ServerProfile};
use crate::core::keyring::{self, KeyringAccessError};
use tracing::warn;

/// Build a connection target from a saved profile, looking the password up
/// in the keyring when the file does not carry one.
pub fn resolve_target(profile: &ServerProfile) -> Result<RemoteTarget, String> {
    resolve_target_with(profile, keyring::get_server_password)
}

/// Credential order: password in the file, password in the keyring, key file.
pub fn resolve_target_with<F>(profile: &ServerProfile, lookup: F) -> Result<RemoteTarget, String>
where
    F: FnOnce(&str) -> Result<Option<String>, KeyringAccessError>,
{
    let credential = match profile.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Credential::Password(password.to_string()),
        None => {
            let stored = match lookup(&profile.name) {
                Ok(stored) => stored,
                Err(err) => {
                    warn!(server = %profile.name, error = %err, "keyring lookup failed");
                    None
                }
            };
            match (stored, profile.key_file.as_deref()) {
                (Some(password), _) => Credential::Password(password),
                (None, Some(key_file)) => Credential::KeyFile(expand_home(key_file)),
                (None, None) => {
                    return Err(format!(
                        "No password or key file configured for server '{}'",
                        profile.name
                    ))
                }
            }
        }
    };

    Ok(RemoteTarget {
        name: profile.name.clone(),
        host: profile.host.clone(),
        port: profile.port,
        username: profile.username.clone(),
        credential,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn profile() -> ServerProfile {
        ServerProfile {
            name: "web".to_string(),
            host: "10.0.0.5".to_string(),
            port: 2222,
            username: "deploy".to_string(),
            password: None,
            key_file: None,
        }
    }

    #[test]
    fn file_password_wins_over_keyring() {
        let mut server = profile();
        server.password = Some("hunter2".to_string());
        let target = resolve_target_with(&server, |_| panic!("keyring should not be consulted"))
            .expect("target");
        assert_eq!(target.credential, Credential::Password("hunter2".to_string()));
        assert_eq!(target.display_address(), "deploy@10.0.0.5:2222");
    }

    #[test]
    fn keyring_password_used_before_key_file() {
        let mut server = profile();
        server.key_file = Some("/keys/id_ed25519".to_string());
        let target = resolve_target_with(&server, |name| {
            assert_eq!(name, "web");
            Ok(Some("from-keyring".to_string()))
        })
        .expect("target");
        assert_eq!(
            target.credential,
            Credential::Password("from-keyring".to_string())
        );
    }

    #[test]
    fn key_file_used_when_no_password_anywhere() {
        let mut server = profile();
        server.key_file = Some("/keys/id_ed25519".to_string());
        let target = resolve_target_with(&server, |_| Ok(None)).expect("target");
        assert_eq!(
            target.credential,
            Credential::KeyFile(PathBuf::from("/keys/id_ed25519"))
        );
    }

    #[test]
    fn keyring_failure_falls_through_to_key_file() {
        let mut server = profile();
        server.key_file = Some("/keys/id_rsa".to_string());
        let target = resolve_target_with(&server, |_| {
            Err(::keyring::Error::PlatformFailure("locked".into()).into())
        })
        .expect("target");
        assert_eq!(
            target.credential,
            Credential::KeyFile(PathBuf::from("/keys/id_rsa"))
        );
    }

    #[test]
    fn missing_credentials_are_reported() {
        let err = resolve_target_with(&profile(), |_| Ok(None)).unwrap_err();
        assert!(err.contains("'web'"));
    }
}
