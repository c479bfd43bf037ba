use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::auth_info::{normalize_username, AuthInfo};
use crate::client::Transport;
use crate::crypto::{pakdf, EnvelopeError, PakdfError, Purpose, Secret};

#[derive(Debug, thiserror::Error)]
pub enum KeysError {
    #[error("pakdf error: {0}")]
    Pakdf(#[from] PakdfError),
    #[error("user has not logged in")]
    NotLoggedIn,
    #[error("unlock key has not been derived")]
    MissingUnlockKey,
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("decrypted secret is not valid utf-8")]
    InvalidSecretEncoding,
}

/// Keys derived for one account
///
/// `id`/`crypt` come from one login derivation and `secret_id`/`unlock` from
/// one unlock derivation. Cloning yields a fully independent bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomKeys {
    auth_info: AuthInfo,
    username: String,
    id: Option<String>,
    crypt: Option<Secret>,
    secret_id: Option<String>,
    unlock: Option<Secret>,
}

impl CustomKeys {
    pub fn new(auth_info: AuthInfo) -> Self {
        Self {
            username: auth_info.username.clone(),
            auth_info,
            id: None,
            crypt: None,
            secret_id: None,
            unlock: None,
        }
    }

    pub fn auth_info(&self) -> &AuthInfo {
        &self.auth_info
    }
    pub fn username(&self) -> &str {
        &self.username
    }
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    pub fn crypt(&self) -> Option<&Secret> {
        self.crypt.as_ref()
    }
    pub fn secret_id(&self) -> Option<&str> {
        self.secret_id.as_deref()
    }
    pub fn unlock(&self) -> Option<&Secret> {
        self.unlock.as_ref()
    }

    /// Switch to another username, dropping every key derived for the old one
    pub fn set_username(&mut self, username: &str) {
        if self.username == username {
            return;
        }
        self.id = None;
        self.crypt = None;
        self.secret_id = None;
        self.unlock = None;
        self.username = username.to_string();
        self.auth_info.username = username.to_string();
    }

    fn normalized_username(&self) -> String {
        normalize_username(&self.username)
    }

    /// Derive `id` and `crypt` from the account password
    pub async fn derive_login_keys(
        &mut self,
        password: &str,
        transport: &dyn Transport,
    ) -> Result<&mut Self, KeysError> {
        let tokens = pakdf::derive(
            &self.auth_info.pakdf,
            Purpose::Login,
            &self.normalized_username(),
            password,
            transport,
        )
        .await?;

        tracing::debug!(username = %self.username, "derived login keys");
        self.id = Some(tokens.identifier);
        self.crypt = Some(tokens.key);
        Ok(self)
    }

    /// Derive the `unlock` key from the account secret.
    ///
    /// With a `pin`, the pin is bound into the derived material and the
    /// matching `secret_id` locator is kept; without one, `secret_id` is cleared.
    pub async fn derive_unlock_keys(
        &mut self,
        secret: &str,
        pin: Option<&str>,
        transport: &dyn Transport,
    ) -> Result<&mut Self, KeysError> {
        let material = match pin {
            Some(pin) => format!("{secret}{}:{pin}:", pin.encode_utf16().count()),
            None => secret.to_string(),
        };

        let tokens = pakdf::derive(
            &self.auth_info.pakdf,
            Purpose::Unlock,
            &self.normalized_username(),
            &material,
            transport,
        )
        .await?;

        tracing::debug!(username = %self.username, with_pin = pin.is_some(), "derived unlock keys");
        self.secret_id = pin.map(|_| tokens.identifier);
        self.unlock = Some(tokens.key);
        Ok(self)
    }

    /// Derive login keys and then the unlock key, both from `password`
    pub async fn derive_keys(
        &mut self,
        password: &str,
        transport: &dyn Transport,
    ) -> Result<&mut Self, KeysError> {
        self.derive_login_keys(password, transport).await?;
        self.derive_unlock_keys(password, None, transport).await
    }

    /// Re-derive login keys for `candidate` and compare the `id` in constant
    /// time. The bundle itself is left untouched.
    pub async fn is_password_correct(
        &self,
        candidate: &str,
        transport: &dyn Transport,
    ) -> Result<bool, KeysError> {
        let Some(id) = self.id.as_deref() else {
            return Err(KeysError::NotLoggedIn);
        };

        let tokens = pakdf::derive(
            &self.auth_info.pakdf,
            Purpose::Login,
            &self.normalized_username(),
            candidate,
            transport,
        )
        .await?;

        Ok(bool::from(
            id.as_bytes().ct_eq(tokens.identifier.as_bytes()),
        ))
    }

    /// Seal the account secret under the `unlock` key
    pub fn encrypt_secret(&self, secret: &str) -> Result<String, KeysError> {
        let unlock = self.unlock.as_ref().ok_or(KeysError::MissingUnlockKey)?;
        Ok(unlock.encrypt(secret.as_bytes())?)
    }

    /// Open a secret sealed with [`CustomKeys::encrypt_secret`]
    pub fn decrypt_secret(&self, sealed: &str) -> Result<String, KeysError> {
        let unlock = self.unlock.as_ref().ok_or(KeysError::MissingUnlockKey)?;
        let bytes = unlock.decrypt(sealed)?;
        String::from_utf8(bytes).map_err(|_| KeysError::InvalidSecretEncoding)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::pakdf::test::{test_params, StubSigner};

    fn auth_info(username: &str) -> AuthInfo {
        AuthInfo {
            username: username.to_string(),
            version: 3,
            exists: true,
            email_verified: true,
            blobvault: "https://vault.example.com".into(),
            pakdf: test_params(),
        }
    }

    #[tokio::test]
    async fn test_login_keys_use_normalized_username() {
        let signer = StubSigner::new();
        let mut keys = CustomKeys::new(auth_info("Al-ice"));
        keys.derive_login_keys("hunter2", &signer).await.unwrap();

        assert_eq!(
            keys.id(),
            Some("355711f00c9241601d579ba746fdf5e7250deb96cdd26ea5a63785625f71b931")
        );
        assert_eq!(
            keys.crypt().unwrap().to_hex(),
            "345b87fce269db2d2df06fb4617ca5e0bbd630331b77a0d74afc22f1c575409a"
        );
        assert!(keys.unlock().is_none());
    }

    #[tokio::test]
    async fn test_unlock_keys_with_and_without_pin() {
        let signer = StubSigner::new();
        let mut keys = CustomKeys::new(auth_info("alice"));

        keys.derive_unlock_keys("hunter2", None, &signer).await.unwrap();
        assert!(keys.secret_id().is_none());
        assert_eq!(
            keys.unlock().unwrap().to_hex(),
            "a78a4943f9bab6e4e463cb1e3962e70e4f2c3939efd6e354a58848cb75276418"
        );

        keys.derive_unlock_keys("hunter2", Some("1234"), &signer)
            .await
            .unwrap();
        assert_eq!(
            keys.secret_id(),
            Some("430a4676088af9723ab908f208b878249b045c6682284512616a1cf4b569c618")
        );
        assert_eq!(
            keys.unlock().unwrap().to_hex(),
            "f695d06a8c7fc2ea0e1b580b5994dbf6d19e9c7588e16cca89901ef1130b2af5"
        );
    }

    #[tokio::test]
    async fn test_is_password_correct() {
        let signer = StubSigner::new();
        let mut keys = CustomKeys::new(auth_info("alice"));

        assert!(matches!(
            keys.is_password_correct("hunter2", &signer).await,
            Err(KeysError::NotLoggedIn)
        ));

        keys.derive_login_keys("hunter2", &signer).await.unwrap();
        let before = keys.clone();

        assert!(keys.is_password_correct("hunter2", &signer).await.unwrap());
        assert!(!keys.is_password_correct("hunter3", &signer).await.unwrap());
        assert_eq!(keys, before);
    }

    #[tokio::test]
    async fn test_set_username_clears_keys() {
        let signer = StubSigner::new();
        let mut keys = CustomKeys::new(auth_info("alice"));
        keys.derive_keys("hunter2", &signer).await.unwrap();
        assert!(keys.id().is_some() && keys.unlock().is_some());

        keys.set_username("alice");
        assert!(keys.id().is_some());

        keys.set_username("bob");
        assert_eq!(keys.username(), "bob");
        assert_eq!(keys.auth_info().username, "bob");
        assert!(keys.id().is_none());
        assert!(keys.crypt().is_none());
        assert!(keys.unlock().is_none());
    }

    #[tokio::test]
    async fn test_clone_is_independent() {
        let signer = StubSigner::new();
        let mut keys = CustomKeys::new(auth_info("alice"));
        keys.derive_login_keys("hunter2", &signer).await.unwrap();

        let mut copy = keys.clone();
        copy.set_username("mallory");
        assert_eq!(keys.username(), "alice");
        assert!(keys.id().is_some());
    }

    #[tokio::test]
    async fn test_serde_round_trip_keeps_key_material() {
        let signer = StubSigner::new();
        let mut keys = CustomKeys::new(auth_info("alice"));
        keys.derive_keys("hunter2", &signer).await.unwrap();

        let json = serde_json::to_value(&keys).unwrap();
        assert_eq!(json["crypt"], keys.crypt().unwrap().to_hex());
        assert!(json["secretId"].is_null());

        let restored: CustomKeys = serde_json::from_value(json).unwrap();
        assert_eq!(restored, keys);
    }

    #[tokio::test]
    async fn test_secret_sealing() {
        let signer = StubSigner::new();
        let mut keys = CustomKeys::new(auth_info("alice"));
        assert!(matches!(
            keys.encrypt_secret("shh"),
            Err(KeysError::MissingUnlockKey)
        ));

        keys.derive_unlock_keys("hunter2", None, &signer).await.unwrap();
        let sealed = keys.encrypt_secret("sEd7account_secret").unwrap();
        assert_eq!(keys.decrypt_secret(&sealed).unwrap(), "sEd7account_secret");
    }
}
