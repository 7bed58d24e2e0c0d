//! client-side encryption of secret values
//!
//! [Keyring] is an envelope provider: each ciphertext is a base64 encoded json envelope that names the key it
//! was sealed with, so decryption does not need the key id.
use crate::environment::Environment;
use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub trait Encryptor {
    /// Encrypt `plaintext` under `key_id`, returning base64 ciphertext
    fn encrypt(&self, plaintext: &str, key_id: &str) -> Result<String>;

    fn decrypt(&self, ciphertext: &str, key_id: Option<&str>) -> Result<String>;
}

/// Provider for commands that must never touch secrets
#[derive(Debug, Default)]
pub struct Unavailable;

impl Encryptor for Unavailable {
    fn encrypt(&self, _plaintext: &str, key_id: &str) -> Result<String> {
        Err(Error::Crypto(format!(
            "no encryption provider configured for key {key_id}"
        )))
    }

    fn decrypt(&self, _ciphertext: &str, _key_id: Option<&str>) -> Result<String> {
        Err(Error::Crypto("no encryption provider configured".into()))
    }
}

/// Qualify a bare key id (`alias/name`, key uuid) into a key arn
pub fn format_key_id(key_id: &str, environment: &dyn Environment) -> Result<String> {
    if key_id.starts_with("arn") {
        return Ok(key_id.to_string());
    }

    Ok(format!(
        "arn:aws:kms:{}:{}:{}",
        environment.region()?,
        environment.account()?,
        key_id
    ))
}

/// Resource part of a key arn (`alias/name` for `arn:aws:kms:region:account:alias/name`)
fn key_resource(key_id: &str) -> &str {
    if key_id.starts_with("arn:") {
        key_id.splitn(6, ':').nth(5).unwrap_or(key_id)
    } else {
        key_id
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "KeyId")]
    key_id: String,
    #[serde(rename = "Nonce")]
    nonce: String,
    #[serde(rename = "Ciphertext")]
    ciphertext: String,
}

/// AES-256-GCM keys addressed by key id
#[derive(Default)]
pub struct Keyring {
    keys: BTreeMap<String, [u8; 32]>,
    path: Option<PathBuf>,
}

impl Keyring {
    /// Load the keyring file; a missing file is an empty keyring
    pub fn load(path: &Path) -> Result<Self> {
        let mut keyring = Keyring {
            path: Some(path.to_path_buf()),
            ..Default::default()
        };

        if !path.exists() {
            tracing::debug!(path=%path.display(), "keyring file does not exist");
            return Ok(keyring);
        }

        tracing::info!(path=%path.display(), "loading keyring");
        let contents = std::fs::read_to_string(path)?;
        let encoded: BTreeMap<String, String> = serde_yaml::from_str(&contents)?;
        for (key_id, material) in encoded {
            let bytes = general_purpose::STANDARD
                .decode(material)
                .map_err(|e| Error::Crypto(format!("invalid key material for {key_id}: {e}")))?;
            let key: [u8; 32] = bytes
                .try_into()
                .map_err(|_| Error::Crypto(format!("key {key_id} must be 32 bytes")))?;
            keyring.keys.insert(key_id, key);
        }

        Ok(keyring)
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let encoded: BTreeMap<&str, String> = self
            .keys
            .iter()
            .map(|(key_id, key)| (key_id.as_str(), general_purpose::STANDARD.encode(key)))
            .collect();
        std::fs::write(path, serde_yaml::to_string(&encoded)?)?;
        tracing::info!(path=%path.display(), "keyring saved");
        Ok(())
    }

    pub fn insert(&mut self, key_id: impl Into<String>, key: [u8; 32]) {
        self.keys.insert(key_id.into(), key);
    }

    /// Add a fresh random key
    pub fn generate(&mut self, key_id: &str) -> Result<()> {
        if self.find(key_id).is_some() {
            return Err(Error::Crypto(format!("key {key_id} already exists")));
        }
        let key: [u8; 32] = rand::thread_rng().gen();
        self.insert(key_id, key);
        Ok(())
    }

    fn find(&self, key_id: &str) -> Option<(&str, &[u8; 32])> {
        if let Some((stored_id, key)) = self.keys.get_key_value(key_id) {
            return Some((stored_id, key));
        }

        let resource = key_resource(key_id);
        self.keys
            .iter()
            .find(|(stored_id, _)| key_resource(stored_id) == resource)
            .map(|(stored_id, key)| (stored_id.as_str(), key))
    }

    fn cipher(&self, key_id: &str) -> Result<Aes256Gcm> {
        let (_, key) = self
            .find(key_id)
            .ok_or_else(|| Error::Crypto(format!("unknown key {key_id}")))?;
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
    }
}

impl Encryptor for Keyring {
    fn encrypt(&self, plaintext: &str, key_id: &str) -> Result<String> {
        let cipher = self.cipher(key_id)?;

        let mut nonce = [0u8; 12];
        rand::thread_rng().fill(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| Error::Crypto(e.to_string()))?;

        let envelope = Envelope {
            key_id: key_id.to_string(),
            nonce: general_purpose::STANDARD.encode(nonce),
            ciphertext: general_purpose::STANDARD.encode(ciphertext),
        };
        let envelope =
            serde_json::to_vec(&envelope).map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(general_purpose::STANDARD.encode(envelope))
    }

    fn decrypt(&self, ciphertext: &str, key_id: Option<&str>) -> Result<String> {
        let invalid = |reason: String| Error::Crypto(format!("invalid ciphertext: {reason}"));

        let envelope = general_purpose::STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| invalid(e.to_string()))?;
        let envelope: Envelope =
            serde_json::from_slice(&envelope).map_err(|e| invalid(e.to_string()))?;

        if let Some(key_id) = key_id {
            if key_resource(key_id) != key_resource(&envelope.key_id) {
                tracing::debug!(
                    expected = key_id,
                    actual = %envelope.key_id,
                    "ciphertext sealed with a different key"
                );
            }
        }

        let nonce = general_purpose::STANDARD
            .decode(&envelope.nonce)
            .map_err(|e| invalid(e.to_string()))?;
        if nonce.len() != 12 {
            return Err(invalid("nonce must be 12 bytes".into()));
        }
        let sealed = general_purpose::STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|e| invalid(e.to_string()))?;

        let plaintext = self
            .cipher(&envelope.key_id)?
            .decrypt(Nonce::from_slice(&nonce), sealed.as_ref())
            .map_err(|e| Error::Crypto(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| invalid(e.to_string()))
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        f.debug_struct("Keyring")
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::environment::StaticEnvironment;
    use pretty_assertions::assert_eq;

    const KEY_ARN: &str = "arn:aws:kms:us-east-1:123456789012:alias/test";

    fn keyring() -> Keyring {
        let mut keyring = Keyring::default();
        keyring.insert(KEY_ARN, [7u8; 32]);
        keyring
    }

    #[test]
    fn encrypt_decrypt() {
        let keyring = keyring();
        let ciphertext = keyring.encrypt("hunter2", KEY_ARN).unwrap();

        assert_ne!(ciphertext, "hunter2");
        assert_eq!(keyring.decrypt(&ciphertext, None).unwrap(), "hunter2");
        assert_eq!(keyring.decrypt(&ciphertext, Some(KEY_ARN)).unwrap(), "hunter2");
    }

    #[test]
    fn finds_key_by_resource() {
        let keyring = keyring();
        let ciphertext = keyring.encrypt("value", "alias/test").unwrap();
        assert_eq!(keyring.decrypt(&ciphertext, None).unwrap(), "value");
    }

    #[test]
    fn unknown_key_fails() {
        let keyring = keyring();
        assert!(matches!(
            keyring.encrypt("value", "alias/other"),
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn wrong_key_material_fails() {
        let ciphertext = keyring().encrypt("value", KEY_ARN).unwrap();

        let mut other = Keyring::default();
        other.insert(KEY_ARN, [8u8; 32]);
        assert!(other.decrypt(&ciphertext, None).is_err());
    }

    #[test]
    fn garbage_ciphertext_fails() {
        assert!(keyring().decrypt("not base64!", None).is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyring.yaml");

        let mut keyring = Keyring::load(&path).unwrap();
        keyring.generate(KEY_ARN).unwrap();
        assert!(keyring.generate("alias/test").is_err());
        let ciphertext = keyring.encrypt("persisted", KEY_ARN).unwrap();
        keyring.save().unwrap();

        let loaded = Keyring::load(&path).unwrap();
        assert_eq!(loaded.decrypt(&ciphertext, None).unwrap(), "persisted");
    }

    #[test]
    fn key_id_formatting() {
        let environment =
            StaticEnvironment::new(Some("eu-west-1".into()), Some("123456789012".into()));

        assert_eq!(
            format_key_id("alias/test", &environment).unwrap(),
            "arn:aws:kms:eu-west-1:123456789012:alias/test"
        );
        assert_eq!(format_key_id(KEY_ARN, &environment).unwrap(), KEY_ARN);
        assert!(format_key_id("alias/test", &StaticEnvironment::default()).is_err());
    }
}
