// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signing repository files.

[SigningContext] holds the secret keyring a repository signs with. It
produces the cleartext signed `InRelease` document, the detached `Release.gpg`
signature and the public key export clients install to trust the repository.

All signatures use SHA-256. A context is read-only after construction and can be
shared between threads.

Keys are chosen by the key flags of their self-signatures. A subkey whose binding
signature allows signing is preferred over its primary key. Verification accepts
signatures from primary keys and from subkeys with a valid binding.
*/

use {
    crate::error::{RepositoryError, Result},
    log::{debug, info},
    pgp::{
        crypto::HashAlgorithm,
        packet::{SignatureType, Subpacket},
        types::{KeyId, KeyTrait, SecretKeyTrait},
        Deserializable, Signature, SignedPublicKey, SignedPublicSubKey, SignedSecretKey,
        SignedSecretSubKey,
    },
    pgp_cleartext::{cleartext_sign, detached_sign, verify_detached, CleartextSignatures},
    std::{io::Cursor, path::Path},
};

const ARMOR_BEGIN: &str = "-----BEGIN PGP ";
const PUBLIC_KEY_ARMOR: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";

/// The hash algorithm used for every repository signature.
pub const SIGNATURE_HASH: HashAlgorithm = HashAlgorithm::SHA2_256;

fn is_armored(data: &[u8]) -> bool {
    String::from_utf8_lossy(&data[0..data.len().min(64)])
        .trim_start()
        .starts_with(ARMOR_BEGIN)
}

/// Whether a set of self-signatures allows signing.
///
/// Returns `None` if none of the signatures carries a key flags subpacket.
fn declares_signing<'a>(signatures: impl IntoIterator<Item = &'a Signature>) -> Option<bool> {
    signatures
        .into_iter()
        .filter(|sig| {
            sig.config
                .subpackets()
                .any(|p| matches!(p, Subpacket::KeyFlags(_)))
        })
        .map(|sig| sig.key_flags().sign())
        .reduce(|a, b| a || b)
}

fn primary_can_sign(key: &SignedSecretKey) -> bool {
    let self_signatures = key
        .details
        .direct_signatures
        .iter()
        .chain(key.details.users.iter().flat_map(|u| u.signatures.iter()));

    // Keys without key flags predate them and sign with the primary key.
    key.is_signing_key() && declares_signing(self_signatures).unwrap_or(true)
}

fn subkey_can_sign(subkey: &SignedSecretSubKey) -> bool {
    let revoked = subkey
        .signatures
        .iter()
        .any(|sig| sig.typ() == SignatureType::SubkeyRevocation);

    !revoked && subkey.is_signing_key() && declares_signing(&subkey.signatures).unwrap_or(false)
}

/// The key a [SigningContext] signs with.
#[derive(Clone, Copy, Debug)]
pub enum SigningKey<'a> {
    /// A primary key.
    Primary(&'a SignedSecretKey),
    /// A subkey bound to a primary key.
    Subkey(&'a SignedSecretSubKey),
}

impl<'a> SigningKey<'a> {
    /// The key ID signatures made by this key are issued by.
    pub fn key_id(&self) -> KeyId {
        match self {
            Self::Primary(key) => key.key_id(),
            Self::Subkey(key) => key.key_id(),
        }
    }

    /// The fingerprint of this key.
    pub fn fingerprint(&self) -> Vec<u8> {
        match self {
            Self::Primary(key) => key.fingerprint(),
            Self::Subkey(key) => key.fingerprint(),
        }
    }
}

/// A loaded secret keyring and the passphrase unlocking it.
pub struct SigningContext {
    keys: Vec<SignedSecretKey>,
    passphrase: String,
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field(
                "keys",
                &self
                    .keys
                    .iter()
                    .map(|k| hex::encode(k.fingerprint()))
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl SigningContext {
    /// Construct an instance from already loaded keys.
    pub fn new(keys: Vec<SignedSecretKey>, passphrase: impl ToString) -> Self {
        Self {
            keys,
            passphrase: passphrase.to_string(),
        }
    }

    /// Construct an instance by parsing a secret keyring.
    ///
    /// The keyring can be ASCII armored or binary.
    pub fn from_keyring_bytes(data: &[u8], passphrase: impl ToString) -> Result<Self> {
        let keys = if is_armored(data) {
            let (keys, _) = SignedSecretKey::from_armor_many(Cursor::new(data))?;
            keys.collect::<pgp::errors::Result<Vec<_>>>()?
        } else {
            SignedSecretKey::from_bytes_many(Cursor::new(data))
                .collect::<pgp::errors::Result<Vec<_>>>()?
        };

        debug!("loaded {} secret keys", keys.len());

        Ok(Self::new(keys, passphrase))
    }

    /// Construct an instance from a secret keyring file.
    pub fn from_path(path: impl AsRef<Path>, passphrase: impl ToString) -> Result<Self> {
        let path = path.as_ref();

        let data = std::fs::read(path)
            .map_err(|e| RepositoryError::RepositoryIoPath(format!("{}", path.display()), e))?;

        Self::from_keyring_bytes(&data, passphrase)
    }

    /// The loaded secret keys.
    pub fn keys(&self) -> &[SignedSecretKey] {
        &self.keys
    }

    /// Find the first key whose key flags allow signing.
    ///
    /// Keyring entries are searched in order. Within an entry, signing subkeys are
    /// preferred over the primary key.
    pub fn find_signing_key(&self) -> Result<SigningKey<'_>> {
        let key = self
            .keys
            .iter()
            .find_map(|key| {
                key.secret_subkeys
                    .iter()
                    .find(|subkey| subkey_can_sign(subkey))
                    .map(SigningKey::Subkey)
                    .or_else(|| {
                        if primary_can_sign(key) {
                            Some(SigningKey::Primary(key))
                        } else {
                            None
                        }
                    })
            })
            .ok_or(RepositoryError::SigningKeyNotFound)?;

        info!("signing with key {}", hex::encode(key.fingerprint()));

        Ok(key)
    }

    /// Produce a cleartext signed document of `text`.
    pub fn clear_sign(&self, text: &str) -> Result<String> {
        let key_pw = || self.passphrase.clone();
        let data = text.as_bytes();

        Ok(match self.find_signing_key()? {
            SigningKey::Primary(key) => cleartext_sign(key, key_pw, SIGNATURE_HASH, data)?,
            SigningKey::Subkey(key) => cleartext_sign(key, key_pw, SIGNATURE_HASH, data)?,
        })
    }

    /// Produce an ASCII armored detached signature over `data`.
    pub fn detached_sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let key_pw = || self.passphrase.clone();

        let armored = match self.find_signing_key()? {
            SigningKey::Primary(key) => detached_sign(key, key_pw, SIGNATURE_HASH, data)?,
            SigningKey::Subkey(key) => detached_sign(key, key_pw, SIGNATURE_HASH, data)?,
        };

        Ok(armored.into_bytes())
    }

    /// Export the ASCII armored public keys of every loaded key, concatenated.
    ///
    /// Each export carries the public halves of the key's subkeys.
    pub fn export_public_key(&self) -> Result<Vec<u8>> {
        let mut armored = String::new();

        for key in &self.keys {
            let public = key
                .public_key()
                .sign(key, || self.passphrase.clone())?
                .to_armored_string(None)?;

            armored.push_str(&public);
            if !armored.ends_with('\n') {
                armored.push('\n');
            }
        }

        Ok(armored.into_bytes())
    }
}

/// Parse public keys from ASCII armored or binary data.
///
/// Concatenated armored blocks, as written by [SigningContext::export_public_key()],
/// are supported.
pub fn parse_public_keys(data: &[u8]) -> Result<Vec<SignedPublicKey>> {
    if !is_armored(data) {
        return Ok(SignedPublicKey::from_bytes_many(Cursor::new(data))
            .collect::<pgp::errors::Result<Vec<_>>>()?);
    }

    let text = String::from_utf8_lossy(data);

    let starts = text
        .match_indices(PUBLIC_KEY_ARMOR)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    let mut keys = vec![];
    for (i, start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());

        let (key, _) = SignedPublicKey::from_armor_single(Cursor::new(text[*start..end].as_bytes()))?;
        keys.push(key);
    }

    Ok(keys)
}

/// Try `verify_primary` and `verify_subkey` against every key and bound subkey.
///
/// Succeeds as soon as one verification succeeds.
fn verify_with_keys(
    keys: &[SignedPublicKey],
    verify_primary: impl Fn(&SignedPublicKey) -> pgp::errors::Result<usize>,
    verify_subkey: impl Fn(&SignedPublicSubKey) -> pgp::errors::Result<usize>,
) -> Result<()> {
    let mut last_error = None;

    for key in keys {
        match verify_primary(key) {
            Ok(_) => {
                return Ok(());
            }
            Err(e) => {
                last_error = Some(e.to_string());
            }
        }

        for subkey in &key.public_subkeys {
            match subkey.verify(key).and_then(|_| verify_subkey(subkey)) {
                Ok(_) => {
                    debug!("verified signature from subkey {}", hex::encode(subkey.fingerprint()));
                    return Ok(());
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                }
            }
        }
    }

    Err(RepositoryError::SignatureVerification(
        last_error.unwrap_or_else(|| "no public keys".to_string()),
    ))
}

/// Verify a cleartext signed document against armored or binary public keys.
///
/// Returns the signed text if a signature from any of the keys or their subkeys verifies.
pub fn verify_cleartext(document: &str, public_keys: &[u8]) -> Result<String> {
    let keys = parse_public_keys(public_keys)?;

    let (text, signatures) = CleartextSignatures::parse(document)
        .map_err(|e| RepositoryError::SignatureVerification(e.to_string()))?;

    verify_with_keys(
        &keys,
        |key| signatures.verify(key),
        |subkey| signatures.verify(subkey),
    )?;

    Ok(text)
}

/// Verify an armored detached signature over `data` against armored or binary public keys.
pub fn verify_detached_signature(data: &[u8], signature: &[u8], public_keys: &[u8]) -> Result<()> {
    let keys = parse_public_keys(public_keys)?;

    verify_with_keys(
        &keys,
        |key| verify_detached(key, data, signature),
        |subkey| verify_detached(subkey, data, signature),
    )
}
