// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! PGP signing keys. */

use pgp::{
    crypto::{HashAlgorithm, SymmetricKeyAlgorithm},
    types::{CompressionAlgorithm, SecretKeyTrait},
    KeyType, SecretKeyParams, SecretKeyParamsBuilder, SignedPublicKey, SignedSecretKey,
};
use smallvec::smallvec;

/// Obtain a [SecretKeyParamsBuilder] defining how to generate a signing key.
///
/// The returned builder will have defaults appropriate for Debian signing keys.
///
/// The `primary_user_id` has a format like `Name <email>`. e.g.
/// `John Smith <someone@example.com>`.
pub fn signing_secret_key_params_builder(primary_user_id: impl ToString) -> SecretKeyParamsBuilder {
    let mut key_params = SecretKeyParamsBuilder::default();
    key_params
        .key_type(KeyType::Rsa(2048))
        .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
        .preferred_hash_algorithms(smallvec![
            HashAlgorithm::SHA2_256,
            HashAlgorithm::SHA2_384,
            HashAlgorithm::SHA2_512
        ])
        .preferred_compression_algorithms(smallvec![CompressionAlgorithm::ZLIB])
        .can_create_certificates(false)
        .can_sign(true)
        .primary_user_id(primary_user_id.to_string());

    key_params
}

/// Create a self-signed PGP key pair.
///
/// This is a convenience method to generate a self-signed key pair from key
/// generation parameters. The returned secret key is able to sign `Release`
/// files and the public key is what repository clients trust.
pub fn create_self_signed_key<PW>(
    params: SecretKeyParams,
    key_passphrase: PW,
) -> pgp::errors::Result<(SignedSecretKey, SignedPublicKey)>
where
    PW: (FnOnce() -> String) + Clone,
{
    let secret_key = params.generate()?;
    let secret_key_signed = secret_key.sign(key_passphrase.clone())?;

    let public_key = secret_key_signed.public_key();
    let public_key_signed = public_key.sign(&secret_key_signed, key_passphrase)?;

    Ok((secret_key_signed, public_key_signed))
}

/// Generate a repository signing key and return it as ASCII armored (private, public) text.
///
/// A non-empty `passphrase` encrypts the secret key material.
pub fn generate_armored_signing_key(
    primary_user_id: impl ToString,
    passphrase: &str,
) -> pgp::errors::Result<(String, String)> {
    let mut builder = signing_secret_key_params_builder(primary_user_id);
    if !passphrase.is_empty() {
        builder.passphrase(Some(passphrase.to_string()));
    }

    let params = builder.build()?;
    let key_pw = passphrase.to_string();
    let (private, public) = create_self_signed_key(params, move || key_pw.clone())?;

    Ok((
        private.to_armored_string(None)?,
        public.to_armored_string(None)?,
    ))
}

/// A key pair shared by the tests of this crate.
///
/// RSA key generation is slow, so it happens once per test binary.
#[cfg(test)]
pub(crate) fn test_key_pair() -> &'static (SignedSecretKey, SignedPublicKey) {
    static KEY: once_cell::sync::Lazy<(SignedSecretKey, SignedPublicKey)> =
        once_cell::sync::Lazy::new(|| {
            let params = signing_secret_key_params_builder("Apt Repo Test <test@example.com>")
                .build()
                .unwrap();

            create_self_signed_key(params, String::new).unwrap()
        });

    &KEY
}

/// A key pair whose primary key only certifies and whose subkey signs.
#[cfg(test)]
pub(crate) fn test_subkey_pair() -> &'static (SignedSecretKey, SignedPublicKey) {
    static KEY: once_cell::sync::Lazy<(SignedSecretKey, SignedPublicKey)> =
        once_cell::sync::Lazy::new(|| {
            let mut builder =
                signing_secret_key_params_builder("Apt Repo Subkey <sub@example.com>");
            builder
                .can_sign(false)
                .can_create_certificates(true)
                .subkey(
                    pgp::SubkeyParamsBuilder::default()
                        .key_type(KeyType::Rsa(2048))
                        .can_sign(true)
                        .build()
                        .unwrap(),
                );

            create_self_signed_key(builder.build().unwrap(), String::new).unwrap()
        });

    &KEY
}
