// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! PGP cleartext framework and detached signatures

The PGP cleartext framework is a mechanism to store PGP signatures inline with
the cleartext data that is being signed. It is defined by
[RFC 4880 Section 7](https://datatracker.ietf.org/doc/html/rfc4880.html#section-7).
APT repositories use it for `InRelease` files.

PGP cleartext signatures are text documents of the form:

```text
-----BEGIN PGP SIGNED MESSAGE-----
Hash: <digest>

<dash-escaped signed content>

-----BEGIN PGP SIGNATURE-----
<headers>

<signature data>
-----END PGP SIGNATURE-----
```

[cleartext_sign()] produces such documents. The signed byte stream is every
dash-escaped line of the input followed by CRLF. The visible body carries the
same dash-escaped lines followed by LF and is terminated by an empty line, so
the final CRLF of the signed stream is represented by that empty line.

[detached_sign()] produces an ASCII armored signature over raw bytes, as used
by `Release.gpg` files.

[CleartextSignatures] parses cleartext documents and verifies their signatures.
[verify_detached()] verifies armored detached signatures.
*/

use {
    chrono::SubsecRound,
    digest::Digest,
    pgp::{
        crypto::{HashAlgorithm, Hasher},
        packet::{Packet, SignatureConfig, SignatureType, Subpacket},
        types::{KeyVersion, PublicKeyTrait, SecretKeyTrait},
        Signature,
    },
    smallvec::SmallVec,
    std::{
        borrow::Cow,
        collections::HashMap,
        io::{self, BufRead, Cursor, Read},
    },
};

const HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE_ARMOR: &str = "-----BEGIN PGP SIGNATURE-----";

/// Wrapper around content digesting to work around lack of clone() in pgp crate.
#[derive(Clone)]
pub enum CleartextHasher {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl CleartextHasher {
    pub fn md5() -> Self {
        Self::Md5(md5::Md5::new())
    }

    pub fn sha1() -> Self {
        Self::Sha1(sha1::Sha1::new())
    }

    pub fn sha256() -> Self {
        Self::Sha256(sha2::Sha256::new())
    }

    pub fn sha384() -> Self {
        Self::Sha384(sha2::Sha384::new())
    }

    pub fn sha512() -> Self {
        Self::Sha512(sha2::Sha512::new())
    }

    /// Obtain a hasher for a PGP hash algorithm, if supported.
    pub fn for_algorithm(algorithm: HashAlgorithm) -> Option<Self> {
        match algorithm {
            HashAlgorithm::MD5 => Some(Self::md5()),
            HashAlgorithm::SHA1 => Some(Self::sha1()),
            HashAlgorithm::SHA2_256 => Some(Self::sha256()),
            HashAlgorithm::SHA2_384 => Some(Self::sha384()),
            HashAlgorithm::SHA2_512 => Some(Self::sha512()),
            _ => None,
        }
    }

    /// Obtain a hasher from its name in a `Hash: ` armor header.
    pub fn from_armor_name(name: &str) -> Option<Self> {
        match name {
            "MD5" => Some(Self::md5()),
            "SHA1" => Some(Self::sha1()),
            "SHA256" => Some(Self::sha256()),
            "SHA384" => Some(Self::sha384()),
            "SHA512" => Some(Self::sha512()),
            _ => None,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Md5(_) => HashAlgorithm::MD5,
            Self::Sha1(_) => HashAlgorithm::SHA1,
            Self::Sha256(_) => HashAlgorithm::SHA2_256,
            Self::Sha384(_) => HashAlgorithm::SHA2_384,
            Self::Sha512(_) => HashAlgorithm::SHA2_512,
        }
    }

    /// The name of this hash in a `Hash: ` armor header.
    pub fn armor_name(&self) -> &'static str {
        match self {
            Self::Md5(_) => "MD5",
            Self::Sha1(_) => "SHA1",
            Self::Sha256(_) => "SHA256",
            Self::Sha384(_) => "SHA384",
            Self::Sha512(_) => "SHA512",
        }
    }
}

impl std::io::Write for CleartextHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Hasher for CleartextHasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(digest) => digest.update(data),
            Self::Sha1(digest) => digest.update(data),
            Self::Sha256(digest) => digest.update(data),
            Self::Sha384(digest) => digest.update(data),
            Self::Sha512(digest) => digest.update(data),
        }
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        match *self {
            Self::Md5(digest) => digest.finalize().to_vec(),
            Self::Sha1(digest) => digest.finalize().to_vec(),
            Self::Sha256(digest) => digest.finalize().to_vec(),
            Self::Sha384(digest) => digest.finalize().to_vec(),
            Self::Sha512(digest) => digest.finalize().to_vec(),
        }
    }
}

fn invalid_data(message: impl ToString) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

/// Apply the cleartext dash-escaping rule to a line.
///
/// Every line beginning with `-` is prefixed with `- `.
pub fn dash_escape(line: &str) -> Cow<'_, str> {
    if line.starts_with('-') {
        Cow::Owned(format!("- {}", line))
    } else {
        Cow::Borrowed(line)
    }
}

fn signature_config(
    key: &impl SecretKeyTrait,
    signature_type: SignatureType,
    hash_algorithm: HashAlgorithm,
) -> SignatureConfig {
    let hashed_subpackets = vec![
        Subpacket::IssuerFingerprint(KeyVersion::V4, SmallVec::from_slice(&key.fingerprint())),
        Subpacket::SignatureCreationTime(chrono::Utc::now().trunc_subsecs(0)),
    ];
    let unhashed_subpackets = vec![Subpacket::Issuer(key.key_id())];

    SignatureConfig::new_v4(
        Default::default(),
        signature_type,
        key.algorithm(),
        hash_algorithm,
        hashed_subpackets,
        unhashed_subpackets,
    )
}

fn armor_signature(signature: Signature) -> pgp::errors::Result<String> {
    let packet = Packet::Signature(signature);
    let mut writer = Cursor::new(Vec::<u8>::new());
    pgp::armor::write(&packet, pgp::armor::BlockType::Signature, &mut writer, None)?;

    // The armoring should always produce valid UTF-8. But we are careful.
    String::from_utf8(writer.into_inner())
        .map_err(|e| pgp::errors::Error::Utf8Error(e.utf8_error()))
}

/// Produce a cleartext signature over data.
///
/// The original cleartext data to be signed is provided by a reader. `\n`, `\r\n`
/// and lone `\r` line endings are all accepted and normalized.
///
/// The returned value is a multiline string with LF line endings containing the PGP
/// cleartext framework encoded cleartext and signature.
pub fn cleartext_sign<PW, R>(
    key: &impl SecretKeyTrait,
    key_pw: PW,
    hash_algorithm: HashAlgorithm,
    mut data: R,
) -> pgp::errors::Result<String>
where
    PW: FnOnce() -> String,
    R: BufRead,
{
    let hash_name = CleartextHasher::for_algorithm(hash_algorithm)
        .ok_or_else(|| {
            pgp::errors::Error::Unsupported(
                "hash algorithm unsupported for cleartext signatures".to_string(),
            )
        })?
        .armor_name();

    let mut text = String::new();
    data.read_to_string(&mut text)?;
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut signed = vec![];
    let mut body = String::new();

    for line in text.lines() {
        let line = dash_escape(line);

        signed.extend_from_slice(line.as_bytes());
        signed.extend_from_slice(b"\r\n");

        body.push_str(&line);
        body.push('\n');
    }

    // Terminates the text block. Readers drop the line ending preceding the
    // signature armor, leaving the CRLF of the last line as signed content.
    body.push('\n');

    let signature = signature_config(key, SignatureType::Text, hash_algorithm).sign(
        key,
        key_pw,
        Cursor::new(signed),
    )?;

    Ok(format!(
        "{}\nHash: {}\n\n{}{}",
        HEADER,
        hash_name,
        body,
        armor_signature(signature)?
    ))
}

/// Produce an ASCII armored detached signature over raw bytes.
///
/// The data is signed verbatim as a binary document.
pub fn detached_sign<PW, R>(
    key: &impl SecretKeyTrait,
    key_pw: PW,
    hash_algorithm: HashAlgorithm,
    data: R,
) -> pgp::errors::Result<String>
where
    PW: FnOnce() -> String,
    R: Read,
{
    let signature =
        signature_config(key, SignatureType::Binary, hash_algorithm).sign(key, key_pw, data)?;

    armor_signature(signature)
}

/// Parse the signature packets from an armored `-----BEGIN PGP SIGNATURE-----` block.
pub fn read_armored_signatures(data: &[u8]) -> io::Result<Vec<Signature>> {
    let mut dearmor = pgp::armor::Dearmor::new(Cursor::new(data));
    dearmor.read_header()?;

    if !matches!(dearmor.typ, Some(pgp::armor::BlockType::Signature)) {
        return Err(invalid_data("failed to parse PGP signature armor"));
    }

    let mut signatures = vec![];

    for packet in pgp::packet::PacketParser::new(dearmor) {
        match packet {
            Ok(Packet::Signature(signature)) => {
                signatures.push(signature);
            }
            Ok(packet) => {
                return Err(invalid_data(format!(
                    "unexpected PGP packet seen; expected Signature; got {:?}",
                    packet.tag()
                )));
            }
            Err(e) => {
                return Err(invalid_data(format!("PGP packet parsing error: {:?}", e)));
            }
        }
    }

    Ok(signatures)
}

fn issued_by(signature: &Signature, key: &impl PublicKeyTrait) -> bool {
    if let Some(issuer) = signature.issuer() {
        &key.key_id() == issuer
    } else {
        false
    }
}

/// Verify a signature given a hasher already fed the signed content.
///
/// Returns `Ok(false)` if the digest does not match the signature's quick check value.
fn verify_with_hasher(
    sig: &Signature,
    key: &impl PublicKeyTrait,
    hasher: CleartextHasher,
) -> pgp::errors::Result<bool> {
    let mut hasher = Box::new(hasher);

    let len = sig.config.hash_signature_data(&mut *hasher)?;
    hasher.update(&sig.config.trailer(len));

    let digest = hasher.finish();

    if digest[0..2] != sig.signed_hash_value {
        return Ok(false);
    }

    key.verify_signature(sig.config.hash_alg, &digest, &sig.signature)?;

    Ok(true)
}

/// Parsed cleartext signatures data.
///
/// Holds digests of the signed text and the parsed PGP signature packets of a
/// cleartext signed document, facilitating signature verification.
///
/// Two digests are tracked per hash algorithm: one over the lines as transmitted
/// and one with dash-escaping reversed. A signature is valid if either digest
/// matches, so documents produced by [cleartext_sign()] as well as documents
/// following RFC 4880 canonicalization verify.
pub struct CleartextSignatures {
    hashers: HashMap<u8, CleartextHasher>,
    literal_hashers: HashMap<u8, CleartextHasher>,
    signatures: Vec<Signature>,
}

impl CleartextSignatures {
    /// Parse a cleartext signed document.
    ///
    /// Returns the signed text (dash-escaping reversed, lines joined with `\n`)
    /// and the signature state.
    ///
    /// Parsing does not validate signatures. Call [Self::verify()] for that.
    pub fn parse(document: &str) -> io::Result<(String, Self)> {
        let mut lines = document.lines();

        let header = lines.next().unwrap_or_default();
        if header != HEADER {
            return Err(invalid_data(format!(
                "bad PGP cleartext header; expected `{}`; got `{}`",
                HEADER, header
            )));
        }

        // Following the cleartext header armor are 1 or more `Hash: ` armor headers.
        // These are terminated by an empty line.
        let mut hashers = HashMap::new();

        loop {
            let line = lines
                .next()
                .ok_or_else(|| invalid_data("bad PGP cleartext signature; truncated headers"))?;

            if let Some(names) = line.strip_prefix("Hash: ") {
                for name in names.split(',').map(|x| x.trim()).filter(|x| !x.is_empty()) {
                    let hasher = CleartextHasher::from_armor_name(name).ok_or_else(|| {
                        invalid_data(format!("unsupported PGP hash type: {}", name))
                    })?;

                    hashers.entry(hasher.algorithm() as u8).or_insert(hasher);
                }
            } else if line.trim().is_empty() {
                if hashers.is_empty() {
                    return Err(invalid_data(
                        "bad PGP cleartext signature; no Hash headers",
                    ));
                }

                break;
            } else {
                return Err(invalid_data(format!(
                    "bad PGP cleartext signature; expected Hash: header; got {}",
                    line.trim_end()
                )));
            }
        }

        let mut literal_hashers = hashers.clone();
        let mut cleartext = vec![];
        let mut have_signature = false;

        // The line ending before the signature armor is not part of the signed
        // text, so CRLF is fed before every line except the first.
        for line in lines.by_ref() {
            if line == SIGNATURE_ARMOR {
                have_signature = true;
                break;
            }

            let unescaped = line.strip_prefix("- ").unwrap_or(line);

            if !cleartext.is_empty() {
                for hasher in hashers.values_mut().chain(literal_hashers.values_mut()) {
                    hasher.update(b"\r\n");
                }
            }

            for hasher in hashers.values_mut() {
                hasher.update(unescaped.as_bytes());
            }
            for hasher in literal_hashers.values_mut() {
                hasher.update(line.as_bytes());
            }

            cleartext.push(unescaped);
        }

        if !have_signature {
            return Err(invalid_data(
                "bad PGP cleartext signature; signature armor not found",
            ));
        }

        let armored = std::iter::once(SIGNATURE_ARMOR)
            .chain(lines)
            .chain(std::iter::once(""))
            .collect::<Vec<_>>()
            .join("\n");

        let signatures = read_armored_signatures(armored.as_bytes())?;

        Ok((
            cleartext.join("\n"),
            Self {
                hashers,
                literal_hashers,
                signatures,
            },
        ))
    }

    /// Iterate over signatures in this instance.
    pub fn iter_signatures(&self) -> impl Iterator<Item = &Signature> {
        self.signatures.iter()
    }

    /// Iterate over signatures made by a specific key.
    ///
    /// Filters on the signature's issuer matching the key ID of the specified key.
    pub fn iter_signatures_from_key<'slf, 'key: 'slf>(
        &'slf self,
        key: &'key impl PublicKeyTrait,
    ) -> impl Iterator<Item = &'slf Signature> {
        self.signatures.iter().filter(|sig| issued_by(sig, key))
    }

    /// Verify signatures made from a known key.
    ///
    /// Returns the numbers of signatures verified against this key.
    ///
    /// If there are no signatures at all or no signatures from the specified key, an error is
    /// returned. Errors also occur if a signature is invalid.
    pub fn verify(&self, key: &impl PublicKeyTrait) -> pgp::errors::Result<usize> {
        if self.signatures.is_empty() {
            return Err(pgp::errors::Error::Message(
                "no PGP signatures present".to_string(),
            ));
        }

        let mut valid_signatures = 0;

        for sig in self.iter_signatures_from_key(key) {
            let algorithm = sig.config.hash_alg as u8;

            let candidates = [
                self.hashers.get(&algorithm),
                self.literal_hashers.get(&algorithm),
            ];

            if candidates.iter().all(|x| x.is_none()) {
                return Err(pgp::errors::Error::Message(format!(
                    "could not find hasher matching signature hash algorithm ({:?})",
                    sig.config.hash_alg
                )));
            }

            let mut verified = false;
            for hasher in candidates.into_iter().flatten() {
                if verify_with_hasher(sig, key, hasher.clone())? {
                    verified = true;
                    break;
                }
            }

            if !verified {
                return Err(pgp::errors::Error::Message(
                    "invalid signed hash value".into(),
                ));
            }

            valid_signatures += 1;
        }

        match valid_signatures {
            0 => Err(pgp::errors::Error::Message(
                "no signatures signed by provided key".into(),
            )),
            _ => Ok(valid_signatures),
        }
    }
}

/// Verify an armored detached signature over `data`.
///
/// Returns the number of signatures from `key` that verified. Errors if no signature
/// was made by `key` or if any of them is invalid.
pub fn verify_detached(
    key: &impl PublicKeyTrait,
    data: &[u8],
    armored_signature: &[u8],
) -> pgp::errors::Result<usize> {
    let signatures = read_armored_signatures(armored_signature)?;

    let mut valid_signatures = 0;

    for sig in signatures.iter().filter(|sig| issued_by(sig, key)) {
        let mut hasher = CleartextHasher::for_algorithm(sig.config.hash_alg).ok_or_else(|| {
            pgp::errors::Error::Unsupported(format!(
                "unsupported signature hash algorithm ({:?})",
                sig.config.hash_alg
            ))
        })?;
        hasher.update(data);

        if !verify_with_hasher(sig, key, hasher)? {
            return Err(pgp::errors::Error::Message(
                "invalid signed hash value".into(),
            ));
        }

        valid_signatures += 1;
    }

    match valid_signatures {
        0 => Err(pgp::errors::Error::Message(
            "no signatures signed by provided key".into(),
        )),
        _ => Ok(valid_signatures),
    }
}
