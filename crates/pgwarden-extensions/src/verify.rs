//! Package verification
//!
//! A cached package travels with a detached checksum file:
//!
//! ```text
//! <hex SHA-256 digest of the package bytes>
//! <base64 DER ECDSA-P256 signature over the digest line, by the publisher>
//! ```
//!
//! Verification checks the digest against the package bytes (integrity)
//! and the signature against the publisher's registered public key
//! (authenticity). It is idempotent, side-effect free, and never touches
//! the installed filesystem area.

use base64::Engine;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use pgwarden_core::types::Publisher;
use pgwarden_core::{Error, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Verify a package's checksum and its publisher signature
///
/// Fails with [`Error::Integrity`] on a digest mismatch and
/// [`Error::Signature`] on a missing, malformed, or wrong signature.
pub fn verify_package(
    package_name: &str,
    package: &[u8],
    checksum: &[u8],
    publisher: &Publisher,
) -> Result<()> {
    let checksum = std::str::from_utf8(checksum)
        .map_err(|_| Error::signature(package_name, "checksum file is not valid UTF-8"))?;
    let mut lines = checksum.lines().filter(|line| !line.trim().is_empty());
    let digest_line = lines
        .next()
        .ok_or_else(|| Error::signature(package_name, "checksum file is empty"))?
        .trim();
    let signature_line = lines
        .next()
        .ok_or_else(|| Error::signature(package_name, "checksum file carries no signature"))?
        .trim();

    let mut hasher = Sha256::new();
    hasher.update(package);
    let actual = format!("{:x}", hasher.finalize());
    if actual != digest_line.to_lowercase() {
        return Err(Error::integrity(package_name, digest_line, actual));
    }

    let key = VerifyingKey::from_public_key_pem(&publisher.public_key).map_err(|error| {
        Error::signature(
            package_name,
            format!("invalid public key for publisher {}: {}", publisher.id, error),
        )
    })?;
    let signature_bytes = base64::engine::general_purpose::STANDARD
        .decode(signature_line)
        .map_err(|error| Error::signature(package_name, format!("malformed signature: {}", error)))?;
    let signature = Signature::from_der(&signature_bytes)
        .map_err(|error| Error::signature(package_name, format!("malformed signature: {}", error)))?;
    key.verify(digest_line.as_bytes(), &signature)
        .map_err(|_| {
            Error::signature(
                package_name,
                format!("signature does not match publisher {}", publisher.id),
            )
        })?;

    debug!("Package {} passed verification (SHA-256: {})", package_name, actual);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Signer, SigningKey};
    use p256::pkcs8::EncodePublicKey;

    fn signing_key() -> SigningKey {
        SigningKey::from_slice(&[7u8; 32]).unwrap()
    }

    fn publisher() -> Publisher {
        let pem = signing_key()
            .verifying_key()
            .to_public_key_pem(Default::default())
            .unwrap();
        Publisher {
            id: "com.ongres".to_string(),
            name: None,
            public_key: pem,
        }
    }

    fn checksum_for(package: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(package);
        let digest = format!("{:x}", hasher.finalize());
        let signature: Signature = signing_key().sign(digest.as_bytes());
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(signature.to_der().as_bytes());
        format!("{}\n{}\n", digest, encoded).into_bytes()
    }

    #[test]
    fn accepts_valid_package() {
        let package = b"package bytes";
        let checksum = checksum_for(package);
        verify_package("test", package, &checksum, &publisher()).unwrap();
    }

    #[test]
    fn rejects_digest_mismatch_as_integrity_error() {
        let checksum = checksum_for(b"package bytes");
        let error = verify_package("test", b"tampered bytes", &checksum, &publisher()).unwrap_err();
        assert!(matches!(error, Error::Integrity { .. }), "{error}");
    }

    #[test]
    fn rejects_missing_signature_line() {
        let package = b"package bytes";
        let mut hasher = Sha256::new();
        hasher.update(package);
        let checksum = format!("{:x}\n", hasher.finalize()).into_bytes();
        let error = verify_package("test", package, &checksum, &publisher()).unwrap_err();
        assert!(matches!(error, Error::Signature { .. }), "{error}");
    }

    #[test]
    fn rejects_signature_from_another_key() {
        let package = b"package bytes";
        let mut hasher = Sha256::new();
        hasher.update(package);
        let digest = format!("{:x}", hasher.finalize());
        let other = SigningKey::from_slice(&[9u8; 32]).unwrap();
        let signature: Signature = other.sign(digest.as_bytes());
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(signature.to_der().as_bytes());
        let checksum = format!("{}\n{}\n", digest, encoded).into_bytes();

        let error = verify_package("test", package, &checksum, &publisher()).unwrap_err();
        assert!(matches!(error, Error::Signature { .. }), "{error}");
    }

    #[test]
    fn verification_is_idempotent() {
        let package = b"package bytes";
        let checksum = checksum_for(package);
        verify_package("test", package, &checksum, &publisher()).unwrap();
        verify_package("test", package, &checksum, &publisher()).unwrap();
    }
}
