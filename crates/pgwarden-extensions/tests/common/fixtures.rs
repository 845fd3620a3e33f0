//! Signed package, index document, and configuration fixtures
//!
//! All fixtures share one deterministic P-256 signing key so any package
//! built here verifies against the publisher registered in the index
//! documents built here.

use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::EncodePublicKey;
use pgwarden_core::types::{ExtensionSpec, InstalledExtension};
use pgwarden_core::ExtensionsConfig;
use sha2::{Digest, Sha256};
use std::path::Path;
use url::Url;

pub const REPOSITORY: &str = "https://extensions.example.com/postgres/repository";

pub const PUBLISHER: &str = "com.ongres";

pub fn signing_key() -> SigningKey {
    SigningKey::from_slice(&[7u8; 32]).unwrap()
}

pub fn public_key_pem() -> String {
    signing_key()
        .verifying_key()
        .to_public_key_pem(Default::default())
        .unwrap()
}

/// Reconciliation config rooted at a test directory, targeting
/// postgres 12.4 on build 6.0.2
pub fn config(root: &Path) -> ExtensionsConfig {
    ExtensionsConfig {
        repository: Url::parse(REPOSITORY).unwrap(),
        default_channel: "stable".to_string(),
        extensions_path: root.to_path_buf(),
        postgres_version: "12.4".to_string(),
        build_version: "6.0.2".to_string(),
    }
}

/// A resolved record matching the targets published by [`index_entry`]
pub fn installed(name: &str, version: &str) -> InstalledExtension {
    InstalledExtension {
        name: name.to_string(),
        publisher: PUBLISHER.to_string(),
        repository: REPOSITORY.to_string(),
        version: version.to_string(),
        postgres_version: "12".to_string(),
        build: Some("6.0".to_string()),
    }
}

/// A desired-state request resolving through the default channel
pub fn requested(name: &str) -> ExtensionSpec {
    ExtensionSpec {
        name: name.to_string(),
        publisher: PUBLISHER.to_string(),
        repository: None,
        version: None,
        channel: None,
    }
}

/// Build a gzipped package archive from `(path, content)` entries
pub fn build_package(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_slice())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A typical extension package: one shared library, a control file, and
/// an install script
pub fn package_for(name: &str, version: &str) -> Vec<u8> {
    build_package(&[
        (
            format!("lib/{name}.so"),
            format!("shared object {name} {version}").into_bytes(),
        ),
        (
            format!("share/extension/{name}.control"),
            format!("default_version = '{version}'\n").into_bytes(),
        ),
        (
            format!("share/extension/{name}--{version}.sql"),
            b"CREATE FUNCTION noop() RETURNS void AS '' LANGUAGE sql;\n".to_vec(),
        ),
    ])
}

/// The detached checksum document for a package: digest line plus a
/// signature line from the fixture key
pub fn checksum_for(package: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(package);
    let digest = format!("{:x}", hasher.finalize());
    let signature: Signature = signing_key().sign(digest.as_bytes());
    let encoded = base64::engine::general_purpose::STANDARD.encode(signature.to_der().as_bytes());
    format!("{digest}\n{encoded}\n").into_bytes()
}

/// One index extension entry publishing `versions` for postgres 12
/// build 6.0, with the stable channel pointing at `stable`
pub fn index_entry(name: &str, stable: &str, versions: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "publisher": PUBLISHER,
        "channels": {"stable": stable},
        "versions": versions.iter().map(|version| serde_json::json!({
            "version": version,
            "availableFor": [{"postgresVersion": "12", "build": "6.0"}]
        })).collect::<Vec<_>>(),
    })
}

/// A full index document registering the fixture publisher
pub fn index_document(extensions: &[serde_json::Value]) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "publishers": [{"id": PUBLISHER, "publicKey": public_key_pem()}],
        "extensions": extensions,
    }))
    .unwrap()
}
