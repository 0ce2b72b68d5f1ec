//! V4 HMAC-SHA256 request signing for the upstream API.
//!
//! Implements the vendor's signature scheme: a canonical request is hashed,
//! wrapped in a string-to-sign with a date-scoped credential, and signed with
//! a derived key chain (date -> region -> service -> "request").

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{UpstreamError, UpstreamResult};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HMAC-SHA256";
const SIGNED_HEADERS: &str = "content-type;host;x-content-sha256;x-date";
const CONTENT_TYPE: &str = "application/json";

/// Headers to attach to a signed request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub x_date: String,
    pub x_content_sha256: String,
    pub authorization: String,
    pub content_type: &'static str,
}

/// Sign a request against the upstream API.
///
/// `query` must already be in the exact order it will appear on the wire
/// (sorted by key).
pub fn sign_request(
    access_key_id: &str,
    secret_access_key: &str,
    method: &str,
    host: &str,
    query: &str,
    body: &str,
    region: &str,
    service: &str,
) -> UpstreamResult<SignedHeaders> {
    let now = Utc::now();
    let x_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let datestamp = now.format("%Y%m%d").to_string();

    let payload_hash = sha256_hex(body.as_bytes());

    let canonical_headers = format!(
        "content-type:{CONTENT_TYPE}\nhost:{host}\nx-content-sha256:{payload_hash}\nx-date:{x_date}\n"
    );
    let canonical_request = format!(
        "{method}\n/\n{query}\n{canonical_headers}\n{SIGNED_HEADERS}\n{payload_hash}"
    );

    let credential_scope = format!("{datestamp}/{region}/{service}/request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{x_date}\n{credential_scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(secret_access_key, &datestamp, region, service)?;
    let signature = hex(&hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "{ALGORITHM} Credential={access_key_id}/{credential_scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}"
    );

    Ok(SignedHeaders {
        x_date,
        x_content_sha256: payload_hash,
        authorization,
        content_type: CONTENT_TYPE,
    })
}

/// Canonicalize query parameters: sorted by key, percent-encoded with the
/// unreserved set (`A-Za-z0-9-_.~`).
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);

    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn derive_signing_key(
    secret: &str,
    datestamp: &str,
    region: &str,
    service: &str,
) -> UpstreamResult<Vec<u8>> {
    let k_date = hmac_sha256(secret.as_bytes(), datestamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"request")
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> UpstreamResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| UpstreamError::Config(format!("Invalid HMAC key: {e}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex(&Sha256::digest(data))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
