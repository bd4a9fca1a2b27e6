//! HMAC-SHA256 verification for tracker webhook deliveries.

use anyhow::{anyhow, bail};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::*;

/// Verifies `signature_header` (hex digest, optional `sha256=` prefix) against `payload`.
pub(super) fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
) -> Result<()> {
    let trimmed = signature_header.trim();
    if trimmed.is_empty() {
        bail!("missing {WEBHOOK_SIGNATURE_HEADER} header");
    }
    let digest_hex = trimmed.strip_prefix("sha256=").unwrap_or(trimmed);
    let signature_bytes = decode_hex(digest_hex)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .context("failed to initialize hmac verifier")?;
    mac.update(payload);
    mac.verify_slice(&signature_bytes)
        .map_err(|_| anyhow!("webhook signature verification failed"))
}

fn decode_hex(raw: &str) -> Result<Vec<u8>> {
    if raw.is_empty() {
        bail!("signature digest cannot be empty");
    }
    if raw.len() % 2 != 0 {
        bail!("signature digest must have an even number of hex characters");
    }
    (0..raw.len())
        .step_by(2)
        .map(|index| {
            let chunk = raw
                .get(index..index + 2)
                .ok_or_else(|| anyhow!("signature digest is not ASCII hex"))?;
            u8::from_str_radix(chunk, 16)
                .with_context(|| format!("invalid hex byte '{chunk}' in signature digest"))
        })
        .collect()
}

#[cfg(test)]
pub(super) fn sign_webhook_payload(payload: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(payload);
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod signature_tests {
    use super::*;

    #[test]
    fn unit_verify_accepts_plain_and_prefixed_hex_digests() {
        let payload = br#"{"type":"Issue"}"#;
        let digest = sign_webhook_payload(payload, "secret");
        verify_webhook_signature(payload, &digest, "secret").expect("plain digest");
        verify_webhook_signature(payload, &format!("sha256={digest}"), "secret")
            .expect("prefixed digest");
    }

    #[test]
    fn regression_verify_rejects_wrong_secret_and_malformed_digests() {
        let payload = br#"{"type":"Issue"}"#;
        let digest = sign_webhook_payload(payload, "secret");
        assert!(verify_webhook_signature(payload, &digest, "other").is_err());
        assert!(verify_webhook_signature(payload, "", "secret").is_err());
        assert!(verify_webhook_signature(payload, "abc", "secret").is_err());
        assert!(verify_webhook_signature(payload, "zz", "secret").is_err());
        assert!(verify_webhook_signature(payload, "ééé", "secret").is_err());
    }
}
