//! Webhook payload signature verification

use crate::models::error::SignatureError;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

/// Checks `X-Hub-Signature-256` headers against the shared hub secret.
#[derive(Clone)]
pub struct HubSignature {
    keyed: HmacSha256,
}

impl fmt::Debug for HubSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HubSignature(..)")
    }
}

impl HubSignature {
    pub fn new(secret: &SecretString) -> Result<Self, SignatureError> {
        let keyed = HmacSha256::new_from_slice(secret.expose_secret().trim().as_bytes())
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        Ok(Self { keyed })
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.keyed.clone();
        mac.update(payload);
        format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(&self, header: Option<&str>, payload: &[u8]) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::Missing)?;
        let digest = header
            .trim()
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or_else(|| SignatureError::Malformed("expected sha256= prefix".to_string()))?;
        let expected =
            hex::decode(digest).map_err(|e| SignatureError::Malformed(e.to_string()))?;

        let mut mac = self.keyed.clone();
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> HubSignature {
        HubSignature::new(&SecretString::new("It's a Secret to Everybody".to_string())).unwrap()
    }

    #[test]
    fn matches_published_example_digest() {
        assert_eq!(
            signer().sign(b"Hello, World!"),
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn accepts_own_signature() {
        let signer = signer();
        let body = br#"{"zen":"Keep it logically awesome."}"#;
        let header = signer.sign(body);
        assert!(signer.verify(Some(&header), body).is_ok());
    }

    #[test]
    fn rejects_missing_malformed_and_wrong_signatures() {
        let signer = signer();
        let body = b"payload";

        assert!(matches!(signer.verify(None, body), Err(SignatureError::Missing)));
        assert!(matches!(
            signer.verify(Some("sha1=abcd"), body),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            signer.verify(Some("sha256=zz"), body),
            Err(SignatureError::Malformed(_))
        ));

        let other = HubSignature::new(&SecretString::new("another secret".to_string())).unwrap();
        let header = other.sign(body);
        assert!(matches!(signer.verify(Some(&header), body), Err(SignatureError::Mismatch)));
    }
}
