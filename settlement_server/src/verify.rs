//! Provider webhook signature verification.
//!
//! The provider signs each webhook over a canonical form of the payload: non-empty fields
//! (excluding `sign` itself) sorted by key, joined as `k=v` pairs with `&`, MD5-hashed to an
//! uppercase hex string, and that string RSA-PKCS1v15-SHA1 signed. The signature travels as
//! URL-encoded base64 in the `sign` field.
//!
//! Verification is deliberately infallible in the Result sense: any malformed key, signature or
//! payload yields `false`, never an error or a panic, so a garbage webhook can't do anything
//! but get itself rejected.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use log::*;
use md5::{Digest, Md5};
use rsa::{
    pkcs1v15::{Signature, VerifyingKey},
    pkcs8::DecodePublicKey,
    signature::Verifier,
    RsaPublicKey,
};
use serde_json::{Map, Value};
use sha1::Sha1;
use sha2::Sha256;

pub struct ProviderVerifier {
    key: Option<VerifyingKey<Sha1>>,
}

impl ProviderVerifier {
    /// Builds a verifier from a base64-encoded DER (SPKI) public key. An unusable key is logged
    /// once here and makes every subsequent [`Self::verify`] return `false`.
    pub fn new(public_key_b64: &str) -> Self {
        let key = decode_public_key(public_key_b64);
        if key.is_none() {
            warn!("🔐️ No usable provider public key is configured. All inbound webhooks will be rejected.");
        }
        Self { key }
    }

    /// Checks the provider signature over a webhook payload. `params` is the full payload;
    /// `sign` is its signature field.
    pub fn verify(&self, params: &Map<String, Value>, sign: &str) -> bool {
        let Some(key) = &self.key else {
            return false;
        };
        let digest = canonical_digest(params);
        let decoded = match urlencoding::decode(sign) {
            Ok(s) => s,
            Err(_) => {
                debug!("🔐️ Signature field is not valid URL-encoding");
                return false;
            },
        };
        let sig_bytes = match BASE64.decode(decoded.as_bytes()) {
            Ok(b) => b,
            Err(_) => {
                debug!("🔐️ Signature field is not valid base64");
                return false;
            },
        };
        let signature = match Signature::try_from(sig_bytes.as_slice()) {
            Ok(s) => s,
            Err(_) => {
                debug!("🔐️ Signature has an invalid length");
                return false;
            },
        };
        key.verify(digest.as_bytes(), &signature).is_ok()
    }
}

fn decode_public_key(public_key_b64: &str) -> Option<VerifyingKey<Sha1>> {
    if public_key_b64.trim().is_empty() {
        return None;
    }
    let der = BASE64.decode(public_key_b64.trim()).ok()?;
    let key = RsaPublicKey::from_public_key_der(&der).ok()?;
    Some(VerifyingKey::<Sha1>::new(key))
}

/// The canonical digest the provider signs: non-empty fields except `sign`, sorted by key,
/// joined `k=v&k=v`, MD5, uppercase hex.
pub fn canonical_digest(params: &Map<String, Value>) -> String {
    let mut pairs = params
        .iter()
        .filter(|(k, _)| k.as_str() != "sign")
        .map(|(k, v)| (k.as_str(), value_as_string(v)))
        .filter(|(_, v)| !v.is_empty())
        .collect::<Vec<_>>();
    pairs.sort();
    let joined = pairs.into_iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
    let hash = Md5::digest(joined.as_bytes());
    hash.iter().map(|b| format!("{b:02X}")).collect()
}

fn value_as_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Constant-time HMAC-SHA256 check over a timestamp string. `supplied_hex` comes from the
/// caller's signature header.
pub fn verify_timestamp_hmac(secret: &str, timestamp: &str, supplied_hex: &str) -> bool {
    let Ok(expected) = hex::decode(supplied_hex) else {
        return false;
    };
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(timestamp.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod test {
    use rsa::{
        pkcs8::EncodePublicKey,
        signature::{SignatureEncoding, Signer},
        RsaPrivateKey,
    };
    use serde_json::json;

    use super::*;
    use crate::helpers::calculate_hmac_hex;

    fn test_keypair() -> (rsa::pkcs1v15::SigningKey<Sha1>, String) {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let public_b64 = BASE64.encode(private.to_public_key().to_public_key_der().unwrap().as_bytes());
        (rsa::pkcs1v15::SigningKey::<Sha1>::new(private), public_b64)
    }

    fn sign_params(key: &rsa::pkcs1v15::SigningKey<Sha1>, params: &Map<String, Value>) -> String {
        let digest = canonical_digest(params);
        let sig = key.sign(digest.as_bytes());
        urlencoding::encode(&BASE64.encode(sig.to_bytes())).into_owned()
    }

    fn sample_params() -> Map<String, Value> {
        json!({
            "orderNo": "ord-123456",
            "amount": "100.00",
            "currency": "NGN",
            "virtualAccountNo": "4400112233",
            "status": "00",
            "sessionId": "",
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn valid_signature_verifies() {
        let (signing, public_b64) = test_keypair();
        let params = sample_params();
        let sign = sign_params(&signing, &params);
        let verifier = ProviderVerifier::new(&public_b64);
        assert!(verifier.verify(&params, &sign));
    }

    #[test]
    fn canonicalization_is_key_order_independent() {
        let a = sample_params();
        // Same fields inserted in a different order.
        let mut b = Map::new();
        for k in ["status", "virtualAccountNo", "currency", "amount", "orderNo", "sessionId"] {
            b.insert(k.to_string(), a[k].clone());
        }
        assert_eq!(canonical_digest(&a), canonical_digest(&b));
    }

    #[test]
    fn empty_values_and_sign_are_excluded_from_the_digest() {
        let mut with_sign = sample_params();
        with_sign.insert("sign".to_string(), json!("whatever"));
        assert_eq!(canonical_digest(&with_sign), canonical_digest(&sample_params()));
    }

    #[test]
    fn tampered_fields_fail_verification() {
        let (signing, public_b64) = test_keypair();
        let mut params = sample_params();
        let sign = sign_params(&signing, &params);
        params.insert("amount".to_string(), json!("999999.00"));
        let verifier = ProviderVerifier::new(&public_b64);
        assert!(!verifier.verify(&params, &sign));
    }

    #[test]
    fn garbage_inputs_never_panic() {
        let verifier = ProviderVerifier::new("not-base64!!");
        assert!(!verifier.verify(&sample_params(), "also garbage"));
        let (_, public_b64) = test_keypair();
        let verifier = ProviderVerifier::new(&public_b64);
        assert!(!verifier.verify(&sample_params(), ""));
        assert!(!verifier.verify(&sample_params(), "%%%"));
    }

    #[test]
    fn timestamp_hmac_round_trip() {
        let sig = calculate_hmac_hex("whsec_abc", b"1718000000");
        assert!(verify_timestamp_hmac("whsec_abc", "1718000000", &sig));
        assert!(!verify_timestamp_hmac("whsec_abc", "1718000001", &sig));
        assert!(!verify_timestamp_hmac("other", "1718000000", &sig));
        assert!(!verify_timestamp_hmac("whsec_abc", "1718000000", "zz-not-hex"));
    }
}
