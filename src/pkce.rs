use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// 64 random bytes, URL-safe base64 without padding (86 characters).
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub fn generate_state() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The `tx` value B2C uses to tie the credential post back to the login page.
pub fn state_properties(request_id: &str) -> String {
    let json = format!(r#"{{"TID":"{request_id}"}}"#);
    format!("StateProperties={}", URL_SAFE_NO_PAD.encode(json.as_bytes()))
}
