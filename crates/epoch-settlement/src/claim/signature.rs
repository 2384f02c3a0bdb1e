use crate::store::AccountService;
use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature is not valid hex: {0}")]
    InvalidHex(String),
    #[error("failed to load public keys: {0}")]
    Keys(String),
    #[error("no key of {0} or its grantees verifies the seed")]
    NoMatchingKey(String),
}

/// Big-endian bytes of the revealed seed; the signed message.
fn seed_message(seed: i64) -> [u8; 8] {
    seed.to_be_bytes()
}

/// Checks `signature_hex` over `seed` against the keys of `address` and its
/// grantees. The first key that verifies accepts.
pub fn verify_seed_signature(
    accounts: &dyn AccountService,
    address: &str,
    seed: i64,
    signature_hex: &str,
) -> Result<(), SignatureError> {
    let signature = hex::decode(signature_hex).map_err(|e| SignatureError::InvalidHex(e.to_string()))?;
    let keys = accounts
        .pubkeys_with_grantees(address)
        .map_err(|e| SignatureError::Keys(e.to_string()))?;
    let message = seed_message(seed);

    for encoded in &keys {
        let pubkey = match STANDARD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(address, key = %encoded, error = %e, "skipping undecodable public key");
                continue;
            }
        };
        if accounts.verify_signature(&pubkey, &message, &signature) {
            debug!(address, "seed signature verified");
            return Ok(());
        }
    }
    Err(SignatureError::NoMatchingKey(address.to_string()))
}
