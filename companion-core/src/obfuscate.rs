//! Deterministic byte-XOR obfuscation for pairing and credential fields.
//!
//! Two fixed 7-byte keys, one for the share-URL parameter blob and one
//! for credential fields inside Authenticate details. Applying the same
//! transform twice restores the input. This is obfuscation, not
//! encryption.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CompanionError;

const REMOTE_PARAM_KEY: [u8; 7] = [0x74, 0xB2, 0x92, 0x5B, 0x4A, 0x21, 0xDA];
const AUTH_PARAM_KEY: [u8; 7] = [0xB6, 0xD5, 0x92, 0xC4, 0xA7, 0x83, 0xE1];

fn xor_in_place(raw: &mut [u8], key: &[u8; 7]) {
    for (i, b) in raw.iter_mut().enumerate() {
        *b ^= key[i % key.len()];
    }
}

/// Obfuscate (or deobfuscate) share-URL parameter bytes in place.
pub fn obfuscate_remote_param(raw: &mut [u8]) {
    xor_in_place(raw, &REMOTE_PARAM_KEY);
}

/// Obfuscate (or deobfuscate) credential bytes in place.
pub fn obfuscate_auth_param(raw: &mut [u8]) {
    xor_in_place(raw, &AUTH_PARAM_KEY);
}

/// Obfuscate a copy of `raw` with the auth key and hex-encode it — the
/// form every credential-bearing field takes on the wire.
pub fn auth_field_hex(raw: &[u8]) -> String {
    let mut buf = raw.to_vec();
    obfuscate_auth_param(&mut buf);
    hex::encode(buf)
}

/// Generate a fresh session password: 6 OS-random bytes as unpadded
/// standard base64, exactly 8 ASCII characters.
///
/// An RNG failure is surfaced as an error; an attacker-predictable
/// empty password must never reach the wire.
pub fn make_password() -> Result<String, CompanionError> {
    let mut token = [0u8; 6];
    OsRng
        .try_fill_bytes(&mut token)
        .map_err(|e| CompanionError::PasswordGeneration(e.to_string()))?;
    Ok(STANDARD_NO_PAD.encode(token))
}
