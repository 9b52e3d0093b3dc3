use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;

/// The size of a temporary reset password in random bytes.
const TEMPORARY_PASSWORD_SIZE: usize = 12;

/// Generates a new random temporary password.
///
/// The URL-safe base64 body is prefixed with `Rp1!` so it also passes the
/// strength policy when the user keeps it.
pub fn generate_temporary_password() -> String {
    let mut token = [0u8; TEMPORARY_PASSWORD_SIZE];
    OsRng.fill_bytes(&mut token);

    format!("Rp1!{}", general_purpose::URL_SAFE_NO_PAD.encode(token))
}
