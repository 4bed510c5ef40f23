use rand::rngs::OsRng;
use rand::TryRngCore;

/// Generates a fresh opaque identifier: a random (v4) UUID in its 36-character hyphenated form.
///
/// Randomness comes from the operating system. When it is unavailable the failure is logged and
/// `None` is returned; callers treat that as "no token yet".
pub fn generate_token() -> Option<String> {
    generate_with(&mut OsRng)
}

pub(crate) fn generate_with<R: TryRngCore + ?Sized>(rng: &mut R) -> Option<String> {
    let mut bytes = [0u8; 16];
    match rng.try_fill_bytes(&mut bytes) {
        Ok(()) => Some(uuid::Builder::from_random_bytes(bytes).into_uuid().hyphenated().to_string()),
        Err(e) => {
            log::warn!("secure randomness unavailable, no token generated: {e}");
            None
        }
    }
}
