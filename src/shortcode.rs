use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated codes.
pub const DEFAULT_LENGTH: usize = 6;

/// Length used once attempts at [`DEFAULT_LENGTH`] keep colliding.
pub const FALLBACK_LENGTH: usize = 9;

/// Attempts made at each length before giving up.
pub const MAX_ATTEMPTS: usize = 10;

const MIN_CUSTOM_LENGTH: usize = 3;
const MAX_CUSTOM_LENGTH: usize = 20;

/// Generate a random alphanumeric string of the given length.
///
/// Uniqueness is not guaranteed here; the store's insert decides.
pub fn generate(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let code: String = (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    tracing::debug!(shortcode = %code, length = len, "Generated shortcode");
    code
}

/// Lengths to try, in order, when assigning a generated code.
pub fn attempt_lengths() -> impl Iterator<Item = usize> {
    std::iter::repeat(DEFAULT_LENGTH)
        .take(MAX_ATTEMPTS)
        .chain(std::iter::repeat(FALLBACK_LENGTH).take(MAX_ATTEMPTS))
}

/// A custom code must be 3-20 ASCII letters or digits.
pub fn is_valid(code: &str) -> bool {
    let ok = (MIN_CUSTOM_LENGTH..=MAX_CUSTOM_LENGTH).contains(&code.len())
        && code.bytes().all(|b| b.is_ascii_alphanumeric());
    if !ok {
        tracing::warn!(shortcode = code, "Invalid shortcode format");
    }
    ok
}
