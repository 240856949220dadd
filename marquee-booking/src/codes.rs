use rand::Rng;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LENGTH: usize = 8;

/// Human-facing booking reference, `BK-` plus 8 uppercase alphanumerics.
///
/// Short enough to read over a counter, which also means birthday-bound
/// collisions at large scale; the unique index plus one insert retry covers
/// that.
pub fn booking_code() -> String {
    let mut rng = rand::thread_rng();
    let code: String = (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("BK-{code}")
}
