pub mod cookies;
pub mod handlers;
pub mod jwt;
pub mod password;

use rand::Rng;

/// Cryptographically random bytes, hex encoded.
pub fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_has_expected_length() {
        let token = random_hex(32);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn random_hex_is_unique() {
        assert_ne!(random_hex(16), random_hex(16));
    }
}
