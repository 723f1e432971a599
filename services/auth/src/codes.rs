//! One-time code generation for email verification and password reset
//!
//! Codes are security credentials, so they come from the operating
//! system's CSPRNG rather than the thread-local generator.

use rand::Rng;
use rand::rngs::OsRng;

/// Number of digits in a generated code
pub const CODE_LENGTH: usize = 6;

/// Generate a uniformly-random 6-digit numeric code (100000..=999999).
pub fn generate() -> String {
    OsRng.gen_range(100_000..=999_999u32).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_shape() {
        for _ in 0..100 {
            let code = generate();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));

            let value: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn test_codes_vary() {
        let codes: std::collections::HashSet<String> = (0..20).map(|_| generate()).collect();
        assert!(codes.len() > 1, "20 draws should not all collide");
    }
}
