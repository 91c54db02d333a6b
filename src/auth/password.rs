/// Password Hashing and Strength Validation
///
/// Bcrypt hashing with a configurable work factor, full strength checking
/// that reports every violated rule, and generation of random passwords
/// guaranteed to pass the checks.

use bcrypt::{hash, verify};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::AppError;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{}";

/// Substrings that immediately mark a password as weak, checked
/// case-insensitively.
const WEAK_SUBSTRINGS: &[&str] = &["password", "qwerty", "asdfgh", "zxcvbn", "1234", "abcdef"];

/// Result of a strength check: all violated rules, not just the first,
/// so callers can render complete feedback.
#[derive(Debug, Clone)]
pub struct PasswordCheck {
    pub valid: bool,
    pub violations: Vec<&'static str>,
}

/// Hash a password using bcrypt
///
/// The cost comes from configuration: low in test configurations to keep
/// suites fast, materially higher in production.
///
/// # Errors
/// Returns error only if the bcrypt transform itself fails
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// A non-matching password returns `Ok(false)`; only a malformed digest is
/// an error.
pub fn verify_password(password: &str, digest: &str) -> Result<bool, AppError> {
    verify(password, digest)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Validate password strength, collecting every violated rule
///
/// Rules:
/// - 8 to 128 characters
/// - at least one lowercase letter, uppercase letter, digit, and symbol
/// - no run of three or more identical characters
/// - no well-known weak substring ("password", keyboard runs, digit runs)
pub fn validate_password_strength(password: &str) -> PasswordCheck {
    let mut violations = Vec::new();

    // Character count, not byte count: multi-byte input is measured the way
    // users count it.
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        violations.push("must be at least 8 characters");
    }
    if length > MAX_PASSWORD_LENGTH {
        violations.push("must be at most 128 characters");
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        violations.push("must contain a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        violations.push("must contain an uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push("must contain a digit");
    }
    if !password
        .chars()
        .any(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace())
    {
        violations.push("must contain a symbol");
    }

    if has_repeated_run(password) {
        violations.push("must not repeat the same character three times in a row");
    }

    let lowered = password.to_lowercase();
    if WEAK_SUBSTRINGS.iter().any(|weak| lowered.contains(weak)) {
        violations.push("must not contain a well-known weak pattern");
    }

    PasswordCheck {
        valid: violations.is_empty(),
        violations,
    }
}

fn has_repeated_run(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars
        .windows(3)
        .any(|w| w[0] == w[1] && w[1] == w[2])
}

/// Generate a random password guaranteed to satisfy the strength rules
///
/// Seeds one character from each required class, fills the remainder from
/// the full alphabet, shuffles, and re-rolls on the off chance the shuffle
/// produced a repeated run. The requested length is clamped into the valid
/// range.
pub fn generate_random_password(length: usize) -> String {
    let length = length.clamp(MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH);
    let mut rng = rand::thread_rng();

    let full: Vec<u8> = [LOWERCASE, UPPERCASE, DIGITS, SYMBOLS].concat();

    loop {
        let mut chars: Vec<u8> = vec![
            *LOWERCASE.choose(&mut rng).unwrap_or(&b'a'),
            *UPPERCASE.choose(&mut rng).unwrap_or(&b'A'),
            *DIGITS.choose(&mut rng).unwrap_or(&b'7'),
            *SYMBOLS.choose(&mut rng).unwrap_or(&b'!'),
        ];
        while chars.len() < length {
            chars.push(full[rng.gen_range(0..full.len())]);
        }
        chars.shuffle(&mut rng);

        let candidate = String::from_utf8(chars).unwrap_or_default();
        if validate_password_strength(&candidate).valid {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum bcrypt cost keeps the suite fast.
    const TEST_COST: u32 = 4;

    #[test]
    fn test_hash_and_verify_round_trip() {
        let password = "Va1id!Password";
        let digest = hash_password(password, TEST_COST).expect("Failed to hash password");

        assert_ne!(password, digest);
        assert!(digest.starts_with("$2"));
        assert!(verify_password(password, &digest).expect("Failed to verify password"));
    }

    #[test]
    fn test_wrong_password_verifies_false_not_error() {
        let digest = hash_password("Va1id!Password", TEST_COST).expect("Failed to hash password");

        let result = verify_password("Wr0ng!Password", &digest);
        assert_eq!(result.expect("Verification should not error"), false);
    }

    #[test]
    fn test_malformed_digest_is_an_error() {
        assert!(verify_password("Va1id!Password", "not-a-bcrypt-digest").is_err());
    }

    #[test]
    fn test_valid_password_has_no_violations() {
        let check = validate_password_strength("Str0ng!Pass");
        assert!(check.valid);
        assert!(check.violations.is_empty());
    }

    #[test]
    fn test_all_violations_reported_at_once() {
        // Too short, no uppercase, no digit, no symbol: all four at once.
        let check = validate_password_strength("abc");
        assert!(!check.valid);
        assert!(check.violations.len() >= 4);
    }

    #[test]
    fn test_missing_character_classes() {
        assert!(validate_password_strength("nouppercase7!")
            .violations
            .contains(&"must contain an uppercase letter"));
        assert!(validate_password_strength("NOLOWERCASE7!")
            .violations
            .contains(&"must contain a lowercase letter"));
        assert!(validate_password_strength("NoDigitsHere!")
            .violations
            .contains(&"must contain a digit"));
        assert!(validate_password_strength("NoSymbols789")
            .violations
            .contains(&"must contain a symbol"));
    }

    #[test]
    fn test_repeated_run_rejected() {
        let check = validate_password_strength("Goood!Pass7");
        assert!(check
            .violations
            .contains(&"must not repeat the same character three times in a row"));
    }

    #[test]
    fn test_weak_substrings_rejected() {
        for weak in ["MyPassword7!", "Qwerty!Run7x", "Xy!71234zW"] {
            let check = validate_password_strength(weak);
            assert!(
                check
                    .violations
                    .contains(&"must not contain a well-known weak pattern"),
                "Should flag weak pattern in {}",
                weak
            );
        }
    }

    #[test]
    fn test_length_bounds() {
        assert!(!validate_password_strength("Sh0rt!").valid);

        let long = format!("Aa7!{}", "xy".repeat(63));
        assert!(long.len() > MAX_PASSWORD_LENGTH);
        assert!(validate_password_strength(&long)
            .violations
            .contains(&"must be at most 128 characters"));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // Four 2-byte characters are 8 bytes but only 4 characters.
        let short = "äöüß";
        assert_eq!(short.len(), 8);
        assert!(validate_password_strength(short)
            .violations
            .contains(&"must be at least 8 characters"));

        // 128 characters that exceed 128 bytes still satisfy the ceiling.
        let wide = format!("Aa7!{}", "ä".repeat(124));
        assert!(wide.len() > MAX_PASSWORD_LENGTH);
        assert!(!validate_password_strength(&wide)
            .violations
            .contains(&"must be at most 128 characters"));
    }

    #[test]
    fn test_validation_is_deterministic() {
        let first = validate_password_strength("abc");
        let second = validate_password_strength("abc");
        assert_eq!(first.violations, second.violations);
    }

    #[test]
    fn test_generated_passwords_are_valid() {
        for _ in 0..50 {
            let password = generate_random_password(16);
            assert_eq!(password.len(), 16);
            let check = validate_password_strength(&password);
            assert!(check.valid, "Generated password failed: {:?}", check.violations);
        }
    }

    #[test]
    fn test_generated_length_is_clamped() {
        assert_eq!(generate_random_password(3).len(), MIN_PASSWORD_LENGTH);
        assert_eq!(generate_random_password(500).len(), MAX_PASSWORD_LENGTH);
    }
}
