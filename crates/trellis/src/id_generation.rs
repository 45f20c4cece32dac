//! Issue ID generation.
//!
//! IDs have the form `{prefix}-{time}{suffix}`:
//!
//! - `time` is the creation instant in milliseconds, base36 encoded, and is
//!   strictly increasing for one generator even when the clock stalls
//! - `suffix` is 4 base36 characters of a SHA-256 digest over the title, a
//!   random UUID and a retry nonce, so two writers creating issues in the same
//!   millisecond still diverge
//!
//! A collision with an existing ID retries with the next nonce.
//!
//! # Example
//!
//! ```
//! use trellis::id_generation::IdGenerator;
//!
//! let mut generator = IdGenerator::new("proj");
//! let id = generator.generate("Fix login", |_| false).unwrap();
//! assert!(id.starts_with("proj-"));
//! ```

use chrono::Utc;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LENGTH: usize = 4;
const MAX_NONCE: u32 = 100;

/// Errors that can occur during ID generation
#[derive(Debug, Error)]
pub enum IdGenerationError {
    /// Every nonce produced an ID that is already taken
    #[error("Unable to generate unique ID after {attempts} attempts")]
    CollisionExhausted {
        /// Number of candidates tried.
        attempts: u32,
    },
}

/// Time-ordered, collision-checked ID generator.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    last_millis: u64,
}

impl IdGenerator {
    /// Create a generator for the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            last_millis: 0,
        }
    }

    /// The prefix this generator stamps on IDs.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generate a new ID that `is_taken` reports as free.
    ///
    /// # Errors
    ///
    /// Returns [`IdGenerationError::CollisionExhausted`] if every nonce collides.
    pub fn generate(
        &mut self,
        title: &str,
        is_taken: impl Fn(&str) -> bool,
    ) -> Result<String, IdGenerationError> {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        let millis = now.max(self.last_millis + 1);
        self.last_millis = millis;

        let time_part = encode_base36(millis);
        let salt = Uuid::new_v4();

        for nonce in 0..MAX_NONCE {
            let id = format!(
                "{}-{}{}",
                self.prefix,
                time_part,
                hash_suffix(title, &salt, nonce)
            );
            if !is_taken(&id) {
                if nonce > 0 {
                    debug!(nonce, %id, "Generated unique ID after collision retries");
                }
                return Ok(id);
            }
        }

        Err(IdGenerationError::CollisionExhausted {
            attempts: MAX_NONCE,
        })
    }
}

fn hash_suffix(title: &str, salt: &Uuid, nonce: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(salt.as_bytes());
    hasher.update(nonce.to_le_bytes());
    let digest = hasher.finalize();

    let mut n = digest[..8]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    let mut suffix = String::with_capacity(SUFFIX_LENGTH);
    for _ in 0..SUFFIX_LENGTH {
        suffix.push(char::from(BASE36_CHARS[(n % 36) as usize]));
        n /= 36;
    }
    suffix
}

/// Encode a number in lowercase base36.
#[must_use]
pub fn encode_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_CHARS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    #[case::zero(0, "0")]
    #[case::single(35, "z")]
    #[case::two_digits(36, "10")]
    #[case::larger(1_295, "zz")]
    fn base36_encoding(#[case] n: u64, #[case] expected: &str) {
        assert_eq!(encode_base36(n), expected);
    }

    #[test]
    fn ids_carry_prefix_and_are_lowercase_alphanumeric() {
        let mut generator = IdGenerator::new("proj");
        let id = generator.generate("Title", |_| false).unwrap();

        let rest = id.strip_prefix("proj-").unwrap();
        assert!(rest.len() > SUFFIX_LENGTH);
        assert!(rest.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn time_component_is_strictly_increasing() {
        let mut generator = IdGenerator::new("p");
        let mut previous = 0;
        for _ in 0..50 {
            generator.generate("same", |_| false).unwrap();
            assert!(generator.last_millis > previous);
            previous = generator.last_millis;
        }
    }

    #[test]
    fn generated_ids_are_unique() {
        let mut generator = IdGenerator::new("p");
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let id = generator.generate("same title", |id| seen.contains(id)).unwrap();
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn collision_retries_with_next_nonce() {
        let mut generator = IdGenerator::new("p");
        let first = std::cell::RefCell::new(None::<String>);
        let id = generator
            .generate("t", |candidate| {
                let mut first = first.borrow_mut();
                if first.is_none() {
                    *first = Some(candidate.to_string());
                    return true;
                }
                false
            })
            .unwrap();
        assert_ne!(Some(id), first.into_inner());
    }

    #[test]
    fn exhausted_when_everything_is_taken() {
        let mut generator = IdGenerator::new("p");
        let result = generator.generate("t", |_| true);
        assert!(matches!(
            result,
            Err(IdGenerationError::CollisionExhausted { attempts: MAX_NONCE })
        ));
    }
}
