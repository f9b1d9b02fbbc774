use std::fmt;

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

pub const GENERATED_ID_LEN: usize = 8;
pub const MAX_ID_LEN: usize = 32;

/// The value a worker writes into `claimed_by`.
///
/// Must stay the same for the life of the process, otherwise `Scope::Owned`
/// views stop seeing the rows this worker already holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Result<Self, QueueError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.chars().count() <= MAX_ID_LEN
            && !id.chars().any(char::is_whitespace);
        if !valid {
            return Err(QueueError::InvalidWorkerId(id));
        }
        Ok(Self(id))
    }

    /// Fresh random 8-character alphanumeric identity.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with(rng: &mut impl Rng) -> Self {
        let id: String = rng
            .sample_iter(&Alphanumeric)
            .take(GENERATED_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn generated_ids_are_eight_alphanumerics() {
        let id = WorkerId::generate();
        assert_eq!(id.as_str().len(), GENERATED_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let a = WorkerId::generate_with(&mut StdRng::seed_from_u64(7));
        let b = WorkerId::generate_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_empty_long_or_spaced_ids() {
        assert!(WorkerId::new("").is_err());
        assert!(WorkerId::new("a b").is_err());
        assert!(WorkerId::new("x".repeat(MAX_ID_LEN + 1)).is_err());
        assert_eq!(WorkerId::new("worker-1").unwrap().as_str(), "worker-1");
    }
}
