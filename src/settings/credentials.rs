//! Persisted unit state and static credential hashing.
//!
//! The bcrypt salt and the static user's id are generated once and persisted
//! so that hashing the same password always yields the same hash. Without
//! that, every pass would render a different artifact and restart Dex.
//!
//! The state also carries a generated default login, used when no static
//! credentials are configured so the password database is never empty.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// bcrypt work factor.
pub const BCRYPT_COST: u32 = 12;

pub const DEFAULT_USERNAME: &str = "admin";
const GENERATED_PASSWORD_LEN: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    /// Raw bcrypt salt.
    pub salt: [u8; 16],

    /// `userID` of the static password entry.
    pub user_id: Uuid,

    /// Default login username.
    #[serde(default = "default_username")]
    pub username: String,

    /// Generated default login password.
    #[serde(default)]
    pub password: String,

    /// bcrypt hash of `password`, computed once when it is generated.
    #[serde(default)]
    pub password_hash: String,
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

impl StoredState {
    /// Fresh random state.
    pub fn generate() -> Result<Self> {
        let mut state = Self {
            salt: rand::thread_rng().gen(),
            user_id: Uuid::new_v4(),
            username: default_username(),
            password: String::new(),
            password_hash: String::new(),
        };
        state.fill_default_login()?;
        Ok(state)
    }

    /// Load the state file, creating it on first use.
    ///
    /// State written before the default login existed is completed and
    /// saved back.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => {
                let mut state: Self = serde_json::from_str(&content).map_err(|e| {
                    Error::validation(format!("corrupt state file {}: {}", path.display(), e))
                })?;
                if state.fill_default_login()? {
                    state.save(path)?;
                    tracing::info!(path = ?path, username = %state.username, "Generated default login");
                }
                Ok(state)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let state = Self::generate()?;
                state.save(path)?;
                tracing::info!(
                    path = ?path,
                    user_id = %state.user_id,
                    username = %state.username,
                    "Initialised unit state"
                );
                Ok(state)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Generate the default password and its hash where missing.
    ///
    /// Returns whether anything changed.
    fn fill_default_login(&mut self) -> Result<bool> {
        let mut changed = false;
        if self.username.trim().is_empty() {
            self.username = default_username();
            changed = true;
        }
        if self.password.is_empty() {
            self.password = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(GENERATED_PASSWORD_LEN)
                .map(char::from)
                .collect();
            self.password_hash.clear();
            changed = true;
        }
        if self.password_hash.is_empty() {
            self.password_hash = self.hash_password(&self.password)?;
            changed = true;
        }
        Ok(changed)
    }

    /// Atomically write the state file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// bcrypt hash of `password` under the persisted salt, `$2b$` format.
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let parts = bcrypt::hash_with_salt(password, BCRYPT_COST, self.salt)
            .map_err(|e| Error::validation(format!("cannot hash static password: {}", e)))?;
        Ok(parts.format_for_version(bcrypt::Version::TwoB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_stable_under_one_salt() {
        let state = StoredState::generate().unwrap();
        let a = state.hash_password("foobar").unwrap();
        let b = state.hash_password("foobar").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("$2b$12$"));
        assert!(bcrypt::verify("foobar", &a).unwrap());
    }

    #[test]
    fn different_salts_hash_differently() {
        let a = StoredState::generate().unwrap().hash_password("foobar").unwrap();
        let b = StoredState::generate().unwrap().hash_password("foobar").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn state_is_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/state.json");

        let first = StoredState::load_or_init(&path).unwrap();
        let second = StoredState::load_or_init(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn generated_login_verifies() {
        let state = StoredState::generate().unwrap();
        assert_eq!(state.username, "admin");
        assert_eq!(state.password.len(), 30);
        assert!(state.password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(state.password_hash, state.hash_password(&state.password).unwrap());
        assert!(bcrypt::verify(&state.password, &state.password_hash).unwrap());
    }

    #[test]
    fn older_state_gains_a_default_login() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let salt = serde_json::to_string(&[3u8; 16]).unwrap();
        fs::write(
            &path,
            format!(r#"{{"salt": {}, "user_id": "{}"}}"#, salt, Uuid::nil()),
        )
        .unwrap();

        let state = StoredState::load_or_init(&path).unwrap();
        assert_eq!(state.salt, [3; 16]);
        assert_eq!(state.username, "admin");
        assert!(bcrypt::verify(&state.password, &state.password_hash).unwrap());

        // Completed once, then stable.
        assert_eq!(StoredState::load_or_init(&path).unwrap(), state);
    }

    #[test]
    fn corrupt_state_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{").unwrap();
        assert!(matches!(StoredState::load_or_init(&path), Err(Error::Validation(_))));
    }
}
