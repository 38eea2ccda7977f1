use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::{
    executor::command::Command,
    types::error::DatabaseError,
    utils::hash::{calculate_checksum, verify_checksum},
};

pub const USERS_FILE: &str = "users.auth";
pub const DEFAULT_ADMIN: &str = "admin";

/// Access levels, from full control down to read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Developer,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Developer => "developer",
            Role::User => "user",
        }
    }

    /// Whether this role may run `command`. Developers cannot manage users
    /// or create databases; plain users only read.
    pub fn permits(&self, command: &Command) -> bool {
        match self {
            Role::Admin => true,
            Role::Developer => !matches!(command, Command::CreateUser { .. } | Command::CreateDatabase { .. }),
            Role::User => matches!(
                command,
                Command::UseDatabase { .. }
                    | Command::UseTable { .. }
                    | Command::ShowTables
                    | Command::ShowIndexes { .. }
                    | Command::Select { .. }
                    | Command::Begin
                    | Command::Commit
                    | Command::Rollback
                    | Command::Logout
                    | Command::Ping
                    | Command::AuthStatus
                    | Command::DatabaseStatus
                    | Command::TransactionStatus
                    | Command::Meta { .. }
            ),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "developer" => Ok(Role::Developer),
            "user" => Ok(Role::User),
            other => Err(DatabaseError::validation(format!("Unknown role '{}'.", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// SHA-256 of the password, hex encoded.
    pub password_hash: String,
    pub role: Role,
}

impl User {
    pub fn new(username: impl Into<String>, password: &str, role: Role) -> Self {
        Self {
            username: username.into(),
            password_hash: hash_password(password),
            role,
        }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        self.password_hash == hash_password(password)
    }
}

pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Server accounts, persisted under the data directory as
/// `[crc32 LE][bincode payload]`.
#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    users: Vec<User>,
}

impl UserStore {
    /// Loads the accounts file, creating it with a single `admin` account
    /// when it does not exist yet.
    pub fn open<P: AsRef<Path>>(data_dir: P, admin_password: &str) -> Result<Self, DatabaseError> {
        let path = data_dir.as_ref().join(USERS_FILE);
        if !path.exists() {
            fs::create_dir_all(data_dir.as_ref())?;
            let store = Self {
                path,
                users: vec![User::new(DEFAULT_ADMIN, admin_password, Role::Admin)],
            };
            store.save()?;
            info!(path = %store.path.display(), "created accounts file with default admin");
            return Ok(store);
        }
        let bytes = fs::read(&path)?;
        let users = decode_users(&bytes)?;
        Ok(Self { path, users })
    }

    pub fn get(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn usernames(&self) -> Vec<String> {
        self.users.iter().map(|u| u.username.clone()).collect()
    }

    /// The role of `username` if the password matches.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Role, DatabaseError> {
        self.get(username)
            .filter(|user| user.verify_password(password))
            .map(|user| user.role)
            .ok_or(DatabaseError::AuthenticationFailed)
    }

    pub fn create_user(&mut self, username: &str, password: &str, role: Role) -> Result<(), DatabaseError> {
        let valid = !username.is_empty()
            && username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(DatabaseError::validation(format!("Invalid user name '{}'.", username)));
        }
        if self.get(username).is_some() {
            return Err(DatabaseError::UserExists {
                name: username.to_string(),
            });
        }
        self.users.push(User::new(username, password, role));
        self.save()
    }

    fn save(&self) -> Result<(), DatabaseError> {
        let payload = bincode::serde::encode_to_vec(&self.users, bincode::config::standard()).map_err(|e| {
            DatabaseError::Serialization {
                details: e.to_string(),
            }
        })?;
        let mut buffer = Vec::with_capacity(payload.len() + 4);
        buffer.extend_from_slice(&calculate_checksum(&payload).to_le_bytes());
        buffer.extend_from_slice(&payload);
        let tmp = self.path.with_extension("auth.tmp");
        fs::write(&tmp, buffer)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn decode_users(bytes: &[u8]) -> Result<Vec<User>, DatabaseError> {
    if bytes.len() < 4 {
        return Err(DatabaseError::CorruptFile {
            reason: "accounts file is shorter than its checksum".to_string(),
        });
    }
    let (checksum, payload) = bytes.split_at(4);
    let mut raw = [0u8; 4];
    raw.copy_from_slice(checksum);
    if !verify_checksum(payload, u32::from_le_bytes(raw)) {
        return Err(DatabaseError::CorruptFile {
            reason: "accounts checksum mismatch".to_string(),
        });
    }
    let (users, _) = bincode::serde::decode_from_slice::<Vec<User>, _>(payload, bincode::config::standard())
        .map_err(|e| DatabaseError::Serialization {
            details: e.to_string(),
        })?;
    Ok(users)
}
