//! ONVIF user table backed by the `user_1..8` configuration sections.
//!
//! A slot with an empty username is free. The table enforces username
//! uniqueness and the eight-slot capacity; the Device service translates
//! the errors into SOAP faults.

use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConfigRuntime, PersistenceHandle};

/// Number of user slots.
pub const MAX_USERS: usize = 8;

/// ONVIF user access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserLevel {
    Administrator,
    Operator,
    #[default]
    User,
}

impl UserLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Administrator" => Some(UserLevel::Administrator),
            "Operator" => Some(UserLevel::Operator),
            "User" => Some(UserLevel::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserLevel::Administrator => "Administrator",
            UserLevel::Operator => "Operator",
            UserLevel::User => "User",
        }
    }
}

/// One stored user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub password: String,
    pub level: UserLevel,
}

/// User table errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserError {
    #[error("user '{0}' already exists")]
    AlreadyExists(String),

    #[error("user '{0}' does not exist")]
    NotFound(String),

    #[error("maximum number of users ({MAX_USERS}) reached")]
    TableFull,

    #[error("invalid username: {0}")]
    InvalidUsername(String),
}

/// Config-backed user store.
pub struct UserStore {
    config: Arc<ConfigRuntime>,
    persistence: PersistenceHandle,
}

fn slot_section(slot: usize) -> String {
    format!("user_{}", slot)
}

fn validate_username(username: &str) -> Result<(), UserError> {
    if username.is_empty() || username.len() > 32 {
        return Err(UserError::InvalidUsername(
            "username must be 1-32 characters".to_string(),
        ));
    }
    if !username
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(UserError::InvalidUsername(format!(
            "'{}' contains invalid characters",
            username
        )));
    }
    Ok(())
}

impl UserStore {
    pub fn new(config: Arc<ConfigRuntime>, persistence: PersistenceHandle) -> Self {
        Self {
            config,
            persistence,
        }
    }

    /// All occupied slots, in slot order.
    pub fn list(&self) -> Vec<User> {
        (1..=MAX_USERS)
            .filter_map(|slot| self.read_slot(slot))
            .collect()
    }

    /// Look up a user by name.
    pub fn find(&self, username: &str) -> Option<User> {
        self.list().into_iter().find(|u| u.username == username)
    }

    /// Add a user into the first free slot.
    pub fn create(&self, user: &User) -> Result<(), UserError> {
        validate_username(&user.username)?;
        if self.find(&user.username).is_some() {
            return Err(UserError::AlreadyExists(user.username.clone()));
        }

        let free_slot = (1..=MAX_USERS)
            .find(|&slot| self.read_slot(slot).is_none())
            .ok_or(UserError::TableFull)?;

        self.write_slot(free_slot, user);
        Ok(())
    }

    /// Remove a user by name, freeing its slot.
    pub fn delete(&self, username: &str) -> Result<(), UserError> {
        let slot = self
            .slot_of(username)
            .ok_or_else(|| UserError::NotFound(username.to_string()))?;

        let section = slot_section(slot);
        self.config.reset_section(&section);
        self.persistence.mark_dirty(&section, "username");
        Ok(())
    }

    /// Update an existing user's password and level.
    pub fn update(&self, user: &User) -> Result<(), UserError> {
        let slot = self
            .slot_of(&user.username)
            .ok_or_else(|| UserError::NotFound(user.username.clone()))?;
        self.write_slot(slot, user);
        Ok(())
    }

    fn slot_of(&self, username: &str) -> Option<usize> {
        (1..=MAX_USERS).find(|&slot| {
            self.read_slot(slot)
                .is_some_and(|u| u.username == username)
        })
    }

    fn read_slot(&self, slot: usize) -> Option<User> {
        let section = slot_section(slot);
        let username = self.config.get_str(&section, "username").ok()?;
        if username.is_empty() {
            return None;
        }
        Some(User {
            username,
            password: self.config.get_str(&section, "password").unwrap_or_default(),
            level: self
                .config
                .get_str(&section, "level")
                .ok()
                .and_then(|l| UserLevel::parse(&l))
                .unwrap_or_default(),
        })
    }

    fn write_slot(&self, slot: usize, user: &User) {
        let section = slot_section(slot);
        let _ = self.config.set_str(&section, "username", &user.username);
        let _ = self.config.set_str(&section, "password", &user.password);
        let _ = self.config.set_str(&section, "level", user.level.as_str());
        self.persistence.mark_dirty(&section, "username");
    }
}
