// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User repository.
//!
//! Users are created on their first authenticated request. The record ID is
//! derived from the identity provider subject, so concurrent first requests
//! for the same account resolve to the same file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::super::{FileStorage, StorageError, StorageResult};

/// User profile stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredUser {
    /// Unique user identifier (UUID)
    pub id: String,
    /// Subject claim of the Google ID token
    pub google_subject: String,
    /// Lower-cased email address
    pub email: String,
    /// Display name
    pub name: String,
    /// Avatar URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity claims used to create or refresh a user.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub subject: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

impl StoredUser {
    /// Deterministic user ID for an identity-provider subject.
    pub fn id_for_subject(subject: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("google:{subject}").as_bytes()).to_string()
    }
}

/// Normalize an email for storage and comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Repository for user operations.
pub struct UserRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> UserRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    pub fn exists(&self, user_id: &str) -> bool {
        self.storage.exists(self.storage.paths().user(user_id))
    }

    /// Get a user by ID.
    pub fn get(&self, user_id: &str) -> StorageResult<StoredUser> {
        let path = self.storage.paths().user(user_id);
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!("User {user_id}")));
        }
        self.storage.read_json(path)
    }

    /// Get a user by email (case-insensitive).
    pub fn get_by_email(&self, email: &str) -> StorageResult<StoredUser> {
        let email = normalize_email(email);
        self.list()?
            .into_iter()
            .find(|user| user.email == email)
            .ok_or_else(|| StorageError::NotFound(format!("User with email {email}")))
    }

    /// Create a new user. Email addresses are unique.
    pub fn create(&self, user: &StoredUser) -> StorageResult<()> {
        if self.exists(&user.id) {
            return Err(StorageError::AlreadyExists(format!("User {}", user.id)));
        }
        if self.get_by_email(&user.email).is_ok() {
            return Err(StorageError::AlreadyExists(format!(
                "User with email {}",
                user.email
            )));
        }
        self.storage.write_json(self.storage.paths().user(&user.id), user)
    }

    /// Update an existing user.
    pub fn update(&self, user: &StoredUser) -> StorageResult<()> {
        if !self.exists(&user.id) {
            return Err(StorageError::NotFound(format!("User {}", user.id)));
        }
        self.storage.write_json(self.storage.paths().user(&user.id), user)
    }

    /// Create the user on first sight, refresh the profile when it changed.
    pub fn upsert(&self, identity: &UserIdentity) -> StorageResult<StoredUser> {
        let user_id = StoredUser::id_for_subject(&identity.subject);
        let email = normalize_email(&identity.email);

        match self.get(&user_id) {
            Ok(mut user) => {
                if user.email != email || user.name != identity.name || user.picture != identity.picture
                {
                    user.email = email;
                    user.name = identity.name.clone();
                    user.picture = identity.picture.clone();
                    user.updated_at = Utc::now();
                    self.update(&user)?;
                }
                Ok(user)
            }
            Err(StorageError::NotFound(_)) => {
                let now = Utc::now();
                let user = StoredUser {
                    id: user_id.clone(),
                    google_subject: identity.subject.clone(),
                    email,
                    name: identity.name.clone(),
                    picture: identity.picture.clone(),
                    created_at: now,
                    updated_at: now,
                };
                match self.create(&user) {
                    Ok(()) => Ok(user),
                    // Lost a race with a concurrent first request.
                    Err(StorageError::AlreadyExists(_)) if self.exists(&user_id) => {
                        self.get(&user_id)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// List all users.
    pub fn list(&self) -> StorageResult<Vec<StoredUser>> {
        self.storage.read_all(self.storage.paths().users_dir())
    }
}
