//! In-process backend shared by every corner provider
//!
//! Stands in for a remote API: users keyed by email, plus a journal of
//! ephemeral and action events that tests inspect afterwards.

use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub email: String,
    pub name: String,
    pub age: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("user {0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),
}

/// Something the backend observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Opened(String),
    Renewed(String),
    Closed(String),
    Progress(String),
}

#[derive(Default)]
pub struct Backend {
    users: RwLock<HashMap<String, User>>,
    records: RwLock<HashMap<String, String>>,
    journal: Mutex<Vec<Event>>,
}

impl Backend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_user(&self, user: User) -> Result<(), BackendError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(BackendError::AlreadyExists(user.email));
        }
        debug!(email = %user.email, "creating user");
        users.insert(user.email.clone(), user);
        Ok(())
    }

    pub async fn read_user(&self, email: &str) -> Option<User> {
        self.users.read().await.get(email).cloned()
    }

    pub async fn update_user(&self, user: User) -> Result<(), BackendError> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.email) {
            Some(existing) => {
                *existing = user;
                Ok(())
            }
            None => Err(BackendError::NotFound(user.email)),
        }
    }

    pub async fn delete_user(&self, email: &str) -> Result<(), BackendError> {
        match self.users.write().await.remove(email) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound(email.to_string())),
        }
    }

    /// Stores a named record, returning its generated id.
    pub async fn put_record(&self, name: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.records.write().await.insert(id.clone(), name.to_string());
        id
    }

    pub async fn rename_record(&self, id: &str, name: &str) -> Result<(), BackendError> {
        match self.records.write().await.get_mut(id) {
            Some(existing) => {
                *existing = name.to_string();
                Ok(())
            }
            None => Err(BackendError::NotFound(id.to_string())),
        }
    }

    pub async fn get_record(&self, id: &str) -> Option<String> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn delete_record(&self, id: &str) {
        self.records.write().await.remove(id);
    }

    pub async fn record(&self, event: Event) {
        debug!(event = ?event, "recording event");
        self.journal.lock().await.push(event);
    }

    pub async fn events(&self) -> Vec<Event> {
        self.journal.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str, age: i64) -> User {
        User {
            email: email.to_string(),
            name: "Jo".to_string(),
            age,
        }
    }

    #[tokio::test]
    async fn users_round_trip() {
        let backend = Backend::new();
        backend.create_user(user("jo@example.com", 30)).await.unwrap();
        assert_eq!(
            backend.create_user(user("jo@example.com", 31)).await,
            Err(BackendError::AlreadyExists("jo@example.com".to_string()))
        );

        backend.update_user(user("jo@example.com", 31)).await.unwrap();
        assert_eq!(backend.read_user("jo@example.com").await.unwrap().age, 31);

        backend.delete_user("jo@example.com").await.unwrap();
        assert!(backend.read_user("jo@example.com").await.is_none());
        assert!(backend.delete_user("jo@example.com").await.is_err());
    }
}
