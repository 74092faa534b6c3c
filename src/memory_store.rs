//! In-process `DocumentStore` holding raw JSON documents.
//!
//! Documents go through the same serde path as the REST store, so malformed fields are
//! read leniently here too. Failures can be injected per user and for notifications to
//! exercise partial assignment outcomes.

use crate::error::StoreError;
use crate::notification::Notification;
use crate::project::ProjectDocument;
use crate::store::{to_value, DocumentStore, NOTIFICATIONS, PROJECTS, USERS};
use crate::user::User;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

type Collection = BTreeMap<String, Value>;

#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<BTreeMap<String, Collection>>,
    next_id: AtomicUsize,
    failing_users: Mutex<BTreeSet<String>>,
    failing_notifications: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    fn collections(&self) -> Result<MutexGuard<'_, BTreeMap<String, Collection>>, StoreError> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Connection("in-memory store poisoned".to_string()))
    }

    fn generate_id(&self, collection: &str) -> String {
        format!("{}-{}", collection, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Stores a raw document, replacing any previous one with the same id.
    pub fn insert_raw(&self, collection: &str, id: &str, document: Value) -> Result<(), StoreError> {
        self.collections()?
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    /// The stored JSON of one document, as written.
    pub fn raw(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .lock()
            .ok()?
            .get(collection)?
            .get(id)
            .cloned()
    }

    /// Every stored document of a collection.
    pub fn documents(&self, collection: &str) -> Vec<Value> {
        self.collections
            .lock()
            .map(|collections| {
                collections
                    .get(collection)
                    .map(|documents| documents.values().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Stores a user under its id.
    pub fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.insert_raw(USERS, &user.id, to_value(user)?)
    }

    /// Makes every later update of this user fail with a connection error.
    pub fn fail_user_updates(&self, uid: &str) {
        if let Ok(mut failing) = self.failing_users.lock() {
            failing.insert(uid.to_string());
        }
    }

    /// Lets updates of the user succeed again.
    pub fn restore_user_updates(&self, uid: &str) {
        if let Ok(mut failing) = self.failing_users.lock() {
            failing.remove(uid);
        }
    }

    /// Makes notification creation fail while `fail` is set.
    pub fn fail_notifications(&self, fail: bool) {
        self.failing_notifications.store(fail, Ordering::SeqCst);
    }

    fn read<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<T, StoreError> {
        let mut document = self
            .raw(collection, id)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", collection, id)))?;
        if let Value::Object(fields) = &mut document {
            fields.insert("id".to_string(), Value::String(id.to_string()));
        }
        serde_json::from_value(document)
            .map_err(|e| StoreError::Malformed(format!("{}/{}: {}", collection, id, e)))
    }

    fn patch(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let mut collections = self.collections()?;
        let document = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", collection, id)))?;
        for (path, value) in fields {
            set_path(document, &path, value);
        }
        Ok(())
    }
}

// Writes `value` at a dotted path, creating intermediate objects.
fn set_path(document: &mut Value, path: &str, value: Value) {
    let mut current = document;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(fields) = current else {
            return;
        };
        if segments.peek().is_none() {
            fields.insert(segment.to_string(), value);
            return;
        }
        current = fields
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

impl DocumentStore for InMemoryStore {
    fn fetch_project(&self, id: &str) -> Result<ProjectDocument, StoreError> {
        self.read(PROJECTS, id)
    }

    fn fetch_projects(&self) -> Result<Vec<ProjectDocument>, StoreError> {
        let ids: Vec<String> = self
            .collections()?
            .get(PROJECTS)
            .map(|documents| documents.keys().cloned().collect())
            .unwrap_or_default();
        ids.iter().map(|id| self.read(PROJECTS, id)).collect()
    }

    fn save_project(&self, project: &ProjectDocument) -> Result<String, StoreError> {
        let id = if project.id.is_empty() {
            self.generate_id(PROJECTS)
        } else {
            project.id.clone()
        };
        let mut document = to_value(project)?;
        if let Value::Object(fields) = &mut document {
            fields.remove("id");
        }
        self.insert_raw(PROJECTS, &id, document)?;
        Ok(id)
    }

    fn patch_project(&self, id: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.patch(PROJECTS, id, fields)
    }

    fn delete_project(&self, id: &str) -> Result<(), StoreError> {
        self.collections()?
            .get_mut(PROJECTS)
            .and_then(|documents| documents.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", PROJECTS, id)))
    }

    fn fetch_user(&self, uid: &str) -> Result<User, StoreError> {
        self.read(USERS, uid)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let ids: Vec<String> = self
            .collections()?
            .get(USERS)
            .map(|documents| documents.keys().cloned().collect())
            .unwrap_or_default();
        for id in ids {
            let user: User = self.read(USERS, &id)?;
            if user.email.eq_ignore_ascii_case(email) {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    fn patch_user(&self, uid: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let failing = self
            .failing_users
            .lock()
            .map(|failing| failing.contains(uid))
            .unwrap_or(false);
        if failing {
            return Err(StoreError::Connection(format!("update of user {} failed", uid)));
        }
        self.patch(USERS, uid, fields)
    }

    fn create_notification(&self, notification: &Notification) -> Result<String, StoreError> {
        if self.failing_notifications.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("notification service unavailable".to_string()));
        }
        let id = self.generate_id(NOTIFICATIONS);
        self.insert_raw(NOTIFICATIONS, &id, to_value(notification)?)?;
        Ok(id)
    }
}
