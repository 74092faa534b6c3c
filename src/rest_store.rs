use crate::connection::{send_http_request, HttpMethod};
use crate::error::StoreError;
use crate::notification::Notification;
use crate::project::ProjectDocument;
use crate::store::{to_value, DocumentStore, NOTIFICATIONS, PROJECTS, USERS};
use crate::user::User;
use crate::StoreCredentials;
use log::{debug, info, warn};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

const PAGE_SIZE: usize = 100;

/// `DocumentStore` backed by the REST endpoint of the hosted document database.
///
/// Documents live at `{url}/{collection}/{id}`. Collections are listed page by page with
/// `page`/`per_page` until an empty page comes back.
pub struct RestStore {
    credentials: StoreCredentials,
    client: Client,
}

impl RestStore {
    /// Creates a store that talks to `credentials.url_store`.
    pub fn new(credentials: StoreCredentials) -> Self {
        RestStore {
            credentials,
            client: Client::new(),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/{}",
            self.credentials.url_store.trim_end_matches('/'),
            collection
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), id)
    }

    fn request(
        &self,
        method: HttpMethod,
        url: &str,
        params: Vec<(String, String)>,
    ) -> Result<Response, StoreError> {
        send_http_request(&self.client, method, url, &self.credentials, params)
    }

    fn read_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, StoreError> {
        response
            .json::<T>()
            .map_err(|e| StoreError::Malformed(format!("{}: {}", url, e)))
    }

    // Fetches every page of a collection as raw documents.
    fn fetch_all(
        &self,
        collection: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<Value>, StoreError> {
        let url = self.collection_url(collection);
        let mut all_documents = Vec::new();
        let mut page = 1;
        loop {
            let mut params: Vec<(String, String)> = filters
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect();
            params.push(("page".to_string(), page.to_string()));
            params.push(("per_page".to_string(), PAGE_SIZE.to_string()));

            let response = self.request(HttpMethod::Get, &url, params)?;
            let documents: Vec<Value> = Self::read_json(response, &url)?;
            if documents.is_empty() {
                break;
            }
            all_documents.extend(documents);
            page += 1;
        }
        debug!("Fetched {} documents from {}", all_documents.len(), collection);
        Ok(all_documents)
    }

    // Documents carry their id in the path; reads put it back into the body.
    fn with_id(mut document: Value, id: &str) -> Value {
        if let Value::Object(fields) = &mut document {
            fields.insert("id".to_string(), Value::String(id.to_string()));
        }
        document
    }

    fn decode<T: DeserializeOwned>(document: Value, what: &str) -> Result<T, StoreError> {
        serde_json::from_value(document).map_err(|e| StoreError::Malformed(format!("{}: {}", what, e)))
    }

    // Listed documents carry their id in the body. A listing without ids cannot be written
    // back, so it fails as a whole; a document that merely does not decode is skipped.
    fn decode_listed<T: DeserializeOwned>(
        documents: Vec<Value>,
        collection: &str,
    ) -> Result<Vec<T>, StoreError> {
        let mut decoded = Vec::with_capacity(documents.len());
        for document in documents {
            let id = match document.get("id") {
                Some(Value::String(id)) if !id.is_empty() => id.clone(),
                _ => {
                    return Err(StoreError::Malformed(format!(
                        "{} listing returned a document without id",
                        collection
                    )))
                }
            };
            match serde_json::from_value(document) {
                Ok(value) => decoded.push(value),
                Err(e) => warn!("Skipping unreadable {} document {}: {}", collection, id, e),
            }
        }
        Ok(decoded)
    }

    fn created_id(response: Response, url: &str) -> Result<String, StoreError> {
        let body: Value = Self::read_json(response, url)?;
        match body.get("id") {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            _ => Err(StoreError::Malformed(format!("{} returned no document id", url))),
        }
    }
}

impl DocumentStore for RestStore {
    fn fetch_project(&self, id: &str) -> Result<ProjectDocument, StoreError> {
        let url = self.document_url(PROJECTS, id);
        let response = self.request(HttpMethod::Get, &url, Vec::new())?;
        let document: Value = Self::read_json(response, &url)?;
        Self::decode(Self::with_id(document, id), &url)
    }

    fn fetch_projects(&self) -> Result<Vec<ProjectDocument>, StoreError> {
        Self::decode_listed(self.fetch_all(PROJECTS, &[])?, PROJECTS)
    }

    fn save_project(&self, project: &ProjectDocument) -> Result<String, StoreError> {
        let mut body = to_value(project)?;
        if let Value::Object(fields) = &mut body {
            fields.remove("id");
        }
        if project.id.is_empty() {
            let url = self.collection_url(PROJECTS);
            let response = self.request(HttpMethod::Post(body), &url, Vec::new())?;
            let id = Self::created_id(response, &url)?;
            info!("Created project {} ({})", id, project.project_name);
            Ok(id)
        } else {
            let url = self.document_url(PROJECTS, &project.id);
            self.request(HttpMethod::Put(body), &url, Vec::new())?;
            Ok(project.id.clone())
        }
    }

    fn patch_project(&self, id: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let url = self.document_url(PROJECTS, id);
        self.request(HttpMethod::Patch(Value::Object(fields)), &url, Vec::new())?;
        Ok(())
    }

    fn delete_project(&self, id: &str) -> Result<(), StoreError> {
        let url = self.document_url(PROJECTS, id);
        self.request(HttpMethod::Delete, &url, Vec::new())?;
        info!("Deleted project {}", id);
        Ok(())
    }

    fn fetch_user(&self, uid: &str) -> Result<User, StoreError> {
        let url = self.document_url(USERS, uid);
        let response = self.request(HttpMethod::Get, &url, Vec::new())?;
        let document: Value = Self::read_json(response, &url)?;
        Self::decode(Self::with_id(document, uid), &url)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let documents = self.fetch_all(USERS, &[("email", email)])?;
        let users: Vec<User> = Self::decode_listed(documents, USERS)?;
        Ok(users
            .into_iter()
            .find(|user| user.email.eq_ignore_ascii_case(email)))
    }

    fn patch_user(&self, uid: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let url = self.document_url(USERS, uid);
        self.request(HttpMethod::Patch(Value::Object(fields)), &url, Vec::new())?;
        Ok(())
    }

    fn create_notification(&self, notification: &Notification) -> Result<String, StoreError> {
        let url = self.collection_url(NOTIFICATIONS);
        let response = self.request(HttpMethod::Post(to_value(notification)?), &url, Vec::new())?;
        Self::created_id(response, &url)
    }
}
