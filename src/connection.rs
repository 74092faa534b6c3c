use crate::error::StoreError;
use crate::StoreCredentials;
use lazy_static::lazy_static;
use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use std_semaphore::Semaphore;
use std::thread::sleep;
use std::time::Duration;

/// Upper bound on HTTP requests in flight against the document store.
const SIMULTANEOUS_REQUESTS_LIMIT: isize = 20;

/// Attempts made for a request that keeps being throttled (403/429) before giving up.
pub const SYNC_ATTEMPT: u32 = 5;

/// Pause between throttled attempts.
const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// HTTP methods used against the store. Write methods carry their JSON body.
#[derive(Clone, Debug)]
pub enum HttpMethod {
    Get,
    Put(serde_json::Value),
    Patch(serde_json::Value),
    Post(serde_json::Value),
    Delete,
}

impl HttpMethod {
    fn name(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put(_) => "PUT",
            HttpMethod::Patch(_) => "PATCH",
            HttpMethod::Post(_) => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Either a successful response or the failing status code (0 when no response came back).
pub type HttpRequestResult = Result<Response, u16>;

lazy_static! {
    static ref SEMAPHORE: Semaphore = Semaphore::new(SIMULTANEOUS_REQUESTS_LIMIT);
}

fn send_http_request_single_attempt(
    client: &Client,
    method: &HttpMethod,
    url: &str,
    credentials: &StoreCredentials,
    params: &[(String, String)],
) -> HttpRequestResult {
    let request_builder = match method {
        HttpMethod::Get => client.get(url).query(params),
        HttpMethod::Put(body) => client.put(url).json(body),
        HttpMethod::Patch(body) => client.patch(url).json(body),
        HttpMethod::Post(body) => client.post(url).json(body),
        HttpMethod::Delete => client.delete(url).query(params),
    }
    .bearer_auth(&credentials.token_store);

    let _guard = SEMAPHORE.access();
    match request_builder.send() {
        Ok(response) if response.status().is_success() => Ok(response),
        Ok(response) => Err(response.status().as_u16()),
        Err(e) => {
            debug!("{} {} failed before a response: {}", method.name(), url, e);
            Err(0)
        }
    }
}

/// Maps a failing status code onto the store error taxonomy.
pub fn status_to_error(status: u16, url: &str) -> StoreError {
    match status {
        401 | 403 => StoreError::PermissionDenied(format!("{} (HTTP {})", url, status)),
        404 => StoreError::NotFound(url.to_string()),
        0 => StoreError::Connection(format!("no response from {}", url)),
        _ => StoreError::Connection(format!("{} returned HTTP {}", url, status)),
    }
}

/// Sends a request, retrying while the store throttles it.
pub fn send_http_request(
    client: &Client,
    method: HttpMethod,
    url: &str,
    credentials: &StoreCredentials,
    params: Vec<(String, String)>,
) -> Result<Response, StoreError> {
    let mut attempts = 0;
    loop {
        debug!("{} {}", method.name(), url);
        match send_http_request_single_attempt(client, &method, url, credentials, &params) {
            Ok(response) => return Ok(response),
            Err(status) if (status == 403 || status == 429) && attempts < SYNC_ATTEMPT - 1 => {
                attempts += 1;
                warn!(
                    "{} {} throttled with HTTP {}, retry {} of {}",
                    method.name(),
                    url,
                    status,
                    attempts,
                    SYNC_ATTEMPT - 1
                );
                sleep(RETRY_DELAY);
            }
            Err(status) => return Err(status_to_error(status, url)),
        }
    }
}
