use dialoguer::{Confirm, Input, Password};
use keyring::Entry;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Base URL and access token of the hosted document store.
///
/// ```
/// use project_evaluation_connector::StoreCredentials;
///
/// let credentials = StoreCredentials {
///     url_store: "https://store.example.com/v1".to_string(),
///     token_store: "your_api_token".to_string(),
/// };
/// assert!(credentials.is_complete());
/// ```
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct StoreCredentials {
    pub url_store: String,
    pub token_store: String,
}

// Where a set of credentials came from.
enum StoreCredentialType {
    None,
    EnvVariables(StoreCredentials),
    ConfigFile(StoreCredentials),
    SystemKeyring(StoreCredentials),
}

const KEYRING_URL: &str = "URL_STORE";
const KEYRING_TOKEN: &str = "TOKEN_STORE";

impl StoreCredentials {
    /// True when both the URL and the token are set.
    pub fn is_complete(&self) -> bool {
        !self.url_store.trim().is_empty() && !self.token_store.trim().is_empty()
    }

    /// Checks the credentials against the store.
    ///
    /// Returns `Ok(200)` when accepted, otherwise the HTTP status (0 for network failures).
    fn test_store_credentials(api_url: &str, access_token: &str) -> Result<u16, u16> {
        let client = reqwest::blocking::Client::new();
        let res = client
            .get(format!("{}/users", api_url.trim_end_matches('/')))
            .query(&[("per_page", "1")])
            .bearer_auth(access_token)
            .send();

        match res {
            Ok(response) if response.status().is_success() => Ok(200),
            Ok(response) => Err(response.status().as_u16()),
            Err(_) => Err(0),
        }
    }

    /// Loads credentials from `EVAL_STORE_URL` and `EVAL_STORE_TOKEN`.
    ///
    /// Only available with the `use_env_credentials` feature.
    pub fn load_credentials_from_env() -> Result<StoreCredentials, String> {
        #[cfg(not(feature = "use_env_credentials"))]
        {
            Err("Feature not enabled".to_string())
        }

        #[cfg(feature = "use_env_credentials")]
        {
            let url = std::env::var("EVAL_STORE_URL")
                .map_err(|_| "Error retrieving URL from environment".to_string())?;
            let token = std::env::var("EVAL_STORE_TOKEN")
                .map_err(|_| "Error retrieving token from environment".to_string())?;
            log::info!("Store credentials loaded from environment for {}", url);
            Ok(StoreCredentials {
                url_store: url,
                token_store: token,
            })
        }
    }

    /// `<config dir>/project_evaluation_connector/credentials.json`, if the platform has a
    /// config directory.
    pub fn default_credentials_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME")).join("credentials.json"))
    }

    /// Loads credentials from a JSON file holding `url_store` and `token_store`.
    pub fn load_credentials_from_file(path: &Path) -> Result<StoreCredentials, String> {
        let file = File::open(path)
            .map_err(|e| format!("Error opening {}: {}", path.display(), e))?;
        let credentials: StoreCredentials = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| format!("Error reading {}: {}", path.display(), e))?;
        if credentials.is_complete() {
            Ok(credentials)
        } else {
            Err(format!("Incomplete credentials in {}", path.display()))
        }
    }

    /// Writes credentials to a JSON file, creating the parent directory.
    pub fn save_credentials_to_file(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Error creating {}: {}", parent.display(), e))?;
        }
        let file = File::create(path)
            .map_err(|e| format!("Error creating {}: {}", path.display(), e))?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| format!("Error writing {}: {}", path.display(), e))
    }

    /// Loads credentials from the system keyring.
    pub fn load_credentials_from_system() -> Result<StoreCredentials, String> {
        let app_name = env!("CARGO_PKG_NAME");
        let url = Entry::new(app_name, KEYRING_URL)
            .and_then(|entry| entry.get_password())
            .map_err(|_| "Error retrieving URL from system".to_string())?;
        let token = Entry::new(app_name, KEYRING_TOKEN)
            .and_then(|entry| entry.get_password())
            .map_err(|_| "Error retrieving token from system".to_string())?;
        Ok(StoreCredentials {
            url_store: url,
            token_store: token,
        })
    }

    fn store_credentials_in_system(&self) -> Result<(), String> {
        let app_name = env!("CARGO_PKG_NAME");
        Entry::new(app_name, KEYRING_URL)
            .and_then(|entry| entry.set_password(&self.url_store))
            .map_err(|e| format!("Error saving URL: {}", e))?;
        Entry::new(app_name, KEYRING_TOKEN)
            .and_then(|entry| entry.set_password(&self.token_store))
            .map_err(|e| format!("Error saving token: {}", e))
    }

    // Environment first, then the config file, then the keyring.
    fn load_credentials() -> StoreCredentialType {
        if let Ok(credentials) = Self::load_credentials_from_env() {
            return StoreCredentialType::EnvVariables(credentials);
        }
        if let Some(path) = Self::default_credentials_path() {
            match Self::load_credentials_from_file(&path) {
                Ok(credentials) => return StoreCredentialType::ConfigFile(credentials),
                Err(e) if path.exists() => warn!("{}", e),
                Err(_) => {}
            }
        }
        match Self::load_credentials_from_system() {
            Ok(credentials) => StoreCredentialType::SystemKeyring(credentials),
            Err(_) => StoreCredentialType::None,
        }
    }

    /// Prompts for credentials until the store accepts them, then keeps them in the keyring.
    fn set_system_credentials() -> Result<StoreCredentials, String> {
        loop {
            let register = Confirm::new()
                .with_prompt("Do you wish to register the store credentials?")
                .interact()
                .map_err(|e| e.to_string())?;
            if !register {
                return Err("No credentials registered".to_string());
            }
            let url: String = Input::new()
                .with_prompt("Store URL")
                .interact_text()
                .map_err(|e| e.to_string())?;
            let token = Password::new()
                .with_prompt("Store token")
                .interact()
                .map_err(|e| e.to_string())?;
            let credentials = StoreCredentials {
                url_store: url.trim().to_string(),
                token_store: token.trim().to_string(),
            };

            match Self::test_store_credentials(&credentials.url_store, &credentials.token_store) {
                Ok(_) => {
                    if let Err(e) = credentials.store_credentials_in_system() {
                        warn!("{}", e);
                    }
                    return Ok(credentials);
                }
                Err(status_code) if status_code == 401 || status_code == 403 => {
                    warn!("Incorrect credentials");
                }
                Err(status_code) => {
                    return Err(format!(
                        "Error accessing the store - Status Code {}",
                        status_code
                    ));
                }
            }
        }
    }

    /// Returns validated credentials, prompting for new ones when none are stored.
    pub fn credentials() -> Result<StoreCredentials, String> {
        match Self::load_credentials() {
            StoreCredentialType::None => Self::set_system_credentials(),
            StoreCredentialType::EnvVariables(credentials)
            | StoreCredentialType::ConfigFile(credentials)
            | StoreCredentialType::SystemKeyring(credentials) => {
                match Self::test_store_credentials(&credentials.url_store, &credentials.token_store)
                {
                    Ok(_) => Ok(credentials),
                    Err(e) => Err(format!("Error accessing the store - Status Code {}", e)),
                }
            }
        }
    }
}
