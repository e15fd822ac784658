//! Flat-file cache for session cookies and the playtime API bearer token.
//!
//! The whole document is read at the start of a scope and written back when
//! the scope ends, whether or not the work inside it succeeded.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    /// Raw browser cookies, as harvested from the WebDriver session.
    #[serde(default)]
    pub sel: Vec<StoredCookie>,

    /// Name -> value projection of `sel`, suitable for a Cookie header.
    #[serde(default)]
    pub req: HashMap<String, String>,

    /// Bearer token for the playtime API.
    #[serde(default)]
    pub access_token: String,

    /// Unix timestamp of the last session harvest.
    #[serde(default)]
    pub captured_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl Credentials {
    /// Rebuild the `req` view from the cookie list.
    pub fn rebuild_req(&mut self) {
        self.req = self
            .sel
            .iter()
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect();
    }

    /// Cookie header value for HTTP requests made outside the browser.
    pub fn cookie_header(&self) -> String {
        self.req
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Account id, taken from the `steamLoginSecure` cookie (the part
    /// before the first url-encoded `|`).
    pub fn steam_id(&self) -> Result<String> {
        let cookie = self.req.get("steamLoginSecure").ok_or_else(|| {
            crate::error::ReportError::Parse("steamLoginSecure cookie missing".to_string())
        })?;
        Ok(cookie
            .split("%7C")
            .next()
            .unwrap_or_default()
            .to_string())
    }
}

pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the document, or the default if the file does not exist yet.
    /// A malformed file is a fatal error, not a default.
    pub fn load(&self) -> Result<Credentials> {
        if !self.path.exists() {
            return Ok(Credentials::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, creds: &Credentials) -> Result<()> {
        std::fs::write(&self.path, serde_json::to_string_pretty(creds)?)?;
        Ok(())
    }

    /// Run `f` against the loaded document and write the document back
    /// afterwards, even when `f` fails. A write failure takes precedence
    /// over `f`'s outcome since there is no recovery path for it.
    pub fn update<T>(&self, f: impl FnOnce(&mut Credentials) -> Result<T>) -> Result<T> {
        let mut creds = self.load()?;
        let outcome = f(&mut creds);
        self.save(&creds)?;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;

    fn sample() -> Credentials {
        let mut creds = Credentials {
            sel: vec![
                StoredCookie {
                    name: "sessionid".to_string(),
                    value: "abc123".to_string(),
                    domain: Some("store.steampowered.com".to_string()),
                    path: Some("/".to_string()),
                    secure: true,
                    http_only: false,
                },
                StoredCookie {
                    name: "steamLoginSecure".to_string(),
                    value: "76561198000000000%7C%7Ctoken".to_string(),
                    domain: None,
                    path: None,
                    secure: true,
                    http_only: true,
                },
            ],
            req: HashMap::new(),
            access_token: "tok".to_string(),
            captured_at: Some(1_700_000_000),
        };
        creds.rebuild_req();
        creds
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("cookiestore.json"));
        let creds = sample();
        store.save(&creds).unwrap();
        assert_eq!(store.load().unwrap(), creds);
    }

    #[test]
    fn load_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nope.json"));
        assert_eq!(store.load().unwrap(), Credentials::default());
    }

    #[test]
    fn load_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookiestore.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = CredentialStore::new(path);
        assert!(matches!(
            store.load(),
            Err(ReportError::Serialization(_))
        ));
    }

    #[test]
    fn update_flushes_even_when_the_closure_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("cookiestore.json"));
        let result: Result<()> = store.update(|creds| {
            creds.access_token = "partial".to_string();
            Err(ReportError::Parse("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.load().unwrap().access_token, "partial");
    }

    #[test]
    fn req_view_tracks_the_cookie_list() {
        let creds = sample();
        assert_eq!(creds.req.len(), 2);
        assert_eq!(creds.req["sessionid"], "abc123");
    }

    #[test]
    fn steam_id_comes_from_login_cookie() {
        let creds = sample();
        assert_eq!(creds.steam_id().unwrap(), "76561198000000000");

        let empty = Credentials::default();
        assert!(empty.steam_id().is_err());
    }
}
