use std::collections::HashMap;

use anyhow::{Result, bail};

use crate::models::UserId;

/// Resolves the credential a request carries to the signed-in user.
///
/// Issuing credentials happens elsewhere; implementations only look them up.
pub trait SessionResolver: Send + Sync {
    fn resolve(&self, credential: Option<&str>) -> Option<UserId>;
}

/// Static API key table, one `<key> <user>` pair per line.
#[derive(Debug, Default, Clone)]
pub struct ApiKeySessions {
    keys: HashMap<String, UserId>,
}

impl ApiKeySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the key file format. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut sessions = Self::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, user)) = line.split_once(char::is_whitespace) else {
                bail!("api_keys line {}: expected `<key> <user>`", idx + 1);
            };
            let user = user.trim();
            if user.is_empty() {
                bail!("api_keys line {}: missing user", idx + 1);
            }
            sessions.insert(key, UserId::new(user));
        }
        Ok(sessions)
    }

    pub fn insert(&mut self, key: impl Into<String>, user: UserId) {
        self.keys.insert(key.into(), user);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl SessionResolver for ApiKeySessions {
    fn resolve(&self, credential: Option<&str>) -> Option<UserId> {
        let key = credential?.trim();
        if key.is_empty() {
            return None;
        }
        let user = self.keys.get(key).cloned();
        if user.is_none() {
            tracing::debug!("Unknown API key presented");
        }
        user
    }
}
