// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Download codes and the store that maps them to descriptors.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bon::Builder;
use jiff::{SignedDuration, Timestamp};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tokio::sync::RwLock;

use crate::{
    config::{MIN_CODE_LENGTH, TransferConfig},
    error::{Result, TransferError},
};

/// How the front door serves a file.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Attachment download; `Range` is only honoured through chunk requests.
    #[default]
    Plain,
    /// Audio or video; the whole-file endpoint honours `Range`.
    Media,
}

/// What a download code grants access to.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    /// Path relative to the storage root
    #[builder(into)]
    pub relative_path: String,
    /// Filename presented to the client
    #[builder(into)]
    pub display_name:  String,
    #[builder(default)]
    pub kind:          FileKind,
}

/// A descriptor together with the code it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSession {
    pub code:          String,
    pub relative_path: String,
    pub display_name:  String,
    pub kind:          FileKind,
}

impl DownloadSession {
    fn new(code: &str, descriptor: &DownloadDescriptor) -> Self {
        Self {
            code:          code.to_string(),
            relative_path: descriptor.relative_path.clone(),
            display_name:  descriptor.display_name.clone(),
            kind:          descriptor.kind,
        }
    }
}

/// Generate a random case-sensitive alphanumeric code.
#[must_use]
pub fn generate_code(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length.max(MIN_CODE_LENGTH))
        .map(char::from)
        .collect()
}

/// TTL-backed storage for download codes.
///
/// `get` never changes an entry's expiry; a code stays readable any number
/// of times until it expires or is invalidated.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store `descriptor` under a fresh unique code and return the code.
    async fn create(&self, descriptor: DownloadDescriptor) -> Result<String>;

    async fn get(&self, code: &str) -> Result<Option<DownloadSession>>;

    async fn invalidate(&self, code: &str) -> Result<()>;
}

struct Entry {
    descriptor: DownloadDescriptor,
    expires_at: Timestamp,
}

/// In-process session store. Expired entries read as absent and are swept
/// whenever a new code is created.
pub struct MemorySessionStore {
    entries:     RwLock<HashMap<String, Entry>>,
    ttl:         SignedDuration,
    code_length: usize,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration, code_length: usize) -> Result<Self> {
        let ttl = SignedDuration::try_from(ttl).map_err(|e| TransferError::SessionStore {
            message: format!("invalid code ttl: {e}"),
        })?;
        Ok(Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            code_length: code_length.max(MIN_CODE_LENGTH),
        })
    }

    pub fn from_config(config: &TransferConfig) -> Result<Self> {
        Self::new(config.code_ttl, config.effective_code_length())
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Timestamp::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool { self.len().await == 0 }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, descriptor: DownloadDescriptor) -> Result<String> {
        let now = Timestamp::now();
        let expires_at = now
            .checked_add(self.ttl)
            .map_err(|e| TransferError::SessionStore {
                message: format!("code expiry out of range: {e}"),
            })?;

        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);

        let code = loop {
            let candidate = generate_code(self.code_length);
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };
        entries.insert(
            code.clone(),
            Entry {
                descriptor,
                expires_at,
            },
        );
        Ok(code)
    }

    async fn get(&self, code: &str) -> Result<Option<DownloadSession>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(code)
            .filter(|entry| entry.expires_at > Timestamp::now())
            .map(|entry| DownloadSession::new(code, &entry.descriptor)))
    }

    async fn invalidate(&self, code: &str) -> Result<()> {
        self.entries.write().await.remove(code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DownloadDescriptor {
        DownloadDescriptor::builder()
            .relative_path("42/notes.txt")
            .display_name("notes.txt")
            .build()
    }

    #[test]
    fn test_generate_code() {
        let code = generate_code(50);
        assert_eq!(code.len(), 50);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(code, generate_code(50));
        assert_eq!(generate_code(8).len(), MIN_CODE_LENGTH);
    }

    #[tokio::test]
    async fn test_get_is_repeatable() {
        let store = MemorySessionStore::new(Duration::from_secs(60), 50).unwrap();
        let code = store.create(descriptor()).await.unwrap();
        assert_eq!(code.len(), 50);

        let first = store.get(&code).await.unwrap().unwrap();
        let second = store.get(&code).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.code, code);
        assert_eq!(first.relative_path, "42/notes.txt");
        assert_eq!(first.kind, FileKind::Plain);
    }

    #[tokio::test]
    async fn test_codes_are_case_sensitive() {
        let store = MemorySessionStore::new(Duration::from_secs(60), 50).unwrap();
        let code = store.create(descriptor()).await.unwrap();
        let flipped: String = code
            .chars()
            .map(|c| {
                if c.is_ascii_uppercase() {
                    c.to_ascii_lowercase()
                } else {
                    c.to_ascii_uppercase()
                }
            })
            .collect();
        if flipped != code {
            assert!(store.get(&flipped).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_expired_code_reads_as_absent() {
        let store = MemorySessionStore::new(Duration::ZERO, 50).unwrap();
        let code = store.create(descriptor()).await.unwrap();
        assert!(store.get(&code).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let store = MemorySessionStore::new(Duration::from_secs(60), 50).unwrap();
        let code = store.create(descriptor()).await.unwrap();
        store.invalidate(&code).await.unwrap();
        assert!(store.get(&code).await.unwrap().is_none());
        // Unknown codes are a no-op.
        store.invalidate("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_sweeps_expired_entries() {
        let store = MemorySessionStore::new(Duration::ZERO, 50).unwrap();
        for _ in 0..3 {
            store.create(descriptor()).await.unwrap();
        }
        assert!(store.entries.read().await.len() <= 1);
    }
}
