//! In-process key-value cache with per-entry TTL
//!
//! Values are stored as JSON so any serializable response or query result can
//! be cached and handed back unchanged. Keys follow a `:`-separated layout:
//!
//! - generic: `prefix:arg1:arg2:k1:v1:k2:v2` (kwargs sorted by name)
//! - per user: `user_<id>:<prefix>...`
//! - API responses: `[user_<id>:]api:<endpoint>[:k:v...]`
//! - query results: `[user_<id>:]query:<model>[:k:v...]`
//!
//! Keys longer than [`MAX_KEY_LEN`] collapse to `prefix:<sha256 hex>`.
//! Invalidation is by `*` glob over the key space.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Keys above this length are replaced by a digest
pub const MAX_KEY_LEN: usize = 200;

/// Request parameters that never take part in an API cache key
const VOLATILE_PARAMS: [&str; 3] = ["_", "nocache", "t"];

// ========================================
// TTL categories
// ========================================

/// Time-to-live per cached data category, in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheTtl {
    pub default: u64,
    pub weather: u64,
    pub translation: u64,
    pub map_location: u64,
    pub user_profile: u64,
    pub task_list: u64,
    pub kanban_board: u64,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            default: 300,
            weather: 600,
            translation: 86_400,
            map_location: 3_600,
            user_profile: 1_800,
            task_list: 60,
            kanban_board: 120,
        }
    }
}

impl CacheTtl {
    /// Look up a category by name, falling back to `default`
    pub fn for_category(&self, category: &str) -> Duration {
        let secs = match category {
            "weather" => self.weather,
            "translation" => self.translation,
            "map_location" => self.map_location,
            "user_profile" => self.user_profile,
            "task_list" => self.task_list,
            "kanban_board" => self.kanban_board,
            _ => self.default,
        };
        Duration::from_secs(secs)
    }
}

// ========================================
// Key construction
// ========================================

/// Build a cache key from a prefix, positional parts and named parts
///
/// Named parts are sorted by name so argument order never changes the key.
pub fn cache_key(prefix: &str, args: &[&str], kwargs: &[(&str, &str)]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(1 + args.len() + kwargs.len());
    parts.push(prefix.to_string());
    parts.extend(args.iter().map(|a| a.to_string()));

    let mut sorted: Vec<&(&str, &str)> = kwargs.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    parts.extend(sorted.iter().map(|(k, v)| format!("{}:{}", k, v)));

    let key = parts.join(":");
    if key.len() > MAX_KEY_LEN {
        let digest = Sha256::digest(key.as_bytes());
        return format!("{}:{}", prefix, hex(&digest));
    }
    key
}

/// Key scoped to one user
pub fn user_key(user_id: &str, prefix: &str, args: &[&str], kwargs: &[(&str, &str)]) -> String {
    cache_key(&format!("user_{}:{}", user_id, prefix), args, kwargs)
}

/// Key for a cached API response
///
/// Cache-busting parameters (`_`, `nocache`, `t`) are ignored.
pub fn api_key(endpoint: &str, params: &BTreeMap<String, String>, user_id: Option<&str>) -> String {
    scoped_key("api", endpoint, params, user_id)
}

/// Key for a cached database query result
pub fn query_key(model: &str, params: &BTreeMap<String, String>, user_id: Option<&str>) -> String {
    scoped_key("query", model, params, user_id)
}

/// Glob that matches every cached response of `endpoint` for one user or globally
pub fn endpoint_pattern(endpoint: &str, user_id: Option<&str>) -> String {
    match user_id {
        Some(uid) => format!("user_{}:api:{}*", uid, endpoint),
        None => format!("api:{}*", endpoint),
    }
}

fn scoped_key(
    kind: &str,
    name: &str,
    params: &BTreeMap<String, String>,
    user_id: Option<&str>,
) -> String {
    let mut prefix = format!("{}:{}", kind, name);
    if let Some(uid) = user_id {
        prefix = format!("user_{}:{}", uid, prefix);
    }

    let kwargs: Vec<(&str, &str)> = params
        .iter()
        .filter(|(k, _)| !VOLATILE_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    if kwargs.is_empty() {
        prefix
    } else {
        cache_key(&prefix, &[], &kwargs)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Match `key` against a glob where `*` spans any run of characters
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern = pattern.as_bytes();
    let key = key.as_bytes();
    let (mut p, mut k) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while k < key.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == key[k]) {
            p += 1;
            k += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            resume = k;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            k = resume;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

// ========================================
// Store
// ========================================

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Shared TTL cache
#[derive(Debug)]
pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(CacheTtl::default().default))
    }
}

impl CacheStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Raw JSON value for `key`, `None` on miss or expiry
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Typed lookup; a value that no longer deserializes counts as a miss
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Cache entry '{}' has unexpected shape: {}", key, e);
                None
            }
        }
    }

    /// Store `value` under `key`; `None` uses the store's default TTL
    ///
    /// Returns false when the value cannot be represented as JSON.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("Cache value for '{}' is not serializable: {}", key, e);
                return false;
            }
        };
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), CacheEntry { value, expires_at });
        true
    }

    /// Remove one key; true when something live was removed
    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.entries.write().await.remove(key);
        matches!(removed, Some(e) if e.expires_at > Instant::now())
    }

    /// Remove every key matching a `*` glob, returning how many were removed
    pub async fn delete_pattern(&self, pattern: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Cache invalidated {} keys matching '{}'", removed, pattern);
        }
        removed
    }

    /// Clear every cached entry belonging to one user
    pub async fn clear_user(&self, user_id: &str) -> usize {
        self.delete_pattern(&format!("user_{}:*", user_id)).await
    }

    /// Return the cached value or compute, store and return it
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, ttl: Option<Duration>, produce: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(hit);
        }
        let value = produce().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    /// Drop expired entries, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, including not yet purged expired ones
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_sorts_kwargs() {
        let a = cache_key("tasks", &["u1"], &[("status", "todo"), ("page", "2")]);
        let b = cache_key("tasks", &["u1"], &[("page", "2"), ("status", "todo")]);
        assert_eq!(a, b);
        assert_eq!(a, "tasks:u1:page:2:status:todo");
    }

    #[test]
    fn test_long_key_is_hashed() {
        let long = "x".repeat(250);
        let key = cache_key("search", &[&long], &[]);
        assert!(key.starts_with("search:"));
        assert_eq!(key.len(), "search:".len() + 64);
        assert_eq!(key, cache_key("search", &[&long], &[]));
    }

    #[test]
    fn test_api_key_drops_volatile_params() {
        let mut params = BTreeMap::new();
        params.insert("nocache".to_string(), "1".to_string());
        params.insert("t".to_string(), "123".to_string());
        assert_eq!(api_key("tasks.board", &params, Some("u1")), "user_u1:api:tasks.board");

        params.insert("project".to_string(), "p9".to_string());
        assert_eq!(
            api_key("tasks.board", &params, None),
            "api:tasks.board:project:p9"
        );
        assert_eq!(query_key("Task", &BTreeMap::new(), Some("u2")), "user_u2:query:Task");
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("user_1:*", "user_1:api:tasks"));
        assert!(!glob_match("user_1:*", "user_12:api:tasks"));
        assert!(glob_match("user_*:api:tasks.*", "user_9:api:tasks.board"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("api:x", "api:xy"));
        assert!(glob_match("api:x*", "api:x"));
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let store = CacheStore::default();
        let value = json!({"title": "Write report", "tags": ["a", "b"], "score": 1.5, "done": false});
        assert!(store.set("k", &value, None).await);
        assert_eq!(store.get_value("k").await, Some(value));
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let store = CacheStore::default();
        store.set("short", &json!(1), Some(Duration::from_millis(10))).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get_value("short").await.is_none());
        assert_eq!(store.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn test_delete_pattern_removes_prefix() {
        let store = CacheStore::default();
        store.set("user_1:api:tasks.board", &json!([]), None).await;
        store.set("user_1:api:tasks.statistics", &json!({}), None).await;
        store.set("user_2:api:tasks.board", &json!([]), None).await;

        assert_eq!(store.delete_pattern("user_1:*").await, 2);
        assert!(store.get_value("user_1:api:tasks.board").await.is_none());
        assert!(store.get_value("user_2:api:tasks.board").await.is_some());
    }

    #[tokio::test]
    async fn test_get_or_set_runs_producer_once() {
        let store = CacheStore::default();
        let first: Result<i32, ()> = store.get_or_set("n", None, || async { Ok(7) }).await;
        let second: Result<i32, ()> = store.get_or_set("n", None, || async { Ok(99) }).await;
        assert_eq!(first, Ok(7));
        assert_eq!(second, Ok(7));
    }

    #[test]
    fn test_ttl_categories() {
        let ttl = CacheTtl::default();
        assert_eq!(ttl.for_category("weather"), Duration::from_secs(600));
        assert_eq!(ttl.for_category("unknown"), Duration::from_secs(300));
    }
}
