use std::collections::HashMap;

use parking_lot::Mutex;

/// One cached response body plus the validators needed for a conditional
/// GET on the next fetch.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub body: Vec<u8>,
}

/// In-memory conditional-GET cache keyed by request URL, grounded on
/// `api/client.py::get_bytes`.
#[derive(Default)]
pub struct HttpCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl HttpCache {
    pub fn new() -> Self {
        HttpCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, url: &str) -> Option<CacheEntry> {
        self.entries.lock().get(url).cloned()
    }

    pub fn put(&self, url: &str, entry: CacheEntry) {
        self.entries.lock().insert(url.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = HttpCache::new();
        cache.put(
            "http://x/y",
            CacheEntry {
                etag: Some("\"abc\"".into()),
                last_modified: None,
                body: vec![1, 2, 3],
            },
        );
        let entry = cache.get("http://x/y").unwrap();
        assert_eq!(entry.body, vec![1, 2, 3]);
    }
}
