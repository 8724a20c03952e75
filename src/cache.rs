//! Thread-local compilation cache for substitution patterns.
//!
//! Terminology runs apply the same ordered rule list to every document in
//! the invocation; caching the compiled regexes avoids recompiling the list
//! once per file. Capped at 256 entries; the cache is cleared wholesale when
//! full.

use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    static PATTERN_CACHE: RefCell<HashMap<String, Regex>> = RefCell::new(HashMap::new());
}

/// Get a compiled regex from the cache, compiling and inserting on miss.
///
/// Compilation failures are never cached, so a corrected rule file does not
/// need a process restart to take effect.
pub fn get_or_compile(pattern: &str) -> Result<Regex, regex::Error> {
    PATTERN_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(re) = cache.get(pattern) {
            return Ok(re.clone());
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Regex::new(pattern)?;
        cache.insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    })
}

/// Clear the cache (mainly for testing).
pub fn clear() {
    PATTERN_CACHE.with(|cache| cache.borrow_mut().clear());
}

/// Number of cached patterns on this thread.
pub fn size() -> usize {
    PATTERN_CACHE.with(|cache| cache.borrow().len())
}
