use std::collections::HashSet;

/// Drops repeated URLs, keeping the first occurrence of each in its original position.
pub fn dedup_urls<S: AsRef<str>>(urls: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .map(AsRef::as_ref)
        .filter(|url| seen.insert(*url))
        .map(str::to_string)
        .collect()
}
