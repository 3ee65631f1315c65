//! Storage key layout (bit-exact, spec §6):
//! `u/{userId}/{yyyy}/{mm}/{dd}/{ulid}_{slug}`
//!
//! `ulid` is lexicographically sortable and unique across concurrent
//! writers (property 7: uniqueness across 100 simultaneous generations of
//! the same filename); `slug` is the original filename lowercased,
//! non-alphanumerics collapsed to `-`, clipped to <=60 chars, `unnamed`
//! when empty.

use chrono::{DateTime, Utc};
use ulid::Ulid;
use uuid::Uuid;

const MAX_SLUG_LEN: usize = 60;

/// Lowercase, collapse non-alphanumerics to `-`, trim repeats/edges, clip.
pub fn slugify(filename: &str) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _ext)| stem)
        .unwrap_or(filename);

    let mut slug = String::with_capacity(stem.len());
    let mut last_was_dash = false;
    for ch in stem.chars().flat_map(|c| c.to_lowercase()) {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        return "unnamed".to_string();
    }

    if slug.len() > MAX_SLUG_LEN {
        let mut clipped: String = slug.chars().take(MAX_SLUG_LEN).collect();
        while clipped.ends_with('-') {
            clipped.pop();
        }
        if clipped.is_empty() {
            return "unnamed".to_string();
        }
        return clipped;
    }

    slug
}

/// Build the bit-exact storage key for a fresh upload.
pub fn build_key(user_id: Uuid, ingested_at: DateTime<Utc>, filename: &str) -> String {
    let ulid = Ulid::new();
    let slug = slugify(filename);
    format!(
        "u/{user_id}/{yyyy:04}/{mm:02}/{dd:02}/{ulid}_{slug}",
        user_id = user_id,
        yyyy = ingested_at.format("%Y").to_string().parse::<u32>().unwrap_or(0),
        mm = ingested_at.format("%m").to_string().parse::<u32>().unwrap_or(0),
        dd = ingested_at.format("%d").to_string().parse::<u32>().unwrap_or(0),
        ulid = ulid,
        slug = slug,
    )
}
