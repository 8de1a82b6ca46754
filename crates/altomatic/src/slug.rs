//! Filename slug generation.
//!
//! Converts model-suggested titles into filesystem-safe, hyphenated,
//! lowercase names and resolves collisions within a session.

use std::collections::HashSet;

use thiserror::Error;

/// Maximum slug length. Longer slugs are cut back to a word boundary.
pub const MAX_SLUG_LEN: usize = 80;

/// Fallback stem used when a title normalizes to nothing.
pub const FALLBACK_STEM: &str = "image";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SlugError {
    #[error("title is empty after normalization")]
    EmptyTitle,
}

/// Normalizes a free-text title into a slug: lowercase ASCII `[a-z0-9-]`,
/// single hyphens between words, no leading/trailing hyphen, at most
/// [`MAX_SLUG_LEN`] characters cut at a word boundary.
pub fn slugify(title: &str) -> Result<String, SlugError> {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for ch in title.trim().chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '-' || ch == '_' || ch == '.' || ch == '/' {
            pending_hyphen = true;
        }
        // Any other character (punctuation, non-ASCII) is dropped without
        // introducing a word break, matching how `&` or `'` sit inside words.
    }

    if slug.is_empty() {
        return Err(SlugError::EmptyTitle);
    }

    Ok(truncate_at_word_boundary(&slug, MAX_SLUG_LEN))
}

fn truncate_at_word_boundary(slug: &str, max_len: usize) -> String {
    if slug.len() <= max_len {
        return slug.to_string();
    }

    let head = &slug[..max_len];
    match head.rfind('-') {
        Some(cut) if cut > 0 => head[..cut].to_string(),
        _ => head.to_string(),
    }
}

/// Fallback name for a job whose title produced no usable slug.
pub fn fallback_stem(sequence: usize) -> String {
    format!("{}-{}", FALLBACK_STEM, sequence)
}

/// Tracks filename stems handed out during one session and resolves
/// collisions by appending `-2`, `-3`, and so on.
#[derive(Debug, Default)]
pub struct SlugAllocator {
    used: HashSet<String>,
}

impl SlugAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `base` unchanged when it is still free, otherwise the first
    /// `base-N` (N >= 2) that is. Does not mark the result as used.
    pub fn resolve(&self, base: &str) -> String {
        if !self.used.contains(base) {
            return base.to_string();
        }
        let mut counter = 2usize;
        loop {
            let candidate = format!("{}-{}", base, counter);
            if !self.used.contains(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Resolves `base` and marks the returned name as used.
    pub fn claim(&mut self, base: &str) -> String {
        let name = self.resolve(base);
        self.used.insert(name.clone());
        name
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}
