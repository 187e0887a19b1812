// Topic names and their canonical-path rules.
use std::fmt;

use crate::{Error, Result};

/// A publish/subscribe topic. Clients subscribe to topics and publish
/// messages on them; the broker distributes each publication to the clients
/// subscribed to its topic. A valid topic is a clean, absolute,
/// slash-separated path: `/a/b/c` is valid but `//a`, `a/b` and `/a/` are
/// not.
///
/// ```
/// use heron_common::Topic;
///
/// let topic = Topic::new("/sensors/door");
/// assert!(topic.check().is_ok());
/// assert!(Topic::new("sensors/door").check().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    // Construction never validates; call check() before trusting the value.
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns an error unless the topic is an absolute path already in its
    /// canonical clean form. The unclean error names the replacement.
    pub fn check(&self) -> Result<()> {
        if !self.0.starts_with('/') {
            return Err(self.std_err("it must start with a '/'".into()));
        }

        let cleaned = clean(&self.0);
        if self.0 != cleaned {
            return Err(self.std_err(format!("unclean, replace with {cleaned:?}")));
        }

        Ok(())
    }

    /// Progressively strips the last part of the topic path and returns the
    /// resulting chain, so `/a/b/c` yields `[/a/b/c, /a/b, /a, /]`.
    ///
    /// An invalid topic yields the single-element chain holding the input;
    /// callers are expected to have validated first but this degenerate case
    /// must not panic.
    pub fn ancestors(&self) -> Vec<Topic> {
        let mut chain = vec![self.clone()];

        if self.check().is_err() {
            return chain;
        }

        let mut current = self.0.clone();
        loop {
            let parent = parent_path(&current);
            if parent == current {
                break;
            }
            chain.push(Topic(parent.clone()));
            current = parent;
        }

        chain
    }

    // Standardised error for a problem with this topic.
    fn std_err(&self, reason: String) -> Error {
        Error::BadTopic {
            topic: self.0.clone(),
            reason,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(topic: &str) -> Self {
        Self::new(topic)
    }
}

impl From<String> for Topic {
    fn from(topic: String) -> Self {
        Self(topic)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lexically canonicalise a slash-separated path: collapse repeated slashes,
// drop "." segments, resolve ".." segments, strip any trailing slash. The
// root "/" is its own canonical form.
fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if !rooted {
                    // ".." above the root of a rooted path is discarded.
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

// Parent of a clean absolute path; the root is its own parent.
fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}
