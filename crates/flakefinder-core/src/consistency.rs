//! Stale-build filter for pull request runs.
//!
//! A PR build only counts if it tested the PR's current head commit.
//! `started.json` records which revisions were checked out.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::source::PullRequest;

/// The part of a build's `started.json` the filter reads.
#[derive(Debug, Clone, Deserialize)]
pub struct StartedMetadata {
    #[serde(default)]
    pub timestamp: i64,
    /// `org/repo` → comma-separated `<ref>:<sha>` entries.
    #[serde(default)]
    pub repos: BTreeMap<String, String>,
}

impl StartedMetadata {
    /// Whether any checked-out revision is exactly `<number>:<sha>`.
    pub fn tested_commit(&self, number: u64, sha: &str) -> bool {
        let wanted = format!("{number}:{sha}");
        self.repos
            .values()
            .flat_map(|revisions| revisions.split(','))
            .any(|entry| entry.trim() == wanted)
    }
}

/// Whether the build described by `started_json` ran against `pr`'s head.
///
/// Metadata that cannot be parsed never matches.
pub fn is_latest_commit(started_json: &[u8], pr: &PullRequest) -> bool {
    match serde_json::from_slice::<StartedMetadata>(started_json) {
        Ok(started) => started.tested_commit(pr.number, &pr.head.sha),
        Err(e) => {
            debug!(pr = pr.number, error = %e, "unreadable started.json");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(revisions: &str) -> Vec<u8> {
        format!(r#"{{"timestamp": 1566518400, "repos": {{"kubevirt/kubevirt": "{revisions}"}}}}"#)
            .into_bytes()
    }

    #[test]
    fn matches_current_head() {
        let pr = PullRequest::new(17, "abc123");
        assert!(is_latest_commit(&started("master:0f0f0f,17:abc123"), &pr));
        assert!(is_latest_commit(&started("17:abc123"), &pr));
    }

    #[test]
    fn rejects_stale_head() {
        let pr = PullRequest::new(17, "def456");
        assert!(!is_latest_commit(&started("master:0f0f0f,17:abc123"), &pr));
    }

    #[test]
    fn requires_exact_entry() {
        let pr = PullRequest::new(7, "abc123");
        assert!(!is_latest_commit(&started("17:abc123"), &pr));

        let pr = PullRequest::new(17, "abc");
        assert!(!is_latest_commit(&started("17:abc123"), &pr));

        let pr = PullRequest::new(17, "abc123");
        assert!(is_latest_commit(&started("master:0f0f0f, 17:abc123 "), &pr));
    }

    #[test]
    fn unreadable_metadata_never_matches() {
        let pr = PullRequest::new(17, "abc123");
        assert!(!is_latest_commit(b"17:abc123", &pr));
        assert!(!is_latest_commit(b"", &pr));
        assert!(!is_latest_commit(br#"{"repos": {}}"#, &pr));
    }
}
