//! Push webhook payload

use serde::{Deserialize, Serialize};

/// Push event payload, parsed once per request and never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Full ref, e.g. `refs/heads/main`
    #[serde(rename = "ref", default)]
    pub git_ref: String,

    #[serde(default)]
    pub repository: Repository,

    #[serde(default)]
    pub head_commit: HeadCommit,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub clone_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadCommit {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub message: String,
}

impl WebhookPayload {
    /// Required fields: ref, repository name, head commit id. An empty
    /// object parses but does not validate.
    pub fn validate(&self) -> Result<(), String> {
        if self.git_ref.is_empty() {
            return Err("missing ref".to_string());
        }
        if self.repository.name.is_empty() {
            return Err("missing repository.name".to_string());
        }
        if self.head_commit.id.is_empty() {
            return Err("missing head_commit.id".to_string());
        }
        Ok(())
    }

    /// Branch name, derived by stripping the `refs/heads/` prefix
    pub fn branch(&self) -> &str {
        self.git_ref.strip_prefix("refs/heads/").unwrap_or(&self.git_ref)
    }
}

/// Branch allow-list check. An empty list permits every branch; entries are
/// exact matches or, with a trailing `*`, prefix matches.
pub fn branch_allowed(branch: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    allowed.iter().any(|pattern| {
        if let Some(prefix) = pattern.strip_suffix('*') {
            branch.starts_with(prefix)
        } else {
            branch == pattern
        }
    })
}
