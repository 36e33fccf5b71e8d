/// Task assignee resolution
///
/// Maps a task's `assigneeType` / `assigneeKey` pair to the user who will see
/// the task in their inbox.

use std::sync::Arc;

/// Assignee is the key itself
pub const ASSIGNEE_BY_NAME: &str = "ByAssigneeName";
/// Assignee is the parent company of the key
pub const ASSIGNEE_BY_PARENT_COMPANY: &str = "ByParentCompany";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssigneeType {
    ByName,
    ByParentCompany,
    Unrecognized,
}

impl AssigneeType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            ASSIGNEE_BY_NAME => AssigneeType::ByName,
            ASSIGNEE_BY_PARENT_COMPANY => AssigneeType::ByParentCompany,
            _ => AssigneeType::Unrecognized,
        }
    }
}

/// Organisation lookup used by `ByParentCompany`
pub trait CompanyDirectory: Send + Sync {
    fn parent_company(&self, key: &str) -> String;
}

/// Directory where every key is its own parent company
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityDirectory;

impl CompanyDirectory for IdentityDirectory {
    fn parent_company(&self, key: &str) -> String {
        key.to_string()
    }
}

#[derive(Clone)]
pub struct AssignmentResolver {
    directory: Arc<dyn CompanyDirectory>,
    default_assignee: String,
}

impl std::fmt::Debug for AssignmentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentResolver")
            .field("default_assignee", &self.default_assignee)
            .finish_non_exhaustive()
    }
}

impl AssignmentResolver {
    pub fn new(directory: Arc<dyn CompanyDirectory>, default_assignee: impl Into<String>) -> Self {
        Self { directory, default_assignee: default_assignee.into() }
    }

    pub fn resolve(&self, assignee_type: &str, assignee_key: &str) -> String {
        match AssigneeType::parse(assignee_type) {
            AssigneeType::ByName => assignee_key.to_string(),
            AssigneeType::ByParentCompany => self.directory.parent_company(assignee_key),
            AssigneeType::Unrecognized => {
                tracing::debug!(
                    "👤 Unrecognized assignee type '{}', falling back to '{}'",
                    assignee_type,
                    self.default_assignee
                );
                self.default_assignee.clone()
            }
        }
    }
}
