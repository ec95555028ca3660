use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identifies where a batch's attachments land and who asked for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachTarget {
    pub module_id: u64,
    pub target_id: u64,
    pub actor_id: u64,
}

/// Per-module upload limits. 0 means unlimited.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SizePolicy {
    pub single_limit_bytes: u64,
    pub total_limit_bytes: u64,
}

impl SizePolicy {
    pub fn single_exceeded(&self, file_size: u64) -> bool {
        self.single_limit_bytes != 0 && file_size > self.single_limit_bytes
    }

    pub fn total_exceeded(&self, attached_total: u64, file_size: u64) -> bool {
        self.total_limit_bytes != 0 && attached_total.saturating_add(file_size) > self.total_limit_bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    /// Path or URL under which the registrar serves the file.
    pub filename: String,
}

/// Boundary to the host application's attachment registry. The pipeline
/// never touches storage directly.
pub trait AttachmentStore {
    /// Registers the spooled file under `suggested_name` and returns the
    /// stored filename used to rewrite the markup.
    fn register_attachment(
        &self,
        path: &Path,
        suggested_name: &str,
        target: &AttachTarget,
    ) -> Result<StoredAttachment>;

    /// Live byte total already attached to the target. Queried per
    /// candidate so registrations earlier in the same batch count.
    fn attached_total_size(&self, target_id: u64) -> Result<u64>;

    fn size_policy(&self, module_id: u64) -> Result<SizePolicy>;

    fn is_privileged_actor(&self, actor_id: u64) -> bool;

    /// Whether this pass runs inside an interactive request. Privilege is
    /// only honored when a session vouches for the actor.
    fn is_interactive_request(&self) -> bool;
}
