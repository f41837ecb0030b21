//! Payload audit trail.
//!
//! Every received and every parsed payload is written hex-encoded to the
//! `trackport::audit` target so it can be routed to its own sink.

use tracing::{debug, enabled, Level};

use crate::registry::ConnectionId;

pub const AUDIT_TARGET: &str = "trackport::audit";

/// Where in the pipeline the payload was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStage {
    Receive,
    Parse,
}

impl AuditStage {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStage::Receive => "receive",
            AuditStage::Parse => "parse",
        }
    }
}

pub fn payload(stage: AuditStage, conn_id: Option<ConnectionId>, tracker: Option<&str>, bytes: &[u8]) {
    if !enabled!(target: AUDIT_TARGET, Level::DEBUG) {
        return;
    }
    debug!(
        target: AUDIT_TARGET,
        stage = stage.as_str(),
        conn_id,
        tracker,
        len = bytes.len(),
        payload = %hex::encode(bytes),
        "payload"
    );
}
