// src/engine/attachment.rs

//! Host <-> boundary coupling.
//!
//! Each host activity with attached boundary events gets one `Attachment`
//! record, owned by the core. Boundaries never reference their host (or the
//! other way around); every cross-instance effect goes through here:
//!
//! - host starts running: arm every boundary
//! - host terminates (complete / cancel / discard): discard every boundary
//!   that has not fired yet, which cancels its timer
//! - interrupting boundary fires: cancel the host and discard its outbound
//!   flows, then let the boundary take its own outbound
//! - non-interrupting boundary fires: host untouched

use tracing::{debug, info};

use crate::activity::ActivityState;
use crate::engine::propagation::{Execution, OutboundPolicy};
use crate::errors::Result;
use crate::types::NodeId;

#[derive(Debug, Clone)]
pub struct Attachment {
    host: NodeId,
    boundaries: Vec<NodeId>,
}

impl Attachment {
    pub fn new(host: impl Into<NodeId>, boundaries: Vec<NodeId>) -> Self {
        Self {
            host: host.into(),
            boundaries,
        }
    }

    /// Host moved Entered -> Running.
    pub(crate) fn on_host_running(&self, exec: &mut Execution<'_>) -> Result<()> {
        for boundary in &self.boundaries {
            let state = exec.instance(boundary)?.state();
            if !state.can_enter() {
                debug!(host = %self.host, boundary = %boundary, %state, "boundary still active; not re-arming");
                continue;
            }
            debug!(host = %self.host, boundary = %boundary, "arming boundary");
            exec.enter_and_run(boundary, None)?;
        }
        Ok(())
    }

    /// Host reached a terminal state. Boundaries that have not fired are
    /// discarded, whatever their `cancelActivity`.
    pub(crate) fn on_host_terminated(&self, exec: &mut Execution<'_>) -> Result<()> {
        for boundary in &self.boundaries {
            let state = exec.instance(boundary)?.state();
            if matches!(
                state,
                ActivityState::Armed
                    | ActivityState::Entered
                    | ActivityState::Running
                    | ActivityState::Waiting
            ) {
                debug!(host = %self.host, boundary = %boundary, "host terminated; discarding boundary");
                exec.discard_node(boundary)?;
            }
        }
        Ok(())
    }

    /// A boundary's trigger fired (timer elapsed or early signal).
    pub(crate) fn on_boundary_fired(&self, exec: &mut Execution<'_>, boundary: &str) -> Result<()> {
        let interrupting = exec.instance(boundary)?.cancel_activity();

        // The boundary is Ended before the host is canceled, so the host's
        // termination does not discard it along with its siblings.
        exec.begin_completion(boundary)?;

        if interrupting {
            info!(host = %self.host, boundary = %boundary, "interrupting boundary fired; canceling host");
            exec.cancel_node(&self.host, OutboundPolicy::Discard)?;
        } else {
            info!(host = %self.host, boundary = %boundary, "non-interrupting boundary fired");
        }

        exec.finish_completion(boundary)
    }

    /// Explicit cancel addressed to a boundary.
    pub(crate) fn cancel_boundary(&self, exec: &mut Execution<'_>, boundary: &str) -> Result<bool> {
        exec.cancel_node(boundary, OutboundPolicy::Silent)
    }

    /// Explicit discard addressed to a boundary, or a failed timer arm.
    pub(crate) fn discard_boundary(&self, exec: &mut Execution<'_>, boundary: &str) -> Result<()> {
        exec.discard_node(boundary)
    }
}
