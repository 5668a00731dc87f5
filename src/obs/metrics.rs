// self
use crate::obs::{FlowKind, FlowOutcome};

/// Name of the counter incremented for every flow outcome.
pub const FLOW_COUNTER: &str = "tab_session_flow_total";

/// Increments [`FLOW_COUNTER`] on the global recorder, labeled by flow, stage, and outcome.
pub fn record_flow_outcome(kind: FlowKind, stage: &'static str, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			FLOW_COUNTER,
			"flow" => kind.as_str(),
			"stage" => stage,
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, stage, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recording_without_an_installed_recorder_is_a_no_op() {
		record_flow_outcome(FlowKind::Refresh, "renew", FlowOutcome::Attempt);
		record_flow_outcome(FlowKind::CrossTab, "pump", FlowOutcome::Failure);
	}
}
