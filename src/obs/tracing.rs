// self
use crate::{
	_prelude::*,
	obs::{FlowKind, FlowOutcome, record_flow_outcome},
};

/// Future returned by [`FlowSpan::instrument`]; a passthrough when tracing is disabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`FlowSpan::instrument`]; a passthrough when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// One observed run of a session flow at a named stage.
///
/// Outcomes reported through [`FlowSpan::record`] feed the flow counter and, once terminal,
/// the span's `outcome` field.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	kind: FlowKind,
	stage: &'static str,
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for `kind` at `stage`.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"tab_session.flow",
				flow = kind.as_str(),
				stage,
				outcome = tracing::field::Empty
			);

			Self { kind, stage, span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			Self { kind, stage }
		}
	}

	/// Flow this span observes.
	pub fn kind(&self) -> FlowKind {
		self.kind
	}

	/// Stage label the span was opened with.
	pub fn stage(&self) -> &'static str {
		self.stage
	}

	/// Reports `outcome` for this run.
	pub fn record(&self, outcome: FlowOutcome) {
		record_flow_outcome(self.kind, self.stage, outcome);

		#[cfg(feature = "tracing")]
		{
			if outcome != FlowOutcome::Attempt {
				self.span.record("outcome", outcome.as_str());
			}
		}
	}

	/// Reports the terminal outcome carried by `result`.
	pub fn finish<T, E>(&self, result: &std::result::Result<T, E>) {
		self.record(if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure });
	}

	/// Runs a synchronous section inside the span.
	pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
		#[cfg(feature = "tracing")]
		{
			self.span.in_scope(f)
		}
		#[cfg(not(feature = "tracing"))]
		{
			f()
		}
	}

	/// Instruments an async section without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scoped_sections_return_their_value() {
		let span = FlowSpan::new(FlowKind::CrossTab, "pump");

		assert_eq!(span.in_scope(|| 3), 3);
		assert_eq!(span.kind(), FlowKind::CrossTab);
		assert_eq!(span.stage(), "pump");
	}

	#[tokio::test]
	async fn outcomes_can_be_recorded_after_instrumented_sections() {
		let span = FlowSpan::new(FlowKind::Refresh, "renew");
		let result: std::result::Result<u8, ()> = span.instrument(async { Ok(7) }).await;

		span.record(FlowOutcome::Attempt);
		span.finish(&result);

		assert_eq!(result, Ok(7));
	}
}
