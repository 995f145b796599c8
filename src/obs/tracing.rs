// self
use crate::{
	_prelude::*,
	obs::FlowKind,
	store::{ChangeReason, StoreError},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by session flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("session_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
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

/// Logs a failure that a best-effort flow swallows instead of returning.
pub fn log_swallowed(kind: FlowKind, error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(flow = kind.as_str(), error = %error, "session flow failed; continuing");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, error);
	}
}

/// Logs a durable-storage failure; the in-memory session state is still updated.
pub fn log_storage_failure(key: &str, error: &StoreError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(key, error = %error, "token storage operation failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (key, error);
	}
}

/// Logs a session clear.
pub fn log_clear(reason: ChangeReason) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(reason = reason.as_str(), "clearing session tokens");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = reason;
	}
}

/// Logs the interceptor's decision for a `401` response.
pub fn log_unauthorized(path: &str, decision: &'static str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(path, decision, "request was rejected with 401");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (path, decision);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn log_helpers_accept_every_reason() {
		for reason in [ChangeReason::Set, ChangeReason::Logout, ChangeReason::Expired] {
			log_clear(reason);
		}

		log_storage_failure("access_token", &StoreError::Backend { message: "offline".into() });
		log_unauthorized("orders/", "refresh");
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
