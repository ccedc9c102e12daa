//! Submitting a request and consuming the reply stream.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::types::WEB_SEARCH_NOTICE;
use crate::llm::error::LlmError;
use crate::llm::events::{LlmEvent, Reply};
use crate::llm::provider::{LlmBackend, LlmRequest};
use crate::progress::{ProgressReporter, QueryProgress};
use crate::speech::SpeechSink;

/// Submit `request` and wait for the completed reply.
///
/// Reports `Waiting` once submitted and `Receiving` on the first event.
/// Every wait is bounded by `timeout` and raced against `cancel`.
///
/// Returns `Ok(None)` when cancelled. The stream is dropped on every exit
/// path, which aborts the backend request.
///
/// # Errors
///
/// - [`LlmError::Timeout`] if submitting or any single event takes longer
///   than `timeout`
/// - [`LlmError::Response`] if the backend reports a failed reply
/// - [`LlmError::Stream`] if the stream ends without a completed reply
/// - any error returned by [`LlmBackend::submit`]
pub(crate) async fn receive_reply(
    backend: &dyn LlmBackend,
    request: &LlmRequest,
    timeout: Duration,
    cancel: &CancellationToken,
    progress: &ProgressReporter,
    speech: &dyn SpeechSink,
) -> Result<Option<Reply>, LlmError> {
    let submitted = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(None),
        submitted = tokio::time::timeout(timeout, backend.submit(request)) => submitted,
    };
    let mut stream = submitted.map_err(|_| {
        LlmError::Timeout(format!(
            "{} did not accept the request within {}s",
            backend.name(),
            timeout.as_secs()
        ))
    })??;
    progress.report(QueryProgress::Waiting);

    let mut received_any = false;
    let mut announced_search = false;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("reply stream cancelled");
                return Ok(None);
            }
            next = tokio::time::timeout(timeout, stream.next()) => next,
        };
        let event = match next {
            Ok(Some(event)) => event,
            Ok(None) => {
                return Err(LlmError::Stream(
                    "reply stream ended without completion".into(),
                ));
            }
            Err(_) => {
                return Err(LlmError::Timeout(format!(
                    "no reply event from {} for {}s",
                    backend.name(),
                    timeout.as_secs()
                )));
            }
        };

        if !received_any {
            received_any = true;
            progress.report(QueryProgress::Receiving);
        }

        match event {
            LlmEvent::Completed { reply } => return Ok(Some(reply)),
            LlmEvent::Failed { reason } => return Err(LlmError::Response(reason)),
            LlmEvent::WebSearch { status } => {
                tracing::debug!(%status, "backend web search");
                if !announced_search {
                    announced_search = true;
                    speech.speak(WEB_SEARCH_NOTICE, true);
                }
                speech.progress_tick();
            }
            LlmEvent::ReasoningDelta { .. } => speech.progress_tick(),
            LlmEvent::ToolCall {
                call_id,
                function_name,
            } => {
                tracing::debug!(%call_id, %function_name, "model started a tool call");
            }
            LlmEvent::TextDelta { .. } | LlmEvent::RefusalDelta { .. } => {}
        }
    }
}
