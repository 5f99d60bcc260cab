//! One outbound send attempt and its completion.
//!
//! A [`Call`] pairs a [`MessageRequest`] with a oneshot completion channel.
//! Whoever ends up owning the call - the gateway session on success, the
//! orchestrator when no session accepts it - completes it exactly once with
//! a [`Status`]. A call dropped before completion reports
//! [`Status::CANCELLED`] so the waiting caller is never left hanging.

use std::collections::HashMap;

use tokio::sync::oneshot;

use nara_protocol::{MessageRequest, Status};

/// Receiver side of a call completion.
///
/// Resolves to the final [`Status`] of the send attempt. Returns
/// [`Status::CANCELLED`] if the call was dropped without an explicit
/// completion.
pub struct CallCompletion {
    rx: oneshot::Receiver<Status>,
}

impl CallCompletion {
    /// Waits for the call to complete.
    pub async fn wait(self) -> Status {
        self.rx.await.unwrap_or(Status::CANCELLED)
    }
}

/// An outbound message plus its completion channel.
pub struct Call {
    request: MessageRequest,
    headers: Option<HashMap<String, String>>,
    complete_tx: Option<oneshot::Sender<Status>>,
}

impl Call {
    /// Creates a call for `request` and returns it with its completion
    /// handle.
    pub fn new(
        request: MessageRequest,
        headers: Option<HashMap<String, String>>,
    ) -> (Self, CallCompletion) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                request,
                headers,
                complete_tx: Some(tx),
            },
            CallCompletion { rx },
        )
    }

    /// The message this call carries.
    pub fn request(&self) -> &MessageRequest {
        &self.request
    }

    /// Per-call headers, if any.
    pub fn headers(&self) -> Option<&HashMap<String, String>> {
        self.headers.as_ref()
    }

    /// Completes the call with `status`. The receiver may have gone away;
    /// that is fine, completion is best-effort delivery.
    pub fn complete(mut self, status: Status) {
        if let Some(tx) = self.complete_tx.take() {
            let _ = tx.send(status);
        }
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        if let Some(tx) = self.complete_tx.take() {
            let _ = tx.send(Status::CANCELLED);
        }
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("namespace", &self.request.namespace)
            .field("name", &self.request.name)
            .field("pending", &self.complete_tx.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nara_protocol::StatusCode;

    fn request() -> MessageRequest {
        MessageRequest::new("ASR", "Recognize", serde_json::json!({}))
    }

    #[tokio::test]
    async fn complete_delivers_status() {
        let (call, completion) = Call::new(request(), None);
        call.complete(Status::OK);
        assert_eq!(completion.wait().await.code, StatusCode::Ok);
    }

    #[tokio::test]
    async fn dropped_call_reports_cancelled() {
        let (call, completion) = Call::new(request(), None);
        drop(call);
        assert_eq!(completion.wait().await.code, StatusCode::Cancelled);
    }
}
