//! Lazy progress stream returned by a streaming invocation.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::domain::ProgressEvent;

/// Finite, non-restartable sequence of progress events for one invocation,
/// read through [`futures::StreamExt`].
///
/// Ends after exactly one terminal (`done` or `error`) event. Dropping the
/// stream early does not stop the producer; the invocation still runs to
/// completion or timeout.
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    finished: bool,
}

impl ProgressStream {
    pub(super) fn new(rx: mpsc::UnboundedReceiver<ProgressEvent>) -> Self {
        Self {
            rx,
            finished: false,
        }
    }

    fn observe(&mut self, event: Option<ProgressEvent>) -> Option<ProgressEvent> {
        match event {
            Some(event) => {
                if event.is_terminal() {
                    self.finished = true;
                    self.rx.close();
                }
                Some(event)
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(event) => Poll::Ready(self.observe(event)),
            Poll::Pending => Poll::Pending,
        }
    }
}
