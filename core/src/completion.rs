//! One-shot completion signal between the resolving and consuming threads.
//!
//! # Design
//! `Completion` is the write half and is consumed by `resolve`/`reject`, so an
//! operation cannot be resolved twice. If a `Completion` is dropped without
//! being resolved (the host dropped its callback, a main-thread task panicked)
//! the consumer sees `FetchError::Abandoned` instead of waiting forever.
//!
//! `Fetch` can be awaited from any async runtime, polled with `try_take` from a
//! frame loop, or blocked on with `wait` from a plain thread.

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::sync::oneshot;

use crate::error::FetchError;
use crate::http::CompletedRequest;

pub type FetchResult = Result<CompletedRequest, FetchError>;

/// Create a linked `Completion` / `Fetch` pair.
pub fn completion_pair() -> (Completion, Fetch) {
    let (tx, rx) = oneshot::channel();
    (
        Completion { tx },
        Fetch {
            state: FetchState::Pending(rx),
        },
    )
}

/// Resolving half of an operation's outcome.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<FetchResult>,
}

impl Completion {
    pub fn resolve(self, completed: CompletedRequest) {
        self.settle(Ok(completed));
    }

    pub fn reject(self, error: FetchError) {
        self.settle(Err(error));
    }

    pub fn settle(self, result: FetchResult) {
        if self.tx.send(result).is_err() {
            tracing::trace!("fetch handle dropped before completion");
        }
    }
}

#[derive(Debug)]
enum FetchState {
    Ready(FetchResult),
    Pending(oneshot::Receiver<FetchResult>),
    Taken,
}

/// Pending outcome of one bridge operation.
#[derive(Debug)]
#[must_use = "a Fetch does nothing unless its result is observed"]
pub struct Fetch {
    state: FetchState,
}

impl Fetch {
    /// A handle that is already resolved.
    pub fn ready(result: FetchResult) -> Self {
        Self {
            state: FetchState::Ready(result),
        }
    }

    /// Take the outcome if it is available. Returns `None` while pending and
    /// after the outcome has been taken.
    pub fn try_take(&mut self) -> Option<FetchResult> {
        match std::mem::replace(&mut self.state, FetchState::Taken) {
            FetchState::Ready(result) => Some(result),
            FetchState::Pending(mut rx) => match rx.try_recv() {
                Ok(result) => Some(result),
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.state = FetchState::Pending(rx);
                    None
                }
                Err(oneshot::error::TryRecvError::Closed) => Some(Err(FetchError::Abandoned)),
            },
            FetchState::Taken => None,
        }
    }

    /// Block the current thread until the outcome arrives.
    ///
    /// Must not be called from inside an async runtime, and must not be called
    /// on the affinity thread while that thread is the one expected to drain
    /// the main-thread queue.
    pub fn wait(self) -> FetchResult {
        match self.state {
            FetchState::Ready(result) => result,
            FetchState::Pending(rx) => rx.blocking_recv().unwrap_or(Err(FetchError::Abandoned)),
            FetchState::Taken => Err(FetchError::Abandoned),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, FetchState::Pending(_))
    }
}

impl Future for Fetch {
    type Output = FetchResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let FetchState::Pending(rx) = &mut this.state {
            let received = ready!(Pin::new(rx).poll(cx));
            this.state = FetchState::Taken;
            return Poll::Ready(received.unwrap_or(Err(FetchError::Abandoned)));
        }
        match std::mem::replace(&mut this.state, FetchState::Taken) {
            FetchState::Ready(result) => Poll::Ready(result),
            _ => panic!("`Fetch` polled after completion"),
        }
    }
}
