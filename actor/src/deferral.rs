// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Deferral
//!
//! Single-resolution future backing `query`.
//!

use crate::Error;

use tokio::sync::oneshot;

use std::{
    any::Any,
    sync::{Arc, Mutex, PoisonError},
};

/// A value that can be settled exactly once, by `resolve` or by `reject`.
///
/// The receiving half is returned by [`Deferral::new`]. Settling a second time is a no-op,
/// and dropping an unsettled deferral makes the receiver observe `Error::Receive`.
pub(crate) struct Deferral<T> {
    sender: Mutex<Option<oneshot::Sender<Result<T, Error>>>>,
}

impl<T: Send + 'static> Deferral<T> {
    pub(crate) fn new() -> (Self, DeferralReceiver<T>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(sender)),
            },
            DeferralReceiver { receiver },
        )
    }

    /// Settles the deferral with a value. Returns false if it was already settled.
    pub(crate) fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles the deferral with an error. Returns false if it was already settled.
    pub(crate) fn reject(&self, error: Error) -> bool {
        self.settle(Err(error))
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn settle(&self, result: Result<T, Error>) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => {
                // The caller may have given up already; the deferral is settled anyway.
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }
}

/// A deferral as stored in the temporary-reference table of a system.
pub(crate) trait Pending: Send + Sync + 'static {
    /// Rejects the deferral when its table goes away.
    fn cancel(&self, error: Error);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + 'static> Pending for Deferral<T> {
    fn cancel(&self, error: Error) {
        self.reject(error);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Receiving half of a [`Deferral`].
pub(crate) struct DeferralReceiver<T> {
    receiver: oneshot::Receiver<Result<T, Error>>,
}

impl<T> DeferralReceiver<T> {
    pub(crate) async fn wait(self) -> Result<T, Error> {
        self.receiver.await.map_err(|_| {
            Error::Receive("deferral dropped before it was settled".to_owned())
        })?
    }
}
