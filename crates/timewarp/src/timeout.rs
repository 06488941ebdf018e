// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;

use crate::error::ErrorKind;
use crate::{Delay, Error};

pin_project! {
    /// A future that races between an inner future and a clock [`Delay`].
    ///
    /// - If the inner future completes before the delay, the future's output is returned.
    /// - If the delay elapses before the inner future completes, an error of kind
    ///   [`ErrorKind::TimedOut`] is returned.
    ///
    /// Created by [`FutureExt::timeout`][crate::FutureExt::timeout].
    #[derive(Debug)]
    #[must_use = "futures do nothing unless polled"]
    pub struct Timeout<F> {
        #[pin]
        future: F,
        #[pin]
        deadline: Delay,
    }
}

impl<F> Timeout<F> {
    pub(super) const fn new(future: F, deadline: Delay) -> Self {
        Self { future, deadline }
    }
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.future.poll(cx) {
            Poll::Ready(v) => Poll::Ready(Ok(v)),
            Poll::Pending => match this.deadline.poll(cx) {
                Poll::Ready(_) => Poll::Ready(Err(Error::from_kind(ErrorKind::TimedOut))),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
