use futures::io::AsyncRead;
use pin_project_lite::pin_project;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

pin_project! {
    /// Ends a byte stream with an error as soon as the token is cancelled,
    /// even while a read is pending.
    pub(crate) struct Cancellable<R> {
        #[pin]
        inner: R,
        token: CancellationToken,
        #[pin]
        cancelled: WaitForCancellationFutureOwned,
    }
}
impl<R> Cancellable<R> {
    pub(crate) fn new(inner: R, token: CancellationToken) -> Self {
        Self { inner, cancelled: token.clone().cancelled_owned(), token }
    }
}
impl<R: AsyncRead> AsyncRead for Cancellable<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        let this = self.project();
        if this.token.is_cancelled() || this.cancelled.poll(cx).is_ready() {
            return Poll::Ready(Err(io::Error::other("install cancelled")));
        }
        this.inner.poll_read(cx, buf)
    }
}
