//! Leading-edge, latest-wins stream throttling

use futures::Stream;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep, sleep};

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Emit at most one item per `period`.
    ///
    /// The first item passes through immediately and opens a quiet window.
    /// Items arriving inside the window replace each other; when the window
    /// closes the latest one is emitted and a new window opens. The final
    /// pending item is still delivered when the inner stream ends.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream returned by [`ThrottleExt::throttle`]
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        #[pin]
        window: Sleep,
        period: Duration,
        window_open: bool,
        latest: Option<S::Item>,
        exhausted: bool,
    }
}

impl<S: Stream> Throttle<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        Self {
            stream,
            window: sleep(Duration::ZERO),
            period,
            window_open: false,
            latest: None,
            exhausted: false,
        }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.exhausted {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.latest = Some(item),
                Poll::Ready(None) => *this.exhausted = true,
                Poll::Pending => break,
            }
        }

        if *this.window_open {
            match this.window.as_mut().poll(cx) {
                Poll::Ready(()) => *this.window_open = false,
                Poll::Pending if *this.exhausted && this.latest.is_none() => {
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        match this.latest.take() {
            Some(item) => {
                this.window.as_mut().reset(Instant::now() + *this.period);
                *this.window_open = true;
                Poll::Ready(Some(item))
            }
            None if *this.exhausted => Poll::Ready(None),
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[tokio::test]
    async fn first_item_passes_immediately() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut throttled =
            Box::pin(UnboundedReceiverStream::new(rx).throttle(Duration::from_secs(60)));

        tx.send(1).unwrap();
        let first = tokio::time::timeout(Duration::from_millis(500), throttled.next()).await;
        assert_eq!(first.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn burst_collapses_to_latest() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut throttled =
            Box::pin(UnboundedReceiverStream::new(rx).throttle(Duration::from_millis(50)));

        tx.send(1).unwrap();
        assert_eq!(throttled.next().await, Some(1));

        for n in 2..=10 {
            tx.send(n).unwrap();
        }
        drop(tx);

        assert_eq!(throttled.next().await, Some(10));
        assert_eq!(throttled.next().await, None);
    }

    #[tokio::test]
    async fn window_delays_second_item() {
        let (tx, rx) = mpsc::unbounded_channel();
        let period = Duration::from_millis(80);
        let mut throttled = Box::pin(UnboundedReceiverStream::new(rx).throttle(period));

        tx.send("a").unwrap();
        let start = Instant::now();
        assert_eq!(throttled.next().await, Some("a"));
        tx.send("b").unwrap();
        assert_eq!(throttled.next().await, Some("b"));
        assert!(start.elapsed() >= period);
    }

    #[tokio::test]
    async fn empty_stream_ends() {
        let throttled = futures::stream::iter(Vec::<u8>::new()).throttle(Duration::from_millis(10));
        assert_eq!(throttled.collect::<Vec<_>>().await, Vec::<u8>::new());
    }
}
