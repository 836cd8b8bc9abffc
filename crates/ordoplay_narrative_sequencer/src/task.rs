// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative suspension for traversal.
//!
//! Traversal runs as a tree of local futures polled once per tick with a
//! no-op waker. Anything that has to wait on the playhead yields and is
//! polled again on the next tick.

use futures::future::LocalBoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future that is pending exactly once
#[derive(Debug, Default)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Suspend until the next tick
pub fn yield_now() -> YieldNow {
    YieldNow::default()
}

/// Suspend, one tick at a time, until `condition` holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        yield_now().await;
    }
}

/// Poll a traversal future once. Returns true when it has finished.
pub fn poll_once(future: &mut LocalBoxFuture<'_, ()>) -> bool {
    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    future.as_mut().poll(&mut cx).is_ready()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_yield_takes_one_poll() {
        let mut future = async {
            yield_now().await;
            yield_now().await;
        }
        .boxed_local();

        assert!(!poll_once(&mut future));
        assert!(!poll_once(&mut future));
        assert!(poll_once(&mut future));
    }

    #[test]
    fn test_wait_until() {
        let flag = Rc::new(Cell::new(false));
        let observed = flag.clone();
        let mut future = async move { wait_until(|| observed.get()).await }.boxed_local();

        assert!(!poll_once(&mut future));
        assert!(!poll_once(&mut future));
        flag.set(true);
        assert!(poll_once(&mut future));
    }
}
