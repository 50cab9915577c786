use crate::engine::ScanToken;
use crate::error::ScanFailure;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

/// What every caller waiting on a scan eventually receives
pub type ScanReply = Result<String, ScanFailure>;

/// The caller's outstanding request for the next decoded value.
///
/// Callers that ask for a scan while one is pending join this request and
/// receive the same outcome, so one decoded code never yields two results.
#[derive(Debug)]
pub struct PendingScanRequest {
    token: ScanToken,
    started: Instant,
    waiters: Vec<oneshot::Sender<ScanReply>>,
}

impl PendingScanRequest {
    pub fn new(token: ScanToken) -> (Self, oneshot::Receiver<ScanReply>) {
        let (sender, receiver) = oneshot::channel();
        let request = Self {
            token,
            started: Instant::now(),
            waiters: vec![sender],
        };
        (request, receiver)
    }

    /// Cancellation handle; outcomes for any other token are stale
    pub fn token(&self) -> ScanToken {
        self.token
    }

    pub fn join(&mut self) -> oneshot::Receiver<ScanReply> {
        let (sender, receiver) = oneshot::channel();
        self.waiters.push(sender);
        debug!(
            "Joined pending scan {:?} ({} waiters)",
            self.token,
            self.waiters.len()
        );
        receiver
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Consume the request, handing `reply` to every waiter
    pub fn complete(self, reply: ScanReply) {
        for waiter in self.waiters {
            // A waiter that gave up has nothing left to notify
            let _ = waiter.send(reply.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_all_waiters_receive_one_outcome() {
        let (mut request, first) = PendingScanRequest::new(ScanToken(1));
        let second = request.join();
        assert_eq!(request.waiter_count(), 2);

        request.complete(Ok("code".to_string()));

        assert_eq!(first.await.unwrap(), Ok("code".to_string()));
        assert_eq!(second.await.unwrap(), Ok("code".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_waiter_does_not_block_others() {
        let (mut request, first) = PendingScanRequest::new(ScanToken(4));
        let second = request.join();
        drop(first);

        request.complete(Err(ScanFailure::canceled()));
        let reply = second.await.unwrap();
        assert_eq!(reply.unwrap_err().kind, ErrorKind::ScanCanceled);
    }
}
