use crate::delivery::{self, DeliveryError, RetryPolicy};
use crate::dsn::Endpoint;
use crate::encoder::{Arg, Message};
use crate::logger::Logger;
use crate::queue::Inbox;
use crate::throttle::{AdaptiveDelay, ThrottleConfig};
use crate::transport::Transport;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The single consumer of a client's mailbox.
///
/// Runs until `shutdown` is cancelled; a delivery in progress is abandoned
/// and whatever is still queued is dropped. `terminated` is cancelled
/// exactly once when `run` returns, or when the task is torn down.
pub(crate) struct Worker {
    pub(crate) inbox: Inbox,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) endpoint: Arc<Endpoint>,
    pub(crate) retry: RetryPolicy,
    pub(crate) delay: AdaptiveDelay,
    pub(crate) fallback: Option<Arc<dyn Logger>>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) terminated: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        inbox: Inbox,
        transport: Arc<dyn Transport>,
        endpoint: Arc<Endpoint>,
        retry: RetryPolicy,
        throttle: ThrottleConfig,
        fallback: Option<Arc<dyn Logger>>,
    ) -> Self {
        Self {
            inbox,
            transport,
            endpoint,
            retry,
            delay: AdaptiveDelay::new(throttle),
            fallback,
            shutdown: CancellationToken::new(),
            terminated: CancellationToken::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        let _terminated = self.terminated.clone().drop_guard();
        let shutdown = self.shutdown.clone();
        debug!(target: "raven", endpoint = %self.endpoint.url, "delivery loop started");

        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.inbox.recv() => match received {
                    Some(message) => message,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = self.handle(message) => {}
            }

            let pause = self.delay.current();
            if !pause.is_zero() {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = sleep(pause) => {}
                }
            }
        }

        debug!(target: "raven", dropped = self.inbox.len(), "delivery loop stopped");
    }

    /// Deliver one message and fold the outcome into the adaptive delay.
    pub(crate) async fn handle(&mut self, message: Message) {
        let result =
            delivery::send(self.transport.as_ref(), &self.endpoint, &self.retry, &message).await;
        match result {
            Ok(()) => self.delay.on_success(),
            Err(err) => {
                if err == DeliveryError::Throttled {
                    self.delay.on_throttled();
                    debug!(target: "raven", delay = ?self.delay.current(), "throttled by server");
                }
                self.report(&message, &err);
            }
        }
    }

    fn report(&self, message: &Message, err: &DeliveryError) {
        if let Some(log) = &self.fallback {
            log.printf(
                "raven failed to send message {}: {}",
                &[Arg::value(format!("{:?}", message.text)), Arg::value(err)],
            );
        }
    }
}
