//! Administrative streaming feeds over the broadcast hubs.
//!
//! `Logging` forwards audit events as they arrive. `Statistics` folds
//! invocation records into a window and emits one snapshot per tick. Both
//! run a forwarding task per call that deregisters from its bus when the
//! client goes away or the bus shuts down.

use crate::context::GatewayContext;
use crate::stats::{unix_nanos, StatWindow};
use proto_gen::gateway::admin_server::Admin;
use proto_gen::gateway::{Event, Nothing, Stat, StatInterval};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::debug;

/// Per-call outbound queue depth between the forwarding task and tonic.
const OUTBOUND_BUFFER: usize = 16;

/// Ceiling on the snapshot period (one century). Periods beyond this never
/// tick within a subscription's lifetime anyway; the clamp keeps deadline
/// arithmetic from overflowing on arbitrary `u64` input.
const MAX_TICK_PERIOD: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 100);

pub struct AdminGrpcService {
    context: GatewayContext,
}

impl AdminGrpcService {
    #[must_use]
    pub fn new(context: GatewayContext) -> Self {
        Self { context }
    }
}

#[tonic::async_trait]
impl Admin for AdminGrpcService {
    type LoggingStream = ReceiverStream<Result<Event, Status>>;

    async fn logging(
        &self,
        _request: Request<Nothing>,
    ) -> Result<Response<Self::LoggingStream>, Status> {
        let mut subscription = self
            .context
            .log_bus
            .subscribe()
            .await
            .map_err(|_| Status::unavailable("server is shutting down"))?;

        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        tokio::spawn(async move {
            let id = subscription.id();
            loop {
                tokio::select! {
                    item = subscription.recv() => match item {
                        Some(event) => {
                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        // Bus shut down or this subscription was
                        // disconnected for lagging; end the stream cleanly.
                        None => break,
                    },
                    // Watch the outbound side too, so an idle stream whose
                    // client vanished deregisters promptly.
                    () = tx.closed() => break,
                }
            }
            subscription.unsubscribe().await;
            debug!(target: "gateway.admin", id, "Logging stream ended");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type StatisticsStream = ReceiverStream<Result<Stat, Status>>;

    async fn statistics(
        &self,
        request: Request<StatInterval>,
    ) -> Result<Response<Self::StatisticsStream>, Status> {
        let interval_seconds = request.into_inner().interval_seconds;
        if interval_seconds == 0 {
            return Err(Status::invalid_argument("interval_seconds must be positive"));
        }
        let period = Duration::from_secs(interval_seconds).min(MAX_TICK_PERIOD);

        let mut subscription = self
            .context
            .stat_bus
            .subscribe()
            .await
            .map_err(|_| Status::unavailable("server is shutting down"))?;

        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        tokio::spawn(async move {
            let id = subscription.id();
            let mut window = StatWindow::default();
            // First snapshot one full period after subscription, not
            // immediately.
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    item = subscription.recv() => match item {
                        Some(record) => window.record(&record),
                        None => break,
                    },
                    _ = ticker.tick() => {
                        let snapshot = window.take_snapshot(unix_nanos());
                        if tx.send(Ok(snapshot)).await.is_err() {
                            break;
                        }
                    }
                    () = tx.closed() => break,
                }
            }
            subscription.unsubscribe().await;
            debug!(target: "gateway.admin", id, "Statistics stream ended");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::acl::AccessControlTable;
    use crate::stats::InvocationRecord;
    use tokio_stream::StreamExt;

    fn test_context() -> GatewayContext {
        let acl = AccessControlTable::from_json("{}").unwrap();
        GatewayContext::new(acl)
    }

    fn event(consumer: &str, method: &str) -> Event {
        Event {
            timestamp: unix_nanos(),
            consumer: consumer.to_string(),
            method: method.to_string(),
            host: "127.0.0.1:1".to_string(),
        }
    }

    fn record(consumer: &str, method: &str) -> InvocationRecord {
        InvocationRecord {
            consumer: consumer.to_string(),
            method: method.to_string(),
            timestamp: unix_nanos(),
        }
    }

    #[tokio::test]
    async fn test_logging_forwards_events_in_order() {
        let context = test_context();
        let service = AdminGrpcService::new(context.clone());

        let mut stream = service
            .logging(Request::new(Nothing::default()))
            .await
            .unwrap()
            .into_inner();

        for method in ["/gateway.Biz/Check", "/gateway.Biz/Add"] {
            context.log_bus.publish(event("svc_a", method)).await.unwrap();
        }

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.method, "/gateway.Biz/Check");
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.method, "/gateway.Biz/Add");
    }

    #[tokio::test]
    async fn test_logging_stream_ends_on_bus_shutdown() {
        let context = test_context();
        let service = AdminGrpcService::new(context.clone());

        let mut stream = service
            .logging(Request::new(Nothing::default()))
            .await
            .unwrap()
            .into_inner();

        context.log_bus.shutdown().await;
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_logging_unavailable_after_shutdown() {
        let context = test_context();
        context.shutdown_buses().await;
        let service = AdminGrpcService::new(context);

        let status = service
            .logging(Request::new(Nothing::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[tokio::test]
    async fn test_statistics_rejects_zero_interval() {
        let context = test_context();
        let service = AdminGrpcService::new(context);

        let status = service
            .statistics(Request::new(StatInterval { interval_seconds: 0 }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_statistics_huge_interval_keeps_stream_open() {
        let context = test_context();
        let service = AdminGrpcService::new(context.clone());

        let mut stream = service
            .statistics(Request::new(StatInterval {
                interval_seconds: u64::MAX,
            }))
            .await
            .unwrap()
            .into_inner();

        context.stat_bus.publish(record("svc_a", "/gateway.Biz/Check")).await.unwrap();

        // No snapshot is due for a very long time; the stream stays open
        // rather than ending because the aggregation task died.
        let pending =
            tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_statistics_snapshots_then_resets() {
        let context = test_context();
        let service = AdminGrpcService::new(context.clone());

        let mut stream = service
            .statistics(Request::new(StatInterval { interval_seconds: 1 }))
            .await
            .unwrap()
            .into_inner();

        context.stat_bus.publish(record("svc_a", "/gateway.Biz/Check")).await.unwrap();
        context.stat_bus.publish(record("svc_a", "/gateway.Biz/Check")).await.unwrap();
        context.stat_bus.publish(record("svc_b", "/gateway.Biz/Add")).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(3), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first.by_method.get("/gateway.Biz/Check"), Some(&2));
        assert_eq!(first.by_method.get("/gateway.Biz/Add"), Some(&1));
        assert_eq!(first.by_consumer.get("svc_a"), Some(&2));
        assert_eq!(first.by_consumer.get("svc_b"), Some(&1));

        // Nothing published since: the next window is empty.
        let second = tokio::time::timeout(Duration::from_secs(3), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(second.by_method.is_empty());
        assert!(second.by_consumer.is_empty());
        assert!(second.timestamp > first.timestamp);
    }

    #[tokio::test]
    async fn test_statistics_stream_ends_on_bus_shutdown() {
        let context = test_context();
        let service = AdminGrpcService::new(context.clone());

        let mut stream = service
            .statistics(Request::new(StatInterval { interval_seconds: 60 }))
            .await
            .unwrap()
            .into_inner();

        context.stat_bus.shutdown().await;
        assert!(stream.next().await.is_none());
    }
}
