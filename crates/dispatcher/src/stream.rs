//! 把 hot stream 桥接到 tokio channel，供异步消费者使用

use contracts::{Context, HotStream, Signal, SignalError, Subscriber, Subscription};
use std::sync::Arc;
use tokio::sync::mpsc;

struct ChannelSubscriber<T> {
    tx: mpsc::UnboundedSender<Signal<T>>,
    context: Context,
}

impl<T: Send + Sync> Subscriber<T> for ChannelSubscriber<T> {
    fn on_next(&self, value: T) {
        // 接收端已关闭：消费者不再监听，忽略
        let _ = self.tx.send(Signal::Next(value));
    }

    fn on_complete(&self) {
        let _ = self.tx.send(Signal::Complete);
    }

    fn on_error(&self, error: SignalError) {
        let _ = self.tx.send(Signal::Error(error));
    }

    fn context(&self) -> Context {
        self.context.clone()
    }
}

/// 无界 demand 的 channel 订阅
pub trait ChannelSubscribe<T> {
    fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<Signal<T>>) {
        self.subscribe_channel_with(Context::empty())
    }

    fn subscribe_channel_with(
        &self,
        context: Context,
    ) -> (Subscription, mpsc::UnboundedReceiver<Signal<T>>);
}

impl<T: Send + Sync + 'static> ChannelSubscribe<T> for HotStream<T> {
    fn subscribe_channel_with(
        &self,
        context: Context,
    ) -> (Subscription, mpsc::UnboundedReceiver<Signal<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber: Arc<dyn Subscriber<T>> = Arc::new(ChannelSubscriber { tx, context });
        (self.subscribe_unbounded(subscriber), rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{EmitResult, ManySink};

    use crate::spec::Sinks;

    #[tokio::test]
    async fn test_channel_receives_values_then_complete() {
        let sink = Sinks::many().multicast().on_backpressure_buffer::<u32>();
        let (_subscription, mut rx) = sink.as_stream().subscribe_channel();

        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(2), EmitResult::Ok);
        assert_eq!(sink.try_emit_complete(), EmitResult::Ok);

        assert!(matches!(rx.recv().await, Some(Signal::Next(1))));
        assert!(matches!(rx.recv().await, Some(Signal::Next(2))));
        assert!(matches!(rx.recv().await, Some(Signal::Complete)));
    }

    #[tokio::test]
    async fn test_channel_context_visible_to_sink() {
        let sink = Sinks::many().unicast().on_backpressure_buffer::<u32>();
        let context = Context::empty().put("tenant", "acme".to_string());
        let (_subscription, _rx) = sink.as_stream().subscribe_channel_with(context);

        let seen = sink.current_context();
        assert_eq!(seen.get::<String>("tenant").map(String::as_str), Some("acme"));
    }
}
