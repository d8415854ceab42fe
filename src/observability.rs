use biometrics::{Collector, Counter, Moments};

pub(crate) static SESSION_SUBMITS: Counter = Counter::new("shishan.session.submits");
pub(crate) static SESSION_REJECTED_EMPTY: Counter = Counter::new("shishan.session.rejected_empty");
pub(crate) static SESSION_REJECTED_BUSY: Counter = Counter::new("shishan.session.rejected_busy");
pub(crate) static SESSION_STALE_EVENTS: Counter = Counter::new("shishan.session.stale_events");

pub(crate) static EXCHANGE_COMPLETED: Counter = Counter::new("shishan.exchange.completed");
pub(crate) static EXCHANGE_EMPTY: Counter = Counter::new("shishan.exchange.empty");
pub(crate) static EXCHANGE_CANCELLED: Counter = Counter::new("shishan.exchange.cancelled");
pub(crate) static EXCHANGE_TIMED_OUT: Counter = Counter::new("shishan.exchange.timed_out");
pub(crate) static EXCHANGE_ERRORED: Counter = Counter::new("shishan.exchange.errored");
pub(crate) static EXCHANGE_DURATION: Moments =
    Moments::new("shishan.exchange.duration_seconds");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("shishan.stream.chunks");
pub(crate) static STREAM_BYTES: Counter = Counter::new("shishan.stream.bytes");
pub(crate) static STREAM_MALFORMED_TAILS: Counter = Counter::new("shishan.stream.malformed_tails");
pub(crate) static STREAM_TTFB: Moments = Moments::new("shishan.stream.ttfb_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&SESSION_SUBMITS);
    collector.register_counter(&SESSION_REJECTED_EMPTY);
    collector.register_counter(&SESSION_REJECTED_BUSY);
    collector.register_counter(&SESSION_STALE_EVENTS);

    collector.register_counter(&EXCHANGE_COMPLETED);
    collector.register_counter(&EXCHANGE_EMPTY);
    collector.register_counter(&EXCHANGE_CANCELLED);
    collector.register_counter(&EXCHANGE_TIMED_OUT);
    collector.register_counter(&EXCHANGE_ERRORED);
    collector.register_moments(&EXCHANGE_DURATION);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_MALFORMED_TAILS);
    collector.register_moments(&STREAM_TTFB);
}

#[cfg(test)]
mod tests {
    use biometrics::Sensor;

    use super::*;

    #[test]
    fn counters_accumulate() {
        let before = STREAM_BYTES.read();
        STREAM_BYTES.count(7);
        assert!(STREAM_BYTES.read() >= before + 7);
        register_biometrics(Collector::new());
    }
}
