use std::time::{Duration, Instant};

/// Run `f` and emit a warning when it takes longer than `max`.
pub fn warn_if_slow<F, T>(label: &'static str, max: Duration, f: F) -> T
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let out = f();
    report(label, max, start.elapsed());
    out
}

fn report(label: &'static str, max: Duration, elapsed: Duration) {
    if elapsed > max {
        tracing::warn!(
            label = label,
            elapsed_us = elapsed.as_micros() as u64,
            budget_us = max.as_micros() as u64,
            "slow operation detected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn slow_closure_is_reported() {
        let v = warn_if_slow("sleepy", Duration::from_millis(1), || {
            std::thread::sleep(Duration::from_millis(5));
            7
        });
        assert_eq!(v, 7);
        assert!(logs_contain("slow operation detected"));
    }

    #[traced_test]
    #[test]
    fn fast_closure_is_silent() {
        let v = warn_if_slow("quick", Duration::from_secs(5), || 1 + 1);
        assert_eq!(v, 2);
        assert!(!logs_contain("slow operation detected"));
    }
}
