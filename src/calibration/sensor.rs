use log::{debug, warn};
use std::time::Duration;

/// Raw light sensor. Readings are instantaneous and may be noisy.
pub trait LightSensor: Send + Sync {
    fn current_reading(&self) -> i64;
}

#[derive(Debug, Clone)]
pub struct StableReadingParams {
    pub max_tries: u32,
    pub sample_count: u32,
    pub max_std_dev: f64,
    pub sample_interval: Duration,
}

impl Default for StableReadingParams {
    fn default() -> Self {
        StableReadingParams {
            max_tries: 3,
            sample_count: 50,
            max_std_dev: 5.0,
            sample_interval: Duration::from_millis(10),
        }
    }
}

/// Mean of `sample_count` readings, retried while the standard deviation is
/// above `max_std_dev`. The last attempt is used even if it stays noisy.
pub async fn stable_reading(sensor: &dyn LightSensor, params: &StableReadingParams) -> f64 {
    let tries = params.max_tries.max(1);
    let samples = params.sample_count.max(1);
    let mut mean = 0.0;
    for attempt in 0..tries {
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for _ in 0..samples {
            let v = sensor.current_reading() as f64;
            sum += v;
            sum_sq += v * v;
            tokio::time::sleep(params.sample_interval).await;
        }
        let n = samples as f64;
        mean = sum / n;
        let std_dev = (sum_sq / n - mean * mean).max(0.0).sqrt();
        if std_dev <= params.max_std_dev {
            break;
        }
        if attempt + 1 < tries {
            debug!(
                "Attempt {}: stdev={:.2} above threshold={:.2}, retrying",
                attempt, std_dev, params.max_std_dev
            );
        } else {
            warn!(
                "Reading still noisy after {} attempts (stdev={:.2}), using mean {:.2}",
                tries, std_dev, mean
            );
        }
    }
    mean
}
