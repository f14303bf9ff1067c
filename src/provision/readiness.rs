// ABOUTME: Readiness prober that polls a freshly provisioned endpoint until healthy
// ABOUTME: Constant-interval state machine over an injectable clock and health check

use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Result of a single health request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Healthy,
    /// Endpoint not listening yet, or answered with a non-success status.
    NotReady(String),
    /// Anything else; logged and treated as not ready.
    Error(String),
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self, url: &str) -> ProbeResult;
}

/// Time source for the prober. `now` is measured from an arbitrary fixed origin.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock whose time only moves when something sleeps on it.
#[derive(Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

pub struct HttpHealthCheck {
    client: Client,
}

impl HttpHealthCheck {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn check(&self, url: &str) -> ProbeResult {
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => ProbeResult::Healthy,
            Ok(response) => ProbeResult::NotReady(format!("status {}", response.status())),
            Err(e) if e.is_connect() || e.is_timeout() => ProbeResult::NotReady(e.to_string()),
            Err(e) => ProbeResult::Error(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Probing,
    Ready,
    TimedOut,
}

impl ProbeState {
    /// Transition after one probe. Only a success or an exhausted budget leaves `Probing`.
    pub fn advance(self, healthy: bool, elapsed: Duration, total_timeout: Duration) -> Self {
        match self {
            ProbeState::Probing if healthy => ProbeState::Ready,
            ProbeState::Probing if elapsed >= total_timeout => ProbeState::TimedOut,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessProbeOutcome {
    pub ready: bool,
    pub elapsed: Duration,
    pub attempts: u32,
}

pub struct ReadinessProber {
    health: Arc<dyn HealthCheck>,
    clock: Arc<dyn Clock>,
    total_timeout: Duration,
    poll_interval: Duration,
}

impl ReadinessProber {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

    pub fn new(health: Arc<dyn HealthCheck>, clock: Arc<dyn Clock>) -> Self {
        Self {
            health,
            clock,
            total_timeout: Self::DEFAULT_TIMEOUT,
            poll_interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_timing(mut self, total_timeout: Duration, poll_interval: Duration) -> Self {
        self.total_timeout = total_timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn total_timeout(&self) -> Duration {
        self.total_timeout
    }

    /// Poll `http://{address}:{port}/` until it answers with a 2xx or the budget runs out.
    pub async fn wait_until_ready(&self, address: &str, port: u16) -> ReadinessProbeOutcome {
        let url = format!("http://{}:{}/", address, port);
        let start = self.clock.now();
        let mut state = ProbeState::Probing;
        let mut attempts = 0u32;

        tracing::info!(
            "Waiting for {} to become ready (timeout {}s, every {}s)",
            url,
            self.total_timeout.as_secs(),
            self.poll_interval.as_secs()
        );

        loop {
            attempts += 1;
            let healthy = match self.health.check(&url).await {
                ProbeResult::Healthy => true,
                ProbeResult::NotReady(reason) => {
                    tracing::debug!("Probe {} of {}: not ready ({})", attempts, url, reason);
                    false
                }
                ProbeResult::Error(reason) => {
                    tracing::warn!("Probe {} of {} errored: {}", attempts, url, reason);
                    false
                }
            };

            let elapsed = self.clock.now().saturating_sub(start);
            state = state.advance(healthy, elapsed, self.total_timeout);

            match state {
                ProbeState::Ready => {
                    tracing::info!("{} is ready after {}s", url, elapsed.as_secs());
                    return ReadinessProbeOutcome {
                        ready: true,
                        elapsed,
                        attempts,
                    };
                }
                ProbeState::TimedOut => {
                    tracing::warn!("{} not ready after {} probes", url, attempts);
                    return ReadinessProbeOutcome {
                        ready: false,
                        elapsed,
                        attempts,
                    };
                }
                ProbeState::Probing => self.clock.sleep(self.poll_interval).await,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays scripted results, repeating the last one forever.
    pub(crate) struct ScriptedHealth {
        script: Mutex<Vec<ProbeResult>>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl ScriptedHealth {
        pub(crate) fn new(mut script: Vec<ProbeResult>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HealthCheck for ScriptedHealth {
        async fn check(&self, url: &str) -> ProbeResult {
            self.calls.lock().unwrap().push(url.to_string());
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop().unwrap()
            } else {
                script.last().cloned().unwrap()
            }
        }
    }

    fn refused() -> ProbeResult {
        ProbeResult::NotReady("connection refused".into())
    }

    #[test]
    fn test_state_transitions() {
        let timeout = Duration::from_secs(180);
        assert_eq!(
            ProbeState::Probing.advance(true, Duration::from_secs(500), timeout),
            ProbeState::Ready
        );
        assert_eq!(
            ProbeState::Probing.advance(false, Duration::from_secs(179), timeout),
            ProbeState::Probing
        );
        assert_eq!(
            ProbeState::Probing.advance(false, Duration::from_secs(180), timeout),
            ProbeState::TimedOut
        );
        assert_eq!(
            ProbeState::TimedOut.advance(true, Duration::ZERO, timeout),
            ProbeState::TimedOut
        );
    }

    #[tokio::test]
    async fn test_ready_on_first_probe() {
        let health = Arc::new(ScriptedHealth::new(vec![ProbeResult::Healthy]));
        let prober = ReadinessProber::new(health.clone(), Arc::new(ManualClock::new()));
        let outcome = prober.wait_until_ready("10.0.0.1", 8000).await;
        assert!(outcome.ready);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.elapsed, Duration::ZERO);
        assert_eq!(health.calls.lock().unwrap()[0], "http://10.0.0.1:8000/");
    }

    #[tokio::test]
    async fn test_ready_after_refusals_and_errors() {
        let health = Arc::new(ScriptedHealth::new(vec![
            refused(),
            ProbeResult::Error("tls handshake".into()),
            ProbeResult::NotReady("status 503".into()),
            ProbeResult::Healthy,
        ]));
        let clock = Arc::new(ManualClock::new());
        let prober = ReadinessProber::new(health.clone(), clock.clone());
        let outcome = prober.wait_until_ready("host", 8000).await;
        assert!(outcome.ready);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.elapsed, Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_times_out_including_probe_at_deadline() {
        let health = Arc::new(ScriptedHealth::new(vec![refused()]));
        let prober = ReadinessProber::new(health.clone(), Arc::new(ManualClock::new()));
        let outcome = prober.wait_until_ready("host", 8000).await;
        assert!(!outcome.ready);
        // probes at 0, 15, ..., 180
        assert_eq!(outcome.attempts, 13);
        assert_eq!(health.call_count(), 13);
        assert_eq!(outcome.elapsed, Duration::from_secs(180));
    }

    #[tokio::test]
    async fn test_success_on_deadline_probe_counts() {
        let mut script = vec![refused(); 12];
        script.push(ProbeResult::Healthy);
        let health = Arc::new(ScriptedHealth::new(script));
        let prober = ReadinessProber::new(health, Arc::new(ManualClock::new()));
        let outcome = prober.wait_until_ready("host", 8000).await;
        assert!(outcome.ready);
        assert_eq!(outcome.elapsed, Duration::from_secs(180));
    }

    #[tokio::test]
    async fn test_custom_timing() {
        let health = Arc::new(ScriptedHealth::new(vec![refused()]));
        let prober = ReadinessProber::new(health.clone(), Arc::new(ManualClock::new()))
            .with_timing(Duration::from_secs(10), Duration::from_secs(4));
        let outcome = prober.wait_until_ready("host", 9000).await;
        assert!(!outcome.ready);
        // probes at 0, 4, 8, 12
        assert_eq!(outcome.attempts, 4);
    }

    #[tokio::test]
    async fn test_http_check_refused_is_not_ready() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let check = HttpHealthCheck::new(Duration::from_secs(2)).unwrap();
        let result = check.check(&format!("http://127.0.0.1:{}/", port)).await;
        assert!(matches!(result, ProbeResult::NotReady(_)));
    }
}
