//! Mock implementations of the engine's collaborators.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tripdesk_core::environment::{Clock, CodeGenerator};
use tripdesk_core::gateway::{GatewayResult, PaymentGateway, PaymentUrlRequest};
use tripdesk_core::notify::{Notification, Notifier, Template};
use tripdesk_core::{GatewayError, NotifyError};

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use tripdesk_testing::mocks::FixedClock;
/// use tripdesk_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Default instant for tests: 2025-01-01 00:00:00 UTC.
#[must_use]
pub fn test_time() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1_735_689_600)
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(test_time())
}

/// Clock that tests move forward by hand.
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Clock starting at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
        *time += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Predictable codes: `ORD-000000000001`, `ITN-000000000002`, ...
#[derive(Debug, Default)]
pub struct SequentialCodeGenerator {
    next: AtomicU64,
}

impl SequentialCodeGenerator {
    /// Generator starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl CodeGenerator for SequentialCodeGenerator {
    fn order_code(&self) -> String {
        format!("ORD-{:012}", self.next())
    }

    fn itinerary_code(&self) -> String {
        format!("ITN-{:012}", self.next())
    }
}

/// Payment gateway that issues `https://pay.test/<order>/<n>` URLs.
///
/// Failures can be queued with [`MockPaymentGateway::fail_next`].
#[derive(Debug, Clone, Default)]
pub struct MockPaymentGateway {
    requests: Arc<Mutex<Vec<PaymentUrlRequest>>>,
    failures: Arc<Mutex<VecDeque<GatewayError>>>,
}

impl MockPaymentGateway {
    /// Gateway that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next request with `error`.
    pub fn fail_next(&self, error: GatewayError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Requests received so far, including failed ones.
    #[must_use]
    pub fn requests(&self) -> Vec<PaymentUrlRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn request_payment_url(
        &self,
        request: PaymentUrlRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<String>> + Send + '_>> {
        Box::pin(async move {
            let failure = self
                .failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
            requests.push(request.clone());
            match failure {
                Some(error) => Err(error),
                None => Ok(format!(
                    "https://pay.test/{}/{}",
                    request.order_code,
                    requests.len()
                )),
            }
        })
    }
}

/// Notifier that records every notification it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    /// Notifier that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail (still recording the attempt).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }

    /// Everything received so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget everything received so far.
    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Templates received so far, in arrival order.
    #[must_use]
    pub fn templates(&self) -> Vec<Template> {
        self.sent().iter().map(|n| n.template).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(notification);
            if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
                Err(NotifyError("recording notifier set to fail".to_string()))
            } else {
                Ok(())
            }
        })
    }
}
