//! Ordered fallback between strategies and services
//!
//! A [`FallbackChain`] tries named strategies in order. A strategy that
//! returns an empty value falls through to the next one without being
//! treated as an error. A [`ServiceFallback`] adds priorities and success or
//! failure counters, and skips services that keep failing.

use crate::error::ResilienceError;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, error, info, warn};

/// Services whose failure count exceeds this are skipped
pub const FAILURE_THRESHOLD: u32 = 3;

/// Whether a value carries meaningful data
pub trait Presence {
    fn is_present(&self) -> bool;
}

impl<T> Presence for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl Presence for serde_json::Value {
    fn is_present(&self) -> bool {
        match self {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.is_empty(),
            serde_json::Value::Array(a) => !a.is_empty(),
            serde_json::Value::Object(o) => !o.is_empty(),
            serde_json::Value::Bool(_) | serde_json::Value::Number(_) => true,
        }
    }
}

type StrategyFn<I, T, E> = Box<dyn Fn(I) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

enum StrategyOutcome<T, E> {
    Success(T),
    Empty,
    Failed(E),
}

async fn attempt<I, T, E>(strategy: &StrategyFn<I, T, E>, input: I) -> StrategyOutcome<T, E>
where
    T: Presence,
{
    match strategy(input).await {
        Ok(value) if value.is_present() => StrategyOutcome::Success(value),
        Ok(_) => StrategyOutcome::Empty,
        Err(e) => StrategyOutcome::Failed(e),
    }
}

/// Ordered strategies for one logical operation
///
/// # Example
///
/// ```ignore
/// let chain = FallbackChain::new("search")
///     .add_strategy("Tavily", move |q: String| tavily.search(q))
///     .add_strategy("DuckDuckGo", move |q: String| ddg.search(q));
///
/// let results = chain.execute("Apple Inc news".to_string()).await?;
/// ```
pub struct FallbackChain<I, T, E> {
    name: String,
    strategies: Vec<(String, StrategyFn<I, T, E>)>,
}

impl<I, T, E> FallbackChain<I, T, E>
where
    I: Clone + Send + 'static,
    T: Presence + Default + Send + 'static,
    E: Display + From<ResilienceError> + Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategies: Vec::new(),
        }
    }

    /// Append a strategy; strategies run in insertion order
    pub fn add_strategy<F, Fut>(mut self, name: impl Into<String>, strategy: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.strategies
            .push((name.into(), Box::new(move |input| strategy(input).boxed())));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Run strategies in order until one returns a present value
    ///
    /// If any strategy failed with an error and none succeeded, the last
    /// error is returned, even when other strategies came back empty. Only
    /// a chain whose strategies all returned empty yields `T::default()`.
    /// Running a chain with no strategies is a configuration error.
    pub async fn execute(&self, input: I) -> Result<T, E> {
        if self.strategies.is_empty() {
            error!("{}: no strategies configured", self.name);
            return Err(ResilienceError::NoStrategies(self.name.clone()).into());
        }

        let mut last_error = None;

        for (strategy_name, strategy) in &self.strategies {
            debug!("{}: trying {}", self.name, strategy_name);
            match attempt(strategy, input.clone()).await {
                StrategyOutcome::Success(value) => {
                    info!("{}: {} succeeded", self.name, strategy_name);
                    return Ok(value);
                }
                StrategyOutcome::Empty => {
                    warn!("{}: {} returned empty result", self.name, strategy_name);
                }
                StrategyOutcome::Failed(e) => {
                    warn!("{}: {} failed - {}", self.name, strategy_name, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => {
                error!("{}: all fallback strategies exhausted", self.name);
                Err(e)
            }
            None => {
                warn!("{}: every strategy returned empty", self.name);
                Ok(T::default())
            }
        }
    }
}

struct Service<I, T, E> {
    name: String,
    priority: i32,
    func: StrategyFn<I, T, E>,
    successes: AtomicU32,
    failures: AtomicU32,
}

/// Health statistics for one registered service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceHealth {
    pub name: String,
    pub successes: u32,
    pub failures: u32,
    /// `successes / max(1, successes + failures)`
    pub health: f64,
}

/// Prioritized services with health tracking
pub struct ServiceFallback<I, T, E> {
    name: String,
    services: Vec<Service<I, T, E>>,
}

impl<I, T, E> ServiceFallback<I, T, E>
where
    I: Clone + Send + 'static,
    T: Presence + Send + 'static,
    E: Display + Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
        }
    }

    /// Register a service; lower priority values are tried first
    pub fn register<F, Fut>(mut self, name: impl Into<String>, priority: i32, func: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.services.push(Service {
            name: name.into(),
            priority,
            func: Box::new(move |input| func(input).boxed()),
            successes: AtomicU32::new(0),
            failures: AtomicU32::new(0),
        });
        self.services.sort_by_key(|s| s.priority);
        self
    }

    /// Call services in priority order and return the first present value
    pub async fn call(&self, input: I) -> Option<T> {
        for service in &self.services {
            if service.failures.load(Ordering::Relaxed) > FAILURE_THRESHOLD {
                debug!("{}: skipping {} due to recent failures", self.name, service.name);
                continue;
            }

            match attempt(&service.func, input.clone()).await {
                StrategyOutcome::Success(value) => {
                    service.successes.fetch_add(1, Ordering::Relaxed);
                    // decrement, floored at zero
                    let _ = service
                        .failures
                        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |f| {
                            Some(f.saturating_sub(1))
                        });
                    info!("{}: {} succeeded", self.name, service.name);
                    return Some(value);
                }
                StrategyOutcome::Empty => {
                    debug!("{}: {} returned empty result", self.name, service.name);
                }
                StrategyOutcome::Failed(e) => {
                    service.failures.fetch_add(1, Ordering::Relaxed);
                    warn!("{}: {} failed - {}", self.name, service.name, e);
                }
            }
        }

        error!("{}: all services failed", self.name);
        None
    }

    /// Health statistics in priority order
    pub fn health_report(&self) -> Vec<ServiceHealth> {
        self.services
            .iter()
            .map(|s| {
                let successes = s.successes.load(Ordering::Relaxed);
                let failures = s.failures.load(Ordering::Relaxed);
                ServiceHealth {
                    name: s.name.clone(),
                    successes,
                    failures,
                    health: f64::from(successes) / f64::from((successes + failures).max(1)),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[derive(Debug, PartialEq)]
    enum Fault {
        Down(&'static str),
        Misconfigured(String),
    }

    impl std::fmt::Display for Fault {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl From<ResilienceError> for Fault {
        fn from(err: ResilienceError) -> Self {
            Fault::Misconfigured(err.to_string())
        }
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let calls = [counter(), counter(), counter()];
        let mut chain: FallbackChain<String, Vec<String>, Fault> = FallbackChain::new("search");
        for (i, c) in calls.iter().enumerate() {
            let c = Arc::clone(c);
            chain = chain.add_strategy(format!("s{i}"), move |q: String| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![format!("{q}-{i}")])
                }
            });
        }

        let result = chain.execute("apple".to_string()).await;
        assert_eq!(result, Ok(vec!["apple-0".to_string()]));
        assert_eq!(calls[0].load(Ordering::SeqCst), 1);
        assert_eq!(calls[1].load(Ordering::SeqCst), 0);
        assert_eq!(calls[2].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_falls_through() {
        let second = counter();
        let c = Arc::clone(&second);
        let chain: FallbackChain<(), Vec<u32>, Fault> = FallbackChain::new("op")
            .add_strategy("empty", |()| async { Ok(Vec::new()) })
            .add_strategy("full", move |()| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![7])
                }
            });

        assert_eq!(chain.execute(()).await, Ok(vec![7]));
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_then_success() {
        let chain: FallbackChain<(), Vec<u32>, Fault> = FallbackChain::new("op")
            .add_strategy("broken", |()| async { Err(Fault::Down("boom")) })
            .add_strategy("ok", |()| async { Ok(vec![1]) });

        assert_eq!(chain.execute(()).await, Ok(vec![1]));
    }

    #[tokio::test]
    async fn test_all_errors_returns_last() {
        let chain: FallbackChain<(), Vec<u32>, Fault> = FallbackChain::new("op")
            .add_strategy("a", |()| async { Err(Fault::Down("first")) })
            .add_strategy("b", |()| async { Err(Fault::Down("second")) });

        assert_eq!(chain.execute(()).await, Err(Fault::Down("second")));
    }

    #[tokio::test]
    async fn test_all_empty_returns_default() {
        let chain: FallbackChain<(), Vec<u32>, Fault> = FallbackChain::new("op")
            .add_strategy("a", |()| async { Ok(Vec::new()) })
            .add_strategy("b", |()| async { Ok(Vec::new()) });

        assert_eq!(chain.execute(()).await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn test_error_then_empty_surfaces_error() {
        let chain: FallbackChain<(), Vec<u32>, Fault> = FallbackChain::new("search")
            .add_strategy("Tavily", |()| async { Err(Fault::Down("tavily")) })
            .add_strategy("DuckDuckGo", |()| async { Ok(Vec::new()) });

        assert_eq!(chain.execute(()).await, Err(Fault::Down("tavily")));
    }

    #[tokio::test]
    async fn test_empty_then_error_surfaces_error() {
        let chain: FallbackChain<(), Vec<u32>, Fault> = FallbackChain::new("op")
            .add_strategy("a", |()| async { Ok(Vec::new()) })
            .add_strategy("b", |()| async { Err(Fault::Down("b")) });

        assert_eq!(chain.execute(()).await, Err(Fault::Down("b")));
    }

    #[tokio::test]
    async fn test_no_strategies() {
        let chain: FallbackChain<(), Vec<u32>, Fault> = FallbackChain::new("op");
        assert!(chain.is_empty());
        assert!(matches!(
            chain.execute(()).await,
            Err(Fault::Misconfigured(msg)) if msg.contains("'op'")
        ));
    }

    #[tokio::test]
    async fn test_service_priority_order() {
        let services: ServiceFallback<(), String, String> = ServiceFallback::new("llm")
            .register("secondary", 1, |()| async { Ok("flash".to_string()) })
            .register("primary", 0, |()| async { Ok("pro".to_string()) });

        assert_eq!(services.call(()).await, Some("pro".to_string()));
        let report = services.health_report();
        assert_eq!(report[0].name, "primary");
        assert_eq!(report[0].successes, 1);
        assert!((report[0].health - 1.0).abs() < f64::EPSILON);
        assert_eq!(report[1].successes, 0);
        assert!((report[1].health).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_service_skipped_after_threshold() {
        let primary_calls = counter();
        let c = Arc::clone(&primary_calls);
        let services: ServiceFallback<(), String, String> = ServiceFallback::new("llm")
            .register("primary", 0, move |()| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("unavailable".to_string())
                }
            })
            .register("secondary", 1, |()| async { Ok("flash".to_string()) });

        for _ in 0..6 {
            assert_eq!(services.call(()).await, Some("flash".to_string()));
        }

        // failures 1..=4 are attempted; once the count exceeds 3 it is skipped
        assert_eq!(primary_calls.load(Ordering::SeqCst), 4);
        let report = services.health_report();
        assert_eq!(report[0].failures, 4);
        assert_eq!(report[1].successes, 6);
    }

    #[tokio::test]
    async fn test_success_decrements_failures() {
        let fail_next = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let flag = Arc::clone(&fail_next);
        let services: ServiceFallback<(), String, String> =
            ServiceFallback::new("svc").register("only", 0, move |()| {
                let flag = Arc::clone(&flag);
                async move {
                    if flag.load(Ordering::SeqCst) {
                        Err("down".to_string())
                    } else {
                        Ok("up".to_string())
                    }
                }
            });

        assert_eq!(services.call(()).await, None);
        assert_eq!(services.health_report()[0].failures, 1);

        fail_next.store(false, Ordering::SeqCst);
        assert_eq!(services.call(()).await, Some("up".to_string()));
        assert_eq!(services.call(()).await, Some("up".to_string()));

        let health = &services.health_report()[0];
        assert_eq!(health.failures, 0);
        assert_eq!(health.successes, 2);
    }

    #[test]
    fn test_presence() {
        assert!(!Vec::<u8>::new().is_present());
        assert!(vec![1].is_present());
        assert!(!"  ".to_string().is_present());
        assert!(!serde_json::Value::Null.is_present());
        assert!(!serde_json::json!({}).is_present());
        assert!(serde_json::json!({"a": 1}).is_present());
        assert!(!None::<u8>.is_present());
    }
}
