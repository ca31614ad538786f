//! Host-adaptive connection allocation.
//!
//! [`AdaptiveConnectionAllocator`] owns the process-wide HTTP client and the
//! limits that decide how many connections each route may hold at once. Every
//! batch a fetch worker picks up is first passed to
//! [`retune`](AdaptiveConnectionAllocator::retune), which adds the batch's
//! per-host counts to the run-wide statistics and re-derives per-route caps so
//! the five busiest hosts share 80% of the connection budget in proportion to
//! their volume. All other routes keep the default cap of `total / 5`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bulkfetch_core::fetch::AdaptiveConnectionAllocator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let allocator = AdaptiveConnectionAllocator::new(100, Duration::from_secs(30), Duration::from_secs(300))?;
//! allocator.retune(&["https://example.com/a".to_string()]);
//! let lease = allocator.client_for("example.com:443").await;
//! let response = lease.get("https://example.com/a").send().await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use reqwest::Client;
use tokio::sync::Notify;
use tracing::{debug, instrument, trace};
use url::Url;

use super::error::FetchError;

/// Share of the connection budget reserved for the busiest hosts.
pub const PREFERRED_FRACTION: f64 = 0.8;

/// Number of hosts that receive a dedicated cap.
pub const TOP_HOSTS: usize = 5;

/// `default_per_route = max_total / DEFAULT_ROUTE_DIVISOR`.
const DEFAULT_ROUTE_DIVISOR: usize = 5;

/// Connection limits in force at a point in time.
///
/// Never mutated in place: each retune publishes a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolConfig {
    max_total: usize,
    default_per_route: usize,
    overrides: HashMap<String, usize>,
}

impl PoolConfig {
    /// Creates limits for a total budget with no per-route overrides.
    #[must_use]
    pub fn with_capacity(max_total: usize) -> Self {
        Self {
            max_total,
            default_per_route: max_total / DEFAULT_ROUTE_DIVISOR,
            overrides: HashMap::new(),
        }
    }

    /// Total connections across all routes.
    #[must_use]
    pub fn max_total(&self) -> usize {
        self.max_total
    }

    /// Cap for routes without an override.
    #[must_use]
    pub fn default_per_route(&self) -> usize {
        self.default_per_route
    }

    /// Per-route caps for the busiest hosts.
    #[must_use]
    pub fn overrides(&self) -> &HashMap<String, usize> {
        &self.overrides
    }

    /// Cap for `route` (`host:port`).
    #[must_use]
    pub fn cap_for(&self, route: &str) -> usize {
        self.overrides
            .get(route)
            .copied()
            .unwrap_or(self.default_per_route)
    }
}

/// Returns the `host:port` route key for a URL, or `None` if it is malformed
/// or has no host.
///
/// # Examples
///
/// ```
/// use bulkfetch_core::fetch::route_key;
///
/// assert_eq!(route_key("http://Example.COM/x").as_deref(), Some("example.com:80"));
/// assert_eq!(route_key("https://example.com:8443/x").as_deref(), Some("example.com:8443"));
/// assert_eq!(route_key("not a url"), None);
/// ```
#[must_use]
pub fn route_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let port = parsed.port_or_known_default()?;
    Some(format!("{host}:{port}"))
}

/// In-flight counter whose limit is read at acquire time, so caps can change
/// while callers are waiting.
#[derive(Debug, Default)]
struct Gate {
    in_flight: AtomicUsize,
    notify: Notify,
}

impl Gate {
    fn try_acquire(&self, limit: usize) -> bool {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < limit).then_some(current + 1)
            })
            .is_ok()
    }

    /// Waits until a slot is free under the current limit. A limit of zero
    /// still admits one caller so no route can starve outright.
    async fn acquire(&self, limit: impl Fn() -> usize) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();
            if self.try_acquire(limit().max(1)) {
                return;
            }
            notified.await;
        }
    }

    fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Process-wide connection allocator. Construct once and share via `Arc`.
#[derive(Debug)]
pub struct AdaptiveConnectionAllocator {
    client: Client,
    /// Cumulative URL count per `host:port`.
    stats: Mutex<HashMap<String, u64>>,
    config: RwLock<Arc<PoolConfig>>,
    total: Gate,
    routes: DashMap<String, Arc<Gate>>,
}

impl AdaptiveConnectionAllocator {
    /// Builds the shared HTTP client and sets the initial capacity.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the client cannot be built.
    #[instrument(level = "debug")]
    pub fn new(
        total_connections: usize,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .gzip(true)
            .pool_max_idle_per_host(total_connections.max(1))
            .user_agent(default_user_agent())
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self::with_client(client, total_connections))
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: Client, total_connections: usize) -> Self {
        debug!(total_connections, "creating connection allocator");
        Self {
            client,
            stats: Mutex::new(HashMap::new()),
            config: RwLock::new(Arc::new(PoolConfig::with_capacity(total_connections))),
            total: Gate::default(),
            routes: DashMap::new(),
        }
    }

    /// Sets the total connection budget and the default per-route cap, then
    /// re-derives overrides from the statistics gathered so far.
    #[instrument(skip(self))]
    pub fn set_capacity(&self, total_connections: usize) {
        let stats = self.lock_stats();
        let mut config = PoolConfig::with_capacity(total_connections);
        if let Some(overrides) = preferred_caps(&stats, total_connections) {
            config.overrides = overrides;
        }
        self.publish(config);
        drop(stats);
    }

    /// Folds a batch into the host statistics and re-derives per-route caps.
    ///
    /// Malformed URLs are ignored. If no host has ever been counted the
    /// current limits are left untouched.
    #[instrument(level = "debug", skip_all, fields(urls = urls.len()))]
    pub fn retune<S: AsRef<str>>(&self, urls: &[S]) {
        let batch_counts = count_routes(urls);
        if batch_counts.is_empty() {
            trace!("no recognizable hosts in batch");
            return;
        }

        // Derive and publish while holding the stats lock so overlapping
        // retunes publish in the same order they merged.
        let mut stats = self.lock_stats();
        for (route, count) in batch_counts {
            *stats.entry(route).or_insert(0) += count;
        }

        let current = self.config();
        let Some(overrides) = preferred_caps(&stats, current.max_total) else {
            return;
        };
        debug!(?overrides, "retuned per-route caps");
        self.publish(PoolConfig {
            overrides,
            ..(*current).clone()
        });
        drop(stats);
    }

    /// Current limits.
    #[must_use]
    pub fn config(&self) -> Arc<PoolConfig> {
        Arc::clone(
            &self
                .config
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    /// Current cap for `route`.
    #[must_use]
    pub fn cap_for(&self, route: &str) -> usize {
        self.config().cap_for(route)
    }

    /// Cumulative count recorded for `route`.
    #[must_use]
    pub fn host_count(&self, route: &str) -> u64 {
        self.lock_stats().get(route).copied().unwrap_or(0)
    }

    /// Number of distinct routes seen.
    #[must_use]
    pub fn tracked_hosts(&self) -> usize {
        self.lock_stats().len()
    }

    /// Connections currently leased to `route`.
    #[must_use]
    pub fn in_flight(&self, route: &str) -> usize {
        self.routes.get(route).map_or(0, |gate| gate.in_flight())
    }

    /// Waits for a connection slot on `route` and returns a lease on the
    /// shared client. The slot is released when the lease is dropped.
    pub async fn client_for(&self, route: &str) -> ConnectionLease<'_> {
        let gate = Arc::clone(
            self.routes
                .entry(route.to_string())
                .or_insert_with(|| Arc::new(Gate::default()))
                .value(),
        );
        gate.acquire(|| self.cap_for(route)).await;

        let mut lease = ConnectionLease {
            allocator: self,
            route: gate,
            holds_total: false,
        };
        self.total.acquire(|| self.config().max_total).await;
        lease.holds_total = true;
        lease
    }

    fn publish(&self, config: PoolConfig) {
        *self
            .config
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::new(config);
        // Caps may have grown: let every waiter re-check.
        self.total.notify.notify_waiters();
        for gate in &self.routes {
            gate.notify.notify_waiters();
        }
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.stats
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// A leased connection slot on one route. Derefs to the shared client.
#[derive(Debug)]
pub struct ConnectionLease<'a> {
    allocator: &'a AdaptiveConnectionAllocator,
    route: Arc<Gate>,
    holds_total: bool,
}

impl Deref for ConnectionLease<'_> {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.allocator.client
    }
}

impl Drop for ConnectionLease<'_> {
    fn drop(&mut self) {
        if self.holds_total {
            self.allocator.total.release();
        }
        self.route.release();
    }
}

/// Default User-Agent for outbound requests.
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("bulkfetch/{version}")
}

fn count_routes<S: AsRef<str>>(urls: &[S]) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for url in urls {
        if let Some(route) = route_key(url.as_ref()) {
            *counts.entry(route).or_insert(0) += 1;
        }
    }
    counts
}

/// Top hosts by count descending, ties broken by host ascending.
fn top_hosts(stats: &HashMap<String, u64>, k: usize) -> Vec<(&str, u64)> {
    let mut ranked: Vec<(&str, u64)> = stats
        .iter()
        .map(|(host, count)| (host.as_str(), *count))
        .collect();
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(k);
    ranked
}

/// Caps for the top hosts: `floor(count / sum * PREFERRED_FRACTION * total)`.
/// `None` when the top hosts sum to zero.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn preferred_caps(stats: &HashMap<String, u64>, total: usize) -> Option<HashMap<String, usize>> {
    let top = top_hosts(stats, TOP_HOSTS);
    let sum: u64 = top.iter().map(|(_, count)| count).sum();
    if sum == 0 {
        return None;
    }
    Some(
        top.into_iter()
            .map(|(host, count)| {
                let share = (count as f64 / sum as f64) * PREFERRED_FRACTION;
                (host.to_string(), (share * total as f64).floor() as usize)
            })
            .collect(),
    )
}
