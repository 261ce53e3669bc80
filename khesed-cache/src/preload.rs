//! Cache preloading.
//!
//! Loads a batch of datasets concurrently and stores each one that succeeds.
//! Every task settles; a failing loader is logged and reported, never
//! propagated.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use khesed_core::{church_tag, CacheKey, CacheOptions};
use serde::Serialize;

use crate::tiered::{CacheValue, TieredCache};

/// Error type preload loaders may fail with.
pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

/// One dataset to load into the cache.
pub struct PreloadTask<'a, T> {
    pub key: String,
    pub options: CacheOptions,
    load: BoxFuture<'a, Result<T, LoadError>>,
}

impl<'a, T: Send + 'a> PreloadTask<'a, T> {
    pub fn new<Fut, E>(key: impl Into<String>, options: CacheOptions, load: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'a,
        E: Into<LoadError>,
    {
        Self {
            key: key.into(),
            options,
            load: Box::pin(async move { load.await.map_err(Into::into) }),
        }
    }
}

impl<T> fmt::Debug for PreloadTask<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreloadTask")
            .field("key", &self.key)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A task that did not end up in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadFailure {
    pub key: String,
    pub reason: String,
}

/// Outcome of a preload batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    /// Keys stored, in task order.
    pub loaded: Vec<String>,
    pub failed: Vec<PreloadFailure>,
}

impl PreloadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run every task concurrently and store each successful result.
pub async fn preload<T: CacheValue>(
    cache: &TieredCache<T>,
    tasks: Vec<PreloadTask<'_, T>>,
) -> PreloadReport {
    let outcomes = join_all(tasks.into_iter().map(|task| async move {
        let PreloadTask { key, options, load } = task;

        let data = match load.await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "preload failed");
                return Err(PreloadFailure {
                    reason: e.to_string(),
                    key,
                });
            }
        };

        match cache.set(&key, data, options).await {
            Ok(()) => Ok(key),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to cache preloaded value");
                Err(PreloadFailure {
                    reason: e.to_string(),
                    key,
                })
            }
        }
    }))
    .await;

    let mut report = PreloadReport::default();
    for outcome in outcomes {
        match outcome {
            Ok(key) => report.loaded.push(key),
            Err(failure) => report.failed.push(failure),
        }
    }

    tracing::debug!(
        loaded = report.loaded.len(),
        failed = report.failed.len(),
        "preload finished"
    );
    report
}

/// Datasets every church dashboard reads on first paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChurchDataset {
    MembersSummary,
    UpcomingEvents,
    DonationStats,
    UserPermissions,
}

impl ChurchDataset {
    pub const ALL: [ChurchDataset; 4] = [
        ChurchDataset::MembersSummary,
        ChurchDataset::UpcomingEvents,
        ChurchDataset::DonationStats,
        ChurchDataset::UserPermissions,
    ];

    /// Key namespace, e.g. `members_summary`.
    pub fn namespace(self) -> &'static str {
        match self {
            ChurchDataset::MembersSummary => "members_summary",
            ChurchDataset::UpcomingEvents => "events_upcoming",
            ChurchDataset::DonationStats => "donation_stats",
            ChurchDataset::UserPermissions => "user_permissions",
        }
    }

    pub fn ttl(self) -> Duration {
        let secs = match self {
            ChurchDataset::MembersSummary => 600,
            ChurchDataset::UpcomingEvents => 300,
            ChurchDataset::DonationStats => 900,
            ChurchDataset::UserPermissions => 1800,
        };
        Duration::from_secs(secs)
    }

    /// Tag shared by every church's copy of this dataset.
    pub fn tag(self) -> &'static str {
        match self {
            ChurchDataset::MembersSummary => "members",
            ChurchDataset::UpcomingEvents => "events",
            ChurchDataset::DonationStats => "donations",
            ChurchDataset::UserPermissions => "permissions",
        }
    }

    pub fn key(self, church_id: &str) -> String {
        CacheKey::new(self.namespace()).tenant(church_id).render()
    }

    /// TTL plus the dataset tag and the church tag.
    pub fn options(self, church_id: &str) -> CacheOptions {
        CacheOptions::new()
            .with_ttl(self.ttl())
            .with_tag(self.tag())
            .with_tag(church_tag(church_id))
    }
}

impl fmt::Display for ChurchDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// Preload all four [`ChurchDataset`]s for `church_id`.
///
/// `loader` is called once per dataset and the four loads run concurrently.
pub async fn preload_church_data<T, L, Fut, E>(
    cache: &TieredCache<T>,
    church_id: &str,
    loader: L,
) -> PreloadReport
where
    T: CacheValue,
    L: Fn(ChurchDataset) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send,
    E: Into<LoadError>,
{
    let tasks = ChurchDataset::ALL
        .into_iter()
        .map(|dataset| {
            PreloadTask::new(
                dataset.key(church_id),
                dataset.options(church_id),
                loader(dataset),
            )
        })
        .collect();

    preload(cache, tasks).await
}
