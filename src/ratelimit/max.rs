//! Resolution of the per-window request quota.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;

/// Default number of requests allowed per window.
pub const DEFAULT_MAX: u64 = 1000;

/// Resolves the quota for a client at request time.
#[async_trait]
pub trait ResolveMax: Send + Sync {
    /// Resolve the quota that applies to `key` for the current request.
    async fn resolve(&self, key: &str) -> Result<u64, BoxError>;
}

/// The maximum number of hits allowed per window.
#[derive(Clone)]
pub enum Max {
    /// A fixed quota
    Fixed(u64),
    /// A quota resolved on every request, possibly asynchronously
    Dynamic(Arc<dyn ResolveMax>),
}

impl Max {
    /// Build a dynamic quota from an async function of the client key.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<u64, BoxError>> + Send + 'static,
    {
        Max::Dynamic(Arc::new(FnResolver(f)))
    }

    /// Resolve the quota for `key`.
    pub async fn resolve(&self, key: &str) -> Result<u64, BoxError> {
        match self {
            Max::Fixed(max) => Ok(*max),
            Max::Dynamic(resolver) => resolver.resolve(key).await,
        }
    }
}

impl Default for Max {
    fn default() -> Self {
        Max::Fixed(DEFAULT_MAX)
    }
}

impl From<u64> for Max {
    fn from(max: u64) -> Self {
        Max::Fixed(max)
    }
}

impl fmt::Debug for Max {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Max::Fixed(max) => f.debug_tuple("Fixed").field(max).finish(),
            Max::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

struct FnResolver<F>(F);

#[async_trait]
impl<F, Fut> ResolveMax for FnResolver<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<u64, BoxError>> + Send + 'static,
{
    async fn resolve(&self, key: &str) -> Result<u64, BoxError> {
        (self.0)(key.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_max() {
        assert_eq!(Max::from(5).resolve("any").await.unwrap(), 5);
        assert_eq!(Max::default().resolve("any").await.unwrap(), DEFAULT_MAX);
    }

    #[tokio::test]
    async fn test_dynamic_max_sees_key() {
        let max = Max::from_fn(|key| async move {
            if key == "10.0.0.1" {
                Ok(100)
            } else {
                Ok(1)
            }
        });

        assert_eq!(max.resolve("10.0.0.1").await.unwrap(), 100);
        assert_eq!(max.resolve("10.0.0.2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dynamic_max_error() {
        let max = Max::from_fn(|_| async { Err::<u64, BoxError>("quota service down".into()) });

        let err = max.resolve("1.1.1.1").await.unwrap_err();
        assert_eq!(err.to_string(), "quota service down");
    }
}
