use std::sync::Arc;

use url::Url;

use super::{MemoryStore, PoolConfig, ProviderFactory, ProviderPool};
use crate::Error;

/// Constructs a [ProviderPool] from an URI.
///
/// The query string configures the pool itself (see [PoolConfig]).
///
/// The following URIs are supported:
/// - `memory:`
///   Uses an in-process [MemoryStore], empty on start.
pub async fn from_addr(uri: &str) -> Result<ProviderPool, Error> {
    let url =
        Url::parse(uri).map_err(|e| Error::StorageError(format!("unable to parse url: {}", e)))?;

    let config: PoolConfig = serde_qs::from_str(url.query().unwrap_or_default())
        .map_err(|e| Error::InvalidRequest(format!("failed to parse parameters: {}", e)))?;

    let factory: Arc<dyn ProviderFactory> = match url.scheme() {
        "memory" => {
            // memory doesn't support host or path in the URL.
            if url.has_host() || !url.path().is_empty() {
                return Err(Error::StorageError("invalid url".to_string()));
            }
            Arc::new(MemoryStore::default())
        }
        _ => {
            return Err(Error::StorageError(format!(
                "unknown scheme: {}",
                url.scheme()
            )))
        }
    };

    Ok(ProviderPool::new(factory, config))
}

#[cfg(test)]
mod tests {
    use super::from_addr;
    use rstest::rstest;

    #[rstest]
    /// This uses an unsupported scheme.
    #[case::unsupported_scheme("http://foo.example/test", false)]
    /// This correctly sets the scheme, and doesn't set a path.
    #[case::memory_valid("memory://", true)]
    /// This configures the pool through the query string.
    #[case::memory_valid_max_idle("memory://?max_idle=2", true)]
    /// This passes a parameter the pool doesn't know about.
    #[case::memory_unknown_param("memory://?colour=blue", false)]
    /// This passes a non-numeric idle limit.
    #[case::memory_invalid_max_idle("memory://?max_idle=many", false)]
    /// This sets a memory url host to `foo`
    #[case::memory_invalid_host("memory://foo", false)]
    /// This sets a memory url path to "/", which is invalid.
    #[case::memory_invalid_root_path("memory:///", false)]
    /// This sets a memory url path to "/foo", which is invalid.
    #[case::memory_invalid_root_path_foo("memory:///foo", false)]
    #[tokio::test]
    async fn test_from_addr_tokio(#[case] uri_str: &str, #[case] exp_succeed: bool) {
        if exp_succeed {
            from_addr(uri_str).await.expect("should succeed");
        } else {
            assert!(from_addr(uri_str).await.is_err(), "should fail");
        }
    }
}
