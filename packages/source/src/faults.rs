//! Fault injection wrappers for exercising failure paths end to end.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::{LandCoverProvider, ProjectedBox, SourceError};

/// Fails the first fetch with a `forced` error, then delegates.
#[derive(Debug)]
pub struct FailOnceLandCover<P> {
    inner: P,
    armed: AtomicBool,
}

impl<P> FailOnceLandCover<P> {
    #[must_use]
    pub const fn new(inner: P) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl<P: LandCoverProvider> LandCoverProvider for FailOnceLandCover<P> {
    fn source(&self) -> &str {
        self.inner.source()
    }

    fn year(&self) -> i32 {
        self.inner.year()
    }

    async fn fetch(&self, bbox: &ProjectedBox) -> Result<Vec<u8>, SourceError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            log::warn!("Forcing land cover failure for bbox {}", bbox.to_query());
            return Err(SourceError::Response {
                message: "forced land cover failure".to_string(),
            });
        }
        self.inner.fetch(bbox).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    struct Counting(AtomicU32);

    #[async_trait]
    impl LandCoverProvider for Counting {
        fn source(&self) -> &str {
            "counting"
        }

        fn year(&self) -> i32 {
            2023
        }

        async fn fetch(&self, _bbox: &ProjectedBox) -> Result<Vec<u8>, SourceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(b"II*\0".to_vec())
        }
    }

    #[tokio::test]
    async fn fails_only_the_first_call() {
        let provider = FailOnceLandCover::new(Counting(AtomicU32::new(0)));
        let bbox = ProjectedBox {
            min_x: 0,
            min_y: 0,
            max_x: 10,
            max_y: 10,
        };

        let err = provider.fetch(&bbox).await.unwrap_err();
        assert!(err.to_string().contains("forced"));
        assert!(provider.fetch(&bbox).await.is_ok());
        assert!(provider.fetch(&bbox).await.is_ok());
        assert_eq!(provider.inner.0.load(Ordering::SeqCst), 2);
        assert_eq!(provider.source(), "counting");
    }
}
