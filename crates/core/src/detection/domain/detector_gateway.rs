use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::detection::domain::detection_capability::{
    BoxError, DetectionCapability, ReadinessProvider,
};
use crate::detection::domain::face::DetectionResult;
use crate::imaging::domain::image_resource::ImageResource;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector unavailable: {0}")]
    Unavailable(#[source] BoxError),
    #[error("detector not ready after {0:?}")]
    ReadinessTimedOut(Duration),
    #[error("detection call failed: {0}")]
    Call(#[source] BoxError),
    #[error("detection call did not finish within {0:?}")]
    CallTimedOut(Duration),
}

impl DetectorError {
    /// True when the failure happened before any image was submitted.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            DetectorError::Unavailable(_) | DetectorError::ReadinessTimedOut(_)
        )
    }
}

/// Awaits detector readiness, then submits one image.
///
/// Each collaborator call runs in its own task so that a panic inside a
/// backend surfaces as an error of the matching kind instead of unwinding
/// through the caller.
#[derive(Clone)]
pub struct DetectorGateway {
    readiness: Arc<dyn ReadinessProvider>,
    capability: Arc<dyn DetectionCapability>,
    readiness_timeout: Option<Duration>,
    detection_timeout: Option<Duration>,
}

impl DetectorGateway {
    pub fn new(
        readiness: Arc<dyn ReadinessProvider>,
        capability: Arc<dyn DetectionCapability>,
    ) -> Self {
        Self {
            readiness,
            capability,
            readiness_timeout: None,
            detection_timeout: None,
        }
    }

    /// Gateway over a backend that manages its own readiness.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ReadinessProvider + DetectionCapability + 'static,
    {
        Self::new(backend.clone(), backend)
    }

    pub fn with_readiness_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_detection_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.detection_timeout = timeout;
        self
    }

    /// Suspends on readiness first; the image is never submitted unless
    /// readiness succeeded.
    pub async fn detect(&self, image: &ImageResource) -> Result<DetectionResult, DetectorError> {
        self.await_ready().await?;
        self.submit(image).await
    }

    pub(crate) async fn await_ready(&self) -> Result<(), DetectorError> {
        let readiness = Arc::clone(&self.readiness);
        let handle = tokio::spawn(async move { readiness.ensure_ready().await });

        // A timed-out initialisation keeps running in the background; later
        // calls may find the detector ready.
        match join_within(handle, self.readiness_timeout).await {
            Joined::Done(result) => result.map_err(DetectorError::Unavailable),
            Joined::TimedOut(limit, _) => Err(DetectorError::ReadinessTimedOut(limit)),
        }
    }

    pub(crate) async fn submit(
        &self,
        image: &ImageResource,
    ) -> Result<DetectionResult, DetectorError> {
        let capability = Arc::clone(&self.capability);
        let image = image.clone();
        let handle = tokio::spawn(async move { capability.detect_all_faces(&image).await });

        match join_within(handle, self.detection_timeout).await {
            Joined::Done(result) => result.map_err(DetectorError::Call),
            Joined::TimedOut(limit, handle) => {
                handle.abort();
                Err(DetectorError::CallTimedOut(limit))
            }
        }
    }
}

enum Joined<T> {
    Done(Result<T, BoxError>),
    TimedOut(Duration, JoinHandle<Result<T, BoxError>>),
}

async fn join_within<T>(
    mut handle: JoinHandle<Result<T, BoxError>>,
    limit: Option<Duration>,
) -> Joined<T> {
    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => return Joined::TimedOut(limit, handle),
        },
        None => handle.await,
    };
    Joined::Done(joined.unwrap_or_else(|e| Err(Box::new(e) as BoxError)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face::FaceDescriptor;
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    struct StubReadiness {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl StubReadiness {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ReadinessProvider for StubReadiness {
        async fn ensure_ready(&self) -> Result<(), BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Fail => Err("model fetch failed".into()),
                Behavior::Panic => panic!("readiness blew up"),
                Behavior::Hang => std::future::pending().await,
            }
        }
    }

    struct StubCapability {
        behavior: Behavior,
        faces: usize,
        calls: AtomicUsize,
        finished: AtomicBool,
    }

    impl StubCapability {
        fn new(behavior: Behavior, faces: usize) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                faces,
                calls: AtomicUsize::new(0),
                finished: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl DetectionCapability for StubCapability {
        async fn detect_all_faces(
            &self,
            _image: &ImageResource,
        ) -> Result<DetectionResult, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = match self.behavior {
                Behavior::Succeed => Ok(DetectionResult::new(
                    (0..self.faces)
                        .map(|i| FaceDescriptor {
                            x: i as f32,
                            y: 0.0,
                            width: 5.0,
                            height: 5.0,
                            confidence: 0.9,
                        })
                        .collect(),
                )),
                Behavior::Fail => Err("inference error".into()),
                Behavior::Panic => panic!("backend crashed"),
                Behavior::Hang => std::future::pending().await,
            };
            self.finished.store(true, Ordering::SeqCst);
            result
        }
    }

    fn image() -> ImageResource {
        ImageResource::new(RgbImage::new(8, 8), None)
    }

    #[tokio::test]
    async fn test_returns_detector_result() {
        let capability = StubCapability::new(Behavior::Succeed, 2);
        let gateway = DetectorGateway::new(StubReadiness::new(Behavior::Succeed), capability);

        let result = gateway.detect(&image()).await.unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_readiness_awaited_before_detection() {
        let readiness = StubReadiness::new(Behavior::Succeed);
        let capability = StubCapability::new(Behavior::Succeed, 0);
        let gateway = DetectorGateway::new(readiness.clone(), capability.clone());

        gateway.detect(&image()).await.unwrap();
        gateway.detect(&image()).await.unwrap();

        assert_eq!(readiness.calls.load(Ordering::SeqCst), 2);
        assert_eq!(capability.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_readiness_failure_skips_detection() {
        let capability = StubCapability::new(Behavior::Succeed, 1);
        let gateway =
            DetectorGateway::new(StubReadiness::new(Behavior::Fail), capability.clone());

        let err = gateway.detect(&image()).await.unwrap_err();

        assert!(matches!(err, DetectorError::Unavailable(_)));
        assert!(err.is_unavailable());
        assert_eq!(capability.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_readiness_panic_is_unavailable() {
        let capability = StubCapability::new(Behavior::Succeed, 1);
        let gateway =
            DetectorGateway::new(StubReadiness::new(Behavior::Panic), capability.clone());

        let err = gateway.detect(&image()).await.unwrap_err();

        assert!(matches!(err, DetectorError::Unavailable(_)));
        assert_eq!(capability.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_readiness_timeout() {
        let capability = StubCapability::new(Behavior::Succeed, 1);
        let gateway = DetectorGateway::new(StubReadiness::new(Behavior::Hang), capability.clone())
            .with_readiness_timeout(Some(Duration::from_millis(20)));

        let err = gateway.detect(&image()).await.unwrap_err();

        assert!(matches!(err, DetectorError::ReadinessTimedOut(_)));
        assert!(err.is_unavailable());
        assert_eq!(capability.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_call_failure_is_call_error() {
        let gateway = DetectorGateway::new(
            StubReadiness::new(Behavior::Succeed),
            StubCapability::new(Behavior::Fail, 0),
        );

        let err = gateway.detect(&image()).await.unwrap_err();

        assert!(matches!(err, DetectorError::Call(_)));
        assert!(!err.is_unavailable());
    }

    #[tokio::test]
    async fn test_call_panic_is_contained() {
        let gateway = DetectorGateway::new(
            StubReadiness::new(Behavior::Succeed),
            StubCapability::new(Behavior::Panic, 0),
        );

        let err = gateway.detect(&image()).await.unwrap_err();

        assert!(matches!(err, DetectorError::Call(_)));
    }

    #[tokio::test]
    async fn test_call_timeout_aborts_detection() {
        let capability = StubCapability::new(Behavior::Hang, 0);
        let gateway =
            DetectorGateway::new(StubReadiness::new(Behavior::Succeed), capability.clone())
                .with_detection_timeout(Some(Duration::from_millis(20)));

        let err = gateway.detect(&image()).await.unwrap_err();

        assert!(matches!(err, DetectorError::CallTimedOut(_)));
        assert_eq!(capability.calls.load(Ordering::SeqCst), 1);
        assert!(!capability.finished.load(Ordering::SeqCst));
    }

    struct Backend {
        ready: AtomicBool,
    }

    #[async_trait]
    impl ReadinessProvider for Backend {
        async fn ensure_ready(&self) -> Result<(), BoxError> {
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl DetectionCapability for Backend {
        async fn detect_all_faces(
            &self,
            _image: &ImageResource,
        ) -> Result<DetectionResult, BoxError> {
            if !self.ready.load(Ordering::SeqCst) {
                return Err("not ready".into());
            }
            Ok(DetectionResult::default())
        }
    }

    #[tokio::test]
    async fn test_from_backend_shares_state() {
        let gateway = DetectorGateway::from_backend(Arc::new(Backend {
            ready: AtomicBool::new(false),
        }));

        assert!(gateway.detect(&image()).await.unwrap().is_empty());
    }
}
