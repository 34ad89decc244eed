use std::sync::Arc;
use std::time::Instant;

use crate::decoding::domain::file_decoder::FileDecoder;
use crate::decoding::domain::raw_file::RawFile;
use crate::detection::domain::detector_gateway::DetectorGateway;
use crate::imaging::domain::image_resource_manager::ImageResourceManager;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::pipeline_error::PipelineError;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::pipeline::pipeline_state::{PipelineState, Resolution};

/// Runs decode, materialize and detect in strict sequence and reduces the
/// outcome to a single boolean.
///
/// The controller holds no per-call state, so one instance can serve any
/// number of concurrent [`detect_face`](Self::detect_face) calls.
#[derive(Clone)]
pub struct PipelineController {
    decoder: FileDecoder,
    images: ImageResourceManager,
    gateway: DetectorGateway,
    logger: Arc<dyn PipelineLogger>,
}

impl PipelineController {
    pub fn new(decoder: FileDecoder, images: ImageResourceManager, gateway: DetectorGateway) -> Self {
        Self {
            decoder,
            images,
            gateway,
            logger: Arc::new(NullPipelineLogger),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.gateway = self
            .gateway
            .with_readiness_timeout(config.readiness_timeout)
            .with_detection_timeout(config.detection_timeout);
        self
    }

    /// True only when the file decoded, loaded as an image, and the detector
    /// reported at least one face. Every failure resolves to `false`.
    pub async fn detect_face(&self, file: &dyn RawFile) -> bool {
        let mut run = Invocation::new(self.logger.as_ref());

        let resolution = match self.evaluate(file, &mut run).await {
            Ok(true) => Resolution::FaceFound,
            Ok(false) => Resolution::NoFace,
            Err(e) => {
                log::warn!("Face check failed for {}: {}", file.describe(), e.chain());
                self.logger.failure(&e);
                Resolution::Failed(e.kind())
            }
        };

        run.resolve(resolution);
        resolution.as_bool()
    }

    async fn evaluate(
        &self,
        file: &dyn RawFile,
        run: &mut Invocation<'_>,
    ) -> Result<bool, PipelineError> {
        run.advance(PipelineState::Decoding);
        let bytes = self.decoder.decode(file).await?;

        run.advance(PipelineState::Materializing);
        let image = self.images.materialize(&bytes).await?;
        drop(bytes);

        run.advance(PipelineState::AwaitingDetectorReady);
        self.gateway.await_ready().await?;

        run.advance(PipelineState::Detecting);
        let result = self.gateway.submit(&image).await?;

        log::debug!("{} face(s) in {}", result.len(), file.describe());
        Ok(result.has_faces())
    }
}

/// State and stage timing for a single `detect_face` call.
struct Invocation<'a> {
    state: PipelineState,
    logger: &'a dyn PipelineLogger,
    entered: Instant,
}

impl<'a> Invocation<'a> {
    fn new(logger: &'a dyn PipelineLogger) -> Self {
        Self {
            state: PipelineState::Idle,
            logger,
            entered: Instant::now(),
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        if self.state != PipelineState::Idle {
            let elapsed_ms = self.entered.elapsed().as_secs_f64() * 1000.0;
            self.logger.timing(self.state.name(), elapsed_ms);
        }
        log::debug!("Pipeline {} -> {next}", self.state);
        self.logger.transition(self.state, next);
        self.state = next;
        self.entered = Instant::now();
    }

    fn resolve(mut self, resolution: Resolution) {
        self.advance(PipelineState::Resolved(resolution.as_bool()));
        self.logger.resolved(resolution);
    }
}
