use std::sync::Arc;

use tracing::info_span;

use crate::broadcast::job_progress::JobPhase;
use crate::processor::{ImageEncoder, OcrEngine};
use crate::prompt::{build_prompt, PromptLibrary};
use crate::provider::{Analysis, AnalysisRequest, VisionProvider};
use crate::worker::job::Job;

use super::config::PipelineConfig;
use super::error::AttemptError;
use super::progress::ProgressReporter;

/// Runs one attempt for one image: encode, optional OCR, prompt assembly,
/// provider call. Pure with respect to the filesystem apart from reading
/// the source file; renames and bookkeeping stay with the orchestrator.
pub struct Pipeline {
    encoder: ImageEncoder,
    ocr: OcrEngine,
    prompts: PromptLibrary,
    provider: Arc<dyn VisionProvider>,
}

impl Pipeline {
    pub fn from_config(config: &PipelineConfig, provider: Arc<dyn VisionProvider>) -> Self {
        Self {
            encoder: ImageEncoder::default(),
            ocr: OcrEngine::from_settings(&config.ocr),
            prompts: PromptLibrary::with_overrides(&config.prompt_overrides),
            provider,
        }
    }

    pub fn run(
        &self,
        job: &Job,
        progress: &dyn ProgressReporter,
    ) -> Result<Analysis, AttemptError> {
        let _span = info_span!("pipeline",
            job_id = %job.id,
            filename = %job.filename(),
            attempt = job.attempt,
        )
        .entered();

        progress.report(JobPhase::Preprocessing, "Encoding image for upload...");
        let image = self.encoder.encode_for_upload(&job.source_path)?;

        let ocr_text = if job.options.ocr_enabled {
            progress.report(JobPhase::Ocr, "Extracting text via OCR...");
            self.ocr.extract_text(&job.source_path)
        } else {
            String::new()
        };

        let template = self.prompts.get(&job.options.prompt_key);
        let prompt = build_prompt(&template.template, &job.options, &ocr_text);

        progress.report(
            JobPhase::Analyzing,
            &format!("Requesting description from {}...", self.provider.name()),
        );
        let analysis = self.provider.analyze(&AnalysisRequest {
            image,
            prompt,
            vision_detail: job.options.vision_detail,
        })?;

        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::OcrSettings;
    use crate::pipeline::progress::NoopProgress;
    use crate::provider::ProviderError;
    use crate::worker::job::JobOptions;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Provider stub capturing the request it was handed.
    struct CapturingProvider {
        seen_prompt: Mutex<Option<String>>,
        result: fn() -> Result<Analysis, ProviderError>,
    }

    impl VisionProvider for CapturingProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, ProviderError> {
            *self.seen_prompt.lock().unwrap() = Some(request.prompt.clone());
            (self.result)()
        }
    }

    fn pipeline_config() -> PipelineConfig {
        PipelineConfig {
            ocr: OcrSettings::default(),
            prompt_overrides: HashMap::new(),
        }
    }

    fn job_for(path: PathBuf) -> Job {
        Job::new(
            path,
            JobOptions {
                filename_language: "English".to_string(),
                alttext_language: "English".to_string(),
                detail_level: Default::default(),
                vision_detail: Default::default(),
                ocr_enabled: false,
                context: None,
                prompt_key: "default".to_string(),
            },
        )
    }

    fn write_test_image(dir: &TempDir) -> PathBuf {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([200u8, 100, 50]));
        let path = dir.path().join("photo.png");
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_run_success_passes_prompt_to_provider() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_image(&tmp);

        let provider = Arc::new(CapturingProvider {
            seen_prompt: Mutex::new(None),
            result: || {
                Ok(Analysis {
                    title: "test photo".to_string(),
                    alt_text: "A test photo.".to_string(),
                    prompt_tokens: 10,
                    completion_tokens: 5,
                })
            },
        });

        let pipeline = Pipeline::from_config(&pipeline_config(), provider.clone());
        let analysis = pipeline.run(&job_for(path), &NoopProgress).unwrap();

        assert_eq!(analysis.title, "test photo");
        let prompt = provider.seen_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Respond ONLY with a valid JSON object"));
        assert!(!prompt.contains("Text detected via OCR"));
    }

    #[test]
    fn test_run_missing_file_is_process_error() {
        let provider = Arc::new(CapturingProvider {
            seen_prompt: Mutex::new(None),
            result: || unreachable!("provider must not be called"),
        });

        let pipeline = Pipeline::from_config(&pipeline_config(), provider);
        let err = pipeline
            .run(&job_for(PathBuf::from("/nonexistent/photo.png")), &NoopProgress)
            .unwrap_err();

        assert!(matches!(err, AttemptError::Process(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_run_provider_error_propagates() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_image(&tmp);

        let provider = Arc::new(CapturingProvider {
            seen_prompt: Mutex::new(None),
            result: || Err(ProviderError::Network("connection refused".to_string())),
        });

        let pipeline = Pipeline::from_config(&pipeline_config(), provider);
        let err = pipeline.run(&job_for(path), &NoopProgress).unwrap_err();

        assert!(matches!(err, AttemptError::Provider(_)));
        assert!(err.is_retryable());
    }
}
