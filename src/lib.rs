pub mod error;
pub mod profile;
pub mod config;
pub mod job;
pub mod blob_store;
pub mod probe;
pub mod transcoder;
pub mod scene_normalizer;
pub mod timeline;
pub mod audio_segmenter;
pub mod tail_extender;
pub mod scene_muxer;
pub mod timeline_assembler;
pub mod engine;
pub mod request;
pub mod processor;
pub mod handler;

#[cfg(test)]
mod testing;

pub use error::{RenderError, RenderResult};
pub use profile::{CanonicalFormat, EncodingProfile};
pub use config::{ConfigLoader, ConfigOverrides, EngineConfig, ServiceConfig};
pub use job::{JobState, JobTracker, LastAudioMode, LastSceneMode, LastVideoMode, RenderJob, Scene, TailMode};
pub use blob_store::{BlobRef, BlobStore, HttpBlobStore, LocalBlobStore, RoutingBlobStore};
pub use probe::{FfmpegProber, MediaInfo, MediaProber};
pub use transcoder::{FfmpegTranscoder, MediaTranscoder, TranscodeRequest};
pub use scene_normalizer::{plan_normalization, NormalizePlan, SceneNormalizer, VideoOperation};
pub use timeline::{AudioWindow, ScriptTimeline};
pub use engine::{JobInputs, RenderOutcome, SceneReport, TimelineEngine};
pub use request::{RenderRequest, RenderResponse};
pub use processor::{RenderService, RenderSummary};
