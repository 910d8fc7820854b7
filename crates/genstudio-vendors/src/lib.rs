//! Hosted AI vendor adapters for genstudio
//!
//! Each vendor is wrapped in a [`GenerationProvider`]; the
//! [`ProviderRegistry`] picks one per generation kind. Long-running vendor
//! jobs are polled with [`poll_until`], which honors cancellation and a
//! maximum wait.

pub mod error;
pub mod logs;
pub mod poll;
pub mod provider;
pub mod registry;

#[cfg(feature = "vendor-elevenlabs")]
pub mod elevenlabs;
#[cfg(feature = "vendor-fal")]
pub mod fal;
#[cfg(feature = "vendor-replicate")]
pub mod replicate;

pub use error::{VendorError, VendorResult};
pub use logs::LogSink;
pub use poll::{poll_until, PollPolicy, PollStep};
pub use provider::{
    guess_content_type, Artifact, Credentials, GenerationContext, GenerationOutput,
    GenerationProvider, GenerationRequest, ProviderInfo,
};
pub use registry::ProviderRegistry;

#[cfg(feature = "vendor-elevenlabs")]
pub use elevenlabs::ElevenLabsProvider;
#[cfg(feature = "vendor-fal")]
pub use fal::FalProvider;
#[cfg(feature = "vendor-replicate")]
pub use replicate::ReplicateProvider;
