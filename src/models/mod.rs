//! Data model shared by the consumer, executor, and analyzer.

mod login_trace;
mod result;
mod task;

pub use login_trace::{AuthMethod, AuthMethodFinding, AuthMethods, IdpFrame, LoginTraceResult};
pub use result::{
    AnalysisFailure, AnalysisOutcome, ContentAnalyzable, ElementBox, LandscapeResult,
    LastpassIcon, LoginPageCandidate, MetadataFinding, MfaType, NavCredCall, RecognizedIdp,
    ResolvedOutcome, Validity,
};
pub use task::{AnalysisKind, TaskConfig, TaskRequest, TaskState};
