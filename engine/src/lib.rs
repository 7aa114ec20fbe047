//! Session engine for the AI-twin portrait wizard.
//!
//! The engine owns everything between the user interface and the Gemini
//! gateway: the wizard state machine ([`session`]), the coin ledger
//! ([`ledger`]), the image codec ([`codec`]), the async pipelines that run
//! generation and recompose tickets ([`pipeline`]), saving gallery images
//! ([`download`]) and configuration ([`config`]).
//!
//! The intended shape is event-in, state-out: a frontend reads
//! [`WizardSession::state`] to decide what to show, raises events on the
//! session, and runs any returned ticket through a pipeline, feeding the
//! outcome back with the matching `apply_*` call.

pub mod codec;
pub mod config;
pub mod download;
pub mod ledger;
pub mod pipeline;
pub mod session;

pub use codec::Photo;
pub use config::{ConfigError, DoppelConfig};
pub use download::{DownloadError, save_artifact, save_artifact_as};
pub use ledger::CreditLedger;
pub use pipeline::{run_generation, run_recompose};
pub use session::{
    AddOutcome, ApplyOutcome, GenerationTicket, Notice, RecomposeSlot, RecomposeTicket, StepState,
    TwinProfile, WizardSession, WizardSettings,
};
