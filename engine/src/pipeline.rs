//! Async pipelines bridging the session state machine and the Gemini
//! gateway.
//!
//! The session hands out a ticket when it enters a side-effecting state;
//! a pipeline runs the ticket to completion and produces the outcome the
//! session's `apply_*` event expects. Gateway failures are logged with
//! their specific cause but collapse to the one generic
//! [`WizardError::RemoteService`] the user sees - which of the calls
//! failed is an operational detail, not something to act on.

use doppel_gateway::{GatewayError, GeminiClient};
use doppel_types::{ImageArtifact, WizardError};

use crate::codec;
use crate::session::{GenerationTicket, RecomposeTicket, TwinProfile};

/// Run a full generation: encode every photo, describe the set, then
/// synthesize the four-portrait gallery. One atomic unit of work; any
/// failure fails the whole run.
pub async fn run_generation(
    client: &GeminiClient,
    ticket: &GenerationTicket,
) -> Result<TwinProfile, WizardError> {
    let images = ticket
        .photos
        .iter()
        .map(codec::encode)
        .collect::<Result<Vec<_>, _>>()?;

    let description = client.describe(&images).await.map_err(remote)?;
    let gallery = client.synthesize_set(&description).await.map_err(remote)?;

    Ok(TwinProfile {
        description,
        gallery,
    })
}

/// Run a recompose: one image-out call against the twin's description and
/// the reference image carried by the ticket.
pub async fn run_recompose(
    client: &GeminiClient,
    ticket: &RecomposeTicket,
) -> Result<ImageArtifact, WizardError> {
    client
        .recompose(&ticket.description, &ticket.reference)
        .await
        .map_err(remote)
}

fn remote(err: GatewayError) -> WizardError {
    tracing::error!(%err, "Gateway call failed");
    WizardError::RemoteService
}
