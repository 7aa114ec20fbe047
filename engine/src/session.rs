//! Wizard session state machine.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐ proceed (5..=10 photos) ┌─────────┐ confirm_payment ┌────────────┐
//! │ Upload │ ──────────────────────> │ Payment │ ──────────────> │ Generating │
//! └────────┘ <────────────────────── └─────────┘                 └────────────┘
//!     ^                back                                            │
//!     │                                                apply_generation│
//!     │ failure (photos retained)                                      v
//!     ├────────────────────────────────────────────────────────── success
//!     │                                                               │
//!     │        restart (full reset, from any step)                    v
//!     │<──────────────────────────────┐                         ┌─────────┐
//!     │                               │      save_and_continue  │ Results │
//!     │                        ┌───────────┐ <───────────────── └─────────┘
//!     └─────────────────────── │ Subscribe │
//!                              └───────────┘
//! ```
//!
//! Each step variant carries only the data valid in that step, so invalid
//! combinations (a gallery while still uploading, photos after generation)
//! are unrepresentable.
//!
//! # Stale Responses
//!
//! Side-effecting transitions mint a [`RequestToken`]. A completing pipeline
//! result is applied only while its token is still the active one; anything
//! else is discarded as stale. Restart therefore implicitly invalidates any
//! in-flight work without cancelling it.

use doppel_types::{
    EncodedImage, Gallery, ImageArtifact, MAX_PHOTOS, MIN_PHOTOS, PROMO_CODE, RECOMPOSE_COST,
    RequestToken, STARTING_COINS, TwinDescription, WizardError, WizardStep,
};

use crate::codec::{self, Photo};
use crate::ledger::CreditLedger;

/// The session's immutable twin identity: description plus gallery, created
/// together by one generation run.
#[derive(Debug, Clone)]
pub struct TwinProfile {
    pub description: TwinDescription,
    pub gallery: Gallery,
}

/// Inline message attached to the upload step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Blocks nothing further but marks a failed action.
    Error(String),
    /// Informational, e.g. the photo cap was hit. Does not block.
    Warning(String),
}

impl Notice {
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Notice::Error(m) | Notice::Warning(m) => m,
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Notice::Error(_))
    }
}

/// At most one recompose result exists at a time; starting a new request
/// supersedes the previous one immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomposeSlot {
    Idle,
    Pending { token: RequestToken },
    Ready(ImageArtifact),
    Failed(String),
}

/// Step state, one variant per wizard step.
#[derive(Debug, Clone)]
pub enum StepState {
    Upload {
        photos: Vec<Photo>,
        notice: Option<Notice>,
    },
    Payment {
        photos: Vec<Photo>,
        promo_applied: bool,
    },
    Generating {
        photos: Vec<Photo>,
        token: RequestToken,
    },
    Results {
        twin: TwinProfile,
    },
    Subscribe {
        twin: TwinProfile,
        recompose: RecomposeSlot,
    },
}

impl StepState {
    #[must_use]
    pub const fn step(&self) -> WizardStep {
        match self {
            StepState::Upload { .. } => WizardStep::Upload,
            StepState::Payment { .. } => WizardStep::Payment,
            StepState::Generating { .. } => WizardStep::Generating,
            StepState::Results { .. } => WizardStep::Results,
            StepState::Subscribe { .. } => WizardStep::Subscribe,
        }
    }
}

/// Result of an `add_photos` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// How many of the offered photos were actually added.
    pub added: usize,
    /// Cap warning, when the offer exceeded the remaining slots.
    pub warning: Option<String>,
}

/// Work order handed to the caller when the session enters Generating.
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    pub token: RequestToken,
    pub photos: Vec<Photo>,
}

/// Work order for a recompose run.
#[derive(Debug, Clone)]
pub struct RecomposeTicket {
    pub token: RequestToken,
    pub description: TwinDescription,
    pub reference: EncodedImage,
}

/// Whether a pipeline completion was applied or discarded as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Stale,
}

/// Coin tuning, usually sourced from the config file.
#[derive(Debug, Clone, Copy)]
pub struct WizardSettings {
    pub starting_coins: u32,
    pub recompose_cost: u32,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            starting_coins: STARTING_COINS,
            recompose_cost: RECOMPOSE_COST,
        }
    }
}

/// The single owner of all session state. Views read it and raise events;
/// only the event handlers below mutate it, one at a time.
#[derive(Debug)]
pub struct WizardSession {
    state: StepState,
    ledger: CreditLedger,
    settings: WizardSettings,
    next_token: u64,
}

impl WizardSession {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(WizardSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: WizardSettings) -> Self {
        Self {
            state: StepState::Upload {
                photos: Vec::new(),
                notice: None,
            },
            ledger: CreditLedger::with_balance(settings.starting_coins),
            settings,
            next_token: 0,
        }
    }

    /// Cost of one recompose run, in coins.
    #[must_use]
    pub const fn recompose_cost(&self) -> u32 {
        self.settings.recompose_cost
    }

    #[must_use]
    pub fn state(&self) -> &StepState {
        &self.state
    }

    #[must_use]
    pub const fn step(&self) -> WizardStep {
        self.state.step()
    }

    #[must_use]
    pub const fn balance(&self) -> u32 {
        self.ledger.balance()
    }

    fn mint_token(&mut self) -> RequestToken {
        self.next_token += 1;
        RequestToken::new(self.next_token)
    }

    // ------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------

    /// Append photos, capped at [`MAX_PHOTOS`] total. An offer that exceeds
    /// the remaining slots fills them and records a warning; the event is
    /// never blocked.
    pub fn add_photos(&mut self, offered: Vec<Photo>) -> Result<AddOutcome, WizardError> {
        let StepState::Upload { photos, notice } = &mut self.state else {
            return Err(invalid_event("add_photos", self.state.step()));
        };

        // A new selection clears stale messages.
        *notice = None;

        let remaining = MAX_PHOTOS.saturating_sub(photos.len());
        let offered_count = offered.len();
        let added = offered_count.min(remaining);
        photos.extend(offered.into_iter().take(remaining));

        let warning = if offered_count > remaining {
            let message = if added > 0 {
                let noun = if added == 1 { "file was" } else { "files were" };
                format!("Maximum of {MAX_PHOTOS} images reached. Only the first {added} {noun} added.")
            } else {
                format!("Maximum of {MAX_PHOTOS} images reached.")
            };
            *notice = Some(Notice::Warning(message.clone()));
            Some(message)
        } else {
            None
        };

        Ok(AddOutcome { added, warning })
    }

    /// Remove the photo at `index`, clearing any notice since space was made.
    pub fn remove_photo(&mut self, index: usize) -> Result<(), WizardError> {
        let StepState::Upload { photos, notice } = &mut self.state else {
            return Err(invalid_event("remove_photo", self.state.step()));
        };

        if index >= photos.len() {
            return Err(WizardError::Validation(format!(
                "no photo at position {index}"
            )));
        }
        photos.remove(index);
        *notice = None;
        Ok(())
    }

    /// Advance to payment. Requires 5 to 10 photos; a guard failure records
    /// an inline validation notice and stays in Upload.
    pub fn proceed_to_payment(&mut self) -> Result<(), WizardError> {
        let photos = match &mut self.state {
            StepState::Upload { photos, notice } => {
                if !(MIN_PHOTOS..=MAX_PHOTOS).contains(&photos.len()) {
                    let message =
                        format!("Please upload between {MIN_PHOTOS} and {MAX_PHOTOS} images.");
                    *notice = Some(Notice::Error(message.clone()));
                    return Err(WizardError::Validation(message));
                }
                std::mem::take(photos)
            }
            other => return Err(invalid_event("proceed_to_payment", other.step())),
        };

        self.state = StepState::Payment {
            photos,
            promo_applied: false,
        };
        Ok(())
    }

    // ------------------------------------------------------------------
    // Payment
    // ------------------------------------------------------------------

    /// Return to the upload step, keeping the selected photos.
    pub fn back_to_upload(&mut self) -> Result<(), WizardError> {
        let photos = match &mut self.state {
            StepState::Payment { photos, .. } => std::mem::take(photos),
            other => return Err(invalid_event("back_to_upload", other.step())),
        };

        self.state = StepState::Upload {
            photos,
            notice: None,
        };
        Ok(())
    }

    /// Confirm payment (mocked - always succeeds) or apply a promo code.
    ///
    /// The promo code is matched case-insensitively; a match waives the cost
    /// but proceeds identically. An unrecognized code is a validation error
    /// and the session stays in Payment.
    ///
    /// On success the session enters Generating and the returned ticket must
    /// be run through the generation pipeline, with its outcome fed back via
    /// [`WizardSession::apply_generation`].
    pub fn confirm_payment(
        &mut self,
        promo: Option<&str>,
    ) -> Result<GenerationTicket, WizardError> {
        let StepState::Payment { photos, .. } = &mut self.state else {
            return Err(invalid_event("confirm_payment", self.state.step()));
        };

        let waived = match promo.map(str::trim).filter(|code| !code.is_empty()) {
            Some(code) if code.eq_ignore_ascii_case(PROMO_CODE) => true,
            Some(_) => {
                return Err(WizardError::Validation(
                    "Invalid promo code. Please try again.".to_string(),
                ));
            }
            None => false,
        };

        let photos = std::mem::take(photos);

        if waived {
            tracing::info!("Promo code applied; payment waived");
        }

        let token = self.mint_token();
        self.state = StepState::Generating {
            photos: photos.clone(),
            token,
        };
        Ok(GenerationTicket { token, photos })
    }

    // ------------------------------------------------------------------
    // Generating
    // ------------------------------------------------------------------

    /// Apply a finished generation run.
    ///
    /// The outcome is accepted only while the session is still Generating
    /// with the same token; anything else is stale and discarded. Failure
    /// returns to Upload with the photos retained and a generic error - the
    /// pipeline is one atomic unit of work, no partial state survives.
    pub fn apply_generation(
        &mut self,
        token: RequestToken,
        outcome: Result<TwinProfile, WizardError>,
    ) -> ApplyOutcome {
        let photos = match &mut self.state {
            StepState::Generating {
                token: active,
                photos,
            } if *active == token => std::mem::take(photos),
            _ => {
                tracing::warn!(%token, step = %self.state.step(), "Discarding stale generation result");
                return ApplyOutcome::Stale;
            }
        };

        match outcome {
            Ok(twin) => {
                self.state = StepState::Results { twin };
            }
            Err(err) => {
                tracing::warn!(%err, "Generation failed; returning to upload");
                self.state = StepState::Upload {
                    photos,
                    notice: Some(Notice::Error(WizardError::RemoteService.to_string())),
                };
            }
        }
        ApplyOutcome::Applied
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    /// Save the twin and move on to the subscription step.
    pub fn save_and_continue(&mut self) -> Result<(), WizardError> {
        let twin = match &mut self.state {
            StepState::Results { twin } => twin.clone(),
            other => return Err(invalid_event("save_and_continue", other.step())),
        };

        self.state = StepState::Subscribe {
            twin,
            recompose: RecomposeSlot::Idle,
        };
        Ok(())
    }

    // ------------------------------------------------------------------
    // Subscribe
    // ------------------------------------------------------------------

    /// Purchase a coin pack. Always succeeds; clears a previously recorded
    /// recompose failure message.
    pub fn purchase(&mut self, pack: doppel_types::CoinPack) -> Result<u32, WizardError> {
        let StepState::Subscribe { recompose, .. } = &mut self.state else {
            return Err(invalid_event("purchase", self.state.step()));
        };

        if matches!(recompose, RecomposeSlot::Failed(_)) {
            *recompose = RecomposeSlot::Idle;
        }
        self.ledger.purchase(pack);
        Ok(self.ledger.balance())
    }

    /// Start a recompose run against a reference image (a data URI).
    ///
    /// Authorizes the coin cost without debiting; the debit happens when the
    /// result is applied. Any previous result is cleared immediately - the
    /// slot shows Pending until the new run settles.
    pub fn begin_recompose(&mut self, reference_uri: &str) -> Result<RecomposeTicket, WizardError> {
        let description = match &self.state {
            StepState::Subscribe { twin, recompose } => {
                if matches!(recompose, RecomposeSlot::Pending { .. }) {
                    return Err(invalid_event("begin_recompose", WizardStep::Subscribe));
                }
                twin.description.clone()
            }
            other => return Err(invalid_event("begin_recompose", other.step())),
        };

        if let Err(err) = self.ledger.authorize(self.settings.recompose_cost) {
            if let StepState::Subscribe { recompose, .. } = &mut self.state {
                *recompose = RecomposeSlot::Failed(err.to_string());
            }
            return Err(err);
        }

        let reference = codec::strip_data_uri(reference_uri)?;

        let token = self.mint_token();
        if let StepState::Subscribe { recompose, .. } = &mut self.state {
            *recompose = RecomposeSlot::Pending { token };
        }

        Ok(RecomposeTicket {
            token,
            description,
            reference,
        })
    }

    /// Apply a finished recompose run. Token-guarded like generation. The
    /// coin cost is debited only on success.
    pub fn apply_recompose(
        &mut self,
        token: RequestToken,
        outcome: Result<ImageArtifact, WizardError>,
    ) -> ApplyOutcome {
        let is_active = matches!(
            &self.state,
            StepState::Subscribe {
                recompose: RecomposeSlot::Pending { token: active },
                ..
            } if *active == token
        );
        if !is_active {
            tracing::warn!(%token, step = %self.state.step(), "Discarding stale recompose result");
            return ApplyOutcome::Stale;
        }

        let slot = match outcome {
            Ok(artifact) => match self.ledger.debit(self.settings.recompose_cost) {
                Ok(()) => RecomposeSlot::Ready(artifact),
                Err(err) => RecomposeSlot::Failed(err.to_string()),
            },
            Err(err) => {
                tracing::warn!(%err, "Recompose failed");
                RecomposeSlot::Failed("Failed to recreate image. Please try again.".to_string())
            }
        };

        if let StepState::Subscribe { recompose, .. } = &mut self.state {
            *recompose = slot;
        }
        ApplyOutcome::Applied
    }

    // ------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------

    /// Full reset from any step: empty upload set, fresh ledger, everything
    /// else dropped. Token minting stays monotonic so in-flight results from
    /// before the reset can never be applied.
    pub fn restart(&mut self) {
        tracing::info!("Session restarted");
        self.state = StepState::Upload {
            photos: Vec::new(),
            notice: None,
        };
        self.ledger = CreditLedger::with_balance(self.settings.starting_coins);
    }

    #[cfg(test)]
    pub(crate) fn ledger_mut(&mut self) -> &mut CreditLedger {
        &mut self.ledger
    }
}

impl Default for WizardSession {
    fn default() -> Self {
        Self::new()
    }
}

const fn invalid_event(event: &'static str, step: WizardStep) -> WizardError {
    WizardError::InvalidEvent { event, step }
}
