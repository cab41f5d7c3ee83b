use std::path::PathBuf;

use confab_core::BackendError;
use confab_core::dispatch::DispatchResult;
use confab_core::provision::ProvisionResult;
use crossterm::event::Event as TermEvent;

/// Unified event type for the main loop. Backend calls run on spawned
/// tasks and report back through one of the result variants.
pub enum AppEvent {
    Terminal(TermEvent),
    Tick,
    Sent(DispatchResult),
    Reset(Result<(), BackendError>),
    Provisioned(ProvisionResult),
    /// `announce` lists the models in the transcript once loaded.
    Models {
        result: Result<Vec<String>, BackendError>,
        announce: bool,
    },
    ModelSynced(Result<String, BackendError>),
    Exported {
        path: PathBuf,
        result: Result<String, BackendError>,
    },
    Quit,
}
