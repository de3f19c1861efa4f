// Copyright (c) 2022-2023 The MobileCoin Foundation

use ledger_dmk_apdu::{os::AppAndVersion, StatusWord};

/// [`Engine`][super::Engine] input events, the result of executing an
/// [`Effect`][super::Effect] on the device
#[derive(Clone, Debug)]
pub enum Event<O, E> {
    /// Result of [`Effect::GetAppAndVersion`][super::Effect::GetAppAndVersion]
    AppAndVersion(Result<AppAndVersion, Failure<E>>),

    /// Result of [`Effect::CloseApp`][super::Effect::CloseApp]
    AppClosed(Result<(), Failure<E>>),

    /// Result of [`Effect::OpenApp`][super::Effect::OpenApp]
    AppOpened(Result<(), Failure<E>>),

    /// Retry delay elapsed
    Elapsed,

    /// Result of running the action body
    Ran(Result<O, E>),
}

/// Failed device step, with the status word reported by the device (if any)
#[derive(Clone, PartialEq, Debug)]
pub struct Failure<E> {
    pub status: Option<StatusWord>,
    pub error: E,
}

impl<E> Failure<E> {
    pub fn new(status: Option<StatusWord>, error: E) -> Self {
        Self { status, error }
    }
}
