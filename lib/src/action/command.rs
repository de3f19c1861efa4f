// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{future::Future, marker::PhantomData};

use async_trait::async_trait;

use ledger_dmk_apdu::Command;
use ledger_dmk_core::UserInteractionRequired;

use super::{DeviceAction, DeviceApi};
use crate::Error;

/// Send a single [Command] in the target application
#[derive(Clone, PartialEq, Debug)]
pub struct SendCommandInAppDeviceAction<C> {
    app_name: String,
    command: C,
    interaction: UserInteractionRequired,
}

impl<C: Command> SendCommandInAppDeviceAction<C> {
    pub fn new(
        app_name: impl Into<String>,
        command: C,
        interaction: UserInteractionRequired,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            command,
            interaction,
        }
    }
}

#[async_trait]
impl<C> DeviceAction for SendCommandInAppDeviceAction<C>
where
    C: Command + Send + Sync + 'static,
    C::Response: 'static,
{
    type Output = C::Response;

    fn app_name(&self) -> Option<&str> {
        Some(&self.app_name)
    }

    fn required_user_interaction(&self) -> UserInteractionRequired {
        self.interaction
    }

    async fn run(&self, api: &DeviceApi) -> Result<C::Response, Error> {
        api.send_command(&self.command).await
    }
}

/// Call an async task in the target application.
///
/// The task receives a [DeviceApi] bound to the session, for multi-step
/// exchanges such as chunked or interrupted commands.
pub struct CallTaskInAppDeviceAction<F, O> {
    app_name: String,
    interaction: UserInteractionRequired,
    task: F,
    _o: PhantomData<fn() -> O>,
}

impl<F, Fut, O> CallTaskInAppDeviceAction<F, O>
where
    F: Fn(DeviceApi) -> Fut,
    Fut: Future<Output = Result<O, Error>>,
{
    pub fn new(app_name: impl Into<String>, interaction: UserInteractionRequired, task: F) -> Self {
        Self {
            app_name: app_name.into(),
            interaction,
            task,
            _o: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, O> DeviceAction for CallTaskInAppDeviceAction<F, O>
where
    F: Fn(DeviceApi) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, Error>> + Send + 'static,
    O: Send + 'static,
{
    type Output = O;

    fn app_name(&self) -> Option<&str> {
        Some(&self.app_name)
    }

    fn required_user_interaction(&self) -> UserInteractionRequired {
        self.interaction
    }

    async fn run(&self, api: &DeviceApi) -> Result<O, Error> {
        (self.task)(api.clone()).await
    }
}
