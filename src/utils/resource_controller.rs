use futures::{StreamExt, TryFuture};
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::errors::Error;

type StoredErrorPolicyFn<ResourceType, State> =
    Box<dyn Fn(Arc<ResourceType>, &Error, Arc<State>) -> Action + Send + Sync>;
type StoredReconcileFn<ResourceType, State, Fut> =
    Box<dyn Fn(Arc<ResourceType>, Arc<State>) -> Fut + Send + Sync>;

pub struct ResourceControllerBuilder<ResourceType> {
    api: Api<ResourceType>,
    watcher_config: watcher::Config,
}
pub struct ResourceControllerBuilderWithState<ResourceType, State> {
    api: Api<ResourceType>,
    watcher_config: watcher::Config,
    state: Arc<State>,
}
pub struct ResourceControllerBuilderWithStateAndErrorPolicy<ResourceType, State> {
    api: Api<ResourceType>,
    watcher_config: watcher::Config,
    state: Arc<State>,
    error_policy: StoredErrorPolicyFn<ResourceType, State>,
}
pub struct ResourceController<ResourceType, State, UpdateFut, RemoveFut> {
    api: Api<ResourceType>,
    watcher_config: watcher::Config,
    state: Arc<State>,
    error_policy: StoredErrorPolicyFn<ResourceType, State>,
    update_fn: StoredReconcileFn<ResourceType, State, UpdateFut>,
    remove_fn: StoredReconcileFn<ResourceType, State, RemoveFut>,
}

/// Retryable errors come back after `retry_interval`, terminal ones wait for
/// the object to change.
pub fn requeue_if_retryable(error: &Error, retry_interval: Duration) -> Action {
    if error.is_retryable() {
        Action::requeue(retry_interval)
    } else {
        Action::await_change()
    }
}

impl<ResourceType> ResourceControllerBuilder<ResourceType> {
    pub fn new(api: Api<ResourceType>) -> ResourceControllerBuilder<ResourceType> {
        ResourceControllerBuilder {
            api,
            watcher_config: watcher::Config::default(),
        }
    }

    pub fn with_watcher_config(mut self, watcher_config: watcher::Config) -> Self {
        self.watcher_config = watcher_config;
        self
    }

    pub fn with_state<State>(self, state: State) -> ResourceControllerBuilderWithState<ResourceType, State> {
        ResourceControllerBuilderWithState {
            api: self.api,
            watcher_config: self.watcher_config,
            state: Arc::new(state),
        }
    }
}

impl<ResourceType, State> ResourceControllerBuilderWithState<ResourceType, State>
where
    ResourceType: kube::ResourceExt,
{
    pub fn with_default_error_policy(
        self,
        retry_interval: Duration,
    ) -> ResourceControllerBuilderWithStateAndErrorPolicy<ResourceType, State> {
        let error_policy_fn = move |object: Arc<ResourceType>, error: &Error, _ctx: Arc<State>| {
            let action = requeue_if_retryable(error, retry_interval);
            warn!(
                "reconcile of {} failed, next attempt {:?}: {}",
                object.name_any(),
                action,
                error
            );
            action
        };

        ResourceControllerBuilderWithStateAndErrorPolicy {
            api: self.api,
            watcher_config: self.watcher_config,
            state: self.state,
            error_policy: Box::new(error_policy_fn),
        }
    }
}

impl<ResourceType, State> ResourceControllerBuilderWithStateAndErrorPolicy<ResourceType, State> {
    pub fn with_functions<UpdateFut, RemoveFut>(
        self,
        update_fn: impl Fn(Arc<ResourceType>, Arc<State>) -> UpdateFut + Send + Sync + 'static,
        remove_fn: impl Fn(Arc<ResourceType>, Arc<State>) -> RemoveFut + Send + Sync + 'static,
    ) -> ResourceController<ResourceType, State, UpdateFut, RemoveFut>
    where
        UpdateFut: TryFuture<Ok = Action, Error = crate::Error> + Send + 'static,
        RemoveFut: TryFuture<Ok = Action, Error = crate::Error> + Send + 'static,
    {
        ResourceController {
            api: self.api,
            watcher_config: self.watcher_config,
            state: self.state,
            error_policy: self.error_policy,
            update_fn: Box::new(update_fn),
            remove_fn: Box::new(remove_fn),
        }
    }
}

impl<ResourceType, State, UpdateFut, RemoveFut>
    ResourceController<ResourceType, State, UpdateFut, RemoveFut>
where
    ResourceType: kube::Resource
        + kube::ResourceExt
        + Clone
        + Debug
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
    <ResourceType as kube::Resource>::DynamicType: Clone + Debug + Default + Eq + Hash + Unpin,
    UpdateFut: Future<Output = Result<Action, Error>> + Send + 'static,
    RemoveFut: Future<Output = Result<Action, Error>> + Send + 'static,
    State: Send + Sync + 'static,
{
    /// Runs until SIGINT or SIGTERM, letting in-flight reconciliations finish
    pub fn run(self) -> impl Future<Output = ()> {
        let remove_fn = Arc::new(self.remove_fn);
        let update_fn = Arc::new(self.update_fn);

        Controller::new(self.api, self.watcher_config)
            .shutdown_on_signal()
            .run(
                move |object: Arc<ResourceType>, state: Arc<State>| {
                    let remove_fn = remove_fn.clone();
                    let update_fn = update_fn.clone();

                    let span = info_span!(
                        "reconcile resource",
                        "kind" =
                            ResourceType::kind(&ResourceType::DynamicType::default()).to_string(),
                        "ns" = object.meta().namespace.clone(),
                        "name" = object.meta().name.clone()
                    );

                    async move {
                        if object.meta().deletion_timestamp.is_some() {
                            remove_fn(object, state)
                                .instrument(info_span!("remove_fn"))
                                .await
                        } else {
                            update_fn(object, state)
                                .instrument(info_span!("update_fn"))
                                .await
                        }
                    }
                    .instrument(span)
                },
                self.error_policy,
                self.state,
            )
            .for_each(|res| async move {
                match res {
                    Ok((object, _action)) => debug!("reconciled {}", object.name),
                    Err(e) => error!("reconcile failed: {:?}", e),
                }
            })
    }
}
