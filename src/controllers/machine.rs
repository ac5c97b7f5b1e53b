use kube::runtime::controller::Action;
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use tokio::time::{Duration, Instant, timeout_at};
use tracing::{debug, info, instrument, warn};

use crate::config::Settings;
use crate::crd::machine::Machine;
use crate::errors::Error;
use crate::interfaces::vsphere::session::{SessionProvider, VimSession};
use crate::interfaces::vsphere::vmgroup::ensure_member;
use crate::labels_and_annotations::VM_GROUP_LABEL;
use crate::ok_no_requeue;
use crate::utils::resource_controller::ResourceControllerBuilder;
use crate::utils::traits::machine::MachineExt;

pub struct State {
    pub sessions: Arc<dyn SessionProvider>,
    pub reconcile_timeout: Duration,
}

/// What one reconciliation asks of vSphere. Built fresh for every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMembershipRequest {
    pub node_name: String,
    pub cluster_path: String,
    pub group_name: String,
}

impl GroupMembershipRequest {
    /// `None` for machines without the group label
    pub fn from_machine(machine: &Machine) -> Result<Option<Self>, Error> {
        let Some(group_name) = machine.requested_vm_group() else {
            return Ok(None);
        };
        Ok(Some(GroupMembershipRequest {
            node_name: machine.name_any(),
            cluster_path: machine.vsphere_cluster_path()?,
            group_name,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NotLabelled,
    AlreadyMember,
    Added,
}

/// Bring one machine's VM into the group its label names. Every read happens
/// before the single mutating call. `deadline` bounds login and lookups; the
/// logout after it always runs so an expired cycle leaves no session behind.
pub async fn reconcile_machine(
    machine: &Machine,
    sessions: &dyn SessionProvider,
    deadline: Duration,
) -> Result<Outcome, Error> {
    let Some(request) = GroupMembershipRequest::from_machine(machine)? else {
        return Ok(Outcome::NotLabelled);
    };

    let expires = Instant::now() + deadline;
    let expired = || {
        Error::Cancelled(format!(
            "reconcile of {} exceeded {:?}",
            request.node_name, deadline
        ))
    };

    let session = timeout_at(expires, sessions.open())
        .await
        .map_err(|_| expired())??;
    let result = timeout_at(expires, converge(session.as_ref(), &request))
        .await
        .unwrap_or_else(|_| Err(expired()));
    if let Err(e) = session.logout().await {
        warn!("vsphere: logout failed: {}", e);
    }
    result
}

#[instrument(skip(session))]
async fn converge(session: &dyn VimSession, request: &GroupMembershipRequest) -> Result<Outcome, Error> {
    let group = session
        .find_group(&request.cluster_path, &request.group_name)
        .await?;
    let vm = session.find_vm(&request.node_name).await?;

    if ensure_member(session, &group, &vm).await? {
        Ok(Outcome::Added)
    } else {
        Ok(Outcome::AlreadyMember)
    }
}

/// Handle updates to labelled machines
#[instrument(skip(ctx))]
async fn update_machine(machine: Arc<Machine>, ctx: Arc<State>) -> Result<Action, Error> {
    let name = machine.name_any();
    let outcome = reconcile_machine(&machine, ctx.sessions.as_ref(), ctx.reconcile_timeout).await?;

    match outcome {
        Outcome::NotLabelled => debug!("machine: {name} carries no VM group"),
        Outcome::AlreadyMember => debug!("machine: {name} already in its VM group"),
        Outcome::Added => info!("machine: {name} added to its VM group"),
    }
    ok_no_requeue!()
}

/// Group membership is left alone when a machine goes away
#[instrument(skip(_ctx))]
async fn remove_machine(machine: Arc<Machine>, _ctx: Arc<State>) -> Result<Action, Error> {
    debug!("machine: {} deleted, VM group untouched", machine.name_any());
    ok_no_requeue!()
}

#[instrument(skip(client, sessions))]
pub async fn create(
    client: Client,
    settings: &Settings,
    sessions: Arc<dyn SessionProvider>,
) -> Result<(), Error> {
    info!(
        "machine: Starting controller in namespace {}",
        settings.machine_namespace
    );
    let machines: Api<Machine> = Api::namespaced(client, &settings.machine_namespace);
    let state = State {
        sessions,
        reconcile_timeout: settings.reconcile_timeout(),
    };

    ResourceControllerBuilder::new(machines)
        .with_watcher_config(watcher::Config::default().labels(VM_GROUP_LABEL))
        .with_state(state)
        .with_default_error_policy(settings.retry_interval())
        .with_functions(update_machine, remove_machine)
        .run()
        .await;
    Ok(())
}
