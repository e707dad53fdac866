//! Registry watch controller: project application roles onto cluster bindings.
//!
//! The controller subscribes to changes in the User Registry and reconciles cluster
//! scoped bindings so identities hold exactly the cluster privileges their role grants.
//! Namespace scoped bindings are never touched: they are managed by self-service requests.
//!
//! Events are processed one at a time, in the order they are received:
//!
//! - `Added`: grant the cluster privileges of the role.
//! - `Updated`: when the role changed, grant the privileges of the new role and
//!   revoke the privileges of the old role the new role does not have.
//! - `Deleted`: revoke all cluster privileges managed by the controller.
//!
//! Events can be missed or coalesced so the controller also periodically re-lists
//! the registry and re-applies the expected state (resync).
//!
//! ## Error Handling
//!
//! Failures to process an event are retried with backoff when the cause is an
//! unavailable dependency, then logged: one bad event never stops the controller.
//! A failed or closed subscription ends [`Controller::run`] with an error.
//! [`Controller::supervise`] re-subscribes with backoff in that case.
use std::collections::HashMap;
use std::future::Future;

use anyhow::Result;
use futures::StreamExt;

use kportal_bindings::roles;
use kportal_bindings::Synchronizer;
use kportal_conf::ControllerConf;
use kportal_context::Context;
use kportal_controlplane::Privilege;
use kportal_controlplane::Scope;
use kportal_errors::ErrorKind;
use kportal_registry::Identity;
use kportal_registry::Registry;
use kportal_registry::RegistryEvent;
use kportal_registry::RegistryEventStream;
use kportal_registry::Role;
use kportal_registry::WatchLagged;

mod backoff;
mod telemetry;


pub use self::backoff::Backoff;
pub use self::telemetry::register_metrics;

/// The registry subscription ended unexpectedly.
#[derive(Debug, thiserror::Error)]
#[error("the registry subscription closed unexpectedly")]
pub struct SubscriptionClosed;

/// Reconcile application roles onto cluster bindings.
#[derive(Clone)]
pub struct Controller {
    conf: ControllerConf,
    registry: Registry,
    sync: Synchronizer,
}

impl Controller {
    pub fn new(registry: Registry, sync: Synchronizer, conf: &ControllerConf) -> Controller {
        Controller {
            conf: conf.clone(),
            registry,
            sync,
        }
    }

    /// Apply the changes required by a single registry event.
    pub async fn handle_event(&self, context: &Context, event: &RegistryEvent) -> Result<()> {
        match event {
            RegistryEvent::Added(identity) => {
                self.grant_role(context, &identity.id, identity.role).await
            }
            RegistryEvent::Updated(old, new) if old.role != new.role => {
                slog::info!(
                    context.logger, "Reconciling application role change";
                    "identity" => &new.id,
                    "old_role" => old.role.as_str(),
                    "new_role" => new.role.as_str(),
                );
                self.grant_role(context, &new.id, new.role).await?;
                let keep = roles::cluster_privileges(new.role);
                for privilege in roles::cluster_privileges(old.role) {
                    if !keep.contains(privilege) {
                        self.revoke_cluster(context, &new.id, *privilege).await?;
                    }
                }
                Ok(())
            }
            RegistryEvent::Updated(_, _) => Ok(()),
            RegistryEvent::Deleted(identity) => {
                for privilege in roles::CLUSTER_PRIVILEGES {
                    self.revoke_cluster(context, &identity.id, privilege).await?;
                }
                Ok(())
            }
        }
    }

    /// Re-list the registry and make cluster bindings match it.
    ///
    /// Subjects of controller managed bindings that are not in the registry or
    /// whose role does not grant the privilege are revoked.
    pub async fn resync(&self, context: &Context) -> Result<()> {
        let identities = self.registry.list(context).await?;
        let expected: HashMap<&str, Role> = identities
            .iter()
            .map(|identity| (identity.id.as_str(), identity.role))
            .collect();

        let mut failed = 0;
        for identity in &identities {
            if let Err(error) = self.reconcile(context, identity).await {
                failed += 1;
                slog::warn!(
                    context.logger, "Unable to reconcile identity during resync";
                    "identity" => &identity.id,
                    replisdk::utils::error::slog::ErrorAttributes::from(&error),
                );
            }
        }

        for privilege in roles::CLUSTER_PRIVILEGES {
            let subjects = self
                .sync
                .subjects(context, &Scope::Cluster, privilege)
                .await?;
            for subject in subjects {
                let granted = expected
                    .get(subject.as_str())
                    .map(|role| roles::cluster_privileges(*role).contains(&privilege))
                    .unwrap_or(false);
                if !granted {
                    slog::info!(
                        context.logger, "Revoking unexpected cluster privilege";
                        "identity" => &subject,
                        "privilege" => privilege.slug(),
                    );
                    self.revoke_cluster(context, &subject, privilege).await?;
                }
            }
        }

        if failed > 0 {
            anyhow::bail!("resync failed to reconcile {} identities", failed);
        }
        Ok(())
    }

    /// Wait for the startup grace period, subscribe to registry changes and process them.
    ///
    /// Returns `Ok` once the `exit` future resolves, or an error if the subscription fails.
    pub async fn run<F>(&self, context: &Context, exit: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(exit);
        tokio::select! {
            _ = &mut exit => return Ok(()),
            _ = tokio::time::sleep(self.conf.startup_grace()) => (),
        };
        let events = self.subscribe(context).await?;
        self.process(context, events, exit).await
    }

    /// Run the controller, re-subscribing with backoff if the subscription fails.
    ///
    /// Returns an error only once the subscription failed too many consecutive times.
    pub async fn supervise<F>(&self, context: &Context, exit: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(exit);
        tokio::select! {
            _ = &mut exit => return Ok(()),
            _ = tokio::time::sleep(self.conf.startup_grace()) => (),
        };

        let mut backoff = Backoff::new(&self.conf.backoff);
        loop {
            let events = match self.subscribe(context).await {
                Ok(events) => {
                    backoff.success();
                    events
                }
                Err(error) => {
                    telemetry::RESTARTS_COUNT.inc();
                    backoff.retry(context, error).await?;
                    continue;
                }
            };
            match self.process(context, events, exit.as_mut()).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    telemetry::RESTARTS_COUNT.inc();
                    backoff.retry(context, error).await?;
                }
            }
        }
    }

    /// Grant the identity the cluster privileges of its role.
    async fn grant_role(&self, context: &Context, identity: &str, role: Role) -> Result<()> {
        self.sync
            .grant(context, identity, &Scope::Cluster, role)
            .await
    }

    /// Process an event, retrying when dependencies are unavailable.
    ///
    /// Errors are logged and never returned.
    async fn process_event(&self, context: &Context, event: RegistryEvent) {
        let kind = event.kind();
        let mut backoff = Backoff::new(&self.conf.backoff);
        loop {
            let error = match self.handle_event(context, &event).await {
                Ok(()) => {
                    telemetry::EVENTS_COUNT.with_label_values(&[kind]).inc();
                    return;
                }
                Err(error) if ErrorKind::Unavailable.matches(&error) => error,
                Err(error) => {
                    telemetry::EVENTS_ERR.with_label_values(&[kind]).inc();
                    slog::error!(
                        context.logger, "Failed to process registry event";
                        "event" => kind,
                        "identity" => &event.identity().id,
                        replisdk::utils::error::slog::ErrorAttributes::from(&error),
                    );
                    return;
                }
            };
            if let Err(error) = backoff.retry(context, error).await {
                telemetry::EVENTS_ERR.with_label_values(&[kind]).inc();
                slog::error!(
                    context.logger, "Failed to process registry event, giving up";
                    "event" => kind,
                    "identity" => &event.identity().id,
                    replisdk::utils::error::slog::ErrorAttributes::from(&error),
                );
                return;
            }
        }
    }

    /// Process registry events until exit or the subscription fails.
    async fn process<F>(
        &self,
        context: &Context,
        mut events: RegistryEventStream,
        exit: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(exit);
        self.resync_logged(context).await;

        let period = self.conf.resync_interval();
        let mut resync = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        slog::info!(context.logger, "Registry controller processing events");
        loop {
            tokio::select! {
                _ = &mut exit => return Ok(()),
                event = events.next() => match event {
                    None => anyhow::bail!(SubscriptionClosed),
                    Some(Err(error)) if error.is::<WatchLagged>() => {
                        slog::warn!(
                            context.logger, "Registry controller missed events, resyncing";
                            replisdk::utils::error::slog::ErrorAttributes::from(&error),
                        );
                        self.resync_logged(context).await;
                    }
                    Some(Err(error)) => return Err(error),
                    Some(Ok(event)) => self.process_event(context, event).await,
                },
                _ = resync.tick() => self.resync_logged(context).await,
            }
        }
    }

    /// Make the identity hold exactly the cluster privileges of its role.
    async fn reconcile(&self, context: &Context, identity: &Identity) -> Result<()> {
        self.grant_role(context, &identity.id, identity.role).await?;
        let keep = roles::cluster_privileges(identity.role);
        for privilege in roles::CLUSTER_PRIVILEGES {
            if !keep.contains(&privilege) {
                self.revoke_cluster(context, &identity.id, privilege).await?;
            }
        }
        Ok(())
    }

    async fn revoke_cluster(
        &self,
        context: &Context,
        identity: &str,
        privilege: Privilege,
    ) -> Result<()> {
        self.sync
            .revoke_privilege(context, identity, &Scope::Cluster, privilege)
            .await?;
        Ok(())
    }

    async fn resync_logged(&self, context: &Context) {
        telemetry::RESYNC_COUNT.inc();
        if let Err(error) = self.resync(context).await {
            telemetry::RESYNC_ERR.inc();
            slog::warn!(
                context.logger, "Registry controller resync failed";
                replisdk::utils::error::slog::ErrorAttributes::from(&error),
            );
        }
    }

    async fn subscribe(&self, context: &Context) -> Result<RegistryEventStream> {
        slog::debug!(context.logger, "Subscribing to registry changes");
        self.registry.watch(context).await
    }
}
