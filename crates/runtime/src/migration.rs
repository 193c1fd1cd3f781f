//! Migration protocol state machine and its driving controller.
//!
//! Pure synchronous state machine for relocating one entity. Tracks the
//! phase ladder and decides what happens next. Does NOT snapshot entities,
//! talk to the network, or touch the directory — those stay in
//! [`MigrationController`].
//!
//! # Usage
//!
//! ```text
//! Controller ──► MigrationProtocol::handle(MigrationInput) ──► Vec<MigrationOutput>
//! ```
//!
//! The controller maps outputs to registry, directory, and network calls and
//! feeds the results back as further inputs.

use crate::config::MigrationConfig;
use crate::registry::EntityRegistry;
use simfabric_directory::{DirectoryError, Location, ObjectLocationDirectory};
use simfabric_messages::{LocationUpdate, MigrateRequest};
use simfabric_network::{Network, RequestError};
use simfabric_types::{HostId, ObjectId, ObjectReferrer};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Where a migration currently stands.
///
/// Phases advance strictly left to right; a migration never revisits an
/// earlier phase. `Rejected` and `Failed` are terminal like `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Migration requested; nothing verified yet.
    Requested,
    /// The entity's state snapshotted successfully; transfer may proceed.
    SerializabilityChecked,
    /// The destination accepted and registered the entity. The point of no
    /// return: from here the migration must run to completion.
    Transferred,
    /// The source directory now answers `Remote(dest)` for the entity.
    DirectoryUpdated,
    /// Hosts of communication partners were told about the new location.
    Notified,
    /// Terminal success.
    Done,
    /// Terminal: refused before any state moved. Source keeps the entity.
    Rejected,
    /// Terminal: a post-check step failed or was cancelled pre-transfer.
    Failed,
}

/// Inputs to the migration state machine.
#[derive(Debug)]
pub enum MigrationInput {
    /// Begin the migration.
    Start,
    /// The entity's snapshot succeeded.
    SnapshotReady {
        type_name: String,
        state: Vec<u8>,
        weight: u64,
    },
    /// The entity's snapshot failed; its state cannot travel.
    SnapshotFailed { reason: String },
    /// The destination registered the entity.
    TransferAccepted,
    /// The destination refused the entity.
    TransferDeclined { reason: String },
    /// The transfer round-trip did not complete.
    TransferFailed { error: RequestError },
    /// The local directory now points at the destination.
    DirectoryCommitted,
    /// Partner hosts were sent the new location.
    PartnersNotified { failures: Vec<HostId> },
    /// Abandon the migration. Only honoured before the transfer is
    /// acknowledged; afterwards the migration must complete.
    Cancel,
}

/// Outputs from the migration state machine.
#[derive(Debug, PartialEq, Eq)]
pub enum MigrationOutput {
    /// Snapshot the entity; this doubles as the serializability check.
    CheckSerializability,
    /// Send the snapshot to the destination and await its verdict.
    SendTransfer {
        type_name: String,
        state: Vec<u8>,
        weight: u64,
    },
    /// Retire the local instance and point the directory at the destination.
    CommitDirectory,
    /// Tell hosts of communication partners where the entity now lives.
    NotifyPartners,
    /// The migration was refused; release the entity locally.
    Reject { reason: String },
    /// The migration finished.
    Complete,
}

/// Migration state machine for a single entity transfer.
///
/// One instance per attempt; a controller drives it by calling `handle()`
/// with inputs and executing the returned outputs.
pub struct MigrationProtocol {
    id: ObjectId,
    source: HostId,
    dest: HostId,
    phase: MigrationPhase,
}

impl MigrationProtocol {
    pub fn new(id: ObjectId, source: HostId, dest: HostId) -> Self {
        Self {
            id,
            source,
            dest,
            phase: MigrationPhase::Requested,
        }
    }

    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            MigrationPhase::Done | MigrationPhase::Rejected | MigrationPhase::Failed
        )
    }

    /// True while the migration can still be abandoned without leaving the
    /// entity split across hosts.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self.phase,
            MigrationPhase::Requested | MigrationPhase::SerializabilityChecked
        )
    }

    /// Process an input and return outputs.
    ///
    /// Inputs that do not belong to the current phase are logged and dropped;
    /// the state machine never advances on them.
    pub fn handle(&mut self, input: MigrationInput) -> Vec<MigrationOutput> {
        match (self.phase, input) {
            (MigrationPhase::Requested, MigrationInput::Start) => {
                debug!(id = %self.id, source = %self.source, dest = %self.dest, "migration started");
                vec![MigrationOutput::CheckSerializability]
            }
            (
                MigrationPhase::Requested,
                MigrationInput::SnapshotReady {
                    type_name,
                    state,
                    weight,
                },
            ) => {
                self.phase = MigrationPhase::SerializabilityChecked;
                vec![MigrationOutput::SendTransfer {
                    type_name,
                    state,
                    weight,
                }]
            }
            (MigrationPhase::Requested, MigrationInput::SnapshotFailed { reason }) => {
                self.phase = MigrationPhase::Rejected;
                vec![MigrationOutput::Reject { reason }]
            }
            (MigrationPhase::SerializabilityChecked, MigrationInput::TransferAccepted) => {
                self.phase = MigrationPhase::Transferred;
                vec![MigrationOutput::CommitDirectory]
            }
            (MigrationPhase::SerializabilityChecked, MigrationInput::TransferDeclined { reason }) => {
                self.phase = MigrationPhase::Rejected;
                vec![MigrationOutput::Reject { reason }]
            }
            (MigrationPhase::SerializabilityChecked, MigrationInput::TransferFailed { error }) => {
                warn!(id = %self.id, dest = %self.dest, %error, "entity transfer failed");
                self.phase = MigrationPhase::Failed;
                vec![]
            }
            (MigrationPhase::Transferred, MigrationInput::DirectoryCommitted) => {
                self.phase = MigrationPhase::DirectoryUpdated;
                vec![MigrationOutput::NotifyPartners]
            }
            (MigrationPhase::DirectoryUpdated, MigrationInput::PartnersNotified { failures }) => {
                if !failures.is_empty() {
                    // Stale caches self-heal through misrouted redirects, so a
                    // failed notification degrades latency, not correctness.
                    warn!(id = %self.id, ?failures, "some partner hosts missed the location update");
                }
                self.phase = MigrationPhase::Notified;
                info!(id = %self.id, source = %self.source, dest = %self.dest, "migration complete");
                self.phase = MigrationPhase::Done;
                vec![MigrationOutput::Complete]
            }
            (_, MigrationInput::Cancel) if self.can_cancel() => {
                debug!(id = %self.id, phase = ?self.phase, "migration cancelled");
                self.phase = MigrationPhase::Failed;
                vec![]
            }
            (phase, input) => {
                warn!(id = %self.id, ?phase, ?input, "input does not belong to this phase; dropped");
                vec![]
            }
        }
    }
}

/// Errors from a migration attempt.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The entity is not hosted here; only the owning host may migrate it.
    #[error("object {0} is not hosted locally")]
    NoLocalObject(ObjectId),

    /// The destination is this host; nothing to do.
    #[error("object {0} is already on the requested host")]
    SelfMigration(ObjectId),

    /// Another migration of the same entity is in flight.
    #[error("object {0} is already migrating")]
    Busy(ObjectId),

    /// The entity's state cannot be encoded for transfer. The entity stays
    /// put and keeps serving invocations.
    #[error("state of {id} ({type_name}) cannot travel: {reason}")]
    NonSerializable {
        id: ObjectId,
        type_name: String,
        reason: String,
    },

    /// The destination refused the entity (capacity, unknown type, ...).
    #[error("destination declined the transfer: {reason}")]
    Declined { reason: String },

    /// The transfer round-trip did not complete.
    #[error("transfer transport failure")]
    Transport(#[source] RequestError),

    /// The migration was cancelled before the transfer.
    #[error("migration of {0} cancelled")]
    Cancelled(ObjectId),
}

/// What a completed migration did.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub id: ObjectId,
    pub source: HostId,
    pub dest: HostId,
    pub phase: MigrationPhase,
    /// Partner hosts that were sent the new location.
    pub notified_hosts: Vec<HostId>,
    /// Partner hosts the update could not be sent to.
    pub failed_notifications: Vec<HostId>,
}

/// Drives [`MigrationProtocol`] against the registry, directory, and network.
///
/// Owned by the host; one controller serves all outbound migrations. Each
/// call to [`migrate`](Self::migrate) runs one attempt to a terminal phase
/// before returning, so a caller observes either the old placement or the
/// new one, never an intermediate.
pub struct MigrationController<N: Network> {
    host: HostId,
    directory: Arc<ObjectLocationDirectory>,
    entities: Arc<EntityRegistry>,
    referrer: Arc<dyn ObjectReferrer>,
    network: Arc<N>,
    config: MigrationConfig,
}

impl<N: Network> MigrationController<N> {
    pub fn new(
        host: HostId,
        directory: Arc<ObjectLocationDirectory>,
        entities: Arc<EntityRegistry>,
        referrer: Arc<dyn ObjectReferrer>,
        network: Arc<N>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            host,
            directory,
            entities,
            referrer,
            network,
            config,
        }
    }

    /// Move one locally hosted entity to `dest`.
    ///
    /// Invocations arriving during the move park on the directory gate and
    /// resume against the committed location. On any pre-transfer failure the
    /// gate rolls back and the entity keeps serving locally.
    pub fn migrate(&self, id: &ObjectId, dest: HostId) -> Result<MigrationReport, MigrationError> {
        if dest == self.host {
            return Err(MigrationError::SelfMigration(id.clone()));
        }

        // Close the gate first: from here until commit or rollback, resolve()
        // parks and the entity state cannot change under the snapshot.
        let guard = self.directory.begin_migration(id).map_err(|e| match e {
            DirectoryError::Busy(id) => MigrationError::Busy(id),
            _ => MigrationError::NoLocalObject(id.clone()),
        })?;

        let mut protocol = MigrationProtocol::new(id.clone(), self.host, dest);
        let mut outputs = protocol.handle(MigrationInput::Start);
        let mut guard = Some(guard);
        let mut notified_hosts = Vec::new();
        let mut failed_notifications = Vec::new();
        let mut failure: Option<MigrationError> = None;

        while let Some(output) = pop_front(&mut outputs) {
            let next = match output {
                MigrationOutput::CheckSerializability => {
                    match self.snapshot_entity(id) {
                        Some(Ok((type_name, state, weight))) => MigrationInput::SnapshotReady {
                            type_name,
                            state,
                            weight,
                        },
                        Some(Err((type_name, reason))) => {
                            failure = Some(MigrationError::NonSerializable {
                                id: id.clone(),
                                type_name,
                                reason: reason.clone(),
                            });
                            MigrationInput::SnapshotFailed { reason }
                        }
                        None => {
                            // Directory and registry disagree; the gate rolls
                            // back on drop.
                            return Err(MigrationError::NoLocalObject(id.clone()));
                        }
                    }
                }
                MigrationOutput::SendTransfer {
                    type_name,
                    state,
                    weight,
                } => match self.send_transfer(id, dest, type_name, state, weight) {
                    Ok(None) => MigrationInput::TransferAccepted,
                    Ok(Some(reason)) => {
                        failure = Some(MigrationError::Declined {
                            reason: reason.clone(),
                        });
                        MigrationInput::TransferDeclined { reason }
                    }
                    Err(e) => {
                        failure = Some(MigrationError::Transport(e.clone()));
                        MigrationInput::TransferFailed { error: e }
                    }
                },
                MigrationOutput::CommitDirectory => {
                    self.entities.remove(id);
                    if let Some(guard) = guard.take() {
                        guard.commit(Location::Remote(dest));
                    }
                    MigrationInput::DirectoryCommitted
                }
                MigrationOutput::NotifyPartners => {
                    let (ok, failed) = self.notify_partners(id, dest);
                    notified_hosts = ok;
                    failed_notifications = failed.clone();
                    MigrationInput::PartnersNotified { failures: failed }
                }
                MigrationOutput::Reject { .. } | MigrationOutput::Complete => continue,
            };
            outputs.extend(protocol.handle(next));
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(MigrationReport {
                id: id.clone(),
                source: self.host,
                dest,
                phase: protocol.phase(),
                notified_hosts,
                failed_notifications,
            }),
        }
    }

    #[allow(clippy::type_complexity)]
    fn snapshot_entity(&self, id: &ObjectId) -> Option<Result<(String, Vec<u8>, u64), (String, String)>> {
        self.entities.with_entity(id, |e| {
            let type_name = e.type_name().to_owned();
            match e.snapshot() {
                Ok(state) => Ok((type_name, state, e.weight())),
                Err(err) => Err((type_name, err.to_string())),
            }
        })
    }

    /// `Ok(None)` = accepted, `Ok(Some(reason))` = declined.
    fn send_transfer(
        &self,
        id: &ObjectId,
        dest: HostId,
        type_name: String,
        state: Vec<u8>,
        weight: u64,
    ) -> Result<Option<String>, RequestError> {
        let request = MigrateRequest {
            id: id.clone(),
            source: self.host,
            dest,
            type_name,
            state,
            weight,
        };
        let (tx, rx) = crossbeam::channel::bounded(1);
        self.network.request(
            dest,
            &request,
            self.config.transfer_timeout,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        let response = rx
            .recv_timeout(self.config.transfer_timeout)
            .map_err(|_| RequestError::Timeout)??;
        if response.accepted {
            Ok(None)
        } else {
            Ok(Some(
                response.reason.unwrap_or_else(|| "no reason given".to_owned()),
            ))
        }
    }

    /// Send the new location to every host that currently holds a partner of
    /// the migrated entity. The destination learns the location by receiving
    /// the entity; this host committed it already.
    fn notify_partners(&self, id: &ObjectId, dest: HostId) -> (Vec<HostId>, Vec<HostId>) {
        let mut targets = BTreeSet::new();
        for partner in self.referrer.partners_of(id) {
            match self.directory.resolve(&partner) {
                Ok(Location::Remote(host)) if host != dest => {
                    targets.insert(host);
                }
                // Local partners share our directory; nothing to send.
                Ok(_) => {}
                Err(e) => {
                    debug!(%partner, error = %e, "partner location unknown; skipping notification")
                }
            }
        }
        let update = LocationUpdate {
            entities: vec![id.clone()],
            new_host: dest,
        };
        let mut notified = Vec::new();
        for host in targets {
            self.network.send_to(host, &update);
            notified.push(host);
        }
        // send_to is fire-and-forget: a drop surfaces later as a misrouted
        // redirect, not as an error here.
        (notified, Vec::new())
    }
}

fn pop_front(outputs: &mut Vec<MigrationOutput>) -> Option<MigrationOutput> {
    if outputs.is_empty() {
        None
    } else {
        Some(outputs.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simfabric_types::ObjectIdAllocator;

    fn subject() -> MigrationProtocol {
        let id = ObjectIdAllocator::new(HostId(0)).allocate("queue");
        MigrationProtocol::new(id, HostId(0), HostId(1))
    }

    #[test]
    fn test_happy_path_walks_all_phases() {
        let mut p = subject();
        assert_eq!(
            p.handle(MigrationInput::Start),
            vec![MigrationOutput::CheckSerializability]
        );
        let outputs = p.handle(MigrationInput::SnapshotReady {
            type_name: "queue".into(),
            state: vec![1, 2, 3],
            weight: 4,
        });
        assert!(matches!(
            outputs.as_slice(),
            [MigrationOutput::SendTransfer { weight: 4, .. }]
        ));
        assert_eq!(p.phase(), MigrationPhase::SerializabilityChecked);

        assert_eq!(
            p.handle(MigrationInput::TransferAccepted),
            vec![MigrationOutput::CommitDirectory]
        );
        assert_eq!(p.phase(), MigrationPhase::Transferred);

        assert_eq!(
            p.handle(MigrationInput::DirectoryCommitted),
            vec![MigrationOutput::NotifyPartners]
        );
        assert_eq!(p.phase(), MigrationPhase::DirectoryUpdated);

        assert_eq!(
            p.handle(MigrationInput::PartnersNotified { failures: vec![] }),
            vec![MigrationOutput::Complete]
        );
        assert_eq!(p.phase(), MigrationPhase::Done);
        assert!(p.is_terminal());
    }

    #[test]
    fn test_snapshot_failure_rejects_before_transfer() {
        let mut p = subject();
        p.handle(MigrationInput::Start);
        let outputs = p.handle(MigrationInput::SnapshotFailed {
            reason: "open file handle".into(),
        });
        assert_eq!(
            outputs,
            vec![MigrationOutput::Reject {
                reason: "open file handle".into()
            }]
        );
        assert_eq!(p.phase(), MigrationPhase::Rejected);
    }

    #[test]
    fn test_decline_rejects_and_terminates() {
        let mut p = subject();
        p.handle(MigrationInput::Start);
        p.handle(MigrationInput::SnapshotReady {
            type_name: "queue".into(),
            state: vec![],
            weight: 1,
        });
        let outputs = p.handle(MigrationInput::TransferDeclined {
            reason: "over capacity".into(),
        });
        assert_eq!(
            outputs,
            vec![MigrationOutput::Reject {
                reason: "over capacity".into()
            }]
        );
        assert_eq!(p.phase(), MigrationPhase::Rejected);
    }

    #[test]
    fn test_cancel_honoured_only_before_transfer() {
        let mut p = subject();
        p.handle(MigrationInput::Start);
        assert!(p.can_cancel());
        p.handle(MigrationInput::SnapshotReady {
            type_name: "queue".into(),
            state: vec![],
            weight: 1,
        });
        assert!(p.can_cancel());

        p.handle(MigrationInput::TransferAccepted);
        assert!(!p.can_cancel());
        assert!(p.handle(MigrationInput::Cancel).is_empty());
        // The cancel was dropped; the migration continues.
        assert_eq!(p.phase(), MigrationPhase::Transferred);
    }

    #[test]
    fn test_cancel_before_transfer_fails_the_attempt() {
        let mut p = subject();
        p.handle(MigrationInput::Start);
        assert!(p.handle(MigrationInput::Cancel).is_empty());
        assert_eq!(p.phase(), MigrationPhase::Failed);
        assert!(p.is_terminal());
    }

    #[test]
    fn test_out_of_phase_input_is_dropped() {
        let mut p = subject();
        assert!(p.handle(MigrationInput::TransferAccepted).is_empty());
        assert_eq!(p.phase(), MigrationPhase::Requested);
    }
}
