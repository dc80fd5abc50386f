//! Remote mutations and their local side effects
//!
//! Every mutation runs the same steps: resolve the account's client, mark the
//! target as in flight, make one remote call, apply the local row changes on
//! success, unmark the target and publish exactly one event. Destroying an
//! item that is already gone remotely counts as success.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;

use crate::api::{ApiError, RemoteClient};
use crate::db::{
    Collection, Column, Database, MESSAGE_COLLECTIONS, Predicate, STATUS_COLLECTIONS,
};
use crate::events::{Action, DomainEvent, Notice};
use crate::models::{DirectMessage, Relationship, Status, UserList};

use super::SyncCoordinator;
use super::inflight::InFlightIndex;
use super::tasks::{TaskId, TaskTag};

/// Why a mutation did not happen
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// The account has no usable session
    #[error("no usable session for account {0}")]
    ClientUnavailable(i64),
    /// The remote call failed
    #[error(transparent)]
    Remote(#[from] ApiError),
    /// The action does not belong to the requested kind of mutation
    #[error("{} is not supported here", .0.label())]
    Unsupported(Action),
}

/// Successful mutation outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Applied<T> {
    /// The server performed the mutation and returned the new state
    Remote(T),
    /// The target no longer existed remotely; local cleanup was applied
    AlreadyGone,
}

impl<T> Applied<T> {
    /// Remote result, if the server returned one
    pub fn into_remote(self) -> Option<T> {
        match self {
            Self::Remote(value) => Some(value),
            Self::AlreadyGone => None,
        }
    }
}

/// Items with a pending mutation, one index per kind of mutation
#[derive(Clone, Default)]
pub struct MutationIndexes {
    pub(crate) creating_favorites: InFlightIndex,
    pub(crate) destroying_favorites: InFlightIndex,
    pub(crate) creating_retweets: InFlightIndex,
    pub(crate) destroying_statuses: InFlightIndex,
    pub(crate) creating_friendships: InFlightIndex,
    pub(crate) destroying_friendships: InFlightIndex,
}

/// A mutation to run in the background
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRequest {
    /// Favorite a status
    CreateFavorite { account_id: i64, status_id: i64 },
    /// Unfavorite a status
    DestroyFavorite { account_id: i64, status_id: i64 },
    /// Retweet a status
    Retweet { account_id: i64, status_id: i64 },
    /// Delete a status
    DestroyStatus { account_id: i64, status_id: i64 },
    /// Delete a direct message
    DestroyDirectMessage { account_id: i64, message_id: i64 },
    /// Follow, unfollow, block, mute, report and so on
    Friendship {
        action: Action,
        account_id: i64,
        user_id: i64,
    },
    /// Block several users
    MultiBlock { account_id: i64, user_ids: Vec<i64> },
    /// Report several users for spam
    MultiReportSpam { account_id: i64, user_ids: Vec<i64> },
    /// Add users to a list
    AddListMembers {
        account_id: i64,
        list_id: i64,
        user_ids: Vec<i64>,
    },
    /// Remove users from a list
    DeleteListMembers {
        account_id: i64,
        list_id: i64,
        user_ids: Vec<i64>,
    },
}

struct MutationSpec<'a> {
    action: Action,
    account_id: i64,
    target_id: i64,
    index: Option<&'a InFlightIndex>,
    tolerate_not_found: bool,
}

impl<'a> MutationSpec<'a> {
    const fn new(action: Action, account_id: i64, target_id: i64) -> Self {
        Self {
            action,
            account_id,
            target_id,
            index: None,
            tolerate_not_found: false,
        }
    }

    const fn tracked(mut self, index: &'a InFlightIndex) -> Self {
        self.index = Some(index);
        self
    }

    const fn tolerate_not_found(mut self) -> Self {
        self.tolerate_not_found = true;
        self
    }
}

/// Rows showing `status_id` either as itself or as the original of a retweet
fn status_or_retweet_of(account_id: i64, status_id: i64) -> Predicate {
    Predicate::account(account_id).and(
        Predicate::Eq(Column::ItemId, status_id).or(Predicate::Eq(Column::RetweetId, status_id)),
    )
}

fn update_status_tables(
    db: &Database,
    values: &[(Column, Option<i64>)],
    predicate: &Predicate,
) -> Result<()> {
    for collection in STATUS_COLLECTIONS {
        db.update_where(collection, values, predicate, true)?;
    }
    Ok(())
}

fn delete_statuses_by_users(
    db: &Database,
    collections: &[Collection],
    account_id: i64,
    user_ids: &[i64],
) -> Result<()> {
    let predicate =
        Predicate::account(account_id).and(Predicate::In(Column::UserId, user_ids.to_vec()));
    for &collection in collections {
        db.delete_where(collection, &predicate, true)?;
    }
    Ok(())
}

impl SyncCoordinator {
    fn publish_failure(&self, action: Action, account_id: i64, target_id: i64, error: MutationError) {
        tracing::warn!(account_id, target_id, action = action.label(), "mutation failed: {error}");
        self.bus
            .notice(Notice::Error(format!("Failed to {}: {error}", action.label())));
        self.bus.publish(DomainEvent::MutationFailed {
            action,
            account_id,
            target_id,
            error,
        });
    }

    async fn run_mutation<T, C, Fut, CE, E, V>(
        &self,
        spec: MutationSpec<'_>,
        call: C,
        effects: E,
        event: V,
    ) -> Result<Applied<T>, MutationError>
    where
        C: FnOnce(Arc<dyn RemoteClient>) -> Fut,
        Fut: Future<Output = Result<T, CE>>,
        CE: Into<MutationError>,
        E: FnOnce(&Database, &Applied<T>) -> Result<()>,
        V: FnOnce(&Applied<T>) -> DomainEvent,
    {
        let MutationSpec {
            action,
            account_id,
            target_id,
            index,
            tolerate_not_found,
        } = spec;

        let Some(client) = self.resolver.client_for(account_id).await else {
            let error = MutationError::ClientUnavailable(account_id);
            self.publish_failure(action, account_id, target_id, error.clone());
            return Err(error);
        };

        let in_flight = index.map(|index| index.register(account_id, target_id));

        let outcome = match call(client).await.map_err(Into::<MutationError>::into) {
            Ok(value) => Ok(Applied::Remote(value)),
            Err(MutationError::Remote(e)) if tolerate_not_found && e.is_not_found() => {
                tracing::debug!(account_id, target_id, "already gone remotely");
                Ok(Applied::AlreadyGone)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(applied) => {
                {
                    let db = self.db.lock().await;
                    if let Err(e) = effects(&db, &applied) {
                        tracing::warn!(account_id, target_id, "local update failed: {e:#}");
                        self.bus
                            .notice(Notice::Error(format!("Failed to update local data: {e:#}")));
                    }
                }
                drop(in_flight);

                tracing::info!(account_id, target_id, action = action.label(), "mutation applied");
                self.bus.publish(event(&applied));
                self.bus
                    .notice(Notice::Ok(format!("{} succeeded", action.label())));
                Ok(applied)
            }
            Err(error) => {
                drop(in_flight);
                self.publish_failure(action, account_id, target_id, error.clone());
                Err(error)
            }
        }
    }

    // ==================== Statuses ====================

    /// Favorite a status and flag every local copy of it
    pub async fn create_favorite(
        &self,
        account_id: i64,
        status_id: i64,
    ) -> Result<Applied<Status>, MutationError> {
        self.run_mutation(
            MutationSpec::new(Action::CreateFavorite, account_id, status_id)
                .tracked(&self.mutations.creating_favorites),
            |client| async move { client.create_favorite(status_id).await },
            |db, _| {
                update_status_tables(
                    db,
                    &[(Column::IsFavorite, Some(1))],
                    &status_or_retweet_of(account_id, status_id),
                )
            },
            |applied| DomainEvent::FavoriteCreated {
                account_id,
                status: remote_or_placeholder(applied, status_id),
            },
        )
        .await
    }

    /// Unfavorite a status and clear the flag on every local copy
    pub async fn destroy_favorite(
        &self,
        account_id: i64,
        status_id: i64,
    ) -> Result<Applied<Status>, MutationError> {
        self.run_mutation(
            MutationSpec::new(Action::DestroyFavorite, account_id, status_id)
                .tracked(&self.mutations.destroying_favorites),
            |client| async move { client.destroy_favorite(status_id).await },
            |db, _| {
                update_status_tables(
                    db,
                    &[(Column::IsFavorite, Some(0))],
                    &status_or_retweet_of(account_id, status_id),
                )
            },
            |applied| DomainEvent::FavoriteDestroyed {
                account_id,
                status: remote_or_placeholder(applied, status_id),
            },
        )
        .await
    }

    /// Retweet a status and remember the new retweet id on local copies
    pub async fn retweet_status(
        &self,
        account_id: i64,
        status_id: i64,
    ) -> Result<Applied<Status>, MutationError> {
        self.run_mutation(
            MutationSpec::new(Action::Retweet, account_id, status_id)
                .tracked(&self.mutations.creating_retweets),
            |client| async move { client.retweet_status(status_id).await },
            |db, applied| match applied {
                Applied::Remote(retweet) => update_status_tables(
                    db,
                    &[(Column::MyRetweetId, Some(retweet.id))],
                    &status_or_retweet_of(account_id, status_id),
                ),
                Applied::AlreadyGone => Ok(()),
            },
            |applied| DomainEvent::StatusRetweeted {
                account_id,
                status: remote_or_placeholder(applied, status_id),
            },
        )
        .await
    }

    /// Delete a status (or one's own retweet).
    ///
    /// Local rows with the id go away and rows pointing at it as their
    /// retweet lose that pointer, also when the status was already gone.
    pub async fn destroy_status(
        &self,
        account_id: i64,
        status_id: i64,
    ) -> Result<Applied<Status>, MutationError> {
        self.run_mutation(
            MutationSpec::new(Action::DestroyStatus, account_id, status_id)
                .tracked(&self.mutations.destroying_statuses)
                .tolerate_not_found(),
            |client| async move { client.destroy_status(status_id).await },
            |db, _| {
                let by_id = Predicate::Eq(Column::ItemId, status_id);
                for collection in STATUS_COLLECTIONS {
                    db.delete_where(collection, &by_id, true)?;
                }
                update_status_tables(
                    db,
                    &[(Column::MyRetweetId, None)],
                    &Predicate::Eq(Column::MyRetweetId, status_id),
                )
            },
            |applied| DomainEvent::StatusDestroyed {
                account_id,
                status_id,
                status: applied.clone().into_remote(),
            },
        )
        .await
    }

    /// Undo one's retweet of `status`: the known retweet, or the status itself
    pub async fn cancel_retweet(
        &self,
        account_id: i64,
        status: &Status,
    ) -> Result<Applied<Status>, MutationError> {
        let target = status
            .my_retweet_id
            .filter(|id| *id > 0)
            .unwrap_or(status.id);
        self.destroy_status(account_id, target).await
    }

    // ==================== Direct messages ====================

    /// Delete a direct message from the inbox and outbox
    pub async fn destroy_direct_message(
        &self,
        account_id: i64,
        message_id: i64,
    ) -> Result<Applied<DirectMessage>, MutationError> {
        self.run_mutation(
            MutationSpec::new(Action::DestroyDirectMessage, account_id, message_id)
                .tolerate_not_found(),
            |client| async move { client.destroy_direct_message(message_id).await },
            |db, _| {
                let predicate =
                    Predicate::account(account_id).and(Predicate::Eq(Column::ItemId, message_id));
                for collection in MESSAGE_COLLECTIONS {
                    db.delete_where(collection, &predicate, true)?;
                }
                Ok(())
            },
            |applied| DomainEvent::MessageDestroyed {
                account_id,
                message_id,
                message: applied.clone().into_remote(),
            },
        )
        .await
    }

    // ==================== Friendships ====================

    async fn friendship_mutation<E>(
        &self,
        action: Action,
        account_id: i64,
        user_id: i64,
        index: Option<&InFlightIndex>,
        effects: E,
    ) -> Result<Relationship, MutationError>
    where
        E: FnOnce(&Database) -> Result<()>,
    {
        let mut spec = MutationSpec::new(action, account_id, user_id);
        spec.index = index;

        let applied = self
            .run_mutation(
                spec,
                |client| async move {
                    let result = match action {
                        Action::CreateFriendship => client.create_friendship(user_id).await,
                        Action::DestroyFriendship => client.destroy_friendship(user_id).await,
                        Action::AcceptFriendship => client.accept_friendship(user_id).await,
                        Action::DenyFriendship => client.deny_friendship(user_id).await,
                        Action::CreateBlock => client.create_block(user_id).await,
                        Action::DestroyBlock => client.destroy_block(user_id).await,
                        Action::CreateMute => client.create_mute(user_id).await,
                        Action::DestroyMute => client.destroy_mute(user_id).await,
                        Action::ReportSpam => client.report_spam(user_id).await,
                        other => return Err(MutationError::Unsupported(other)),
                    };
                    result.map_err(MutationError::from)
                },
                |db, _| effects(db),
                |applied| DomainEvent::FriendshipUpdated {
                    account_id,
                    action,
                    relationship: applied.clone().into_remote().unwrap_or(Relationship {
                        user_id,
                        ..Relationship::default()
                    }),
                },
            )
            .await?;

        Ok(applied.into_remote().unwrap_or_default())
    }

    /// Follow a user
    pub async fn create_friendship(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Relationship, MutationError> {
        self.friendship_mutation(
            Action::CreateFriendship,
            account_id,
            user_id,
            Some(&self.mutations.creating_friendships),
            |_| Ok(()),
        )
        .await
    }

    /// Unfollow a user
    pub async fn destroy_friendship(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Relationship, MutationError> {
        self.friendship_mutation(
            Action::DestroyFriendship,
            account_id,
            user_id,
            Some(&self.mutations.destroying_friendships),
            |_| Ok(()),
        )
        .await
    }

    /// Accept a follow request
    pub async fn accept_friendship(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Relationship, MutationError> {
        self.friendship_mutation(Action::AcceptFriendship, account_id, user_id, None, |_| Ok(()))
            .await
    }

    /// Reject a follow request
    pub async fn deny_friendship(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Relationship, MutationError> {
        self.friendship_mutation(Action::DenyFriendship, account_id, user_id, None, |_| Ok(()))
            .await
    }

    /// Block a user and drop their statuses from every status table
    pub async fn create_block(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Relationship, MutationError> {
        self.friendship_mutation(Action::CreateBlock, account_id, user_id, None, |db| {
            delete_statuses_by_users(db, &STATUS_COLLECTIONS, account_id, &[user_id])
        })
        .await
    }

    /// Unblock a user
    pub async fn destroy_block(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Relationship, MutationError> {
        self.friendship_mutation(Action::DestroyBlock, account_id, user_id, None, |_| Ok(()))
            .await
    }

    /// Mute a user and drop their statuses from the home timeline
    pub async fn create_mute(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Relationship, MutationError> {
        self.friendship_mutation(Action::CreateMute, account_id, user_id, None, |db| {
            delete_statuses_by_users(db, &[Collection::HomeStatuses], account_id, &[user_id])
        })
        .await
    }

    /// Unmute a user
    pub async fn destroy_mute(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Relationship, MutationError> {
        self.friendship_mutation(Action::DestroyMute, account_id, user_id, None, |_| Ok(()))
            .await
    }

    /// Report a user for spam and drop their statuses from every status table
    pub async fn report_spam(
        &self,
        account_id: i64,
        user_id: i64,
    ) -> Result<Relationship, MutationError> {
        self.friendship_mutation(Action::ReportSpam, account_id, user_id, None, |db| {
            delete_statuses_by_users(db, &STATUS_COLLECTIONS, account_id, &[user_id])
        })
        .await
    }

    /// Block several users, stopping at the first failure.
    ///
    /// Statuses of the users blocked before the failure are still removed.
    pub async fn create_multi_block(
        &self,
        account_id: i64,
        user_ids: &[i64],
    ) -> Result<Vec<i64>, MutationError> {
        self.multi_user_mutation(Action::CreateBlock, account_id, user_ids)
            .await
    }

    /// Report several users for spam, stopping at the first failure
    pub async fn report_multi_spam(
        &self,
        account_id: i64,
        user_ids: &[i64],
    ) -> Result<Vec<i64>, MutationError> {
        self.multi_user_mutation(Action::ReportSpam, account_id, user_ids)
            .await
    }

    async fn multi_user_mutation(
        &self,
        action: Action,
        account_id: i64,
        user_ids: &[i64],
    ) -> Result<Vec<i64>, MutationError> {
        let first_target = user_ids.first().copied().unwrap_or(-1);
        let event: fn(i64, Vec<i64>) -> DomainEvent = match action {
            Action::CreateBlock => |account_id, user_ids| DomainEvent::UsersBlocked {
                account_id,
                user_ids,
            },
            Action::ReportSpam => |account_id, user_ids| DomainEvent::UsersReportedForSpam {
                account_id,
                user_ids,
            },
            other => {
                let error = MutationError::Unsupported(other);
                self.publish_failure(other, account_id, first_target, error.clone());
                return Err(error);
            }
        };
        let Some(client) = self.resolver.client_for(account_id).await else {
            let error = MutationError::ClientUnavailable(account_id);
            self.publish_failure(action, account_id, first_target, error.clone());
            return Err(error);
        };

        let mut done = Vec::with_capacity(user_ids.len());
        let mut failure = None;
        for &user_id in user_ids {
            let result = if action == Action::CreateBlock {
                client.create_block(user_id).await
            } else {
                client.report_spam(user_id).await
            };
            match result {
                Ok(_) => done.push(user_id),
                Err(e) => {
                    failure = Some((user_id, e));
                    break;
                }
            }
        }

        if !done.is_empty() {
            let db = self.db.lock().await;
            if let Err(e) = delete_statuses_by_users(&db, &STATUS_COLLECTIONS, account_id, &done) {
                tracing::warn!(account_id, "local update failed: {e:#}");
            }
        }

        if let Some((user_id, error)) = failure {
            let error = MutationError::Remote(error);
            self.publish_failure(action, account_id, user_id, error.clone());
            return Err(error);
        }

        tracing::info!(account_id, users = done.len(), action = action.label(), "mutation applied");
        self.bus.publish(event(account_id, done.clone()));
        self.bus
            .notice(Notice::Ok(format!("{} succeeded", action.label())));
        Ok(done)
    }

    // ==================== Lists ====================

    /// Add users to a list
    pub async fn add_user_list_members(
        &self,
        account_id: i64,
        list_id: i64,
        user_ids: &[i64],
    ) -> Result<UserList, MutationError> {
        self.list_members_mutation(Action::AddListMembers, account_id, list_id, user_ids)
            .await
    }

    /// Remove users from a list
    pub async fn delete_user_list_members(
        &self,
        account_id: i64,
        list_id: i64,
        user_ids: &[i64],
    ) -> Result<UserList, MutationError> {
        self.list_members_mutation(Action::DeleteListMembers, account_id, list_id, user_ids)
            .await
    }

    async fn list_members_mutation(
        &self,
        action: Action,
        account_id: i64,
        list_id: i64,
        user_ids: &[i64],
    ) -> Result<UserList, MutationError> {
        let members = user_ids.to_vec();
        let event_members = members.clone();
        let applied = self
            .run_mutation(
                MutationSpec::new(action, account_id, list_id),
                |client| async move {
                    let result = match action {
                        Action::AddListMembers => {
                            client.add_user_list_members(list_id, &members).await
                        }
                        Action::DeleteListMembers => {
                            client.delete_user_list_members(list_id, &members).await
                        }
                        other => return Err(MutationError::Unsupported(other)),
                    };
                    result.map_err(MutationError::from)
                },
                |_, _| Ok(()),
                |applied| DomainEvent::UserListMembersChanged {
                    account_id,
                    action,
                    list: applied.clone().into_remote().unwrap_or_default(),
                    user_ids: event_members,
                },
            )
            .await?;
        Ok(applied.into_remote().unwrap_or_default())
    }

    // ==================== Background dispatch ====================

    /// Run a mutation on the task pool; its outcome arrives as an event
    pub fn spawn_mutation(&self, request: MutationRequest) -> TaskId {
        let coordinator = self.clone();
        self.tasks.spawn(TaskTag::Mutation, async move {
            // Outcomes are published as events by the mutation itself
            let _ = coordinator.execute(request).await;
        })
    }

    async fn execute(&self, request: MutationRequest) -> Result<(), MutationError> {
        match request {
            MutationRequest::CreateFavorite {
                account_id,
                status_id,
            } => self.create_favorite(account_id, status_id).await.map(drop),
            MutationRequest::DestroyFavorite {
                account_id,
                status_id,
            } => self.destroy_favorite(account_id, status_id).await.map(drop),
            MutationRequest::Retweet {
                account_id,
                status_id,
            } => self.retweet_status(account_id, status_id).await.map(drop),
            MutationRequest::DestroyStatus {
                account_id,
                status_id,
            } => self.destroy_status(account_id, status_id).await.map(drop),
            MutationRequest::DestroyDirectMessage {
                account_id,
                message_id,
            } => self
                .destroy_direct_message(account_id, message_id)
                .await
                .map(drop),
            MutationRequest::Friendship {
                action,
                account_id,
                user_id,
            } => self.friendship(action, account_id, user_id).await.map(drop),
            MutationRequest::MultiBlock {
                account_id,
                user_ids,
            } => self.create_multi_block(account_id, &user_ids).await.map(drop),
            MutationRequest::MultiReportSpam {
                account_id,
                user_ids,
            } => self.report_multi_spam(account_id, &user_ids).await.map(drop),
            MutationRequest::AddListMembers {
                account_id,
                list_id,
                user_ids,
            } => self
                .add_user_list_members(account_id, list_id, &user_ids)
                .await
                .map(drop),
            MutationRequest::DeleteListMembers {
                account_id,
                list_id,
                user_ids,
            } => self
                .delete_user_list_members(account_id, list_id, &user_ids)
                .await
                .map(drop),
        }
    }

    /// Run a friendship-kind action by its [`Action`]
    pub async fn friendship(
        &self,
        action: Action,
        account_id: i64,
        user_id: i64,
    ) -> Result<Relationship, MutationError> {
        match action {
            Action::CreateFriendship => self.create_friendship(account_id, user_id).await,
            Action::DestroyFriendship => self.destroy_friendship(account_id, user_id).await,
            Action::AcceptFriendship => self.accept_friendship(account_id, user_id).await,
            Action::DenyFriendship => self.deny_friendship(account_id, user_id).await,
            Action::CreateBlock => self.create_block(account_id, user_id).await,
            Action::DestroyBlock => self.destroy_block(account_id, user_id).await,
            Action::CreateMute => self.create_mute(account_id, user_id).await,
            Action::DestroyMute => self.destroy_mute(account_id, user_id).await,
            Action::ReportSpam => self.report_spam(account_id, user_id).await,
            other => {
                let error = MutationError::Unsupported(other);
                self.publish_failure(other, account_id, user_id, error.clone());
                Err(error)
            }
        }
    }
}

fn remote_or_placeholder(applied: &Applied<Status>, status_id: i64) -> Status {
    match applied {
        Applied::Remote(status) => status.clone(),
        Applied::AlreadyGone => Status::new(status_id, crate::models::User::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PAGE_NOT_FOUND;
    use crate::events::EventKind;
    use crate::testing::{FakeClient, FakeResolver, message, status};

    fn not_found() -> ApiError {
        ApiError::Api {
            status: 404,
            code: Some(PAGE_NOT_FOUND),
            message: "Record not found".to_string(),
        }
    }

    async fn coordinator_with(client: FakeClient) -> SyncCoordinator {
        let resolver = FakeResolver::new().with_client(1, client);
        SyncCoordinator::for_tests(Arc::new(resolver)).await
    }

    async fn home_ids(coordinator: &SyncCoordinator) -> Vec<i64> {
        coordinator
            .db
            .lock()
            .await
            .item_ids_where(Collection::HomeStatuses, &Predicate::account(1))
            .unwrap()
    }

    #[tokio::test]
    async fn test_favorite_flags_status_and_retweets_of_it() {
        let coordinator = coordinator_with(FakeClient::new()).await;
        let mut retweet = status(1, 20);
        retweet.retweet_id = Some(10);
        coordinator
            .db
            .lock()
            .await
            .insert_statuses(Collection::HomeStatuses, &[status(1, 10), retweet, status(1, 30)], false)
            .unwrap();
        let mut events = coordinator.bus.subscribe(EventKind::Status);

        let applied = coordinator.create_favorite(1, 10).await.unwrap();
        assert!(matches!(applied, Applied::Remote(ref s) if s.is_favorite));

        let favorites = coordinator
            .db
            .lock()
            .await
            .item_ids_where(Collection::HomeStatuses, &Predicate::Eq(Column::IsFavorite, 1))
            .unwrap();
        assert_eq!(favorites, vec![20, 10]);
        assert!(!coordinator.is_creating_favorite(1, 10));
        assert!(matches!(
            events.recv().await.unwrap(),
            DomainEvent::FavoriteCreated { account_id: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_destroy_not_found_still_cleans_up() {
        let client = FakeClient::new();
        client.fail_target(10, not_found());
        let coordinator = coordinator_with(client).await;
        let mut pointing = status(1, 30);
        pointing.my_retweet_id = Some(10);
        coordinator
            .db
            .lock()
            .await
            .insert_statuses(Collection::HomeStatuses, &[status(1, 10), pointing], false)
            .unwrap();
        let mut events = coordinator.bus.subscribe(EventKind::Status);

        let applied = coordinator.destroy_status(1, 10).await.unwrap();

        assert_eq!(applied, Applied::AlreadyGone);
        assert_eq!(home_ids(&coordinator).await, vec![30]);
        let remaining = coordinator
            .db
            .lock()
            .await
            .get_statuses(Collection::HomeStatuses, &Predicate::All, 10)
            .unwrap();
        assert_eq!(remaining[0].my_retweet_id, None);
        assert_eq!(
            events.recv().await.unwrap(),
            DomainEvent::StatusDestroyed {
                account_id: 1,
                status_id: 10,
                status: None,
            }
        );
    }

    #[tokio::test]
    async fn test_destroy_other_failure_leaves_row() {
        let client = FakeClient::new();
        client.fail_target(10, ApiError::Transport("timeout".to_string()));
        let coordinator = coordinator_with(client).await;
        coordinator
            .db
            .lock()
            .await
            .insert_statuses(Collection::HomeStatuses, &[status(1, 10)], false)
            .unwrap();
        let mut events = coordinator.bus.subscribe(EventKind::Status);

        let error = coordinator.destroy_status(1, 10).await.unwrap_err();

        assert!(matches!(error, MutationError::Remote(ApiError::Transport(_))));
        assert_eq!(home_ids(&coordinator).await, vec![10]);
        assert!(!coordinator.is_destroying_status(1, 10));
        assert!(matches!(
            events.recv().await.unwrap(),
            DomainEvent::MutationFailed {
                action: Action::DestroyStatus,
                target_id: 10,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_destroy_message_tolerates_not_found() {
        let client = FakeClient::new();
        client.fail_target(4, not_found());
        let coordinator = coordinator_with(client).await;
        {
            let db = coordinator.db.lock().await;
            db.insert_messages(Collection::Inbox, &[message(1, 4)], false)
                .unwrap();
            db.insert_messages(Collection::Outbox, &[message(1, 4)], false)
                .unwrap();
        }

        coordinator.destroy_direct_message(1, 4).await.unwrap();

        let db = coordinator.db.lock().await;
        for collection in MESSAGE_COLLECTIONS {
            assert_eq!(db.count_where(collection, &Predicate::All).unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_missing_client_fails_fast_with_event() {
        let coordinator = SyncCoordinator::for_tests(Arc::new(FakeResolver::new())).await;
        let mut events = coordinator.bus.subscribe(EventKind::Friendship);

        let error = coordinator.create_friendship(7, 42).await.unwrap_err();

        assert_eq!(error, MutationError::ClientUnavailable(7));
        assert!(matches!(
            events.recv().await.unwrap(),
            DomainEvent::MutationFailed {
                action: Action::CreateFriendship,
                account_id: 7,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_wrong_action_kind_fails_without_remote_call() {
        let client = FakeClient::new();
        let coordinator = coordinator_with(client.clone()).await;
        let mut events = coordinator.bus.subscribe(EventKind::Status);

        let error = coordinator
            .friendship(Action::CreateFavorite, 1, 42)
            .await
            .unwrap_err();
        assert_eq!(error, MutationError::Unsupported(Action::CreateFavorite));
        assert!(matches!(
            events.recv().await.unwrap(),
            DomainEvent::MutationFailed {
                action: Action::CreateFavorite,
                target_id: 42,
                ..
            }
        ));

        assert_eq!(
            coordinator
                .multi_user_mutation(Action::CreateMute, 1, &[42])
                .await
                .unwrap_err(),
            MutationError::Unsupported(Action::CreateMute)
        );
        assert_eq!(
            coordinator
                .list_members_mutation(Action::ReportSpam, 1, 3, &[42])
                .await
                .unwrap_err(),
            MutationError::Unsupported(Action::ReportSpam)
        );
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_block_removes_users_statuses_mute_only_home() {
        let coordinator = coordinator_with(FakeClient::new()).await;
        {
            let db = coordinator.db.lock().await;
            db.insert_statuses(Collection::HomeStatuses, &[status(1, 1)], false)
                .unwrap();
            db.insert_statuses(Collection::Mentions, &[status(1, 2)], false)
                .unwrap();
        }

        coordinator.create_mute(1, 900).await.unwrap();
        {
            let db = coordinator.db.lock().await;
            assert_eq!(db.count_where(Collection::HomeStatuses, &Predicate::All).unwrap(), 0);
            assert_eq!(db.count_where(Collection::Mentions, &Predicate::All).unwrap(), 1);
        }

        let relationship = coordinator.create_block(1, 900).await.unwrap();
        assert!(relationship.blocking);
        let db = coordinator.db.lock().await;
        assert_eq!(db.count_where(Collection::Mentions, &Predicate::All).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_multi_block_stops_at_first_failure() {
        let client = FakeClient::new();
        client.fail_target(2, ApiError::Transport("reset".to_string()));
        let coordinator = coordinator_with(client.clone()).await;

        let error = coordinator.create_multi_block(1, &[1, 2, 3]).await.unwrap_err();

        assert!(matches!(error, MutationError::Remote(_)));
        assert_eq!(client.calls(), vec!["create_block:1", "create_block:2"]);
    }

    #[tokio::test]
    async fn test_cancel_retweet_targets_own_retweet() {
        let client = FakeClient::new();
        let coordinator = coordinator_with(client.clone()).await;
        let mut retweeted = status(1, 10);
        retweeted.my_retweet_id = Some(55);

        coordinator.cancel_retweet(1, &retweeted).await.unwrap();
        coordinator.cancel_retweet(1, &status(1, 11)).await.unwrap();

        assert_eq!(client.calls(), vec!["destroy_status:55", "destroy_status:11"]);
    }

    #[tokio::test]
    async fn test_spawned_mutation_reports_through_events() {
        let coordinator = coordinator_with(FakeClient::new()).await;
        let mut lists = coordinator.bus.subscribe(EventKind::UserList);

        coordinator.spawn_mutation(MutationRequest::AddListMembers {
            account_id: 1,
            list_id: 8,
            user_ids: vec![3, 4],
        });
        coordinator.wait_idle().await;

        assert_eq!(
            lists.recv().await.unwrap(),
            DomainEvent::UserListMembersChanged {
                account_id: 1,
                action: Action::AddListMembers,
                list: UserList {
                    id: 8,
                    name: "list".to_string(),
                },
                user_ids: vec![3, 4],
            }
        );
    }
}
