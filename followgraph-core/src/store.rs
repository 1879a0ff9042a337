use crate::error::StoreError;
use crate::model::{FollowEdge, NewUser, User};
use std::collections::HashSet;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Users keyed by a unique external id and a unique handle.
pub trait UserStore {
    fn find_by_handle(&self, handle: &str) -> StoreResult<Option<User>>;

    /// Batched existence check; returns only the users that are already stored.
    fn find_all_by_external_ids(&self, external_ids: &HashSet<String>) -> StoreResult<Vec<User>>;

    /// Insert and return the stored user with its assigned id.
    fn insert_user(&self, user: &NewUser) -> StoreResult<User>;
}

pub trait EdgeStore {
    fn insert_edge(&self, edge: &FollowEdge) -> StoreResult<FollowEdge>;
}
