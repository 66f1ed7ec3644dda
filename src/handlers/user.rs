//! User handler module: an in-memory user store with effect handlers for
//! list/lookup/create and a stream handler that emits stored users one by
//! one. Demonstrates the full request surface of the dispatch engine and
//! backs the end-to-end tests.

use crate::exit::Never;
use crate::router::{EffectRpc, HandlerDescriptor, Router, RouterError, StreamRpc, StreamSink};
use crate::schema::RequestContext;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// Shared in-memory user store.
///
/// An explicitly constructed handle injected into handlers, not a
/// module-level global. All reads and updates go through single lock
/// acquisitions, so id assignment during create is an atomic
/// update-and-get: concurrent creates never race on the next id.
///
/// Any real persistence layer substituted for this store must offer at
/// least this atomicity for the create/read operations used concurrently.
#[derive(Clone, Default)]
pub struct UserStore {
    users: Arc<Mutex<Vec<User>>>,
}

impl UserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with the canonical two-user fixture.
    #[must_use]
    pub fn seeded() -> Self {
        Self::with_users(vec![
            User {
                id: "1".to_string(),
                name: "Alice".to_string(),
            },
            User {
                id: "2".to_string(),
                name: "Bob".to_string(),
            },
        ])
    }

    #[must_use]
    pub fn with_users(users: Vec<User>) -> Self {
        UserStore {
            users: Arc::new(Mutex::new(users)),
        }
    }

    /// All users in insertion order.
    #[must_use]
    pub fn find_many(&self) -> Vec<User> {
        self.users.lock().clone()
    }

    /// Look up a user by id; a miss is a declared domain error, not an
    /// exception.
    pub fn find_by_id(&self, id: &str) -> Result<User, String> {
        self.users
            .lock()
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or_else(|| format!("User not found: {id}"))
    }

    /// Create a user with the next sequential id. Id computation and insert
    /// happen under one lock acquisition.
    pub fn create(&self, name: &str) -> User {
        let mut users = self.users.lock();
        let user = User {
            id: (users.len() + 1).to_string(),
            name: name.to_string(),
        };
        users.push(user.clone());
        debug!(id = %user.id, "User created");
        user
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }
}

#[derive(Debug, Deserialize)]
pub struct UserListPayload {}

#[derive(Debug, Deserialize)]
pub struct UserByIdPayload {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct UserCreatePayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UserWatchPayload {}

/// `UserList`: all users. Declares no error.
pub struct UserList {
    pub store: UserStore,
}

impl EffectRpc for UserList {
    const TAG: &'static str = "UserList";
    type Payload = UserListPayload;
    type Success = Vec<User>;
    type Error = Never;

    fn call(&self, _payload: UserListPayload, _ctx: &RequestContext) -> Result<Vec<User>, Never> {
        Ok(self.store.find_many())
    }
}

/// `UserById`: lookup by id. A miss surfaces as the declared string error.
pub struct UserById {
    pub store: UserStore,
}

impl EffectRpc for UserById {
    const TAG: &'static str = "UserById";
    type Payload = UserByIdPayload;
    type Success = User;
    type Error = String;

    fn call(&self, payload: UserByIdPayload, _ctx: &RequestContext) -> Result<User, String> {
        self.store.find_by_id(&payload.id)
    }
}

/// `UserCreate`: insert with the next sequential id. Declares no error.
pub struct UserCreate {
    pub store: UserStore,
}

impl EffectRpc for UserCreate {
    const TAG: &'static str = "UserCreate";
    type Payload = UserCreatePayload;
    type Success = User;
    type Error = Never;

    fn call(&self, payload: UserCreatePayload, _ctx: &RequestContext) -> Result<User, Never> {
        Ok(self.store.create(&payload.name))
    }
}

/// `UserWatch`: stream every stored user as its own element.
pub struct UserWatch {
    pub store: UserStore,
}

impl StreamRpc for UserWatch {
    const TAG: &'static str = "UserWatch";
    type Payload = UserWatchPayload;
    type Success = User;
    type Error = String;

    fn stream(
        &self,
        _payload: UserWatchPayload,
        _ctx: &RequestContext,
        sink: &mut StreamSink<'_, User>,
    ) -> Result<(), String> {
        for user in self.store.find_many() {
            sink.push(user);
        }
        Ok(())
    }
}

/// The user handler module's router: the fixed tag-to-handler binding list.
///
/// # Errors
///
/// Propagates [`RouterError`] if the bindings collide, which is a startup
/// defect rather than a request-time condition.
pub fn user_router(store: &UserStore) -> Result<Router, RouterError> {
    Router::make([
        HandlerDescriptor::effect(UserList {
            store: store.clone(),
        }),
        HandlerDescriptor::effect(UserById {
            store: store.clone(),
        }),
        HandlerDescriptor::effect(UserCreate {
            store: store.clone(),
        }),
        HandlerDescriptor::stream(UserWatch {
            store: store.clone(),
        }),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_sequential_ids() {
        let store = UserStore::seeded();
        let carol = store.create("Carol");
        let dave = store.create("Dave");
        assert_eq!(carol.id, "3");
        assert_eq!(dave.id, "4");
    }

    #[test]
    fn find_by_id_miss_is_declared_error() {
        let store = UserStore::seeded();
        assert_eq!(
            store.find_by_id("99"),
            Err("User not found: 99".to_string())
        );
    }

    #[test]
    fn find_many_preserves_insertion_order() {
        let store = UserStore::seeded();
        let names: Vec<_> = store.find_many().into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }
}
