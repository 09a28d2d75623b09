pub mod config;
pub mod core;
pub mod credentials;
pub mod db;
pub mod delivery_log;
pub mod dispatcher;
pub mod messaging;
pub mod registrations;
pub mod server;
pub mod topics;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use credentials::CredentialHolder;
use db::DbPool;
use delivery_log::DeliveryLog;
use dispatcher::Dispatcher;
use registrations::RegistrationStore;
use topics::TopicManager;
use transport::TransportFactory;

/// Entry point to the relay's components. Cloning is cheap; all clones share
/// the database pool and the cached push transport.
#[derive(Clone)]
pub struct FcmRelay {
    pool: DbPool,
    credentials: Arc<CredentialHolder>,
}

impl FcmRelay {
    pub fn new(pool: DbPool, factory: Arc<dyn TransportFactory>) -> Self {
        let credentials = Arc::new(CredentialHolder::new(pool.clone(), factory));
        Self { pool, credentials }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn registrations(&self) -> RegistrationStore {
        RegistrationStore::new(self.pool.clone())
    }

    pub fn credentials(&self) -> Arc<CredentialHolder> {
        Arc::clone(&self.credentials)
    }

    pub fn delivery_log(&self) -> DeliveryLog {
        DeliveryLog::new(self.pool.clone())
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.registrations(), self.credentials(), self.delivery_log())
    }

    pub fn topics(&self) -> TopicManager {
        TopicManager::new(self.credentials())
    }
}
