//! The connection pool: the sole authority on which socket serves a given
//! identifier. Holds outbound write-halves only — `Receiver`s own their read
//! halves directly and report loss back through the Controller.

use kv_wire::EndpointId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("identifier {0} not found in connection pool")]
    IdentifierNotFound(EndpointId),
    #[error("connection already registered for {0}")]
    AlreadyConnected(EndpointId),
    #[error("alias {0} already in use by another connection")]
    AliasTaken(EndpointId),
    #[error("i/o error writing to {addr}: {source}")]
    Io {
        addr: EndpointId,
        #[source]
        source: std::io::Error,
    },
}

struct Entry {
    write_half: OwnedWriteHalf,
    alias: Option<EndpointId>,
}

#[derive(Default)]
struct Inner {
    by_addr: HashMap<EndpointId, Entry>,
    alias_to_addr: HashMap<EndpointId, EndpointId>,
}

/// Cheaply cloneable handle to the shared connection pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Mutex<Inner>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        ConnectionPool {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Register a newly accepted or dialed connection under its remote
    /// socket address, optionally aliasing it to a canonical identifier
    /// (known up front only when we dialed it ourselves).
    pub async fn add(
        &self,
        remote_addr: EndpointId,
        write_half: OwnedWriteHalf,
        identifier: Option<EndpointId>,
    ) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().await;
        if inner.by_addr.contains_key(&remote_addr) {
            return Err(PoolError::AlreadyConnected(remote_addr));
        }

        let mut alias = None;
        if let Some(id) = identifier {
            if inner.alias_to_addr.contains_key(&id) {
                tracing::warn!(identifier = %id, "duplicate identifier, connection added without alias");
            } else {
                inner.alias_to_addr.insert(id.clone(), remote_addr.clone());
                alias = Some(id);
            }
        }

        inner.by_addr.insert(remote_addr, Entry { write_half, alias });
        Ok(())
    }

    /// Remove a connection (by its remote socket address), returning its
    /// write half if it existed.
    pub async fn remove(&self, remote_addr: &EndpointId) -> Option<OwnedWriteHalf> {
        let mut inner = self.inner.lock().await;
        let entry = inner.by_addr.remove(remote_addr)?;
        if let Some(alias) = &entry.alias {
            inner.alias_to_addr.remove(alias);
        }
        Some(entry.write_half)
    }

    /// Install (or move) the alias for an existing connection. Fails if the
    /// alias is already taken by a *different* connection.
    pub async fn update(&self, remote_addr: &EndpointId, alias: EndpointId) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.alias_to_addr.get(&alias) {
            if existing != remote_addr {
                return Err(PoolError::AliasTaken(alias));
            }
            return Ok(());
        }

        let Some(entry) = inner.by_addr.get_mut(remote_addr) else {
            return Err(PoolError::IdentifierNotFound(remote_addr.clone()));
        };
        if let Some(old_alias) = entry.alias.take() {
            inner.alias_to_addr.remove(&old_alias);
        }
        entry.alias = Some(alias.clone());
        inner.alias_to_addr.insert(alias, remote_addr.clone());
        Ok(())
    }

    pub async fn contains(&self, name: &EndpointId) -> bool {
        let inner = self.inner.lock().await;
        inner.alias_to_addr.contains_key(name) || inner.by_addr.contains_key(name)
    }

    /// Resolve `name` (alias preferred, then direct) and write `bytes` to
    /// its socket. On I/O failure, the connection is dropped from the pool.
    pub async fn send(&self, name: &EndpointId, bytes: &[u8]) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().await;
        let addr = inner
            .alias_to_addr
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.clone());

        let Some(entry) = inner.by_addr.get_mut(&addr) else {
            return Err(PoolError::IdentifierNotFound(name.clone()));
        };

        match entry.write_half.write_all(bytes).await {
            Ok(()) => Ok(()),
            Err(source) => {
                if let Some(removed) = inner.by_addr.remove(&addr) {
                    if let Some(alias) = removed.alias {
                        inner.alias_to_addr.remove(&alias);
                    }
                }
                Err(PoolError::Io { addr, source })
            }
        }
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}
