use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::StoreError;
use crate::config::StoreConf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

struct PoolInner {
    path: PathBuf,
    busy_timeout: Duration,
    permits: Arc<Semaphore>,
    // connexions au repos, réutilisées par les sessions suivantes
    idle_readers: Mutex<Vec<Connection>>,
    // une seule connexion d'écriture gardée : le backfill enchaîne les UPDATE
    idle_writer: Mutex<Option<Connection>>,
}

/// Pool de sessions SQLite : nombre de sessions simultanées borné par un sémaphore,
/// connexions recyclées (lecteurs + un écrivain), libération garantie au drop de la session.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

/// Session acquise : connexion + permis du sémaphore.
pub struct Session {
    conn: Option<Connection>,
    mode: AccessMode,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl SessionPool {
    pub fn new(conf: &StoreConf) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                path: conf.path.clone(),
                busy_timeout: conf.busy_timeout(),
                permits: Arc::new(Semaphore::new(conf.max_sessions.max(1))),
                idle_readers: Mutex::new(Vec::new()),
                idle_writer: Mutex::new(None),
            }),
        }
    }

    pub fn available_sessions(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub fn idle_connections(&self, mode: AccessMode) -> usize {
        match mode {
            AccessMode::ReadOnly => self.inner.idle_readers.lock().len(),
            AccessMode::ReadWrite => usize::from(self.inner.idle_writer.lock().is_some()),
        }
    }

    pub async fn acquire(&self, mode: AccessMode) -> Result<Session, StoreError> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::PoolClosed)?;

        let recycled = match mode {
            AccessMode::ReadOnly => self.inner.idle_readers.lock().pop(),
            AccessMode::ReadWrite => self.inner.idle_writer.lock().take(),
        };
        let conn = match recycled {
            Some(conn) => conn,
            None => {
                let path = self.inner.path.clone();
                let busy = self.inner.busy_timeout;
                tokio::task::spawn_blocking(move || open_connection(&path, mode, busy)).await??
            }
        };

        Ok(Session {
            conn: Some(conn),
            mode,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Exécute `work` sur une session, dans le pool de threads bloquants.
    pub async fn run<T, F>(&self, mode: AccessMode, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let session = self.acquire(mode).await?;
        tokio::task::spawn_blocking(move || work(session.connection())).await?
    }

    /// Ferme le pool : les acquisitions en attente ou futures échouent.
    pub fn close(&self) {
        self.inner.permits.close();
        self.inner.idle_readers.lock().clear();
        *self.inner.idle_writer.lock() = None;
    }
}

impl Session {
    pub fn connection(&self) -> &Connection {
        // toujours Some hors du Drop
        self.conn.as_ref().unwrap_or_else(|| unreachable!("session used after release"))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else { return };
        if self.pool.permits.is_closed() {
            debug!("[store] pool closed, dropping {:?} connection", self.mode);
            return;
        }
        match self.mode {
            AccessMode::ReadOnly => self.pool.idle_readers.lock().push(conn),
            AccessMode::ReadWrite => {
                let mut writer = self.pool.idle_writer.lock();
                if writer.is_none() {
                    *writer = Some(conn);
                } else {
                    debug!("[store] closing extra write connection");
                }
            }
        }
    }
}

fn open_connection(path: &Path, mode: AccessMode, busy: Duration) -> Result<Connection, StoreError> {
    let flags = match mode {
        AccessMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        AccessMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    };
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(busy)?;
    if mode == AccessMode::ReadOnly {
        conn.execute_batch("PRAGMA query_only=ON;")?;
    }
    conn.set_prepared_statement_cache_capacity(64);
    debug!("[store] opened {:?} connection on {:?}", mode, path);
    Ok(conn)
}
