//! C7: a bounded, reusable pool of live [`Connection`]s.
//!
//! `target_size` is advisory: `get` never blocks or refuses to dial past it,
//! and the cap is only enforced at `put` time, pruning surplus connections
//! on return rather than refusing to hand them out on acquisition.

use std::collections::VecDeque;
use std::net::TcpStream;
use std::sync::Mutex;

use crate::connection::Connection;
use crate::errors::Error;
use crate::frame::ProtocolVariant;
use crate::transport::Transport;

type Dial<T> = Box<dyn Fn() -> Result<Connection<T>, Error> + Send + Sync>;

/// A bounded pool of reusable [`Connection`]s.
///
/// `Send + Sync` - the idle queue is behind a [`Mutex`] - so a `Pool` is
/// ordinarily shared across threads via `Arc<Pool>`. Individual checked-out
/// [`Connection`]s are not `Sync` and must stay on one thread at a time.
pub struct Pool<T: Transport = TcpStream> {
    dial: Dial<T>,
    target_size: usize,
    idle: Mutex<VecDeque<Connection<T>>>,
}

impl<T: Transport> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("target_size", &self.target_size)
            .field("idle", &self.idle.lock().map(|q| q.len()).unwrap_or(0))
            .finish()
    }
}

impl Pool<TcpStream> {
    /// Dials `target_size` connections against `host:port` eagerly, failing
    /// fast if any of them fails - there is no lazy/deferred connection
    /// concept in this synchronous design (§4.7 ADDED note).
    pub fn new(
        host: impl Into<String>,
        port: u16,
        graph_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        variant: ProtocolVariant,
        target_size: usize,
    ) -> Result<Self, Error> {
        let host = host.into();
        let graph_name = graph_name.into();
        let username = username.into();
        let password = password.into();

        let dial = move || {
            Connection::open(
                &host,
                port,
                graph_name.clone(),
                username.clone(),
                password.clone(),
                variant,
            )
        };

        Self::with_dial(Box::new(dial), target_size)
    }
}

impl<T: Transport> Pool<T> {
    fn with_dial(dial: Dial<T>, target_size: usize) -> Result<Self, Error> {
        let mut idle = VecDeque::with_capacity(target_size);
        for _ in 0..target_size {
            idle.push_back(dial()?);
        }
        tracing::debug!(target_size, "rexpro pool pre-filled");

        Ok(Self {
            dial,
            target_size,
            idle: Mutex::new(idle),
        })
    }

    /// Returns an idle connection if one is available, otherwise dials a
    /// fresh one. Never blocks.
    pub fn get(&self) -> Result<Connection<T>, Error> {
        if let Some(conn) = self.idle.lock().expect("rexpro pool mutex poisoned").pop_front() {
            return Ok(conn);
        }
        tracing::debug!("rexpro pool empty, dialing a fresh connection");
        (self.dial)()
    }

    /// Returns a connection to the pool.
    ///
    /// A connection that has already closed its transport (e.g. after a
    /// fatal error) is dropped outright rather than queued - it must not be
    /// handed back out by a later `get`. Otherwise, if the idle queue is
    /// already at `target_size`, the surplus connection is closed instead of
    /// queued.
    pub fn put(&self, mut conn: Connection<T>) {
        if !conn.is_open() {
            tracing::debug!("dropping an already-closed rexpro connection instead of pooling it");
            return;
        }

        let mut idle = self.idle.lock().expect("rexpro pool mutex poisoned");
        if idle.len() >= self.target_size {
            tracing::debug!(
                idle = idle.len(),
                target_size = self.target_size,
                "rexpro pool full, closing surplus connection"
            );
            drop(idle);
            conn.close();
            return;
        }
        idle.push_back(conn);
    }

    /// Acquires a connection, runs `f` against it, and always returns it
    /// (§5): a fatal error from `f` closes the connection before it's
    /// returned, so [`Pool::put`] discards it rather than queuing a dead
    /// connection.
    pub fn with_connection<F, R>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Connection<T>) -> Result<R, Error>,
    {
        let mut conn = self.get()?;
        let result = f(&mut conn);

        if let Err(e) = &result {
            if e.is_fatal() {
                conn.close();
            }
        }

        self.put(conn);
        result
    }

    /// Closes every idle connection. Does not affect connections currently
    /// checked out.
    pub fn close(&self) {
        let mut idle = self.idle.lock().expect("rexpro pool mutex poisoned");
        for mut conn in idle.drain(..) {
            conn.close();
        }
    }
}
