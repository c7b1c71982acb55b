//! SSH/SFTP sessions
//!
//! [`RemoteSession`] is the narrow surface the sync engine and the remote
//! executor need. [`SshConnector`] implements it on top of libssh2; every
//! libssh2 call is blocking, so each one runs on the blocking pool.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use ssh2::{FileStat, Session, Sftp};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::context::OutputSink;
use crate::errors::DeployError;
use crate::models::connection::{Auth, ConnectionProfile};

/// Size and modification time of a remote file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub size: u64,
    /// Seconds since the Unix epoch
    pub mtime: u64,
}

/// One authenticated session to a remote host
#[async_trait]
pub trait RemoteSession: Send {
    /// Create a directory. Fails with [`DeployError::AlreadyExists`] when
    /// `path` is already a directory.
    async fn mkdir(&mut self, path: &str, recursive: bool) -> Result<(), DeployError>;

    async fn stat(&mut self, path: &str) -> Result<RemoteStat, DeployError>;

    /// Upload `local` to `remote`, replacing any existing file
    async fn put(&mut self, local: &Path, remote: &str) -> Result<(), DeployError>;

    async fn chmod(&mut self, path: &str, mode: u32) -> Result<(), DeployError>;

    /// Run `command`, streaming its output to `sink`, and return the exit code
    async fn exec(
        &mut self,
        command: &str,
        pty: bool,
        sink: &dyn OutputSink,
    ) -> Result<i32, DeployError>;

    /// Close the session
    async fn end(&mut self) -> Result<(), DeployError>;
}

/// Opens [`RemoteSession`]s
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Box<dyn RemoteSession>, DeployError>;
}

/// Connector backed by libssh2
#[derive(Debug, Clone)]
pub struct SshConnector {
    pub connect_timeout: Duration,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
        }
    }
}

/// Owned copy of the credentials, movable onto the blocking pool
enum Credentials {
    Key {
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
    Password(SecretString),
}

impl From<&Auth> for Credentials {
    fn from(auth: &Auth) -> Self {
        match auth {
            Auth::Key {
                private_key_path,
                passphrase,
            } => Credentials::Key {
                path: private_key_path.clone(),
                passphrase: passphrase
                    .as_ref()
                    .map(|p| SecretString::from(p.expose_secret().to_owned())),
            },
            Auth::Password(password) => {
                Credentials::Password(SecretString::from(password.expose_secret().to_owned()))
            }
        }
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Box<dyn RemoteSession>, DeployError> {
        let host = profile.host.clone();
        let port = profile.port;
        let username = profile.username.clone();
        let credentials = Credentials::from(&profile.auth);
        let timeout = self.connect_timeout;
        let label = profile.to_string();

        info!("Connecting to {}", label);
        let inner = tokio::task::spawn_blocking(move || {
            open_session(&host, port, &username, &credentials, timeout)
        })
        .await??;
        debug!("Connected to {}", label);

        Ok(Box::new(SshSession {
            inner: Arc::new(Mutex::new(inner)),
        }))
    }
}

fn open_session(
    host: &str,
    port: u16,
    username: &str,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<SshInner, DeployError> {
    let conn_err = |what: &str, e: &dyn std::fmt::Display| {
        DeployError::Connection(format!("{} {}:{}: {}", what, host, port, e))
    };

    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| conn_err("cannot resolve", &e))?
        .next()
        .ok_or_else(|| DeployError::Connection(format!("no address for {}", host)))?;
    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| conn_err("cannot connect to", &e))?;

    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| conn_err("handshake failed with", &e))?;

    let auth_result = match credentials {
        Credentials::Key { path, passphrase } => session.userauth_pubkey_file(
            username,
            None,
            path,
            passphrase.as_ref().map(|p| p.expose_secret()),
        ),
        Credentials::Password(password) => {
            session.userauth_password(username, password.expose_secret())
        }
    };
    auth_result.map_err(|e| conn_err("authentication failed for", &e))?;
    if !session.authenticated() {
        return Err(DeployError::Connection(format!(
            "authentication rejected for {}@{}",
            username, host
        )));
    }

    let sftp = session.sftp()?;
    Ok(SshInner { session, sftp })
}

struct SshInner {
    session: Session,
    sftp: Sftp,
}

/// A live libssh2 session with an open SFTP channel
pub struct SshSession {
    inner: Arc<Mutex<SshInner>>,
}

impl SshSession {
    async fn blocking<T, F>(&self, f: F) -> Result<T, DeployError>
    where
        F: FnOnce(&mut SshInner) -> Result<T, DeployError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| DeployError::Internal("SSH session lock poisoned".into()))?;
            f(&mut guard)
        })
        .await?
    }
}

/// Decodes a byte stream read in arbitrary chunks.
///
/// A multi-byte character split across reads is held back until the rest
/// arrives. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Chunks {
    pending: Vec<u8>,
}

impl Utf8Chunks {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Incomplete sequence at the end; wait for more
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is left once the stream ends
    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

fn is_remote_dir(sftp: &Sftp, path: &Path) -> bool {
    sftp.stat(path).map(|s| s.is_dir()).unwrap_or(false)
}

fn mkdir_blocking(sftp: &Sftp, path: &str, recursive: bool) -> Result<(), DeployError> {
    if is_remote_dir(sftp, Path::new(path)) {
        return Err(DeployError::AlreadyExists(path.to_string()));
    }

    if !recursive {
        return sftp
            .mkdir(Path::new(path), 0o755)
            .map_err(|e| DeployError::transfer(path, e));
    }

    let absolute = path.starts_with('/');
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if absolute || !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);

        let dir = Path::new(&current);
        if is_remote_dir(sftp, dir) {
            continue;
        }
        if let Err(e) = sftp.mkdir(dir, 0o755) {
            // Lost a race with another creator
            if !is_remote_dir(sftp, dir) {
                return Err(DeployError::transfer(current.clone(), e));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn mkdir(&mut self, path: &str, recursive: bool) -> Result<(), DeployError> {
        let path = path.to_string();
        self.blocking(move |inner| mkdir_blocking(&inner.sftp, &path, recursive))
            .await
    }

    async fn stat(&mut self, path: &str) -> Result<RemoteStat, DeployError> {
        let path = path.to_string();
        self.blocking(move |inner| {
            let stat = inner
                .sftp
                .stat(Path::new(&path))
                .map_err(|e| DeployError::transfer(path.clone(), e))?;
            match (stat.size, stat.mtime) {
                (Some(size), Some(mtime)) => Ok(RemoteStat { size, mtime }),
                _ => Err(DeployError::transfer(path, "server returned no size/mtime")),
            }
        })
        .await
    }

    async fn put(&mut self, local: &Path, remote: &str) -> Result<(), DeployError> {
        let local = local.to_path_buf();
        let remote = remote.to_string();
        self.blocking(move |inner| {
            let mut source = std::fs::File::open(&local)
                .map_err(|e| DeployError::transfer(local.display().to_string(), e))?;
            let mut dest = inner
                .sftp
                .create(Path::new(&remote))
                .map_err(|e| DeployError::transfer(remote.clone(), e))?;
            std::io::copy(&mut source, &mut dest)
                .map_err(|e| DeployError::transfer(remote.clone(), e))?;
            Ok(())
        })
        .await
    }

    async fn chmod(&mut self, path: &str, mode: u32) -> Result<(), DeployError> {
        let path = path.to_string();
        self.blocking(move |inner| {
            let stat = FileStat {
                size: None,
                uid: None,
                gid: None,
                perm: Some(mode),
                atime: None,
                mtime: None,
            };
            inner
                .sftp
                .setstat(Path::new(&path), stat)
                .map_err(|e| DeployError::transfer(path.clone(), e))
        })
        .await
    }

    async fn exec(
        &mut self,
        command: &str,
        pty: bool,
        sink: &dyn OutputSink,
    ) -> Result<i32, DeployError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let command = command.to_string();
        let inner = self.inner.clone();

        let handle = tokio::task::spawn_blocking(move || -> Result<i32, DeployError> {
            let guard = inner
                .lock()
                .map_err(|_| DeployError::Internal("SSH session lock poisoned".into()))?;
            let remote_err = |e: ssh2::Error| DeployError::RemoteExec(e.to_string());

            let mut channel = guard.session.channel_session().map_err(remote_err)?;
            if pty {
                channel.request_pty("xterm", None, None).map_err(remote_err)?;
            }
            channel.exec(&command).map_err(remote_err)?;

            let mut buf = [0u8; 4096];
            let mut decoder = Utf8Chunks::default();
            loop {
                let n = channel.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                let text = decoder.push(&buf[..n]);
                if !text.is_empty() && tx.send(text).is_err() {
                    break;
                }
            }
            let tail = decoder.finish();
            if !tail.is_empty() {
                let _ = tx.send(tail);
            }

            // With a pty stderr is merged into stdout; drain it anyway
            let mut stderr = Vec::new();
            let _ = channel.stderr().read_to_end(&mut stderr);
            if !stderr.is_empty() {
                let _ = tx.send(String::from_utf8_lossy(&stderr).into_owned());
            }

            channel.wait_close().map_err(remote_err)?;
            channel.exit_status().map_err(remote_err)
        });

        while let Some(chunk) = rx.recv().await {
            sink.append(&chunk);
        }
        handle.await?
    }

    async fn end(&mut self) -> Result<(), DeployError> {
        self.blocking(|inner| {
            inner
                .session
                .disconnect(None, "aotship deploy finished", None)
                .map_err(DeployError::from)
        })
        .await
    }
}
