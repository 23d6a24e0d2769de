use std::{
    fs::Permissions,
    os::unix::prelude::PermissionsExt,
    path::{Path, PathBuf},
    time::Instant,
};

use ppsntp::observability::CaptureState;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::watch,
};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ObservableState {
    pub program: ProgramData,
    pub capture: CaptureState,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgramData {
    pub version: String,
    pub uptime_seconds: f64,
}

impl ProgramData {
    pub fn with_uptime(uptime_seconds: f64) -> ProgramData {
        ProgramData {
            uptime_seconds,
            ..Default::default()
        }
    }
}

impl Default for ProgramData {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            uptime_seconds: 0.0,
        }
    }
}

/// Serve the capture state on a unix socket from a thread of its own.
///
/// The thread runs at normal priority so it never competes with the capture
/// loop.
pub fn spawn(
    path: PathBuf,
    permissions: u32,
    state: watch::Receiver<CaptureState>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("observer".into())
        .spawn(move || {
            if let Err(e) = crate::setup::set_normal_priority() {
                tracing::warn!("Observer keeps elevated priority: {e}");
            }

            let result = tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .build()
                .and_then(|runtime| runtime.block_on(observer(&path, permissions, state)));

            if let Err(ref e) = result {
                tracing::warn!("Abnormal termination of the state observer: {e}");
                tracing::warn!("The state observer will not be available");
            }
        })
}

pub async fn observer(
    path: &Path,
    permissions: u32,
    state: watch::Receiver<CaptureState>,
) -> std::io::Result<()> {
    // the daemon runs as root to be able to use the GPIO lines and shared
    // memory. By default, the socket inherits root permissions, but the
    // client should not need elevated permissions to read from the socket.
    // So we explicitly set the permissions
    let permissions: Permissions = PermissionsExt::from_mode(permissions);
    let listener = create_unix_socket_with_permissions(path, permissions)?;

    serve(listener, state).await
}

async fn serve(
    listener: UnixListener,
    state: watch::Receiver<CaptureState>,
) -> std::io::Result<()> {
    let start_time = Instant::now();

    loop {
        let (mut stream, _addr) = listener.accept().await?;

        let observe = ObservableState {
            program: ProgramData::with_uptime(start_time.elapsed().as_secs_f64()),
            capture: *state.borrow(),
        };

        write_json(&mut stream, &observe).await?;
    }
}

fn other_error<T>(msg: String) -> std::io::Result<T> {
    use std::io::{Error, ErrorKind};
    Err(Error::new(ErrorKind::Other, msg))
}

pub fn create_unix_socket_with_permissions(
    path: &Path,
    permissions: Permissions,
) -> std::io::Result<UnixListener> {
    let listener = create_unix_socket(path)?;

    std::fs::set_permissions(path, permissions)?;

    Ok(listener)
}

fn create_unix_socket(path: &Path) -> std::io::Result<UnixListener> {
    // must unlink path before the bind below (otherwise we get "address already in use")
    if path.exists() {
        use std::os::unix::fs::FileTypeExt;

        let meta = std::fs::metadata(path)?;
        if !meta.file_type().is_socket() {
            return other_error(format!("path {path:?} exists but is not a socket"));
        }

        std::fs::remove_file(path)?;
    }

    // OS errors are terrible; let's try to do better
    let error = match UnixListener::bind(path) {
        Ok(listener) => return Ok(listener),
        Err(e) => e,
    };

    // we don't create parent directories
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            let msg = format!(
                "Could not create observe socket at {:?} because its parent directory does not \
                 exist",
                &path
            );
            return other_error(msg);
        }
    }

    // otherwise, just forward the OS error
    let msg = format!(
        "Could not create observe socket at {:?}: {:?}",
        &path, error
    );

    other_error(msg)
}

pub async fn write_json<T>(stream: &mut UnixStream, value: &T) -> std::io::Result<()>
where
    T: serde::Serialize,
{
    let bytes = serde_json::to_vec(value)?;
    stream.write_all(&bytes).await
}

/// Fetch the state from a running daemon
pub async fn read_state(path: &Path) -> std::io::Result<ObservableState> {
    let mut stream = UnixStream::connect(path).await?;
    let mut buffer = Vec::with_capacity(4 * 1024);
    stream.read_to_end(&mut buffer).await?;

    serde_json::from_slice(&buffer)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use ppsntp::time::{Fudge, Timestamp};
    use serde_test::{assert_ser_tokens, Token};

    use super::*;

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ppsntp-{name}-{}.sock", std::process::id()))
    }

    #[tokio::test]
    async fn serves_latest_state() {
        let path = socket_path("observer");
        let listener =
            create_unix_socket_with_permissions(&path, PermissionsExt::from_mode(0o600)).unwrap();

        let (sender, receiver) = watch::channel(CaptureState::default());
        let server = tokio::spawn(serve(listener, receiver));

        let state = CaptureState {
            fudge: Fudge::new(0, -200_000_000),
            pulses: 4,
            published: 1,
            retrieved: 1,
            last_receive: Some(Timestamp::new(103, 200_000_000)),
            last_clock: Some(103),
            ..Default::default()
        };
        sender.send_replace(state);

        let observed = read_state(&path).await.unwrap();
        assert_eq!(observed.capture, state);
        assert_eq!(observed.program.version, env!("CARGO_PKG_VERSION"));

        server.abort();
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn refuses_to_replace_regular_file() {
        let path = socket_path("not-a-socket");
        std::fs::write(&path, "").unwrap();

        let error = create_unix_socket(&path).unwrap_err();
        assert!(error.to_string().contains("is not a socket"));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn missing_parent_directory() {
        let error = create_unix_socket(Path::new("/nonexistent-ppsntp/observe.sock")).unwrap_err();
        assert!(error.to_string().contains("parent directory does not exist"));
    }

    #[test]
    fn capture_state_shape() {
        let state = CaptureState {
            fudge: Fudge::new(0, 5),
            calibrating: true,
            pulses: 2,
            ..Default::default()
        };

        assert_ser_tokens(
            &state,
            &[
                Token::Struct {
                    name: "CaptureState",
                    len: 8,
                },
                Token::Str("fudge"),
                Token::Struct {
                    name: "Fudge",
                    len: 2,
                },
                Token::Str("seconds"),
                Token::I64(0),
                Token::Str("nanos"),
                Token::I64(5),
                Token::StructEnd,
                Token::Str("calibrating"),
                Token::Bool(true),
                Token::Str("pulses"),
                Token::U64(2),
                Token::Str("published"),
                Token::U64(0),
                Token::Str("wraps"),
                Token::U64(0),
                Token::Str("retrieved"),
                Token::U64(0),
                Token::Str("last-receive"),
                Token::None,
                Token::Str("last-clock"),
                Token::None,
                Token::StructEnd,
            ],
        );
    }
}
