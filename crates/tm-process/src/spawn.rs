//! Process spawning via `fork`/`execve`.
//!
//! The parent prepares everything that allocates (every `CString`, the
//! redirection plan) before forking. Between `fork` and `execve` the child
//! performs raw syscalls only, and any setup failure collapses into
//! `_exit(CHILD_SETUP_EXIT_CODE)`; the parent observes it as an ordinary
//! exit with that status.

use std::convert::Infallible;
use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::path::Path;

use nix::fcntl::{open, OFlag};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{chdir, close, dup2, execve, fork, mkdir, setpgid, ForkResult, Pid};
use tracing::debug;

use tm_common::Result;

use crate::marshal::{path_to_cstring, to_cstring, to_cstring_vec};

/// Exit status a child reports when any setup step between `fork` and
/// `execve` fails. Indistinguishable from an exec target that exits with
/// the same status.
pub const CHILD_SETUP_EXIT_CODE: u8 = 1;

const DEV_NULL: &str = "/dev/null";

/// Everything one spawn needs, owned by the caller.
///
/// `stdout_path` / `stderr_path` of `None` with redirection enabled means
/// the stream goes to the null device. Disabling redirection leaves the
/// stream on the parent's descriptor.
#[derive(Debug, Clone)]
pub struct SpawnParams {
    pub path: String,
    pub argv: Vec<String>,
    pub envp: Vec<String>,
    pub stdout_path: Option<String>,
    pub stderr_path: Option<String>,
    pub redirect_stdout: bool,
    pub redirect_stderr: bool,
    pub working_directory: Option<String>,
    pub umask: Option<u16>,
}

impl SpawnParams {
    /// Creates spawn parameters with the default stream handling: both
    /// output streams redirected, to the null device absent a path.
    pub fn new(path: impl Into<String>, argv: Vec<String>, envp: Vec<String>) -> Self {
        Self {
            path: path.into(),
            argv,
            envp,
            stdout_path: None,
            stderr_path: None,
            redirect_stdout: true,
            redirect_stderr: true,
            working_directory: None,
            umask: None,
        }
    }
}

/// Where one output stream ends up in the child.
enum StreamTarget {
    /// Leave the stream on whatever descriptor the parent had.
    Inherit,
    /// Redirect to the null device.
    Null,
    /// Append to a file, creating missing ancestor directories best-effort.
    File {
        path: CString,
        ancestors: Vec<CString>,
    },
}

/// Fully marshalled spawn context. Built before `fork` so the child branch
/// never allocates.
struct SpawnContext {
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    dev_null: CString,
    working_directory: Option<CString>,
    umask: Option<Mode>,
    stdout: StreamTarget,
    stderr: StreamTarget,
}

impl SpawnContext {
    fn prepare(params: &SpawnParams) -> Result<Self> {
        Ok(Self {
            path: to_cstring("command", &params.path)?,
            argv: to_cstring_vec("argv", &params.argv)?,
            envp: to_cstring_vec("envp", &params.envp)?,
            dev_null: to_cstring("null device", DEV_NULL)?,
            working_directory: params
                .working_directory
                .as_deref()
                .map(|d| to_cstring("working directory", d))
                .transpose()?,
            umask: params.umask.map(|m| Mode::from_bits_truncate(m.into())),
            stdout: stream_target(params.redirect_stdout, params.stdout_path.as_deref())?,
            stderr: stream_target(params.redirect_stderr, params.stderr_path.as_deref())?,
        })
    }
}

fn stream_target(redirect: bool, path: Option<&str>) -> Result<StreamTarget> {
    if !redirect {
        return Ok(StreamTarget::Inherit);
    }
    match path {
        None => Ok(StreamTarget::Null),
        Some(p) => Ok(StreamTarget::File {
            path: to_cstring("output path", p)?,
            ancestors: ancestor_dirs(p)?,
        }),
    }
}

/// Ancestor directories of an output path, shortest first, ready for a
/// best-effort `mkdir` chain in the child.
fn ancestor_dirs(path: &str) -> Result<Vec<CString>> {
    let mut dirs: Vec<&Path> = match Path::new(path).parent() {
        Some(parent) => parent
            .ancestors()
            .filter(|a| !a.as_os_str().is_empty() && a.as_os_str() != "/")
            .collect(),
        None => Vec::new(),
    };
    dirs.reverse();
    dirs.into_iter()
        .map(|d| path_to_cstring("output directory", d))
        .collect()
}

/// Forks and execs a child per `params`, returning its pid.
///
/// The child joins its own process group so that signals sent to `-pid`
/// reach its descendants. Errors surfaced here are parent-side only
/// (marshalling, `fork`); child-side setup failures appear later as an
/// exit with [`CHILD_SETUP_EXIT_CODE`].
pub fn spawn(params: &SpawnParams) -> Result<Pid> {
    let ctx = SpawnContext::prepare(params)?;

    // SAFETY: the child branch calls only async-signal-safe syscalls on
    // pre-forked storage, then execs or _exits.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            debug!(pid = child.as_raw(), command = %params.path, "spawned child");
            Ok(child)
        }
        Ok(ForkResult::Child) => {
            let _ = exec_child(&ctx);
            // Only reached when a setup step or execve failed.
            unsafe { libc::_exit(i32::from(CHILD_SETUP_EXIT_CODE)) }
        }
        Err(errno) => Err(errno.into()),
    }
}

/// Child-side setup. Returns only on failure; on success `execve` replaces
/// the image.
fn exec_child(ctx: &SpawnContext) -> nix::Result<Infallible> {
    // Own process group; failure here is not worth dying for.
    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));

    if let Some(mask) = ctx.umask {
        umask(mask);
    }

    // Tolerated: a missing directory leaves the child in the inherited cwd.
    if let Some(dir) = &ctx.working_directory {
        let _ = chdir(dir.as_c_str());
    }

    let null_fd = open(ctx.dev_null.as_c_str(), OFlag::O_RDWR, Mode::empty())?;
    dup2(null_fd, libc::STDIN_FILENO)?;
    redirect_stream(&ctx.stdout, null_fd, libc::STDOUT_FILENO)?;
    redirect_stream(&ctx.stderr, null_fd, libc::STDERR_FILENO)?;
    if null_fd > libc::STDERR_FILENO {
        let _ = close(null_fd);
    }

    execve(&ctx.path, &ctx.argv, &ctx.envp)
}

fn redirect_stream(target: &StreamTarget, null_fd: RawFd, stream_fd: RawFd) -> nix::Result<()> {
    match target {
        StreamTarget::Inherit => Ok(()),
        StreamTarget::Null => {
            dup2(null_fd, stream_fd)?;
            Ok(())
        }
        StreamTarget::File { path, ancestors } => {
            for dir in ancestors {
                let _ = mkdir(dir.as_c_str(), Mode::from_bits_truncate(0o755));
            }
            let fd = open(
                path.as_c_str(),
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
                Mode::from_bits_truncate(0o644),
            )?;
            dup2(fd, stream_fd)?;
            if fd != stream_fd {
                let _ = close(fd);
            }
            Ok(())
        }
    }
}
