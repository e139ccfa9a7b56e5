//! Background mode.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

/// Which side of the fork we are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fork {
    Parent,
    Child,
}

/// Standard descriptors to detach; stderr stays when `keep_stderr` is set.
fn detached_streams(keep_stderr: bool) -> &'static [RawFd] {
    if keep_stderr {
        &[libc::STDIN_FILENO, libc::STDOUT_FILENO]
    } else {
        &[libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO]
    }
}

/// Point every descriptor in `targets` at `null`. The numbers stay taken, so
/// descriptors opened later never land on a standard stream.
fn redirect(null: &File, targets: &[RawFd]) -> io::Result<()> {
    for &fd in targets {
        // SAFETY: dup2 only manipulates the descriptor table; `null` is an
        // open file for the duration of the call.
        if unsafe { libc::dup2(null.as_raw_fd(), fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Fork, start a new session in the child and send its standard streams to
/// `/dev/null`. stderr stays attached when `keep_stderr` is set.
///
/// Must be called before any threads are started; the async runtime is
/// built afterwards.
pub fn daemonize(keep_stderr: bool) -> io::Result<Fork> {
    // SAFETY: the process is still single-threaded here.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(io::Error::last_os_error());
    }
    if pid > 0 {
        tracing::debug!("forked background process {}", pid);
        return Ok(Fork::Parent);
    }
    // SAFETY: setsid has no preconditions; it fails only for a group leader,
    // which a fresh child is not.
    if unsafe { libc::setsid() } < 0 {
        return Err(io::Error::last_os_error());
    }
    let null = OpenOptions::new().read(true).write(true).open("/dev/null")?;
    redirect(&null, detached_streams(keep_stderr))?;
    Ok(Fork::Child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};
    use tempfile::tempfile;

    #[test]
    fn test_detached_streams() {
        assert_eq!(detached_streams(true), &[0, 1]);
        assert_eq!(detached_streams(false), &[0, 1, 2]);
    }

    #[test]
    fn test_redirect_keeps_descriptor_open_on_null() {
        let mut log = tempfile().unwrap();
        let fd = log.as_raw_fd();
        let null = OpenOptions::new().read(true).write(true).open("/dev/null").unwrap();

        redirect(&null, &[fd]).unwrap();

        // writes through the redirected number are swallowed
        log.write_all(b"MQTT connected\n").unwrap();
        // SAFETY: fcntl F_GETFD on a descriptor we own.
        assert!(unsafe { libc::fcntl(fd, libc::F_GETFD) } >= 0);
        log.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = Vec::new();
        log.read_to_end(&mut contents).unwrap();
        assert!(contents.is_empty());
    }
}
