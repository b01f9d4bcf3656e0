//! The request object and its single terminal completion.
//!
//! An [`Irp`] is created by the hosting environment together with an
//! [`IrpWatcher`]. The request travels through dispatch, possibly sits in the
//! pending list, and is finalized exactly once by [`Irp::complete`], which
//! consumes it. A request dropped without completion is cancelled from its
//! `Drop` impl, so the watcher always observes one terminal status.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, OnceLock, PoisonError,
    },
    time::Duration,
};

use crossbeam::channel::{bounded, Receiver, Sender};
use shared::{NtStatus, SecurityInformation};

/// `{Status, Information}` as delivered to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoStatusBlock {
    pub status: NtStatus,
    /// Bytes written on success, bytes required on overflow.
    pub information: u64,
}

/*──────────────────────────── file context ──────────────────────────────*/

/// Per-file state, shared by every open of the same name.
#[derive(Debug)]
pub struct Fcb {
    pub file_name: String,
}

/// Per-open state. `user_context` is the value the service returned at open.
#[derive(Debug)]
pub struct Ccb {
    pub fcb: Arc<Fcb>,
    pub user_context: u64,
}

impl Ccb {
    pub fn new(file_name: impl Into<String>, user_context: u64) -> Arc<Self> {
        Arc::new(Self {
            fcb: Arc::new(Fcb { file_name: file_name.into() }),
            user_context,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FileObject {
    pub file_name: String,
    pub fs_context2: Option<Arc<Ccb>>,
}

impl FileObject {
    /// File object for an open handle: the per-open context is attached.
    pub fn opened(ccb: Arc<Ccb>) -> Self {
        Self { file_name: ccb.fcb.file_name.clone(), fs_context2: Some(ccb) }
    }
}

/*──────────────────────────── parameters ────────────────────────────────*/

#[derive(Debug, Clone, Default)]
pub enum Parameters {
    QuerySecurity {
        security_information: SecurityInformation,
        length: u32,
    },
    SetSecurity {
        security_information: SecurityInformation,
        descriptor: Vec<u8>,
    },
    #[default]
    None,
}

/*──────────────────────────── user buffer ───────────────────────────────*/

/// Caller-owned destination memory.
///
/// Only a mapped view ([`crate::mdl::Mdl`]) may be written from a context
/// other than the dispatching one.
#[derive(Debug, Clone)]
pub struct UserBuffer(Arc<Mutex<Vec<u8>>>);

impl UserBuffer {
    pub fn new(len: usize) -> Self {
        Self(Arc::new(Mutex::new(vec![0; len])))
    }

    pub fn filled(byte: u8, len: usize) -> Self {
        Self(Arc::new(Mutex::new(vec![byte; len])))
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Copy `data` to the start of the buffer; returns bytes copied.
    pub(crate) fn write_prefix(&self, data: &[u8]) -> usize {
        let mut buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        n
    }
}

/*──────────────────────────── completion ────────────────────────────────*/

#[derive(Debug, Default)]
struct Completion {
    block: OnceLock<IoStatusBlock>,
    serial_number: OnceLock<u64>,
    count: AtomicUsize,
}

/// Caller-side view of a request's terminal status.
#[derive(Debug)]
pub struct IrpWatcher {
    completion: Arc<Completion>,
    done: Receiver<IoStatusBlock>,
}

impl IrpWatcher {
    pub fn status(&self) -> Option<IoStatusBlock> {
        self.completion.block.get().copied()
    }

    /// How many times the request was finalized. Anything but 0 or 1 is a bug.
    pub fn completions(&self) -> usize {
        self.completion.count.load(Ordering::Acquire)
    }

    /// Correlation token, once the request has been handed to the service.
    pub fn serial_number(&self) -> Option<u64> {
        self.completion.serial_number.get().copied()
    }

    pub fn wait(&self, timeout: Duration) -> Option<IoStatusBlock> {
        if let Some(block) = self.status() {
            return Some(block);
        }
        self.done.recv_timeout(timeout).ok()
    }
}

/*──────────────────────────── IRP ───────────────────────────────────────*/

#[derive(Debug)]
pub struct Irp {
    pub major_function: u32,
    pub requestor_process_id: u32,
    pub file_object: Option<FileObject>,
    pub parameters: Parameters,
    pub user_buffer: Option<UserBuffer>,
    completion: Arc<Completion>,
    notify: Sender<IoStatusBlock>,
    finalized: bool,
}

impl Irp {
    pub fn new(major_function: u32) -> (Self, IrpWatcher) {
        let completion = Arc::new(Completion::default());
        let (notify, done) = bounded(1);
        let irp = Self {
            major_function,
            requestor_process_id: 0,
            file_object: None,
            parameters: Parameters::None,
            user_buffer: None,
            completion: Arc::clone(&completion),
            notify,
            finalized: false,
        };
        (irp, IrpWatcher { completion, done })
    }

    pub fn with_process_id(mut self, pid: u32) -> Self {
        self.requestor_process_id = pid;
        self
    }

    pub fn with_file_object(mut self, file_object: FileObject) -> Self {
        self.file_object = Some(file_object);
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_user_buffer(mut self, buffer: UserBuffer) -> Self {
        self.user_buffer = Some(buffer);
        self
    }

    pub(crate) fn set_serial_number(&self, serial: u64) {
        let _ = self.completion.serial_number.set(serial);
    }

    /// Deliver the terminal status. Consumes the request.
    pub fn complete(mut self, status: NtStatus, information: u64) {
        self.finish(status, information);
    }

    fn finish(&mut self, status: NtStatus, information: u64) {
        debug_assert!(status != NtStatus::Pending, "STATUS_PENDING is not terminal");
        self.finalized = true;
        self.completion.count.fetch_add(1, Ordering::AcqRel);
        let block = IoStatusBlock { status, information };
        if self.completion.block.set(block).is_err() {
            log::error!("IRP (major 0x{:02x}) completed twice", self.major_function);
            return;
        }
        // Receiver may be gone: the caller stopped watching.
        let _ = self.notify.try_send(block);
    }
}

impl Drop for Irp {
    fn drop(&mut self) {
        if !self.finalized {
            log::error!(
                "IRP (major 0x{:02x}) dropped without completion, cancelling",
                self.major_function
            );
            self.finish(NtStatus::Cancelled, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_delivers_once() {
        let (irp, watcher) = Irp::new(0x14);
        assert_eq!(watcher.status(), None);
        irp.complete(NtStatus::Success, 40);

        let block = watcher.wait(Duration::from_millis(10)).unwrap();
        assert_eq!(block, IoStatusBlock { status: NtStatus::Success, information: 40 });
        assert_eq!(watcher.completions(), 1);
    }

    #[test]
    fn dropped_irp_is_cancelled() {
        let (irp, watcher) = Irp::new(0x14);
        drop(irp);
        assert_eq!(watcher.status().map(|b| b.status), Some(NtStatus::Cancelled));
        assert_eq!(watcher.completions(), 1);
    }

    #[test]
    fn write_prefix_is_bounded_by_buffer() {
        let buf = UserBuffer::new(4);
        assert_eq!(buf.write_prefix(&[9; 8]), 4);
        assert_eq!(buf.snapshot(), vec![9; 4]);
    }
}
