use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::common::{BurrowError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request. Requests own their page buffer; completed reads hand
/// the filled buffer back over the completion channel.
enum DiskRequest {
    Read {
        page_id: PageId,
        done: Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        data: PageBuf,
        done: Sender<Result<()>>,
    },
}

/// DiskScheduler funnels page I/O through a background worker thread fed by
/// a bounded request queue.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests
    request_sender: Sender<DiskRequest>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm_clone = Arc::clone(&disk_manager);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::spawn(move || {
            Self::run_worker(dm_clone, receiver, shutdown_clone);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Schedules a read request and waits for completion, copying the page
    /// into the caller's buffer.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = bounded(1);
        self.request_sender
            .send(DiskRequest::Read { page_id, done: tx })
            .map_err(|e| BurrowError::Scheduler(format!("failed to schedule read: {}", e)))?;

        let buf = rx
            .recv()
            .map_err(|e| BurrowError::Scheduler(format!("read completion lost: {}", e)))??;
        data.copy_from_slice(&buf[..]);
        Ok(())
    }

    /// Schedules a write request and waits for completion.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (tx, rx) = bounded(1);
        self.request_sender
            .send(DiskRequest::Write {
                page_id,
                data: buf,
                done: tx,
            })
            .map_err(|e| BurrowError::Scheduler(format!("failed to schedule write: {}", e)))?;

        rx.recv()
            .map_err(|e| BurrowError::Scheduler(format!("write completion lost: {}", e)))?
    }

    /// Worker loop: process requests until shutdown is signaled, then drain
    /// whatever is still queued.
    fn run_worker(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process_request(&disk_manager, request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_id, done } => {
                let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
                let result = disk_manager
                    .read_page(page_id, &mut buf[..])
                    .map(move |_| buf);
                let _ = done.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                done,
            } => {
                let _ = done.send(disk_manager.write_page(page_id, &data[..]));
            }
        }
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = PageId::new(0);

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler.schedule_write_sync(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        scheduler
            .schedule_read_sync(page_id, &mut read_data)
            .unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_multiple_requests() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let data1 = [1u8; PAGE_SIZE];
        let data2 = [2u8; PAGE_SIZE];

        scheduler.schedule_write_sync(PageId::new(0), &data1).unwrap();
        scheduler.schedule_write_sync(PageId::new(1), &data2).unwrap();

        let mut read1 = [0u8; PAGE_SIZE];
        let mut read2 = [0u8; PAGE_SIZE];

        scheduler.schedule_read_sync(PageId::new(0), &mut read1).unwrap();
        scheduler.schedule_read_sync(PageId::new(1), &mut read2).unwrap();

        assert_eq!(read1[0], 1);
        assert_eq!(read2[0], 2);
    }
}
