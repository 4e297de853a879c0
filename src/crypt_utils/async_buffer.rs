//! A double buffer that regenerates its content asynchronously. A dedicated
//! worker thread owns the generator (and whatever channels the generator
//! holds); requests and refills travel over crossbeam channels so that the
//! next batch is always being produced while the current one is consumed.

use anyhow::{Context, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::thread::JoinHandle;

/// Holds one ready buffer of `T` and keeps one refill request in flight at
/// all times: from construction on, and again after every buffer swap.
pub struct AsyncBuffer<T: Copy + Send + 'static> {
    buffer_size: usize,
    buffer: Vec<T>,
    index: usize,
    request_tx: Option<Sender<usize>>,
    data_rx: Receiver<Result<Vec<T>>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Copy + Send + 'static> AsyncBuffer<T> {
    /// Spawns the refill worker and immediately requests the first batch.
    pub fn new<F>(buffer_size: usize, mut generate: F) -> Self
    where
        F: FnMut(usize) -> Result<Vec<T>> + Send + 'static,
    {
        let (request_tx, request_rx) = unbounded::<usize>();
        let (data_tx, data_rx) = unbounded();

        let worker = std::thread::spawn(move || {
            while let Ok(size) = request_rx.recv() {
                let batch = generate(size);
                let failed = batch.is_err();
                if data_tx.send(batch).is_err() || failed {
                    break;
                }
            }
        });

        // The worker was just spawned and holds the other end, so this send
        // only fails if it already panicked; that surfaces in get_data.
        let _ = request_tx.send(buffer_size);

        AsyncBuffer {
            buffer_size,
            buffer: Vec::new(),
            index: 0,
            request_tx: Some(request_tx),
            data_rx,
            worker: Some(worker),
        }
    }

    /// Returns exactly `size` items in FIFO order, blocking on the in-flight
    /// refill when the ready buffer runs dry. Requests larger than the
    /// buffer size drain multiple refills transparently.
    pub fn get_data(&mut self, size: usize) -> Result<Vec<T>> {
        let mut rst = Vec::with_capacity(size);
        while rst.len() < size {
            if self.index >= self.buffer.len() {
                self.buffer = self
                    .data_rx
                    .recv()
                    .context("buffer refill worker is gone")??;
                self.index = 0;
                if let Some(tx) = &self.request_tx {
                    let _ = tx.send(self.buffer_size);
                }
            }
            let take = (size - rst.len()).min(self.buffer.len() - self.index);
            rst.extend_from_slice(&self.buffer[self.index..self.index + take]);
            self.index += take;
        }
        Ok(rst)
    }
}

impl<T: Copy + Send + 'static> Drop for AsyncBuffer<T> {
    fn drop(&mut self) {
        // Closing the request channel lets the worker finish its in-flight
        // batch and exit; joining it keeps channel teardown orderly.
        self.request_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
