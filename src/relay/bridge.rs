//! Device-to-device copy
//!
//! Streams one object from a source session straight into a new object on
//! a destination session. The source's push-style fetch runs on a scoped
//! worker thread and publishes into a [`HandoffChannel`]; the destination's
//! pull-style send runs on the calling thread and acquires from it.

use super::channel::{CloseOnDrop, HandoffChannel};
use crate::device::{DeviceHandle, FileRecord, Transport};
use crate::error::{MtpError, Result};
use crate::executor::{panic_message, OperationKind};
use crate::progress::MonotonicProgress;
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// Id of the object on the receiving side
    pub object_id: u32,
    /// Bytes moved
    pub bytes: u64,
    /// Wall-clock time
    pub duration: Duration,
}

impl TransferSummary {
    /// Average throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Byte counts and cancellation state of one side of the bridge
#[derive(Debug, Default)]
struct SideTally {
    moved: u64,
    /// Running total this side expected once the call that hit a closed
    /// channel had finished
    cut_short: Option<u64>,
}

impl SideTally {
    fn outcome(self, call: &'static str, status: i32) -> Result<u64> {
        if let Some(requested) = self.cut_short {
            return Err(MtpError::ChannelCancelled {
                transferred: self.moved,
                requested,
            });
        }
        if status != 0 {
            return Err(MtpError::ExternalCallFailure { call, status });
        }
        Ok(self.moved)
    }
}

/// Copies objects between two open device sessions
pub struct DeviceBridge<'t> {
    transport: &'t dyn Transport,
}

impl<'t> DeviceBridge<'t> {
    /// Create a bridge over a transport
    pub fn new(transport: &'t dyn Transport) -> Self {
        Self { transport }
    }

    /// Copy `object_id` from `source` into a new object on `destination`
    /// described by `metadata`.
    ///
    /// `metadata.size` must match the source object. On success the new
    /// object id is written back into `metadata.id`. The fetch worker is
    /// always joined before this returns.
    pub fn copy(
        &self,
        source: &DeviceHandle,
        object_id: u32,
        destination: &DeviceHandle,
        metadata: &mut FileRecord,
        progress: Option<&mut (dyn FnMut(u64, u64) + Send)>,
    ) -> Result<TransferSummary> {
        if source.same_session(destination) {
            return Err(MtpError::SessionConflict(source.id()));
        }
        let source_session = source.session()?;
        let dest_session = destination.session()?;

        let started = Instant::now();
        let channel = HandoffChannel::new();
        let transport = self.transport;

        tracing::debug!(
            "Bridging object {} from session {} to session {} ({} bytes)",
            object_id,
            source_session,
            dest_session,
            metadata.size
        );

        let (fetch, send) = thread::scope(|scope| {
            let fetch_worker = thread::Builder::new()
                .name(format!("mtp-fetch-{object_id}"))
                .spawn_scoped(scope, || {
                    let _close = CloseOnDrop(&channel);
                    let mut tally = SideTally::default();
                    let status = transport.get_file_to_handler(
                        source_session,
                        object_id,
                        &mut |chunk: &[u8]| {
                            let before = tally.moved;
                            let drained = channel.publish(chunk);
                            tally.moved += drained as u64;
                            if drained < chunk.len() {
                                tally.cut_short = Some(before + chunk.len() as u64);
                                false
                            } else {
                                true
                            }
                        },
                        None,
                    );
                    tally.outcome("get_file_to_handler", status)
                })
                .map_err(|e| MtpError::ResourceExhaustion(format!("spawn fetch worker: {e}")))?;

            let send = {
                let _close = CloseOnDrop(&channel);
                let mut tally = SideTally::default();
                let mut monotonic = progress.map(MonotonicProgress::new);
                let status = transport.send_file_from_handler(
                    dest_session,
                    &mut |buf: &mut [u8]| {
                        let before = tally.moved;
                        let got = channel.acquire(buf);
                        tally.moved += got.len as u64;
                        if got.is_complete() {
                            Some(got.len)
                        } else {
                            tally.cut_short = Some(before + buf.len() as u64);
                            None
                        }
                    },
                    metadata,
                    Some(&mut |sent: u64, total: u64| {
                        if let Some(p) = monotonic.as_mut() {
                            p.report(sent, total);
                        }
                    }),
                );
                let outcome = tally.outcome("send_file_from_handler", status);
                if outcome.is_ok() {
                    if let Some(p) = monotonic.as_mut() {
                        p.finish(metadata.size);
                    }
                }
                outcome
            };

            let fetch = fetch_worker.join().unwrap_or_else(|payload| {
                Err(MtpError::WorkerPanic {
                    kind: OperationKind::CopyBetweenDevices,
                    message: panic_message(payload.as_ref()),
                })
            });

            Ok::<_, MtpError>((fetch, send))
        })?;

        if let Err(e) = &fetch {
            tracing::warn!("Fetch side of object {} failed: {}", object_id, e);
        }
        if let Err(e) = &send {
            tracing::warn!("Send side of object {} failed: {}", object_id, e);
        }

        let (_, bytes) = MtpError::aggregate(fetch, send)?;

        Ok(TransferSummary {
            object_id: metadata.id,
            bytes,
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::DEFAULT_STORAGE_ID;
    use crate::device::{DeviceImage, FaultPlan, MemoryTransport, RawDevice};

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn two_devices(data: Vec<u8>) -> (MemoryTransport, RawDevice, RawDevice) {
        let transport = MemoryTransport::new().with_chunk_sizes(1000, 700);
        let src = transport.add_device(DeviceImage::new(1, 1, "Source").with_file(10, 0, "big.bin", data));
        let dst = transport.add_device(DeviceImage::new(1, 2, "Dest"));
        (transport, src, dst)
    }

    #[test]
    fn test_copy_between_devices() {
        let data = payload(10_500);
        let (transport, src, dst) = two_devices(data.clone());
        let source = DeviceHandle::open(&transport, &src, true).unwrap();
        let dest = DeviceHandle::open(&transport, &dst, true).unwrap();

        let mut meta = FileRecord::for_upload("big.bin", data.len() as u64, 0, DEFAULT_STORAGE_ID);
        let mut seen = Vec::new();
        let mut record = |sent: u64, total: u64| seen.push((sent, total));

        let summary = DeviceBridge::new(&transport)
            .copy(&source, 10, &dest, &mut meta, Some(&mut record))
            .unwrap();

        assert_eq!(summary.bytes, data.len() as u64);
        assert_eq!(transport.object_data(&dst, summary.object_id).unwrap(), data);
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(seen.last().copied(), Some((data.len() as u64, data.len() as u64)));
    }

    #[test]
    fn test_send_failure_unblocks_fetch() {
        let (transport, src, dst) = two_devices(payload(50_000));
        transport.set_faults(&dst, FaultPlan {
            fail_send_after: Some(2_000),
            ..Default::default()
        });
        let source = DeviceHandle::open(&transport, &src, true).unwrap();
        let dest = DeviceHandle::open(&transport, &dst, true).unwrap();

        let mut meta = FileRecord::for_upload("big.bin", 50_000, 0, DEFAULT_STORAGE_ID);
        let err = DeviceBridge::new(&transport)
            .copy(&source, 10, &dest, &mut meta, None)
            .unwrap_err();

        match err {
            MtpError::TransferFailed { fetch, send } => {
                assert!(send.is_some());
                // Chunk three (2000..3000) was cut after 100 bytes
                match fetch.as_deref() {
                    Some(MtpError::ChannelCancelled { transferred, requested }) => {
                        assert_eq!((*transferred, *requested), (2_100, 3_000));
                    }
                    other => panic!("unexpected fetch outcome: {other:?}"),
                }
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fetch_failure_fails_send() {
        let (transport, src, dst) = two_devices(payload(50_000));
        transport.set_faults(&src, FaultPlan {
            fail_fetch_after: Some(3_000),
            ..Default::default()
        });
        let source = DeviceHandle::open(&transport, &src, true).unwrap();
        let dest = DeviceHandle::open(&transport, &dst, true).unwrap();

        let mut meta = FileRecord::for_upload("big.bin", 50_000, 0, DEFAULT_STORAGE_ID);
        let err = DeviceBridge::new(&transport)
            .copy(&source, 10, &dest, &mut meta, None)
            .unwrap_err();

        match err {
            MtpError::TransferFailed { fetch, send } => {
                assert!(fetch.is_some());
                // The fifth 700-byte request got 200 bytes before the close
                match send.as_deref() {
                    Some(MtpError::ChannelCancelled { transferred, requested }) => {
                        assert_eq!((*transferred, *requested), (3_000, 3_500));
                    }
                    other => panic!("unexpected send outcome: {other:?}"),
                }
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.objects(&dst).len(), 0);
    }

    #[test]
    fn test_fetch_panic_is_contained() {
        let (transport, src, dst) = two_devices(payload(5_000));
        transport.set_faults(&src, FaultPlan {
            panic_in: Some("get_file_to_handler".to_string()),
            ..Default::default()
        });
        let source = DeviceHandle::open(&transport, &src, true).unwrap();
        let dest = DeviceHandle::open(&transport, &dst, true).unwrap();

        let mut meta = FileRecord::for_upload("big.bin", 5_000, 0, DEFAULT_STORAGE_ID);
        let err = DeviceBridge::new(&transport)
            .copy(&source, 10, &dest, &mut meta, None)
            .unwrap_err();

        match err {
            MtpError::TransferFailed { fetch: Some(fetch), .. } => {
                assert!(matches!(*fetch, MtpError::WorkerPanic { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_session_rejected() {
        let (transport, src, _) = two_devices(payload(10));
        let source = DeviceHandle::open(&transport, &src, true).unwrap();

        let mut meta = FileRecord::for_upload("copy.bin", 10, 0, DEFAULT_STORAGE_ID);
        let err = DeviceBridge::new(&transport)
            .copy(&source, 10, &source.clone(), &mut meta, None)
            .unwrap_err();
        assert!(matches!(err, MtpError::SessionConflict(_)));
    }
}
