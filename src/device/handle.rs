//! Shared device session handle
//!
//! A `DeviceHandle` may be cloned freely; every clone refers to the same
//! transport session. Releasing is explicit and happens at most once across
//! all clones.

use super::transport::{SessionId, Transport};
use super::types::RawDevice;
use crate::error::{MtpError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Session {
    id: SessionId,
    raw: RawDevice,
    released: AtomicBool,
}

/// Reference-counted handle to an open device session
#[derive(Clone)]
pub struct DeviceHandle {
    session: Arc<Session>,
}

impl DeviceHandle {
    /// Open a session on `raw` through the transport
    pub fn open(transport: &dyn Transport, raw: &RawDevice, cached: bool) -> Result<Self> {
        let id = transport
            .open_raw_device(raw, cached)
            .ok_or(MtpError::OpenFailed {
                bus_location: raw.bus_location,
                devnum: raw.devnum,
            })?;

        tracing::info!("Opened {} as session {}", raw.label(), id);

        Ok(Self {
            session: Arc::new(Session {
                id,
                raw: raw.clone(),
                released: AtomicBool::new(false),
            }),
        })
    }

    /// Session id, or `AlreadyReleased` once the session is gone
    pub fn session(&self) -> Result<SessionId> {
        if self.is_released() {
            Err(MtpError::AlreadyReleased(self.session.id))
        } else {
            Ok(self.session.id)
        }
    }

    /// Session id regardless of release state
    pub fn id(&self) -> SessionId {
        self.session.id
    }

    /// Raw device this session was opened on
    pub fn raw(&self) -> &RawDevice {
        &self.session.raw
    }

    /// Check if the session was released through any clone
    pub fn is_released(&self) -> bool {
        self.session.released.load(Ordering::SeqCst)
    }

    /// Check if two handles refer to the same session
    pub fn same_session(&self, other: &DeviceHandle) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }

    /// Release the session. Only the first call across all clones reaches
    /// the transport; later calls return `AlreadyReleased`.
    pub fn release(&self, transport: &dyn Transport) -> Result<()> {
        if self.session.released.swap(true, Ordering::SeqCst) {
            return Err(MtpError::AlreadyReleased(self.session.id));
        }

        transport.release_device(self.session.id);
        tracing::info!("Released session {}", self.session.id);
        Ok(())
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("session", &self.session.id)
            .field("bus_location", &self.session.raw.bus_location)
            .field("devnum", &self.session.raw.devnum)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::{DeviceImage, MemoryTransport};

    fn single_device() -> (MemoryTransport, RawDevice) {
        let transport = MemoryTransport::new();
        let raw = transport.add_device(DeviceImage::new(1, 4, "Acme"));
        (transport, raw)
    }

    #[test]
    fn test_clones_share_session() {
        let (transport, raw) = single_device();
        let handle = DeviceHandle::open(&transport, &raw, true).unwrap();
        let copy = handle.clone();

        assert!(handle.same_session(&copy));
        assert_eq!(handle.session().unwrap(), copy.session().unwrap());
    }

    #[test]
    fn test_release_only_once() {
        let (transport, raw) = single_device();
        let handle = DeviceHandle::open(&transport, &raw, false).unwrap();
        let copy = handle.clone();

        assert_eq!(transport.open_sessions(), 1);
        handle.release(&transport).unwrap();
        assert_eq!(transport.open_sessions(), 0);

        assert!(matches!(copy.release(&transport), Err(MtpError::AlreadyReleased(_))));
        assert!(matches!(copy.session(), Err(MtpError::AlreadyReleased(_))));
    }

    #[test]
    fn test_open_failure() {
        let (transport, mut raw) = single_device();
        raw.devnum = 99;

        let err = DeviceHandle::open(&transport, &raw, true).unwrap_err();
        assert!(matches!(err, MtpError::OpenFailed { devnum: 99, .. }));
    }
}
