use std::cell::RefCell;
use std::rc::Rc;

use super::{ApiCall, Backend, ClearRequest, DrawPacket};
use crate::render::error::ApiError;

#[derive(Debug, Default)]
struct Recorded {
    calls: Vec<ApiCall>,
    draws: Vec<DrawPacket>,
    clears: Vec<ClearRequest>,
}

/// Shared view of everything a [`HeadlessBackend`] observed.
///
/// Cloning yields another view of the same log.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    inner: Rc<RefCell<Recorded>>,
}

impl CallLog {
    /// Every traced call, in submission order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.inner.borrow().calls.clone()
    }

    /// Traced call names, in submission order.
    pub fn names(&self) -> Vec<&'static str> {
        self.inner.borrow().calls.iter().map(ApiCall::name).collect()
    }

    /// Draw packets that reached the backend (i.e. passed validation).
    pub fn draws(&self) -> Vec<DrawPacket> {
        self.inner.borrow().draws.clone()
    }

    pub fn clears(&self) -> Vec<ClearRequest> {
        self.inner.borrow().clears.clone()
    }

    /// Number of traced calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        self.inner.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        let mut r = self.inner.borrow_mut();
        r.calls.clear();
        r.draws.clear();
        r.clears.clear();
    }
}

/// Backend with no GPU: records the call stream into a [`CallLog`].
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    log: CallLog,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl Backend for HeadlessBackend {
    fn trace(&self, call: &ApiCall) {
        log::trace!(target: "kiln::gpu", "{call:?}");
        self.log.inner.borrow_mut().calls.push(call.clone());
    }

    fn clear(&self, request: &ClearRequest) -> Result<(), ApiError> {
        self.log.inner.borrow_mut().clears.push(*request);
        Ok(())
    }

    fn draw(&self, packet: &DrawPacket) -> Result<(), ApiError> {
        self.log.inner.borrow_mut().draws.push(packet.clone());
        Ok(())
    }
}
