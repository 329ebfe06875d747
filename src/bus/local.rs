//! In-process software bus
//!
//! Pipes are bounded `VecDeque`s behind one `parking_lot::Mutex`. A message is
//! dropped for a pipe when the pipe is at depth or when that pipe already
//! holds `buf_limit` messages of the same id.

use super::{Bus, BusError, PipeId, Qos};
use crate::constants::{MAX_PIPES, MAX_PIPE_DEPTH};
use crate::message::{Message, MsgId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
struct Route {
    qos: Qos,
    buf_limit: u16,
}

struct Pipe {
    name: String,
    depth: usize,
    queue: VecDeque<Message>,
    routes: HashMap<MsgId, Route>,
    dropped: u64,
}

impl Pipe {
    fn queued_of(&self, msg_id: MsgId) -> usize {
        self.queue.iter().filter(|m| m.msg_id() == msg_id).count()
    }
}

#[derive(Default)]
struct Inner {
    pipes: Vec<Pipe>,
}

impl Inner {
    fn pipe_mut(&mut self, pipe: PipeId) -> Result<&mut Pipe, BusError> {
        self.pipes
            .get_mut(pipe.0)
            .ok_or(BusError::InvalidPipe { pipe })
    }
}

/// Software bus living inside the gateway process
#[derive(Default)]
pub struct LocalBus {
    inner: Mutex<Inner>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages currently waiting in `pipe`
    pub fn queued(&self, pipe: PipeId) -> usize {
        self.inner
            .lock()
            .pipes
            .get(pipe.0)
            .map(|p| p.queue.len())
            .unwrap_or(0)
    }

    /// Messages this pipe refused because it was full or over a route limit
    pub fn dropped(&self, pipe: PipeId) -> u64 {
        self.inner
            .lock()
            .pipes
            .get(pipe.0)
            .map(|p| p.dropped)
            .unwrap_or(0)
    }

    pub fn is_subscribed(&self, msg_id: MsgId, pipe: PipeId) -> bool {
        self.inner
            .lock()
            .pipes
            .get(pipe.0)
            .map(|p| p.routes.contains_key(&msg_id))
            .unwrap_or(false)
    }

    /// QoS and limit of the route for `msg_id` into `pipe`
    pub fn route(&self, msg_id: MsgId, pipe: PipeId) -> Option<(Qos, u16)> {
        self.inner
            .lock()
            .pipes
            .get(pipe.0)
            .and_then(|p| p.routes.get(&msg_id))
            .map(|r| (r.qos, r.buf_limit))
    }

    /// Message ids routed into `pipe`, sorted
    pub fn routes(&self, pipe: PipeId) -> Vec<MsgId> {
        let inner = self.inner.lock();
        let mut ids: Vec<MsgId> = inner
            .pipes
            .get(pipe.0)
            .map(|p| p.routes.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

impl Bus for LocalBus {
    fn create_pipe(&self, name: &str, depth: usize) -> Result<PipeId, BusError> {
        if depth == 0 || depth > MAX_PIPE_DEPTH {
            return Err(BusError::InvalidDepth { depth });
        }

        let mut inner = self.inner.lock();
        if inner.pipes.iter().any(|p| p.name == name) {
            return Err(BusError::DuplicatePipe {
                name: name.to_string(),
            });
        }
        if inner.pipes.len() >= MAX_PIPES {
            return Err(BusError::MaxPipesReached);
        }

        inner.pipes.push(Pipe {
            name: name.to_string(),
            depth,
            queue: VecDeque::with_capacity(depth),
            routes: HashMap::new(),
            dropped: 0,
        });
        let id = PipeId(inner.pipes.len() - 1);
        debug!("Created {} '{}' (depth {})", id, name, depth);
        Ok(id)
    }

    fn subscribe(
        &self,
        msg_id: MsgId,
        pipe: PipeId,
        qos: Qos,
        buf_limit: u16,
    ) -> Result<(), BusError> {
        if !msg_id.is_valid() {
            return Err(BusError::InvalidMsgId { msg_id });
        }
        if buf_limit == 0 {
            return Err(BusError::InvalidBufLimit { msg_id });
        }

        let mut inner = self.inner.lock();
        let p = inner.pipe_mut(pipe)?;
        if p.routes
            .insert(msg_id, Route { qos, buf_limit })
            .is_some()
        {
            debug!("Duplicate subscription to {} on '{}', refreshed", msg_id, p.name);
        }
        Ok(())
    }

    fn unsubscribe(&self, msg_id: MsgId, pipe: PipeId) -> Result<(), BusError> {
        if !msg_id.is_valid() {
            return Err(BusError::InvalidMsgId { msg_id });
        }

        let mut inner = self.inner.lock();
        let p = inner.pipe_mut(pipe)?;
        match p.routes.remove(&msg_id) {
            Some(_) => Ok(()),
            None => Err(BusError::NotSubscribed { msg_id, pipe }),
        }
    }

    fn poll(&self, pipe: PipeId) -> Option<Message> {
        self.inner
            .lock()
            .pipes
            .get_mut(pipe.0)
            .and_then(|p| p.queue.pop_front())
    }

    fn transmit(&self, msg: Message) -> Result<(), BusError> {
        let msg_id = msg.msg_id();
        if !msg_id.is_valid() {
            return Err(BusError::InvalidMsgId { msg_id });
        }

        let mut inner = self.inner.lock();
        let mut delivered = 0usize;

        for p in inner.pipes.iter_mut() {
            let Some(route) = p.routes.get(&msg_id).copied() else {
                continue;
            };

            if p.queue.len() >= p.depth || p.queued_of(msg_id) >= route.buf_limit as usize {
                p.dropped += 1;
                trace!("'{}' full, dropped {}", p.name, msg_id);
                continue;
            }

            p.queue.push_back(msg.clone());
            delivered += 1;
        }

        if delivered == 0 {
            trace!("No subscribers took {}", msg_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tlm(mid: u16) -> Message {
        Message::telemetry_at(MsgId::new(mid), 0, 0, &[0u8; 4])
    }

    #[test]
    fn test_create_pipe_rejects_duplicates_and_bad_depth() {
        let bus = LocalBus::new();
        assert!(bus.create_pipe("A", 4).is_ok());
        assert_eq!(
            bus.create_pipe("A", 4),
            Err(BusError::DuplicatePipe { name: "A".into() })
        );
        assert_eq!(
            bus.create_pipe("B", 0),
            Err(BusError::InvalidDepth { depth: 0 })
        );
    }

    #[test]
    fn test_transmit_routes_to_subscribers_only() {
        let bus = LocalBus::new();
        let a = bus.create_pipe("A", 8).unwrap();
        let b = bus.create_pipe("B", 8).unwrap();
        bus.subscribe(MsgId::new(0x0800), a, Qos::default(), 4).unwrap();

        bus.transmit(tlm(0x0800)).unwrap();

        assert_eq!(bus.queued(a), 1);
        assert_eq!(bus.queued(b), 0);
        assert_eq!(bus.poll(a).unwrap().msg_id(), MsgId::new(0x0800));
        assert!(bus.poll(a).is_none());
    }

    #[test]
    fn test_pipe_depth_drops_excess() {
        let bus = LocalBus::new();
        let p = bus.create_pipe("P", 3).unwrap();
        bus.subscribe(MsgId::new(0x0800), p, Qos::default(), 100).unwrap();

        for _ in 0..5 {
            bus.transmit(tlm(0x0800)).unwrap();
        }

        assert_eq!(bus.queued(p), 3);
        assert_eq!(bus.dropped(p), 2);
    }

    #[test]
    fn test_route_limit_drops_per_msg_id() {
        let bus = LocalBus::new();
        let p = bus.create_pipe("P", 16).unwrap();
        bus.subscribe(MsgId::new(0x0800), p, Qos::default(), 2).unwrap();
        bus.subscribe(MsgId::new(0x0801), p, Qos::default(), 2).unwrap();

        for _ in 0..3 {
            bus.transmit(tlm(0x0800)).unwrap();
        }
        bus.transmit(tlm(0x0801)).unwrap();

        assert_eq!(bus.queued(p), 3);
        assert_eq!(bus.dropped(p), 1);
    }

    #[test]
    fn test_resubscribe_is_idempotent() {
        let bus = LocalBus::new();
        let p = bus.create_pipe("P", 4).unwrap();
        bus.subscribe(MsgId::new(0x0800), p, Qos::default(), 1).unwrap();
        bus.subscribe(MsgId::new(0x0800), p, Qos::default(), 4).unwrap();
        assert_eq!(bus.routes(p), vec![MsgId::new(0x0800)]);
        assert_eq!(bus.route(MsgId::new(0x0800), p), Some((Qos::default(), 4)));
    }

    #[test]
    fn test_unsubscribe_unknown_route() {
        let bus = LocalBus::new();
        let p = bus.create_pipe("P", 4).unwrap();
        assert_eq!(
            bus.unsubscribe(MsgId::new(0x0800), p),
            Err(BusError::NotSubscribed {
                msg_id: MsgId::new(0x0800),
                pipe: p
            })
        );
    }

    #[test]
    fn test_subscribe_rejects_reserved_id() {
        let bus = LocalBus::new();
        let p = bus.create_pipe("P", 4).unwrap();
        assert_eq!(
            bus.subscribe(MsgId::RESERVED, p, Qos::default(), 4),
            Err(BusError::InvalidMsgId {
                msg_id: MsgId::RESERVED
            })
        );
    }

    #[test]
    fn test_invalid_pipe_handle() {
        let bus = LocalBus::new();
        let ghost = PipeId(7);
        assert_eq!(
            bus.subscribe(MsgId::new(0x0800), ghost, Qos::default(), 4),
            Err(BusError::InvalidPipe { pipe: ghost })
        );
        assert!(bus.poll(ghost).is_none());
    }
}
