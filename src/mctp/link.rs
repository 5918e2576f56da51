//! Serial links and the synchronous link pump.
//!
//! A [`SerialLink`] pairs a byte transport with a frame decoder. A
//! [`LinkSet`] owns several links and moves packets between them and an
//! [`Endpoint`] each time it is pumped.

use log::warn;

use super::endpoint::Endpoint;
use super::packet::Packet;
use super::routing::LinkId;
use super::serial::{DecoderStats, FrameDecoder, encode_packet};
use super::transport::Transport;
use crate::error::{LinkError, Result};

const READ_BUF_SIZE: usize = 256;

pub struct SerialLink<T: Transport> {
    transport: T,
    decoder: FrameDecoder,
}

impl<T: Transport> SerialLink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(),
        }
    }

    /// Frame and write one packet.
    pub fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let frame = encode_packet(packet)?;
        let mut written = 0;
        while written < frame.len() {
            let n = self.transport.write(&frame[written..]).map_err(|e| {
                warn!("serial: write failed: {:?}", e);
                LinkError::Transport
            })?;
            if n == 0 {
                return Err(LinkError::Transport.into());
            }
            written += n;
        }
        self.transport.flush().map_err(|e| {
            warn!("serial: flush failed: {:?}", e);
            LinkError::Transport
        })?;
        Ok(())
    }

    /// Read everything available and hand decoded packets to `on_packet`.
    /// Returns the number of bytes consumed.
    pub fn poll(&mut self, mut on_packet: impl FnMut(Packet)) -> Result<usize> {
        let mut buf = [0u8; READ_BUF_SIZE];
        let mut total = 0;
        loop {
            let n = self.transport.read(&mut buf).map_err(|e| {
                warn!("serial: read failed: {:?}", e);
                LinkError::Transport
            })?;
            if n == 0 {
                return Ok(total);
            }
            self.decoder.feed(&buf[..n], &mut on_packet);
            total += n;
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Serial links registered with one endpoint.
pub struct LinkSet<T: Transport> {
    links: Vec<(LinkId, SerialLink<T>)>,
}

impl<T: Transport> Default for LinkSet<T> {
    fn default() -> Self {
        Self { links: Vec::new() }
    }
}

impl<T: Transport> LinkSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `transport` as a new link of `endpoint`.
    pub fn add(&mut self, endpoint: &mut Endpoint, transport: T) -> LinkId {
        let id = endpoint.add_link();
        self.links.push((id, SerialLink::new(transport)));
        id
    }

    pub fn get(&self, id: LinkId) -> Option<&SerialLink<T>> {
        self.links.iter().find(|(l, _)| *l == id).map(|(_, link)| link)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Read every link into the endpoint, then write out its outbox.
    /// Returns the number of packets moved in either direction.
    pub fn pump(&mut self, endpoint: &mut Endpoint, now_ms: u64) -> usize {
        let mut moved = 0;
        let mut rx = Vec::new();

        for (id, link) in &mut self.links {
            if let Err(e) = link.poll(|p| rx.push(p)) {
                warn!("serial[{}]: {}", id, e);
            }
            for packet in rx.drain(..) {
                match endpoint.handle_packet(*id, packet, now_ms) {
                    Ok(()) => moved += 1,
                    Err(e) => warn!("serial[{}]: {}", id, e),
                }
            }
        }

        for (id, packet) in endpoint.drain_outbox() {
            let Some((_, link)) = self.links.iter_mut().find(|(l, _)| *l == id) else {
                warn!("serial[{}]: no such link, dropping packet", id);
                continue;
            };
            match link.send_packet(&packet) {
                Ok(()) => moved += 1,
                Err(e) => warn!("serial[{}]: {}", id, e),
            }
        }
        moved
    }
}
