//! Boundary exchange between neighboring partitions.
//!
//! Links are precomputed once. A link is a pair of simulated sites on
//! either side of a partition boundary, joined by lattice direction `q`.
//! The sender packs its own slot `q` of the boundary site; the receiver
//! unpacks into slot `opp(q)` of the site downstream. This is where the
//! AA neighbor table points for a halo neighbor in both parities, so the
//! exchange does not depend on parity.
//!
//! Both sides order their links by `(q, global index of the sending
//! site)`, which makes the packed buffers agree without any handshake.
//!
//! The phase channel is a conventional halo exchange of the full-grid φ
//! array, one ghost layer deep.

use tracing::debug;

use crate::comm::world::Endpoint;
use crate::domain::decomposition::{offset_index, Subdomain, NEIGHBOR_OFFSETS};
use crate::domain::labels::ComponentTable;
use crate::domain::layout::Layout;
use crate::error::CommError;
use crate::lattice::d3q19::{E, OPP, Q};
use crate::lattice::d3q7::Q7;

/// Exchange channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    /// 19-direction flow populations.
    Flow,
    /// 19-direction passive-scalar populations.
    Scalar,
    /// The two 7-direction component populations, sent together.
    Transport,
    /// Full-grid phase indicator halo.
    Phase,
}

impl Channel {
    fn code(self) -> u32 {
        match self {
            Channel::Flow => 1,
            Channel::Scalar => 2,
            Channel::Transport => 3,
            Channel::Phase => 4,
        }
    }

    fn tag(self, offset: [i32; 3]) -> u32 {
        (self.code() << 8) | offset_index(offset) as u32
    }
}

/// Token for an exchange in flight.
#[must_use = "a started exchange must be finished before the exterior update"]
#[derive(Debug)]
pub struct PendingExchange {
    channel: Channel,
}

impl PendingExchange {
    pub fn channel(&self) -> Channel {
        self.channel
    }
}

#[derive(Clone, Debug)]
struct LinkSet {
    offset: [i32; 3],
    rank: usize,
    send: Vec<usize>,
    recv: Vec<usize>,
    send7: Vec<usize>,
    recv7: Vec<usize>,
}

#[derive(Clone, Debug)]
struct HaloSet {
    offset: [i32; 3],
    rank: usize,
    send: Vec<usize>,
    recv: Vec<usize>,
}

#[inline]
fn negate(o: [i32; 3]) -> [i32; 3] {
    [-o[0], -o[1], -o[2]]
}

/// Per-partition exchange plan.
#[derive(Clone, Debug)]
pub struct Communicator {
    rank: usize,
    links: Vec<LinkSet>,
    halo: Vec<HaloSet>,
}

impl Communicator {
    /// Build the link plan of a partition.
    pub fn new(sub: &Subdomain, layout: &Layout, components: &ComponentTable) -> Self {
        let np = layout.np();
        let extent = sub.halo_extent();
        let labels = sub.labels();

        // (q, global key, slot) per offset
        let mut sends: Vec<Vec<(usize, usize, usize)>> = vec![Vec::new(); NEIGHBOR_OFFSETS.len()];
        let mut recvs: Vec<Vec<(usize, usize, usize)>> = vec![Vec::new(); NEIGHBOR_OFFSETS.len()];

        for n in layout.sites() {
            let (i, j, k) = extent.coords(layout.grid_of(n));
            let own_key = sub.global_index(i, j, k).get();
            for q in 1..Q {
                let e = E[q];
                let di = (i as i64 + e[0] as i64) as usize;
                let dj = (j as i64 + e[1] as i64) as usize;
                let dk = (k as i64 + e[2] as i64) as usize;
                if let Some(o) = sub.halo_region(di, dj, dk) {
                    if components.is_simulated(labels.get(di, dj, dk)) {
                        sends[offset_index(o)].push((q, own_key, q * np + n));
                    }
                }
                let ui = (i as i64 - e[0] as i64) as usize;
                let uj = (j as i64 - e[1] as i64) as usize;
                let uk = (k as i64 - e[2] as i64) as usize;
                if let Some(o) = sub.halo_region(ui, uj, uk) {
                    if components.is_simulated(labels.get(ui, uj, uk)) {
                        let key = sub.global_index(ui, uj, uk).get();
                        recvs[offset_index(o)].push((q, key, OPP[q] * np + n));
                    }
                }
            }
        }

        let mut links = Vec::new();
        for (idx, offset) in NEIGHBOR_OFFSETS.iter().enumerate() {
            let mut send = std::mem::take(&mut sends[idx]);
            let mut recv = std::mem::take(&mut recvs[idx]);
            if send.is_empty() && recv.is_empty() {
                continue;
            }
            send.sort_unstable();
            recv.sort_unstable();
            let slots7 = |list: &[(usize, usize, usize)]| -> Vec<usize> {
                list.iter().filter(|l| l.0 < Q7).map(|l| l.2).collect()
            };
            let link = LinkSet {
                offset: *offset,
                rank: sub.neighbor_rank(*offset),
                send7: slots7(&send),
                recv7: slots7(&recv),
                send: send.iter().map(|l| l.2).collect(),
                recv: recv.iter().map(|l| l.2).collect(),
            };
            debug!(
                rank = sub.rank(),
                neighbor = link.rank,
                offset = ?link.offset,
                send = link.send.len(),
                recv = link.recv.len(),
                "population links"
            );
            links.push(link);
        }

        let halo = NEIGHBOR_OFFSETS
            .iter()
            .map(|offset| HaloSet {
                offset: *offset,
                rank: sub.neighbor_rank(*offset),
                send: sub.boundary_layer(*offset).into_iter().map(|g| g.get()).collect(),
                recv: sub.halo_layer(*offset).into_iter().map(|g| g.get()).collect(),
            })
            .collect();

        Self {
            rank: sub.rank(),
            links,
            halo,
        }
    }

    /// Number of neighbors sharing at least one population link.
    pub fn neighbor_count(&self) -> usize {
        self.links.len()
    }

    /// Total links sent per exchange on a population channel.
    pub fn link_count(&self, channel: Channel) -> usize {
        match channel {
            Channel::Flow | Channel::Scalar => self.links.iter().map(|l| l.send.len()).sum(),
            Channel::Transport => self.links.iter().map(|l| l.send7.len()).sum(),
            Channel::Phase => self.halo.iter().map(|h| h.send.len()).sum(),
        }
    }

    /// Pack and send a 19-direction channel (`Flow` or `Scalar`).
    pub fn start(&self, ep: &Endpoint, channel: Channel, dist: &[f64]) -> Result<PendingExchange, CommError> {
        debug_assert!(matches!(channel, Channel::Flow | Channel::Scalar));
        for link in &self.links {
            if link.send.is_empty() {
                continue;
            }
            let buf: Vec<f64> = link.send.iter().map(|&s| dist[s]).collect();
            ep.send(link.rank, channel.tag(link.offset), buf)?;
        }
        Ok(PendingExchange { channel })
    }

    /// Wait for and unpack a 19-direction channel.
    pub fn finish(&self, ep: &mut Endpoint, pending: PendingExchange, dist: &mut [f64]) -> Result<(), CommError> {
        let channel = pending.channel;
        for link in &self.links {
            if link.recv.is_empty() {
                continue;
            }
            let tag = channel.tag(negate(link.offset));
            let buf = ep.recv_exact(link.rank, tag, link.recv.len())?;
            for (&slot, v) in link.recv.iter().zip(buf) {
                dist[slot] = v;
            }
        }
        Ok(())
    }

    /// Pack and send both component populations in one message per neighbor.
    pub fn start_transport(&self, ep: &Endpoint, aq: &[f64], bq: &[f64]) -> Result<PendingExchange, CommError> {
        let channel = Channel::Transport;
        for link in &self.links {
            if link.send7.is_empty() {
                continue;
            }
            let mut buf = Vec::with_capacity(2 * link.send7.len());
            buf.extend(link.send7.iter().map(|&s| aq[s]));
            buf.extend(link.send7.iter().map(|&s| bq[s]));
            ep.send(link.rank, channel.tag(link.offset), buf)?;
        }
        Ok(PendingExchange { channel })
    }

    /// Wait for and unpack both component populations.
    pub fn finish_transport(
        &self,
        ep: &mut Endpoint,
        pending: PendingExchange,
        aq: &mut [f64],
        bq: &mut [f64],
    ) -> Result<(), CommError> {
        debug_assert_eq!(pending.channel, Channel::Transport);
        for link in &self.links {
            let count = link.recv7.len();
            if count == 0 {
                continue;
            }
            let tag = pending.channel.tag(negate(link.offset));
            let buf = ep.recv_exact(link.rank, tag, 2 * count)?;
            for (idx, &slot) in link.recv7.iter().enumerate() {
                aq[slot] = buf[idx];
                bq[slot] = buf[count + idx];
            }
        }
        Ok(())
    }

    /// Send the owned boundary layers of a full-grid field.
    pub fn start_halo(&self, ep: &Endpoint, field: &[f64]) -> Result<PendingExchange, CommError> {
        let channel = Channel::Phase;
        for set in &self.halo {
            let buf: Vec<f64> = set.send.iter().map(|&g| field[g]).collect();
            ep.send(set.rank, channel.tag(set.offset), buf)?;
        }
        Ok(PendingExchange { channel })
    }

    /// Receive the ghost layer of a full-grid field.
    pub fn finish_halo(&self, ep: &mut Endpoint, pending: PendingExchange, field: &mut [f64]) -> Result<(), CommError> {
        debug_assert_eq!(pending.channel, Channel::Phase);
        for set in &self.halo {
            let tag = pending.channel.tag(negate(set.offset));
            let buf = ep.recv_exact(set.rank, tag, set.recv.len())?;
            for (&g, v) in set.recv.iter().zip(buf) {
                field[g] = v;
            }
        }
        Ok(())
    }

    /// Complete halo exchange of a full-grid field.
    pub fn exchange_halo(&self, ep: &mut Endpoint, field: &mut [f64]) -> Result<(), CommError> {
        let pending = self.start_halo(ep, field)?;
        self.finish_halo(ep, pending, field)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }
}
