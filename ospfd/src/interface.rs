//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use ism::{Event, State};

use crate::area::Area;
use crate::collections::{Arena, InterfaceId, NeighborIndex, Neighbors};
use crate::config::InterfaceCfg;
use crate::debug::{Debug, InterfaceInactiveReason};
use crate::error::{Error, IoError};
use crate::instance::InstanceUpView;
use crate::ip::Ipv4AddrExt;
use crate::lsdb::{LsaEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, NeighborNetId, nsm};
use crate::network::{MulticastAddr, TxQueue};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{Hello, Packet, PacketHdr, PacketType};
use crate::tasks;
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::tasks::{IntervalTask, Task, TimeoutTask};

const IPV4_HDR_SIZE: u16 = 20;

#[derive(Debug)]
pub struct Interface {
    pub id: InterfaceId,
    pub name: String,
    pub system: InterfaceSys,
    pub config: InterfaceCfg,
    pub state: InterfaceState,
}

#[derive(Debug)]
pub struct InterfaceSys {
    // Interface ifindex.
    pub ifindex: Option<u32>,
    // Interface MTU.
    pub mtu: Option<u16>,
    // Primary IPv4 address.
    pub primary_addr: Option<Ipv4Network>,
}

#[derive(Debug)]
pub struct InterfaceState {
    // ISM state.
    pub ism_state: State,
    // Raw socket and Tx/Rx tasks.
    pub net: Option<InterfaceNet>,
    // Source address used when sending packets.
    pub src_addr: Option<Ipv4Addr>,
    // Joined multicast groups.
    pub mcast_groups: HashSet<MulticastAddr>,
    // The network DR/BDR.
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    // List of neighbors attached to this interface.
    pub neighbors: Neighbors,
    // List of LSAs enqueued for transmission.
    pub ls_update_list: BTreeMap<LsaKey, Arc<Lsa>>,
    // List of pending delayed Acks.
    pub ls_ack_list: BTreeMap<LsaKey, LsaHdr>,
    // Self-originated Network-LSA for this interface's segment.
    pub network_lsa_self: Option<LsaKey>,
    // Statistics.
    pub event_count: u32,
    pub discontinuity_time: DateTime<Utc>,
    // Tasks.
    pub tasks: InterfaceTasks,
}

#[derive(Debug)]
pub struct InterfaceNet {
    // Raw socket.
    #[cfg(not(feature = "testing"))]
    pub socket: Arc<tokio::io::unix::AsyncFd<socket2::Socket>>,
    // Network Tx/Rx tasks.
    _net_tx_task: Task<()>,
    _net_rx_task: Task<()>,
    // Bounded network Tx queue.
    pub tx_queue: Arc<TxQueue>,
}

#[derive(Debug, Default)]
pub struct InterfaceTasks {
    // ISM Hello Tx interval task.
    pub hello_interval: Option<IntervalTask>,
    // ISM WaitTimer task.
    pub wait_timer: Option<TimeoutTask>,
    // LS Update timer task.
    pub ls_update_timer: Option<TimeoutTask>,
    // Delayed Ack task.
    pub ls_delayed_ack: Option<TimeoutTask>,
}

#[derive(Clone, Copy, Debug)]
struct DrCandidate {
    router_id: Ipv4Addr,
    net_id: NeighborNetId,
    dr: Option<NeighborNetId>,
    bdr: Option<NeighborNetId>,
    priority: u8,
}

// Interface state machine.
pub mod ism {
    use serde::{Deserialize, Serialize};

    use crate::debug::InterfaceInactiveReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Loopback,
        Waiting,
        PointToPoint,
        DrOther,
        Backup,
        Dr,
    }

    #[derive(Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        InterfaceUp,
        WaitTimer,
        BackupSeen,
        NbrChange,
        InterfaceDown(InterfaceInactiveReason),
    }
}

// ===== impl Interface =====

impl Interface {
    pub(crate) fn new(id: InterfaceId, name: String) -> Interface {
        Debug::InterfaceCreate(&name).log();

        Interface {
            id,
            name: name.clone(),
            system: InterfaceSys::default(),
            config: InterfaceCfg::new(name, "0.0.0.0/0".parse().unwrap(), 1500),
            state: InterfaceState::default(),
        }
    }

    // Checks if the interface needs to be started or stopped.
    pub(crate) fn update(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
    ) {
        // Check next ISM event to invoke, but only if necessary.
        let event = match self.is_ready() {
            Ok(_) => {
                if self.state.ism_state == State::Down {
                    Event::InterfaceUp
                } else {
                    return;
                }
            }
            Err(reason) if !self.is_down() => Event::InterfaceDown(reason),
            _ => return,
        };

        // Invoke ISM event.
        self.fsm(area, instance, neighbors, lsa_entries, event);
    }

    // Returns whether the interface is ready for OSPF operation.
    fn is_ready(&self) -> Result<(), InterfaceInactiveReason> {
        if !self.config.enabled {
            return Err(InterfaceInactiveReason::AdminDown);
        }

        if self.system.ifindex.is_none() {
            return Err(InterfaceInactiveReason::MissingIfindex);
        }

        if self.system.mtu.is_none() {
            return Err(InterfaceInactiveReason::MissingMtu);
        }

        if self.system.primary_addr.is_none() {
            return Err(InterfaceInactiveReason::MissingIpv4Address);
        }

        Ok(())
    }

    fn start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) -> State {
        Debug::InterfaceStart(&self.name).log();

        // Initialize source address.
        self.state.src_addr = Some(self.system.primary_addr.unwrap().ip());

        if !self.config.passive {
            // Start network Tx/Rx tasks.
            match InterfaceNet::new(self, area, instance) {
                Ok(net) => self.state.net = Some(net),
                Err(error) => {
                    let ifname = self.name.clone();
                    Error::InterfaceStartError(ifname, error).log();
                    return State::Down;
                }
            }

            // Start Hello Tx task.
            self.hello_interval_start(area, instance);
        }

        // Get new ISM state.
        let new_ism_state = if self.config.priority == 0 {
            State::DrOther
        } else {
            State::Waiting
        };

        if new_ism_state == State::Waiting {
            // Start wait timer.
            let task = tasks::ism_wait_timer(self, area, instance);
            self.state.tasks.wait_timer = Some(task);
        }

        new_ism_state
    }

    // Stop interface if it's active.
    fn stop(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
        reason: InterfaceInactiveReason,
    ) {
        if self.is_down() {
            return;
        }

        Debug::InterfaceStop(&self.name, reason).log();

        // Kill all neighbors.
        let event = match reason {
            InterfaceInactiveReason::OperationalDown
            | InterfaceInactiveReason::MissingIfindex
            | InterfaceInactiveReason::MissingMtu
            | InterfaceInactiveReason::MissingIpv4Address => {
                nsm::Event::LinkDown
            }
            _ => nsm::Event::Kill,
        };
        for nbr_idx in self.state.neighbors.indexes().collect::<Vec<_>>() {
            let nbr = &mut neighbors[nbr_idx];
            nbr.fsm(self, area, instance, lsa_entries, event);
            self.state.neighbors.delete(neighbors, nbr_idx);
        }

        // Leave multicast groups.
        if let Some(net) = &self.state.net {
            for group in self.state.mcast_groups.drain() {
                net.leave_multicast(self.system.ifindex.unwrap(), group);
            }
        }

        // Reset interface state.
        self.state.net = None;
        self.state.src_addr = None;
        self.state.mcast_groups = Default::default();
        self.state.dr = None;
        self.state.bdr = None;
        self.state.neighbors = Default::default();
        self.state.ls_update_list = Default::default();
        self.state.ls_ack_list = Default::default();
        self.state.tasks = Default::default();
    }

    // Restart the Hello Tx task.
    pub(crate) fn sync_hello_tx(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if !self.config.passive && self.state.ism_state >= ism::State::Waiting {
            self.hello_interval_start(area, instance);
        }
    }

    pub(crate) fn is_down(&self) -> bool {
        self.state.ism_state == State::Down
    }

    pub(crate) fn is_dr_or_backup(&self) -> bool {
        matches!(self.state.ism_state, State::Dr | State::Backup)
    }

    pub(crate) fn fsm(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
        event: Event,
    ) {
        Debug::IsmEvent(&self.name, &self.state.ism_state, &event).log();

        let new_ism_state = match (self.state.ism_state, &event) {
            (State::Down, Event::InterfaceUp) => {
                // Start interface.
                self.start(area, instance)
            }
            (State::Waiting, Event::NbrChange) => {
                // This is an unspecified event but it can happen during
                // normal operation, so ignore it gracefully instead of
                // logging an error.
                return;
            }
            (State::Waiting, Event::BackupSeen | Event::WaitTimer) => {
                self.state.tasks.wait_timer = None;

                // Run DR election.
                self.dr_election(area, instance, neighbors)
            }
            (State::DrOther | State::Backup | State::Dr, Event::NbrChange) => {
                // Run DR election.
                self.dr_election(area, instance, neighbors)
            }
            (_, Event::InterfaceDown(reason)) => {
                // Stop interface.
                self.stop(area, instance, neighbors, lsa_entries, *reason);
                State::Down
            }
            _ => {
                Error::IsmUnexpectedEvent(self.state.ism_state, event).log();
                return;
            }
        };

        // Check for FSM state change.
        if new_ism_state != self.state.ism_state {
            self.fsm_state_change(area, instance, new_ism_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        new_ism_state: State,
    ) {
        // (Re)originate LSAs that might have been affected.
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::InterfaceStateChange {
                area_id: area.id,
                iface_id: self.id,
            },
        );
        if self.state.ism_state == ism::State::Dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange {
                    area_id: area.id,
                    iface_id: self.id,
                },
            );
        }

        // Effectively transition to the new FSM state.
        Debug::IsmTransition(&self.name, &self.state.ism_state, &new_ism_state)
            .log();
        self.state.ism_state = new_ism_state;

        // Join or leave OSPF multicast groups as necessary.
        self.update_mcast_groups();

        // Update statistics.
        self.state.event_count += 1;
        self.state.discontinuity_time = Utc::now();
    }

    pub(crate) fn hello_interval_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let interval = self.config.hello_interval;
        let task = tasks::hello_interval(self, area, instance, interval);
        self.state.tasks.hello_interval = Some(task);
    }

    // Generates an OSPF Hello message.
    pub(crate) fn generate_hello(
        &self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) -> Packet {
        let hdr = PacketHdr {
            pkt_type: PacketType::Hello,
            router_id: instance.state.router_id,
            area_id: area.area_id,
        };

        Packet::Hello(Hello {
            hdr,
            network_mask: self.system.primary_addr.unwrap().mask(),
            hello_interval: self.config.hello_interval,
            options: area.options(),
            priority: self.config.priority,
            dead_interval: self.config.dead_interval as u32,
            dr: self.state.dr,
            bdr: self.state.bdr,
            neighbors: self.state.neighbors.router_ids().collect(),
        })
    }

    // Validates the destination of the received packet.
    pub(crate) fn validate_packet_dst(&self, dst: Ipv4Addr) -> Result<(), Error> {
        // Check if the destination matches the interface primary address.
        if dst == self.system.primary_addr.unwrap().ip() {
            return Ok(());
        }

        // Check if the destination matches AllSPFRouters.
        if dst == MulticastAddr::AllSpfRtrs.addr() {
            return Ok(());
        }

        // Packets whose IP destination is AllDRouters should only be
        // accepted if the state of the receiving interface is DR or Backup.
        if dst == MulticastAddr::AllDrRtrs.addr() && self.is_dr_or_backup() {
            return Ok(());
        }

        Err(Error::InvalidDstAddr(dst))
    }

    // Validates the source of the received packet.
    pub(crate) fn validate_packet_src(&self, src: Ipv4Addr) -> Result<(), Error> {
        if !src.is_usable() {
            return Err(Error::InvalidSrcAddr(src));
        }

        // The packet's IP source address is required to be on the same
        // network as the receiving interface.
        if !self.system.primary_addr.unwrap().contains(src) {
            return Err(Error::InvalidSrcAddr(src));
        }

        Ok(())
    }

    // Returns the maximum packet size that can be sent on this interface.
    pub(crate) fn max_packet_size(&self) -> u16 {
        self.system.mtu.unwrap() - IPV4_HDR_SIZE
    }

    // Finds the neighbor identified by its source address.
    pub(crate) fn get_neighbor<'a>(
        &mut self,
        src: &Ipv4Addr,
        router_id: Ipv4Addr,
        neighbors: &'a mut Arena<Neighbor>,
    ) -> Option<(NeighborIndex, &'a mut Neighbor)> {
        // On broadcast networks the sender is identified by the IP source
        // address found in the packet's IP header.
        let net_id = NeighborNetId::from(*src);
        if let Some((nbr_idx, nbr)) =
            self.state.neighbors.get_mut_by_net_id(neighbors, net_id)
        {
            // Update the neighbor's Router ID before returning it.
            self.state.neighbors.update_router_id(nbr_idx, nbr, router_id);
            Some((nbr_idx, nbr))
        } else {
            None
        }
    }

    fn update_mcast_groups(&mut self) {
        let Some(net) = &self.state.net else {
            return;
        };
        let ifindex = self.system.ifindex.unwrap();

        // AllSPFRouters.
        if self.state.ism_state >= State::Waiting
            && !self.state.mcast_groups.contains(&MulticastAddr::AllSpfRtrs)
        {
            net.join_multicast(ifindex, MulticastAddr::AllSpfRtrs);
            self.state.mcast_groups.insert(MulticastAddr::AllSpfRtrs);
        } else if self.state.ism_state < State::Waiting
            && self.state.mcast_groups.contains(&MulticastAddr::AllSpfRtrs)
        {
            net.leave_multicast(ifindex, MulticastAddr::AllSpfRtrs);
            self.state.mcast_groups.remove(&MulticastAddr::AllSpfRtrs);
        }

        // AllDRouters.
        if self.is_dr_or_backup()
            && !self.state.mcast_groups.contains(&MulticastAddr::AllDrRtrs)
        {
            net.join_multicast(ifindex, MulticastAddr::AllDrRtrs);
            self.state.mcast_groups.insert(MulticastAddr::AllDrRtrs);
        } else if !self.is_dr_or_backup()
            && self.state.mcast_groups.contains(&MulticastAddr::AllDrRtrs)
        {
            net.leave_multicast(ifindex, MulticastAddr::AllDrRtrs);
            self.state.mcast_groups.remove(&MulticastAddr::AllDrRtrs);
        }
    }

    fn dr_election(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> State {
        let router_id = instance.state.router_id;
        let net_id = NeighborNetId::from(self.state.src_addr.unwrap());

        // Step 1: note the current values for the network's Designated
        // Router and Backup Designated Router.
        let old_dr = self.state.dr;
        let old_bdr = self.state.bdr;

        // Step 2: calculate the new Backup Designated Router.
        let calc_bdr = |iface: &Interface| {
            iface
                .dr_eligible_routers(router_id, net_id, neighbors)
                .filter(|rtr| rtr.dr != Some(rtr.net_id))
                .filter(|rtr| rtr.bdr == Some(rtr.net_id))
                .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                .or_else(|| {
                    iface
                        .dr_eligible_routers(router_id, net_id, neighbors)
                        .filter(|rtr| rtr.dr != Some(rtr.net_id))
                        .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                })
                .map(|rtr| rtr.net_id)
        };
        let mut new_bdr = calc_bdr(self);

        // Step 3: calculate the new Designated Router.
        let calc_dr = |iface: &Interface, new_bdr: &mut Option<NeighborNetId>| {
            iface
                .dr_eligible_routers(router_id, net_id, neighbors)
                .filter(|rtr| rtr.dr == Some(rtr.net_id))
                .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                .map(|rtr| rtr.net_id)
                .or(*new_bdr)
        };
        let mut new_dr = calc_dr(self, &mut new_bdr);
        self.state.dr = new_dr;
        self.state.bdr = new_bdr;

        // Step 4: check if the router is the new DR/BDR or no longer the
        // DR/BDR. If so, repeat steps 2 and 3 to stabilize.
        if (new_dr == Some(net_id) || old_dr == Some(net_id)) && new_dr != old_dr
            || (new_bdr == Some(net_id) || old_bdr == Some(net_id))
                && new_bdr != old_bdr
        {
            new_bdr = calc_bdr(self);
            new_dr = calc_dr(self, &mut new_bdr);
            self.state.dr = new_dr;
            self.state.bdr = new_bdr;
        }

        // Step 5: set the interface state accordingly.
        Debug::IsmDrElection(&self.name, old_dr, new_dr, old_bdr, new_bdr)
            .log();
        let next_state = if new_dr == Some(net_id) {
            ism::State::Dr
        } else if new_bdr == Some(net_id) {
            ism::State::Backup
        } else {
            ism::State::DrOther
        };

        // Step 7: if the DR or BDR changes, invoke the AdjOk? event on all
        // neighbors whose state is at least 2-Way.
        if new_dr != old_dr || new_bdr != old_bdr {
            for nbr in self
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            {
                instance.tx.protocol_input.nsm_event(
                    area.id,
                    self.id,
                    nbr.id,
                    nsm::Event::AdjOk,
                );
            }

            // Synchronize interface's Hello Tx task (updated DR and/or BDR).
            self.sync_hello_tx(area, instance);
        }

        // If the DR changed, reoriginate LSAs that might have been affected.
        if new_dr != old_dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange {
                    area_id: area.id,
                    iface_id: self.id,
                },
            );
        }

        next_state
    }

    fn dr_eligible_routers<'a>(
        &'a self,
        router_id: Ipv4Addr,
        net_id: NeighborNetId,
        neighbors: &'a Arena<Neighbor>,
    ) -> impl Iterator<Item = DrCandidate> + 'a {
        let myself = (self.config.priority != 0).then_some(DrCandidate {
            router_id,
            net_id,
            dr: self.state.dr,
            bdr: self.state.bdr,
            priority: self.config.priority,
        });

        let nbrs = self
            .state
            .neighbors
            .iter(neighbors)
            .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            .filter(|nbr| nbr.priority != 0)
            .map(|nbr| DrCandidate {
                router_id: nbr.router_id,
                net_id: nbr.network_id(),
                dr: nbr.dr,
                bdr: nbr.bdr,
                priority: nbr.priority,
            });

        myself.into_iter().chain(nbrs)
    }

    // An adjacency should be established with the neighbor when this router
    // is itself the DR or BDR, or when the neighbor is.
    pub(crate) fn need_adjacency(&self, nbr: &Neighbor) -> bool {
        let nbr_net_id = nbr.network_id();
        self.state.ism_state == State::Dr
            || self.state.ism_state == State::Backup
            || self.state.dr == Some(nbr_net_id)
            || self.state.bdr == Some(nbr_net_id)
    }

    pub(crate) fn enqueue_ls_update(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_key: LsaKey,
        lsa: Arc<Lsa>,
    ) {
        self.state.ls_update_list.insert(lsa_key, lsa);

        // Start LS Update timeout if necessary.
        if self.state.tasks.ls_update_timer.is_none() {
            let task = tasks::ls_update_timer(self, area, instance);
            self.state.tasks.ls_update_timer = Some(task);
        }
    }

    pub(crate) fn enqueue_delayed_ack(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_hdr: &LsaHdr,
    ) {
        self.state.ls_ack_list.insert(lsa_hdr.key(), *lsa_hdr);

        // Start delayed LS Ack timeout if necessary.
        if self.state.tasks.ls_delayed_ack.is_none() {
            let task = tasks::delayed_ack_timer(self, area, instance);
            self.state.tasks.ls_delayed_ack = Some(task);
        }
    }

    pub(crate) fn send_packet(&self, msg: NetTxPacketMsg) {
        if let Some(net) = &self.state.net {
            net.tx_queue.push(msg);
        }
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        Debug::InterfaceDelete(&self.name).log();
    }
}

// ===== impl InterfaceSys =====

impl Default for InterfaceSys {
    fn default() -> InterfaceSys {
        InterfaceSys {
            ifindex: None,
            mtu: None,
            primary_addr: None,
        }
    }
}

// ===== impl InterfaceState =====

impl Default for InterfaceState {
    fn default() -> InterfaceState {
        InterfaceState {
            ism_state: Default::default(),
            net: None,
            src_addr: None,
            mcast_groups: Default::default(),
            dr: None,
            bdr: None,
            neighbors: Default::default(),
            ls_update_list: Default::default(),
            ls_ack_list: Default::default(),
            network_lsa_self: None,
            event_count: 0,
            discontinuity_time: Utc::now(),
            tasks: Default::default(),
        }
    }
}

// ===== impl InterfaceNet =====

impl InterfaceNet {
    #[cfg(not(feature = "testing"))]
    fn new(
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) -> Result<Self, IoError> {
        // Create raw socket.
        let socket = crate::network::socket(&iface.name)
            .map_err(IoError::SocketError)
            .and_then(|socket| {
                tokio::io::unix::AsyncFd::new(socket)
                    .map_err(IoError::SocketError)
            })
            .map(Arc::new)?;

        // Start network Tx/Rx tasks.
        let tx_queue = Arc::new(TxQueue::new(iface.name.clone()));
        let mut net_tx_task =
            tasks::net_tx(socket.clone(), iface, tx_queue.clone());
        let net_rx_task = tasks::net_rx(
            socket.clone(),
            iface,
            area,
            &instance.tx.protocol_input.net_packet_rx,
        );

        // The network Tx task needs to be detached to ensure flushed
        // self-originated LSAs will be sent once the instance terminates.
        net_tx_task.detach();

        Ok(InterfaceNet {
            socket,
            _net_tx_task: net_tx_task,
            _net_rx_task: net_rx_task,
            tx_queue,
        })
    }

    #[cfg(feature = "testing")]
    fn new(
        iface: &Interface,
        _area: &Area,
        _instance: &InstanceUpView<'_>,
    ) -> Result<Self, IoError> {
        let tx_queue = Arc::new(TxQueue::new(iface.name.clone()));
        Ok(InterfaceNet {
            _net_tx_task: Task::spawn(async move {
                std::future::pending().await
            }),
            _net_rx_task: Task::spawn(async move {
                std::future::pending().await
            }),
            tx_queue,
        })
    }

    pub(crate) fn join_multicast(&self, ifindex: u32, addr: MulticastAddr) {
        #[cfg(not(feature = "testing"))]
        if let Err(error) =
            crate::network::join_multicast(self.socket.get_ref(), addr, ifindex)
        {
            IoError::MulticastJoinError(addr, error).log();
        }
    }

    pub(crate) fn leave_multicast(&self, ifindex: u32, addr: MulticastAddr) {
        #[cfg(not(feature = "testing"))]
        if let Err(error) = crate::network::leave_multicast(
            self.socket.get_ref(),
            addr,
            ifindex,
        ) {
            IoError::MulticastLeaveError(addr, error).log();
        }
    }
}

impl Drop for InterfaceNet {
    fn drop(&mut self) {
        // Let the detached Tx task drain the pending packets and release the
        // socket.
        self.tx_queue.close();
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::config::InstanceCfg;
    use crate::instance::{
        InstanceChannelsTx, InstanceState, InstanceUpView,
        protocol_input_channels,
    };
    use crate::neighbor::Neighbor;

    struct TestSetup {
        iface: Interface,
        area: Area,
        neighbors: Arena<Neighbor>,
        state: InstanceState,
        config: InstanceCfg,
        tx: InstanceChannelsTx,
    }

    fn setup(router_id: Ipv4Addr, addr: &str, priority: u8) -> TestSetup {
        let (protocol_input, _protocol_input_rx) = protocol_input_channels();

        let mut iface = Interface::new(1, "eth0".to_owned());
        iface.config.addr = addr.parse().unwrap();
        iface.config.priority = priority;
        iface.system.primary_addr = Some(iface.config.addr);
        iface.system.mtu = Some(1500);
        iface.state.src_addr = Some(iface.config.addr.ip());
        iface.state.ism_state = State::Waiting;

        TestSetup {
            iface,
            area: Area::new(1, Ipv4Addr::UNSPECIFIED),
            neighbors: Default::default(),
            state: InstanceState::new(router_id),
            config: Default::default(),
            tx: InstanceChannelsTx { protocol_input },
        }
    }

    impl TestSetup {
        fn add_neighbor(
            &mut self,
            router_id: &str,
            src: &str,
            priority: u8,
            dr: Option<&str>,
            bdr: Option<&str>,
        ) {
            let (_, nbr) = self.iface.state.neighbors.insert(
                &mut self.neighbors,
                router_id.parse().unwrap(),
                src.parse().unwrap(),
            );
            nbr.state = nsm::State::TwoWay;
            nbr.priority = priority;
            nbr.dr = dr.map(|dr| dr.parse::<Ipv4Addr>().unwrap().into());
            nbr.bdr = bdr.map(|bdr| bdr.parse::<Ipv4Addr>().unwrap().into());
        }

        fn run_election(&mut self) -> State {
            let instance = InstanceUpView {
                name: "test",
                config: &self.config,
                state: &mut self.state,
                tx: &self.tx,
                route_calc: &None,
            };
            self.iface.dr_election(&self.area, &instance, &self.neighbors)
        }
    }

    #[test]
    fn dr_election_two_routers() {
        // Two routers with equal priority and no prior DR: the highest
        // Router ID is elected DR (here, via BDR promotion).
        let mut test = setup(Ipv4Addr::new(1, 1, 1, 1), "10.0.0.1/24", 1);
        test.add_neighbor("2.2.2.2", "10.0.0.2", 1, Some("10.0.0.2"), None);

        let state = test.run_election();
        assert_eq!(state, State::Backup);
        assert_eq!(
            test.iface.state.dr,
            Some(Ipv4Addr::new(10, 0, 0, 2).into())
        );
        assert_eq!(
            test.iface.state.bdr,
            Some(Ipv4Addr::new(10, 0, 0, 1).into())
        );
    }

    #[test]
    fn dr_election_priority_zero() {
        // A router with priority 0 is never eligible; it stays DROther with
        // no backup on a two-router segment.
        let mut test = setup(Ipv4Addr::new(1, 1, 1, 1), "10.0.0.1/24", 0);
        test.add_neighbor("2.2.2.2", "10.0.0.2", 1, Some("10.0.0.2"), None);

        let state = test.run_election();
        assert_eq!(state, State::DrOther);
        assert_eq!(
            test.iface.state.dr,
            Some(Ipv4Addr::new(10, 0, 0, 2).into())
        );
        assert_eq!(test.iface.state.bdr, None);
    }

    #[test]
    fn dr_election_priority_beats_router_id() {
        // Higher priority wins over higher Router ID: the neighbor 2.2.2.2
        // would win the ID tiebreak but loses on priority.
        let mut test = setup(Ipv4Addr::new(1, 1, 1, 1), "10.0.0.1/24", 10);
        test.add_neighbor("2.2.2.2", "10.0.0.2", 1, None, None);

        let state = test.run_election();
        assert_eq!(state, State::Dr);
        assert_eq!(
            test.iface.state.dr,
            Some(Ipv4Addr::new(10, 0, 0, 1).into())
        );
        assert_eq!(
            test.iface.state.bdr,
            Some(Ipv4Addr::new(10, 0, 0, 2).into())
        );
    }

    #[test]
    fn dr_election_failover() {
        // The DR (2.2.2.2) is gone; the former BDR (3.3.3.3) already
        // promoted itself and this router takes over as BDR.
        let mut test = setup(Ipv4Addr::new(1, 1, 1, 1), "10.0.0.1/24", 1);
        test.iface.state.dr = Some(Ipv4Addr::new(10, 0, 0, 3).into());
        test.iface.state.bdr = Some(Ipv4Addr::new(10, 0, 0, 3).into());
        test.add_neighbor("3.3.3.3", "10.0.0.3", 1, Some("10.0.0.3"), None);

        let state = test.run_election();
        assert_eq!(state, State::Backup);
        assert_eq!(
            test.iface.state.dr,
            Some(Ipv4Addr::new(10, 0, 0, 3).into())
        );
        assert_eq!(
            test.iface.state.bdr,
            Some(Ipv4Addr::new(10, 0, 0, 1).into())
        );
    }
}
