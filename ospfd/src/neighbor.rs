//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nsm::{Event, State};
use serde::{Deserialize, Serialize};

use crate::area::Area;
use crate::collections::{Arena, NeighborId};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::InstanceUpView;
use crate::interface::{Interface, ism};
use crate::lsdb::{LsaEntry, LsaOriginateEvent, lsa_type_is_valid};
use crate::output;
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{DbDesc, DbDescFlags, Options};
use crate::tasks;
use crate::tasks::messages::input::RxmtIntervalMsg;
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::tasks::{IntervalTask, TimeoutTask};

#[derive(Debug)]
pub struct Neighbor {
    pub id: NeighborId,
    pub router_id: Ipv4Addr,
    pub src: Ipv4Addr,
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    pub priority: u8,
    pub state: State,

    pub options: Option<Options>,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub last_rcvd_dbdesc: Option<LastDbDesc>,
    pub last_sent_dbdesc: Option<NetTxPacketMsg>,

    pub event_count: u32,
    pub discontinuity_time: DateTime<Utc>,

    pub lists: NeighborLsaLists,
    pub tasks: NeighborTasks,
}

// IPv4 address used to identify a neighbor on a multi-access network.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct NeighborNetId(Ipv4Addr);

#[derive(Debug)]
pub struct LastDbDesc {
    pub options: Options,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
}

#[derive(Debug, Default)]
pub struct NeighborLsaLists {
    // LSAs enqueued for transmission in LS Update packets.
    pub ls_update: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs waiting to be acknowledged.
    pub ls_rxmt: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSA headers enqueued for transmission in Database Description packets.
    pub db_summary: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs that need to be received from this neighbor.
    pub ls_request: BTreeMap<LsaKey, LsaHdr>,
    // LSAs that were requested but not received yet.
    pub ls_request_pending: BTreeMap<LsaKey, LsaHdr>,
}

#[derive(Debug, Default)]
pub struct NeighborTasks {
    pub inactivity_timer: Option<TimeoutTask>,
    pub dbdesc_free_timer: Option<TimeoutTask>,
    rxmt_dbdesc: Option<IntervalTask>,
    rxmt_lsreq: Option<IntervalTask>,
    rxmt_lsupd: Option<IntervalTask>,
}

#[derive(Clone, Copy, Debug)]
#[derive(Deserialize, Serialize)]
pub enum RxmtPacketType {
    DbDesc,
    LsRequest,
    LsUpdate,
}

// Neighbor state machine.
pub mod nsm {
    use serde::{Deserialize, Serialize};

    use crate::debug::SeqNoMismatchReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Attempt,
        Init,
        TwoWay,
        ExStart,
        Exchange,
        Loading,
        Full,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        HelloRcvd,
        Start,
        TwoWayRcvd,
        NegotiationDone,
        ExchangeDone,
        BadLsReq,
        LoadingDone,
        AdjOk,
        SeqNoMismatch(SeqNoMismatchReason),
        OneWayRcvd,
        Kill,
        InactivityTimer,
        LinkDown,
    }
}

// ===== impl Neighbor =====

impl Neighbor {
    pub(crate) fn new(
        id: NeighborId,
        router_id: Ipv4Addr,
        src: Ipv4Addr,
    ) -> Neighbor {
        Debug::NeighborCreate(router_id).log();

        // Initialize the DD Sequence Number.
        let dd_seq_no = {
            #[cfg(not(feature = "deterministic"))]
            {
                // Random value.
                use rand::RngCore;
                rand::rng().next_u32()
            }
            #[cfg(feature = "deterministic")]
            {
                // Fixed value for deterministic test results.
                router_id.into()
            }
        };

        Neighbor {
            id,
            router_id,
            src,
            dr: None,
            bdr: None,
            priority: 0,
            state: State::Down,
            options: None,
            dd_flags: DbDescFlags::empty(),
            dd_seq_no,
            last_rcvd_dbdesc: None,
            last_sent_dbdesc: None,
            event_count: 0,
            discontinuity_time: Utc::now(),
            lists: Default::default(),
            tasks: Default::default(),
        }
    }

    pub(crate) fn fsm(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_entries: &Arena<LsaEntry>,
        event: Event,
    ) {
        Debug::NsmEvent(self.router_id, &self.state, &event).log();

        let new_state = match (self.state, &event) {
            // NSM (state, event) -> (Action, new state)
            (State::Attempt | State::Down, Event::HelloRcvd) => {
                self.inactivity_timer_reset(iface, area, instance);
                Some(State::Init)
            }
            // NSM (state, event) -> (Action, new state)
            (
                State::Init
                | State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::HelloRcvd,
            ) => {
                self.inactivity_timer_reset(iface, area, instance);
                None
            }
            // NSM (state, event) -> (Action, new state)
            (State::Init, Event::TwoWayRcvd)
            | (State::TwoWay, Event::AdjOk) => {
                if iface.need_adjacency(self) {
                    self.dd_seq_no = self.dd_seq_no.wrapping_add(1);
                    self.dd_flags.insert(
                        DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
                    );
                    output::send_dbdesc(self, iface, area, instance);
                    Some(State::ExStart)
                } else {
                    Some(State::TwoWay)
                }
            }
            // NSM (state, event) -> (Action, new state)
            (State::ExStart, Event::NegotiationDone) => {
                // List the contents of the entire LSDB in the summary list.
                for lse in area
                    .state
                    .lsdb
                    .iter(lsa_entries)
                    .chain(instance.state.lsdb.iter(lsa_entries))
                    .map(|(_, lse)| lse)
                    // Filter out LSAs the area cannot carry.
                    .filter(|lse| {
                        lsa_type_is_valid(
                            Some(area.area_type),
                            lse.data.hdr.lsa_type,
                        )
                    })
                {
                    let lsa_key = lse.data.hdr.key();
                    if lse.data.hdr.is_maxage() {
                        self.lists.ls_rxmt.insert(lsa_key, lse.data.clone());
                        self.rxmt_lsupd_start_check(iface, area, instance);
                    } else {
                        self.lists.db_summary.insert(lsa_key, lse.data.clone());
                    }
                }

                self.dd_flags.remove(DbDescFlags::I);
                Some(State::Exchange)
            }
            // NSM (state, event) -> (Action, new state)
            (State::Exchange, Event::ExchangeDone) => {
                if self.lists.ls_request_pending.is_empty()
                    && self.lists.ls_request.is_empty()
                {
                    Some(State::Full)
                } else {
                    // Wait for outstanding LS Requests to be responded.
                    Some(State::Loading)
                }
            }
            // NSM (state, event) -> (Action, new state)
            (State::Loading, Event::LoadingDone) => {
                // No action required.
                Some(State::Full)
            }
            // NSM (state, event) -> (Action, new state)
            (
                State::ExStart | State::Exchange | State::Loading | State::Full,
                Event::AdjOk,
            ) => {
                if iface.need_adjacency(self) {
                    None
                } else {
                    self.reset_adjacency();
                    Some(State::TwoWay)
                }
            }
            // NSM (state, event) -> (Action, new state)
            (
                State::Exchange | State::Loading | State::Full,
                Event::SeqNoMismatch(_) | Event::BadLsReq,
            ) => {
                self.reset_adjacency();
                self.dd_seq_no = self.dd_seq_no.wrapping_add(1);
                self.dd_flags
                    .insert(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS);
                output::send_dbdesc(self, iface, area, instance);
                Some(State::ExStart)
            }
            // NSM (state, event) -> (Action, new state)
            (_, Event::Kill | Event::LinkDown | Event::InactivityTimer) => {
                self.reset_adjacency();
                self.tasks.inactivity_timer = None;
                Some(State::Down)
            }
            // NSM (state, event) -> (Action, new state)
            (
                State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::OneWayRcvd,
            ) => {
                self.reset_adjacency();
                Some(State::Init)
            }
            // NSM (state, event) -> (Action, new state)
            (
                State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::TwoWayRcvd,
            ) => {
                // No action required.
                None
            }
            // NSM (state, event) -> (Action, new state)
            (State::Init, Event::OneWayRcvd) => {
                // No action required.
                None
            }
            // Catch-all wildcard.
            _ => {
                Error::NsmUnexpectedEvent(self.router_id, self.state, event)
                    .log();
                return;
            }
        };

        // Check for FSM state change.
        if let Some(new_state) = new_state
            && new_state != self.state
        {
            self.fsm_state_change(iface, area, instance, new_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        new_state: State,
    ) {
        // Check for bidirectional communication change.
        if new_state >= State::TwoWay && self.state < State::TwoWay
            || new_state < State::TwoWay && self.state >= State::TwoWay
        {
            // Trigger the NeighborChange event.
            instance.tx.protocol_input.ism_event(
                area.id,
                iface.id,
                ism::Event::NbrChange,
            );
        }

        // Check if the neighbor changed to/from the FULL state.
        if new_state == State::Full || self.state == State::Full {
            // (Re)originate LSAs that might have been affected.
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::NeighborToFromFull {
                    area_id: area.id,
                    iface_id: iface.id,
                },
            );
        }

        // Effectively transition to the new FSM state.
        Debug::NsmTransition(self.router_id, &self.state, &new_state).log();
        self.state = new_state;

        // Update statistics.
        self.event_count += 1;
        self.discontinuity_time = Utc::now();
    }

    pub(crate) fn loading_done_check(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        // Check if all pending LSA requests were received.
        if self.lists.ls_request_pending.is_empty() {
            // Stop the LS Request rxmt task.
            self.rxmt_lsreq_stop();

            // Check if there are new LSAs to request.
            if !self.lists.ls_request.is_empty() {
                output::send_lsreq(self, iface, area, instance);
            } else if self.state == nsm::State::Loading {
                // Database loading has completed.
                instance.tx.protocol_input.nsm_event(
                    area.id,
                    iface.id,
                    self.id,
                    nsm::Event::LoadingDone,
                );
            }
        }
    }

    fn reset_adjacency(&mut self) {
        self.options = None;
        self.last_rcvd_dbdesc = None;
        self.last_sent_dbdesc = None;
        self.lists = Default::default();
        self.tasks.dbdesc_free_timer = None;
        self.tasks.rxmt_dbdesc = None;
        self.tasks.rxmt_lsreq = None;
        self.tasks.rxmt_lsupd = None;
    }

    pub(crate) fn dbdesc_is_dup(&self, dbdesc: &DbDesc) -> bool {
        if let Some(last_rcvd_dbdesc) = &self.last_rcvd_dbdesc
            && last_rcvd_dbdesc.options == dbdesc.options
            && last_rcvd_dbdesc.dd_flags == dbdesc.dd_flags
            && last_rcvd_dbdesc.dd_seq_no == dbdesc.dd_seq_no
        {
            return true;
        }

        false
    }

    pub(crate) fn network_id(&self) -> NeighborNetId {
        // On broadcast networks neighbors are identified by the source
        // address of their packets.
        NeighborNetId(self.src)
    }

    pub(crate) fn inactivity_timer_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let task = tasks::nsm_inactivity_timer(self, iface, area, instance);
        self.tasks.inactivity_timer = Some(task);
    }

    fn inactivity_timer_reset(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if let Some(inactivity_timer) = self.tasks.inactivity_timer.as_mut() {
            inactivity_timer.reset(None);
        } else {
            self.inactivity_timer_start(iface, area, instance);
        }
    }

    pub(crate) fn rxmt_dbdesc_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let msg = RxmtIntervalMsg {
            area_key: area.id.into(),
            iface_key: iface.id.into(),
            nbr_key: self.id.into(),
            packet_type: RxmtPacketType::DbDesc,
        };

        let task = tasks::packet_rxmt_interval(iface, msg, instance);
        self.tasks.rxmt_dbdesc = Some(task);
    }

    pub(crate) fn rxmt_dbdesc_stop(&mut self) {
        self.tasks.rxmt_dbdesc = None;
    }

    pub(crate) fn rxmt_lsreq_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let msg = RxmtIntervalMsg {
            area_key: area.id.into(),
            iface_key: iface.id.into(),
            nbr_key: self.id.into(),
            packet_type: RxmtPacketType::LsRequest,
        };

        let task = tasks::packet_rxmt_interval(iface, msg, instance);
        self.tasks.rxmt_lsreq = Some(task);
    }

    fn rxmt_lsreq_stop(&mut self) {
        self.tasks.rxmt_lsreq = None;
    }

    pub(crate) fn rxmt_lsupd_start_check(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if !self.lists.ls_rxmt.is_empty() && self.tasks.rxmt_lsupd.is_none() {
            let msg = RxmtIntervalMsg {
                area_key: area.id.into(),
                iface_key: iface.id.into(),
                nbr_key: self.id.into(),
                packet_type: RxmtPacketType::LsUpdate,
            };
            let task = tasks::packet_rxmt_interval(iface, msg, instance);
            self.tasks.rxmt_lsupd = Some(task);
        }
    }

    pub(crate) fn rxmt_lsupd_stop_check(&mut self) {
        if self.lists.ls_rxmt.is_empty() && self.tasks.rxmt_lsupd.is_some() {
            self.tasks.rxmt_lsupd = None;
        }
    }
}

impl Drop for Neighbor {
    fn drop(&mut self) {
        Debug::NeighborDelete(self.router_id).log();
    }
}

// ===== impl NeighborNetId =====

impl NeighborNetId {
    pub(crate) fn get(&self) -> Ipv4Addr {
        self.0
    }
}

impl std::fmt::Display for NeighborNetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Ipv4Addr> for NeighborNetId {
    fn from(addr: Ipv4Addr) -> NeighborNetId {
        NeighborNetId(addr)
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceCfg;
    use crate::instance::{
        InstanceChannelsTx, InstanceState, InstanceUpView,
        protocol_input_channels,
    };

    struct TestSetup {
        nbr: Neighbor,
        iface: Interface,
        area: Area,
        lsa_entries: Arena<LsaEntry>,
        state: InstanceState,
        config: InstanceCfg,
        tx: InstanceChannelsTx,
    }

    fn setup() -> TestSetup {
        let (protocol_input, _protocol_input_rx) = protocol_input_channels();

        let mut iface = Interface::new(1, "eth0".to_owned());
        iface.config.addr = "10.0.0.1/24".parse().unwrap();
        iface.system.primary_addr = Some(iface.config.addr);
        iface.system.mtu = Some(1500);
        iface.state.src_addr = Some(iface.config.addr.ip());
        iface.state.ism_state = ism::State::DrOther;

        TestSetup {
            nbr: Neighbor::new(
                1,
                Ipv4Addr::new(2, 2, 2, 2),
                Ipv4Addr::new(10, 0, 0, 2),
            ),
            iface,
            area: Area::new(1, Ipv4Addr::UNSPECIFIED),
            lsa_entries: Default::default(),
            state: InstanceState::new(Ipv4Addr::new(1, 1, 1, 1)),
            config: Default::default(),
            tx: InstanceChannelsTx { protocol_input },
        }
    }

    impl TestSetup {
        fn fsm(&mut self, event: Event) {
            let instance = InstanceUpView {
                name: "test",
                config: &self.config,
                state: &mut self.state,
                tx: &self.tx,
                route_calc: &None,
            };
            self.nbr.fsm(
                &mut self.iface,
                &self.area,
                &instance,
                &self.lsa_entries,
                event,
            );
        }
    }

    #[test]
    fn nsm_hello_brings_neighbor_up() {
        let mut test = setup();
        assert_eq!(test.nbr.state, State::Down);

        test.fsm(Event::HelloRcvd);
        assert_eq!(test.nbr.state, State::Init);
    }

    #[test]
    fn nsm_no_adjacency_on_drother_pair() {
        // Neither this router nor the neighbor is DR/BDR: bidirectional
        // communication stops at 2-Way.
        let mut test = setup();
        test.fsm(Event::HelloRcvd);
        test.fsm(Event::TwoWayRcvd);
        assert_eq!(test.nbr.state, State::TwoWay);
    }

    #[test]
    fn nsm_adjacency_with_dr() {
        // The neighbor is the segment's DR: a full adjacency is required and
        // the negotiation starts with the I/M/MS bits set.
        let mut test = setup();
        test.iface.state.dr = Some(test.nbr.network_id());

        test.fsm(Event::HelloRcvd);
        test.fsm(Event::TwoWayRcvd);
        assert_eq!(test.nbr.state, State::ExStart);
        assert!(test.nbr.dd_flags.contains(
            DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS
        ));
    }

    #[test]
    fn nsm_seq_no_mismatch_restarts_exchange() {
        let mut test = setup();
        test.iface.state.dr = Some(test.nbr.network_id());
        test.fsm(Event::HelloRcvd);
        test.fsm(Event::TwoWayRcvd);

        // Force the adjacency forward and pretend some state accumulated.
        test.nbr.state = State::Exchange;
        test.nbr.options = Some(Options::E);
        test.nbr.lists.ls_request.insert(
            crate::packet::lsa::LsaKey::new(
                crate::packet::lsa::LsaTypeCode::Router.into(),
                Ipv4Addr::new(2, 2, 2, 2),
                Ipv4Addr::new(2, 2, 2, 2),
            ),
            crate::packet::lsa::LsaHdr {
                age: 1,
                options: Options::E,
                lsa_type: crate::packet::lsa::LsaTypeCode::Router.into(),
                lsa_id: Ipv4Addr::new(2, 2, 2, 2),
                adv_rtr: Ipv4Addr::new(2, 2, 2, 2),
                seq_no: 0x80000001,
                cksum: 0,
                length: 24,
            },
        );

        let reason = crate::debug::SeqNoMismatchReason::InconsistentSeqNo;
        test.fsm(Event::SeqNoMismatch(reason));
        assert_eq!(test.nbr.state, State::ExStart);

        // The adjacency was torn down: all LSA lists are cleared and the
        // exchange restarts from scratch.
        assert!(test.nbr.lists.ls_request.is_empty());
        assert!(test.nbr.lists.db_summary.is_empty());
        assert!(test.nbr.lists.ls_rxmt.is_empty());
        assert!(test.nbr.options.is_none());
    }

    #[test]
    fn nsm_one_way_falls_back_to_init() {
        let mut test = setup();
        test.iface.state.dr = Some(test.nbr.network_id());
        test.fsm(Event::HelloRcvd);
        test.fsm(Event::TwoWayRcvd);
        test.nbr.state = State::Full;

        test.fsm(Event::OneWayRcvd);
        assert_eq!(test.nbr.state, State::Init);
        assert!(test.nbr.lists.ls_rxmt.is_empty());
    }

    #[test]
    fn nsm_inactivity_kills_neighbor() {
        let mut test = setup();
        test.fsm(Event::HelloRcvd);
        test.fsm(Event::TwoWayRcvd);

        test.fsm(Event::InactivityTimer);
        assert_eq!(test.nbr.state, State::Down);
    }
}
