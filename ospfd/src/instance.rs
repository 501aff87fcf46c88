//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{
    Receiver, Sender, UnboundedReceiver, UnboundedSender,
};
use tokio::sync::{mpsc, oneshot};

use crate::collections::{
    AreaId, Areas, Arena, InterfaceId, LsaEntryId, Lsdb, LsdbId, NeighborId,
};
use crate::config::InstanceCfg;
use crate::debug::{
    Debug, InstanceInactiveReason, InterfaceInactiveReason, LsaFlushReason,
};
use crate::error::Error;
use crate::events;
use crate::interface::{Interface, ism};
use crate::lsdb;
use crate::lsdb::{LsaEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, nsm};
use crate::output;
use crate::packet::Options;
use crate::packet::lsa::LsaBody;
use crate::route::RouteCalc;
use crate::spf::{self, SpfTriggerLsa};
use crate::tasks;
use crate::tasks::messages::input::{
    DbDescFreeMsg, DelayedAckMsg, IsmEventMsg, LsaFlushMsg, LsaOrigCheckMsg,
    LsaOrigDelayedMsg, LsaOrigEventMsg, LsaRefreshMsg, LsdbMaxAgeSweepMsg,
    NetRxPacketMsg, NsmEventMsg, RxmtIntervalMsg, SendLsUpdateMsg,
    SpfDelayEventMsg,
};
use crate::tasks::messages::ProtocolInputMsg;
use crate::tasks::{IntervalTask, Task};

// Maximum time the instance waits for its flushed self-originated LSAs to be
// acknowledged before shutting down.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

// Interval between checks of the retransmission lists while shutting down.
const CLOSE_DRAIN_INTERVAL: Duration = Duration::from_millis(250);

pub struct Instance {
    // Instance name.
    pub name: String,
    // Instance configuration data.
    pub config: InstanceCfg,
    // Instance state data.
    pub state: Option<InstanceState>,
    // Instance arenas.
    pub arenas: InstanceArenas,
    // Instance Tx channels.
    pub tx: InstanceChannelsTx,
    // Route computation hook.
    pub route_calc: Option<Arc<dyn RouteCalc>>,
    // Control channel used by the drain ticker.
    control_tx: UnboundedSender<ControlMsg>,
    // Shutdown drain state.
    closing: Option<ClosingState>,
}

#[derive(Debug)]
pub struct InstanceState {
    // Instance Router ID.
    pub router_id: Ipv4Addr,
    // LSDB of AS-scope (AS-external) LSAs, shared by all areas.
    pub lsdb: Lsdb,
    // SPF data.
    pub spf_delay_state: spf::fsm::State,
    pub spf_delay_timer: Option<tasks::TimeoutTask>,
    pub spf_schedule_time: Option<Instant>,
    pub spf_last_time: Option<Instant>,
    pub spf_run_count: u32,
    // List of LSAs that have changed since the last route computation.
    pub spf_trigger_lsas: Vec<SpfTriggerLsa>,
    // Statistics.
    pub orig_lsa_count: u32,
    pub rx_lsa_count: u32,
    pub discontinuity_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InstanceArenas {
    pub areas: Areas,
    pub interfaces: Arena<Interface>,
    pub neighbors: Arena<Neighbor>,
    pub lsa_entries: Arena<LsaEntry>,
}

#[derive(Clone, Debug)]
pub struct InstanceChannelsTx {
    pub protocol_input: ProtocolInputChannelsTx,
}

#[derive(Clone, Debug)]
pub struct ProtocolInputChannelsTx {
    // Interface FSM event.
    pub ism_event: UnboundedSender<IsmEventMsg>,
    // Neighbor FSM event.
    pub nsm_event: UnboundedSender<NsmEventMsg>,
    // Packet Rx event.
    pub net_packet_rx: Sender<NetRxPacketMsg>,
    // Free last sent/received Database Description packets.
    pub dbdesc_free: Sender<DbDescFreeMsg>,
    // Request to send LS Update.
    pub send_lsupd: UnboundedSender<SendLsUpdateMsg>,
    // Packet retransmission interval.
    pub rxmt_interval: Sender<RxmtIntervalMsg>,
    // Delayed Ack timeout.
    pub delayed_ack_timeout: UnboundedSender<DelayedAckMsg>,
    // LSA originate event.
    pub lsa_orig_event: UnboundedSender<LsaOrigEventMsg>,
    // LSA originate check.
    pub lsa_orig_check: UnboundedSender<LsaOrigCheckMsg>,
    // LSA delayed origination timer.
    pub lsa_orig_delayed_timer: Sender<LsaOrigDelayedMsg>,
    // LSA flush event.
    pub lsa_flush: UnboundedSender<LsaFlushMsg>,
    // LSA refresh event.
    pub lsa_refresh: UnboundedSender<LsaRefreshMsg>,
    // LSDB MaxAge sweep timer.
    pub lsdb_maxage_sweep_interval: Sender<LsdbMaxAgeSweepMsg>,
    // SPF run event.
    pub spf_delay_event: UnboundedSender<SpfDelayEventMsg>,
}

#[derive(Debug)]
pub struct ProtocolInputChannelsRx {
    pub ism_event: UnboundedReceiver<IsmEventMsg>,
    pub nsm_event: UnboundedReceiver<NsmEventMsg>,
    pub net_packet_rx: Receiver<NetRxPacketMsg>,
    pub dbdesc_free: Receiver<DbDescFreeMsg>,
    pub send_lsupd: UnboundedReceiver<SendLsUpdateMsg>,
    pub rxmt_interval: Receiver<RxmtIntervalMsg>,
    pub delayed_ack_timeout: UnboundedReceiver<DelayedAckMsg>,
    pub lsa_orig_event: UnboundedReceiver<LsaOrigEventMsg>,
    pub lsa_orig_check: UnboundedReceiver<LsaOrigCheckMsg>,
    pub lsa_orig_delayed_timer: Receiver<LsaOrigDelayedMsg>,
    pub lsa_flush: UnboundedReceiver<LsaFlushMsg>,
    pub lsa_refresh: UnboundedReceiver<LsaRefreshMsg>,
    pub lsdb_maxage_sweep_interval: Receiver<LsdbMaxAgeSweepMsg>,
    pub spf_delay_event: UnboundedReceiver<SpfDelayEventMsg>,
}

pub struct InstanceUpView<'a> {
    pub name: &'a str,
    pub config: &'a InstanceCfg,
    pub state: &'a mut InstanceState,
    pub tx: &'a InstanceChannelsTx,
    pub route_calc: &'a Option<Arc<dyn RouteCalc>>,
}

// Instance control surface messages.
enum ControlMsg {
    Start {
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    DrainTick,
}

struct ClosingState {
    replies: Vec<oneshot::Sender<()>>,
    deadline: Instant,
    _tick: IntervalTask,
}

// Handle to a running OSPF instance.
//
// The CLI and HTTP control surfaces are expected to merely invoke `start`,
// `close` and `restart` on this handle.
pub struct Router {
    control_tx: UnboundedSender<ControlMsg>,
    _task: Task<()>,
}

// ===== impl Instance =====

impl Instance {
    fn new(
        name: String,
        config: InstanceCfg,
        route_calc: Option<Arc<dyn RouteCalc>>,
        control_tx: UnboundedSender<ControlMsg>,
    ) -> (Instance, ProtocolInputChannelsRx) {
        Debug::InstanceCreate.log();

        let (protocol_input_tx, protocol_input_rx) = protocol_input_channels();

        // Create areas and interfaces from the configuration.
        let mut arenas = InstanceArenas::default();
        for area_cfg in &config.areas {
            let (_, area) = arenas.areas.insert(area_cfg.area_id);
            area.area_type = area_cfg.area_type;
            for iface_cfg in &area_cfg.interfaces {
                let (_, iface) = area
                    .interfaces
                    .insert(&mut arenas.interfaces, &iface_cfg.name);
                iface.config = iface_cfg.clone();
                iface.system.mtu = Some(iface_cfg.mtu);
                iface.system.primary_addr = Some(iface_cfg.addr);
                iface.system.ifindex =
                    nix::net::if_::if_nametoindex(iface_cfg.name.as_str())
                        .ok()
                        .map(|ifindex| ifindex as u32);
            }
        }

        let instance = Instance {
            name,
            config,
            state: None,
            arenas,
            tx: InstanceChannelsTx {
                protocol_input: protocol_input_tx,
            },
            route_calc,
            control_tx,
            closing: None,
        };

        (instance, protocol_input_rx)
    }

    fn start(&mut self) -> Result<(), Error> {
        if self.is_active() {
            return Ok(());
        }

        Debug::InstanceStart.log();

        // The Router ID is derived from the first interface's address unless
        // explicitly configured.
        let router_id = self
            .get_router_id()
            .ok_or(Error::InstanceStartError)?;

        // Store instance initial state.
        self.state = Some(InstanceState::new(router_id));

        // Iterate over all configured areas.
        let (instance, arenas) = self.as_up().unwrap();
        for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
            let area = &arenas.areas[area_idx];

            // Try to start interfaces.
            for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
                let area = &arenas.areas[area_idx];
                let iface = &mut arenas.interfaces[iface_idx];
                iface.update(
                    area,
                    &instance,
                    &mut arenas.neighbors,
                    &arenas.lsa_entries,
                );
            }

            // Originate the initial set of LSAs.
            let area = &arenas.areas[area_idx];
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::AreaStart { area_id: area.id },
            );
        }

        // Fail the startup when no interface could be brought up.
        if !arenas
            .areas
            .iter()
            .any(|area| area.is_active(&arenas.interfaces))
        {
            self.state = None;
            return Err(Error::InstanceStartError);
        }

        Ok(())
    }

    fn stop(&mut self, reason: InstanceInactiveReason) {
        if !self.is_active() {
            return;
        }

        Debug::InstanceStop(reason).log();

        // Flush all self-originated LSAs.
        let (mut instance, arenas) = self.as_up().unwrap();
        lsdb::flush_all_self_originated(&mut instance, arenas);

        for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
            // Stop interfaces.
            for iface_idx in
                arenas.areas[area_idx].interfaces.indexes().collect::<Vec<_>>()
            {
                let area = &arenas.areas[area_idx];
                let iface = &mut arenas.interfaces[iface_idx];
                if iface.is_down() || iface.config.passive {
                    continue;
                }

                // Send pending LS Updates.
                output::send_lsupd(
                    None,
                    iface,
                    area,
                    &instance,
                    &mut arenas.neighbors,
                );

                let reason = InterfaceInactiveReason::InstanceDown;
                iface.fsm(
                    area,
                    &instance,
                    &mut arenas.neighbors,
                    &arenas.lsa_entries,
                    ism::Event::InterfaceDown(reason),
                );
            }

            // Clear area's state.
            let area = &mut arenas.areas[area_idx];
            area.state.lsdb.clear(&mut arenas.lsa_entries);
            area.state = Default::default();
        }

        // Clear instance state.
        if let Some(state) = &mut self.state {
            state.lsdb.clear(&mut self.arenas.lsa_entries);
        }
        self.state = None;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.is_some()
    }

    fn get_router_id(&self) -> Option<Ipv4Addr> {
        self.config.router_id.or_else(|| {
            self.arenas
                .interfaces
                .iter()
                .filter_map(|(_, iface)| iface.system.primary_addr)
                .map(|addr| addr.ip())
                .next()
        })
    }

    pub(crate) fn as_up(
        &mut self,
    ) -> Option<(InstanceUpView<'_>, &mut InstanceArenas)> {
        if let Some(state) = &mut self.state {
            let instance = InstanceUpView {
                name: &self.name,
                config: &self.config,
                state,
                tx: &self.tx,
                route_calc: &self.route_calc,
            };
            Some((instance, &mut self.arenas))
        } else {
            None
        }
    }

    fn process_control_msg(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::Start { reply } => {
                let _ = reply.send(self.start());
            }
            ControlMsg::Close { reply } => {
                self.begin_close(reply);
            }
            ControlMsg::DrainTick => {
                self.drain_check();
            }
        }
    }

    // Begins a graceful shutdown: all self-originated LSAs are prematurely
    // aged and flooded, then the instance keeps servicing acknowledgements
    // until every retransmission list has drained (or the deadline passes).
    //
    // Closing an already-closed instance completes immediately.
    fn begin_close(&mut self, reply: oneshot::Sender<()>) {
        if !self.is_active() {
            let _ = reply.send(());
            return;
        }

        if let Some(closing) = &mut self.closing {
            closing.replies.push(reply);
            return;
        }

        // Flush all self-originated LSAs.
        let (mut instance, arenas) = self.as_up().unwrap();
        lsdb::flush_all_self_originated(&mut instance, arenas);

        // Wait for the flushed LSAs to be acknowledged.
        let control_tx = self.control_tx.clone();
        let tick = drain_tick_interval(control_tx);
        self.closing = Some(ClosingState {
            replies: vec![reply],
            deadline: Instant::now() + CLOSE_DRAIN_TIMEOUT,
            _tick: tick,
        });
        self.drain_check();
    }

    fn drain_check(&mut self) {
        let Some(closing) = &self.closing else {
            return;
        };

        // Check whether any neighbor still holds an unacknowledged LSA.
        let drained = !self
            .arenas
            .neighbors
            .iter()
            .any(|(_, nbr)| !nbr.lists.ls_rxmt.is_empty());

        if drained || Instant::now() >= closing.deadline {
            if !drained {
                tracing::warn!(
                    "timeout while waiting for flushed LSAs to be acknowledged"
                );
            }
            self.stop(InstanceInactiveReason::AdminDown);
            for reply in self.closing.take().unwrap().replies {
                let _ = reply.send(());
            }
        }
    }

    fn process_protocol_msg(&mut self, msg: ProtocolInputMsg) {
        // Ignore event if the instance isn't active.
        if let Some((mut instance, arenas)) = self.as_up()
            && let Err(error) =
                process_protocol_msg(&mut instance, arenas, msg)
        {
            error.log();
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        Debug::InstanceDelete.log();
    }
}

// ===== impl InstanceState =====

impl InstanceState {
    pub(crate) fn new(router_id: Ipv4Addr) -> InstanceState {
        InstanceState {
            router_id,
            lsdb: Default::default(),
            spf_delay_state: Default::default(),
            spf_delay_timer: None,
            spf_schedule_time: None,
            spf_last_time: None,
            spf_run_count: 0,
            spf_trigger_lsas: Default::default(),
            orig_lsa_count: 0,
            rx_lsa_count: 0,
            discontinuity_time: Utc::now(),
        }
    }
}

// ===== impl ProtocolInputChannelsTx =====

impl ProtocolInputChannelsTx {
    pub(crate) fn ism_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        event: ism::Event,
    ) {
        let _ = self.ism_event.send(IsmEventMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            event,
        });
    }

    pub(crate) fn nsm_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        event: nsm::Event,
    ) {
        let _ = self.nsm_event.send(NsmEventMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            nbr_key: nbr_id.into(),
            event,
        });
    }

    pub(crate) fn send_lsupd(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: Option<NeighborId>,
    ) {
        let _ = self.send_lsupd.send(SendLsUpdateMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            nbr_key: nbr_id.map(std::convert::Into::into),
        });
    }

    pub(crate) fn lsa_orig_event(&self, event: LsaOriginateEvent) {
        let _ = self.lsa_orig_event.send(LsaOrigEventMsg { event });
    }

    pub(crate) fn lsa_orig_check(
        &self,
        lsdb_id: LsdbId,
        options: Options,
        lsa_id: Ipv4Addr,
        lsa_body: LsaBody,
    ) {
        let _ = self.lsa_orig_check.send(LsaOrigCheckMsg {
            lsdb_key: lsdb_id.into(),
            options,
            lsa_id,
            lsa_body,
        });
    }

    pub(crate) fn lsa_flush(
        &self,
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
        reason: LsaFlushReason,
    ) {
        let _ = self.lsa_flush.send(LsaFlushMsg {
            lsdb_key: lsdb_id.into(),
            lse_key: lse_id.into(),
            reason,
        });
    }

    pub(crate) fn spf_delay_event(&self, event: spf::fsm::Event) {
        let _ = self.spf_delay_event.send(SpfDelayEventMsg { event });
    }
}

// ===== impl ProtocolInputChannelsRx =====

impl ProtocolInputChannelsRx {
    async fn recv(&mut self) -> Option<ProtocolInputMsg> {
        tokio::select! {
            biased;
            msg = self.ism_event.recv() => {
                msg.map(ProtocolInputMsg::IsmEvent)
            }
            msg = self.nsm_event.recv() => {
                msg.map(ProtocolInputMsg::NsmEvent)
            }
            msg = self.net_packet_rx.recv() => {
                msg.map(ProtocolInputMsg::NetRxPacket)
            }
            msg = self.dbdesc_free.recv() => {
                msg.map(ProtocolInputMsg::DbDescFree)
            }
            msg = self.send_lsupd.recv() => {
                msg.map(ProtocolInputMsg::SendLsUpdate)
            }
            msg = self.rxmt_interval.recv() => {
                msg.map(ProtocolInputMsg::RxmtInterval)
            }
            msg = self.delayed_ack_timeout.recv() => {
                msg.map(ProtocolInputMsg::DelayedAck)
            }
            msg = self.lsa_orig_event.recv() => {
                msg.map(ProtocolInputMsg::LsaOrigEvent)
            }
            msg = self.lsa_orig_check.recv() => {
                msg.map(ProtocolInputMsg::LsaOrigCheck)
            }
            msg = self.lsa_orig_delayed_timer.recv() => {
                msg.map(ProtocolInputMsg::LsaOrigDelayed)
            }
            msg = self.lsa_flush.recv() => {
                msg.map(ProtocolInputMsg::LsaFlush)
            }
            msg = self.lsa_refresh.recv() => {
                msg.map(ProtocolInputMsg::LsaRefresh)
            }
            msg = self.lsdb_maxage_sweep_interval.recv() => {
                msg.map(ProtocolInputMsg::LsdbMaxAgeSweep)
            }
            msg = self.spf_delay_event.recv() => {
                msg.map(ProtocolInputMsg::SpfDelayEvent)
            }
        }
    }
}

// ===== impl Router =====

impl Router {
    /// Creates and starts a new OSPF instance with the provided
    /// configuration.
    ///
    /// Unrecoverable initialization errors (e.g. no raw socket could be
    /// opened) surface here and the Router fails to start.
    pub async fn new(
        name: &str,
        config: InstanceCfg,
        route_calc: Option<Arc<dyn RouteCalc>>,
    ) -> Result<Router, Error> {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (instance, protocol_input_rx) = Instance::new(
            name.to_owned(),
            config,
            route_calc,
            control_tx.clone(),
        );

        let task = Task::spawn(run(instance, control_rx, protocol_input_rx));
        let router = Router {
            control_tx,
            _task: task,
        };
        router.start().await?;
        Ok(router)
    }

    /// Starts the instance if it isn't running.
    pub async fn start(&self) -> Result<(), Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.control_tx.send(ControlMsg::Start { reply: reply_tx });
        reply_rx.await.unwrap_or(Err(Error::InstanceStartError))
    }

    /// Gracefully shuts the instance down, flushing all self-originated LSAs
    /// and waiting for them to be acknowledged.
    ///
    /// Closing is idempotent and safe to call while packets are in flight.
    pub async fn close(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.control_tx.send(ControlMsg::Close { reply: reply_tx });
        let _ = reply_rx.await;
    }

    /// Restarts the instance with the same configuration.
    pub async fn restart(&self) -> Result<(), Error> {
        self.close().await;
        self.start().await
    }
}

// ===== helper functions =====

// Instance event loop.
async fn run(
    mut instance: Instance,
    mut control_rx: UnboundedReceiver<ControlMsg>,
    mut protocol_input_rx: ProtocolInputChannelsRx,
) {
    loop {
        tokio::select! {
            biased;
            msg = control_rx.recv() => match msg {
                Some(msg) => instance.process_control_msg(msg),
                None => {
                    // All control handles were dropped.
                    instance.stop(InstanceInactiveReason::AdminDown);
                    break;
                }
            },
            Some(msg) = protocol_input_rx.recv() => {
                instance.process_protocol_msg(msg);
            }
        }
    }
}

pub(crate) fn protocol_input_channels()
-> (ProtocolInputChannelsTx, ProtocolInputChannelsRx) {
    let (ism_eventp, ism_eventc) = mpsc::unbounded_channel();
    let (nsm_eventp, nsm_eventc) = mpsc::unbounded_channel();
    let (net_packet_rxp, net_packet_rxc) = mpsc::channel(4);
    let (dbdesc_freep, dbdesc_freec) = mpsc::channel(4);
    let (send_lsupdp, send_lsupdc) = mpsc::unbounded_channel();
    let (rxmt_intervalp, rxmt_intervalc) = mpsc::channel(4);
    let (delayed_ack_timeoutp, delayed_ack_timeoutc) =
        mpsc::unbounded_channel();
    let (lsa_orig_eventp, lsa_orig_eventc) = mpsc::unbounded_channel();
    let (lsa_orig_checkp, lsa_orig_checkc) = mpsc::unbounded_channel();
    let (lsa_orig_delayed_timerp, lsa_orig_delayed_timerc) = mpsc::channel(4);
    let (lsa_flushp, lsa_flushc) = mpsc::unbounded_channel();
    let (lsa_refreshp, lsa_refreshc) = mpsc::unbounded_channel();
    let (lsdb_maxage_sweep_intervalp, lsdb_maxage_sweep_intervalc) =
        mpsc::channel(4);
    let (spf_delay_eventp, spf_delay_eventc) = mpsc::unbounded_channel();

    let tx = ProtocolInputChannelsTx {
        ism_event: ism_eventp,
        nsm_event: nsm_eventp,
        net_packet_rx: net_packet_rxp,
        dbdesc_free: dbdesc_freep,
        send_lsupd: send_lsupdp,
        rxmt_interval: rxmt_intervalp,
        delayed_ack_timeout: delayed_ack_timeoutp,
        lsa_orig_event: lsa_orig_eventp,
        lsa_orig_check: lsa_orig_checkp,
        lsa_orig_delayed_timer: lsa_orig_delayed_timerp,
        lsa_flush: lsa_flushp,
        lsa_refresh: lsa_refreshp,
        lsdb_maxage_sweep_interval: lsdb_maxage_sweep_intervalp,
        spf_delay_event: spf_delay_eventp,
    };
    let rx = ProtocolInputChannelsRx {
        ism_event: ism_eventc,
        nsm_event: nsm_eventc,
        net_packet_rx: net_packet_rxc,
        dbdesc_free: dbdesc_freec,
        send_lsupd: send_lsupdc,
        rxmt_interval: rxmt_intervalc,
        delayed_ack_timeout: delayed_ack_timeoutc,
        lsa_orig_event: lsa_orig_eventc,
        lsa_orig_check: lsa_orig_checkc,
        lsa_orig_delayed_timer: lsa_orig_delayed_timerc,
        lsa_flush: lsa_flushc,
        lsa_refresh: lsa_refreshc,
        lsdb_maxage_sweep_interval: lsdb_maxage_sweep_intervalc,
        spf_delay_event: spf_delay_eventc,
    };

    (tx, rx)
}

fn drain_tick_interval(
    control_tx: UnboundedSender<ControlMsg>,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        IntervalTask::new(CLOSE_DRAIN_INTERVAL, false, move || {
            let control_tx = control_tx.clone();
            async move {
                let _ = control_tx.send(ControlMsg::DrainTick);
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = control_tx;
        IntervalTask {}
    }
}

fn process_protocol_msg(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    msg: ProtocolInputMsg,
) -> Result<(), Error> {
    match msg {
        // Interface FSM event.
        ProtocolInputMsg::IsmEvent(msg) => events::process_ism_event(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.event,
        )?,
        // Neighbor FSM event.
        ProtocolInputMsg::NsmEvent(msg) => events::process_nsm_event(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
            msg.event,
        )?,
        // Received network packet.
        ProtocolInputMsg::NetRxPacket(msg) => events::process_packet(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.src,
            msg.dst,
            msg.packet,
        )?,
        // Free last sent/received Database Description packets.
        ProtocolInputMsg::DbDescFree(msg) => events::process_dbdesc_free(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
        )?,
        // Request to send LS Update.
        ProtocolInputMsg::SendLsUpdate(msg) => events::process_send_lsupd(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
        )?,
        // Packet retransmission.
        ProtocolInputMsg::RxmtInterval(msg) => events::process_packet_rxmt(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
            msg.packet_type,
        )?,
        // Delayed Ack timeout.
        ProtocolInputMsg::DelayedAck(msg) => {
            events::process_delayed_ack_timeout(
                instance,
                arenas,
                msg.area_key,
                msg.iface_key,
            )?
        }
        // LSA origination event.
        ProtocolInputMsg::LsaOrigEvent(msg) => {
            events::process_lsa_orig_event(instance, arenas, msg.event)?
        }
        // LSA origination check.
        ProtocolInputMsg::LsaOrigCheck(msg) => events::process_lsa_orig_check(
            instance,
            arenas,
            msg.lsdb_key,
            msg.options,
            msg.lsa_id,
            msg.lsa_body,
        )?,
        // LSA delayed origination timer.
        ProtocolInputMsg::LsaOrigDelayed(msg) => {
            events::process_lsa_orig_delayed_timer(
                instance,
                arenas,
                msg.lsdb_key,
                msg.lsa_key,
            )?
        }
        // LSA flush.
        ProtocolInputMsg::LsaFlush(msg) => events::process_lsa_flush(
            instance,
            arenas,
            msg.lsdb_key,
            msg.lse_key,
            msg.reason,
        )?,
        // LSA refresh event.
        ProtocolInputMsg::LsaRefresh(msg) => events::process_lsa_refresh(
            instance,
            arenas,
            msg.lsdb_key,
            msg.lse_key,
        )?,
        // LSA MaxAge sweep interval.
        ProtocolInputMsg::LsdbMaxAgeSweep(msg) => {
            events::process_lsdb_maxage_sweep_interval(
                instance,
                arenas,
                msg.lsdb_key,
            )?
        }
        // SPF run event.
        ProtocolInputMsg::SpfDelayEvent(msg) => {
            events::process_spf_delay_event(instance, arenas, msg.event)?
        }
    }

    Ok(())
}
