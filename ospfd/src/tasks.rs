//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use derive_new::new;
use tokio::sync::mpsc;
use tokio::sync::mpsc::{Sender, UnboundedSender};
use tokio::time::Instant;
use tokio::{task, time};
use tracing::{Instrument, debug_span, error};

use crate::collections::{LsaEntryId, LsdbId};
use crate::debug::LsaFlushReason;
use crate::instance::InstanceUpView;
use crate::interface::{Interface, ism};
use crate::lsdb;
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::{Lsa, LsaKey};

//
// OSPF tasks diagram:
//                                    +--------------+
//                     net_rx (Nx) -> |              | -> (Nx) net_tx
//                                    |              |
//             ism_wait_timer (Nx) -> |              | -> (Nx) hello_interval
//                                    |              |
//       nsm_inactivity_timer (Nx) -> |              |
//       packet_rxmt_interval (Nx) -> |              |
//          dbdesc_free_timer (Nx) -> |              |
//            ls_update_timer (Nx) -> |   instance   |
//          delayed_ack_timer (Nx) -> |              |
//                                    |              |
//           lsa_expiry_timer (Nx) -> |              |
//          lsa_refresh_timer (Nx) -> |              |
//     lsa_orig_delayed_timer (Nx) -> |              |
// lsdb_maxage_sweep_interval (Nx) -> |              |
//                                    |              |
//            spf_delay_timer (1x) -> |              |
//                                    +--------------+
//

// OSPF inter-task message types.
pub mod messages {
    use std::net::Ipv4Addr;

    use serde::{Deserialize, Serialize};
    use smallvec::SmallVec;

    use crate::collections::{AreaKey, InterfaceKey, LsaEntryKey, LsdbKey, NeighborKey};
    use crate::debug::LsaFlushReason;
    use crate::interface::ism;
    use crate::lsdb::LsaOriginateEvent;
    use crate::neighbor::{RxmtPacketType, nsm};
    use crate::packet::error::DecodeError;
    use crate::packet::lsa::{LsaBody, LsaKey};
    use crate::packet::{Options, Packet};
    use crate::spf;

    // Type aliases.
    pub type ProtocolInputMsg = input::ProtocolMsg;

    // Input messages (child task -> main task).
    pub mod input {
        use super::*;

        #[derive(Debug, Deserialize, Serialize)]
        pub enum ProtocolMsg {
            IsmEvent(IsmEventMsg),
            NsmEvent(NsmEventMsg),
            NetRxPacket(NetRxPacketMsg),
            DbDescFree(DbDescFreeMsg),
            SendLsUpdate(SendLsUpdateMsg),
            RxmtInterval(RxmtIntervalMsg),
            DelayedAck(DelayedAckMsg),
            LsaOrigEvent(LsaOrigEventMsg),
            LsaOrigCheck(LsaOrigCheckMsg),
            LsaOrigDelayed(LsaOrigDelayedMsg),
            LsaFlush(LsaFlushMsg),
            LsaRefresh(LsaRefreshMsg),
            LsdbMaxAgeSweep(LsdbMaxAgeSweepMsg),
            SpfDelayEvent(SpfDelayEventMsg),
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct IsmEventMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub event: ism::Event,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NsmEventMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
            pub event: nsm::Event,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NetRxPacketMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub src: Ipv4Addr,
            pub dst: Ipv4Addr,
            pub packet: Result<Packet, DecodeError>,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct DbDescFreeMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct SendLsUpdateMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: Option<NeighborKey>,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct RxmtIntervalMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
            pub packet_type: RxmtPacketType,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct DelayedAckMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LsaOrigEventMsg {
            pub event: LsaOriginateEvent,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LsaOrigCheckMsg {
            pub lsdb_key: LsdbKey,
            pub options: Options,
            pub lsa_id: Ipv4Addr,
            pub lsa_body: LsaBody,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaOrigDelayedMsg {
            pub lsdb_key: LsdbKey,
            pub lsa_key: LsaKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaFlushMsg {
            pub lsdb_key: LsdbKey,
            pub lse_key: LsaEntryKey,
            pub reason: LsaFlushReason,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaRefreshMsg {
            pub lsdb_key: LsdbKey,
            pub lse_key: LsaEntryKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsdbMaxAgeSweepMsg {
            pub lsdb_key: LsdbKey,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct SpfDelayEventMsg {
            pub event: spf::fsm::Event,
        }
    }

    // Output messages (main task -> child task).
    pub mod output {
        use super::*;

        #[derive(Clone, Debug, Serialize)]
        pub struct NetTxPacketMsg {
            pub packet: Packet,
            pub dst: SmallVec<[Ipv4Addr; 4]>,
        }
    }
}

/// A handle which can be used to manipulate the task created by the
/// [`Task::spawn`] function.
///
/// By default, dropping this handle cancels the task (unless [`Task::detach`]
/// is used).
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
    detached: bool,
}

/// A handle which can be used to manipulate the timeout task created by the
/// [`TimeoutTask::new`] function.
///
/// Dropping this handle cancels the timeout task.
#[derive(Debug)]
pub struct TimeoutTask {
    #[cfg(not(feature = "testing"))]
    inner: TimeoutTaskInner,
}

#[derive(Debug, new)]
struct TimeoutTaskInner {
    _task: Task<()>,
    control: UnboundedSender<TimerMessage>,
    next: Arc<Mutex<Instant>>,
}

/// A handle which can be used to manipulate the interval task created by the
/// [`IntervalTask::new`] function.
///
/// Dropping this handle cancels the interval task.
#[derive(Debug)]
pub struct IntervalTask {
    #[cfg(not(feature = "testing"))]
    inner: IntervalTaskInner,
}

#[derive(Debug, new)]
struct IntervalTaskInner {
    _task: Task<()>,
    control: UnboundedSender<TimerMessage>,
    next: Arc<Mutex<Instant>>,
}

#[derive(Debug)]
enum TimerMessage {
    Reset(Option<Duration>),
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
            detached: false,
        }
    }

    /// Spawns a supervised task that automatically restarts if it panics.
    /// The task will terminate if it completes successfully or returns an
    /// error.
    ///
    /// Long-running network receive loops are exposed to malformed input, and
    /// it is preferable to discard the offending packet and keep the task
    /// alive rather than letting a panic bring down the entire instance.
    pub fn spawn_supervised<F, Fut>(spawn_fn: F) -> Task<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let join_handle = tokio::spawn(
            async move {
                loop {
                    let worker_task = Task::spawn(spawn_fn());
                    match worker_task.await {
                        Ok(_) => {
                            // Finished without panic.
                            break;
                        }
                        Err(error) if error.is_panic() => {
                            error!("task panicked, restarting...");
                            continue;
                        }
                        Err(error) => {
                            error!(%error, "task failed");
                            break;
                        }
                    }
                }
            }
            .in_current_span(),
        );
        Task {
            join_handle,
            detached: false,
        }
    }

    /// Detach the task, meaning it will no longer be canceled if its handle
    /// is dropped.
    pub fn detach(&mut self) {
        self.detached = true;
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, task::JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.join_handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.join_handle.abort();
        }
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Spawns a new task that will call the provided async closure when the
    /// specified timeout expires.
    #[cfg(not(feature = "testing"))]
    pub fn new<F, Fut>(timeout: Duration, cb: F) -> TimeoutTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        let next = Instant::now() + timeout;
        let next = Arc::new(Mutex::new(next));
        let next_child = next.clone();

        let task = Task::spawn(
            async move {
                let timeout_fut = tokio::time::sleep(timeout);
                tokio::pin!(timeout_fut);

                loop {
                    tokio::select! {
                        // Timeout has expired.
                        _ = &mut timeout_fut => {
                            (cb)().await;
                            break;
                        }
                        message = control_rx.recv() => {
                            match message {
                                // Timeout has been refreshed/updated.
                                Some(TimerMessage::Reset(None)) => {
                                    let next = Instant::now() + timeout;
                                    timeout_fut.as_mut().reset(next);
                                    *next_child.lock().unwrap() = next;
                                },
                                Some(TimerMessage::Reset(Some(new_timeout))) => {
                                    let next = Instant::now() + new_timeout;
                                    timeout_fut.as_mut().reset(next);
                                    *next_child.lock().unwrap() = next;
                                },
                                // Timeout has been aborted.
                                None => break,
                            }
                        }
                    }
                }
            }
            .in_current_span(),
        );

        TimeoutTask {
            inner: TimeoutTaskInner::new(task, control_tx, next),
        }
    }

    /// Resets the timeout, regardless if it has already expired or not.
    ///
    /// If a new timeout value isn't specified, the last value will be reused.
    pub fn reset(&mut self, timeout: Option<Duration>) {
        #[cfg(not(feature = "testing"))]
        {
            if self.inner.control.send(TimerMessage::Reset(timeout)).is_err() {
                error!("failed to reset timeout");
            }
        }
    }

    /// Returns the remaining time before the timeout expires.
    pub fn remaining(&self) -> Duration {
        #[cfg(not(feature = "testing"))]
        {
            let next = self.inner.next.lock().unwrap();
            next.saturating_duration_since(Instant::now())
        }
        #[cfg(feature = "testing")]
        {
            Duration::ZERO
        }
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Spawns a new task that will call the provided async closure whenever
    /// the specified interval timer ticks.
    #[cfg(not(feature = "testing"))]
    pub fn new<F, Fut>(
        interval: Duration,
        tick_on_start: bool,
        mut cb: F,
    ) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        let next = Instant::now() + interval;
        let next = Arc::new(Mutex::new(next));
        let next_child = next.clone();

        let task = Task::spawn(
            async move {
                let mut interval_fut = if tick_on_start {
                    time::interval(interval)
                } else {
                    let start = Instant::now() + interval;
                    time::interval_at(start, interval)
                };

                loop {
                    tokio::select! {
                        // Interval timer has ticked.
                        _ = interval_fut.tick() => {
                            let next = Instant::now() + interval;
                            (cb)().await;
                            *next_child.lock().unwrap() = next;
                        }
                        message = control_rx.recv() => {
                            match message {
                                // Interval timer has been updated.
                                Some(TimerMessage::Reset(None)) => {
                                    let next = Instant::now() + interval;
                                    interval_fut = time::interval(interval);
                                    *next_child.lock().unwrap() = next;
                                },
                                Some(TimerMessage::Reset(Some(new_interval))) => {
                                    let next = Instant::now() + new_interval;
                                    interval_fut = time::interval(new_interval);
                                    *next_child.lock().unwrap() = next;
                                },
                                // Interval timer has been aborted.
                                None => break,
                            }
                        }
                    }
                }
            }
            .in_current_span(),
        );

        IntervalTask {
            inner: IntervalTaskInner::new(task, control_tx, next),
        }
    }

    /// Resets the interval.
    ///
    /// If a new interval value isn't specified, the last value will be
    /// reused.
    pub fn reset(&mut self, timeout: Option<Duration>) {
        #[cfg(not(feature = "testing"))]
        {
            if self.inner.control.send(TimerMessage::Reset(timeout)).is_err() {
                error!("failed to reset interval");
            }
        }
    }

    /// Returns the remaining time before the next interval tick.
    pub fn remaining(&self) -> Duration {
        #[cfg(not(feature = "testing"))]
        {
            let next = self.inner.next.lock().unwrap();
            next.saturating_duration_since(Instant::now())
        }
        #[cfg(feature = "testing")]
        {
            Duration::ZERO
        }
    }
}

// ===== OSPF tasks =====

// Send periodic OSPF Hello messages.
pub(crate) fn hello_interval(
    iface: &Interface,
    area: &crate::area::Area,
    instance: &InstanceUpView<'_>,
    interval: u16,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        use smallvec::smallvec;

        use crate::network::MulticastAddr;

        // Generate hello packet.
        let packet = iface.generate_hello(area, instance);
        let dst = smallvec![MulticastAddr::AllSpfRtrs.addr()];

        let tx_queue = iface.state.net.as_ref().unwrap().tx_queue.clone();
        IntervalTask::new(
            Duration::from_secs(interval.into()),
            true,
            move || {
                let packet = packet.clone();
                let dst = dst.clone();
                let tx_queue = tx_queue.clone();

                async move {
                    let msg = messages::output::NetTxPacketMsg { packet, dst };
                    tx_queue.push(msg);
                }
            },
        )
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}

// Interface wait timer task.
pub(crate) fn ism_wait_timer(
    iface: &Interface,
    area: &crate::area::Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let timeout = Duration::from_secs(iface.config.dead_interval.into());
        let area_id = area.id;
        let iface_id = iface.id;
        let ism_eventp = instance.tx.protocol_input.ism_event.clone();

        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::IsmEventMsg {
                area_key: area_id.into(),
                iface_key: iface_id.into(),
                event: ism::Event::WaitTimer,
            };
            let _ = ism_eventp.send(msg);
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Neighbor inactivity timer.
pub(crate) fn nsm_inactivity_timer(
    nbr: &Neighbor,
    iface: &Interface,
    area: &crate::area::Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let timeout = Duration::from_secs(iface.config.dead_interval.into());
        let nbr_id = nbr.id;
        let area_id = area.id;
        let iface_id = iface.id;
        let nsm_eventp = instance.tx.protocol_input.nsm_event.clone();

        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::NsmEventMsg {
                area_key: area_id.into(),
                iface_key: iface_id.into(),
                nbr_key: nbr_id.into(),
                event: nsm::Event::InactivityTimer,
            };
            let _ = nsm_eventp.send(msg);
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Send periodic packet retransmissions.
pub(crate) fn packet_rxmt_interval(
    iface: &Interface,
    msg: messages::input::RxmtIntervalMsg,
    instance: &InstanceUpView<'_>,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        let rxmt_intervalp = instance.tx.protocol_input.rxmt_interval.clone();

        IntervalTask::new(
            Duration::from_secs(iface.config.retransmit_interval.into()),
            false,
            move || {
                let rxmt_intervalp = rxmt_intervalp.clone();
                let msg = msg.clone();

                async move {
                    let _ = rxmt_intervalp.send(msg).await;
                }
            },
        )
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}

// Timer to free the neighbor's last sent/received Database Description
// packets.
pub(crate) fn dbdesc_free_timer(
    nbr: &Neighbor,
    iface: &Interface,
    area: &crate::area::Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let area_id = area.id;
        let iface_id = iface.id;
        let nbr_id = nbr.id;
        let dbdesc_freep = instance.tx.protocol_input.dbdesc_free.clone();

        TimeoutTask::new(
            Duration::from_secs(iface.config.dead_interval.into()),
            move || async move {
                let _ = dbdesc_freep
                    .send(messages::input::DbDescFreeMsg {
                        area_key: area_id.into(),
                        iface_key: iface_id.into(),
                        nbr_key: nbr_id.into(),
                    })
                    .await;
            },
        )
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Interface LS Update timer task.
pub(crate) fn ls_update_timer(
    iface: &Interface,
    area: &crate::area::Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let area_id = area.id;
    let iface_id = iface.id;
    let send_lsupdp = instance.tx.protocol_input.send_lsupd.clone();

    #[cfg(not(feature = "testing"))]
    {
        // Start timer.
        TimeoutTask::new(Duration::from_millis(100), move || async move {
            let _ = send_lsupdp.send(messages::input::SendLsUpdateMsg {
                area_key: area_id.into(),
                iface_key: iface_id.into(),
                nbr_key: None,
            });
        })
    }
    #[cfg(feature = "testing")]
    {
        // Send LS Update immediately.
        let _ = send_lsupdp.send(messages::input::SendLsUpdateMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            nbr_key: None,
        });

        TimeoutTask {}
    }
}

// Interface delayed Ack timer task.
pub(crate) fn delayed_ack_timer(
    iface: &Interface,
    area: &crate::area::Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let area_id = area.id;
    let iface_id = iface.id;
    let delayed_ack_timeoutp =
        instance.tx.protocol_input.delayed_ack_timeout.clone();

    #[cfg(not(feature = "testing"))]
    {
        // RFC 2328 - Section 13.5:
        // "The fixed interval between a router's delayed transmissions must
        // be short (less than RxmtInterval) or needless retransmissions will
        // ensue".
        let timeout = Duration::from_secs(1);
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::DelayedAckMsg {
                area_key: area_id.into(),
                iface_key: iface_id.into(),
            };
            let _ = delayed_ack_timeoutp.send(msg);
        })
    }
    #[cfg(feature = "testing")]
    {
        // Send LS Ack immediately.
        let msg = messages::input::DelayedAckMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
        };
        let _ = delayed_ack_timeoutp.send(msg);

        TimeoutTask {}
    }
}

// LSA expiry timer task.
pub(crate) fn lsa_expiry_timer(
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
    lsa: &Lsa,
    lsa_flushp: &UnboundedSender<messages::input::LsaFlushMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let timeout = lsdb::LSA_MAX_AGE - lsa.hdr.age;
        let timeout = Duration::from_secs(timeout.into());
        let lsa_flushp = lsa_flushp.clone();

        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::LsaFlushMsg {
                lsdb_key: lsdb_id.into(),
                lse_key: lse_id.into(),
                reason: LsaFlushReason::Expiry,
            };
            let _ = lsa_flushp.send(msg);
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// LSA refresh timer task.
pub(crate) fn lsa_refresh_timer(
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
    lsa_refreshp: &UnboundedSender<messages::input::LsaRefreshMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let timeout = lsdb::LSA_REFRESH_TIME;
        let timeout = Duration::from_secs(timeout.into());
        let lsa_refreshp = lsa_refreshp.clone();

        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::LsaRefreshMsg {
                lsdb_key: lsdb_id.into(),
                lse_key: lse_id.into(),
            };
            let _ = lsa_refreshp.send(msg);
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// LSA delayed origination timer task.
pub(crate) fn lsa_orig_delayed_timer(
    lsdb_id: LsdbId,
    lsa_key: LsaKey,
    lsa_base_time: Option<std::time::Instant>,
    lsa_orig_delayed_timerp: &Sender<messages::input::LsaOrigDelayedMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let lsa_orig_delayed_timerp = lsa_orig_delayed_timerp.clone();

        let lsa_age = lsa_base_time.unwrap().elapsed();
        let timeout = Duration::from_secs(lsdb::LSA_MIN_INTERVAL)
            .saturating_sub(lsa_age);

        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::LsaOrigDelayedMsg {
                lsdb_key: lsdb_id.into(),
                lsa_key,
            };
            let _ = lsa_orig_delayed_timerp.send(msg).await;
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// LSDB MaxAge sweeper interval task.
pub(crate) fn lsdb_maxage_sweep_interval(
    lsdb_id: LsdbId,
    lsdb_maxage_sweep_intervalp: &Sender<messages::input::LsdbMaxAgeSweepMsg>,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        let lsdb_maxage_sweep_intervalp = lsdb_maxage_sweep_intervalp.clone();

        let timeout = Duration::from_secs(5);
        IntervalTask::new(timeout, false, move || {
            let lsdb_maxage_sweep_intervalp =
                lsdb_maxage_sweep_intervalp.clone();
            async move {
                let msg = messages::input::LsdbMaxAgeSweepMsg {
                    lsdb_key: lsdb_id.into(),
                };
                let _ = lsdb_maxage_sweep_intervalp.send(msg).await;
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}

// SPF delay timer task.
pub(crate) fn spf_delay_timer(
    instance: &InstanceUpView<'_>,
    event: crate::spf::fsm::Event,
    timeout: u32,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let timeout = Duration::from_millis(timeout.into());
        let spf_delay_eventp =
            instance.tx.protocol_input.spf_delay_event.clone();

        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::SpfDelayEventMsg { event };
            let _ = spf_delay_eventp.send(msg);
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Network Rx task.
pub(crate) fn net_rx(
    #[cfg(not(feature = "testing"))] socket: Arc<
        tokio::io::unix::AsyncFd<socket2::Socket>,
    >,
    iface: &Interface,
    area: &crate::area::Area,
    net_packet_rxp: &Sender<messages::input::NetRxPacketMsg>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let span1 = debug_span!("network");
        let _span1_guard = span1.enter();
        let span2 = debug_span!("input");
        let _span2_guard = span2.enter();

        let area_id = area.id;
        let iface_id = iface.id;
        let net_packet_rxp = net_packet_rxp.clone();

        Task::spawn_supervised(move || {
            let socket = socket.clone();
            let net_packet_rxp = net_packet_rxp.clone();
            async move {
                let _ = crate::network::read_loop(
                    socket,
                    area_id,
                    iface_id,
                    net_packet_rxp,
                )
                .await;
            }
            .in_current_span()
        })
    }
    #[cfg(feature = "testing")]
    {
        Task::spawn(async move { std::future::pending().await })
    }
}

// Network Tx task.
pub(crate) fn net_tx(
    #[cfg(not(feature = "testing"))] socket: Arc<
        tokio::io::unix::AsyncFd<socket2::Socket>,
    >,
    iface: &Interface,
    tx_queue: Arc<crate::network::TxQueue>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let span1 = debug_span!("network");
        let _span1_guard = span1.enter();
        let span2 = debug_span!("output");
        let _span2_guard = span2.enter();

        let ifname = iface.name.clone();
        let ifindex = iface.system.ifindex.unwrap();
        let src = iface.state.src_addr.unwrap();

        Task::spawn(
            async move {
                crate::network::write_loop(socket, ifname, ifindex, src, tx_queue)
                    .await;
            }
            .in_current_span(),
        )
    }
    #[cfg(feature = "testing")]
    {
        let _ = tx_queue;
        Task::spawn(async move { std::future::pending().await })
    }
}
