//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{btree_map, hash_map};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use bitflags::bitflags;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::area::{Area, AreaType};
use crate::collections::{
    AreaId, Arena, InterfaceId, LsaEntryId, LsaEntryIndex, LsdbId, LsdbIndex,
    lsdb_get, lsdb_index_mut,
};
use crate::debug::{Debug, LsaFlushReason};
use crate::error::Error;
use crate::flood::flood;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, ism};
use crate::neighbor::nsm;
use crate::packet::Options;
use crate::packet::lsa::{
    Lsa, LsaBody, LsaHdr, LsaKey, LsaNetwork, LsaRouter, LsaRouterFlags,
    LsaRouterLink, LsaRouterLinkType, LsaSummary, LsaType, LsaTypeCode,
};
use crate::spf::SpfTriggerLsa;
use crate::tasks;
use crate::tasks::TimeoutTask;
use crate::tasks::messages::input::LsaFlushMsg;

// Architectural constants (RFC 2328, Appendix B).
pub const LSA_REFRESH_TIME: u16 = 1800;
pub const LSA_MAX_AGE: u16 = 3600;
pub const LSA_MAX_AGE_DIFF: u16 = 900;
pub const LSA_INIT_SEQ_NO: u32 = 0x80000001;
pub const LSA_MAX_SEQ_NO: u32 = 0x7fffffff;
pub const LSA_RESERVED_SEQ_NO: u32 = 0x80000000;
pub const LSA_MIN_INTERVAL: u64 = 5;
pub const LSA_MIN_ARRIVAL: u64 = 1;

#[derive(Debug)]
pub struct LsaEntry {
    // LSA ID.
    pub id: LsaEntryId,
    // LSA data.
    pub data: Arc<Lsa>,
    // Expiry timer that triggers when the LSA age reaches MaxAge.
    pub expiry_timer: Option<TimeoutTask>,
    // Refresh timer that triggers after LSA_REFRESH_TIME seconds.
    pub refresh_timer: Option<TimeoutTask>,
    // LSA entry flags.
    pub flags: LsaEntryFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaEntryFlags: u8 {
        const RECEIVED = 0x01;
        const SELF_ORIGINATED = 0x02;
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub enum LsaOriginateEvent {
    AreaStart {
        area_id: AreaId,
    },
    InterfaceStateChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    InterfaceDrChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    NeighborToFromFull {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    SelfOriginatedLsaRcvd {
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
    },
}

#[derive(Debug)]
pub struct LsaDelayedOrig {
    pub data: Lsa,
    pub timeout: TimeoutTask,
}

// ===== impl LsaEntry =====

impl LsaEntry {
    pub(crate) fn new(
        lsdb_id: LsdbId,
        id: LsaEntryId,
        data: Arc<Lsa>,
        lsa_flushp: &UnboundedSender<LsaFlushMsg>,
    ) -> LsaEntry {
        let expiry_timer = (!data.hdr.is_maxage())
            .then_some(tasks::lsa_expiry_timer(lsdb_id, id, &data, lsa_flushp));

        LsaEntry {
            id,
            data,
            expiry_timer,
            refresh_timer: None,
            flags: Default::default(),
        }
    }
}

// ===== global functions =====

// Compares which LSA is more recent according to the rules specified in
// Section 13.1 of RFC 2328.
//
// Returns:
// - Ordering::Greater when `a` is more recent
// - Ordering::Less when `b` is more recent
// - Ordering::Equal when the two LSAs are considered to be identical
pub(crate) fn lsa_compare(a: &LsaHdr, b: &LsaHdr) -> Ordering {
    let a_seq_no = a.seq_no as i32;
    let b_seq_no = b.seq_no as i32;
    let cmp = a_seq_no.cmp(&b_seq_no);
    if cmp != Ordering::Equal {
        return cmp;
    }

    let cmp = a.cksum.cmp(&b.cksum);
    if cmp != Ordering::Equal {
        return cmp;
    }

    if a.is_maxage() && !b.is_maxage() {
        return Ordering::Greater;
    } else if !a.is_maxage() && b.is_maxage() {
        return Ordering::Less;
    }

    if a.age.abs_diff(b.age) > LSA_MAX_AGE_DIFF {
        return b.age.cmp(&a.age);
    }

    Ordering::Equal
}

// Compares two LSAs according to the rules specified in Section 13.2 of RFC
// 2328. Its purpose is to determine if the contents of the LSAs are
// identical: differing Options, MaxAge on exactly one side, differing length
// or differing body (excluding changes in LS Sequence Number and LS
// Checksum) all count as a content change.
pub(crate) fn lsa_same_contents(a: &Lsa, b: &Lsa) -> bool {
    if a.hdr.options != b.hdr.options {
        return false;
    }

    if a.hdr.is_maxage() ^ b.hdr.is_maxage() {
        return false;
    }

    if a.hdr.length != b.hdr.length {
        return false;
    }

    let hdr_length = LsaHdr::LENGTH as usize;
    a.raw[hdr_length..] == b.raw[hdr_length..]
}

// Checks if the given LSA was received via flooding less than MinLSArrival
// seconds ago.
pub(crate) fn lsa_min_arrival_check(lse: &LsaEntry) -> bool {
    if !lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    #[cfg(feature = "deterministic")]
    {
        false
    }
    #[cfg(not(feature = "deterministic"))]
    {
        match lse.data.base_time {
            Some(lsa_base_time) => {
                lsa_base_time.elapsed().as_secs() < LSA_MIN_ARRIVAL
            }
            None => false,
        }
    }
}

// Checks if the given LSA was originated less than MinLSInterval seconds ago.
fn lsa_min_orig_interval_check(lse: &LsaEntry) -> bool {
    if lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    #[cfg(feature = "deterministic")]
    {
        false
    }
    #[cfg(not(feature = "deterministic"))]
    {
        match lse.data.base_time {
            Some(lsa_base_time) => {
                lsa_base_time.elapsed().as_secs() < LSA_MIN_INTERVAL
            }
            None => false,
        }
    }
}

// Checks if the provided area can accept the given LSA type.
//
// AS-external LSAs and type-4 summary LSAs are rejected on stub areas (as
// per errata 3746 of RFC 2328).
pub(crate) fn lsa_type_is_valid(
    area_type: Option<AreaType>,
    lsa_type: LsaType,
) -> bool {
    // Reject LSAs of unknown type.
    if lsa_type.type_code().is_none() {
        return false;
    }

    if let Some(area_type) = area_type
        && area_type != AreaType::Normal
        && matches!(
            lsa_type.type_code(),
            Some(LsaTypeCode::SummaryRouter | LsaTypeCode::AsExternal)
        )
    {
        return false;
    }

    true
}

// Checks whether the LSA is self-originated.
pub(crate) fn lsa_is_self_originated(
    lsa: &Lsa,
    router_id: Ipv4Addr,
    interfaces: &Arena<Interface>,
) -> bool {
    // 1) The LSA's Advertising Router is equal to the router's own Router ID.
    if lsa.hdr.adv_rtr == router_id {
        return true;
    }

    // 2) The LSA is a network-LSA and its Link State ID is equal to one of
    // the router's own IP interface addresses.
    if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
        && interfaces
            .iter()
            .filter_map(|(_, iface)| iface.system.primary_addr)
            .any(|iface_primary_addr| lsa.hdr.lsa_id == iface_primary_addr.ip())
    {
        return true;
    }

    false
}

// Installs the provided LSA to the specified LSDB.
//
// Any existing entry with the same LSA identity is overwritten; this is how
// stale instances are discarded.
pub(crate) fn install(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: Arc<Lsa>,
) -> LsaEntryIndex {
    Debug::LsaInstall(&lsa.hdr).log();

    // Remove old instance (if any) from all neighbors' Link state
    // retransmission lists.
    rxmt_lists_remove(arenas, lsdb_idx, &lsa);

    // Lookup LSDB.
    let (lsdb_id, lsdb) =
        lsdb_index_mut(&mut instance.state.lsdb, &mut arenas.areas, lsdb_idx);

    // Remove old instance of the LSA.
    let old_lsa = match lsdb.get(&arenas.lsa_entries, &lsa.hdr.key()) {
        Some((old_lse_idx, old_lse)) => {
            let old_lsa = old_lse.data.clone();
            lsdb.delete(&mut arenas.lsa_entries, old_lse_idx);
            Some(old_lsa)
        }
        None => None,
    };

    // Add LSA entry to LSDB.
    let (lse_idx, lse) = lsdb.insert(
        &mut arenas.lsa_entries,
        lsdb_id,
        lsa.clone(),
        &instance.tx.protocol_input,
    );

    // Check if the LSA is self-originated and mark it as such.
    if lsa_is_self_originated(
        &lse.data,
        instance.state.router_id,
        &arenas.interfaces,
    ) {
        lse.flags.insert(LsaEntryFlags::SELF_ORIGINATED);
    }

    // RFC 2328 - Section 13.2:
    // "The contents of the new LSA should be compared to the old instance,
    // if present. If there is no difference, there is no need to recalculate
    // the routing table".
    //
    // Additionally, do not recalculate the routing table in the following
    // cases:
    // * The type of the new LSA is unknown
    // * The new LSA is a self-originated summary
    let mut content_change = true;
    if let Some(old_lsa) = &old_lsa
        && lsa_same_contents(old_lsa, &lsa)
    {
        content_change = false;
    }
    let lsa_type = lsa.hdr.lsa_type;
    let self_orig_summary = lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
        && matches!(
            lsa_type.type_code(),
            Some(LsaTypeCode::SummaryNetwork | LsaTypeCode::SummaryRouter)
        );
    let route_recalc =
        content_change && !lsa.body.is_unknown() && !self_orig_summary;

    // Keep track of self-originated Network-LSAs.
    lsdb_install_hook(instance, arenas, lsdb_idx, &lsa);

    // Schedule route recalculation if necessary.
    if route_recalc {
        // Update list of SPF-triggering LSAs.
        let trigger_lsa = SpfTriggerLsa::new(old_lsa, lsa);
        instance.state.spf_trigger_lsas.push(trigger_lsa);

        instance
            .state
            .spf_schedule_time
            .get_or_insert_with(Instant::now);
        instance
            .tx
            .protocol_input
            .spf_delay_event(crate::spf::fsm::Event::Igp);
    }

    lse_idx
}

// Originates the provided LSA.
pub(crate) fn originate(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: Lsa,
) {
    let (lsdb_id, lsdb) =
        lsdb_index_mut(&mut instance.state.lsdb, &mut arenas.areas, lsdb_idx);

    // When an attempt is made to increment the sequence number past the
    // maximum value of MaxSequenceNumber, the current instance of the LSA
    // must first be flushed from the routing domain. This is done by
    // prematurely aging the LSA and reflooding it. As soon as this flood
    // has been acknowledged by all adjacent neighbors, a new instance can
    // be originated with sequence number of InitialSequenceNumber.
    let lsa_key = lsa.hdr.key();
    if let Some((old_lse_idx, _)) = lsdb.get(&arenas.lsa_entries, &lsa_key)
        && lsa.hdr.seq_no == LSA_MAX_SEQ_NO.wrapping_add(1)
    {
        // Record LSA that will be originated later and then flush the
        // existing instance.
        match lsdb.seqno_wrapping.entry(lsa_key) {
            hash_map::Entry::Occupied(mut o) => {
                *o.get_mut() = lsa;
            }
            hash_map::Entry::Vacant(v) => {
                v.insert(lsa);
            }
        }
        let reason = LsaFlushReason::PrematureAging;
        flush(instance, arenas, lsdb_idx, old_lse_idx, reason);
        return;
    }

    Debug::LsaOriginate(&lsa.hdr).log();

    let lse_idx = install(instance, arenas, lsdb_idx, Arc::new(lsa));

    let lse = &mut arenas.lsa_entries[lse_idx];
    flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lse.data,
        None,
    );

    // Update statistics.
    instance.state.orig_lsa_count += 1;
    instance.state.discontinuity_time = Utc::now();

    // Schedule LSA refreshing.
    let refresh_timer = tasks::lsa_refresh_timer(
        lsdb_id,
        lse.id,
        &instance.tx.protocol_input.lsa_refresh,
    );
    lse.refresh_timer = Some(refresh_timer);
}

// Attempts to originate the provided LSA, but only if it passes a few checks.
pub(crate) fn originate_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    options: crate::packet::Options,
    lsa_id: Ipv4Addr,
    lsa_body: LsaBody,
) {
    let (lsdb_id, lsdb) =
        lsdb_index_mut(&mut instance.state.lsdb, &mut arenas.areas, lsdb_idx);
    let adv_rtr = instance.state.router_id;
    let lsa_key = LsaKey::new(lsa_body.lsa_type(), adv_rtr, lsa_id);

    // Get next sequence number.
    let seq_no = lsdb
        .get(&arenas.lsa_entries, &lsa_key)
        .map(|(_, old_lse)| old_lse.data.hdr.seq_no.wrapping_add(1))
        .unwrap_or(LSA_INIT_SEQ_NO);

    // Make new LSA.
    let lsa = Lsa::new(0, options, lsa_id, adv_rtr, seq_no, lsa_body);

    // Check if an instance of this LSA already exists in the LSDB.
    if let Some((_, old_lse)) = lsdb.get(&arenas.lsa_entries, &lsa_key) {
        // If an LSA with identical contents already exists in the LSDB, skip
        // originating a new one (as per section 12.4 of RFC 2328).
        //
        // However, if the database copy was received through flooding,
        // proceed to originate a new instance with an updated sequence
        // number.
        if lsa_same_contents(&old_lse.data, &lsa)
            && !old_lse.flags.contains(LsaEntryFlags::RECEIVED)
        {
            return;
        }

        // Perform the MinLSInterval check.
        if lsdb.delayed_orig.contains_key(&lsa_key)
            || lsa_min_orig_interval_check(old_lse)
        {
            Debug::LsaOriginateMinInterval(&lsa.hdr).log();

            match lsdb.delayed_orig.entry(lsa_key) {
                hash_map::Entry::Occupied(mut o) => {
                    // Update the LSA that will be originated, but keep the
                    // current timeout.
                    let ldo = o.get_mut();
                    ldo.data = lsa;
                }
                hash_map::Entry::Vacant(v) => {
                    // Start timer to postpone originating the LSA.
                    let timeout = tasks::lsa_orig_delayed_timer(
                        lsdb_id,
                        lsa_key,
                        old_lse.data.base_time,
                        &instance.tx.protocol_input.lsa_orig_delayed_timer,
                    );
                    v.insert(LsaDelayedOrig { data: lsa, timeout });
                }
            }
            return;
        }
    }

    // Effectively originate the LSA.
    originate(instance, arenas, lsdb_idx, lsa);
}

// Flushes LSA from the LSDB by prematurely aging it to MaxAge and reflooding.
pub(crate) fn flush(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lse_idx: LsaEntryIndex,
    reason: LsaFlushReason,
) {
    // Do not flush the same LSA more than once.
    let lse = &mut arenas.lsa_entries[lse_idx];
    if lse.data.hdr.is_maxage() {
        return;
    }

    if reason == LsaFlushReason::PrematureAging {
        assert!(lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED));
    }

    Debug::LsaFlush(&lse.data.hdr, reason).log();

    // Disarm timers.
    lse.expiry_timer = None;
    lse.refresh_timer = None;

    // Set the LSA age to MaxAge.
    let mut lsa = (*lse.data).clone();
    lsa.set_maxage();
    let lsa = Arc::new(lsa);

    // Install updated LSA to clear rxmt lists and rerun route calculations.
    let lse_idx = install(instance, arenas, lsdb_idx, lsa);

    // Reflood updated LSA.
    let lse = &arenas.lsa_entries[lse_idx];
    let _ = flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lse.data,
        None,
    );

    // Get LSA's LSDB.
    let (_, lsdb) =
        lsdb_index_mut(&mut instance.state.lsdb, &mut arenas.areas, lsdb_idx);
    let lsa_key = lse.data.hdr.key();

    // Remove pending LSA origination, if any.
    lsdb.delayed_orig.remove(&lsa_key);
}

// Flushes all self-originated LSAs from the LSDB.
pub(crate) fn flush_all_self_originated(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let reason = LsaFlushReason::PrematureAging;
    let mut idxs = vec![];

    // AS-scope LSAs.
    let lsdb_idx = LsdbIndex::As;
    idxs.extend(
        instance
            .state
            .lsdb
            .iter(&arenas.lsa_entries)
            .filter(|(_, lse)| {
                lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
            })
            .map(|(lse_idx, _)| (lsdb_idx, lse_idx)),
    );

    // Area-scope LSAs.
    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];
        let lsdb_idx = LsdbIndex::Area(area_idx);
        idxs.extend(
            area.state
                .lsdb
                .iter(&arenas.lsa_entries)
                .filter(|(_, lse)| {
                    lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                })
                .map(|(lse_idx, _)| (lsdb_idx, lse_idx)),
        );
    }

    // Flush LSAs.
    for (lsdb_idx, lse_idx) in idxs {
        flush(instance, arenas, lsdb_idx, lse_idx, reason);
    }
}

// Removes old instance of the given LSA from all neighbors' Link state
// retransmission lists.
fn rxmt_lists_remove(
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: &Lsa,
) {
    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];

        // Filter by LSA area.
        if let LsdbIndex::Area(lsdb_area_idx) = lsdb_idx
            && area_idx != lsdb_area_idx
        {
            continue;
        }

        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];

            // Iterate over all neighbors from this interface.
            for nbr_idx in iface.state.neighbors.indexes() {
                let nbr = &mut arenas.neighbors[nbr_idx];

                // Remove LSA from rxmt list as long as it's an older version.
                if let btree_map::Entry::Occupied(o) =
                    nbr.lists.ls_rxmt.entry(lsa.hdr.key())
                {
                    let old_lsa = o.get();
                    if lsa_compare(&old_lsa.hdr, &lsa.hdr) == Ordering::Less {
                        o.remove();
                        nbr.rxmt_lsupd_stop_check();
                    }
                }
            }
        }
    }
}

// ===== self-originated LSAs =====

// Originates or flushes the required LSAs in response to an LSA origination
// event.
pub(crate) fn lsa_orig_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    event: LsaOriginateEvent,
) -> Result<(), Error> {
    match event {
        LsaOriginateEvent::AreaStart { area_id } => {
            let (_, area) = arenas.areas.get_by_id(area_id)?;

            // Announce ASBR status when configured as one.
            if instance.config.asbr && area.external_routing_capability() {
                announce_asbr(area, instance);
            }
        }
        LsaOriginateEvent::InterfaceStateChange { .. } => {
            // (Re)originate Router-LSA in all areas since the ABR status
            // might have changed.
            for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
                let area = &arenas.areas[area_idx];
                lsa_orig_router(area, instance, arenas);
            }
        }
        LsaOriginateEvent::InterfaceDrChange { area_id, iface_id }
        | LsaOriginateEvent::NeighborToFromFull { area_id, iface_id } => {
            // (Re)originate Router-LSA.
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);

            // (Re)originate or flush Network-LSA.
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            let (_, iface) =
                area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
            if iface.state.ism_state == ism::State::Dr
                && iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .any(|nbr| nbr.state == nsm::State::Full)
            {
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                lsa_flush_network(iface, area, instance, &arenas.lsa_entries);
            }
        }
        LsaOriginateEvent::SelfOriginatedLsaRcvd { lsdb_id, lse_id } => {
            // Check if the received self-originated LSA needs to be
            // reoriginated or flushed.
            process_self_originated_lsa(instance, arenas, lsdb_id, lse_id)?;
        }
    };

    Ok(())
}

fn lsa_orig_router(
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Area(area.id);

    // LSA's header options.
    let options = area.options();

    // Router-LSA's flags.
    let mut flags = LsaRouterFlags::empty();
    if arenas.areas.is_abr(&arenas.interfaces) {
        flags.insert(LsaRouterFlags::B);
    }
    if instance.config.asbr {
        flags.insert(LsaRouterFlags::E);
    }

    // Router-LSA's links.
    let mut links = vec![];
    for iface in area
        .interfaces
        .iter(&arenas.interfaces)
        // Skip interfaces in the "Down" state.
        .filter(|iface| !iface.is_down())
    {
        let primary_addr = iface.system.primary_addr.unwrap();

        let mut add_stub_link = false;
        if iface.state.ism_state == ism::State::Waiting {
            add_stub_link = true;
        } else if (iface.state.ism_state == ism::State::Dr
            && iface
                .state
                .neighbors
                .iter(&arenas.neighbors)
                .any(|nbr| nbr.state == nsm::State::Full))
            || iface
                .state
                .dr
                .and_then(|net_id| {
                    iface
                        .state
                        .neighbors
                        .get_by_net_id(&arenas.neighbors, net_id)
                        .filter(|(_, nbr)| nbr.state == nsm::State::Full)
                })
                .is_some()
        {
            // Add a Type-2 (transit) link whose Link ID points at the DR.
            let link = LsaRouterLink::new(
                LsaRouterLinkType::TransitNetwork,
                iface.state.dr.unwrap().get(),
                primary_addr.ip(),
                iface.config.cost,
            );
            links.push(link);
        } else {
            add_stub_link = true;
        }

        if add_stub_link {
            let link = LsaRouterLink::new(
                LsaRouterLinkType::StubNetwork,
                primary_addr.network(),
                primary_addr.mask(),
                iface.config.cost,
            );
            links.push(link);
        }
    }

    // (Re)originate Router-LSA.
    let lsa_body = LsaBody::Router(LsaRouter { flags, links });
    instance.tx.protocol_input.lsa_orig_check(
        lsdb_id,
        options,
        instance.state.router_id,
        lsa_body,
    );
}

fn lsa_orig_network(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Area(area.id);

    // LSA's header options.
    let options = area.options();

    // The Link State ID for a network-LSA is the IP interface address of the
    // Designated Router.
    let lsa_id = iface.system.primary_addr.unwrap().ip();

    // Network-LSA's mask.
    let mask = iface.system.primary_addr.unwrap().mask();

    // Network-LSA's attached routers.
    let myself = instance.state.router_id;
    let nbrs = iface
        .state
        .neighbors
        .iter(&arenas.neighbors)
        .filter(|nbr| nbr.state == nsm::State::Full)
        .map(|nbr| nbr.router_id);
    let attached_rtrs = std::iter::once(myself).chain(nbrs).collect();

    // (Re)originate Network-LSA.
    let lsa_body = LsaBody::Network(LsaNetwork {
        mask,
        attached_rtrs,
    });
    instance
        .tx
        .protocol_input
        .lsa_orig_check(lsdb_id, options, lsa_id, lsa_body);
}

fn lsa_flush_network(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_entries: &Arena<LsaEntry>,
) {
    if let Some(lsa_key) = &iface.state.network_lsa_self
        && let Some((_, lse)) = area.state.lsdb.get(lsa_entries, lsa_key)
    {
        instance.tx.protocol_input.lsa_flush(
            LsdbId::Area(area.id),
            lse.id,
            LsaFlushReason::PrematureAging,
        );
    }
}

// Announces this router's ASBR status with a Type-4 Summary-LSA describing
// itself (NetworkMask 0, metric 20).
fn announce_asbr(area: &Area, instance: &InstanceUpView<'_>) {
    let lsdb_id = LsdbId::Area(area.id);
    let lsa_body = LsaBody::SummaryRouter(LsaSummary {
        mask: Ipv4Addr::UNSPECIFIED,
        metric: 20,
    });
    instance.tx.protocol_input.lsa_orig_check(
        lsdb_id,
        Options::E,
        instance.state.router_id,
        lsa_body,
    );
}

// Custom installation handling: keep track of self-originated Network-LSAs
// in the corresponding interface structures. This is necessary to allow
// flushing those LSAs later, since the DR role might change.
pub(crate) fn lsdb_install_hook(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: &Lsa,
) {
    if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
        && lsa.hdr.adv_rtr == instance.state.router_id
        && let LsdbIndex::Area(area_idx) = lsdb_idx
    {
        let area = &mut arenas.areas[area_idx];
        if let Some((_, iface)) = area
            .interfaces
            .get_mut_by_addr(&mut arenas.interfaces, lsa.hdr.lsa_id)
        {
            if lsa.hdr.is_maxage() {
                iface.state.network_lsa_self = None;
            } else {
                iface.state.network_lsa_self = Some(lsa.hdr.key());
            }
        }
    }
}

// Handles the receipt of a newer self-originated LSA (RFC 2328, Section
// 13.4): either reoriginate a fresh instance with a higher sequence number
// or flush the LSA when it should no longer be advertised.
fn process_self_originated_lsa(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
) -> Result<(), Error> {
    let mut flush = false;

    // Lookup LSDB and LSA entry.
    let lsdb_key = lsdb_id.into();
    let (lsdb_idx, lsdb) =
        lsdb_get(&instance.state.lsdb, &arenas.areas, &lsdb_key)?;
    let (_, lse) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)?;
    let lsa = &lse.data;

    // Check LSA type.
    match lsa.hdr.lsa_type.type_code() {
        Some(LsaTypeCode::Router) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];

            // Reoriginate Router-LSA.
            lsa_orig_router(area, instance, arenas);
        }
        Some(LsaTypeCode::Network) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];

            // Check if the router is still the DR for the network.
            if let Some(iface) = area
                .interfaces
                .iter(&arenas.interfaces)
                .find(|iface| {
                    iface
                        .system
                        .primary_addr
                        .is_some_and(|addr| addr.ip() == lsa.hdr.lsa_id)
                })
                .filter(|iface| iface.state.ism_state == ism::State::Dr)
                .filter(|_| {
                    // Ensure the Router-ID hasn't changed.
                    lsa.hdr.adv_rtr == instance.state.router_id
                })
            {
                // Reoriginate Network-LSA.
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                // Flush Network-LSA.
                flush = true;
            }
        }
        Some(LsaTypeCode::SummaryNetwork | LsaTypeCode::SummaryRouter) => {
            // Do nothing. These LSAs will be either reoriginated or flushed
            // once the routing table is recomputed.
        }
        Some(LsaTypeCode::AsExternal) => {
            // Flush AS-External-LSA (redistribution of local routes isn't
            // supported at the moment).
            flush = true;
        }
        None => {
            // Receiving self-originated LSAs of unknown type shouldn't
            // happen in practice. If it does, the LSA will be rejected early
            // on before it reaches this point.
            flush = true;
        }
    }

    if flush {
        // Effectively flush the received self-originated LSA.
        instance.tx.protocol_input.lsa_flush(
            lsdb_id,
            lse_id,
            LsaFlushReason::PrematureAging,
        );
    }

    Ok(())
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn hdr(age: u16, seq_no: u32, cksum: u16) -> LsaHdr {
        LsaHdr {
            age,
            options: Options::E,
            lsa_type: LsaTypeCode::Router.into(),
            lsa_id: Ipv4Addr::new(1, 1, 1, 1),
            adv_rtr: Ipv4Addr::new(1, 1, 1, 1),
            seq_no,
            cksum,
            length: 36,
        }
    }

    #[test]
    fn lsa_compare_seq_no() {
        // Higher sequence number wins, using signed comparison.
        let a = hdr(1, 0x80000002, 0x1111);
        let b = hdr(1, 0x80000001, 0x2222);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
        assert_eq!(lsa_compare(&b, &a), Ordering::Less);

        // InitialSequenceNumber (negative as i32) loses to any positive
        // sequence number.
        let a = hdr(1, 0x00000001, 0);
        let b = hdr(1, LSA_INIT_SEQ_NO, 0);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn lsa_compare_cksum_tiebreak() {
        let a = hdr(1, 0x80000002, 0x2222);
        let b = hdr(1, 0x80000002, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn lsa_compare_maxage_tiebreak() {
        let a = hdr(LSA_MAX_AGE, 0x80000002, 0x1111);
        let b = hdr(10, 0x80000002, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
        assert_eq!(lsa_compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn lsa_compare_age_diff() {
        // Ages differing by more than MaxAgeDiff: the younger wins.
        let a = hdr(10, 0x80000002, 0x1111);
        let b = hdr(10 + LSA_MAX_AGE_DIFF + 1, 0x80000002, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);

        // Within MaxAgeDiff the two instances are considered identical.
        let b = hdr(10 + LSA_MAX_AGE_DIFF, 0x80000002, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Equal);
    }

    fn network_lsa(seq_no: u32, rtrs: &[Ipv4Addr]) -> Lsa {
        Lsa::new(
            0,
            Options::E,
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(2, 2, 2, 2),
            seq_no,
            LsaBody::Network(LsaNetwork {
                mask: Ipv4Addr::new(255, 255, 255, 0),
                attached_rtrs: rtrs.iter().copied().collect(),
            }),
        )
    }

    #[test]
    fn lsa_contents_ignore_seq_no() {
        // A re-originated instance with a bumped sequence number but
        // identical body doesn't count as a content change.
        let rtrs = [Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2)];
        let a = network_lsa(LSA_INIT_SEQ_NO, &rtrs);
        let b = network_lsa(LSA_INIT_SEQ_NO + 1, &rtrs);
        assert!(lsa_same_contents(&a, &b));
    }

    #[test]
    fn lsa_contents_body_change() {
        let a = network_lsa(LSA_INIT_SEQ_NO, &[Ipv4Addr::new(1, 1, 1, 1)]);
        let b = network_lsa(
            LSA_INIT_SEQ_NO,
            &[Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2)],
        );
        // The extra attached router changes both the length and the body.
        assert!(!lsa_same_contents(&a, &b));
    }
}
