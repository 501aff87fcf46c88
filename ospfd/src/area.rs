//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::collections::{AreaId, Arena, Interfaces, Lsdb, LsdbId};
use crate::debug::LsaFlushReason;
use crate::instance::InstanceUpView;
use crate::interface::Interface;
use crate::lsdb::{LsaEntry, LsaEntryFlags};
use crate::packet::Options;
use crate::packet::lsa::{LsaBody, LsaKey, LsaSummary, LsaTypeCode};
use crate::route::{RouteUpdates, SummaryNet, SummaryRtr};

// OSPF area.
#[derive(Debug)]
pub struct Area {
    // ID.
    pub id: AreaId,
    // Area ID.
    pub area_id: Ipv4Addr,
    // Area type.
    pub area_type: AreaType,
    // Area state data.
    pub state: AreaState,
    // Area interfaces.
    pub interfaces: Interfaces,
}

// OSPF area state.
#[derive(Debug)]
pub struct AreaState {
    // LSDB of area-scope LSAs.
    pub lsdb: Lsdb,
    // Table of summaries originated into this area, keyed by destination and
    // carrying the Link State ID in use.
    pub net_summaries: BTreeMap<Ipv4Network, (Ipv4Addr, SummaryNet)>,
    pub rtr_summaries: BTreeMap<Ipv4Addr, (Ipv4Addr, SummaryRtr)>,
    // Statistics.
    pub discontinuity_time: DateTime<Utc>,
}

// OSPF area type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AreaType {
    #[default]
    Normal,
    Stub,
}

// ===== impl Area =====

impl Area {
    pub(crate) fn new(id: AreaId, area_id: Ipv4Addr) -> Self {
        Self {
            id,
            area_id,
            area_type: AreaType::Normal,
            state: Default::default(),
            interfaces: Default::default(),
        }
    }

    // Returns whether this area is active.
    //
    // An area is active as long as it contains at least one operational
    // interface.
    pub(crate) fn is_active(&self, interfaces: &Arena<Interface>) -> bool {
        self.interfaces
            .iter(interfaces)
            .any(|iface| !iface.is_down())
    }

    // Returns whether AS-external LSAs are flooded into this area.
    pub(crate) fn external_routing_capability(&self) -> bool {
        self.area_type == AreaType::Normal
    }

    // Returns the options used for packets and self-originated LSAs of this
    // area.
    pub(crate) fn options(&self) -> Options {
        let mut options = Options::empty();
        if self.external_routing_capability() {
            options.insert(Options::E);
        }
        options
    }
}

// ===== impl AreaState =====

impl Default for AreaState {
    fn default() -> AreaState {
        AreaState {
            lsdb: Default::default(),
            net_summaries: Default::default(),
            rtr_summaries: Default::default(),
            discontinuity_time: Utc::now(),
        }
    }
}

// ===== global functions =====

// (Re)originates and flushes Summary-LSAs from the inter-area routes handed
// back by the route computation hook.
pub(crate) fn update_summary_lsas(
    instance: &InstanceUpView<'_>,
    areas: &mut crate::collections::Areas,
    interfaces: &Arena<Interface>,
    lsa_entries: &Arena<LsaEntry>,
    updates: &RouteUpdates,
) {
    // Check ABR status. Only ABRs originate summaries.
    let is_abr = areas.is_abr(interfaces);

    for area_idx in areas.indexes().collect::<Vec<_>>() {
        update_net_summary_lsas(area_idx, is_abr, instance, areas, lsa_entries, updates);
        update_rtr_summary_lsas(area_idx, is_abr, instance, areas, lsa_entries, updates);
    }
}

fn update_net_summary_lsas(
    area_idx: crate::collections::AreaIndex,
    is_abr: bool,
    instance: &InstanceUpView<'_>,
    areas: &mut crate::collections::Areas,
    lsa_entries: &Arena<LsaEntry>,
    updates: &RouteUpdates,
) {
    let area = &mut areas[area_idx];
    let lsdb_id = LsdbId::Area(area.id);
    let options = area.options();

    // Compute summary routes.
    let new_summaries = if is_abr {
        updates.net_summaries(area.area_id)
    } else {
        Default::default()
    };

    // Save the old table of summary routes.
    let mut old_summaries = std::mem::take(&mut area.state.net_summaries);

    // (Re)originate the required Summary-LSAs.
    area.state.net_summaries = new_summaries
        .into_iter()
        .map(|(prefix, new_summary)| {
            let lsa_id = match old_summaries.remove(&prefix) {
                Some((old_lsa_id, old_summary)) => {
                    // Reoriginate summary LSA if the route has changed,
                    // reusing the previous LSA-ID.
                    if new_summary != old_summary {
                        let lsa_body = LsaBody::SummaryNetwork(LsaSummary {
                            mask: prefix.mask(),
                            metric: new_summary.metric,
                        });
                        instance.tx.protocol_input.lsa_orig_check(
                            lsdb_id, options, old_lsa_id, lsa_body,
                        );
                    }
                    old_lsa_id
                }
                None => {
                    // Originate new summary LSA.
                    let lsa_id = prefix.ip();
                    let lsa_body = LsaBody::SummaryNetwork(LsaSummary {
                        mask: prefix.mask(),
                        metric: new_summary.metric,
                    });
                    instance.tx.protocol_input.lsa_orig_check(
                        lsdb_id, options, lsa_id, lsa_body,
                    );
                    lsa_id
                }
            };

            (prefix, (lsa_id, new_summary))
        })
        .collect();

    // Flush old summaries that are no longer valid.
    let lsa_ids = old_summaries.into_values().map(|(lsa_id, _)| lsa_id);
    flush_summary_lsas(
        LsaTypeCode::SummaryNetwork,
        lsa_ids,
        area,
        instance,
        lsa_entries,
    );
}

fn update_rtr_summary_lsas(
    area_idx: crate::collections::AreaIndex,
    is_abr: bool,
    instance: &InstanceUpView<'_>,
    areas: &mut crate::collections::Areas,
    lsa_entries: &Arena<LsaEntry>,
    updates: &RouteUpdates,
) {
    let area = &mut areas[area_idx];
    let lsdb_id = LsdbId::Area(area.id);
    let options = area.options();

    // ASBR summaries are never originated into stub areas.
    let new_summaries = if is_abr && area.area_type == AreaType::Normal {
        updates.rtr_summaries(area.area_id)
    } else {
        Default::default()
    };

    // Save the old table of summary routes.
    let mut old_summaries = std::mem::take(&mut area.state.rtr_summaries);

    // (Re)originate the required Summary-LSAs.
    area.state.rtr_summaries = new_summaries
        .into_iter()
        .map(|(router_id, new_summary)| {
            let lsa_id = match old_summaries.remove(&router_id) {
                Some((old_lsa_id, old_summary)) => {
                    if new_summary != old_summary {
                        let lsa_body = LsaBody::SummaryRouter(LsaSummary {
                            mask: Ipv4Addr::UNSPECIFIED,
                            metric: new_summary.metric,
                        });
                        instance.tx.protocol_input.lsa_orig_check(
                            lsdb_id, options, old_lsa_id, lsa_body,
                        );
                    }
                    old_lsa_id
                }
                None => {
                    // Originate new summary LSA.
                    let lsa_body = LsaBody::SummaryRouter(LsaSummary {
                        mask: Ipv4Addr::UNSPECIFIED,
                        metric: new_summary.metric,
                    });
                    instance.tx.protocol_input.lsa_orig_check(
                        lsdb_id, options, router_id, lsa_body,
                    );
                    router_id
                }
            };

            (router_id, (lsa_id, new_summary))
        })
        .collect();

    // Flush old summaries that are no longer valid.
    let lsa_ids = old_summaries.into_values().map(|(lsa_id, _)| lsa_id);
    flush_summary_lsas(
        LsaTypeCode::SummaryRouter,
        lsa_ids,
        area,
        instance,
        lsa_entries,
    );
}

fn flush_summary_lsas(
    type_code: LsaTypeCode,
    lsa_ids: impl Iterator<Item = Ipv4Addr>,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_entries: &Arena<LsaEntry>,
) {
    let lsdb_id = LsdbId::Area(area.id);
    let adv_rtr = instance.state.router_id;

    // Flush previously originated summaries that are no longer valid.
    for lsa_id in lsa_ids {
        let lsa_key = LsaKey::new(type_code.into(), adv_rtr, lsa_id);
        if let Some((_, lse)) = area.state.lsdb.get(lsa_entries, &lsa_key) {
            instance.tx.protocol_input.lsa_flush(
                lsdb_id,
                lse.id,
                LsaFlushReason::PrematureAging,
            );
        }
    }

    // Flush received self-originated summaries that are no longer valid.
    for (_, lse) in area
        .state
        .lsdb
        .iter_by_type_advrtr(lsa_entries, type_code.into(), adv_rtr)
        .filter(|(_, lse)| lse.flags.contains(LsaEntryFlags::RECEIVED))
    {
        instance.tx.protocol_input.lsa_flush(
            lsdb_id,
            lse.id,
            LsaFlushReason::PrematureAging,
        );
    }
}
