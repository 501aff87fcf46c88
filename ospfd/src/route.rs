//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::packet::lsa::Lsa;
use crate::spf::SpfTriggerLsa;

// Seam to the external route computation module.
//
// The protocol engine invokes `recalculate_routes` whenever installed LSAs
// change the topology. The implementation is expected to run SPF over the
// provided LSDB snapshot and install routes in the host OS as it sees fit;
// whatever inter-area routes it hands back are turned into Summary-LSAs.
pub trait RouteCalc: Send + Sync {
    fn recalculate_routes(&self, input: &RouteCalcInput<'_>) -> RouteUpdates;
}

// Input handed to the route computation hook.
pub struct RouteCalcInput<'a> {
    pub router_id: Ipv4Addr,
    // LSAs that have changed since the last computation.
    pub trigger_lsas: &'a [SpfTriggerLsa],
    // Per-area LSDB snapshots.
    pub areas: Vec<AreaLsdbView>,
    // AS-external LSAs.
    pub external: Vec<Arc<Lsa>>,
}

// Snapshot of one area's LSDB.
pub struct AreaLsdbView {
    pub area_id: Ipv4Addr,
    pub lsas: Vec<Arc<Lsa>>,
}

// Inter-area routes returned by the route computation hook, keyed by the
// area they should be announced into.
#[derive(Debug, Default)]
pub struct RouteUpdates {
    pub net_summaries: BTreeMap<Ipv4Addr, BTreeMap<Ipv4Network, SummaryNet>>,
    pub rtr_summaries: BTreeMap<Ipv4Addr, BTreeMap<Ipv4Addr, SummaryRtr>>,
}

// Inter-area network route.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct SummaryNet {
    pub metric: u32,
}

// Inter-area ASBR route.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct SummaryRtr {
    pub metric: u32,
}

// ===== impl RouteUpdates =====

impl RouteUpdates {
    pub(crate) fn net_summaries(
        &self,
        area_id: Ipv4Addr,
    ) -> BTreeMap<Ipv4Network, SummaryNet> {
        self.net_summaries.get(&area_id).cloned().unwrap_or_default()
    }

    pub(crate) fn rtr_summaries(
        &self,
        area_id: Ipv4Addr,
    ) -> BTreeMap<Ipv4Addr, SummaryRtr> {
        self.rtr_summaries.get(&area_id).cloned().unwrap_or_default()
    }
}
