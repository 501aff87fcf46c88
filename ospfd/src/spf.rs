//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;
use std::time::Instant;

use derive_new::new;

use crate::area;
use crate::debug::Debug;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::packet::lsa::Lsa;
use crate::route::{AreaLsdbView, RouteCalcInput};
use crate::tasks;

// Delay between the first SPF-triggering event and the route recalculation,
// used to batch multiple triggers into a single run.
const SPF_DELAY: u32 = 100;

// LSA that triggered a route recalculation.
#[derive(Clone, Debug, new)]
pub struct SpfTriggerLsa {
    pub old: Option<Arc<Lsa>>,
    pub new: Arc<Lsa>,
}

// SPF Delay FSM.
pub mod fsm {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Quiet,
        Scheduled,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        Igp,
        DelayTimer,
    }
}

// ===== global functions =====

pub(crate) fn fsm(
    event: fsm::Event,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) -> Result<(), crate::error::Error> {
    Debug::SpfDelayFsmEvent(&instance.state.spf_delay_state, &event).log();

    match (instance.state.spf_delay_state, event) {
        (fsm::State::Quiet, fsm::Event::Igp) => {
            // Postpone the route recalculation so that multiple triggers are
            // batched into a single run.
            let task = tasks::spf_delay_timer(
                instance,
                fsm::Event::DelayTimer,
                SPF_DELAY,
            );
            instance.state.spf_delay_timer = Some(task);
            fsm_state_change(instance, fsm::State::Scheduled);
        }
        (fsm::State::Scheduled, fsm::Event::Igp) => {
            // A run is already scheduled.
        }
        (_, fsm::Event::DelayTimer) => {
            instance.state.spf_delay_timer = None;
            run_route_calc(instance, arenas);
            fsm_state_change(instance, fsm::State::Quiet);
        }
    }

    Ok(())
}

// ===== helper functions =====

fn fsm_state_change(instance: &mut InstanceUpView<'_>, new_state: fsm::State) {
    if new_state != instance.state.spf_delay_state {
        Debug::SpfDelayFsmTransition(
            &instance.state.spf_delay_state,
            &new_state,
        )
        .log();
        instance.state.spf_delay_state = new_state;
    }
}

// Invokes the external route computation hook and turns whatever inter-area
// routes it hands back into Summary-LSAs.
fn run_route_calc(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let trigger_lsas = std::mem::take(&mut instance.state.spf_trigger_lsas);
    instance.state.spf_schedule_time = None;
    instance.state.spf_last_time = Some(Instant::now());

    let Some(route_calc) = instance.route_calc.clone() else {
        return;
    };

    // Snapshot the LSDBs for the computation.
    let areas = arenas
        .areas
        .iter()
        .map(|area| AreaLsdbView {
            area_id: area.area_id,
            lsas: area
                .state
                .lsdb
                .iter(&arenas.lsa_entries)
                .map(|(_, lse)| lse.data.clone())
                .collect(),
        })
        .collect();
    let external = instance
        .state
        .lsdb
        .iter(&arenas.lsa_entries)
        .map(|(_, lse)| lse.data.clone())
        .collect();

    let input = RouteCalcInput {
        router_id: instance.state.router_id,
        trigger_lsas: &trigger_lsas,
        areas,
        external,
    };
    let updates = route_calc.recalculate_routes(&input);

    // (Re)originate or flush Summary-LSAs from the returned inter-area
    // routes.
    area::update_summary_lsas(
        instance,
        &mut arenas.areas,
        &arenas.interfaces,
        &arenas.lsa_entries,
        &updates,
    );

    // Update statistics.
    instance.state.spf_run_count += 1;
}
