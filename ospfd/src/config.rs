//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::area::AreaType;

// Instance configuration.
#[derive(Clone, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct InstanceCfg {
    // Router ID. When unset, the address of the first configured interface
    // is used.
    pub router_id: Option<Ipv4Addr>,
    // Whether this router is an AS boundary router.
    pub asbr: bool,
    pub areas: Vec<AreaCfg>,
}

// Area configuration.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct AreaCfg {
    pub area_id: Ipv4Addr,
    pub area_type: AreaType,
    pub interfaces: Vec<InterfaceCfg>,
}

// Interface configuration.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct InterfaceCfg {
    pub name: String,
    pub addr: Ipv4Network,
    pub mtu: u16,
    pub enabled: bool,
    pub passive: bool,
    pub priority: u8,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub transmit_delay: u16,
    pub retransmit_interval: u16,
    pub cost: u16,
}

// Interface configuration defaults (RFC 2328, Appendix C.3).
impl InterfaceCfg {
    pub const DFLT_PRIORITY: u8 = 1;
    pub const DFLT_HELLO_INTERVAL: u16 = 10;
    pub const DFLT_DEAD_INTERVAL: u16 = 40;
    pub const DFLT_TRANSMIT_DELAY: u16 = 1;
    pub const DFLT_RETRANSMIT_INTERVAL: u16 = 5;
    pub const DFLT_COST: u16 = 10;

    pub fn new(name: impl Into<String>, addr: Ipv4Network, mtu: u16) -> Self {
        InterfaceCfg {
            name: name.into(),
            addr,
            mtu,
            enabled: true,
            passive: false,
            priority: Self::DFLT_PRIORITY,
            hello_interval: Self::DFLT_HELLO_INTERVAL,
            dead_interval: Self::DFLT_DEAD_INTERVAL,
            transmit_delay: Self::DFLT_TRANSMIT_DELAY,
            retransmit_interval: Self::DFLT_RETRANSMIT_INTERVAL,
            cost: Self::DFLT_COST,
        }
    }
}

impl AreaCfg {
    pub fn new(area_id: Ipv4Addr) -> Self {
        AreaCfg {
            area_id,
            area_type: AreaType::Normal,
            interfaces: Vec::new(),
        }
    }
}
